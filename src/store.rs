//! Flat JSON file output with an optional front-end mirror directory

use crate::TravelError;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const FLIGHT_FILE: &str = "test_flight.json";
pub const HOTEL_FILE: &str = "test.json";
pub const ITINERARY_FILE: &str = "itinerary.json";

/// Writes payloads into `output_dir`, and into `mirror_dir` when it exists.
#[derive(Debug, Clone)]
pub struct FileStore {
    output_dir: PathBuf,
    mirror_dir: Option<PathBuf>,
}

impl FileStore {
    pub fn new(output_dir: impl Into<PathBuf>, mirror_dir: Option<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            mirror_dir,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn path_of(&self, name: &str) -> PathBuf {
        self.output_dir.join(name)
    }

    /// Write `value` as pretty JSON and return the primary path.
    ///
    /// The mirror copy is only written when the mirror directory already
    /// exists; a failed mirror write is logged, not returned.
    pub fn save_json(&self, name: &str, value: &Value) -> Result<PathBuf, TravelError> {
        let json = serde_json::to_string_pretty(value)?;

        fs::create_dir_all(&self.output_dir)?;
        let path = self.path_of(name);
        fs::write(&path, &json)?;
        info!(path = %path.display(), bytes = json.len(), "Saved JSON file");

        if let Some(mirror) = self.mirror_dir.as_ref().filter(|dir| dir.is_dir()) {
            let mirror_path = mirror.join(name);
            match fs::write(&mirror_path, &json) {
                Ok(()) => debug!(path = %mirror_path.display(), "Mirrored JSON file"),
                Err(e) => warn!(path = %mirror_path.display(), error = %e, "Failed to mirror JSON file"),
            }
        }

        Ok(path)
    }

    pub fn load_json(&self, name: &str) -> Result<Value, TravelError> {
        let text = fs::read_to_string(self.path_of(name))?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Copy existing output files into the mirror directory, creating it.
    /// Missing source files are skipped. Returns false when there is no mirror
    /// configured or any copy failed.
    pub fn mirror_all(&self, names: &[&str]) -> bool {
        let Some(mirror) = &self.mirror_dir else {
            return false;
        };

        if let Err(e) = fs::create_dir_all(mirror) {
            warn!(path = %mirror.display(), error = %e, "Failed to create mirror directory");
            return false;
        }

        let mut ok = true;
        for name in names {
            let source = self.path_of(name);
            if !source.exists() {
                debug!(path = %source.display(), "Source file does not exist, skipping");
                continue;
            }
            match fs::copy(&source, mirror.join(name)) {
                Ok(bytes) => debug!(file = name, bytes = bytes, "Copied file to mirror"),
                Err(e) => {
                    warn!(file = name, error = %e, "Failed to copy file to mirror");
                    ok = false;
                }
            }
        }
        ok
    }
}
