//! Environment-driven configuration
//!
//! Values come from an optional `wander.toml` in the working directory and the
//! process environment (after loading `.env`), environment winning.

use crate::gemini::DEFAULT_GEMINI_MODEL;
use crate::TravelError;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_FALLBACK_ROUTES: &str = "LAX-JFK,JFK-LAX,LHR-CDG,CDG-LHR";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const CONFIG_FILE: &str = "wander";

/// A departure/arrival airport pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub departure: String,
    pub arrival: String,
}

/// Raw settings as named in the environment (lower-cased by the `config` crate)
#[derive(Debug, Deserialize)]
struct Settings {
    serpapi_api_key: Option<String>,
    gemini_api_key: Option<String>,
    gemini_model: String,
    wander_output_dir: PathBuf,
    wander_mirror_dir: Option<PathBuf>,
    wander_fallback_routes: String,
    wander_http_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub serpapi_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub output_dir: PathBuf,
    pub mirror_dir: Option<PathBuf>,
    pub fallback_routes: Vec<Route>,
    pub http_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, TravelError> {
        dotenvy::dotenv().ok();

        let builder = ::config::Config::builder()
            .add_source(::config::File::with_name(CONFIG_FILE).required(false))
            .add_source(::config::Environment::default().ignore_empty(true));
        Self::build(builder)
    }

    /// Build from an explicit variable map instead of the process environment.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, TravelError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let source: ::config::Map<String, String> = vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        let builder = ::config::Config::builder()
            .add_source(::config::Environment::default().ignore_empty(true).source(Some(source)));
        Self::build(builder)
    }

    fn build(
        builder: ::config::ConfigBuilder<::config::builder::DefaultState>,
    ) -> Result<Self, TravelError> {
        let settings: Settings = builder
            .set_default("gemini_model", DEFAULT_GEMINI_MODEL)
            .and_then(|b| b.set_default("wander_output_dir", "."))
            .and_then(|b| b.set_default("wander_mirror_dir", "src/pages"))
            .and_then(|b| b.set_default("wander_fallback_routes", DEFAULT_FALLBACK_ROUTES))
            .and_then(|b| b.set_default("wander_http_timeout_secs", DEFAULT_TIMEOUT_SECS as i64))
            .and_then(|b| b.build())
            .and_then(|c| c.try_deserialize())
            .map_err(|e| TravelError::Config(e.to_string()))?;

        let set = |value: Option<String>| value.filter(|v| !v.trim().is_empty());

        Ok(Self {
            serpapi_api_key: set(settings.serpapi_api_key),
            gemini_api_key: set(settings.gemini_api_key),
            gemini_model: settings.gemini_model,
            output_dir: settings.wander_output_dir,
            mirror_dir: settings.wander_mirror_dir,
            fallback_routes: parse_routes(&settings.wander_fallback_routes)?,
            http_timeout: Duration::from_secs(settings.wander_http_timeout_secs),
        })
    }

    pub fn require_serpapi_key(&self) -> Result<&str, TravelError> {
        self.serpapi_api_key
            .as_deref()
            .ok_or_else(|| TravelError::Config("SERPAPI_API_KEY is not set".to_string()))
    }

    pub fn require_gemini_key(&self) -> Result<&str, TravelError> {
        self.gemini_api_key
            .as_deref()
            .ok_or_else(|| TravelError::Config("GEMINI_API_KEY is not set".to_string()))
    }
}

/// Parse `"LAX-JFK,JFK-LAX"` into routes. Codes must be three ASCII letters.
pub fn parse_routes(routes: &str) -> Result<Vec<Route>, TravelError> {
    routes
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|pair| {
            let (departure, arrival) = pair
                .split_once('-')
                .ok_or_else(|| TravelError::Config(format!("Route must be in format AAA-BBB, got {}", pair)))?;
            Ok(Route {
                departure: airport_code(departure)?,
                arrival: airport_code(arrival)?,
            })
        })
        .collect()
}

fn airport_code(code: &str) -> Result<String, TravelError> {
    let code = code.trim();
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(code.to_ascii_uppercase())
    } else {
        Err(TravelError::Config(format!("Invalid airport code: {}", code)))
    }
}
