//! Recover a JSON document embedded in generated free text
//!
//! The working text is the body of the first fenced code block when there is
//! one, otherwise the whole reply. The candidate runs from the first `{` to the
//! last `}` of the working text. There is no brace balancing and no repair, so
//! unrelated braces in surrounding prose can still break extraction.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;
use tracing::debug;

/// Outcome of extracting a document from generated text
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractedDocument {
    /// Parsed object containing every required key
    Structured(Map<String, Value>),
    /// Raw text kept verbatim, with the reason it was not structured
    Unstructured { raw: String, error: Option<String> },
}

impl ExtractedDocument {
    pub fn is_structured(&self) -> bool {
        matches!(self, ExtractedDocument::Structured(_))
    }

    pub fn as_structured(&self) -> Option<&Map<String, Value>> {
        match self {
            ExtractedDocument::Structured(map) => Some(map),
            ExtractedDocument::Unstructured { .. } => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            ExtractedDocument::Structured(map) => Some(Value::Object(map)),
            ExtractedDocument::Unstructured { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ExtractedDocument::Structured(_) => None,
            ExtractedDocument::Unstructured { error, .. } => error.as_deref(),
        }
    }
}

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    // opening fence, optional language tag, then the shortest body up to the next fence
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)```[A-Za-z0-9_+.\-]*[ \t]*\r?\n?(.*?)```").expect("fence pattern is valid")
    })
}

/// Body of the first fenced code block, or the text unchanged when there is no
/// complete fence pair.
pub fn strip_code_fence(text: &str) -> &str {
    fence_regex()
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(text)
}

/// Substring from the first `{` to the last `}`, inclusive.
pub fn brace_candidate(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if start < end {
        Some(&text[start..=end])
    } else {
        None
    }
}

/// Extract a JSON object from `raw` and check its top-level keys.
///
/// Never fails: anything that is not an object holding all of
/// `required_keys` comes back as [`ExtractedDocument::Unstructured`] with the
/// original text and a message describing what went wrong.
pub fn extract_document(raw: &str, required_keys: &[&str]) -> ExtractedDocument {
    let unstructured = |error: String| {
        debug!(error = %error, text_length = raw.len(), "Generated text is unstructured");
        ExtractedDocument::Unstructured {
            raw: raw.to_string(),
            error: Some(error),
        }
    };

    let working = strip_code_fence(raw);
    let candidate = match brace_candidate(working) {
        Some(candidate) => candidate,
        None => return unstructured("no JSON object found in text".to_string()),
    };

    let value: Value = match serde_json::from_str(candidate) {
        Ok(value) => value,
        Err(e) => return unstructured(e.to_string()),
    };

    let map = match value {
        Value::Object(map) => map,
        _ => return unstructured("top-level JSON value is not an object".to_string()),
    };

    let missing: Vec<&str> = required_keys
        .iter()
        .copied()
        .filter(|key| !map.contains_key(*key))
        .collect();
    if !missing.is_empty() {
        return unstructured(format!("missing required keys: {}", missing.join(", ")));
    }

    ExtractedDocument::Structured(map)
}
