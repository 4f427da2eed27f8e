//! # Rust Wander Library
//!
//! Travel planning glue around two external services: SerpApi for flight and
//! hotel search, and Gemini for preference gathering and itinerary generation.
//!
//! The two pieces with real edge-case policy live in [`search`] (search with
//! ordered fallbacks and sentinel payloads) and [`extract`] (recovering a JSON
//! document embedded in generated text). Everything else wires those into a
//! chat session, a travel-data fetch and an itinerary generator.

pub mod client;
pub mod config;
pub mod extract;
pub mod gemini;
pub mod planner;
pub mod search;
pub mod session;
pub mod store;

use thiserror::Error;

// Re-export main types for convenience
pub use client::{is_sentinel_payload, SerpApiClient};
pub use config::Config;
pub use extract::{extract_document, ExtractedDocument};
pub use gemini::{GeminiClient, TextGenerator};
pub use planner::{ItineraryRequest, TravelData, TravelPlanner, TravelSelection};
pub use search::{resilient_search, FallbackList, SearchKind, SearchProvider, SearchQuery, SearchResult};
pub use session::{chat_turn, ChatReply, Role, Session, SessionState, SessionStore, SharedSessions, Turn};
pub use store::FileStore;

/// Error types for the travel library
#[derive(Error, Debug)]
pub enum TravelError {
    #[error("Upstream service unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Malformed upstream payload: {0}")]
    MalformedUpstreamPayload(String),

    #[error("Generated text could not be parsed: {0}")]
    GenerationParseFailure(String),

    #[error("Missing required parameters: {0}")]
    MissingRequiredField(String),

    #[error("Invalid date format: {0}")]
    DateParseError(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TravelError {
    /// Whether the failure is absorbed locally (fallback, sentinel or plain text)
    /// rather than surfaced to the caller as a hard error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TravelError::UpstreamUnavailable(_)
                | TravelError::MalformedUpstreamPayload(_)
                | TravelError::GenerationParseFailure(_)
                | TravelError::Http(_)
        )
    }
}

/// Fetch flights and hotels for a selection using configuration from the environment.
///
/// # Example
/// ```no_run
/// use rust_wander::{fetch_travel_data, TravelSelection};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let selection = TravelSelection {
///     departure_id: Some("LAX".to_string()),
///     arrival_id: Some("JFK".to_string()),
///     outbound_date: Some("2025-08-15".to_string()),
///     return_date: Some("2025-08-22".to_string()),
///     hotel_query: Some("Hotels in New York".to_string()),
/// };
///
/// let data = fetch_travel_data(&selection).await?;
/// println!("Flight data genuine: {}", data.flights_genuine);
/// # Ok(())
/// # }
/// ```
pub async fn fetch_travel_data(selection: &TravelSelection) -> Result<TravelData, TravelError> {
    let config = Config::from_env()?;
    let planner = TravelPlanner::from_config(&config)?;
    planner.fetch_travel_data(selection).await
}
