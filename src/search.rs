//! Resilient search over a flaky upstream provider
//!
//! The primary query is tried first, then each fallback in order. The first
//! genuine payload wins; if nothing genuine turns up the caller still gets the
//! primary's (sentinel) payload so there is always something to display.

use crate::client::{is_sentinel_payload, sentinel_payload};
use crate::TravelError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info, warn};

/// Which provider engine a query targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchKind {
    Flights,
    Hotels,
}

impl SearchKind {
    pub fn engine(&self) -> &'static str {
        match self {
            SearchKind::Flights => "google_flights",
            SearchKind::Hotels => "google_hotels",
        }
    }
}

/// Immutable set of query parameters for one provider call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    kind: SearchKind,
    params: BTreeMap<String, String>,
}

impl SearchQuery {
    pub fn new(kind: SearchKind, params: BTreeMap<String, String>) -> Self {
        Self { kind, params }
    }

    /// Round-trip flight query. Airport codes are trimmed and upper-cased.
    pub fn flights(departure_id: &str, arrival_id: &str, outbound_date: &str, return_date: &str) -> Self {
        let mut params = BTreeMap::new();
        params.insert("departure_id".to_string(), departure_id.trim().to_uppercase());
        params.insert("arrival_id".to_string(), arrival_id.trim().to_uppercase());
        params.insert("outbound_date".to_string(), outbound_date.to_string());
        params.insert("return_date".to_string(), return_date.to_string());
        Self::new(SearchKind::Flights, params)
    }

    /// Free-text hotel query such as "Hotels in Austin"
    pub fn hotels(query: &str, check_in_date: &str, check_out_date: &str) -> Self {
        let mut params = BTreeMap::new();
        params.insert("q".to_string(), query.to_string());
        params.insert("check_in_date".to_string(), check_in_date.to_string());
        params.insert("check_out_date".to_string(), check_out_date.to_string());
        Self::new(SearchKind::Hotels, params)
    }

    pub fn kind(&self) -> SearchKind {
        self.kind
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }
}

impl fmt::Display for SearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            SearchKind::Flights => write!(
                f,
                "{}->{}",
                self.get("departure_id").unwrap_or("?"),
                self.get("arrival_id").unwrap_or("?")
            ),
            SearchKind::Hotels => write!(f, "{}", self.get("q").unwrap_or("?")),
        }
    }
}

/// Ordered fallback queries; earlier entries take priority
pub type FallbackList = Vec<SearchQuery>;

/// Provider payload tagged by whether it came from live data
#[derive(Debug, Clone, PartialEq)]
pub enum SearchResult {
    Genuine(Value),
    Sentinel(Value),
}

impl SearchResult {
    /// Tag a payload by its sentinel marker field.
    pub fn from_payload(payload: Value) -> Self {
        if is_sentinel_payload(&payload) {
            SearchResult::Sentinel(payload)
        } else {
            SearchResult::Genuine(payload)
        }
    }

    pub fn is_genuine(&self) -> bool {
        matches!(self, SearchResult::Genuine(_))
    }

    pub fn payload(&self) -> &Value {
        match self {
            SearchResult::Genuine(v) | SearchResult::Sentinel(v) => v,
        }
    }

    pub fn into_payload(self) -> Value {
        match self {
            SearchResult::Genuine(v) | SearchResult::Sentinel(v) => v,
        }
    }
}

/// Something that can run a single search query
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn perform(&self, query: &SearchQuery) -> Result<SearchResult, TravelError>;

    /// Placeholder used when `perform` fails outright
    fn sentinel(&self, query: &SearchQuery) -> SearchResult {
        SearchResult::Sentinel(sentinel_payload(query))
    }
}

/// Run `primary`, then each of `fallbacks` in order, returning the first genuine
/// result. When none is genuine the primary's result is returned.
///
/// A provider error counts as a sentinel for that query only; it never aborts
/// the search. Each query is attempted exactly once.
pub async fn resilient_search<P>(primary: &SearchQuery, fallbacks: &[SearchQuery], provider: &P) -> SearchResult
where
    P: SearchProvider + ?Sized,
{
    let primary_result = attempt(provider, primary).await;
    if primary_result.is_genuine() {
        debug!(query = %primary, "Primary query returned genuine data");
        return primary_result;
    }

    info!(
        query = %primary,
        fallbacks = fallbacks.len(),
        "Primary query returned no genuine data, trying fallbacks"
    );

    for (i, query) in fallbacks.iter().enumerate() {
        let result = attempt(provider, query).await;
        if result.is_genuine() {
            info!(query = %query, position = i, "Fallback query returned genuine data");
            return result;
        }
        debug!(query = %query, position = i, "Fallback query returned sentinel");
    }

    warn!(query = %primary, "No genuine data found, using primary sentinel");
    primary_result
}

async fn attempt<P>(provider: &P, query: &SearchQuery) -> SearchResult
where
    P: SearchProvider + ?Sized,
{
    match provider.perform(query).await {
        Ok(result) => result,
        Err(e) => {
            warn!(query = %query, error = %e, "Search failed, treating as sentinel");
            provider.sentinel(query)
        }
    }
}
