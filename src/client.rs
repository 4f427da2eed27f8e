//! HTTP client for SerpApi flight and hotel search

use crate::search::{SearchKind, SearchProvider, SearchQuery, SearchResult};
use crate::TravelError;
use async_trait::async_trait;
use chrono::{Duration, Local, NaiveDate};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, error, info, instrument, warn};

pub const SERPAPI_URL: &str = "https://serpapi.com/search.json";

/// `search_metadata.id` of the synthetic flight payload
pub const MOCK_FLIGHT_SEARCH_ID: &str = "mock_search_id";
/// `search_metadata.id` of the synthetic hotel payload
pub const MOCK_HOTEL_SEARCH_ID: &str = "mock_hotel_search_id";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// SerpApi client for Google Flights and Google Hotels engines
pub struct SerpApiClient {
    http_client: Client,
    api_key: String,
    base_url: String,
}

impl SerpApiClient {
    /// Create a new SerpApi client
    pub fn new(api_key: impl Into<String>, timeout: std::time::Duration) -> Result<Self, TravelError> {
        debug!("Creating new SerpApi client");
        let http_client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            api_key: api_key.into(),
            base_url: SERPAPI_URL.to_string(),
        })
    }

    /// Point the client at a different endpoint (proxies, local stubs)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Run a query and return the raw provider payload.
    #[instrument(level = "info", skip(self, query), fields(engine = query.kind().engine(), query = %query))]
    pub async fn search(&self, query: &SearchQuery) -> Result<Value, TravelError> {
        let mut params: Vec<(&str, &str)> = vec![
            ("engine", query.kind().engine()),
            ("currency", "USD"),
            ("hl", "en"),
            ("api_key", self.api_key.as_str()),
        ];
        params.extend(query.params().iter().map(|(k, v)| (k.as_str(), v.as_str())));

        let start_time = std::time::Instant::now();
        let response = self
            .http_client
            .get(&self.base_url)
            .query(&params)
            .send()
            .await
            .map_err(|e| TravelError::UpstreamUnavailable(format!("SerpApi request failed: {}", e)))?;
        let status = response.status();

        info!(
            status = %status,
            duration_ms = start_time.elapsed().as_millis(),
            "SerpApi request completed"
        );

        let body = response
            .text()
            .await
            .map_err(|e| TravelError::UpstreamUnavailable(format!("SerpApi body read failed: {}", e)))?;

        if !status.is_success() {
            error!(status = %status, body_length = body.len(), "SerpApi request failed");
            return Err(TravelError::UpstreamUnavailable(format!(
                "SerpApi returned status {}",
                status
            )));
        }

        serde_json::from_str(&body)
            .map_err(|e| TravelError::MalformedUpstreamPayload(format!("SerpApi body is not JSON: {}", e)))
    }
}

#[async_trait]
impl SearchProvider for SerpApiClient {
    async fn perform(&self, query: &SearchQuery) -> Result<SearchResult, TravelError> {
        let payload = self.search(query).await?;
        Ok(classify(query, payload))
    }
}

/// Decide whether a provider payload is usable for `query`.
///
/// A payload with an `error` key, or a flight payload with neither flight
/// list, is replaced by the query's sentinel.
pub fn classify(query: &SearchQuery, payload: Value) -> SearchResult {
    if let Some(message) = payload.get("error") {
        warn!(query = %query, error = %message, "SerpApi reported an error");
        return SearchResult::Sentinel(sentinel_payload(query));
    }
    if query.kind() == SearchKind::Flights && !has_flight_lists(&payload) {
        warn!(query = %query, "SerpApi response has no flight lists");
        return SearchResult::Sentinel(sentinel_payload(query));
    }

    SearchResult::from_payload(payload)
}

fn has_flight_lists(payload: &Value) -> bool {
    payload.get("best_flights").is_some() || payload.get("other_flights").is_some()
}

/// Whether a payload carries one of the synthetic search ids.
pub fn is_sentinel_payload(payload: &Value) -> bool {
    matches!(
        payload.pointer("/search_metadata/id").and_then(Value::as_str),
        Some(MOCK_FLIGHT_SEARCH_ID) | Some(MOCK_HOTEL_SEARCH_ID)
    )
}

/// Synthetic payload for a query, shaped like a real provider response.
pub fn sentinel_payload(query: &SearchQuery) -> Value {
    match query.kind() {
        SearchKind::Flights => mock_flight_payload(
            query.get("departure_id").unwrap_or_default(),
            query.get("arrival_id").unwrap_or_default(),
            query.get("outbound_date").unwrap_or_default(),
            query.get("return_date").unwrap_or_default(),
        ),
        SearchKind::Hotels => mock_hotel_payload(
            query.get("q").unwrap_or_default(),
            query.get("check_in_date").unwrap_or_default(),
            query.get("check_out_date").unwrap_or_default(),
        ),
    }
}

struct MockLeg<'a> {
    airline: &'a str,
    logo: &'a str,
    number: &'a str,
    from: &'a str,
    to: &'a str,
    departs: String,
    arrives: String,
    minutes: i64,
}

impl MockLeg<'_> {
    fn to_json(&self) -> Value {
        json!({
            "airline": self.airline,
            "airline_logo": self.logo,
            "flight_number": self.number,
            "departure_airport": { "name": format!("{} Airport", self.from), "time": self.departs },
            "arrival_airport": { "name": format!("{} Airport", self.to), "time": self.arrives },
            "duration": self.minutes,
            "duration_str": format!("{}h {}m", self.minutes / 60, self.minutes % 60),
        })
    }
}

pub fn mock_flight_payload(departure_id: &str, arrival_id: &str, outbound_date: &str, return_date: &str) -> Value {
    let now = Local::now().to_rfc3339();
    let logo = "https://example.com/logo.png";
    let logo2 = "https://example.com/logo2.png";

    json!({
        "search_metadata": {
            "id": MOCK_FLIGHT_SEARCH_ID,
            "status": "Success",
            "json_endpoint": "mock_endpoint",
            "created_at": now,
            "processed_at": now,
            "google_flights_url": "https://www.google.com/travel/flights?hl=en",
            "raw_html_file": "mock_html",
            "total_time_taken": 0.5
        },
        "search_parameters": {
            "engine": "google_flights",
            "departure_id": departure_id,
            "arrival_id": arrival_id,
            "outbound_date": outbound_date,
            "return_date": return_date,
            "currency": "USD"
        },
        "best_flights": [{
            "price": 1250,
            "price_str": "$1,250",
            "total_duration": 1020,
            "flight_time": "17h 0m",
            "flights": [
                MockLeg {
                    airline: "Mock Airlines",
                    logo,
                    number: "MA123",
                    from: departure_id,
                    to: arrival_id,
                    departs: format!("{} 10:00", outbound_date),
                    arrives: format!("{} 19:00", outbound_date),
                    minutes: 540,
                }
                .to_json(),
                MockLeg {
                    airline: "Mock Airlines",
                    logo,
                    number: "MA456",
                    from: arrival_id,
                    to: departure_id,
                    departs: format!("{} 12:00", return_date),
                    arrives: format!("{} 20:00", return_date),
                    minutes: 480,
                }
                .to_json(),
            ]
        }],
        "other_flights": [{
            "price": 1500,
            "price_str": "$1,500",
            "total_duration": 1200,
            "flight_time": "20h 0m",
            "flights": [
                MockLeg {
                    airline: "Mock Express",
                    logo: logo2,
                    number: "ME789",
                    from: departure_id,
                    to: arrival_id,
                    departs: format!("{} 14:00", outbound_date),
                    arrives: format!("{} 23:00", outbound_date),
                    minutes: 540,
                }
                .to_json(),
                MockLeg {
                    airline: "Mock Express",
                    logo: logo2,
                    number: "ME987",
                    from: arrival_id,
                    to: departure_id,
                    departs: format!("{} 09:00", return_date),
                    arrives: format!("{} 20:00", return_date),
                    minutes: 660,
                }
                .to_json(),
            ]
        }]
    })
}

pub fn mock_hotel_payload(hotel_query: &str, check_in_date: &str, check_out_date: &str) -> Value {
    let now = Local::now().to_rfc3339();
    let destination = hotel_query.strip_prefix("Hotels in ").unwrap_or(hotel_query);
    let slug = destination.to_lowercase();

    let property = |name: String, description: String, low: u32, high: u32, rating: &str, image: u32, amenities: &[&str], reviews: u32| {
        json!({
            "name": name,
            "description": description,
            "rate_per_night": { "extracted_lowest": low, "extracted_highest": high },
            "overall_rating": rating,
            "images": [{ "original_image": format!("https://example.com/{}_hotel{}.jpg", slug, image) }],
            "amenities": amenities,
            "reviews": reviews
        })
    };

    json!({
        "search_metadata": {
            "id": MOCK_HOTEL_SEARCH_ID,
            "status": "Success",
            "json_endpoint": "mock_endpoint",
            "created_at": now,
            "processed_at": now,
            "google_hotels_url": format!("https://www.google.com/travel/hotels/{}", destination),
            "raw_html_file": "mock_html",
            "total_time_taken": 0.5
        },
        "search_parameters": {
            "engine": "google_hotels",
            "q": hotel_query,
            "check_in_date": check_in_date,
            "check_out_date": check_out_date,
            "currency": "USD"
        },
        "properties": [
            property(
                format!("Grand Hotel {}", destination),
                format!("Luxury hotel in downtown {}", destination),
                250, 350, "4.5", 1,
                &["Free WiFi", "Pool", "Spa", "Fitness Center", "Restaurant"],
                1250,
            ),
            property(
                format!("{} Plaza Hotel", destination),
                format!("Modern hotel with great views of {}", destination),
                180, 280, "4.3", 2,
                &["Free WiFi", "Pool", "Bar", "Breakfast included"],
                870,
            ),
            property(
                format!("Budget Inn {}", destination),
                format!("Affordable comfort in {}", destination),
                120, 150, "3.8", 3,
                &["Free WiFi", "Free Parking", "Breakfast available"],
                450,
            ),
        ]
    })
}

/// Move a trip into the future when the provider would reject it.
///
/// If the start date is today or earlier, or either date fails to parse, the
/// trip becomes `today + 30` to `today + 37`. Future trips are left alone.
pub fn normalize_trip_dates(start: &str, end: &str, today: NaiveDate) -> (String, String) {
    let parsed = NaiveDate::parse_from_str(start, DATE_FORMAT)
        .and_then(|s| NaiveDate::parse_from_str(end, DATE_FORMAT).map(|e| (s, e)));

    match parsed {
        Ok((start_date, _)) if start_date > today => (start.to_string(), end.to_string()),
        Ok(_) => {
            let (s, e) = default_trip(today);
            info!(outbound = %s, return_date = %e, "Adjusted past trip dates into the future");
            (s, e)
        }
        Err(err) => {
            warn!(start = start, end = end, error = %err, "Could not parse trip dates, using defaults");
            default_trip(today)
        }
    }
}

fn default_trip(today: NaiveDate) -> (String, String) {
    let start = today + Duration::days(30);
    let end = start + Duration::days(7);
    (start.format(DATE_FORMAT).to_string(), end.format(DATE_FORMAT).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    #[test]
    fn test_serpapi_client_creation() {
        let client = SerpApiClient::new("key", std::time::Duration::from_secs(5));
        assert!(client.is_ok());
    }

    #[test]
    fn test_future_dates_unchanged() {
        let (s, e) = normalize_trip_dates("2025-08-15", "2025-08-22", day("2025-01-01"));
        assert_eq!((s.as_str(), e.as_str()), ("2025-08-15", "2025-08-22"));
    }

    #[test]
    fn test_past_dates_moved_forward() {
        let (s, e) = normalize_trip_dates("2024-03-20", "2024-03-27", day("2025-01-01"));
        assert_eq!(s, "2025-01-31");
        assert_eq!(e, "2025-02-07");
    }

    #[test]
    fn test_today_counts_as_past() {
        let (s, _) = normalize_trip_dates("2025-01-01", "2025-01-05", day("2025-01-01"));
        assert_eq!(s, "2025-01-31");
    }

    #[test]
    fn test_invalid_dates_use_defaults() {
        let (s, e) = normalize_trip_dates("next friday", "2025-08-22", day("2025-01-01"));
        assert_eq!(s, "2025-01-31");
        assert_eq!(e, "2025-02-07");
    }

    #[test]
    fn test_mock_flight_payload_is_sentinel() {
        let payload = mock_flight_payload("ZZZ", "YYY", "2025-08-15", "2025-08-22");
        assert!(is_sentinel_payload(&payload));
        assert_eq!(payload["best_flights"][0]["flights"][0]["departure_airport"]["name"], "ZZZ Airport");
        assert_eq!(payload["best_flights"][0]["flights"][1]["duration_str"], "8h 0m");
        assert_eq!(payload["other_flights"][0]["price"], 1500);
    }

    #[test]
    fn test_mock_hotel_payload_strips_prefix() {
        let payload = mock_hotel_payload("Hotels in Austin", "2025-08-15", "2025-08-22");
        assert!(is_sentinel_payload(&payload));
        assert_eq!(payload["properties"][0]["name"], "Grand Hotel Austin");
        assert_eq!(payload["properties"][2]["images"][0]["original_image"], "https://example.com/austin_hotel3.jpg");
        assert_eq!(payload["search_parameters"]["q"], "Hotels in Austin");
    }

    #[test]
    fn test_live_payload_not_sentinel() {
        let payload = json!({ "search_metadata": { "id": "66a1f0" }, "best_flights": [] });
        assert!(!is_sentinel_payload(&payload));
        assert!(!is_sentinel_payload(&json!({})));
    }

    #[test]
    fn test_error_payload_becomes_sentinel() {
        let query = SearchQuery::flights("LAX", "JFK", "2025-08-15", "2025-08-22");
        let result = classify(&query, json!({ "error": "Invalid API key.", "best_flights": [] }));

        assert!(!result.is_genuine());
        assert_eq!(result.payload()["search_metadata"]["id"], MOCK_FLIGHT_SEARCH_ID);
        assert_eq!(result.payload()["search_parameters"]["departure_id"], "LAX");

        let hotels = SearchQuery::hotels("Hotels in Paris", "2025-08-15", "2025-08-22");
        let result = classify(&hotels, json!({ "error": "Google Hotels hasn't returned any results" }));
        assert_eq!(result.payload()["search_metadata"]["id"], MOCK_HOTEL_SEARCH_ID);
    }

    #[test]
    fn test_flights_without_lists_become_sentinel() {
        let query = SearchQuery::flights("ZZZ", "ZZZ", "2025-08-15", "2025-08-22");
        let result = classify(&query, json!({ "search_metadata": { "id": "66a1f0" }, "price_insights": {} }));

        assert!(!result.is_genuine());
        assert!(is_sentinel_payload(result.payload()));
    }

    #[test]
    fn test_flights_with_either_list_are_genuine() {
        let query = SearchQuery::flights("LAX", "JFK", "2025-08-15", "2025-08-22");

        let only_other = json!({ "search_metadata": { "id": "66a1f0" }, "other_flights": [] });
        let result = classify(&query, only_other.clone());
        assert!(result.is_genuine());
        assert_eq!(result.into_payload(), only_other);

        let only_best = json!({ "search_metadata": { "id": "66a1f1" }, "best_flights": [{ "price": 300 }] });
        assert!(classify(&query, only_best).is_genuine());
    }

    #[test]
    fn test_hotels_without_error_are_genuine() {
        let query = SearchQuery::hotels("Hotels in Paris", "2025-08-15", "2025-08-22");
        let payload = json!({ "search_metadata": { "id": "7b2e" }, "properties": [] });

        let result = classify(&query, payload.clone());
        assert!(result.is_genuine());
        assert_eq!(result.into_payload(), payload);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_upstream_unavailable() {
        let client = SerpApiClient::new("key", std::time::Duration::from_secs(2))
            .unwrap()
            .with_base_url("http://127.0.0.1:9/search.json");
        let query = SearchQuery::flights("LAX", "JFK", "2025-08-15", "2025-08-22");

        match client.perform(&query).await {
            Err(e) => assert!(e.is_recoverable(), "unexpected error: {}", e),
            Ok(result) => panic!("expected failure, got {:?}", result),
        }
    }
}
