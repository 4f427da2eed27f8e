//! Travel data fetch and itinerary generation
//!
//! Ties the search and generation providers to the file store: flights go
//! through [`resilient_search`] with the configured fallback routes, hotels get
//! a single attempt, and itineraries are extracted from Gemini's reply.

use crate::client::{normalize_trip_dates, SerpApiClient};
use crate::config::{Config, Route};
use crate::extract::{extract_document, ExtractedDocument};
use crate::gemini::{GeminiClient, TextGenerator};
use crate::search::{resilient_search, FallbackList, SearchProvider, SearchQuery};
use crate::store::{FileStore, FLIGHT_FILE, HOTEL_FILE, ITINERARY_FILE};
use crate::TravelError;
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

pub const DEFAULT_USER_PREFERENCES: &str = "Cultural experiences, local cuisine, and historical sites";

/// Cities recognized in hotel names when the description does not name one
const KNOWN_CITIES: &[&str] = &["Austin", "New York", "Paris", "Tokyo", "London", "Los Angeles"];

/// Airport-to-city names used to build a hotel query when none was given
const AIRPORT_CITIES: &[(&str, &str)] = &[
    ("AUS", "Austin"),
    ("LAX", "Los Angeles"),
    ("JFK", "New York"),
    ("LHR", "London"),
    ("CDG", "Paris"),
    ("NRT", "Tokyo"),
    ("SFO", "San Francisco"),
];

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Route, dates and hotel query picked by the user
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TravelSelection {
    pub departure_id: Option<String>,
    pub arrival_id: Option<String>,
    pub outbound_date: Option<String>,
    pub return_date: Option<String>,
    pub hotel_query: Option<String>,
}

impl TravelSelection {
    /// Check that every field is present and non-empty, naming all that are not.
    pub fn validate(&self) -> Result<(), TravelError> {
        let fields = [
            ("departure_id", &self.departure_id),
            ("arrival_id", &self.arrival_id),
            ("outbound_date", &self.outbound_date),
            ("return_date", &self.return_date),
            ("hotel_query", &self.hotel_query),
        ];
        let missing: Vec<&str> = fields
            .iter()
            .filter(|(_, value)| non_empty(value).is_none())
            .map(|(name, _)| *name)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(TravelError::MissingRequiredField(missing.join(", ")))
        }
    }

    /// Fill in `hotel_query` from the arrival airport when it is missing.
    pub fn with_default_hotel_query(mut self) -> Self {
        if non_empty(&self.hotel_query).is_none() {
            if let Some(arrival) = non_empty(&self.arrival_id) {
                self.hotel_query = Some(hotel_query_for(arrival));
            }
        }
        self
    }
}

/// `"Hotels in <city>"` for a known airport, or the code itself otherwise
pub fn hotel_query_for(airport_code: &str) -> String {
    let code = airport_code.trim().to_uppercase();
    let city = AIRPORT_CITIES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, city)| (*city).to_string())
        .unwrap_or(code);
    format!("Hotels in {}", city)
}

/// Outcome of fetching flights and hotels for a selection
#[derive(Debug, Clone, Serialize)]
pub struct TravelData {
    pub flight_path: PathBuf,
    pub hotel_path: PathBuf,
    pub flights_genuine: bool,
    pub hotels_genuine: bool,
    pub flight_data: Value,
    pub hotel_data: Value,
}

/// Chosen flight and hotel plus the trip window for itinerary generation
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItineraryRequest {
    pub selected_flight: Option<Value>,
    pub selected_hotel: Option<Value>,
    pub outbound_date: Option<String>,
    pub return_date: Option<String>,
    pub user_preferences: Option<String>,
}

impl ItineraryRequest {
    pub fn validate(&self) -> Result<(), TravelError> {
        let mut missing = Vec::new();
        if self.selected_flight.as_ref().map_or(true, Value::is_null) {
            missing.push("selectedFlight");
        }
        if self.selected_hotel.as_ref().map_or(true, Value::is_null) {
            missing.push("selectedHotel");
        }
        if non_empty(&self.outbound_date).is_none() {
            missing.push("outboundDate");
        }
        if non_empty(&self.return_date).is_none() {
            missing.push("returnDate");
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(TravelError::MissingRequiredField(missing.join(", ")))
        }
    }
}

/// Facts about the trip that go into the itinerary prompt
#[derive(Debug, Clone, PartialEq)]
pub struct TripSummary {
    pub destination: Option<String>,
    pub outbound_date: String,
    pub return_date: String,
    pub nights: i64,
    pub flight_summary: String,
    pub hotel_summary: String,
    pub user_preferences: String,
    pub total_cost: f64,
}

impl TripSummary {
    pub fn from_request(request: &ItineraryRequest) -> Result<Self, TravelError> {
        request.validate()?;

        let null = Value::Null;
        let flight = request.selected_flight.as_ref().unwrap_or(&null);
        let hotel = request.selected_hotel.as_ref().unwrap_or(&null);
        let outbound_date = non_empty(&request.outbound_date).unwrap_or_default().to_string();
        let return_date = non_empty(&request.return_date).unwrap_or_default().to_string();

        let nights = nights_between(&outbound_date, &return_date)?;
        let hotel_rate = hotel.pointer("/rate_per_night/extracted_lowest");
        let rate_text = hotel_rate.map(display_value).unwrap_or_else(|| "N/A".to_string());
        let hotel_name = hotel.get("name").map(display_value).unwrap_or_else(|| "N/A".to_string());

        let flight_price = flight.get("price").map_or(0.0, as_number);
        let rate = hotel_rate.map_or(0.0, as_number);
        let total_cost = flight_price + rate * nights as f64;

        Ok(Self {
            destination: destination_from_hotel(hotel),
            outbound_date,
            return_date,
            nights,
            flight_summary: flight_summary(flight),
            hotel_summary: format!("Staying at {} (Rate per night: {} USD)", hotel_name, rate_text),
            user_preferences: non_empty(&request.user_preferences)
                .unwrap_or(DEFAULT_USER_PREFERENCES)
                .to_string(),
            total_cost,
        })
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn as_number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().replace(&['$', ','][..], "").parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn nights_between(start: &str, end: &str) -> Result<i64, TravelError> {
    let parse = |s: &str| {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map_err(|e| TravelError::DateParseError(format!("{}: {}", s, e)))
    };
    let nights = (parse(end)? - parse(start)?).num_days();
    Ok(nights.max(0))
}

/// One line per segment: `"{airline} {number}: {from} at {time} -> {to} at {time}; "`
pub fn flight_summary(flight: &Value) -> String {
    let field = |seg: &Value, path: &str| {
        seg.pointer(path).map(display_value).unwrap_or_else(|| "N/A".to_string())
    };

    flight
        .get("flights")
        .and_then(Value::as_array)
        .map(|segments| {
            segments
                .iter()
                .map(|seg| {
                    format!(
                        "{} {}: {} at {} -> {} at {}; ",
                        field(seg, "/airline"),
                        field(seg, "/flight_number"),
                        field(seg, "/departure_airport/name"),
                        field(seg, "/departure_airport/time"),
                        field(seg, "/arrival_airport/name"),
                        field(seg, "/arrival_airport/time"),
                    )
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Guess the destination city from a hotel entry.
///
/// The word right after the first `"in "` of the lower-cased description wins;
/// otherwise the first known city that appears in the hotel name.
pub fn destination_from_hotel(hotel: &Value) -> Option<String> {
    let from_description = hotel
        .get("description")
        .and_then(Value::as_str)
        .map(str::to_lowercase)
        .and_then(|description| {
            let (_, rest) = description.split_once("in ")?;
            rest.split_whitespace().next().map(str::to_string)
        });
    if from_description.is_some() {
        return from_description;
    }

    let name = hotel.get("name").and_then(Value::as_str)?.to_lowercase();
    KNOWN_CITIES
        .iter()
        .find(|city| name.contains(&city.to_lowercase()))
        .map(|city| city.to_string())
}

pub fn build_itinerary_prompt(trip: &TripSummary) -> String {
    let destination = trip.destination.as_deref().unwrap_or("the city of your hotel");
    let total_cost = format!("{:.2}", trip.total_cost);

    format!(
        r##"You are a travel itinerary planner creating a detailed, visually appealing travel plan.

DESTINATION DETAILS:
- Primary destination: {destination}
- Travel dates: {outbound} to {ret} (total of {nights} nights)
- Flight details: {flights}
- Accommodation: {hotel}
- User preferences: {prefs}
- Total estimated cost: {total_cost} USD

CREATE A DAILY ITINERARY with the following elements for each day:
1. Day number, date (YYYY-MM-DD), and a creative day title that captures the theme
2. Morning activities (3-4 hours) with specific locations, opening hours, and transportation suggestions
3. Lunch recommendations with specific restaurant names, cuisine type, and price range ($ to $$$)
4. Afternoon activities (3-4 hours) with specific locations, opening hours, transportation
5. Dinner recommendations with specific restaurant names, cuisine type, and price range
6. Evening activities or entertainment options with timing suggestions
7. Optional insider tips or cultural notes for each day

ALSO INCLUDE:
- The estimated time to spend at each attraction
- At least one iconic photo opportunity each day
- Arrival time on the first day and departure time on the last day, based on the flights
- One free time period each day
- Realistic transportation between activities (public transit, walking, rideshare)
- A color theme matching the destination (hex codes for primary, secondary and accent) and an icon per day

Your response must be valid JSON without markdown formatting or explanation, in this format:
{{
  "destination_info": {{
    "name": "Full destination name",
    "country": "Country",
    "best_season": "When it's best to visit",
    "language": "Primary language",
    "currency": "Local currency",
    "theme_colors": {{ "primary": "#hexcode", "secondary": "#hexcode", "accent": "#hexcode" }}
  }},
  "itinerary": {{
    "day_1": {{
      "date": "YYYY-MM-DD",
      "title": "Creative day title",
      "icon": "Suggested icon name (e.g., 'museum', 'beach', 'hiking')",
      "morning": {{ "activity": "", "location": "", "duration": "", "opening_hours": "", "transportation": "", "photo_opportunity": "" }},
      "lunch": {{ "recommendation": "", "cuisine": "", "price_range": "$-$$$", "address": "", "special_dish": "" }},
      "afternoon": {{ "activity": "", "location": "", "duration": "", "opening_hours": "", "transportation": "" }},
      "dinner": {{ "recommendation": "", "cuisine": "", "price_range": "$-$$$", "address": "", "special_dish": "" }},
      "evening": {{ "activity": "", "location": "", "notes": "" }},
      "tips": "Insider advice for this day"
    }},
    "day_2": {{ ... }}
  }},
  "practical_info": {{
    "emergency_numbers": "Local emergency contacts",
    "transportation_tips": "Advice on getting around",
    "packing_suggestions": ["Item 1", "Item 2"],
    "local_customs": "Important cultural notes",
    "useful_phrases": ["Phrase 1: Translation"]
  }},
  "total_cost": "{total_cost} USD"
}}

Output only valid JSON."##,
        destination = destination,
        outbound = trip.outbound_date,
        ret = trip.return_date,
        nights = trip.nights,
        flights = trip.flight_summary,
        hotel = trip.hotel_summary,
        prefs = trip.user_preferences,
        total_cost = total_cost,
    )
}

/// `day_N` entries of an itinerary in numeric order
pub fn sorted_days(itinerary: &Value) -> Vec<(u32, &Value)> {
    let mut days: Vec<(u32, &Value)> = itinerary
        .get("itinerary")
        .and_then(Value::as_object)
        .map(|days| {
            days.iter()
                .filter_map(|(key, day)| {
                    key.strip_prefix("day_")
                        .and_then(|n| n.parse::<u32>().ok())
                        .map(|n| (n, day))
                })
                .collect()
        })
        .unwrap_or_default();
    days.sort_by_key(|(n, _)| *n);
    days
}

/// Up to three flight options, preferring `best_flights`
pub fn flight_options(flight_data: &Value) -> Vec<Value> {
    let list = |key: &str| {
        flight_data
            .get(key)
            .and_then(Value::as_array)
            .filter(|l| !l.is_empty())
            .cloned()
    };
    list("best_flights")
        .or_else(|| list("other_flights"))
        .unwrap_or_default()
        .into_iter()
        .take(3)
        .collect()
}

/// Up to three hotel options from `properties`
pub fn hotel_options(hotel_data: &Value) -> Vec<Value> {
    hotel_data
        .get("properties")
        .and_then(Value::as_array)
        .map(|l| l.iter().take(3).cloned().collect())
        .unwrap_or_default()
}

/// Search and generation providers bound to a file store.
///
/// Either provider may be absent; using a missing one is a configuration error.
#[derive(Clone)]
pub struct TravelPlanner {
    search: Option<Arc<dyn SearchProvider>>,
    generator: Option<Arc<dyn TextGenerator>>,
    store: FileStore,
    fallback_routes: Vec<Route>,
}

impl TravelPlanner {
    pub fn new(
        search: Arc<dyn SearchProvider>,
        generator: Arc<dyn TextGenerator>,
        store: FileStore,
        fallback_routes: Vec<Route>,
    ) -> Self {
        Self {
            search: Some(search),
            generator: Some(generator),
            store,
            fallback_routes,
        }
    }

    /// Build a planner on SerpApi and Gemini, with whichever API keys are set.
    pub fn from_config(config: &Config) -> Result<Self, TravelError> {
        let search = config
            .serpapi_api_key
            .as_deref()
            .map(|key| SerpApiClient::new(key, config.http_timeout).map(|c| Arc::new(c) as Arc<dyn SearchProvider>))
            .transpose()?;
        let generator = config
            .gemini_api_key
            .as_deref()
            .map(|key| {
                GeminiClient::new(key, config.gemini_model.clone(), config.http_timeout)
                    .map(|c| Arc::new(c) as Arc<dyn TextGenerator>)
            })
            .transpose()?;

        if search.is_none() {
            warn!("SERPAPI_API_KEY is not set, travel data searches will fail");
        }
        if generator.is_none() {
            warn!("GEMINI_API_KEY is not set, chat and itineraries will fail");
        }

        Ok(Self {
            search,
            generator,
            store: FileStore::new(config.output_dir.clone(), config.mirror_dir.clone()),
            fallback_routes: config.fallback_routes.clone(),
        })
    }

    pub fn search_provider(&self) -> Result<&dyn SearchProvider, TravelError> {
        self.search
            .as_deref()
            .ok_or_else(|| TravelError::Config("SERPAPI_API_KEY is not set".to_string()))
    }

    pub fn generator(&self) -> Result<&dyn TextGenerator, TravelError> {
        self.generator
            .as_deref()
            .ok_or_else(|| TravelError::Config("GEMINI_API_KEY is not set".to_string()))
    }

    pub fn store(&self) -> &FileStore {
        &self.store
    }

    fn fallback_queries(&self, outbound_date: &str, return_date: &str) -> FallbackList {
        self.fallback_routes
            .iter()
            .map(|route| SearchQuery::flights(&route.departure, &route.arrival, outbound_date, return_date))
            .collect()
    }

    /// Search flights (with fallbacks) and hotels, then save both payloads.
    #[instrument(level = "info", skip(self, selection))]
    pub async fn fetch_travel_data(&self, selection: &TravelSelection) -> Result<TravelData, TravelError> {
        selection.validate()?;
        let search = self.search_provider()?;

        let departure_id = non_empty(&selection.departure_id).unwrap_or_default();
        let arrival_id = non_empty(&selection.arrival_id).unwrap_or_default();
        let hotel_query = non_empty(&selection.hotel_query).unwrap_or_default();
        let (outbound_date, return_date) = normalize_trip_dates(
            non_empty(&selection.outbound_date).unwrap_or_default(),
            non_empty(&selection.return_date).unwrap_or_default(),
            Local::now().date_naive(),
        );

        info!(
            departure_id = departure_id,
            arrival_id = arrival_id,
            outbound_date = %outbound_date,
            return_date = %return_date,
            hotel_query = hotel_query,
            "Fetching travel data"
        );

        let primary = SearchQuery::flights(departure_id, arrival_id, &outbound_date, &return_date);
        let fallbacks = self.fallback_queries(&outbound_date, &return_date);
        let flights = resilient_search(&primary, &fallbacks, search).await;

        let hotel_search = SearchQuery::hotels(hotel_query, &outbound_date, &return_date);
        let hotels = resilient_search(&hotel_search, &[], search).await;

        let flights_genuine = flights.is_genuine();
        let hotels_genuine = hotels.is_genuine();
        let flight_data = flights.into_payload();
        let hotel_data = hotels.into_payload();

        let flight_path = self.store.save_json(FLIGHT_FILE, &flight_data)?;
        let hotel_path = self.store.save_json(HOTEL_FILE, &hotel_data)?;

        info!(
            flights_genuine = flights_genuine,
            hotels_genuine = hotels_genuine,
            "Travel data saved"
        );

        Ok(TravelData {
            flight_path,
            hotel_path,
            flights_genuine,
            hotels_genuine,
            flight_data,
            hotel_data,
        })
    }

    /// Ask the generator for a day-by-day itinerary and save it.
    #[instrument(level = "info", skip(self, request))]
    pub async fn generate_itinerary(&self, request: &ItineraryRequest) -> Result<Value, TravelError> {
        let trip = TripSummary::from_request(request)?;
        let generator = self.generator()?;
        debug!(
            destination = trip.destination.as_deref().unwrap_or("unknown"),
            nights = trip.nights,
            total_cost = trip.total_cost,
            "Built trip summary"
        );

        let prompt = build_itinerary_prompt(&trip);
        let reply = generator.generate_text(&prompt).await?;

        let itinerary = match extract_document(&reply, &["itinerary"]) {
            ExtractedDocument::Structured(map) => Value::Object(map),
            ExtractedDocument::Unstructured { error, .. } => {
                let message = error.unwrap_or_else(|| "itinerary is not structured".to_string());
                error!(error = %message, reply_length = reply.len(), "Could not parse itinerary");
                return Err(TravelError::GenerationParseFailure(message));
            }
        };

        self.store.save_json(ITINERARY_FILE, &itinerary)?;
        info!(days = sorted_days(&itinerary).len(), "Itinerary generated");
        Ok(itinerary)
    }
}
