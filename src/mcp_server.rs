// src/mcp_server.rs

use anyhow::Result;
use rmcp::{
    model::{ServerCapabilities, ServerInfo},
    schemars, tool,
    transport::stdio,
    ServerHandler, ServiceExt,
};
use rust_wander::session::DEFAULT_SESSION_ID;
use rust_wander::store::{FLIGHT_FILE, HOTEL_FILE, ITINERARY_FILE};
use rust_wander::{Config, ItineraryRequest, SharedSessions, TravelData, TravelError, TravelPlanner, TravelSelection};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Travel planning MCP server
#[derive(Clone)]
pub struct WanderServer {
    planner: TravelPlanner,
    sessions: SharedSessions,
}

impl WanderServer {
    pub fn new(planner: TravelPlanner) -> Self {
        Self {
            planner,
            sessions: SharedSessions::new(),
        }
    }

    /// Initialize logging to file
    fn init_logging() -> Result<()> {
        let log_dir = PathBuf::from("logs");
        std::fs::create_dir_all(&log_dir)?;

        let file_appender = tracing_appender::rolling::daily(&log_dir, "rust-wander-mcp.log");

        // stdout carries the MCP protocol, so logs only go to the file
        tracing_subscriber::registry()
            .with(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("info"))
                    .add_directive("rust_wander=debug".parse()?),
            )
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(file_appender)
                    .with_ansi(false)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .json(),
            )
            .init();

        info!("Logging initialized - logs will be written to logs/rust-wander-mcp.log.*");
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone, schemars::JsonSchema)]
pub struct ChatParams {
    #[schemars(description = "The user's message to the travel assistant")]
    pub message: String,
    #[schemars(description = "Conversation identifier (default: 'default')")]
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize, Clone, schemars::JsonSchema)]
pub struct FetchTravelDataParams {
    #[schemars(description = "Departure airport code (e.g., LAX)")]
    pub departure_id: Option<String>,
    #[schemars(description = "Arrival airport code (e.g., JFK)")]
    pub arrival_id: Option<String>,
    #[schemars(description = "Outbound date in YYYY-MM-DD format")]
    pub outbound_date: Option<String>,
    #[schemars(description = "Return date in YYYY-MM-DD format")]
    pub return_date: Option<String>,
    #[schemars(description = "Hotel search query (e.g., 'Hotels in Austin')")]
    pub hotel_query: Option<String>,
}

impl From<FetchTravelDataParams> for TravelSelection {
    fn from(params: FetchTravelDataParams) -> Self {
        TravelSelection {
            departure_id: params.departure_id,
            arrival_id: params.arrival_id,
            outbound_date: params.outbound_date,
            return_date: params.return_date,
            hotel_query: params.hotel_query,
        }
    }
}

#[derive(Debug, Deserialize, Clone, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateItineraryParams {
    #[schemars(description = "One flight option object as returned by fetch_travel_data")]
    pub selected_flight: Option<Value>,
    #[schemars(description = "One hotel property object as returned by fetch_travel_data")]
    pub selected_hotel: Option<Value>,
    #[schemars(description = "Outbound date in YYYY-MM-DD format")]
    pub outbound_date: Option<String>,
    #[schemars(description = "Return date in YYYY-MM-DD format")]
    pub return_date: Option<String>,
    #[schemars(description = "Free-text travel preferences")]
    pub user_preferences: Option<String>,
}

impl From<GenerateItineraryParams> for ItineraryRequest {
    fn from(params: GenerateItineraryParams) -> Self {
        ItineraryRequest {
            selected_flight: params.selected_flight,
            selected_hotel: params.selected_hotel,
            outbound_date: params.outbound_date,
            return_date: params.return_date,
            user_preferences: params.user_preferences,
        }
    }
}

#[derive(Debug, Deserialize, Clone, schemars::JsonSchema)]
pub struct ResetSessionParams {
    #[schemars(description = "Conversation identifier to clear (default: 'default')")]
    pub session_id: Option<String>,
}

fn error_response(err: &TravelError) -> String {
    json!({ "status": "error", "message": err.to_string() }).to_string()
}

fn fetch_response(data: &TravelData, copied: bool) -> Value {
    json!({
        "status": "success",
        "message": "Data fetched and saved successfully",
        "flights_genuine": data.flights_genuine,
        "hotels_genuine": data.hotels_genuine,
        "files": {
            "flight": data.flight_path.display().to_string(),
            "hotel": data.hotel_path.display().to_string(),
        },
        "files_copied": copied,
        "flight_data": data.flight_data,
        "hotel_data": data.hotel_data,
    })
}

fn to_json_string(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| {
        format!(r#"{{"status": "error", "message": "Failed to serialize results: {}"}}"#, e)
    })
}

#[tool(tool_box)]
impl WanderServer {
    #[tool(description = "Send a message to the travel assistant. Once it has learned enough it returns isRecommendation=true with recommended destinations in recommendationData.")]
    async fn chat(&self, #[tool(aggr)] params: ChatParams) -> String {
        let session_id = params.session_id.as_deref().unwrap_or(DEFAULT_SESSION_ID);
        info!(session_id = session_id, message_length = params.message.len(), "chat called");

        let generator = match self.planner.generator() {
            Ok(generator) => generator,
            Err(e) => return error_response(&e),
        };

        match self.sessions.chat_turn(generator, session_id, &params.message).await {
            Ok(reply) => match serde_json::to_value(&reply) {
                Ok(value) => to_json_string(&value),
                Err(e) => error_response(&TravelError::Json(e)),
            },
            Err(e) => {
                error!(session_id = session_id, error = %e, "chat failed");
                error_response(&e)
            }
        }
    }

    #[tool(description = "Search flights and hotels for a route and date range. Falls back to alternative routes and sample data when no live results exist. Saves test_flight.json and test.json.")]
    async fn fetch_travel_data(&self, #[tool(aggr)] params: FetchTravelDataParams) -> String {
        let selection = TravelSelection::from(params);
        info!(
            departure_id = selection.departure_id.as_deref(),
            arrival_id = selection.arrival_id.as_deref(),
            hotel_query = selection.hotel_query.as_deref(),
            "fetch_travel_data called"
        );

        let data = match self.planner.fetch_travel_data(&selection).await {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "fetch_travel_data failed");
                return error_response(&e);
            }
        };

        let copied = self.planner.store().mirror_all(&[HOTEL_FILE, FLIGHT_FILE, ITINERARY_FILE]);
        debug!(copied = copied, "Mirrored output files");

        to_json_string(&fetch_response(&data, copied))
    }

    #[tool(description = "Generate a day-by-day itinerary for a selected flight and hotel. Saves itinerary.json and returns the itinerary JSON.")]
    async fn generate_itinerary(&self, #[tool(aggr)] params: GenerateItineraryParams) -> String {
        let request = ItineraryRequest::from(params);
        info!(
            outbound_date = request.outbound_date.as_deref(),
            return_date = request.return_date.as_deref(),
            "generate_itinerary called"
        );

        match self.planner.generate_itinerary(&request).await {
            Ok(itinerary) => to_json_string(&itinerary),
            Err(e) => {
                error!(error = %e, "generate_itinerary failed");
                error_response(&e)
            }
        }
    }

    #[tool(description = "Clear a conversation so the next chat message starts fresh.")]
    async fn reset_session(&self, #[tool(aggr)] params: ResetSessionParams) -> String {
        let session_id = params.session_id.as_deref().unwrap_or(DEFAULT_SESSION_ID);
        let existed = self.sessions.reset(session_id).await;
        info!(session_id = session_id, existed = existed, "Session reset");

        json!({ "status": "success", "session_id": session_id, "existed": existed }).to_string()
    }

    #[tool(description = "Report service status and the number of active chat sessions.")]
    async fn health(&self) -> String {
        let active_sessions = self.sessions.active_sessions().await;
        json!({ "status": "ok", "service": "WanderAI", "active_sessions": active_sessions }).to_string()
    }
}

#[tool(tool_box)]
impl ServerHandler for WanderServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some("A travel planning server. Use chat to gather preferences and get destination recommendations, fetch_travel_data to search flights and hotels, then generate_itinerary for a chosen flight and hotel. Results are JSON strings; failures carry status=error and a message.".into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = WanderServer::init_logging() {
        eprintln!("Failed to initialize logging: {}", e);
    }

    info!("Starting MCP Wander Server");

    let config = Config::from_env()?;
    let planner = TravelPlanner::from_config(&config)?;
    let server = WanderServer::new(planner);

    let service = server.serve(stdio()).await?;
    info!("MCP service started, waiting for requests");

    service.waiting().await?;

    info!("MCP service shutting down");
    Ok(())
}
