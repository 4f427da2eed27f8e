//! Chat sessions that collect travel preferences until a recommendation appears

use crate::extract::{extract_document, ExtractedDocument};
use crate::gemini::TextGenerator;
use crate::TravelError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Keys a reply must contain to count as a recommendation
pub const RECOMMENDATION_KEYS: &[&str] = &["preferences", "recommended_destinations"];

pub const DEFAULT_SESSION_ID: &str = "default";

/// Instructions sent ahead of every conversation
pub const TRAVEL_ASSISTANT_PROMPT: &str = r#"You are a friendly travel recommendation assistant. Your goal is to have a natural, interactive conversation with the user to learn about their travel preferences.

CRITICAL INSTRUCTION: When providing recommendations, you MUST include EXACT and VALID 3-letter IATA airport codes for both departure and arrival locations. For example: LAX for Los Angeles, JFK for New York, CDG for Paris, LHR for London. The application relies on these codes to search for flights. Invalid or missing codes will cause flight search to fail.

Find out where the user is departing from, the exact date of going, the exact date of coming back, and their budget. Ask short questions like "What type of travel experience are you looking for?" or "Do you prefer cultural experiences, adventure, relaxation, or nature?". Ask at most 6 questions and keep replies brief. Only suggest places that have airports.

Clarify anything ambiguous. Once you have enough information, output a final JSON document that summarizes their preferences and lists destination recommendations, with this structure:

{
  "preferences": {
    "interests": [<list of interests>],
    "mood": "<summary of mood/experience desired>",
    "preferred_climate": "<user's climate preference, if provided>",
    "travel_duration": "<duration or date range if mentioned>",
    "budget": "<budget value or range>",
    "additional_details": "<any extra preferences or details>"
  },
  "recommended_destinations": [
    {
      "name": "<Destination Name>",
      "departure_airport_code": "<EXACT AND VALID 3-LETTER IATA DEPARTURE AIRPORT CODE>",
      "arrival_airport_code": "<EXACT AND VALID 3-LETTER IATA ARRIVAL AIRPORT CODE>",
      "reason": "<Why this destination fits the user's preferences>",
      "departure_date": "<YYYY-MM-DD>",
      "arrival_date": "<YYYY-MM-DD>",
      "Hotel_code": "<short text in the exact form \"Hotels in (arrival place name)\">",
      "estimated_cost_range": "<Approximate cost range for a typical trip>"
    }
  ]
}

If the user writes "I want to fly from <departure code> to <arrival code> from <date> to <date> for <x> travelers", only ask about their interests and their budget, then give the JSON.
Once all required details are captured, output only the final JSON."#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// One entry of a conversation transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, text: text.into() }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self { role: Role::Model, text: text.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Still gathering preferences
    Collecting,
    /// A structured recommendation has been produced
    Recommended,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub state: SessionState,
    transcript: Vec<Turn>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: SessionState::Collecting,
            transcript: Vec::new(),
        }
    }

    pub fn transcript(&self) -> &[Turn] {
        &self.transcript
    }

    fn push(&mut self, turn: Turn) {
        self.transcript.push(turn);
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-session transcripts, owned by whoever serves the conversation.
///
/// Turns for the same session id must not run concurrently; the store does no
/// locking of its own.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<String, Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, session_id: &str) -> Option<&Session> {
        self.sessions.get(session_key(session_id))
    }

    fn get_or_create(&mut self, session_id: &str) -> &mut Session {
        self.sessions.entry(session_key(session_id).to_string()).or_default()
    }

    /// Drop a session; the next turn starts from an empty transcript.
    /// Returns whether a session existed.
    pub fn reset(&mut self, session_id: &str) -> bool {
        self.sessions.remove(session_key(session_id)).is_some()
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }
}

fn session_key(session_id: &str) -> &str {
    if session_id.trim().is_empty() {
        DEFAULT_SESSION_ID
    } else {
        session_id
    }
}

/// Result of one chat turn
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub response: String,
    pub is_recommendation: bool,
    pub recommendation_data: Option<Value>,
}

/// Run one user turn through the generator and record both sides.
///
/// When the generator fails the user's message stays in the transcript and the
/// error is returned.
pub async fn chat_turn<G>(
    store: &mut SessionStore,
    generator: &G,
    session_id: &str,
    message: &str,
) -> Result<ChatReply, TravelError>
where
    G: TextGenerator + ?Sized,
{
    run_turn(store.get_or_create(session_id), generator, session_id, message).await
}

async fn run_turn<G>(
    session: &mut Session,
    generator: &G,
    session_id: &str,
    message: &str,
) -> Result<ChatReply, TravelError>
where
    G: TextGenerator + ?Sized,
{
    session.push(Turn::user(message));
    debug!(
        session_id = session_id,
        turns = session.transcript.len(),
        "Sending conversation to generator"
    );

    let reply = match generator.generate(Some(TRAVEL_ASSISTANT_PROMPT), session.transcript()).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!(session_id = session_id, error = %e, "Generation failed for chat turn");
            return Err(e);
        }
    };
    session.push(Turn::model(reply.clone()));

    let (is_recommendation, recommendation_data) = match extract_document(&reply, RECOMMENDATION_KEYS) {
        ExtractedDocument::Structured(map) => {
            session.state = SessionState::Recommended;
            info!(session_id = session_id, "Recommendation produced");
            (true, Some(Value::Object(map)))
        }
        ExtractedDocument::Unstructured { .. } => (false, None),
    };

    Ok(ChatReply {
        response: reply,
        is_recommendation,
        recommendation_data,
    })
}

/// Sessions shared between concurrent callers.
///
/// Each session has its own lock: turns on one session run one at a time,
/// while other sessions, resets and counts never wait on a generator call.
#[derive(Debug, Clone, Default)]
pub struct SharedSessions {
    sessions: Arc<Mutex<HashMap<String, Arc<Mutex<Session>>>>>,
}

impl SharedSessions {
    pub fn new() -> Self {
        Self::default()
    }

    async fn session(&self, session_id: &str) -> Arc<Mutex<Session>> {
        let mut sessions = self.sessions.lock().await;
        sessions
            .entry(session_key(session_id).to_string())
            .or_default()
            .clone()
    }

    pub async fn chat_turn<G>(&self, generator: &G, session_id: &str, message: &str) -> Result<ChatReply, TravelError>
    where
        G: TextGenerator + ?Sized,
    {
        let session = self.session(session_id).await;
        let mut session = session.lock().await;
        run_turn(&mut session, generator, session_id, message).await
    }

    /// Drop a session. A turn already running on it finishes against the
    /// dropped transcript; the next turn starts fresh.
    pub async fn reset(&self, session_id: &str) -> bool {
        self.sessions.lock().await.remove(session_key(session_id)).is_some()
    }

    pub async fn active_sessions(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Snapshot of a session's state and transcript length
    pub async fn describe(&self, session_id: &str) -> Option<(SessionState, usize)> {
        let session = self.sessions.lock().await.get(session_key(session_id)).cloned()?;
        let session = session.lock().await;
        Some((session.state, session.transcript.len()))
    }
}
