//! Gemini text generation over the public REST API

use crate::session::{Role, Turn};
use crate::TravelError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};

pub const GEMINI_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

/// Something that turns a conversation into a reply
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, system_prompt: Option<&str>, turns: &[Turn]) -> Result<String, TravelError>;

    /// One-shot generation from a single prompt
    async fn generate_text(&self, prompt: &str) -> Result<String, TravelError> {
        self.generate(None, &[Turn::user(prompt)]).await
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize, Debug)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize, Debug)]
struct CandidatePart {
    text: Option<String>,
}

fn wire_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Model => "model",
    }
}

/// Gemini client bound to one model
pub struct GeminiClient {
    http_client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, timeout: std::time::Duration) -> Result<Self, TravelError> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            api_key: api_key.into(),
            model: model.into(),
            base_url: GEMINI_API_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request<'a>(system_prompt: Option<&'a str>, turns: &'a [Turn]) -> GenerateRequest<'a> {
        GenerateRequest {
            system_instruction: system_prompt.map(|text| Content {
                role: None,
                parts: vec![Part { text }],
            }),
            contents: turns
                .iter()
                .map(|turn| Content {
                    role: Some(wire_role(turn.role)),
                    parts: vec![Part { text: &turn.text }],
                })
                .collect(),
        }
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    #[instrument(level = "info", skip(self, system_prompt, turns), fields(turns = turns.len()))]
    async fn generate(&self, system_prompt: Option<&str>, turns: &[Turn]) -> Result<String, TravelError> {
        let url = format!("{}/{}:generateContent", self.base_url, self.model);
        let body = Self::build_request(system_prompt, turns);

        let start_time = std::time::Instant::now();
        let response = self
            .http_client
            .post(&url)
            .query(&[("key", &self.api_key)])
            .json(&body)
            .send()
            .await
            .map_err(|e| TravelError::UpstreamUnavailable(format!("Gemini request failed: {}", e)))?;
        let status = response.status();

        info!(
            model = %self.model,
            status = %status,
            duration_ms = start_time.elapsed().as_millis(),
            "Gemini request completed"
        );

        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            error!(status = %status, detail = %detail, "Gemini request failed");
            return Err(TravelError::UpstreamUnavailable(format!(
                "Gemini returned status {}",
                status
            )));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| TravelError::MalformedUpstreamPayload(format!("Gemini response: {}", e)))?;

        let text = reply_text(parsed)?;
        debug!(reply_length = text.len(), "Gemini reply received");
        Ok(text)
    }
}

fn reply_text(response: GenerateResponse) -> Result<String, TravelError> {
    let content = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .ok_or_else(|| TravelError::MalformedUpstreamPayload("Gemini returned no candidates".to_string()))?;

    let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
    if text.trim().is_empty() {
        return Err(TravelError::MalformedUpstreamPayload("Gemini candidate has no text".to_string()));
    }
    Ok(text.trim().to_string())
}
