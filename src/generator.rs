//src/generator.rs
//! Text generation capability used by plan ingestion.
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::{self, GeneratorConfig};
use crate::error::Error;

/// Accepts a prompt and returns the raw generated text.
pub trait Generator {
    fn generate(&self, prompt: &str) -> Result<String, Error>;
}

#[derive(Debug, Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
}

/// `Generator` backed by the Gemini `generateContent` endpoint.
pub struct GeminiGenerator {
    client: reqwest::blocking::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl GeminiGenerator {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: api_key.into(),
        }
    }

    /// Builds a generator from config, reading the key from the configured environment variable.
    pub fn from_config(config: &GeneratorConfig) -> Result<Self, config::Error> {
        let api_key = config.api_key()?;
        Ok(Self::new(&config.endpoint, &config.model, api_key))
    }

    fn build_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.endpoint.trim_end_matches('/'),
            self.model,
            self.api_key
        )
    }
}

impl Generator for GeminiGenerator {
    fn generate(&self, prompt: &str) -> Result<String, Error> {
        let body = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![RequestPart { text: prompt }],
            }],
        };
        debug!(model = %self.model, prompt_len = prompt.len(), "requesting generated plan");

        let response = self
            .client
            .post(self.build_url())
            .json(&body)
            .send()
            .map_err(|e| {
                error!(error = %e, "generation request failed");
                Error::generation(e.to_string())
            })?;
        let status = response.status();
        let text = response
            .text()
            .map_err(|e| Error::generation(e.to_string()))?;
        extract_text(status.is_success(), &text)
    }
}

/// Pulls the first candidate's text out of a raw response body.
fn extract_text(success: bool, body: &str) -> Result<String, Error> {
    let parsed = serde_json::from_str::<GeminiResponse>(body);

    if !success {
        let message = parsed
            .ok()
            .and_then(|r| r.error)
            .map_or_else(|| body.trim().to_string(), |e| e.message);
        error!(%message, "generation service returned an error");
        return Err(Error::Generation(message));
    }

    let parsed = parsed.map_err(|e| Error::generation(format!("malformed response: {e}")))?;
    if let Some(err) = parsed.error {
        return Err(Error::Generation(err.message));
    }

    let candidate = parsed
        .candidates
        .and_then(|c| c.into_iter().next())
        .ok_or_else(|| Error::generation("no candidates in response"))?;

    candidate
        .content
        .and_then(|c| c.parts.into_iter().find_map(|p| p.text))
        .ok_or_else(|| Error::generation("no text content in response"))
}
