// ============================================================================
// analyzer.rs — Luxtree
// Boundary to the remote vision classifier: the Analyzer trait, its result
// types, and a Gemini generateContent client.
// ============================================================================

use std::future::Future;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use serde_json::json;

use crate::control::PositionSignal;

// ======================== Analyzer Contract ========================

/// Hand classification returned by the analyzer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Gesture {
    Open,
    Closed,
    #[serde(other)]
    Unknown,
}

/// One analyzer answer: a classification plus the hand's center in the frame.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub struct HandReading {
    #[serde(rename = "state")]
    pub gesture: Gesture,
    #[serde(default)]
    pub position: PositionSignal,
}

impl HandReading {
    pub fn unknown() -> Self {
        Self {
            gesture: Gesture::Unknown,
            position: PositionSignal::default(),
        }
    }
}

/// A mirrored, JPEG-compressed frame ready for analysis.
#[derive(Clone, Debug)]
pub struct EncodedFrame {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl EncodedFrame {
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.jpeg)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AnalyzeError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("no response within {0:?}")]
    Timeout(Duration),
}

/// Anything that can classify an encoded frame.
pub trait Analyzer: Send + Sync + 'static {
    fn analyze(
        &self,
        frame: EncodedFrame,
    ) -> impl Future<Output = Result<HandReading, AnalyzeError>> + Send;
}

// ======================== Gemini Client ========================

pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

const PROMPT: &str = "\
Classify the user's hand in this image for a 3D gesture controller.
1. state: 'OPEN' if the fingers are spread or the palm is visible, 'CLOSED' for a fist \
or grabbing pose, 'UNKNOWN' if no hand is clearly visible.
2. position: the hand's center relative to the frame center, x from -1.0 (left) to 1.0 \
(right), y from -1.0 (bottom) to 1.0 (top). Use 0,0 when there is no hand.";

pub struct GeminiAnalyzer {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl GeminiAnalyzer {
    pub fn new(endpoint: &str, model: &str, api_key: String, timeout: Duration) -> Result<Self, AnalyzeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AnalyzeError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: generate_content_url(endpoint, model),
            api_key,
        })
    }
}

impl Analyzer for GeminiAnalyzer {
    async fn analyze(&self, frame: EncodedFrame) -> Result<HandReading, AnalyzeError> {
        let response = self
            .client
            .post(&self.url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body(&frame))
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        let body = response.text().await.map_err(map_reqwest_error)?;
        if !status.is_success() {
            return Err(AnalyzeError::Status {
                status: status.as_u16(),
                body: truncate(&body, 200),
            });
        }

        parse_generate_content(&body)
    }
}

fn generate_content_url(endpoint: &str, model: &str) -> String {
    format!(
        "{}/v1beta/models/{}:generateContent",
        endpoint.trim_end_matches('/'),
        model
    )
}

fn request_body(frame: &EncodedFrame) -> serde_json::Value {
    json!({
        "contents": [{
            "parts": [
                { "inlineData": { "mimeType": "image/jpeg", "data": frame.to_base64() } },
                { "text": PROMPT },
            ]
        }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": {
                "type": "OBJECT",
                "properties": {
                    "state": { "type": "STRING", "enum": ["OPEN", "CLOSED", "UNKNOWN"] },
                    "position": {
                        "type": "OBJECT",
                        "properties": {
                            "x": { "type": "NUMBER" },
                            "y": { "type": "NUMBER" },
                        },
                        "required": ["x", "y"],
                    },
                },
                "required": ["state", "position"],
            },
        },
    })
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

/// Extract the JSON reading from a generateContent response. A response
/// without any text means the model had nothing to say: UNKNOWN at (0, 0).
fn parse_generate_content(body: &str) -> Result<HandReading, AnalyzeError> {
    let response: GenerateContentResponse =
        serde_json::from_str(body).map_err(|e| AnalyzeError::Malformed(e.to_string()))?;

    let text: String = response
        .candidates
        .first()
        .and_then(|c| c.content.as_ref())
        .map(|content| {
            content
                .parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Ok(HandReading::unknown());
    }

    serde_json::from_str(&text).map_err(|e| AnalyzeError::Malformed(e.to_string()))
}

fn map_reqwest_error(err: reqwest::Error) -> AnalyzeError {
    if err.is_timeout() {
        AnalyzeError::Transport(format!("request timed out: {err}"))
    } else {
        AnalyzeError::Transport(err.to_string())
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}
