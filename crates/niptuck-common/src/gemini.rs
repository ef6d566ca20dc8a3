use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::credential::Credential;

#[derive(Clone, Debug)]
pub struct GeminiClientConfig {
    pub base_url: String,
    pub model: String,
    pub default_timeout: Duration,
    pub temperature: f64,
    pub max_error_body_bytes: usize,
}

impl GeminiClientConfig {
    pub fn from_env() -> Self {
        let base_url = std::env::var("GEMINI_BASE_URL")
            .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1beta".to_string());

        let model =
            std::env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-2.5-flash".to_string());

        let default_timeout = std::env::var("GEMINI_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(120));

        let temperature = std::env::var("GEMINI_TEMPERATURE")
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(0.2);

        let max_error_body_bytes = std::env::var("GEMINI_MAX_ERROR_BODY_BYTES")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(8 * 1024);

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            default_timeout,
            temperature,
            max_error_body_bytes,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GeminiClientError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid response JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("upstream returned error: status={status} body={body}")]
    Upstream { status: StatusCode, body: String },

    #[error("model output contained no JSON object ({text_len} chars of text)")]
    NoJson { text_len: usize },
}

impl GeminiClientError {
    /// HTTP status of an upstream rejection, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => Some(status.as_u16()),
            Self::Request(e) => e.status().map(|s| s.as_u16()),
            Self::InvalidJson(_) | Self::NoJson { .. } => None,
        }
    }

    /// True when the upstream refused the key itself rather than the request.
    pub fn is_credential_rejection(&self) -> bool {
        match self {
            Self::Upstream { body, .. } => {
                body.contains("API_KEY_INVALID") || body.contains("API key not valid")
            }
            _ => false,
        }
    }
}

#[derive(Clone)]
pub struct GeminiClient {
    config: GeminiClientConfig,
    http: reqwest::Client,
}

impl GeminiClient {
    pub fn new(config: GeminiClientConfig) -> Result<Self, GeminiClientError> {
        let http = reqwest::Client::builder()
            .user_agent("niptuck-scorer")
            .build()?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &GeminiClientConfig {
        &self.config
    }

    /// One `generateContent` round trip, decoded down to the JSON object the model wrote.
    ///
    /// `generation_config` is filled from the client config when the request leaves it unset.
    pub async fn generate_json(
        &self,
        credential: &Credential,
        mut request: GenerateContentRequest,
    ) -> Result<serde_json::Value, GeminiClientError> {
        if request.generation_config.is_none() {
            request.generation_config = Some(GenerationConfig::json(self.config.temperature));
        }

        let url = self.config.endpoint();
        debug!(url = %url, parts = request.part_count(), "calling generateContent");
        let resp = self
            .http
            .post(&url)
            .query(&[("key", credential.expose())])
            .timeout(self.config.default_timeout)
            .json(&request)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(Self::to_upstream_error(resp, self.config.max_error_body_bytes).await);
        }

        let body = resp.text().await?;
        let parsed: GenerateContentResponse = serde_json::from_str(&body)?;
        let text = parsed.joined_text();
        parse_model_json(&text).inspect_err(|e| {
            if let GeminiClientError::NoJson { text_len } = e {
                warn!(
                    text_len,
                    finish_reason = parsed.finish_reason().unwrap_or("none"),
                    "model reply held no JSON object"
                );
            }
        })
    }

    async fn to_upstream_error(
        resp: reqwest::Response,
        max_error_body_bytes: usize,
    ) -> GeminiClientError {
        let status = resp.status();
        let body = read_limited_text(resp, max_error_body_bytes).await;
        GeminiClientError::Upstream { status, body }
    }
}

/// Recover the JSON object from model text.
///
/// Tries the whole (trimmed) text first; if that is not a JSON object, retries on the slice
/// from the first `{` to the last `}`.
pub fn parse_model_json(text: &str) -> Result<serde_json::Value, GeminiClientError> {
    let trimmed = text.trim();
    if let Ok(value @ serde_json::Value::Object(_)) =
        serde_json::from_str::<serde_json::Value>(trimmed)
    {
        return Ok(value);
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            if let Ok(value @ serde_json::Value::Object(_)) =
                serde_json::from_str::<serde_json::Value>(&trimmed[start..=end])
            {
                debug!(start, end, "recovered JSON by brace slicing");
                return Ok(value);
            }
        }
    }

    Err(GeminiClientError::NoJson {
        text_len: trimmed.len(),
    })
}

async fn read_limited_text(resp: reqwest::Response, max_bytes: usize) -> String {
    match resp.bytes().await {
        Ok(mut b) => {
            if b.len() > max_bytes {
                b.truncate(max_bytes);
            }
            String::from_utf8_lossy(&b).to_string()
        }
        Err(e) => {
            warn!(error = %e, "failed to read upstream error body");
            "<failed to read error body>".to_string()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

impl GenerateContentRequest {
    pub fn part_count(&self) -> usize {
        self.contents.iter().map(|c| c.parts.len()).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

/// A request or response part. Unknown part kinds in responses deserialize with both
/// fields empty and are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            inline_data: None,
            text: Some(text.into()),
        }
    }

    pub fn inline(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            inline_data: Some(InlineData {
                mime_type: mime_type.into(),
                data: data.into(),
            }),
            text: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    /// Base64 body, no `data:` prefix.
    pub data: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_mime_type: String,
    pub temperature: f64,
}

impl GenerationConfig {
    pub fn json(temperature: f64) -> Self {
        Self {
            response_mime_type: "application/json".to_string(),
            temperature,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

impl GenerateContentResponse {
    /// Text of every part of the first candidate, concatenated and trimmed.
    pub fn joined_text(&self) -> String {
        let Some(content) = self.candidates.first().and_then(|c| c.content.as_ref()) else {
            return String::new();
        };
        content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect::<String>()
            .trim()
            .to_string()
    }

    /// Why the first candidate stopped (`STOP`, `SAFETY`, `MAX_TOKENS`, ...), if reported.
    pub fn finish_reason(&self) -> Option<&str> {
        self.candidates.first()?.finish_reason.as_deref()
    }
}
