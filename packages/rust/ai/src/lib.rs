//! Generative AI service interface and its OpenRouter-compatible client.
//!
//! The pipeline only ever sees [`AiService`]. Every failure mode of the
//! service (HTTP error status, timeout, malformed body, empty answer) maps to
//! an [`AiError`], which callers treat as one uniform "AI unavailable" signal.

mod response;

use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use coursegen_shared::{CourseGenError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use url::Url;

pub use response::{extract_json_object, parse_json_response, strip_code_fences};

/// User-Agent string for AI requests.
const USER_AGENT: &str = concat!("CourseGen/", env!("CARGO_PKG_VERSION"));

/// Longest error body kept in [`AiError::Http`].
const MAX_ERROR_BODY: usize = 500;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why an AI call produced nothing usable.
#[derive(Debug, thiserror::Error)]
pub enum AiError {
    /// The request could not be built.
    #[error("invalid request: {0}")]
    Request(String),

    /// Connection-level failure.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The service answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The body or the answer inside it could not be parsed.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The service answered without any content.
    #[error("empty response")]
    Empty,
}

impl From<AiError> for CourseGenError {
    fn from(e: AiError) -> Self {
        CourseGenError::Ai(e.to_string())
    }
}

pub type AiResult<T> = std::result::Result<T, AiError>;

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// An image attached to a vision request.
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePayload {
    pub mime_type: String,
    pub data_base64: String,
}

impl ImagePayload {
    pub fn from_bytes(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            mime_type: mime_type.into(),
            data_base64: STANDARD.encode(bytes),
        }
    }

    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data_base64)
    }
}

/// One chat completion call.
///
/// When `image` is set the last user message is sent as multi-part content
/// (text + image), which is the vision variant of the call.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub timeout: Duration,
    pub temperature: Option<f32>,
    pub image: Option<ImagePayload>,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            max_tokens: 1024,
            timeout: Duration::from_secs(120),
            temperature: None,
            image: None,
        }
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn image(mut self, image: ImagePayload) -> Self {
        self.image = Some(image);
        self
    }
}

// ---------------------------------------------------------------------------
// Service interface
// ---------------------------------------------------------------------------

/// A generative text/vision service.
#[async_trait]
pub trait AiService: Send + Sync {
    /// Run one completion and return the text of the first choice.
    async fn complete(&self, request: CompletionRequest) -> AiResult<String>;
}

// ---------------------------------------------------------------------------
// Wire format (OpenAI chat completions)
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: Role,
    content: WireContent<'a>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum WireContent<'a> {
    Text(&'a str),
    Parts(Vec<ContentPart<'a>>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct WireResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireChoiceMessage,
}

#[derive(Deserialize)]
struct WireChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn wire_request(request: &CompletionRequest) -> WireRequest<'_> {
    let last_user = request.messages.iter().rposition(|m| m.role == Role::User);

    let messages = request
        .messages
        .iter()
        .enumerate()
        .map(|(i, message)| {
            let content = match (&request.image, last_user) {
                (Some(image), Some(idx)) if idx == i => WireContent::Parts(vec![
                    ContentPart::Text {
                        text: &message.content,
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: image.data_uri(),
                        },
                    },
                ]),
                _ => WireContent::Text(&message.content),
            };
            WireMessage {
                role: message.role,
                content,
            }
        })
        .collect();

    WireRequest {
        model: &request.model,
        messages,
        max_tokens: request.max_tokens,
        temperature: request.temperature,
    }
}

// ---------------------------------------------------------------------------
// OpenRouter client
// ---------------------------------------------------------------------------

/// [`AiService`] backed by an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Clone)]
pub struct OpenRouterClient {
    client: Client,
    endpoint: Url,
    api_key: String,
}

impl OpenRouterClient {
    /// Build a client for `base_url` (e.g. `https://openrouter.ai/api/v1`).
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Result<Self> {
        let endpoint = completions_endpoint(base_url)?;
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| CourseGenError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            api_key: api_key.into(),
        })
    }
}

/// Resolve the chat completions endpoint from the base URL.
fn completions_endpoint(base_url: &str) -> Result<Url> {
    let base = base_url.trim().trim_end_matches('/');
    let full = if base.ends_with("/chat/completions") {
        base.to_string()
    } else {
        format!("{base}/chat/completions")
    };
    Url::parse(&full)
        .map_err(|e| CourseGenError::config(format!("invalid AI base URL {base_url:?}: {e}")))
}

#[async_trait]
impl AiService for OpenRouterClient {
    #[instrument(skip_all, fields(model = %request.model, vision = request.image.is_some()))]
    async fn complete(&self, request: CompletionRequest) -> AiResult<String> {
        let body = wire_request(&request);

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .header("X-Title", "CourseGen")
            .timeout(request.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AiError::Timeout(request.timeout)
                } else if e.is_builder() {
                    AiError::Request(e.to_string())
                } else {
                    AiError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            if e.is_timeout() {
                AiError::Timeout(request.timeout)
            } else {
                AiError::Transport(format!("failed to read body: {e}"))
            }
        })?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "AI service returned an error status");
            return Err(AiError::Http {
                status: status.as_u16(),
                body: text.chars().take(MAX_ERROR_BODY).collect(),
            });
        }

        let parsed: WireResponse = serde_json::from_str(&text)
            .map_err(|e| AiError::Malformed(format!("invalid completion body: {e}")))?;

        if let Some(error) = parsed.error {
            return Err(AiError::Malformed(format!("provider error: {error}")));
        }

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(AiError::Empty)?;

        debug!(chars = content.len(), "completion received");
        Ok(content)
    }
}
