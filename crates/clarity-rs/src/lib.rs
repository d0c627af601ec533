//! Clarity assistants for nonprofit audit notes and messy financial notes.
//!
//! `clarity-rs` turns a pasted note into a chat-completion request against an
//! [Azure OpenAI](https://learn.microsoft.com/azure/ai-services/openai/)
//! deployment and hands back something a frontend can render. Two tools share
//! the crate:
//!
//! - **Audit clarity**: a numbered YAML module (`modules/module<N>.yaml`)
//!   describes one review checklist. The module and the note are interpolated
//!   into a system/user message pair and the reply is shown as text.
//! - **Financial clarity**: three prompt fragments addressed by dotted path
//!   (`prompts.finance.clarifier.system`, …) are combined with the note and
//!   optional context (income, goals, debts, horizon, constraints). The reply
//!   is expected to be a JSON [`FinancePlan`](finance::FinancePlan) and is
//!   validated before it is stored.
//!
//! # Getting started
//!
//! ```ignore
//! use clarity_rs::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClarityConfig::from_env()?;
//!     let client = AzureChatClient::new(&config)?;
//!     let resolver = Resolver::new(&config.modules_dir, &config.prompts_dir);
//!
//!     let mut session = AuditSession::default();
//!     session.set_note("Donated services were received.");
//!
//!     AuditAssistant::new(&client, &resolver).run(&mut session).await?;
//!     println!("{}", session.result.unwrap_or_default());
//!     Ok(())
//! }
//! ```
//!
//! # Where to find things
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | Environment configuration, `.env` loading, fail-fast checks |
//! | [`resolver`] | Numeric module / dotted prompt lookup on disk |
//! | [`prompt`] | Chat message assembly for both tools, placeholder templates |
//! | [`finance`] | Finance plan schema, validation, reply interpretation, view helpers |
//! | [`session`] | Per-session context objects and the module catalog |
//! | [`assistant`] | The run flows tying resolver, assembler, client and session together |

pub mod assistant;
pub mod config;
pub mod finance;
pub mod prelude;
pub mod prompt;
pub mod resolver;
pub mod session;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, trace};

use crate::config::ClarityConfig;

// Re-export schemars for downstream crates.
pub use schemars;

// ── Schema generation ──────────────────────────────────────────────

/// Generate a JSON Schema `serde_json::Value` from a type that implements
/// `schemars::JsonSchema`.
///
/// # Example
///
/// ```
/// use clarity_rs::json_schema_for;
/// use schemars::JsonSchema;
/// use serde::Deserialize;
///
/// #[derive(Deserialize, JsonSchema)]
/// struct Reply {
///     summary: String,
///     #[serde(default)]
///     notes: Vec<String>,
/// }
///
/// let schema = json_schema_for::<Reply>();
/// assert_eq!(schema["type"], "object");
/// assert!(schema["required"].as_array().unwrap().contains(&"summary".into()));
/// ```
pub fn json_schema_for<T: JsonSchema>() -> serde_json::Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema)
        .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}))
}

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
        }
    }
}

/// A role-tagged chat message.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

// ── Request types ──────────────────────────────────────────────────

/// Chat completion request body. Unset sampling fields are omitted from
/// serialization so the deployment's defaults apply.
#[derive(Serialize, Debug, Default)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

// ── Response types ─────────────────────────────────────────────────

/// Raw API response (internal deserialization target).
#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
}

/// Clean return type from [`AzureChatClient::chat()`].
#[derive(Debug)]
pub struct ChatCompletion {
    pub content: String,
    pub usage: Option<UsageInfo>,
    pub finish_reason: Option<String>,
}

/// Token usage statistics.
#[derive(Deserialize, Debug, Clone)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

/// Failure talking to the chat-completion endpoint.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("Azure OpenAI HTTP {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("failed to parse response: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("Azure OpenAI error: {0}")]
    Api(String),
    #[error("empty completion (no choices or no content)")]
    EmptyReply,
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for an Azure OpenAI chat-completions deployment.
///
/// Each call is a single synchronous round-trip from the caller's point of
/// view: no retries, and no timeout unless one is configured.
pub struct AzureChatClient {
    client: reqwest::Client,
    url: String,
    api_key: String,
    deployment: String,
}

impl AzureChatClient {
    /// Build a client for the deployment named in `config`.
    pub fn new(config: &ClarityConfig) -> Result<Self, ChatError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("clarity-rs/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(ChatError::Client)?;
        Ok(Self {
            client,
            url: completions_url(&config.endpoint, &config.deployment, &config.api_version),
            api_key: config.api_key.clone(),
            deployment: config.deployment.clone(),
        })
    }

    /// Deployment name requests are routed to.
    pub fn deployment(&self) -> &str {
        &self.deployment
    }

    /// Send a chat completion request and return the first choice's text.
    pub async fn chat(&self, body: &ChatRequest) -> Result<ChatCompletion, ChatError> {
        debug!(
            "LLM request: deployment={}, messages={}, max_tokens={:?}, temp={:?}",
            self.deployment,
            body.messages.len(),
            body.max_tokens,
            body.temperature,
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(body).map_or(0, |s| s.len())
        );

        let start = Instant::now();

        let resp = self
            .client
            .post(&self.url)
            .header("api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(ChatError::Request)?;

        let status = resp.status();
        let text = resp.text().await.map_err(ChatError::Request)?;

        debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(ChatError::Status { status, body: text });
        }

        let parsed: RawChatResponse = serde_json::from_str(&text).map_err(ChatError::Decode)?;

        if let Some(err) = parsed.error {
            return Err(ChatError::Api(err.message));
        }

        if let Some(ref usage) = parsed.usage {
            debug!(
                "Token usage: prompt={}, completion={}, total={}",
                usage.prompt_tokens.unwrap_or(0),
                usage.completion_tokens.unwrap_or(0),
                usage.total_tokens.unwrap_or(0),
            );
        }

        let choice = parsed
            .choices
            .and_then(|c| c.into_iter().next())
            .ok_or(ChatError::EmptyReply)?;
        let content = choice.message.content.ok_or(ChatError::EmptyReply)?;
        debug!("LLM output: {} chars", content.len());

        Ok(ChatCompletion {
            content,
            usage: parsed.usage,
            finish_reason: choice.finish_reason,
        })
    }
}

/// Build the deployment-scoped chat-completions URL.
pub fn completions_url(endpoint: &str, deployment: &str, api_version: &str) -> String {
    format!(
        "{}/openai/deployments/{deployment}/chat/completions?api-version={api_version}",
        endpoint.trim_end_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_constructors() {
        let sys = Message::system("hello");
        assert_eq!(sys.role, MessageRole::System);
        assert_eq!(sys.content, "hello");

        let user = Message::user("world");
        assert_eq!(user.role, MessageRole::User);
    }

    #[test]
    fn message_serializes_lowercase_role() {
        let json = serde_json::to_value(Message::system("x")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "system", "content": "x"}));
    }

    #[test]
    fn chat_request_default_skips_none_fields() {
        let req = ChatRequest::new(vec![Message::user("hi")]);
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("temperature").is_none());
        assert!(json.get("max_tokens").is_none());
        assert_eq!(json["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn chat_request_builder_sets_sampling() {
        let req = ChatRequest::new(vec![])
            .with_temperature(0.2)
            .with_max_tokens(900);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["max_tokens"], 900);
        assert!((json["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn completions_url_trims_trailing_slash() {
        let url = completions_url("https://example.openai.azure.com/", "gpt-4o", "2024-06-01");
        assert_eq!(
            url,
            "https://example.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2024-06-01"
        );
    }

    #[test]
    fn raw_response_extracts_first_choice() {
        let raw = r#"{"choices":[{"message":{"content":"ok"},"finish_reason":"stop"}]}"#;
        let parsed: RawChatResponse = serde_json::from_str(raw).unwrap();
        let choice = parsed.choices.unwrap().into_iter().next().unwrap();
        assert_eq!(choice.message.content.as_deref(), Some("ok"));
        assert_eq!(choice.finish_reason.as_deref(), Some("stop"));
    }
}
