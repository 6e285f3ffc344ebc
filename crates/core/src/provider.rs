//! Provider abstraction — one internal request/response shape for every
//! LLM backend.
//!
//! Adapters translate between this canonical shape and the provider's
//! native wire format; provider-shaped data never leaks past the adapter
//! boundary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::Message;

/// The mode in which a request (and any resulting tool loop) runs.
///
/// `Dev` carries elevated permissions: looser write policy and a higher
/// default temperature. `Heartbeat` is a synthetic ping; `Runtime` is
/// programmatic use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Purpose {
    Default,
    Dev,
    Heartbeat,
    Runtime,
}

impl Purpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Purpose::Default => "default",
            Purpose::Dev => "dev",
            Purpose::Heartbeat => "heartbeat",
            Purpose::Runtime => "runtime",
        }
    }
}

impl Default for Purpose {
    fn default() -> Self {
        Purpose::Default
    }
}

impl std::fmt::Display for Purpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tool definition sent to the LLM so it knows what tools it can call.
///
/// `parameters` is a minimal JSON-schema subset (object/array/string/
/// number/integer/boolean/null with enum, required, additionalProperties).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,

    pub description: String,

    pub parameters: serde_json::Value,
}

/// Optional correlation metadata carried on a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

/// The canonical request to any LLM provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    /// Provider name; resolved from `purpose` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    /// Model name; filled with the provider's default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    pub messages: Vec<Message>,

    /// Hard cap on generated tokens; always positive.
    pub max_output_tokens: u32,

    /// Sampling temperature; adapters default this to 0.2 when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Tools offered to the model. `None` means "caller did not specify"
    /// (the scheduler falls back to the full registry); an empty list
    /// disables tool calling entirely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,

    #[serde(default)]
    pub purpose: Purpose,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<RequestMeta>,
}

impl LlmRequest {
    /// A request with the given messages and sensible defaults.
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            provider: None,
            model: None,
            messages,
            max_output_tokens: 1024,
            temperature: None,
            tools: None,
            purpose: Purpose::Default,
            meta: None,
        }
    }

    pub fn with_purpose(mut self, purpose: Purpose) -> Self {
        self.purpose = purpose;
        self
    }

    /// The output cap as providers must apply it: `max(1, floor(x))`.
    pub fn clamped_max_output_tokens(&self) -> u32 {
        self.max_output_tokens.max(1)
    }

    /// The effective temperature (0.2 unless the caller set one).
    pub fn effective_temperature(&self) -> f32 {
        self.temperature.unwrap_or(0.2)
    }
}

/// Normalized token accounting. Every adapter maps its wire usage into
/// this shape; `total_tokens` is always the sum of the parts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    /// Sum two usages (for accumulating a per-run total).
    pub fn add(&self, other: &Usage) -> Usage {
        Usage::new(
            self.input_tokens + other.input_tokens,
            self.output_tokens + other.output_tokens,
        )
    }

    /// Normalize any of the three known wire spellings:
    /// `{prompt_tokens, completion_tokens}`, `{input_tokens, output_tokens}`,
    /// or already-canonical `{inputTokens, outputTokens}`.
    /// Absent fields become zero.
    pub fn from_wire(value: &serde_json::Value) -> Usage {
        let pick = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| value.get(*k).and_then(serde_json::Value::as_u64))
                .unwrap_or(0)
        };
        Usage::new(
            pick(&["input_tokens", "prompt_tokens", "inputTokens"]),
            pick(&["output_tokens", "completion_tokens", "outputTokens"]),
        )
    }
}

/// Why the model stopped producing output on a given step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCall,
    ContentFilter,
    Error,
    Unknown,
}

/// The canonical response from any LLM provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub provider: String,

    pub model: String,

    /// Aggregate text content of the assistant turn.
    pub text: String,

    /// The full assistant message, including any tool calls.
    pub message: Message,

    pub usage: Usage,

    pub finish_reason: FinishReason,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_id: Option<String>,
}

/// The internal interface every LLM backend implements.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// A human-readable provider name (e.g. "grok", "anthropic").
    fn name(&self) -> &str;

    /// Send a request and get a complete, normalized response.
    async fn chat(&self, request: &LlmRequest) -> Result<LlmResponse, ProviderError>;
}

impl std::fmt::Debug for dyn LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("LlmProvider").field(&self.name()).finish()
    }
}
