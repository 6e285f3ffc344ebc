//! Message and Session domain types.
//!
//! These are the core value objects that flow through the entire system:
//! the scheduler seeds a request from a Session, the provider returns an
//! Assistant message, tool executions append Tool messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A structured request by the model to invoke a named tool.
///
/// A tool call is *not* a direct function call — it must pass
/// classification, budget, approval, and policy before any effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique ID within the conversation (matches the provider's tool call id).
    pub id: String,

    /// Name of the tool to invoke (must resolve in the registry).
    pub name: String,

    /// Arguments as a JSON object, serialized to text.
    pub arguments: String,
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Parse the arguments into a JSON value. Malformed arguments become
    /// an empty object so a bad model emission never panics the loop.
    pub fn arguments_json(&self) -> serde_json::Value {
        serde_json::from_str(&self.arguments)
            .unwrap_or(serde_json::Value::Object(serde_json::Map::new()))
    }
}

/// A single message in a conversation, tagged by role.
///
/// Assistant content is always present as a possibly-empty string;
/// a Tool message is always bound to exactly one prior ToolCall.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        tool_name: String,
        tool_call_id: String,
        content: String,
    },
}

impl Message {
    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    /// Create an assistant message with no tool calls.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    /// Create an assistant message carrying tool calls.
    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self::Assistant {
            content: content.into(),
            tool_calls,
        }
    }

    /// Create a tool result message bound to a prior tool call.
    pub fn tool_result(
        tool_name: impl Into<String>,
        tool_call_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::Tool {
            tool_name: tool_name.into(),
            tool_call_id: tool_call_id.into(),
            content: content.into(),
        }
    }

    /// The role name as it appears on the wire and in transcripts.
    pub fn role(&self) -> &'static str {
        match self {
            Message::System { .. } => "system",
            Message::User { .. } => "user",
            Message::Assistant { .. } => "assistant",
            Message::Tool { .. } => "tool",
        }
    }

    /// The text content of the message, regardless of variant.
    pub fn content(&self) -> &str {
        match self {
            Message::System { content }
            | Message::User { content }
            | Message::Assistant { content, .. }
            | Message::Tool { content, .. } => content,
        }
    }

    /// Tool calls carried by this message (empty for non-assistant roles).
    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            Message::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }
}

/// The serialized result of a tool execution, stored as Tool message content.
///
/// Either `{ ok: true, tool, result }` or `{ ok: false, tool, error, details? }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub ok: bool,

    pub tool: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// The fixed denial text appended when the approval gate refuses a call.
pub const DENIED_BY_APPROVAL: &str = "Tool call denied by policy/approval.";

impl ToolOutcome {
    /// A successful execution.
    pub fn ok(tool: impl Into<String>, result: serde_json::Value) -> Self {
        Self {
            ok: true,
            tool: tool.into(),
            result: Some(result),
            error: None,
            details: None,
        }
    }

    /// A failed execution.
    pub fn err(tool: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            ok: false,
            tool: tool.into(),
            result: None,
            error: Some(error.into()),
            details: None,
        }
    }

    /// A failed execution with structured details.
    pub fn err_with_details(
        tool: impl Into<String>,
        error: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            details: Some(details),
            ..Self::err(tool, error)
        }
    }

    /// The outcome recorded for a call the approval gate denied.
    pub fn denied(tool: impl Into<String>) -> Self {
        Self::err(tool, DENIED_BY_APPROVAL)
    }

    /// Serialize for embedding in a Tool message.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"ok":false,"error":"unserializable tool outcome"}"#.into())
    }
}

/// Persisted conversation state, keyed by an opaque id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Session {
    /// Create an empty session with the given id, or a fresh UUID when none
    /// is supplied.
    pub fn new(id: Option<&str>) -> Self {
        let now = Utc::now();
        Self {
            id: id
                .map(str::to_string)
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
        }
    }

    /// Append a message and refresh `updated_at`.
    pub fn push(&mut self, message: Message) {
        self.updated_at = Utc::now();
        self.messages.push(message);
    }
}
