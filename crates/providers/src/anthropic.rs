//! Anthropic native provider implementation.
//!
//! Uses Anthropic's Messages API directly (not an OpenAI-compatible
//! proxy):
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as a single top-level field
//! - Native tool use with `tool_use` / `tool_result` content blocks

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use toolforge_core::error::ProviderError;
use toolforge_core::message::{Message, ToolCall};
use toolforge_core::provider::{
    FinishReason, LlmProvider, LlmRequest, LlmResponse, ToolDefinition, Usage,
};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Anthropic native Messages API provider.
pub struct AnthropicProvider {
    name: String,
    base_url: String,
    api_key: String,
    default_model: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            name: "anthropic".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            default_model: DEFAULT_MODEL.into(),
            client,
        }
    }

    /// Custom base URL (proxies, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the model used when a request names none.
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Extract system messages from the message list; Anthropic takes the
    /// system prompt as a top-level field, concatenated with blank lines.
    fn extract_system(messages: &[Message]) -> (Option<String>, Vec<&Message>) {
        let mut system_parts: Vec<&str> = Vec::new();
        let mut non_system: Vec<&Message> = Vec::new();

        for msg in messages {
            match msg {
                Message::System { content } => system_parts.push(content),
                other => non_system.push(other),
            }
        }

        let system = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };

        (system, non_system)
    }

    /// Convert messages to Anthropic API format with content blocks.
    ///
    /// The API requires at least one user turn; when none exists a
    /// placeholder "Hello" turn is synthesized.
    fn to_api_messages(messages: &[&Message]) -> Vec<AnthropicMessage> {
        let mut result = Vec::new();

        for msg in messages {
            match msg {
                Message::User { content } => {
                    result.push(AnthropicMessage {
                        role: "user".into(),
                        content: AnthropicContent::Text(content.clone()),
                    });
                }
                Message::Assistant {
                    content,
                    tool_calls,
                } => {
                    if tool_calls.is_empty() {
                        result.push(AnthropicMessage {
                            role: "assistant".into(),
                            content: AnthropicContent::Text(content.clone()),
                        });
                    } else {
                        let mut blocks: Vec<ContentBlock> = Vec::new();
                        if !content.is_empty() {
                            blocks.push(ContentBlock::Text {
                                text: content.clone(),
                            });
                        }
                        for tc in tool_calls {
                            blocks.push(ContentBlock::ToolUse {
                                id: tc.id.clone(),
                                name: tc.name.clone(),
                                input: tc.arguments_json(),
                            });
                        }
                        result.push(AnthropicMessage {
                            role: "assistant".into(),
                            content: AnthropicContent::Blocks(blocks),
                        });
                    }
                }
                Message::Tool {
                    tool_call_id,
                    content,
                    ..
                } => {
                    // Tool results ride in a user turn immediately after
                    // the invoking assistant turn.
                    result.push(AnthropicMessage {
                        role: "user".into(),
                        content: AnthropicContent::Blocks(vec![ContentBlock::ToolResult {
                            tool_use_id: tool_call_id.clone(),
                            content: content.clone(),
                        }]),
                    });
                }
                Message::System { .. } => {} // handled separately
            }
        }

        if !result.iter().any(|m| m.role == "user") {
            result.insert(
                0,
                AnthropicMessage {
                    role: "user".into(),
                    content: AnthropicContent::Text("Hello".into()),
                },
            );
        }

        result
    }

    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<AnthropicTool> {
        tools
            .iter()
            .map(|t| AnthropicTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.parameters.clone(),
            })
            .collect()
    }

    fn map_stop_reason(reason: Option<&str>) -> FinishReason {
        match reason {
            Some("end_turn") | Some("stop_sequence") => FinishReason::Stop,
            Some("max_tokens") => FinishReason::Length,
            Some("tool_use") => FinishReason::ToolCall,
            Some("refusal") => FinishReason::ContentFilter,
            _ => FinishReason::Unknown,
        }
    }

    /// Convert an Anthropic API response to the canonical shape.
    fn response_to_llm_response(&self, resp: AnthropicResponse) -> LlmResponse {
        let mut text = String::new();
        let mut tool_calls = Vec::new();

        for block in &resp.content {
            match block {
                ResponseContentBlock::Text { text: t } => {
                    if !text.is_empty() {
                        text.push('\n');
                    }
                    text.push_str(t);
                }
                ResponseContentBlock::ToolUse { id, name, input } => {
                    tool_calls.push(ToolCall::new(
                        id.clone(),
                        name.clone(),
                        serde_json::to_string(input).unwrap_or_else(|_| "{}".into()),
                    ));
                }
            }
        }

        let usage = Usage::from_wire(&resp.usage);
        let finish_reason = Self::map_stop_reason(resp.stop_reason.as_deref());

        LlmResponse {
            provider: self.name.clone(),
            model: resp.model,
            text: text.clone(),
            message: Message::assistant_with_tools(text, tool_calls),
            usage,
            finish_reason,
            response_id: Some(resp.id),
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat(&self, request: &LlmRequest) -> Result<LlmResponse, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::MissingCredentials(
                "ANTHROPIC_API_KEY is not set".into(),
            ));
        }

        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());

        let (system, messages) = Self::extract_system(&request.messages);
        let api_messages = Self::to_api_messages(&messages);

        let mut body = serde_json::json!({
            "model": model,
            "messages": api_messages,
            "max_tokens": request.clamped_max_output_tokens(),
            "temperature": request.effective_temperature(),
        });

        if let Some(ref sys) = system {
            body["system"] = serde_json::json!(sys);
        }

        if let Some(tools) = &request.tools
            && !tools.is_empty()
        {
            body["tools"] = serde_json::json!(Self::to_api_tools(tools));
        }

        debug!(provider = "anthropic", model = %model, messages = request.messages.len(), "Sending completion request");

        let url = format!("{}/v1/messages", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid Anthropic API key".into(),
            ));
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Anthropic API error");
            if status == 404 && error_body.to_lowercase().contains("model") {
                return Err(ProviderError::ModelNotFound(model));
            }
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_resp: AnthropicResponse = response.json().await.map_err(|e| {
            ProviderError::MalformedResponse(format!("Failed to parse Anthropic response: {e}"))
        })?;

        Ok(self.response_to_llm_response(api_resp))
    }
}

// --- Anthropic API types ---

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicMessage {
    role: String,
    content: AnthropicContent,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum AnthropicContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Debug, Serialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    id: String,
    model: String,
    content: Vec<ResponseContentBlock>,
    usage: serde_json::Value,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponseContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructor() {
        let provider = AnthropicProvider::new("sk-ant-test");
        assert_eq!(provider.name(), "anthropic");
        assert_eq!(provider.base_url, DEFAULT_BASE_URL);
    }

    #[tokio::test]
    async fn empty_key_is_missing_credentials() {
        let provider = AnthropicProvider::new("");
        let req = LlmRequest::new(vec![Message::user("hi")]);
        let err = provider.chat(&req).await.unwrap_err();
        assert!(matches!(err, ProviderError::MissingCredentials(_)));
    }

    #[test]
    fn system_extraction_concatenates() {
        let messages = vec![
            Message::system("You are helpful"),
            Message::system("Be concise"),
            Message::user("Hello"),
            Message::assistant("Hi!"),
        ];

        let (system, non_system) = AnthropicProvider::extract_system(&messages);
        assert_eq!(system.as_deref(), Some("You are helpful\n\nBe concise"));
        assert_eq!(non_system.len(), 2);
    }

    #[test]
    fn placeholder_user_turn_synthesized() {
        let messages = vec![Message::system("sys only")];
        let (_, non_system) = AnthropicProvider::extract_system(&messages);
        let api = AnthropicProvider::to_api_messages(&non_system);
        assert_eq!(api.len(), 1);
        assert_eq!(api[0].role, "user");
        match &api[0].content {
            AnthropicContent::Text(t) => assert_eq!(t, "Hello"),
            _ => panic!("expected text content"),
        }
    }

    #[test]
    fn no_placeholder_when_user_exists() {
        let messages = vec![Message::user("real")];
        let refs: Vec<&Message> = messages.iter().collect();
        let api = AnthropicProvider::to_api_messages(&refs);
        assert_eq!(api.len(), 1);
        match &api[0].content {
            AnthropicContent::Text(t) => assert_eq!(t, "real"),
            _ => panic!("expected text content"),
        }
    }

    #[test]
    fn assistant_tool_calls_become_blocks() {
        let msg = Message::assistant_with_tools(
            "Let me check",
            vec![ToolCall::new("toolu_1", "read_file", r#"{"path":"notes/a.txt"}"#)],
        );
        let refs: Vec<&Message> = vec![&msg];
        let api = AnthropicProvider::to_api_messages(&refs);

        // Placeholder user turn + assistant blocks.
        assert_eq!(api.len(), 2);
        match &api[1].content {
            AnthropicContent::Blocks(blocks) => {
                assert_eq!(blocks.len(), 2);
                match &blocks[1] {
                    ContentBlock::ToolUse { id, name, input } => {
                        assert_eq!(id, "toolu_1");
                        assert_eq!(name, "read_file");
                        assert_eq!(input["path"], "notes/a.txt");
                    }
                    _ => panic!("expected tool_use block"),
                }
            }
            _ => panic!("expected blocks content"),
        }
    }

    #[test]
    fn tool_results_ride_in_user_turns() {
        let msg = Message::tool_result("read_file", "toolu_1", r#"{"ok":true}"#);
        let refs: Vec<&Message> = vec![&msg];
        let api = AnthropicProvider::to_api_messages(&refs);
        assert_eq!(api[0].role, "user");
        match &api[0].content {
            AnthropicContent::Blocks(blocks) => match &blocks[0] {
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                } => {
                    assert_eq!(tool_use_id, "toolu_1");
                    assert_eq!(content, r#"{"ok":true}"#);
                }
                _ => panic!("expected tool_result block"),
            },
            _ => panic!("expected blocks content"),
        }
    }

    #[test]
    fn parse_text_response() {
        let provider = AnthropicProvider::new("sk-ant-test");
        let resp: AnthropicResponse = serde_json::from_str(
            r#"{
                "id": "msg_01",
                "model": "claude-sonnet-4-20250514",
                "content": [{"type": "text", "text": "Hello!"}],
                "usage": {"input_tokens": 10, "output_tokens": 5},
                "stop_reason": "end_turn"
            }"#,
        )
        .unwrap();

        let out = provider.response_to_llm_response(resp);
        assert_eq!(out.text, "Hello!");
        assert!(out.message.tool_calls().is_empty());
        assert_eq!(out.usage, Usage::new(10, 5));
        assert_eq!(out.usage.total_tokens, 15);
        assert_eq!(out.finish_reason, FinishReason::Stop);
        assert_eq!(out.response_id.as_deref(), Some("msg_01"));
    }

    #[test]
    fn parse_tool_use_response() {
        let provider = AnthropicProvider::new("sk-ant-test");
        let resp: AnthropicResponse = serde_json::from_str(
            r#"{
                "id": "msg_02",
                "model": "claude-sonnet-4-20250514",
                "content": [
                    {"type": "text", "text": "Let me calculate"},
                    {"type": "tool_use", "id": "toolu_abc", "name": "calculator", "input": {"expression": "2+2"}}
                ],
                "usage": {"input_tokens": 20, "output_tokens": 10},
                "stop_reason": "tool_use"
            }"#,
        )
        .unwrap();

        let out = provider.response_to_llm_response(resp);
        assert_eq!(out.text, "Let me calculate");
        assert_eq!(out.finish_reason, FinishReason::ToolCall);
        let calls = out.message.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "toolu_abc");
        let args: serde_json::Value = serde_json::from_str(&calls[0].arguments).unwrap();
        assert_eq!(args["expression"], "2+2");
    }

    #[test]
    fn stop_reason_mapping() {
        assert_eq!(
            AnthropicProvider::map_stop_reason(Some("max_tokens")),
            FinishReason::Length
        );
        assert_eq!(
            AnthropicProvider::map_stop_reason(Some("refusal")),
            FinishReason::ContentFilter
        );
        assert_eq!(
            AnthropicProvider::map_stop_reason(None),
            FinishReason::Unknown
        );
    }
}
