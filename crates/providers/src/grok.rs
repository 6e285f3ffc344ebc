//! Grok provider — xAI's OpenAI-compatible chat completions API.
//!
//! Also works against any other endpoint speaking the same wire format
//! when constructed with a custom base URL.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use toolforge_core::error::ProviderError;
use toolforge_core::message::{Message, ToolCall};
use toolforge_core::provider::{
    FinishReason, LlmProvider, LlmRequest, LlmResponse, ToolDefinition, Usage,
};

const DEFAULT_BASE_URL: &str = "https://api.x.ai/v1";
const DEFAULT_MODEL: &str = "grok-2-latest";

/// An adapter for the OpenAI-compatible `/chat/completions` endpoint.
pub struct GrokProvider {
    name: String,
    base_url: String,
    api_key: String,
    default_model: String,
    client: reqwest::Client,
}

impl GrokProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            name: "grok".into(),
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

    /// Convert canonical messages to the OpenAI wire format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| match m {
                Message::System { content } => ApiMessage {
                    role: "system".into(),
                    content: Some(content.clone()),
                    tool_calls: None,
                    tool_call_id: None,
                },
                Message::User { content } => ApiMessage {
                    role: "user".into(),
                    content: Some(content.clone()),
                    tool_calls: None,
                    tool_call_id: None,
                },
                Message::Assistant {
                    content,
                    tool_calls,
                } => ApiMessage {
                    role: "assistant".into(),
                    content: Some(content.clone()),
                    tool_calls: if tool_calls.is_empty() {
                        None
                    } else {
                        Some(
                            tool_calls
                                .iter()
                                .map(|tc| ApiToolCall {
                                    id: tc.id.clone(),
                                    r#type: "function".into(),
                                    function: ApiFunction {
                                        name: tc.name.clone(),
                                        arguments: tc.arguments.clone(),
                                    },
                                })
                                .collect(),
                        )
                    },
                    tool_call_id: None,
                },
                Message::Tool {
                    tool_call_id,
                    content,
                    ..
                } => ApiMessage {
                    role: "tool".into(),
                    content: Some(content.clone()),
                    tool_calls: None,
                    tool_call_id: Some(tool_call_id.clone()),
                },
            })
            .collect()
    }

    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    fn map_finish_reason(reason: Option<&str>) -> FinishReason {
        match reason {
            Some("stop") => FinishReason::Stop,
            Some("length") => FinishReason::Length,
            Some("tool_calls") => FinishReason::ToolCall,
            Some("content_filter") => FinishReason::ContentFilter,
            Some("error") => FinishReason::Error,
            _ => FinishReason::Unknown,
        }
    }

    fn response_to_llm_response(&self, model: &str, resp: ApiResponse) -> Result<LlmResponse, ProviderError> {
        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::MalformedResponse("response had no choices".into()))?;

        let text = choice.message.content.unwrap_or_default();
        let tool_calls: Vec<ToolCall> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall::new(tc.id, tc.function.name, tc.function.arguments))
            .collect();

        let usage = resp
            .usage
            .as_ref()
            .map(Usage::from_wire)
            .unwrap_or_default();

        let finish_reason = Self::map_finish_reason(choice.finish_reason.as_deref());

        Ok(LlmResponse {
            provider: self.name.clone(),
            model: if resp.model.is_empty() {
                model.to_string()
            } else {
                resp.model
            },
            text: text.clone(),
            message: Message::assistant_with_tools(text, tool_calls),
            usage,
            finish_reason,
            response_id: resp.id,
        })
    }
}

#[async_trait]
impl LlmProvider for GrokProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat(&self, request: &LlmRequest) -> Result<LlmResponse, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::MissingCredentials(
                "GROK_API_KEY is not set".into(),
            ));
        }

        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());

        let mut body = serde_json::json!({
            "model": model,
            "messages": Self::to_api_messages(&request.messages),
            "max_tokens": request.clamped_max_output_tokens(),
            "temperature": request.effective_temperature(),
        });

        // Tool calling is only enabled for a non-empty definitions list.
        if let Some(tools) = &request.tools
            && !tools.is_empty()
        {
            body["tools"] = serde_json::json!(Self::to_api_tools(tools));
        }

        debug!(provider = "grok", model = %model, messages = request.messages.len(), "Sending completion request");

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
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
                "Invalid Grok API key".into(),
            ));
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Grok API error");
            if status == 404 && error_body.to_lowercase().contains("model") {
                return Err(ProviderError::ModelNotFound(model));
            }
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_resp: ApiResponse = response.json().await.map_err(|e| {
            ProviderError::MalformedResponse(format!("Failed to parse Grok response: {e}"))
        })?;

        self.response_to_llm_response(&model, api_resp)
    }
}

// --- OpenAI-compatible wire types ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    model: String,
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructor_defaults() {
        let provider = GrokProvider::new("xai-test");
        assert_eq!(provider.name(), "grok");
        assert_eq!(provider.base_url, DEFAULT_BASE_URL);
        assert_eq!(provider.default_model, DEFAULT_MODEL);
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let provider = GrokProvider::new("xai-test").with_base_url("https://proxy.local/v1/");
        assert_eq!(provider.base_url, "https://proxy.local/v1");
    }

    #[tokio::test]
    async fn empty_key_is_missing_credentials() {
        let provider = GrokProvider::new("");
        let req = LlmRequest::new(vec![Message::user("hi")]);
        let err = provider.chat(&req).await.unwrap_err();
        assert!(matches!(err, ProviderError::MissingCredentials(_)));
    }

    #[test]
    fn message_conversion_roles() {
        let messages = vec![
            Message::system("be helpful"),
            Message::user("hi"),
            Message::assistant("hello"),
            Message::tool_result("read_file", "call_1", r#"{"ok":true}"#),
        ];
        let api = GrokProvider::to_api_messages(&messages);
        assert_eq!(api.len(), 4);
        assert_eq!(api[0].role, "system");
        assert_eq!(api[1].role, "user");
        assert_eq!(api[2].role, "assistant");
        assert_eq!(api[3].role, "tool");
        assert_eq!(api[3].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn assistant_tool_calls_reserialized() {
        let msg = Message::assistant_with_tools(
            "",
            vec![ToolCall::new("c1", "list_dir", r#"{"path":"notes"}"#)],
        );
        let api = GrokProvider::to_api_messages(&[msg]);
        let calls = api[0].tool_calls.as_ref().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].r#type, "function");
        assert_eq!(calls[0].function.name, "list_dir");
        assert_eq!(calls[0].function.arguments, r#"{"path":"notes"}"#);
    }

    #[test]
    fn parse_text_response() {
        let provider = GrokProvider::new("xai-test");
        let resp: ApiResponse = serde_json::from_str(
            r#"{
                "id": "cmpl-1",
                "model": "grok-2-latest",
                "choices": [{
                    "message": {"role": "assistant", "content": "Hello!"},
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
            }"#,
        )
        .unwrap();

        let out = provider.response_to_llm_response("grok-2-latest", resp).unwrap();
        assert_eq!(out.text, "Hello!");
        assert_eq!(out.finish_reason, FinishReason::Stop);
        assert_eq!(out.usage, Usage::new(10, 5));
        assert_eq!(out.usage.total_tokens, 15);
        assert_eq!(out.response_id.as_deref(), Some("cmpl-1"));
    }

    #[test]
    fn parse_tool_call_response() {
        let provider = GrokProvider::new("xai-test");
        let resp: ApiResponse = serde_json::from_str(
            r#"{
                "model": "grok-2-latest",
                "choices": [{
                    "message": {
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [{
                            "id": "call_abc",
                            "type": "function",
                            "function": {"name": "calculator", "arguments": "{\"expression\":\"2+2\"}"}
                        }]
                    },
                    "finish_reason": "tool_calls"
                }],
                "usage": {"prompt_tokens": 20, "completion_tokens": 8}
            }"#,
        )
        .unwrap();

        let out = provider.response_to_llm_response("grok-2-latest", resp).unwrap();
        assert_eq!(out.finish_reason, FinishReason::ToolCall);
        assert_eq!(out.text, "");
        let calls = out.message.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_abc");
        assert_eq!(calls[0].name, "calculator");
        let args: serde_json::Value = serde_json::from_str(&calls[0].arguments).unwrap();
        assert_eq!(args["expression"], "2+2");
        assert_eq!(out.usage, Usage::new(20, 8));
    }

    #[test]
    fn missing_usage_normalizes_to_zero() {
        let provider = GrokProvider::new("xai-test");
        let resp: ApiResponse = serde_json::from_str(
            r#"{"choices": [{"message": {"role": "assistant", "content": "hi"}}]}"#,
        )
        .unwrap();
        let out = provider.response_to_llm_response("grok-2-latest", resp).unwrap();
        assert_eq!(out.usage, Usage::zero());
        assert_eq!(out.finish_reason, FinishReason::Unknown);
        assert_eq!(out.model, "grok-2-latest");
    }

    #[test]
    fn no_choices_is_malformed() {
        let provider = GrokProvider::new("xai-test");
        let resp: ApiResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        let err = provider
            .response_to_llm_response("grok-2-latest", resp)
            .unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse(_)));
    }

    #[test]
    fn finish_reason_mapping() {
        assert_eq!(
            GrokProvider::map_finish_reason(Some("content_filter")),
            FinishReason::ContentFilter
        );
        assert_eq!(
            GrokProvider::map_finish_reason(Some("length")),
            FinishReason::Length
        );
        assert_eq!(GrokProvider::map_finish_reason(None), FinishReason::Unknown);
    }
}
