//! The tool-loop scheduler — a bounded, budget-governed dialogue
//! between a model and the tool registry.
//!
//! One run is a single logical task: the model call, the approval gate,
//! and each tool execution are strictly sequential, so the next model
//! call always sees the result (or explicit denial) of every tool call
//! the model made. Termination is guaranteed because every iteration
//! books a step and steps are bounded.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use toolforge_core::budget::{BudgetLedger, BudgetLimits, ToolKind};
use toolforge_core::error::Error;
use toolforge_core::message::{Message, ToolOutcome};
use toolforge_core::provider::{LlmProvider, LlmRequest, LlmResponse, Usage};
use toolforge_policy::classify_tool;
use toolforge_telemetry::{EventLog, LogEvent, LogLevel};
use toolforge_tools::ToolRegistry;

use crate::approval::ApprovalGate;

/// The result of a completed run.
#[derive(Debug)]
pub struct ToolLoopOutcome {
    /// The response the run ended on.
    pub final_response: LlmResponse,

    /// The message list as it stood at termination (clamped).
    pub messages: Vec<Message>,

    /// Accumulated usage across every model call.
    pub usage_total: Usage,

    pub steps_used: u32,

    pub tool_calls_used: u32,
}

/// The scheduler. Cheap to construct per run; all fields are shared
/// handles.
pub struct ToolLoop {
    provider: Arc<dyn LlmProvider>,
    registry: Arc<ToolRegistry>,
    events: Arc<EventLog>,
    cancel: CancellationToken,
}

impl ToolLoop {
    pub fn new(provider: Arc<dyn LlmProvider>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            provider,
            registry,
            events: Arc::new(EventLog::disabled()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_events(mut self, events: Arc<EventLog>) -> Self {
        self.events = events;
        self
    }

    /// Attach an external cancellation token; cancellation surfaces as
    /// an error while messages recorded so far stay valid.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run the loop to termination.
    ///
    /// Terminates when the model returns no tool calls, when the budget
    /// forbids a further model call (returning the last response), or
    /// with an error when a tool-call booking fails mid-turn.
    pub async fn run(
        &self,
        request: LlmRequest,
        approval: &dyn ApprovalGate,
        limits: BudgetLimits,
        keep_last_n: Option<usize>,
    ) -> Result<ToolLoopOutcome, Error> {
        let purpose = request.purpose;
        let session_tag = request
            .meta
            .as_ref()
            .and_then(|m| m.trace_id.clone())
            .unwrap_or_default();

        let mut ledger = BudgetLedger::create(limits);
        let mut messages = request.messages.clone();
        let mut usage_total = Usage::zero();
        let mut last_response: Option<LlmResponse> = None;

        // Callers that leave tools unspecified get the full registry;
        // an explicit empty list disables tool calling.
        let tools = request
            .tools
            .clone()
            .unwrap_or_else(|| self.registry.definitions());

        info!(
            session = %session_tag,
            purpose = %purpose,
            max_steps = ledger.limits.max_steps,
            max_tool_calls = ledger.limits.max_tool_calls,
            "Tool loop starting"
        );

        loop {
            if !ledger.can_call_model() {
                return match last_response {
                    Some(final_response) => {
                        self.emit_done(&session_tag, purpose, &ledger, &usage_total, "budget");
                        Ok(ToolLoopOutcome {
                            final_response,
                            messages,
                            usage_total,
                            steps_used: ledger.steps_used,
                            tool_calls_used: ledger.tool_calls_used,
                        })
                    }
                    None => Err(toolforge_core::error::BudgetError::ExhaustedBeforeFirstCall.into()),
                };
            }
            ledger = ledger.book_model_call()?;

            let step_request = LlmRequest {
                provider: request.provider.clone(),
                model: request.model.clone(),
                messages: messages.clone(),
                max_output_tokens: request.clamped_max_output_tokens(),
                temperature: request.temperature,
                tools: Some(tools.clone()),
                purpose,
                meta: request.meta.clone(),
            };

            debug!(session = %session_tag, step = ledger.steps_used, "Model call");
            let started = Instant::now();
            let response = tokio::select! {
                _ = self.cancel.cancelled() => {
                    return Err(Error::Cancelled("model call cancelled".into()));
                }
                result = self.provider.chat(&step_request) => result?,
            };
            let elapsed_ms = started.elapsed().as_millis() as u64;

            self.events.emit(
                LogEvent::info("llm_step")
                    .session(&session_tag)
                    .purpose(purpose)
                    .provider(&response.provider)
                    .model(&response.model)
                    .ms(elapsed_ms)
                    .details(serde_json::json!({
                        "step": ledger.steps_used,
                        "finish_reason": response.finish_reason,
                        "total_tokens": response.usage.total_tokens,
                    })),
            );

            usage_total = usage_total.add(&response.usage);
            ledger = ledger.book_usage(&response.usage);

            messages.push(response.message.clone());
            clamp_messages(&mut messages, keep_last_n);

            let tool_calls = response.message.tool_calls().to_vec();
            last_response = Some(response);

            if tool_calls.is_empty() {
                self.emit_done(&session_tag, purpose, &ledger, &usage_total, "stop");
                let final_response = last_response.expect("response assigned this iteration");
                return Ok(ToolLoopOutcome {
                    final_response,
                    messages,
                    usage_total,
                    steps_used: ledger.steps_used,
                    tool_calls_used: ledger.tool_calls_used,
                });
            }

            // Process every suggested call strictly in order. A denial
            // never short-circuits its siblings; a booking failure
            // aborts the whole run.
            for call in &tool_calls {
                self.events.emit(
                    LogEvent::info("tool_suggested")
                        .session(&session_tag)
                        .purpose(purpose)
                        .details(serde_json::json!({ "tool": call.name, "id": call.id })),
                );

                let kind = classify_tool(&call.name);
                if kind == ToolKind::Write && !ledger.can_call_tool(kind) {
                    self.events.emit(
                        LogEvent::new(LogLevel::Warn, "write_budget_exceeded")
                            .session(&session_tag)
                            .purpose(purpose)
                            .details(serde_json::json!({ "tool": call.name })),
                    );
                }
                ledger = ledger.book_tool_call(kind)?;

                self.events.emit(
                    LogEvent::info("toolloop_approve_prompt")
                        .session(&session_tag)
                        .details(serde_json::json!({ "tool": call.name, "id": call.id })),
                );
                let approved = tokio::select! {
                    _ = self.cancel.cancelled() => {
                        return Err(Error::Cancelled("approval cancelled".into()));
                    }
                    decision = approval.approve(call) => decision,
                };

                let outcome = if !approved {
                    warn!(session = %session_tag, tool = %call.name, "Tool call denied");
                    self.events.emit(
                        LogEvent::info("tool_denied")
                            .session(&session_tag)
                            .details(serde_json::json!({ "tool": call.name, "id": call.id })),
                    );
                    ToolOutcome::denied(&call.name)
                } else {
                    self.events.emit(
                        LogEvent::info("tool_approved")
                            .session(&session_tag)
                            .details(serde_json::json!({ "tool": call.name, "id": call.id })),
                    );
                    self.events.emit(
                        LogEvent::info("tool_exec")
                            .session(&session_tag)
                            .purpose(purpose)
                            .details(serde_json::json!({ "tool": call.name, "id": call.id })),
                    );

                    let started = Instant::now();
                    let outcome = tokio::select! {
                        _ = self.cancel.cancelled() => {
                            return Err(Error::Cancelled("tool execution cancelled".into()));
                        }
                        outcome = self.registry.dispatch(call, purpose) => outcome,
                    };
                    self.events.emit(
                        LogEvent::info("tool_result")
                            .session(&session_tag)
                            .ms(started.elapsed().as_millis() as u64)
                            .details(serde_json::json!({
                                "tool": call.name,
                                "id": call.id,
                                "ok": outcome.ok,
                            })),
                    );
                    outcome
                };

                // Exactly one Tool message per suggested call, always
                // before the next model call.
                messages.push(Message::tool_result(&call.name, &call.id, outcome.to_json()));
                clamp_messages(&mut messages, keep_last_n);
            }
        }
    }

    fn emit_done(
        &self,
        session_tag: &str,
        purpose: toolforge_core::Purpose,
        ledger: &BudgetLedger,
        usage_total: &Usage,
        reason: &str,
    ) {
        self.events.emit(
            LogEvent::info("toolloop_done")
                .session(session_tag)
                .purpose(purpose)
                .details(serde_json::json!({
                    "reason": reason,
                    "steps_used": ledger.steps_used,
                    "tool_calls_used": ledger.tool_calls_used,
                    "total_tokens": usage_total.total_tokens,
                })),
        );
    }
}

/// Keep only the last `n` messages when a cap is configured.
fn clamp_messages(messages: &mut Vec<Message>, keep_last_n: Option<usize>) {
    if let Some(n) = keep_last_n
        && messages.len() > n
    {
        let drop = messages.len() - n;
        messages.drain(..drop);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::{ApproveAll, DenyNamed};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use toolforge_core::error::{BudgetError, ProviderError};
    use toolforge_core::message::ToolCall;
    use toolforge_core::provider::FinishReason;
    use toolforge_policy::Policy;

    /// A provider that replays a fixed script of responses.
    struct ScriptedProvider {
        script: Mutex<VecDeque<LlmResponse>>,
    }

    impl ScriptedProvider {
        fn new(script: Vec<LlmResponse>) -> Self {
            Self {
                script: Mutex::new(script.into()),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn chat(&self, _request: &LlmRequest) -> Result<LlmResponse, ProviderError> {
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| ProviderError::MalformedResponse("script exhausted".into()))
        }
    }

    /// A provider that never completes until cancelled.
    struct HangingProvider;

    #[async_trait]
    impl LlmProvider for HangingProvider {
        fn name(&self) -> &str {
            "hanging"
        }

        async fn chat(&self, _request: &LlmRequest) -> Result<LlmResponse, ProviderError> {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
            unreachable!("provider should have been cancelled")
        }
    }

    fn stop_response(text: &str) -> LlmResponse {
        LlmResponse {
            provider: "scripted".into(),
            model: "scripted-1".into(),
            text: text.into(),
            message: Message::assistant(text),
            usage: Usage::new(10, 5),
            finish_reason: FinishReason::Stop,
            response_id: None,
        }
    }

    fn tool_response(calls: Vec<ToolCall>) -> LlmResponse {
        LlmResponse {
            provider: "scripted".into(),
            model: "scripted-1".into(),
            text: String::new(),
            message: Message::assistant_with_tools("", calls),
            usage: Usage::new(10, 5),
            finish_reason: FinishReason::ToolCall,
            response_id: None,
        }
    }

    fn registry_in(dir: &std::path::Path) -> Arc<ToolRegistry> {
        Arc::new(ToolRegistry::with_builtins(Arc::new(Policy::new(dir))))
    }

    fn request(text: &str) -> LlmRequest {
        LlmRequest::new(vec![Message::user(text)])
    }

    #[tokio::test]
    async fn list_read_summarize_scenario() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("notes")).unwrap();
        std::fs::write(dir.path().join("notes/test.txt"), "meeting at noon").unwrap();

        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_response(vec![ToolCall::new("c1", "list_dir", r#"{"path":"notes"}"#)]),
            tool_response(vec![ToolCall::new(
                "c2",
                "read_file",
                r#"{"path":"notes/test.txt"}"#,
            )]),
            stop_response("The note says: meeting at noon."),
        ]));
        let scheduler = ToolLoop::new(provider, registry_in(dir.path()));

        let outcome = scheduler
            .run(
                request("Please list notes, then read notes/test.txt and summarize."),
                &ApproveAll,
                BudgetLimits::new(5, 5),
                None,
            )
            .await
            .unwrap();

        assert_eq!(outcome.steps_used, 3);
        assert_eq!(outcome.tool_calls_used, 2);
        assert_eq!(outcome.final_response.finish_reason, FinishReason::Stop);
        // Three per-call totals of 15 each.
        assert_eq!(outcome.usage_total.total_tokens, 45);

        // user + (assistant + tool) * 2 + assistant
        assert_eq!(outcome.messages.len(), 6);
        let tool_messages: Vec<&Message> = outcome
            .messages
            .iter()
            .filter(|m| m.role() == "tool")
            .collect();
        assert_eq!(tool_messages.len(), 2);
        assert!(tool_messages[1].content().contains("meeting at noon"));
    }

    #[tokio::test]
    async fn every_tool_call_gets_exactly_one_tool_message() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_response(vec![
                ToolCall::new("a", "calculator", r#"{"expression":"1+1"}"#),
                ToolCall::new("b", "calculator", r#"{"expression":"2+2"}"#),
            ]),
            stop_response("done"),
        ]));
        let scheduler = ToolLoop::new(provider, registry_in(dir.path()));

        let outcome = scheduler
            .run(request("math"), &ApproveAll, BudgetLimits::new(3, 4), None)
            .await
            .unwrap();

        for call_id in ["a", "b"] {
            let matching: Vec<&Message> = outcome
                .messages
                .iter()
                .filter(|m| matches!(m, Message::Tool { tool_call_id, .. } if tool_call_id == call_id))
                .collect();
            assert_eq!(matching.len(), 1, "call {call_id} should have one result");
        }
    }

    #[tokio::test]
    async fn budget_halt_returns_last_response() {
        let dir = tempfile::tempdir().unwrap();
        // The model would keep calling tools forever; the step budget stops it.
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_response(vec![ToolCall::new("c1", "calculator", r#"{"expression":"1"}"#)]),
            tool_response(vec![ToolCall::new("c2", "calculator", r#"{"expression":"2"}"#)]),
            tool_response(vec![ToolCall::new("c3", "calculator", r#"{"expression":"3"}"#)]),
        ]));
        let scheduler = ToolLoop::new(provider, registry_in(dir.path()));

        let outcome = scheduler
            .run(request("loop"), &ApproveAll, BudgetLimits::new(2, 10), None)
            .await
            .unwrap();

        assert_eq!(outcome.steps_used, 2);
        assert_eq!(outcome.tool_calls_used, 2);
        assert_eq!(
            outcome.final_response.finish_reason,
            FinishReason::ToolCall
        );
    }

    #[tokio::test]
    async fn zero_token_budget_fails_before_first_call() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(ScriptedProvider::new(vec![stop_response("unused")]));
        let scheduler = ToolLoop::new(provider, registry_in(dir.path()));

        let limits = BudgetLimits::new(3, 3).with_max_total_tokens(0);
        let err = scheduler
            .run(request("hi"), &ApproveAll, limits, None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Budget(BudgetError::ExhaustedBeforeFirstCall)
        ));
    }

    #[tokio::test]
    async fn denial_records_outcome_without_short_circuiting_siblings() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("notes")).unwrap();
        std::fs::write(dir.path().join("notes/a.txt"), "content").unwrap();

        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_response(vec![
                ToolCall::new(
                    "w1",
                    "write_file",
                    r#"{"path":"data/outputs/x.txt","content":"A"}"#,
                ),
                ToolCall::new("r1", "read_file", r#"{"path":"notes/a.txt"}"#),
            ]),
            stop_response("done"),
        ]));
        let scheduler = ToolLoop::new(provider, registry_in(dir.path()));

        let gate = DenyNamed::new(["write_file"]);
        let outcome = scheduler
            .run(request("write then read"), &gate, BudgetLimits::new(3, 4), None)
            .await
            .unwrap();

        let write_result = outcome
            .messages
            .iter()
            .find(|m| matches!(m, Message::Tool { tool_call_id, .. } if tool_call_id == "w1"))
            .unwrap();
        assert!(write_result
            .content()
            .contains("Tool call denied by policy/approval."));
        // The denied call never executed.
        assert!(!dir.path().join("data/outputs/x.txt").exists());

        // The sibling read still ran.
        let read_result = outcome
            .messages
            .iter()
            .find(|m| matches!(m, Message::Tool { tool_call_id, .. } if tool_call_id == "r1"))
            .unwrap();
        assert!(read_result.content().contains(r#""ok":true"#));
        assert!(read_result.content().contains("content"));
    }

    #[tokio::test]
    async fn tool_budget_booking_failure_aborts_run() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(ScriptedProvider::new(vec![tool_response(vec![
            ToolCall::new("c1", "calculator", r#"{"expression":"1"}"#),
        ])]));
        let scheduler = ToolLoop::new(provider, registry_in(dir.path()));

        let err = scheduler
            .run(request("go"), &ApproveAll, BudgetLimits::new(3, 0), None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Budget(BudgetError::ToolCallsExhausted { .. })
        ));
    }

    #[tokio::test]
    async fn keep_last_n_clamps_history() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_response(vec![
                ToolCall::new("a", "calculator", r#"{"expression":"1+1"}"#),
                ToolCall::new("b", "calculator", r#"{"expression":"2+2"}"#),
            ]),
            stop_response("done"),
        ]));
        let scheduler = ToolLoop::new(provider, registry_in(dir.path()));

        let outcome = scheduler
            .run(request("math"), &ApproveAll, BudgetLimits::new(3, 4), Some(3))
            .await
            .unwrap();

        assert_eq!(outcome.messages.len(), 3);
    }

    #[tokio::test]
    async fn cancellation_surfaces_as_error() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let scheduler = ToolLoop::new(Arc::new(HangingProvider), registry_in(dir.path()))
            .with_cancellation(cancel.clone());

        let handle = tokio::spawn(async move {
            scheduler
                .run(request("hang"), &ApproveAll, BudgetLimits::new(3, 3), None)
                .await
        });

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        cancel.cancel();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Cancelled(_)));
    }

    #[tokio::test]
    async fn unknown_tool_keeps_loop_alive() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_response(vec![ToolCall::new("c1", "no_such_tool", "{}")]),
            stop_response("recovered"),
        ]));
        let scheduler = ToolLoop::new(provider, registry_in(dir.path()));

        let outcome = scheduler
            .run(request("go"), &ApproveAll, BudgetLimits::new(3, 3), None)
            .await
            .unwrap();

        assert_eq!(outcome.final_response.text, "recovered");
        let tool_msg = outcome
            .messages
            .iter()
            .find(|m| m.role() == "tool")
            .unwrap();
        assert!(tool_msg.content().contains(r#""ok":false"#));
        assert!(tool_msg.content().contains("Tool not found"));
    }
}
