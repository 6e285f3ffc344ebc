//! Telegram bot surface.
//!
//! Maps each chat to the session `tg-<chat_id>`, handles the command
//! set (`/start`, `/help`, `/id`, `/reset`, `/dev`), enforces the chat
//! allowlist and admin sub-list, applies a per-chat cooldown, bridges
//! the scheduler's approval gate to two inline buttons held in a keyed
//! pending map with a TTL, and chunks long replies.
//!
//! The Bot API transport itself is behind `BotTransport`; production
//! wires it to long polling, tests use an in-process implementation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::{info, warn};
use uuid::Uuid;

use toolforge_agent::{ApprovalGate, ToolLoop};
use toolforge_config::TelegramConfig;
use toolforge_core::budget::{BudgetLimits, ToolKind};
use toolforge_core::error::classify;
use toolforge_core::message::Message;
use toolforge_core::provider::{LlmRequest, Purpose, RequestMeta};
use toolforge_core::ToolCall;
use toolforge_policy::classify_tool;
use toolforge_sessions::SessionStore;
use toolforge_telemetry::{EventLog, LogEvent, Pricing};

/// Outgoing messages longer than this are split.
pub const CHUNK_LIMIT: usize = 3_500;

/// The session id a chat maps to.
pub fn session_id_for_chat(chat_id: i64) -> String {
    format!("tg-{chat_id}")
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("message delivery failed: {0}")]
    DeliveryFailed(String),
}

/// The outbound half of the Bot API.
#[async_trait]
pub trait BotTransport: Send + Sync {
    /// Deliver a plain text message to a chat.
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), TransportError>;

    /// Deliver an approval request with `approve:<key>` / `deny:<key>`
    /// inline buttons.
    async fn send_approval_request(
        &self,
        chat_id: i64,
        key: &str,
        summary: &str,
    ) -> Result<(), TransportError>;
}

type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<bool>>>>;

/// Bridges the scheduler's one-boolean-per-call approval contract to
/// inline buttons: each call parks a continuation in the pending map
/// under a fresh key; the button callback resolves it, the TTL denies.
pub struct BotApprovalGate {
    chat_id: i64,
    is_admin: bool,
    transport: Arc<dyn BotTransport>,
    pending: PendingMap,
    ttl: Duration,
    events: Arc<EventLog>,
}

#[async_trait]
impl ApprovalGate for BotApprovalGate {
    async fn approve(&self, call: &ToolCall) -> bool {
        // Write operations require the admin sub-list; non-admins are
        // denied without a prompt.
        if classify_tool(&call.name) == ToolKind::Write && !self.is_admin {
            warn!(chat_id = self.chat_id, tool = %call.name, "Write denied: not an admin chat");
            return false;
        }

        let key = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(key.clone(), tx);

        let summary = format!(
            "Approve tool call `{}`?\nArguments: {}",
            call.name,
            preview(&call.arguments, 500)
        );
        if self
            .transport
            .send_approval_request(self.chat_id, &key, &summary)
            .await
            .is_err()
        {
            self.pending.lock().unwrap().remove(&key);
            return false;
        }

        self.events.emit(
            LogEvent::info("toolloop_approve_prompt")
                .session(session_id_for_chat(self.chat_id))
                .details(serde_json::json!({ "tool": call.name, "key": key })),
        );

        match tokio::time::timeout(self.ttl, rx).await {
            Ok(Ok(decision)) => decision,
            // Expired or dropped: the call counts as denied.
            _ => {
                self.pending.lock().unwrap().remove(&key);
                false
            }
        }
    }
}

/// The bot surface itself.
pub struct TelegramBot {
    config: TelegramConfig,
    transport: Arc<dyn BotTransport>,
    scheduler: Arc<ToolLoop>,
    sessions: SessionStore,
    limits: BudgetLimits,
    pricing: Pricing,
    events: Arc<EventLog>,
    pending: PendingMap,
    cooldowns: Mutex<HashMap<i64, Instant>>,
}

impl TelegramBot {
    pub fn new(
        config: TelegramConfig,
        transport: Arc<dyn BotTransport>,
        scheduler: Arc<ToolLoop>,
        sessions: SessionStore,
        limits: BudgetLimits,
    ) -> Self {
        Self {
            config,
            transport,
            scheduler,
            sessions,
            limits,
            pricing: Pricing::default(),
            events: Arc::new(EventLog::disabled()),
            pending: Arc::new(Mutex::new(HashMap::new())),
            cooldowns: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_pricing(mut self, pricing: Pricing) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn with_events(mut self, events: Arc<EventLog>) -> Self {
        self.events = events;
        self
    }

    /// Whether a chat may talk to the bot at all. An unconfigured
    /// allowlist admits everyone; a configured one is closed.
    pub fn is_allowed(&self, chat_id: i64) -> bool {
        match &self.config.allowed_chat_ids {
            None => true,
            Some(ids) => ids.contains(&chat_id),
        }
    }

    /// Whether a chat may approve write operations.
    pub fn is_admin(&self, chat_id: i64) -> bool {
        self.config.admin_chat_ids.contains(&chat_id)
    }

    /// Entry point for an incoming text message.
    pub async fn handle_message(&self, chat_id: i64, text: &str) {
        if !self.is_allowed(chat_id) {
            warn!(chat_id, "Ignoring message from disallowed chat");
            return;
        }

        let text = text.trim();
        if text.is_empty() {
            return;
        }

        if let Some(command) = text.strip_prefix('/') {
            self.handle_command(chat_id, command).await;
            return;
        }

        if let Some(wait) = self.cooldown_remaining(chat_id) {
            self.send(chat_id, &format!("⏳ Please wait {}s between messages.", wait.as_secs().max(1)))
                .await;
            return;
        }

        self.run_and_reply(chat_id, text, Purpose::Default).await;
    }

    /// Entry point for an inline-button callback (`approve:<key>` or
    /// `deny:<key>`).
    pub async fn handle_callback(&self, chat_id: i64, data: &str) {
        if !self.is_allowed(chat_id) {
            return;
        }

        let (decision, key) = match data.split_once(':') {
            Some(("approve", key)) => (true, key),
            Some(("deny", key)) => (false, key),
            _ => {
                warn!(chat_id, data, "Ignoring malformed callback");
                return;
            }
        };

        let sender = self.pending.lock().unwrap().remove(key);
        match sender {
            Some(tx) => {
                let event = if decision { "tool_approved" } else { "tool_denied" };
                self.events.emit(
                    LogEvent::info(event)
                        .session(session_id_for_chat(chat_id))
                        .details(serde_json::json!({ "key": key })),
                );
                let _ = tx.send(decision);
            }
            None => {
                // Pressed after the TTL already resolved it.
                self.send(chat_id, "This approval has expired.").await;
            }
        }
    }

    async fn handle_command(&self, chat_id: i64, command: &str) {
        let (name, rest) = command
            .split_once(char::is_whitespace)
            .unwrap_or((command, ""));

        match name {
            "start" | "help" => {
                self.send(
                    chat_id,
                    "I'm a tool-running assistant.\n\
                     /id — show your chat and session ids\n\
                     /reset — forget this conversation\n\
                     /dev <text> — run with elevated permissions (admins)\n\
                     Anything else is a normal message.",
                )
                .await;
            }
            "id" => {
                self.send(
                    chat_id,
                    &format!(
                        "chat id: {chat_id}\nsession: {}",
                        session_id_for_chat(chat_id)
                    ),
                )
                .await;
            }
            "reset" => {
                let session_id = session_id_for_chat(chat_id);
                match self.sessions.delete(&session_id) {
                    Ok(true) => self.send(chat_id, "Session reset.").await,
                    Ok(false) => self.send(chat_id, "Nothing to reset.").await,
                    Err(e) => self.report_error(chat_id, &e.into()).await,
                }
            }
            "dev" => {
                if !self.is_admin(chat_id) {
                    self.send(chat_id, "❗ /dev is restricted to admin chats.").await;
                    return;
                }
                if rest.trim().is_empty() {
                    self.send(chat_id, "Usage: /dev <text>").await;
                    return;
                }
                self.run_and_reply(chat_id, rest.trim(), Purpose::Dev).await;
            }
            _ => {
                self.send(chat_id, "Unknown command. Try /help.").await;
            }
        }
    }

    fn cooldown_remaining(&self, chat_id: i64) -> Option<Duration> {
        let window = Duration::from_secs(self.config.rate_limit_seconds);
        if window.is_zero() {
            return None;
        }
        let mut cooldowns = self.cooldowns.lock().unwrap();
        let now = Instant::now();
        if let Some(last) = cooldowns.get(&chat_id) {
            let elapsed = now.duration_since(*last);
            if elapsed < window {
                return Some(window - elapsed);
            }
        }
        cooldowns.insert(chat_id, now);
        None
    }

    async fn run_and_reply(&self, chat_id: i64, text: &str, purpose: Purpose) {
        info!(chat_id, purpose = %purpose, "Bot turn starting");
        match self.run_turn(chat_id, text, purpose).await {
            Ok(reply) => {
                for chunk in chunk_message(&reply, CHUNK_LIMIT) {
                    self.send(chat_id, &chunk).await;
                }
            }
            Err(e) => self.report_error(chat_id, &e).await,
        }
    }

    async fn run_turn(
        &self,
        chat_id: i64,
        text: &str,
        purpose: Purpose,
    ) -> Result<String, toolforge_core::Error> {
        let session_id = session_id_for_chat(chat_id);
        let mut session = self.sessions.get_or_create(Some(&session_id))?;
        session.push(Message::user(text));

        let mut request = LlmRequest::new(session.messages.clone()).with_purpose(purpose);
        request.meta = Some(RequestMeta {
            request_id: None,
            trace_id: Some(session_id.clone()),
        });
        if purpose == Purpose::Dev {
            request.temperature = Some(0.7);
        }

        let gate = BotApprovalGate {
            chat_id,
            is_admin: self.is_admin(chat_id),
            transport: self.transport.clone(),
            pending: self.pending.clone(),
            ttl: Duration::from_secs(self.config.approval_ttl_seconds),
            events: self.events.clone(),
        };

        let outcome = self.scheduler.run(request, &gate, self.limits, None).await?;

        // Persist the full interleaved trace.
        session.messages = outcome.messages;
        self.sessions.save(&mut session)?;

        let mut reply = outcome.final_response.text.clone();
        if reply.trim().is_empty() {
            reply = "(the model returned no text)".into();
        }
        if self.config.show_usage {
            let cost = self
                .pricing
                .estimate(&outcome.final_response.provider, &outcome.usage_total)
                .map(|usd| format!(", ~${usd:.4}"))
                .unwrap_or_default();
            reply.push_str(&format!(
                "\n\n— {} tokens in {} steps{}",
                outcome.usage_total.total_tokens, outcome.steps_used, cost
            ));
        }
        Ok(reply)
    }

    async fn report_error(&self, chat_id: i64, error: &toolforge_core::Error) {
        let class = classify(error);
        self.events.emit(
            LogEvent::error("error")
                .session(session_id_for_chat(chat_id))
                .error_class(class)
                .message(error.to_string()),
        );
        self.send(chat_id, &format!("❗ Error: {error}")).await;
    }

    async fn send(&self, chat_id: i64, text: &str) {
        if let Err(e) = self.transport.send_text(chat_id, text).await {
            warn!(chat_id, error = %e, "Failed to deliver bot message");
        }
    }
}

/// Split a message into chunks of at most `limit` characters, breaking
/// on line boundaries where possible.
pub fn chunk_message(text: &str, limit: usize) -> Vec<String> {
    if text.chars().count() <= limit {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len > limit && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if line_len > limit {
            // A single oversized line is split hard.
            let mut buf = String::new();
            let mut buf_len = 0;
            for c in line.chars() {
                if buf_len == limit {
                    chunks.push(std::mem::take(&mut buf));
                    buf_len = 0;
                }
                buf.push(c);
                buf_len += 1;
            }
            if !buf.is_empty() {
                current = buf;
                current_len = buf_len;
            }
        } else {
            current.push_str(line);
            current_len += line_len;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{cut}…")
    }
}
