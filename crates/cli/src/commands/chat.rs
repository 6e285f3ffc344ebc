//! `toolforge chat` — one assistant turn or a full tool loop.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};

use toolforge_agent::{ApprovalGate, ToolLoop};
use toolforge_config::AppConfig;
use toolforge_core::budget::{BudgetLimits, ToolKind};
use toolforge_core::message::Message;
use toolforge_core::provider::{LlmProvider, LlmRequest, Purpose, RequestMeta};
use toolforge_core::{Result, ToolCall};
use toolforge_policy::{classify_tool, Policy};
use toolforge_providers::build_from_config;
use toolforge_sessions::SessionStore;
use toolforge_telemetry::EventLog;
use toolforge_tools::ToolRegistry;

#[derive(clap::Args)]
pub struct ChatArgs {
    /// The user message
    pub message: String,

    /// Session id to continue (a fresh UUID session otherwise)
    #[arg(long)]
    pub session: Option<String>,

    /// Run with elevated permissions (writes to src/ allowed)
    #[arg(long)]
    pub dev: bool,

    /// Run as a synthetic heartbeat ping
    #[arg(long, conflicts_with = "dev")]
    pub heartbeat: bool,

    /// System prompt for this conversation
    #[arg(long)]
    pub system: Option<String>,

    /// Let the model call tools in a budget-governed loop
    #[arg(long)]
    pub toolloop: bool,

    /// Maximum model calls in the loop
    #[arg(long = "steps", visible_alias = "max-steps", default_value_t = 8)]
    pub max_steps: u32,

    /// Maximum tool executions in the loop
    #[arg(long, default_value_t = 16)]
    pub max_tool_calls: u32,

    /// Hard cap on generated tokens per step
    #[arg(long, default_value_t = 1024)]
    pub max_output_tokens: u32,

    /// Auto-approve reads and listings (writes still confirm)
    #[arg(long)]
    pub yes: bool,

    /// Print the outcome as JSON
    #[arg(long)]
    pub json: bool,

    /// Provider override (grok | anthropic)
    #[arg(long)]
    pub provider: Option<String>,

    /// Model override
    #[arg(long)]
    pub model: Option<String>,

    /// Keep only the last N messages of history between steps
    #[arg(long)]
    pub keep_last: Option<usize>,
}

/// Approval bound to a blocking stdin prompt. `y`/`yes` confirms; with
/// auto-yes, reads and listings pass without a prompt but writes still
/// confirm.
pub struct PromptApproval {
    auto_yes: bool,
}

impl PromptApproval {
    pub fn new(auto_yes: bool) -> Self {
        Self { auto_yes }
    }
}

#[async_trait]
impl ApprovalGate for PromptApproval {
    async fn approve(&self, call: &ToolCall) -> bool {
        if self.auto_yes && classify_tool(&call.name) != ToolKind::Write {
            return true;
        }

        eprintln!("Tool call: {} {}", call.name, call.arguments);
        eprint!("Approve? [y/N] ");

        let mut line = String::new();
        let mut reader = BufReader::new(tokio::io::stdin());
        if reader.read_line(&mut line).await.is_err() {
            return false;
        }
        matches!(line.trim().to_lowercase().as_str(), "y" | "yes")
    }
}

pub async fn run(args: ChatArgs) -> Result<()> {
    let config = AppConfig::load()?;
    let router = Arc::new(build_from_config(&config));
    let policy = Arc::new(Policy::new(&config.project_root));
    let registry = Arc::new(ToolRegistry::with_builtins(policy));
    let events = Arc::new(EventLog::new(config.event_log_path()));
    let store = SessionStore::new(config.sessions_dir());

    let purpose = if args.dev {
        Purpose::Dev
    } else if args.heartbeat {
        Purpose::Heartbeat
    } else {
        Purpose::Default
    };

    let mut session = store.get_or_create(args.session.as_deref())?;

    if let Some(system) = &args.system {
        if matches!(session.messages.first(), Some(Message::System { .. })) {
            session.messages[0] = Message::system(system);
        } else {
            session.messages.insert(0, Message::system(system));
        }
    }
    session.push(Message::user(&args.message));

    let mut request = LlmRequest::new(session.messages.clone()).with_purpose(purpose);
    request.provider = args.provider.clone();
    request.model = args.model.clone();
    request.max_output_tokens = args.max_output_tokens;
    request.meta = Some(RequestMeta {
        request_id: None,
        trace_id: Some(session.id.clone()),
    });
    if purpose == Purpose::Dev {
        request.temperature = Some(0.7);
    }

    if args.toolloop {
        let provider: Arc<dyn LlmProvider> = router;
        let scheduler = ToolLoop::new(provider, registry).with_events(events);
        let limits = BudgetLimits::new(args.max_steps, args.max_tool_calls);
        let approval = PromptApproval::new(args.yes);

        let outcome = scheduler
            .run(request, &approval, limits, args.keep_last)
            .await?;

        session.messages = outcome.messages.clone();
        store.save(&mut session)?;

        if args.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "session": session.id,
                    "text": outcome.final_response.text,
                    "finish_reason": outcome.final_response.finish_reason,
                    "steps_used": outcome.steps_used,
                    "tool_calls_used": outcome.tool_calls_used,
                    "usage": outcome.usage_total,
                }))?
            );
        } else {
            println!("{}", outcome.final_response.text);
        }
    } else {
        // A plain assistant turn: tool calling disabled outright.
        request.tools = Some(Vec::new());
        let response = router.chat(&request).await.map_err(toolforge_core::Error::from)?;

        session.push(response.message.clone());
        store.save(&mut session)?;

        if args.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "session": session.id,
                    "text": response.text,
                    "finish_reason": response.finish_reason,
                    "usage": response.usage,
                }))?
            );
        } else {
            println!("{}", response.text);
        }
    }

    Ok(())
}
