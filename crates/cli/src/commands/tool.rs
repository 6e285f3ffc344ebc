//! `toolforge tool` — execute a single tool manually through the
//! registry, with the same policy checks the model-driven path gets.

use std::sync::Arc;

use toolforge_config::AppConfig;
use toolforge_core::message::ToolCall;
use toolforge_core::provider::Purpose;
use toolforge_core::{Error, Result};
use toolforge_policy::Policy;
use toolforge_tools::ToolRegistry;

#[derive(clap::Args)]
pub struct ToolArgs {
    /// Tool name (read_file | list_dir | write_file | calculator | run_cmd)
    pub name: String,

    /// Path argument (read_file, list_dir, write_file)
    #[arg(long)]
    pub path: Option<String>,

    /// Content argument (write_file)
    #[arg(long)]
    pub content: Option<String>,

    /// Replace an existing file (write_file)
    #[arg(long)]
    pub overwrite: bool,

    /// Command argument (run_cmd)
    #[arg(long)]
    pub command: Option<String>,

    /// Expression argument (calculator)
    #[arg(long)]
    pub expression: Option<String>,

    /// Run with elevated write permissions
    #[arg(long)]
    pub dev: bool,
}

pub async fn run(args: ToolArgs) -> Result<()> {
    let config = AppConfig::load()?;
    let policy = Arc::new(Policy::new(&config.project_root));
    let registry = ToolRegistry::with_builtins(policy);

    let mut arguments = serde_json::Map::new();
    if let Some(path) = &args.path {
        arguments.insert("path".into(), serde_json::json!(path));
    }
    if let Some(content) = &args.content {
        arguments.insert("content".into(), serde_json::json!(content));
    }
    if args.overwrite {
        arguments.insert("overwrite".into(), serde_json::json!(true));
    }
    if let Some(command) = &args.command {
        arguments.insert("command".into(), serde_json::json!(command));
    }
    if let Some(expression) = &args.expression {
        arguments.insert("expression".into(), serde_json::json!(expression));
    }

    let call = ToolCall::new(
        "manual",
        &args.name,
        serde_json::Value::Object(arguments).to_string(),
    );
    let purpose = if args.dev {
        Purpose::Dev
    } else {
        Purpose::Default
    };

    let outcome = registry.dispatch(&call, purpose).await;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    if outcome.ok {
        Ok(())
    } else {
        Err(Error::Internal(
            outcome.error.unwrap_or_else(|| "tool failed".into()),
        ))
    }
}
