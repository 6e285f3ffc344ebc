//! Built-in tool implementations for Toolforge.
//!
//! Tools give the agent the ability to act on the host: read and write
//! files, list directories, evaluate arithmetic, and run allowlisted
//! commands. Every invocation funnels through a single registry
//! dispatch; any error — bad arguments, policy rejection, I/O failure —
//! is translated into a structured `{ ok: false }` outcome so the loop
//! can show it to the model. No exception escapes the registry.

pub mod calculator;
pub mod list_dir;
pub mod read_file;
pub mod run_cmd;
pub mod write_file;

pub use calculator::CalculatorTool;
pub use list_dir::ListDirTool;
pub use read_file::ReadFileTool;
pub use run_cmd::RunCmdTool;
pub use write_file::WriteFileTool;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use toolforge_core::error::ToolError;
use toolforge_core::{Purpose, ToolCall, ToolDefinition, ToolOutcome};
use toolforge_policy::Policy;

/// The core Tool trait.
///
/// Each tool implements this and is registered in the `ToolRegistry`.
/// `execute` returns the tool's structured result payload; the registry
/// wraps it into a `ToolOutcome`.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g. "read_file").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments under the given purpose.
    async fn execute(
        &self,
        arguments: serde_json::Value,
        purpose: Purpose,
    ) -> Result<serde_json::Value, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of available tools with a single dispatch point.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// A registry holding the five built-in tools, all sharing one
    /// policy engine.
    pub fn with_builtins(policy: Arc<Policy>) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(ReadFileTool::new(policy.clone())));
        registry.register(Box::new(ListDirTool::new(policy.clone())));
        registry.register(Box::new(WriteFileTool::new(policy.clone())));
        registry.register(Box::new(CalculatorTool));
        registry.register(Box::new(RunCmdTool::new(policy)));
        registry
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// All tool definitions (for sending to the LLM), sorted by name so
    /// the list is stable across runs.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.values().map(|t| t.definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Execute a tool call. This is the only entry point the scheduler
    /// uses; every failure becomes a structured outcome.
    pub async fn dispatch(&self, call: &ToolCall, purpose: Purpose) -> ToolOutcome {
        let Some(tool) = self.get(&call.name) else {
            return ToolOutcome::err(&call.name, format!("Tool not found: {}", call.name));
        };

        let arguments: serde_json::Value = match serde_json::from_str(&call.arguments) {
            Ok(serde_json::Value::Object(map)) => serde_json::Value::Object(map),
            Ok(other) => {
                return ToolOutcome::err(
                    &call.name,
                    format!("Tool arguments must be a JSON object, got: {other}"),
                );
            }
            Err(e) => {
                return ToolOutcome::err(&call.name, format!("Malformed tool arguments: {e}"));
            }
        };

        match tool.execute(arguments, purpose).await {
            Ok(result) => ToolOutcome::ok(&call.name, result),
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool execution failed");
                ToolOutcome::err(&call.name, e.to_string())
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Pull a required string argument out of a JSON object.
pub(crate) fn require_str<'a>(
    arguments: &'a serde_json::Value,
    key: &str,
) -> Result<&'a str, ToolError> {
    arguments[key]
        .as_str()
        .ok_or_else(|| ToolError::InvalidArguments(format!("Missing '{key}' argument")))
}
