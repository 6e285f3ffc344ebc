//! Subprocess tool — runs allowlisted commands with hard bounds.
//!
//! The command string must exactly match the policy allowlist. The
//! binary is spawned directly (no shell interpretation): the first
//! token is the program, the rest are arguments. Stdin is closed,
//! stdout/stderr are captured and independently truncated, and the
//! child is killed with SIGKILL after the wall-clock deadline.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};

use toolforge_core::error::ToolError;
use toolforge_core::Purpose;
use toolforge_policy::Policy;

use crate::{require_str, Tool};

/// Wall-clock deadline before the child is killed.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Each captured stream is cut at this many characters.
const MAX_STREAM_CHARS: usize = 8_000;

pub struct RunCmdTool {
    policy: Arc<Policy>,
    timeout: Duration,
}

impl RunCmdTool {
    pub fn new(policy: Arc<Policy>) -> Self {
        Self {
            policy,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the deadline (tests).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Tool for RunCmdTool {
    fn name(&self) -> &str {
        "run_cmd"
    }

    fn description(&self) -> &str {
        "Run an allowlisted command directly (no shell). Output is captured and truncated; the process is killed after 10 seconds."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The exact allowlisted command to run"
                }
            },
            "required": ["command"],
            "additionalProperties": false
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        _purpose: Purpose,
    ) -> Result<serde_json::Value, ToolError> {
        let command = require_str(&arguments, "command")?;

        let canonical = self
            .policy
            .validate_command(command)
            .map_err(|e| ToolError::PermissionDenied {
                tool_name: "run_cmd".into(),
                reason: e.to_string(),
            })?;

        let mut parts = canonical.split_whitespace();
        let program = parts.next().ok_or_else(|| {
            ToolError::InvalidArguments("Command has no program token".into())
        })?;
        let args: Vec<&str> = parts.collect();

        debug!(command = %canonical, "Spawning subprocess");

        let mut child = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "run_cmd".into(),
                reason: format!("Failed to spawn '{program}': {e}"),
            })?;

        // Drain both pipes concurrently so a chatty child never blocks
        // on a full pipe buffer while we wait on it.
        let mut stdout_pipe = child.stdout.take().expect("stdout was piped");
        let mut stderr_pipe = child.stderr.take().expect("stderr was piped");
        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stdout_pipe.read_to_end(&mut buf).await;
            buf
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr_pipe.read_to_end(&mut buf).await;
            buf
        });

        let (exit_code, timed_out) = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) => (status.code().unwrap_or(-1), false),
            Ok(Err(e)) => {
                return Err(ToolError::ExecutionFailed {
                    tool_name: "run_cmd".into(),
                    reason: format!("Failed to wait on child: {e}"),
                });
            }
            Err(_) => {
                warn!(command = %canonical, timeout_secs = self.timeout.as_secs(), "Command deadline hit, killing child");
                let _ = child.start_kill();
                // Reap so no zombie survives the deadline.
                let _ = child.wait().await;
                (-1, true)
            }
        };

        let stdout_raw = stdout_task.await.unwrap_or_default();
        let stderr_raw = stderr_task.await.unwrap_or_default();

        let (stdout, stdout_truncated) =
            truncate_stream(&String::from_utf8_lossy(&stdout_raw), MAX_STREAM_CHARS);
        let (stderr, stderr_truncated) =
            truncate_stream(&String::from_utf8_lossy(&stderr_raw), MAX_STREAM_CHARS);

        Ok(serde_json::json!({
            "command": canonical,
            "exit_code": exit_code,
            "success": exit_code == 0 && !timed_out,
            "timed_out": timed_out,
            "stdout": stdout,
            "stderr": stderr,
            "stdout_truncated": stdout_truncated,
            "stderr_truncated": stderr_truncated,
        }))
    }
}

fn truncate_stream(input: &str, max_chars: usize) -> (String, bool) {
    if input.chars().count() <= max_chars {
        return (input.to_string(), false);
    }
    (input.chars().take(max_chars).collect(), true)
}
