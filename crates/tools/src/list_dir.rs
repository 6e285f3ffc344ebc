//! Directory listing tool — direct children only, entry-count capped.

use std::sync::Arc;

use async_trait::async_trait;

use toolforge_core::error::ToolError;
use toolforge_core::Purpose;
use toolforge_policy::Policy;

use crate::{require_str, Tool};

/// At most this many entries are returned; the rest set the `capped` flag.
const MAX_ENTRIES: usize = 200;

pub struct ListDirTool {
    policy: Arc<Policy>,
}

impl ListDirTool {
    pub fn new(policy: Arc<Policy>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "List the direct children of a project directory. Returns at most 200 entries."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Project-relative directory to list"
                }
            },
            "required": ["path"],
            "additionalProperties": false
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        _purpose: Purpose,
    ) -> Result<serde_json::Value, ToolError> {
        let path = require_str(&arguments, "path")?;

        let resolved = self
            .policy
            .validate_read(path)
            .map_err(|e| ToolError::PermissionDenied {
                tool_name: "list_dir".into(),
                reason: e.to_string(),
            })?;

        let mut reader = tokio::fs::read_dir(&resolved)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "list_dir".into(),
                reason: format!("Failed to list directory: {e}"),
            })?;

        let mut entries = Vec::new();
        let mut total = 0usize;
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "list_dir".into(),
                reason: format!("Failed to read directory entry: {e}"),
            })?
        {
            total += 1;
            if entries.len() >= MAX_ENTRIES {
                continue;
            }
            let kind = match entry.file_type().await {
                Ok(ft) if ft.is_dir() => "dir",
                Ok(ft) if ft.is_file() => "file",
                Ok(ft) if ft.is_symlink() => "symlink",
                _ => "other",
            };
            entries.push(serde_json::json!({
                "name": entry.file_name().to_string_lossy(),
                "type": kind,
            }));
        }

        entries.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));

        Ok(serde_json::json!({
            "path": path,
            "entries": entries,
            "capped": total > MAX_ENTRIES,
        }))
    }
}
