//! File write tool — atomic, overwrite-gated writes under the write policy.

use std::sync::Arc;

use async_trait::async_trait;

use toolforge_core::error::ToolError;
use toolforge_core::Purpose;
use toolforge_policy::Policy;

use crate::{require_str, Tool};

pub struct WriteFileTool {
    policy: Arc<Policy>,
}

impl WriteFileTool {
    pub fn new(policy: Arc<Policy>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file under data/outputs (or src in dev mode). Fails on existing files unless overwrite is true."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Project-relative path to write"
                },
                "content": {
                    "type": "string",
                    "description": "The content to write"
                },
                "overwrite": {
                    "type": "boolean",
                    "description": "Replace an existing file (default false)"
                }
            },
            "required": ["path", "content"],
            "additionalProperties": false
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        purpose: Purpose,
    ) -> Result<serde_json::Value, ToolError> {
        let path = require_str(&arguments, "path")?;
        let content = require_str(&arguments, "content")?;
        let overwrite = arguments["overwrite"].as_bool().unwrap_or(false);

        let resolved = self
            .policy
            .validate_write(path, purpose)
            .map_err(|e| ToolError::PermissionDenied {
                tool_name: "write_file".into(),
                reason: e.to_string(),
            })?;

        if !overwrite && resolved.exists() {
            return Err(ToolError::ExecutionFailed {
                tool_name: "write_file".into(),
                reason: format!("File exists: '{path}' (pass overwrite to replace)"),
            });
        }

        let parent = resolved
            .parent()
            .ok_or_else(|| ToolError::ExecutionFailed {
                tool_name: "write_file".into(),
                reason: "Path has no parent directory".into(),
            })?
            .to_path_buf();

        tokio::fs::create_dir_all(&parent)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "write_file".into(),
                reason: format!("Failed to create directory: {e}"),
            })?;

        // Write-to-temp-then-rename within the same directory so a
        // crash never leaves a half-written target.
        let content = content.to_string();
        let resolved_clone = resolved.clone();
        let bytes_written = tokio::task::spawn_blocking(move || -> std::io::Result<usize> {
            use std::io::Write;
            let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
            tmp.write_all(content.as_bytes())?;
            tmp.flush()?;
            tmp.persist(&resolved_clone).map_err(|e| e.error)?;
            Ok(content.len())
        })
        .await
        .map_err(|e| ToolError::ExecutionFailed {
            tool_name: "write_file".into(),
            reason: format!("Write task failed: {e}"),
        })?
        .map_err(|e| ToolError::ExecutionFailed {
            tool_name: "write_file".into(),
            reason: format!("Failed to write file: {e}"),
        })?;

        Ok(serde_json::json!({
            "path": path,
            "bytes_written": bytes_written,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolforge_policy::Policy;

    fn tool_in(dir: &std::path::Path) -> WriteFileTool {
        WriteFileTool::new(Arc::new(Policy::new(dir)))
    }

    #[tokio::test]
    async fn write_and_verify() {
        let dir = tempfile::tempdir().unwrap();
        let tool = tool_in(dir.path());

        let result = tool
            .execute(
                serde_json::json!({"path": "data/outputs/x.txt", "content": "A"}),
                Purpose::Default,
            )
            .await
            .unwrap();

        assert_eq!(result["bytes_written"], 1);
        let on_disk = std::fs::read_to_string(dir.path().join("data/outputs/x.txt")).unwrap();
        assert_eq!(on_disk, "A");
    }

    #[tokio::test]
    async fn write_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let tool = tool_in(dir.path());

        let result = tool
            .execute(
                serde_json::json!({"path": "data/outputs/deep/nest/file.txt", "content": "nested"}),
                Purpose::Default,
            )
            .await
            .unwrap();

        assert_eq!(result["bytes_written"], 6);
        assert!(dir.path().join("data/outputs/deep/nest/file.txt").exists());
    }

    #[tokio::test]
    async fn existing_file_blocks_without_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let tool = tool_in(dir.path());
        let args = serde_json::json!({"path": "data/outputs/x.txt", "content": "A"});

        tool.execute(args.clone(), Purpose::Default).await.unwrap();

        // Second identical write must fail and leave the original intact.
        let err = tool.execute(args, Purpose::Default).await.unwrap_err();
        assert!(err.to_string().contains("File exists"));
        let on_disk = std::fs::read_to_string(dir.path().join("data/outputs/x.txt")).unwrap();
        assert_eq!(on_disk, "A");
    }

    #[tokio::test]
    async fn overwrite_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let tool = tool_in(dir.path());

        tool.execute(
            serde_json::json!({"path": "data/outputs/x.txt", "content": "A"}),
            Purpose::Default,
        )
        .await
        .unwrap();

        tool.execute(
            serde_json::json!({"path": "data/outputs/x.txt", "content": "B", "overwrite": true}),
            Purpose::Default,
        )
        .await
        .unwrap();

        let on_disk = std::fs::read_to_string(dir.path().join("data/outputs/x.txt")).unwrap();
        assert_eq!(on_disk, "B");
    }

    #[tokio::test]
    async fn write_outside_outputs_denied_and_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let tool = tool_in(dir.path());

        let err = tool
            .execute(
                serde_json::json!({"path": "notes/should-fail.txt", "content": "nope"}),
                Purpose::Default,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ToolError::PermissionDenied { .. }));
        assert!(err.to_string().contains("write path not allowed"));
        assert!(!dir.path().join("notes/should-fail.txt").exists());
        assert!(!dir.path().join("notes").exists());
    }

    #[tokio::test]
    async fn dev_purpose_may_write_src() {
        let dir = tempfile::tempdir().unwrap();
        let tool = tool_in(dir.path());

        tool.execute(
            serde_json::json!({"path": "src/generated.rs", "content": "// gen"}),
            Purpose::Dev,
        )
        .await
        .unwrap();

        assert!(dir.path().join("src/generated.rs").exists());
    }

    #[tokio::test]
    async fn missing_content_argument() {
        let dir = tempfile::tempdir().unwrap();
        let tool = tool_in(dir.path());
        let err = tool
            .execute(serde_json::json!({"path": "data/outputs/x.txt"}), Purpose::Default)
            .await;
        assert!(matches!(err, Err(ToolError::InvalidArguments(_))));
    }
}
