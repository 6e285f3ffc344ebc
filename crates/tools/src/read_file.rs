//! File read tool — size-capped, secret-redacting UTF-8 reads.

use std::sync::Arc;

use async_trait::async_trait;

use toolforge_core::error::ToolError;
use toolforge_core::Purpose;
use toolforge_policy::Policy;

use crate::{require_str, Tool};

/// Files larger than this are rejected outright.
const MAX_FILE_BYTES: u64 = 200 * 1024;

/// Returned content is cut at this many characters.
const MAX_CONTENT_CHARS: usize = 4_000;

const TRUNCATION_MARKER: &str = "…[truncated]";

/// Replacement for redacted secret values.
const REDACTED: &str = "***REDACTED***";

/// Keys whose `=`-delimited values are redacted (case-insensitive).
const SECRET_KEYS: &[&str] = &[
    "API_KEY",
    "GROK_API_KEY",
    "OPENAI_API_KEY",
    "ANTHROPIC_API_KEY",
    "TOKEN",
    "SECRET",
    "PASSWORD",
];

pub struct ReadFileTool {
    policy: Arc<Policy>,
}

impl ReadFileTool {
    pub fn new(policy: Arc<Policy>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a UTF-8 text file inside the project. Secret-bearing lines are redacted and long content is truncated."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Project-relative path to read"
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
                tool_name: "read_file".into(),
                reason: e.to_string(),
            })?;

        let meta = tokio::fs::metadata(&resolved)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "read_file".into(),
                reason: format!("Failed to stat file: {e}"),
            })?;
        if meta.len() > MAX_FILE_BYTES {
            return Err(ToolError::ExecutionFailed {
                tool_name: "read_file".into(),
                reason: format!(
                    "File too large: {} bytes (limit {MAX_FILE_BYTES})",
                    meta.len()
                ),
            });
        }

        let raw = tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "read_file".into(),
                reason: format!("Failed to read file: {e}"),
            })?;

        let redacted = redact_secrets(&raw);
        let (content, truncated) = truncate_chars(&redacted, MAX_CONTENT_CHARS);

        Ok(serde_json::json!({
            "path": path,
            "bytes": meta.len(),
            "truncated": truncated,
            "content": content,
        }))
    }
}

/// Replace the value after any known secret key with a sentinel.
///
/// Matching is line-based: a line redacts when the text left of the
/// first `=` contains one of the keys, case-insensitively.
fn redact_secrets(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for (i, line) in input.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
        }
        match line.split_once('=') {
            Some((key, _value)) if is_secret_key(key) => {
                out.push_str(key);
                out.push('=');
                out.push_str(REDACTED);
            }
            _ => out.push_str(line),
        }
    }
    out
}

fn is_secret_key(key: &str) -> bool {
    let upper = key.trim().to_ascii_uppercase();
    SECRET_KEYS.iter().any(|s| upper.contains(s))
}

/// Cut at a character boundary, appending the marker when cut.
fn truncate_chars(input: &str, max_chars: usize) -> (String, bool) {
    if input.chars().count() <= max_chars {
        return (input.to_string(), false);
    }
    let cut: String = input.chars().take(max_chars).collect();
    (format!("{cut}{TRUNCATION_MARKER}"), true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolforge_policy::Policy;

    fn tool_in(dir: &std::path::Path) -> ReadFileTool {
        ReadFileTool::new(Arc::new(Policy::new(dir)))
    }

    #[test]
    fn tool_definition() {
        let tool = tool_in(std::path::Path::new("/tmp"));
        assert_eq!(tool.name(), "read_file");
        let schema = tool.parameters_schema();
        assert_eq!(schema["required"], serde_json::json!(["path"]));
    }

    #[tokio::test]
    async fn read_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("notes")).unwrap();
        std::fs::write(dir.path().join("notes/test.txt"), "Hello, world!").unwrap();

        let tool = tool_in(dir.path());
        let result = tool
            .execute(serde_json::json!({"path": "notes/test.txt"}), Purpose::Default)
            .await
            .unwrap();

        assert_eq!(result["content"], "Hello, world!");
        assert_eq!(result["bytes"], 13);
        assert_eq!(result["truncated"], false);
    }

    #[tokio::test]
    async fn missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let tool = tool_in(dir.path());
        let err = tool
            .execute(serde_json::json!({"path": "notes/none.txt"}), Purpose::Default)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("stat"));
    }

    #[tokio::test]
    async fn oversized_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("data")).unwrap();
        let big = "x".repeat((MAX_FILE_BYTES + 1) as usize);
        std::fs::write(dir.path().join("data/big.txt"), big).unwrap();

        let tool = tool_in(dir.path());
        let err = tool
            .execute(serde_json::json!({"path": "data/big.txt"}), Purpose::Default)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[tokio::test]
    async fn outside_read_prefixes_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("secrets.txt"), "x").unwrap();

        let tool = tool_in(dir.path());
        let err = tool
            .execute(serde_json::json!({"path": "secrets.txt"}), Purpose::Default)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::PermissionDenied { .. }));
    }

    #[tokio::test]
    async fn secret_lines_are_redacted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("notes")).unwrap();
        std::fs::write(
            dir.path().join("notes/config.txt"),
            "host=example.com\ngrok_api_key=sk-12345\nexport MY_TOKEN=abcdef\nplain line\n",
        )
        .unwrap();

        let tool = tool_in(dir.path());
        let result = tool
            .execute(
                serde_json::json!({"path": "notes/config.txt"}),
                Purpose::Default,
            )
            .await
            .unwrap();

        let content = result["content"].as_str().unwrap();
        assert!(content.contains("host=example.com"));
        assert!(content.contains(&format!("grok_api_key={REDACTED}")));
        assert!(content.contains(&format!("export MY_TOKEN={REDACTED}")));
        assert!(!content.contains("sk-12345"));
        assert!(!content.contains("abcdef"));
        assert!(content.contains("plain line"));
    }

    #[tokio::test]
    async fn long_content_truncated_with_marker() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("logs")).unwrap();
        std::fs::write(dir.path().join("logs/long.log"), "a".repeat(5_000)).unwrap();

        let tool = tool_in(dir.path());
        let result = tool
            .execute(serde_json::json!({"path": "logs/long.log"}), Purpose::Default)
            .await
            .unwrap();

        assert_eq!(result["truncated"], true);
        let content = result["content"].as_str().unwrap();
        assert!(content.ends_with(TRUNCATION_MARKER));
        assert_eq!(
            content.chars().count(),
            MAX_CONTENT_CHARS + TRUNCATION_MARKER.chars().count()
        );
    }

    #[tokio::test]
    async fn missing_path_argument() {
        let dir = tempfile::tempdir().unwrap();
        let tool = tool_in(dir.path());
        let err = tool.execute(serde_json::json!({}), Purpose::Default).await;
        assert!(matches!(err, Err(ToolError::InvalidArguments(_))));
    }

    #[test]
    fn redaction_is_line_scoped() {
        let input = "A=1\nSECRET=topsecret\nB=2";
        let out = redact_secrets(input);
        assert_eq!(out, format!("A=1\nSECRET={REDACTED}\nB=2"));
    }
}
