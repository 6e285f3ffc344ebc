//! The approval gate — one boolean answer per tool call.
//!
//! The contract looks synchronous but may suspend: the terminal surface
//! binds it to a blocking stdin prompt, the bot surface to an
//! inline-button continuation held in a keyed pending map with a TTL.

use async_trait::async_trait;

use toolforge_core::ToolCall;

/// Answers whether a suggested tool call may execute.
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    async fn approve(&self, call: &ToolCall) -> bool;
}

/// Approves everything. Used for heartbeat/runtime purposes and tests.
pub struct ApproveAll;

#[async_trait]
impl ApprovalGate for ApproveAll {
    async fn approve(&self, _call: &ToolCall) -> bool {
        true
    }
}

/// Denies everything.
pub struct DenyAll;

#[async_trait]
impl ApprovalGate for DenyAll {
    async fn approve(&self, _call: &ToolCall) -> bool {
        false
    }
}

/// Approves or denies per tool name; unlisted tools are approved.
pub struct DenyNamed {
    denied: Vec<String>,
}

impl DenyNamed {
    pub fn new(denied: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            denied: denied.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl ApprovalGate for DenyNamed {
    async fn approve(&self, call: &ToolCall) -> bool {
        !self.denied.iter().any(|d| d == &call.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fixed_gates() {
        let call = ToolCall::new("c1", "read_file", "{}");
        assert!(ApproveAll.approve(&call).await);
        assert!(!DenyAll.approve(&call).await);
    }

    #[tokio::test]
    async fn deny_named_targets_specific_tools() {
        let gate = DenyNamed::new(["write_file"]);
        assert!(!gate.approve(&ToolCall::new("c1", "write_file", "{}")).await);
        assert!(gate.approve(&ToolCall::new("c2", "read_file", "{}")).await);
    }
}
