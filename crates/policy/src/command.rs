//! Command validation — a closed allowlist of exact command strings.
//!
//! Unlike first-token allowlisting, the *entire* command string must
//! match an allowlist entry; there is no argument freedom and no shell
//! interpretation downstream.

use toolforge_core::error::PolicyError;

/// The default closed allowlist: dependency-manager test/build
/// invocations, the type-checker dry run, and the version-control
/// status query.
pub const DEFAULT_ALLOWED_COMMANDS: &[&str] =
    &["cargo test", "cargo build", "cargo check", "git status"];

/// An exact-string command allowlist.
#[derive(Debug, Clone)]
pub struct CommandPolicy {
    allowed: Vec<String>,
}

impl CommandPolicy {
    /// The default allowlist.
    pub fn new() -> Self {
        Self {
            allowed: DEFAULT_ALLOWED_COMMANDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    /// A custom allowlist (tests and embedding callers).
    pub fn with_allowed(allowed: Vec<String>) -> Self {
        Self { allowed }
    }

    /// Validate a command string; returns the canonical (trimmed) form.
    pub fn validate(&self, command: &str) -> Result<String, PolicyError> {
        let trimmed = command.trim();
        if trimmed.is_empty() {
            return Err(PolicyError::EmptyCommand);
        }
        if self.allowed.iter().any(|a| a == trimmed) {
            Ok(trimmed.to_string())
        } else {
            Err(PolicyError::CommandNotAllowed {
                command: trimmed.to_string(),
            })
        }
    }

    pub fn allowed(&self) -> &[String] {
        &self.allowed
    }
}

impl Default for CommandPolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_allowlisted_commands_pass() {
        let policy = CommandPolicy::new();
        assert_eq!(policy.validate("git status").unwrap(), "git status");
        assert_eq!(policy.validate("  cargo test  ").unwrap(), "cargo test");
    }

    #[test]
    fn empty_command_rejected() {
        let policy = CommandPolicy::new();
        let err = policy.validate("   ").unwrap_err();
        assert_eq!(err.rule(), "command");
    }

    #[test]
    fn arguments_break_the_exact_match() {
        let policy = CommandPolicy::new();
        // First-token matching would let these through; exact matching does not.
        assert!(policy.validate("git status --porcelain").is_err());
        assert!(policy.validate("cargo test -- --nocapture").is_err());
        assert!(policy.validate("rm -rf /").is_err());
    }

    #[test]
    fn custom_allowlist() {
        let policy = CommandPolicy::with_allowed(vec!["sleep 30".into()]);
        assert!(policy.validate("sleep 30").is_ok());
        assert!(policy.validate("git status").is_err());
    }
}
