//! Policy engine for Toolforge — a purpose-aware sandbox over paths and
//! commands.
//!
//! Provides:
//! - **Path validation**: every filesystem path a tool touches is
//!   trimmed, normalized, resolved under the project root, and checked
//!   against denied segments, secret-holder filenames, read/write prefix
//!   tables, and symlinks.
//! - **Command validation**: subprocess commands must exactly match a
//!   closed allowlist.
//! - **Tool classification**: read/write/other, feeding the budget
//!   ledger's kind-specific caps.

pub mod classify;
pub mod command;
pub mod path;

pub use classify::classify_tool;
pub use command::{CommandPolicy, DEFAULT_ALLOWED_COMMANDS};
pub use path::{validate_path, Access};

use std::path::{Path, PathBuf};

use toolforge_core::error::PolicyError;
use toolforge_core::Purpose;

/// The policy engine: a project root plus a command allowlist.
///
/// One instance is shared by the whole tool registry.
#[derive(Debug, Clone)]
pub struct Policy {
    root: PathBuf,
    commands: CommandPolicy,
}

impl Policy {
    /// A policy rooted at the given project directory with the default
    /// command allowlist.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            commands: CommandPolicy::new(),
        }
    }

    /// Replace the command allowlist (tests and embedding callers).
    pub fn with_commands(mut self, commands: CommandPolicy) -> Self {
        self.commands = commands;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Validate a path for reading.
    pub fn validate_read(&self, input: &str) -> Result<PathBuf, PolicyError> {
        validate_path(&self.root, input, Access::Read, Purpose::Default)
    }

    /// Validate a path for writing under the given purpose.
    pub fn validate_write(&self, input: &str, purpose: Purpose) -> Result<PathBuf, PolicyError> {
        validate_path(&self.root, input, Access::Write, purpose)
    }

    /// Validate a subprocess command; returns the canonical string.
    pub fn validate_command(&self, command: &str) -> Result<String, PolicyError> {
        self.commands.validate(command)
    }
}
