//! Error types for the Toolforge domain.
//!
//! Uses `thiserror` for ergonomic error definitions. Each bounded
//! context has its own error enum; the top-level `Error` aggregates
//! them, and `classify` maps any error to a closed set of kinds for
//! logging and surface-level handling.

use thiserror::Error;

/// The top-level error type for all Toolforge operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Policy violation: {0}")]
    Policy(#[from] PolicyError),

    #[error("Budget refused: {0}")]
    Budget(#[from] BudgetError),

    #[error("Session store error: {0}")]
    Session(#[from] SessionError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("Provider credentials missing: {0}")]
    MissingCredentials(String),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Permission denied: {tool_name} — {reason}")]
    PermissionDenied { tool_name: String, reason: String },
}

/// A policy-engine rejection. Never retried within a run.
///
/// Each variant names the triggering rule; `rule()` yields the rule's
/// short name for logs and tests.
#[derive(Debug, Clone, Error)]
pub enum PolicyError {
    #[error("path is empty")]
    EmptyPath,

    #[error("absolute paths are not allowed: '{path}'")]
    AbsolutePath { path: String },

    #[error("path escapes the project root: '{path}'")]
    Traversal { path: String },

    #[error("path segment '{segment}' is denied: '{path}'")]
    DeniedSegment { path: String, segment: String },

    #[error("file '{file}' may hold secrets and is denied: '{path}'")]
    DeniedFile { path: String, file: String },

    #[error("{access} path not allowed: '{path}'")]
    PrefixNotAllowed { path: String, access: String },

    #[error("symlinks are not allowed: '{path}'")]
    Symlink { path: String },

    #[error("command is empty")]
    EmptyCommand,

    #[error("command not in allowlist: '{command}'")]
    CommandNotAllowed { command: String },
}

impl PolicyError {
    /// The short name of the rule that fired.
    pub fn rule(&self) -> &'static str {
        match self {
            PolicyError::EmptyPath | PolicyError::DeniedFile { .. } => "file",
            PolicyError::AbsolutePath { .. } => "absolute",
            PolicyError::Traversal { .. } => "traversal",
            PolicyError::DeniedSegment { .. } => "segment",
            PolicyError::PrefixNotAllowed { .. } => "prefix",
            PolicyError::Symlink { .. } => "symlink",
            PolicyError::EmptyCommand | PolicyError::CommandNotAllowed { .. } => "command",
        }
    }
}

/// A ledger booking refused. Never retried within a run.
#[derive(Debug, Clone, Error)]
pub enum BudgetError {
    #[error("step budget exhausted ({used}/{max})")]
    StepsExhausted { used: u32, max: u32 },

    #[error("token budget exhausted ({used} used, cap {max})")]
    TokensExhausted { used: u64, max: u64 },

    #[error("tool call budget exhausted ({used}/{max})")]
    ToolCallsExhausted { used: u32, max: u32 },

    #[error("{kind} budget exhausted ({used}/{max})")]
    KindExhausted {
        kind: &'static str,
        used: u32,
        max: u32,
    },

    #[error("budget exhausted before first model call")]
    ExhaustedBeforeFirstCall,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),

    #[error("session store I/O failed at {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("session document malformed at {path}: {reason}")]
    Malformed { path: String, reason: String },

    #[error("invalid session id: {0}")]
    InvalidId(String),
}

#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("required environment variable missing: {0}")]
    MissingEnv(String),

    #[error("failed to read config at {path}: {reason}")]
    ReadError { path: String, reason: String },

    #[error("failed to parse config at {path}: {reason}")]
    ParseError { path: String, reason: String },

    #[error("configuration validation failed: {0}")]
    Validation(String),
}

// --- Classification ---

/// The closed set of error kinds every caught error maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    ConfigMissingEnv,
    ConfigMissingKey,
    Network,
    Auth,
    ModelNotFound,
    Policy,
    Budget,
    Unknown,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::ConfigMissingEnv => "config_missing_env",
            ErrorClass::ConfigMissingKey => "config_missing_key",
            ErrorClass::Network => "network",
            ErrorClass::Auth => "auth",
            ErrorClass::ModelNotFound => "model_not_found",
            ErrorClass::Policy => "policy",
            ErrorClass::Budget => "budget",
            ErrorClass::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map any caught error to its kind.
pub fn classify(err: &Error) -> ErrorClass {
    match err {
        Error::Config(ConfigError::MissingEnv(_)) => ErrorClass::ConfigMissingEnv,
        Error::Provider(ProviderError::MissingCredentials(_)) => ErrorClass::ConfigMissingKey,
        Error::Provider(ProviderError::Network(_)) | Error::Provider(ProviderError::Timeout(_)) => {
            ErrorClass::Network
        }
        Error::Provider(ProviderError::AuthenticationFailed(_)) => ErrorClass::Auth,
        Error::Provider(ProviderError::ApiError { status_code: 401, .. }) => ErrorClass::Auth,
        Error::Provider(ProviderError::ModelNotFound(_)) => ErrorClass::ModelNotFound,
        Error::Policy(_) => ErrorClass::Policy,
        Error::Budget(_) => ErrorClass::Budget,
        Error::Tool(ToolError::PermissionDenied { .. }) => ErrorClass::Policy,
        _ => ErrorClass::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_rules_are_named() {
        assert_eq!(
            PolicyError::Traversal {
                path: "../x".into()
            }
            .rule(),
            "traversal"
        );
        assert_eq!(
            PolicyError::DeniedSegment {
                path: ".git/config".into(),
                segment: ".git".into()
            }
            .rule(),
            "segment"
        );
        assert_eq!(
            PolicyError::CommandNotAllowed {
                command: "rm -rf /".into()
            }
            .rule(),
            "command"
        );
    }

    #[test]
    fn classify_missing_env() {
        let err = Error::Config(ConfigError::MissingEnv("GROK_API_KEY".into()));
        assert_eq!(classify(&err), ErrorClass::ConfigMissingEnv);
    }

    #[test]
    fn classify_missing_credentials() {
        let err = Error::Provider(ProviderError::MissingCredentials("grok".into()));
        assert_eq!(classify(&err), ErrorClass::ConfigMissingKey);
    }

    #[test]
    fn classify_auth_from_status() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 401,
            message: "bad key".into(),
        });
        assert_eq!(classify(&err), ErrorClass::Auth);
    }

    #[test]
    fn classify_policy_and_budget_terminal_kinds() {
        let err = Error::Policy(PolicyError::EmptyPath);
        assert_eq!(classify(&err), ErrorClass::Policy);

        let err = Error::Budget(BudgetError::ExhaustedBeforeFirstCall);
        assert_eq!(classify(&err), ErrorClass::Budget);
    }

    #[test]
    fn classify_fallback_is_unknown() {
        let err = Error::Internal("weird".into());
        assert_eq!(classify(&err), ErrorClass::Unknown);
        assert_eq!(ErrorClass::Unknown.as_str(), "unknown");
    }

    #[test]
    fn error_displays_carry_context() {
        let err = Error::Policy(PolicyError::PrefixNotAllowed {
            path: "etc/passwd".into(),
            access: "write".into(),
        });
        assert!(err.to_string().contains("write path not allowed"));
        assert!(err.to_string().contains("etc/passwd"));
    }
}
