//! Append-only JSONL event log.
//!
//! One JSON object per line at `logs/app.log`. The log is telemetry:
//! a write failure is swallowed (with a tracing warning) and must never
//! fail the run that emitted it.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::Utc;
use serde::Serialize;
use tracing::warn;

use toolforge_core::{ErrorClass, Purpose};

/// Severity of an event record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// One event record, serialized as a single JSONL line.
#[derive(Debug, Clone, Serialize)]
pub struct LogEvent {
    pub ts: String,

    pub level: LogLevel,

    pub event: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_class: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl LogEvent {
    pub fn new(level: LogLevel, event: impl Into<String>) -> Self {
        Self {
            ts: Utc::now().to_rfc3339(),
            level,
            event: event.into(),
            session: None,
            purpose: None,
            provider: None,
            model: None,
            ms: None,
            error_class: None,
            message: None,
            details: None,
        }
    }

    pub fn info(event: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, event)
    }

    pub fn error(event: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, event)
    }

    pub fn session(mut self, id: impl Into<String>) -> Self {
        self.session = Some(id.into());
        self
    }

    pub fn purpose(mut self, purpose: Purpose) -> Self {
        self.purpose = Some(purpose.as_str().to_string());
        self
    }

    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn ms(mut self, elapsed_ms: u64) -> Self {
        self.ms = Some(elapsed_ms);
        self
    }

    pub fn error_class(mut self, class: ErrorClass) -> Self {
        self.error_class = Some(class.as_str().to_string());
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// The append-only sink. Cloneable handles share one file lock.
pub struct EventLog {
    path: Option<PathBuf>,
    lock: Mutex<()>,
}

impl EventLog {
    /// An event log appending to the given path. The parent directory is
    /// created lazily on first emit.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            lock: Mutex::new(()),
        }
    }

    /// A sink that drops every event (tests, one-shot tool runs).
    pub fn disabled() -> Self {
        Self {
            path: None,
            lock: Mutex::new(()),
        }
    }

    /// Append one record. Failures are logged and swallowed.
    pub fn emit(&self, event: LogEvent) {
        let Some(path) = &self.path else {
            return;
        };

        let line = match serde_json::to_string(&event) {
            Ok(l) => l,
            Err(e) => {
                warn!(error = %e, "Failed to serialize log event");
                return;
            }
        };

        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());

        if let Some(parent) = path.parent()
            && let Err(e) = std::fs::create_dir_all(parent)
        {
            warn!(error = %e, "Failed to create log directory");
            return;
        }

        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut f| writeln!(f, "{line}"));

        if let Err(e) = result {
            warn!(error = %e, path = %path.display(), "Failed to append log event");
        }
    }
}
