//! # Toolforge Core
//!
//! Domain types, traits, and error definitions for the Toolforge agent
//! runtime. This crate has **zero framework dependencies** — it defines
//! the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every subsystem seam is defined as a trait or value type here.
//! Implementations live in their respective crates. This enables:
//! - Swapping providers and approval gates via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod budget;
pub mod error;
pub mod message;
pub mod provider;

// Re-export key types at crate root for ergonomics
pub use budget::{BudgetLedger, BudgetLimits, ToolKind};
pub use error::{classify, Error, ErrorClass, Result};
pub use message::{Message, Session, ToolCall, ToolOutcome, DENIED_BY_APPROVAL};
pub use provider::{
    FinishReason, LlmProvider, LlmRequest, LlmResponse, Purpose, RequestMeta, ToolDefinition,
    Usage,
};
