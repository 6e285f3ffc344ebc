//! The tool-loop scheduler — the heart of Toolforge.
//!
//! One run is a bounded cycle:
//!
//! 1. **Check** the budget, then **book** one model call
//! 2. **Send** the current messages (plus tool definitions) to the provider
//! 3. **If tool calls**: classify → book → approve → execute each in
//!    order, appending exactly one Tool message per call
//! 4. **If no tool calls**: the assistant turn is final — return it
//!
//! Denied calls never execute and never short-circuit their siblings;
//! budget exhaustion between steps returns the last response instead of
//! failing; a booking failure mid-turn aborts the run.

pub mod approval;
pub mod tool_loop;

pub use approval::{ApprovalGate, ApproveAll, DenyAll, DenyNamed};
pub use tool_loop::{ToolLoop, ToolLoopOutcome};
