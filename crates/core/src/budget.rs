//! Budget ledger — tracks and gates step/token/tool-kind consumption.
//!
//! The ledger is pure functional state: every booking operation consumes
//! the ledger and returns a new one. One instance lives per scheduler
//! run and is discarded at loop end. Callers must always *check* before
//! *booking*; a booking failure is a caller bug, never a recovery path.

use serde::{Deserialize, Serialize};

use crate::error::BudgetError;

/// Classification of a tool for budgeting purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    Read,
    Write,
    Other,
}

impl ToolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::Read => "read",
            ToolKind::Write => "write",
            ToolKind::Other => "other",
        }
    }
}

/// Limits for one scheduler run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetLimits {
    /// Maximum model invocations; normalized to at least 1.
    pub max_steps: u32,

    /// Maximum tool executions across the run.
    pub max_tool_calls: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_total_tokens: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_input_tokens: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_reads: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_writes: Option<u32>,
}

impl BudgetLimits {
    pub fn new(max_steps: u32, max_tool_calls: u32) -> Self {
        Self {
            max_steps,
            max_tool_calls,
            max_total_tokens: None,
            max_input_tokens: None,
            max_output_tokens: None,
            max_reads: None,
            max_writes: None,
        }
    }

    pub fn with_max_writes(mut self, max: u32) -> Self {
        self.max_writes = Some(max);
        self
    }

    pub fn with_max_reads(mut self, max: u32) -> Self {
        self.max_reads = Some(max);
        self
    }

    pub fn with_max_total_tokens(mut self, max: u64) -> Self {
        self.max_total_tokens = Some(max);
        self
    }
}

impl Default for BudgetLimits {
    fn default() -> Self {
        Self::new(8, 16)
    }
}

/// The ledger itself. All counters are non-negative and monotone within
/// one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetLedger {
    pub limits: BudgetLimits,
    pub steps_used: u32,
    pub tool_calls_used: u32,
    pub reads_used: u32,
    pub writes_used: u32,
    pub total_tokens_used: u64,
    pub total_input_tokens_used: u64,
    pub total_output_tokens_used: u64,
}

impl BudgetLedger {
    /// Create a fresh ledger, normalizing the limits (`max_steps ≥ 1`).
    pub fn create(mut limits: BudgetLimits) -> Self {
        limits.max_steps = limits.max_steps.max(1);
        Self {
            limits,
            steps_used: 0,
            tool_calls_used: 0,
            reads_used: 0,
            writes_used: 0,
            total_tokens_used: 0,
            total_input_tokens_used: 0,
            total_output_tokens_used: 0,
        }
    }

    /// True iff another model call fits: steps remain and every
    /// configured token cap is strictly not yet met.
    pub fn can_call_model(&self) -> bool {
        if self.steps_used >= self.limits.max_steps {
            return false;
        }
        if let Some(cap) = self.limits.max_total_tokens
            && self.total_tokens_used >= cap
        {
            return false;
        }
        if let Some(cap) = self.limits.max_input_tokens
            && self.total_input_tokens_used >= cap
        {
            return false;
        }
        if let Some(cap) = self.limits.max_output_tokens
            && self.total_output_tokens_used >= cap
        {
            return false;
        }
        true
    }

    /// True iff another tool call of the given kind fits.
    pub fn can_call_tool(&self, kind: ToolKind) -> bool {
        if self.tool_calls_used >= self.limits.max_tool_calls {
            return false;
        }
        match kind {
            ToolKind::Read => self
                .limits
                .max_reads
                .is_none_or(|cap| self.reads_used < cap),
            ToolKind::Write => self
                .limits
                .max_writes
                .is_none_or(|cap| self.writes_used < cap),
            ToolKind::Other => true,
        }
    }

    /// Book one model call. Requires `can_call_model`.
    pub fn book_model_call(self) -> Result<Self, BudgetError> {
        if !self.can_call_model() {
            if self.steps_used >= self.limits.max_steps {
                return Err(BudgetError::StepsExhausted {
                    used: self.steps_used,
                    max: self.limits.max_steps,
                });
            }
            return Err(BudgetError::TokensExhausted {
                used: self.total_tokens_used,
                max: self.limits.max_total_tokens.unwrap_or(0),
            });
        }
        Ok(Self {
            steps_used: self.steps_used + 1,
            ..self
        })
    }

    /// Book one tool call of the given kind. Requires `can_call_tool`.
    pub fn book_tool_call(self, kind: ToolKind) -> Result<Self, BudgetError> {
        if !self.can_call_tool(kind) {
            if self.tool_calls_used >= self.limits.max_tool_calls {
                return Err(BudgetError::ToolCallsExhausted {
                    used: self.tool_calls_used,
                    max: self.limits.max_tool_calls,
                });
            }
            let (used, max) = match kind {
                ToolKind::Read => (self.reads_used, self.limits.max_reads.unwrap_or(0)),
                ToolKind::Write => (self.writes_used, self.limits.max_writes.unwrap_or(0)),
                ToolKind::Other => (0, 0),
            };
            return Err(BudgetError::KindExhausted {
                kind: kind.as_str(),
                used,
                max,
            });
        }
        let mut next = self;
        next.tool_calls_used += 1;
        match kind {
            ToolKind::Read => next.reads_used += 1,
            ToolKind::Write => next.writes_used += 1,
            ToolKind::Other => {}
        }
        Ok(next)
    }

    /// Accumulate usage unconditionally. Post-booking state may exceed a
    /// token cap (the call already happened); that forbids the *next*
    /// model call.
    pub fn book_usage(self, usage: &crate::provider::Usage) -> Self {
        Self {
            total_tokens_used: self.total_tokens_used + usage.total_tokens,
            total_input_tokens_used: self.total_input_tokens_used + usage.input_tokens,
            total_output_tokens_used: self.total_output_tokens_used + usage.output_tokens,
            ..self
        }
    }
}
