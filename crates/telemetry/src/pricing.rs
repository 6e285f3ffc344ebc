//! Cost estimation from per-provider USD-per-1M-token rates.
//!
//! Rates come from configuration (`COST_<PROVIDER>_USD_PER_1M_IN|OUT`).
//! Estimates feed the event log and the bot's optional usage footer;
//! nothing gates on them.

use std::collections::HashMap;

use toolforge_config::CostRate;
use toolforge_core::Usage;

/// Per-provider pricing table.
#[derive(Debug, Clone, Default)]
pub struct Pricing {
    rates: HashMap<String, CostRate>,
}

impl Pricing {
    pub fn new(rates: HashMap<String, CostRate>) -> Self {
        Self { rates }
    }

    pub fn from_config(config: &toolforge_config::AppConfig) -> Self {
        Self::new(config.costs.clone())
    }

    /// Estimated USD for the given usage, or `None` when no rate is
    /// configured for the provider.
    pub fn estimate(&self, provider: &str, usage: &Usage) -> Option<f64> {
        let rate = self.rates.get(provider)?;
        Some(
            (usage.input_tokens as f64 * rate.usd_per_1m_in
                + usage.output_tokens as f64 * rate.usd_per_1m_out)
                / 1_000_000.0,
        )
    }
}
