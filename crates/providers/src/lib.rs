//! LLM provider adapters for Toolforge.
//!
//! Each adapter translates the canonical `LlmRequest`/`LlmResponse`
//! shape to one provider's native wire format; the router selects the
//! adapter by name, resolving defaults from the request's purpose.
//! Provider-shaped data never leaks past this crate.

pub mod anthropic;
pub mod grok;
pub mod router;

pub use anthropic::AnthropicProvider;
pub use grok::GrokProvider;
pub use router::{build_from_config, default_provider_for, ProviderRouter};
