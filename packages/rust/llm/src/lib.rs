//! LLM-query capability for Brandlens.
//!
//! - [`LlmClient`] is the injected capability; [`ChatClient`] talks to any
//!   OpenAI-compatible endpoint and [`MockLlmClient`] answers from a script.
//! - [`select_client`] picks a provider with fallback.
//! - [`run_bounded`] fans independent calls out under a semaphore.
//! - [`parse_model_output`] turns raw text into `Parsed | Malformed`.

pub mod client;
pub mod json;
pub mod mock;
pub mod parallel;
pub mod provider;

pub use client::{ChatClient, LlmClient, LlmResponse};
pub use json::{first_json_value, parse_model_output, strip_wrappers};
pub use mock::MockLlmClient;
pub use parallel::run_bounded;
pub use provider::{ResolvedProvider, resolve_provider, resolve_provider_with, select_client};
