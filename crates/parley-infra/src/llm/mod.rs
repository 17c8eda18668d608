//! LLM provider implementations.
//!
//! Contains the concrete [`LlmProvider`](parley_core::llm::provider::LlmProvider)
//! implementation for OpenAI-compatible endpoints, and a factory
//! ([`create_provider`]) that builds it from [`ProviderSettings`].

pub mod openrouter;

use parley_core::llm::box_provider::BoxLlmProvider;
use parley_types::config::ProviderSettings;
use parley_types::llm::LlmError;

use self::openrouter::OpenRouterProvider;

/// Create a [`BoxLlmProvider`] from [`ProviderSettings`].
///
/// The API key is read from the environment variable named by
/// `settings.api_key_env`.
///
/// # Errors
///
/// Returns [`LlmError::InvalidRequest`] when the key variable is unset.
pub fn create_provider(settings: &ProviderSettings) -> Result<BoxLlmProvider, LlmError> {
    let provider = OpenRouterProvider::from_env(settings)?;
    tracing::info!(
        provider = %settings.name,
        base_url = %settings.base_url,
        "model transport configured"
    );
    Ok(BoxLlmProvider::new(provider))
}
