// src/provider.rs
//! Generation provider seam. The orchestrator and dispatcher only see this
//! trait; the concrete Gemini client lives in `gemini_client.rs` and tests
//! substitute scripted implementations.

use crate::errors::ProviderError;
use async_trait::async_trait;
use std::time::Duration;

/// An opaque, possibly-failing text generation capability. One prompt in,
/// one completion out; no retry policy is built into the contract.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError>;
}

/// Run a generation call under the deployment-configured deadline. A call
/// that exceeds it is a provider failure, not a silent hang.
pub async fn generate_with_timeout(
    provider: &dyn GenerationProvider,
    prompt: &str,
    timeout: Duration,
) -> Result<String, ProviderError> {
    match tokio::time::timeout(timeout, provider.generate(prompt)).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout(timeout.as_secs())),
    }
}
