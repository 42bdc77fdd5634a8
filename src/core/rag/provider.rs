// Port trait for the model server (embeddings + text generation).
//
// The RAG service only talks to this trait; the Ollama HTTP client in
// infra/ is the production implementation. No retries happen at this
// layer - retry policy belongs to whoever calls the service.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model server request failed: {0}")]
    Request(String),

    #[error("Model server response missing `{0}` field")]
    MissingField(&'static str),
}

/// Health report for the model server. Reachability failure is reported
/// as a degraded status, never as an error.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ModelHealth {
    Ok { models: Vec<String> },
    Error { message: String },
}

#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Generate an embedding vector for the given text.
    async fn embed(&self, text: &str, model: &str) -> Result<Vec<f32>, ModelError>;

    /// Generate a text completion for the given prompt.
    /// Implementations trim surrounding whitespace from the result.
    async fn generate(
        &self,
        prompt: &str,
        model: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, ModelError>;

    /// Check whether the model server is reachable and list its models.
    async fn health_check(&self) -> ModelHealth;
}

// Blanket implementation for Box<dyn ModelProvider>
// This allows trait objects where the concrete provider is chosen at runtime.
#[async_trait]
impl ModelProvider for Box<dyn ModelProvider> {
    async fn embed(&self, text: &str, model: &str) -> Result<Vec<f32>, ModelError> {
        (**self).embed(text, model).await
    }

    async fn generate(
        &self,
        prompt: &str,
        model: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, ModelError> {
        (**self).generate(prompt, model, temperature, max_tokens).await
    }

    async fn health_check(&self) -> ModelHealth {
        (**self).health_check().await
    }
}
