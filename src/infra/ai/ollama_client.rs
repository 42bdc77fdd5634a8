use crate::core::rag::{ModelError, ModelHealth, ModelProvider};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

/// Ceiling for embedding and generation calls. There is no retry here;
/// callers decide whether a failed call is worth repeating.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// HTTP client for a locally hosted Ollama server.
pub struct OllamaClient {
    client: Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Pull a model from the Ollama registry. Maintenance operation, not in
    /// the request hot path.
    #[allow(dead_code)]
    pub async fn pull_model(&self, model: &str) -> Result<(), ModelError> {
        let url = format!("{}/api/pull", self.base_url);
        let payload = json!({
            "name": model,
            "stream": false,
        });

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ModelError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ModelError::Request(format!(
                "Pull of model {} failed: {}",
                model,
                response.status()
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl ModelProvider for OllamaClient {
    async fn embed(&self, text: &str, model: &str) -> Result<Vec<f32>, ModelError> {
        let url = format!("{}/api/embeddings", self.base_url);
        let payload = json!({
            "model": model,
            "prompt": text,
        });

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ModelError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ModelError::Request(format!(
                "Ollama embeddings error: {} - {}",
                status, text
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ModelError::Request(e.to_string()))?;

        let embedding = body
            .get("embedding")
            .and_then(|v| v.as_array())
            .ok_or(ModelError::MissingField("embedding"))?;

        Ok(embedding
            .iter()
            .filter_map(|v| v.as_f64())
            .map(|v| v as f32)
            .collect())
    }

    async fn generate(
        &self,
        prompt: &str,
        model: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, ModelError> {
        let url = format!("{}/api/generate", self.base_url);
        let payload = json!({
            "model": model,
            "prompt": prompt,
            "stream": false,
            "temperature": temperature,
            "top_p": 0.9,
            "top_k": 40,
            "num_predict": max_tokens,
        });

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ModelError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ModelError::Request(format!(
                "Ollama generate error: {} - {}",
                status, text
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ModelError::Request(e.to_string()))?;

        let content = body
            .get("response")
            .and_then(|v| v.as_str())
            .ok_or(ModelError::MissingField("response"))?;

        Ok(content.trim().to_string())
    }

    async fn health_check(&self) -> ModelHealth {
        let url = format!("{}/api/tags", self.base_url);

        let result = async {
            let response = self.client.get(&url).send().await?.error_for_status()?;
            response.json::<serde_json::Value>().await
        }
        .await;

        match result {
            Ok(body) => {
                let models = body
                    .get("models")
                    .and_then(|v| v.as_array())
                    .map(|models| {
                        models
                            .iter()
                            .filter_map(|m| m.get("name").and_then(|n| n.as_str()))
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                ModelHealth::Ok { models }
            }
            Err(err) => ModelHealth::Error {
                message: format!("Ollama server not accessible: {}", err),
            },
        }
    }
}
