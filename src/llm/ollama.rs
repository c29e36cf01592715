use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{InferenceClient, SamplingOptions};
use crate::config::InferenceConfig;
use crate::error::{Error, Result};

/// Client for a local Ollama server (`/api/generate`, non-streaming).
pub struct OllamaClient {
    http: reqwest::Client,
    host: String,
    model: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions<'a>,
}

#[derive(Serialize)]
struct GenerateOptions<'a> {
    temperature: f32,
    top_p: f32,
    num_predict: u32,
    stop: &'a [String],
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}

impl OllamaClient {
    pub fn new(config: &InferenceConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            host: config.host.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    /// Names of the models the server has pulled.
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let tags: TagsResponse = self
            .http
            .get(format!("{}/api/tags", self.host))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::InferenceUnavailable(e.to_string()))?
            .json()
            .await
            .map_err(|e| Error::InferenceUnavailable(e.to_string()))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

#[async_trait]
impl InferenceClient for OllamaClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, options: &SamplingOptions) -> Result<String> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: options.temperature,
                top_p: options.top_p,
                num_predict: options.max_tokens,
                stop: &options.stop,
            },
        };
        debug!(model = %self.model, prompt_len = prompt.len(), "sending generate request");

        let response = self
            .http
            .post(format!("{}/api/generate", self.host))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::InferenceUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let truncated: String = body.chars().take(200).collect();
            return Err(Error::InferenceUnavailable(format!(
                "HTTP {}: {}",
                status, truncated
            )));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::InferenceUnavailable(e.to_string()))?;
        Ok(body.response)
    }

    async fn is_available(&self) -> bool {
        match self.list_models().await {
            Ok(models) => {
                let wanted = self.model.as_str();
                if models.iter().any(|m| m == wanted) {
                    info!(model = wanted, "model is available");
                } else {
                    warn!(model = wanted, available = ?models, "model not pulled on server");
                }
                true
            }
            Err(e) => {
                warn!("inference service unreachable: {}", e);
                false
            }
        }
    }
}
