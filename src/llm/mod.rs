//! Access to the generative text model.
//!
//! The pipeline treats inference as an opaque capability: hand over a
//! prompt, get text back, or learn that the service is unavailable. Callers
//! recover from every failure here, so implementations should report errors
//! rather than retry.

mod explain;
mod ollama;

pub use explain::{build_explain_prompt, explain_sql};
pub use ollama::OllamaClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Decoding parameters forwarded to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    #[serde(default)]
    pub stop: Vec<String>,
}

impl SamplingOptions {
    /// Settings for SQL generation: near-greedy, stopping at the first
    /// statement boundary.
    pub fn for_sql() -> Self {
        Self {
            temperature: 0.1,
            top_p: 0.9,
            max_tokens: 500,
            stop: vec!["\n\n".into(), "```".into(), ";".into()],
        }
    }

    pub fn for_explanation() -> Self {
        Self {
            temperature: 0.3,
            top_p: 0.9,
            max_tokens: 500,
            stop: vec!["\n\n".into(), "```".into()],
        }
    }
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self::for_sql()
    }
}

#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Model identifier, for logs.
    fn model(&self) -> &str;

    /// Complete `prompt`. Any failure is `Error::InferenceUnavailable`.
    async fn generate(&self, prompt: &str, options: &SamplingOptions) -> Result<String>;

    /// Cheap reachability probe.
    async fn is_available(&self) -> bool;
}
