//! Question-to-SQL pipeline: analyze the schema, read the question, prompt
//! the model, and accept its answer or fall back to a template.

pub mod analyzer;
pub mod fallback;
pub mod format;
pub mod intent;
pub mod prompt;
pub mod sanitize;

pub use analyzer::{analyze, Analysis};
pub use fallback::{schema_fallback, TRIVIAL_FALLBACK};
pub use format::format_sql;
pub use intent::{classify, Aggregation, Intent, IntentKind, SortDirection};
pub use prompt::build_prompt;
pub use sanitize::{accept, sanitize, validate, validate_for_execution, ExecutionVerdict};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::db::Table;
use crate::llm::{InferenceClient, SamplingOptions};

/// Where a synthesized statement came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlSource {
    Generated,
    SchemaFallback,
    TrivialFallback,
}

#[derive(Debug, Clone)]
pub struct Synthesis {
    pub sql: String,
    pub source: SqlSource,
    pub analysis: Option<Analysis>,
    pub intent: Option<Intent>,
}

#[derive(Debug, Clone, Default)]
pub struct Synthesizer {
    options: SamplingOptions,
}

impl Synthesizer {
    pub fn new(options: SamplingOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &SamplingOptions {
        &self.options
    }

    /// Turn `question` into a statement. Never fails: inference errors and
    /// rejected output degrade to the schema fallback, and an empty schema
    /// yields `SELECT 1;`.
    pub async fn generate(
        &self,
        question: &str,
        tables: &[Table],
        inference: Option<&dyn InferenceClient>,
    ) -> Synthesis {
        if tables.is_empty() {
            warn!("no schema available, returning trivial statement");
            return Synthesis {
                sql: TRIVIAL_FALLBACK.to_string(),
                source: SqlSource::TrivialFallback,
                analysis: None,
                intent: None,
            };
        }

        let analysis = analyze(tables);
        let intent = classify(question, &analysis);
        debug!(?intent, "classified question");

        let generated = match inference {
            Some(client) => self.ask_model(client, question, &analysis, &intent).await,
            None => {
                info!("no inference client configured, using schema fallback");
                None
            }
        };

        let (sql, source) = match generated {
            Some(sql) => (sql, SqlSource::Generated),
            None => (schema_fallback(&analysis, &intent), SqlSource::SchemaFallback),
        };

        Synthesis {
            sql: format_sql(&sql),
            source,
            analysis: Some(analysis),
            intent: Some(intent),
        }
    }

    async fn ask_model(
        &self,
        client: &dyn InferenceClient,
        question: &str,
        analysis: &Analysis,
        intent: &Intent,
    ) -> Option<String> {
        let prompt = build_prompt(question, analysis, intent);
        info!(model = client.model(), prompt_len = prompt.len(), "generating SQL");

        let raw = match client.generate(&prompt, &self.options).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("generation failed, using schema fallback: {}", e);
                return None;
            }
        };
        debug!(raw = %raw, "model output");

        match accept(&raw) {
            Ok(sql) => {
                info!("accepted generated SQL");
                Some(sql)
            }
            Err(e) => {
                warn!("{}, using schema fallback", e);
                None
            }
        }
    }
}
