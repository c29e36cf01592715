//! Explicit, independent sessions. Each owns one connection, the catalog
//! reader for its engine, the last schema analysis and a query history.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{
    apply_limit, catalog_for, connect, introspect, CatalogAdapter, Connection, ConnectionConfig,
    Engine, QueryResult, Table,
};
use crate::error::{Error, Result};
use crate::history::{HistoryEntry, QueryHistory, QueryStatus};
use crate::llm::{explain_sql, InferenceClient};
use crate::synth::{
    validate, validate_for_execution, Analysis, ExecutionVerdict, SqlSource, Synthesizer,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SessionId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| Error::SessionNotFound(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AskOptions {
    pub execute: bool,
    pub limit: Option<usize>,
}

/// Outcome of one question. The SQL is always present; execution fields
/// are filled only when execution was requested.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisResult {
    pub sql: String,
    pub results: Option<Vec<serde_json::Value>>,
    pub error: Option<String>,
    pub execution_time_seconds: Option<f64>,
    pub row_count: usize,
    #[serde(skip)]
    pub source: SqlSource,
    #[serde(skip)]
    pub result: Option<QueryResult>,
}

impl SynthesisResult {
    fn unexecuted(sql: String, source: SqlSource) -> Self {
        Self {
            sql,
            results: None,
            error: None,
            execution_time_seconds: None,
            row_count: 0,
            source,
            result: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    /// Looks like a read statement.
    pub well_formed: bool,
    pub allowed: bool,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub id: SessionId,
    pub target: String,
    pub engine: Engine,
    pub model: Option<String>,
    pub inference_available: bool,
    pub analyzed_tables: Option<usize>,
    pub analysis_age_seconds: Option<f64>,
    pub history_entries: usize,
}

struct CachedAnalysis {
    analysis: Arc<Analysis>,
    built_at: Instant,
}

pub struct Session {
    id: SessionId,
    target: String,
    conn: Box<dyn Connection>,
    catalog: Box<dyn CatalogAdapter>,
    inference: Option<Arc<dyn InferenceClient>>,
    synthesizer: Synthesizer,
    analysis: RwLock<Option<CachedAnalysis>>,
    history: Mutex<QueryHistory>,
}

impl Session {
    /// Wrap an open connection; the catalog reader is chosen from its engine.
    pub fn new(
        target: impl Into<String>,
        conn: Box<dyn Connection>,
        inference: Option<Arc<dyn InferenceClient>>,
        synthesizer: Synthesizer,
    ) -> Self {
        let catalog = catalog_for(conn.engine());
        Self {
            id: SessionId::new(),
            target: target.into(),
            conn,
            catalog,
            inference,
            synthesizer,
            analysis: RwLock::new(None),
            history: Mutex::new(QueryHistory::new()),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn engine(&self) -> Engine {
        self.conn.engine()
    }

    /// Fresh schema snapshot; empty when the catalog cannot be read.
    pub async fn schema(&self) -> Vec<Table> {
        introspect(self.conn.as_ref(), self.catalog.as_ref()).await
    }

    /// Analysis built by the most recent `ask`, if any.
    pub async fn analysis(&self) -> Option<Arc<Analysis>> {
        self.analysis
            .read()
            .await
            .as_ref()
            .map(|cached| Arc::clone(&cached.analysis))
    }

    /// Answer `question`, optionally running the statement.
    ///
    /// The schema is re-read on every call. Execution goes through the
    /// safety policy first; a blocked or failed execution is reported in
    /// `error` next to the SQL rather than as an `Err`.
    pub async fn ask(&self, question: &str, options: AskOptions) -> SynthesisResult {
        let tables = self.schema().await;
        let synthesis = self
            .synthesizer
            .generate(question, &tables, self.inference.as_deref())
            .await;

        if let Some(analysis) = synthesis.analysis {
            *self.analysis.write().await = Some(CachedAnalysis {
                analysis: Arc::new(analysis),
                built_at: Instant::now(),
            });
        }

        let sql = if synthesis.sql.trim().is_empty() {
            format!("-- Error: Could not generate SQL for: {}", question)
        } else {
            synthesis.sql
        };

        let mut outcome = SynthesisResult::unexecuted(sql, synthesis.source);
        if !options.execute {
            self.history
                .lock()
                .await
                .record(question, &outcome.sql, QueryStatus::Success);
            return outcome;
        }

        let entry = self
            .history
            .lock()
            .await
            .record(question, &outcome.sql, QueryStatus::Pending);

        let status = match self.execute(&outcome.sql, options.limit).await {
            Ok(result) => {
                outcome.results = Some(result.to_json_rows());
                outcome.execution_time_seconds = Some(result.execution_time.as_secs_f64());
                outcome.row_count = result.row_count;
                outcome.result = Some(result);
                QueryStatus::Success
            }
            Err(e) => {
                warn!(session = %self.id, "execution failed: {}", e);
                outcome.error = Some(e.to_string());
                QueryStatus::Error
            }
        };
        self.history.lock().await.set_status(entry, status);
        outcome
    }

    /// Run `sql` after the safety policy, with an optional row limit.
    pub async fn execute(&self, sql: &str, limit: Option<usize>) -> Result<QueryResult> {
        let verdict = validate_for_execution(sql);
        if !verdict.allowed {
            let message = verdict
                .message
                .unwrap_or_else(|| "statement blocked".to_string());
            return Err(Error::Blocked(message));
        }
        let statement = apply_limit(sql, limit);
        info!(session = %self.id, "executing statement");
        self.conn.execute(&statement).await
    }

    pub fn validate(&self, sql: &str) -> ValidationReport {
        let ExecutionVerdict { allowed, message } = validate_for_execution(sql);
        ValidationReport {
            well_formed: validate(sql.trim()),
            allowed,
            message,
        }
    }

    pub async fn explain(&self, sql: &str) -> Result<String> {
        let client = self
            .inference
            .as_deref()
            .ok_or_else(|| Error::InferenceUnavailable("no inference client configured".into()))?;
        explain_sql(client, sql).await
    }

    /// Most recent entries first.
    pub async fn history(&self, limit: usize) -> Vec<HistoryEntry> {
        self.history
            .lock()
            .await
            .recent(limit)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Entries whose question or SQL contains `needle`, oldest first.
    pub async fn search_history(&self, needle: &str) -> Vec<HistoryEntry> {
        self.history
            .lock()
            .await
            .search(needle)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn status(&self) -> SessionStatus {
        let inference_available = match &self.inference {
            Some(client) => client.is_available().await,
            None => false,
        };
        let (analyzed_tables, analysis_age_seconds) = match self.analysis.read().await.as_ref() {
            Some(cached) => (
                Some(cached.analysis.tables.len()),
                Some(cached.built_at.elapsed().as_secs_f64()),
            ),
            None => (None, None),
        };
        SessionStatus {
            id: self.id,
            target: self.target.clone(),
            engine: self.engine(),
            model: self.inference.as_ref().map(|c| c.model().to_string()),
            inference_available,
            analyzed_tables,
            analysis_age_seconds,
            history_entries: self.history.lock().await.len(),
        }
    }

    pub async fn close(&self) {
        self.conn.close().await;
    }
}

/// Registry of live sessions. Inference and synthesis settings are shared
/// by every session it creates.
pub struct SessionManager {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
    inference: Option<Arc<dyn InferenceClient>>,
    synthesizer: Synthesizer,
}

impl SessionManager {
    pub fn new(inference: Option<Arc<dyn InferenceClient>>, synthesizer: Synthesizer) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            inference,
            synthesizer,
        }
    }

    pub async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<Session>> {
        let conn = connect(config).await?;
        Ok(self.attach(config.display_string(), conn).await)
    }

    /// Register a session around an already open connection.
    pub async fn attach(&self, target: impl Into<String>, conn: Box<dyn Connection>) -> Arc<Session> {
        let session = Arc::new(Session::new(
            target,
            conn,
            self.inference.clone(),
            self.synthesizer.clone(),
        ));
        info!(session = %session.id(), target = session.target(), "session opened");
        self.sessions
            .write()
            .await
            .insert(session.id(), Arc::clone(&session));
        session
    }

    pub async fn get(&self, id: SessionId) -> Result<Arc<Session>> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::SessionNotFound(id.to_string()))
    }

    pub async fn disconnect(&self, id: SessionId) -> Result<()> {
        let session = self
            .sessions
            .write()
            .await
            .remove(&id)
            .ok_or_else(|| Error::SessionNotFound(id.to_string()))?;
        session.close().await;
        info!(session = %id, "session closed");
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
