//! Test doubles for the two external collaborators.

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

use crate::db::{CellValue, Column, ColumnInfo, Connection, Engine, QueryResult, Table};
use crate::error::{Error, Result};
use crate::llm::{InferenceClient, SamplingOptions};

/// Two-table HR catalog: employees referencing departments.
pub fn hr_schema() -> Vec<Table> {
    vec![
        Table::new(
            "employees",
            vec![
                Column::new("id", "integer").primary_key(),
                Column::new("first_name", "character varying"),
                Column::new("last_name", "character varying"),
                Column::new("salary", "numeric"),
                Column::new("department_id", "integer"),
                Column::new("hired_at", "timestamp without time zone"),
            ],
        ),
        Table::new(
            "departments",
            vec![
                Column::new("id", "integer").primary_key(),
                Column::new("name", "text"),
            ],
        ),
    ]
}

pub fn result_of(columns: &[&str], rows: Vec<Vec<CellValue>>) -> QueryResult {
    QueryResult::new(
        columns
            .iter()
            .map(|name| ColumnInfo {
                name: name.to_string(),
                type_name: String::new(),
            })
            .collect(),
        rows,
        Duration::from_millis(1),
    )
}

enum Reply {
    Rows(QueryResult),
    Fail,
}

/// Connection answering by substring match on the statement, first rule
/// wins. Unmatched statements fail.
pub struct FakeConnection {
    engine: Engine,
    rules: Vec<(String, Reply)>,
    pub executed: Mutex<Vec<String>>,
}

impl FakeConnection {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            rules: Vec::new(),
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn respond(mut self, needle: &str, result: QueryResult) -> Self {
        self.rules.push((needle.to_string(), Reply::Rows(result)));
        self
    }

    pub fn fail_on(mut self, needle: &str) -> Self {
        self.rules.push((needle.to_string(), Reply::Fail));
        self
    }
}

#[async_trait]
impl Connection for FakeConnection {
    fn engine(&self) -> Engine {
        self.engine
    }

    async fn execute(&self, sql: &str) -> Result<QueryResult> {
        self.executed.lock().unwrap().push(sql.to_string());
        match self.rules.iter().find(|(needle, _)| sql.contains(needle.as_str())) {
            Some((_, Reply::Rows(result))) => Ok(result.clone()),
            Some((needle, Reply::Fail)) => Err(Error::query(format!("forced failure on {needle}"))),
            None => Err(Error::query(format!("no canned reply for: {sql}"))),
        }
    }

    async fn close(&self) {}
}

/// Inference stub returning a fixed reply, or always unavailable.
pub struct FakeInference {
    reply: Option<String>,
    pub prompts: Mutex<Vec<String>>,
    options: Mutex<Option<SamplingOptions>>,
}

impl FakeInference {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Some(text.to_string()),
            prompts: Mutex::new(Vec::new()),
            options: Mutex::new(None),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            reply: None,
            prompts: Mutex::new(Vec::new()),
            options: Mutex::new(None),
        }
    }

    pub fn last_options(&self) -> Option<SamplingOptions> {
        self.options.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferenceClient for FakeInference {
    fn model(&self) -> &str {
        "fake"
    }

    async fn generate(&self, prompt: &str, options: &SamplingOptions) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        *self.options.lock().unwrap() = Some(options.clone());
        self.reply
            .clone()
            .ok_or_else(|| Error::InferenceUnavailable("connection refused".into()))
    }

    async fn is_available(&self) -> bool {
        self.reply.is_some()
    }
}
