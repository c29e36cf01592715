//! Keyword-driven reading of what a question asks for.
//!
//! Facet keywords match anywhere in the lowercased question, so "averages"
//! and "avg_salary" both read as AVG and "payroll" as a pay question. Table
//! mentions are matched per word.

use serde::Serialize;
use std::fmt;

use super::analyzer::{contains_any, is_people_table, Analysis, COMPENSATION_TOKENS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    #[default]
    GenericSelect,
    Compensation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Aggregation {
    Sum,
    Avg,
    Count,
    Max,
    Min,
}

impl Aggregation {
    pub fn sql(&self) -> &'static str {
        match self {
            Aggregation::Sum => "SUM",
            Aggregation::Avg => "AVG",
            Aggregation::Count => "COUNT",
            Aggregation::Max => "MAX",
            Aggregation::Min => "MIN",
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Intent {
    pub kind: IntentKind,
    pub needs_aggregation: bool,
    pub needs_filtering: bool,
    pub needs_grouping: bool,
    pub needs_sorting: bool,
    pub needs_joining: bool,
    pub aggregation: Option<Aggregation>,
    pub sort: Option<SortDirection>,
    pub target_tables: Vec<String>,
    /// `table.column` of the pay metric for compensation questions.
    pub salary_column: Option<String>,
}

/// Aggregation keywords in precedence order.
const AGGREGATION_RULES: &[(&[&str], Aggregation)] = &[
    (&["sum", "total"], Aggregation::Sum),
    (&["average", "avg"], Aggregation::Avg),
    (&["count"], Aggregation::Count),
    (&["maximum", "max"], Aggregation::Max),
    (&["minimum", "min"], Aggregation::Min),
];

const FILTER_WORDS: &[&str] = &[
    "where", "with", "having", "greater", "less", "than", "above", "below", "between",
];
const GROUP_WORDS: &[&str] = &["group", "by", "each", "per", "category"];
const SORT_WORDS: &[&str] = &["top", "best", "worst", "highest", "lowest", "order", "sort", "limit"];
const JOIN_WORDS: &[&str] = &["with", "and", "together", "join", "combined"];
const DESCENDING_WORDS: &[&str] = &["top", "best", "highest"];
const ASCENDING_WORDS: &[&str] = &["worst", "lowest"];
fn words_of(question: &str) -> Vec<String> {
    question
        .to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Classify `question` against the analyzed schema. Total: any question,
/// including the empty string, yields an intent.
pub fn classify(question: &str, analysis: &Analysis) -> Intent {
    let text = question.to_lowercase();

    let aggregation = AGGREGATION_RULES
        .iter()
        .find(|(keywords, _)| contains_any(&text, keywords))
        .map(|(_, agg)| *agg);

    let sort = if contains_any(&text, DESCENDING_WORDS) {
        Some(SortDirection::Desc)
    } else if contains_any(&text, ASCENDING_WORDS) {
        Some(SortDirection::Asc)
    } else {
        None
    };

    let mut intent = Intent {
        needs_aggregation: aggregation.is_some(),
        needs_filtering: contains_any(&text, FILTER_WORDS),
        needs_grouping: contains_any(&text, GROUP_WORDS),
        needs_sorting: contains_any(&text, SORT_WORDS),
        needs_joining: contains_any(&text, JOIN_WORDS),
        aggregation,
        sort,
        ..Intent::default()
    };

    let words = words_of(question);
    for table in &analysis.tables {
        let table_lower = table.name.to_lowercase();
        let mentioned = words
            .iter()
            .filter(|w| w.chars().count() > 3)
            .any(|w| table_lower.contains(w.as_str()) || w.contains(table_lower.as_str()));
        if mentioned {
            intent.target_tables.push(table.name.clone());
        }
    }

    if contains_any(&text, COMPENSATION_TOKENS) {
        intent.kind = IntentKind::Compensation;
        intent.needs_filtering = true;
        for table in &analysis.tables {
            if is_people_table(&table.name) && !intent.target_tables.contains(&table.name) {
                intent.target_tables.push(table.name.clone());
            }
        }
        intent.salary_column = analysis
            .compensation_column()
            .map(|(table, column)| format!("{}.{}", table, column));
    }

    intent
}
