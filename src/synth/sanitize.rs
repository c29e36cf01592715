//! Cleanup of raw model output and the two statement gates: the shape check
//! applied to generated text, and the policy applied before execution.

use serde::Serialize;

use crate::error::{Error, Result};

const MIN_STATEMENT_LEN: usize = 10;
const ACCEPTED_STARTS: &[&str] = &["SELECT", "WITH", "SHOW"];
const READ_ONLY_LEADERS: &[&str] = &["SELECT", "WITH", "EXPLAIN", "SHOW", "DESCRIBE"];
const DANGEROUS_KEYWORDS: &[&str] = &[
    "DROP", "DELETE", "TRUNCATE", "ALTER", "CREATE", "INSERT", "UPDATE",
];

/// Reduce model output to a single `;`-terminated statement.
///
/// Strips `<s>`/`</s>` wrapper tokens and markdown fences, drops one leading
/// `#` or `--` comment line, and keeps only the text before the first `;`.
/// Applying it to its own output is a no-op.
pub fn sanitize(raw: &str) -> String {
    let text = raw
        .replace("<s>", "")
        .replace("</s>", "")
        .replace("```sql", "")
        .replace("```", "");
    let mut text = text.trim();

    if text.starts_with('#') || text.starts_with("--") {
        text = match text.split_once('\n') {
            Some((_, rest)) => rest.trim(),
            None => "",
        };
    }

    let statement = text.split(';').next().unwrap_or_default().trim();
    format!("{};", statement)
}

/// Whether sanitized text looks like a read statement worth returning.
pub fn validate(sql: &str) -> bool {
    if sql.len() < MIN_STATEMENT_LEN {
        return false;
    }
    let upper = sql.to_uppercase();
    ACCEPTED_STARTS.iter().any(|kw| upper.starts_with(kw))
}

/// Sanitize model output and keep it only if it passes [`validate`].
pub fn accept(raw: &str) -> Result<String> {
    let sql = sanitize(raw);
    if validate(&sql) {
        Ok(sql)
    } else {
        Err(Error::Validation(format!("not a read statement: {:?}", sql)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionVerdict {
    pub allowed: bool,
    pub message: Option<String>,
}

impl ExecutionVerdict {
    fn allowed() -> Self {
        Self {
            allowed: true,
            message: None,
        }
    }

    fn blocked(keyword: &str) -> Self {
        Self {
            allowed: false,
            message: Some(format!("Dangerous operation detected: {}", keyword)),
        }
    }
}

/// Pre-execution policy.
///
/// A statement led by a read-only keyword always passes. Anything else is
/// blocked when the upper-cased text contains a data-modifying keyword.
/// Matching is on raw substrings, so a column like `created_at` under a
/// non-read leader is blocked, while a modifying statement hidden behind a
/// read leader (`WITH x AS (DELETE ...)`) passes. Engine permissions remain
/// the real guard.
pub fn validate_for_execution(sql: &str) -> ExecutionVerdict {
    let upper = sql.trim().to_uppercase();
    let leader = upper.split_whitespace().next().unwrap_or_default();
    if READ_ONLY_LEADERS.contains(&leader) {
        return ExecutionVerdict::allowed();
    }
    match DANGEROUS_KEYWORDS.iter().find(|kw| upper.contains(*kw)) {
        Some(kw) => ExecutionVerdict::blocked(kw),
        None => ExecutionVerdict::allowed(),
    }
}
