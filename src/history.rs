use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    Success,
    Error,
    Pending,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: u64,
    pub question: String,
    pub sql: String,
    pub timestamp: DateTime<Utc>,
    pub status: QueryStatus,
}

/// Questions asked in a session, oldest first.
#[derive(Debug)]
pub struct QueryHistory {
    entries: Vec<HistoryEntry>,
    next_id: u64,
    max_entries: usize,
}

impl Default for QueryHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryHistory {
    pub fn new() -> Self {
        Self::with_capacity(1000)
    }

    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            entries: Vec::new(),
            next_id: 1,
            max_entries: max_entries.max(1),
        }
    }

    /// Record a question and the SQL it produced. A repeat of the previous
    /// question with the same SQL only refreshes that entry's status.
    pub fn record(&mut self, question: &str, sql: &str, status: QueryStatus) -> u64 {
        if let Some(last) = self.entries.last_mut() {
            if last.question.trim() == question.trim() && last.sql.trim() == sql.trim() {
                last.status = status;
                last.timestamp = Utc::now();
                return last.id;
            }
        }

        let id = self.next_id;
        self.next_id += 1;
        self.entries.push(HistoryEntry {
            id,
            question: question.to_string(),
            sql: sql.to_string(),
            timestamp: Utc::now(),
            status,
        });

        if self.entries.len() > self.max_entries {
            self.entries.remove(0);
        }
        id
    }

    pub fn set_status(&mut self, id: u64, status: QueryStatus) -> bool {
        match self.entries.iter_mut().find(|e| e.id == id) {
            Some(entry) => {
                entry.status = status;
                true
            }
            None => false,
        }
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Most recent first.
    pub fn recent(&self, limit: usize) -> Vec<&HistoryEntry> {
        self.entries.iter().rev().take(limit).collect()
    }

    pub fn search(&self, needle: &str) -> Vec<&HistoryEntry> {
        let needle = needle.to_lowercase();
        self.entries
            .iter()
            .filter(|e| {
                e.question.to_lowercase().contains(&needle) || e.sql.to_lowercase().contains(&needle)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_assigns_increasing_ids() {
        let mut history = QueryHistory::new();
        let a = history.record("how many users", "SELECT COUNT(*) FROM users;", QueryStatus::Success);
        let b = history.record("list orders", "SELECT * FROM orders;", QueryStatus::Pending);
        assert_eq!((a, b), (1, 2));
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_consecutive_duplicate_refreshes_status() {
        let mut history = QueryHistory::new();
        let first = history.record("list orders", "SELECT * FROM orders;", QueryStatus::Error);
        let again = history.record(" list orders ", "SELECT * FROM orders;", QueryStatus::Success);
        assert_eq!(first, again);
        assert_eq!(history.len(), 1);
        assert_eq!(history.entries()[0].status, QueryStatus::Success);
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let mut history = QueryHistory::with_capacity(2);
        history.record("a", "SELECT 1;", QueryStatus::Success);
        history.record("b", "SELECT 2;", QueryStatus::Success);
        history.record("c", "SELECT 3;", QueryStatus::Success);
        let questions: Vec<_> = history.entries().iter().map(|e| e.question.as_str()).collect();
        assert_eq!(questions, vec!["b", "c"]);
    }

    #[test]
    fn test_recent_is_newest_first() {
        let mut history = QueryHistory::new();
        for q in ["one", "two", "three"] {
            history.record(q, "SELECT 1;", QueryStatus::Success);
        }
        let recent: Vec<_> = history.recent(2).iter().map(|e| e.question.clone()).collect();
        assert_eq!(recent, vec!["three", "two"]);
    }

    #[test]
    fn test_search_matches_question_and_sql() {
        let mut history = QueryHistory::new();
        history.record("top customers", "SELECT * FROM customers;", QueryStatus::Success);
        history.record("salary report", "SELECT salary FROM employees;", QueryStatus::Success);
        assert_eq!(history.search("CUSTOMER").len(), 1);
        assert_eq!(history.search("employees").len(), 1);
        assert!(history.search("inventory").is_empty());
    }

    #[test]
    fn test_set_status_and_serialized_shape() {
        let mut history = QueryHistory::new();
        let id = history.record("q", "SELECT 1;", QueryStatus::Pending);
        assert!(history.set_status(id, QueryStatus::Error));
        assert!(!history.set_status(99, QueryStatus::Error));
        let json = serde_json::to_value(&history.entries()[0]).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["id"], 1);
        assert!(json["timestamp"].is_string());
    }
}
