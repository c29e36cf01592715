use super::analyzer::Analysis;
use super::intent::{Intent, IntentKind};

/// Statement used when no schema could be read at all.
pub const TRIVIAL_FALLBACK: &str = "SELECT 1;";

const DEFAULT_TABLE: &str = "users";

/// Deterministic statement built from the schema alone.
///
/// Compensation questions get an above-average query over the first
/// people-like table with a pay metric; everything else previews a table.
/// Always returns a SELECT.
pub fn schema_fallback(analysis: &Analysis, intent: &Intent) -> String {
    if intent.kind == IntentKind::Compensation {
        if let Some((table, column)) = analysis.compensation_column() {
            let names = analysis.names_of(table);
            let projection = if names.is_empty() {
                "*".to_string()
            } else {
                names.iter().take(2).map(String::as_str).collect::<Vec<_>>().join(", ")
            };
            let select = if projection == "*" {
                projection
            } else {
                format!("{}, {}", projection, column)
            };
            return format!(
                "SELECT {select} FROM {table} WHERE {column} > (SELECT AVG({column}) FROM {table}) ORDER BY {column} DESC;"
            );
        }
    }

    let table = intent
        .target_tables
        .first()
        .map(String::as_str)
        .or_else(|| analysis.tables.first().map(|t| t.name.as_str()))
        .unwrap_or(DEFAULT_TABLE);
    format!("SELECT * FROM {} LIMIT 10;", table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Column, Table};
    use crate::synth::analyzer::analyze;
    use crate::synth::intent::classify;
    use crate::testing::hr_schema;

    #[test]
    fn test_compensation_template() {
        let analysis = analyze(&hr_schema());
        let intent = classify("who has a salary above the average", &analysis);
        assert_eq!(
            schema_fallback(&analysis, &intent),
            "SELECT first_name, last_name, salary FROM employees WHERE salary > (SELECT AVG(salary) FROM employees) ORDER BY salary DESC;"
        );
    }

    #[test]
    fn test_compensation_without_name_columns() {
        let tables = vec![Table::new(
            "staff",
            vec![
                Column::new("id", "int").primary_key(),
                Column::new("wage", "decimal(8,2)"),
            ],
        )];
        let analysis = analyze(&tables);
        let intent = classify("wage report", &analysis);
        assert_eq!(
            schema_fallback(&analysis, &intent),
            "SELECT * FROM staff WHERE wage > (SELECT AVG(wage) FROM staff) ORDER BY wage DESC;"
        );
    }

    #[test]
    fn test_preview_prefers_target_then_first_table() {
        let analysis = analyze(&hr_schema());
        let intent = classify("list departments", &analysis);
        assert_eq!(schema_fallback(&analysis, &intent), "SELECT * FROM departments LIMIT 10;");

        let intent = classify("what is there", &analysis);
        assert_eq!(schema_fallback(&analysis, &intent), "SELECT * FROM employees LIMIT 10;");
    }

    #[test]
    fn test_total_over_any_analysis() {
        let empty = Analysis::default();
        for question in ["", "salary", "top customers", "DROP TABLE x"] {
            let intent = classify(question, &empty);
            let sql = schema_fallback(&empty, &intent);
            assert!(sql.starts_with("SELECT"));
            assert_eq!(sql, "SELECT * FROM users LIMIT 10;");
        }
    }
}
