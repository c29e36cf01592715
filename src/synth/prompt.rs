use std::fmt::Write as _;

use super::analyzer::Analysis;
use super::intent::{Intent, IntentKind};

const PREVIEW_CAP: usize = 3;
const RELATIONSHIP_CAP: usize = 5;
const SUGGESTION_CAP: usize = 3;

/// Assemble the generation prompt. Pure: the same question, analysis and
/// intent always give the same text.
pub fn build_prompt(question: &str, analysis: &Analysis, intent: &Intent) -> String {
    let mut prompt = String::with_capacity(2048);

    prompt.push_str("### Task\n");
    let _ = writeln!(prompt, "Generate a SQL query to answer: {}\n", question);

    write_schema(&mut prompt, analysis);
    write_relationships(&mut prompt, analysis);
    write_query_analysis(&mut prompt, analysis, intent);
    if intent.kind == IntentKind::Compensation {
        write_compensation(&mut prompt, analysis, intent);
    }

    prompt.push_str("\n### Instructions:\n");
    prompt.push_str("1. Use ONLY table and column names from the schema above\n");
    prompt.push_str("2. Return ONLY the SQL query, no explanations\n");
    prompt.push_str("3. End with a semicolon\n");
    prompt.push_str("4. Do NOT include markdown or tags\n\n");
    prompt.push_str("### SQL Query:\n");
    prompt
}

fn preview(values: &[String]) -> String {
    values
        .iter()
        .take(PREVIEW_CAP)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn write_schema(prompt: &mut String, analysis: &Analysis) {
    prompt.push_str("### Database Schema (USE EXACT NAMES):\n\n");

    for table in &analysis.tables {
        let _ = writeln!(prompt, "Table: {} ({})", table.name, table.role);
        prompt.push_str("Columns:\n");
        for col in &table.columns {
            let _ = write!(prompt, "  - {} ({})", col.name, col.data_type);
            if col.is_primary {
                prompt.push_str(" PRIMARY KEY");
            }
            let _ = writeln!(prompt, "  # {}", col.annotation());
        }

        let metrics = analysis.metrics_of(&table.name);
        if !metrics.is_empty() {
            let _ = writeln!(prompt, "  Numeric columns: {}", preview(metrics));
        }
        let dimensions = analysis.dimensions_of(&table.name);
        if !dimensions.is_empty() {
            let _ = writeln!(prompt, "  Text columns: {}", preview(dimensions));
        }
        let dates = analysis.dates_of(&table.name);
        if !dates.is_empty() {
            let _ = writeln!(prompt, "  Date columns: {}", preview(dates));
        }
        prompt.push('\n');
    }
}

fn write_relationships(prompt: &mut String, analysis: &Analysis) {
    if analysis.relationships.is_empty() {
        return;
    }
    prompt.push_str("### Relationships:\n");
    for rel in analysis.relationships.iter().take(RELATIONSHIP_CAP) {
        let _ = writeln!(prompt, "- {}", rel);
    }
    prompt.push('\n');
}

/// Tables whose columns get suggested: the question's targets, else the
/// first two tables of the schema.
fn suggestion_tables<'a>(analysis: &'a Analysis, intent: &'a Intent) -> Vec<&'a str> {
    if intent.target_tables.is_empty() {
        analysis
            .tables
            .iter()
            .take(2)
            .map(|t| t.name.as_str())
            .collect()
    } else {
        intent.target_tables.iter().map(String::as_str).collect()
    }
}

fn qualified<'a>(
    table: &str,
    columns: &'a [String],
    take: usize,
) -> impl Iterator<Item = String> + 'a {
    let table = table.to_string();
    columns
        .iter()
        .take(take)
        .map(move |c| format!("{}.{}", table, c))
}

fn write_query_analysis(prompt: &mut String, analysis: &Analysis, intent: &Intent) {
    prompt.push_str("### Query Analysis:\n");

    if !intent.target_tables.is_empty() {
        let relevant: Vec<&str> = intent
            .target_tables
            .iter()
            .take(3)
            .map(String::as_str)
            .collect();
        let _ = writeln!(prompt, "- Relevant tables: {}", relevant.join(", "));
    }

    let tables = suggestion_tables(analysis, intent);

    if intent.needs_aggregation {
        let label = intent.aggregation.map_or("aggregation", |a| a.sql());
        let _ = writeln!(prompt, "- Needs {}", label);
        let metrics: Vec<String> = tables
            .iter()
            .flat_map(|t| qualified(t, analysis.metrics_of(t), 2))
            .take(SUGGESTION_CAP)
            .collect();
        if !metrics.is_empty() {
            let _ = writeln!(prompt, "  Available metrics: {}", metrics.join(", "));
        }
    }

    if intent.needs_grouping {
        prompt.push_str("- Needs GROUP BY\n");
        let mut groups: Vec<String> = Vec::new();
        for candidate in tables.iter().flat_map(|t| {
            qualified(t, analysis.dimensions_of(t), 2).chain(qualified(t, analysis.names_of(t), 2))
        }) {
            if groups.len() == SUGGESTION_CAP {
                break;
            }
            if !groups.contains(&candidate) {
                groups.push(candidate);
            }
        }
        if !groups.is_empty() {
            let _ = writeln!(prompt, "  Possible grouping columns: {}", groups.join(", "));
        }
    }

    if intent.needs_filtering {
        prompt.push_str("- Needs WHERE clause filtering\n");
    }

    if intent.needs_sorting {
        let direction = intent.sort.map_or("DESC", |s| s.sql());
        let _ = writeln!(prompt, "- Needs ORDER BY {} and LIMIT", direction);
    }

    if intent.needs_joining && !analysis.relationships.is_empty() {
        prompt.push_str("- Needs JOIN using relationships above\n");
    }
}

fn write_compensation(prompt: &mut String, analysis: &Analysis, intent: &Intent) {
    prompt.push_str("\n### Compensation Query Instructions:\n");
    prompt.push_str("- This query asks about pay compared to the average\n");
    prompt.push_str("- Use a subquery to calculate the average\n");
    prompt.push_str(
        "- Format: SELECT columns FROM table WHERE salary > (SELECT AVG(salary) FROM table)\n",
    );

    if let Some(column) = &intent.salary_column {
        let _ = writeln!(prompt, "- Use salary column: {}", column);
    }

    for table in &intent.target_tables {
        let names = analysis.names_of(table);
        if !names.is_empty() {
            let names: Vec<&str> = names.iter().take(2).map(String::as_str).collect();
            let _ = writeln!(prompt, "- Include name columns: {}", names.join(", "));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::analyzer::analyze;
    use crate::synth::intent::classify;
    use crate::testing::hr_schema;

    fn prompt_for(question: &str) -> String {
        let analysis = analyze(&hr_schema());
        let intent = classify(question, &analysis);
        build_prompt(question, &analysis, &intent)
    }

    #[test]
    fn test_sections_in_order() {
        let prompt = prompt_for("show departments");
        let order = [
            "### Task\n",
            "### Database Schema (USE EXACT NAMES):",
            "### Relationships:",
            "### Query Analysis:",
            "### Instructions:",
            "### SQL Query:\n",
        ];
        let mut last = 0;
        for header in order {
            let pos = prompt[last..].find(header).map(|p| p + last);
            assert!(pos.is_some(), "missing {header}");
            last = pos.unwrap();
        }
        assert!(prompt.ends_with("### SQL Query:\n"));
        assert!(!prompt.contains("Compensation Query Instructions"));
    }

    #[test]
    fn test_schema_lines() {
        let prompt = prompt_for("show departments");
        assert!(prompt.contains("Generate a SQL query to answer: show departments\n\n"));
        assert!(prompt.contains("Table: employees (entity: employees)\n"));
        assert!(prompt.contains("  - id (integer) PRIMARY KEY  # identifier\n"));
        assert!(prompt.contains("  - salary (numeric)  # salary\n"));
        assert!(prompt.contains("  Numeric columns: salary\n"));
        assert!(prompt.contains("  Text columns: first_name, last_name\n"));
        assert!(prompt.contains("- employees.department_id = departments.id\n"));
    }

    #[test]
    fn test_compensation_block() {
        let prompt = prompt_for("Which employees earn a salary above the average salary?");
        assert!(prompt.contains("### Compensation Query Instructions:"));
        assert!(prompt.contains("- Use salary column: employees.salary\n"));
        assert!(prompt.contains("- Include name columns: first_name, last_name\n"));
        assert!(prompt.contains("- Needs AVG\n"));
        assert!(prompt.contains("  Available metrics: employees.salary\n"));
        assert!(prompt.contains("- Needs WHERE clause filtering\n"));
    }

    #[test]
    fn test_suggestions_fall_back_to_first_tables() {
        let prompt = prompt_for("group everything per thing");
        assert!(prompt.contains("- Needs GROUP BY\n"));
        assert!(prompt.contains(
            "  Possible grouping columns: employees.first_name, employees.last_name, departments.name\n"
        ));
    }

    #[test]
    fn test_sort_defaults_to_desc() {
        let prompt = prompt_for("sort the departments");
        assert!(prompt.contains("- Needs ORDER BY DESC and LIMIT\n"));
        let prompt = prompt_for("lowest departments");
        assert!(prompt.contains("- Needs ORDER BY ASC and LIMIT\n"));
    }

    #[test]
    fn test_empty_analysis_still_has_frame() {
        let analysis = Analysis::default();
        let intent = classify("anything", &analysis);
        let prompt = build_prompt("anything", &analysis, &intent);
        assert!(prompt.contains("### Database Schema (USE EXACT NAMES):\n\n### Query Analysis:\n"));
        assert!(!prompt.contains("### Relationships:"));
    }

    #[test]
    fn test_prompt_is_deterministic() {
        assert_eq!(prompt_for("top salaries"), prompt_for("top salaries"));
    }
}
