//! Terminal rendering for results, schemas and history.

use clap::ValueEnum;
use unicode_width::UnicodeWidthStr;

use crate::db::{CellValue, QueryResult, Table};
use crate::history::HistoryEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Csv,
}

const MAX_CELL_WIDTH: usize = 48;

fn truncate_to_width(text: &str, max: usize) -> String {
    if text.width() <= max {
        return text.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = unicode_width::UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + w + 1 > max {
            break;
        }
        out.push(ch);
        used += w;
    }
    out.push('…');
    out
}

fn pad(text: &str, width: usize) -> String {
    let fill = width.saturating_sub(text.width());
    format!("{}{}", text, " ".repeat(fill))
}

/// Box-free grid with a header rule. Cells are single-line and clipped to a
/// fixed display width.
pub fn render_grid(headers: &[String], rows: &[Vec<String>]) -> String {
    let clean = |s: &str| truncate_to_width(&s.replace(['\n', '\r', '\t'], " "), MAX_CELL_WIDTH);
    let headers: Vec<String> = headers.iter().map(|h| clean(h)).collect();
    let rows: Vec<Vec<String>> = rows
        .iter()
        .map(|row| row.iter().map(|c| clean(c)).collect())
        .collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| h.width()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.width());
            }
        }
    }

    let line = |cells: &[String]| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(c, w)| pad(c, *w))
            .collect::<Vec<_>>()
            .join(" │ ")
            .trim_end()
            .to_string()
    };

    let mut out = line(headers.as_slice());
    out.push('\n');
    out.push_str(
        &widths
            .iter()
            .map(|w| "─".repeat(*w))
            .collect::<Vec<_>>()
            .join("─┼─"),
    );
    out.push('\n');
    for row in &rows {
        out.push_str(&line(row.as_slice()));
        out.push('\n');
    }
    out
}

pub fn render_result(result: &QueryResult) -> String {
    if result.columns.is_empty() {
        return "(no rows)\n".to_string();
    }
    let headers: Vec<String> = result.columns.iter().map(|c| c.name.clone()).collect();
    let rows: Vec<Vec<String>> = result
        .rows
        .iter()
        .map(|row| row.iter().map(CellValue::display).collect())
        .collect();
    let mut out = render_grid(&headers, &rows);
    out.push_str(&format!(
        "({} row{}, {:.3}s)\n",
        result.row_count,
        if result.row_count == 1 { "" } else { "s" },
        result.execution_time.as_secs_f64()
    ));
    out
}

pub fn to_csv(result: &QueryResult) -> String {
    let mut output = String::new();

    let headers: Vec<String> = result.columns.iter().map(|c| csv_escape(&c.name)).collect();
    output.push_str(&headers.join(","));
    output.push('\n');

    for row in &result.rows {
        let cells: Vec<String> = row
            .iter()
            .map(|cell| match cell {
                CellValue::Null => String::new(),
                other => csv_escape(&other.display()),
            })
            .collect();
        output.push_str(&cells.join(","));
        output.push('\n');
    }

    output
}

fn csv_escape(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// One grid per table, listing columns with type, key and nullability.
pub fn render_schema(tables: &[Table]) -> String {
    if tables.is_empty() {
        return "(no tables)\n".to_string();
    }
    let headers = vec![
        "column".to_string(),
        "type".to_string(),
        "key".to_string(),
        "nullable".to_string(),
    ];
    let mut out = String::new();
    for table in tables {
        out.push_str(&format!("{} ({} rows)\n", table.name, table.row_count));
        let rows: Vec<Vec<String>> = table
            .columns
            .iter()
            .map(|c| {
                vec![
                    c.name.clone(),
                    c.data_type.clone(),
                    if c.is_primary { "PK".into() } else { String::new() },
                    if c.nullable { "yes".into() } else { "no".into() },
                ]
            })
            .collect();
        out.push_str(&render_grid(&headers, &rows));
        out.push('\n');
    }
    out
}

pub fn render_history(entries: &[HistoryEntry]) -> String {
    let headers = vec![
        "#".to_string(),
        "when".to_string(),
        "status".to_string(),
        "question".to_string(),
    ];
    let rows: Vec<Vec<String>> = entries
        .iter()
        .map(|e| {
            vec![
                e.id.to_string(),
                e.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                serde_json::to_value(e.status)
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_default(),
                e.question.clone(),
            ]
        })
        .collect();
    render_grid(&headers, &rows)
}
