use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlparser::dialect::GenericDialect;
use sqlparser::keywords::Keyword;
use sqlparser::tokenizer::{Token, Tokenizer};
use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;
use tokio_postgres::error::ErrorPosition;
use tokio_postgres::types::{FromSql, Type};
use tokio_postgres::Row;

/// A failed statement, with whatever context the engine attached.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructuredError {
    /// SQLSTATE for PostgreSQL, the result code name for SQLite.
    pub code: Option<String>,
    pub message: String,
    pub detail: Option<String>,
    pub hint: Option<String>,
    /// 1-based `(line, column)` inside the statement text.
    pub position: Option<(usize, usize)>,
}

impl StructuredError {
    pub fn from_pg_error(err: &tokio_postgres::Error, sql: &str) -> Self {
        let Some(db) = err.as_db_error() else {
            return Self {
                detail: err.source().map(|s| s.to_string()),
                ..Self::from_string(err.to_string())
            };
        };
        let position = match db.position() {
            Some(ErrorPosition::Original(offset)) => Some(locate(sql, *offset as usize)),
            _ => None,
        };
        Self {
            code: Some(db.code().code().to_string()),
            message: db.message().to_string(),
            detail: db.detail().map(str::to_string),
            hint: db.hint().map(str::to_string),
            position,
        }
    }

    pub fn from_sqlite_error(err: &rusqlite::Error) -> Self {
        let code = match err {
            rusqlite::Error::SqliteFailure(failure, _) => Some(format!("{:?}", failure.code)),
            _ => None,
        };
        Self {
            code,
            ..Self::from_string(err.to_string())
        }
    }

    pub fn from_string(message: String) -> Self {
        Self {
            message,
            ..Self::default()
        }
    }

    /// Message followed by one indented line per known piece of context.
    pub fn report(&self) -> String {
        let mut out = self.message.clone();
        if let Some((line, column)) = self.position {
            out.push_str(&format!("\n  at line {}, column {}", line, column));
        }
        let extras = [("code", &self.code), ("detail", &self.detail), ("hint", &self.hint)];
        for (label, value) in extras {
            if let Some(value) = value {
                out.push_str(&format!("\n  {}: {}", label, value));
            }
        }
        out
    }
}

impl fmt::Display for StructuredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Turn PostgreSQL's 1-based character offset into a 1-based line and column.
fn locate(sql: &str, offset: usize) -> (usize, usize) {
    let before: String = sql.chars().take(offset.saturating_sub(1)).collect();
    let line = before.matches('\n').count() + 1;
    let column = before.rsplit('\n').next().map_or(0, |tail| tail.chars().count()) + 1;
    (line, column)
}

#[derive(Debug, Clone)]
pub struct ColumnInfo {
    pub name: String,
    pub type_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Json(serde_json::Value),
    Unknown(String),
}

impl CellValue {
    pub fn display(&self) -> String {
        match self {
            CellValue::Null => "NULL".to_string(),
            CellValue::Bool(b) => b.to_string(),
            CellValue::Int16(i) => i.to_string(),
            CellValue::Int32(i) => i.to_string(),
            CellValue::Int64(i) => i.to_string(),
            CellValue::Float32(f) => f.to_string(),
            CellValue::Float64(f) => f.to_string(),
            CellValue::Text(s) => s.clone(),
            CellValue::Bytes(b) => format!("[{} bytes]", b.len()),
            CellValue::Date(d) => d.to_string(),
            CellValue::Time(t) => t.to_string(),
            CellValue::DateTime(dt) => dt.to_string(),
            CellValue::TimestampTz(dt) => dt.to_string(),
            CellValue::Json(j) => j.to_string(),
            CellValue::Unknown(s) => s.clone(),
        }
    }

    pub fn display_width(&self) -> usize {
        unicode_width::UnicodeWidthStr::width(self.display().as_str())
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            CellValue::Null => serde_json::Value::Null,
            CellValue::Bool(b) => serde_json::Value::Bool(*b),
            CellValue::Int16(i) => serde_json::json!(*i),
            CellValue::Int32(i) => serde_json::json!(*i),
            CellValue::Int64(i) => serde_json::json!(*i),
            CellValue::Float32(f) => serde_json::json!(*f),
            CellValue::Float64(f) => serde_json::json!(*f),
            CellValue::Json(j) => j.clone(),
            other => serde_json::Value::String(other.display()),
        }
    }

    pub fn as_text(&self) -> Option<String> {
        match self {
            CellValue::Null => None,
            CellValue::Bytes(b) => String::from_utf8(b.clone()).ok(),
            other => Some(other.display()),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CellValue::Bool(b) => Some(i64::from(*b)),
            CellValue::Int16(i) => Some(i64::from(*i)),
            CellValue::Int32(i) => Some(i64::from(*i)),
            CellValue::Int64(i) => Some(*i),
            CellValue::Float32(f) => Some(*f as i64),
            CellValue::Float64(f) => Some(*f as i64),
            CellValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Interpret catalog flags, which engines report as booleans, 0/1
    /// integers, or `YES`/`NO` strings.
    pub fn as_flag(&self) -> bool {
        match self {
            CellValue::Bool(b) => *b,
            CellValue::Text(s) => matches!(
                s.trim().to_ascii_uppercase().as_str(),
                "YES" | "TRUE" | "T" | "1" | "PRI"
            ),
            other => other.as_i64().map(|i| i != 0).unwrap_or(false),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct QueryResult {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Vec<CellValue>>,
    pub row_count: usize,
    pub execution_time: Duration,
}

impl QueryResult {
    pub fn empty() -> Self {
        Self {
            columns: vec![],
            rows: vec![],
            row_count: 0,
            execution_time: Duration::ZERO,
        }
    }

    pub fn new(columns: Vec<ColumnInfo>, rows: Vec<Vec<CellValue>>, execution_time: Duration) -> Self {
        let row_count = rows.len();
        Self {
            columns,
            rows,
            row_count,
            execution_time,
        }
    }

    /// Position of a column, matched case-insensitively since engines
    /// disagree on the case of catalog column names.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn records(&self) -> impl Iterator<Item = Record<'_>> {
        self.rows.iter().map(move |cells| Record {
            result: self,
            cells,
        })
    }

    /// Rows as JSON objects keyed by column name, in column order.
    pub fn to_json_rows(&self) -> Vec<serde_json::Value> {
        self.rows
            .iter()
            .map(|row| {
                let mut obj = serde_json::Map::new();
                for (i, cell) in row.iter().enumerate() {
                    let col_name = self
                        .columns
                        .get(i)
                        .map(|c| c.name.clone())
                        .unwrap_or_else(|| format!("column_{}", i));
                    obj.insert(col_name, cell.to_json());
                }
                serde_json::Value::Object(obj)
            })
            .collect()
    }
}

/// One row of a [`QueryResult`] with lookups by column name.
pub struct Record<'a> {
    result: &'a QueryResult,
    cells: &'a [CellValue],
}

impl<'a> Record<'a> {
    pub fn get(&self, column: &str) -> Option<&'a CellValue> {
        self.result
            .column_index(column)
            .and_then(|i| self.cells.get(i))
    }

    pub fn at(&self, index: usize) -> Option<&'a CellValue> {
        self.cells.get(index)
    }

    pub fn text(&self, column: &str) -> Option<String> {
        self.get(column).and_then(CellValue::as_text)
    }

    pub fn int(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(CellValue::as_i64)
    }

    pub fn flag(&self, column: &str) -> bool {
        self.get(column).map(CellValue::as_flag).unwrap_or(false)
    }
}

/// Append `LIMIT n` to a SELECT or WITH statement whose tokens carry no
/// LIMIT keyword. Other statements, and text the tokenizer rejects, only
/// lose their trailing `;`.
pub fn apply_limit(sql: &str, limit: Option<usize>) -> String {
    let trimmed = sql.trim().trim_end_matches(';').trim_end();
    let Some(n) = limit else {
        return trimmed.to_string();
    };
    let keywords: Vec<Keyword> = match Tokenizer::new(&GenericDialect {}, trimmed).tokenize() {
        Ok(tokens) => tokens
            .iter()
            .filter_map(|token| match token {
                Token::Word(word) if word.quote_style.is_none() => Some(word.keyword),
                _ => None,
            })
            .collect(),
        Err(_) => return trimmed.to_string(),
    };
    let limitable = matches!(keywords.first(), Some(Keyword::SELECT | Keyword::WITH));
    if limitable && !keywords.contains(&Keyword::LIMIT) {
        format!("{} LIMIT {}", trimmed, n)
    } else {
        trimmed.to_string()
    }
}

pub(crate) fn parse_pg_rows(rows: &[Row], execution_time: Duration) -> QueryResult {
    let Some(first_row) = rows.first() else {
        return QueryResult::new(vec![], vec![], execution_time);
    };

    let columns: Vec<ColumnInfo> = first_row
        .columns()
        .iter()
        .map(|col| ColumnInfo {
            name: col.name().to_string(),
            type_name: col.type_().name().to_string(),
        })
        .collect();

    let result_rows = rows
        .iter()
        .map(|row| {
            row.columns()
                .iter()
                .enumerate()
                .map(|(i, col)| extract_pg_value(row, i, col.type_()))
                .collect()
        })
        .collect();

    QueryResult::new(columns, result_rows, execution_time)
}

/// NUMERIC decoded from the binary wire format into an f64.
struct PgNumeric(f64);

impl<'a> FromSql<'a> for PgNumeric {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        if raw.len() < 8 {
            return Err("numeric value too short".into());
        }
        let read = |i: usize| i16::from_be_bytes([raw[i], raw[i + 1]]);
        let ndigits = read(0).max(0) as usize;
        let weight = read(2) as i32;
        let sign = read(4) as u16;
        if raw.len() < 8 + ndigits * 2 {
            return Err("numeric value truncated".into());
        }
        if sign == 0xC000 {
            return Ok(PgNumeric(f64::NAN));
        }
        let mut value = 0f64;
        for d in 0..ndigits {
            let digit = f64::from(read(8 + d * 2));
            value += digit * 10000f64.powi(weight - d as i32);
        }
        if sign == 0x4000 {
            value = -value;
        }
        Ok(PgNumeric(value))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

fn get_pg<'a, T: FromSql<'a>>(row: &'a Row, idx: usize) -> Option<T> {
    row.try_get::<_, Option<T>>(idx).ok().flatten()
}

fn extract_pg_value(row: &Row, idx: usize, pg_type: &Type) -> CellValue {
    let value = match *pg_type {
        Type::BOOL => get_pg(row, idx).map(CellValue::Bool),
        Type::INT2 => get_pg(row, idx).map(CellValue::Int16),
        Type::INT4 => get_pg(row, idx).map(CellValue::Int32),
        Type::INT8 => get_pg(row, idx).map(CellValue::Int64),
        Type::FLOAT4 => get_pg(row, idx).map(CellValue::Float32),
        Type::FLOAT8 => get_pg(row, idx).map(CellValue::Float64),
        Type::NUMERIC => get_pg::<PgNumeric>(row, idx).map(|n| CellValue::Float64(n.0)),
        Type::TEXT | Type::VARCHAR | Type::NAME | Type::CHAR | Type::BPCHAR => {
            get_pg(row, idx).map(CellValue::Text)
        }
        Type::BYTEA => get_pg(row, idx).map(CellValue::Bytes),
        Type::DATE => get_pg(row, idx).map(CellValue::Date),
        Type::TIME => get_pg(row, idx).map(CellValue::Time),
        Type::TIMESTAMP => get_pg(row, idx).map(CellValue::DateTime),
        Type::TIMESTAMPTZ => get_pg(row, idx).map(CellValue::TimestampTz),
        Type::JSON | Type::JSONB => get_pg(row, idx).map(CellValue::Json),
        _ => match row.try_get::<_, Option<String>>(idx) {
            Ok(v) => v.map(CellValue::Text),
            Err(_) => Some(CellValue::Unknown(format!("<{}>", pg_type.name()))),
        },
    };
    value.unwrap_or(CellValue::Null)
}

pub(crate) fn sqlite_value(value: rusqlite::types::ValueRef<'_>) -> CellValue {
    use rusqlite::types::ValueRef;
    match value {
        ValueRef::Null => CellValue::Null,
        ValueRef::Integer(i) => CellValue::Int64(i),
        ValueRef::Real(f) => CellValue::Float64(f),
        ValueRef::Text(t) => CellValue::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => CellValue::Bytes(b.to_vec()),
    }
}
