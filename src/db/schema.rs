use serde::{Deserialize, Serialize};
use std::fmt;

/// Advisory classification of a column, assigned by the analyzer from its
/// name and declared type. Never authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticRole {
    Identifier,
    Name,
    Date,
    Category,
    Metric,
    Number,
    #[default]
    Attribute,
}

impl SemanticRole {
    pub fn label(&self) -> &'static str {
        match self {
            SemanticRole::Identifier => "identifier",
            SemanticRole::Name => "name",
            SemanticRole::Date => "date",
            SemanticRole::Category => "category",
            SemanticRole::Metric => "metric",
            SemanticRole::Number => "number",
            SemanticRole::Attribute => "attribute",
        }
    }
}

impl fmt::Display for SemanticRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A column as reported by the engine's catalog.
///
/// `data_type` keeps the engine-native spelling (`integer`, `INT`,
/// `nvarchar`, ...). `role` and `compensation` are filled in by the analyzer
/// and are not part of the serialized form.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Column {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub data_type: String,
    #[serde(default)]
    pub nullable: bool,
    #[serde(rename = "isPrimary", default)]
    pub is_primary: bool,
    #[serde(skip)]
    pub role: SemanticRole,
    /// Refinement of a metric column whose name looks like pay.
    #[serde(skip)]
    pub compensation: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            ..Self::default()
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary = true;
        self.nullable = false;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Annotation rendered next to the column in prompts.
    pub fn annotation(&self) -> &'static str {
        if self.compensation {
            "salary"
        } else {
            self.role.label()
        }
    }
}

/// A base table with its columns in catalog order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Table {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub columns: Vec<Column>,
    /// Best-effort `COUNT(*)`; zero when counting failed.
    #[serde(rename = "rowCount", default)]
    pub row_count: i64,
    /// Free-form purpose label such as `entity: people`.
    #[serde(skip)]
    pub role: String,
    #[serde(skip)]
    pub primary_keys: Vec<String>,
    #[serde(skip)]
    pub foreign_keys: Vec<String>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            columns,
            ..Self::default()
        }
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Directed edge guessed from column naming. May be wrong or missing; it is
/// never a declared constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} = {}.{}",
            self.from_table, self.from_column, self.to_table, self.to_column
        )
    }
}
