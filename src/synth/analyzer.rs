//! Schema analysis: purpose labels for tables, semantic roles for columns,
//! grouped column indexes and guessed relationships.
//!
//! Every classification is an ordered rule table where the first matching
//! rule wins. The rules are lexical and approximate on purpose; they feed
//! prompt hints and fallbacks, never constraints.

use std::collections::BTreeMap;
use tracing::info;

use crate::db::{Column, Relationship, SemanticRole, Table};

/// Table-name fragments suggesting rows describe people.
pub const PEOPLE_TABLE_TOKENS: &[&str] = &["user", "employee", "staff", "person", "people", "worker"];

/// Column-name fragments suggesting pay.
pub const COMPENSATION_TOKENS: &[&str] = &["salary", "wage", "income", "pay"];

const NUMERIC_TYPE_TOKENS: &[&str] = &[
    "int", "decimal", "numeric", "float", "double", "real", "money", "number",
];
const TEXT_TYPE_TOKENS: &[&str] = &["char", "text", "string", "clob"];
const DATE_TYPE_TOKENS: &[&str] = &["date", "time"];
const MONEY_TOKENS: &[&str] = &[
    "price", "cost", "amount", "salary", "wage", "income", "pay", "revenue", "total", "fee",
    "balance",
];

pub struct TableRule {
    pub keywords: &'static [&'static str],
    pub label: &'static str,
}

pub const TABLE_RULES: &[TableRule] = &[
    TableRule {
        keywords: &["user", "customer", "client", "person"],
        label: "entity: people",
    },
    TableRule {
        keywords: &["product", "item", "goods"],
        label: "entity: products",
    },
    TableRule {
        keywords: &["order", "purchase", "sale", "transaction"],
        label: "transaction: orders",
    },
    TableRule {
        keywords: &["employee", "staff", "worker"],
        label: "entity: employees",
    },
    TableRule {
        keywords: &["department", "team"],
        label: "organization: departments",
    },
    TableRule {
        keywords: &["category", "type"],
        label: "lookup: categories",
    },
    TableRule {
        keywords: &["address", "location"],
        label: "lookup: locations",
    },
    TableRule {
        keywords: &["review", "rating"],
        label: "activity: reviews",
    },
];

pub const GENERIC_TABLE_LABEL: &str = "data: general";

/// Column predicate over (lowercased name, lowercased declared type).
pub type ColumnPredicate = fn(&str, &str) -> bool;

pub const COLUMN_RULES: &[(ColumnPredicate, SemanticRole)] = &[
    (is_identifier_name, SemanticRole::Identifier),
    (has_name_token, SemanticRole::Name),
    (has_date_token, SemanticRole::Date),
    (has_category_token, SemanticRole::Category),
    (is_money_number, SemanticRole::Metric),
    (is_plain_number, SemanticRole::Number),
];

pub(crate) fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

fn is_identifier_name(name: &str, _ty: &str) -> bool {
    name == "id" || name.ends_with("_id")
}

fn has_name_token(name: &str, _ty: &str) -> bool {
    name.contains("name")
}

fn has_date_token(name: &str, _ty: &str) -> bool {
    contains_any(name, &["date", "time", "created", "updated"])
}

fn has_category_token(name: &str, _ty: &str) -> bool {
    contains_any(name, &["status", "type", "category"])
}

fn is_money_number(name: &str, ty: &str) -> bool {
    is_numeric_type(ty) && contains_any(name, MONEY_TOKENS)
}

fn is_plain_number(_name: &str, ty: &str) -> bool {
    is_numeric_type(ty)
}

fn is_numeric_type(ty: &str) -> bool {
    contains_any(ty, NUMERIC_TYPE_TOKENS)
}

fn is_text_type(ty: &str) -> bool {
    contains_any(ty, TEXT_TYPE_TOKENS)
}

fn is_date_type(ty: &str) -> bool {
    contains_any(ty, DATE_TYPE_TOKENS)
}

pub fn classify_table(name: &str) -> &'static str {
    let lower = name.to_lowercase();
    TABLE_RULES
        .iter()
        .find(|rule| contains_any(&lower, rule.keywords))
        .map(|rule| rule.label)
        .unwrap_or(GENERIC_TABLE_LABEL)
}

pub fn classify_column(name: &str, data_type: &str) -> SemanticRole {
    let name = name.to_lowercase();
    let ty = data_type.to_lowercase();
    COLUMN_RULES
        .iter()
        .find(|(matches, _)| matches(&name, &ty))
        .map(|(_, role)| *role)
        .unwrap_or(SemanticRole::Attribute)
}

pub fn is_people_table(name: &str) -> bool {
    contains_any(&name.to_lowercase(), PEOPLE_TABLE_TOKENS)
}

fn is_foreign_key_shaped(column: &Column) -> bool {
    let name = column.name.to_lowercase();
    name.ends_with("_id") || (name.contains("id") && !column.is_primary)
}

/// Strip the `_id` / `id` suffix to get the referenced entity's name.
fn foreign_key_base(column: &str) -> String {
    let lower = column.to_lowercase();
    let base = lower
        .strip_suffix("_id")
        .or_else(|| lower.strip_suffix("id"))
        .unwrap_or(&lower);
    base.trim_matches('_').to_string()
}

/// Derived view of one schema snapshot. Built fresh for every request and
/// never updated in place.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Analysis {
    pub tables: Vec<Table>,
    pub metrics: BTreeMap<String, Vec<String>>,
    pub dimensions: BTreeMap<String, Vec<String>>,
    pub dates: BTreeMap<String, Vec<String>>,
    pub ids: BTreeMap<String, Vec<String>>,
    pub names: BTreeMap<String, Vec<String>>,
    pub relationships: Vec<Relationship>,
}

fn index_of<'a>(index: &'a BTreeMap<String, Vec<String>>, table: &str) -> &'a [String] {
    index.get(table).map(Vec::as_slice).unwrap_or(&[])
}

impl Analysis {
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn metrics_of(&self, table: &str) -> &[String] {
        index_of(&self.metrics, table)
    }

    pub fn dimensions_of(&self, table: &str) -> &[String] {
        index_of(&self.dimensions, table)
    }

    pub fn dates_of(&self, table: &str) -> &[String] {
        index_of(&self.dates, table)
    }

    pub fn ids_of(&self, table: &str) -> &[String] {
        index_of(&self.ids, table)
    }

    pub fn names_of(&self, table: &str) -> &[String] {
        index_of(&self.names, table)
    }

    /// First pay-like metric of a people-like table, in catalog order.
    pub fn compensation_column(&self) -> Option<(&str, &str)> {
        self.tables
            .iter()
            .filter(|t| is_people_table(&t.name))
            .find_map(|t| {
                self.metrics_of(&t.name)
                    .iter()
                    .find(|m| contains_any(&m.to_lowercase(), COMPENSATION_TOKENS))
                    .map(|m| (t.name.as_str(), m.as_str()))
            })
    }
}

/// Build the analysis for a schema snapshot. Pure and deterministic;
/// tables or columns without a usable name are skipped.
pub fn analyze(tables: &[Table]) -> Analysis {
    let mut analysis = Analysis::default();

    for source in tables {
        if source.name.trim().is_empty() {
            continue;
        }
        let mut table = Table {
            name: source.name.clone(),
            columns: Vec::with_capacity(source.columns.len()),
            row_count: source.row_count,
            role: classify_table(&source.name).to_string(),
            primary_keys: Vec::new(),
            foreign_keys: Vec::new(),
        };

        let mut metrics = Vec::new();
        let mut dimensions = Vec::new();
        let mut dates = Vec::new();
        let mut ids = Vec::new();
        let mut names = Vec::new();

        for source_col in &source.columns {
            if source_col.name.trim().is_empty() {
                continue;
            }
            let mut col = source_col.clone();
            let ty = col.data_type.to_lowercase();
            col.role = classify_column(&col.name, &col.data_type);

            if col.is_primary {
                table.primary_keys.push(col.name.clone());
            }
            if is_foreign_key_shaped(&col) {
                table.foreign_keys.push(col.name.clone());
            }
            if col.is_primary || is_foreign_key_shaped(&col) {
                ids.push(col.name.clone());
            }

            if is_numeric_type(&ty) && col.role != SemanticRole::Identifier {
                metrics.push(col.name.clone());
                col.compensation = contains_any(&col.name.to_lowercase(), COMPENSATION_TOKENS);
            }
            if is_text_type(&ty) && col.role != SemanticRole::Identifier {
                dimensions.push(col.name.clone());
            }
            if col.role == SemanticRole::Date || is_date_type(&ty) {
                dates.push(col.name.clone());
            }
            if col.role == SemanticRole::Name {
                names.push(col.name.clone());
            }

            table.columns.push(col);
        }

        analysis.metrics.insert(table.name.clone(), metrics);
        analysis.dimensions.insert(table.name.clone(), dimensions);
        analysis.dates.insert(table.name.clone(), dates);
        analysis.ids.insert(table.name.clone(), ids);
        analysis.names.insert(table.name.clone(), names);
        analysis.tables.push(table);
    }

    analysis.relationships = infer_relationships(&analysis.tables);
    info!(
        "schema analysis complete: {} tables, {} relationships",
        analysis.tables.len(),
        analysis.relationships.len()
    );
    analysis
}

/// Guess edges from foreign-key-shaped column names.
///
/// A column's stripped base is matched against every other table name in
/// both substring directions. When several tables match, the longest name
/// wins and ties keep catalog order. Tables without a primary key cannot be
/// targets.
pub fn infer_relationships(tables: &[Table]) -> Vec<Relationship> {
    let mut relationships = Vec::new();

    for table in tables {
        for fk in &table.foreign_keys {
            let base = foreign_key_base(fk);
            if base.is_empty() {
                continue;
            }

            let mut best: Option<&Table> = None;
            for other in tables {
                if other.name == table.name || other.primary_keys.is_empty() {
                    continue;
                }
                let other_lower = other.name.to_lowercase();
                if !(other_lower.contains(&base) || base.contains(&other_lower)) {
                    continue;
                }
                if best.map_or(true, |b| other.name.len() > b.name.len()) {
                    best = Some(other);
                }
            }

            if let Some(target) = best {
                relationships.push(Relationship {
                    from_table: table.name.clone(),
                    from_column: fk.clone(),
                    to_table: target.name.clone(),
                    to_column: target.primary_keys[0].clone(),
                });
            }
        }
    }

    relationships
}
