//! Catalog readers that normalize each engine's metadata into [`Table`]s.
//!
//! Reading happens in two independent phases. The column phase runs the
//! engine's catalog queries; if it fails the whole snapshot is empty. The
//! count phase runs one `COUNT(*)` per table and a failure there only zeroes
//! that table's count.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::connection::{Connection, Engine};
use super::query::{QueryResult, Record};
use super::schema::{Column, Table};
use crate::error::{Error, Result};

/// Engine-specific access to the metadata catalog, chosen once per
/// connection.
#[async_trait]
pub trait CatalogAdapter: Send + Sync {
    fn engine(&self) -> Engine;

    /// Base tables with their columns, in catalog order. Engine-internal
    /// tables are excluded.
    async fn load_tables(&self, conn: &dyn Connection) -> Result<Vec<Table>>;

    /// Statement returning the row count of `table` as its first cell.
    fn count_statement(&self, table: &str) -> String;
}

pub fn catalog_for(engine: Engine) -> Box<dyn CatalogAdapter> {
    match engine {
        Engine::Postgresql => Box::new(PostgresCatalog),
        Engine::Mysql => Box::new(MysqlCatalog),
        Engine::Sqlite => Box::new(SqliteCatalog),
        Engine::Sqlserver => Box::new(SqlServerCatalog),
    }
}

/// Read the schema behind `conn`. Never fails: any catalog error yields an
/// empty list.
pub async fn introspect(conn: &dyn Connection, catalog: &dyn CatalogAdapter) -> Vec<Table> {
    let mut tables = match catalog.load_tables(conn).await {
        Ok(tables) => tables,
        Err(e) => {
            warn!(engine = %catalog.engine(), "schema introspection failed: {}", e);
            return Vec::new();
        }
    };

    for table in &mut tables {
        let sql = catalog.count_statement(&table.name);
        table.row_count = match conn.execute(&sql).await {
            Ok(result) => first_int(&result).unwrap_or(0),
            Err(e) => {
                debug!(table = %table.name, "row count failed: {}", e);
                0
            }
        };
    }

    info!(
        engine = %catalog.engine(),
        "fetched {} tables: {:?}",
        tables.len(),
        tables.iter().map(|t| t.name.as_str()).collect::<Vec<_>>()
    );
    tables
}

fn first_int(result: &QueryResult) -> Option<i64> {
    result.records().next().and_then(|r| r.at(0)?.as_i64())
}

fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn quote_ident(name: &str, open: char, close: char) -> String {
    let escaped = name.replace(close, &format!("{close}{close}"));
    format!("{open}{escaped}{close}")
}

fn column_from(
    record: &Record<'_>,
    name: &str,
    data_type: &str,
    nullable: &str,
    primary: &str,
) -> Option<Column> {
    let col_name = record.text(name).filter(|n| !n.trim().is_empty())?;
    Some(Column {
        name: col_name,
        data_type: record.text(data_type).unwrap_or_default(),
        nullable: record.flag(nullable),
        is_primary: record.flag(primary),
        ..Column::default()
    })
}

/// Fold a one-row-per-column result, ordered by table, into tables.
fn group_by_table(result: &QueryResult, map: impl Fn(&Record<'_>) -> Option<Column>) -> Vec<Table> {
    let mut tables: Vec<Table> = Vec::new();
    for record in result.records() {
        let Some(table_name) = record.text("table_name").filter(|n| !n.is_empty()) else {
            continue;
        };
        let Some(column) = map(&record) else {
            continue;
        };
        match tables.last_mut() {
            Some(last) if last.name == table_name => last.columns.push(column),
            _ => tables.push(Table::new(table_name, vec![column])),
        }
    }
    tables
}

pub struct PostgresCatalog;

#[async_trait]
impl CatalogAdapter for PostgresCatalog {
    fn engine(&self) -> Engine {
        Engine::Postgresql
    }

    async fn load_tables(&self, conn: &dyn Connection) -> Result<Vec<Table>> {
        let listing = conn
            .execute(
                r#"
                SELECT table_name::text AS table_name
                FROM information_schema.tables
                WHERE table_schema = 'public'
                  AND table_type = 'BASE TABLE'
                ORDER BY table_name
                "#,
            )
            .await
            .map_err(|e| Error::Introspection(e.to_string()))?;

        let mut tables = Vec::new();
        for name in listing.records().filter_map(|r| r.text("table_name")) {
            let sql = format!(
                r#"
                SELECT
                    c.column_name::text AS column_name,
                    c.data_type::text AS data_type,
                    c.is_nullable = 'YES' AS nullable,
                    EXISTS (
                        SELECT 1
                        FROM information_schema.key_column_usage k
                        JOIN information_schema.table_constraints tc
                            ON k.constraint_name = tc.constraint_name
                            AND k.table_schema = tc.table_schema
                        WHERE k.table_name = c.table_name
                          AND k.table_schema = c.table_schema
                          AND k.column_name = c.column_name
                          AND tc.constraint_type = 'PRIMARY KEY'
                    ) AS is_primary
                FROM information_schema.columns c
                WHERE c.table_name = {} AND c.table_schema = 'public'
                ORDER BY c.ordinal_position
                "#,
                sql_literal(&name)
            );
            let result = conn
                .execute(&sql)
                .await
                .map_err(|e| Error::Introspection(e.to_string()))?;
            let columns = result
                .records()
                .filter_map(|r| column_from(&r, "column_name", "data_type", "nullable", "is_primary"))
                .collect();
            tables.push(Table::new(name, columns));
        }
        Ok(tables)
    }

    fn count_statement(&self, table: &str) -> String {
        format!("SELECT COUNT(*) AS count FROM {}", quote_ident(table, '"', '"'))
    }
}

pub struct MysqlCatalog;

#[async_trait]
impl CatalogAdapter for MysqlCatalog {
    fn engine(&self) -> Engine {
        Engine::Mysql
    }

    async fn load_tables(&self, conn: &dyn Connection) -> Result<Vec<Table>> {
        let result = conn
            .execute(
                r#"
                SELECT
                    c.TABLE_NAME AS table_name,
                    c.COLUMN_NAME AS column_name,
                    c.DATA_TYPE AS data_type,
                    c.IS_NULLABLE AS nullable,
                    c.COLUMN_KEY = 'PRI' AS is_primary
                FROM INFORMATION_SCHEMA.COLUMNS c
                JOIN INFORMATION_SCHEMA.TABLES t
                    ON t.TABLE_SCHEMA = c.TABLE_SCHEMA AND t.TABLE_NAME = c.TABLE_NAME
                WHERE c.TABLE_SCHEMA = DATABASE()
                  AND t.TABLE_TYPE = 'BASE TABLE'
                ORDER BY c.TABLE_NAME, c.ORDINAL_POSITION
                "#,
            )
            .await
            .map_err(|e| Error::Introspection(e.to_string()))?;

        Ok(group_by_table(&result, |r| {
            column_from(r, "column_name", "data_type", "nullable", "is_primary")
        }))
    }

    fn count_statement(&self, table: &str) -> String {
        format!("SELECT COUNT(*) FROM {}", quote_ident(table, '`', '`'))
    }
}

pub struct SqliteCatalog;

#[async_trait]
impl CatalogAdapter for SqliteCatalog {
    fn engine(&self) -> Engine {
        Engine::Sqlite
    }

    async fn load_tables(&self, conn: &dyn Connection) -> Result<Vec<Table>> {
        let listing = conn
            .execute(
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
                 ORDER BY name",
            )
            .await
            .map_err(|e| Error::Introspection(e.to_string()))?;

        let mut tables = Vec::new();
        for name in listing.records().filter_map(|r| r.text("name")) {
            let result = conn
                .execute(&format!("PRAGMA table_info({})", quote_ident(&name, '`', '`')))
                .await
                .map_err(|e| Error::Introspection(e.to_string()))?;

            // cid | name | type | notnull | dflt_value | pk (1-based position in the key)
            let columns = result
                .records()
                .filter_map(|r| {
                    let col_name = r.text("name").filter(|n| !n.trim().is_empty())?;
                    Some(Column {
                        name: col_name,
                        data_type: r.text("type").unwrap_or_default(),
                        nullable: !r.flag("notnull"),
                        is_primary: r.int("pk").unwrap_or(0) > 0,
                        ..Column::default()
                    })
                })
                .collect();
            tables.push(Table::new(name, columns));
        }
        Ok(tables)
    }

    fn count_statement(&self, table: &str) -> String {
        format!("SELECT COUNT(*) FROM {}", quote_ident(table, '`', '`'))
    }
}

pub struct SqlServerCatalog;

#[async_trait]
impl CatalogAdapter for SqlServerCatalog {
    fn engine(&self) -> Engine {
        Engine::Sqlserver
    }

    async fn load_tables(&self, conn: &dyn Connection) -> Result<Vec<Table>> {
        let result = conn
            .execute(
                r#"
                SELECT
                    t.TABLE_NAME AS table_name,
                    c.COLUMN_NAME AS column_name,
                    c.DATA_TYPE AS data_type,
                    c.IS_NULLABLE AS nullable,
                    CASE WHEN pk.COLUMN_NAME IS NOT NULL THEN 1 ELSE 0 END AS is_primary
                FROM INFORMATION_SCHEMA.TABLES t
                JOIN INFORMATION_SCHEMA.COLUMNS c
                    ON t.TABLE_SCHEMA = c.TABLE_SCHEMA AND t.TABLE_NAME = c.TABLE_NAME
                LEFT JOIN (
                    SELECT ku.TABLE_SCHEMA, ku.TABLE_NAME, ku.COLUMN_NAME
                    FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc
                    JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE ku
                        ON tc.CONSTRAINT_NAME = ku.CONSTRAINT_NAME
                    WHERE tc.CONSTRAINT_TYPE = 'PRIMARY KEY'
                ) pk
                    ON c.TABLE_SCHEMA = pk.TABLE_SCHEMA
                    AND c.TABLE_NAME = pk.TABLE_NAME
                    AND c.COLUMN_NAME = pk.COLUMN_NAME
                WHERE t.TABLE_TYPE = 'BASE TABLE'
                ORDER BY t.TABLE_NAME, c.ORDINAL_POSITION
                "#,
            )
            .await
            .map_err(|e| Error::Introspection(e.to_string()))?;

        Ok(group_by_table(&result, |r| {
            column_from(r, "column_name", "data_type", "nullable", "is_primary")
        }))
    }

    fn count_statement(&self, table: &str) -> String {
        format!("SELECT COUNT(*) FROM {}", quote_ident(table, '[', ']'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{CellValue, SqliteConnection};
    use crate::testing::{result_of, FakeConnection};

    async fn sqlite_fixture() -> SqliteConnection {
        let conn = SqliteConnection::open(":memory:").await.unwrap();
        for sql in [
            "CREATE TABLE employees (id INTEGER PRIMARY KEY, first_name TEXT NOT NULL, \
             last_name TEXT, salary NUMERIC, department_id INTEGER)",
            "CREATE TABLE departments (id INTEGER PRIMARY KEY, name TEXT)",
            "INSERT INTO departments (name) VALUES ('eng'), ('ops'), ('sales')",
            "INSERT INTO employees (first_name, salary, department_id) VALUES ('Ada', 100, 1)",
        ] {
            conn.execute(sql).await.unwrap();
        }
        conn
    }

    #[test]
    fn test_quote_ident_escapes_closer() {
        assert_eq!(quote_ident("a\"b", '"', '"'), "\"a\"\"b\"");
        assert_eq!(quote_ident("we]ird", '[', ']'), "[we]]ird]");
        assert_eq!(sql_literal("o'neil"), "'o''neil'");
    }

    #[test]
    fn test_count_statements_per_engine() {
        assert_eq!(
            PostgresCatalog.count_statement("users"),
            "SELECT COUNT(*) AS count FROM \"users\""
        );
        assert_eq!(MysqlCatalog.count_statement("users"), "SELECT COUNT(*) FROM `users`");
        assert_eq!(SqliteCatalog.count_statement("users"), "SELECT COUNT(*) FROM `users`");
        assert_eq!(SqlServerCatalog.count_statement("users"), "SELECT COUNT(*) FROM [users]");
    }

    #[test]
    fn test_catalog_for_matches_engine() {
        for engine in [Engine::Postgresql, Engine::Mysql, Engine::Sqlite, Engine::Sqlserver] {
            assert_eq!(catalog_for(engine).engine(), engine);
        }
    }

    #[tokio::test]
    async fn test_sqlite_introspection() {
        let conn = sqlite_fixture().await;
        let tables = introspect(&conn, &SqliteCatalog).await;

        let names: Vec<_> = tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["departments", "employees"]);

        let employees = &tables[1];
        assert_eq!(employees.row_count, 1);
        assert_eq!(tables[0].row_count, 3);
        let cols: Vec<_> = employees.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(cols, vec!["id", "first_name", "last_name", "salary", "department_id"]);
        assert!(employees.columns[0].is_primary);
        assert!(!employees.columns[1].nullable);
        assert!(employees.columns[2].nullable);
        assert_eq!(employees.columns[3].data_type, "NUMERIC");
    }

    #[tokio::test]
    async fn test_catalog_failure_yields_empty_schema() {
        let conn = FakeConnection::new(Engine::Postgresql).fail_on("information_schema.tables");
        let tables = introspect(&conn, &PostgresCatalog).await;
        assert!(tables.is_empty());
    }

    #[tokio::test]
    async fn test_count_failure_only_zeroes_that_table() {
        let conn = FakeConnection::new(Engine::Mysql)
            .respond(
                "INFORMATION_SCHEMA.COLUMNS",
                result_of(
                    &["table_name", "column_name", "data_type", "nullable", "is_primary"],
                    vec![
                        vec!["orders".into(), "id".into(), "int".into(), "NO".into(), CellValue::Int64(1)],
                        vec!["orders".into(), "total".into(), "decimal".into(), "YES".into(), CellValue::Int64(0)],
                        vec!["users".into(), "id".into(), "int".into(), "NO".into(), CellValue::Int64(1)],
                    ],
                ),
            )
            .fail_on("`orders`")
            .respond("`users`", result_of(&["COUNT(*)"], vec![vec![CellValue::Int64(42)]]));

        let tables = introspect(&conn, &MysqlCatalog).await;
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].name, "orders");
        assert_eq!(tables[0].columns.len(), 2);
        assert_eq!(tables[0].row_count, 0);
        assert_eq!(tables[1].row_count, 42);
        assert!(tables[1].columns[0].is_primary);
        assert!(tables[0].columns[1].nullable);
    }

    #[tokio::test]
    async fn test_postgres_catalog_reads_each_table() {
        let conn = FakeConnection::new(Engine::Postgresql)
            .respond(
                "information_schema.tables",
                result_of(&["table_name"], vec![vec!["users".into()], vec!["o'rders".into()]]),
            )
            .respond(
                "'users'",
                result_of(
                    &["column_name", "data_type", "nullable", "is_primary"],
                    vec![
                        vec!["id".into(), "integer".into(), CellValue::Bool(false), CellValue::Bool(true)],
                        vec!["".into(), "text".into(), CellValue::Bool(true), CellValue::Bool(false)],
                    ],
                ),
            )
            .respond(
                "'o''rders'",
                result_of(
                    &["column_name", "data_type", "nullable", "is_primary"],
                    vec![vec!["amount".into(), "numeric".into(), CellValue::Bool(true), CellValue::Bool(false)]],
                ),
            )
            .respond("COUNT(*)", result_of(&["count"], vec![vec![CellValue::Int64(7)]]));

        let tables = introspect(&conn, &PostgresCatalog).await;
        assert_eq!(tables.len(), 2);
        // the nameless column is dropped
        assert_eq!(tables[0].columns.len(), 1);
        assert_eq!(tables[1].name, "o'rders");
        assert_eq!(tables[1].columns[0].data_type, "numeric");
        assert!(tables.iter().all(|t| t.row_count == 7));
    }

    #[tokio::test]
    async fn test_sqlserver_catalog_groups_rows() {
        let conn = FakeConnection::new(Engine::Sqlserver).respond(
            "INFORMATION_SCHEMA.TABLES",
            result_of(
                &["table_name", "column_name", "data_type", "nullable", "is_primary"],
                vec![
                    vec!["Products".into(), "ProductID".into(), "int".into(), "NO".into(), CellValue::Int32(1)],
                    vec!["Products".into(), "Price".into(), "money".into(), "YES".into(), CellValue::Int32(0)],
                ],
            ),
        );
        let tables = introspect(&conn, &SqlServerCatalog).await;
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].columns.len(), 2);
        // unanswered count query degrades to zero
        assert_eq!(tables[0].row_count, 0);
    }
}
