//! Declarative, versioned SQLite schema definitions.
//!
//! Tables are described as `const` data so that the expected shape of the
//! database can be both created from scratch and validated against an
//! existing file. Schema versions are tracked through `PRAGMA user_version`,
//! offset by [`BASE_DB_VERSION`] so that a plain SQLite file (user_version 0)
//! is recognizable as never having been initialized by us.

use anyhow::{bail, Result};
use rusqlite::Connection;
use tracing::info;

/// Default expression for unix-timestamp columns.
pub const DEFAULT_TIMESTAMP: &str = "(cast(strftime('%s','now') as int))";

/// Versions below this are treated as "not ours".
pub const BASE_DB_VERSION: usize = 74000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SqlType {
    Text,
    Integer,
    Real,
    Blob,
}

impl SqlType {
    fn as_sql(self) -> &'static str {
        match self {
            SqlType::Text => "TEXT",
            SqlType::Integer => "INTEGER",
            SqlType::Real => "REAL",
            SqlType::Blob => "BLOB",
        }
    }

    fn from_sql(s: &str) -> Option<Self> {
        match s {
            "TEXT" => Some(SqlType::Text),
            "INTEGER" => Some(SqlType::Integer),
            "REAL" => Some(SqlType::Real),
            "BLOB" => Some(SqlType::Blob),
            _ => None,
        }
    }
}

/// A single column definition, built with const chaining:
///
/// ```ignore
/// Column::new("name", SqlType::Text).not_null()
/// ```
#[derive(Clone, Copy, Debug)]
pub struct Column {
    pub name: &'static str,
    pub sql_type: SqlType,
    pub is_primary_key: bool,
    pub non_null: bool,
    pub default_expr: Option<&'static str>,
}

impl Column {
    pub const fn new(name: &'static str, sql_type: SqlType) -> Self {
        Column {
            name,
            sql_type,
            is_primary_key: false,
            non_null: false,
            default_expr: None,
        }
    }

    pub const fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self
    }

    pub const fn not_null(mut self) -> Self {
        self.non_null = true;
        self
    }

    pub const fn default_expr(mut self, expr: &'static str) -> Self {
        self.default_expr = Some(expr);
        self
    }
}

pub struct Table {
    pub name: &'static str,
    pub columns: &'static [Column],
    /// (index name, comma separated column list)
    pub indices: &'static [(&'static str, &'static str)],
    pub unique_constraints: &'static [&'static [&'static str]],
}

impl Table {
    fn create_sql(&self) -> String {
        let mut sql = format!("CREATE TABLE {} (", self.name);
        for (i, column) in self.columns.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push_str(column.name);
            sql.push(' ');
            sql.push_str(column.sql_type.as_sql());
            if column.is_primary_key {
                sql.push_str(" PRIMARY KEY");
            }
            if column.non_null {
                sql.push_str(" NOT NULL");
            }
            if let Some(expr) = column.default_expr {
                sql.push_str(" DEFAULT ");
                sql.push_str(expr);
            }
        }
        for unique in self.unique_constraints {
            sql.push_str(&format!(", UNIQUE ({})", unique.join(", ")));
        }
        sql.push_str(");");
        sql
    }

    pub fn create(&self, conn: &Connection) -> Result<()> {
        conn.execute(&self.create_sql(), [])?;
        for (index_name, columns) in self.indices {
            conn.execute(
                &format!("CREATE INDEX {} ON {}({});", index_name, self.name, columns),
                [],
            )?;
        }
        Ok(())
    }

    pub fn validate(&self, conn: &Connection) -> Result<()> {
        struct ActualColumn {
            name: String,
            sql_type: Option<SqlType>,
            non_null: bool,
            is_primary_key: bool,
        }

        let mut stmt = conn.prepare(&format!("PRAGMA table_info({});", self.name))?;
        let actual: Vec<ActualColumn> = stmt
            .query_map([], |row| {
                Ok(ActualColumn {
                    name: row.get(1)?,
                    sql_type: SqlType::from_sql(&row.get::<_, String>(2)?),
                    non_null: row.get::<_, i32>(3)? == 1,
                    is_primary_key: row.get::<_, i32>(5)? == 1,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        if actual.len() != self.columns.len() {
            bail!(
                "Table {} has {} columns, expected {} ({})",
                self.name,
                actual.len(),
                self.columns.len(),
                self.columns
                    .iter()
                    .map(|c| c.name)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        for (got, want) in actual.iter().zip(self.columns.iter()) {
            if got.name != want.name {
                bail!(
                    "Table {} column name mismatch: expected {}, got {}",
                    self.name,
                    want.name,
                    got.name
                );
            }
            if got.sql_type != Some(want.sql_type) {
                bail!(
                    "Table {} column {} type mismatch: expected {:?}, got {:?}",
                    self.name,
                    want.name,
                    want.sql_type,
                    got.sql_type
                );
            }
            if got.non_null != want.non_null {
                bail!("Table {} column {} non-null mismatch", self.name, want.name);
            }
            if got.is_primary_key != want.is_primary_key {
                bail!(
                    "Table {} column {} primary key mismatch",
                    self.name,
                    want.name
                );
            }
        }

        for (index_name, _) in self.indices {
            let exists: bool = conn
                .query_row(
                    "SELECT 1 FROM sqlite_master WHERE type='index' AND name=?1 AND tbl_name=?2",
                    rusqlite::params![index_name, self.name],
                    |_| Ok(true),
                )
                .unwrap_or(false);
            if !exists {
                bail!("Table {} is missing index '{}'", self.name, index_name);
            }
        }

        if !self.unique_constraints.is_empty() {
            let mut stmt = conn.prepare(&format!("PRAGMA index_list({})", self.name))?;
            let unique_indices: Vec<String> = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, String>(1)?, row.get::<_, i32>(2)?))
                })?
                .filter_map(|r| r.ok())
                .filter(|(_, unique)| *unique == 1)
                .map(|(name, _)| name)
                .collect();

            let mut unique_column_sets: Vec<Vec<String>> = Vec::new();
            for index_name in &unique_indices {
                let mut idx_stmt = conn.prepare(&format!("PRAGMA index_info({})", index_name))?;
                let mut cols: Vec<String> = idx_stmt
                    .query_map([], |row| row.get::<_, String>(2))?
                    .filter_map(|r| r.ok())
                    .collect();
                cols.sort();
                unique_column_sets.push(cols);
            }

            for expected in self.unique_constraints {
                let mut want: Vec<&str> = expected.to_vec();
                want.sort_unstable();
                let found = unique_column_sets
                    .iter()
                    .any(|cols| cols.iter().map(String::as_str).collect::<Vec<_>>() == want);
                if !found {
                    bail!(
                        "Table {} is missing unique constraint on ({})",
                        self.name,
                        expected.join(", ")
                    );
                }
            }
        }

        Ok(())
    }
}

pub struct SchemaVersion {
    pub version: usize,
    pub tables: &'static [Table],
    pub migration: Option<fn(&Connection) -> Result<()>>,
}

impl SchemaVersion {
    pub fn create(&self, conn: &Connection) -> Result<()> {
        for table in self.tables {
            table.create(conn)?;
        }
        conn.execute(
            &format!("PRAGMA user_version = {}", BASE_DB_VERSION + self.version),
            [],
        )?;
        Ok(())
    }

    pub fn validate(&self, conn: &Connection) -> Result<()> {
        for table in self.tables {
            table.validate(conn)?;
        }
        Ok(())
    }
}

/// Bring a database up to the newest schema version.
///
/// A brand new database gets the latest schema created directly; an existing
/// one has pending migration functions applied in order inside a single
/// transaction.
pub fn migrate_to_latest(conn: &mut Connection, versions: &[SchemaVersion]) -> Result<()> {
    let latest = versions
        .last()
        .expect("at least one schema version must be defined");

    let table_count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
            [],
            |r| r.get(0),
        )
        .unwrap_or(0);

    if table_count == 0 {
        info!("Creating database schema at version {}", latest.version);
        latest.create(conn)?;
        return Ok(());
    }

    let user_version: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    if (user_version as usize) < BASE_DB_VERSION {
        bail!(
            "Database was not created by this tool (user_version {})",
            user_version
        );
    }
    let mut current = user_version as usize - BASE_DB_VERSION;
    if current >= latest.version {
        return Ok(());
    }

    let tx = conn.transaction()?;
    let start = current;
    for schema in versions.iter().filter(|s| s.version > start) {
        if let Some(migration) = schema.migration {
            info!(
                "Migrating database from version {} to {}",
                current, schema.version
            );
            migration(&tx)?;
        }
        current = schema.version;
    }
    tx.pragma_update(None, "user_version", BASE_DB_VERSION + current)?;
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_TABLE: Table = Table {
        name: "widgets",
        columns: &[
            Column::new("id", SqlType::Integer).primary_key(),
            Column::new("name", SqlType::Text).not_null(),
            Column::new("weight", SqlType::Real),
        ],
        indices: &[("idx_widgets_name", "name")],
        unique_constraints: &[&["name"]],
    };

    const TEST_SCHEMA: SchemaVersion = SchemaVersion {
        version: 0,
        tables: &[TEST_TABLE],
        migration: None,
    };

    #[test]
    fn create_then_validate_roundtrip() {
        let conn = Connection::open_in_memory().unwrap();
        TEST_SCHEMA.create(&conn).unwrap();
        TEST_SCHEMA.validate(&conn).unwrap();
    }

    #[test]
    fn validate_detects_missing_index() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE widgets (id INTEGER PRIMARY KEY, name TEXT NOT NULL, weight REAL, UNIQUE(name))",
            [],
        )
        .unwrap();

        let err = TEST_SCHEMA.validate(&conn).unwrap_err();
        assert!(err.to_string().contains("missing index"));
    }

    #[test]
    fn validate_detects_missing_unique_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE widgets (id INTEGER PRIMARY KEY, name TEXT NOT NULL, weight REAL)",
            [],
        )
        .unwrap();
        conn.execute("CREATE INDEX idx_widgets_name ON widgets(name)", [])
            .unwrap();

        let err = TEST_SCHEMA.validate(&conn).unwrap_err();
        assert!(err.to_string().contains("missing unique constraint"));
    }

    #[test]
    fn validate_detects_column_type_mismatch() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE widgets (id INTEGER PRIMARY KEY, name INTEGER NOT NULL, weight REAL, UNIQUE(name))",
            [],
        )
        .unwrap();
        conn.execute("CREATE INDEX idx_widgets_name ON widgets(name)", [])
            .unwrap();

        let err = TEST_SCHEMA.validate(&conn).unwrap_err();
        assert!(err.to_string().contains("type mismatch"));
    }

    #[test]
    fn migrate_creates_fresh_database() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate_to_latest(&mut conn, &[TEST_SCHEMA]).unwrap();
        let version: i64 = conn
            .query_row("PRAGMA user_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version as usize, BASE_DB_VERSION);
        TEST_SCHEMA.validate(&conn).unwrap();
    }

    #[test]
    fn migrate_rejects_foreign_database() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE unrelated (id INTEGER PRIMARY KEY)", [])
            .unwrap();
        let err = migrate_to_latest(&mut conn, &[TEST_SCHEMA]).unwrap_err();
        assert!(err.to_string().contains("not created by this tool"));
    }
}
