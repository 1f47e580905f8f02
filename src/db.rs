//! Database bootstrap: one SQLite file holding both the display catalog and
//! the revision engine tables, opened once and shared by all stores.

use crate::display::{schema as display_schema, DisplayStore};
use crate::indexing::{schema as oi_schema, IndexingStore, StatsLedger};
use crate::sqlite_persistence::{migrate_to_latest, SchemaVersion, Table};
use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

const CATALOG_TABLES: &[Table] = &[
    // Display catalog
    display_schema::PUBLISHERS_TABLE,
    display_schema::INDICIA_PUBLISHERS_TABLE,
    display_schema::BRAND_GROUPS_TABLE,
    display_schema::BRANDS_TABLE,
    display_schema::BRAND_GROUP_MEMBERS_TABLE,
    display_schema::BRAND_USES_TABLE,
    display_schema::SERIES_TABLE,
    display_schema::SERIES_BONDS_TABLE,
    display_schema::ISSUES_TABLE,
    display_schema::STORIES_TABLE,
    display_schema::COVERS_TABLE,
    display_schema::IMAGES_TABLE,
    display_schema::REPRINT_LINKS_TABLE,
    display_schema::ENTITY_KEYWORDS_TABLE,
    // Revision engine
    oi_schema::CHANGESETS_TABLE,
    oi_schema::CHANGESET_EDITORS_TABLE,
    oi_schema::CHANGESET_COMMENTS_TABLE,
    oi_schema::REVISION_LOCKS_TABLE,
    oi_schema::ONGOING_RESERVATIONS_TABLE,
    oi_schema::COUNT_STATS_TABLE,
    oi_schema::RECENT_INDEXED_ISSUES_TABLE,
    oi_schema::PUBLISHER_REVISIONS_TABLE,
    oi_schema::INDICIA_PUBLISHER_REVISIONS_TABLE,
    oi_schema::BRAND_GROUP_REVISIONS_TABLE,
    oi_schema::BRAND_REVISIONS_TABLE,
    oi_schema::BRAND_REVISION_GROUPS_TABLE,
    oi_schema::BRAND_USE_REVISIONS_TABLE,
    oi_schema::SERIES_REVISIONS_TABLE,
    oi_schema::SERIES_BOND_REVISIONS_TABLE,
    oi_schema::ISSUE_REVISIONS_TABLE,
    oi_schema::STORY_REVISIONS_TABLE,
    oi_schema::COVER_REVISIONS_TABLE,
    oi_schema::IMAGE_REVISIONS_TABLE,
    oi_schema::REPRINT_REVISIONS_TABLE,
];

pub const CATALOG_SCHEMA_VERSIONS: &[SchemaVersion] = &[SchemaVersion {
    version: 0,
    tables: CATALOG_TABLES,
    migration: None,
}];

#[derive(Clone)]
pub struct CatalogDb {
    conn: Arc<Mutex<Connection>>,
}

impl CatalogDb {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let mut conn = Connection::open_with_flags(
            db_path.as_ref(),
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI
                | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open catalog database")?;

        migrate_to_latest(&mut conn, CATALOG_SCHEMA_VERSIONS)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let db = CatalogDb {
            conn: Arc::new(Mutex::new(conn)),
        };
        let (publishers, series, issues) = db.summary_counts()?;
        info!(
            "Opened catalog: {} publishers, {} series, {} issues",
            publishers, series, issues
        );
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migrate_to_latest(&mut conn, CATALOG_SCHEMA_VERSIONS)?;
        Ok(CatalogDb {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn display(&self) -> DisplayStore {
        DisplayStore::new(self.conn.clone())
    }

    pub fn indexing(&self) -> IndexingStore {
        IndexingStore::new(self.conn.clone())
    }

    pub fn stats(&self) -> StatsLedger {
        StatsLedger::new(self.conn.clone())
    }

    pub fn validate_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        CATALOG_SCHEMA_VERSIONS
            .last()
            .expect("schema versions are non-empty")
            .validate(&conn)
    }

    fn summary_counts(&self) -> Result<(i64, i64, i64)> {
        let conn = self.conn.lock().unwrap();
        let publishers: i64 =
            conn.query_row("SELECT COUNT(*) FROM publishers", [], |r| r.get(0))?;
        let series: i64 = conn.query_row("SELECT COUNT(*) FROM series", [], |r| r.get(0))?;
        let issues: i64 = conn.query_row("SELECT COUNT(*) FROM issues", [], |r| r.get(0))?;
        Ok((publishers, series, issues))
    }
}

/// Open a fresh in-memory catalog, mostly for tests.
pub fn open_in_memory() -> Result<CatalogDb> {
    CatalogDb::open_in_memory()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_database_passes_validation() {
        let db = open_in_memory().unwrap();
        db.validate_schema().unwrap();
    }
}
