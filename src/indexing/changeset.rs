//! Changesets, revision locks, and the approval/discard drivers.
//!
//! A changeset is the unit of proposed, moderated edits: it owns one
//! revision per edited display row, holds the locks on those rows, and
//! progresses through the review workflow until its revisions are either
//! committed to display or dropped.

use super::revision::RevisionError;
use super::state::{ChangeType, ChangesetAction, ChangesetState};
use crate::display::EntityKind;
use anyhow::{bail, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};
use tracing::info;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct Changeset {
    pub id: i64,
    pub uid: String,
    pub state: ChangesetState,
    pub indexer: String,
    pub approver: Option<String>,
    pub change_type: ChangeType,
    pub created: i64,
    pub modified: i64,
}

#[derive(Clone, Debug)]
pub struct ChangesetComment {
    pub id: i64,
    pub changeset_id: i64,
    pub commenter: String,
    pub text: String,
    pub old_state: ChangesetState,
    pub new_state: ChangesetState,
    pub field_changes: Option<serde_json::Value>,
    pub created: i64,
}

#[derive(Clone, Debug)]
pub struct OngoingReservation {
    pub id: i64,
    pub indexer: String,
    pub series_id: i64,
    pub created: i64,
}

/// Store for the revision engine's own tables. Shares the write connection
/// with [`crate::display::DisplayStore`].
#[derive(Clone)]
pub struct IndexingStore {
    conn: Arc<Mutex<Connection>>,
}

impl IndexingStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        IndexingStore { conn }
    }

    /// Shared connection handle for the per-entity revision persistence
    /// living in the sibling modules.
    pub(crate) fn conn(&self) -> &Arc<Mutex<Connection>> {
        &self.conn
    }

    // =========================================================================
    // Changesets
    // =========================================================================

    fn parse_changeset(row: &rusqlite::Row) -> rusqlite::Result<Changeset> {
        Ok(Changeset {
            id: row.get("id")?,
            uid: row.get("uid")?,
            state: ChangesetState::from_db_str(&row.get::<_, String>("state")?),
            indexer: row.get("indexer")?,
            approver: row.get("approver")?,
            change_type: ChangeType::from_db_str(&row.get::<_, String>("change_type")?),
            created: row.get("created")?,
            modified: row.get("modified")?,
        })
    }

    pub fn create_changeset(&self, indexer: &str, change_type: ChangeType) -> Result<Changeset> {
        let uid = Uuid::new_v4().to_string();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO oi_changesets (uid, state, indexer, change_type)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                uid,
                ChangesetState::Open.to_db_str(),
                indexer,
                change_type.to_db_str()
            ],
        )?;
        let id = conn.last_insert_rowid();
        let mut stmt = conn.prepare_cached("SELECT * FROM oi_changesets WHERE id = ?1")?;
        let changeset = stmt.query_row(params![id], Self::parse_changeset)?;
        info!(
            "Opened changeset {} ({}) for {}",
            changeset.id,
            change_type.to_db_str(),
            indexer
        );
        Ok(changeset)
    }

    pub fn get_changeset(&self, id: i64) -> Result<Changeset> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached("SELECT * FROM oi_changesets WHERE id = ?1")?;
        stmt.query_row(params![id], Self::parse_changeset)
            .optional()?
            .ok_or_else(|| RevisionError::NotFound { what: "changeset", id }.into())
    }

    pub fn get_changeset_by_uid(&self, uid: &str) -> Result<Option<Changeset>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached("SELECT * FROM oi_changesets WHERE uid = ?1")?;
        Ok(stmt.query_row(params![uid], Self::parse_changeset).optional()?)
    }

    pub fn changesets_in_state(&self, state: ChangesetState) -> Result<Vec<Changeset>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT * FROM oi_changesets WHERE state = ?1 ORDER BY modified ASC",
        )?;
        let changesets = stmt
            .query_map(params![state.to_db_str()], Self::parse_changeset)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(changesets)
    }

    /// Transition a changeset, validating the workflow edge and recording a
    /// state-transition comment.
    pub fn transition_changeset(
        &self,
        changeset_id: i64,
        new_state: ChangesetState,
        commenter: &str,
        text: &str,
    ) -> Result<Changeset> {
        let mut changeset = self.get_changeset(changeset_id)?;
        if !changeset.state.can_transition_to(new_state) {
            return Err(RevisionError::Validation(format!(
                "changeset {} cannot move from {} to {}",
                changeset_id,
                changeset.state.to_db_str(),
                new_state.to_db_str()
            ))
            .into());
        }
        {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "UPDATE oi_changesets SET state = ?2,
                    modified = cast(strftime('%s','now') as int)
                 WHERE id = ?1",
                params![changeset_id, new_state.to_db_str()],
            )?;
        }
        self.add_comment(changeset_id, commenter, text, changeset.state, new_state, None)?;
        changeset.state = new_state;
        Ok(changeset)
    }

    pub fn set_approver(&self, changeset_id: i64, approver: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE oi_changesets SET approver = ?2 WHERE id = ?1",
            params![changeset_id, approver],
        )?;
        Ok(())
    }

    // =========================================================================
    // Co-editors
    // =========================================================================

    pub fn add_editor(&self, changeset_id: i64, editor: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO oi_changeset_editors (changeset_id, editor)
             VALUES (?1, ?2)",
            params![changeset_id, editor],
        )?;
        Ok(())
    }

    pub fn editors_of(&self, changeset_id: i64) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT editor FROM oi_changeset_editors WHERE changeset_id = ?1 ORDER BY editor",
        )?;
        let editors = stmt
            .query_map(params![changeset_id], |r| r.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(editors)
    }

    // =========================================================================
    // Comments
    // =========================================================================

    pub fn add_comment(
        &self,
        changeset_id: i64,
        commenter: &str,
        text: &str,
        old_state: ChangesetState,
        new_state: ChangesetState,
        field_changes: Option<&serde_json::Value>,
    ) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let field_changes_str = field_changes.map(|v| v.to_string());
        conn.execute(
            "INSERT INTO oi_changeset_comments
                (changeset_id, commenter, text, old_state, new_state, field_changes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                changeset_id,
                commenter,
                text,
                old_state.to_db_str(),
                new_state.to_db_str(),
                field_changes_str,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn comments_of(&self, changeset_id: i64) -> Result<Vec<ChangesetComment>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT * FROM oi_changeset_comments WHERE changeset_id = ?1
             ORDER BY created ASC, id ASC",
        )?;
        let comments = stmt
            .query_map(params![changeset_id], |row| {
                let field_changes_str: Option<String> = row.get("field_changes")?;
                Ok(ChangesetComment {
                    id: row.get("id")?,
                    changeset_id: row.get("changeset_id")?,
                    commenter: row.get("commenter")?,
                    text: row.get("text")?,
                    old_state: ChangesetState::from_db_str(&row.get::<_, String>("old_state")?),
                    new_state: ChangesetState::from_db_str(&row.get::<_, String>("new_state")?),
                    field_changes: field_changes_str
                        .and_then(|s| serde_json::from_str(&s).ok()),
                    created: row.get("created")?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(comments)
    }

    // =========================================================================
    // Revision locks
    // =========================================================================

    /// Acquire (or re-confirm) the lock on a display row for a changeset.
    /// A `None` changeset is a provisional existence check.
    pub fn acquire_lock(
        &self,
        kind: EntityKind,
        entity_id: i64,
        changeset_id: Option<i64>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let holder: Option<Option<i64>> = conn
            .query_row(
                "SELECT changeset_id FROM oi_revision_locks
                 WHERE entity_kind = ?1 AND entity_id = ?2",
                params![kind.to_db_str(), entity_id],
                |r| r.get(0),
            )
            .optional()?;
        match holder {
            Some(holder_changeset) if holder_changeset == changeset_id => Ok(()),
            Some(_) => Err(RevisionError::Locked { kind, id: entity_id }.into()),
            None => {
                conn.execute(
                    "INSERT INTO oi_revision_locks (entity_kind, entity_id, changeset_id)
                     VALUES (?1, ?2, ?3)",
                    params![kind.to_db_str(), entity_id, changeset_id],
                )?;
                Ok(())
            }
        }
    }

    /// Promote a provisional (changeset-less) lock to a real one.
    pub fn assign_lock(&self, kind: EntityKind, entity_id: i64, changeset_id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE oi_revision_locks SET changeset_id = ?3
             WHERE entity_kind = ?1 AND entity_id = ?2 AND changeset_id IS NULL",
            params![kind.to_db_str(), entity_id, changeset_id],
        )?;
        if updated == 0 {
            bail!(
                "no provisional lock on {} {} to assign",
                kind.to_db_str(),
                entity_id
            );
        }
        Ok(())
    }

    pub fn lock_holder(&self, kind: EntityKind, entity_id: i64) -> Result<Option<Option<i64>>> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT changeset_id FROM oi_revision_locks
                 WHERE entity_kind = ?1 AND entity_id = ?2",
                params![kind.to_db_str(), entity_id],
                |r| r.get(0),
            )
            .optional()?)
    }

    pub fn release_lock(&self, kind: EntityKind, entity_id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM oi_revision_locks WHERE entity_kind = ?1 AND entity_id = ?2",
            params![kind.to_db_str(), entity_id],
        )?;
        Ok(())
    }

    pub fn release_changeset_locks(&self, changeset_id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM oi_revision_locks WHERE changeset_id = ?1",
            params![changeset_id],
        )?;
        Ok(())
    }

    // =========================================================================
    // Ongoing reservations
    // =========================================================================

    pub fn create_ongoing_reservation(&self, indexer: &str, series_id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO oi_ongoing_reservations (indexer, series_id) VALUES (?1, ?2)",
            params![indexer, series_id],
        )?;
        Ok(())
    }

    pub fn ongoing_reservation_for(&self, series_id: i64) -> Result<Option<OngoingReservation>> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT id, indexer, series_id, created FROM oi_ongoing_reservations
                 WHERE series_id = ?1",
                params![series_id],
                |row| {
                    Ok(OngoingReservation {
                        id: row.get(0)?,
                        indexer: row.get(1)?,
                        series_id: row.get(2)?,
                        created: row.get(3)?,
                    })
                },
            )
            .optional()?)
    }

    pub fn delete_ongoing_reservation(&self, series_id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM oi_ongoing_reservations WHERE series_id = ?1",
            params![series_id],
        )?;
        Ok(())
    }

    // =========================================================================
    // Recently indexed
    // =========================================================================

    pub fn record_recent_indexed(&self, issue_id: i64, language: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO oi_recent_indexed_issues (issue_id, language) VALUES (?1, ?2)",
            params![issue_id, language],
        )?;
        Ok(())
    }

    pub fn recent_indexed_count(&self, language: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM oi_recent_indexed_issues WHERE language = ?1",
            params![language],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    // =========================================================================
    // Cross-table revision queries
    // =========================================================================

    const REVISION_TABLES: &'static [(&'static str, &'static str)] = &[
        ("oi_publisher_revisions", "publisher_id"),
        ("oi_indicia_publisher_revisions", "indicia_publisher_id"),
        ("oi_brand_group_revisions", "brand_group_id"),
        ("oi_brand_revisions", "brand_id"),
        ("oi_brand_use_revisions", "brand_use_id"),
        ("oi_series_revisions", "series_id"),
        ("oi_series_bond_revisions", "series_bond_id"),
        ("oi_issue_revisions", "issue_id"),
        ("oi_story_revisions", "story_id"),
        ("oi_cover_revisions", "cover_id"),
        ("oi_image_revisions", "image_id"),
        ("oi_reprint_revisions", "link_id"),
    ];

    /// Mark every still-open revision of a changeset as discarded.
    pub fn discard_open_revisions(&self, changeset_id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        for (table, _) in Self::REVISION_TABLES {
            conn.execute(
                &format!(
                    "UPDATE {} SET committed = 0 WHERE changeset_id = ?1 AND committed IS NULL",
                    table
                ),
                params![changeset_id],
            )?;
        }
        Ok(())
    }

    /// Attach the applied field-change summary to the approval comment.
    pub fn record_approval_changes(
        &self,
        changeset_id: i64,
        field_changes: &serde_json::Value,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE oi_changeset_comments SET field_changes = ?2
             WHERE id = (SELECT MAX(id) FROM oi_changeset_comments WHERE changeset_id = ?1)",
            params![changeset_id, field_changes.to_string()],
        )?;
        Ok(())
    }

    /// Classify what a changeset did from its revision contents: all adds ->
    /// ADD, all deletes -> DELETE, anything else -> MODIFY.
    pub fn changeset_action(&self, changeset_id: i64) -> Result<ChangesetAction> {
        let conn = self.conn.lock().unwrap();
        let union = Self::REVISION_TABLES
            .iter()
            .map(|(table, _)| {
                format!(
                    "SELECT previous_revision IS NULL AS added, deleted FROM {}
                     WHERE changeset_id = ?1 AND (committed IS NULL OR committed = 1)",
                    table
                )
            })
            .collect::<Vec<_>>()
            .join(" UNION ALL ");
        let mut stmt = conn.prepare(&union)?;
        let rows = stmt
            .query_map(params![changeset_id], |row| {
                Ok((row.get::<_, bool>(0)?, row.get::<_, bool>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        if rows.is_empty() {
            return Ok(ChangesetAction::Modify);
        }
        if rows.iter().all(|(_, deleted)| *deleted) {
            return Ok(ChangesetAction::Delete);
        }
        if rows.iter().all(|(added, deleted)| *added && !deleted) {
            return Ok(ChangesetAction::Add);
        }
        Ok(ChangesetAction::Modify)
    }

    /// The unique latest approved revision of a display row: committed, and
    /// without a committed or open successor. Raises a data-integrity fault
    /// when zero or more than one candidate exists, since the revision
    /// chain invariant would be violated.
    pub(crate) fn latest_approved_revision(
        &self,
        table: &str,
        source_column: &str,
        source_id: i64,
    ) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT r.id FROM {table} r
             WHERE r.{col} = ?1 AND r.committed = 1 AND NOT EXISTS (
                 SELECT 1 FROM {table} n
                 WHERE n.previous_revision = r.id
                   AND (n.committed = 1 OR n.committed IS NULL))",
            table = table,
            col = source_column,
        );
        let mut stmt = conn.prepare(&sql)?;
        let ids = stmt
            .query_map(params![source_id], |r| r.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        match ids.as_slice() {
            [id] => Ok(*id),
            [] => Err(RevisionError::DataIntegrity(format!(
                "no latest approved revision in {} for row {}",
                table, source_id
            ))
            .into()),
            _ => Err(RevisionError::DataIntegrity(format!(
                "{} latest approved revisions in {} for row {}",
                ids.len(),
                table,
                source_id
            ))
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;

    #[test]
    fn changeset_lifecycle_and_comments() {
        let db = open_in_memory().unwrap();
        let store = db.indexing();

        let changeset = store
            .create_changeset("indexer_anna", ChangeType::Series)
            .unwrap();
        assert_eq!(changeset.state, ChangesetState::Open);
        assert!(changeset.approver.is_none());

        store
            .transition_changeset(changeset.id, ChangesetState::Pending, "indexer_anna", "submitted")
            .unwrap();
        store
            .transition_changeset(changeset.id, ChangesetState::Reviewing, "editor_bob", "examining")
            .unwrap();

        let loaded = store.get_changeset(changeset.id).unwrap();
        assert_eq!(loaded.state, ChangesetState::Reviewing);

        let comments = store.comments_of(changeset.id).unwrap();
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].old_state, ChangesetState::Open);
        assert_eq!(comments[0].new_state, ChangesetState::Pending);
        assert_eq!(comments[1].commenter, "editor_bob");
    }

    #[test]
    fn illegal_transition_rejected() {
        let db = open_in_memory().unwrap();
        let store = db.indexing();
        let changeset = store
            .create_changeset("indexer_anna", ChangeType::Issue)
            .unwrap();

        let err = store
            .transition_changeset(changeset.id, ChangesetState::Approved, "x", "skip review")
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RevisionError>(),
            Some(RevisionError::Validation(_))
        ));
    }

    #[test]
    fn lock_exclusivity_per_row() {
        let db = open_in_memory().unwrap();
        let store = db.indexing();
        let a = store.create_changeset("anna", ChangeType::Issue).unwrap();
        let b = store.create_changeset("bob", ChangeType::Issue).unwrap();

        store
            .acquire_lock(EntityKind::Issue, 42, Some(a.id))
            .unwrap();
        // Re-acquiring for the same changeset is fine.
        store
            .acquire_lock(EntityKind::Issue, 42, Some(a.id))
            .unwrap();

        let err = store
            .acquire_lock(EntityKind::Issue, 42, Some(b.id))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RevisionError>(),
            Some(RevisionError::Locked { .. })
        ));

        // A different row is unaffected.
        store
            .acquire_lock(EntityKind::Issue, 43, Some(b.id))
            .unwrap();

        store.release_changeset_locks(a.id).unwrap();
        store
            .acquire_lock(EntityKind::Issue, 42, Some(b.id))
            .unwrap();
    }

    #[test]
    fn provisional_lock_promotion() {
        let db = open_in_memory().unwrap();
        let store = db.indexing();

        store.acquire_lock(EntityKind::Series, 9, None).unwrap();
        assert_eq!(store.lock_holder(EntityKind::Series, 9).unwrap(), Some(None));

        let changeset = store.create_changeset("anna", ChangeType::Series).unwrap();
        store
            .assign_lock(EntityKind::Series, 9, changeset.id)
            .unwrap();
        assert_eq!(
            store.lock_holder(EntityKind::Series, 9).unwrap(),
            Some(Some(changeset.id))
        );
    }

    #[test]
    fn co_editors_deduplicate() {
        let db = open_in_memory().unwrap();
        let store = db.indexing();
        let changeset = store.create_changeset("anna", ChangeType::Issue).unwrap();

        store.add_editor(changeset.id, "dave").unwrap();
        store.add_editor(changeset.id, "carol").unwrap();
        store.add_editor(changeset.id, "dave").unwrap();

        assert_eq!(
            store.editors_of(changeset.id).unwrap(),
            vec!["carol".to_string(), "dave".to_string()]
        );
    }

    #[test]
    fn ongoing_reservation_roundtrip() {
        let db = open_in_memory().unwrap();
        let store = db.indexing();

        store.create_ongoing_reservation("anna", 5).unwrap();
        let reservation = store.ongoing_reservation_for(5).unwrap().unwrap();
        assert_eq!(reservation.indexer, "anna");

        store.delete_ongoing_reservation(5).unwrap();
        assert!(store.ongoing_reservation_for(5).unwrap().is_none());
    }
}
