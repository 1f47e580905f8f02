//! SeriesBondRevision: tracking/continuation links between series.

use super::changeset::{Changeset, IndexingStore};
use super::publisher::open_revision_ids;
use super::revision::{Changes, CommitContext, RevisionCommit, RevisionError, RevisionMeta};
use crate::display::{BondType, EntityKind, SeriesBond};
use anyhow::Result;
use rusqlite::{params, OptionalExtension};

#[derive(Clone, Debug)]
pub struct SeriesBondRevision {
    pub meta: RevisionMeta,
    pub series_bond_id: Option<i64>,
    pub origin: Option<i64>,
    pub origin_issue: Option<i64>,
    pub target: Option<i64>,
    pub target_issue: Option<i64>,
    pub bond_type: BondType,
    pub notes: String,
}

impl SeriesBondRevision {
    pub fn new_added(
        changeset: &Changeset,
        origin: i64,
        target: i64,
        bond_type: BondType,
    ) -> Self {
        SeriesBondRevision {
            meta: RevisionMeta::new(changeset.id),
            series_bond_id: None,
            origin: Some(origin),
            origin_issue: None,
            target: Some(target),
            target_issue: None,
            bond_type,
            notes: String::new(),
        }
    }

    pub fn clone_from(
        oi: &IndexingStore,
        bond: &SeriesBond,
        changeset: &Changeset,
    ) -> Result<Self> {
        oi.acquire_lock(EntityKind::SeriesBond, bond.id, Some(changeset.id))?;
        let previous =
            oi.latest_approved_revision("oi_series_bond_revisions", "series_bond_id", bond.id)?;

        let mut revision = SeriesBondRevision {
            meta: RevisionMeta::new(changeset.id),
            series_bond_id: Some(bond.id),
            origin: Some(bond.origin),
            origin_issue: bond.origin_issue,
            target: Some(bond.target),
            target_issue: bond.target_issue,
            bond_type: bond.bond_type,
            notes: bond.notes.clone(),
        };
        revision.meta.previous_revision = Some(previous);
        revision.persist(oi)?;
        Ok(revision)
    }

    pub fn persist(&mut self, oi: &IndexingStore) -> Result<()> {
        let conn = oi.conn().lock().unwrap();
        if self.meta.id == 0 {
            conn.execute(
                "INSERT INTO oi_series_bond_revisions (changeset_id, deleted, committed,
                    previous_revision, series_bond_id, origin, origin_issue, target,
                    target_issue, bond_type, notes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    self.meta.changeset_id,
                    self.meta.deleted,
                    self.meta.committed,
                    self.meta.previous_revision,
                    self.series_bond_id,
                    self.origin,
                    self.origin_issue,
                    self.target,
                    self.target_issue,
                    self.bond_type.to_db_str(),
                    self.notes,
                ],
            )?;
            self.meta.id = conn.last_insert_rowid();
        } else {
            conn.execute(
                "UPDATE oi_series_bond_revisions SET changeset_id = ?2, deleted = ?3,
                    committed = ?4, previous_revision = ?5, series_bond_id = ?6, origin = ?7,
                    origin_issue = ?8, target = ?9, target_issue = ?10, bond_type = ?11,
                    notes = ?12
                 WHERE id = ?1",
                params![
                    self.meta.id,
                    self.meta.changeset_id,
                    self.meta.deleted,
                    self.meta.committed,
                    self.meta.previous_revision,
                    self.series_bond_id,
                    self.origin,
                    self.origin_issue,
                    self.target,
                    self.target_issue,
                    self.bond_type.to_db_str(),
                    self.notes,
                ],
            )?;
        }
        Ok(())
    }

    pub fn load(oi: &IndexingStore, id: i64) -> Result<Self> {
        let conn = oi.conn().lock().unwrap();
        let mut stmt =
            conn.prepare_cached("SELECT * FROM oi_series_bond_revisions WHERE id = ?1")?;
        stmt.query_row(params![id], |row| {
            Ok(SeriesBondRevision {
                meta: RevisionMeta {
                    id: row.get("id")?,
                    changeset_id: row.get("changeset_id")?,
                    deleted: row.get("deleted")?,
                    committed: row.get("committed")?,
                    previous_revision: row.get("previous_revision")?,
                    created: row.get("created")?,
                },
                series_bond_id: row.get("series_bond_id")?,
                origin: row.get("origin")?,
                origin_issue: row.get("origin_issue")?,
                target: row.get("target")?,
                target_issue: row.get("target_issue")?,
                bond_type: BondType::from_db_str(&row.get::<_, String>("bond_type")?),
                notes: row.get("notes")?,
            })
        })
        .optional()?
        .ok_or_else(|| RevisionError::NotFound { what: "series bond revision", id }.into())
    }

    pub fn open_ids(oi: &IndexingStore, changeset_id: i64) -> Result<Vec<i64>> {
        open_revision_ids(oi, "oi_series_bond_revisions", changeset_id, "id ASC")
    }
}

impl RevisionCommit for SeriesBondRevision {
    fn source_name(&self) -> &'static str {
        "series_bond"
    }

    fn meta(&self) -> &RevisionMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RevisionMeta {
        &mut self.meta
    }

    fn source_id(&self) -> Option<i64> {
        self.series_bond_id
    }

    fn delete_display_object(&mut self, ctx: &CommitContext) -> Result<()> {
        let id = self.series_bond_id.ok_or_else(|| {
            RevisionError::DataIntegrity("series bond delete without a source".to_string())
        })?;
        // History stays readable: every revision of the vanished bond,
        // this one included, drops its reference.
        {
            let conn = ctx.oi.conn().lock().unwrap();
            conn.execute(
                "UPDATE oi_series_bond_revisions SET series_bond_id = NULL
                 WHERE series_bond_id = ?1",
                params![id],
            )?;
        }
        self.series_bond_id = None;
        ctx.display.delete_series_bond(id)
    }

    fn write_display_object(&mut self, ctx: &CommitContext, _changes: &Changes) -> Result<()> {
        let origin = self.origin.ok_or_else(|| {
            RevisionError::DataIntegrity("series bond without an origin".to_string())
        })?;
        let target = self.target.ok_or_else(|| {
            RevisionError::DataIntegrity("series bond without a target".to_string())
        })?;

        let mut bond = match self.series_bond_id {
            Some(id) => ctx
                .display
                .get_series_bond(id)?
                .ok_or(RevisionError::NotFound { what: "series bond", id })?,
            None => SeriesBond {
                id: 0,
                origin,
                origin_issue: None,
                target,
                target_issue: None,
                bond_type: self.bond_type,
                notes: String::new(),
                reserved: false,
            },
        };

        bond.origin = origin;
        bond.origin_issue = self.origin_issue;
        bond.target = target;
        bond.target_issue = self.target_issue;
        bond.bond_type = self.bond_type;
        bond.notes = self.notes.clone();
        if ctx.clear_reservation {
            bond.reserved = false;
        }
        ctx.display.save_series_bond(&mut bond)?;

        if self.series_bond_id.is_none() {
            self.series_bond_id = Some(bond.id);
            self.persist(ctx.oi)?;
        }
        Ok(())
    }

    fn save(&mut self, ctx: &CommitContext) -> Result<()> {
        self.persist(ctx.oi)
    }
}
