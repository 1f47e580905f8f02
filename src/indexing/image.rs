//! ImageRevision: generic attached images with a unique-per-owner rule and
//! a replacement flow that preserves the replaced file on the superseded
//! revision.

use super::changeset::{Changeset, IndexingStore};
use super::publisher::open_revision_ids;
use super::revision::{Changes, CommitContext, RevisionCommit, RevisionError, RevisionMeta};
use crate::display::{EntityKind, Image, ImageType};
use anyhow::Result;
use rusqlite::{params, OptionalExtension};

#[derive(Clone, Debug)]
pub struct ImageRevision {
    pub meta: RevisionMeta,
    pub image_id: Option<i64>,
    pub owner_kind: EntityKind,
    pub owner_id: i64,
    pub image_type: ImageType,
    pub image_file: String,
    pub marked: bool,
    pub is_replacement: bool,
}

impl ImageRevision {
    pub fn new_added(
        changeset: &Changeset,
        owner_kind: EntityKind,
        owner_id: i64,
        image_type: ImageType,
        image_file: &str,
    ) -> Self {
        ImageRevision {
            meta: RevisionMeta::new(changeset.id),
            image_id: None,
            owner_kind,
            owner_id,
            image_type,
            image_file: image_file.to_string(),
            marked: false,
            is_replacement: false,
        }
    }

    pub fn clone_from(oi: &IndexingStore, image: &Image, changeset: &Changeset) -> Result<Self> {
        oi.acquire_lock(EntityKind::Image, image.id, Some(changeset.id))?;
        let previous = oi.latest_approved_revision("oi_image_revisions", "image_id", image.id)?;

        let mut revision = ImageRevision {
            meta: RevisionMeta::new(changeset.id),
            image_id: Some(image.id),
            owner_kind: image.owner_kind,
            owner_id: image.owner_id,
            image_type: image.image_type,
            image_file: image.image_file.clone(),
            marked: image.marked,
            is_replacement: false,
        };
        revision.meta.previous_revision = Some(previous);
        revision.persist(oi)?;
        Ok(revision)
    }

    pub fn persist(&mut self, oi: &IndexingStore) -> Result<()> {
        let conn = oi.conn().lock().unwrap();
        if self.meta.id == 0 {
            conn.execute(
                "INSERT INTO oi_image_revisions (changeset_id, deleted, committed,
                    previous_revision, image_id, owner_kind, owner_id, image_type,
                    image_file, marked, is_replacement)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    self.meta.changeset_id,
                    self.meta.deleted,
                    self.meta.committed,
                    self.meta.previous_revision,
                    self.image_id,
                    self.owner_kind.to_db_str(),
                    self.owner_id,
                    self.image_type.to_db_str(),
                    self.image_file,
                    self.marked,
                    self.is_replacement,
                ],
            )?;
            self.meta.id = conn.last_insert_rowid();
        } else {
            conn.execute(
                "UPDATE oi_image_revisions SET changeset_id = ?2, deleted = ?3,
                    committed = ?4, previous_revision = ?5, image_id = ?6, owner_kind = ?7,
                    owner_id = ?8, image_type = ?9, image_file = ?10, marked = ?11,
                    is_replacement = ?12
                 WHERE id = ?1",
                params![
                    self.meta.id,
                    self.meta.changeset_id,
                    self.meta.deleted,
                    self.meta.committed,
                    self.meta.previous_revision,
                    self.image_id,
                    self.owner_kind.to_db_str(),
                    self.owner_id,
                    self.image_type.to_db_str(),
                    self.image_file,
                    self.marked,
                    self.is_replacement,
                ],
            )?;
        }
        Ok(())
    }

    pub fn load(oi: &IndexingStore, id: i64) -> Result<Self> {
        let conn = oi.conn().lock().unwrap();
        let mut stmt = conn.prepare_cached("SELECT * FROM oi_image_revisions WHERE id = ?1")?;
        stmt.query_row(params![id], |row| {
            Ok(ImageRevision {
                meta: RevisionMeta {
                    id: row.get("id")?,
                    changeset_id: row.get("changeset_id")?,
                    deleted: row.get("deleted")?,
                    committed: row.get("committed")?,
                    previous_revision: row.get("previous_revision")?,
                    created: row.get("created")?,
                },
                image_id: row.get("image_id")?,
                owner_kind: EntityKind::from_db_str(&row.get::<_, String>("owner_kind")?),
                owner_id: row.get("owner_id")?,
                image_type: ImageType::from_db_str(&row.get::<_, String>("image_type")?),
                image_file: row.get("image_file")?,
                marked: row.get("marked")?,
                is_replacement: row.get("is_replacement")?,
            })
        })
        .optional()?
        .ok_or_else(|| RevisionError::NotFound { what: "image revision", id }.into())
    }

    pub fn open_ids(oi: &IndexingStore, changeset_id: i64) -> Result<Vec<i64>> {
        open_revision_ids(oi, "oi_image_revisions", changeset_id, "id ASC")
    }
}

impl RevisionCommit for ImageRevision {
    fn source_name(&self) -> &'static str {
        "image"
    }

    fn meta(&self) -> &RevisionMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RevisionMeta {
        &mut self.meta
    }

    fn source_id(&self) -> Option<i64> {
        self.image_id
    }

    fn pre_commit_check(&self, ctx: &CommitContext) -> Result<()> {
        // Unique image types allow only replacements once an image exists.
        if self.image_id.is_none()
            && !self.is_replacement
            && self.image_type.unique_per_owner()
        {
            let existing = ctx.display.image_count_for_owner(
                self.owner_kind,
                self.owner_id,
                self.image_type,
            )?;
            if existing > 0 {
                return Err(RevisionError::Validation(format!(
                    "{} {} already has a {}; only replacements are possible",
                    self.owner_kind.to_db_str(),
                    self.owner_id,
                    self.image_type.to_db_str()
                ))
                .into());
            }
        }
        Ok(())
    }

    fn delete_display_object(&mut self, ctx: &CommitContext) -> Result<()> {
        let id = self.image_id.ok_or_else(|| {
            RevisionError::DataIntegrity("image delete without a source".to_string())
        })?;
        ctx.display.delete_image(id)
    }

    fn write_display_object(&mut self, ctx: &CommitContext, _changes: &Changes) -> Result<()> {
        let mut image = match self.image_id {
            Some(id) => ctx
                .display
                .get_image(id)?
                .ok_or(RevisionError::NotFound { what: "image", id })?,
            None => Image {
                id: 0,
                owner_kind: self.owner_kind,
                owner_id: self.owner_id,
                image_type: self.image_type,
                image_file: String::new(),
                marked: self.marked,
                reserved: false,
            },
        };

        if self.is_replacement {
            // Preserve the replaced file on the superseded revision so the
            // old upload stays reachable through history.
            if let Some(previous_id) = self.meta.previous_revision {
                let mut previous = ImageRevision::load(ctx.oi, previous_id)?;
                previous.image_file = image.image_file.clone();
                previous.persist(ctx.oi)?;
            }
        }

        image.owner_kind = self.owner_kind;
        image.owner_id = self.owner_id;
        image.image_type = self.image_type;
        image.image_file = self.image_file.clone();
        image.marked = self.marked;
        if ctx.clear_reservation {
            image.reserved = false;
        }
        ctx.display.save_image(&mut image)?;

        if self.image_id.is_none() {
            self.image_id = Some(image.id);
            self.persist(ctx.oi)?;
        }
        Ok(())
    }

    fn save(&mut self, ctx: &CommitContext) -> Result<()> {
        self.persist(ctx.oi)
    }
}
