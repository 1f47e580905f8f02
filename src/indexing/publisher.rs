//! Revisions for the publisher family: Publisher, IndiciaPublisher,
//! BrandGroup, Brand, and BrandUse.
//!
//! The family shares a common block of editable fields; Brand additionally
//! stages a many-to-many group membership, and adds cascade: a new
//! BrandGroup creates its first Brand, a new Brand creates its first
//! BrandUse against the group's parent publisher.

use super::changeset::{Changeset, IndexingStore};
use super::revision::{
    commit_revision, CommitContext, RevisionCommit, RevisionError, RevisionMeta, Side,
    Changes, FieldValue,
};
use super::stats::{CountMap, StatsBucket, STAT_BRANDS, STAT_BRAND_GROUPS, STAT_INDICIA_PUBLISHERS, STAT_PUBLISHERS};
use crate::display::{
    Brand, BrandGroup, BrandUse, DisplayStore, EntityKind, IndiciaPublisher, Publisher,
};
use anyhow::Result;
use rusqlite::{params, OptionalExtension};
use std::collections::BTreeSet;

/// The editable fields shared by the whole publisher family.
#[derive(Clone, Debug, Default)]
pub struct PublisherBaseFields {
    pub name: String,
    pub year_began: Option<i64>,
    pub year_ended: Option<i64>,
    pub year_began_uncertain: bool,
    pub year_ended_uncertain: bool,
    pub url: String,
    pub notes: String,
    pub keywords: String,
}

// =============================================================================
// PublisherRevision
// =============================================================================

#[derive(Clone, Debug)]
pub struct PublisherRevision {
    pub meta: RevisionMeta,
    pub publisher_id: Option<i64>,
    pub base: PublisherBaseFields,
    pub country: String,
}

impl PublisherRevision {
    fn require_source(&self) -> anyhow::Result<i64> {
        self.publisher_id.ok_or_else(|| {
            RevisionError::DataIntegrity("publisher revision without a source".to_string())
                .into()
        })
    }

    pub fn new_added(changeset: &Changeset, base: PublisherBaseFields, country: &str) -> Self {
        PublisherRevision {
            meta: RevisionMeta::new(changeset.id),
            publisher_id: None,
            base,
            country: country.to_string(),
        }
    }

    /// Clone an existing publisher into a fresh revision for editing.
    pub fn clone_from(
        display: &DisplayStore,
        oi: &IndexingStore,
        publisher: &Publisher,
        changeset: &Changeset,
    ) -> Result<Self> {
        oi.acquire_lock(EntityKind::Publisher, publisher.id, Some(changeset.id))?;
        let previous =
            oi.latest_approved_revision("oi_publisher_revisions", "publisher_id", publisher.id)?;

        let mut revision = PublisherRevision {
            meta: RevisionMeta::new(changeset.id),
            publisher_id: Some(publisher.id),
            base: PublisherBaseFields {
                name: publisher.name.clone(),
                year_began: publisher.year_began,
                year_ended: publisher.year_ended,
                year_began_uncertain: publisher.year_began_uncertain,
                year_ended_uncertain: publisher.year_ended_uncertain,
                url: publisher.url.clone(),
                notes: publisher.notes.clone(),
                keywords: display.get_keywords(EntityKind::Publisher, publisher.id)?,
            },
            country: publisher.country.clone(),
        };
        revision.meta.previous_revision = Some(previous);
        revision.persist(oi)?;
        Ok(revision)
    }

    pub fn persist(&mut self, oi: &IndexingStore) -> Result<()> {
        let conn = oi.conn().lock().unwrap();
        if self.meta.id == 0 {
            conn.execute(
                "INSERT INTO oi_publisher_revisions (changeset_id, deleted, committed,
                    previous_revision, publisher_id, name, year_began, year_ended,
                    year_began_uncertain, year_ended_uncertain, url, notes, keywords, country)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    self.meta.changeset_id,
                    self.meta.deleted,
                    self.meta.committed,
                    self.meta.previous_revision,
                    self.publisher_id,
                    self.base.name,
                    self.base.year_began,
                    self.base.year_ended,
                    self.base.year_began_uncertain,
                    self.base.year_ended_uncertain,
                    self.base.url,
                    self.base.notes,
                    self.base.keywords,
                    self.country,
                ],
            )?;
            self.meta.id = conn.last_insert_rowid();
        } else {
            conn.execute(
                "UPDATE oi_publisher_revisions SET changeset_id = ?2, deleted = ?3,
                    committed = ?4, previous_revision = ?5, publisher_id = ?6, name = ?7,
                    year_began = ?8, year_ended = ?9, year_began_uncertain = ?10,
                    year_ended_uncertain = ?11, url = ?12, notes = ?13, keywords = ?14,
                    country = ?15
                 WHERE id = ?1",
                params![
                    self.meta.id,
                    self.meta.changeset_id,
                    self.meta.deleted,
                    self.meta.committed,
                    self.meta.previous_revision,
                    self.publisher_id,
                    self.base.name,
                    self.base.year_began,
                    self.base.year_ended,
                    self.base.year_began_uncertain,
                    self.base.year_ended_uncertain,
                    self.base.url,
                    self.base.notes,
                    self.base.keywords,
                    self.country,
                ],
            )?;
        }
        Ok(())
    }

    pub fn load(oi: &IndexingStore, id: i64) -> Result<Self> {
        let conn = oi.conn().lock().unwrap();
        let mut stmt = conn.prepare_cached("SELECT * FROM oi_publisher_revisions WHERE id = ?1")?;
        stmt.query_row(params![id], |row| {
            Ok(PublisherRevision {
                meta: RevisionMeta {
                    id: row.get("id")?,
                    changeset_id: row.get("changeset_id")?,
                    deleted: row.get("deleted")?,
                    committed: row.get("committed")?,
                    previous_revision: row.get("previous_revision")?,
                    created: row.get("created")?,
                },
                publisher_id: row.get("publisher_id")?,
                base: PublisherBaseFields {
                    name: row.get("name")?,
                    year_began: row.get("year_began")?,
                    year_ended: row.get("year_ended")?,
                    year_began_uncertain: row.get("year_began_uncertain")?,
                    year_ended_uncertain: row.get("year_ended_uncertain")?,
                    url: row.get("url")?,
                    notes: row.get("notes")?,
                    keywords: row.get("keywords")?,
                },
                country: row.get("country")?,
            })
        })
        .optional()?
        .ok_or_else(|| RevisionError::NotFound { what: "publisher revision", id }.into())
    }

    pub fn open_ids(oi: &IndexingStore, changeset_id: i64) -> Result<Vec<i64>> {
        open_revision_ids(oi, "oi_publisher_revisions", changeset_id, "id ASC")
    }
}

impl RevisionCommit for PublisherRevision {
    fn source_name(&self) -> &'static str {
        "publisher"
    }

    fn meta(&self) -> &RevisionMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RevisionMeta {
        &mut self.meta
    }

    fn source_id(&self) -> Option<i64> {
        self.publisher_id
    }

    fn stats_category_tuples(&self) -> &'static [&'static [&'static str]] {
        &[&["country"]]
    }

    fn resolve_path(&self, ctx: &CommitContext, side: Side, path: &[&str]) -> Result<FieldValue> {
        match (path, side) {
            (["country"], Side::New) => Ok(FieldValue::Text(self.country.clone())),
            (["country"], Side::Old) => {
                let id = self.require_source()?;
                let publisher = ctx.display.get_publisher(id)?.ok_or(
                    RevisionError::NotFound { what: "publisher", id },
                )?;
                Ok(FieldValue::Text(publisher.country))
            }
            _ => Ok(FieldValue::Absent),
        }
    }

    fn entity_counts(&self, _ctx: &CommitContext, _side: Side) -> Result<CountMap> {
        Ok(CountMap::of(STAT_PUBLISHERS, 1))
    }

    fn delete_display_object(&mut self, ctx: &CommitContext) -> Result<()> {
        let id = self.require_source()?;
        ctx.display.set_keywords(EntityKind::Publisher, id, "")?;
        ctx.display.delete_publisher(id)
    }

    fn write_display_object(&mut self, ctx: &CommitContext, _changes: &Changes) -> Result<()> {
        let mut publisher = match self.publisher_id {
            Some(id) => ctx
                .display
                .get_publisher(id)?
                .ok_or(RevisionError::NotFound { what: "publisher", id })?,
            None => Publisher::default(),
        };

        publisher.name = self.base.name.clone();
        publisher.year_began = self.base.year_began;
        publisher.year_ended = self.base.year_ended;
        publisher.year_began_uncertain = self.base.year_began_uncertain;
        publisher.year_ended_uncertain = self.base.year_ended_uncertain;
        publisher.url = self.base.url.clone();
        publisher.notes = self.base.notes.clone();
        publisher.country = self.country.clone();
        if ctx.clear_reservation {
            publisher.reserved = false;
        }
        ctx.display.save_publisher(&mut publisher)?;

        if self.publisher_id.is_none() {
            self.publisher_id = Some(publisher.id);
            self.persist(ctx.oi)?;
        }
        transfer_keywords(ctx, EntityKind::Publisher, publisher.id, &mut self.base.keywords)?;
        Ok(())
    }

    fn save(&mut self, ctx: &CommitContext) -> Result<()> {
        self.persist(ctx.oi)
    }
}

// =============================================================================
// IndiciaPublisherRevision
// =============================================================================

#[derive(Clone, Debug)]
pub struct IndiciaPublisherRevision {
    pub meta: RevisionMeta,
    pub indicia_publisher_id: Option<i64>,
    pub base: PublisherBaseFields,
    pub is_surrogate: bool,
    pub country: String,
    pub parent: i64,
}

impl IndiciaPublisherRevision {
    fn require_source(&self) -> anyhow::Result<i64> {
        self.indicia_publisher_id.ok_or_else(|| {
            RevisionError::DataIntegrity(
                "indicia publisher revision without a source".to_string(),
            )
            .into()
        })
    }

    pub fn new_added(
        changeset: &Changeset,
        base: PublisherBaseFields,
        country: &str,
        parent: i64,
    ) -> Self {
        IndiciaPublisherRevision {
            meta: RevisionMeta::new(changeset.id),
            indicia_publisher_id: None,
            base,
            is_surrogate: false,
            country: country.to_string(),
            parent,
        }
    }

    pub fn clone_from(
        display: &DisplayStore,
        oi: &IndexingStore,
        ipub: &IndiciaPublisher,
        changeset: &Changeset,
    ) -> Result<Self> {
        oi.acquire_lock(EntityKind::IndiciaPublisher, ipub.id, Some(changeset.id))?;
        let previous = oi.latest_approved_revision(
            "oi_indicia_publisher_revisions",
            "indicia_publisher_id",
            ipub.id,
        )?;

        let mut revision = IndiciaPublisherRevision {
            meta: RevisionMeta::new(changeset.id),
            indicia_publisher_id: Some(ipub.id),
            base: PublisherBaseFields {
                name: ipub.name.clone(),
                year_began: ipub.year_began,
                year_ended: ipub.year_ended,
                year_began_uncertain: ipub.year_began_uncertain,
                year_ended_uncertain: ipub.year_ended_uncertain,
                url: ipub.url.clone(),
                notes: ipub.notes.clone(),
                keywords: display.get_keywords(EntityKind::IndiciaPublisher, ipub.id)?,
            },
            is_surrogate: ipub.is_surrogate,
            country: ipub.country.clone(),
            parent: ipub.parent,
        };
        revision.meta.previous_revision = Some(previous);
        revision.persist(oi)?;
        Ok(revision)
    }

    pub fn persist(&mut self, oi: &IndexingStore) -> Result<()> {
        let conn = oi.conn().lock().unwrap();
        if self.meta.id == 0 {
            conn.execute(
                "INSERT INTO oi_indicia_publisher_revisions (changeset_id, deleted, committed,
                    previous_revision, indicia_publisher_id, name, year_began, year_ended,
                    year_began_uncertain, year_ended_uncertain, url, notes, keywords,
                    is_surrogate, country, parent)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                params![
                    self.meta.changeset_id,
                    self.meta.deleted,
                    self.meta.committed,
                    self.meta.previous_revision,
                    self.indicia_publisher_id,
                    self.base.name,
                    self.base.year_began,
                    self.base.year_ended,
                    self.base.year_began_uncertain,
                    self.base.year_ended_uncertain,
                    self.base.url,
                    self.base.notes,
                    self.base.keywords,
                    self.is_surrogate,
                    self.country,
                    self.parent,
                ],
            )?;
            self.meta.id = conn.last_insert_rowid();
        } else {
            conn.execute(
                "UPDATE oi_indicia_publisher_revisions SET changeset_id = ?2, deleted = ?3,
                    committed = ?4, previous_revision = ?5, indicia_publisher_id = ?6,
                    name = ?7, year_began = ?8, year_ended = ?9, year_began_uncertain = ?10,
                    year_ended_uncertain = ?11, url = ?12, notes = ?13, keywords = ?14,
                    is_surrogate = ?15, country = ?16, parent = ?17
                 WHERE id = ?1",
                params![
                    self.meta.id,
                    self.meta.changeset_id,
                    self.meta.deleted,
                    self.meta.committed,
                    self.meta.previous_revision,
                    self.indicia_publisher_id,
                    self.base.name,
                    self.base.year_began,
                    self.base.year_ended,
                    self.base.year_began_uncertain,
                    self.base.year_ended_uncertain,
                    self.base.url,
                    self.base.notes,
                    self.base.keywords,
                    self.is_surrogate,
                    self.country,
                    self.parent,
                ],
            )?;
        }
        Ok(())
    }

    pub fn load(oi: &IndexingStore, id: i64) -> Result<Self> {
        let conn = oi.conn().lock().unwrap();
        let mut stmt =
            conn.prepare_cached("SELECT * FROM oi_indicia_publisher_revisions WHERE id = ?1")?;
        stmt.query_row(params![id], |row| {
            Ok(IndiciaPublisherRevision {
                meta: RevisionMeta {
                    id: row.get("id")?,
                    changeset_id: row.get("changeset_id")?,
                    deleted: row.get("deleted")?,
                    committed: row.get("committed")?,
                    previous_revision: row.get("previous_revision")?,
                    created: row.get("created")?,
                },
                indicia_publisher_id: row.get("indicia_publisher_id")?,
                base: PublisherBaseFields {
                    name: row.get("name")?,
                    year_began: row.get("year_began")?,
                    year_ended: row.get("year_ended")?,
                    year_began_uncertain: row.get("year_began_uncertain")?,
                    year_ended_uncertain: row.get("year_ended_uncertain")?,
                    url: row.get("url")?,
                    notes: row.get("notes")?,
                    keywords: row.get("keywords")?,
                },
                is_surrogate: row.get("is_surrogate")?,
                country: row.get("country")?,
                parent: row.get("parent")?,
            })
        })
        .optional()?
        .ok_or_else(|| {
            RevisionError::NotFound { what: "indicia publisher revision", id }.into()
        })
    }

    pub fn open_ids(oi: &IndexingStore, changeset_id: i64) -> Result<Vec<i64>> {
        open_revision_ids(oi, "oi_indicia_publisher_revisions", changeset_id, "id ASC")
    }
}

impl RevisionCommit for IndiciaPublisherRevision {
    fn source_name(&self) -> &'static str {
        "indicia_publisher"
    }

    fn meta(&self) -> &RevisionMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RevisionMeta {
        &mut self.meta
    }

    fn source_id(&self) -> Option<i64> {
        self.indicia_publisher_id
    }

    fn parent_field_tuples(&self) -> &'static [&'static [&'static str]] {
        &[&["parent"]]
    }

    fn stats_category_tuples(&self) -> &'static [&'static [&'static str]] {
        &[&["country"]]
    }

    fn parent_kind(&self, _path: &[&str]) -> EntityKind {
        EntityKind::Publisher
    }

    fn resolve_path(&self, ctx: &CommitContext, side: Side, path: &[&str]) -> Result<FieldValue> {
        let old_row = |id: i64| -> Result<IndiciaPublisher> {
            ctx.display
                .get_indicia_publisher(id)?
                .ok_or_else(|| RevisionError::NotFound { what: "indicia publisher", id }.into())
        };
        match (path, side) {
            (["country"], Side::New) => Ok(FieldValue::Text(self.country.clone())),
            (["country"], Side::Old) => {
                let id = self.require_source()?;
                Ok(FieldValue::Text(old_row(id)?.country))
            }
            (["parent"], Side::New) => Ok(FieldValue::Ref(self.parent)),
            (["parent"], Side::Old) => {
                let id = self.require_source()?;
                Ok(FieldValue::Ref(old_row(id)?.parent))
            }
            _ => Ok(FieldValue::Absent),
        }
    }

    fn entity_counts(&self, _ctx: &CommitContext, _side: Side) -> Result<CountMap> {
        Ok(CountMap::of(STAT_INDICIA_PUBLISHERS, 1))
    }

    fn delete_display_object(&mut self, ctx: &CommitContext) -> Result<()> {
        let id = self.require_source()?;
        ctx.display.set_keywords(EntityKind::IndiciaPublisher, id, "")?;
        ctx.display.delete_indicia_publisher(id)
    }

    fn write_display_object(&mut self, ctx: &CommitContext, _changes: &Changes) -> Result<()> {
        let mut ipub = match self.indicia_publisher_id {
            Some(id) => ctx
                .display
                .get_indicia_publisher(id)?
                .ok_or(RevisionError::NotFound { what: "indicia publisher", id })?,
            None => IndiciaPublisher::default(),
        };

        ipub.name = self.base.name.clone();
        ipub.year_began = self.base.year_began;
        ipub.year_ended = self.base.year_ended;
        ipub.year_began_uncertain = self.base.year_began_uncertain;
        ipub.year_ended_uncertain = self.base.year_ended_uncertain;
        ipub.url = self.base.url.clone();
        ipub.notes = self.base.notes.clone();
        ipub.is_surrogate = self.is_surrogate;
        ipub.country = self.country.clone();
        ipub.parent = self.parent;
        if ctx.clear_reservation {
            ipub.reserved = false;
        }
        ctx.display.save_indicia_publisher(&mut ipub)?;

        if self.indicia_publisher_id.is_none() {
            self.indicia_publisher_id = Some(ipub.id);
            self.persist(ctx.oi)?;
        }
        transfer_keywords(
            ctx,
            EntityKind::IndiciaPublisher,
            ipub.id,
            &mut self.base.keywords,
        )?;
        Ok(())
    }

    fn save(&mut self, ctx: &CommitContext) -> Result<()> {
        self.persist(ctx.oi)
    }
}

// =============================================================================
// BrandGroupRevision
// =============================================================================

#[derive(Clone, Debug)]
pub struct BrandGroupRevision {
    pub meta: RevisionMeta,
    pub brand_group_id: Option<i64>,
    pub base: PublisherBaseFields,
    pub parent: i64,
}

impl BrandGroupRevision {
    fn require_source(&self) -> anyhow::Result<i64> {
        self.brand_group_id.ok_or_else(|| {
            RevisionError::DataIntegrity("brand group revision without a source".to_string())
                .into()
        })
    }

    pub fn new_added(changeset: &Changeset, base: PublisherBaseFields, parent: i64) -> Self {
        BrandGroupRevision {
            meta: RevisionMeta::new(changeset.id),
            brand_group_id: None,
            base,
            parent,
        }
    }

    pub fn clone_from(
        display: &DisplayStore,
        oi: &IndexingStore,
        group: &BrandGroup,
        changeset: &Changeset,
    ) -> Result<Self> {
        oi.acquire_lock(EntityKind::BrandGroup, group.id, Some(changeset.id))?;
        let previous =
            oi.latest_approved_revision("oi_brand_group_revisions", "brand_group_id", group.id)?;

        let mut revision = BrandGroupRevision {
            meta: RevisionMeta::new(changeset.id),
            brand_group_id: Some(group.id),
            base: PublisherBaseFields {
                name: group.name.clone(),
                year_began: group.year_began,
                year_ended: group.year_ended,
                year_began_uncertain: group.year_began_uncertain,
                year_ended_uncertain: group.year_ended_uncertain,
                url: group.url.clone(),
                notes: group.notes.clone(),
                keywords: display.get_keywords(EntityKind::BrandGroup, group.id)?,
            },
            parent: group.parent,
        };
        revision.meta.previous_revision = Some(previous);
        revision.persist(oi)?;
        Ok(revision)
    }

    pub fn persist(&mut self, oi: &IndexingStore) -> Result<()> {
        let conn = oi.conn().lock().unwrap();
        if self.meta.id == 0 {
            conn.execute(
                "INSERT INTO oi_brand_group_revisions (changeset_id, deleted, committed,
                    previous_revision, brand_group_id, name, year_began, year_ended,
                    year_began_uncertain, year_ended_uncertain, url, notes, keywords, parent)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    self.meta.changeset_id,
                    self.meta.deleted,
                    self.meta.committed,
                    self.meta.previous_revision,
                    self.brand_group_id,
                    self.base.name,
                    self.base.year_began,
                    self.base.year_ended,
                    self.base.year_began_uncertain,
                    self.base.year_ended_uncertain,
                    self.base.url,
                    self.base.notes,
                    self.base.keywords,
                    self.parent,
                ],
            )?;
            self.meta.id = conn.last_insert_rowid();
        } else {
            conn.execute(
                "UPDATE oi_brand_group_revisions SET changeset_id = ?2, deleted = ?3,
                    committed = ?4, previous_revision = ?5, brand_group_id = ?6, name = ?7,
                    year_began = ?8, year_ended = ?9, year_began_uncertain = ?10,
                    year_ended_uncertain = ?11, url = ?12, notes = ?13, keywords = ?14,
                    parent = ?15
                 WHERE id = ?1",
                params![
                    self.meta.id,
                    self.meta.changeset_id,
                    self.meta.deleted,
                    self.meta.committed,
                    self.meta.previous_revision,
                    self.brand_group_id,
                    self.base.name,
                    self.base.year_began,
                    self.base.year_ended,
                    self.base.year_began_uncertain,
                    self.base.year_ended_uncertain,
                    self.base.url,
                    self.base.notes,
                    self.base.keywords,
                    self.parent,
                ],
            )?;
        }
        Ok(())
    }

    pub fn load(oi: &IndexingStore, id: i64) -> Result<Self> {
        let conn = oi.conn().lock().unwrap();
        let mut stmt =
            conn.prepare_cached("SELECT * FROM oi_brand_group_revisions WHERE id = ?1")?;
        stmt.query_row(params![id], |row| {
            Ok(BrandGroupRevision {
                meta: RevisionMeta {
                    id: row.get("id")?,
                    changeset_id: row.get("changeset_id")?,
                    deleted: row.get("deleted")?,
                    committed: row.get("committed")?,
                    previous_revision: row.get("previous_revision")?,
                    created: row.get("created")?,
                },
                brand_group_id: row.get("brand_group_id")?,
                base: PublisherBaseFields {
                    name: row.get("name")?,
                    year_began: row.get("year_began")?,
                    year_ended: row.get("year_ended")?,
                    year_began_uncertain: row.get("year_began_uncertain")?,
                    year_ended_uncertain: row.get("year_ended_uncertain")?,
                    url: row.get("url")?,
                    notes: row.get("notes")?,
                    keywords: row.get("keywords")?,
                },
                parent: row.get("parent")?,
            })
        })
        .optional()?
        .ok_or_else(|| RevisionError::NotFound { what: "brand group revision", id }.into())
    }

    pub fn open_ids(oi: &IndexingStore, changeset_id: i64) -> Result<Vec<i64>> {
        open_revision_ids(oi, "oi_brand_group_revisions", changeset_id, "id ASC")
    }
}

impl RevisionCommit for BrandGroupRevision {
    fn source_name(&self) -> &'static str {
        "brand_group"
    }

    fn meta(&self) -> &RevisionMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RevisionMeta {
        &mut self.meta
    }

    fn source_id(&self) -> Option<i64> {
        self.brand_group_id
    }

    fn parent_field_tuples(&self) -> &'static [&'static [&'static str]] {
        &[&["parent"]]
    }

    fn parent_kind(&self, _path: &[&str]) -> EntityKind {
        EntityKind::Publisher
    }

    fn resolve_path(&self, ctx: &CommitContext, side: Side, path: &[&str]) -> Result<FieldValue> {
        match (path, side) {
            (["parent"], Side::New) => Ok(FieldValue::Ref(self.parent)),
            (["parent"], Side::Old) => {
                let id = self.require_source()?;
                let group = ctx
                    .display
                    .get_brand_group(id)?
                    .ok_or(RevisionError::NotFound { what: "brand group", id })?;
                Ok(FieldValue::Ref(group.parent))
            }
            _ => Ok(FieldValue::Absent),
        }
    }

    fn entity_counts(&self, _ctx: &CommitContext, _side: Side) -> Result<CountMap> {
        Ok(CountMap::of(STAT_BRAND_GROUPS, 1))
    }

    fn delete_display_object(&mut self, ctx: &CommitContext) -> Result<()> {
        let id = self.require_source()?;
        ctx.display.set_keywords(EntityKind::BrandGroup, id, "")?;
        ctx.display.delete_brand_group(id)
    }

    fn write_display_object(&mut self, ctx: &CommitContext, _changes: &Changes) -> Result<()> {
        let mut group = match self.brand_group_id {
            Some(id) => ctx
                .display
                .get_brand_group(id)?
                .ok_or(RevisionError::NotFound { what: "brand group", id })?,
            None => BrandGroup::default(),
        };

        group.name = self.base.name.clone();
        group.year_began = self.base.year_began;
        group.year_ended = self.base.year_ended;
        group.year_began_uncertain = self.base.year_began_uncertain;
        group.year_ended_uncertain = self.base.year_ended_uncertain;
        group.url = self.base.url.clone();
        group.notes = self.base.notes.clone();
        group.parent = self.parent;
        if ctx.clear_reservation {
            group.reserved = false;
        }
        ctx.display.save_brand_group(&mut group)?;

        if self.brand_group_id.is_none() {
            self.brand_group_id = Some(group.id);
            self.persist(ctx.oi)?;
        }
        transfer_keywords(ctx, EntityKind::BrandGroup, group.id, &mut self.base.keywords)?;
        Ok(())
    }

    fn post_adjust_stats(&mut self, ctx: &CommitContext, _changes: &Changes) -> Result<()> {
        // A freshly added group gets its first brand, which in turn gets
        // its first use; the cascade only runs on adds.
        if self.meta.previous_revision.is_some() || self.meta.deleted {
            return Ok(());
        }
        let group_id = self.require_source()?;
        let mut brand = BrandRevision::new_added(
            ctx.changeset,
            PublisherBaseFields {
                name: self.base.name.clone(),
                year_began: self.base.year_began,
                year_ended: self.base.year_ended,
                year_began_uncertain: self.base.year_began_uncertain,
                year_ended_uncertain: self.base.year_ended_uncertain,
                ..Default::default()
            },
            vec![group_id],
        );
        brand.persist(ctx.oi)?;
        brand.persist_groups(ctx.oi)?;
        commit_revision(&mut brand, ctx)?;
        Ok(())
    }

    fn save(&mut self, ctx: &CommitContext) -> Result<()> {
        self.persist(ctx.oi)
    }
}

// =============================================================================
// BrandRevision
// =============================================================================

#[derive(Clone, Debug)]
pub struct BrandRevision {
    pub meta: RevisionMeta,
    pub brand_id: Option<i64>,
    pub base: PublisherBaseFields,
    /// Staged group membership (the one multi-value field of the family).
    pub group_ids: Vec<i64>,
}

impl BrandRevision {
    fn require_source(&self) -> anyhow::Result<i64> {
        self.brand_id.ok_or_else(|| {
            RevisionError::DataIntegrity("brand revision without a source".to_string()).into()
        })
    }

    pub fn new_added(changeset: &Changeset, base: PublisherBaseFields, group_ids: Vec<i64>) -> Self {
        BrandRevision {
            meta: RevisionMeta::new(changeset.id),
            brand_id: None,
            base,
            group_ids,
        }
    }

    pub fn clone_from(
        display: &DisplayStore,
        oi: &IndexingStore,
        brand: &Brand,
        changeset: &Changeset,
    ) -> Result<Self> {
        oi.acquire_lock(EntityKind::Brand, brand.id, Some(changeset.id))?;
        let previous = oi.latest_approved_revision("oi_brand_revisions", "brand_id", brand.id)?;

        let mut revision = BrandRevision {
            meta: RevisionMeta::new(changeset.id),
            brand_id: Some(brand.id),
            base: PublisherBaseFields {
                name: brand.name.clone(),
                year_began: brand.year_began,
                year_ended: brand.year_ended,
                year_began_uncertain: brand.year_began_uncertain,
                year_ended_uncertain: brand.year_ended_uncertain,
                url: brand.url.clone(),
                notes: brand.notes.clone(),
                keywords: display.get_keywords(EntityKind::Brand, brand.id)?,
            },
            group_ids: Vec::new(),
        };
        revision.meta.previous_revision = Some(previous);
        revision.persist(oi)?;
        // Multi-value population happens after the row exists.
        revision.group_ids = display.brand_groups_of(brand.id)?;
        revision.persist_groups(oi)?;
        Ok(revision)
    }

    pub fn persist(&mut self, oi: &IndexingStore) -> Result<()> {
        let conn = oi.conn().lock().unwrap();
        if self.meta.id == 0 {
            conn.execute(
                "INSERT INTO oi_brand_revisions (changeset_id, deleted, committed,
                    previous_revision, brand_id, name, year_began, year_ended,
                    year_began_uncertain, year_ended_uncertain, url, notes, keywords)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    self.meta.changeset_id,
                    self.meta.deleted,
                    self.meta.committed,
                    self.meta.previous_revision,
                    self.brand_id,
                    self.base.name,
                    self.base.year_began,
                    self.base.year_ended,
                    self.base.year_began_uncertain,
                    self.base.year_ended_uncertain,
                    self.base.url,
                    self.base.notes,
                    self.base.keywords,
                ],
            )?;
            self.meta.id = conn.last_insert_rowid();
        } else {
            conn.execute(
                "UPDATE oi_brand_revisions SET changeset_id = ?2, deleted = ?3, committed = ?4,
                    previous_revision = ?5, brand_id = ?6, name = ?7, year_began = ?8,
                    year_ended = ?9, year_began_uncertain = ?10, year_ended_uncertain = ?11,
                    url = ?12, notes = ?13, keywords = ?14
                 WHERE id = ?1",
                params![
                    self.meta.id,
                    self.meta.changeset_id,
                    self.meta.deleted,
                    self.meta.committed,
                    self.meta.previous_revision,
                    self.brand_id,
                    self.base.name,
                    self.base.year_began,
                    self.base.year_ended,
                    self.base.year_began_uncertain,
                    self.base.year_ended_uncertain,
                    self.base.url,
                    self.base.notes,
                    self.base.keywords,
                ],
            )?;
        }
        Ok(())
    }

    /// Persist the staged group membership.
    pub fn persist_groups(&self, oi: &IndexingStore) -> Result<()> {
        let conn = oi.conn().lock().unwrap();
        conn.execute(
            "DELETE FROM oi_brand_revision_groups WHERE revision_id = ?1",
            params![self.meta.id],
        )?;
        for group_id in &self.group_ids {
            conn.execute(
                "INSERT INTO oi_brand_revision_groups (revision_id, group_id) VALUES (?1, ?2)",
                params![self.meta.id, group_id],
            )?;
        }
        Ok(())
    }

    pub fn load(oi: &IndexingStore, id: i64) -> Result<Self> {
        let conn = oi.conn().lock().unwrap();
        let mut stmt = conn.prepare_cached("SELECT * FROM oi_brand_revisions WHERE id = ?1")?;
        let mut revision = stmt
            .query_row(params![id], |row| {
                Ok(BrandRevision {
                    meta: RevisionMeta {
                        id: row.get("id")?,
                        changeset_id: row.get("changeset_id")?,
                        deleted: row.get("deleted")?,
                        committed: row.get("committed")?,
                        previous_revision: row.get("previous_revision")?,
                        created: row.get("created")?,
                    },
                    brand_id: row.get("brand_id")?,
                    base: PublisherBaseFields {
                        name: row.get("name")?,
                        year_began: row.get("year_began")?,
                        year_ended: row.get("year_ended")?,
                        year_began_uncertain: row.get("year_began_uncertain")?,
                        year_ended_uncertain: row.get("year_ended_uncertain")?,
                        url: row.get("url")?,
                        notes: row.get("notes")?,
                        keywords: row.get("keywords")?,
                    },
                    group_ids: Vec::new(),
                })
            })
            .optional()?
            .ok_or(RevisionError::NotFound { what: "brand revision", id })?;

        let mut stmt = conn.prepare_cached(
            "SELECT group_id FROM oi_brand_revision_groups WHERE revision_id = ?1
             ORDER BY group_id",
        )?;
        revision.group_ids = stmt
            .query_map(params![id], |r| r.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(revision)
    }

    pub fn open_ids(oi: &IndexingStore, changeset_id: i64) -> Result<Vec<i64>> {
        open_revision_ids(oi, "oi_brand_revisions", changeset_id, "id ASC")
    }
}

impl RevisionCommit for BrandRevision {
    fn source_name(&self) -> &'static str {
        "brand"
    }

    fn meta(&self) -> &RevisionMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RevisionMeta {
        &mut self.meta
    }

    fn source_id(&self) -> Option<i64> {
        self.brand_id
    }

    fn parent_field_tuples(&self) -> &'static [&'static [&'static str]] {
        &[&["group"]]
    }

    fn parent_kind(&self, _path: &[&str]) -> EntityKind {
        EntityKind::BrandGroup
    }

    fn resolve_path(&self, ctx: &CommitContext, side: Side, path: &[&str]) -> Result<FieldValue> {
        match (path, side) {
            (["group"], Side::New) => Ok(FieldValue::RefSet(
                self.group_ids.iter().copied().collect::<BTreeSet<_>>(),
            )),
            (["group"], Side::Old) => {
                let id = self.require_source()?;
                Ok(FieldValue::RefSet(
                    ctx.display
                        .brand_groups_of(id)?
                        .into_iter()
                        .collect::<BTreeSet<_>>(),
                ))
            }
            _ => Ok(FieldValue::Absent),
        }
    }

    fn entity_counts(&self, _ctx: &CommitContext, _side: Side) -> Result<CountMap> {
        Ok(CountMap::of(STAT_BRANDS, 1))
    }

    fn stats_bucket(&self, _changes: &Changes, _side: Side) -> Option<StatsBucket> {
        // Brands count globally with no categorical key.
        Some(StatsBucket::uncategorized())
    }

    fn delete_display_object(&mut self, ctx: &CommitContext) -> Result<()> {
        let id = self.require_source()?;
        ctx.display.set_keywords(EntityKind::Brand, id, "")?;
        ctx.display.delete_brand(id)
    }

    fn write_display_object(&mut self, ctx: &CommitContext, changes: &Changes) -> Result<()> {
        let mut brand = match self.brand_id {
            Some(id) => ctx
                .display
                .get_brand(id)?
                .ok_or(RevisionError::NotFound { what: "brand", id })?,
            None => Brand::default(),
        };

        brand.name = self.base.name.clone();
        brand.year_began = self.base.year_began;
        brand.year_ended = self.base.year_ended;
        brand.year_began_uncertain = self.base.year_began_uncertain;
        brand.year_ended_uncertain = self.base.year_ended_uncertain;
        brand.url = self.base.url.clone();
        brand.notes = self.base.notes.clone();
        if ctx.clear_reservation {
            brand.reserved = false;
        }

        // Group membership changes move the brand's cached issue count
        // between the affected groups.
        if changes.is_changed("group") && self.brand_id.is_some() {
            let old_groups: BTreeSet<i64> = changes.old("group").ref_ids().into_iter().collect();
            let new_groups: BTreeSet<i64> = changes.new("group").ref_ids().into_iter().collect();
            for group_id in old_groups.difference(&new_groups) {
                ctx.display.adjust_cached_count(
                    EntityKind::BrandGroup,
                    *group_id,
                    "issues",
                    -brand.issue_count,
                )?;
            }
            for group_id in new_groups.difference(&old_groups) {
                ctx.display.adjust_cached_count(
                    EntityKind::BrandGroup,
                    *group_id,
                    "issues",
                    brand.issue_count,
                )?;
            }
        }

        ctx.display.save_brand(&mut brand)?;
        if self.brand_id.is_none() {
            self.brand_id = Some(brand.id);
            self.persist(ctx.oi)?;
        }
        transfer_keywords(ctx, EntityKind::Brand, brand.id, &mut self.base.keywords)?;
        ctx.display.set_brand_groups(brand.id, &self.group_ids)?;
        Ok(())
    }

    fn post_adjust_stats(&mut self, ctx: &CommitContext, _changes: &Changes) -> Result<()> {
        if self.meta.previous_revision.is_some() || self.meta.deleted {
            return Ok(());
        }
        if self.group_ids.len() != 1 {
            return Err(RevisionError::DataIntegrity(format!(
                "a new brand must belong to exactly one group, got {}",
                self.group_ids.len()
            ))
            .into());
        }
        let group_id = self.group_ids[0];
        let group = ctx
            .display
            .get_brand_group(group_id)?
            .ok_or(RevisionError::NotFound { what: "brand group", id: group_id })?;

        let mut brand_use = BrandUseRevision::new_added(
            ctx.changeset,
            self.require_source()?,
            group.parent,
        );
        brand_use.year_began = self.base.year_began;
        brand_use.year_ended = self.base.year_ended;
        brand_use.year_began_uncertain = self.base.year_began_uncertain;
        brand_use.year_ended_uncertain = self.base.year_ended_uncertain;
        brand_use.persist(ctx.oi)?;
        commit_revision(&mut brand_use, ctx)?;
        Ok(())
    }

    fn save(&mut self, ctx: &CommitContext) -> Result<()> {
        self.persist(ctx.oi)?;
        self.persist_groups(ctx.oi)
    }
}

// =============================================================================
// BrandUseRevision
// =============================================================================

#[derive(Clone, Debug)]
pub struct BrandUseRevision {
    pub meta: RevisionMeta,
    pub brand_use_id: Option<i64>,
    pub emblem: Option<i64>,
    pub publisher: Option<i64>,
    pub year_began: Option<i64>,
    pub year_ended: Option<i64>,
    pub year_began_uncertain: bool,
    pub year_ended_uncertain: bool,
    pub notes: String,
}

impl BrandUseRevision {
    fn require_source(&self) -> anyhow::Result<i64> {
        self.brand_use_id.ok_or_else(|| {
            RevisionError::DataIntegrity("brand use revision without a source".to_string())
                .into()
        })
    }

    pub fn new_added(changeset: &Changeset, emblem: i64, publisher: i64) -> Self {
        BrandUseRevision {
            meta: RevisionMeta::new(changeset.id),
            brand_use_id: None,
            emblem: Some(emblem),
            publisher: Some(publisher),
            year_began: None,
            year_ended: None,
            year_began_uncertain: false,
            year_ended_uncertain: false,
            notes: String::new(),
        }
    }

    pub fn clone_from(
        oi: &IndexingStore,
        brand_use: &BrandUse,
        changeset: &Changeset,
    ) -> Result<Self> {
        oi.acquire_lock(EntityKind::BrandUse, brand_use.id, Some(changeset.id))?;
        let previous =
            oi.latest_approved_revision("oi_brand_use_revisions", "brand_use_id", brand_use.id)?;

        let mut revision = BrandUseRevision {
            meta: RevisionMeta::new(changeset.id),
            brand_use_id: Some(brand_use.id),
            emblem: Some(brand_use.emblem),
            publisher: Some(brand_use.publisher),
            year_began: brand_use.year_began,
            year_ended: brand_use.year_ended,
            year_began_uncertain: brand_use.year_began_uncertain,
            year_ended_uncertain: brand_use.year_ended_uncertain,
            notes: brand_use.notes.clone(),
        };
        revision.meta.previous_revision = Some(previous);
        revision.persist(oi)?;
        Ok(revision)
    }

    pub fn persist(&mut self, oi: &IndexingStore) -> Result<()> {
        let conn = oi.conn().lock().unwrap();
        if self.meta.id == 0 {
            conn.execute(
                "INSERT INTO oi_brand_use_revisions (changeset_id, deleted, committed,
                    previous_revision, brand_use_id, emblem, publisher, year_began,
                    year_ended, year_began_uncertain, year_ended_uncertain, notes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    self.meta.changeset_id,
                    self.meta.deleted,
                    self.meta.committed,
                    self.meta.previous_revision,
                    self.brand_use_id,
                    self.emblem,
                    self.publisher,
                    self.year_began,
                    self.year_ended,
                    self.year_began_uncertain,
                    self.year_ended_uncertain,
                    self.notes,
                ],
            )?;
            self.meta.id = conn.last_insert_rowid();
        } else {
            conn.execute(
                "UPDATE oi_brand_use_revisions SET changeset_id = ?2, deleted = ?3,
                    committed = ?4, previous_revision = ?5, brand_use_id = ?6, emblem = ?7,
                    publisher = ?8, year_began = ?9, year_ended = ?10,
                    year_began_uncertain = ?11, year_ended_uncertain = ?12, notes = ?13
                 WHERE id = ?1",
                params![
                    self.meta.id,
                    self.meta.changeset_id,
                    self.meta.deleted,
                    self.meta.committed,
                    self.meta.previous_revision,
                    self.brand_use_id,
                    self.emblem,
                    self.publisher,
                    self.year_began,
                    self.year_ended,
                    self.year_began_uncertain,
                    self.year_ended_uncertain,
                    self.notes,
                ],
            )?;
        }
        Ok(())
    }

    pub fn load(oi: &IndexingStore, id: i64) -> Result<Self> {
        let conn = oi.conn().lock().unwrap();
        let mut stmt =
            conn.prepare_cached("SELECT * FROM oi_brand_use_revisions WHERE id = ?1")?;
        stmt.query_row(params![id], |row| {
            Ok(BrandUseRevision {
                meta: RevisionMeta {
                    id: row.get("id")?,
                    changeset_id: row.get("changeset_id")?,
                    deleted: row.get("deleted")?,
                    committed: row.get("committed")?,
                    previous_revision: row.get("previous_revision")?,
                    created: row.get("created")?,
                },
                brand_use_id: row.get("brand_use_id")?,
                emblem: row.get("emblem")?,
                publisher: row.get("publisher")?,
                year_began: row.get("year_began")?,
                year_ended: row.get("year_ended")?,
                year_began_uncertain: row.get("year_began_uncertain")?,
                year_ended_uncertain: row.get("year_ended_uncertain")?,
                notes: row.get("notes")?,
            })
        })
        .optional()?
        .ok_or_else(|| RevisionError::NotFound { what: "brand use revision", id }.into())
    }

    pub fn open_ids(oi: &IndexingStore, changeset_id: i64) -> Result<Vec<i64>> {
        open_revision_ids(oi, "oi_brand_use_revisions", changeset_id, "id ASC")
    }
}

impl RevisionCommit for BrandUseRevision {
    fn source_name(&self) -> &'static str {
        "brand_use"
    }

    fn meta(&self) -> &RevisionMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RevisionMeta {
        &mut self.meta
    }

    fn source_id(&self) -> Option<i64> {
        self.brand_use_id
    }

    fn delete_display_object(&mut self, ctx: &CommitContext) -> Result<()> {
        let id = self.require_source()?;
        // Every revision of the deleted row, this one included, loses the
        // dangling reference; the history rows themselves stay.
        let conn = ctx.oi.conn().lock().unwrap();
        conn.execute(
            "UPDATE oi_brand_use_revisions SET brand_use_id = NULL
             WHERE brand_use_id = ?1",
            params![id],
        )?;
        drop(conn);
        self.brand_use_id = None;
        ctx.display.delete_brand_use(id)
    }

    fn write_display_object(&mut self, ctx: &CommitContext, _changes: &Changes) -> Result<()> {
        let mut brand_use = match self.brand_use_id {
            Some(id) => ctx
                .display
                .get_brand_use(id)?
                .ok_or(RevisionError::NotFound { what: "brand use", id })?,
            None => BrandUse {
                emblem: self.emblem.ok_or_else(|| {
                    RevisionError::DataIntegrity("brand use without an emblem".to_string())
                })?,
                ..Default::default()
            },
        };

        brand_use.publisher = self.publisher.ok_or_else(|| {
            RevisionError::DataIntegrity("brand use without a publisher".to_string())
        })?;
        brand_use.year_began = self.year_began;
        brand_use.year_ended = self.year_ended;
        brand_use.year_began_uncertain = self.year_began_uncertain;
        brand_use.year_ended_uncertain = self.year_ended_uncertain;
        brand_use.notes = self.notes.clone();
        if ctx.clear_reservation {
            brand_use.reserved = false;
        }
        ctx.display.save_brand_use(&mut brand_use)?;

        if self.brand_use_id.is_none() {
            self.brand_use_id = Some(brand_use.id);
            self.persist(ctx.oi)?;
        }
        Ok(())
    }

    fn save(&mut self, ctx: &CommitContext) -> Result<()> {
        self.persist(ctx.oi)
    }
}

// =============================================================================
// Shared helpers
// =============================================================================

/// Open revision ids of one table for a changeset, in the given order.
pub(crate) fn open_revision_ids(
    oi: &IndexingStore,
    table: &str,
    changeset_id: i64,
    order: &str,
) -> Result<Vec<i64>> {
    let conn = oi.conn().lock().unwrap();
    let mut stmt = conn.prepare(&format!(
        "SELECT id FROM {} WHERE changeset_id = ?1 AND committed IS NULL ORDER BY {}",
        table, order
    ))?;
    let ids = stmt
        .query_map(params![changeset_id], |r| r.get(0))?
        .collect::<Result<Vec<i64>, _>>()?;
    Ok(ids)
}

/// Transfer the keywords join field: write the revision's delimited string
/// to the display side and sync the canonical form back onto the revision.
pub(crate) fn transfer_keywords(
    ctx: &CommitContext,
    kind: EntityKind,
    entity_id: i64,
    keywords: &mut String,
) -> Result<()> {
    let canonical = ctx.display.set_keywords(kind, entity_id, keywords)?;
    *keywords = canonical;
    Ok(())
}
