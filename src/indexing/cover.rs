//! CoverRevision: cover scans, the series gallery flag, and the restricted
//! cover-move support for variant-add and two-issue changesets.

use super::changeset::{Changeset, IndexingStore};
use super::issue::IssueRevision;
use super::publisher::open_revision_ids;
use super::revision::{
    commit_revision, Changes, CommitContext, FieldValue, RevisionCommit, RevisionError,
    RevisionMeta, Side,
};
use super::state::ChangeType;
use super::stats::{CountMap, StatsBucket, STAT_COVERS};
use crate::display::{Cover, EntityKind, Issue};
use anyhow::Result;
use rusqlite::{params, OptionalExtension};

#[derive(Clone, Debug)]
pub struct CoverRevision {
    pub meta: RevisionMeta,
    pub cover_id: Option<i64>,
    /// None only while the cover is staged for an issue that is itself an
    /// uncommitted add in the same changeset.
    pub issue: Option<i64>,
    pub marked: bool,
    pub is_replacement: bool,
    pub is_wraparound: bool,
    pub front_left: i64,
    pub front_right: i64,
    pub front_top: i64,
    pub front_bottom: i64,
    pub file_source: String,
}

impl CoverRevision {
    pub fn new_added(changeset: &Changeset, issue: Option<i64>, file_source: &str) -> Self {
        CoverRevision {
            meta: RevisionMeta::new(changeset.id),
            cover_id: None,
            issue,
            marked: false,
            is_replacement: false,
            is_wraparound: false,
            front_left: 0,
            front_right: 0,
            front_top: 0,
            front_bottom: 0,
            file_source: file_source.to_string(),
        }
    }

    pub fn clone_from(
        oi: &IndexingStore,
        cover: &Cover,
        changeset: &Changeset,
    ) -> Result<Self> {
        oi.acquire_lock(EntityKind::Cover, cover.id, Some(changeset.id))?;
        let previous = oi.latest_approved_revision("oi_cover_revisions", "cover_id", cover.id)?;

        let mut revision = CoverRevision {
            meta: RevisionMeta::new(changeset.id),
            cover_id: Some(cover.id),
            issue: Some(cover.issue),
            marked: cover.marked,
            is_replacement: false,
            is_wraparound: cover.is_wraparound,
            front_left: cover.front_left,
            front_right: cover.front_right,
            front_top: cover.front_top,
            front_bottom: cover.front_bottom,
            file_source: cover.file_source.clone(),
        };
        revision.meta.previous_revision = Some(previous);
        revision.persist(oi)?;
        Ok(revision)
    }

    pub fn persist(&mut self, oi: &IndexingStore) -> Result<()> {
        let conn = oi.conn().lock().unwrap();
        if self.meta.id == 0 {
            conn.execute(
                "INSERT INTO oi_cover_revisions (changeset_id, deleted, committed,
                    previous_revision, cover_id, issue_id, marked, is_replacement,
                    is_wraparound, front_left, front_right, front_top, front_bottom,
                    file_source)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    self.meta.changeset_id,
                    self.meta.deleted,
                    self.meta.committed,
                    self.meta.previous_revision,
                    self.cover_id,
                    self.issue,
                    self.marked,
                    self.is_replacement,
                    self.is_wraparound,
                    self.front_left,
                    self.front_right,
                    self.front_top,
                    self.front_bottom,
                    self.file_source,
                ],
            )?;
            self.meta.id = conn.last_insert_rowid();
        } else {
            conn.execute(
                "UPDATE oi_cover_revisions SET changeset_id = ?2, deleted = ?3,
                    committed = ?4, previous_revision = ?5, cover_id = ?6, issue_id = ?7,
                    marked = ?8, is_replacement = ?9, is_wraparound = ?10, front_left = ?11,
                    front_right = ?12, front_top = ?13, front_bottom = ?14, file_source = ?15
                 WHERE id = ?1",
                params![
                    self.meta.id,
                    self.meta.changeset_id,
                    self.meta.deleted,
                    self.meta.committed,
                    self.meta.previous_revision,
                    self.cover_id,
                    self.issue,
                    self.marked,
                    self.is_replacement,
                    self.is_wraparound,
                    self.front_left,
                    self.front_right,
                    self.front_top,
                    self.front_bottom,
                    self.file_source,
                ],
            )?;
        }
        Ok(())
    }

    pub fn load(oi: &IndexingStore, id: i64) -> Result<Self> {
        let conn = oi.conn().lock().unwrap();
        let mut stmt = conn.prepare_cached("SELECT * FROM oi_cover_revisions WHERE id = ?1")?;
        stmt.query_row(params![id], |row| {
            Ok(CoverRevision {
                meta: RevisionMeta {
                    id: row.get("id")?,
                    changeset_id: row.get("changeset_id")?,
                    deleted: row.get("deleted")?,
                    committed: row.get("committed")?,
                    previous_revision: row.get("previous_revision")?,
                    created: row.get("created")?,
                },
                cover_id: row.get("cover_id")?,
                issue: row.get("issue_id")?,
                marked: row.get("marked")?,
                is_replacement: row.get("is_replacement")?,
                is_wraparound: row.get("is_wraparound")?,
                front_left: row.get("front_left")?,
                front_right: row.get("front_right")?,
                front_top: row.get("front_top")?,
                front_bottom: row.get("front_bottom")?,
                file_source: row.get("file_source")?,
            })
        })
        .optional()?
        .ok_or_else(|| RevisionError::NotFound { what: "cover revision", id }.into())
    }

    pub fn open_ids(oi: &IndexingStore, changeset_id: i64) -> Result<Vec<i64>> {
        open_revision_ids(oi, "oi_cover_revisions", changeset_id, "id ASC")
    }

    fn old_cover(&self, ctx: &CommitContext) -> Result<Cover> {
        let id = self.cover_id.ok_or_else(|| {
            RevisionError::DataIntegrity("cover revision without a source".to_string())
        })?;
        ctx.display
            .get_cover(id)?
            .ok_or_else(|| RevisionError::NotFound { what: "cover", id }.into())
    }

    fn issue_bucket(&self, ctx: &CommitContext, issue_id: i64) -> Result<(Issue, StatsBucket)> {
        let issue = ctx
            .display
            .get_issue(issue_id)?
            .ok_or(RevisionError::NotFound { what: "issue", id: issue_id })?;
        let series = ctx
            .display
            .get_series(issue.series)?
            .ok_or(RevisionError::NotFound { what: "series", id: issue.series })?;
        Ok((
            issue,
            StatsBucket::country_language(&series.country, &series.language),
        ))
    }

    /// Ids of open issue revisions in this changeset, used for binding an
    /// added cover and for the move targets.
    fn changeset_issue_revision_ids(&self, ctx: &CommitContext) -> Result<Vec<i64>> {
        let conn = ctx.oi.conn().lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT id FROM oi_issue_revisions WHERE changeset_id = ?1
             ORDER BY COALESCE(revision_sort_code, id) ASC",
        )?;
        let ids = stmt
            .query_map(params![self.meta.changeset_id], |r| r.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    /// The issue of the single issue revision in this changeset that does
    /// NOT govern `current_issue`; the target of a cover move.
    fn move_target_issue(&self, ctx: &CommitContext, current_issue: i64) -> Result<i64> {
        let mut candidates = Vec::new();
        for id in self.changeset_issue_revision_ids(ctx)? {
            let revision = IssueRevision::load(ctx.oi, id)?;
            if revision.issue_id != Some(current_issue) {
                if let Some(issue_id) = revision.issue_id {
                    candidates.push(issue_id);
                }
            }
        }
        candidates.dedup();
        match candidates.as_slice() {
            [target] => Ok(*target),
            _ => Err(RevisionError::DataIntegrity(format!(
                "{} issue revisions dispute the cover move",
                candidates.len()
            ))
            .into()),
        }
    }

    fn set_gallery_flag(&self, ctx: &CommitContext, series_id: i64) -> Result<()> {
        let mut series = match ctx.display.get_series(series_id)? {
            Some(series) => series,
            None => return Ok(()),
        };
        let has_scans = ctx.display.scan_count(series_id)? > 0;
        if series.has_gallery != has_scans {
            series.has_gallery = has_scans;
            ctx.display.save_series(&mut series)?;
        }
        Ok(())
    }
}

impl RevisionCommit for CoverRevision {
    fn source_name(&self) -> &'static str {
        "cover"
    }

    fn meta(&self) -> &RevisionMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RevisionMeta {
        &mut self.meta
    }

    fn source_id(&self) -> Option<i64> {
        self.cover_id
    }

    fn stats_category_tuples(&self) -> &'static [&'static [&'static str]] {
        &[&["issue", "series", "country"], &["issue", "series", "language"]]
    }

    fn resolve_path(&self, ctx: &CommitContext, side: Side, path: &[&str]) -> Result<FieldValue> {
        let issue_id = match side {
            Side::New => match self.issue {
                Some(id) => id,
                None => return Ok(FieldValue::Absent),
            },
            Side::Old => self.old_cover(ctx)?.issue,
        };
        let (_, bucket) = self.issue_bucket(ctx, issue_id)?;
        match path {
            ["issue", "series", "country"] => Ok(match bucket.country {
                Some(country) => FieldValue::Text(country),
                None => FieldValue::Null,
            }),
            ["issue", "series", "language"] => Ok(match bucket.language {
                Some(language) => FieldValue::Text(language),
                None => FieldValue::Null,
            }),
            _ => Ok(FieldValue::Absent),
        }
    }

    fn entity_counts(&self, _ctx: &CommitContext, _side: Side) -> Result<CountMap> {
        Ok(CountMap::of(STAT_COVERS, 1))
    }

    fn delete_display_object(&mut self, ctx: &CommitContext) -> Result<()> {
        let cover = self.old_cover(ctx)?;
        ctx.display.delete_cover(cover.id)?;
        let issue = ctx
            .display
            .get_issue(cover.issue)?
            .ok_or(RevisionError::NotFound { what: "issue", id: cover.issue })?;
        self.set_gallery_flag(ctx, issue.series)
    }

    fn write_display_object(&mut self, ctx: &CommitContext, _changes: &Changes) -> Result<()> {
        if self.cover_id.is_none() {
            // A fresh cover. If the changeset also adds or rearranges
            // issues, bind to the single issue revision's committed issue.
            // When the issue was unknown at classification time the global
            // count is applied here, since the generic pass saw no bucket.
            let was_unbound = self.issue.is_none();
            let issue_revision_ids = self.changeset_issue_revision_ids(ctx)?;
            let issue_id = if issue_revision_ids.is_empty() {
                self.issue.ok_or_else(|| {
                    RevisionError::DataIntegrity("cover revision without an issue".to_string())
                })?
            } else if issue_revision_ids.len() == 1 {
                let mut issue_revision = IssueRevision::load(ctx.oi, issue_revision_ids[0])?;
                if issue_revision.meta.open() {
                    commit_revision(&mut issue_revision, ctx)?;
                    issue_revision = IssueRevision::load(ctx.oi, issue_revision_ids[0])?;
                }
                issue_revision.issue_id.ok_or_else(|| {
                    RevisionError::DataIntegrity(
                        "issue revision did not produce an issue".to_string(),
                    )
                })?
            } else {
                return Err(RevisionError::DataIntegrity(format!(
                    "{} issue revisions for a single cover add",
                    issue_revision_ids.len()
                ))
                .into());
            };
            self.issue = Some(issue_id);

            let last_upload: Option<i64> = {
                let conn = ctx.oi.conn().lock().unwrap();
                conn.query_row(
                    "SELECT MAX(created) FROM oi_changeset_comments WHERE changeset_id = ?1",
                    params![self.meta.changeset_id],
                    |r| r.get(0),
                )
                .optional()?
                .flatten()
            };

            let mut cover = Cover {
                issue: issue_id,
                marked: self.marked,
                is_wraparound: self.is_wraparound,
                front_left: self.front_left,
                front_right: self.front_right,
                front_top: self.front_top,
                front_bottom: self.front_bottom,
                last_upload,
                file_source: self.file_source.clone(),
                ..Default::default()
            };
            if !ctx.clear_reservation {
                cover.reserved = true;
            }
            ctx.display.save_cover(&mut cover)?;
            self.cover_id = Some(cover.id);
            self.persist(ctx.oi)?;

            let (issue, bucket) = self.issue_bucket(ctx, issue_id)?;
            if was_unbound {
                ctx.stats.apply(&bucket, &CountMap::of(STAT_COVERS, 1), 1)?;
            }
            self.set_gallery_flag(ctx, issue.series)?;
            return Ok(());
        }

        let mut cover = self.old_cover(ctx)?;
        if !self.is_replacement && matches!(
            ctx.changeset.change_type,
            ChangeType::VariantAdd | ChangeType::TwoIssueMove
        ) {
            // A move between the two issues of this changeset. The counts
            // follow the cover when the statistics bucket differs.
            let old_issue_id = cover.issue;
            let target_issue_id = self.move_target_issue(ctx, old_issue_id)?;
            let (old_issue, old_bucket) = self.issue_bucket(ctx, old_issue_id)?;
            let (new_issue, new_bucket) = self.issue_bucket(ctx, target_issue_id)?;

            cover.issue = target_issue_id;
            self.issue = Some(target_issue_id);
            if old_bucket != new_bucket {
                let counts = CountMap::of(STAT_COVERS, 1);
                ctx.stats.apply(&old_bucket, &counts, -1)?;
                ctx.stats.apply(&new_bucket, &counts, 1)?;
            }
            if ctx.clear_reservation {
                cover.reserved = false;
            }
            ctx.display.save_cover(&mut cover)?;
            self.persist(ctx.oi)?;

            self.set_gallery_flag(ctx, old_issue.series)?;
            self.set_gallery_flag(ctx, new_issue.series)?;
            return Ok(());
        }

        // Replacement or plain metadata edit.
        cover.marked = self.marked;
        cover.is_wraparound = self.is_wraparound;
        cover.front_left = self.front_left;
        cover.front_right = self.front_right;
        cover.front_top = self.front_top;
        cover.front_bottom = self.front_bottom;
        if self.is_replacement {
            cover.file_source = self.file_source.clone();
        }
        if ctx.clear_reservation {
            cover.reserved = false;
        }
        ctx.display.save_cover(&mut cover)?;
        Ok(())
    }

    fn save(&mut self, ctx: &CommitContext) -> Result<()> {
        self.persist(ctx.oi)
    }
}
