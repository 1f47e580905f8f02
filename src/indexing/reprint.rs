//! ReprintRevision: one revision type over the four reprint link shapes.
//!
//! A link may change shape across an edit (say, a story-to-story link
//! redirected at a whole issue); the old concrete row can only represent
//! one shape, so it is detached from every revision that references it and
//! deleted before the row of the new shape is written.

use super::changeset::{Changeset, IndexingStore};
use super::publisher::open_revision_ids;
use super::revision::{Changes, CommitContext, RevisionCommit, RevisionError, RevisionMeta};
use super::story::StoryRevision;
use crate::display::{EntityKind, ReprintKind, ReprintLink};
use anyhow::Result;
use rusqlite::{params, OptionalExtension};

#[derive(Clone, Debug)]
pub struct ReprintRevision {
    pub meta: RevisionMeta,
    /// The concrete link row, while one exists.
    pub link_id: Option<i64>,
    /// Shape of the link as it existed before this edit.
    pub in_kind: Option<ReprintKind>,
    /// Shape the commit resolved to.
    pub out_kind: Option<ReprintKind>,
    pub origin_story: Option<i64>,
    /// A same-changeset story revision standing in for the origin story.
    pub origin_revision: Option<i64>,
    pub origin_issue: Option<i64>,
    pub target_story: Option<i64>,
    pub target_revision: Option<i64>,
    pub target_issue: Option<i64>,
    pub notes: String,
}

impl ReprintRevision {
    pub fn new_added(changeset: &Changeset) -> Self {
        ReprintRevision {
            meta: RevisionMeta::new(changeset.id),
            link_id: None,
            in_kind: None,
            out_kind: None,
            origin_story: None,
            origin_revision: None,
            origin_issue: None,
            target_story: None,
            target_revision: None,
            target_issue: None,
            notes: String::new(),
        }
    }

    pub fn clone_from(
        oi: &IndexingStore,
        link: &ReprintLink,
        changeset: &Changeset,
    ) -> Result<Self> {
        oi.acquire_lock(EntityKind::ReprintLink, link.id, Some(changeset.id))?;
        let previous = oi.latest_approved_revision("oi_reprint_revisions", "link_id", link.id)?;

        let mut revision = ReprintRevision::new_added(changeset);
        revision.link_id = Some(link.id);
        revision.in_kind = Some(link.kind);
        revision.notes = link.notes.clone();
        match link.kind {
            ReprintKind::StoryToStory => {
                revision.origin_story = Some(link.origin);
                revision.target_story = Some(link.target);
            }
            ReprintKind::IssueToStory => {
                revision.origin_issue = Some(link.origin);
                revision.target_story = Some(link.target);
            }
            ReprintKind::StoryToIssue => {
                revision.origin_story = Some(link.origin);
                revision.target_issue = Some(link.target);
            }
            ReprintKind::IssueToIssue => {
                revision.origin_issue = Some(link.origin);
                revision.target_issue = Some(link.target);
            }
        }
        revision.meta.previous_revision = Some(previous);
        revision.persist(oi)?;
        Ok(revision)
    }

    pub fn persist(&mut self, oi: &IndexingStore) -> Result<()> {
        let conn = oi.conn().lock().unwrap();
        let in_kind = self.in_kind.map(ReprintKind::to_db_str);
        let out_kind = self.out_kind.map(ReprintKind::to_db_str);
        if self.meta.id == 0 {
            conn.execute(
                "INSERT INTO oi_reprint_revisions (changeset_id, deleted, committed,
                    previous_revision, link_id, in_kind, out_kind, origin_story,
                    origin_revision, origin_issue, target_story, target_revision,
                    target_issue, notes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    self.meta.changeset_id,
                    self.meta.deleted,
                    self.meta.committed,
                    self.meta.previous_revision,
                    self.link_id,
                    in_kind,
                    out_kind,
                    self.origin_story,
                    self.origin_revision,
                    self.origin_issue,
                    self.target_story,
                    self.target_revision,
                    self.target_issue,
                    self.notes,
                ],
            )?;
            self.meta.id = conn.last_insert_rowid();
        } else {
            conn.execute(
                "UPDATE oi_reprint_revisions SET changeset_id = ?2, deleted = ?3,
                    committed = ?4, previous_revision = ?5, link_id = ?6, in_kind = ?7,
                    out_kind = ?8, origin_story = ?9, origin_revision = ?10,
                    origin_issue = ?11, target_story = ?12, target_revision = ?13,
                    target_issue = ?14, notes = ?15
                 WHERE id = ?1",
                params![
                    self.meta.id,
                    self.meta.changeset_id,
                    self.meta.deleted,
                    self.meta.committed,
                    self.meta.previous_revision,
                    self.link_id,
                    in_kind,
                    out_kind,
                    self.origin_story,
                    self.origin_revision,
                    self.origin_issue,
                    self.target_story,
                    self.target_revision,
                    self.target_issue,
                    self.notes,
                ],
            )?;
        }
        Ok(())
    }

    pub fn load(oi: &IndexingStore, id: i64) -> Result<Self> {
        let conn = oi.conn().lock().unwrap();
        let mut stmt = conn.prepare_cached("SELECT * FROM oi_reprint_revisions WHERE id = ?1")?;
        stmt.query_row(params![id], |row| {
            Ok(ReprintRevision {
                meta: RevisionMeta {
                    id: row.get("id")?,
                    changeset_id: row.get("changeset_id")?,
                    deleted: row.get("deleted")?,
                    committed: row.get("committed")?,
                    previous_revision: row.get("previous_revision")?,
                    created: row.get("created")?,
                },
                link_id: row.get("link_id")?,
                in_kind: row
                    .get::<_, Option<String>>("in_kind")?
                    .as_deref()
                    .map(ReprintKind::from_db_str),
                out_kind: row
                    .get::<_, Option<String>>("out_kind")?
                    .as_deref()
                    .map(ReprintKind::from_db_str),
                origin_story: row.get("origin_story")?,
                origin_revision: row.get("origin_revision")?,
                origin_issue: row.get("origin_issue")?,
                target_story: row.get("target_story")?,
                target_revision: row.get("target_revision")?,
                target_issue: row.get("target_issue")?,
                notes: row.get("notes")?,
            })
        })
        .optional()?
        .ok_or_else(|| RevisionError::NotFound { what: "reprint revision", id }.into())
    }

    pub fn open_ids(oi: &IndexingStore, changeset_id: i64) -> Result<Vec<i64>> {
        open_revision_ids(oi, "oi_reprint_revisions", changeset_id, "id ASC")
    }

    /// The concrete link this revision stands for, or None once the link is
    /// fully gone (history display must still work then).
    pub fn source(&self, display: &crate::display::DisplayStore) -> Result<Option<ReprintLink>> {
        if self.meta.deleted && self.meta.committed == Some(true) {
            return Ok(None);
        }
        let kind = match self.out_kind.or(self.in_kind) {
            Some(kind) => kind,
            None => return Ok(None),
        };
        let id = match self.link_id {
            Some(id) => id,
            None => return Ok(None),
        };
        match display.get_reprint_link(id)? {
            Some(link) if link.kind == kind => Ok(Some(link)),
            _ => Ok(None),
        }
    }

    /// Resolve same-changeset story revisions into the stories they
    /// produced, then compute the shape of the link from which sides are
    /// stories.
    fn resolve_out_kind(&mut self, ctx: &CommitContext) -> Result<ReprintKind> {
        if let Some(revision_id) = self.origin_revision {
            let story_revision = StoryRevision::load(ctx.oi, revision_id)?;
            self.origin_story = Some(story_revision.story_id.ok_or_else(|| {
                RevisionError::DataIntegrity(
                    "origin story revision has no committed story".to_string(),
                )
            })?);
            self.origin_revision = None;
        }
        if let Some(revision_id) = self.target_revision {
            let story_revision = StoryRevision::load(ctx.oi, revision_id)?;
            self.target_story = Some(story_revision.story_id.ok_or_else(|| {
                RevisionError::DataIntegrity(
                    "target story revision has no committed story".to_string(),
                )
            })?);
            self.target_revision = None;
        }

        let kind = match (self.origin_story.is_some(), self.target_story.is_some()) {
            (true, true) => ReprintKind::StoryToStory,
            (true, false) => ReprintKind::StoryToIssue,
            (false, true) => ReprintKind::IssueToStory,
            (false, false) => ReprintKind::IssueToIssue,
        };

        // The issue side of each direction must actually be present.
        match kind {
            ReprintKind::StoryToIssue | ReprintKind::IssueToIssue
                if self.target_issue.is_none() =>
            {
                Err(RevisionError::DataIntegrity(
                    "reprint link has no resolvable target".to_string(),
                )
                .into())
            }
            ReprintKind::IssueToStory | ReprintKind::IssueToIssue
                if self.origin_issue.is_none() =>
            {
                Err(RevisionError::DataIntegrity(
                    "reprint link has no resolvable origin".to_string(),
                )
                .into())
            }
            _ => Ok(kind),
        }
    }

    /// Null out every revision's reference to a link row that is about to
    /// disappear, including this one's.
    fn detach_link(&mut self, ctx: &CommitContext, link_id: i64) -> Result<()> {
        {
            let conn = ctx.oi.conn().lock().unwrap();
            conn.execute(
                "UPDATE oi_reprint_revisions SET link_id = NULL WHERE link_id = ?1",
                params![link_id],
            )?;
        }
        if self.link_id == Some(link_id) {
            self.link_id = None;
        }
        ctx.display.delete_reprint_link(link_id)
    }
}

impl RevisionCommit for ReprintRevision {
    fn source_name(&self) -> &'static str {
        "reprint"
    }

    fn meta(&self) -> &RevisionMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RevisionMeta {
        &mut self.meta
    }

    fn source_id(&self) -> Option<i64> {
        self.link_id
    }

    fn delete_display_object(&mut self, ctx: &CommitContext) -> Result<()> {
        let link_id = self.link_id.ok_or_else(|| {
            RevisionError::DataIntegrity("reprint delete without a link".to_string())
        })?;
        // Every revision of the vanished link loses its reference, this one
        // included; history display falls back to "no source".
        self.detach_link(ctx, link_id)
    }

    fn write_display_object(&mut self, ctx: &CommitContext, _changes: &Changes) -> Result<()> {
        let out_kind = self.resolve_out_kind(ctx)?;

        // A shape change invalidates the old concrete row.
        if let (Some(in_kind), Some(link_id)) = (self.in_kind, self.link_id) {
            if in_kind != out_kind {
                self.detach_link(ctx, link_id)?;
            }
        }
        self.out_kind = Some(out_kind);

        let origin = match out_kind {
            ReprintKind::StoryToStory | ReprintKind::StoryToIssue => self.origin_story,
            _ => self.origin_issue,
        }
        .ok_or_else(|| {
            RevisionError::DataIntegrity("reprint link has no resolvable origin".to_string())
        })?;
        let target = match out_kind {
            ReprintKind::StoryToStory | ReprintKind::IssueToStory => self.target_story,
            _ => self.target_issue,
        }
        .ok_or_else(|| {
            RevisionError::DataIntegrity("reprint link has no resolvable target".to_string())
        })?;

        let mut link = match self.link_id {
            Some(id) => {
                let mut existing = ctx
                    .display
                    .get_reprint_link(id)?
                    .ok_or(RevisionError::NotFound { what: "reprint link", id })?;
                existing.kind = out_kind;
                existing
            }
            None => ReprintLink {
                id: 0,
                kind: out_kind,
                origin,
                target,
                notes: String::new(),
                reserved: false,
            },
        };
        link.origin = origin;
        link.target = target;
        link.notes = self.notes.clone();
        if ctx.clear_reservation {
            link.reserved = false;
        }
        ctx.display.save_reprint_link(&mut link)?;
        self.link_id = Some(link.id);
        self.persist(ctx.oi)?;
        Ok(())
    }

    fn save(&mut self, ctx: &CommitContext) -> Result<()> {
        self.persist(ctx.oi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_roundtrip() {
        for kind in [
            ReprintKind::StoryToStory,
            ReprintKind::IssueToStory,
            ReprintKind::StoryToIssue,
            ReprintKind::IssueToIssue,
        ] {
            assert_eq!(ReprintKind::from_db_str(kind.to_db_str()), kind);
        }
    }
}
