//! StoryRevision: story content plus the derived issue indexing status.
//!
//! Stories are what turn a skeleton issue into an indexed one; committing a
//! story revision re-derives the owning issue's status and keeps the global
//! "issue indexes" statistic in step when the series is a comics
//! publication.

use super::changeset::{Changeset, IndexingStore};
use super::publisher::{open_revision_ids, transfer_keywords};
use super::revision::{
    Changes, CommitContext, FieldValue, RevisionCommit, RevisionError, RevisionMeta, Side,
};
use super::stats::{CountMap, STAT_ISSUE_INDEXES, STAT_STORIES};
use crate::display::{DisplayStore, EntityKind, IndexedStatus, Issue, Story, StoryKind};
use anyhow::Result;
use rusqlite::{params, OptionalExtension};

/// Derive an issue's indexing status from its active stories.
fn derived_indexed_status(display: &DisplayStore, issue_id: i64) -> Result<IndexedStatus> {
    let stories = display.stories_of_issue(issue_id)?;
    if stories.is_empty() {
        return Ok(IndexedStatus::Skeleton);
    }
    let has_comic_story = stories.iter().any(|s| s.kind == StoryKind::ComicStory);
    if has_comic_story {
        Ok(IndexedStatus::Full)
    } else {
        Ok(IndexedStatus::Partial)
    }
}

/// Re-derive an issue's indexing status, adjusting the global statistic on
/// skeleton boundary crossings.
pub(crate) fn update_indexed_status(ctx: &CommitContext, issue_id: i64) -> Result<()> {
    let mut issue = match ctx.display.get_issue(issue_id)? {
        Some(issue) => issue,
        None => return Ok(()),
    };
    let new_status = derived_indexed_status(ctx.display, issue_id)?;
    if new_status == issue.is_indexed {
        return Ok(());
    }
    let old_status = issue.is_indexed;
    issue.is_indexed = new_status;
    ctx.display.save_issue(&mut issue)?;

    let series = match ctx.display.get_series(issue.series)? {
        Some(series) => series,
        None => return Ok(()),
    };
    if !series.is_comics_publication {
        return Ok(());
    }
    let delta = (new_status != IndexedStatus::Skeleton) as i64
        - (old_status != IndexedStatus::Skeleton) as i64;
    ctx.stats.update_count(
        STAT_ISSUE_INDEXES,
        delta,
        Some(&series.country),
        Some(&series.language),
    )
}

#[derive(Clone, Debug)]
pub struct StoryRevision {
    pub meta: RevisionMeta,
    pub story_id: Option<i64>,
    pub title: String,
    pub title_inferred: bool,
    pub feature: String,
    pub kind: StoryKind,
    pub sequence_number: i64,
    pub page_count: Option<f64>,
    pub page_count_uncertain: bool,
    pub script: String,
    pub pencils: String,
    pub inks: String,
    pub colors: String,
    pub letters: String,
    pub editing: String,
    pub no_script: bool,
    pub no_pencils: bool,
    pub no_inks: bool,
    pub no_colors: bool,
    pub no_letters: bool,
    pub no_editing: bool,
    pub job_number: String,
    pub genre: String,
    pub characters: String,
    pub synopsis: String,
    pub reprint_notes: String,
    pub notes: String,
    pub keywords: String,
    /// None while the owning issue is itself still an uncommitted add in
    /// the same changeset; bound when that issue commits.
    pub issue: Option<i64>,
}

impl StoryRevision {
    pub fn new_added(changeset: &Changeset, kind: StoryKind, sequence_number: i64) -> Self {
        StoryRevision {
            meta: RevisionMeta::new(changeset.id),
            story_id: None,
            title: String::new(),
            title_inferred: false,
            feature: String::new(),
            kind,
            sequence_number,
            page_count: None,
            page_count_uncertain: false,
            script: String::new(),
            pencils: String::new(),
            inks: String::new(),
            colors: String::new(),
            letters: String::new(),
            editing: String::new(),
            no_script: false,
            no_pencils: false,
            no_inks: false,
            no_colors: false,
            no_letters: false,
            no_editing: false,
            job_number: String::new(),
            genre: String::new(),
            characters: String::new(),
            synopsis: String::new(),
            reprint_notes: String::new(),
            notes: String::new(),
            keywords: String::new(),
            issue: None,
        }
    }

    pub fn clone_from(
        display: &DisplayStore,
        oi: &IndexingStore,
        story: &Story,
        changeset: &Changeset,
    ) -> Result<Self> {
        oi.acquire_lock(EntityKind::Story, story.id, Some(changeset.id))?;
        let previous = oi.latest_approved_revision("oi_story_revisions", "story_id", story.id)?;

        let mut revision = StoryRevision {
            meta: RevisionMeta::new(changeset.id),
            story_id: Some(story.id),
            title: story.title.clone(),
            title_inferred: story.title_inferred,
            feature: story.feature.clone(),
            kind: story.kind,
            sequence_number: story.sequence_number,
            page_count: story.page_count,
            page_count_uncertain: story.page_count_uncertain,
            script: story.script.clone(),
            pencils: story.pencils.clone(),
            inks: story.inks.clone(),
            colors: story.colors.clone(),
            letters: story.letters.clone(),
            editing: story.editing.clone(),
            no_script: story.no_script,
            no_pencils: story.no_pencils,
            no_inks: story.no_inks,
            no_colors: story.no_colors,
            no_letters: story.no_letters,
            no_editing: story.no_editing,
            job_number: story.job_number.clone(),
            genre: story.genre.clone(),
            characters: story.characters.clone(),
            synopsis: story.synopsis.clone(),
            reprint_notes: story.reprint_notes.clone(),
            notes: story.notes.clone(),
            keywords: display.get_keywords(EntityKind::Story, story.id)?,
            issue: Some(story.issue),
        };
        revision.meta.previous_revision = Some(previous);
        revision.persist(oi)?;
        Ok(revision)
    }

    pub fn persist(&mut self, oi: &IndexingStore) -> Result<()> {
        let conn = oi.conn().lock().unwrap();
        if self.meta.id == 0 {
            conn.execute(
                "INSERT INTO oi_story_revisions (changeset_id, deleted, committed,
                    previous_revision, story_id, title, title_inferred, feature, kind,
                    sequence_number, page_count, page_count_uncertain, script, pencils, inks,
                    colors, letters, editing, no_script, no_pencils, no_inks, no_colors,
                    no_letters, no_editing, job_number, genre, characters, synopsis,
                    reprint_notes, notes, keywords, issue_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                    ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29,
                    ?30, ?31, ?32)",
                params![
                    self.meta.changeset_id,
                    self.meta.deleted,
                    self.meta.committed,
                    self.meta.previous_revision,
                    self.story_id,
                    self.title,
                    self.title_inferred,
                    self.feature,
                    self.kind.to_db_str(),
                    self.sequence_number,
                    self.page_count,
                    self.page_count_uncertain,
                    self.script,
                    self.pencils,
                    self.inks,
                    self.colors,
                    self.letters,
                    self.editing,
                    self.no_script,
                    self.no_pencils,
                    self.no_inks,
                    self.no_colors,
                    self.no_letters,
                    self.no_editing,
                    self.job_number,
                    self.genre,
                    self.characters,
                    self.synopsis,
                    self.reprint_notes,
                    self.notes,
                    self.keywords,
                    self.issue,
                ],
            )?;
            self.meta.id = conn.last_insert_rowid();
        } else {
            conn.execute(
                "UPDATE oi_story_revisions SET changeset_id = ?2, deleted = ?3,
                    committed = ?4, previous_revision = ?5, story_id = ?6, title = ?7,
                    title_inferred = ?8, feature = ?9, kind = ?10, sequence_number = ?11,
                    page_count = ?12, page_count_uncertain = ?13, script = ?14, pencils = ?15,
                    inks = ?16, colors = ?17, letters = ?18, editing = ?19, no_script = ?20,
                    no_pencils = ?21, no_inks = ?22, no_colors = ?23, no_letters = ?24,
                    no_editing = ?25, job_number = ?26, genre = ?27, characters = ?28,
                    synopsis = ?29, reprint_notes = ?30, notes = ?31, keywords = ?32,
                    issue_id = ?33
                 WHERE id = ?1",
                params![
                    self.meta.id,
                    self.meta.changeset_id,
                    self.meta.deleted,
                    self.meta.committed,
                    self.meta.previous_revision,
                    self.story_id,
                    self.title,
                    self.title_inferred,
                    self.feature,
                    self.kind.to_db_str(),
                    self.sequence_number,
                    self.page_count,
                    self.page_count_uncertain,
                    self.script,
                    self.pencils,
                    self.inks,
                    self.colors,
                    self.letters,
                    self.editing,
                    self.no_script,
                    self.no_pencils,
                    self.no_inks,
                    self.no_colors,
                    self.no_letters,
                    self.no_editing,
                    self.job_number,
                    self.genre,
                    self.characters,
                    self.synopsis,
                    self.reprint_notes,
                    self.notes,
                    self.keywords,
                    self.issue,
                ],
            )?;
        }
        Ok(())
    }

    pub fn load(oi: &IndexingStore, id: i64) -> Result<Self> {
        let conn = oi.conn().lock().unwrap();
        let mut stmt = conn.prepare_cached("SELECT * FROM oi_story_revisions WHERE id = ?1")?;
        stmt.query_row(params![id], |row| {
            Ok(StoryRevision {
                meta: RevisionMeta {
                    id: row.get("id")?,
                    changeset_id: row.get("changeset_id")?,
                    deleted: row.get("deleted")?,
                    committed: row.get("committed")?,
                    previous_revision: row.get("previous_revision")?,
                    created: row.get("created")?,
                },
                story_id: row.get("story_id")?,
                title: row.get("title")?,
                title_inferred: row.get("title_inferred")?,
                feature: row.get("feature")?,
                kind: StoryKind::from_db_str(&row.get::<_, String>("kind")?),
                sequence_number: row.get("sequence_number")?,
                page_count: row.get("page_count")?,
                page_count_uncertain: row.get("page_count_uncertain")?,
                script: row.get("script")?,
                pencils: row.get("pencils")?,
                inks: row.get("inks")?,
                colors: row.get("colors")?,
                letters: row.get("letters")?,
                editing: row.get("editing")?,
                no_script: row.get("no_script")?,
                no_pencils: row.get("no_pencils")?,
                no_inks: row.get("no_inks")?,
                no_colors: row.get("no_colors")?,
                no_letters: row.get("no_letters")?,
                no_editing: row.get("no_editing")?,
                job_number: row.get("job_number")?,
                genre: row.get("genre")?,
                characters: row.get("characters")?,
                synopsis: row.get("synopsis")?,
                reprint_notes: row.get("reprint_notes")?,
                notes: row.get("notes")?,
                keywords: row.get("keywords")?,
                issue: row.get("issue_id")?,
            })
        })
        .optional()?
        .ok_or_else(|| RevisionError::NotFound { what: "story revision", id }.into())
    }

    pub fn open_ids(oi: &IndexingStore, changeset_id: i64) -> Result<Vec<i64>> {
        open_revision_ids(oi, "oi_story_revisions", changeset_id, "id ASC")
    }

    fn old_story(&self, ctx: &CommitContext) -> Result<Story> {
        let id = self.story_id.ok_or_else(|| {
            RevisionError::DataIntegrity("story revision without a source".to_string())
        })?;
        ctx.display
            .get_story(id)?
            .ok_or_else(|| RevisionError::NotFound { what: "story", id }.into())
    }

    fn new_issue_id(&self) -> Result<i64> {
        self.issue.ok_or_else(|| {
            RevisionError::DataIntegrity(
                "story revision committed before its issue was bound".to_string(),
            )
            .into()
        })
    }

    fn series_of_issue(&self, ctx: &CommitContext, issue_id: i64) -> Result<(Issue, String, String)> {
        let issue = ctx
            .display
            .get_issue(issue_id)?
            .ok_or(RevisionError::NotFound { what: "issue", id: issue_id })?;
        let series = ctx
            .display
            .get_series(issue.series)?
            .ok_or(RevisionError::NotFound { what: "series", id: issue.series })?;
        Ok((issue, series.country, series.language))
    }
}

impl RevisionCommit for StoryRevision {
    fn source_name(&self) -> &'static str {
        "story"
    }

    fn meta(&self) -> &RevisionMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RevisionMeta {
        &mut self.meta
    }

    fn source_id(&self) -> Option<i64> {
        self.story_id
    }

    fn stats_category_tuples(&self) -> &'static [&'static [&'static str]] {
        &[&["issue", "series", "country"], &["issue", "series", "language"]]
    }

    fn resolve_path(&self, ctx: &CommitContext, side: Side, path: &[&str]) -> Result<FieldValue> {
        let issue_id = match side {
            Side::New => self.new_issue_id()?,
            Side::Old => self.old_story(ctx)?.issue,
        };
        match path {
            ["issue", "series", "country"] => {
                let (_, country, _) = self.series_of_issue(ctx, issue_id)?;
                Ok(FieldValue::Text(country))
            }
            ["issue", "series", "language"] => {
                let (_, _, language) = self.series_of_issue(ctx, issue_id)?;
                Ok(FieldValue::Text(language))
            }
            _ => Ok(FieldValue::Absent),
        }
    }

    fn entity_counts(&self, _ctx: &CommitContext, _side: Side) -> Result<CountMap> {
        Ok(CountMap::of(STAT_STORIES, 1))
    }

    fn delete_display_object(&mut self, ctx: &CommitContext) -> Result<()> {
        let story = self.old_story(ctx)?;
        ctx.display.delete_story(story.id)?;
        update_indexed_status(ctx, story.issue)
    }

    fn write_display_object(&mut self, ctx: &CommitContext, _changes: &Changes) -> Result<()> {
        let issue_id = self.new_issue_id()?;
        let mut story = match self.story_id {
            Some(id) => ctx
                .display
                .get_story(id)?
                .ok_or(RevisionError::NotFound { what: "story", id })?,
            None => Story::default(),
        };
        let old_issue = if self.story_id.is_some() {
            Some(story.issue)
        } else {
            None
        };

        story.title = self.title.clone();
        story.title_inferred = self.title_inferred;
        story.feature = self.feature.clone();
        story.kind = self.kind;
        story.sequence_number = self.sequence_number;
        story.page_count = self.page_count;
        story.page_count_uncertain = self.page_count_uncertain;
        story.script = self.script.clone();
        story.pencils = self.pencils.clone();
        story.inks = self.inks.clone();
        story.colors = self.colors.clone();
        story.letters = self.letters.clone();
        story.editing = self.editing.clone();
        story.no_script = self.no_script;
        story.no_pencils = self.no_pencils;
        story.no_inks = self.no_inks;
        story.no_colors = self.no_colors;
        story.no_letters = self.no_letters;
        story.no_editing = self.no_editing;
        story.job_number = self.job_number.clone();
        story.genre = self.genre.clone();
        story.characters = self.characters.clone();
        story.synopsis = self.synopsis.clone();
        story.reprint_notes = self.reprint_notes.clone();
        story.notes = self.notes.clone();
        story.issue = issue_id;
        if ctx.clear_reservation {
            story.reserved = false;
        }
        ctx.display.save_story(&mut story)?;

        if self.story_id.is_none() {
            self.story_id = Some(story.id);
            self.persist(ctx.oi)?;
        }
        transfer_keywords(ctx, EntityKind::Story, story.id, &mut self.keywords)?;

        // Indexing status follows story membership, on both sides of a
        // cross-issue move.
        update_indexed_status(ctx, issue_id)?;
        if let Some(old_issue_id) = old_issue {
            if old_issue_id != issue_id {
                update_indexed_status(ctx, old_issue_id)?;
            }
        }
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
    fn indexed_status_derivation_rules() {
        // Pure derivation matrix exercised through the public enum.
        assert_eq!(IndexedStatus::from_db(0), IndexedStatus::Skeleton);
        assert_eq!(IndexedStatus::from_db(1), IndexedStatus::Partial);
        assert_eq!(IndexedStatus::from_db(2), IndexedStatus::Full);
    }
}
