//! SeriesRevision: the heaviest publisher-side revision.
//!
//! Carries the comics-publication and country/language statistics moves for
//! the whole subtree, the publisher transfer, sort-name derivation, the
//! singleton placeholder-issue lifecycle, and ongoing-reservation handling.

use super::changeset::{Changeset, IndexingStore};
use super::issue::IssueRevision;
use super::publisher::{open_revision_ids, transfer_keywords};
use super::revision::{
    commit_revision, Changes, CommitContext, FieldValue, RevisionCommit, RevisionError,
    RevisionMeta, Side,
};
use super::stats::{
    CountMap, StatsBucket, STAT_COVERS, STAT_ISSUES, STAT_ISSUE_INDEXES, STAT_SERIES,
    STAT_STORIES, STAT_VARIANT_ISSUES,
};
use crate::display::{DisplayStore, EntityKind, PublicationType, Series};
use anyhow::Result;
use lazy_static::lazy_static;
use regex::Regex;
use rusqlite::{params, OptionalExtension};

lazy_static! {
    static ref LEADING_ARTICLE: Regex =
        Regex::new(r"^\S?\w+['\s]\s*(.*)$").expect("leading article pattern is valid");
}

/// Name with the leading article (separated by an apostrophe or whitespace)
/// removed.
pub fn remove_leading_article(name: &str) -> String {
    match LEADING_ARTICLE.captures(name) {
        Some(captures) => captures[1].to_string(),
        None => name.to_string(),
    }
}

#[derive(Clone, Debug)]
pub struct SeriesRevision {
    pub meta: RevisionMeta,
    pub series_id: Option<i64>,
    pub name: String,
    pub leading_article: bool,
    pub format: String,
    pub color: String,
    pub dimensions: String,
    pub paper_stock: String,
    pub binding: String,
    pub publishing_format: String,
    pub publication_type: Option<PublicationType>,
    pub notes: String,
    pub keywords: String,
    pub year_began: i64,
    pub year_ended: Option<i64>,
    pub year_began_uncertain: bool,
    pub year_ended_uncertain: bool,
    pub is_current: bool,
    pub is_singleton: bool,
    pub is_comics_publication: bool,
    pub publication_notes: String,
    pub tracking_notes: String,
    pub has_barcode: bool,
    pub has_indicia_frequency: bool,
    pub has_isbn: bool,
    pub has_issue_title: bool,
    pub has_volume: bool,
    pub has_rating: bool,
    pub reservation_requested: bool,
    pub country: String,
    pub language: String,
    pub publisher: i64,
}

impl SeriesRevision {
    pub fn new_added(
        changeset: &Changeset,
        name: &str,
        year_began: i64,
        country: &str,
        language: &str,
        publisher: i64,
    ) -> Self {
        SeriesRevision {
            meta: RevisionMeta::new(changeset.id),
            series_id: None,
            name: name.to_string(),
            leading_article: false,
            format: String::new(),
            color: String::new(),
            dimensions: String::new(),
            paper_stock: String::new(),
            binding: String::new(),
            publishing_format: String::new(),
            publication_type: None,
            notes: String::new(),
            keywords: String::new(),
            year_began,
            year_ended: None,
            year_began_uncertain: false,
            year_ended_uncertain: false,
            is_current: false,
            is_singleton: false,
            is_comics_publication: true,
            publication_notes: String::new(),
            tracking_notes: String::new(),
            has_barcode: true,
            has_indicia_frequency: false,
            has_isbn: true,
            has_issue_title: false,
            has_volume: false,
            has_rating: false,
            reservation_requested: false,
            country: country.to_string(),
            language: language.to_string(),
            publisher,
        }
    }

    pub fn clone_from(
        display: &DisplayStore,
        oi: &IndexingStore,
        series: &Series,
        changeset: &Changeset,
    ) -> Result<Self> {
        oi.acquire_lock(EntityKind::Series, series.id, Some(changeset.id))?;
        let previous = oi.latest_approved_revision("oi_series_revisions", "series_id", series.id)?;

        let mut revision = SeriesRevision {
            meta: RevisionMeta::new(changeset.id),
            series_id: Some(series.id),
            name: series.name.clone(),
            leading_article: series.name != series.sort_name,
            format: series.format.clone(),
            color: series.color.clone(),
            dimensions: series.dimensions.clone(),
            paper_stock: series.paper_stock.clone(),
            binding: series.binding.clone(),
            publishing_format: series.publishing_format.clone(),
            publication_type: series.publication_type,
            notes: series.notes.clone(),
            keywords: display.get_keywords(EntityKind::Series, series.id)?,
            year_began: series.year_began,
            year_ended: series.year_ended,
            year_began_uncertain: series.year_began_uncertain,
            year_ended_uncertain: series.year_ended_uncertain,
            is_current: series.is_current,
            is_singleton: series.is_singleton,
            is_comics_publication: series.is_comics_publication,
            publication_notes: series.publication_notes.clone(),
            tracking_notes: series.tracking_notes.clone(),
            has_barcode: series.has_barcode,
            has_indicia_frequency: series.has_indicia_frequency,
            has_isbn: series.has_isbn,
            has_issue_title: series.has_issue_title,
            has_volume: series.has_volume,
            has_rating: series.has_rating,
            reservation_requested: false,
            country: series.country.clone(),
            language: series.language.clone(),
            publisher: series.publisher,
        };
        revision.meta.previous_revision = Some(previous);
        revision.persist(oi)?;
        Ok(revision)
    }

    pub fn persist(&mut self, oi: &IndexingStore) -> Result<()> {
        let conn = oi.conn().lock().unwrap();
        let publication_type = self.publication_type.map(PublicationType::to_db_str);
        if self.meta.id == 0 {
            conn.execute(
                "INSERT INTO oi_series_revisions (changeset_id, deleted, committed,
                    previous_revision, series_id, name, leading_article, format, color,
                    dimensions, paper_stock, binding, publishing_format, publication_type,
                    notes, keywords, year_began, year_ended, year_began_uncertain,
                    year_ended_uncertain, is_current, is_singleton, is_comics_publication,
                    publication_notes, tracking_notes, has_barcode, has_indicia_frequency,
                    has_isbn, has_issue_title, has_volume, has_rating, reservation_requested,
                    country, language, publisher)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                    ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29,
                    ?30, ?31, ?32, ?33, ?34, ?35)",
                params![
                    self.meta.changeset_id,
                    self.meta.deleted,
                    self.meta.committed,
                    self.meta.previous_revision,
                    self.series_id,
                    self.name,
                    self.leading_article,
                    self.format,
                    self.color,
                    self.dimensions,
                    self.paper_stock,
                    self.binding,
                    self.publishing_format,
                    publication_type,
                    self.notes,
                    self.keywords,
                    self.year_began,
                    self.year_ended,
                    self.year_began_uncertain,
                    self.year_ended_uncertain,
                    self.is_current,
                    self.is_singleton,
                    self.is_comics_publication,
                    self.publication_notes,
                    self.tracking_notes,
                    self.has_barcode,
                    self.has_indicia_frequency,
                    self.has_isbn,
                    self.has_issue_title,
                    self.has_volume,
                    self.has_rating,
                    self.reservation_requested,
                    self.country,
                    self.language,
                    self.publisher,
                ],
            )?;
            self.meta.id = conn.last_insert_rowid();
        } else {
            conn.execute(
                "UPDATE oi_series_revisions SET changeset_id = ?2, deleted = ?3,
                    committed = ?4, previous_revision = ?5, series_id = ?6, name = ?7,
                    leading_article = ?8, format = ?9, color = ?10, dimensions = ?11,
                    paper_stock = ?12, binding = ?13, publishing_format = ?14,
                    publication_type = ?15, notes = ?16, keywords = ?17, year_began = ?18,
                    year_ended = ?19, year_began_uncertain = ?20, year_ended_uncertain = ?21,
                    is_current = ?22, is_singleton = ?23, is_comics_publication = ?24,
                    publication_notes = ?25, tracking_notes = ?26, has_barcode = ?27,
                    has_indicia_frequency = ?28, has_isbn = ?29, has_issue_title = ?30,
                    has_volume = ?31, has_rating = ?32, reservation_requested = ?33,
                    country = ?34, language = ?35, publisher = ?36
                 WHERE id = ?1",
                params![
                    self.meta.id,
                    self.meta.changeset_id,
                    self.meta.deleted,
                    self.meta.committed,
                    self.meta.previous_revision,
                    self.series_id,
                    self.name,
                    self.leading_article,
                    self.format,
                    self.color,
                    self.dimensions,
                    self.paper_stock,
                    self.binding,
                    self.publishing_format,
                    publication_type,
                    self.notes,
                    self.keywords,
                    self.year_began,
                    self.year_ended,
                    self.year_began_uncertain,
                    self.year_ended_uncertain,
                    self.is_current,
                    self.is_singleton,
                    self.is_comics_publication,
                    self.publication_notes,
                    self.tracking_notes,
                    self.has_barcode,
                    self.has_indicia_frequency,
                    self.has_isbn,
                    self.has_issue_title,
                    self.has_volume,
                    self.has_rating,
                    self.reservation_requested,
                    self.country,
                    self.language,
                    self.publisher,
                ],
            )?;
        }
        Ok(())
    }

    pub fn load(oi: &IndexingStore, id: i64) -> Result<Self> {
        let conn = oi.conn().lock().unwrap();
        let mut stmt = conn.prepare_cached("SELECT * FROM oi_series_revisions WHERE id = ?1")?;
        stmt.query_row(params![id], |row| {
            Ok(SeriesRevision {
                meta: RevisionMeta {
                    id: row.get("id")?,
                    changeset_id: row.get("changeset_id")?,
                    deleted: row.get("deleted")?,
                    committed: row.get("committed")?,
                    previous_revision: row.get("previous_revision")?,
                    created: row.get("created")?,
                },
                series_id: row.get("series_id")?,
                name: row.get("name")?,
                leading_article: row.get("leading_article")?,
                format: row.get("format")?,
                color: row.get("color")?,
                dimensions: row.get("dimensions")?,
                paper_stock: row.get("paper_stock")?,
                binding: row.get("binding")?,
                publishing_format: row.get("publishing_format")?,
                publication_type: row
                    .get::<_, Option<String>>("publication_type")?
                    .as_deref()
                    .and_then(PublicationType::from_db_str),
                notes: row.get("notes")?,
                keywords: row.get("keywords")?,
                year_began: row.get("year_began")?,
                year_ended: row.get("year_ended")?,
                year_began_uncertain: row.get("year_began_uncertain")?,
                year_ended_uncertain: row.get("year_ended_uncertain")?,
                is_current: row.get("is_current")?,
                is_singleton: row.get("is_singleton")?,
                is_comics_publication: row.get("is_comics_publication")?,
                publication_notes: row.get("publication_notes")?,
                tracking_notes: row.get("tracking_notes")?,
                has_barcode: row.get("has_barcode")?,
                has_indicia_frequency: row.get("has_indicia_frequency")?,
                has_isbn: row.get("has_isbn")?,
                has_issue_title: row.get("has_issue_title")?,
                has_volume: row.get("has_volume")?,
                has_rating: row.get("has_rating")?,
                reservation_requested: row.get("reservation_requested")?,
                country: row.get("country")?,
                language: row.get("language")?,
                publisher: row.get("publisher")?,
            })
        })
        .optional()?
        .ok_or_else(|| RevisionError::NotFound { what: "series revision", id }.into())
    }

    pub fn open_ids(oi: &IndexingStore, changeset_id: i64) -> Result<Vec<i64>> {
        open_revision_ids(oi, "oi_series_revisions", changeset_id, "id ASC")
    }

    fn old_series(&self, ctx: &CommitContext) -> Result<Series> {
        let id = self.series_id.ok_or_else(|| {
            RevisionError::DataIntegrity("series revision without a source".to_string())
        })?;
        ctx.display
            .get_series(id)?
            .ok_or_else(|| RevisionError::NotFound { what: "series", id }.into())
    }

    /// Global statistics moves for everything hanging off the series when
    /// the comics-publication flag flips or the country/language key moves.
    fn adjust_subtree_stats(&self, ctx: &CommitContext, changes: &Changes) -> Result<()> {
        let series_id = match self.series_id {
            Some(id) => id,
            None => return Ok(()),
        };

        let issues = ctx.display.issue_count_in_series(series_id, false)?;
        let variants = ctx.display.variant_count_in_series(series_id)?;
        let indexes = ctx.display.indexed_count_in_series(series_id)?;

        let old_bucket = StatsBucket {
            country: changes.old_text("country").map(str::to_string),
            language: changes.old_text("language").map(str::to_string),
        };

        if changes.to_flag("is_comics_publication") || changes.from_flag("is_comics_publication") {
            let sign = if changes.to_flag("is_comics_publication") {
                1
            } else {
                -1
            };
            let mut counts = CountMap::new();
            counts.set(STAT_ISSUES, issues);
            counts.set(STAT_VARIANT_ISSUES, variants);
            counts.set(STAT_ISSUE_INDEXES, indexes);
            ctx.stats.apply(&old_bucket, &counts, sign)?;
        }

        let key_moved = changes.is_changed("country") || changes.is_changed("language");
        if key_moved && self.is_comics_publication {
            let stories = ctx.display.story_count_of_series(series_id)?;
            let covers = ctx.display.scan_count(series_id)?;
            let mut counts = CountMap::new();
            counts.set(STAT_ISSUES, issues);
            counts.set(STAT_VARIANT_ISSUES, variants);
            counts.set(STAT_ISSUE_INDEXES, indexes);
            counts.set(STAT_STORIES, stories);
            counts.set(STAT_COVERS, covers);

            let new_bucket = StatsBucket {
                country: changes.new_text("country").map(str::to_string),
                language: changes.new_text("language").map(str::to_string),
            };
            ctx.stats.apply(&old_bucket, &counts, -1)?;
            ctx.stats.apply(&new_bucket, &counts, 1)?;
        }

        Ok(())
    }
}

impl RevisionCommit for SeriesRevision {
    fn source_name(&self) -> &'static str {
        "series"
    }

    fn meta(&self) -> &RevisionMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RevisionMeta {
        &mut self.meta
    }

    fn source_id(&self) -> Option<i64> {
        self.series_id
    }

    fn parent_field_tuples(&self) -> &'static [&'static [&'static str]] {
        &[&["publisher"]]
    }

    fn major_flag_tuples(&self) -> &'static [&'static [&'static str]] {
        &[&["is_current"], &["is_comics_publication"], &["is_singleton"]]
    }

    fn stats_category_tuples(&self) -> &'static [&'static [&'static str]] {
        &[&["country"], &["language"]]
    }

    fn parent_kind(&self, _path: &[&str]) -> EntityKind {
        EntityKind::Publisher
    }

    fn resolve_path(&self, ctx: &CommitContext, side: Side, path: &[&str]) -> Result<FieldValue> {
        match side {
            Side::New => Ok(match path {
                ["publisher"] => FieldValue::Ref(self.publisher),
                ["is_current"] => FieldValue::Bool(self.is_current),
                ["is_comics_publication"] => FieldValue::Bool(self.is_comics_publication),
                ["is_singleton"] => FieldValue::Bool(self.is_singleton),
                ["country"] => FieldValue::Text(self.country.clone()),
                ["language"] => FieldValue::Text(self.language.clone()),
                _ => FieldValue::Absent,
            }),
            Side::Old => {
                let series = self.old_series(ctx)?;
                Ok(match path {
                    ["publisher"] => FieldValue::Ref(series.publisher),
                    ["is_current"] => FieldValue::Bool(series.is_current),
                    ["is_comics_publication"] => FieldValue::Bool(series.is_comics_publication),
                    ["is_singleton"] => FieldValue::Bool(series.is_singleton),
                    ["country"] => FieldValue::Text(series.country),
                    ["language"] => FieldValue::Text(series.language),
                    _ => FieldValue::Absent,
                })
            }
        }
    }

    fn entity_counts(&self, ctx: &CommitContext, side: Side) -> Result<CountMap> {
        // Only comics publications count toward publisher series counts and
        // the global series statistic.
        let comics = match side {
            Side::New => self.is_comics_publication,
            Side::Old => self.old_series(ctx)?.is_comics_publication,
        };
        if comics {
            Ok(CountMap::of(STAT_SERIES, 1))
        } else {
            Ok(CountMap::new())
        }
    }

    fn pre_stats_measurement(&mut self, ctx: &CommitContext, _changes: &Changes) -> Result<()> {
        // Deleting a singleton also deletes its placeholder issue, before
        // any series-level counts are sampled, so the net issue delta of
        // the whole changeset is exactly the placeholder's.
        if !self.meta.deleted {
            return Ok(());
        }
        let series = self.old_series(ctx)?;
        if !series.is_singleton {
            return Ok(());
        }
        let issues = ctx.display.issues_in_series(series.id)?;
        match issues.as_slice() {
            [] => Ok(()),
            [only] => {
                let mut placeholder =
                    IssueRevision::clone_from(ctx.display, ctx.oi, only, ctx.changeset)?;
                placeholder.meta.deleted = true;
                placeholder.persist(ctx.oi)?;
                commit_revision(&mut placeholder, ctx)?;
                Ok(())
            }
            _ => Err(RevisionError::DataIntegrity(format!(
                "singleton series {} has {} issues",
                series.id,
                issues.len()
            ))
            .into()),
        }
    }

    fn pre_delete(&mut self, ctx: &CommitContext, _changes: &Changes) -> Result<()> {
        let series = self.old_series(ctx)?;
        let remaining = ctx.display.issue_count_in_series(series.id, true)?;
        if remaining > 0 {
            return Err(RevisionError::Validation(format!(
                "series {} still has {} issues",
                series.id, remaining
            ))
            .into());
        }
        Ok(())
    }

    fn delete_display_object(&mut self, ctx: &CommitContext) -> Result<()> {
        let id = self.series_id.ok_or_else(|| {
            RevisionError::DataIntegrity("series delete without a source".to_string())
        })?;
        ctx.display.set_keywords(EntityKind::Series, id, "")?;
        ctx.oi.delete_ongoing_reservation(id)?;
        ctx.display.delete_series(id)
    }

    fn write_display_object(&mut self, ctx: &CommitContext, changes: &Changes) -> Result<()> {
        let mut series = match self.series_id {
            Some(id) => ctx
                .display
                .get_series(id)?
                .ok_or(RevisionError::NotFound { what: "series", id })?,
            None => Series::default(),
        };

        // Subtree statistics and the publisher's cached issue count move
        // before the row itself is rewritten; both read the old key from
        // the changes map.
        if self.series_id.is_some() {
            self.adjust_subtree_stats(ctx, changes)?;
            if changes.is_changed("publisher") {
                for id in changes.old("publisher").ref_ids() {
                    ctx.display.adjust_cached_count(
                        EntityKind::Publisher,
                        id,
                        "issues",
                        -series.issue_count,
                    )?;
                }
                for id in changes.new("publisher").ref_ids() {
                    ctx.display.adjust_cached_count(
                        EntityKind::Publisher,
                        id,
                        "issues",
                        series.issue_count,
                    )?;
                }
            }
        }

        series.name = self.name.clone();
        series.sort_name = if self.leading_article {
            remove_leading_article(&self.name)
        } else {
            self.name.clone()
        };
        series.format = self.format.clone();
        series.color = self.color.clone();
        series.dimensions = self.dimensions.clone();
        series.paper_stock = self.paper_stock.clone();
        series.binding = self.binding.clone();
        series.publishing_format = self.publishing_format.clone();
        series.publication_type = self.publication_type;
        series.notes = self.notes.clone();
        series.year_began = self.year_began;
        series.year_ended = self.year_ended;
        series.year_began_uncertain = self.year_began_uncertain;
        series.year_ended_uncertain = self.year_ended_uncertain;
        series.is_current = self.is_current;
        series.is_singleton = self.is_singleton;
        series.publication_notes = self.publication_notes.clone();
        series.tracking_notes = self.tracking_notes.clone();
        series.has_barcode = self.has_barcode;
        series.has_indicia_frequency = self.has_indicia_frequency;
        series.has_isbn = self.has_isbn;
        series.has_issue_title = self.has_issue_title;
        series.has_volume = self.has_volume;
        series.has_rating = self.has_rating;
        series.country = self.country.clone();
        series.language = self.language.clone();
        series.publisher = self.publisher;

        // Losing comics-publication status also hides the cover gallery.
        if changes.is_changed("is_comics_publication") && self.series_id.is_some() {
            let scans = ctx.display.scan_count(series.id)?;
            series.has_gallery = self.is_comics_publication && scans > 0;
        }
        series.is_comics_publication = self.is_comics_publication;

        if ctx.clear_reservation {
            series.reserved = false;
        }
        ctx.display.save_series(&mut series)?;

        if self.series_id.is_none() {
            self.series_id = Some(series.id);
            self.persist(ctx.oi)?;
        }
        transfer_keywords(ctx, EntityKind::Series, series.id, &mut self.keywords)?;

        // An ongoing reservation only makes sense on a current series.
        if changes.from_flag("is_current")
            && ctx.oi.ongoing_reservation_for(series.id)?.is_some()
        {
            ctx.oi.delete_ongoing_reservation(series.id)?;
        }

        Ok(())
    }

    fn post_adjust_stats(&mut self, ctx: &CommitContext, changes: &Changes) -> Result<()> {
        let series_id = self.series_id.ok_or_else(|| {
            RevisionError::DataIntegrity("series revision not bound after commit".to_string())
        })?;

        if self.meta.previous_revision.is_none() && self.reservation_requested {
            ctx.oi
                .create_ongoing_reservation(&ctx.changeset.indexer, series_id)?;
        }

        // A singleton always has its synthetic [nn] issue; create it when
        // the series is added as a singleton or the flag turns on for an
        // empty series.
        let singleton_needed = if self.meta.previous_revision.is_none() {
            self.is_singleton
        } else {
            changes.to_flag("is_singleton")
                && ctx.display.issue_count_in_series(series_id, true)? == 0
        };
        if !singleton_needed {
            return Ok(());
        }

        let mut placeholder = IssueRevision::new_added(ctx.changeset, "[nn]", series_id);
        placeholder.publication_date = self.year_began.to_string();
        if (1000..=9999).contains(&self.year_began) {
            placeholder.key_date = format!("{}-00-00", self.year_began);
        }
        placeholder.persist(ctx.oi)?;
        commit_revision(&mut placeholder, ctx)?;
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
    fn leading_article_removal() {
        assert_eq!(remove_leading_article("The Amazing Ant"), "Amazing Ant");
        assert_eq!(remove_leading_article("L'incredibile Hulk"), "incredibile Hulk");
        assert_eq!(remove_leading_article("Batman"), "Batman");
    }
}
