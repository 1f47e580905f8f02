//! IssueRevision: sort-code space management, cross-revision prerequisite
//! resolution, conditional-field resync against the series flags, and the
//! heaviest cached-count fan-out of any entity.

use super::changeset::{Changeset, IndexingStore};
use super::publisher::{open_revision_ids, transfer_keywords};
use super::revision::{
    commit_revision, resolve_prerequisites, Changes, CommitContext, FieldValue, RevisionCommit,
    RevisionError, RevisionMeta, Side,
};
use super::state::ChangesetAction;
use super::stats::{CountMap, StatsBucket, STAT_COVERS, STAT_ISSUES, STAT_STORIES, STAT_VARIANT_ISSUES};
use crate::display::{DisplayStore, EntityKind, IndexedStatus, Issue, Series};
use anyhow::Result;
use rusqlite::{params, OptionalExtension};
use std::collections::BTreeSet;
use tracing::debug;

/// Split a composite on-sale date ("2016", "2016-01", "2016-01-31") into
/// year/month/day fields.
pub fn on_sale_date_fields(date: &str) -> (Option<i64>, Option<i64>, Option<i64>) {
    let mut parts = date.split('-').filter_map(|p| p.parse::<i64>().ok());
    (parts.next(), parts.next(), parts.next())
}

/// Re-join on-sale date fields into the composite display string. Partial
/// dates stay partial; no year means no date.
pub fn on_sale_date_as_string(
    year: Option<i64>,
    month: Option<i64>,
    day: Option<i64>,
) -> String {
    match (year, month, day) {
        (Some(y), Some(m), Some(d)) => format!("{:04}-{:02}-{:02}", y, m, d),
        (Some(y), Some(m), None) => format!("{:04}-{:02}", y, m),
        (Some(y), None, _) => format!("{:04}", y),
        (None, _, _) => String::new(),
    }
}

/// Normalized ISBN if the checksum holds, empty string otherwise.
pub fn validated_isbn(isbn: &str) -> String {
    let cleaned: String = isbn
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();
    match cleaned.len() {
        10 => {
            let mut sum = 0u32;
            for (i, c) in cleaned.chars().enumerate() {
                let value = match c {
                    '0'..='9' => c as u32 - '0' as u32,
                    'X' | 'x' if i == 9 => 10,
                    _ => return String::new(),
                };
                sum += value * (10 - i as u32);
            }
            if sum % 11 == 0 {
                cleaned.to_uppercase()
            } else {
                String::new()
            }
        }
        13 => {
            let mut sum = 0u32;
            for (i, c) in cleaned.chars().enumerate() {
                let value = match c {
                    '0'..='9' => c as u32 - '0' as u32,
                    _ => return String::new(),
                };
                sum += value * if i % 2 == 0 { 1 } else { 3 };
            }
            if sum % 10 == 0 {
                cleaned
            } else {
                String::new()
            }
        }
        _ => String::new(),
    }
}

#[derive(Clone, Debug)]
pub struct IssueRevision {
    pub meta: RevisionMeta,
    pub issue_id: Option<i64>,
    /// Insert or move the issue directly after this issue; None means the
    /// beginning of the series.
    pub after: Option<i64>,
    /// Orders multiple new-issue revisions within one changeset relative to
    /// each other only; never written to the display schema.
    pub revision_sort_code: Option<i64>,
    pub reservation_requested: bool,
    pub number: String,
    pub title: String,
    pub no_title: bool,
    pub volume: String,
    pub no_volume: bool,
    pub display_volume_with_number: bool,
    pub variant_of: Option<i64>,
    pub variant_name: String,
    pub publication_date: String,
    pub key_date: String,
    pub year_on_sale: Option<i64>,
    pub month_on_sale: Option<i64>,
    pub day_on_sale: Option<i64>,
    pub on_sale_date_uncertain: bool,
    pub indicia_frequency: String,
    pub no_indicia_frequency: bool,
    pub price: String,
    pub page_count: Option<f64>,
    pub page_count_uncertain: bool,
    pub editing: String,
    pub no_editing: bool,
    pub isbn: String,
    pub no_isbn: bool,
    pub barcode: String,
    pub no_barcode: bool,
    pub rating: String,
    pub no_rating: bool,
    pub notes: String,
    pub keywords: String,
    pub series: i64,
    pub indicia_publisher: Option<i64>,
    pub indicia_pub_not_printed: bool,
    pub brand: Option<i64>,
    pub no_brand: bool,
}

impl IssueRevision {
    pub fn new_added(changeset: &Changeset, number: &str, series: i64) -> Self {
        IssueRevision {
            meta: RevisionMeta::new(changeset.id),
            issue_id: None,
            after: None,
            revision_sort_code: None,
            reservation_requested: false,
            number: number.to_string(),
            title: String::new(),
            no_title: false,
            volume: String::new(),
            no_volume: false,
            display_volume_with_number: false,
            variant_of: None,
            variant_name: String::new(),
            publication_date: String::new(),
            key_date: String::new(),
            year_on_sale: None,
            month_on_sale: None,
            day_on_sale: None,
            on_sale_date_uncertain: false,
            indicia_frequency: String::new(),
            no_indicia_frequency: false,
            price: String::new(),
            page_count: None,
            page_count_uncertain: false,
            editing: String::new(),
            no_editing: false,
            isbn: String::new(),
            no_isbn: false,
            barcode: String::new(),
            no_barcode: false,
            rating: String::new(),
            no_rating: false,
            notes: String::new(),
            keywords: String::new(),
            series,
            indicia_publisher: None,
            indicia_pub_not_printed: false,
            brand: None,
            no_brand: false,
        }
    }

    pub fn clone_from(
        display: &DisplayStore,
        oi: &IndexingStore,
        issue: &Issue,
        changeset: &Changeset,
    ) -> Result<Self> {
        oi.acquire_lock(EntityKind::Issue, issue.id, Some(changeset.id))?;
        let previous = oi.latest_approved_revision("oi_issue_revisions", "issue_id", issue.id)?;

        let mut revision = IssueRevision {
            meta: RevisionMeta::new(changeset.id),
            issue_id: Some(issue.id),
            after: None,
            revision_sort_code: None,
            reservation_requested: false,
            number: issue.number.clone(),
            title: issue.title.clone(),
            no_title: issue.no_title,
            volume: issue.volume.clone(),
            no_volume: issue.no_volume,
            display_volume_with_number: issue.display_volume_with_number,
            variant_of: issue.variant_of,
            variant_name: issue.variant_name.clone(),
            publication_date: issue.publication_date.clone(),
            key_date: issue.key_date.clone(),
            year_on_sale: None,
            month_on_sale: None,
            day_on_sale: None,
            on_sale_date_uncertain: issue.on_sale_date_uncertain,
            indicia_frequency: issue.indicia_frequency.clone(),
            no_indicia_frequency: issue.no_indicia_frequency,
            price: issue.price.clone(),
            page_count: issue.page_count,
            page_count_uncertain: issue.page_count_uncertain,
            editing: issue.editing.clone(),
            no_editing: issue.no_editing,
            isbn: issue.isbn.clone(),
            no_isbn: issue.no_isbn,
            barcode: issue.barcode.clone(),
            no_barcode: issue.no_barcode,
            rating: issue.rating.clone(),
            no_rating: issue.no_rating,
            notes: issue.notes.clone(),
            keywords: display.get_keywords(EntityKind::Issue, issue.id)?,
            series: issue.series,
            indicia_publisher: issue.indicia_publisher,
            indicia_pub_not_printed: issue.indicia_pub_not_printed,
            brand: issue.brand,
            no_brand: issue.no_brand,
        };
        revision.meta.previous_revision = Some(previous);
        // Pre-initial-save derivation: the composite on-sale date splits
        // into integer fields on the revision.
        revision.pre_initial_save(issue);
        revision.persist(oi)?;
        Ok(revision)
    }

    fn pre_initial_save(&mut self, issue: &Issue) {
        let (year, month, day) = on_sale_date_fields(&issue.on_sale_date);
        self.year_on_sale = year;
        self.month_on_sale = month;
        self.day_on_sale = day;
    }

    pub fn persist(&mut self, oi: &IndexingStore) -> Result<()> {
        let conn = oi.conn().lock().unwrap();
        if self.meta.id == 0 {
            conn.execute(
                "INSERT INTO oi_issue_revisions (changeset_id, deleted, committed,
                    previous_revision, issue_id, after_issue, revision_sort_code,
                    reservation_requested, number, title, no_title, volume, no_volume,
                    display_volume_with_number, variant_of, variant_name, publication_date,
                    key_date, year_on_sale, month_on_sale, day_on_sale,
                    on_sale_date_uncertain, indicia_frequency, no_indicia_frequency, price,
                    page_count, page_count_uncertain, editing, no_editing, isbn, no_isbn,
                    barcode, no_barcode, rating, no_rating, notes, keywords, series,
                    indicia_publisher, indicia_pub_not_printed, brand, no_brand)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                    ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29,
                    ?30, ?31, ?32, ?33, ?34, ?35, ?36, ?37, ?38, ?39, ?40, ?41, ?42)",
                params![
                    self.meta.changeset_id,
                    self.meta.deleted,
                    self.meta.committed,
                    self.meta.previous_revision,
                    self.issue_id,
                    self.after,
                    self.revision_sort_code,
                    self.reservation_requested,
                    self.number,
                    self.title,
                    self.no_title,
                    self.volume,
                    self.no_volume,
                    self.display_volume_with_number,
                    self.variant_of,
                    self.variant_name,
                    self.publication_date,
                    self.key_date,
                    self.year_on_sale,
                    self.month_on_sale,
                    self.day_on_sale,
                    self.on_sale_date_uncertain,
                    self.indicia_frequency,
                    self.no_indicia_frequency,
                    self.price,
                    self.page_count,
                    self.page_count_uncertain,
                    self.editing,
                    self.no_editing,
                    self.isbn,
                    self.no_isbn,
                    self.barcode,
                    self.no_barcode,
                    self.rating,
                    self.no_rating,
                    self.notes,
                    self.keywords,
                    self.series,
                    self.indicia_publisher,
                    self.indicia_pub_not_printed,
                    self.brand,
                    self.no_brand,
                ],
            )?;
            self.meta.id = conn.last_insert_rowid();
        } else {
            conn.execute(
                "UPDATE oi_issue_revisions SET changeset_id = ?2, deleted = ?3,
                    committed = ?4, previous_revision = ?5, issue_id = ?6, after_issue = ?7,
                    revision_sort_code = ?8, reservation_requested = ?9, number = ?10,
                    title = ?11, no_title = ?12, volume = ?13, no_volume = ?14,
                    display_volume_with_number = ?15, variant_of = ?16, variant_name = ?17,
                    publication_date = ?18, key_date = ?19, year_on_sale = ?20,
                    month_on_sale = ?21, day_on_sale = ?22, on_sale_date_uncertain = ?23,
                    indicia_frequency = ?24, no_indicia_frequency = ?25, price = ?26,
                    page_count = ?27, page_count_uncertain = ?28, editing = ?29,
                    no_editing = ?30, isbn = ?31, no_isbn = ?32, barcode = ?33,
                    no_barcode = ?34, rating = ?35, no_rating = ?36, notes = ?37,
                    keywords = ?38, series = ?39, indicia_publisher = ?40,
                    indicia_pub_not_printed = ?41, brand = ?42, no_brand = ?43
                 WHERE id = ?1",
                params![
                    self.meta.id,
                    self.meta.changeset_id,
                    self.meta.deleted,
                    self.meta.committed,
                    self.meta.previous_revision,
                    self.issue_id,
                    self.after,
                    self.revision_sort_code,
                    self.reservation_requested,
                    self.number,
                    self.title,
                    self.no_title,
                    self.volume,
                    self.no_volume,
                    self.display_volume_with_number,
                    self.variant_of,
                    self.variant_name,
                    self.publication_date,
                    self.key_date,
                    self.year_on_sale,
                    self.month_on_sale,
                    self.day_on_sale,
                    self.on_sale_date_uncertain,
                    self.indicia_frequency,
                    self.no_indicia_frequency,
                    self.price,
                    self.page_count,
                    self.page_count_uncertain,
                    self.editing,
                    self.no_editing,
                    self.isbn,
                    self.no_isbn,
                    self.barcode,
                    self.no_barcode,
                    self.rating,
                    self.no_rating,
                    self.notes,
                    self.keywords,
                    self.series,
                    self.indicia_publisher,
                    self.indicia_pub_not_printed,
                    self.brand,
                    self.no_brand,
                ],
            )?;
        }
        Ok(())
    }

    pub fn load(oi: &IndexingStore, id: i64) -> Result<Self> {
        let conn = oi.conn().lock().unwrap();
        let mut stmt = conn.prepare_cached("SELECT * FROM oi_issue_revisions WHERE id = ?1")?;
        stmt.query_row(params![id], |row| {
            Ok(IssueRevision {
                meta: RevisionMeta {
                    id: row.get("id")?,
                    changeset_id: row.get("changeset_id")?,
                    deleted: row.get("deleted")?,
                    committed: row.get("committed")?,
                    previous_revision: row.get("previous_revision")?,
                    created: row.get("created")?,
                },
                issue_id: row.get("issue_id")?,
                after: row.get("after_issue")?,
                revision_sort_code: row.get("revision_sort_code")?,
                reservation_requested: row.get("reservation_requested")?,
                number: row.get("number")?,
                title: row.get("title")?,
                no_title: row.get("no_title")?,
                volume: row.get("volume")?,
                no_volume: row.get("no_volume")?,
                display_volume_with_number: row.get("display_volume_with_number")?,
                variant_of: row.get("variant_of")?,
                variant_name: row.get("variant_name")?,
                publication_date: row.get("publication_date")?,
                key_date: row.get("key_date")?,
                year_on_sale: row.get("year_on_sale")?,
                month_on_sale: row.get("month_on_sale")?,
                day_on_sale: row.get("day_on_sale")?,
                on_sale_date_uncertain: row.get("on_sale_date_uncertain")?,
                indicia_frequency: row.get("indicia_frequency")?,
                no_indicia_frequency: row.get("no_indicia_frequency")?,
                price: row.get("price")?,
                page_count: row.get("page_count")?,
                page_count_uncertain: row.get("page_count_uncertain")?,
                editing: row.get("editing")?,
                no_editing: row.get("no_editing")?,
                isbn: row.get("isbn")?,
                no_isbn: row.get("no_isbn")?,
                barcode: row.get("barcode")?,
                no_barcode: row.get("no_barcode")?,
                rating: row.get("rating")?,
                no_rating: row.get("no_rating")?,
                notes: row.get("notes")?,
                keywords: row.get("keywords")?,
                series: row.get("series")?,
                indicia_publisher: row.get("indicia_publisher")?,
                indicia_pub_not_printed: row.get("indicia_pub_not_printed")?,
                brand: row.get("brand")?,
                no_brand: row.get("no_brand")?,
            })
        })
        .optional()?
        .ok_or_else(|| RevisionError::NotFound { what: "issue revision", id }.into())
    }

    pub fn open_ids(oi: &IndexingStore, changeset_id: i64) -> Result<Vec<i64>> {
        open_revision_ids(
            oi,
            "oi_issue_revisions",
            changeset_id,
            "COALESCE(revision_sort_code, id) ASC",
        )
    }

    fn old_issue(&self, ctx: &CommitContext) -> Result<Issue> {
        let id = self.issue_id.ok_or_else(|| {
            RevisionError::DataIntegrity("issue revision without a source".to_string())
        })?;
        ctx.display
            .get_issue(id)?
            .ok_or_else(|| RevisionError::NotFound { what: "issue", id }.into())
    }

    fn new_series(&self, ctx: &CommitContext) -> Result<Series> {
        ctx.display
            .get_series(self.series)?
            .ok_or_else(|| RevisionError::NotFound { what: "series", id: self.series }.into())
    }

    // -------------------------------------------------------------------------
    // Same-changeset sibling queries
    // -------------------------------------------------------------------------

    /// Whether a same-series sibling in this changeset has already been
    /// committed (the structural check has then already run).
    fn sibling_already_committed(&self, ctx: &CommitContext) -> Result<bool> {
        let conn = ctx.oi.conn().lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM oi_issue_revisions
             WHERE changeset_id = ?1 AND series = ?2 AND committed = 1",
            params![self.meta.changeset_id, self.series],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }

    /// Open same-series revisions in this changeset that specify an
    /// explicit insertion point, ordered by revision sort code.
    fn open_with_after(&self, ctx: &CommitContext) -> Result<Vec<(i64, i64)>> {
        let conn = ctx.oi.conn().lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT id, COALESCE(revision_sort_code, id) FROM oi_issue_revisions
             WHERE changeset_id = ?1 AND series = ?2 AND committed IS NULL
               AND after_issue IS NOT NULL
             ORDER BY COALESCE(revision_sort_code, id) ASC",
        )?;
        let rows = stmt
            .query_map(params![self.meta.changeset_id, self.series], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// (id, ordering key) of all open same-series revisions in this
    /// changeset, lowest ordering key first.
    fn open_siblings(&self, ctx: &CommitContext) -> Result<Vec<(i64, i64)>> {
        let conn = ctx.oi.conn().lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT id, COALESCE(revision_sort_code, id) FROM oi_issue_revisions
             WHERE changeset_id = ?1 AND series = ?2 AND committed IS NULL
             ORDER BY COALESCE(revision_sort_code, id) ASC",
        )?;
        let rows = stmt
            .query_map(params![self.meta.changeset_id, self.series], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn ordering_key(&self) -> i64 {
        self.revision_sort_code.unwrap_or(self.meta.id)
    }

    /// Open same-series revisions that must commit before this one: lower
    /// ordering key for adds and moves, higher for deletes.
    fn open_prereq_ids(&self, ctx: &CommitContext) -> Result<Vec<i64>> {
        let key = self.ordering_key();
        let siblings = self.open_siblings(ctx)?;
        let ids = if self.meta.deleted {
            // Deletes work from the end of the series back.
            siblings
                .into_iter()
                .rev()
                .filter(|(id, k)| *id != self.meta.id && *k > key)
                .map(|(id, _)| id)
                .collect()
        } else {
            siblings
                .into_iter()
                .filter(|(id, k)| *id != self.meta.id && *k < key)
                .map(|(id, _)| id)
                .collect()
        };
        Ok(ids)
    }

    /// Sort code of the issue created by the committed add revision with
    /// the highest ordering key, if any. Each commit effectively appends to
    /// the already-committed block.
    fn last_committed_sibling_sort(&self, ctx: &CommitContext) -> Result<Option<i64>> {
        let issue_id: Option<i64> = {
            let conn = ctx.oi.conn().lock().unwrap();
            conn.query_row(
                "SELECT issue_id FROM oi_issue_revisions
                 WHERE changeset_id = ?1 AND series = ?2 AND committed = 1
                   AND previous_revision IS NULL AND id != ?3 AND issue_id IS NOT NULL
                 ORDER BY COALESCE(revision_sort_code, id) DESC LIMIT 1",
                params![self.meta.changeset_id, self.series, self.meta.id],
                |r| r.get(0),
            )
            .optional()?
        };
        match issue_id {
            Some(id) => Ok(ctx.display.get_issue(id)?.map(|issue| issue.sort_code)),
            None => Ok(None),
        }
    }

    /// Number of same-series adds in this changeset (open or committed).
    fn add_count(&self, ctx: &CommitContext) -> Result<i64> {
        let conn = ctx.oi.conn().lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM oi_issue_revisions
             WHERE changeset_id = ?1 AND series = ?2 AND previous_revision IS NULL
               AND (committed IS NULL OR committed = 1) AND deleted = 0",
            params![self.meta.changeset_id, self.series],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    /// The target sort code the pending insertion goes after: the `after`
    /// issue's code, or -1 for the beginning of the series.
    fn insertion_target(&self, ctx: &CommitContext) -> Result<i64> {
        let after_id = match self.open_with_after(ctx)?.first() {
            Some((id, _)) => Self::load(ctx.oi, *id)?.after,
            None => None,
        };
        match after_id {
            Some(issue_id) => Ok(ctx
                .display
                .get_issue(issue_id)?
                .ok_or(RevisionError::NotFound { what: "issue", id: issue_id })?
                .sort_code),
            None => Ok(-1),
        }
    }

    /// Whether a same-series add in this changeset has already committed;
    /// the first add of a batch makes all the space, so later siblings must
    /// not shift again.
    fn sibling_add_committed(&self, ctx: &CommitContext) -> Result<bool> {
        let conn = ctx.oi.conn().lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM oi_issue_revisions
             WHERE changeset_id = ?1 AND series = ?2 AND committed = 1
               AND previous_revision IS NULL AND deleted = 0",
            params![self.meta.changeset_id, self.series],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }

    /// Shift every issue after the insertion point later by the number of
    /// issues being added, once per add batch.
    ///
    /// Shifting walks highest-first so the per-series uniqueness of sort
    /// codes holds at every intermediate step. A sibling may have already
    /// made the space; a committed sibling add or the gap in front of the
    /// later block tells us.
    fn ensure_sort_code_space(&self, ctx: &CommitContext) -> Result<()> {
        if self.sibling_add_committed(ctx)? {
            return Ok(());
        }
        let target = self.insertion_target(ctx)?;
        let later = ctx.display.issues_later_than(self.series, target)?;
        if later.is_empty() {
            // Appending to the series; nothing to move.
            return Ok(());
        }
        let count = self.add_count(ctx)?;
        if count == 0 {
            return Ok(());
        }
        let min_later = later
            .last()
            .map(|issue| issue.sort_code)
            .unwrap_or(target + 1);
        if min_later > target + count {
            // A sibling already made this space.
            return Ok(());
        }
        debug!(
            "shifting {} issues in series {} by {} after sort code {}",
            later.len(),
            self.series,
            count,
            target
        );
        for mut issue in later {
            issue.sort_code += count;
            ctx.display.save_issue(&mut issue)?;
        }
        Ok(())
    }
}

impl RevisionCommit for IssueRevision {
    fn source_name(&self) -> &'static str {
        "issue"
    }

    fn meta(&self) -> &RevisionMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RevisionMeta {
        &mut self.meta
    }

    fn source_id(&self) -> Option<i64> {
        self.issue_id
    }

    fn parent_field_tuples(&self) -> &'static [&'static [&'static str]] {
        &[
            &["series"],
            &["series", "publisher"],
            &["brand"],
            &["brand", "group"],
            &["indicia_publisher"],
        ]
    }

    fn major_flag_tuples(&self) -> &'static [&'static [&'static str]] {
        &[&["series", "is_comics_publication"]]
    }

    fn stats_category_tuples(&self) -> &'static [&'static [&'static str]] {
        &[&["series", "country"], &["series", "language"]]
    }

    fn parent_kind(&self, path: &[&str]) -> EntityKind {
        match path {
            ["series"] => EntityKind::Series,
            ["series", "publisher"] => EntityKind::Publisher,
            ["brand"] => EntityKind::Brand,
            ["brand", "group"] => EntityKind::BrandGroup,
            _ => EntityKind::IndiciaPublisher,
        }
    }

    fn resolve_path(&self, ctx: &CommitContext, side: Side, path: &[&str]) -> Result<FieldValue> {
        let (series_id, brand_id, indicia_publisher_id) = match side {
            Side::New => (self.series, self.brand, self.indicia_publisher),
            Side::Old => {
                let issue = self.old_issue(ctx)?;
                (issue.series, issue.brand, issue.indicia_publisher)
            }
        };
        match path {
            ["series"] => Ok(FieldValue::Ref(series_id)),
            ["brand"] => Ok(FieldValue::from_opt_ref(brand_id)),
            ["indicia_publisher"] => Ok(FieldValue::from_opt_ref(indicia_publisher_id)),
            ["brand", "group"] => {
                let groups: BTreeSet<i64> = match brand_id {
                    Some(id) => ctx.display.brand_groups_of(id)?.into_iter().collect(),
                    None => BTreeSet::new(),
                };
                Ok(FieldValue::RefSet(groups))
            }
            ["series", rest] => {
                let series = ctx
                    .display
                    .get_series(series_id)?
                    .ok_or(RevisionError::NotFound { what: "series", id: series_id })?;
                Ok(match *rest {
                    "publisher" => FieldValue::Ref(series.publisher),
                    "country" => FieldValue::Text(series.country),
                    "language" => FieldValue::Text(series.language),
                    "is_comics_publication" => FieldValue::Bool(series.is_comics_publication),
                    _ => FieldValue::Absent,
                })
            }
            _ => Ok(FieldValue::Absent),
        }
    }

    fn entity_counts(&self, ctx: &CommitContext, side: Side) -> Result<CountMap> {
        let variant = match side {
            Side::New => self.variant_of.is_some(),
            Side::Old => self.old_issue(ctx)?.variant_of.is_some(),
        };
        if variant {
            Ok(CountMap::of(STAT_VARIANT_ISSUES, 1))
        } else {
            Ok(CountMap::of(STAT_ISSUES, 1))
        }
    }

    fn stats_bucket(&self, changes: &Changes, side: Side) -> Option<StatsBucket> {
        // Global issue statistics only cover comics publications.
        let comics = match side {
            Side::Old => changes.old_bool("is_comics_publication"),
            Side::New => changes.new_bool("is_comics_publication"),
        };
        if !comics {
            return None;
        }
        let get = |name: &str| match side {
            Side::Old => changes.old_text(name).map(str::to_string),
            Side::New => changes.new_text(name).map(str::to_string),
        };
        Some(StatsBucket {
            country: get("country"),
            language: get("language"),
        })
    }

    fn pre_commit_check(&self, ctx: &CommitContext) -> Result<()> {
        if self.sibling_already_committed(ctx)? {
            return Ok(());
        }
        let with_after = self.open_with_after(ctx)?;
        if with_after.len() > 1 {
            return Err(RevisionError::Validation(
                "only one issue revision per series within a changeset can have 'after' set"
                    .to_string(),
            )
            .into());
        }
        if let Some((first_after_id, _)) = with_after.first() {
            let lowest = self.open_siblings(ctx)?.first().map(|(id, _)| *id);
            if lowest != Some(*first_after_id) {
                return Err(RevisionError::Validation(
                    "the issue revision that specifies 'after' must have the lowest \
                     revision sort code"
                        .to_string(),
                )
                .into());
            }
        }
        Ok(())
    }

    fn pre_stats_measurement(&mut self, ctx: &CommitContext, changes: &Changes) -> Result<()> {
        // A plain edit that stays in its series needs no ordering work.
        if self.meta.edited() && !changes.is_changed("series") {
            return Ok(());
        }
        if !self.meta.deleted {
            self.ensure_sort_code_space(ctx)?;
        }

        // Commit prerequisite siblings first; the pending set must shrink
        // every pass or we are looking at an unsatisfiable cycle.
        let oi = ctx.oi.clone();
        let this = &*self;
        resolve_prerequisites(
            || this.open_prereq_ids(ctx),
            |revision_id| {
                let mut sibling = IssueRevision::load(&oi, revision_id)?;
                if sibling.meta.open() {
                    commit_revision(&mut sibling, ctx)?;
                }
                Ok(())
            },
        )
    }

    fn pre_delete(&mut self, ctx: &CommitContext, _changes: &Changes) -> Result<()> {
        let issue = self.old_issue(ctx)?;
        let stories = ctx.display.story_count_of_issue(issue.id)?;
        let covers = ctx.display.covers_of_issue(issue.id)?.len();
        if stories > 0 || covers > 0 {
            return Err(RevisionError::Validation(format!(
                "issue {} still has {} stories and {} covers",
                issue.id, stories, covers
            ))
            .into());
        }
        Ok(())
    }

    fn delete_display_object(&mut self, ctx: &CommitContext) -> Result<()> {
        let issue = self.old_issue(ctx)?;
        ctx.display.delete_issue(issue.id)?;
        ctx.display.set_series_first_last(issue.series)?;
        Ok(())
    }

    fn write_display_object(&mut self, ctx: &CommitContext, changes: &Changes) -> Result<()> {
        let series = self.new_series(ctx)?;
        let is_add = self.issue_id.is_none();
        let series_moved = !is_add && changes.is_changed("series");

        let mut issue = match self.issue_id {
            Some(id) => ctx
                .display
                .get_issue(id)?
                .ok_or(RevisionError::NotFound { what: "issue", id })?,
            None => Issue::default(),
        };

        if is_add {
            let sort_code = match self.last_committed_sibling_sort(ctx)? {
                Some(code) => code + 1,
                None => {
                    let target = match self.after {
                        Some(after_id) => {
                            ctx.display
                                .get_issue(after_id)?
                                .ok_or(RevisionError::NotFound { what: "issue", id: after_id })?
                                .sort_code
                        }
                        None => -1,
                    };
                    target + 1
                }
            };
            issue.sort_code = sort_code;
        } else if series_moved {
            // Moves go to the end of the new series.
            issue.sort_code = match ctx.display.max_sort_code(self.series)? {
                Some(max) => max + 1,
                None => 0,
            };

            // Stories and covers of the moved issue follow it into the new
            // statistics bucket; their counts are not tracked through the
            // generic path.
            let old_bucket = StatsBucket {
                country: changes.old_text("country").map(str::to_string),
                language: changes.old_text("language").map(str::to_string),
            };
            let new_bucket = StatsBucket {
                country: changes.new_text("country").map(str::to_string),
                language: changes.new_text("language").map(str::to_string),
            };
            if old_bucket != new_bucket {
                let mut counts = CountMap::new();
                counts.set(STAT_STORIES, ctx.display.story_count_of_issue(issue.id)?);
                counts.set(STAT_COVERS, ctx.display.covers_of_issue(issue.id)?.len() as i64);
                ctx.stats.apply(&old_bucket, &counts, -1)?;
                ctx.stats.apply(&new_bucket, &counts, 1)?;
            }
        }

        issue.number = self.number.clone();

        // Conditional fields: only copied while the owning series flag is
        // on; otherwise the revision is re-synced from the display row so
        // stale edits never linger.
        if series.has_issue_title {
            issue.title = self.title.clone();
            issue.no_title = self.no_title;
        } else {
            self.title = issue.title.clone();
            self.no_title = issue.no_title;
        }
        if series.has_volume {
            issue.volume = self.volume.clone();
            issue.no_volume = self.no_volume;
            issue.display_volume_with_number = self.display_volume_with_number;
        } else {
            self.volume = issue.volume.clone();
            self.no_volume = issue.no_volume;
            self.display_volume_with_number = issue.display_volume_with_number;
        }
        if series.has_indicia_frequency {
            issue.indicia_frequency = self.indicia_frequency.clone();
            issue.no_indicia_frequency = self.no_indicia_frequency;
        } else {
            self.indicia_frequency = issue.indicia_frequency.clone();
            self.no_indicia_frequency = issue.no_indicia_frequency;
        }
        if series.has_isbn {
            issue.isbn = self.isbn.clone();
            issue.no_isbn = self.no_isbn;
            issue.valid_isbn = validated_isbn(&issue.isbn);
        } else {
            self.isbn = issue.isbn.clone();
            self.no_isbn = issue.no_isbn;
        }
        if series.has_barcode {
            issue.barcode = self.barcode.clone();
            issue.no_barcode = self.no_barcode;
        } else {
            self.barcode = issue.barcode.clone();
            self.no_barcode = issue.no_barcode;
        }
        if series.has_rating {
            issue.rating = self.rating.clone();
            issue.no_rating = self.no_rating;
        } else {
            self.rating = issue.rating.clone();
            self.no_rating = issue.no_rating;
        }

        issue.variant_of = self.variant_of;
        issue.variant_name = self.variant_name.clone();
        issue.publication_date = self.publication_date.clone();
        issue.key_date = self.key_date.clone();
        issue.on_sale_date =
            on_sale_date_as_string(self.year_on_sale, self.month_on_sale, self.day_on_sale);
        issue.on_sale_date_uncertain = self.on_sale_date_uncertain;
        issue.price = self.price.clone();
        issue.page_count = self.page_count;
        issue.page_count_uncertain = self.page_count_uncertain;
        issue.editing = self.editing.clone();
        issue.no_editing = self.no_editing;
        issue.notes = self.notes.clone();
        issue.series = self.series;
        issue.indicia_publisher = self.indicia_publisher;
        issue.indicia_pub_not_printed = self.indicia_pub_not_printed;
        issue.brand = self.brand;
        issue.no_brand = self.no_brand;

        if ctx.clear_reservation {
            // An ongoing reservation keeps new issues reserved for its
            // holder instead of releasing them.
            let ongoing = ctx.oi.ongoing_reservation_for(self.series)?.is_some();
            issue.reserved = is_add && (ongoing || self.reservation_requested);
        }

        ctx.display.save_issue(&mut issue)?;

        if self.issue_id.is_none() {
            self.issue_id = Some(issue.id);
            self.persist(ctx.oi)?;

            // Stories staged in the same changeset without an issue belong
            // to this newly created one.
            let conn = ctx.oi.conn().lock().unwrap();
            conn.execute(
                "UPDATE oi_story_revisions SET issue_id = ?2
                 WHERE changeset_id = ?1 AND issue_id IS NULL AND committed IS NULL",
                params![self.meta.changeset_id, issue.id],
            )?;
        }
        transfer_keywords(ctx, EntityKind::Issue, issue.id, &mut self.keywords)?;

        ctx.display.set_series_first_last(self.series)?;
        if series_moved {
            for id in changes.old("series").ref_ids() {
                ctx.display.set_series_first_last(id)?;

                // Gallery flags can change on either side of a move.
                if let Some(mut old_series) = ctx.display.get_series(id)? {
                    if old_series.has_gallery && ctx.display.scan_count(id)? == 0 {
                        old_series.has_gallery = false;
                        ctx.display.save_series(&mut old_series)?;
                    }
                }
            }
            let mut new_series = self.new_series(ctx)?;
            if !new_series.has_gallery && ctx.display.scan_count(new_series.id)? > 0 {
                new_series.has_gallery = true;
                ctx.display.save_series(&mut new_series)?;
            }
        }

        Ok(())
    }

    fn post_commit(&mut self, ctx: &CommitContext) -> Result<()> {
        // Only modification changesets of indexed issues count as recent
        // indexing activity.
        if ctx.oi.changeset_action(ctx.changeset.id)? != ChangesetAction::Modify {
            return Ok(());
        }
        let issue = match self.issue_id {
            Some(id) => match ctx.display.get_issue(id)? {
                Some(issue) => issue,
                None => return Ok(()),
            },
            None => return Ok(()),
        };
        if issue.is_indexed != IndexedStatus::Skeleton {
            let series = self.new_series(ctx)?;
            ctx.oi.record_recent_indexed(issue.id, &series.language)?;
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
    fn on_sale_date_split() {
        assert_eq!(
            on_sale_date_fields("2016-01-31"),
            (Some(2016), Some(1), Some(31))
        );
        assert_eq!(on_sale_date_fields("2016-01"), (Some(2016), Some(1), None));
        assert_eq!(on_sale_date_fields("2016"), (Some(2016), None, None));
        assert_eq!(on_sale_date_fields(""), (None, None, None));
    }

    #[test]
    fn on_sale_date_join() {
        assert_eq!(
            on_sale_date_as_string(Some(2016), Some(1), Some(31)),
            "2016-01-31"
        );
        assert_eq!(on_sale_date_as_string(Some(2016), Some(1), None), "2016-01");
        assert_eq!(on_sale_date_as_string(Some(2016), None, None), "2016");
        assert_eq!(on_sale_date_as_string(None, Some(5), Some(2)), "");
    }

    #[test]
    fn isbn_validation() {
        assert_eq!(validated_isbn("0-306-40615-2"), "0306406152");
        assert_eq!(validated_isbn("978-0-306-40615-7"), "9780306406157");
        assert_eq!(validated_isbn("0-306-40615-3"), "");
        assert_eq!(validated_isbn("garbage"), "");
        assert_eq!(validated_isbn(""), "");
    }
}
