//! Shared helpers for the end-to-end revision workflow tests.
//!
//! Everything goes through the engine itself (changeset -> revision ->
//! approval) so the display rows and cached counts the tests assert on were
//! produced the same way production data would be.
#![allow(dead_code)]

use longbox_indexing_server::db::CatalogDb;
use longbox_indexing_server::display::{Publisher, Series};
use longbox_indexing_server::indexing::{
    approve_changeset, ChangeType, Changeset, ChangesetState, IssueRevision,
    PublisherBaseFields, PublisherRevision, SeriesRevision,
};

pub const INDEXER: &str = "indexer_anna";
pub const APPROVER: &str = "editor_bob";

pub fn open_db() -> CatalogDb {
    CatalogDb::open_in_memory().expect("in-memory catalog")
}

/// Walk a changeset through submission and review, then approve it.
pub fn submit_and_approve(db: &CatalogDb, changeset: &Changeset) {
    let oi = db.indexing();
    oi.transition_changeset(changeset.id, ChangesetState::Pending, INDEXER, "submitted")
        .expect("submit");
    oi.transition_changeset(changeset.id, ChangesetState::Reviewing, APPROVER, "examining")
        .expect("review");
    approve_changeset(db, changeset.id, APPROVER).expect("approve");
}

/// Create a publisher through the engine and return the display row.
pub fn create_publisher(db: &CatalogDb, name: &str, country: &str) -> Publisher {
    let oi = db.indexing();
    let changeset = oi
        .create_changeset(INDEXER, ChangeType::Publisher)
        .expect("changeset");
    let mut revision = PublisherRevision::new_added(
        &changeset,
        PublisherBaseFields {
            name: name.to_string(),
            ..Default::default()
        },
        country,
    );
    revision.persist(&oi).expect("persist revision");
    submit_and_approve(db, &changeset);

    let revision = PublisherRevision::load(&oi, revision.meta.id).expect("reload");
    db.display()
        .get_publisher(revision.publisher_id.expect("bound"))
        .expect("query")
        .expect("publisher exists")
}

/// Create a series through the engine and return the display row.
pub fn create_series(db: &CatalogDb, name: &str, publisher: &Publisher) -> Series {
    create_series_in(db, name, publisher, "us", "en", |_| {})
}

/// Create a series with revision tweaks applied before submission.
pub fn create_series_in<F>(
    db: &CatalogDb,
    name: &str,
    publisher: &Publisher,
    country: &str,
    language: &str,
    tweak: F,
) -> Series
where
    F: FnOnce(&mut SeriesRevision),
{
    let oi = db.indexing();
    let changeset = oi
        .create_changeset(INDEXER, ChangeType::Series)
        .expect("changeset");
    let mut revision =
        SeriesRevision::new_added(&changeset, name, 1990, country, language, publisher.id);
    tweak(&mut revision);
    revision.persist(&oi).expect("persist revision");
    submit_and_approve(db, &changeset);

    let revision = SeriesRevision::load(&oi, revision.meta.id).expect("reload");
    db.display()
        .get_series(revision.series_id.expect("bound"))
        .expect("query")
        .expect("series exists")
}

/// Add one issue to a series through the engine; returns the issue id.
pub fn add_issue(db: &CatalogDb, series_id: i64, number: &str) -> i64 {
    add_issues(db, series_id, &[(number, None)])[0]
}

/// Add several issues in one changeset; `(number, after)` pairs are staged
/// in order with ascending revision sort codes. Returns the issue ids.
pub fn add_issues(db: &CatalogDb, series_id: i64, numbers: &[(&str, Option<i64>)]) -> Vec<i64> {
    let oi = db.indexing();
    let changeset = oi
        .create_changeset(INDEXER, ChangeType::IssueAdd)
        .expect("changeset");
    let mut revision_ids = Vec::new();
    for (index, (number, after)) in numbers.iter().enumerate() {
        let mut revision = IssueRevision::new_added(&changeset, number, series_id);
        revision.after = *after;
        revision.revision_sort_code = Some(index as i64);
        revision.persist(&oi).expect("persist revision");
        revision_ids.push(revision.meta.id);
    }
    submit_and_approve(db, &changeset);

    revision_ids
        .into_iter()
        .map(|id| {
            IssueRevision::load(&oi, id)
                .expect("reload")
                .issue_id
                .expect("bound")
        })
        .collect()
}

/// Sort codes of all issues in a series, in stored order.
pub fn sort_codes(db: &CatalogDb, series_id: i64) -> Vec<i64> {
    db.display()
        .issues_in_series(series_id)
        .expect("query")
        .iter()
        .map(|issue| issue.sort_code)
        .collect()
}

/// Assert the strict sort-code ordering invariant for a series.
pub fn assert_sort_codes_strictly_increasing(db: &CatalogDb, series_id: i64) {
    let codes = sort_codes(db, series_id);
    for pair in codes.windows(2) {
        assert!(
            pair[0] < pair[1],
            "sort codes not strictly increasing: {:?}",
            codes
        );
    }
}
