//! End-to-end tests for the changeset workflow: locks, discard, round-trip
//! commits, and comments.

mod common;

use common::*;
use longbox_indexing_server::display::EntityKind;
use longbox_indexing_server::indexing::{
    discard_changeset, ChangeType, ChangesetState, IssueRevision, RevisionError, SeriesRevision,
};
use longbox_indexing_server::CatalogDb;

#[test]
fn on_disk_database_reopens_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.db");
    {
        let db = CatalogDb::open(&path).unwrap();
        create_publisher(&db, "Persistent House", "us");
    }

    let db = CatalogDb::open(&path).unwrap();
    db.validate_schema().unwrap();
    assert_eq!(
        db.stats().get_count("publishers", Some("us"), None).unwrap(),
        1
    );
    db.display().verify_cached_counts().unwrap();
}

#[test]
fn clone_and_commit_without_edits_is_a_noop() {
    let db = open_db();
    let publisher = create_publisher(&db, "Eclipse House", "us");
    let series = create_series(&db, "Noop Comics", &publisher);
    let issue_id = add_issue(&db, series.id, "1");

    let before_issue = db.display().get_issue(issue_id).unwrap().unwrap();
    let before_series = db.display().get_series(series.id).unwrap().unwrap();
    let before_stat = db
        .stats()
        .get_count("issues", Some("us"), Some("en"))
        .unwrap();

    // Clone, change nothing, approve.
    let oi = db.indexing();
    let changeset = oi.create_changeset(INDEXER, ChangeType::Issue).unwrap();
    IssueRevision::clone_from(&db.display(), &oi, &before_issue, &changeset).unwrap();
    submit_and_approve(&db, &changeset);

    let after_issue = db.display().get_issue(issue_id).unwrap().unwrap();
    let after_series = db.display().get_series(series.id).unwrap().unwrap();
    assert_eq!(after_issue.number, before_issue.number);
    assert_eq!(after_issue.sort_code, before_issue.sort_code);
    assert_eq!(after_issue.isbn, before_issue.isbn);
    assert_eq!(after_series.issue_count, before_series.issue_count);
    assert_eq!(
        db.stats()
            .get_count("issues", Some("us"), Some("en"))
            .unwrap(),
        before_stat
    );
}

#[test]
fn second_changeset_cannot_lock_a_reserved_row() {
    let db = open_db();
    let publisher = create_publisher(&db, "Locked House", "us");
    let series = create_series(&db, "Contended Comics", &publisher);

    let oi = db.indexing();
    let display = db.display();
    let series_row = display.get_series(series.id).unwrap().unwrap();

    let first = oi.create_changeset("anna", ChangeType::Series).unwrap();
    SeriesRevision::clone_from(&display, &oi, &series_row, &first).unwrap();

    let second = oi.create_changeset("carol", ChangeType::Series).unwrap();
    let err = SeriesRevision::clone_from(&display, &oi, &series_row, &second).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<RevisionError>(),
        Some(RevisionError::Locked { kind: EntityKind::Series, .. })
    ));
}

#[test]
fn discard_drops_revisions_and_releases_locks() {
    let db = open_db();
    let publisher = create_publisher(&db, "Discard House", "us");
    let series = create_series(&db, "Abandoned Comics", &publisher);

    let oi = db.indexing();
    let display = db.display();
    let series_row = display.get_series(series.id).unwrap().unwrap();

    let first = oi.create_changeset("anna", ChangeType::Series).unwrap();
    let mut revision = SeriesRevision::clone_from(&display, &oi, &series_row, &first).unwrap();
    revision.name = "Renamed Comics".to_string();
    revision.persist(&oi).unwrap();

    discard_changeset(&db, first.id, "anna").unwrap();

    // The display row is untouched and the revision is marked discarded.
    let unchanged = display.get_series(series.id).unwrap().unwrap();
    assert_eq!(unchanged.name, "Abandoned Comics");
    let revision = SeriesRevision::load(&oi, revision.meta.id).unwrap();
    assert_eq!(revision.meta.committed, Some(false));
    assert!(revision.meta.discarded());

    // The lock is free again.
    let second = oi.create_changeset("carol", ChangeType::Series).unwrap();
    SeriesRevision::clone_from(&display, &oi, &series_row, &second).unwrap();
}

#[test]
fn approval_records_comment_with_field_changes() {
    let db = open_db();
    let publisher = create_publisher(&db, "Comment House", "us");

    let oi = db.indexing();
    let comments = {
        // The publisher add went through the full workflow; its changeset
        // is the first one.
        let changeset = oi.get_changeset(1).unwrap();
        assert_eq!(changeset.state, ChangesetState::Approved);
        assert_eq!(changeset.approver.as_deref(), Some(APPROVER));
        oi.comments_of(changeset.id).unwrap()
    };

    assert_eq!(comments.len(), 3);
    assert_eq!(comments[2].new_state, ChangesetState::Approved);
    let field_changes = comments[2].field_changes.as_ref().unwrap();
    let entries = field_changes.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["kind"], "publisher");
    assert_eq!(entries[0]["changes"]["country changed"], true);

    let _ = publisher;
}

#[test]
fn approved_changeset_cannot_be_discarded() {
    let db = open_db();
    create_publisher(&db, "Final House", "us");

    let err = discard_changeset(&db, 1, "anna").unwrap_err();
    assert!(matches!(
        err.downcast_ref::<RevisionError>(),
        Some(RevisionError::Validation(_))
    ));
}

#[test]
fn revision_chain_links_successive_edits() {
    let db = open_db();
    let publisher = create_publisher(&db, "Chained House", "us");
    let series = create_series(&db, "Chained Comics", &publisher);

    let oi = db.indexing();
    let display = db.display();

    let first_edit = {
        let row = display.get_series(series.id).unwrap().unwrap();
        let changeset = oi.create_changeset(INDEXER, ChangeType::Series).unwrap();
        let mut revision = SeriesRevision::clone_from(&display, &oi, &row, &changeset).unwrap();
        revision.notes = "first pass".to_string();
        revision.persist(&oi).unwrap();
        submit_and_approve(&db, &changeset);
        revision.meta.id
    };

    let row = display.get_series(series.id).unwrap().unwrap();
    let changeset = oi.create_changeset(INDEXER, ChangeType::Series).unwrap();
    let second = SeriesRevision::clone_from(&display, &oi, &row, &changeset).unwrap();

    // The chain points at the latest approved revision, not the original.
    assert_eq!(second.meta.previous_revision, Some(first_edit));
}
