//! End-to-end tests for issue ordering: sort-code assignment, space-making,
//! multi-issue adds, and the structural pre-commit checks.

mod common;

use common::*;
use longbox_indexing_server::indexing::{
    approve_changeset, ChangeType, ChangesetState, IssueRevision, RevisionError,
};

#[test]
fn first_issue_gets_sort_code_zero() {
    let db = open_db();
    let publisher = create_publisher(&db, "Ordinal House", "us");
    let series = create_series(&db, "Ordinal Comics", &publisher);

    let issue_id = add_issue(&db, series.id, "1");

    let issue = db.display().get_issue(issue_id).unwrap().unwrap();
    assert_eq!(issue.sort_code, 0);

    let series_row = db.display().get_series(series.id).unwrap().unwrap();
    assert_eq!(series_row.issue_count, 1);
    assert_eq!(series_row.first_issue, Some(issue_id));
    assert_eq!(series_row.last_issue, Some(issue_id));

    let publisher_row = db.display().get_publisher(publisher.id).unwrap().unwrap();
    assert_eq!(publisher_row.issue_count, 1);

    assert_eq!(
        db.stats()
            .get_count("issues", Some("us"), Some("en"))
            .unwrap(),
        1
    );
}

#[test]
fn two_adds_in_one_changeset_get_sequential_codes() {
    let db = open_db();
    let publisher = create_publisher(&db, "Sequential House", "us");
    let series = create_series(&db, "Sequential Comics", &publisher);

    let ids = add_issues(&db, series.id, &[("1", None), ("2", None)]);

    assert_eq!(sort_codes(&db, series.id), vec![0, 1]);
    let first = db.display().get_issue(ids[0]).unwrap().unwrap();
    let second = db.display().get_issue(ids[1]).unwrap().unwrap();
    assert_eq!(first.number, "1");
    assert_eq!(first.sort_code, 0);
    assert_eq!(second.number, "2");
    assert_eq!(second.sort_code, 1);

    let series_row = db.display().get_series(series.id).unwrap().unwrap();
    assert_eq!(series_row.issue_count, 2);
    assert_eq!(series_row.first_issue, Some(ids[0]));
    assert_eq!(series_row.last_issue, Some(ids[1]));
}

#[test]
fn insert_in_the_middle_shifts_later_issues_exactly_once() {
    let db = open_db();
    let publisher = create_publisher(&db, "Middle House", "us");
    let series = create_series(&db, "Middle Comics", &publisher);

    let existing = add_issues(&db, series.id, &[("1", None), ("2", None), ("3", None)]);
    assert_eq!(sort_codes(&db, series.id), vec![0, 1, 2]);

    // Two issues inserted after #1, in one changeset. The later block must
    // shift by two, once, despite both revisions running the space check.
    add_issues(&db, series.id, &[("1a", Some(existing[0])), ("1b", None)]);

    assert_sort_codes_strictly_increasing(&db, series.id);
    let issues = db.display().issues_in_series(series.id).unwrap();
    let ordered_numbers: Vec<&str> = issues.iter().map(|i| i.number.as_str()).collect();
    assert_eq!(ordered_numbers, vec!["1", "1a", "1b", "2", "3"]);
    assert_eq!(sort_codes(&db, series.id), vec![0, 1, 2, 3, 4]);
}

#[test]
fn insert_at_the_beginning_shifts_everything() {
    let db = open_db();
    let publisher = create_publisher(&db, "Prefix House", "us");
    let series = create_series(&db, "Prefix Comics", &publisher);

    add_issues(&db, series.id, &[("1", None), ("2", None)]);
    add_issues(&db, series.id, &[("0", None)]);

    let issues = db.display().issues_in_series(series.id).unwrap();
    let ordered_numbers: Vec<&str> = issues.iter().map(|i| i.number.as_str()).collect();
    assert_eq!(ordered_numbers, vec!["0", "1", "2"]);
    assert_eq!(sort_codes(&db, series.id), vec![0, 1, 2]);
}

#[test]
fn only_one_after_per_series_is_allowed() {
    let db = open_db();
    let publisher = create_publisher(&db, "After House", "us");
    let series = create_series(&db, "After Comics", &publisher);
    let existing = add_issues(&db, series.id, &[("1", None), ("2", None)]);

    let oi = db.indexing();
    let changeset = oi.create_changeset(INDEXER, ChangeType::IssueAdd).unwrap();
    for (index, number) in ["1a", "1b"].iter().enumerate() {
        let mut revision = IssueRevision::new_added(&changeset, number, series.id);
        revision.after = Some(existing[0]);
        revision.revision_sort_code = Some(index as i64);
        revision.persist(&oi).unwrap();
    }
    oi.transition_changeset(changeset.id, ChangesetState::Pending, INDEXER, "submitted")
        .unwrap();
    oi.transition_changeset(changeset.id, ChangesetState::Reviewing, APPROVER, "examining")
        .unwrap();

    let err = approve_changeset(&db, changeset.id, APPROVER).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<RevisionError>(),
        Some(RevisionError::Validation(_))
    ));
}

#[test]
fn after_must_sit_on_the_lowest_revision_sort_code() {
    let db = open_db();
    let publisher = create_publisher(&db, "Lowest House", "us");
    let series = create_series(&db, "Lowest Comics", &publisher);
    let existing = add_issues(&db, series.id, &[("1", None)]);

    let oi = db.indexing();
    let changeset = oi.create_changeset(INDEXER, ChangeType::IssueAdd).unwrap();
    let mut first = IssueRevision::new_added(&changeset, "1a", series.id);
    first.revision_sort_code = Some(0);
    first.persist(&oi).unwrap();
    // The 'after' sits on the SECOND revision, which is invalid.
    let mut second = IssueRevision::new_added(&changeset, "1b", series.id);
    second.after = Some(existing[0]);
    second.revision_sort_code = Some(1);
    second.persist(&oi).unwrap();

    oi.transition_changeset(changeset.id, ChangesetState::Pending, INDEXER, "submitted")
        .unwrap();
    oi.transition_changeset(changeset.id, ChangesetState::Reviewing, APPROVER, "examining")
        .unwrap();

    let err = approve_changeset(&db, changeset.id, APPROVER).unwrap_err();
    let validation = err.downcast_ref::<RevisionError>().unwrap();
    assert!(matches!(validation, RevisionError::Validation(_)));
    assert!(validation.to_string().contains("lowest"));
}

#[test]
fn issue_delete_keeps_ordering_dense_enough() {
    let db = open_db();
    let publisher = create_publisher(&db, "Deletion House", "us");
    let series = create_series(&db, "Deletion Comics", &publisher);
    let ids = add_issues(&db, series.id, &[("1", None), ("2", None), ("3", None)]);

    let oi = db.indexing();
    let display = db.display();
    let middle = display.get_issue(ids[1]).unwrap().unwrap();
    let changeset = oi.create_changeset(INDEXER, ChangeType::Issue).unwrap();
    let mut revision = IssueRevision::clone_from(&display, &oi, &middle, &changeset).unwrap();
    revision.meta.deleted = true;
    revision.persist(&oi).unwrap();
    submit_and_approve(&db, &changeset);

    assert!(display.get_issue(ids[1]).unwrap().is_none());
    assert_sort_codes_strictly_increasing(&db, series.id);

    let series_row = display.get_series(series.id).unwrap().unwrap();
    assert_eq!(series_row.issue_count, 2);
    assert_eq!(series_row.first_issue, Some(ids[0]));
    assert_eq!(series_row.last_issue, Some(ids[2]));
    assert_eq!(
        db.stats()
            .get_count("issues", Some("us"), Some("en"))
            .unwrap(),
        2
    );
}

#[test]
fn conditional_fields_resync_when_series_flag_is_off() {
    let db = open_db();
    let publisher = create_publisher(&db, "Conditional House", "us");
    let series = create_series_in(&db, "Conditional Comics", &publisher, "us", "en", |rev| {
        rev.has_isbn = false;
        rev.has_barcode = false;
    });
    let issue_id = add_issue(&db, series.id, "1");

    let oi = db.indexing();
    let display = db.display();
    let issue = display.get_issue(issue_id).unwrap().unwrap();
    let changeset = oi.create_changeset(INDEXER, ChangeType::Issue).unwrap();
    let mut revision = IssueRevision::clone_from(&display, &oi, &issue, &changeset).unwrap();
    revision.isbn = "978-0-306-40615-7".to_string();
    revision.barcode = "0123456789".to_string();
    revision.price = "$2.99".to_string();
    revision.persist(&oi).unwrap();
    let revision_id = revision.meta.id;
    submit_and_approve(&db, &changeset);

    // The inactive fields were not copied; the active one was.
    let committed = display.get_issue(issue_id).unwrap().unwrap();
    assert_eq!(committed.isbn, "");
    assert_eq!(committed.valid_isbn, "");
    assert_eq!(committed.barcode, "");
    assert_eq!(committed.price, "$2.99");

    // And the revision was forcibly re-synced from the display row.
    let revision = IssueRevision::load(&oi, revision_id).unwrap();
    assert_eq!(revision.isbn, "");
    assert_eq!(revision.barcode, "");
}
