//! End-to-end tests for the statistics engine: cached counts, global
//! buckets, singleton series, publisher transfers, and key moves.

mod common;

use common::*;
use longbox_indexing_server::indexing::{
    ChangeType, IssueRevision, SeriesRevision, StoryRevision,
};
use longbox_indexing_server::display::StoryKind;

#[test]
fn publisher_add_counts_by_country() {
    let db = open_db();
    create_publisher(&db, "US House", "us");
    create_publisher(&db, "German House", "de");
    create_publisher(&db, "Second US House", "us");

    let stats = db.stats();
    assert_eq!(stats.get_count("publishers", Some("us"), None).unwrap(), 2);
    assert_eq!(stats.get_count("publishers", Some("de"), None).unwrap(), 1);
}

#[test]
fn singleton_series_add_creates_placeholder_issue() {
    let db = open_db();
    let publisher = create_publisher(&db, "Singleton House", "us");
    let series = create_series_in(&db, "One Shot", &publisher, "us", "en", |rev| {
        rev.is_singleton = true;
    });

    let issues = db.display().issues_in_series(series.id).unwrap();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].number, "[nn]");
    assert_eq!(issues[0].sort_code, 0);
    assert_eq!(issues[0].key_date, "1990-00-00");

    let series_row = db.display().get_series(series.id).unwrap().unwrap();
    assert!(series_row.is_singleton);
    assert_eq!(series_row.issue_count, 1);

    // The placeholder is counted exactly once.
    assert_eq!(
        db.stats()
            .get_count("issues", Some("us"), Some("en"))
            .unwrap(),
        1
    );
    assert_eq!(
        db.display()
            .get_publisher(publisher.id)
            .unwrap()
            .unwrap()
            .issue_count,
        1
    );
}

#[test]
fn singleton_series_delete_nets_exactly_minus_one_issue() {
    let db = open_db();
    let publisher = create_publisher(&db, "Ephemeral House", "us");
    let series = create_series_in(&db, "Gone Tomorrow", &publisher, "us", "en", |rev| {
        rev.is_singleton = true;
    });
    assert_eq!(
        db.stats()
            .get_count("issues", Some("us"), Some("en"))
            .unwrap(),
        1
    );

    let oi = db.indexing();
    let display = db.display();
    let series_row = display.get_series(series.id).unwrap().unwrap();
    let changeset = oi.create_changeset(INDEXER, ChangeType::Series).unwrap();
    let mut revision = SeriesRevision::clone_from(&display, &oi, &series_row, &changeset).unwrap();
    revision.meta.deleted = true;
    revision.persist(&oi).unwrap();
    submit_and_approve(&db, &changeset);

    assert!(display.get_series(series.id).unwrap().is_none());
    assert_eq!(
        db.stats()
            .get_count("issues", Some("us"), Some("en"))
            .unwrap(),
        0
    );
    assert_eq!(
        db.stats()
            .get_count("series", Some("us"), Some("en"))
            .unwrap(),
        0
    );
    let publisher_row = display.get_publisher(publisher.id).unwrap().unwrap();
    assert_eq!(publisher_row.issue_count, 0);
    assert_eq!(publisher_row.series_count, 0);
}

#[test]
fn series_publisher_move_transfers_cached_counts() {
    let db = open_db();
    let origin = create_publisher(&db, "Origin House", "us");
    let target = create_publisher(&db, "Target House", "us");
    let series = create_series(&db, "Wandering Comics", &origin);
    add_issues(&db, series.id, &[("1", None), ("2", None)]);

    let oi = db.indexing();
    let display = db.display();
    let series_row = display.get_series(series.id).unwrap().unwrap();
    let changeset = oi.create_changeset(INDEXER, ChangeType::Series).unwrap();
    let mut revision = SeriesRevision::clone_from(&display, &oi, &series_row, &changeset).unwrap();
    revision.publisher = target.id;
    revision.persist(&oi).unwrap();
    submit_and_approve(&db, &changeset);

    let origin_row = display.get_publisher(origin.id).unwrap().unwrap();
    let target_row = display.get_publisher(target.id).unwrap().unwrap();
    assert_eq!(origin_row.series_count, 0);
    assert_eq!(origin_row.issue_count, 0);
    assert_eq!(target_row.series_count, 1);
    assert_eq!(target_row.issue_count, 2);

    // The global bucket is untouched by a same-country move.
    assert_eq!(
        db.stats()
            .get_count("issues", Some("us"), Some("en"))
            .unwrap(),
        2
    );
}

#[test]
fn series_key_move_relocates_the_whole_subtree() {
    let db = open_db();
    let publisher = create_publisher(&db, "Translated House", "us");
    let series = create_series(&db, "Translated Comics", &publisher);
    let ids = add_issues(&db, series.id, &[("1", None), ("2", None)]);

    // One story so the subtree carries more than issues.
    let oi = db.indexing();
    let changeset = oi.create_changeset(INDEXER, ChangeType::Issue).unwrap();
    let mut story = StoryRevision::new_added(&changeset, StoryKind::ComicStory, 1);
    story.issue = Some(ids[0]);
    story.persist(&oi).unwrap();
    submit_and_approve(&db, &changeset);

    let display = db.display();
    let series_row = display.get_series(series.id).unwrap().unwrap();
    let changeset = oi.create_changeset(INDEXER, ChangeType::Series).unwrap();
    let mut revision = SeriesRevision::clone_from(&display, &oi, &series_row, &changeset).unwrap();
    revision.country = "de".to_string();
    revision.language = "de".to_string();
    revision.persist(&oi).unwrap();
    submit_and_approve(&db, &changeset);

    let stats = db.stats();
    assert_eq!(stats.get_count("series", Some("us"), Some("en")).unwrap(), 0);
    assert_eq!(stats.get_count("issues", Some("us"), Some("en")).unwrap(), 0);
    assert_eq!(stats.get_count("stories", Some("us"), Some("en")).unwrap(), 0);
    assert_eq!(
        stats.get_count("issue indexes", Some("us"), Some("en")).unwrap(),
        0
    );
    assert_eq!(stats.get_count("series", Some("de"), Some("de")).unwrap(), 1);
    assert_eq!(stats.get_count("issues", Some("de"), Some("de")).unwrap(), 2);
    assert_eq!(stats.get_count("stories", Some("de"), Some("de")).unwrap(), 1);
    assert_eq!(
        stats.get_count("issue indexes", Some("de"), Some("de")).unwrap(),
        1
    );
}

#[test]
fn comics_publication_flag_drives_global_counting() {
    let db = open_db();
    let publisher = create_publisher(&db, "Flagged House", "us");
    let series = create_series(&db, "Flagged Comics", &publisher);
    add_issues(&db, series.id, &[("1", None), ("2", None)]);

    let stats = db.stats();
    assert_eq!(stats.get_count("series", Some("us"), Some("en")).unwrap(), 1);
    assert_eq!(stats.get_count("issues", Some("us"), Some("en")).unwrap(), 2);

    let oi = db.indexing();
    let display = db.display();
    let series_row = display.get_series(series.id).unwrap().unwrap();
    let changeset = oi.create_changeset(INDEXER, ChangeType::Series).unwrap();
    let mut revision = SeriesRevision::clone_from(&display, &oi, &series_row, &changeset).unwrap();
    revision.is_comics_publication = false;
    revision.persist(&oi).unwrap();
    submit_and_approve(&db, &changeset);

    // The subtree leaves the global buckets but cached counts remain.
    assert_eq!(stats.get_count("series", Some("us"), Some("en")).unwrap(), 0);
    assert_eq!(stats.get_count("issues", Some("us"), Some("en")).unwrap(), 0);
    let publisher_row = display.get_publisher(publisher.id).unwrap().unwrap();
    assert_eq!(publisher_row.series_count, 0);
    let series_row = display.get_series(series.id).unwrap().unwrap();
    assert_eq!(series_row.issue_count, 2);
}

#[test]
fn story_commits_drive_issue_index_status() {
    let db = open_db();
    let publisher = create_publisher(&db, "Indexed House", "us");
    let series = create_series(&db, "Indexed Comics", &publisher);
    let issue_id = add_issue(&db, series.id, "1");

    let display = db.display();
    assert_eq!(
        display.get_issue(issue_id).unwrap().unwrap().is_indexed,
        longbox_indexing_server::display::IndexedStatus::Skeleton
    );

    let oi = db.indexing();
    let changeset = oi.create_changeset(INDEXER, ChangeType::Issue).unwrap();
    let mut story = StoryRevision::new_added(&changeset, StoryKind::ComicStory, 1);
    story.issue = Some(issue_id);
    story.title = "Origin Story".to_string();
    story.persist(&oi).unwrap();
    let story_revision_id = story.meta.id;
    submit_and_approve(&db, &changeset);

    assert_eq!(
        display.get_issue(issue_id).unwrap().unwrap().is_indexed,
        longbox_indexing_server::display::IndexedStatus::Full
    );
    let stats = db.stats();
    assert_eq!(stats.get_count("stories", Some("us"), Some("en")).unwrap(), 1);
    assert_eq!(
        stats.get_count("issue indexes", Some("us"), Some("en")).unwrap(),
        1
    );

    // Deleting the story drops the issue back to a skeleton.
    let story_revision = StoryRevision::load(&oi, story_revision_id).unwrap();
    let story_row = display
        .get_story(story_revision.story_id.unwrap())
        .unwrap()
        .unwrap();
    let changeset = oi.create_changeset(INDEXER, ChangeType::Issue).unwrap();
    let mut deletion = StoryRevision::clone_from(&display, &oi, &story_row, &changeset).unwrap();
    deletion.meta.deleted = true;
    deletion.persist(&oi).unwrap();
    submit_and_approve(&db, &changeset);

    assert_eq!(
        display.get_issue(issue_id).unwrap().unwrap().is_indexed,
        longbox_indexing_server::display::IndexedStatus::Skeleton
    );
    assert_eq!(stats.get_count("stories", Some("us"), Some("en")).unwrap(), 0);
    assert_eq!(
        stats.get_count("issue indexes", Some("us"), Some("en")).unwrap(),
        0
    );
}

#[test]
fn variant_issues_count_separately() {
    let db = open_db();
    let publisher = create_publisher(&db, "Variant House", "us");
    let series = create_series(&db, "Variant Comics", &publisher);
    let base = add_issue(&db, series.id, "1");

    let oi = db.indexing();
    let changeset = oi.create_changeset(INDEXER, ChangeType::VariantAdd).unwrap();
    let mut variant = IssueRevision::new_added(&changeset, "1", series.id);
    variant.variant_of = Some(base);
    variant.variant_name = "second printing".to_string();
    variant.persist(&oi).unwrap();
    submit_and_approve(&db, &changeset);

    let stats = db.stats();
    assert_eq!(stats.get_count("issues", Some("us"), Some("en")).unwrap(), 1);
    assert_eq!(
        stats
            .get_count("variant issues", Some("us"), Some("en"))
            .unwrap(),
        1
    );

    // Variants do not inflate the cached issue counts.
    let series_row = db.display().get_series(series.id).unwrap().unwrap();
    assert_eq!(series_row.issue_count, 1);
    assert_eq!(
        db.display()
            .get_publisher(publisher.id)
            .unwrap()
            .unwrap()
            .issue_count,
        1
    );
}

#[test]
fn ongoing_reservation_keeps_new_issues_reserved() {
    let db = open_db();
    let publisher = create_publisher(&db, "Reserved House", "us");
    let series = create_series_in(&db, "Reserved Comics", &publisher, "us", "en", |rev| {
        rev.reservation_requested = true;
        rev.is_current = true;
    });

    let oi = db.indexing();
    let reservation = oi.ongoing_reservation_for(series.id).unwrap().unwrap();
    assert_eq!(reservation.indexer, INDEXER);

    let issue_id = add_issue(&db, series.id, "1");
    let issue = db.display().get_issue(issue_id).unwrap().unwrap();
    assert!(issue.reserved);

    // Turning off is_current releases the standing claim.
    let display = db.display();
    let series_row = display.get_series(series.id).unwrap().unwrap();
    let changeset = oi.create_changeset(INDEXER, ChangeType::Series).unwrap();
    let mut revision = SeriesRevision::clone_from(&display, &oi, &series_row, &changeset).unwrap();
    revision.is_current = false;
    revision.persist(&oi).unwrap();
    submit_and_approve(&db, &changeset);
    assert!(oi.ongoing_reservation_for(series.id).unwrap().is_none());
}
