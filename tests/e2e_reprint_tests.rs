//! End-to-end tests for the polymorphic reprint link revisions and the
//! brand family cascades.

mod common;

use common::*;
use longbox_indexing_server::display::{BondType, EntityKind, ImageType, ReprintKind, StoryKind};
use longbox_indexing_server::indexing::{
    approve_changeset, discard_changeset, BrandGroupRevision, ChangeType, ChangesetState,
    ImageRevision, PublisherBaseFields, ReprintRevision, RevisionError, SeriesBondRevision,
    StoryRevision,
};

/// Two issues with one story each; returns (issue ids, story ids).
fn setup_stories(db: &longbox_indexing_server::CatalogDb) -> (Vec<i64>, Vec<i64>) {
    let publisher = create_publisher(db, "Reprint House", "us");
    let series = create_series(db, "Reprint Comics", &publisher);
    let issues = add_issues(db, series.id, &[("1", None), ("2", None)]);

    let oi = db.indexing();
    let changeset = oi.create_changeset(INDEXER, ChangeType::Issue).unwrap();
    let mut revision_ids = Vec::new();
    for issue_id in &issues {
        let mut story = StoryRevision::new_added(&changeset, StoryKind::ComicStory, 1);
        story.issue = Some(*issue_id);
        story.persist(&oi).unwrap();
        revision_ids.push(story.meta.id);
    }
    submit_and_approve(db, &changeset);

    let stories = revision_ids
        .into_iter()
        .map(|id| {
            StoryRevision::load(&oi, id)
                .unwrap()
                .story_id
                .expect("story bound")
        })
        .collect();
    (issues, stories)
}

#[test]
fn reprint_add_creates_story_to_story_link() {
    let db = open_db();
    let (_issues, stories) = setup_stories(&db);

    let oi = db.indexing();
    let changeset = oi.create_changeset(INDEXER, ChangeType::Reprint).unwrap();
    let mut revision = ReprintRevision::new_added(&changeset);
    revision.origin_story = Some(stories[0]);
    revision.target_story = Some(stories[1]);
    revision.notes = "reprinted from #1".to_string();
    revision.persist(&oi).unwrap();
    let revision_id = revision.meta.id;
    submit_and_approve(&db, &changeset);

    let revision = ReprintRevision::load(&oi, revision_id).unwrap();
    assert_eq!(revision.out_kind, Some(ReprintKind::StoryToStory));
    let link = db
        .display()
        .get_reprint_link(revision.link_id.unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(link.kind, ReprintKind::StoryToStory);
    assert_eq!(link.origin, stories[0]);
    assert_eq!(link.target, stories[1]);
    assert_eq!(link.notes, "reprinted from #1");
}

#[test]
fn reprint_shape_change_replaces_the_concrete_row() {
    let db = open_db();
    let (issues, stories) = setup_stories(&db);

    // Start with a story-to-story link.
    let oi = db.indexing();
    let changeset = oi.create_changeset(INDEXER, ChangeType::Reprint).unwrap();
    let mut revision = ReprintRevision::new_added(&changeset);
    revision.origin_story = Some(stories[0]);
    revision.target_story = Some(stories[1]);
    revision.persist(&oi).unwrap();
    let first_revision_id = revision.meta.id;
    submit_and_approve(&db, &changeset);

    let first_revision = ReprintRevision::load(&oi, first_revision_id).unwrap();
    let old_link_id = first_revision.link_id.unwrap();
    let old_link = db.display().get_reprint_link(old_link_id).unwrap().unwrap();

    // Redirect the target at the whole second issue.
    let changeset = oi.create_changeset(INDEXER, ChangeType::Reprint).unwrap();
    let mut edit = ReprintRevision::clone_from(&oi, &old_link, &changeset).unwrap();
    assert_eq!(edit.in_kind, Some(ReprintKind::StoryToStory));
    edit.target_story = None;
    edit.target_issue = Some(issues[1]);
    edit.persist(&oi).unwrap();
    let edit_id = edit.meta.id;
    submit_and_approve(&db, &changeset);

    // The old concrete row is gone and every sibling revision dropped its
    // reference to it.
    assert!(db.display().get_reprint_link(old_link_id).unwrap().is_none());
    let first_revision = ReprintRevision::load(&oi, first_revision_id).unwrap();
    assert_eq!(first_revision.link_id, None);

    let edit = ReprintRevision::load(&oi, edit_id).unwrap();
    assert_eq!(edit.out_kind, Some(ReprintKind::StoryToIssue));
    let new_link = db
        .display()
        .get_reprint_link(edit.link_id.unwrap())
        .unwrap()
        .unwrap();
    assert_ne!(new_link.id, old_link_id);
    assert_eq!(new_link.kind, ReprintKind::StoryToIssue);
    assert_eq!(new_link.origin, stories[0]);
    assert_eq!(new_link.target, issues[1]);

    // History display still resolves: the superseded revision has no
    // source but does not error.
    assert!(first_revision.source(&db.display()).unwrap().is_none());
}

#[test]
fn reprint_delete_detaches_history() {
    let db = open_db();
    let (_issues, stories) = setup_stories(&db);

    let oi = db.indexing();
    let changeset = oi.create_changeset(INDEXER, ChangeType::Reprint).unwrap();
    let mut revision = ReprintRevision::new_added(&changeset);
    revision.origin_story = Some(stories[0]);
    revision.target_story = Some(stories[1]);
    revision.persist(&oi).unwrap();
    let add_id = revision.meta.id;
    submit_and_approve(&db, &changeset);

    let link = db
        .display()
        .get_reprint_link(
            ReprintRevision::load(&oi, add_id).unwrap().link_id.unwrap(),
        )
        .unwrap()
        .unwrap();

    let changeset = oi.create_changeset(INDEXER, ChangeType::Reprint).unwrap();
    let mut deletion = ReprintRevision::clone_from(&oi, &link, &changeset).unwrap();
    deletion.meta.deleted = true;
    deletion.persist(&oi).unwrap();
    let deletion_id = deletion.meta.id;
    submit_and_approve(&db, &changeset);

    assert!(db.display().get_reprint_link(link.id).unwrap().is_none());
    // The add revision was detached; the delete revision resolves to no
    // source because the link is gone and the changeset approved.
    assert_eq!(ReprintRevision::load(&oi, add_id).unwrap().link_id, None);
    let deletion = ReprintRevision::load(&oi, deletion_id).unwrap();
    assert!(deletion.source(&db.display()).unwrap().is_none());
}

#[test]
fn unique_image_type_allows_only_replacements() {
    let db = open_db();
    let publisher = create_publisher(&db, "Image House", "us");
    let series = create_series(&db, "Image Comics", &publisher);
    let issue_id = add_issue(&db, series.id, "1");

    let oi = db.indexing();
    let changeset = oi.create_changeset(INDEXER, ChangeType::Image).unwrap();
    let mut revision = ImageRevision::new_added(
        &changeset,
        EntityKind::Issue,
        issue_id,
        ImageType::IndiciaScan,
        "scans/1.jpg",
    );
    revision.persist(&oi).unwrap();
    let first_id = revision.meta.id;
    submit_and_approve(&db, &changeset);

    // A second non-replacement upload of a unique type fails validation.
    let changeset = oi.create_changeset(INDEXER, ChangeType::Image).unwrap();
    let mut duplicate = ImageRevision::new_added(
        &changeset,
        EntityKind::Issue,
        issue_id,
        ImageType::IndiciaScan,
        "scans/2.jpg",
    );
    duplicate.persist(&oi).unwrap();
    oi.transition_changeset(changeset.id, ChangesetState::Pending, INDEXER, "submitted")
        .unwrap();
    oi.transition_changeset(changeset.id, ChangesetState::Reviewing, APPROVER, "examining")
        .unwrap();
    let err = approve_changeset(&db, changeset.id, APPROVER).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<RevisionError>(),
        Some(RevisionError::Validation(_))
    ));
    discard_changeset(&db, changeset.id, INDEXER).unwrap();

    // A replacement goes through and the superseded revision keeps the
    // replaced file.
    let image_id = ImageRevision::load(&oi, first_id).unwrap().image_id.unwrap();
    let image = db.display().get_image(image_id).unwrap().unwrap();
    let changeset = oi.create_changeset(INDEXER, ChangeType::Image).unwrap();
    let mut replacement = ImageRevision::clone_from(&oi, &image, &changeset).unwrap();
    replacement.is_replacement = true;
    replacement.image_file = "scans/1-better.jpg".to_string();
    replacement.persist(&oi).unwrap();
    submit_and_approve(&db, &changeset);

    let image = db.display().get_image(image_id).unwrap().unwrap();
    assert_eq!(image.image_file, "scans/1-better.jpg");
    let superseded = ImageRevision::load(&oi, first_id).unwrap();
    assert_eq!(superseded.image_file, "scans/1.jpg");
}

#[test]
fn series_bond_roundtrip_and_delete_detach() {
    let db = open_db();
    let publisher = create_publisher(&db, "Bonded House", "us");
    let origin = create_series(&db, "Original Comics", &publisher);
    let target = create_series(&db, "Continued Comics", &publisher);

    let oi = db.indexing();
    let changeset = oi.create_changeset(INDEXER, ChangeType::SeriesBond).unwrap();
    let mut revision =
        SeriesBondRevision::new_added(&changeset, origin.id, target.id, BondType::Continuation);
    revision.notes = "numbering continues".to_string();
    revision.persist(&oi).unwrap();
    let add_id = revision.meta.id;
    submit_and_approve(&db, &changeset);

    let bond_id = SeriesBondRevision::load(&oi, add_id)
        .unwrap()
        .series_bond_id
        .unwrap();
    let bond = db.display().get_series_bond(bond_id).unwrap().unwrap();
    assert_eq!(bond.origin, origin.id);
    assert_eq!(bond.target, target.id);
    assert_eq!(bond.bond_type, BondType::Continuation);

    let changeset = oi.create_changeset(INDEXER, ChangeType::SeriesBond).unwrap();
    let mut deletion = SeriesBondRevision::clone_from(&oi, &bond, &changeset).unwrap();
    deletion.meta.deleted = true;
    deletion.persist(&oi).unwrap();
    submit_and_approve(&db, &changeset);

    assert!(db.display().get_series_bond(bond_id).unwrap().is_none());
    // The add revision dropped its reference to the vanished bond.
    assert_eq!(SeriesBondRevision::load(&oi, add_id).unwrap().series_bond_id, None);
}

#[test]
fn brand_group_add_cascades_to_brand_and_use() {
    let db = open_db();
    let publisher = create_publisher(&db, "Cascade House", "us");

    let oi = db.indexing();
    let changeset = oi.create_changeset(INDEXER, ChangeType::BrandGroup).unwrap();
    let mut revision = BrandGroupRevision::new_added(
        &changeset,
        PublisherBaseFields {
            name: "Cascade Comics Group".to_string(),
            ..Default::default()
        },
        publisher.id,
    );
    revision.persist(&oi).unwrap();
    let revision_id = revision.meta.id;
    submit_and_approve(&db, &changeset);

    let display = db.display();
    let group_id = BrandGroupRevision::load(&oi, revision_id)
        .unwrap()
        .brand_group_id
        .unwrap();
    let group = display.get_brand_group(group_id).unwrap().unwrap();
    assert_eq!(group.name, "Cascade Comics Group");
    assert_eq!(group.parent, publisher.id);

    // The cascade created the first brand, its group membership, and the
    // first brand use against the group's parent publisher.
    let publisher_row = display.get_publisher(publisher.id).unwrap().unwrap();
    assert_eq!(publisher_row.brand_count, 1);
    assert_eq!(db.stats().get_count("brands", None, None).unwrap(), 1);
    assert_eq!(db.stats().get_count("brand groups", None, None).unwrap(), 0);

    let brand_id: i64 = {
        // The brand is reachable through the group membership.
        let brands: Vec<i64> = (1..=4)
            .filter(|candidate| {
                display
                    .brand_groups_of(*candidate)
                    .map(|groups| groups.contains(&group_id))
                    .unwrap_or(false)
            })
            .collect();
        assert_eq!(brands.len(), 1);
        brands[0]
    };
    let brand = display.get_brand(brand_id).unwrap().unwrap();
    assert_eq!(brand.name, "Cascade Comics Group");
}
