//! The revision engine ("OI", online indexing): changesets, revision locks,
//! field classification, per-entity revisions, the commit pipeline, and the
//! statistics ledger.

pub mod changeset;
pub mod cover;
pub mod fields;
pub mod image;
pub mod issue;
pub mod publisher;
pub mod reprint;
pub mod revision;
pub mod schema;
pub mod series;
pub mod series_bond;
pub mod state;
pub mod stats;
pub mod story;

pub use changeset::{Changeset, ChangesetComment, IndexingStore, OngoingReservation};
pub use cover::CoverRevision;
pub use fields::{classify_fields, FieldClassification};
pub use image::ImageRevision;
pub use issue::IssueRevision;
pub use publisher::{
    BrandGroupRevision, BrandRevision, BrandUseRevision, IndiciaPublisherRevision,
    PublisherBaseFields, PublisherRevision,
};
pub use reprint::ReprintRevision;
pub use revision::{
    commit_revision, CommitContext, RevisionCommit, RevisionError, RevisionMeta,
};
pub use series::SeriesRevision;
pub use series_bond::SeriesBondRevision;
pub use state::{ChangeType, ChangesetAction, ChangesetState};
pub use stats::{CountMap, StatsBucket, StatsLedger};
pub use story::StoryRevision;

use crate::db::CatalogDb;
use anyhow::Result;
use revision::Changes;
use serde_json::json;
use tracing::info;

fn commit_kind<R: RevisionCommit>(
    ctx: &CommitContext,
    label: &str,
    ids: Vec<i64>,
    load: fn(&IndexingStore, i64) -> Result<R>,
    summaries: &mut Vec<serde_json::Value>,
) -> Result<()> {
    for id in ids {
        let mut revision = load(ctx.oi, id)?;
        // Cross-revision prerequisites may have committed this one already.
        if !revision.meta().open() {
            continue;
        }
        let changes: Changes = commit_revision(&mut revision, ctx)?;
        summaries.push(json!({
            "kind": label,
            "revision": id,
            "changes": changes.to_json(),
        }));
    }
    Ok(())
}

/// Commit order over the entity kinds: parents before children, links and
/// images last.
const KIND_ORDER: [&str; 12] = [
    "publisher",
    "indicia_publisher",
    "brand_group",
    "brand",
    "brand_use",
    "series",
    "series_bond",
    "issue",
    "story",
    "cover",
    "reprint",
    "image",
];

fn commit_kind_by_label(
    ctx: &CommitContext,
    label: &str,
    changeset_id: i64,
    summaries: &mut Vec<serde_json::Value>,
) -> Result<()> {
    match label {
        "publisher" => commit_kind(
            ctx,
            label,
            PublisherRevision::open_ids(ctx.oi, changeset_id)?,
            PublisherRevision::load,
            summaries,
        ),
        "indicia_publisher" => commit_kind(
            ctx,
            label,
            IndiciaPublisherRevision::open_ids(ctx.oi, changeset_id)?,
            IndiciaPublisherRevision::load,
            summaries,
        ),
        "brand_group" => commit_kind(
            ctx,
            label,
            BrandGroupRevision::open_ids(ctx.oi, changeset_id)?,
            BrandGroupRevision::load,
            summaries,
        ),
        "brand" => commit_kind(
            ctx,
            label,
            BrandRevision::open_ids(ctx.oi, changeset_id)?,
            BrandRevision::load,
            summaries,
        ),
        "brand_use" => commit_kind(
            ctx,
            label,
            BrandUseRevision::open_ids(ctx.oi, changeset_id)?,
            BrandUseRevision::load,
            summaries,
        ),
        "series" => commit_kind(
            ctx,
            label,
            SeriesRevision::open_ids(ctx.oi, changeset_id)?,
            SeriesRevision::load,
            summaries,
        ),
        "series_bond" => commit_kind(
            ctx,
            label,
            SeriesBondRevision::open_ids(ctx.oi, changeset_id)?,
            SeriesBondRevision::load,
            summaries,
        ),
        "issue" => commit_kind(
            ctx,
            label,
            IssueRevision::open_ids(ctx.oi, changeset_id)?,
            IssueRevision::load,
            summaries,
        ),
        "story" => commit_kind(
            ctx,
            label,
            StoryRevision::open_ids(ctx.oi, changeset_id)?,
            StoryRevision::load,
            summaries,
        ),
        "cover" => commit_kind(
            ctx,
            label,
            CoverRevision::open_ids(ctx.oi, changeset_id)?,
            CoverRevision::load,
            summaries,
        ),
        "reprint" => commit_kind(
            ctx,
            label,
            ReprintRevision::open_ids(ctx.oi, changeset_id)?,
            ReprintRevision::load,
            summaries,
        ),
        _ => commit_kind(
            ctx,
            label,
            ImageRevision::open_ids(ctx.oi, changeset_id)?,
            ImageRevision::load,
            summaries,
        ),
    }
}

/// Approve a changeset: commit every open revision to display in
/// changeset-internal dependency order, record the approval comment with
/// the applied field changes, and release the locks.
///
/// Each revision's persistence is individually transactional; a failure
/// partway leaves earlier revisions committed.
pub fn approve_changeset(db: &CatalogDb, changeset_id: i64, approver: &str) -> Result<Changeset> {
    let display = db.display();
    let oi = db.indexing();
    let stats = db.stats();

    let changeset = oi.get_changeset(changeset_id)?;
    if !changeset.state.can_transition_to(ChangesetState::Approved) {
        return Err(RevisionError::Validation(format!(
            "changeset {} in state {} cannot be approved",
            changeset_id,
            changeset.state.to_db_str()
        ))
        .into());
    }
    oi.set_approver(changeset_id, approver)?;

    let ctx = CommitContext {
        display: &display,
        oi: &oi,
        stats: &stats,
        changeset: &changeset,
        clear_reservation: true,
    };
    let delete_changeset = oi.changeset_action(changeset_id)? == ChangesetAction::Delete;

    // Deletions unwind bottom-up: children before the rows they hang off.
    let mut order: Vec<&str> = KIND_ORDER.to_vec();
    if delete_changeset {
        order.reverse();
    }

    let mut summaries: Vec<serde_json::Value> = Vec::new();
    for label in order {
        commit_kind_by_label(&ctx, label, changeset_id, &mut summaries)?;
    }

    let field_changes = json!(summaries);
    let approved = oi.transition_changeset(
        changeset_id,
        ChangesetState::Approved,
        approver,
        "approved",
    )?;
    oi.record_approval_changes(changeset_id, &field_changes)?;
    oi.release_changeset_locks(changeset_id)?;
    info!(
        "Approved changeset {} with {} revisions",
        changeset_id,
        summaries.len()
    );
    Ok(approved)
}

/// Discard a changeset: drop every open revision and release the locks.
pub fn discard_changeset(db: &CatalogDb, changeset_id: i64, by: &str) -> Result<Changeset> {
    let oi = db.indexing();
    let changeset = oi.get_changeset(changeset_id)?;
    if !changeset.state.can_transition_to(ChangesetState::Discarded) {
        return Err(RevisionError::Validation(format!(
            "changeset {} in state {} cannot be discarded",
            changeset_id,
            changeset.state.to_db_str()
        ))
        .into());
    }
    oi.discard_open_revisions(changeset_id)?;
    let discarded =
        oi.transition_changeset(changeset_id, ChangesetState::Discarded, by, "discarded")?;
    oi.release_changeset_locks(changeset_id)?;
    info!("Discarded changeset {}", changeset_id);
    Ok(discarded)
}
