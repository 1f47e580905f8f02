//! The generic revision machinery: common revision state, change
//! classification over declared field paths, the statistics adjustment
//! algorithm, and the ordered commit pipeline.
//!
//! Entity kinds implement [`RevisionCommit`]; the pipeline in
//! [`commit_revision`] owns the stage ordering and calls back into the
//! entity for the typed work (field assignment, creation, deletion).

use super::changeset::{Changeset, IndexingStore};
use super::stats::{needs_retract_reapply, CountMap, StatsBucket, StatsLedger};
use crate::display::{DisplayStore, EntityKind};
use anyhow::Result;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::debug;

/// Error taxonomy of the revision engine.
///
/// `Validation` failures abort a commit before any mutation and are
/// correctable by resubmission; everything else indicates a fault the
/// moderation surface should have prevented and is never retried.
#[derive(Debug, Error)]
pub enum RevisionError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("data integrity fault: {0}")]
    DataIntegrity(String),
    #[error("prerequisite resolution did not reduce the pending set")]
    PrerequisiteLoop,
    #[error("{kind:?} row {id} is locked by another changeset")]
    Locked { kind: EntityKind, id: i64 },
    #[error("no {what} with id {id}")]
    NotFound { what: &'static str, id: i64 },
}

/// Which side of an edit a value is resolved from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Side {
    /// The display object graph as it stood before this commit.
    Old,
    /// The revision's proposed values.
    New,
}

/// A value resolved from a tracked field path.
///
/// `Absent` is the sentinel for a missing root: the old side of an add or
/// the new side of a delete legitimately has no value at all.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Absent,
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    Ref(i64),
    RefSet(BTreeSet<i64>),
}

impl FieldValue {
    pub fn from_opt_ref(id: Option<i64>) -> Self {
        match id {
            Some(id) => FieldValue::Ref(id),
            None => FieldValue::Null,
        }
    }

    /// Boolean view with absent/null treated as false.
    fn as_bool(&self) -> bool {
        matches!(self, FieldValue::Bool(true))
    }

    fn is_bool(&self) -> bool {
        matches!(self, FieldValue::Bool(_))
    }

    /// Referenced ids, for parent adjustment. Multi-valued paths yield the
    /// whole set; scalar refs yield one; everything else none.
    pub fn ref_ids(&self) -> Vec<i64> {
        match self {
            FieldValue::Ref(id) => vec![*id],
            FieldValue::RefSet(ids) => ids.iter().copied().collect(),
            _ => Vec::new(),
        }
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Absent | FieldValue::Null => serde_json::Value::Null,
            FieldValue::Bool(b) => json!(b),
            FieldValue::Int(i) => json!(i),
            FieldValue::Text(s) => json!(s),
            FieldValue::Ref(id) => json!(id),
            FieldValue::RefSet(ids) => json!(ids.iter().collect::<Vec<_>>()),
        }
    }
}

/// Named facts about the differences between the old display object and the
/// revision's proposed values, over the declared tracked paths.
#[derive(Clone, Debug, Default)]
pub struct Changes {
    changed: BTreeMap<String, bool>,
    to_flags: BTreeMap<String, bool>,
    from_flags: BTreeMap<String, bool>,
    old_values: BTreeMap<String, FieldValue>,
    new_values: BTreeMap<String, FieldValue>,
}

impl Changes {
    pub fn is_changed(&self, name: &str) -> bool {
        self.changed.get(name).copied().unwrap_or(false)
    }

    /// One-directional transition: the flag became true.
    pub fn to_flag(&self, name: &str) -> bool {
        self.to_flags.get(name).copied().unwrap_or(false)
    }

    /// One-directional transition: the flag became false.
    pub fn from_flag(&self, name: &str) -> bool {
        self.from_flags.get(name).copied().unwrap_or(false)
    }

    pub fn old(&self, name: &str) -> &FieldValue {
        self.old_values.get(name).unwrap_or(&FieldValue::Absent)
    }

    pub fn new(&self, name: &str) -> &FieldValue {
        self.new_values.get(name).unwrap_or(&FieldValue::Absent)
    }

    pub fn old_bool(&self, name: &str) -> bool {
        self.old(name).as_bool()
    }

    pub fn new_bool(&self, name: &str) -> bool {
        self.new(name).as_bool()
    }

    pub fn old_text(&self, name: &str) -> Option<&str> {
        match self.old(name) {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn new_text(&self, name: &str) -> Option<&str> {
        match self.new(name) {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Legacy-shaped JSON summary recorded with the approval comment.
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (name, changed) in &self.changed {
            map.insert(format!("{} changed", name), json!(changed));
        }
        for (name, to) in &self.to_flags {
            map.insert(format!("to {}", name), json!(to));
            map.insert(format!("from {}", name), json!(self.from_flag(name)));
        }
        for (name, value) in &self.old_values {
            if !value.is_bool() {
                map.insert(format!("old {}", name), value.to_json());
            }
        }
        for (name, value) in &self.new_values {
            if !value.is_bool() {
                map.insert(format!("new {}", name), value.to_json());
            }
        }
        serde_json::Value::Object(map)
    }
}

/// Display name of a tracked path: the terminal hop, with a terminal hop
/// named `parent` renamed to `publisher` (legacy compatibility).
pub fn path_display_name(path: &[&str]) -> String {
    let terminal = path.last().copied().unwrap_or_default();
    if terminal == "parent" {
        "publisher".to_string()
    } else {
        terminal.to_string()
    }
}

/// Common persisted state of every revision row.
#[derive(Clone, Debug)]
pub struct RevisionMeta {
    pub id: i64,
    pub changeset_id: i64,
    /// This revision, when committed, deletes the display row.
    pub deleted: bool,
    /// Tri-state: None = open, Some(true) = committed, Some(false) =
    /// discarded.
    pub committed: Option<bool>,
    pub previous_revision: Option<i64>,
    pub created: i64,
}

impl RevisionMeta {
    pub fn new(changeset_id: i64) -> Self {
        RevisionMeta {
            id: 0,
            changeset_id,
            deleted: false,
            committed: None,
            previous_revision: None,
            created: 0,
        }
    }

    pub fn added(&self) -> bool {
        self.previous_revision.is_none() && !self.discarded()
    }

    pub fn edited(&self) -> bool {
        self.previous_revision.is_some() && !self.deleted && !self.discarded()
    }

    pub fn discarded(&self) -> bool {
        self.committed == Some(false)
    }

    pub fn open(&self) -> bool {
        self.committed.is_none()
    }
}

pub struct CommitContext<'a> {
    pub display: &'a DisplayStore,
    pub oi: &'a IndexingStore,
    pub stats: &'a StatsLedger,
    pub changeset: &'a Changeset,
    pub clear_reservation: bool,
}

/// The per-entity contract of the commit pipeline.
///
/// Stage hooks default to no-ops; entities implement only what they need.
pub trait RevisionCommit {
    fn source_name(&self) -> &'static str;
    fn meta(&self) -> &RevisionMeta;
    fn meta_mut(&mut self) -> &mut RevisionMeta;
    /// The display row this revision governs, if it exists yet.
    fn source_id(&self) -> Option<i64>;

    /// Chains of reference hops to ancestors whose cached counts track this
    /// entity.
    fn parent_field_tuples(&self) -> &'static [&'static [&'static str]] {
        &[]
    }

    /// Boolean fields whose transition direction drives side effects.
    fn major_flag_tuples(&self) -> &'static [&'static [&'static str]] {
        &[]
    }

    /// Fields keying the global statistics buckets.
    fn stats_category_tuples(&self) -> &'static [&'static [&'static str]] {
        &[]
    }

    /// Resolve one tracked path on one side. The root object is guaranteed
    /// to exist for the requested side (adds are never asked for Old,
    /// deletes never for New).
    fn resolve_path(&self, _ctx: &CommitContext, _side: Side, _path: &[&str]) -> Result<FieldValue> {
        Ok(FieldValue::Absent)
    }

    /// Entity kind at the end of a declared parent path.
    fn parent_kind(&self, _path: &[&str]) -> EntityKind {
        EntityKind::Publisher
    }

    /// What this entity contributes to the statistics categories on one
    /// side. Old is sampled before any mutation, New after.
    fn entity_counts(&self, _ctx: &CommitContext, _side: Side) -> Result<CountMap> {
        Ok(CountMap::new())
    }

    /// The global statistics bucket for one side, from the already-computed
    /// changes. None means the entity does no global accounting on that
    /// side. The default derives country/language from the declared stats
    /// category paths.
    fn stats_bucket(&self, changes: &Changes, side: Side) -> Option<StatsBucket> {
        if self.stats_category_tuples().is_empty() {
            return None;
        }
        let get = |name: &str| match side {
            Side::Old => changes.old_text(name).map(str::to_string),
            Side::New => changes.new_text(name).map(str::to_string),
        };
        let country = get("country");
        let language = get("language");
        if country.is_none() && language.is_none() {
            return None;
        }
        Some(StatsBucket { country, language })
    }

    // ---- pipeline stage hooks -------------------------------------------

    /// Structural validation; aborts the commit with no mutation on error.
    fn pre_commit_check(&self, _ctx: &CommitContext) -> Result<()> {
        Ok(())
    }

    /// Cross-revision ordering prerequisites, run before counts are
    /// sampled. May recursively commit sibling revisions.
    fn pre_stats_measurement(&mut self, _ctx: &CommitContext, _changes: &Changes) -> Result<()> {
        Ok(())
    }

    /// Entity bookkeeping for deletes, run before the display row goes
    /// away. Deletes account for their own statistics here.
    fn pre_delete(&mut self, _ctx: &CommitContext, _changes: &Changes) -> Result<()> {
        Ok(())
    }

    /// Remove the display row.
    fn delete_display_object(&mut self, ctx: &CommitContext) -> Result<()>;

    /// The write stage of the pipeline: create the display row for adds,
    /// copy the single-value regular fields (honoring the conditional-field
    /// filter), derive dependent fields, clear the reservation unless
    /// suppressed, persist, re-bind the revision to a newly created row,
    /// transfer keywords, and replace multi-value collections.
    fn write_display_object(&mut self, ctx: &CommitContext, changes: &Changes) -> Result<()>;

    /// Cascading work that must only happen after this entity's own stats
    /// are finalized (dependent revision creation, placeholder rows).
    fn post_adjust_stats(&mut self, _ctx: &CommitContext, _changes: &Changes) -> Result<()> {
        Ok(())
    }

    /// After the revision is fully committed (recently-indexed events).
    fn post_commit(&mut self, _ctx: &CommitContext) -> Result<()> {
        Ok(())
    }

    /// Persist the revision row itself.
    fn save(&mut self, ctx: &CommitContext) -> Result<()>;
}

/// Compute the changes map over all declared tracked paths. For adds and
/// deletes every tracked field counts as changed, since one side
/// legitimately has no value.
pub fn classify_changes<R: RevisionCommit + ?Sized>(
    rev: &R,
    ctx: &CommitContext,
) -> Result<Changes> {
    let mut changes = Changes::default();
    let added = rev.meta().added() && rev.source_id().is_none();
    let deleted = rev.meta().deleted;

    let mut seen: BTreeSet<String> = BTreeSet::new();
    let all_paths = rev
        .parent_field_tuples()
        .iter()
        .chain(rev.major_flag_tuples())
        .chain(rev.stats_category_tuples());

    for path in all_paths {
        let name = path_display_name(path);
        if !seen.insert(name.clone()) {
            continue;
        }

        let old = if added {
            FieldValue::Absent
        } else {
            rev.resolve_path(ctx, Side::Old, path)?
        };
        let new = if deleted {
            FieldValue::Absent
        } else {
            rev.resolve_path(ctx, Side::New, path)?
        };

        // Multi-valued paths compare by set equality through
        // FieldValue::RefSet; add/delete always count as changed.
        let changed = if added || deleted { true } else { old != new };
        changes.changed.insert(name.clone(), changed);

        if old.is_bool() || new.is_bool() {
            // Absent/null booleans are treated as false for transition
            // purposes; both directions can therefore be false at once.
            changes
                .to_flags
                .insert(name.clone(), !old.as_bool() && new.as_bool());
            changes
                .from_flags
                .insert(name.clone(), old.as_bool() && !new.as_bool());
        }
        changes.old_values.insert(name.clone(), old);
        changes.new_values.insert(name, new);
    }

    Ok(changes)
}

/// The statistics adjustment algorithm.
///
/// Retract+reapply against the global buckets when the totals or the
/// categorical key changed; per-parent retract+reapply when the parent
/// reference itself changed, in-place deltas otherwise. The two-branch
/// split avoids double counting when an edit changes a count and moves the
/// entity at the same time.
pub fn adjust_stats<R: RevisionCommit + ?Sized>(
    rev: &R,
    ctx: &CommitContext,
    changes: &Changes,
    old_counts: &CountMap,
    new_counts: &CountMap,
) -> Result<()> {
    let old_bucket = rev.stats_bucket(changes, Side::Old);
    let new_bucket = rev.stats_bucket(changes, Side::New);

    if needs_retract_reapply(old_counts, new_counts, &old_bucket, &new_bucket) {
        if let Some(bucket) = &old_bucket {
            ctx.stats.apply(bucket, old_counts, -1)?;
        }
        if let Some(bucket) = &new_bucket {
            ctx.stats.apply(bucket, new_counts, 1)?;
        }
    }

    let deltas = CountMap::deltas(old_counts, new_counts);

    for path in rev.parent_field_tuples() {
        let name = path_display_name(path);
        let kind = rev.parent_kind(path);
        if changes.is_changed(&name) {
            // A changed parent reference is a move: retract the old counts
            // from the old parent(s) and apply the new counts to the new
            // one(s), even when the per-category deltas are all zero.
            for id in changes.old(&name).ref_ids() {
                for (category, count) in old_counts.iter() {
                    ctx.display.adjust_cached_count(kind, id, category, -count)?;
                }
            }
            for id in changes.new(&name).ref_ids() {
                for (category, count) in new_counts.iter() {
                    ctx.display.adjust_cached_count(kind, id, category, count)?;
                }
            }
        } else if !deltas.is_zero() {
            for id in changes.new(&name).ref_ids() {
                for (category, delta) in deltas.iter() {
                    ctx.display.adjust_cached_count(kind, id, category, delta)?;
                }
            }
        }
    }

    Ok(())
}

/// The commit pipeline: a single linear sequence with no branching retries;
/// every step either succeeds or propagates an error that aborts the whole
/// commit.
pub fn commit_revision<R: RevisionCommit + ?Sized>(
    rev: &mut R,
    ctx: &CommitContext,
) -> Result<Changes> {
    debug!(
        "committing {} revision {} (changeset {})",
        rev.source_name(),
        rev.meta().id,
        rev.meta().changeset_id
    );

    rev.pre_commit_check(ctx)?;
    let changes = classify_changes(rev, ctx)?;
    rev.pre_stats_measurement(ctx, &changes)?;

    let is_add = rev.source_id().is_none();
    let old_counts = if is_add {
        CountMap::new()
    } else {
        rev.entity_counts(ctx, Side::Old)?
    };

    if rev.meta().deleted {
        rev.pre_delete(ctx, &changes)?;
        rev.delete_display_object(ctx)?;
        // One accounting pass for deletes too: the new side is empty, so
        // the generic adjustment retracts the old counts everywhere.
        adjust_stats(rev, ctx, &changes, &old_counts, &CountMap::new())?;
        rev.post_adjust_stats(ctx, &changes)?;
        rev.meta_mut().committed = Some(true);
        rev.save(ctx)?;
        rev.post_commit(ctx)?;
        return Ok(changes);
    }

    rev.write_display_object(ctx, &changes)?;

    let new_counts = rev.entity_counts(ctx, Side::New)?;
    adjust_stats(rev, ctx, &changes, &old_counts, &new_counts)?;
    rev.post_adjust_stats(ctx, &changes)?;

    rev.meta_mut().committed = Some(true);
    rev.save(ctx)?;
    rev.post_commit(ctx)?;
    Ok(changes)
}

/// Bounded iterative prerequisite resolution.
///
/// `pending` returns the not-yet-committed sibling revisions in commit
/// order; `commit_first` commits the first of them. Every pass must shrink
/// the pending set; a pass that fails to reduce it means an unsatisfiable
/// cycle and raises [`RevisionError::PrerequisiteLoop`] instead of looping
/// forever. The pass count is additionally hard-bounded by the initial
/// pending size plus one.
pub fn resolve_prerequisites<P, C>(mut pending: P, mut commit_first: C) -> Result<()>
where
    P: FnMut() -> Result<Vec<i64>>,
    C: FnMut(i64) -> Result<()>,
{
    let mut remaining = pending()?;
    let max_passes = remaining.len() + 1;
    let mut last_len = remaining.len() + 1;

    for _ in 0..max_passes {
        if remaining.is_empty() {
            return Ok(());
        }
        if remaining.len() >= last_len {
            return Err(RevisionError::PrerequisiteLoop.into());
        }
        last_len = remaining.len();
        commit_first(remaining[0])?;
        remaining = pending()?;
    }
    if remaining.is_empty() {
        Ok(())
    } else {
        Err(RevisionError::PrerequisiteLoop.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_derived_states() {
        let mut meta = RevisionMeta::new(1);
        assert!(meta.open());
        assert!(meta.added());
        assert!(!meta.edited());

        meta.previous_revision = Some(10);
        assert!(!meta.added());
        assert!(meta.edited());

        meta.committed = Some(false);
        assert!(meta.discarded());
        assert!(!meta.added());
        assert!(!meta.edited());
        assert!(!meta.open());

        meta.committed = Some(true);
        meta.deleted = true;
        assert!(!meta.edited());
        assert!(!meta.open());
    }

    #[test]
    fn path_naming_renames_terminal_parent() {
        assert_eq!(path_display_name(&["series", "publisher"]), "publisher");
        assert_eq!(path_display_name(&["parent"]), "publisher");
        assert_eq!(path_display_name(&["brand", "group"]), "group");
        assert_eq!(path_display_name(&["series", "country"]), "country");
    }

    #[test]
    fn field_value_set_equality() {
        let a = FieldValue::RefSet([1, 2, 3].into_iter().collect());
        let b = FieldValue::RefSet([3, 2, 1].into_iter().collect());
        assert_eq!(a, b);
        let c = FieldValue::RefSet([1, 2].into_iter().collect());
        assert_ne!(a, c);
    }

    #[test]
    fn changes_flag_transitions_treat_absent_as_false() {
        let mut changes = Changes::default();
        changes.changed.insert("is_current".to_string(), true);
        changes
            .old_values
            .insert("is_current".to_string(), FieldValue::Absent);
        changes
            .new_values
            .insert("is_current".to_string(), FieldValue::Bool(false));
        changes.to_flags.insert("is_current".to_string(), false);
        changes.from_flags.insert("is_current".to_string(), false);

        // Both transition directions false at once is the accepted quirk.
        assert!(!changes.to_flag("is_current"));
        assert!(!changes.from_flag("is_current"));
        assert!(changes.is_changed("is_current"));
    }

    #[test]
    fn resolve_prerequisites_commits_in_order() {
        use std::cell::RefCell;
        let committed: RefCell<Vec<i64>> = RefCell::new(Vec::new());
        resolve_prerequisites(
            || {
                let done = committed.borrow();
                Ok([7, 8, 9]
                    .into_iter()
                    .filter(|id| !done.contains(id))
                    .collect())
            },
            |id| {
                committed.borrow_mut().push(id);
                Ok(())
            },
        )
        .unwrap();
        assert_eq!(*committed.borrow(), vec![7, 8, 9]);
    }

    #[test]
    fn resolve_prerequisites_detects_non_reduction() {
        // A commit callback that never actually removes anything from the
        // pending set must be detected, not looped on.
        let err = resolve_prerequisites(|| Ok(vec![1, 2]), |_| Ok(())).unwrap_err();
        let revision_error = err.downcast_ref::<RevisionError>().unwrap();
        assert!(matches!(revision_error, RevisionError::PrerequisiteLoop));
    }

    #[test]
    fn resolve_prerequisites_empty_is_ok() {
        resolve_prerequisites(|| Ok(Vec::new()), |_| panic!("nothing to commit")).unwrap();
    }

    #[test]
    fn changes_json_uses_legacy_key_shapes() {
        let mut changes = Changes::default();
        changes.changed.insert("country".to_string(), true);
        changes
            .old_values
            .insert("country".to_string(), FieldValue::Text("us".to_string()));
        changes
            .new_values
            .insert("country".to_string(), FieldValue::Text("de".to_string()));

        let value = changes.to_json();
        assert_eq!(value["country changed"], json!(true));
        assert_eq!(value["old country"], json!("us"));
        assert_eq!(value["new country"], json!("de"));
    }
}
