//! Changeset workflow states and change-type tags.

use serde::{Deserialize, Serialize};

/// Review workflow state of a changeset.
///
/// UNRESERVED only exists transiently while a provisional lock is checked;
/// a changeset terminates in either APPROVED or DISCARDED.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ChangesetState {
    Unreserved,
    Open,
    Pending,
    Reviewing,
    Approved,
    Discarded,
}

impl ChangesetState {
    pub fn from_db_str(s: &str) -> Self {
        match s {
            "open" => ChangesetState::Open,
            "pending" => ChangesetState::Pending,
            "reviewing" => ChangesetState::Reviewing,
            "approved" => ChangesetState::Approved,
            "discarded" => ChangesetState::Discarded,
            _ => ChangesetState::Unreserved,
        }
    }

    pub fn to_db_str(self) -> &'static str {
        match self {
            ChangesetState::Unreserved => "unreserved",
            ChangesetState::Open => "open",
            ChangesetState::Pending => "pending",
            ChangesetState::Reviewing => "reviewing",
            ChangesetState::Approved => "approved",
            ChangesetState::Discarded => "discarded",
        }
    }

    /// States in which a changeset holds locks and may carry open revisions.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ChangesetState::Open | ChangesetState::Pending | ChangesetState::Reviewing
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ChangesetState::Approved | ChangesetState::Discarded)
    }

    /// Legal forward transitions of the review workflow.
    pub fn can_transition_to(self, next: ChangesetState) -> bool {
        use ChangesetState::*;
        matches!(
            (self, next),
            (Unreserved, Open)
                | (Open, Pending)
                | (Open, Discarded)
                | (Pending, Reviewing)
                | (Pending, Open)
                | (Pending, Discarded)
                | (Reviewing, Approved)
                | (Reviewing, Discarded)
                | (Reviewing, Open)
                | (Reviewing, Pending)
        )
    }
}

/// What kind of edit a changeset was opened for.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ChangeType {
    Publisher,
    IndiciaPublisher,
    BrandGroup,
    Brand,
    BrandUse,
    Series,
    SeriesBond,
    IssueAdd,
    Issue,
    IssueBulk,
    VariantAdd,
    TwoIssueMove,
    Cover,
    Image,
    Reprint,
}

impl ChangeType {
    pub fn from_db_str(s: &str) -> Self {
        match s {
            "indicia_publisher" => ChangeType::IndiciaPublisher,
            "brand_group" => ChangeType::BrandGroup,
            "brand" => ChangeType::Brand,
            "brand_use" => ChangeType::BrandUse,
            "series" => ChangeType::Series,
            "series_bond" => ChangeType::SeriesBond,
            "issue_add" => ChangeType::IssueAdd,
            "issue" => ChangeType::Issue,
            "issue_bulk" => ChangeType::IssueBulk,
            "variant_add" => ChangeType::VariantAdd,
            "two_issue_move" => ChangeType::TwoIssueMove,
            "cover" => ChangeType::Cover,
            "image" => ChangeType::Image,
            "reprint" => ChangeType::Reprint,
            _ => ChangeType::Publisher,
        }
    }

    pub fn to_db_str(self) -> &'static str {
        match self {
            ChangeType::Publisher => "publisher",
            ChangeType::IndiciaPublisher => "indicia_publisher",
            ChangeType::BrandGroup => "brand_group",
            ChangeType::Brand => "brand",
            ChangeType::BrandUse => "brand_use",
            ChangeType::Series => "series",
            ChangeType::SeriesBond => "series_bond",
            ChangeType::IssueAdd => "issue_add",
            ChangeType::Issue => "issue",
            ChangeType::IssueBulk => "issue_bulk",
            ChangeType::VariantAdd => "variant_add",
            ChangeType::TwoIssueMove => "two_issue_move",
            ChangeType::Cover => "cover",
            ChangeType::Image => "image",
            ChangeType::Reprint => "reprint",
        }
    }
}

/// Coarse classification of what a changeset did, consulted by post-commit
/// hooks (e.g. only MODIFY commits record a recently-indexed event).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChangesetAction {
    Add,
    Modify,
    Delete,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_roundtrip() {
        for state in [
            ChangesetState::Unreserved,
            ChangesetState::Open,
            ChangesetState::Pending,
            ChangesetState::Reviewing,
            ChangesetState::Approved,
            ChangesetState::Discarded,
        ] {
            assert_eq!(ChangesetState::from_db_str(state.to_db_str()), state);
        }
    }

    #[test]
    fn workflow_transitions() {
        use ChangesetState::*;
        assert!(Open.can_transition_to(Pending));
        assert!(Pending.can_transition_to(Reviewing));
        assert!(Reviewing.can_transition_to(Approved));
        assert!(Reviewing.can_transition_to(Discarded));
        assert!(!Approved.can_transition_to(Open));
        assert!(!Discarded.can_transition_to(Open));
        assert!(!Open.can_transition_to(Approved));
    }

    #[test]
    fn active_states() {
        assert!(ChangesetState::Open.is_active());
        assert!(ChangesetState::Reviewing.is_active());
        assert!(!ChangesetState::Approved.is_active());
        assert!(!ChangesetState::Unreserved.is_active());
    }
}
