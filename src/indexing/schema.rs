//! SQLite table definitions for the revision engine.
//!
//! All engine tables carry an `oi_` prefix ("online indexing") so that they
//! are visually separate from the display catalog they stage edits for.

use crate::sqlite_persistence::{Column, SqlType, Table, DEFAULT_TIMESTAMP};

pub const CHANGESETS_TABLE: Table = Table {
    name: "oi_changesets",
    columns: &[
        Column::new("id", SqlType::Integer).primary_key(),
        Column::new("uid", SqlType::Text).not_null(),
        Column::new("state", SqlType::Text).not_null(),
        Column::new("indexer", SqlType::Text).not_null(),
        Column::new("approver", SqlType::Text),
        Column::new("change_type", SqlType::Text).not_null(),
        Column::new("created", SqlType::Integer).not_null().default_expr(DEFAULT_TIMESTAMP),
        Column::new("modified", SqlType::Integer).not_null().default_expr(DEFAULT_TIMESTAMP),
    ],
    indices: &[("idx_oi_changesets_state", "state")],
    unique_constraints: &[&["uid"]],
};

/// Co-editors assisting on a changeset.
pub const CHANGESET_EDITORS_TABLE: Table = Table {
    name: "oi_changeset_editors",
    columns: &[
        Column::new("changeset_id", SqlType::Integer).not_null(),
        Column::new("editor", SqlType::Text).not_null(),
    ],
    indices: &[("idx_oi_changeset_editors_changeset", "changeset_id")],
    unique_constraints: &[&["changeset_id", "editor"]],
};

pub const CHANGESET_COMMENTS_TABLE: Table = Table {
    name: "oi_changeset_comments",
    columns: &[
        Column::new("id", SqlType::Integer).primary_key(),
        Column::new("changeset_id", SqlType::Integer).not_null(),
        Column::new("commenter", SqlType::Text).not_null(),
        Column::new("text", SqlType::Text).not_null(),
        Column::new("old_state", SqlType::Text).not_null(),
        Column::new("new_state", SqlType::Text).not_null(),
        Column::new("field_changes", SqlType::Text),
        Column::new("created", SqlType::Integer).not_null().default_expr(DEFAULT_TIMESTAMP),
    ],
    indices: &[("idx_oi_changeset_comments_changeset", "changeset_id")],
    unique_constraints: &[],
};

/// One row per locked display row; the unique constraint is the whole
/// concurrency model.
pub const REVISION_LOCKS_TABLE: Table = Table {
    name: "oi_revision_locks",
    columns: &[
        Column::new("id", SqlType::Integer).primary_key(),
        Column::new("entity_kind", SqlType::Text).not_null(),
        Column::new("entity_id", SqlType::Integer).not_null(),
        Column::new("changeset_id", SqlType::Integer),
    ],
    indices: &[("idx_oi_revision_locks_changeset", "changeset_id")],
    unique_constraints: &[&["entity_kind", "entity_id"]],
};

pub const ONGOING_RESERVATIONS_TABLE: Table = Table {
    name: "oi_ongoing_reservations",
    columns: &[
        Column::new("id", SqlType::Integer).primary_key(),
        Column::new("indexer", SqlType::Text).not_null(),
        Column::new("series_id", SqlType::Integer).not_null(),
        Column::new("created", SqlType::Integer).not_null().default_expr(DEFAULT_TIMESTAMP),
    ],
    indices: &[],
    unique_constraints: &[&["series_id"]],
};

pub const COUNT_STATS_TABLE: Table = Table {
    name: "oi_count_stats",
    columns: &[
        Column::new("id", SqlType::Integer).primary_key(),
        Column::new("name", SqlType::Text).not_null(),
        Column::new("country", SqlType::Text),
        Column::new("language", SqlType::Text),
        Column::new("count", SqlType::Integer).not_null().default_expr("0"),
    ],
    indices: &[("idx_oi_count_stats_name", "name")],
    unique_constraints: &[&["name", "country", "language"]],
};

pub const RECENT_INDEXED_ISSUES_TABLE: Table = Table {
    name: "oi_recent_indexed_issues",
    columns: &[
        Column::new("id", SqlType::Integer).primary_key(),
        Column::new("issue_id", SqlType::Integer).not_null(),
        Column::new("language", SqlType::Text).not_null(),
        Column::new("created", SqlType::Integer).not_null().default_expr(DEFAULT_TIMESTAMP),
    ],
    indices: &[("idx_oi_recent_indexed_language", "language")],
    unique_constraints: &[],
};

const REVISION_AUDIT_COLUMNS: [Column; 5] = [
    Column::new("changeset_id", SqlType::Integer).not_null(),
    Column::new("deleted", SqlType::Integer).not_null().default_expr("0"),
    Column::new("committed", SqlType::Integer),
    Column::new("previous_revision", SqlType::Integer),
    Column::new("created", SqlType::Integer).not_null().default_expr(DEFAULT_TIMESTAMP),
];

pub const PUBLISHER_REVISIONS_TABLE: Table = Table {
    name: "oi_publisher_revisions",
    columns: &[
        Column::new("id", SqlType::Integer).primary_key(),
        REVISION_AUDIT_COLUMNS[0],
        REVISION_AUDIT_COLUMNS[1],
        REVISION_AUDIT_COLUMNS[2],
        REVISION_AUDIT_COLUMNS[3],
        REVISION_AUDIT_COLUMNS[4],
        Column::new("publisher_id", SqlType::Integer),
        Column::new("name", SqlType::Text).not_null(),
        Column::new("year_began", SqlType::Integer),
        Column::new("year_ended", SqlType::Integer),
        Column::new("year_began_uncertain", SqlType::Integer).not_null(),
        Column::new("year_ended_uncertain", SqlType::Integer).not_null(),
        Column::new("url", SqlType::Text).not_null(),
        Column::new("notes", SqlType::Text).not_null(),
        Column::new("keywords", SqlType::Text).not_null(),
        Column::new("country", SqlType::Text).not_null(),
    ],
    indices: &[
        ("idx_oi_publisher_revisions_changeset", "changeset_id"),
        ("idx_oi_publisher_revisions_publisher", "publisher_id"),
    ],
    unique_constraints: &[],
};

pub const INDICIA_PUBLISHER_REVISIONS_TABLE: Table = Table {
    name: "oi_indicia_publisher_revisions",
    columns: &[
        Column::new("id", SqlType::Integer).primary_key(),
        REVISION_AUDIT_COLUMNS[0],
        REVISION_AUDIT_COLUMNS[1],
        REVISION_AUDIT_COLUMNS[2],
        REVISION_AUDIT_COLUMNS[3],
        REVISION_AUDIT_COLUMNS[4],
        Column::new("indicia_publisher_id", SqlType::Integer),
        Column::new("name", SqlType::Text).not_null(),
        Column::new("year_began", SqlType::Integer),
        Column::new("year_ended", SqlType::Integer),
        Column::new("year_began_uncertain", SqlType::Integer).not_null(),
        Column::new("year_ended_uncertain", SqlType::Integer).not_null(),
        Column::new("url", SqlType::Text).not_null(),
        Column::new("notes", SqlType::Text).not_null(),
        Column::new("keywords", SqlType::Text).not_null(),
        Column::new("is_surrogate", SqlType::Integer).not_null(),
        Column::new("country", SqlType::Text).not_null(),
        Column::new("parent", SqlType::Integer).not_null(),
    ],
    indices: &[
        (
            "idx_oi_indicia_publisher_revisions_changeset",
            "changeset_id",
        ),
        (
            "idx_oi_indicia_publisher_revisions_ipub",
            "indicia_publisher_id",
        ),
    ],
    unique_constraints: &[],
};

pub const BRAND_GROUP_REVISIONS_TABLE: Table = Table {
    name: "oi_brand_group_revisions",
    columns: &[
        Column::new("id", SqlType::Integer).primary_key(),
        REVISION_AUDIT_COLUMNS[0],
        REVISION_AUDIT_COLUMNS[1],
        REVISION_AUDIT_COLUMNS[2],
        REVISION_AUDIT_COLUMNS[3],
        REVISION_AUDIT_COLUMNS[4],
        Column::new("brand_group_id", SqlType::Integer),
        Column::new("name", SqlType::Text).not_null(),
        Column::new("year_began", SqlType::Integer),
        Column::new("year_ended", SqlType::Integer),
        Column::new("year_began_uncertain", SqlType::Integer).not_null(),
        Column::new("year_ended_uncertain", SqlType::Integer).not_null(),
        Column::new("url", SqlType::Text).not_null(),
        Column::new("notes", SqlType::Text).not_null(),
        Column::new("keywords", SqlType::Text).not_null(),
        Column::new("parent", SqlType::Integer).not_null(),
    ],
    indices: &[
        ("idx_oi_brand_group_revisions_changeset", "changeset_id"),
        ("idx_oi_brand_group_revisions_group", "brand_group_id"),
    ],
    unique_constraints: &[],
};

pub const BRAND_REVISIONS_TABLE: Table = Table {
    name: "oi_brand_revisions",
    columns: &[
        Column::new("id", SqlType::Integer).primary_key(),
        REVISION_AUDIT_COLUMNS[0],
        REVISION_AUDIT_COLUMNS[1],
        REVISION_AUDIT_COLUMNS[2],
        REVISION_AUDIT_COLUMNS[3],
        REVISION_AUDIT_COLUMNS[4],
        Column::new("brand_id", SqlType::Integer),
        Column::new("name", SqlType::Text).not_null(),
        Column::new("year_began", SqlType::Integer),
        Column::new("year_ended", SqlType::Integer),
        Column::new("year_began_uncertain", SqlType::Integer).not_null(),
        Column::new("year_ended_uncertain", SqlType::Integer).not_null(),
        Column::new("url", SqlType::Text).not_null(),
        Column::new("notes", SqlType::Text).not_null(),
        Column::new("keywords", SqlType::Text).not_null(),
    ],
    indices: &[
        ("idx_oi_brand_revisions_changeset", "changeset_id"),
        ("idx_oi_brand_revisions_brand", "brand_id"),
    ],
    unique_constraints: &[],
};

/// BrandRevision <-> BrandGroup membership staged on the revision.
pub const BRAND_REVISION_GROUPS_TABLE: Table = Table {
    name: "oi_brand_revision_groups",
    columns: &[
        Column::new("revision_id", SqlType::Integer).not_null(),
        Column::new("group_id", SqlType::Integer).not_null(),
    ],
    indices: &[("idx_oi_brand_revision_groups_revision", "revision_id")],
    unique_constraints: &[&["revision_id", "group_id"]],
};

pub const BRAND_USE_REVISIONS_TABLE: Table = Table {
    name: "oi_brand_use_revisions",
    columns: &[
        Column::new("id", SqlType::Integer).primary_key(),
        REVISION_AUDIT_COLUMNS[0],
        REVISION_AUDIT_COLUMNS[1],
        REVISION_AUDIT_COLUMNS[2],
        REVISION_AUDIT_COLUMNS[3],
        REVISION_AUDIT_COLUMNS[4],
        Column::new("brand_use_id", SqlType::Integer),
        Column::new("emblem", SqlType::Integer),
        Column::new("publisher", SqlType::Integer),
        Column::new("year_began", SqlType::Integer),
        Column::new("year_ended", SqlType::Integer),
        Column::new("year_began_uncertain", SqlType::Integer).not_null(),
        Column::new("year_ended_uncertain", SqlType::Integer).not_null(),
        Column::new("notes", SqlType::Text).not_null(),
    ],
    indices: &[
        ("idx_oi_brand_use_revisions_changeset", "changeset_id"),
        ("idx_oi_brand_use_revisions_use", "brand_use_id"),
    ],
    unique_constraints: &[],
};

pub const SERIES_REVISIONS_TABLE: Table = Table {
    name: "oi_series_revisions",
    columns: &[
        Column::new("id", SqlType::Integer).primary_key(),
        REVISION_AUDIT_COLUMNS[0],
        REVISION_AUDIT_COLUMNS[1],
        REVISION_AUDIT_COLUMNS[2],
        REVISION_AUDIT_COLUMNS[3],
        REVISION_AUDIT_COLUMNS[4],
        Column::new("series_id", SqlType::Integer),
        Column::new("name", SqlType::Text).not_null(),
        Column::new("leading_article", SqlType::Integer).not_null(),
        Column::new("format", SqlType::Text).not_null(),
        Column::new("color", SqlType::Text).not_null(),
        Column::new("dimensions", SqlType::Text).not_null(),
        Column::new("paper_stock", SqlType::Text).not_null(),
        Column::new("binding", SqlType::Text).not_null(),
        Column::new("publishing_format", SqlType::Text).not_null(),
        Column::new("publication_type", SqlType::Text),
        Column::new("notes", SqlType::Text).not_null(),
        Column::new("keywords", SqlType::Text).not_null(),
        Column::new("year_began", SqlType::Integer).not_null(),
        Column::new("year_ended", SqlType::Integer),
        Column::new("year_began_uncertain", SqlType::Integer).not_null(),
        Column::new("year_ended_uncertain", SqlType::Integer).not_null(),
        Column::new("is_current", SqlType::Integer).not_null(),
        Column::new("is_singleton", SqlType::Integer).not_null(),
        Column::new("is_comics_publication", SqlType::Integer).not_null(),
        Column::new("publication_notes", SqlType::Text).not_null(),
        Column::new("tracking_notes", SqlType::Text).not_null(),
        Column::new("has_barcode", SqlType::Integer).not_null(),
        Column::new("has_indicia_frequency", SqlType::Integer).not_null(),
        Column::new("has_isbn", SqlType::Integer).not_null(),
        Column::new("has_issue_title", SqlType::Integer).not_null(),
        Column::new("has_volume", SqlType::Integer).not_null(),
        Column::new("has_rating", SqlType::Integer).not_null(),
        Column::new("reservation_requested", SqlType::Integer).not_null(),
        Column::new("country", SqlType::Text).not_null(),
        Column::new("language", SqlType::Text).not_null(),
        Column::new("publisher", SqlType::Integer).not_null(),
    ],
    indices: &[
        ("idx_oi_series_revisions_changeset", "changeset_id"),
        ("idx_oi_series_revisions_series", "series_id"),
    ],
    unique_constraints: &[],
};

pub const SERIES_BOND_REVISIONS_TABLE: Table = Table {
    name: "oi_series_bond_revisions",
    columns: &[
        Column::new("id", SqlType::Integer).primary_key(),
        REVISION_AUDIT_COLUMNS[0],
        REVISION_AUDIT_COLUMNS[1],
        REVISION_AUDIT_COLUMNS[2],
        REVISION_AUDIT_COLUMNS[3],
        REVISION_AUDIT_COLUMNS[4],
        Column::new("series_bond_id", SqlType::Integer),
        Column::new("origin", SqlType::Integer),
        Column::new("origin_issue", SqlType::Integer),
        Column::new("target", SqlType::Integer),
        Column::new("target_issue", SqlType::Integer),
        Column::new("bond_type", SqlType::Text).not_null(),
        Column::new("notes", SqlType::Text).not_null(),
    ],
    indices: &[
        ("idx_oi_series_bond_revisions_changeset", "changeset_id"),
        ("idx_oi_series_bond_revisions_bond", "series_bond_id"),
    ],
    unique_constraints: &[],
};

pub const ISSUE_REVISIONS_TABLE: Table = Table {
    name: "oi_issue_revisions",
    columns: &[
        Column::new("id", SqlType::Integer).primary_key(),
        REVISION_AUDIT_COLUMNS[0],
        REVISION_AUDIT_COLUMNS[1],
        REVISION_AUDIT_COLUMNS[2],
        REVISION_AUDIT_COLUMNS[3],
        REVISION_AUDIT_COLUMNS[4],
        Column::new("issue_id", SqlType::Integer),
        Column::new("after_issue", SqlType::Integer),
        Column::new("revision_sort_code", SqlType::Integer),
        Column::new("reservation_requested", SqlType::Integer).not_null(),
        Column::new("number", SqlType::Text).not_null(),
        Column::new("title", SqlType::Text).not_null(),
        Column::new("no_title", SqlType::Integer).not_null(),
        Column::new("volume", SqlType::Text).not_null(),
        Column::new("no_volume", SqlType::Integer).not_null(),
        Column::new("display_volume_with_number", SqlType::Integer).not_null(),
        Column::new("variant_of", SqlType::Integer),
        Column::new("variant_name", SqlType::Text).not_null(),
        Column::new("publication_date", SqlType::Text).not_null(),
        Column::new("key_date", SqlType::Text).not_null(),
        Column::new("year_on_sale", SqlType::Integer),
        Column::new("month_on_sale", SqlType::Integer),
        Column::new("day_on_sale", SqlType::Integer),
        Column::new("on_sale_date_uncertain", SqlType::Integer).not_null(),
        Column::new("indicia_frequency", SqlType::Text).not_null(),
        Column::new("no_indicia_frequency", SqlType::Integer).not_null(),
        Column::new("price", SqlType::Text).not_null(),
        Column::new("page_count", SqlType::Real),
        Column::new("page_count_uncertain", SqlType::Integer).not_null(),
        Column::new("editing", SqlType::Text).not_null(),
        Column::new("no_editing", SqlType::Integer).not_null(),
        Column::new("isbn", SqlType::Text).not_null(),
        Column::new("no_isbn", SqlType::Integer).not_null(),
        Column::new("barcode", SqlType::Text).not_null(),
        Column::new("no_barcode", SqlType::Integer).not_null(),
        Column::new("rating", SqlType::Text).not_null(),
        Column::new("no_rating", SqlType::Integer).not_null(),
        Column::new("notes", SqlType::Text).not_null(),
        Column::new("keywords", SqlType::Text).not_null(),
        Column::new("series", SqlType::Integer).not_null(),
        Column::new("indicia_publisher", SqlType::Integer),
        Column::new("indicia_pub_not_printed", SqlType::Integer).not_null(),
        Column::new("brand", SqlType::Integer),
        Column::new("no_brand", SqlType::Integer).not_null(),
    ],
    indices: &[
        ("idx_oi_issue_revisions_changeset", "changeset_id"),
        ("idx_oi_issue_revisions_issue", "issue_id"),
        ("idx_oi_issue_revisions_series", "series"),
    ],
    unique_constraints: &[],
};

pub const STORY_REVISIONS_TABLE: Table = Table {
    name: "oi_story_revisions",
    columns: &[
        Column::new("id", SqlType::Integer).primary_key(),
        REVISION_AUDIT_COLUMNS[0],
        REVISION_AUDIT_COLUMNS[1],
        REVISION_AUDIT_COLUMNS[2],
        REVISION_AUDIT_COLUMNS[3],
        REVISION_AUDIT_COLUMNS[4],
        Column::new("story_id", SqlType::Integer),
        Column::new("title", SqlType::Text).not_null(),
        Column::new("title_inferred", SqlType::Integer).not_null(),
        Column::new("feature", SqlType::Text).not_null(),
        Column::new("kind", SqlType::Text).not_null(),
        Column::new("sequence_number", SqlType::Integer).not_null(),
        Column::new("page_count", SqlType::Real),
        Column::new("page_count_uncertain", SqlType::Integer).not_null(),
        Column::new("script", SqlType::Text).not_null(),
        Column::new("pencils", SqlType::Text).not_null(),
        Column::new("inks", SqlType::Text).not_null(),
        Column::new("colors", SqlType::Text).not_null(),
        Column::new("letters", SqlType::Text).not_null(),
        Column::new("editing", SqlType::Text).not_null(),
        Column::new("no_script", SqlType::Integer).not_null(),
        Column::new("no_pencils", SqlType::Integer).not_null(),
        Column::new("no_inks", SqlType::Integer).not_null(),
        Column::new("no_colors", SqlType::Integer).not_null(),
        Column::new("no_letters", SqlType::Integer).not_null(),
        Column::new("no_editing", SqlType::Integer).not_null(),
        Column::new("job_number", SqlType::Text).not_null(),
        Column::new("genre", SqlType::Text).not_null(),
        Column::new("characters", SqlType::Text).not_null(),
        Column::new("synopsis", SqlType::Text).not_null(),
        Column::new("reprint_notes", SqlType::Text).not_null(),
        Column::new("notes", SqlType::Text).not_null(),
        Column::new("keywords", SqlType::Text).not_null(),
        Column::new("issue_id", SqlType::Integer),
    ],
    indices: &[
        ("idx_oi_story_revisions_changeset", "changeset_id"),
        ("idx_oi_story_revisions_story", "story_id"),
    ],
    unique_constraints: &[],
};

pub const COVER_REVISIONS_TABLE: Table = Table {
    name: "oi_cover_revisions",
    columns: &[
        Column::new("id", SqlType::Integer).primary_key(),
        REVISION_AUDIT_COLUMNS[0],
        REVISION_AUDIT_COLUMNS[1],
        REVISION_AUDIT_COLUMNS[2],
        REVISION_AUDIT_COLUMNS[3],
        REVISION_AUDIT_COLUMNS[4],
        Column::new("cover_id", SqlType::Integer),
        Column::new("issue_id", SqlType::Integer),
        Column::new("marked", SqlType::Integer).not_null(),
        Column::new("is_replacement", SqlType::Integer).not_null(),
        Column::new("is_wraparound", SqlType::Integer).not_null(),
        Column::new("front_left", SqlType::Integer).not_null(),
        Column::new("front_right", SqlType::Integer).not_null(),
        Column::new("front_top", SqlType::Integer).not_null(),
        Column::new("front_bottom", SqlType::Integer).not_null(),
        Column::new("file_source", SqlType::Text).not_null(),
    ],
    indices: &[
        ("idx_oi_cover_revisions_changeset", "changeset_id"),
        ("idx_oi_cover_revisions_cover", "cover_id"),
    ],
    unique_constraints: &[],
};

pub const IMAGE_REVISIONS_TABLE: Table = Table {
    name: "oi_image_revisions",
    columns: &[
        Column::new("id", SqlType::Integer).primary_key(),
        REVISION_AUDIT_COLUMNS[0],
        REVISION_AUDIT_COLUMNS[1],
        REVISION_AUDIT_COLUMNS[2],
        REVISION_AUDIT_COLUMNS[3],
        REVISION_AUDIT_COLUMNS[4],
        Column::new("image_id", SqlType::Integer),
        Column::new("owner_kind", SqlType::Text).not_null(),
        Column::new("owner_id", SqlType::Integer).not_null(),
        Column::new("image_type", SqlType::Text).not_null(),
        Column::new("image_file", SqlType::Text).not_null(),
        Column::new("marked", SqlType::Integer).not_null(),
        Column::new("is_replacement", SqlType::Integer).not_null(),
    ],
    indices: &[
        ("idx_oi_image_revisions_changeset", "changeset_id"),
        ("idx_oi_image_revisions_image", "image_id"),
    ],
    unique_constraints: &[],
};

pub const REPRINT_REVISIONS_TABLE: Table = Table {
    name: "oi_reprint_revisions",
    columns: &[
        Column::new("id", SqlType::Integer).primary_key(),
        REVISION_AUDIT_COLUMNS[0],
        REVISION_AUDIT_COLUMNS[1],
        REVISION_AUDIT_COLUMNS[2],
        REVISION_AUDIT_COLUMNS[3],
        REVISION_AUDIT_COLUMNS[4],
        Column::new("link_id", SqlType::Integer),
        Column::new("in_kind", SqlType::Text),
        Column::new("out_kind", SqlType::Text),
        Column::new("origin_story", SqlType::Integer),
        Column::new("origin_revision", SqlType::Integer),
        Column::new("origin_issue", SqlType::Integer),
        Column::new("target_story", SqlType::Integer),
        Column::new("target_revision", SqlType::Integer),
        Column::new("target_issue", SqlType::Integer),
        Column::new("notes", SqlType::Text).not_null(),
    ],
    indices: &[
        ("idx_oi_reprint_revisions_changeset", "changeset_id"),
        ("idx_oi_reprint_revisions_link", "link_id"),
    ],
    unique_constraints: &[],
};

