//! SQLite table definitions for the display (published) catalog.
//!
//! Primary keys are integer rowid aliases. References between entities are
//! plain integer columns with covering indices; cached counts are ordinary
//! columns maintained by the revision engine.

use crate::sqlite_persistence::{Column, SqlType, Table};

pub const PUBLISHERS_TABLE: Table = Table {
    name: "publishers",
    columns: &[
        Column::new("id", SqlType::Integer).primary_key(),
        Column::new("name", SqlType::Text).not_null(),
        Column::new("year_began", SqlType::Integer),
        Column::new("year_ended", SqlType::Integer),
        Column::new("year_began_uncertain", SqlType::Integer).not_null(),
        Column::new("year_ended_uncertain", SqlType::Integer).not_null(),
        Column::new("url", SqlType::Text).not_null(),
        Column::new("notes", SqlType::Text).not_null(),
        Column::new("country", SqlType::Text).not_null(),
        Column::new("series_count", SqlType::Integer).not_null().default_expr("0"),
        Column::new("issue_count", SqlType::Integer).not_null().default_expr("0"),
        Column::new("brand_count", SqlType::Integer).not_null().default_expr("0"),
        Column::new("indicia_publisher_count", SqlType::Integer).not_null().default_expr("0"),
        Column::new("reserved", SqlType::Integer).not_null().default_expr("0"),
    ],
    indices: &[("idx_publishers_country", "country")],
    unique_constraints: &[],
};

pub const INDICIA_PUBLISHERS_TABLE: Table = Table {
    name: "indicia_publishers",
    columns: &[
        Column::new("id", SqlType::Integer).primary_key(),
        Column::new("name", SqlType::Text).not_null(),
        Column::new("year_began", SqlType::Integer),
        Column::new("year_ended", SqlType::Integer),
        Column::new("year_began_uncertain", SqlType::Integer).not_null(),
        Column::new("year_ended_uncertain", SqlType::Integer).not_null(),
        Column::new("url", SqlType::Text).not_null(),
        Column::new("notes", SqlType::Text).not_null(),
        Column::new("is_surrogate", SqlType::Integer).not_null(),
        Column::new("country", SqlType::Text).not_null(),
        Column::new("parent", SqlType::Integer).not_null(),
        Column::new("issue_count", SqlType::Integer).not_null().default_expr("0"),
        Column::new("reserved", SqlType::Integer).not_null().default_expr("0"),
    ],
    indices: &[("idx_indicia_publishers_parent", "parent")],
    unique_constraints: &[],
};

pub const BRAND_GROUPS_TABLE: Table = Table {
    name: "brand_groups",
    columns: &[
        Column::new("id", SqlType::Integer).primary_key(),
        Column::new("name", SqlType::Text).not_null(),
        Column::new("year_began", SqlType::Integer),
        Column::new("year_ended", SqlType::Integer),
        Column::new("year_began_uncertain", SqlType::Integer).not_null(),
        Column::new("year_ended_uncertain", SqlType::Integer).not_null(),
        Column::new("url", SqlType::Text).not_null(),
        Column::new("notes", SqlType::Text).not_null(),
        Column::new("parent", SqlType::Integer).not_null(),
        Column::new("issue_count", SqlType::Integer).not_null().default_expr("0"),
        Column::new("reserved", SqlType::Integer).not_null().default_expr("0"),
    ],
    indices: &[("idx_brand_groups_parent", "parent")],
    unique_constraints: &[],
};

pub const BRANDS_TABLE: Table = Table {
    name: "brands",
    columns: &[
        Column::new("id", SqlType::Integer).primary_key(),
        Column::new("name", SqlType::Text).not_null(),
        Column::new("year_began", SqlType::Integer),
        Column::new("year_ended", SqlType::Integer),
        Column::new("year_began_uncertain", SqlType::Integer).not_null(),
        Column::new("year_ended_uncertain", SqlType::Integer).not_null(),
        Column::new("url", SqlType::Text).not_null(),
        Column::new("notes", SqlType::Text).not_null(),
        Column::new("issue_count", SqlType::Integer).not_null().default_expr("0"),
        Column::new("reserved", SqlType::Integer).not_null().default_expr("0"),
    ],
    indices: &[],
    unique_constraints: &[],
};

/// Brand <-> BrandGroup membership.
pub const BRAND_GROUP_MEMBERS_TABLE: Table = Table {
    name: "brand_group_members",
    columns: &[
        Column::new("brand_id", SqlType::Integer).not_null(),
        Column::new("group_id", SqlType::Integer).not_null(),
    ],
    indices: &[
        ("idx_brand_group_members_brand", "brand_id"),
        ("idx_brand_group_members_group", "group_id"),
    ],
    unique_constraints: &[&["brand_id", "group_id"]],
};

pub const BRAND_USES_TABLE: Table = Table {
    name: "brand_uses",
    columns: &[
        Column::new("id", SqlType::Integer).primary_key(),
        Column::new("emblem", SqlType::Integer).not_null(),
        Column::new("publisher", SqlType::Integer).not_null(),
        Column::new("year_began", SqlType::Integer),
        Column::new("year_ended", SqlType::Integer),
        Column::new("year_began_uncertain", SqlType::Integer).not_null(),
        Column::new("year_ended_uncertain", SqlType::Integer).not_null(),
        Column::new("notes", SqlType::Text).not_null(),
        Column::new("reserved", SqlType::Integer).not_null().default_expr("0"),
    ],
    indices: &[
        ("idx_brand_uses_emblem", "emblem"),
        ("idx_brand_uses_publisher", "publisher"),
    ],
    unique_constraints: &[],
};

pub const SERIES_TABLE: Table = Table {
    name: "series",
    columns: &[
        Column::new("id", SqlType::Integer).primary_key(),
        Column::new("name", SqlType::Text).not_null(),
        Column::new("sort_name", SqlType::Text).not_null(),
        Column::new("format", SqlType::Text).not_null(),
        Column::new("color", SqlType::Text).not_null(),
        Column::new("dimensions", SqlType::Text).not_null(),
        Column::new("paper_stock", SqlType::Text).not_null(),
        Column::new("binding", SqlType::Text).not_null(),
        Column::new("publishing_format", SqlType::Text).not_null(),
        Column::new("publication_type", SqlType::Text),
        Column::new("notes", SqlType::Text).not_null(),
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
        Column::new("has_gallery", SqlType::Integer).not_null().default_expr("0"),
        Column::new("country", SqlType::Text).not_null(),
        Column::new("language", SqlType::Text).not_null(),
        Column::new("publisher", SqlType::Integer).not_null(),
        Column::new("issue_count", SqlType::Integer).not_null().default_expr("0"),
        Column::new("first_issue", SqlType::Integer),
        Column::new("last_issue", SqlType::Integer),
        Column::new("reserved", SqlType::Integer).not_null().default_expr("0"),
    ],
    indices: &[
        ("idx_series_publisher", "publisher"),
        ("idx_series_country", "country"),
        ("idx_series_language", "language"),
    ],
    unique_constraints: &[],
};

pub const SERIES_BONDS_TABLE: Table = Table {
    name: "series_bonds",
    columns: &[
        Column::new("id", SqlType::Integer).primary_key(),
        Column::new("origin", SqlType::Integer).not_null(),
        Column::new("origin_issue", SqlType::Integer),
        Column::new("target", SqlType::Integer).not_null(),
        Column::new("target_issue", SqlType::Integer),
        Column::new("bond_type", SqlType::Text).not_null(),
        Column::new("notes", SqlType::Text).not_null(),
        Column::new("reserved", SqlType::Integer).not_null().default_expr("0"),
    ],
    indices: &[
        ("idx_series_bonds_origin", "origin"),
        ("idx_series_bonds_target", "target"),
    ],
    unique_constraints: &[],
};

pub const ISSUES_TABLE: Table = Table {
    name: "issues",
    columns: &[
        Column::new("id", SqlType::Integer).primary_key(),
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
        Column::new("on_sale_date", SqlType::Text).not_null(),
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
        Column::new("valid_isbn", SqlType::Text).not_null(),
        Column::new("barcode", SqlType::Text).not_null(),
        Column::new("no_barcode", SqlType::Integer).not_null(),
        Column::new("rating", SqlType::Text).not_null(),
        Column::new("no_rating", SqlType::Integer).not_null(),
        Column::new("notes", SqlType::Text).not_null(),
        Column::new("series", SqlType::Integer).not_null(),
        Column::new("indicia_publisher", SqlType::Integer),
        Column::new("indicia_pub_not_printed", SqlType::Integer).not_null(),
        Column::new("brand", SqlType::Integer),
        Column::new("no_brand", SqlType::Integer).not_null(),
        Column::new("sort_code", SqlType::Integer).not_null(),
        Column::new("is_indexed", SqlType::Integer).not_null().default_expr("0"),
        Column::new("reserved", SqlType::Integer).not_null().default_expr("0"),
    ],
    indices: &[
        ("idx_issues_series", "series"),
        ("idx_issues_brand", "brand"),
        ("idx_issues_indicia_publisher", "indicia_publisher"),
        ("idx_issues_variant_of", "variant_of"),
    ],
    unique_constraints: &[&["series", "sort_code"]],
};

pub const STORIES_TABLE: Table = Table {
    name: "stories",
    columns: &[
        Column::new("id", SqlType::Integer).primary_key(),
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
        Column::new("issue", SqlType::Integer).not_null(),
        Column::new("reserved", SqlType::Integer).not_null().default_expr("0"),
    ],
    indices: &[("idx_stories_issue", "issue")],
    unique_constraints: &[],
};

pub const COVERS_TABLE: Table = Table {
    name: "covers",
    columns: &[
        Column::new("id", SqlType::Integer).primary_key(),
        Column::new("issue", SqlType::Integer).not_null(),
        Column::new("marked", SqlType::Integer).not_null(),
        Column::new("is_wraparound", SqlType::Integer).not_null(),
        Column::new("front_left", SqlType::Integer).not_null(),
        Column::new("front_right", SqlType::Integer).not_null(),
        Column::new("front_top", SqlType::Integer).not_null(),
        Column::new("front_bottom", SqlType::Integer).not_null(),
        Column::new("last_upload", SqlType::Integer),
        Column::new("file_source", SqlType::Text).not_null(),
        Column::new("reserved", SqlType::Integer).not_null().default_expr("0"),
    ],
    indices: &[("idx_covers_issue", "issue")],
    unique_constraints: &[],
};

pub const IMAGES_TABLE: Table = Table {
    name: "images",
    columns: &[
        Column::new("id", SqlType::Integer).primary_key(),
        Column::new("owner_kind", SqlType::Text).not_null(),
        Column::new("owner_id", SqlType::Integer).not_null(),
        Column::new("image_type", SqlType::Text).not_null(),
        Column::new("image_file", SqlType::Text).not_null(),
        Column::new("marked", SqlType::Integer).not_null(),
        Column::new("reserved", SqlType::Integer).not_null().default_expr("0"),
    ],
    indices: &[("idx_images_owner", "owner_kind, owner_id")],
    unique_constraints: &[],
};

pub const REPRINT_LINKS_TABLE: Table = Table {
    name: "reprint_links",
    columns: &[
        Column::new("id", SqlType::Integer).primary_key(),
        Column::new("kind", SqlType::Text).not_null(),
        Column::new("origin", SqlType::Integer).not_null(),
        Column::new("target", SqlType::Integer).not_null(),
        Column::new("notes", SqlType::Text).not_null(),
        Column::new("reserved", SqlType::Integer).not_null().default_expr("0"),
    ],
    indices: &[
        ("idx_reprint_links_origin", "kind, origin"),
        ("idx_reprint_links_target", "kind, target"),
    ],
    unique_constraints: &[],
};

/// Keyword tags attached to display rows. Revisions carry keywords as one
/// delimited string; the display side stores one row per tag.
pub const ENTITY_KEYWORDS_TABLE: Table = Table {
    name: "entity_keywords",
    columns: &[
        Column::new("entity_kind", SqlType::Text).not_null(),
        Column::new("entity_id", SqlType::Integer).not_null(),
        Column::new("keyword", SqlType::Text).not_null(),
    ],
    indices: &[("idx_entity_keywords_owner", "entity_kind, entity_id")],
    unique_constraints: &[&["entity_kind", "entity_id", "keyword"]],
};

