//! Static field classification per display entity kind.
//!
//! The transfer behavior of every persisted field is declared explicitly in
//! const tables instead of being discovered by runtime reflection: each
//! entity's table must enumerate every non-excluded column, and the unit
//! tests assert the exact partitions so an unacknowledged new field fails
//! the suite instead of silently never transferring.
//!
//! `keywords` is declared single-valued even though the two sides represent
//! it differently (revision: one "; " delimited string, display: tag rows);
//! transfer goes through a dedicated join/split routine, not assignment.

use crate::display::EntityKind;
use lazy_static::lazy_static;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Identity/audit columns stripped before classification, for every entity.
pub const EXCLUDED_FIELD_NAMES: &[&str] = &["id", "created", "modified", "deleted", "reserved"];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldKind {
    /// Scalar or to-one: transferable by straight assignment.
    Single,
    /// To-many collection: transferable by wholesale replace.
    Multi,
    /// Needs bespoke handling in the entity's commit logic.
    Irregular,
}

/// A field that is only copied to the display object while a named boolean
/// flag, reached through `via`, is true; otherwise the revision's value is
/// re-synced from the display object instead.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ConditionalRule {
    pub via: &'static str,
    pub flag: &'static str,
}

pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub conditional: Option<ConditionalRule>,
}

const fn single(name: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        kind: FieldKind::Single,
        conditional: None,
    }
}

const fn multi(name: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        kind: FieldKind::Multi,
        conditional: None,
    }
}

const fn irregular(name: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        kind: FieldKind::Irregular,
        conditional: None,
    }
}

const fn conditional(name: &'static str, via: &'static str, flag: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        kind: FieldKind::Single,
        conditional: Some(ConditionalRule { via, flag }),
    }
}

const fn conditional_irregular(
    name: &'static str,
    via: &'static str,
    flag: &'static str,
) -> FieldSpec {
    FieldSpec {
        name,
        kind: FieldKind::Irregular,
        conditional: Some(ConditionalRule { via, flag }),
    }
}

const PUBLISHER_FIELDS: &[FieldSpec] = &[
    single("name"),
    single("year_began"),
    single("year_ended"),
    single("year_began_uncertain"),
    single("year_ended_uncertain"),
    single("url"),
    single("notes"),
    single("keywords"),
    single("country"),
    irregular("series_count"),
    irregular("issue_count"),
    irregular("brand_count"),
    irregular("indicia_publisher_count"),
];

const INDICIA_PUBLISHER_FIELDS: &[FieldSpec] = &[
    single("name"),
    single("year_began"),
    single("year_ended"),
    single("year_began_uncertain"),
    single("year_ended_uncertain"),
    single("url"),
    single("notes"),
    single("keywords"),
    single("is_surrogate"),
    single("country"),
    single("parent"),
    irregular("issue_count"),
];

const BRAND_GROUP_FIELDS: &[FieldSpec] = &[
    single("name"),
    single("year_began"),
    single("year_ended"),
    single("year_began_uncertain"),
    single("year_ended_uncertain"),
    single("url"),
    single("notes"),
    single("keywords"),
    single("parent"),
    irregular("issue_count"),
];

const BRAND_FIELDS: &[FieldSpec] = &[
    single("name"),
    single("year_began"),
    single("year_ended"),
    single("year_began_uncertain"),
    single("year_ended_uncertain"),
    single("url"),
    single("notes"),
    single("keywords"),
    multi("group"),
    irregular("issue_count"),
];

const BRAND_USE_FIELDS: &[FieldSpec] = &[
    single("emblem"),
    single("publisher"),
    single("year_began"),
    single("year_ended"),
    single("year_began_uncertain"),
    single("year_ended_uncertain"),
    single("notes"),
];

const SERIES_FIELDS: &[FieldSpec] = &[
    single("name"),
    single("format"),
    single("color"),
    single("dimensions"),
    single("paper_stock"),
    single("binding"),
    single("publishing_format"),
    single("publication_type"),
    single("notes"),
    single("keywords"),
    single("year_began"),
    single("year_ended"),
    single("year_began_uncertain"),
    single("year_ended_uncertain"),
    single("is_current"),
    single("is_singleton"),
    single("is_comics_publication"),
    single("publication_notes"),
    single("tracking_notes"),
    single("has_barcode"),
    single("has_indicia_frequency"),
    single("has_isbn"),
    single("has_issue_title"),
    single("has_volume"),
    single("has_rating"),
    single("country"),
    single("language"),
    single("publisher"),
    irregular("sort_name"),
    irregular("has_gallery"),
    irregular("issue_count"),
    irregular("first_issue"),
    irregular("last_issue"),
];

const SERIES_BOND_FIELDS: &[FieldSpec] = &[
    single("origin"),
    single("origin_issue"),
    single("target"),
    single("target_issue"),
    single("bond_type"),
    single("notes"),
];

const ISSUE_FIELDS: &[FieldSpec] = &[
    single("number"),
    conditional("title", "series", "has_issue_title"),
    conditional("no_title", "series", "has_issue_title"),
    conditional("volume", "series", "has_volume"),
    conditional("no_volume", "series", "has_volume"),
    conditional("display_volume_with_number", "series", "has_volume"),
    single("variant_of"),
    single("variant_name"),
    single("publication_date"),
    single("key_date"),
    single("on_sale_date_uncertain"),
    conditional("indicia_frequency", "series", "has_indicia_frequency"),
    conditional("no_indicia_frequency", "series", "has_indicia_frequency"),
    single("price"),
    single("page_count"),
    single("page_count_uncertain"),
    single("editing"),
    single("no_editing"),
    conditional("isbn", "series", "has_isbn"),
    conditional("no_isbn", "series", "has_isbn"),
    conditional("barcode", "series", "has_barcode"),
    conditional("no_barcode", "series", "has_barcode"),
    conditional("rating", "series", "has_rating"),
    conditional("no_rating", "series", "has_rating"),
    single("notes"),
    single("keywords"),
    single("series"),
    single("indicia_publisher"),
    single("indicia_pub_not_printed"),
    single("brand"),
    single("no_brand"),
    conditional_irregular("valid_isbn", "series", "has_isbn"),
    irregular("on_sale_date"),
    irregular("sort_code"),
    irregular("is_indexed"),
];

const STORY_FIELDS: &[FieldSpec] = &[
    single("title"),
    single("title_inferred"),
    single("feature"),
    single("kind"),
    single("sequence_number"),
    single("page_count"),
    single("page_count_uncertain"),
    single("script"),
    single("pencils"),
    single("inks"),
    single("colors"),
    single("letters"),
    single("editing"),
    single("no_script"),
    single("no_pencils"),
    single("no_inks"),
    single("no_colors"),
    single("no_letters"),
    single("no_editing"),
    single("job_number"),
    single("genre"),
    single("characters"),
    single("synopsis"),
    single("reprint_notes"),
    single("notes"),
    single("keywords"),
    single("issue"),
];

const COVER_FIELDS: &[FieldSpec] = &[
    single("issue"),
    single("marked"),
    single("is_wraparound"),
    single("front_left"),
    single("front_right"),
    single("front_top"),
    single("front_bottom"),
    single("file_source"),
    irregular("last_upload"),
];

const IMAGE_FIELDS: &[FieldSpec] = &[
    single("owner_kind"),
    single("owner_id"),
    single("image_type"),
    single("marked"),
    irregular("image_file"),
];

const REPRINT_LINK_FIELDS: &[FieldSpec] = &[
    single("notes"),
    irregular("kind"),
    irregular("origin"),
    irregular("target"),
];

fn field_table(kind: EntityKind) -> &'static [FieldSpec] {
    match kind {
        EntityKind::Publisher => PUBLISHER_FIELDS,
        EntityKind::IndiciaPublisher => INDICIA_PUBLISHER_FIELDS,
        EntityKind::BrandGroup => BRAND_GROUP_FIELDS,
        EntityKind::Brand => BRAND_FIELDS,
        EntityKind::BrandUse => BRAND_USE_FIELDS,
        EntityKind::Series => SERIES_FIELDS,
        EntityKind::SeriesBond => SERIES_BOND_FIELDS,
        EntityKind::Issue => ISSUE_FIELDS,
        EntityKind::Story => STORY_FIELDS,
        EntityKind::Cover => COVER_FIELDS,
        EntityKind::Image => IMAGE_FIELDS,
        EntityKind::ReprintLink => REPRINT_LINK_FIELDS,
    }
}

/// The computed partition of an entity's fields.
#[derive(Debug)]
pub struct FieldClassification {
    pub regular: BTreeSet<&'static str>,
    pub irregular: BTreeSet<&'static str>,
    pub single_value: BTreeSet<&'static str>,
    pub multi_value: BTreeSet<&'static str>,
    /// field name -> (path to the flag's owner, flag name)
    pub conditional: BTreeMap<&'static str, ConditionalRule>,
}

fn classify_table(table: &'static [FieldSpec]) -> FieldClassification {
    let mut classification = FieldClassification {
        regular: BTreeSet::new(),
        irregular: BTreeSet::new(),
        single_value: BTreeSet::new(),
        multi_value: BTreeSet::new(),
        conditional: BTreeMap::new(),
    };
    for spec in table {
        debug_assert!(
            !EXCLUDED_FIELD_NAMES.contains(&spec.name),
            "excluded field {} must not appear in a field table",
            spec.name
        );
        match spec.kind {
            FieldKind::Single => {
                classification.regular.insert(spec.name);
                classification.single_value.insert(spec.name);
            }
            FieldKind::Multi => {
                classification.regular.insert(spec.name);
                classification.multi_value.insert(spec.name);
            }
            FieldKind::Irregular => {
                classification.irregular.insert(spec.name);
            }
        }
        if let Some(rule) = spec.conditional {
            classification.conditional.insert(spec.name, rule);
        }
    }
    classification
}

lazy_static! {
    static ref CLASSIFICATIONS: HashMap<EntityKind, FieldClassification> = {
        let mut map = HashMap::new();
        for kind in [
            EntityKind::Publisher,
            EntityKind::IndiciaPublisher,
            EntityKind::BrandGroup,
            EntityKind::Brand,
            EntityKind::BrandUse,
            EntityKind::Series,
            EntityKind::SeriesBond,
            EntityKind::Issue,
            EntityKind::Story,
            EntityKind::Cover,
            EntityKind::Image,
            EntityKind::ReprintLink,
        ] {
            map.insert(kind, classify_table(field_table(kind)));
        }
        map
    };
}

/// The memoized field partition for one entity kind.
pub fn classify_fields(kind: EntityKind) -> &'static FieldClassification {
    &CLASSIFICATIONS[&kind]
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_KINDS: &[EntityKind] = &[
        EntityKind::Publisher,
        EntityKind::IndiciaPublisher,
        EntityKind::BrandGroup,
        EntityKind::Brand,
        EntityKind::BrandUse,
        EntityKind::Series,
        EntityKind::SeriesBond,
        EntityKind::Issue,
        EntityKind::Story,
        EntityKind::Cover,
        EntityKind::Image,
        EntityKind::ReprintLink,
    ];

    #[test]
    fn partitions_are_disjoint_and_covering() {
        for kind in ALL_KINDS {
            let c = classify_fields(*kind);
            assert!(
                c.regular.is_disjoint(&c.irregular),
                "{:?}: regular and irregular overlap",
                kind
            );
            assert!(
                c.single_value.is_disjoint(&c.multi_value),
                "{:?}: single and multi overlap",
                kind
            );
            let regular_union: BTreeSet<_> =
                c.single_value.union(&c.multi_value).copied().collect();
            assert_eq!(
                regular_union, c.regular,
                "{:?}: single ∪ multi != regular",
                kind
            );
            let all: BTreeSet<_> = c.regular.union(&c.irregular).copied().collect();
            assert_eq!(
                all.len(),
                field_table(*kind).len(),
                "{:?}: classification does not cover the field table",
                kind
            );
        }
    }

    #[test]
    fn excluded_names_never_classified() {
        for kind in ALL_KINDS {
            let c = classify_fields(*kind);
            for name in EXCLUDED_FIELD_NAMES {
                assert!(!c.regular.contains(name));
                assert!(!c.irregular.contains(name));
            }
        }
    }

    #[test]
    fn issue_classification() {
        let c = classify_fields(EntityKind::Issue);

        let regular: BTreeSet<&str> = [
            "number",
            "title",
            "no_title",
            "volume",
            "no_volume",
            "display_volume_with_number",
            "variant_of",
            "variant_name",
            "isbn",
            "no_isbn",
            "barcode",
            "no_barcode",
            "rating",
            "no_rating",
            "publication_date",
            "key_date",
            "on_sale_date_uncertain",
            "indicia_frequency",
            "no_indicia_frequency",
            "price",
            "page_count",
            "page_count_uncertain",
            "editing",
            "no_editing",
            "notes",
            "keywords",
            "series",
            "indicia_publisher",
            "indicia_pub_not_printed",
            "brand",
            "no_brand",
        ]
        .into_iter()
        .collect();
        assert_eq!(c.regular, regular);

        let irregular: BTreeSet<&str> =
            ["valid_isbn", "on_sale_date", "sort_code", "is_indexed"]
                .into_iter()
                .collect();
        assert_eq!(c.irregular, irregular);

        assert!(c.multi_value.is_empty());
        assert_eq!(c.single_value, c.regular);
    }

    #[test]
    fn issue_conditional_field_mapping() {
        let c = classify_fields(EntityKind::Issue);
        let expected: &[(&str, &str)] = &[
            ("volume", "has_volume"),
            ("no_volume", "has_volume"),
            ("display_volume_with_number", "has_volume"),
            ("title", "has_issue_title"),
            ("no_title", "has_issue_title"),
            ("barcode", "has_barcode"),
            ("no_barcode", "has_barcode"),
            ("isbn", "has_isbn"),
            ("no_isbn", "has_isbn"),
            ("valid_isbn", "has_isbn"),
            ("indicia_frequency", "has_indicia_frequency"),
            ("no_indicia_frequency", "has_indicia_frequency"),
        ];
        assert_eq!(c.conditional.len(), expected.len());
        for (field, flag) in expected {
            let rule = c.conditional.get(field).expect(field);
            assert_eq!(rule.via, "series");
            assert_eq!(rule.flag, *flag);
        }
    }

    #[test]
    fn brand_group_membership_is_multi_valued() {
        let c = classify_fields(EntityKind::Brand);
        assert!(c.multi_value.contains("group"));
        assert!(c.regular.contains("group"));
        assert!(!c.single_value.contains("group"));
    }

    #[test]
    fn keywords_always_regular_where_present() {
        for kind in [
            EntityKind::Publisher,
            EntityKind::IndiciaPublisher,
            EntityKind::BrandGroup,
            EntityKind::Brand,
            EntityKind::Series,
            EntityKind::Issue,
            EntityKind::Story,
        ] {
            let c = classify_fields(kind);
            assert!(
                c.single_value.contains("keywords"),
                "{:?} should classify keywords as single-valued regular",
                kind
            );
        }
    }
}
