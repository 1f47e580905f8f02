//! Display entity models.
//!
//! These are the published catalog rows that approved revisions are
//! committed into. Cached counts (issue_count, series_count, ...) are
//! denormalized columns kept in sync by the revision engine.

use serde::{Deserialize, Serialize};

/// The kind of a display row, used for generic references (revision locks,
/// keywords, image owners).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Publisher,
    IndiciaPublisher,
    BrandGroup,
    Brand,
    BrandUse,
    Series,
    SeriesBond,
    Issue,
    Story,
    Cover,
    Image,
    ReprintLink,
}

impl EntityKind {
    pub fn from_db_str(s: &str) -> Self {
        match s {
            "publisher" => EntityKind::Publisher,
            "indicia_publisher" => EntityKind::IndiciaPublisher,
            "brand_group" => EntityKind::BrandGroup,
            "brand" => EntityKind::Brand,
            "brand_use" => EntityKind::BrandUse,
            "series" => EntityKind::Series,
            "series_bond" => EntityKind::SeriesBond,
            "issue" => EntityKind::Issue,
            "story" => EntityKind::Story,
            "cover" => EntityKind::Cover,
            "image" => EntityKind::Image,
            "reprint_link" => EntityKind::ReprintLink,
            _ => EntityKind::Publisher, // Default fallback
        }
    }

    pub fn to_db_str(self) -> &'static str {
        match self {
            EntityKind::Publisher => "publisher",
            EntityKind::IndiciaPublisher => "indicia_publisher",
            EntityKind::BrandGroup => "brand_group",
            EntityKind::Brand => "brand",
            EntityKind::BrandUse => "brand_use",
            EntityKind::Series => "series",
            EntityKind::SeriesBond => "series_bond",
            EntityKind::Issue => "issue",
            EntityKind::Story => "story",
            EntityKind::Cover => "cover",
            EntityKind::Image => "image",
            EntityKind::ReprintLink => "reprint_link",
        }
    }
}

/// Indexing depth of an issue, derived from its active stories.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum IndexedStatus {
    Skeleton,
    Partial,
    Full,
}

impl IndexedStatus {
    pub fn from_db(v: i64) -> Self {
        match v {
            1 => IndexedStatus::Partial,
            2 => IndexedStatus::Full,
            _ => IndexedStatus::Skeleton,
        }
    }

    pub fn to_db(self) -> i64 {
        match self {
            IndexedStatus::Skeleton => 0,
            IndexedStatus::Partial => 1,
            IndexedStatus::Full => 2,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum PublicationType {
    Book,
    Magazine,
    Album,
}

impl PublicationType {
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "book" => Some(PublicationType::Book),
            "magazine" => Some(PublicationType::Magazine),
            "album" => Some(PublicationType::Album),
            _ => None,
        }
    }

    pub fn to_db_str(self) -> &'static str {
        match self {
            PublicationType::Book => "book",
            PublicationType::Magazine => "magazine",
            PublicationType::Album => "album",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum BondType {
    Continuation,
    Tracking,
    Merged,
}

impl BondType {
    pub fn from_db_str(s: &str) -> Self {
        match s {
            "continuation" => BondType::Continuation,
            "merged" => BondType::Merged,
            _ => BondType::Tracking,
        }
    }

    pub fn to_db_str(self) -> &'static str {
        match self {
            BondType::Continuation => "continuation",
            BondType::Tracking => "tracking",
            BondType::Merged => "merged",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum StoryKind {
    ComicStory,
    CoverSequence,
    TextArticle,
    Advertisement,
    LettersPage,
}

impl StoryKind {
    pub fn from_db_str(s: &str) -> Self {
        match s {
            "cover" => StoryKind::CoverSequence,
            "text article" => StoryKind::TextArticle,
            "advertisement" => StoryKind::Advertisement,
            "letters page" => StoryKind::LettersPage,
            _ => StoryKind::ComicStory,
        }
    }

    pub fn to_db_str(self) -> &'static str {
        match self {
            StoryKind::ComicStory => "comic story",
            StoryKind::CoverSequence => "cover",
            StoryKind::TextArticle => "text article",
            StoryKind::Advertisement => "advertisement",
            StoryKind::LettersPage => "letters page",
        }
    }
}

/// Image type; some types allow only one active image per owner.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ImageType {
    IndiciaScan,
    SoaScan,
    BrandScan,
}

impl ImageType {
    pub fn from_db_str(s: &str) -> Self {
        match s {
            "soa_scan" => ImageType::SoaScan,
            "brand_scan" => ImageType::BrandScan,
            _ => ImageType::IndiciaScan,
        }
    }

    pub fn to_db_str(self) -> &'static str {
        match self {
            ImageType::IndiciaScan => "indicia_scan",
            ImageType::SoaScan => "soa_scan",
            ImageType::BrandScan => "brand_scan",
        }
    }

    /// Whether at most one active image of this type may exist per owner.
    pub fn unique_per_owner(self) -> bool {
        match self {
            ImageType::IndiciaScan | ImageType::BrandScan => true,
            ImageType::SoaScan => false,
        }
    }
}

// =============================================================================
// Publisher family
// =============================================================================

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Publisher {
    pub id: i64,
    pub name: String,
    pub year_began: Option<i64>,
    pub year_ended: Option<i64>,
    pub year_began_uncertain: bool,
    pub year_ended_uncertain: bool,
    pub url: String,
    pub notes: String,
    pub country: String,
    pub series_count: i64,
    pub issue_count: i64,
    pub brand_count: i64,
    pub indicia_publisher_count: i64,
    pub reserved: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IndiciaPublisher {
    pub id: i64,
    pub name: String,
    pub year_began: Option<i64>,
    pub year_ended: Option<i64>,
    pub year_began_uncertain: bool,
    pub year_ended_uncertain: bool,
    pub url: String,
    pub notes: String,
    pub is_surrogate: bool,
    pub country: String,
    pub parent: i64,
    pub issue_count: i64,
    pub reserved: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BrandGroup {
    pub id: i64,
    pub name: String,
    pub year_began: Option<i64>,
    pub year_ended: Option<i64>,
    pub year_began_uncertain: bool,
    pub year_ended_uncertain: bool,
    pub url: String,
    pub notes: String,
    pub parent: i64,
    pub issue_count: i64,
    pub reserved: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Brand {
    pub id: i64,
    pub name: String,
    pub year_began: Option<i64>,
    pub year_ended: Option<i64>,
    pub year_began_uncertain: bool,
    pub year_ended_uncertain: bool,
    pub url: String,
    pub notes: String,
    pub issue_count: i64,
    pub reserved: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BrandUse {
    pub id: i64,
    pub emblem: i64,
    pub publisher: i64,
    pub year_began: Option<i64>,
    pub year_ended: Option<i64>,
    pub year_began_uncertain: bool,
    pub year_ended_uncertain: bool,
    pub notes: String,
    pub reserved: bool,
}

// =============================================================================
// Series and bonds
// =============================================================================

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Series {
    pub id: i64,
    pub name: String,
    pub sort_name: String,
    pub format: String,
    pub color: String,
    pub dimensions: String,
    pub paper_stock: String,
    pub binding: String,
    pub publishing_format: String,
    pub publication_type: Option<PublicationType>,
    pub notes: String,
    pub year_began: i64,
    pub year_ended: Option<i64>,
    pub year_began_uncertain: bool,
    pub year_ended_uncertain: bool,
    pub is_current: bool,
    pub is_singleton: bool,
    pub is_comics_publication: bool,
    pub publication_notes: String,
    pub tracking_notes: String,
    pub has_barcode: bool,
    pub has_indicia_frequency: bool,
    pub has_isbn: bool,
    pub has_issue_title: bool,
    pub has_volume: bool,
    pub has_rating: bool,
    pub has_gallery: bool,
    pub country: String,
    pub language: String,
    pub publisher: i64,
    pub issue_count: i64,
    pub first_issue: Option<i64>,
    pub last_issue: Option<i64>,
    pub reserved: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SeriesBond {
    pub id: i64,
    pub origin: i64,
    pub origin_issue: Option<i64>,
    pub target: i64,
    pub target_issue: Option<i64>,
    pub bond_type: BondType,
    pub notes: String,
    pub reserved: bool,
}

// =============================================================================
// Issues, stories, covers
// =============================================================================

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Issue {
    pub id: i64,
    pub number: String,
    pub title: String,
    pub no_title: bool,
    pub volume: String,
    pub no_volume: bool,
    pub display_volume_with_number: bool,
    pub variant_of: Option<i64>,
    pub variant_name: String,
    pub publication_date: String,
    pub key_date: String,
    pub on_sale_date: String,
    pub on_sale_date_uncertain: bool,
    pub indicia_frequency: String,
    pub no_indicia_frequency: bool,
    pub price: String,
    pub page_count: Option<f64>,
    pub page_count_uncertain: bool,
    pub editing: String,
    pub no_editing: bool,
    pub isbn: String,
    pub no_isbn: bool,
    pub valid_isbn: String,
    pub barcode: String,
    pub no_barcode: bool,
    pub rating: String,
    pub no_rating: bool,
    pub notes: String,
    pub series: i64,
    pub indicia_publisher: Option<i64>,
    pub indicia_pub_not_printed: bool,
    pub brand: Option<i64>,
    pub no_brand: bool,
    pub sort_code: i64,
    pub is_indexed: IndexedStatus,
    pub reserved: bool,
}

impl Default for Issue {
    fn default() -> Self {
        Issue {
            id: 0,
            number: String::new(),
            title: String::new(),
            no_title: false,
            volume: String::new(),
            no_volume: false,
            display_volume_with_number: false,
            variant_of: None,
            variant_name: String::new(),
            publication_date: String::new(),
            key_date: String::new(),
            on_sale_date: String::new(),
            on_sale_date_uncertain: false,
            indicia_frequency: String::new(),
            no_indicia_frequency: false,
            price: String::new(),
            page_count: None,
            page_count_uncertain: false,
            editing: String::new(),
            no_editing: false,
            isbn: String::new(),
            no_isbn: false,
            valid_isbn: String::new(),
            barcode: String::new(),
            no_barcode: false,
            rating: String::new(),
            no_rating: false,
            notes: String::new(),
            series: 0,
            indicia_publisher: None,
            indicia_pub_not_printed: false,
            brand: None,
            no_brand: false,
            sort_code: 0,
            is_indexed: IndexedStatus::Skeleton,
            reserved: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Story {
    pub id: i64,
    pub title: String,
    pub title_inferred: bool,
    pub feature: String,
    pub kind: StoryKind,
    pub sequence_number: i64,
    pub page_count: Option<f64>,
    pub page_count_uncertain: bool,
    pub script: String,
    pub pencils: String,
    pub inks: String,
    pub colors: String,
    pub letters: String,
    pub editing: String,
    pub no_script: bool,
    pub no_pencils: bool,
    pub no_inks: bool,
    pub no_colors: bool,
    pub no_letters: bool,
    pub no_editing: bool,
    pub job_number: String,
    pub genre: String,
    pub characters: String,
    pub synopsis: String,
    pub reprint_notes: String,
    pub notes: String,
    pub issue: i64,
    pub reserved: bool,
}

impl Default for Story {
    fn default() -> Self {
        Story {
            id: 0,
            title: String::new(),
            title_inferred: false,
            feature: String::new(),
            kind: StoryKind::ComicStory,
            sequence_number: 0,
            page_count: None,
            page_count_uncertain: false,
            script: String::new(),
            pencils: String::new(),
            inks: String::new(),
            colors: String::new(),
            letters: String::new(),
            editing: String::new(),
            no_script: false,
            no_pencils: false,
            no_inks: false,
            no_colors: false,
            no_letters: false,
            no_editing: false,
            job_number: String::new(),
            genre: String::new(),
            characters: String::new(),
            synopsis: String::new(),
            reprint_notes: String::new(),
            notes: String::new(),
            issue: 0,
            reserved: false,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Cover {
    pub id: i64,
    pub issue: i64,
    pub marked: bool,
    pub is_wraparound: bool,
    pub front_left: i64,
    pub front_right: i64,
    pub front_top: i64,
    pub front_bottom: i64,
    pub last_upload: Option<i64>,
    pub file_source: String,
    pub reserved: bool,
}

// =============================================================================
// Images
// =============================================================================

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Image {
    pub id: i64,
    pub owner_kind: EntityKind,
    pub owner_id: i64,
    pub image_type: ImageType,
    pub image_file: String,
    pub marked: bool,
    pub reserved: bool,
}

// =============================================================================
// Reprint links (four concrete shapes)
// =============================================================================

/// Which of the four concrete link tables a reprint row lives in.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ReprintKind {
    StoryToStory,
    IssueToStory,
    StoryToIssue,
    IssueToIssue,
}

impl ReprintKind {
    pub fn from_db_str(s: &str) -> Self {
        match s {
            "issue_to_story" => ReprintKind::IssueToStory,
            "story_to_issue" => ReprintKind::StoryToIssue,
            "issue_to_issue" => ReprintKind::IssueToIssue,
            _ => ReprintKind::StoryToStory,
        }
    }

    pub fn to_db_str(self) -> &'static str {
        match self {
            ReprintKind::StoryToStory => "story_to_story",
            ReprintKind::IssueToStory => "issue_to_story",
            ReprintKind::StoryToIssue => "story_to_issue",
            ReprintKind::IssueToIssue => "issue_to_issue",
        }
    }
}

/// A concrete reprint link row, independent of which table it lives in.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReprintLink {
    pub id: i64,
    pub kind: ReprintKind,
    /// Story id when the origin side is a story, issue id otherwise.
    pub origin: i64,
    /// Story id when the target side is a story, issue id otherwise.
    pub target: i64,
    pub notes: String,
    pub reserved: bool,
}
