//! Book records as returned by the catalog query service, plus the fixed
//! queries the storefront browses with.
//!
//! The service speaks the Google Books `volumes` shape. Every field in it is
//! optional, so records are normalized on the way in: a missing title becomes
//! "Untitled", a missing cover becomes the configured placeholder, missing
//! ratings become zero. Items without an identifier are dropped because
//! nothing downstream can key them.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::app_response::AppResponse;
use crate::store_model::{CartItem, Price};

pub const UNTITLED: &str = "Untitled";

/// The service refuses `maxResults` above this.
pub const MAX_RESULTS_LIMIT: u32 = 40;
pub const SEARCH_RESULTS: u32 = 40;
pub const DISCOVERY_RESULTS: u32 = 12;
pub const FEATURED_RESULTS: u32 = 8;

pub const BROWSE_CATEGORIES: [&str; 12] = [
    "Fiction",
    "Non-Fiction",
    "Science",
    "History",
    "Biography",
    "Fantasy",
    "Mystery",
    "Romance",
    "Thriller",
    "Self-Help",
    "Business",
    "Technology",
];

pub const DISCOVERY_SUBJECTS: [&str; 8] = [
    "fiction",
    "fantasy",
    "science",
    "history",
    "romance",
    "mystery",
    "biography",
    "technology",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeaturedShelf {
    pub name: &'static str,
    pub query: &'static str,
}

pub const FEATURED_SHELVES: [FeaturedShelf; 3] = [
    FeaturedShelf { name: "Best Sellers", query: "bestsellers" },
    FeaturedShelf { name: "New Releases", query: "new releases" },
    FeaturedShelf { name: "Award Winners", query: "award winners" },
];

/// Display price derived from the identifier: `(first UTF-16 unit % 26) + 5.99`.
///
/// Presentation only. `None` for an empty identifier.
pub fn display_price(id: &str) -> Option<Price> {
    let first = id.encode_utf16().next()?;
    let base = u64::from(first % 26) + 5;
    Some(Price::from_cents(base * 100 + 99))
}

/// A normalized catalog record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookRecord {
    pub id: String,
    pub title: String,
    pub subtitle: Option<String>,
    pub authors: Vec<String>,
    pub description: Option<String>,
    pub publisher: Option<String>,
    pub published_date: Option<String>,
    pub categories: Vec<String>,
    pub average_rating: f64,
    pub ratings_count: u64,
    pub page_count: Option<u32>,
    pub thumbnail: Option<String>,
    pub small_thumbnail: Option<String>,
    /// Thumbnail, else small thumbnail, else the placeholder.
    pub cover: String,
    pub info_link: Option<String>,
    pub preview_link: Option<String>,
}

impl BookRecord {
    pub fn display_price(&self) -> Price {
        display_price(&self.id).unwrap_or(Price::ZERO)
    }

    /// Up to two category tags, each cut to its top-level segment
    /// (`"Fiction / Fantasy / Epic"` → `"Fiction"`).
    pub fn primary_categories(&self) -> Vec<&str> {
        self.categories
            .iter()
            .take(2)
            .filter_map(|category| category.split('/').next())
            .map(str::trim)
            .filter(|category| !category.is_empty())
            .collect()
    }

    pub fn authors_display(&self) -> String {
        if self.authors.is_empty() {
            "Unknown author".to_string()
        } else {
            self.authors.join(", ")
        }
    }

    /// The line item a card's "add to cart" button hands to the store.
    pub fn to_cart_item(&self) -> CartItem {
        CartItem::new(self.id.clone(), self.title.clone(), self.display_price(), self.cover.clone())
    }
}

/// Body of a `volumes` response, before normalization.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct VolumesResponse {
    #[serde(default)]
    items: Option<Vec<Volume>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Volume {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    volume_info: Option<VolumeInfo>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct VolumeInfo {
    title: Option<String>,
    subtitle: Option<String>,
    authors: Option<Vec<String>>,
    description: Option<String>,
    publisher: Option<String>,
    published_date: Option<String>,
    categories: Option<Vec<String>>,
    average_rating: Option<f64>,
    ratings_count: Option<u64>,
    page_count: Option<u32>,
    image_links: Option<ImageLinks>,
    info_link: Option<String>,
    preview_link: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ImageLinks {
    thumbnail: Option<String>,
    small_thumbnail: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl Volume {
    fn into_record(self, placeholder_cover: &str) -> Option<BookRecord> {
        let id = non_blank(self.id)?;
        let info = self.volume_info.unwrap_or_default();
        let links = info.image_links.unwrap_or_default();
        let thumbnail = non_blank(links.thumbnail);
        let small_thumbnail = non_blank(links.small_thumbnail);
        let cover = thumbnail
            .clone()
            .or_else(|| small_thumbnail.clone())
            .unwrap_or_else(|| placeholder_cover.to_string());

        Some(BookRecord {
            id,
            title: non_blank(info.title).unwrap_or_else(|| UNTITLED.to_string()),
            subtitle: non_blank(info.subtitle),
            authors: info.authors.unwrap_or_default(),
            description: non_blank(info.description),
            publisher: non_blank(info.publisher),
            published_date: non_blank(info.published_date),
            categories: info.categories.unwrap_or_default(),
            average_rating: info
                .average_rating
                .filter(|rating| rating.is_finite() && *rating >= 0.0)
                .unwrap_or(0.0),
            ratings_count: info.ratings_count.unwrap_or(0),
            page_count: info.page_count,
            thumbnail,
            small_thumbnail,
            cover,
            info_link: non_blank(info.info_link),
            preview_link: non_blank(info.preview_link),
        })
    }
}

impl VolumesResponse {
    /// A response without `items` is an empty result, not an error.
    pub(crate) fn into_records(self, placeholder_cover: &str) -> Vec<BookRecord> {
        self.items
            .unwrap_or_default()
            .into_iter()
            .filter_map(|volume| volume.into_record(placeholder_cover))
            .collect()
    }
}

/// Parses a `volumes` response body.
pub fn parse_volumes(body: &str, placeholder_cover: &str) -> Result<Vec<BookRecord>, AppResponse> {
    let response: VolumesResponse = serde_json::from_str(body)?;
    Ok(response.into_records(placeholder_cover))
}

/// What to look for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CatalogQuery {
    /// Free text typed by the visitor.
    Text(String),
    /// A browse category or featured shelf keyword.
    Category(String),
    /// A `subject:` discovery query.
    Subject(String),
}

impl CatalogQuery {
    /// The value sent as the `q` parameter.
    pub fn query_param(&self) -> String {
        match self {
            CatalogQuery::Text(text) => text.trim().to_string(),
            CatalogQuery::Category(label) => label.trim().to_string(),
            CatalogQuery::Subject(subject) => format!("subject:{}", subject.trim()),
        }
    }

    pub fn validate(&self) -> Result<(), AppResponse> {
        let raw = match self {
            CatalogQuery::Text(s) | CatalogQuery::Category(s) | CatalogQuery::Subject(s) => s,
        };
        if raw.trim().is_empty() {
            return Err(AppResponse::ValidationError("Catalog query is blank".to_string()));
        }
        Ok(())
    }
}

impl Display for CatalogQuery {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogQuery::Text(text) => write!(f, "search '{}'", text.trim()),
            CatalogQuery::Category(label) => write!(f, "category '{}'", label.trim()),
            CatalogQuery::Subject(subject) => write!(f, "subject '{}'", subject.trim()),
        }
    }
}

/// A query plus its result bound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRequest {
    pub query: CatalogQuery,
    pub max_results: u32,
}

impl CatalogRequest {
    /// `max_results` is clamped to `1..=MAX_RESULTS_LIMIT`.
    pub fn new(query: CatalogQuery, max_results: u32) -> Self {
        CatalogRequest {
            query,
            max_results: max_results.clamp(1, MAX_RESULTS_LIMIT),
        }
    }

    pub fn search(text: impl Into<String>) -> Self {
        Self::new(CatalogQuery::Text(text.into()), SEARCH_RESULTS)
    }

    pub fn browse(category: impl Into<String>) -> Self {
        Self::new(CatalogQuery::Category(category.into()), SEARCH_RESULTS)
    }

    pub fn featured(shelf: &FeaturedShelf) -> Self {
        Self::new(CatalogQuery::Category(shelf.query.to_string()), FEATURED_RESULTS)
    }

    /// Discovery shelf for the subject at `index`, wrapping around the list.
    pub fn discover(index: usize) -> Self {
        let subject = DISCOVERY_SUBJECTS[index % DISCOVERY_SUBJECTS.len()];
        Self::new(CatalogQuery::Subject(subject.to_string()), DISCOVERY_RESULTS)
    }
}
