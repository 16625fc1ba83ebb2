use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;

/// Row of `properties`.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Listing {
    pub id: i64,
    pub region_code: i32,
    pub address_details: String,
    pub direction: i32,
    pub height: i32,
    pub renovation: i32,
    pub room: i32,
    pub special: i32,
    pub subject_matter: i32,
    pub price: f64,
    pub size: f64,
    pub rich_text_url: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Row of `property_images`.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ListingImage {
    pub id: i64,
    pub property_id: i64,
    pub url: String,
    pub is_main: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Listing joined with its main image, as shown in list views.
#[derive(Debug, Clone, FromRow)]
pub struct ListingCard {
    pub id: i64,
    pub address_details: String,
    pub price: f64,
    pub size: f64,
    pub created_at: OffsetDateTime,
    pub cover: Option<String>,
}

/// Base attributes written on create.
#[derive(Debug, Clone, PartialEq)]
pub struct NewListing {
    pub region_code: i32,
    pub address_details: String,
    pub direction: i32,
    pub height: i32,
    pub renovation: i32,
    pub room: i32,
    pub special: i32,
    pub subject_matter: i32,
    pub price: f64,
    pub size: f64,
}

/// Sparse base-info update: only present fields are written.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ListingPatch {
    pub region_code: Option<i32>,
    pub address_details: Option<String>,
    pub direction: Option<i32>,
    pub height: Option<i32>,
    pub renovation: Option<i32>,
    pub room: Option<i32>,
    pub special: Option<i32>,
    pub subject_matter: Option<i32>,
    pub price: Option<f64>,
    pub size: Option<f64>,
}

impl ListingPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
