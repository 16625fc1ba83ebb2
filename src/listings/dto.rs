use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use time::{macros::format_description, OffsetDateTime};

use crate::listings::repo_types::{Listing, ListingCard, ListingPatch, NewListing};

const REGION_CODES: RangeInclusive<i32> = 100_000..=999_999;

/// Accepted values of the enumerated attributes on a stored listing.
const DIRECTIONS: RangeInclusive<i32> = 1..=10;
const HEIGHTS: RangeInclusive<i32> = 1..=3;
const RENOVATIONS: RangeInclusive<i32> = 1..=4;
const ROOMS: RangeInclusive<i32> = 1..=5;
const SPECIALS: RangeInclusive<i32> = 1..=5;
const SUBJECT_MATTERS: RangeInclusive<i32> = 1..=4;

fn in_range(name: &str, value: i32, range: RangeInclusive<i32>) -> Result<i32, String> {
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(format!(
            "{name} must be between {} and {}",
            range.start(),
            range.end()
        ))
    }
}

fn positive(name: &str, value: f64) -> Result<f64, String> {
    if value > 0.0 && value.is_finite() {
        Ok(value)
    } else {
        Err(format!("{name} must be greater than 0"))
    }
}

fn region(value: i32) -> Result<i32, String> {
    if REGION_CODES.contains(&value) {
        Ok(value)
    } else {
        Err("address.distinct must be a 6-digit region code".into())
    }
}

fn details(value: String) -> Result<String, String> {
    let value = value.trim().to_string();
    if value.is_empty() {
        Err("address.details cannot be empty".into())
    } else {
        Ok(value)
    }
}

#[derive(Debug, Deserialize)]
pub struct AddressInput {
    pub distinct: i32,
    pub details: String,
}

/// Body of `POST /house/create/info`.
#[derive(Debug, Deserialize)]
pub struct CreateListingRequest {
    pub address: AddressInput,
    pub direction: i32,
    pub height: i32,
    pub price: f64,
    pub renovation: i32,
    pub room: i32,
    pub size: f64,
    pub special: i32,
    #[serde(rename = "subjectmatter")]
    pub subject_matter: i32,
}

impl CreateListingRequest {
    pub fn validate(self) -> Result<NewListing, String> {
        Ok(NewListing {
            region_code: region(self.address.distinct)?,
            address_details: details(self.address.details)?,
            direction: in_range("direction", self.direction, DIRECTIONS)?,
            height: in_range("height", self.height, HEIGHTS)?,
            price: positive("price", self.price)?,
            renovation: in_range("renovation", self.renovation, RENOVATIONS)?,
            room: in_range("room", self.room, ROOMS)?,
            size: positive("size", self.size)?,
            special: in_range("special", self.special, SPECIALS)?,
            subject_matter: in_range("subjectmatter", self.subject_matter, SUBJECT_MATTERS)?,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AddressPatchInput {
    pub distinct: Option<i32>,
    pub details: Option<String>,
}

/// Body of `PUT /house/update/info/:id`; absent fields are left unchanged.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateListingRequest {
    pub address: Option<AddressPatchInput>,
    pub direction: Option<i32>,
    pub height: Option<i32>,
    pub price: Option<f64>,
    pub renovation: Option<i32>,
    pub room: Option<i32>,
    pub size: Option<f64>,
    pub special: Option<i32>,
    #[serde(rename = "subjectmatter")]
    pub subject_matter: Option<i32>,
}

impl UpdateListingRequest {
    pub fn into_patch(self) -> Result<ListingPatch, String> {
        let address = self.address.unwrap_or_default();
        Ok(ListingPatch {
            region_code: address.distinct.map(region).transpose()?,
            address_details: address.details.map(details).transpose()?,
            direction: self
                .direction
                .map(|v| in_range("direction", v, DIRECTIONS))
                .transpose()?,
            height: self.height.map(|v| in_range("height", v, HEIGHTS)).transpose()?,
            renovation: self
                .renovation
                .map(|v| in_range("renovation", v, RENOVATIONS))
                .transpose()?,
            room: self.room.map(|v| in_range("room", v, ROOMS)).transpose()?,
            special: self.special.map(|v| in_range("special", v, SPECIALS)).transpose()?,
            subject_matter: self
                .subject_matter
                .map(|v| in_range("subjectmatter", v, SUBJECT_MATTERS))
                .transpose()?,
            price: self.price.map(|v| positive("price", v)).transpose()?,
            size: self.size.map(|v| positive("size", v)).transpose()?,
        })
    }
}

pub fn upload_time(at: OffsetDateTime) -> String {
    at.format(format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"))
        .unwrap_or_else(|_| at.to_string())
}

#[derive(Debug, Serialize)]
pub struct AddressOutput {
    pub distinct: i32,
    pub details: String,
}

#[derive(Debug, Serialize)]
pub struct ListingBasic {
    pub address: AddressOutput,
    pub price: f64,
    pub size: f64,
    pub room: i32,
    pub direction: i32,
    pub height: i32,
    pub renovation: i32,
    pub special: i32,
    #[serde(rename = "subjectmatter")]
    pub subject_matter: i32,
    #[serde(rename = "uploadTime")]
    pub upload_time: String,
}

/// Detail view of one listing.
#[derive(Debug, Serialize)]
pub struct ListingDetail {
    pub basic: ListingBasic,
    pub images: Vec<String>,
    #[serde(rename = "richText")]
    pub rich_text: String,
}

impl ListingDetail {
    pub fn new(listing: Listing, images: Vec<String>, rich_text: String) -> Self {
        Self {
            basic: ListingBasic {
                address: AddressOutput {
                    distinct: listing.region_code,
                    details: listing.address_details,
                },
                price: listing.price,
                size: listing.size,
                room: listing.room,
                direction: listing.direction,
                height: listing.height,
                renovation: listing.renovation,
                special: listing.special,
                subject_matter: listing.subject_matter,
                upload_time: upload_time(listing.created_at),
            },
            images,
            rich_text,
        }
    }
}

/// Entry of a listing list.
#[derive(Debug, Serialize)]
pub struct ListingSummary {
    pub cover: String,
    pub address: String,
    pub price: f64,
    pub size: f64,
    #[serde(rename = "houseID")]
    pub house_id: i64,
    #[serde(rename = "uploadTime")]
    pub upload_time: String,
}

impl ListingSummary {
    pub fn from_card(card: ListingCard, default_cover: &str) -> Self {
        Self {
            cover: card.cover.unwrap_or_else(|| default_cover.to_string()),
            address: card.address_details,
            price: card.price,
            size: card.size,
            house_id: card.id,
            upload_time: upload_time(card.created_at),
        }
    }
}
