use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    catalog::ListingCatalog,
    error::AppError,
    filter::Predicate,
    images::services::{validate_html, UploadError, UploadItem},
    listings::{
        dto::{ListingDetail, ListingSummary},
        repo_types::Listing,
    },
    state::AppState,
};

pub const RICH_TEXT_FIELD: &str = "richText";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RichTextMode {
    /// Only allowed while the listing has no rich text.
    Create,
    Replace,
}

/// Picks the single rich-text file out of a multipart upload.
pub fn single_rich_text(mut files: Vec<UploadItem>) -> Result<Option<UploadItem>, UploadError> {
    if files.len() > 1 {
        return Err(UploadError::TooMany {
            field: RICH_TEXT_FIELD,
        });
    }
    let file = files.pop();
    if let Some(f) = &file {
        validate_html(f)?;
    }
    Ok(file)
}

/// Stores the rich-text document of a listing and returns its URL. No file
/// means the default document.
pub async fn store_rich_text(
    state: &AppState,
    listing_id: i64,
    files: Vec<UploadItem>,
    mode: RichTextMode,
) -> Result<String, AppError> {
    let file = single_rich_text(files)?;

    let listing = Listing::find(&state.db, listing_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("listing {listing_id}")))?;
    if mode == RichTextMode::Create && !listing.rich_text_url.is_empty() {
        return Err(AppError::conflict("listing rich text already exists"));
    }

    let (url, key) = match file {
        Some(f) => {
            let key = format!("richtext/{}/{}.html", listing_id, Uuid::new_v4());
            state
                .storage
                .put_object(&key, f.body, "text/html")
                .await
                .map_err(AppError::BlobStore)?;
            (state.storage.object_url(&key), Some(key))
        }
        None => (state.config.assets.default_html_url.clone(), None),
    };

    let stored = match mode {
        RichTextMode::Create => Listing::set_rich_text_once(&state.db, listing_id, &url).await,
        RichTextMode::Replace => Listing::set_rich_text(&state.db, listing_id, &url).await,
    };

    let failure = match stored {
        Ok(true) => {
            info!(listing_id, ?mode, "rich text stored");
            return Ok(url);
        }
        Ok(false) if mode == RichTextMode::Create => {
            AppError::conflict("listing rich text already exists")
        }
        Ok(false) => AppError::not_found(format!("listing {listing_id}")),
        Err(e) => AppError::Store(e),
    };

    if let Some(key) = key {
        if let Err(e) = state.storage.delete_object(&key).await {
            warn!(error = %e, %key, "failed to remove orphaned rich text");
        }
    }
    Err(failure)
}

pub async fn detail(state: &AppState, listing_id: i64) -> Result<ListingDetail, AppError> {
    let listing = Listing::find(&state.db, listing_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("listing {listing_id}")))?;
    let images = Listing::images(&state.db, listing_id)
        .await?
        .into_iter()
        .map(|i| i.url)
        .collect();
    let rich_text = listing.rich_text_url.clone();
    Ok(ListingDetail::new(listing, images, rich_text))
}

/// Runs `predicate` against the catalog and renders list entries.
pub async fn summaries(
    catalog: &dyn ListingCatalog,
    predicate: &Predicate,
    default_cover: &str,
) -> Result<Vec<ListingSummary>, AppError> {
    let cards = catalog.select_cards(predicate).await?;
    Ok(cards
        .into_iter()
        .map(|card| ListingSummary::from_card(card, default_cover))
        .collect())
}
