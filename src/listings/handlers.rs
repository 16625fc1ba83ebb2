use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    routing::{delete, get, post, put},
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{extractors::UserSession, repo_types::User},
    error::AppError,
    filter::{self, AddressFilter, FilterRequest, Predicate},
    images::{self, UploadItem},
    listings::{
        dto::{CreateListingRequest, ListingDetail, ListingSummary, UpdateListingRequest},
        repo_types::{Listing, ListingImage},
        services::{self, RichTextMode, RICH_TEXT_FIELD},
    },
    response::{ApiResponse, ApiResult},
    state::AppState,
};

const IMAGES_FIELD: &str = "images";

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/house/info/:id", get(get_listing))
        .route("/house/list", get(list_listings))
        .route("/house/select", post(select_listings))
        .route("/house/search", get(search_listings))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/house/create/info", post(create_listing))
        .route("/house/create/image/:id", post(create_images))
        .route("/house/create/richtext/:id", post(create_rich_text))
        .route("/house/update/info/:id", put(update_listing))
        .route("/house/update/image/:id", put(replace_images))
        .route("/house/update/richtext/:id", put(replace_rich_text))
        .route("/house/delete/:id", delete(delete_listing))
        .layer(DefaultBodyLimit::max(32 * 1024 * 1024)) // 32MB
}

/// Collects every file part named `field`. Empty file inputs are skipped.
async fn collect_files(mut mp: Multipart, field: &str) -> Result<Vec<UploadItem>, AppError> {
    let mut files = Vec::new();
    while let Some(part) = mp
        .next_field()
        .await
        .map_err(|e| AppError::validation(format!("malformed multipart body: {e}")))?
    {
        if part.name() != Some(field) {
            continue;
        }
        let file_name = part.file_name().map(str::to_string);
        let content_type = part.content_type().map(str::to_string);
        let body = part
            .bytes()
            .await
            .map_err(|e| AppError::validation(format!("failed to read {field}: {e}")))?;
        if body.is_empty() && file_name.as_deref().map_or(true, str::is_empty) {
            continue;
        }
        files.push(UploadItem {
            file_name,
            content_type,
            body,
        });
    }
    Ok(files)
}

#[instrument(skip(state, user, payload))]
pub async fn create_listing(
    State(state): State<AppState>,
    UserSession(user): UserSession,
    Json(payload): Json<CreateListingRequest>,
) -> ApiResult<i64> {
    let new = payload.validate().map_err(|msg| {
        warn!(phone = %user.phone, %msg, "invalid listing");
        AppError::Validation(msg)
    })?;
    let listing = Listing::create(&state.db, &new).await?;
    info!(listing_id = listing.id, phone = %user.phone, "listing created");
    Ok(ApiResponse::with("property created successfully", "houseID", listing.id))
}

#[instrument(skip(state, _user, mp))]
pub async fn create_images(
    State(state): State<AppState>,
    _user: UserSession,
    Path(id): Path<i64>,
    mp: Multipart,
) -> ApiResult<Vec<ListingImage>> {
    let files = collect_files(mp, IMAGES_FIELD).await?;
    let rows = images::add_images(
        &state.db,
        state.storage.as_ref(),
        &state.config.assets.default_image_url,
        id,
        files,
    )
    .await?;
    Ok(ApiResponse::with("images uploaded successfully", "images", rows))
}

#[instrument(skip(state, _user, mp))]
pub async fn replace_images(
    State(state): State<AppState>,
    _user: UserSession,
    Path(id): Path<i64>,
    mp: Multipart,
) -> ApiResult<Vec<ListingImage>> {
    let files = collect_files(mp, IMAGES_FIELD).await?;
    let rows = images::replace_images(
        &state.db,
        state.storage.as_ref(),
        &state.config.assets.default_image_url,
        id,
        files,
    )
    .await?;
    Ok(ApiResponse::with("images replaced successfully", "images", rows))
}

#[instrument(skip(state, _user, mp))]
pub async fn create_rich_text(
    State(state): State<AppState>,
    _user: UserSession,
    Path(id): Path<i64>,
    mp: Multipart,
) -> ApiResult<()> {
    let files = collect_files(mp, RICH_TEXT_FIELD).await?;
    services::store_rich_text(&state, id, files, RichTextMode::Create).await?;
    Ok(ApiResponse::message("rich text created successfully"))
}

#[instrument(skip(state, _user, mp))]
pub async fn replace_rich_text(
    State(state): State<AppState>,
    _user: UserSession,
    Path(id): Path<i64>,
    mp: Multipart,
) -> ApiResult<()> {
    let files = collect_files(mp, RICH_TEXT_FIELD).await?;
    services::store_rich_text(&state, id, files, RichTextMode::Replace).await?;
    Ok(ApiResponse::message("rich text updated successfully"))
}

#[instrument(skip(state, _user))]
pub async fn get_listing(
    State(state): State<AppState>,
    _user: UserSession,
    Path(id): Path<i64>,
) -> ApiResult<ListingDetail> {
    let detail = services::detail(&state, id).await?;
    Ok(ApiResponse::with("successfully get property by ID", "results", detail))
}

async fn run_filter(state: &AppState, predicate: &Predicate) -> Result<Vec<ListingSummary>, AppError> {
    services::summaries(&state.db, predicate, &state.config.assets.default_image_url).await
}

#[instrument(skip(state, _user))]
pub async fn list_listings(
    State(state): State<AppState>,
    _user: UserSession,
) -> ApiResult<Vec<ListingSummary>> {
    let results = run_filter(&state, &Predicate::default()).await?;
    Ok(ApiResponse::with("successfully get all properties", "results", results))
}

#[instrument(skip(state, user, payload))]
pub async fn select_listings(
    State(state): State<AppState>,
    UserSession(user): UserSession,
    Json(payload): Json<FilterRequest>,
) -> ApiResult<Vec<ListingSummary>> {
    let predicate = filter::compile(&payload).map_err(|e| {
        warn!(phone = %user.phone, error = %e, "rejected filter");
        e
    })?;
    let results = run_filter(&state, &predicate).await?;
    info!(clauses = predicate.clauses.len(), hits = results.len(), "listings selected");
    Ok(ApiResponse::with("successfully get selected properties", "results", results))
}

#[instrument(skip(state, _user))]
pub async fn search_listings(
    State(state): State<AppState>,
    _user: UserSession,
    Query(address): Query<AddressFilter>,
) -> ApiResult<Vec<ListingSummary>> {
    let predicate = filter::compile(&FilterRequest::address_only(address))?;
    let results = run_filter(&state, &predicate).await?;
    Ok(ApiResponse::with("successfully search properties", "results", results))
}

#[instrument(skip(state, user, payload))]
pub async fn update_listing(
    State(state): State<AppState>,
    UserSession(user): UserSession,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateListingRequest>,
) -> ApiResult<i64> {
    let patch = payload.into_patch().map_err(AppError::Validation)?;
    if patch.is_empty() {
        return Err(AppError::validation("nothing to update"));
    }
    let listing = Listing::apply_patch(&state.db, id, &patch)
        .await?
        .ok_or_else(|| AppError::not_found(format!("listing {id}")))?;
    log_change(&user, listing.id, "listing updated");
    Ok(ApiResponse::with("property updated successfully", "houseID", listing.id))
}

#[instrument(skip(state, user))]
pub async fn delete_listing(
    State(state): State<AppState>,
    UserSession(user): UserSession,
    Path(id): Path<i64>,
) -> ApiResult<()> {
    Listing::delete(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("listing {id}")))?;
    log_change(&user, id, "listing deleted");
    Ok(ApiResponse::message("property deleted successfully"))
}

fn log_change(user: &User, listing_id: i64, what: &'static str) {
    info!(listing_id, phone = %user.phone, "{what}");
}
