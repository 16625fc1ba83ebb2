use axum::{
    extract::{Path, State},
    routing::{delete, get, post, put},
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::extractors::{AdminSession, UserSession},
    customers::{
        dto::{CreateCustomerRequest, UpdateCustomerRequest},
        repo_types::Customer,
    },
    error::{conflict_on_unique, AppError},
    response::{ApiResponse, ApiResult},
    state::AppState,
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/customer/create", post(create_customer))
        .route("/customer/list", get(list_customers_masked))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/customer/list", get(list_customers))
        .route("/admin/customer/update/:customer_id", put(update_customer))
        .route("/admin/customer/delete/:customer_id", delete(delete_customer))
}

#[instrument(skip(state, user, payload))]
pub async fn create_customer(
    State(state): State<AppState>,
    UserSession(user): UserSession,
    Json(payload): Json<CreateCustomerRequest>,
) -> ApiResult<()> {
    let new = payload.validate().map_err(|msg| {
        warn!(phone = %user.phone, %msg, "invalid customer");
        AppError::Validation(msg)
    })?;

    if Customer::exists(&state.db, &new.customer_id).await? {
        return Err(AppError::conflict("customer_id already exists"));
    }
    let customer = Customer::create(&state.db, &new)
        .await
        .map_err(|e| conflict_on_unique(e, "customer already exists"))?;

    info!(customer_id = %customer.customer_id, by = %user.phone, "customer created");
    Ok(ApiResponse::message("create customer successfully"))
}

#[instrument(skip(state, _user))]
pub async fn list_customers_masked(
    State(state): State<AppState>,
    _user: UserSession,
) -> ApiResult<Vec<Customer>> {
    let customers = Customer::list(&state.db)
        .await?
        .into_iter()
        .map(Customer::masked)
        .collect();
    Ok(ApiResponse::with("list customer successfully", "results", customers))
}

#[instrument(skip(state, _admin))]
pub async fn list_customers(
    State(state): State<AppState>,
    _admin: AdminSession,
) -> ApiResult<Vec<Customer>> {
    let customers = Customer::list(&state.db).await?;
    Ok(ApiResponse::with("list customer successfully", "results", customers))
}

#[instrument(skip(state, _admin, payload))]
pub async fn update_customer(
    State(state): State<AppState>,
    _admin: AdminSession,
    Path(customer_id): Path<String>,
    Json(payload): Json<UpdateCustomerRequest>,
) -> ApiResult<Customer> {
    let patch = payload.into_patch().map_err(AppError::Validation)?;
    if patch.is_empty() {
        return Err(AppError::validation("nothing to update"));
    }
    let customer = Customer::apply_patch(&state.db, &customer_id, &patch)
        .await
        .map_err(|e| conflict_on_unique(e, "phone already belongs to another customer"))?
        .ok_or_else(|| AppError::not_found(format!("customer {customer_id}")))?;

    info!(%customer_id, "customer updated");
    Ok(ApiResponse::with("update customer successfully", "results", customer))
}

#[instrument(skip(state, _admin))]
pub async fn delete_customer(
    State(state): State<AppState>,
    _admin: AdminSession,
    Path(customer_id): Path<String>,
) -> ApiResult<()> {
    if !Customer::delete(&state.db, &customer_id).await? {
        return Err(AppError::not_found(format!("customer {customer_id}")));
    }
    info!(%customer_id, "customer deleted");
    Ok(ApiResponse::message("delete customer successfully"))
}
