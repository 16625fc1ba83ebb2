use axum::{
    extract::{Path, State},
    routing::{delete, get, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        claims::{Audience, ADMIN_SUBJECT},
        dto::{
            AdminLoginRequest, InviteCodeRequest, LoginRequest, LoginResponse, PublicUser,
            RegisterRequest, UpdateSelfRequest, UserInfoResponse, UserListResponse,
        },
        extractors::{AdminSession, AnySession, UserSession},
        password::{ensure_strength, hash_password, verify_password},
        repo,
        repo_types::{User, UserPatch},
    },
    error::{conflict_on_unique, AppError},
    response::{ApiResponse, ApiResult},
    state::AppState,
};

const INVITE_CODE_MAX_LEN: usize = 6;

pub(crate) fn is_valid_phone(phone: &str) -> bool {
    lazy_static! {
        static ref PHONE_RE: Regex = Regex::new(r"^\d{11}$").unwrap();
    }
    PHONE_RE.is_match(phone)
}

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/admin/login", post(admin_login))
}

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/user/info/:phone", get(user_info))
        .route("/user/update", post(update_self))
        .route("/user/list", get(list_users))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/info/:phone", get(admin_user_info))
        .route("/admin/list", get(admin_list_users))
        .route("/admin/delete/user/:phone", delete(admin_delete_user))
        .route("/admin/invite_code", post(admin_invite_code))
}

fn sign_failure(e: crate::auth::jwt::TokenError) -> AppError {
    AppError::Internal(anyhow::Error::from(e).context("jwt sign failed"))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> ApiResult<()> {
    payload.phone = payload.phone.trim().to_string();
    payload.username = payload.username.trim().to_string();

    if payload.username.is_empty()
        || ensure_strength(&payload.password).is_err()
        || !is_valid_phone(&payload.phone)
    {
        warn!("invalid registration fields");
        return Err(AppError::validation("invalid username, password or phone"));
    }

    let invite = repo::current_invite_code(&state.db).await?;
    if invite.as_deref() != Some(payload.invite_code.trim()) {
        warn!(phone = %payload.phone, "invalid invite code");
        return Err(AppError::validation("invalid invite code"));
    }

    if User::find_by_phone(&state.db, &payload.phone).await?.is_some() {
        warn!(phone = %payload.phone, "phone already registered");
        return Err(AppError::conflict("this phone already exists"));
    }

    let hash = hash_password(&payload.password)?;
    let user = User::create(&state.db, &payload.phone, &payload.username, &hash)
        .await
        .map_err(|e| conflict_on_unique(e, "this phone already exists"))?;

    info!(phone = %user.phone, "user registered");
    Ok(ApiResponse::message("user created successfully"))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginRequest>,
) -> ApiResult<LoginResponse> {
    payload.phone = payload.phone.trim().to_string();

    if !is_valid_phone(&payload.phone) || ensure_strength(&payload.password).is_err() {
        warn!("invalid login fields");
        return Err(AppError::validation("invalid phone or password"));
    }

    let Some(user) = User::find_by_phone(&state.db, &payload.phone).await? else {
        warn!(phone = %payload.phone, "login unknown phone");
        return Err(AppError::BadCredentials);
    };

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(phone = %payload.phone, "login invalid password");
        return Err(AppError::BadCredentials);
    }

    let token = state
        .keys
        .issue(&user.phone, Audience::User)
        .map_err(sign_failure)?;

    info!(phone = %user.phone, "user logged in");
    Ok(ApiResponse::with(
        "login successfully",
        "result",
        LoginResponse {
            user: PublicUser::from(&user),
            token,
        },
    ))
}

#[instrument(skip(state, payload))]
pub async fn admin_login(
    State(state): State<AppState>,
    Json(payload): Json<AdminLoginRequest>,
) -> ApiResult<String> {
    if payload.password.is_empty() {
        return Err(AppError::validation("password is empty"));
    }

    if !verify_password(&payload.password, &state.config.admin_password_hash)? {
        warn!("admin login invalid password");
        return Err(AppError::BadCredentials);
    }

    let token = state
        .keys
        .issue(ADMIN_SUBJECT, Audience::Admin)
        .map_err(sign_failure)?;

    info!("admin logged in");
    Ok(ApiResponse::with("login as admin successfully", "token", token))
}

async fn lookup_user(state: &AppState, phone: &str) -> Result<User, AppError> {
    if !is_valid_phone(phone) {
        return Err(AppError::validation("invalid phone number"));
    }
    User::find_by_phone(&state.db, phone)
        .await?
        .ok_or_else(|| AppError::not_found("user"))
}

#[instrument(skip(state, identity))]
pub async fn user_info(
    State(state): State<AppState>,
    AnySession(identity): AnySession,
    Path(phone): Path<String>,
) -> ApiResult<UserInfoResponse> {
    let user = lookup_user(&state, &phone).await?;
    info!(caller = identity.subject(), %phone, "user info");
    Ok(ApiResponse::with(
        "get user info successfully",
        "result",
        UserInfoResponse { user },
    ))
}

#[instrument(skip(state, _admin))]
pub async fn admin_user_info(
    State(state): State<AppState>,
    _admin: AdminSession,
    Path(phone): Path<String>,
) -> ApiResult<UserInfoResponse> {
    let user = lookup_user(&state, &phone).await?;
    Ok(ApiResponse::with(
        "get user info successfully",
        "result",
        UserInfoResponse { user },
    ))
}

#[instrument(skip(state, identity))]
pub async fn list_users(
    State(state): State<AppState>,
    AnySession(identity): AnySession,
) -> ApiResult<UserListResponse> {
    let users = User::list(&state.db).await?;
    info!(caller = identity.subject(), count = users.len(), "list users");
    Ok(ApiResponse::with(
        "get user list successfully",
        "result",
        UserListResponse { users },
    ))
}

#[instrument(skip(state, _admin))]
pub async fn admin_list_users(
    State(state): State<AppState>,
    _admin: AdminSession,
) -> ApiResult<UserListResponse> {
    let users = User::list(&state.db).await?;
    Ok(ApiResponse::with(
        "get user list successfully",
        "result",
        UserListResponse { users },
    ))
}

#[instrument(skip(state, user, payload))]
pub async fn update_self(
    State(state): State<AppState>,
    UserSession(user): UserSession,
    Json(payload): Json<UpdateSelfRequest>,
) -> ApiResult<()> {
    let mut patch = UserPatch::default();

    if let Some(username) = payload.username.map(|s| s.trim().to_string()) {
        if !username.is_empty() && username != user.username {
            patch.username = Some(username);
        }
    }

    if let Some(password) = payload.password.filter(|p| !p.is_empty()) {
        patch.password_hash = Some(hash_password(&password)?);
    }

    if patch.is_empty() {
        return Ok(ApiResponse::message("nothing to update"));
    }

    User::apply_patch(&state.db, &user.phone, &patch)
        .await?
        .ok_or_else(|| AppError::not_found("user"))?;

    info!(phone = %user.phone, "user updated");
    Ok(ApiResponse::message("user updated successfully"))
}

#[instrument(skip(state, _admin))]
pub async fn admin_delete_user(
    State(state): State<AppState>,
    _admin: AdminSession,
    Path(phone): Path<String>,
) -> ApiResult<User> {
    if !is_valid_phone(&phone) {
        return Err(AppError::validation("invalid phone"));
    }
    let user = User::delete_by_phone(&state.db, &phone)
        .await?
        .ok_or_else(|| AppError::not_found("user"))?;

    info!(%phone, "user deleted by admin");
    Ok(ApiResponse::with("delete user successfully", "user", user))
}

#[instrument(skip(state, _admin, payload))]
pub async fn admin_invite_code(
    State(state): State<AppState>,
    _admin: AdminSession,
    Json(payload): Json<InviteCodeRequest>,
) -> ApiResult<()> {
    let code = payload.code.trim();
    if code.is_empty() || code.chars().count() > INVITE_CODE_MAX_LEN {
        return Err(AppError::validation(format!(
            "invite code must be 1 to {INVITE_CODE_MAX_LEN} characters"
        )));
    }
    repo::replace_invite_code(&state.db, code).await?;
    info!("invite code replaced");
    Ok(ApiResponse::message("invite code updated successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_must_be_eleven_digits() {
        assert!(is_valid_phone("13800000000"));
        assert!(!is_valid_phone("1380000000"));
        assert!(!is_valid_phone("138000000001"));
        assert!(!is_valid_phone("1380000000a"));
        assert!(!is_valid_phone(""));
    }

    #[test]
    fn login_response_serialization() {
        let response = LoginResponse {
            user: PublicUser {
                phone: "13800000000".into(),
                username: "alice".into(),
            },
            token: "t".into(),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["user"]["phone"], "13800000000");
        assert_eq!(json["token"], "t");
    }
}
