use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use super::{
    claims::Audience,
    gate::{authorize, AudienceRule, Identity},
    repo_types::User,
};
use crate::{error::AppError, state::AppState};

async fn gate(parts: &mut Parts, state: &AppState, rule: AudienceRule) -> Result<Identity, AppError> {
    let header = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());
    let identity = authorize(&state.keys, &state.db, header, rule).await?;
    parts.extensions.insert(identity.clone());
    Ok(identity)
}

/// A user-audience session, resolved to its user row.
pub struct UserSession(pub User);

#[async_trait]
impl FromRequestParts<AppState> for UserSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match gate(parts, state, AudienceRule::Only(Audience::User)).await? {
            Identity::User(user) => Ok(UserSession(user)),
            Identity::Admin => Err(AppError::Auth(super::gate::AuthRejection::SubjectNotFound)),
        }
    }
}

/// An admin-audience session.
pub struct AdminSession;

#[async_trait]
impl FromRequestParts<AppState> for AdminSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match gate(parts, state, AudienceRule::Only(Audience::Admin)).await? {
            Identity::Admin => Ok(AdminSession),
            Identity::User(_) => Err(AppError::Auth(super::gate::AuthRejection::SubjectNotFound)),
        }
    }
}

/// Either audience; used by the few lookups both roles may call.
pub struct AnySession(pub Identity);

#[async_trait]
impl FromRequestParts<AppState> for AnySession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        gate(parts, state, AudienceRule::Either).await.map(AnySession)
    }
}
