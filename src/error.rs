use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::{
    auth::{gate::AuthRejection, jwt::TokenError, password::PasswordError},
    filter::FilterError,
    images::services::{ImageSetError, UploadError},
};

/// Error returned by every handler. Rendered as `{ errno, message }`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Auth(#[from] AuthRejection),

    #[error("invalid phone or password")]
    BadCredentials,

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("blob store error: {0}")]
    BlobStore(#[source] anyhow::Error),

    #[error("transaction aborted during {step}: {source}")]
    TransactionAbort {
        step: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        AppError::NotFound(what.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        AppError::Conflict(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Auth(AuthRejection::StoreFailure(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Auth(_) | AppError::BadCredentials => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Store(_)
            | AppError::BlobStore(_)
            | AppError::TransactionAbort { .. }
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Application-level status code carried in the envelope.
    pub fn errno(&self) -> u32 {
        match self {
            AppError::Validation(_) => 40000,
            AppError::Auth(rejection) => match rejection {
                AuthRejection::MissingToken => 40050,
                AuthRejection::InvalidToken(TokenError::Expired) => 40101,
                AuthRejection::InvalidToken(_) => 40100,
                AuthRejection::SubjectNotFound => 40102,
                AuthRejection::WrongAudience { .. } => 40150,
                AuthRejection::StoreFailure(_) => 50005,
            },
            AppError::BadCredentials => 40110,
            AppError::NotFound(_) => 40400,
            AppError::Conflict(_) => 40900,
            AppError::Store(_) => 50000,
            AppError::BlobStore(_) => 50020,
            AppError::TransactionAbort { .. } => 50030,
            AppError::Internal(_) => 50099,
        }
    }

    /// Client-facing message. Server faults never leak their cause.
    fn public_message(&self) -> String {
        match self {
            AppError::Auth(AuthRejection::StoreFailure(_)) => "failed to resolve token subject".into(),
            AppError::Auth(AuthRejection::SubjectNotFound) => "unauthorized".into(),
            AppError::Store(_) => "database error occurred".into(),
            AppError::BlobStore(_) => "object storage error occurred".into(),
            AppError::TransactionAbort { .. } => "operation aborted, nothing was changed".into(),
            AppError::Internal(_) => "internal server error".into(),
            other => other.to_string(),
        }
    }
}

impl From<FilterError> for AppError {
    fn from(err: FilterError) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<PasswordError> for AppError {
    fn from(err: PasswordError) -> Self {
        match err {
            PasswordError::TooShort { .. } => AppError::Validation(err.to_string()),
            other => AppError::Internal(anyhow::Error::new(other)),
        }
    }
}

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<ImageSetError> for AppError {
    fn from(err: ImageSetError) -> Self {
        match err {
            ImageSetError::ListingNotFound(id) => AppError::NotFound(format!("listing {id}")),
            ImageSetError::AlreadyPresent(id) => {
                AppError::Conflict(format!("images of listing {id} already exist"))
            }
            ImageSetError::Rejected(e) => e.into(),
            ImageSetError::Aborted { step, source } => AppError::TransactionAbort { step, source },
        }
    }
}

/// Maps a unique-key violation to a conflict, anything else to a store error.
pub fn conflict_on_unique(err: sqlx::Error, message: &str) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => AppError::conflict(message),
        _ => AppError::Store(err),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = ?self, errno = self.errno(), "request failed");
        }
        let body = json!({
            "errno": self.errno(),
            "message": self.public_message(),
        });
        (status, Json(body)).into_response()
    }
}
