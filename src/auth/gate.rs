//! Request authorization: bearer token -> verified claims -> resolved identity.

use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{debug, warn};

use crate::auth::{
    claims::{Audience, ADMIN_SUBJECT},
    jwt::{JwtKeys, TokenError},
    repo_types::User,
};

/// Who a request acts as once the gate has let it through.
#[derive(Debug, Clone)]
pub enum Identity {
    Admin,
    User(User),
}

impl Identity {
    pub fn subject(&self) -> &str {
        match self {
            Identity::Admin => ADMIN_SUBJECT,
            Identity::User(user) => &user.phone,
        }
    }
}

/// Audiences a route accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudienceRule {
    Only(Audience),
    Either,
}

impl AudienceRule {
    fn admits(self, audience: Audience) -> bool {
        match self {
            AudienceRule::Only(required) => required == audience,
            AudienceRule::Either => true,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            AudienceRule::Only(Audience::User) => "user",
            AudienceRule::Only(Audience::Admin) => "admin",
            AudienceRule::Either => "user or admin",
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthRejection {
    #[error("missing bearer token")]
    MissingToken,
    #[error("invalid token: {0}")]
    InvalidToken(#[source] TokenError),
    #[error("token audience {presented} is not accepted here (requires {required})")]
    WrongAudience {
        required: &'static str,
        presented: Audience,
    },
    #[error("token subject does not resolve to an account")]
    SubjectNotFound,
    #[error("failed to resolve token subject: {0}")]
    StoreFailure(#[source] sqlx::Error),
}

/// User lookup used to resolve token subjects.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_phone(&self, phone: &str) -> Result<Option<User>, sqlx::Error>;
}

#[async_trait]
impl UserDirectory for PgPool {
    async fn find_by_phone(&self, phone: &str) -> Result<Option<User>, sqlx::Error> {
        User::find_by_phone(self, phone).await
    }
}

fn bearer_token(header: Option<&str>) -> Result<&str, AuthRejection> {
    let header = header.ok_or(AuthRejection::MissingToken)?;
    let token = header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .map(str::trim)
        .ok_or(AuthRejection::InvalidToken(TokenError::Invalid))?;
    if token.is_empty() {
        return Err(AuthRejection::InvalidToken(TokenError::Invalid));
    }
    Ok(token)
}

/// Decide whether a request carrying `header` may use a route guarded by `rule`.
pub async fn authorize(
    keys: &JwtKeys,
    users: &dyn UserDirectory,
    header: Option<&str>,
    rule: AudienceRule,
) -> Result<Identity, AuthRejection> {
    let token = bearer_token(header)?;
    let claims = keys.verify(token).map_err(|e| {
        warn!(error = %e, "rejecting token");
        AuthRejection::InvalidToken(e)
    })?;

    if !rule.admits(claims.aud) {
        warn!(audience = %claims.aud, required = rule.describe(), "token audience mismatch");
        return Err(AuthRejection::WrongAudience {
            required: rule.describe(),
            presented: claims.aud,
        });
    }

    // The admin sentinel and the admin audience only ever travel together.
    match (claims.aud, claims.sub == ADMIN_SUBJECT) {
        (Audience::Admin, true) => return Ok(Identity::Admin),
        (Audience::Admin, false) | (Audience::User, true) => {
            warn!(subject = %claims.sub, audience = %claims.aud, "subject does not fit audience");
            return Err(AuthRejection::SubjectNotFound);
        }
        (Audience::User, false) => {}
    }

    match users.find_by_phone(&claims.sub).await {
        Ok(Some(user)) => {
            debug!(phone = %user.phone, "token subject resolved");
            Ok(Identity::User(user))
        }
        Ok(None) => {
            warn!(subject = %claims.sub, "token subject not found");
            Err(AuthRejection::SubjectNotFound)
        }
        Err(e) => Err(AuthRejection::StoreFailure(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{JwtConfig, DEFAULT_ISSUER};
    use crate::testing::{sample_user, MemoryUsers};

    fn keys() -> JwtKeys {
        JwtKeys::new(&JwtConfig {
            secret: "gate-secret".into(),
            issuer: DEFAULT_ISSUER.into(),
        })
        .unwrap()
    }

    fn bearer(token: &str) -> String {
        format!("Bearer {token}")
    }

    fn directory() -> MemoryUsers {
        MemoryUsers::with(vec![sample_user("13800000001", "alice")])
    }

    #[tokio::test]
    async fn missing_header_is_rejected() {
        let err = authorize(&keys(), &directory(), None, AudienceRule::Only(Audience::User))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthRejection::MissingToken));
    }

    #[tokio::test]
    async fn non_bearer_scheme_is_invalid() {
        let err = authorize(
            &keys(),
            &directory(),
            Some("Basic abc"),
            AudienceRule::Only(Audience::User),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AuthRejection::InvalidToken(TokenError::Invalid)));
    }

    #[tokio::test]
    async fn user_token_resolves_to_user_row() {
        let keys = keys();
        let token = keys.issue("13800000001", Audience::User).unwrap();
        let identity = authorize(
            &keys,
            &directory(),
            Some(&bearer(&token)),
            AudienceRule::Only(Audience::User),
        )
        .await
        .unwrap();
        match identity {
            Identity::User(user) => assert_eq!(user.username, "alice"),
            Identity::Admin => panic!("expected user identity"),
        }
    }

    #[tokio::test]
    async fn user_token_never_passes_admin_gate() {
        let keys = keys();
        let token = keys.issue("13800000001", Audience::User).unwrap();
        let err = authorize(
            &keys,
            &directory(),
            Some(&bearer(&token)),
            AudienceRule::Only(Audience::Admin),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AuthRejection::WrongAudience { .. }));
    }

    #[tokio::test]
    async fn admin_token_never_passes_user_gate() {
        let keys = keys();
        let token = keys.issue(ADMIN_SUBJECT, Audience::Admin).unwrap();
        let err = authorize(
            &keys,
            &directory(),
            Some(&bearer(&token)),
            AudienceRule::Only(Audience::User),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AuthRejection::WrongAudience { .. }));
    }

    #[tokio::test]
    async fn either_gate_admits_both_audiences() {
        let keys = keys();
        let users = directory();

        let admin = keys.issue(ADMIN_SUBJECT, Audience::Admin).unwrap();
        let identity = authorize(&keys, &users, Some(&bearer(&admin)), AudienceRule::Either)
            .await
            .unwrap();
        assert!(matches!(identity, Identity::Admin));
        assert_eq!(identity.subject(), "admin");

        let user = keys.issue("13800000001", Audience::User).unwrap();
        let identity = authorize(&keys, &users, Some(&bearer(&user)), AudienceRule::Either)
            .await
            .unwrap();
        assert_eq!(identity.subject(), "13800000001");
    }

    #[tokio::test]
    async fn admin_identity_needs_no_user_row() {
        let keys = keys();
        let token = keys.issue(ADMIN_SUBJECT, Audience::Admin).unwrap();
        let identity = authorize(
            &keys,
            &MemoryUsers::failing(),
            Some(&bearer(&token)),
            AudienceRule::Only(Audience::Admin),
        )
        .await
        .unwrap();
        assert!(matches!(identity, Identity::Admin));
    }

    #[tokio::test]
    async fn unknown_phone_is_subject_not_found() {
        let keys = keys();
        let token = keys.issue("13899999999", Audience::User).unwrap();
        let err = authorize(
            &keys,
            &directory(),
            Some(&bearer(&token)),
            AudienceRule::Only(Audience::User),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AuthRejection::SubjectNotFound));
    }

    #[tokio::test]
    async fn admin_sentinel_with_user_audience_is_rejected() {
        let keys = keys();
        let token = keys.issue(ADMIN_SUBJECT, Audience::User).unwrap();
        let err = authorize(
            &keys,
            &directory(),
            Some(&bearer(&token)),
            AudienceRule::Only(Audience::User),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AuthRejection::SubjectNotFound));
    }

    #[tokio::test]
    async fn admin_audience_with_user_subject_is_rejected() {
        let keys = keys();
        let token = keys.issue("13800000001", Audience::Admin).unwrap();
        let err = authorize(
            &keys,
            &directory(),
            Some(&bearer(&token)),
            AudienceRule::Only(Audience::Admin),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AuthRejection::SubjectNotFound));
    }

    #[tokio::test]
    async fn directory_failure_is_store_failure() {
        let keys = keys();
        let token = keys.issue("13800000001", Audience::User).unwrap();
        let err = authorize(
            &keys,
            &MemoryUsers::failing(),
            Some(&bearer(&token)),
            AudienceRule::Only(Audience::User),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AuthRejection::StoreFailure(_)));
    }
}
