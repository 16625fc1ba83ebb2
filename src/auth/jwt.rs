use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::Deserialize;
use thiserror::Error;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;

use crate::{
    auth::claims::{Audience, Claims},
    config::JwtConfig,
};

/// Lifetime of every issued token.
pub const TOKEN_TTL: TimeDuration = TimeDuration::days(3);

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token is malformed or its signature is invalid")]
    Invalid,
    #[error("token has expired")]
    Expired,
    #[error("failed to sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

/// Signing and verification keys, derived once from the configured secret.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
}

impl JwtKeys {
    pub fn new(cfg: &JwtConfig) -> anyhow::Result<Self> {
        anyhow::ensure!(!cfg.secret.is_empty(), "jwt secret is not configured");
        Ok(Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
        })
    }

    pub fn issue(&self, subject: &str, audience: Audience) -> Result<String, TokenError> {
        self.issue_at(subject, audience, OffsetDateTime::now_utc())
    }

    pub(crate) fn issue_at(
        &self,
        subject: &str,
        audience: Audience,
        issued_at: OffsetDateTime,
    ) -> Result<String, TokenError> {
        let exp = issued_at + TOKEN_TTL;
        let claims = Claims {
            sub: subject.to_string(),
            aud: audience,
            iss: self.issuer.clone(),
            iat: issued_at.unix_timestamp().max(0) as usize,
            exp: exp.unix_timestamp().max(0) as usize,
        };
        let token = encode(&Header::default(), &claims, &self.encoding).map_err(TokenError::Signing)?;
        debug!(subject, %audience, "jwt signed");
        Ok(token)
    }

    /// Checks signature, issuer and expiry. Whether the subject still exists
    /// is left to the access gate.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::default();
        validation.leeway = 0;
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        validation.set_audience(&[Audience::User.as_str(), Audience::Admin.as_str()]);

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidSignature | ErrorKind::InvalidIssuer if self.is_past_expiry(token) => {
                    TokenError::Expired
                }
                _ => TokenError::Invalid,
            }
        })?;
        debug!(subject = %data.claims.sub, audience = %data.claims.aud, "jwt verified");
        Ok(data.claims)
    }

    /// Expiry wins over a bad signature: reads `exp` without trusting anything else.
    fn is_past_expiry(&self, token: &str) -> bool {
        let mut unchecked = Validation::default();
        unchecked.insecure_disable_signature_validation();
        unchecked.validate_exp = false;
        unchecked.validate_aud = false;
        unchecked.required_spec_claims.clear();

        match decode::<ExpiryOnly>(token, &self.decoding, &unchecked) {
            Ok(data) => data.claims.exp < OffsetDateTime::now_utc().unix_timestamp(),
            Err(_) => false,
        }
    }
}

#[derive(Deserialize)]
struct ExpiryOnly {
    exp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_ISSUER;

    fn make_keys(secret: &str, issuer: &str) -> JwtKeys {
        JwtKeys::new(&JwtConfig {
            secret: secret.into(),
            issuer: issuer.into(),
        })
        .expect("keys")
    }

    #[test]
    fn issue_and_verify_user_token() {
        let keys = make_keys("dev-secret", DEFAULT_ISSUER);
        let token = keys.issue("13800000000", Audience::User).expect("issue");
        let claims = keys.verify(&token).expect("verify");
        assert_eq!(claims.sub, "13800000000");
        assert_eq!(claims.aud, Audience::User);
        assert_eq!(claims.iss, DEFAULT_ISSUER);
        assert_eq!(claims.exp - claims.iat, TOKEN_TTL.whole_seconds() as usize);
    }

    #[test]
    fn issue_and_verify_admin_token() {
        let keys = make_keys("dev-secret", DEFAULT_ISSUER);
        let token = keys.issue("admin", Audience::Admin).expect("issue");
        let claims = keys.verify(&token).expect("verify");
        assert_eq!(claims.sub, "admin");
        assert_eq!(claims.aud, Audience::Admin);
    }

    #[test]
    fn expired_token_is_reported_as_expired() {
        let keys = make_keys("dev-secret", DEFAULT_ISSUER);
        let issued = OffsetDateTime::now_utc() - TimeDuration::days(4);
        let token = keys.issue_at("13800000000", Audience::User, issued).expect("issue");
        assert!(matches!(keys.verify(&token), Err(TokenError::Expired)));
    }

    #[test]
    fn token_signed_with_other_secret_is_invalid() {
        let good = make_keys("secret-a", DEFAULT_ISSUER);
        let other = make_keys("secret-b", DEFAULT_ISSUER);
        let token = other.issue("13800000000", Audience::User).expect("issue");
        assert!(matches!(good.verify(&token), Err(TokenError::Invalid)));
    }

    #[test]
    fn expired_token_with_foreign_signature_is_still_expired() {
        let good = make_keys("secret-a", DEFAULT_ISSUER);
        let other = make_keys("secret-b", DEFAULT_ISSUER);
        let issued = OffsetDateTime::now_utc() - TimeDuration::days(4);
        let token = other.issue_at("13800000000", Audience::User, issued).expect("issue");
        assert!(matches!(good.verify(&token), Err(TokenError::Expired)));
    }

    #[test]
    fn expired_token_from_other_issuer_is_still_expired() {
        let good = make_keys("same-secret", DEFAULT_ISSUER);
        let other = make_keys("same-secret", "someone-else");
        let issued = OffsetDateTime::now_utc() - TimeDuration::days(4);
        let token = other.issue_at("13800000000", Audience::Admin, issued).expect("issue");
        assert!(matches!(good.verify(&token), Err(TokenError::Expired)));
    }

    #[test]
    fn token_from_other_issuer_is_invalid() {
        let good = make_keys("same-secret", DEFAULT_ISSUER);
        let other = make_keys("same-secret", "someone-else");
        let token = other.issue("13800000000", Audience::User).expect("issue");
        assert!(matches!(good.verify(&token), Err(TokenError::Invalid)));
    }

    #[test]
    fn garbage_is_invalid() {
        let keys = make_keys("dev-secret", DEFAULT_ISSUER);
        assert!(matches!(keys.verify("not.a.jwt"), Err(TokenError::Invalid)));
        assert!(matches!(keys.verify(""), Err(TokenError::Invalid)));
    }

    #[test]
    fn empty_secret_is_rejected() {
        let err = JwtKeys::new(&JwtConfig {
            secret: String::new(),
            issuer: DEFAULT_ISSUER.into(),
        });
        assert!(err.is_err());
    }
}
