use std::fmt;

use serde::{Deserialize, Serialize};

/// Subject carried by tokens issued to the administrator.
pub const ADMIN_SUBJECT: &str = "admin";

/// Trust domain a token is valid for. Audiences are disjoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    User,
    Admin,
}

impl Audience {
    pub fn as_str(self) -> &'static str {
        match self {
            Audience::User => "user",
            Audience::Admin => "admin",
        }
    }
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JWT payload used for authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,    // phone number or ADMIN_SUBJECT
    pub aud: Audience,  // user or admin
    pub iss: String,    // issuer
    pub iat: usize,     // issued at (unix timestamp)
    pub exp: usize,     // expires at (unix timestamp)
}
