use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;

/// Shown instead of the phone number to non-admin callers.
pub const MASKED_PHONE: &str = "***********";

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Customer {
    pub id: i64,
    pub customer_id: String,
    pub name: String,
    pub phone: String,
    pub address: String,
    pub gender: String,
    pub price: String,
    pub other: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Customer {
    pub fn masked(mut self) -> Self {
        self.phone = MASKED_PHONE.to_string();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCustomer {
    pub customer_id: String,
    pub name: String,
    pub phone: String,
    pub address: String,
    pub gender: String,
    pub price: String,
    pub other: String,
}

/// Sparse admin update: only present fields are written.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CustomerPatch {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub gender: Option<String>,
    pub price: Option<String>,
    pub other: Option<String>,
}

impl CustomerPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
