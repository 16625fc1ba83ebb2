use anyhow::Context;
use serde::Deserialize;

pub const DEFAULT_ISSUER: &str = "house-system-backend";

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    /// Base URL clients use to fetch objects; usually the endpoint itself.
    pub public_url: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

/// Fallback assets used when a listing has no uploaded image or rich text.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetConfig {
    pub default_image_url: String,
    pub default_html_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub admin_password_hash: String,
    pub storage: StorageConfig,
    pub assets: AssetConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL")?;

        let secret = std::env::var("JWT_SECRET").context("JWT_SECRET")?;
        anyhow::ensure!(!secret.trim().is_empty(), "JWT_SECRET is empty");
        let jwt = JwtConfig {
            secret,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| DEFAULT_ISSUER.into()),
        };

        let admin_password_hash =
            std::env::var("ADMIN_PASSWORD_HASH").context("ADMIN_PASSWORD_HASH")?;

        let endpoint = std::env::var("MINIO_ENDPOINT").context("MINIO_ENDPOINT")?;
        let storage = StorageConfig {
            public_url: std::env::var("MINIO_PUBLIC_URL").unwrap_or_else(|_| endpoint.clone()),
            endpoint,
            bucket: std::env::var("MINIO_BUCKET").context("MINIO_BUCKET")?,
            access_key: std::env::var("MINIO_ACCESS_KEY").context("MINIO_ACCESS_KEY")?,
            secret_key: std::env::var("MINIO_SECRET_KEY").context("MINIO_SECRET_KEY")?,
            region: std::env::var("MINIO_REGION").unwrap_or_else(|_| "us-east-1".into()),
        };

        let assets = AssetConfig {
            default_image_url: std::env::var("DEFAULT_IMAGE_URL").context("DEFAULT_IMAGE_URL")?,
            default_html_url: std::env::var("DEFAULT_HTML_URL").context("DEFAULT_HTML_URL")?,
        };

        Ok(Self {
            database_url,
            jwt,
            admin_password_hash,
            storage,
            assets,
        })
    }
}
