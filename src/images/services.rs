//! Upload validation and the all-or-nothing image set protocol.

use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    catalog::{CatalogTx, ListingCatalog},
    listings::repo_types::ListingImage,
    storage::StorageClient,
};

/// Per-file upload limit.
pub const MAX_UPLOAD_BYTES: usize = 3 * 1024 * 1024;

/// One file taken from a multipart request.
#[derive(Debug, Clone)]
pub struct UploadItem {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub body: Bytes,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("file {name} exceeds {limit} bytes")]
    TooLarge { name: String, limit: usize },
    #[error("file {name} has unsupported type {content_type}")]
    UnsupportedType { name: String, content_type: String },
    #[error("file {name} must be a HTML file")]
    NotHtml { name: String },
    #[error("at most one {field} file may be uploaded")]
    TooMany { field: &'static str },
}

#[derive(Debug, Error)]
pub enum ImageSetError {
    #[error("listing {0} not found")]
    ListingNotFound(i64),
    #[error("listing {0} already has images")]
    AlreadyPresent(i64),
    #[error(transparent)]
    Rejected(#[from] UploadError),
    #[error("image set update aborted during {step}: {source}")]
    Aborted {
        step: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl UploadItem {
    fn display_name(&self) -> String {
        self.file_name.clone().unwrap_or_else(|| "<unnamed>".into())
    }

    /// Declared type without parameters, or one inferred from the file name.
    fn effective_type(&self) -> Option<String> {
        let declared = self
            .content_type
            .as_deref()
            .map(|ct| ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
            .filter(|ct| !ct.is_empty() && ct != "application/octet-stream");
        declared.or_else(|| {
            let name = self.file_name.as_deref()?;
            let (_, ext) = name.rsplit_once('.')?;
            mime_from_ext(&ext.to_ascii_lowercase()).map(str::to_string)
        })
    }

    fn check_size(&self) -> Result<(), UploadError> {
        if self.body.len() > MAX_UPLOAD_BYTES {
            return Err(UploadError::TooLarge {
                name: self.display_name(),
                limit: MAX_UPLOAD_BYTES,
            });
        }
        Ok(())
    }
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "image/bmp" => Some("bmp"),
        "image/svg+xml" => Some("svg"),
        "text/html" => Some("html"),
        _ => None,
    }
}

fn mime_from_ext(ext: &str) -> Option<&'static str> {
    match ext {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "bmp" => Some("image/bmp"),
        "svg" => Some("image/svg+xml"),
        "html" | "htm" => Some("text/html"),
        _ => None,
    }
}

/// Checks an image upload; returns its content type and object key extension.
pub fn validate_image(item: &UploadItem) -> Result<(String, &'static str), UploadError> {
    item.check_size()?;
    let content_type = item.effective_type().unwrap_or_default();
    match ext_from_mime(&content_type) {
        Some(ext) if content_type.starts_with("image/") => Ok((content_type, ext)),
        _ => Err(UploadError::UnsupportedType {
            name: item.display_name(),
            content_type: item
                .content_type
                .clone()
                .unwrap_or_else(|| "unknown".into()),
        }),
    }
}

/// Checks a rich-text upload. `text/html; charset=...` is accepted.
pub fn validate_html(item: &UploadItem) -> Result<(), UploadError> {
    item.check_size()?;
    match item.effective_type().as_deref() {
        Some("text/html") => Ok(()),
        _ => Err(UploadError::NotHtml {
            name: item.display_name(),
        }),
    }
}

struct CheckedImage {
    body: Bytes,
    content_type: String,
    ext: &'static str,
}

fn check_all(files: Vec<UploadItem>) -> Result<Vec<CheckedImage>, UploadError> {
    files
        .into_iter()
        .map(|item| {
            let (content_type, ext) = validate_image(&item)?;
            Ok(CheckedImage {
                body: item.body,
                content_type,
                ext,
            })
        })
        .collect()
}

fn aborted(step: &'static str, source: impl Into<anyhow::Error>) -> ImageSetError {
    ImageSetError::Aborted {
        step,
        source: source.into(),
    }
}

/// Writes the new image rows inside `tx`, recording every uploaded key in
/// `uploaded` so the caller can discard them if the unit of work fails.
async fn fill(
    tx: &mut dyn CatalogTx,
    storage: &dyn StorageClient,
    default_image_url: &str,
    listing_id: i64,
    files: Vec<CheckedImage>,
    uploaded: &mut Vec<String>,
) -> Result<Vec<ListingImage>, ImageSetError> {
    if files.is_empty() {
        let row = tx
            .insert_image(listing_id, default_image_url, true)
            .await
            .map_err(|e| aborted("insert default image", e))?;
        return Ok(vec![row]);
    }

    let mut rows = Vec::with_capacity(files.len());
    for (i, file) in files.into_iter().enumerate() {
        let key = format!("images/{}/{}.{}", listing_id, Uuid::new_v4(), file.ext);
        storage
            .put_object(&key, file.body, &file.content_type)
            .await
            .map_err(|e| aborted("upload image", e))?;
        uploaded.push(key.clone());

        let row = tx
            .insert_image(listing_id, &storage.object_url(&key), i == 0)
            .await
            .map_err(|e| aborted("insert image", e))?;
        debug!(listing_id, image_id = row.id, is_main = row.is_main, "image stored");
        rows.push(row);
    }
    Ok(rows)
}

async fn discard_uploads(storage: &dyn StorageClient, keys: &[String]) {
    for key in keys {
        if let Err(e) = storage.delete_object(key).await {
            warn!(error = %e, %key, "failed to remove orphaned upload");
        }
    }
}

#[derive(Clone, Copy)]
enum Mode {
    Replace,
    AddToEmpty,
}

async fn run(
    mode: Mode,
    catalog: &dyn ListingCatalog,
    storage: &dyn StorageClient,
    default_image_url: &str,
    listing_id: i64,
    files: Vec<UploadItem>,
) -> Result<Vec<ListingImage>, ImageSetError> {
    let files = check_all(files)?;

    let mut tx = catalog
        .unit_of_work()
        .await
        .map_err(|e| aborted("begin", e))?;

    if !tx
        .lock_listing(listing_id)
        .await
        .map_err(|e| aborted("lock listing", e))?
    {
        return Err(ImageSetError::ListingNotFound(listing_id));
    }

    match mode {
        Mode::Replace => {
            let removed = tx
                .delete_images(listing_id)
                .await
                .map_err(|e| aborted("delete images", e))?;
            debug!(listing_id, removed, "old image rows removed");
        }
        Mode::AddToEmpty => {
            let existing = tx
                .image_count(listing_id)
                .await
                .map_err(|e| aborted("count images", e))?;
            if existing > 0 {
                return Err(ImageSetError::AlreadyPresent(listing_id));
            }
        }
    }

    let mut uploaded = Vec::new();
    let filled = fill(
        tx.as_mut(),
        storage,
        default_image_url,
        listing_id,
        files,
        &mut uploaded,
    )
    .await;
    let outcome = match filled {
        Ok(rows) => tx
            .commit()
            .await
            .map(|_| rows)
            .map_err(|e| aborted("commit", e)),
        Err(e) => {
            // rollback
            drop(tx);
            Err(e)
        }
    };

    match outcome {
        Ok(rows) => {
            info!(listing_id, count = rows.len(), "image set stored");
            Ok(rows)
        }
        Err(e) => {
            warn!(listing_id, error = %e, "image set rolled back");
            discard_uploads(storage, &uploaded).await;
            Err(e)
        }
    }
}

/// Replaces every image of a listing with `files` as one unit of work. The
/// first file becomes the main image; no files yields a single default row.
pub async fn replace_images(
    catalog: &dyn ListingCatalog,
    storage: &dyn StorageClient,
    default_image_url: &str,
    listing_id: i64,
    files: Vec<UploadItem>,
) -> Result<Vec<ListingImage>, ImageSetError> {
    run(Mode::Replace, catalog, storage, default_image_url, listing_id, files).await
}

/// Like [`replace_images`], but only for a listing that has no images yet.
pub async fn add_images(
    catalog: &dyn ListingCatalog,
    storage: &dyn StorageClient,
    default_image_url: &str,
    listing_id: i64,
    files: Vec<UploadItem>,
) -> Result<Vec<ListingImage>, ImageSetError> {
    run(Mode::AddToEmpty, catalog, storage, default_image_url, listing_id, files).await
}

#[cfg(test)]
mod image_tests {
    use super::*;
    use crate::testing::{sample_listing, FakeStorage, MemoryCatalog};

    const DEFAULT: &str = "https://assets.local/default.png";

    fn png(name: &str) -> UploadItem {
        UploadItem {
            file_name: Some(name.into()),
            content_type: Some("image/png".into()),
            body: Bytes::from_static(b"\x89PNG fake"),
        }
    }

    fn catalog_with_three_images() -> MemoryCatalog {
        let catalog = MemoryCatalog::with_listings(vec![sample_listing(1)]);
        catalog.seed_images(1, &["https://a/1.png", "https://a/2.png", "https://a/3.png"]);
        catalog
    }

    #[test]
    fn test_ext_from_mime() {
        assert_eq!(ext_from_mime("image/jpeg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/jpg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/png"), Some("png"));
        assert_eq!(ext_from_mime("image/webp"), Some("webp"));
        assert_eq!(ext_from_mime("image/svg+xml"), Some("svg"));
        assert_eq!(ext_from_mime("application/octet-stream"), None);
    }

    #[test]
    fn type_is_inferred_from_extension() {
        let item = UploadItem {
            file_name: Some("photo.JPEG".into()),
            content_type: None,
            body: Bytes::from_static(b"x"),
        };
        assert_eq!(validate_image(&item).unwrap(), ("image/jpeg".into(), "jpg"));
    }

    #[test]
    fn oversized_and_foreign_files_are_rejected() {
        let big = UploadItem {
            file_name: Some("big.png".into()),
            content_type: Some("image/png".into()),
            body: Bytes::from(vec![0u8; MAX_UPLOAD_BYTES + 1]),
        };
        assert!(matches!(validate_image(&big), Err(UploadError::TooLarge { .. })));

        let pdf = UploadItem {
            file_name: Some("doc.pdf".into()),
            content_type: Some("application/pdf".into()),
            body: Bytes::from_static(b"%PDF"),
        };
        assert!(matches!(
            validate_image(&pdf),
            Err(UploadError::UnsupportedType { .. })
        ));
    }

    #[test]
    fn html_accepts_charset_parameter() {
        let item = UploadItem {
            file_name: Some("desc.html".into()),
            content_type: Some("text/html; charset=utf-8".into()),
            body: Bytes::from_static(b"<p>hi</p>"),
        };
        assert!(validate_html(&item).is_ok());

        let text = UploadItem {
            content_type: Some("text/plain".into()),
            ..item
        };
        assert!(matches!(validate_html(&text), Err(UploadError::NotHtml { .. })));
    }

    #[tokio::test]
    async fn replacing_with_no_files_leaves_one_default_main_row() {
        let catalog = catalog_with_three_images();
        let storage = FakeStorage::default();

        let rows = replace_images(&catalog, &storage, DEFAULT, 1, vec![]).await.unwrap();
        assert_eq!(rows.len(), 1);

        let stored = catalog.images_of(1);
        assert_eq!(stored.len(), 1);
        assert!(stored[0].is_main);
        assert_eq!(stored[0].url, DEFAULT);
        assert!(storage.puts().is_empty());
    }

    #[tokio::test]
    async fn first_file_becomes_main() {
        let catalog = catalog_with_three_images();
        let storage = FakeStorage::default();

        let rows = replace_images(&catalog, &storage, DEFAULT, 1, vec![png("a.png"), png("b.png")])
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].is_main);
        assert!(!rows[1].is_main);
        assert_eq!(catalog.images_of(1).iter().filter(|i| i.is_main).count(), 1);
        assert!(rows[0].url.starts_with("https://fake.local/images/1/"));
    }

    #[tokio::test]
    async fn failed_upload_keeps_original_set_and_no_orphans() {
        let catalog = catalog_with_three_images();
        let before = catalog.images_of(1);
        let storage = FakeStorage::failing_on_put(2);

        let err = replace_images(
            &catalog,
            &storage,
            DEFAULT,
            1,
            vec![png("a.png"), png("b.png"), png("c.png")],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ImageSetError::Aborted { step: "upload image", .. }));

        let after = catalog.images_of(1);
        assert_eq!(
            after.iter().map(|i| &i.url).collect::<Vec<_>>(),
            before.iter().map(|i| &i.url).collect::<Vec<_>>()
        );
        assert_eq!(storage.puts().len(), 1);
        assert_eq!(storage.deletes(), storage.puts());
    }

    #[tokio::test]
    async fn invalid_file_touches_nothing() {
        let catalog = catalog_with_three_images();
        let storage = FakeStorage::default();
        let bad = UploadItem {
            file_name: Some("x.exe".into()),
            content_type: Some("application/x-msdownload".into()),
            body: Bytes::from_static(b"MZ"),
        };

        let err = replace_images(&catalog, &storage, DEFAULT, 1, vec![png("a.png"), bad])
            .await
            .unwrap_err();
        assert!(matches!(err, ImageSetError::Rejected(_)));
        assert_eq!(catalog.images_of(1).len(), 3);
        assert!(storage.puts().is_empty());
    }

    #[tokio::test]
    async fn missing_listing_is_not_found() {
        let catalog = MemoryCatalog::default();
        let storage = FakeStorage::default();
        let err = replace_images(&catalog, &storage, DEFAULT, 42, vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, ImageSetError::ListingNotFound(42)));
    }

    #[tokio::test]
    async fn add_requires_empty_set() {
        let catalog = catalog_with_three_images();
        let storage = FakeStorage::default();
        let err = add_images(&catalog, &storage, DEFAULT, 1, vec![png("a.png")])
            .await
            .unwrap_err();
        assert!(matches!(err, ImageSetError::AlreadyPresent(1)));
        assert!(storage.puts().is_empty());

        let fresh = MemoryCatalog::with_listings(vec![sample_listing(2)]);
        let rows = add_images(&fresh, &storage, DEFAULT, 2, vec![png("a.png")])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_main);
    }
}
