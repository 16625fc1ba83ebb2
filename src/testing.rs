//! In-memory collaborators for store-free tests.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use bytes::Bytes;
use time::OffsetDateTime;

use crate::{
    auth::{gate::UserDirectory, repo_types::User},
    catalog::{CatalogTx, ListingCatalog},
    filter::Predicate,
    listings::repo_types::{Listing, ListingCard, ListingImage},
    storage::StorageClient,
};

pub fn sample_user(phone: &str, username: &str) -> User {
    let now = OffsetDateTime::now_utc();
    User {
        id: 1,
        phone: phone.into(),
        username: username.into(),
        password_hash: "not-a-hash".into(),
        role: "user".into(),
        created_at: now,
        updated_at: now,
    }
}

pub fn sample_listing(id: i64) -> Listing {
    let now = OffsetDateTime::now_utc();
    Listing {
        id,
        region_code: 110101,
        address_details: format!("{id} Main St"),
        direction: 1,
        height: 1,
        renovation: 1,
        room: 1,
        special: 1,
        subject_matter: 1,
        price: 250.0,
        size: 80.0,
        rich_text_url: String::new(),
        created_at: now,
        updated_at: now,
    }
}

#[derive(Default)]
pub struct MemoryUsers {
    users: Vec<User>,
    failing: bool,
}

impl MemoryUsers {
    pub fn with(users: Vec<User>) -> Self {
        Self {
            users,
            failing: false,
        }
    }

    /// Every lookup fails as if the store were down.
    pub fn failing() -> Self {
        Self {
            users: Vec::new(),
            failing: true,
        }
    }
}

#[async_trait]
impl UserDirectory for MemoryUsers {
    async fn find_by_phone(&self, phone: &str) -> Result<Option<User>, sqlx::Error> {
        if self.failing {
            return Err(sqlx::Error::PoolTimedOut);
        }
        Ok(self.users.iter().find(|u| u.phone == phone).cloned())
    }
}

#[derive(Debug, Clone, Default)]
struct CatalogState {
    listings: Vec<Listing>,
    images: Vec<ListingImage>,
    next_image_id: i64,
}

impl CatalogState {
    fn insert_image(&mut self, listing_id: i64, url: &str, is_main: bool) -> ListingImage {
        self.next_image_id += 1;
        let row = ListingImage {
            id: self.next_image_id,
            property_id: listing_id,
            url: url.into(),
            is_main,
            created_at: OffsetDateTime::now_utc(),
        };
        self.images.push(row.clone());
        row
    }
}

/// Catalog whose units of work stage a copy and publish it on commit.
#[derive(Clone, Default)]
pub struct MemoryCatalog {
    shared: Arc<Mutex<CatalogState>>,
}

impl MemoryCatalog {
    pub fn with_listings(listings: Vec<Listing>) -> Self {
        Self {
            shared: Arc::new(Mutex::new(CatalogState {
                listings,
                ..CatalogState::default()
            })),
        }
    }

    /// Adds committed images; the first one is main.
    pub fn seed_images(&self, listing_id: i64, urls: &[&str]) {
        let mut state = self.shared.lock().unwrap();
        for (i, url) in urls.iter().enumerate() {
            state.insert_image(listing_id, url, i == 0);
        }
    }

    pub fn images_of(&self, listing_id: i64) -> Vec<ListingImage> {
        let state = self.shared.lock().unwrap();
        state
            .images
            .iter()
            .filter(|i| i.property_id == listing_id)
            .cloned()
            .collect()
    }
}

pub struct MemoryTx {
    shared: Arc<Mutex<CatalogState>>,
    staged: CatalogState,
}

#[async_trait]
impl ListingCatalog for MemoryCatalog {
    async fn unit_of_work(&self) -> Result<Box<dyn CatalogTx>, sqlx::Error> {
        let staged = self.shared.lock().unwrap().clone();
        Ok(Box::new(MemoryTx {
            shared: Arc::clone(&self.shared),
            staged,
        }))
    }

    async fn select_cards(&self, predicate: &Predicate) -> Result<Vec<ListingCard>, sqlx::Error> {
        let state = self.shared.lock().unwrap();
        let mut cards: Vec<ListingCard> = state
            .listings
            .iter()
            .filter(|l| predicate.matches(l))
            .map(|l| ListingCard {
                id: l.id,
                address_details: l.address_details.clone(),
                price: l.price,
                size: l.size,
                created_at: l.created_at,
                cover: state
                    .images
                    .iter()
                    .find(|i| i.property_id == l.id && i.is_main)
                    .map(|i| i.url.clone()),
            })
            .collect();
        cards.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(cards)
    }
}

#[async_trait]
impl CatalogTx for MemoryTx {
    async fn lock_listing(&mut self, listing_id: i64) -> Result<bool, sqlx::Error> {
        Ok(self.staged.listings.iter().any(|l| l.id == listing_id))
    }

    async fn image_count(&mut self, listing_id: i64) -> Result<i64, sqlx::Error> {
        Ok(self
            .staged
            .images
            .iter()
            .filter(|i| i.property_id == listing_id)
            .count() as i64)
    }

    async fn delete_images(&mut self, listing_id: i64) -> Result<u64, sqlx::Error> {
        let before = self.staged.images.len();
        self.staged.images.retain(|i| i.property_id != listing_id);
        Ok((before - self.staged.images.len()) as u64)
    }

    async fn insert_image(
        &mut self,
        listing_id: i64,
        url: &str,
        is_main: bool,
    ) -> Result<ListingImage, sqlx::Error> {
        Ok(self.staged.insert_image(listing_id, url, is_main))
    }

    async fn commit(self: Box<Self>) -> Result<(), sqlx::Error> {
        let MemoryTx { shared, staged } = *self;
        *shared.lock().unwrap() = staged;
        Ok(())
    }
}

/// Object store that records keys and can fail the n-th put (1-based).
#[derive(Default)]
pub struct FakeStorage {
    fail_on_put: Option<usize>,
    attempts: AtomicUsize,
    puts: Mutex<Vec<String>>,
    deletes: Mutex<Vec<String>>,
}

impl FakeStorage {
    pub fn failing_on_put(n: usize) -> Self {
        Self {
            fail_on_put: Some(n),
            ..Self::default()
        }
    }

    /// Keys of successful puts, in order.
    pub fn puts(&self) -> Vec<String> {
        self.puts.lock().unwrap().clone()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.deletes.lock().unwrap().clone()
    }
}

#[async_trait]
impl StorageClient for FakeStorage {
    async fn put_object(&self, key: &str, _body: Bytes, _content_type: &str) -> anyhow::Result<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_put == Some(attempt) {
            anyhow::bail!("injected put failure for {key}");
        }
        self.puts.lock().unwrap().push(key.to_string());
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        self.deletes.lock().unwrap().push(key.to_string());
        Ok(())
    }

    fn object_url(&self, key: &str) -> String {
        format!("https://fake.local/{key}")
    }
}
