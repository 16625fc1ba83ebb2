//! Row-store seam used by the image-set protocol and filtered listing queries.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};

use crate::{
    filter::Predicate,
    listings::repo_types::{ListingCard, ListingImage},
};

const IMAGE_COLUMNS: &str = "id, property_id, url, is_main, created_at";

#[async_trait]
pub trait ListingCatalog: Send + Sync {
    /// Start a unit of work. Dropping it without `commit` rolls back.
    async fn unit_of_work(&self) -> Result<Box<dyn CatalogTx>, sqlx::Error>;

    /// Listings matching `predicate`, newest first, each with its main image.
    async fn select_cards(&self, predicate: &Predicate) -> Result<Vec<ListingCard>, sqlx::Error>;
}

#[async_trait]
pub trait CatalogTx: Send {
    /// Lock the listing row for the rest of the unit of work. `false` when it
    /// does not exist.
    async fn lock_listing(&mut self, listing_id: i64) -> Result<bool, sqlx::Error>;
    async fn image_count(&mut self, listing_id: i64) -> Result<i64, sqlx::Error>;
    async fn delete_images(&mut self, listing_id: i64) -> Result<u64, sqlx::Error>;
    async fn insert_image(
        &mut self,
        listing_id: i64,
        url: &str,
        is_main: bool,
    ) -> Result<ListingImage, sqlx::Error>;
    async fn commit(self: Box<Self>) -> Result<(), sqlx::Error>;
}

pub struct PgCatalogTx(Transaction<'static, Postgres>);

#[async_trait]
impl ListingCatalog for PgPool {
    async fn unit_of_work(&self) -> Result<Box<dyn CatalogTx>, sqlx::Error> {
        let tx = self.begin().await?;
        Ok(Box::new(PgCatalogTx(tx)))
    }

    async fn select_cards(&self, predicate: &Predicate) -> Result<Vec<ListingCard>, sqlx::Error> {
        let mut qb = QueryBuilder::<Postgres>::new(
            r#"
            SELECT p.id, p.address_details, p.price, p.size, p.created_at, i.url AS cover
              FROM properties p
              LEFT JOIN property_images i ON i.property_id = p.id AND i.is_main
             WHERE "#,
        );
        predicate.push_sql(&mut qb, "p");
        qb.push(" ORDER BY p.id DESC");

        qb.build_query_as::<ListingCard>().fetch_all(self).await
    }
}

#[async_trait]
impl CatalogTx for PgCatalogTx {
    async fn lock_listing(&mut self, listing_id: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query_scalar::<_, i64>("SELECT id FROM properties WHERE id = $1 FOR UPDATE")
            .bind(listing_id)
            .fetch_optional(&mut *self.0)
            .await?;
        Ok(row.is_some())
    }

    async fn image_count(&mut self, listing_id: i64) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM property_images WHERE property_id = $1")
            .bind(listing_id)
            .fetch_one(&mut *self.0)
            .await
    }

    async fn delete_images(&mut self, listing_id: i64) -> Result<u64, sqlx::Error> {
        let done = sqlx::query("DELETE FROM property_images WHERE property_id = $1")
            .bind(listing_id)
            .execute(&mut *self.0)
            .await?;
        Ok(done.rows_affected())
    }

    async fn insert_image(
        &mut self,
        listing_id: i64,
        url: &str,
        is_main: bool,
    ) -> Result<ListingImage, sqlx::Error> {
        sqlx::query_as::<_, ListingImage>(&format!(
            r#"
            INSERT INTO property_images (property_id, url, is_main)
            VALUES ($1, $2, $3)
            RETURNING {IMAGE_COLUMNS}
            "#
        ))
        .bind(listing_id)
        .bind(url)
        .bind(is_main)
        .fetch_one(&mut *self.0)
        .await
    }

    async fn commit(self: Box<Self>) -> Result<(), sqlx::Error> {
        self.0.commit().await
    }
}
