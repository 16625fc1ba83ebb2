use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::listings::repo_types::{Listing, ListingImage, ListingPatch, NewListing};

const LISTING_COLUMNS: &str = "id, region_code, address_details, direction, height, renovation, \
     room, special, subject_matter, price, size, rich_text_url, created_at, updated_at";

impl Listing {
    pub async fn create(db: &PgPool, new: &NewListing) -> Result<Listing, sqlx::Error> {
        sqlx::query_as::<_, Listing>(&format!(
            r#"
            INSERT INTO properties
                (region_code, address_details, direction, height, renovation,
                 room, special, subject_matter, price, size)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {LISTING_COLUMNS}
            "#
        ))
        .bind(new.region_code)
        .bind(&new.address_details)
        .bind(new.direction)
        .bind(new.height)
        .bind(new.renovation)
        .bind(new.room)
        .bind(new.special)
        .bind(new.subject_matter)
        .bind(new.price)
        .bind(new.size)
        .fetch_one(db)
        .await
    }

    pub async fn find(db: &PgPool, id: i64) -> Result<Option<Listing>, sqlx::Error> {
        sqlx::query_as::<_, Listing>(&format!(
            "SELECT {LISTING_COLUMNS} FROM properties WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await
    }

    /// Images of a listing, main image first.
    pub async fn images(db: &PgPool, id: i64) -> Result<Vec<ListingImage>, sqlx::Error> {
        sqlx::query_as::<_, ListingImage>(
            r#"
            SELECT id, property_id, url, is_main, created_at
              FROM property_images
             WHERE property_id = $1
             ORDER BY is_main DESC, id ASC
            "#,
        )
        .bind(id)
        .fetch_all(db)
        .await
    }

    /// Apply a sparse patch. Returns the updated row, or `None` when the listing is gone.
    pub async fn apply_patch(
        db: &PgPool,
        id: i64,
        patch: &ListingPatch,
    ) -> Result<Option<Listing>, sqlx::Error> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE properties SET updated_at = now()");
        if let Some(v) = patch.region_code {
            qb.push(", region_code = ").push_bind(v);
        }
        if let Some(v) = &patch.address_details {
            qb.push(", address_details = ").push_bind(v.clone());
        }
        let ints = [
            ("direction", patch.direction),
            ("height", patch.height),
            ("renovation", patch.renovation),
            ("room", patch.room),
            ("special", patch.special),
            ("subject_matter", patch.subject_matter),
        ];
        for (column, value) in ints {
            if let Some(v) = value {
                qb.push(format!(", {column} = ")).push_bind(v);
            }
        }
        if let Some(v) = patch.price {
            qb.push(", price = ").push_bind(v);
        }
        if let Some(v) = patch.size {
            qb.push(", size = ").push_bind(v);
        }
        qb.push(" WHERE id = ")
            .push_bind(id)
            .push(format!(" RETURNING {LISTING_COLUMNS}"));

        qb.build_query_as::<Listing>().fetch_optional(db).await
    }

    /// Set the rich text URL only if none is set yet. `false` when the listing
    /// is missing or already has one.
    pub async fn set_rich_text_once(db: &PgPool, id: i64, url: &str) -> Result<bool, sqlx::Error> {
        let done = sqlx::query(
            r#"
            UPDATE properties SET rich_text_url = $2, updated_at = now()
             WHERE id = $1 AND rich_text_url = ''
            "#,
        )
        .bind(id)
        .bind(url)
        .execute(db)
        .await?;
        Ok(done.rows_affected() == 1)
    }

    pub async fn set_rich_text(db: &PgPool, id: i64, url: &str) -> Result<bool, sqlx::Error> {
        let done = sqlx::query(
            "UPDATE properties SET rich_text_url = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(url)
        .execute(db)
        .await?;
        Ok(done.rows_affected() == 1)
    }

    /// Delete a listing and its images in one transaction.
    pub async fn delete(db: &PgPool, id: i64) -> Result<Option<Listing>, sqlx::Error> {
        let mut tx = db.begin().await?;

        sqlx::query("DELETE FROM property_images WHERE property_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let deleted = sqlx::query_as::<_, Listing>(&format!(
            "DELETE FROM properties WHERE id = $1 RETURNING {LISTING_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        if deleted.is_some() {
            tx.commit().await?;
        }
        Ok(deleted)
    }
}
