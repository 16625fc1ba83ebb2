use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::customers::repo_types::{Customer, CustomerPatch, NewCustomer};

const CUSTOMER_COLUMNS: &str =
    "id, customer_id, name, phone, address, gender, price, other, created_at, updated_at";

impl Customer {
    pub async fn exists(db: &PgPool, customer_id: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM customers WHERE customer_id = $1)")
            .bind(customer_id)
            .fetch_one(db)
            .await
    }

    /// A duplicate customer id or phone surfaces as a unique-violation error.
    pub async fn create(db: &PgPool, new: &NewCustomer) -> Result<Customer, sqlx::Error> {
        sqlx::query_as::<_, Customer>(&format!(
            r#"
            INSERT INTO customers (customer_id, name, phone, address, gender, price, other)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {CUSTOMER_COLUMNS}
            "#
        ))
        .bind(&new.customer_id)
        .bind(&new.name)
        .bind(&new.phone)
        .bind(&new.address)
        .bind(&new.gender)
        .bind(&new.price)
        .bind(&new.other)
        .fetch_one(db)
        .await
    }

    pub async fn list(db: &PgPool) -> Result<Vec<Customer>, sqlx::Error> {
        sqlx::query_as::<_, Customer>(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers ORDER BY id"
        ))
        .fetch_all(db)
        .await
    }

    pub async fn apply_patch(
        db: &PgPool,
        customer_id: &str,
        patch: &CustomerPatch,
    ) -> Result<Option<Customer>, sqlx::Error> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE customers SET updated_at = now()");
        let fields = [
            ("name", &patch.name),
            ("phone", &patch.phone),
            ("address", &patch.address),
            ("gender", &patch.gender),
            ("price", &patch.price),
            ("other", &patch.other),
        ];
        for (column, value) in fields {
            if let Some(v) = value {
                qb.push(format!(", {column} = ")).push_bind(v.clone());
            }
        }
        qb.push(" WHERE customer_id = ")
            .push_bind(customer_id.to_string())
            .push(format!(" RETURNING {CUSTOMER_COLUMNS}"));

        qb.build_query_as::<Customer>().fetch_optional(db).await
    }

    pub async fn delete(db: &PgPool, customer_id: &str) -> Result<bool, sqlx::Error> {
        let done = sqlx::query("DELETE FROM customers WHERE customer_id = $1")
            .bind(customer_id)
            .execute(db)
            .await?;
        Ok(done.rows_affected() > 0)
    }
}
