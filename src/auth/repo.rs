use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::auth::repo_types::{User, UserPatch};

const USER_COLUMNS: &str = "id, phone, username, password_hash, role, created_at, updated_at";

impl User {
    /// Find a user by phone number.
    pub async fn find_by_phone(db: &PgPool, phone: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE phone = $1"))
            .bind(phone)
            .fetch_optional(db)
            .await
    }

    pub async fn list(db: &PgPool) -> Result<Vec<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))
            .fetch_all(db)
            .await
    }

    /// Create a new user with hashed password. A duplicate phone surfaces as a
    /// unique-violation database error.
    pub async fn create(
        db: &PgPool,
        phone: &str,
        username: &str,
        password_hash: &str,
    ) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (phone, username, password_hash, role)
            VALUES ($1, $2, $3, 'user')
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(phone)
        .bind(username)
        .bind(password_hash)
        .fetch_one(db)
        .await
    }

    /// Apply a sparse patch. Returns the updated row, or `None` when the user is gone.
    pub async fn apply_patch(
        db: &PgPool,
        phone: &str,
        patch: &UserPatch,
    ) -> Result<Option<User>, sqlx::Error> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE users SET updated_at = now()");
        if let Some(username) = &patch.username {
            qb.push(", username = ").push_bind(username);
        }
        if let Some(hash) = &patch.password_hash {
            qb.push(", password_hash = ").push_bind(hash);
        }
        qb.push(" WHERE phone = ")
            .push_bind(phone)
            .push(format!(" RETURNING {USER_COLUMNS}"));

        qb.build_query_as::<User>().fetch_optional(db).await
    }

    pub async fn delete_by_phone(db: &PgPool, phone: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "DELETE FROM users WHERE phone = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(phone)
        .fetch_optional(db)
        .await
    }
}

pub async fn current_invite_code(db: &PgPool) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>("SELECT code FROM invite_codes WHERE id = 1")
        .fetch_optional(db)
        .await
}

pub async fn replace_invite_code(db: &PgPool, code: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO invite_codes (id, code, updated_at) VALUES (1, $1, now())
        ON CONFLICT (id) DO UPDATE SET code = EXCLUDED.code, updated_at = now()
        "#,
    )
    .bind(code)
    .execute(db)
    .await?;
    Ok(())
}
