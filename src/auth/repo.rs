use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;

/// User record in the database. Password hash and reset state never leave
/// the server in JSON.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_active: bool,
    pub is_verified: bool,
    #[serde(skip_serializing)]
    pub reset_token: Option<String>,
    #[serde(skip_serializing)]
    pub reset_token_expiry: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

const USER_COLUMNS: &str = "id, email, username, password_hash, first_name, last_name, \
     is_active, is_verified, reset_token, reset_token_expiry, created_at, updated_at";

impl User {
    pub async fn find_by_id(db: &PgPool, id: i64) -> anyhow::Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(db)
            .await?;
        Ok(user)
    }

    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(db)
            .await?;
        Ok(user)
    }

    pub async fn find_by_username(db: &PgPool, username: &str) -> anyhow::Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(username)
            .fetch_optional(db)
            .await?;
        Ok(user)
    }

    /// Login accepts an email or a username. Two explicit lookups against the
    /// unique columns, email first; emails are stored lowercase.
    pub async fn find_by_identifier(db: &PgPool, identifier: &str) -> anyhow::Result<Option<User>> {
        if let Some(user) = Self::find_by_email(db, &identifier.to_lowercase()).await? {
            return Ok(Some(user));
        }
        Self::find_by_username(db, identifier).await
    }

    /// Insert a new user. A unique violation on email or username surfaces
    /// as a database error the caller maps to a conflict.
    pub async fn create(
        db: &PgPool,
        email: &str,
        username: &str,
        password_hash: &str,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> anyhow::Result<User> {
        let sql = format!(
            "INSERT INTO users (email, username, password_hash, first_name, last_name) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {USER_COLUMNS}"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .bind(username)
            .bind(password_hash)
            .bind(first_name)
            .bind(last_name)
            .fetch_one(db)
            .await?;
        Ok(user)
    }

    pub async fn username_taken_by_other(
        db: &PgPool,
        username: &str,
        exclude_id: i64,
    ) -> anyhow::Result<bool> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM users WHERE username = $1 AND id <> $2")
                .bind(username)
                .bind(exclude_id)
                .fetch_optional(db)
                .await?;
        Ok(row.is_some())
    }

    pub async fn update_profile(
        db: &PgPool,
        id: i64,
        first_name: Option<&str>,
        last_name: Option<&str>,
        username: &str,
    ) -> anyhow::Result<User> {
        let sql = format!(
            "UPDATE users \
             SET first_name = $2, last_name = $3, username = $4, updated_at = now() \
             WHERE id = $1 \
             RETURNING {USER_COLUMNS}"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(first_name)
            .bind(last_name)
            .bind(username)
            .fetch_one(db)
            .await?;
        Ok(user)
    }

    pub async fn set_password_hash(db: &PgPool, id: i64, password_hash: &str) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(db)
            .await?;
        Ok(())
    }

    pub async fn set_reset_token(
        db: &PgPool,
        id: i64,
        token: &str,
        expiry: OffsetDateTime,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE users SET reset_token = $2, reset_token_expiry = $3, updated_at = now() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(token)
        .bind(expiry)
        .execute(db)
        .await?;
        Ok(())
    }

    /// Redeem a reset token: one statement sets the new hash and clears the
    /// token, so a second confirm with the same token matches zero rows.
    /// Returns the affected user id, or None when the token is unknown or
    /// past its expiry.
    pub async fn consume_reset_token(
        db: &PgPool,
        token: &str,
        password_hash: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<i64>> {
        let row: Option<(i64,)> = sqlx::query_as(
            "UPDATE users \
             SET password_hash = $2, reset_token = NULL, reset_token_expiry = NULL, \
                 updated_at = now() \
             WHERE reset_token = $1 AND reset_token_expiry >= $3 \
             RETURNING id",
        )
        .bind(token)
        .bind(password_hash)
        .bind(now)
        .fetch_optional(db)
        .await?;
        Ok(row.map(|(id,)| id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        let now = OffsetDateTime::now_utc();
        User {
            id: 1,
            email: "user@example.com".into(),
            username: "user_1".into(),
            password_hash: "$argon2id$v=19$secret".into(),
            first_name: Some("Ada".into()),
            last_name: None,
            is_active: true,
            is_verified: false,
            reset_token: Some("reset-secret".into()),
            reset_token_expiry: Some(now),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn serialized_user_omits_secrets() {
        let json = serde_json::to_string(&sample_user()).unwrap();
        assert!(!json.contains("password_hash"));
        assert!(!json.contains("argon2id"));
        assert!(!json.contains("reset_token"));
        assert!(!json.contains("reset-secret"));
        assert!(json.contains("user@example.com"));
        assert!(json.contains("user_1"));
    }
}
