use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

/// User record. Password and reset-token material never serializes to JSON;
/// inactive rows are invisible to the default finders and only reachable
/// through the explicit `_any` variants.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub name: String,
    pub email: String,
    pub photo: Option<String>,
    pub bio: Option<String>,
    pub role: Role,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(skip_serializing)]
    pub password_changed_at: Option<OffsetDateTime>,
    #[serde(skip_serializing)]
    pub password_reset_token_hash: Option<String>,
    #[serde(skip_serializing)]
    pub password_reset_expires_at: Option<OffsetDateTime>,
    #[serde(skip_serializing)]
    pub active: bool,
    pub created_at: OffsetDateTime,
}

impl User {
    /// True if the password changed at or after the given token issue
    /// instant, which makes any token issued up to that instant unusable.
    /// The stored timestamp already carries a one-second skew margin
    /// (see `update_password`), so a token signed together with the new
    /// password stays valid.
    pub fn changed_password_after(&self, token_iat: i64) -> bool {
        match self.password_changed_at {
            Some(changed_at) => token_iat <= changed_at.unix_timestamp(),
            None => false,
        }
    }
}

pub struct NewUser<'a> {
    pub username: &'a str,
    pub name: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
}

#[derive(Debug, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub photo: Option<String>,
    pub bio: Option<String>,
}

/// Admin-only update; never touches password fields.
#[derive(Debug, Default)]
pub struct AdminUserUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub active: Option<bool>,
}

const USER_COLS: &str = "id, username, name, email, photo, bio, role, password_hash, \
     password_changed_at, password_reset_token_hash, password_reset_expires_at, \
     active, created_at";

impl User {
    /// Default lookup: inactive users are filtered out here, not by hidden
    /// query middleware, so every caller that needs them says so explicitly.
    pub async fn find_by_id(db: &PgPool, id: Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLS} FROM users WHERE id = $1 AND active"
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Lookup including deactivated rows (admin tooling).
    pub async fn find_by_id_any(db: &PgPool, id: Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn find_by_email(db: &PgPool, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLS} FROM users WHERE email = $1 AND active"
        ))
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn find_by_username(db: &PgPool, username: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLS} FROM users WHERE username = $1 AND active"
        ))
        .bind(username)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Create with the hash computed by the caller; `password_changed_at`
    /// stays unset on initial creation.
    pub async fn create(db: &PgPool, new: NewUser<'_>) -> Result<User, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (username, name, email, password_hash) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {USER_COLS}"
        ))
        .bind(new.username)
        .bind(new.name)
        .bind(new.email)
        .bind(new.password_hash)
        .fetch_one(db)
        .await?;
        Ok(user)
    }

    /// Replace the password hash. The change timestamp is stamped one second
    /// in the past so a token issued in the same second as the change is not
    /// spuriously rejected by the stale-password gate.
    pub async fn update_password(db: &PgPool, id: Uuid, password_hash: &str) -> Result<User, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users \
             SET password_hash = $2, password_changed_at = now() - interval '1 second' \
             WHERE id = $1 AND active \
             RETURNING {USER_COLS}"
        ))
        .bind(id)
        .bind(password_hash)
        .fetch_one(db)
        .await?;
        Ok(user)
    }

    /// Persist a pending reset token. Only the two reset fields are written,
    /// so no other validation re-runs (the counterpart of saving with
    /// validation skipped).
    pub async fn set_reset_token(
        db: &PgPool,
        id: Uuid,
        token_hash: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE users \
             SET password_reset_token_hash = $2, password_reset_expires_at = $3 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(token_hash)
        .bind(expires_at)
        .execute(db)
        .await?;
        Ok(())
    }

    /// Compensating action when the token could not be delivered: both
    /// fields go back to absent together. Keyed on the hash that was issued
    /// so a newer token installed by a concurrent request survives.
    pub async fn clear_reset_token(db: &PgPool, id: Uuid, token_hash: &str) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE users \
             SET password_reset_token_hash = NULL, password_reset_expires_at = NULL \
             WHERE id = $1 AND password_reset_token_hash = $2",
        )
        .bind(id)
        .bind(token_hash)
        .execute(db)
        .await?;
        Ok(())
    }

    /// One atomic conditional update: matches the stored hash inside the
    /// expiry window, installs the new password and clears both reset fields.
    /// `None` means invalid or expired, including a second use of the same
    /// token. Keying the WHERE on the hash avoids the lost-update race
    /// between two concurrent reset attempts.
    pub async fn consume_reset_token(
        db: &PgPool,
        token_hash: &str,
        new_password_hash: &str,
    ) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users \
             SET password_hash = $2, \
                 password_changed_at = now() - interval '1 second', \
                 password_reset_token_hash = NULL, \
                 password_reset_expires_at = NULL \
             WHERE password_reset_token_hash = $1 \
               AND password_reset_expires_at > now() \
               AND active \
             RETURNING {USER_COLS}"
        ))
        .bind(token_hash)
        .bind(new_password_hash)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn update_profile(
        db: &PgPool,
        id: Uuid,
        update: ProfileUpdate,
    ) -> Result<User, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users \
             SET name = COALESCE($2, name), \
                 photo = COALESCE($3, photo), \
                 bio = COALESCE($4, bio) \
             WHERE id = $1 AND active \
             RETURNING {USER_COLS}"
        ))
        .bind(id)
        .bind(update.name)
        .bind(update.photo)
        .bind(update.bio)
        .fetch_one(db)
        .await?;
        Ok(user)
    }

    /// Soft delete: the row stays, the account disappears from lookups.
    pub async fn deactivate(db: &PgPool, id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET active = false WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }

    pub async fn list(db: &PgPool, limit: i64, offset: i64) -> Result<Vec<User>, AppError> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLS} FROM users WHERE active \
             ORDER BY created_at DESC LIMIT $1 OFFSET $2"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await?;
        Ok(users)
    }

    pub async fn admin_update(
        db: &PgPool,
        id: Uuid,
        update: AdminUserUpdate,
    ) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users \
             SET name = COALESCE($2, name), \
                 email = COALESCE($3, email), \
                 role = COALESCE($4, role), \
                 active = COALESCE($5, active) \
             WHERE id = $1 \
             RETURNING {USER_COLS}"
        ))
        .bind(id)
        .bind(update.name)
        .bind(update.email)
        .bind(update.role)
        .bind(update.active)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn search(db: &PgPool, query: &str, limit: i64) -> Result<Vec<User>, AppError> {
        let pattern = format!("%{}%", query);
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLS} FROM users \
             WHERE active AND (username ILIKE $1 OR name ILIKE $1) \
             ORDER BY username LIMIT $2"
        ))
        .bind(pattern)
        .bind(limit)
        .fetch_all(db)
        .await?;
        Ok(users)
    }
}

// Follow graph

pub async fn follow(db: &PgPool, follower_id: Uuid, followee_id: Uuid) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO follows (follower_id, followee_id) VALUES ($1, $2) \
         ON CONFLICT DO NOTHING",
    )
    .bind(follower_id)
    .bind(followee_id)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn unfollow(db: &PgPool, follower_id: Uuid, followee_id: Uuid) -> Result<(), AppError> {
    sqlx::query("DELETE FROM follows WHERE follower_id = $1 AND followee_id = $2")
        .bind(follower_id)
        .bind(followee_id)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn followers_of(db: &PgPool, user_id: Uuid) -> Result<Vec<User>, AppError> {
    let users = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLS} FROM users u \
         JOIN follows f ON f.follower_id = u.id \
         WHERE f.followee_id = $1 AND u.active \
         ORDER BY f.created_at DESC"
    ))
    .bind(user_id)
    .fetch_all(db)
    .await?;
    Ok(users)
}

pub async fn following_of(db: &PgPool, user_id: Uuid) -> Result<Vec<User>, AppError> {
    let users = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLS} FROM users u \
         JOIN follows f ON f.followee_id = u.id \
         WHERE f.follower_id = $1 AND u.active \
         ORDER BY f.created_at DESC"
    ))
    .bind(user_id)
    .fetch_all(db)
    .await?;
    Ok(users)
}

#[cfg(test)]
pub fn test_user(role: Role) -> User {
    User {
        id: Uuid::new_v4(),
        username: "tester".into(),
        name: "Test User".into(),
        email: "tester@example.com".into(),
        photo: None,
        bio: None,
        role,
        password_hash: "$argon2id$fake".into(),
        password_changed_at: None,
        password_reset_token_hash: None,
        password_reset_expires_at: None,
        active: true,
        created_at: OffsetDateTime::now_utc(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    #[test]
    fn password_never_changed_is_never_stale() {
        let user = test_user(Role::User);
        assert!(!user.changed_password_after(0));
        assert!(!user.changed_password_after(i64::MAX));
    }

    #[test]
    fn token_issued_before_change_is_stale() {
        let mut user = test_user(Role::User);
        let changed_at = OffsetDateTime::now_utc();
        user.password_changed_at = Some(changed_at);
        // Issued a minute before the change.
        let iat = (changed_at - Duration::minutes(1)).unix_timestamp();
        assert!(user.changed_password_after(iat));
        // Issued exactly at the stored instant: still rejected.
        assert!(user.changed_password_after(changed_at.unix_timestamp()));
    }

    #[test]
    fn token_issued_after_change_is_fresh() {
        let mut user = test_user(Role::User);
        let changed_at = OffsetDateTime::now_utc();
        user.password_changed_at = Some(changed_at);
        let iat = (changed_at + Duration::seconds(1)).unix_timestamp();
        assert!(!user.changed_password_after(iat));
    }

    fn new_user<'a>(username: &'a str, email: &'a str) -> NewUser<'a> {
        NewUser {
            username,
            name: "Test User",
            email,
            password_hash: "$argon2id$old",
        }
    }

    #[sqlx::test]
    async fn duplicate_email_is_a_validation_error(pool: PgPool) {
        User::create(&pool, new_user("first", "taken@example.com"))
            .await
            .unwrap();

        // Same email, different username: the unique index fires and must
        // surface as a 400, not an opaque 500.
        let err = User::create(&pool, new_user("second", "taken@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = User::create(&pool, new_user("first", "other@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[sqlx::test]
    async fn reset_token_is_consumed_exactly_once(pool: PgPool) {
        let user = User::create(&pool, new_user("resetter", "reset@example.com"))
            .await
            .unwrap();
        let expires = OffsetDateTime::now_utc() + Duration::minutes(10);
        User::set_reset_token(&pool, user.id, "hash-a", expires)
            .await
            .unwrap();

        let consumed = User::consume_reset_token(&pool, "hash-a", "$argon2id$new")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(consumed.id, user.id);
        assert_eq!(consumed.password_hash, "$argon2id$new");
        assert!(consumed.password_reset_token_hash.is_none());
        assert!(consumed.password_reset_expires_at.is_none());

        // Second use of the same token finds nothing.
        let again = User::consume_reset_token(&pool, "hash-a", "$argon2id$newer")
            .await
            .unwrap();
        assert!(again.is_none());
    }

    #[sqlx::test]
    async fn expired_reset_token_is_rejected(pool: PgPool) {
        let user = User::create(&pool, new_user("late", "late@example.com"))
            .await
            .unwrap();
        let expired = OffsetDateTime::now_utc() - Duration::minutes(1);
        User::set_reset_token(&pool, user.id, "hash-b", expired)
            .await
            .unwrap();

        // Matching hash, but past the window.
        let consumed = User::consume_reset_token(&pool, "hash-b", "$argon2id$new")
            .await
            .unwrap();
        assert!(consumed.is_none());

        // The password was left alone.
        let unchanged = User::find_by_id(&pool, user.id).await.unwrap().unwrap();
        assert_eq!(unchanged.password_hash, "$argon2id$old");
    }

    #[sqlx::test]
    async fn rollback_clear_spares_a_newer_token(pool: PgPool) {
        let user = User::create(&pool, new_user("racer", "racer@example.com"))
            .await
            .unwrap();
        let expires = OffsetDateTime::now_utc() + Duration::minutes(10);
        User::set_reset_token(&pool, user.id, "hash-old", expires)
            .await
            .unwrap();
        // A second forgot-password request replaces the pending token.
        User::set_reset_token(&pool, user.id, "hash-new", expires)
            .await
            .unwrap();

        // The first request's delivery failure rolls back its own token
        // only, so the newer one stays usable.
        User::clear_reset_token(&pool, user.id, "hash-old")
            .await
            .unwrap();
        let still_pending = User::find_by_id(&pool, user.id).await.unwrap().unwrap();
        assert_eq!(
            still_pending.password_reset_token_hash.as_deref(),
            Some("hash-new")
        );

        User::clear_reset_token(&pool, user.id, "hash-new")
            .await
            .unwrap();
        let cleared = User::find_by_id(&pool, user.id).await.unwrap().unwrap();
        assert!(cleared.password_reset_token_hash.is_none());
        assert!(cleared.password_reset_expires_at.is_none());
    }

    #[test]
    fn user_json_never_contains_credentials() {
        let mut user = test_user(Role::User);
        user.password_reset_token_hash = Some("deadbeef".into());
        user.password_reset_expires_at = Some(OffsetDateTime::now_utc());
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("password_hash"));
        assert!(!json.contains("argon2"));
        assert!(!json.contains("password_reset_token_hash"));
        assert!(!json.contains("deadbeef"));
        assert!(!json.contains("active"));
    }
}
