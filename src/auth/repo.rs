use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    auth::repo_types::{NewUser, ProfileUpdate, User, UserRow},
    category::Category,
    error::{AppError, AppResult, ResultExt},
};

/// User directory. Implementations must keep email and phone unique and
/// report a clash as `AppError::Conflict`.
#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>>;
    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>>;
    async fn find_by_phone(&self, phone: &str) -> AppResult<Option<User>>;
    /// Matches either column.
    async fn find_by_email_or_phone(&self, ident: &str) -> AppResult<Option<User>>;
    async fn exists(&self, id: Uuid) -> AppResult<bool>;
    async fn create(&self, user: NewUser) -> AppResult<User>;
    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> AppResult<Option<User>>;
    async fn update_password(&self, id: Uuid, password_hash: &str) -> AppResult<bool>;
    async fn update_preferences(
        &self,
        id: Uuid,
        preferences: &[Category],
    ) -> AppResult<Option<User>>;
}

const USER_COLUMNS: &str = "id, email, phone, password_hash, first_name, last_name, dob, \
     article_preferences, is_email_verified, otp, created_at, updated_at";

#[derive(Clone)]
pub struct PgUserRepo {
    db: PgPool,
}

impl PgUserRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn unique_or_internal(e: sqlx::Error, context: &'static str) -> AppError {
    let unique = e
        .as_database_error()
        .map(|d| d.is_unique_violation())
        .unwrap_or(false);
    if unique {
        AppError::Conflict("User already exists".into())
    } else {
        AppError::internal(context, e)
    }
}

fn preference_ids(preferences: &[Category]) -> Vec<String> {
    preferences.iter().map(|c| c.id().to_string()).collect()
}

#[async_trait]
impl UserRepo for PgUserRepo {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .or_internal("Database error: Failed to find user by ID")?;
        Ok(row.map(User::from))
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .or_internal("Database error: Failed to find user by email")?;
        Ok(row.map(User::from))
    }

    async fn find_by_phone(&self, phone: &str) -> AppResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE phone = $1"
        ))
        .bind(phone)
        .fetch_optional(&self.db)
        .await
        .or_internal("Database error: Failed to find user by phone")?;
        Ok(row.map(User::from))
    }

    async fn find_by_email_or_phone(&self, ident: &str) -> AppResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1 OR phone = $1 LIMIT 1"
        ))
        .bind(ident)
        .fetch_optional(&self.db)
        .await
        .or_internal("Database error: Failed to find user by email or phone")?;
        Ok(row.map(User::from))
    }

    async fn exists(&self, id: Uuid) -> AppResult<bool> {
        let found: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.db)
            .await
            .or_internal("Database error: Failed to find user by ID")?;
        Ok(found)
    }

    async fn create(&self, user: NewUser) -> AppResult<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (id, email, phone, password_hash, first_name, last_name, dob,
                               article_preferences, is_email_verified, otp)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, FALSE, '{{}}')
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&user.email)
        .bind(&user.phone)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.dob)
        .bind(preference_ids(&user.article_preferences))
        .fetch_one(&self.db)
        .await
        .map_err(|e| unique_or_internal(e, "Database error: Failed to create user"))?;
        Ok(row.into())
    }

    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> AppResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users
               SET first_name = COALESCE($2, first_name),
                   last_name  = COALESCE($3, last_name),
                   email      = COALESCE($4, email),
                   phone      = COALESCE($5, phone),
                   dob        = COALESCE($6, dob),
                   updated_at = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(update.first_name)
        .bind(update.last_name)
        .bind(update.email)
        .bind(update.phone)
        .bind(update.dob)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| unique_or_internal(e, "Database error: Failed to update user profile"))?;
        Ok(row.map(User::from))
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> AppResult<bool> {
        let res = sqlx::query(
            "UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(password_hash)
        .execute(&self.db)
        .await
        .or_internal("Database error: Failed to update user password")?;
        Ok(res.rows_affected() == 1)
    }

    async fn update_preferences(
        &self,
        id: Uuid,
        preferences: &[Category],
    ) -> AppResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users
               SET article_preferences = $2, updated_at = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(preference_ids(preferences))
        .fetch_optional(&self.db)
        .await
        .or_internal("Database error: Failed to update user preferences")?;
        Ok(row.map(User::from))
    }
}
