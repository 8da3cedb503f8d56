use serde::Serialize;
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::category::Category;

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

/// User record as stored in the `users` table.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub phone: Option<String>,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub dob: Option<Date>,
    pub article_preferences: Vec<String>,
    pub is_email_verified: bool,
    pub otp: Vec<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub phone: Option<String>,
    pub password_hash: String, // Argon2 hash, never serialized
    pub first_name: String,
    pub last_name: String,
    pub dob: Option<Date>,
    pub article_preferences: Vec<Category>,
    pub is_email_verified: bool,
    pub otp: Vec<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        Self {
            id: r.id,
            email: r.email,
            phone: r.phone,
            password_hash: r.password_hash,
            first_name: r.first_name,
            last_name: r.last_name,
            dob: r.dob,
            // Unknown ids can only appear through out-of-band edits; drop them.
            article_preferences: r
                .article_preferences
                .iter()
                .filter_map(|p| p.parse().ok())
                .collect(),
            is_email_verified: r.is_email_verified,
            otp: r.otp,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// The user as returned to clients: no password hash, no otp.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub phone: Option<String>,
    pub first_name: String,
    pub last_name: String,
    #[serde(with = "iso_date::option")]
    pub dob: Option<Date>,
    pub article_preferences: Vec<Category>,
    pub is_email_verified: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<User> for PublicUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            phone: u.phone,
            first_name: u.first_name,
            last_name: u.last_name,
            dob: u.dob,
            article_preferences: u.article_preferences,
            is_email_verified: u.is_email_verified,
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}

/// Everything needed to insert a user; the password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub phone: Option<String>,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub dob: Option<Date>,
    pub article_preferences: Vec<Category>,
}

/// Validated partial profile update. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub dob: Option<Date>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.email.is_none()
            && self.phone.is_none()
            && self.dob.is_none()
    }
}
