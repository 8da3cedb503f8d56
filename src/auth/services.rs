use lazy_static::lazy_static;
use regex::Regex;
use time::{format_description::well_known::Rfc3339, macros::format_description, Date, OffsetDateTime};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{SignupRequest, UpdateProfileRequest},
        jwt::JwtKeys,
        password::{hash_password_blocking, verify_password_blocking},
        repo::UserRepo,
        repo_types::{NewUser, ProfileUpdate, PublicUser},
    },
    category::Category,
    error::{AppError, AppResult, ResultExt},
};

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PREFERENCES: usize = 3;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn is_valid_phone(phone: &str) -> bool {
    lazy_static! {
        static ref PHONE_RE: Regex = Regex::new(r"^\d{10}$").unwrap();
    }
    PHONE_RE.is_match(phone)
}

/// Accepts a calendar date (`1990-04-21`) or a full RFC 3339 timestamp.
pub(crate) fn parse_dob(raw: &str) -> Option<Date> {
    Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .ok()
        .or_else(|| OffsetDateTime::parse(raw, &Rfc3339).ok().map(|t| t.date()))
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Trimmed, and `None` when blank: an empty field counts as not supplied.
fn provided(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Like [`provided`] but untrimmed: passwords are used byte for byte.
fn secret(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn parse_preferences(raw: &[String]) -> AppResult<Vec<Category>> {
    if raw.len() > MAX_PREFERENCES {
        return Err(AppError::validation(
            "You can select up to 3 preferences only",
        ));
    }
    let mut out: Vec<Category> = Vec::with_capacity(raw.len());
    for id in raw {
        let category = id
            .parse::<Category>()
            .map_err(|_| AppError::validation("Invalid article preferences provided"))?;
        if out.contains(&category) {
            return Err(AppError::validation("Duplicate preferences are not allowed"));
        }
        out.push(category);
    }
    Ok(out)
}

pub async fn signup(users: &dyn UserRepo, req: SignupRequest) -> AppResult<()> {
    let (password, confirm) = match (secret(req.password), secret(req.confirm_password)) {
        (Some(p), Some(c)) => (p, c),
        _ => {
            return Err(AppError::validation(
                "Password and confirmation are required",
            ))
        }
    };
    if password != confirm {
        return Err(AppError::validation("Passwords do not match"));
    }

    let email = normalize_email(&req.email);
    if !is_valid_email(&email) {
        return Err(AppError::validation("Invalid email format"));
    }
    let phone = provided(req.phone);
    if let Some(phone) = phone.as_deref() {
        if !is_valid_phone(phone) {
            return Err(AppError::validation("Invalid phone number format"));
        }
    }
    let dob = match provided(req.dob) {
        Some(raw) => Some(
            parse_dob(&raw).ok_or_else(|| AppError::validation("Invalid date of birth format"))?,
        ),
        None => None,
    };
    let article_preferences = parse_preferences(&req.article_preferences)?;

    if users.find_by_email(&email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(AppError::Conflict("User already exists".into()));
    }
    if let Some(phone) = phone.as_deref() {
        if users.find_by_phone(phone).await?.is_some() {
            warn!("phone already registered");
            return Err(AppError::Conflict("User already exists".into()));
        }
    }

    let password_hash = hash_password_blocking(password)
        .await
        .or_internal("hash password")?;

    let user = users
        .create(NewUser {
            email,
            phone,
            password_hash,
            first_name: req.first_name.trim().to_string(),
            last_name: req.last_name.trim().to_string(),
            dob,
            article_preferences,
        })
        .await?;
    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok(())
}

/// Tokens and profile handed out by a successful login.
#[derive(Debug)]
pub struct LoginOutcome {
    pub access_token: String,
    pub refresh_token: String,
    pub user: PublicUser,
}

pub async fn login(
    users: &dyn UserRepo,
    keys: &JwtKeys,
    email_or_phone: &str,
    password: &str,
) -> AppResult<LoginOutcome> {
    let ident = email_or_phone.trim();
    let ident = if ident.contains('@') {
        normalize_email(ident)
    } else {
        ident.to_string()
    };
    if ident.is_empty() || password.is_empty() {
        return Err(AppError::InvalidCredentials);
    }

    let Some(user) = users.find_by_email_or_phone(&ident).await? else {
        warn!("login unknown identifier");
        return Err(AppError::InvalidCredentials);
    };

    let ok = verify_password_blocking(password.to_string(), user.password_hash.clone())
        .await
        .or_internal("verify password")?;
    if !ok {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AppError::InvalidCredentials);
    }

    let access_token = keys.sign_access(user.id)?;
    let refresh_token = keys.sign_refresh(user.id)?;
    info!(user_id = %user.id, "user logged in");
    Ok(LoginOutcome {
        access_token,
        refresh_token,
        user: user.into(),
    })
}

/// Identity established by the authentication gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authenticated {
    pub user_id: Uuid,
    /// Set when the access token was missing or invalid and a new one was
    /// minted from the refresh token.
    pub refreshed_access: Option<String>,
}

/// Verifies the access token, falling back to the refresh token once. Either
/// way the user is looked up exactly once to confirm it still exists.
pub async fn authenticate(
    users: &dyn UserRepo,
    keys: &JwtKeys,
    access: Option<&str>,
    refresh: Option<&str>,
) -> AppResult<Authenticated> {
    let access = access.filter(|t| !t.is_empty());
    let refresh = refresh.filter(|t| !t.is_empty());

    if let Some(claims) = access.and_then(|t| keys.verify_access(t).ok()) {
        resolve_identity(users, claims.user_id).await?;
        return Ok(Authenticated {
            user_id: claims.user_id,
            refreshed_access: None,
        });
    }

    let Some(refresh) = refresh else {
        return Err(match access {
            None => AppError::Unauthorized("Access and refresh tokens missing".into()),
            Some(_) => AppError::InvalidToken,
        });
    };
    let claims = keys.verify_refresh(refresh)?;
    resolve_identity(users, claims.user_id).await?;

    let new_access = keys.sign_access(claims.user_id)?;
    debug!(user_id = %claims.user_id, "access token refreshed");
    Ok(Authenticated {
        user_id: claims.user_id,
        refreshed_access: Some(new_access),
    })
}

async fn resolve_identity(users: &dyn UserRepo, user_id: Uuid) -> AppResult<()> {
    if users.exists(user_id).await? {
        Ok(())
    } else {
        Err(AppError::not_found("User not found"))
    }
}

pub async fn get_user(users: &dyn UserRepo, user_id: Uuid) -> AppResult<PublicUser> {
    users
        .find_by_id(user_id)
        .await?
        .map(PublicUser::from)
        .ok_or_else(|| AppError::not_found("User not found"))
}

pub async fn update_profile(
    users: &dyn UserRepo,
    user_id: Uuid,
    req: UpdateProfileRequest,
) -> AppResult<PublicUser> {
    let mut update = ProfileUpdate {
        first_name: provided(req.first_name),
        last_name: provided(req.last_name),
        ..Default::default()
    };
    if let Some(email) = provided(req.email) {
        let email = normalize_email(&email);
        if !is_valid_email(&email) {
            return Err(AppError::validation("Invalid email format"));
        }
        update.email = Some(email);
    }
    if let Some(phone) = provided(req.phone) {
        if !is_valid_phone(&phone) {
            return Err(AppError::validation("Invalid phone number format"));
        }
        update.phone = Some(phone);
    }
    if let Some(dob) = provided(req.dob) {
        update.dob =
            Some(parse_dob(&dob).ok_or_else(|| AppError::validation("Invalid date of birth format"))?);
    }
    if update.is_empty() {
        return Err(AppError::NoFieldsProvided);
    }

    let user = users
        .update_profile(user_id, update)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    info!(user_id = %user_id, "profile updated");
    Ok(user.into())
}

pub async fn update_password(
    users: &dyn UserRepo,
    user_id: Uuid,
    current: Option<String>,
    new: Option<String>,
) -> AppResult<()> {
    let (Some(current), Some(new)) = (current.filter(|v| !v.is_empty()), new.filter(|v| !v.is_empty()))
    else {
        return Err(AppError::validation(
            "Current and new passwords are required",
        ));
    };
    if new.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(
            "New password must be at least 8 characters",
        ));
    }

    let user = users
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    let ok = verify_password_blocking(current, user.password_hash)
        .await
        .or_internal("verify password")?;
    if !ok {
        warn!(user_id = %user_id, "password change with wrong current password");
        return Err(AppError::Unauthorized(
            "Current password is incorrect".into(),
        ));
    }

    let hash = hash_password_blocking(new).await.or_internal("hash password")?;
    if !users.update_password(user_id, &hash).await? {
        return Err(AppError::not_found("User not found"));
    }
    info!(user_id = %user_id, "password updated");
    Ok(())
}

pub async fn update_preferences(
    users: &dyn UserRepo,
    user_id: Uuid,
    preferences: &[String],
) -> AppResult<Vec<Category>> {
    if preferences.is_empty() {
        return Err(AppError::validation("At least one preference is required"));
    }
    let parsed = parse_preferences(preferences)?;
    let user = users
        .update_preferences(user_id, &parsed)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    info!(user_id = %user_id, "preferences updated");
    Ok(user.article_preferences)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::dto::SignupRequest,
        config::AppConfig,
        testing::MemoryUserRepo,
    };

    fn keys() -> JwtKeys {
        JwtKeys::new(&AppConfig::for_tests().jwt)
    }

    fn signup_req(email: &str, password: &str) -> SignupRequest {
        SignupRequest {
            email: email.into(),
            password: Some(password.into()),
            confirm_password: Some(password.into()),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            phone: Some("0123456789".into()),
            ..Default::default()
        }
    }

    #[test]
    fn validators() {
        assert!(is_valid_email("a@b.co"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a b@c.de"));
        assert!(is_valid_phone("0123456789"));
        assert!(!is_valid_phone("012345678"));
        assert!(!is_valid_phone("01234567890"));
        assert!(!is_valid_phone("01234-6789"));
        assert_eq!(
            parse_dob("1990-04-21"),
            Date::from_calendar_date(1990, time::Month::April, 21).ok()
        );
        assert!(parse_dob("1990-04-21T10:00:00Z").is_some());
        assert!(parse_dob("21/04/1990").is_none());
        assert!(parse_dob("1990-02-30").is_none());
    }

    #[tokio::test]
    async fn signup_then_login() {
        let users = MemoryUserRepo::default();
        signup(&users, signup_req("Ada@Example.com", "password123"))
            .await
            .unwrap();

        let out = login(&users, &keys(), "ada@example.com", "password123")
            .await
            .unwrap();
        assert_eq!(out.user.email, "ada@example.com");
        assert!(!out.user.is_email_verified);
        assert_eq!(keys().verify_access(&out.access_token).unwrap().user_id, out.user.id);
        assert_eq!(keys().verify_refresh(&out.refresh_token).unwrap().user_id, out.user.id);

        let json = serde_json::to_value(&out.user).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert!(json.get("otp").is_none());

        let stored = users.find_by_id(out.user.id).await.unwrap().unwrap();
        assert_ne!(stored.password_hash, "password123");
        assert!(stored.otp.is_empty());
    }

    #[tokio::test]
    async fn password_whitespace_is_kept_at_signup_and_login() {
        let users = MemoryUserRepo::default();
        signup(&users, signup_req("ada@example.com", "  hunter2pass  "))
            .await
            .unwrap();

        login(&users, &keys(), "ada@example.com", "  hunter2pass  ")
            .await
            .unwrap();
        let err = login(&users, &keys(), "ada@example.com", "hunter2pass")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidCredentials));
    }

    #[tokio::test]
    async fn login_by_phone() {
        let users = MemoryUserRepo::default();
        signup(&users, signup_req("ada@example.com", "password123"))
            .await
            .unwrap();
        let out = login(&users, &keys(), "0123456789", "password123").await.unwrap();
        assert_eq!(out.user.phone.as_deref(), Some("0123456789"));
    }

    #[tokio::test]
    async fn login_failures_are_indistinguishable() {
        let users = MemoryUserRepo::default();
        signup(&users, signup_req("ada@example.com", "password123"))
            .await
            .unwrap();

        let wrong = login(&users, &keys(), "ada@example.com", "nope-nope")
            .await
            .unwrap_err();
        let unknown = login(&users, &keys(), "who@example.com", "password123")
            .await
            .unwrap_err();
        assert!(matches!(wrong, AppError::InvalidCredentials));
        assert!(matches!(unknown, AppError::InvalidCredentials));
        assert_eq!(wrong.to_string(), unknown.to_string());
        assert_eq!(wrong.status_code(), unknown.status_code());
    }

    #[tokio::test]
    async fn signup_validation() {
        let users = MemoryUserRepo::default();

        let mut missing = signup_req("a@b.co", "password123");
        missing.confirm_password = None;
        assert!(matches!(
            signup(&users, missing).await,
            Err(AppError::Validation(_))
        ));

        let mut mismatch = signup_req("a@b.co", "password123");
        mismatch.confirm_password = Some("password124".into());
        let err = signup(&users, mismatch).await.unwrap_err();
        assert_eq!(err.to_string(), "Passwords do not match");

        let mut bad_prefs = signup_req("a@b.co", "password123");
        bad_prefs.article_preferences = vec!["gaming".into()];
        assert!(signup(&users, bad_prefs).await.is_err());

        assert!(users.is_empty());
    }

    #[tokio::test]
    async fn signup_rejects_existing_email_or_phone() {
        let users = MemoryUserRepo::default();
        signup(&users, signup_req("ada@example.com", "password123"))
            .await
            .unwrap();

        let mut same_email = signup_req("ADA@example.com", "password123");
        same_email.phone = None;
        assert!(matches!(
            signup(&users, same_email).await,
            Err(AppError::Conflict(_))
        ));

        let same_phone = signup_req("other@example.com", "password123");
        assert!(matches!(
            signup(&users, same_phone).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn authenticate_with_valid_access_token() {
        let users = MemoryUserRepo::default();
        let id = users.seed("a@b.co", "A", &[]).await;
        let keys = keys();
        let access = keys.sign_access(id).unwrap();

        let auth = authenticate(&users, &keys, Some(&access), None).await.unwrap();
        assert_eq!(auth.user_id, id);
        assert!(auth.refreshed_access.is_none());
    }

    #[tokio::test]
    async fn authenticate_refreshes_when_access_missing_or_invalid() {
        let users = MemoryUserRepo::default();
        let id = users.seed("a@b.co", "A", &[]).await;
        let keys = keys();
        let refresh = keys.sign_refresh(id).unwrap();

        for access in [None, Some("garbage")] {
            let auth = authenticate(&users, &keys, access, Some(&refresh)).await.unwrap();
            assert_eq!(auth.user_id, id);
            let minted = auth.refreshed_access.expect("new access token");
            assert_eq!(keys.verify_access(&minted).unwrap().user_id, id);
        }
    }

    #[tokio::test]
    async fn authenticate_rejects_without_valid_tokens() {
        let users = MemoryUserRepo::default();
        let id = users.seed("a@b.co", "A", &[]).await;
        let keys = keys();

        let err = authenticate(&users, &keys, None, None).await.unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::UNAUTHORIZED);

        let err = authenticate(&users, &keys, Some("bad"), Some("worse"))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::UNAUTHORIZED);

        // An access token is not accepted in the refresh slot.
        let access_as_refresh = keys.sign_access(id).unwrap();
        let err = authenticate(&users, &keys, None, Some(&access_as_refresh))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidToken));
    }

    #[tokio::test]
    async fn authenticate_requires_existing_user() {
        let users = MemoryUserRepo::default();
        let keys = keys();
        let ghost = Uuid::new_v4();
        let access = keys.sign_access(ghost).unwrap();
        let err = authenticate(&users, &keys, Some(&access), None).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn update_profile_validates_each_field() {
        let users = MemoryUserRepo::default();
        let id = users.seed("a@b.co", "A", &[]).await;

        let err = update_profile(
            &users,
            id,
            UpdateProfileRequest {
                phone: Some("12345".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "Invalid phone number format");

        let err = update_profile(
            &users,
            id,
            UpdateProfileRequest {
                email: Some("nope".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "Invalid email format");

        let err = update_profile(
            &users,
            id,
            UpdateProfileRequest {
                dob: Some("yesterday".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "Invalid date of birth format");

        let err = update_profile(
            &users,
            id,
            UpdateProfileRequest {
                first_name: Some("   ".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::NoFieldsProvided));

        let user = update_profile(
            &users,
            id,
            UpdateProfileRequest {
                first_name: Some("Grace".into()),
                phone: Some("9876543210".into()),
                dob: Some("1906-12-09".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(user.first_name, "Grace");
        assert_eq!(user.phone.as_deref(), Some("9876543210"));
        assert_eq!(user.email, "a@b.co");
        assert!(user.dob.is_some());
    }

    #[tokio::test]
    async fn update_profile_rejects_taken_email() {
        let users = MemoryUserRepo::default();
        users.seed("taken@b.co", "T", &[]).await;
        let id = users.seed("a@b.co", "A", &[]).await;
        let err = update_profile(
            &users,
            id,
            UpdateProfileRequest {
                email: Some("taken@b.co".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn update_password_flow() {
        let users = MemoryUserRepo::default();
        signup(&users, signup_req("ada@example.com", "password123"))
            .await
            .unwrap();
        let id = users.find_by_email("ada@example.com").await.unwrap().unwrap().id;

        let err = update_password(&users, id, Some("password123".into()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = update_password(&users, id, Some("password123".into()), Some("short".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = update_password(&users, id, Some("wrong-one".into()), Some("newpassword".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));

        let err = update_password(
            &users,
            Uuid::new_v4(),
            Some("password123".into()),
            Some("newpassword".into()),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        update_password(&users, id, Some("password123".into()), Some("newpassword".into()))
            .await
            .unwrap();
        assert!(login(&users, &keys(), "ada@example.com", "password123").await.is_err());
        assert!(login(&users, &keys(), "ada@example.com", "newpassword").await.is_ok());
    }

    #[tokio::test]
    async fn update_preferences_rules() {
        let users = MemoryUserRepo::default();
        let id = users.seed("a@b.co", "A", &[Category::Tech]).await;

        let empty: Vec<String> = vec![];
        assert!(update_preferences(&users, id, &empty).await.is_err());

        let four: Vec<String> = ["tech", "health", "food", "travel"].map(String::from).to_vec();
        assert!(update_preferences(&users, id, &four).await.is_err());

        let unknown: Vec<String> = vec!["tech".into(), "gaming".into()];
        assert!(update_preferences(&users, id, &unknown).await.is_err());

        let repeated: Vec<String> = vec!["tech".into(), "tech".into()];
        let err = update_preferences(&users, id, &repeated).await.unwrap_err();
        assert!(
            matches!(&err, AppError::Validation(m) if m == "Duplicate preferences are not allowed")
        );
        let stored = users.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.article_preferences, vec![Category::Tech]);

        let ok: Vec<String> = vec!["sports".into(), "politics".into()];
        let prefs = update_preferences(&users, id, &ok).await.unwrap();
        assert_eq!(prefs, vec![Category::Sports, Category::Politics]);

        let stored = users.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.article_preferences, vec![Category::Sports, Category::Politics]);
    }
}
