use crate::articles::repo::{ArticleRepo, PgArticleRepo};
use crate::auth::jwt::JwtKeys;
use crate::auth::repo::{PgUserRepo, UserRepo};
use crate::config::AppConfig;
use crate::rate_limit::IpRateLimiter;
use axum::extract::FromRef;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub jwt: JwtKeys,
    pub users: Arc<dyn UserRepo>,
    pub articles: Arc<dyn ArticleRepo>,
    pub limiter: IpRateLimiter,
}

impl FromRef<AppState> for IpRateLimiter {
    fn from_ref(state: &AppState) -> Self {
        state.limiter.clone()
    }
}

impl AppState {
    /// Connects the pool and builds the Postgres-backed repositories. The
    /// pool is returned as well so that `main` can run migrations on it.
    pub async fn init() -> anyhow::Result<(Self, PgPool)> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .connect(&config.database_url)
            .await?;

        let state = Self::from_parts(
            config,
            Arc::new(PgUserRepo::new(db.clone())),
            Arc::new(PgArticleRepo::new(db.clone())),
        )?;
        Ok((state, db))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserRepo>,
        articles: Arc<dyn ArticleRepo>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            jwt: JwtKeys::new(&config.jwt),
            limiter: IpRateLimiter::new(&config.rate_limit)?,
            config,
            users,
            articles,
        })
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        use crate::testing::{MemoryArticleRepo, MemoryUserRepo};

        let users = Arc::new(MemoryUserRepo::default());
        let articles = Arc::new(MemoryArticleRepo::new(users.clone()));
        Self::from_parts(Arc::new(AppConfig::for_tests()), users, articles)
            .expect("test config is valid")
    }

    /// Registers a user whose password is `testing::SEED_PASSWORD`.
    #[cfg(test)]
    pub async fn seed_user(&self, email: &str) -> uuid::Uuid {
        use crate::auth::{password::hash_password, repo_types::NewUser};

        self.users
            .create(NewUser {
                email: email.to_string(),
                phone: None,
                password_hash: hash_password(crate::testing::SEED_PASSWORD).unwrap(),
                first_name: "Tester".into(),
                last_name: "Tester".into(),
                dob: None,
                article_preferences: Vec::new(),
            })
            .await
            .unwrap()
            .id
    }
}
