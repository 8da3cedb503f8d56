//! In-memory stores used by unit and router tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    articles::{
        query::{ArticleFilter, SortBy},
        repo::ArticleRepo,
        repo_types::{
            Article, ArticleDraft, ArticlePatch, ArticleWithAuthor, AuthorSummary, ReactionKind,
        },
    },
    auth::{
        password::hash_password,
        repo::UserRepo,
        repo_types::{NewUser, ProfileUpdate, User},
    },
    category::Category,
    error::{AppError, AppResult},
};

/// Password given to every user created through [`MemoryUserRepo::seed`].
pub const SEED_PASSWORD: &str = "password123";

#[derive(Default)]
pub struct MemoryUserRepo {
    users: Mutex<Vec<User>>,
}

impl MemoryUserRepo {
    pub async fn seed(&self, email: &str, first_name: &str, prefs: &[Category]) -> Uuid {
        let password_hash = hash_password(SEED_PASSWORD).unwrap();
        let user = self
            .create(NewUser {
                email: email.to_string(),
                phone: None,
                password_hash,
                first_name: first_name.to_string(),
                last_name: "Tester".to_string(),
                dob: None,
                article_preferences: prefs.to_vec(),
            })
            .await
            .unwrap();
        user.id
    }

    pub fn is_empty(&self) -> bool {
        self.users.lock().unwrap().is_empty()
    }

    fn first_name(&self, id: Uuid) -> Option<String> {
        self.users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.id == id)
            .map(|u| u.first_name.clone())
    }

    fn find(&self, pred: impl Fn(&User) -> bool) -> Option<User> {
        self.users.lock().unwrap().iter().find(|u| pred(u)).cloned()
    }

    fn modify(&self, id: Uuid, f: impl FnOnce(&mut User)) -> Option<User> {
        let mut users = self.users.lock().unwrap();
        let user = users.iter_mut().find(|u| u.id == id)?;
        f(user);
        user.updated_at = OffsetDateTime::now_utc();
        Some(user.clone())
    }
}

fn clash(users: &[User], skip: Option<Uuid>, email: Option<&str>, phone: Option<&str>) -> bool {
    users.iter().filter(|u| Some(u.id) != skip).any(|u| {
        email.is_some_and(|e| u.email == e) || phone.is_some_and(|p| u.phone.as_deref() == Some(p))
    })
}

#[async_trait]
impl UserRepo for MemoryUserRepo {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        Ok(self.find(|u| u.id == id))
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        Ok(self.find(|u| u.email == email))
    }

    async fn find_by_phone(&self, phone: &str) -> AppResult<Option<User>> {
        Ok(self.find(|u| u.phone.as_deref() == Some(phone)))
    }

    async fn find_by_email_or_phone(&self, ident: &str) -> AppResult<Option<User>> {
        Ok(self.find(|u| u.email == ident || u.phone.as_deref() == Some(ident)))
    }

    async fn exists(&self, id: Uuid) -> AppResult<bool> {
        Ok(self.find(|u| u.id == id).is_some())
    }

    async fn create(&self, new: NewUser) -> AppResult<User> {
        let mut users = self.users.lock().unwrap();
        if clash(&users, None, Some(&new.email), new.phone.as_deref()) {
            return Err(AppError::Conflict("User already exists".into()));
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            email: new.email,
            phone: new.phone,
            password_hash: new.password_hash,
            first_name: new.first_name,
            last_name: new.last_name,
            dob: new.dob,
            article_preferences: new.article_preferences,
            is_email_verified: false,
            otp: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> AppResult<Option<User>> {
        {
            let users = self.users.lock().unwrap();
            if clash(&users, Some(id), update.email.as_deref(), update.phone.as_deref()) {
                return Err(AppError::Conflict("User already exists".into()));
            }
        }
        Ok(self.modify(id, |u| {
            if let Some(v) = update.first_name {
                u.first_name = v;
            }
            if let Some(v) = update.last_name {
                u.last_name = v;
            }
            if let Some(v) = update.email {
                u.email = v;
            }
            if let Some(v) = update.phone {
                u.phone = Some(v);
            }
            if let Some(v) = update.dob {
                u.dob = Some(v);
            }
        }))
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> AppResult<bool> {
        Ok(self
            .modify(id, |u| u.password_hash = password_hash.to_string())
            .is_some())
    }

    async fn update_preferences(
        &self,
        id: Uuid,
        preferences: &[Category],
    ) -> AppResult<Option<User>> {
        Ok(self.modify(id, |u| u.article_preferences = preferences.to_vec()))
    }
}

pub struct MemoryArticleRepo {
    users: Arc<MemoryUserRepo>,
    articles: Mutex<Vec<Article>>,
}

impl MemoryArticleRepo {
    pub fn new(users: Arc<MemoryUserRepo>) -> Self {
        Self {
            users,
            articles: Mutex::new(Vec::new()),
        }
    }

    pub fn set_views(&self, id: Uuid, views: i64) {
        self.modify(id, |a| a.views = views);
    }

    fn modify(&self, id: Uuid, f: impl FnOnce(&mut Article)) -> Option<Article> {
        let mut articles = self.articles.lock().unwrap();
        let article = articles.iter_mut().find(|a| a.id == id)?;
        f(article);
        article.updated_at = OffsetDateTime::now_utc();
        Some(article.clone())
    }
}

fn reactors_mut(article: &mut Article, kind: ReactionKind) -> &mut Vec<Uuid> {
    match kind {
        ReactionKind::Like => &mut article.likes,
        ReactionKind::Dislike => &mut article.dislikes,
        ReactionKind::Block => &mut article.blocked_by,
    }
}

fn apply(article: &mut Article, draft: ArticleDraft) {
    article.title = draft.title;
    article.content = draft.content;
    article.category = draft.category;
    article.published_at = draft.published_at;
    article.image = draft.image;
    article.tags = draft.tags;
    article.read_time = draft.read_time;
    article.is_published = draft.is_published;
}

#[async_trait]
impl ArticleRepo for MemoryArticleRepo {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Article>> {
        Ok(self
            .articles
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.id == id)
            .cloned())
    }

    async fn has_duplicate(
        &self,
        title: &str,
        content: &str,
        category: Category,
        exclude: Option<Uuid>,
    ) -> AppResult<bool> {
        Ok(self.articles.lock().unwrap().iter().any(|a| {
            !a.is_deleted
                && a.category == category
                && Some(a.id) != exclude
                && (a.title == title || a.content == content)
        }))
    }

    async fn create(&self, author_id: Uuid, draft: ArticleDraft) -> AppResult<Article> {
        let now = OffsetDateTime::now_utc();
        let mut article = Article {
            id: Uuid::new_v4(),
            title: String::new(),
            content: String::new(),
            author_id,
            category: draft.category,
            published_at: now,
            image: String::new(),
            tags: Vec::new(),
            read_time: 0,
            views: 0,
            likes: Vec::new(),
            dislikes: Vec::new(),
            blocked_by: Vec::new(),
            is_deleted: false,
            is_published: true,
            created_at: now,
            updated_at: now,
        };
        apply(&mut article, draft);
        self.articles.lock().unwrap().push(article.clone());
        Ok(article)
    }

    async fn update(&self, id: Uuid, patch: ArticlePatch) -> AppResult<Option<Article>> {
        Ok(self.modify(id, |a| {
            if let Some(v) = patch.title {
                a.title = v;
            }
            if let Some(v) = patch.content {
                a.content = v;
            }
            if let Some(v) = patch.category {
                a.category = v;
            }
            if let Some(v) = patch.published_at {
                a.published_at = v;
            }
            if let Some(v) = patch.image {
                a.image = v;
            }
            if let Some(v) = patch.tags {
                a.tags = v;
            }
            if let Some(v) = patch.read_time {
                a.read_time = v;
            }
            if let Some(v) = patch.is_published {
                a.is_published = v;
            }
        }))
    }

    async fn mark_deleted(&self, id: Uuid) -> AppResult<Option<Article>> {
        Ok(self.modify(id, |a| a.is_deleted = true))
    }

    async fn add_reaction(
        &self,
        id: Uuid,
        kind: ReactionKind,
        user_id: Uuid,
    ) -> AppResult<Option<Article>> {
        Ok(self.modify(id, |a| {
            let set = reactors_mut(a, kind);
            if !set.contains(&user_id) {
                set.push(user_id);
            }
        }))
    }

    async fn remove_reaction(
        &self,
        id: Uuid,
        kind: ReactionKind,
        user_id: Uuid,
    ) -> AppResult<Option<Article>> {
        Ok(self.modify(id, |a| reactors_mut(a, kind).retain(|u| *u != user_id)))
    }

    async fn list(
        &self,
        filter: &ArticleFilter,
        sort: SortBy,
        skip: i64,
        limit: i64,
    ) -> AppResult<(Vec<ArticleWithAuthor>, u64)> {
        let mut matching: Vec<Article> = self
            .articles
            .lock()
            .unwrap()
            .iter()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        match sort {
            SortBy::Newest => matching.sort_by(|a, b| b.published_at.cmp(&a.published_at)),
            SortBy::Popular => matching.sort_by(|a, b| {
                b.views
                    .cmp(&a.views)
                    .then(b.published_at.cmp(&a.published_at))
            }),
        }
        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(skip.max(0) as usize)
            .take(limit.max(0) as usize)
            .filter_map(|article| {
                // Inner join: articles whose author is gone are dropped.
                let name = self.users.first_name(article.author_id)?;
                Some(ArticleWithAuthor {
                    article,
                    author: AuthorSummary { name },
                })
            })
            .collect();
        Ok((page, total))
    }
}
