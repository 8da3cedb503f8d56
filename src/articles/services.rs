use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    articles::{
        dto::{ArticleRequest, ArticleUpdateRequest},
        query::{ArticleFilter, ArticlePage, ListOptions},
        repo::ArticleRepo,
        repo_types::{Article, ArticleDraft, ArticlePatch, ReactionKind},
    },
    auth::repo::UserRepo,
    category::Category,
    error::{AppError, AppResult},
};

const NOT_FOUND: &str = "Article not found";

fn required_text(raw: &str, message: &'static str) -> AppResult<String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(AppError::validation(message));
    }
    Ok(value.to_string())
}

fn parse_category(raw: &str) -> AppResult<Category> {
    raw.trim()
        .parse::<Category>()
        .map_err(|_| AppError::validation("Invalid category"))
}

fn check_read_time(read_time: i32) -> AppResult<i32> {
    if read_time < 0 {
        return Err(AppError::validation("Read time must not be negative"));
    }
    Ok(read_time)
}

fn clean_tags(tags: Vec<String>) -> Vec<String> {
    tags.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

fn draft_from(req: ArticleRequest) -> AppResult<ArticleDraft> {
    Ok(ArticleDraft {
        title: required_text(&req.title, "Title is required")?,
        content: required_text(&req.content, "Content is required")?,
        category: parse_category(&req.category)?,
        published_at: req.published_at.unwrap_or_else(OffsetDateTime::now_utc),
        image: req.image.trim().to_string(),
        tags: clean_tags(req.tags),
        read_time: check_read_time(req.read_time)?,
        is_published: req.is_published.unwrap_or(true),
    })
}

fn patch_from(req: ArticleUpdateRequest) -> AppResult<ArticlePatch> {
    Ok(ArticlePatch {
        title: req
            .title
            .map(|t| required_text(&t, "Title is required"))
            .transpose()?,
        content: req
            .content
            .map(|c| required_text(&c, "Content is required"))
            .transpose()?,
        category: req.category.map(|c| parse_category(&c)).transpose()?,
        published_at: req.published_at,
        image: req.image.map(|i| i.trim().to_string()),
        tags: req.tags.map(clean_tags),
        read_time: req.read_time.map(check_read_time).transpose()?,
        is_published: req.is_published,
    })
}

pub async fn create(
    articles: &dyn ArticleRepo,
    req: ArticleRequest,
    author_id: Uuid,
) -> AppResult<Article> {
    let draft = draft_from(req)?;
    if articles
        .has_duplicate(&draft.title, &draft.content, draft.category, None)
        .await?
    {
        return Err(AppError::DuplicateArticle);
    }
    let article = articles.create(author_id, draft).await?;
    info!(article_id = %article.id, author_id = %author_id, "article created");
    Ok(article)
}

/// Applies only the supplied fields. The duplicate check runs against the
/// article as it will look after the edit.
pub async fn update(
    articles: &dyn ArticleRepo,
    id: Uuid,
    req: ArticleUpdateRequest,
) -> AppResult<Article> {
    let patch = patch_from(req)?;
    let current = articles
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::not_found(NOT_FOUND))?;
    let title = patch.title.as_deref().unwrap_or(&current.title);
    let content = patch.content.as_deref().unwrap_or(&current.content);
    let category = patch.category.unwrap_or(current.category);
    if articles
        .has_duplicate(title, content, category, Some(id))
        .await?
    {
        return Err(AppError::DuplicateArticle);
    }
    let article = articles
        .update(id, patch)
        .await?
        .ok_or_else(|| AppError::not_found(NOT_FOUND))?;
    info!(article_id = %id, "article updated");
    Ok(article)
}

pub async fn soft_delete(
    articles: &dyn ArticleRepo,
    id: Uuid,
    requester: Uuid,
) -> AppResult<Article> {
    let article = articles
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::not_found(NOT_FOUND))?;
    if article.author_id != requester {
        return Err(AppError::Forbidden(
            "Unauthorized: Only the article author can delete this article".into(),
        ));
    }
    if article.is_deleted {
        return Err(AppError::AlreadyDeleted);
    }
    let deleted = articles
        .mark_deleted(id)
        .await?
        .ok_or_else(|| AppError::not_found(NOT_FOUND))?;
    info!(article_id = %id, author_id = %requester, "article soft-deleted");
    Ok(deleted)
}

/// Removes `user_id` from the reaction set if present, adds it otherwise.
/// Membership is read before the atomic write, so two concurrent toggles by
/// the same user may both take the same branch.
pub async fn toggle_reaction(
    articles: &dyn ArticleRepo,
    id: Uuid,
    user_id: Uuid,
    kind: ReactionKind,
) -> AppResult<Article> {
    let article = articles
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::not_found(NOT_FOUND))?;
    let present = article.reactors(kind).contains(&user_id);
    let updated = if present {
        articles.remove_reaction(id, kind, user_id).await?
    } else {
        articles.add_reaction(id, kind, user_id).await?
    };
    debug!(article_id = %id, user_id = %user_id, kind = ?kind, removed = present, "reaction toggled");
    updated.ok_or_else(|| AppError::not_found(NOT_FOUND))
}

pub async fn list_by_author(
    articles: &dyn ArticleRepo,
    author_id: Uuid,
    opts: &ListOptions,
) -> AppResult<ArticlePage> {
    let filter = ArticleFilter::by_author(author_id, opts);
    fetch_page(articles, &filter, opts).await
}

pub async fn list_by_preference(
    articles: &dyn ArticleRepo,
    users: &dyn UserRepo,
    user_id: Uuid,
    opts: &ListOptions,
) -> AppResult<ArticlePage> {
    // Preferences only matter when no category was asked for.
    let preferences = match opts.category {
        Some(_) => Vec::new(),
        None => users
            .find_by_id(user_id)
            .await?
            .map(|u| u.article_preferences)
            .unwrap_or_default(),
    };
    let filter = ArticleFilter::for_feed(user_id, &preferences, opts);
    fetch_page(articles, &filter, opts).await
}

async fn fetch_page(
    articles: &dyn ArticleRepo,
    filter: &ArticleFilter,
    opts: &ListOptions,
) -> AppResult<ArticlePage> {
    let p = opts.pagination;
    let (items, total) = articles
        .list(filter, opts.sort, p.skip(), i64::from(p.limit))
        .await?;
    Ok(ArticlePage::new(items, total, p))
}
