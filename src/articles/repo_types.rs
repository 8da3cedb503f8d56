use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::category::Category;

/// Article record as stored in the `articles` table.
#[derive(Debug, Clone, FromRow)]
pub struct ArticleRow {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub author_id: Uuid,
    pub category: String,
    pub published_at: OffsetDateTime,
    pub image: String,
    pub tags: Vec<String>,
    pub read_time: i32,
    pub views: i64,
    pub likes: Vec<Uuid>,
    pub dislikes: Vec<Uuid>,
    pub blocked_by: Vec<Uuid>,
    pub is_deleted: bool,
    pub is_published: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, FromRow)]
pub struct ArticleWithAuthorRow {
    #[sqlx(flatten)]
    pub article: ArticleRow,
    pub author_name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub author_id: Uuid,
    pub category: Category,
    #[serde(with = "time::serde::rfc3339")]
    pub published_at: OffsetDateTime,
    pub image: String,
    pub tags: Vec<String>,
    pub read_time: i32,
    pub views: i64,
    pub likes: Vec<Uuid>,
    pub dislikes: Vec<Uuid>,
    pub blocked_by: Vec<Uuid>,
    pub is_deleted: bool,
    pub is_published: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl TryFrom<ArticleRow> for Article {
    type Error = anyhow::Error;

    fn try_from(r: ArticleRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            title: r.title,
            content: r.content,
            author_id: r.author_id,
            category: r.category.parse()?,
            published_at: r.published_at,
            image: r.image,
            tags: r.tags,
            read_time: r.read_time,
            views: r.views,
            likes: r.likes,
            dislikes: r.dislikes,
            blocked_by: r.blocked_by,
            is_deleted: r.is_deleted,
            is_published: r.is_published,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

impl Article {
    pub fn reactors(&self, kind: ReactionKind) -> &[Uuid] {
        match kind {
            ReactionKind::Like => &self.likes,
            ReactionKind::Dislike => &self.dislikes,
            ReactionKind::Block => &self.blocked_by,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthorSummary {
    pub name: String,
}

/// A listed article joined with its author's display name.
#[derive(Debug, Clone, Serialize)]
pub struct ArticleWithAuthor {
    #[serde(flatten)]
    pub article: Article,
    pub author: AuthorSummary,
}

impl TryFrom<ArticleWithAuthorRow> for ArticleWithAuthor {
    type Error = anyhow::Error;

    fn try_from(r: ArticleWithAuthorRow) -> Result<Self, Self::Error> {
        Ok(Self {
            article: r.article.try_into()?,
            author: AuthorSummary {
                name: r.author_name,
            },
        })
    }
}

/// Which reactor set a toggle touches. The sets are independent of each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionKind {
    Like,
    Dislike,
    Block,
}

impl ReactionKind {
    pub fn column(self) -> &'static str {
        match self {
            ReactionKind::Like => "likes",
            ReactionKind::Dislike => "dislikes",
            ReactionKind::Block => "blocked_by",
        }
    }
}

/// Editable article fields, validated, for a new article.
#[derive(Debug, Clone)]
pub struct ArticleDraft {
    pub title: String,
    pub content: String,
    pub category: Category,
    pub published_at: OffsetDateTime,
    pub image: String,
    pub tags: Vec<String>,
    pub read_time: i32,
    pub is_published: bool,
}

/// Validated partial edit. `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct ArticlePatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub category: Option<Category>,
    pub published_at: Option<OffsetDateTime>,
    pub image: Option<String>,
    pub tags: Option<Vec<String>>,
    pub read_time: Option<i32>,
    pub is_published: Option<bool>,
}
