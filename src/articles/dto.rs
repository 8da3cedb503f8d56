use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::articles::repo_types::Article;

/// Body of `POST /articles`.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub category: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub published_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub read_time: i32,
    pub is_published: Option<bool>,
}

/// Body of `PUT /articles/:id`. Absent fields are left as stored.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleUpdateRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub category: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub published_at: Option<OffsetDateTime>,
    pub image: Option<String>,
    pub tags: Option<Vec<String>>,
    pub read_time: Option<i32>,
    pub is_published: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct ArticleEnvelope {
    pub article: Article,
}
