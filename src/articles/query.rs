//! Listing filters, sort order and pagination for the article feeds.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    articles::repo_types::{Article, ArticleWithAuthor},
    category::Category,
    error::{AppError, AppResult},
};

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 10;
pub const MAX_LIMIT: u32 = 100;

/// Raw listing query string. Values stay strings so that a bad `page`
/// falls back to its default instead of failing the request.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub search: Option<String>,
    pub category: Option<String>,
    pub sort_by: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortBy {
    /// `published_at` descending.
    #[default]
    Newest,
    /// `views` descending.
    Popular,
}

impl SortBy {
    fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("popular") => SortBy::Popular,
            _ => SortBy::Newest,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

fn positive_or(raw: Option<&str>, default: u32) -> u32 {
    raw.and_then(|v| v.trim().parse::<u32>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

impl Pagination {
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: page.max(1),
            limit: limit.clamp(1, MAX_LIMIT),
        }
    }

    pub fn skip(&self) -> i64 {
        (i64::from(self.page) - 1) * i64::from(self.limit)
    }
}

/// Parsed listing options shared by both feeds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub pagination: Pagination,
    pub sort: SortBy,
    pub search: Option<String>,
    pub category: Option<Category>,
}

impl TryFrom<ListParams> for ListOptions {
    type Error = AppError;

    fn try_from(p: ListParams) -> AppResult<Self> {
        let category = match p.category.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(
                raw.parse::<Category>()
                    .map_err(|_| AppError::validation("Invalid category"))?,
            ),
        };
        let search = p
            .search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        Ok(Self {
            pagination: Pagination::new(
                positive_or(p.page.as_deref(), DEFAULT_PAGE),
                positive_or(p.limit.as_deref(), DEFAULT_LIMIT),
            ),
            sort: SortBy::parse(p.sort_by.as_deref()),
            search,
            category,
        })
    }
}

/// Which categories a listing may return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryScope {
    Any,
    Exactly(Category),
    OneOf(Vec<Category>),
}

/// Store-independent description of an article listing. Soft-deleted
/// articles are always excluded; the search term is ANDed with the rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleFilter {
    pub author_id: Option<Uuid>,
    pub not_blocked_by: Option<Uuid>,
    pub category: CategoryScope,
    pub search: Option<String>,
}

impl ArticleFilter {
    pub fn by_author(author_id: Uuid, opts: &ListOptions) -> Self {
        Self {
            author_id: Some(author_id),
            not_blocked_by: None,
            category: opts
                .category
                .map_or(CategoryScope::Any, CategoryScope::Exactly),
            search: opts.search.clone(),
        }
    }

    /// An explicit category wins over stored preferences; with neither,
    /// every category is allowed.
    pub fn for_feed(user_id: Uuid, preferences: &[Category], opts: &ListOptions) -> Self {
        let category = match opts.category {
            Some(c) => CategoryScope::Exactly(c),
            None if !preferences.is_empty() => CategoryScope::OneOf(preferences.to_vec()),
            None => CategoryScope::Any,
        };
        Self {
            author_id: None,
            not_blocked_by: Some(user_id),
            category,
            search: opts.search.clone(),
        }
    }

    /// Case-insensitive substring match over title, content and tags.
    pub fn search_matches(term: &str, article: &Article) -> bool {
        let term = term.to_lowercase();
        article.title.to_lowercase().contains(&term)
            || article.content.to_lowercase().contains(&term)
            || article
                .tags
                .iter()
                .any(|t| t.to_lowercase().contains(&term))
    }

    /// In-process evaluation of the filter, mirroring the SQL the
    /// Postgres store builds from it.
    pub fn matches(&self, article: &Article) -> bool {
        if article.is_deleted {
            return false;
        }
        if self.author_id.is_some_and(|a| a != article.author_id) {
            return false;
        }
        if self
            .not_blocked_by
            .is_some_and(|u| article.blocked_by.contains(&u))
        {
            return false;
        }
        let category_ok = match &self.category {
            CategoryScope::Any => true,
            CategoryScope::Exactly(c) => article.category == *c,
            CategoryScope::OneOf(cs) => cs.contains(&article.category),
        };
        category_ok
            && self
                .search
                .as_deref()
                .map_or(true, |s| Self::search_matches(s, article))
    }
}

/// Escapes `%`, `_` and `\` so user input is matched literally by `ILIKE`.
pub fn like_pattern(term: &str) -> String {
    let mut out = String::with_capacity(term.len() + 2);
    out.push('%');
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('%');
    out
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticlePage {
    pub articles: Vec<ArticleWithAuthor>,
    pub total_count: u64,
    pub total_pages: u64,
    pub current_page: u32,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

impl ArticlePage {
    pub fn new(articles: Vec<ArticleWithAuthor>, total_count: u64, pagination: Pagination) -> Self {
        let limit = u64::from(pagination.limit);
        let total_pages = total_count.div_ceil(limit);
        Self {
            articles,
            total_count,
            total_pages,
            current_page: pagination.page,
            has_next_page: u64::from(pagination.page) < total_pages,
            has_prev_page: pagination.page > 1,
        }
    }
}
