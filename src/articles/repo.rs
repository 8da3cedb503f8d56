use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    articles::{
        query::{like_pattern, ArticleFilter, CategoryScope, SortBy},
        repo_types::{
            Article, ArticleDraft, ArticlePatch, ArticleRow, ArticleWithAuthor,
            ArticleWithAuthorRow, ReactionKind,
        },
    },
    category::Category,
    error::{AppResult, ResultExt},
};

/// Article store. Reaction updates must be atomic per article.
#[async_trait]
pub trait ArticleRepo: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Article>>;
    /// True if a non-deleted article in `category` (other than `exclude`)
    /// has the same title or the same content.
    async fn has_duplicate(
        &self,
        title: &str,
        content: &str,
        category: Category,
        exclude: Option<Uuid>,
    ) -> AppResult<bool>;
    async fn create(&self, author_id: Uuid, draft: ArticleDraft) -> AppResult<Article>;
    /// Writes only the fields present in `patch`.
    async fn update(&self, id: Uuid, patch: ArticlePatch) -> AppResult<Option<Article>>;
    async fn mark_deleted(&self, id: Uuid) -> AppResult<Option<Article>>;
    /// Add-to-set: adding an existing member is a no-op.
    async fn add_reaction(
        &self,
        id: Uuid,
        kind: ReactionKind,
        user_id: Uuid,
    ) -> AppResult<Option<Article>>;
    async fn remove_reaction(
        &self,
        id: Uuid,
        kind: ReactionKind,
        user_id: Uuid,
    ) -> AppResult<Option<Article>>;
    /// One page of matching articles joined with their author, plus the
    /// total number of matches.
    async fn list(
        &self,
        filter: &ArticleFilter,
        sort: SortBy,
        skip: i64,
        limit: i64,
    ) -> AppResult<(Vec<ArticleWithAuthor>, u64)>;
}

const ARTICLE_COLUMNS: &str = "a.id, a.title, a.content, a.author_id, a.category, a.published_at, \
     a.image, a.tags, a.read_time, a.views, a.likes, a.dislikes, a.blocked_by, a.is_deleted, \
     a.is_published, a.created_at, a.updated_at";

#[derive(Clone)]
pub struct PgArticleRepo {
    db: PgPool,
}

impl PgArticleRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn into_article(row: Option<ArticleRow>, context: &'static str) -> AppResult<Option<Article>> {
    row.map(Article::try_from).transpose().or_internal(context)
}

fn push_where(qb: &mut QueryBuilder<'_, Postgres>, filter: &ArticleFilter) {
    qb.push(" WHERE a.is_deleted = FALSE");
    if let Some(author) = filter.author_id {
        qb.push(" AND a.author_id = ").push_bind(author);
    }
    if let Some(user) = filter.not_blocked_by {
        qb.push(" AND NOT (").push_bind(user).push(" = ANY(a.blocked_by))");
    }
    match &filter.category {
        CategoryScope::Any => {}
        CategoryScope::Exactly(c) => {
            qb.push(" AND a.category = ").push_bind(c.id());
        }
        CategoryScope::OneOf(cs) => {
            let ids: Vec<String> = cs.iter().map(|c| c.id().to_string()).collect();
            qb.push(" AND a.category = ANY(").push_bind(ids).push(")");
        }
    }
    if let Some(term) = filter.search.as_deref() {
        let pattern = like_pattern(term);
        qb.push(" AND (a.title ILIKE ")
            .push_bind(pattern.clone())
            .push(r" ESCAPE '\' OR a.content ILIKE ")
            .push_bind(pattern.clone())
            .push(r" ESCAPE '\' OR EXISTS (SELECT 1 FROM unnest(a.tags) AS t(tag) WHERE t.tag ILIKE ")
            .push_bind(pattern)
            .push(r" ESCAPE '\'))");
    }
}

fn order_by(sort: SortBy) -> &'static str {
    match sort {
        SortBy::Newest => " ORDER BY a.published_at DESC, a.id DESC",
        SortBy::Popular => " ORDER BY a.views DESC, a.published_at DESC, a.id DESC",
    }
}

fn page_query(
    filter: &ArticleFilter,
    sort: SortBy,
    skip: i64,
    limit: i64,
) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!(
        "SELECT {ARTICLE_COLUMNS}, u.first_name AS author_name \
         FROM articles a JOIN users u ON u.id = a.author_id"
    ));
    push_where(&mut qb, filter);
    qb.push(order_by(sort))
        .push(" LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(skip);
    qb
}

fn count_query(filter: &ArticleFilter) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM articles a");
    push_where(&mut qb, filter);
    qb
}

fn add_reaction_sql(kind: ReactionKind) -> String {
    let col = kind.column();
    format!(
        r#"
        UPDATE articles AS a
           SET {col} = CASE WHEN $2 = ANY(a.{col}) THEN a.{col}
                            ELSE array_append(a.{col}, $2) END,
               updated_at = now()
         WHERE a.id = $1
        RETURNING {ARTICLE_COLUMNS}
        "#
    )
}

fn remove_reaction_sql(kind: ReactionKind) -> String {
    let col = kind.column();
    format!(
        r#"
        UPDATE articles AS a
           SET {col} = array_remove(a.{col}, $2), updated_at = now()
         WHERE a.id = $1
        RETURNING {ARTICLE_COLUMNS}
        "#
    )
}

#[async_trait]
impl ArticleRepo for PgArticleRepo {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Article>> {
        let row = sqlx::query_as::<_, ArticleRow>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles a WHERE a.id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .or_internal("Database error: Failed to find article")?;
        into_article(row, "Database error: Failed to find article")
    }

    async fn has_duplicate(
        &self,
        title: &str,
        content: &str,
        category: Category,
        exclude: Option<Uuid>,
    ) -> AppResult<bool> {
        let found: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM articles
                 WHERE category = $1
                   AND is_deleted = FALSE
                   AND (title = $2 OR content = $3)
                   AND ($4::uuid IS NULL OR id <> $4)
            )
            "#,
        )
        .bind(category.id())
        .bind(title)
        .bind(content)
        .bind(exclude)
        .fetch_one(&self.db)
        .await
        .or_internal("Database error: Failed to check for duplicate article")?;
        Ok(found)
    }

    async fn create(&self, author_id: Uuid, draft: ArticleDraft) -> AppResult<Article> {
        let row = sqlx::query_as::<_, ArticleRow>(&format!(
            r#"
            INSERT INTO articles AS a (id, title, content, author_id, category, published_at,
                                       image, tags, read_time, is_published)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {ARTICLE_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&draft.title)
        .bind(&draft.content)
        .bind(author_id)
        .bind(draft.category.id())
        .bind(draft.published_at)
        .bind(&draft.image)
        .bind(&draft.tags)
        .bind(draft.read_time)
        .bind(draft.is_published)
        .fetch_one(&self.db)
        .await
        .or_internal("Database error: Failed to create article")?;
        Article::try_from(row).or_internal("Database error: Failed to create article")
    }

    async fn update(&self, id: Uuid, patch: ArticlePatch) -> AppResult<Option<Article>> {
        let row = sqlx::query_as::<_, ArticleRow>(&format!(
            r#"
            UPDATE articles AS a
               SET title = COALESCE($2, a.title),
                   content = COALESCE($3, a.content),
                   category = COALESCE($4, a.category),
                   published_at = COALESCE($5, a.published_at),
                   image = COALESCE($6, a.image),
                   tags = COALESCE($7, a.tags),
                   read_time = COALESCE($8, a.read_time),
                   is_published = COALESCE($9, a.is_published),
                   updated_at = now()
             WHERE a.id = $1
            RETURNING {ARTICLE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(patch.title)
        .bind(patch.content)
        .bind(patch.category.map(Category::id))
        .bind(patch.published_at)
        .bind(patch.image)
        .bind(patch.tags)
        .bind(patch.read_time)
        .bind(patch.is_published)
        .fetch_optional(&self.db)
        .await
        .or_internal("Database error: Failed to update article")?;
        into_article(row, "Database error: Failed to update article")
    }

    async fn mark_deleted(&self, id: Uuid) -> AppResult<Option<Article>> {
        let row = sqlx::query_as::<_, ArticleRow>(&format!(
            r#"
            UPDATE articles AS a SET is_deleted = TRUE, updated_at = now()
             WHERE a.id = $1
            RETURNING {ARTICLE_COLUMNS}
            "#
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .or_internal("Database error: Failed to soft delete article")?;
        into_article(row, "Database error: Failed to soft delete article")
    }

    async fn add_reaction(
        &self,
        id: Uuid,
        kind: ReactionKind,
        user_id: Uuid,
    ) -> AppResult<Option<Article>> {
        let row = sqlx::query_as::<_, ArticleRow>(&add_reaction_sql(kind))
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.db)
            .await
            .or_internal("Database error: Failed to toggle reaction")?;
        into_article(row, "Database error: Failed to toggle reaction")
    }

    async fn remove_reaction(
        &self,
        id: Uuid,
        kind: ReactionKind,
        user_id: Uuid,
    ) -> AppResult<Option<Article>> {
        let row = sqlx::query_as::<_, ArticleRow>(&remove_reaction_sql(kind))
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.db)
            .await
            .or_internal("Database error: Failed to toggle reaction")?;
        into_article(row, "Database error: Failed to toggle reaction")
    }

    async fn list(
        &self,
        filter: &ArticleFilter,
        sort: SortBy,
        skip: i64,
        limit: i64,
    ) -> AppResult<(Vec<ArticleWithAuthor>, u64)> {
        let mut page = page_query(filter, sort, skip, limit);
        let mut count = count_query(filter);

        let (rows, total) = tokio::try_join!(
            page.build_query_as::<ArticleWithAuthorRow>().fetch_all(&self.db),
            count.build_query_scalar::<i64>().fetch_one(&self.db),
        )
        .or_internal("Database error: Failed to fetch articles")?;

        let articles = rows
            .into_iter()
            .map(ArticleWithAuthor::try_from)
            .collect::<Result<Vec<_>, _>>()
            .or_internal("Database error: Failed to fetch articles")?;
        Ok((articles, total.max(0) as u64))
    }
}
