use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    routing::{get, patch, post, put},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    articles::{
        dto::{ArticleEnvelope, ArticleRequest, ArticleUpdateRequest},
        query::{ArticlePage, ListOptions, ListParams},
        repo_types::ReactionKind,
        services,
    },
    auth::extractors::AuthUser,
    error::AppResult,
    response::ApiResponse,
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/articles", post(create_article))
        .route("/articles/my-articles", get(my_articles))
        .route("/articles/preferred", get(preferred_articles))
        .route(
            "/articles/:id",
            put(update_article).delete(delete_article),
        )
        .route("/articles/like/:id", patch(toggle_like))
        .route("/articles/dislike/:id", patch(toggle_dislike))
        .route("/articles/block/:id", patch(toggle_block))
}

#[instrument(skip(state, payload))]
pub async fn create_article(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<ArticleRequest>, JsonRejection>,
) -> AppResult<ApiResponse<ArticleEnvelope>> {
    let Json(req) = payload?;
    let article = services::create(state.articles.as_ref(), req, user_id).await?;
    Ok(ApiResponse::created(
        "Article created successfully",
        ArticleEnvelope { article },
    ))
}

#[instrument(skip(state, payload))]
pub async fn update_article(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<ArticleUpdateRequest>, JsonRejection>,
) -> AppResult<ApiResponse<ArticleEnvelope>> {
    let Path(id) = id?;
    let Json(req) = payload?;
    let article = services::update(state.articles.as_ref(), id, req).await?;
    Ok(ApiResponse::ok(
        "Article updated successfully",
        ArticleEnvelope { article },
    ))
}

#[instrument(skip(state))]
pub async fn delete_article(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<ApiResponse<ArticleEnvelope>> {
    let Path(id) = id?;
    let article = services::soft_delete(state.articles.as_ref(), id, user_id).await?;
    Ok(ApiResponse::ok("Article deleted", ArticleEnvelope { article }))
}

async fn toggle(
    state: &AppState,
    user_id: Uuid,
    id: Result<Path<Uuid>, PathRejection>,
    kind: ReactionKind,
    message: &'static str,
) -> AppResult<ApiResponse<ArticleEnvelope>> {
    let Path(id) = id?;
    let article = services::toggle_reaction(state.articles.as_ref(), id, user_id, kind).await?;
    Ok(ApiResponse::ok(message, ArticleEnvelope { article }))
}

#[instrument(skip(state))]
pub async fn toggle_like(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<ApiResponse<ArticleEnvelope>> {
    toggle(&state, user_id, id, ReactionKind::Like, "Article liked successfully").await
}

#[instrument(skip(state))]
pub async fn toggle_dislike(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<ApiResponse<ArticleEnvelope>> {
    toggle(
        &state,
        user_id,
        id,
        ReactionKind::Dislike,
        "Article disliked successfully",
    )
    .await
}

#[instrument(skip(state))]
pub async fn toggle_block(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<ApiResponse<ArticleEnvelope>> {
    toggle(&state, user_id, id, ReactionKind::Block, "Article blocked/unblocked").await
}

#[instrument(skip(state))]
pub async fn my_articles(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    params: Result<Query<ListParams>, QueryRejection>,
) -> AppResult<ApiResponse<ArticlePage>> {
    let Query(params) = params?;
    let opts = ListOptions::try_from(params)?;
    let page = services::list_by_author(state.articles.as_ref(), user_id, &opts).await?;
    Ok(ApiResponse::ok("Articles fetched successfully", page))
}

#[instrument(skip(state))]
pub async fn preferred_articles(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    params: Result<Query<ListParams>, QueryRejection>,
) -> AppResult<ApiResponse<ArticlePage>> {
    let Query(params) = params?;
    let opts = ListOptions::try_from(params)?;
    let page = services::list_by_preference(
        state.articles.as_ref(),
        state.users.as_ref(),
        user_id,
        &opts,
    )
    .await?;
    Ok(ApiResponse::ok(
        "Articles based on preferences fetched successfully",
        page,
    ))
}
