use axum::{
    extract::{rejection::JsonRejection, State},
    response::IntoResponse,
    routing::{delete, get, patch, post},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::{info, instrument};

use crate::{
    auth::{
        cookies,
        dto::{
            LoginRequest, LoginResponse, PreferencesResponse, SignupRequest,
            UpdatePasswordRequest, UpdatePreferencesRequest, UpdateProfileRequest, UserEnvelope,
        },
        extractors::AuthUser,
        services,
    },
    category::{Category, CategoryInfo},
    error::AppResult,
    response::ApiResponse,
    state::AppState,
};

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/categories", get(list_categories))
}

pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_user))
        .route("/logout", delete(logout))
        .route("/profile", patch(update_profile))
        .route("/password", patch(update_password))
        .route("/preferences", patch(update_preferences))
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> AppResult<ApiResponse<()>> {
    let Json(req) = payload?;
    services::signup(state.users.as_ref(), req).await?;
    Ok(ApiResponse::created_message("Signup successful"))
}

#[instrument(skip(state, jar, payload))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(req) = payload?;
    let out = services::login(
        state.users.as_ref(),
        &state.jwt,
        &req.email_or_phone,
        &req.password,
    )
    .await?;
    let jar = cookies::with_tokens(
        jar,
        &state.jwt,
        state.config.cookie_secure,
        out.access_token,
        out.refresh_token,
    );
    Ok((
        jar,
        ApiResponse::ok("Logged in successfully", LoginResponse { user: out.user }),
    ))
}

#[instrument(skip(jar))]
pub async fn logout(AuthUser(user_id): AuthUser, jar: CookieJar) -> impl IntoResponse {
    info!(user_id = %user_id, "user logged out");
    (
        cookies::cleared(jar),
        ApiResponse::message("Logged out successfully"),
    )
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> AppResult<ApiResponse<UserEnvelope>> {
    let user = services::get_user(state.users.as_ref(), user_id).await?;
    Ok(ApiResponse::ok("User fetched successfully", UserEnvelope { user }))
}

#[instrument(skip(state, payload))]
pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> AppResult<ApiResponse<UserEnvelope>> {
    let Json(req) = payload?;
    let user = services::update_profile(state.users.as_ref(), user_id, req).await?;
    Ok(ApiResponse::ok("Profile updated successfully", UserEnvelope { user }))
}

#[instrument(skip(state, payload))]
pub async fn update_password(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<UpdatePasswordRequest>, JsonRejection>,
) -> AppResult<ApiResponse<()>> {
    let Json(req) = payload?;
    services::update_password(
        state.users.as_ref(),
        user_id,
        req.current_password,
        req.new_password,
    )
    .await?;
    Ok(ApiResponse::message("Password updated successfully"))
}

#[instrument(skip(state, payload))]
pub async fn update_preferences(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<UpdatePreferencesRequest>, JsonRejection>,
) -> AppResult<ApiResponse<PreferencesResponse>> {
    let Json(req) = payload?;
    let preferences =
        services::update_preferences(state.users.as_ref(), user_id, &req.preferences).await?;
    Ok(ApiResponse::ok(
        "Preferences updated successfully",
        PreferencesResponse { preferences },
    ))
}

pub async fn list_categories() -> ApiResponse<Vec<CategoryInfo>> {
    let all = Category::ALL.iter().map(|c| c.info()).collect();
    ApiResponse::ok("Categories fetched successfully", all)
}
