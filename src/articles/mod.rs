use crate::state::AppState;
use axum::Router;

mod dto;
pub mod handlers;
pub mod query;
pub mod repo;
pub mod repo_types;
pub mod services;

/// All article routes; every one of them requires authentication.
pub fn router() -> Router<AppState> {
    handlers::routes()
}
