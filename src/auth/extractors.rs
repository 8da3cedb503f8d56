use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use uuid::Uuid;

use super::{
    claims::TokenKind,
    cookies::{token_cookie, ACCESS_COOKIE, REFRESH_COOKIE},
    services::authenticate,
};
use crate::{error::AppError, state::AppState};

/// Identity of the caller, placed in request extensions by [`require_auth`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser(pub Uuid);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .copied()
            .ok_or_else(|| AppError::Unauthorized("Authentication required".into()))
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let auth = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    auth.strip_prefix("Bearer ")
        .or_else(|| auth.strip_prefix("bearer "))
        .map(str::trim)
}

/// Gate for protected routes. The access token comes from the `accessToken`
/// cookie or a Bearer header; when it is unusable the refresh cookie mints a
/// new one, which is sent back as a cookie on the response.
pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let access = jar
        .get(ACCESS_COOKIE)
        .map(|c| c.value().to_string())
        .or_else(|| bearer_token(req.headers()).map(str::to_string));
    let refresh = jar.get(REFRESH_COOKIE).map(|c| c.value().to_string());

    let auth = authenticate(
        state.users.as_ref(),
        &state.jwt,
        access.as_deref(),
        refresh.as_deref(),
    )
    .await?;

    req.extensions_mut().insert(AuthUser(auth.user_id));
    let response = next.run(req).await;

    let Some(new_access) = auth.refreshed_access else {
        return Ok(response);
    };
    // A handler that already sets the access cookie (logout) wins.
    let handler_set_access = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.starts_with(&format!("{ACCESS_COOKIE}=")));
    if handler_set_access {
        return Ok(response);
    }
    let cookie = token_cookie(
        TokenKind::Access,
        new_access,
        &state.jwt,
        state.config.cookie_secure,
    );
    Ok((CookieJar::new().add(cookie), response).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_token(&headers), Some("abc"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);
    }
}
