use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use time::Duration;

use super::{claims::TokenKind, jwt::JwtKeys};

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

fn cookie_name(kind: TokenKind) -> &'static str {
    match kind {
        TokenKind::Access => ACCESS_COOKIE,
        TokenKind::Refresh => REFRESH_COOKIE,
    }
}

/// HttpOnly, SameSite=Strict auth cookie living as long as the token.
pub fn token_cookie(kind: TokenKind, token: String, keys: &JwtKeys, secure: bool) -> Cookie<'static> {
    Cookie::build((cookie_name(kind), token))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(Duration::seconds(keys.ttl(kind).as_secs() as i64))
        .build()
}

pub fn with_tokens(
    jar: CookieJar,
    keys: &JwtKeys,
    secure: bool,
    access: String,
    refresh: String,
) -> CookieJar {
    jar.add(token_cookie(TokenKind::Access, access, keys, secure))
        .add(token_cookie(TokenKind::Refresh, refresh, keys, secure))
}

pub fn cleared(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(ACCESS_COOKIE).path("/"))
        .remove(Cookie::build(REFRESH_COOKIE).path("/"))
}
