use crate::server::CookiePolicy;
use std::time::Duration;
use warp::http::HeaderValue;
use warp::http::header::InvalidHeaderValue;

pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";

/// Build an `HttpOnly` cookie carrying a token.
pub fn token_cookie(
    policy: &CookiePolicy,
    name: &str,
    token: &str,
    ttl: Duration,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{name}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        ttl.as_secs()
    );
    if policy.secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub fn clear_cookie(policy: &CookiePolicy, name: &str) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{name}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if policy.secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Pick the access token from the `accessToken` cookie, falling back to an
/// `Authorization: Bearer` header.
pub fn extract_access_token(cookie: Option<String>, authorization: Option<String>) -> Option<String> {
    cookie.filter(|c| !c.is_empty()).or_else(|| {
        authorization
            .as_deref()
            .and_then(|value| value.trim().split_once(' '))
            .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("Bearer"))
            .map(|(_, token)| token.trim())
            .filter(|token| !token.is_empty())
            .map(str::to_owned)
    })
}
