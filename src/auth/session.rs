//! Session transport: bearer header, cookie, and the request extractors.
//!
//! A bearer `Authorization` header wins; the `livreo_session` cookie is the
//! fallback. Logout only clears the cookie — a bearer token presented
//! directly stays valid until expiry.

use axum::extract::{FromRef, FromRequestParts};
use axum::http::{header, request::Parts, HeaderMap};
use std::sync::Arc;

use crate::auth::token::{Role, SessionClaims, TokenService};
use crate::error::AppError;

pub const SESSION_COOKIE: &str = "livreo_session";

/// Pull the session token out of the request: bearer first, cookie second.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(header::AUTHORIZATION) {
        if let Ok(value) = value.to_str() {
            if let Some(token) = value.strip_prefix("Bearer ") {
                let token = token.trim();
                if !token.is_empty() {
                    return Some(token.to_string());
                }
            }
        }
    }

    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    for pair in cookies.split(';') {
        let pair = pair.trim();
        if let Some(value) = pair.strip_prefix(SESSION_COOKIE) {
            if let Some(token) = value.strip_prefix('=') {
                if !token.is_empty() {
                    return Some(token.to_string());
                }
            }
        }
    }

    None
}

/// `Set-Cookie` value installing the session cookie.
pub fn session_cookie(token: &str, max_age_secs: u64, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, token, max_age_secs
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value clearing the session cookie (`Max-Age=0`).
pub fn clear_session_cookie(secure: bool) -> String {
    session_cookie("", 0, secure)
}

/// Extractor for handlers that require a verified session.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub claims: SessionClaims,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.claims.role == Role::Admin
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    Arc<TokenService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = extract_token(&parts.headers)
            .ok_or_else(|| AppError::unauthorized("Missing session token"))?;

        let service = Arc::<TokenService>::from_ref(state);
        let claims = service
            .verify(&token)
            .ok_or_else(|| AppError::unauthorized("Invalid or expired session"))?;

        Ok(CurrentUser { claims })
    }
}

/// Extractor for handlers where a session is optional (e.g. anonymous
/// contributions). Never rejects.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<SessionClaims>);

impl<S> FromRequestParts<S> for MaybeUser
where
    Arc<TokenService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let service = Arc::<TokenService>::from_ref(state);
        let claims = extract_token(&parts.headers).and_then(|token| service.verify(&token));
        Ok(MaybeUser(claims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_token_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer from-header".parse().unwrap());
        headers.insert(
            header::COOKIE,
            format!("{}=from-cookie", SESSION_COOKIE).parse().unwrap(),
        );

        assert_eq!(extract_token(&headers).as_deref(), Some("from-header"));
    }

    #[test]
    fn cookie_is_the_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            format!("other=1; {}=tok; theme=dark", SESSION_COOKIE)
                .parse()
                .unwrap(),
        );

        assert_eq!(extract_token(&headers).as_deref(), Some("tok"));
    }

    #[test]
    fn no_credentials_means_no_token() {
        let headers = HeaderMap::new();
        assert!(extract_token(&headers).is_none());
    }

    #[test]
    fn session_cookie_carries_required_attributes() {
        let cookie = session_cookie("tok", 604800, true);
        assert!(cookie.starts_with("livreo_session=tok"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Path=/"));
        assert!(cookie.contains("Max-Age=604800"));
        assert!(cookie.contains("Secure"));
    }

    #[test]
    fn clearing_sets_max_age_zero() {
        let cookie = clear_session_cookie(false);
        assert!(cookie.contains("Max-Age=0"));
        assert!(!cookie.contains("Secure"));
    }
}
