//! Session endpoints for cookie and bearer auth.

use axum::{
    extract::Extension,
    http::{
        header::{InvalidHeaderValue, AUTHORIZATION, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Json},
};
use chrono::Utc;
use tracing::error;

use super::types::{SessionResponse, UserResponse};
use crate::auth::error::AuthError;
use crate::auth::session::SessionStore;
use crate::auth::state::{AuthConfig, AuthState};

pub(crate) const SESSION_COOKIE_NAME: &str = "tutoria_session";

#[utoipa::path(
    get,
    path = "/v1/auth/session",
    responses(
        (status = 200, description = "Session is active", body = SessionResponse),
        (status = 204, description = "No active session")
    ),
    tag = "auth"
)]
pub async fn session(headers: HeaderMap, state: Extension<AuthState>) -> impl IntoResponse {
    // Missing cookies are treated as "no session" to avoid leaking auth state.
    let Some(token) = extract_session_token(&headers) else {
        return StatusCode::NO_CONTENT.into_response();
    };

    let identity = match state.sessions.validate_session_token(&token).await {
        Ok(identity) => identity,
        Err(err @ AuthError::Internal(_)) => return err.into_response(),
        Err(_) => {
            // Expired, revoked, or deactivated: clear the cookie as well.
            let mut response_headers = HeaderMap::new();
            if let Ok(cookie) = clear_session_cookie(&state.config) {
                response_headers.insert(SET_COOKIE, cookie);
            }
            return (StatusCode::NO_CONTENT, response_headers).into_response();
        }
    };

    let roles = match state.store.roles_for_user(identity.user.id).await {
        Ok(roles) => roles.iter().map(ToString::to_string).collect(),
        Err(err) => {
            error!("Failed to load roles: {err}");
            Vec::new()
        }
    };

    let response = SessionResponse {
        user: UserResponse::from(&identity.user),
        provider: identity.session.provider.to_string(),
        roles,
        expires_at: identity.session.expires_at.to_rfc3339(),
    };

    // Sliding renewal may have moved the expiry; keep the cookie in step.
    let mut response_headers = HeaderMap::new();
    let remaining = (identity.session.expires_at - Utc::now()).num_seconds().max(0);
    if let Ok(cookie) = session_cookie(&state.config, &token, remaining) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (StatusCode::OK, response_headers, Json(response)).into_response()
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Session cleared")
    ),
    tag = "auth"
)]
pub async fn logout(headers: HeaderMap, state: Extension<AuthState>) -> impl IntoResponse {
    if let Some(token) = extract_session_token(&headers) {
        let session_id = SessionStore::hash_token(&token);
        if let Err(err) = state.sessions.invalidate_session(&session_id).await {
            error!("Failed to delete session: {err}");
        }
    }

    // Always clear the cookie, even if the session record was missing.
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_session_cookie(&state.config) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (StatusCode::NO_CONTENT, response_headers).into_response()
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout-all",
    responses(
        (status = 204, description = "All sessions for the user cleared"),
        (status = 401, description = "No valid session presented")
    ),
    tag = "auth"
)]
pub async fn logout_all(headers: HeaderMap, state: Extension<AuthState>) -> impl IntoResponse {
    let Some(token) = extract_session_token(&headers) else {
        return AuthError::InvalidSession.into_response();
    };

    let identity = match state.sessions.validate_session_token(&token).await {
        Ok(identity) => identity,
        Err(err) => return err.into_response(),
    };

    if let Err(err) = state
        .sessions
        .invalidate_all_user_sessions(identity.user.id)
        .await
    {
        return err.into_response();
    }

    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_session_cookie(&state.config) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (StatusCode::NO_CONTENT, response_headers).into_response()
}

/// Build a secure `HttpOnly` cookie for the session token.
pub(crate) fn session_cookie(
    config: &AuthConfig,
    token: &str,
    max_age_seconds: i64,
) -> Result<HeaderValue, InvalidHeaderValue> {
    // Only mark cookies secure when the frontend is served over HTTPS.
    let secure = config.secure_cookies();
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_seconds}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(crate) fn clear_session_cookie(
    config: &AuthConfig,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let secure = config.secure_cookies();
    let mut cookie = format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(crate) fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = extract_bearer_token(headers) {
        return Some(token);
    }
    let header = headers.get(axum::http::header::COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == SESSION_COOKIE_NAME {
            return Some(val.to_string());
        }
    }
    None
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_is_http_only_lax() {
        let config = AuthConfig::default().with_base_url("https://app.example.com");
        let cookie = session_cookie(&config, "tok", 60).unwrap();
        let value = cookie.to_str().unwrap();
        assert!(value.starts_with("tutoria_session=tok;"));
        assert!(value.contains("HttpOnly"));
        assert!(value.contains("SameSite=Lax"));
        assert!(value.contains("Max-Age=60"));
        assert!(value.contains("Secure"));
    }

    #[test]
    fn cookie_omits_secure_over_http() {
        let config = AuthConfig::default().with_base_url("http://localhost:8080");
        let cookie = session_cookie(&config, "tok", 60).unwrap();
        assert!(!cookie.to_str().unwrap().contains("Secure"));
    }

    #[test]
    fn clear_cookie_zeroes_max_age() {
        let config = AuthConfig::default();
        let cookie = clear_session_cookie(&config).unwrap();
        let value = cookie.to_str().unwrap();
        assert!(value.starts_with("tutoria_session=;"));
        assert!(value.contains("Max-Age=0"));
    }

    #[test]
    fn token_extraction_prefers_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("tutoria_session=from-cookie"),
        );
        assert_eq!(extract_session_token(&headers), Some("abc".to_string()));
    }

    #[test]
    fn token_extraction_reads_the_named_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("other=x; tutoria_session=tok; theme=dark"),
        );
        assert_eq!(extract_session_token(&headers), Some("tok".to_string()));
    }

    #[test]
    fn token_extraction_empty_when_absent() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(extract_session_token(&headers), None);
        assert_eq!(extract_session_token(&HeaderMap::new()), None);
    }
}
