//! Credential sign-in endpoint.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};

use super::session::session_cookie;
use super::types::{SignInRequestBody, UserResponse};
use super::utils::{extract_client_ip, normalize_email, user_agent, valid_email, validation_error};
use crate::auth::state::AuthState;

#[utoipa::path(
    post,
    path = "/v1/auth/signin",
    request_body = SignInRequestBody,
    responses(
        (status = 200, description = "Signed in; session cookie set", body = UserResponse),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account not confirmed")
    ),
    tag = "auth"
)]
pub async fn signin(
    headers: HeaderMap,
    state: Extension<AuthState>,
    Json(body): Json<SignInRequestBody>,
) -> Response {
    let email = normalize_email(&body.email);
    if !valid_email(&email) {
        return validation_error("invalid email address");
    }
    if body.password.is_empty() {
        return validation_error("missing password");
    }

    let ip = extract_client_ip(&headers).unwrap_or_default();
    let agent = user_agent(&headers);

    let signed_in = match state
        .credentials
        .sign_in(&email, &body.password, &agent, &ip)
        .await
    {
        Ok(signed_in) => signed_in,
        Err(err) => return err.into_response(),
    };

    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = session_cookie(
        &state.config,
        &signed_in.session.token,
        state.config.session_ttl_seconds,
    ) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (
        StatusCode::OK,
        response_headers,
        Json(UserResponse::from(&signed_in.user)),
    )
        .into_response()
}
