//! Federated sign-in endpoint.
//!
//! The OAuth dance happens in the frontend/backend-for-frontend; this
//! endpoint receives the verified profile claims and opens a session.

use axum::{
    extract::{Extension, Path},
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};

use super::session::session_cookie;
use super::types::{ProviderRequestBody, UserResponse};
use super::utils::{extract_client_ip, normalize_email, user_agent, valid_email, validation_error};
use crate::auth::provider::{IdentityProvider, ProviderClaims};
use crate::auth::state::AuthState;

#[utoipa::path(
    post,
    path = "/v1/auth/providers/{provider}",
    request_body = ProviderRequestBody,
    params(
        ("provider" = String, Path, description = "Identity provider: google or discord")
    ),
    responses(
        (status = 200, description = "Signed in; session cookie set", body = UserResponse),
        (status = 400, description = "Unknown provider or invalid claims"),
        (status = 403, description = "Account not confirmed"),
        (status = 409, description = "Provider id linked to another account")
    ),
    tag = "auth"
)]
pub async fn provider_signin(
    headers: HeaderMap,
    Path(provider): Path<String>,
    state: Extension<AuthState>,
    Json(body): Json<ProviderRequestBody>,
) -> Response {
    let Ok(provider) = provider.parse::<IdentityProvider>() else {
        return validation_error("unknown identity provider");
    };

    let email = normalize_email(&body.email);
    if !valid_email(&email) {
        return validation_error("invalid email address");
    }
    if body.provider_id.trim().is_empty() {
        return validation_error("missing provider id");
    }

    let claims = ProviderClaims {
        provider_id: body.provider_id.trim().to_string(),
        email,
        name: body.name.trim().to_string(),
        picture: body.picture,
    };

    let ip = extract_client_ip(&headers).unwrap_or_default();
    let agent = user_agent(&headers);

    let signed_in = match state
        .providers
        .authenticate(provider, claims, &agent, &ip)
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
