//! Credential sign-up and email confirmation endpoints.

use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};

use super::types::{ConfirmRequestBody, MessageResponse, SignUpRequestBody};
use super::utils::{normalize_email, valid_email, valid_name, valid_password, validation_error};
use crate::auth::credentials::SignUpRequest;
use crate::auth::state::AuthState;

fn validate(body: &SignUpRequestBody) -> Result<String, Response> {
    let email = normalize_email(&body.email);
    if !valid_email(&email) {
        return Err(validation_error("invalid email address"));
    }
    if !valid_password(&body.password) {
        return Err(validation_error(
            "password must be between 8 and 30 characters",
        ));
    }
    if !valid_name(&body.first_name) || !valid_name(&body.last_name) {
        return Err(validation_error(
            "first and last name must be at least 2 characters",
        ));
    }
    Ok(email)
}

#[utoipa::path(
    post,
    path = "/v1/auth/signup",
    request_body = SignUpRequestBody,
    responses(
        (status = 201, description = "Account created, confirmation pending", body = MessageResponse),
        (status = 200, description = "Password attached to existing account", body = MessageResponse),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Email already registered")
    ),
    tag = "auth"
)]
pub async fn signup(
    state: Extension<AuthState>,
    Json(body): Json<SignUpRequestBody>,
) -> Response {
    let email = match validate(&body) {
        Ok(email) => email,
        Err(response) => return response,
    };

    let outcome = match state
        .credentials
        .sign_up(SignUpRequest {
            first_name: body.first_name.trim().to_string(),
            last_name: body.last_name.trim().to_string(),
            email,
            password: body.password,
            user_type: body.user_type,
        })
        .await
    {
        Ok(outcome) => outcome,
        Err(err) => return err.into_response(),
    };

    if outcome.requires_confirmation {
        (
            StatusCode::CREATED,
            Json(MessageResponse {
                message: "Account created. Check your email to confirm it.".to_string(),
            }),
        )
            .into_response()
    } else {
        (
            StatusCode::OK,
            Json(MessageResponse {
                message: "Password added to your account.".to_string(),
            }),
        )
            .into_response()
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/confirm",
    request_body = ConfirmRequestBody,
    responses(
        (status = 200, description = "Account confirmed", body = MessageResponse),
        (status = 400, description = "Invalid or expired token"),
        (status = 404, description = "No matching account"),
        (status = 409, description = "Account already confirmed")
    ),
    tag = "auth"
)]
pub async fn confirm(
    state: Extension<AuthState>,
    Json(body): Json<ConfirmRequestBody>,
) -> Response {
    if body.token.trim().is_empty() {
        return validation_error("missing token");
    }
    match state.credentials.confirm_email(body.token.trim()).await {
        Ok(()) => (
            StatusCode::OK,
            Json(MessageResponse {
                message: "Account confirmed.".to_string(),
            }),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}
