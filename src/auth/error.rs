//! Typed error taxonomy for the auth subsystem.
//!
//! Every expected outcome callers branch on is a named variant with a stable
//! `kind()` code, so the HTTP shell (and any other caller) can dispatch
//! without string-matching messages. Unexpected failures are collapsed into
//! `Internal` before they cross the subsystem boundary.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use super::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Wrong email/password, or a provider-only account attempting password
    /// sign-in. Both cases produce this same variant on purpose.
    #[error("invalid credentials")]
    InvalidCredentials,
    /// Account exists but the email was never confirmed.
    #[error("account not confirmed")]
    NotConfirmed,
    /// Confirm attempted on an already-active account.
    #[error("account already confirmed")]
    AlreadyConfirmed,
    /// Sign-up raced or repeated with an email that is already registered.
    #[error("email already registered")]
    EmailAlreadyExists,
    /// Sign-up with an email that already carries password credentials.
    #[error("credentials already registered for this email")]
    ProviderCredentialsAlreadyExists,
    /// Confirm token references a missing or mismatched user.
    #[error("user not found")]
    UserNotFound,
    /// Session token hash has no matching row.
    #[error("invalid session")]
    InvalidSession,
    /// Session row existed but its expiry had elapsed (row is deleted).
    #[error("session expired")]
    SessionExpired,
    /// Session owner was deactivated (row is deleted).
    #[error("account is not active")]
    AccountInactive,
    /// Verification token is malformed or carries a bad signature.
    #[error("invalid verification token")]
    InvalidToken,
    /// Verification token signature is valid but the expiry elapsed.
    #[error("verification token expired")]
    TokenExpired,
    /// Anything unexpected; details stay server-side.
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    /// Stable code for callers that need to branch without matching variants.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "AUTH_INVALID_CREDENTIALS",
            Self::NotConfirmed => "USER_NOT_CONFIRMED",
            Self::AlreadyConfirmed => "USER_ALREADY_CONFIRMED",
            Self::EmailAlreadyExists => "USER_EMAIL_ALREADY_EXISTS",
            Self::ProviderCredentialsAlreadyExists => "AUTH_PROVIDER_CREDENTIALS_ALREADY_EXISTS",
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::InvalidSession => "AUTH_INVALID_SESSION",
            Self::SessionExpired => "AUTH_SESSION_EXPIRED",
            Self::AccountInactive => "USER_NOT_ACTIVE",
            Self::InvalidToken => "AUTH_INVALID_TOKEN",
            Self::TokenExpired => "AUTH_TOKEN_EXPIRED",
            Self::Internal(_) => "SERVER_INTERNAL_ERROR",
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            // The only insert paths that can collide are keyed on email, so a
            // uniqueness violation surfaces as the duplicate-registration kind.
            StoreError::Duplicate => Self::EmailAlreadyExists,
            StoreError::Other(err) => Self::Internal(err),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::InvalidCredentials
            | Self::InvalidSession
            | Self::SessionExpired
            | Self::AccountInactive => StatusCode::UNAUTHORIZED,
            Self::NotConfirmed => StatusCode::FORBIDDEN,
            Self::AlreadyConfirmed
            | Self::EmailAlreadyExists
            | Self::ProviderCredentialsAlreadyExists => StatusCode::CONFLICT,
            Self::UserNotFound => StatusCode::NOT_FOUND,
            Self::InvalidToken | Self::TokenExpired => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        // 4xx are expected outcomes the shell branches on; only internal
        // errors carry a chain worth logging here.
        if let Self::Internal(ref err) = self {
            tracing::error!(error = %err, kind = self.kind(), "internal error");
        }
        let body = serde_json::json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });
        (status, axum::Json(body)).into_response()
    }
}
