//! Wiring: configuration plus the assembled authenticators shared by the
//! HTTP handlers.

use std::sync::Arc;

use super::credentials::CredentialAuthenticator;
use super::email::{Mailer, RetryPolicy};
use super::error::AuthError;
use super::provider::ProviderAuthenticator;
use super::session::{
    SessionStore, DEFAULT_RENEWAL_WINDOW_SECONDS, DEFAULT_SESSION_TTL_SECONDS,
};
use super::store::AuthStore;
use super::token::{TokenCodec, DEFAULT_TOKEN_TTL_SECONDS};

/// Tunables for the auth core. Defaults match production behavior.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub session_ttl_seconds: i64,
    pub renewal_window_seconds: i64,
    pub verification_ttl_seconds: i64,
    pub base_url: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            renewal_window_seconds: DEFAULT_RENEWAL_WINDOW_SECONDS,
            verification_ttl_seconds: DEFAULT_TOKEN_TTL_SECONDS,
            base_url: "http://localhost:8080".to_string(),
        }
    }
}

impl AuthConfig {
    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_renewal_window_seconds(mut self, seconds: i64) -> Self {
        self.renewal_window_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_verification_ttl_seconds(mut self, seconds: i64) -> Self {
        self.verification_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Session cookies carry `Secure` only when the public base URL is HTTPS.
    #[must_use]
    pub fn secure_cookies(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

/// Shared state handed to every HTTP handler.
#[derive(Clone)]
pub struct AuthState {
    pub config: AuthConfig,
    pub store: Arc<dyn AuthStore>,
    pub sessions: SessionStore,
    pub credentials: Arc<CredentialAuthenticator>,
    pub providers: Arc<ProviderAuthenticator>,
}

impl AuthState {
    pub fn new(
        config: AuthConfig,
        store: Arc<dyn AuthStore>,
        mailer: Arc<dyn Mailer>,
        token_secret: &str,
    ) -> Result<Self, AuthError> {
        let sessions = SessionStore::new(
            store.clone(),
            config.session_ttl_seconds,
            config.renewal_window_seconds,
        );
        let codec = TokenCodec::new(token_secret, config.verification_ttl_seconds);
        let credentials = Arc::new(CredentialAuthenticator::new(
            store.clone(),
            sessions.clone(),
            codec,
            mailer,
            RetryPolicy::default(),
            config.base_url.clone(),
        )?);
        let providers = Arc::new(ProviderAuthenticator::new(store.clone(), sessions.clone()));
        Ok(Self {
            config,
            store,
            sessions,
            credentials,
            providers,
        })
    }
}
