//! Persistence boundary for users, sessions, and roles.
//!
//! The core never talks to a database driver directly; everything goes
//! through [`AuthStore`]. Uniqueness of `email` and of each provider-id
//! column is an invariant of the implementation behind the trait — the core
//! only translates the resulting [`StoreError::Duplicate`] into a domain
//! error, it does not try to prevent races itself.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;

use super::provider::IdentityProvider;
use super::roles::RoleType;

/// Store-level failure. `Duplicate` is the uniqueness-constraint signal the
/// core is required to catch and translate; everything else is opaque.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("duplicate entry")]
    Duplicate,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Which authentication path produced a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderType {
    Credentials,
    Google,
    Discord,
}

impl ProviderType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Credentials => "credentials",
            Self::Google => "google",
            Self::Discord => "discord",
        }
    }
}

impl From<IdentityProvider> for ProviderType {
    fn from(provider: IdentityProvider) -> Self {
        match provider {
            IdentityProvider::Google => Self::Google,
            IdentityProvider::Discord => Self::Discord,
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity record. `password_hash` is absent for provider-only accounts;
/// provider ids are one fixed field per supported provider, never a
/// runtime-computed column.
#[derive(Clone, Debug)]
pub struct UserRecord {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub user_type: Option<String>,
    pub is_active: bool,
    pub google_id: Option<String>,
    pub discord_id: Option<String>,
    pub picture: Option<String>,
}

impl UserRecord {
    /// Read the linked id for one provider.
    #[must_use]
    pub fn provider_id(&self, provider: IdentityProvider) -> Option<&str> {
        match provider {
            IdentityProvider::Google => self.google_id.as_deref(),
            IdentityProvider::Discord => self.discord_id.as_deref(),
        }
    }
}

/// Fields for creating a user. Exactly one credential path is set by each
/// caller: credential sign-up sets `password_hash`, provider sign-in sets
/// one provider id.
#[derive(Clone, Debug, Default)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub user_type: Option<String>,
    pub is_active: bool,
    pub google_id: Option<String>,
    pub discord_id: Option<String>,
    pub picture: Option<String>,
}

/// Partial update; `None` fields are left untouched.
#[derive(Clone, Debug, Default)]
pub struct UserPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password_hash: Option<String>,
    pub is_active: Option<bool>,
    pub google_id: Option<String>,
    pub discord_id: Option<String>,
    pub picture: Option<String>,
}

impl UserPatch {
    /// Stamp the id field for one provider (closed set, no dynamic columns).
    #[must_use]
    pub fn with_provider_id(mut self, provider: IdentityProvider, id: String) -> Self {
        match provider {
            IdentityProvider::Google => self.google_id = Some(id),
            IdentityProvider::Discord => self.discord_id = Some(id),
        }
        self
    }
}

/// Proof of an authenticated browser. `id` is the SHA-256 of the bearer
/// token; the raw token never reaches the store.
#[derive(Clone, Debug)]
pub struct SessionRecord {
    pub id: Vec<u8>,
    pub user_id: i64,
    pub expires_at: DateTime<Utc>,
    pub user_agent: String,
    pub ip_address: String,
    pub provider: ProviderType,
}

#[async_trait]
pub trait AuthStore: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError>;

    async fn find_user_by_id(&self, id: i64) -> Result<Option<UserRecord>, StoreError>;

    async fn find_user_by_provider(
        &self,
        provider: IdentityProvider,
        provider_id: &str,
    ) -> Result<Option<UserRecord>, StoreError>;

    async fn insert_user(&self, user: NewUser) -> Result<UserRecord, StoreError>;

    async fn update_user(&self, id: i64, patch: UserPatch) -> Result<(), StoreError>;

    async fn insert_session(&self, session: SessionRecord) -> Result<(), StoreError>;

    /// Look up a session by hashed id together with its owning user.
    async fn find_session(
        &self,
        session_id: &[u8],
    ) -> Result<Option<(SessionRecord, UserRecord)>, StoreError>;

    async fn update_session_expiry(
        &self,
        session_id: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Deleting a missing id is not an error (already revoked).
    async fn delete_session(&self, session_id: &[u8]) -> Result<(), StoreError>;

    /// Returns the number of sessions removed.
    async fn delete_sessions_by_user(&self, user_id: i64) -> Result<u64, StoreError>;

    async fn roles_for_user(&self, user_id: i64) -> Result<Vec<RoleType>, StoreError>;
}
