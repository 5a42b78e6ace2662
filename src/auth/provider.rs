//! Federated sign-in against a closed set of identity providers.
//!
//! OAuth token exchange happens upstream; this module receives the already
//! verified profile claims and resolves them to a local account, linking or
//! creating one as needed.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use super::error::AuthError;
use super::session::SessionStore;
use super::store::{AuthStore, NewUser, StoreError, UserPatch, UserRecord};

pub use super::credentials::SignedIn;

/// Supported federated providers. Adding one is a source change, never a
/// runtime registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdentityProvider {
    Google,
    Discord,
}

impl IdentityProvider {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Discord => "discord",
        }
    }
}

impl fmt::Display for IdentityProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdentityProvider {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "google" => Ok(Self::Google),
            "discord" => Ok(Self::Discord),
            other => Err(format!("unknown identity provider: {other}")),
        }
    }
}

/// Verified profile claims handed over after the upstream token exchange.
#[derive(Clone, Debug)]
pub struct ProviderClaims {
    pub provider_id: String,
    pub email: String,
    pub name: String,
    pub picture: Option<String>,
}

/// Split a provider display name at the first space.
///
/// "Ada Lovelace King" becomes ("Ada", "Lovelace King"); a single word keeps
/// the last name empty.
#[must_use]
pub fn split_display_name(name: &str) -> (String, String) {
    match name.split_once(' ') {
        Some((first, last)) => (first.to_string(), last.to_string()),
        None => (name.to_string(), String::new()),
    }
}

pub struct ProviderAuthenticator {
    store: Arc<dyn AuthStore>,
    sessions: SessionStore,
}

impl ProviderAuthenticator {
    #[must_use]
    pub fn new(store: Arc<dyn AuthStore>, sessions: SessionStore) -> Self {
        Self { store, sessions }
    }

    /// Resolve verified provider claims to a local account and open a session.
    ///
    /// Resolution order: account already linked to this provider id, then
    /// account matching the claimed email (gets linked), then a fresh
    /// account. Fresh provider accounts are active immediately; the provider
    /// already verified the mailbox.
    pub async fn authenticate(
        &self,
        provider: IdentityProvider,
        claims: ProviderClaims,
        user_agent: &str,
        ip_address: &str,
    ) -> Result<SignedIn, AuthError> {
        let user = self.resolve_user(provider, &claims).await?;

        if !user.is_active {
            return Err(AuthError::NotConfirmed);
        }

        let session = self
            .sessions
            .open_session(user.id, user_agent, ip_address, provider.into())
            .await?;
        info!(user_id = user.id, provider = %provider, "provider sign-in");
        Ok(SignedIn { session, user })
    }

    async fn resolve_user(
        &self,
        provider: IdentityProvider,
        claims: &ProviderClaims,
    ) -> Result<UserRecord, AuthError> {
        if let Some(user) = self
            .store
            .find_user_by_provider(provider, &claims.provider_id)
            .await?
        {
            // Profile data follows the provider on every sign-in.
            let (first_name, last_name) = split_display_name(&claims.name);
            let patch = UserPatch {
                first_name: Some(first_name.clone()),
                last_name: Some(last_name.clone()),
                picture: claims.picture.clone(),
                ..UserPatch::default()
            };
            self.store.update_user(user.id, patch).await?;
            return Ok(UserRecord {
                first_name,
                last_name,
                picture: claims.picture.clone().or(user.picture.clone()),
                ..user
            });
        }

        if let Some(user) = self.store.find_user_by_email(&claims.email).await? {
            let patch = UserPatch {
                picture: claims.picture.clone(),
                ..UserPatch::default()
            }
            .with_provider_id(provider, claims.provider_id.clone());
            self.store.update_user(user.id, patch).await.map_err(|err| {
                match err {
                    StoreError::Duplicate => AuthError::ProviderCredentialsAlreadyExists,
                    other => other.into(),
                }
            })?;
            info!(user_id = user.id, provider = %provider, "linked provider to existing account");
            let mut user = user;
            user.picture = claims.picture.clone().or(user.picture);
            match provider {
                IdentityProvider::Google => user.google_id = Some(claims.provider_id.clone()),
                IdentityProvider::Discord => user.discord_id = Some(claims.provider_id.clone()),
            }
            return Ok(user);
        }

        let (first_name, last_name) = split_display_name(&claims.name);
        let mut new_user = NewUser {
            first_name,
            last_name,
            email: claims.email.clone(),
            is_active: true,
            picture: claims.picture.clone(),
            ..NewUser::default()
        };
        match provider {
            IdentityProvider::Google => new_user.google_id = Some(claims.provider_id.clone()),
            IdentityProvider::Discord => new_user.discord_id = Some(claims.provider_id.clone()),
        }

        let user = self.store.insert_user(new_user).await.map_err(|err| match err {
            StoreError::Duplicate => AuthError::EmailAlreadyExists,
            other => other.into(),
        })?;
        info!(user_id = user.id, provider = %provider, "created account from provider claims");
        Ok(user)
    }
}
