//! Session lifecycle keyed by a one-way hash of the bearer token.
//!
//! The raw token only ever exists in the browser cookie and in transit; the
//! store sees the SHA-256 of it, so a database compromise does not leak
//! usable tokens. Sessions carry a 30-day absolute expiry with a 15-day
//! sliding-renewal window.

use anyhow::Context;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use super::error::AuthError;
use super::store::{AuthStore, ProviderType, SessionRecord, UserRecord};

/// Absolute session lifetime: 30 days.
pub const DEFAULT_SESSION_TTL_SECONDS: i64 = 30 * 24 * 60 * 60;
/// Sessions used within this window of their expiry are renewed: 15 days.
pub const DEFAULT_RENEWAL_WINDOW_SECONDS: i64 = 15 * 24 * 60 * 60;

/// Successful validation: the session row plus its owning user.
#[derive(Clone, Debug)]
pub struct ResolvedIdentity {
    pub session: SessionRecord,
    pub user: UserRecord,
}

/// Raw token and expiry handed back to the caller for cookie placement.
#[derive(Clone, Debug)]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn AuthStore>,
    ttl_seconds: i64,
    renewal_window_seconds: i64,
}

impl SessionStore {
    #[must_use]
    pub fn new(store: Arc<dyn AuthStore>, ttl_seconds: i64, renewal_window_seconds: i64) -> Self {
        Self {
            store,
            ttl_seconds,
            renewal_window_seconds,
        }
    }

    /// Generate a new bearer token: 32 random bytes, URL-safe base64.
    ///
    /// The raw value is only returned to set the cookie; the store keeps a hash.
    pub fn generate_token() -> Result<String, AuthError> {
        let mut bytes = [0u8; 32];
        OsRng
            .try_fill_bytes(&mut bytes)
            .context("failed to generate session token")?;
        Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
    }

    /// One-way hash used as the session id. Deterministic, not reversible.
    #[must_use]
    pub fn hash_token(token: &str) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        hasher.finalize().to_vec()
    }

    /// Persist a session for an already-generated raw token.
    pub async fn create_session(
        &self,
        raw_token: &str,
        user_id: i64,
        user_agent: &str,
        ip_address: &str,
        provider: ProviderType,
    ) -> Result<SessionRecord, AuthError> {
        let session = SessionRecord {
            id: Self::hash_token(raw_token),
            user_id,
            expires_at: Utc::now() + Duration::seconds(self.ttl_seconds),
            user_agent: user_agent.to_string(),
            ip_address: ip_address.to_string(),
            provider,
        };
        self.store.insert_session(session.clone()).await?;
        Ok(session)
    }

    /// Generate a token and open a session for it in one step.
    pub async fn open_session(
        &self,
        user_id: i64,
        user_agent: &str,
        ip_address: &str,
        provider: ProviderType,
    ) -> Result<IssuedSession, AuthError> {
        let token = Self::generate_token()?;
        let session = self
            .create_session(&token, user_id, user_agent, ip_address, provider)
            .await?;
        Ok(IssuedSession {
            token,
            expires_at: session.expires_at,
        })
    }

    /// Resolve a presented bearer token to its identity.
    ///
    /// Expired sessions and sessions owned by deactivated users are deleted
    /// before the error is returned, so a retry cannot observe a half-revoked
    /// state. Valid sessions within the renewal window get their expiry reset
    /// to a full TTL from now; repeating the call repeats the reset, which is
    /// idempotent.
    pub async fn validate_session_token(
        &self,
        raw_token: &str,
    ) -> Result<ResolvedIdentity, AuthError> {
        let session_id = Self::hash_token(raw_token);

        let Some((mut session, user)) = self.store.find_session(&session_id).await? else {
            return Err(AuthError::InvalidSession);
        };

        let now = Utc::now();
        if session.expires_at <= now {
            self.store.delete_session(&session_id).await?;
            return Err(AuthError::SessionExpired);
        }

        if !user.is_active {
            self.store.delete_session(&session_id).await?;
            return Err(AuthError::AccountInactive);
        }

        if session.expires_at - now < Duration::seconds(self.renewal_window_seconds) {
            let expires_at = now + Duration::seconds(self.ttl_seconds);
            self.store
                .update_session_expiry(&session_id, expires_at)
                .await?;
            session.expires_at = expires_at;
        }

        Ok(ResolvedIdentity { session, user })
    }

    /// Revoke one session. Missing ids are treated as already revoked.
    pub async fn invalidate_session(&self, session_id: &[u8]) -> Result<(), AuthError> {
        self.store.delete_session(session_id).await?;
        Ok(())
    }

    /// Revoke every session for a user ("log out everywhere").
    pub async fn invalidate_all_user_sessions(&self, user_id: i64) -> Result<u64, AuthError> {
        Ok(self.store.delete_sessions_by_user(user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::memory::MemoryStore;
    use crate::auth::store::NewUser;

    fn new_store() -> (Arc<MemoryStore>, SessionStore) {
        let store = Arc::new(MemoryStore::new());
        let sessions = SessionStore::new(
            store.clone(),
            DEFAULT_SESSION_TTL_SECONDS,
            DEFAULT_RENEWAL_WINDOW_SECONDS,
        );
        (store, sessions)
    }

    async fn seed_user(store: &MemoryStore, is_active: bool) -> i64 {
        store
            .insert_user(NewUser {
                first_name: "Ada".to_string(),
                last_name: "Lovelace".to_string(),
                email: "ada@example.com".to_string(),
                password_hash: Some("$argon2id$fake".to_string()),
                is_active,
                ..NewUser::default()
            })
            .await
            .unwrap()
            .id
    }

    #[test]
    fn tokens_are_unique_and_high_entropy() {
        let first = SessionStore::generate_token().unwrap();
        let second = SessionStore::generate_token().unwrap();
        assert_ne!(first, second);
        let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(first.as_bytes())
            .unwrap();
        assert_eq!(decoded.len(), 32);
    }

    #[test]
    fn hash_is_deterministic_and_distinct() {
        assert_eq!(SessionStore::hash_token("t"), SessionStore::hash_token("t"));
        assert_ne!(
            SessionStore::hash_token("t"),
            SessionStore::hash_token("u")
        );
        assert_eq!(SessionStore::hash_token("t").len(), 32);
    }

    #[tokio::test]
    async fn create_then_validate_round_trip() {
        let (store, sessions) = new_store();
        let user_id = seed_user(&store, true).await;

        let issued = sessions
            .open_session(user_id, "test-agent", "127.0.0.1", ProviderType::Credentials)
            .await
            .unwrap();

        let identity = sessions.validate_session_token(&issued.token).await.unwrap();
        assert_eq!(identity.user.id, user_id);
        assert_eq!(identity.session.user_agent, "test-agent");
        assert_eq!(identity.session.expires_at, issued.expires_at);
    }

    #[tokio::test]
    async fn unknown_token_is_invalid_session() {
        let (_store, sessions) = new_store();
        let err = sessions
            .validate_session_token("never-issued")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidSession));
    }

    #[tokio::test]
    async fn expired_session_is_deleted_then_reported() {
        let (store, sessions) = new_store();
        let user_id = seed_user(&store, true).await;
        let token = SessionStore::generate_token().unwrap();
        let id = SessionStore::hash_token(&token);
        store
            .insert_session(SessionRecord {
                id: id.clone(),
                user_id,
                expires_at: Utc::now() - Duration::seconds(1),
                user_agent: String::new(),
                ip_address: String::new(),
                provider: ProviderType::Credentials,
            })
            .await
            .unwrap();

        let err = sessions.validate_session_token(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::SessionExpired));
        assert!(store.find_session(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn inactive_user_is_deleted_then_reported() {
        let (store, sessions) = new_store();
        let user_id = seed_user(&store, false).await;
        let token = SessionStore::generate_token().unwrap();
        let id = SessionStore::hash_token(&token);
        store
            .insert_session(SessionRecord {
                id: id.clone(),
                user_id,
                expires_at: Utc::now() + Duration::days(30),
                user_agent: String::new(),
                ip_address: String::new(),
                provider: ProviderType::Credentials,
            })
            .await
            .unwrap();

        let err = sessions.validate_session_token(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::AccountInactive));
        assert!(store.find_session(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn renewal_only_inside_the_window() {
        let (store, sessions) = new_store();
        let user_id = seed_user(&store, true).await;

        // 16 days out: outside the 15-day window, expiry untouched.
        let token = SessionStore::generate_token().unwrap();
        let far_expiry = Utc::now() + Duration::days(16);
        store
            .insert_session(SessionRecord {
                id: SessionStore::hash_token(&token),
                user_id,
                expires_at: far_expiry,
                user_agent: String::new(),
                ip_address: String::new(),
                provider: ProviderType::Credentials,
            })
            .await
            .unwrap();
        let identity = sessions.validate_session_token(&token).await.unwrap();
        assert_eq!(identity.session.expires_at, far_expiry);

        // 14 days out: inside the window, expiry jumps to a full TTL.
        let token = SessionStore::generate_token().unwrap();
        store
            .insert_session(SessionRecord {
                id: SessionStore::hash_token(&token),
                user_id,
                expires_at: Utc::now() + Duration::days(14),
                user_agent: String::new(),
                ip_address: String::new(),
                provider: ProviderType::Credentials,
            })
            .await
            .unwrap();
        let before = Utc::now();
        let identity = sessions.validate_session_token(&token).await.unwrap();
        let expected = before + Duration::seconds(DEFAULT_SESSION_TTL_SECONDS);
        let drift = (identity.session.expires_at - expected).num_seconds().abs();
        assert!(drift <= 5, "renewed expiry should be ~now+30d, drift {drift}s");
    }

    #[tokio::test]
    async fn renewal_is_idempotent() {
        let (store, sessions) = new_store();
        let user_id = seed_user(&store, true).await;
        let token = SessionStore::generate_token().unwrap();
        store
            .insert_session(SessionRecord {
                id: SessionStore::hash_token(&token),
                user_id,
                expires_at: Utc::now() + Duration::days(10),
                user_agent: String::new(),
                ip_address: String::new(),
                provider: ProviderType::Credentials,
            })
            .await
            .unwrap();

        let first = sessions.validate_session_token(&token).await.unwrap();
        let second = sessions.validate_session_token(&token).await.unwrap();

        // Both resets land on ~now+30d; renewal never compounds past one TTL.
        let ttl = Duration::seconds(DEFAULT_SESSION_TTL_SECONDS);
        let max = Utc::now() + ttl + Duration::seconds(5);
        assert!(first.session.expires_at <= max);
        assert!(second.session.expires_at <= max);
        assert!(second.session.expires_at >= first.session.expires_at);
    }

    #[tokio::test]
    async fn invalidate_is_idempotent_and_scoped() {
        let (store, sessions) = new_store();
        let user_id = seed_user(&store, true).await;

        let first = sessions
            .open_session(user_id, "ua", "ip", ProviderType::Credentials)
            .await
            .unwrap();
        let second = sessions
            .open_session(user_id, "ua", "ip", ProviderType::Credentials)
            .await
            .unwrap();

        // Deleting a never-issued id is not an error.
        sessions.invalidate_session(b"missing").await.unwrap();

        sessions
            .invalidate_session(&SessionStore::hash_token(&first.token))
            .await
            .unwrap();
        assert!(matches!(
            sessions.validate_session_token(&first.token).await,
            Err(AuthError::InvalidSession)
        ));
        assert!(sessions.validate_session_token(&second.token).await.is_ok());

        let removed = sessions.invalidate_all_user_sessions(user_id).await.unwrap();
        assert_eq!(removed, 1);
        assert!(matches!(
            sessions.validate_session_token(&second.token).await,
            Err(AuthError::InvalidSession)
        ));
    }
}
