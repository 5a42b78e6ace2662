//! In-memory [`AuthStore`] backend.
//!
//! Used by the test suites and by local development without Postgres. The
//! same uniqueness invariants the SQL schema enforces are enforced here so
//! the duplicate-translation paths behave identically against both backends.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::provider::IdentityProvider;
use super::roles::RoleType;
use super::store::{
    AuthStore, NewUser, SessionRecord, StoreError, UserPatch, UserRecord,
};

#[derive(Default)]
struct Inner {
    users: HashMap<i64, UserRecord>,
    sessions: HashMap<Vec<u8>, SessionRecord>,
    roles: HashMap<i64, Vec<RoleType>>,
    next_user_id: i64,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant a role directly, for test setup.
    pub async fn grant_role(&self, user_id: i64, role: RoleType) {
        let mut inner = self.inner.lock().await;
        inner.roles.entry(user_id).or_default().push(role);
    }

    pub async fn user_count(&self) -> usize {
        self.inner.lock().await.users.len()
    }

    pub async fn session_count(&self) -> usize {
        self.inner.lock().await.sessions.len()
    }
}

fn provider_id_taken(inner: &Inner, provider: IdentityProvider, id: &str, except: Option<i64>) -> bool {
    inner
        .users
        .values()
        .any(|user| Some(user.id) != except && user.provider_id(provider) == Some(id))
}

fn email_taken(inner: &Inner, email: &str, except: Option<i64>) -> bool {
    inner
        .users
        .values()
        .any(|user| Some(user.id) != except && user.email == email)
}

#[async_trait]
impl AuthStore for MemoryStore {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.users.values().find(|user| user.email == email).cloned())
    }

    async fn find_user_by_id(&self, id: i64) -> Result<Option<UserRecord>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.users.get(&id).cloned())
    }

    async fn find_user_by_provider(
        &self,
        provider: IdentityProvider,
        provider_id: &str,
    ) -> Result<Option<UserRecord>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .users
            .values()
            .find(|user| user.provider_id(provider) == Some(provider_id))
            .cloned())
    }

    async fn insert_user(&self, user: NewUser) -> Result<UserRecord, StoreError> {
        let mut inner = self.inner.lock().await;

        if email_taken(&inner, &user.email, None) {
            return Err(StoreError::Duplicate);
        }
        for provider in [IdentityProvider::Google, IdentityProvider::Discord] {
            let id = match provider {
                IdentityProvider::Google => user.google_id.as_deref(),
                IdentityProvider::Discord => user.discord_id.as_deref(),
            };
            if let Some(id) = id {
                if provider_id_taken(&inner, provider, id, None) {
                    return Err(StoreError::Duplicate);
                }
            }
        }

        inner.next_user_id += 1;
        let record = UserRecord {
            id: inner.next_user_id,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            password_hash: user.password_hash,
            user_type: user.user_type,
            is_active: user.is_active,
            google_id: user.google_id,
            discord_id: user.discord_id,
            picture: user.picture,
        };
        inner.users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_user(&self, id: i64, patch: UserPatch) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;

        if let Some(google_id) = patch.google_id.as_deref() {
            if provider_id_taken(&inner, IdentityProvider::Google, google_id, Some(id)) {
                return Err(StoreError::Duplicate);
            }
        }
        if let Some(discord_id) = patch.discord_id.as_deref() {
            if provider_id_taken(&inner, IdentityProvider::Discord, discord_id, Some(id)) {
                return Err(StoreError::Duplicate);
            }
        }

        let Some(user) = inner.users.get_mut(&id) else {
            return Err(StoreError::Other(anyhow::anyhow!("no such user: {id}")));
        };
        if let Some(first_name) = patch.first_name {
            user.first_name = first_name;
        }
        if let Some(last_name) = patch.last_name {
            user.last_name = last_name;
        }
        if let Some(password_hash) = patch.password_hash {
            user.password_hash = Some(password_hash);
        }
        if let Some(is_active) = patch.is_active {
            user.is_active = is_active;
        }
        if let Some(google_id) = patch.google_id {
            user.google_id = Some(google_id);
        }
        if let Some(discord_id) = patch.discord_id {
            user.discord_id = Some(discord_id);
        }
        if let Some(picture) = patch.picture {
            user.picture = Some(picture);
        }
        Ok(())
    }

    async fn insert_session(&self, session: SessionRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.sessions.contains_key(&session.id) {
            return Err(StoreError::Duplicate);
        }
        inner.sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn find_session(
        &self,
        session_id: &[u8],
    ) -> Result<Option<(SessionRecord, UserRecord)>, StoreError> {
        let inner = self.inner.lock().await;
        let Some(session) = inner.sessions.get(session_id) else {
            return Ok(None);
        };
        let Some(user) = inner.users.get(&session.user_id) else {
            return Ok(None);
        };
        Ok(Some((session.clone(), user.clone())))
    }

    async fn update_session_expiry(
        &self,
        session_id: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(session) = inner.sessions.get_mut(session_id) {
            session.expires_at = expires_at;
        }
        Ok(())
    }

    async fn delete_session(&self, session_id: &[u8]) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.sessions.remove(session_id);
        Ok(())
    }

    async fn delete_sessions_by_user(&self, user_id: i64) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().await;
        let before = inner.sessions.len();
        inner.sessions.retain(|_, session| session.user_id != user_id);
        Ok((before - inner.sessions.len()) as u64)
    }

    async fn roles_for_user(&self, user_id: i64) -> Result<Vec<RoleType>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.roles.get(&user_id).cloned().unwrap_or_default())
    }
}
