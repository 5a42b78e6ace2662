//! Email + password authentication: sign-up, confirmation, sign-in.

use std::sync::Arc;
use tracing::{info, warn};

use super::email::{confirmation_email, send_with_retry, Mailer, RetryPolicy};
use super::error::AuthError;
use super::password::{hash_password, verify_password};
use super::session::{IssuedSession, SessionStore};
use super::store::{AuthStore, NewUser, ProviderType, StoreError, UserPatch, UserRecord};
use super::token::TokenCodec;

/// Result of a sign-up. `requires_confirmation` is false when the request
/// attached a password to an existing provider-only account, which is
/// already a proven mailbox.
#[derive(Clone, Debug)]
pub struct SignUpOutcome {
    pub user_id: i64,
    pub requires_confirmation: bool,
}

/// Result of a successful sign-in.
#[derive(Clone, Debug)]
pub struct SignedIn {
    pub session: IssuedSession,
    pub user: UserRecord,
}

/// Fields accepted from a sign-up request, already validated at the edge.
#[derive(Clone, Debug)]
pub struct SignUpRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub user_type: Option<String>,
}

pub struct CredentialAuthenticator {
    store: Arc<dyn AuthStore>,
    sessions: SessionStore,
    codec: TokenCodec,
    mailer: Arc<dyn Mailer>,
    retry: RetryPolicy,
    base_url: String,
    // Verified against when no account or no password exists, so the
    // sign-in path costs the same whether or not the email is known.
    dummy_hash: String,
}

impl CredentialAuthenticator {
    pub fn new(
        store: Arc<dyn AuthStore>,
        sessions: SessionStore,
        codec: TokenCodec,
        mailer: Arc<dyn Mailer>,
        retry: RetryPolicy,
        base_url: String,
    ) -> Result<Self, AuthError> {
        let dummy_hash = hash_password("timing-equalizer")?;
        Ok(Self {
            store,
            sessions,
            codec,
            mailer,
            retry,
            base_url,
            dummy_hash,
        })
    }

    /// Register a new account, or attach a password to a provider-only one.
    ///
    /// New accounts start inactive and get a confirmation email. An existing
    /// account that already has a password is a conflict. Delivery failure
    /// of the confirmation email does not fail the sign-up; the user can
    /// request a fresh token later.
    pub async fn sign_up(&self, request: SignUpRequest) -> Result<SignUpOutcome, AuthError> {
        if let Some(existing) = self.store.find_user_by_email(&request.email).await? {
            if existing.password_hash.is_some() {
                return Err(AuthError::ProviderCredentialsAlreadyExists);
            }
            // Provider-only account: the mailbox is already proven, so the
            // password attaches without another confirmation round.
            let patch = UserPatch {
                password_hash: Some(hash_password(&request.password)?),
                is_active: Some(true),
                ..UserPatch::default()
            };
            self.store.update_user(existing.id, patch).await?;
            info!(user_id = existing.id, "attached password to provider account");
            return Ok(SignUpOutcome {
                user_id: existing.id,
                requires_confirmation: false,
            });
        }

        let user = self
            .store
            .insert_user(NewUser {
                first_name: request.first_name,
                last_name: request.last_name,
                email: request.email.clone(),
                password_hash: Some(hash_password(&request.password)?),
                user_type: request.user_type,
                is_active: false,
                ..NewUser::default()
            })
            .await
            .map_err(|err| match err {
                StoreError::Duplicate => AuthError::EmailAlreadyExists,
                other => other.into(),
            })?;

        let token = self.codec.issue(user.id, &user.email)?;
        let message = confirmation_email(&self.base_url, &user.email, &token);
        if let Err(err) = send_with_retry(self.mailer.as_ref(), &message, self.retry).await {
            warn!(user_id = user.id, error = %err, "confirmation email not delivered");
        }

        info!(user_id = user.id, "user signed up, confirmation pending");
        Ok(SignUpOutcome {
            user_id: user.id,
            requires_confirmation: true,
        })
    }

    /// Activate the account a confirmation token was issued for.
    ///
    /// The token's email must still match the account's email; a stale token
    /// issued before an email change does not confirm anything.
    pub async fn confirm_email(&self, token: &str) -> Result<(), AuthError> {
        let claims = self.codec.verify(token)?;

        let Some(user) = self.store.find_user_by_id(claims.user_id).await? else {
            return Err(AuthError::UserNotFound);
        };
        if user.email != claims.email {
            return Err(AuthError::UserNotFound);
        }
        if user.is_active {
            return Err(AuthError::AlreadyConfirmed);
        }

        self.store
            .update_user(
                user.id,
                UserPatch {
                    is_active: Some(true),
                    ..UserPatch::default()
                },
            )
            .await?;
        info!(user_id = user.id, "account confirmed");
        Ok(())
    }

    /// Authenticate with email and password, opening a session on success.
    ///
    /// Unknown email, provider-only account, and wrong password all take the
    /// same verification path and return the same error.
    pub async fn sign_in(
        &self,
        email: &str,
        password: &str,
        user_agent: &str,
        ip_address: &str,
    ) -> Result<SignedIn, AuthError> {
        let user = self.store.find_user_by_email(email).await?;

        let (hash, user) = match user {
            Some(user) => match user.password_hash.clone() {
                Some(hash) => (hash, Some(user)),
                None => (self.dummy_hash.clone(), None),
            },
            None => (self.dummy_hash.clone(), None),
        };

        let password_matches = verify_password(password, &hash)?;

        let Some(user) = user else {
            return Err(AuthError::InvalidCredentials);
        };
        if !password_matches {
            return Err(AuthError::InvalidCredentials);
        }
        if !user.is_active {
            return Err(AuthError::NotConfirmed);
        }

        let session = self
            .sessions
            .open_session(user.id, user_agent, ip_address, ProviderType::Credentials)
            .await?;
        info!(user_id = user.id, "credentials sign-in");
        Ok(SignedIn { session, user })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::email::{EmailMessage, EmailReceipt, MailError};
    use crate::auth::memory::MemoryStore;
    use crate::auth::session::{DEFAULT_RENEWAL_WINDOW_SECONDS, DEFAULT_SESSION_TTL_SECONDS};
    use crate::auth::token::DEFAULT_TOKEN_TTL_SECONDS;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::Mutex;

    struct RecordingMailer {
        sent: Mutex<Vec<EmailMessage>>,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, message: &EmailMessage) -> Result<EmailReceipt, MailError> {
            self.sent.lock().await.push(message.clone());
            Ok(EmailReceipt::default())
        }
    }

    struct FailingMailer;

    #[async_trait]
    impl Mailer for FailingMailer {
        async fn send(&self, _message: &EmailMessage) -> Result<EmailReceipt, MailError> {
            Err(MailError::Permanent("535 auth failed".to_string()))
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        mailer: Arc<RecordingMailer>,
        auth: CredentialAuthenticator,
    }

    fn fixture_with(mailer: Arc<dyn Mailer>, store: Arc<MemoryStore>) -> CredentialAuthenticator {
        let sessions = SessionStore::new(
            store.clone(),
            DEFAULT_SESSION_TTL_SECONDS,
            DEFAULT_RENEWAL_WINDOW_SECONDS,
        );
        CredentialAuthenticator::new(
            store,
            sessions,
            TokenCodec::new("test-secret", DEFAULT_TOKEN_TTL_SECONDS),
            mailer,
            RetryPolicy {
                max_attempts: 2,
                base_delay: Duration::from_millis(1),
            },
            "https://app.example.com".to_string(),
        )
        .unwrap()
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(RecordingMailer {
            sent: Mutex::new(Vec::new()),
        });
        let auth = fixture_with(mailer.clone(), store.clone());
        Fixture {
            store,
            mailer,
            auth,
        }
    }

    fn request(email: &str) -> SignUpRequest {
        SignUpRequest {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: email.to_string(),
            password: "longenough1".to_string(),
            user_type: Some("student".to_string()),
        }
    }

    #[tokio::test]
    async fn sign_up_creates_inactive_user_and_sends_confirmation() {
        let fx = fixture();
        let outcome = fx.auth.sign_up(request("ada@example.com")).await.unwrap();
        assert!(outcome.requires_confirmation);

        let user = fx
            .store
            .find_user_by_email("ada@example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(!user.is_active);
        assert!(user.password_hash.is_some());

        let sent = fx.mailer.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "ada@example.com");
        assert!(sent[0].text.contains("/auth/confirm/"));
    }

    #[tokio::test]
    async fn sign_up_twice_is_a_conflict() {
        let fx = fixture();
        fx.auth.sign_up(request("ada@example.com")).await.unwrap();
        let err = fx.auth.sign_up(request("ada@example.com")).await.unwrap_err();
        assert!(matches!(err, AuthError::ProviderCredentialsAlreadyExists));
    }

    #[tokio::test]
    async fn sign_up_attaches_password_to_provider_only_account() {
        let fx = fixture();
        fx.store
            .insert_user(NewUser {
                first_name: "Ada".to_string(),
                last_name: "Lovelace".to_string(),
                email: "ada@example.com".to_string(),
                is_active: true,
                google_id: Some("g-1".to_string()),
                ..NewUser::default()
            })
            .await
            .unwrap();

        let outcome = fx.auth.sign_up(request("ada@example.com")).await.unwrap();
        assert!(!outcome.requires_confirmation);

        let user = fx
            .store
            .find_user_by_email("ada@example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(user.is_active);
        assert!(user.password_hash.is_some());
        assert_eq!(user.google_id.as_deref(), Some("g-1"));
        assert!(fx.mailer.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn mail_failure_does_not_fail_sign_up() {
        let store = Arc::new(MemoryStore::new());
        let auth = fixture_with(Arc::new(FailingMailer), store.clone());
        let outcome = auth.sign_up(request("ada@example.com")).await.unwrap();
        assert!(outcome.requires_confirmation);
        assert_eq!(store.user_count().await, 1);
    }

    #[tokio::test]
    async fn confirm_activates_exactly_once() {
        let fx = fixture();
        fx.auth.sign_up(request("ada@example.com")).await.unwrap();
        let token = {
            let sent = fx.mailer.sent.lock().await;
            let text = &sent[0].text;
            let start = text.find("/auth/confirm/").unwrap() + "/auth/confirm/".len();
            text[start..].to_string()
        };

        fx.auth.confirm_email(&token).await.unwrap();
        let user = fx
            .store
            .find_user_by_email("ada@example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(user.is_active);

        let err = fx.auth.confirm_email(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::AlreadyConfirmed));
    }

    #[tokio::test]
    async fn confirm_rejects_mismatched_and_missing_users() {
        let fx = fixture();
        let codec = TokenCodec::new("test-secret", DEFAULT_TOKEN_TTL_SECONDS);

        // No such user.
        let token = codec.issue(999, "ghost@example.com").unwrap();
        assert!(matches!(
            fx.auth.confirm_email(&token).await,
            Err(AuthError::UserNotFound)
        ));

        // User exists but the token carries a different email.
        let outcome = fx.auth.sign_up(request("ada@example.com")).await.unwrap();
        let stale = codec.issue(outcome.user_id, "old@example.com").unwrap();
        assert!(matches!(
            fx.auth.confirm_email(&stale).await,
            Err(AuthError::UserNotFound)
        ));

        // Bad signature.
        let forged = TokenCodec::new("other-secret", DEFAULT_TOKEN_TTL_SECONDS)
            .issue(outcome.user_id, "ada@example.com")
            .unwrap();
        assert!(matches!(
            fx.auth.confirm_email(&forged).await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn sign_in_happy_path() {
        let fx = fixture();
        let outcome = fx.auth.sign_up(request("ada@example.com")).await.unwrap();
        fx.store
            .update_user(
                outcome.user_id,
                UserPatch {
                    is_active: Some(true),
                    ..UserPatch::default()
                },
            )
            .await
            .unwrap();

        let signed_in = fx
            .auth
            .sign_in("ada@example.com", "longenough1", "ua", "127.0.0.1")
            .await
            .unwrap();
        assert_eq!(signed_in.user.id, outcome.user_id);
        assert_eq!(fx.store.session_count().await, 1);
    }

    #[tokio::test]
    async fn sign_in_failures_are_uniform() {
        let fx = fixture();
        let outcome = fx.auth.sign_up(request("ada@example.com")).await.unwrap();
        fx.store
            .update_user(
                outcome.user_id,
                UserPatch {
                    is_active: Some(true),
                    ..UserPatch::default()
                },
            )
            .await
            .unwrap();
        fx.store
            .insert_user(NewUser {
                first_name: "Provider".to_string(),
                last_name: "Only".to_string(),
                email: "provider@example.com".to_string(),
                is_active: true,
                google_id: Some("g-1".to_string()),
                ..NewUser::default()
            })
            .await
            .unwrap();

        // Unknown email, wrong password, and provider-only account all
        // produce the same error.
        for (email, password) in [
            ("ghost@example.com", "longenough1"),
            ("ada@example.com", "wrong-password"),
            ("provider@example.com", "longenough1"),
        ] {
            let err = fx.auth.sign_in(email, password, "ua", "ip").await.unwrap_err();
            assert!(matches!(err, AuthError::InvalidCredentials), "{email}");
        }
        assert_eq!(fx.store.session_count().await, 0);
    }

    #[tokio::test]
    async fn sign_in_before_confirmation_is_rejected() {
        let fx = fixture();
        fx.auth.sign_up(request("ada@example.com")).await.unwrap();
        let err = fx
            .auth
            .sign_in("ada@example.com", "longenough1", "ua", "ip")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::NotConfirmed));
    }
}
