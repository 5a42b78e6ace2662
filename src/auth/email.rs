//! Outbound email boundary.
//!
//! The core depends on the [`Mailer`] trait only. [`SmtpMailer`] is the
//! production transport; [`LogMailer`] stands in when SMTP is not
//! configured, so local environments still complete the sign-up flow.
//! Transient transport failures are retried with exponential backoff;
//! authentication and other permanent failures are not retried.

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;
use tracing::{debug, info, warn};

/// A message ready for delivery, with both plain-text and HTML bodies.
#[derive(Clone, Debug)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// Delivery acknowledgment from the transport.
#[derive(Clone, Debug, Default)]
pub struct EmailReceipt {
    pub message_id: Option<String>,
}

/// Delivery failure, split by whether a retry can help.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("transient mail failure: {0}")]
    Transient(String),
    #[error("permanent mail failure: {0}")]
    Permanent(String),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<EmailReceipt, MailError>;
}

/// Logs instead of sending. Keeps development environments working end to
/// end without an SMTP server.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &EmailMessage) -> Result<EmailReceipt, MailError> {
        info!(to = %message.to, subject = %message.subject, "email (log only)");
        debug!(body = %message.text, "email body");
        Ok(EmailReceipt::default())
    }
}

/// SMTP transport over STARTTLS.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
        from: &str,
    ) -> Result<Self, MailError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|err| MailError::Permanent(format!("invalid smtp relay: {err}")))?
            .port(port)
            .timeout(Some(Duration::from_secs(10)));

        if let (Some(username), Some(password)) = (username, password) {
            builder = builder.credentials(Credentials::new(
                username.to_string(),
                password.to_string(),
            ));
        }

        let from = from
            .parse::<Mailbox>()
            .map_err(|err| MailError::Permanent(format!("invalid from address: {err}")))?;

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, message: &EmailMessage) -> Result<EmailReceipt, MailError> {
        let to = message
            .to
            .parse::<Mailbox>()
            .map_err(|err| MailError::Permanent(format!("invalid recipient: {err}")))?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(&message.subject)
            .multipart(MultiPart::alternative_plain_html(
                message.text.clone(),
                message.html.clone(),
            ))
            .map_err(|err| MailError::Permanent(format!("failed to build message: {err}")))?;

        let response = self.transport.send(email).await.map_err(|err| {
            if err.is_permanent() {
                MailError::Permanent(err.to_string())
            } else {
                MailError::Transient(err.to_string())
            }
        })?;

        Ok(EmailReceipt {
            message_id: Some(response.code().to_string()),
        })
    }
}

/// Retry parameters: `base_delay * 2^attempt` between attempts.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Send with retries. Permanent failures abort immediately; transient ones
/// back off exponentially until the attempt budget runs out.
pub async fn send_with_retry(
    mailer: &dyn Mailer,
    message: &EmailMessage,
    policy: RetryPolicy,
) -> Result<EmailReceipt, MailError> {
    let mut attempt = 0;
    loop {
        match mailer.send(message).await {
            Ok(receipt) => return Ok(receipt),
            Err(MailError::Permanent(reason)) => {
                warn!(to = %message.to, %reason, "permanent mail failure, not retrying");
                return Err(MailError::Permanent(reason));
            }
            Err(MailError::Transient(reason)) => {
                attempt += 1;
                if attempt >= policy.max_attempts {
                    warn!(to = %message.to, %reason, attempt, "mail retries exhausted");
                    return Err(MailError::Transient(reason));
                }
                let delay = policy.base_delay * 2u32.pow(attempt - 1);
                debug!(to = %message.to, %reason, attempt, ?delay, "transient mail failure, retrying");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Build the account-confirmation message for a freshly issued token.
#[must_use]
pub fn confirmation_email(base_url: &str, to: &str, token: &str) -> EmailMessage {
    let link = format!("{}/auth/confirm/{token}", base_url.trim_end_matches('/'));
    EmailMessage {
        to: to.to_string(),
        subject: "Confirm your account".to_string(),
        text: format!("Welcome! Confirm your account by visiting: {link}"),
        html: format!(
            "<p>Welcome!</p><p><a href=\"{link}\">Confirm your account</a></p>\
             <p>If the link does not work, copy this address into your browser: {link}</p>"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyMailer {
        calls: AtomicU32,
        fail_first: u32,
        permanent: bool,
    }

    #[async_trait]
    impl Mailer for FlakyMailer {
        async fn send(&self, _message: &EmailMessage) -> Result<EmailReceipt, MailError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                if self.permanent {
                    return Err(MailError::Permanent("535 auth failed".to_string()));
                }
                return Err(MailError::Transient("connection reset".to_string()));
            }
            Ok(EmailReceipt::default())
        }
    }

    fn message() -> EmailMessage {
        confirmation_email("https://app.example.com", "a@b.com", "tok")
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let mailer = FlakyMailer {
            calls: AtomicU32::new(0),
            fail_first: 2,
            permanent: false,
        };
        send_with_retry(&mailer, &message(), fast_policy())
            .await
            .unwrap();
        assert_eq!(mailer.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_attempt_budget() {
        let mailer = FlakyMailer {
            calls: AtomicU32::new(0),
            fail_first: u32::MAX,
            permanent: false,
        };
        let err = send_with_retry(&mailer, &message(), fast_policy())
            .await
            .unwrap_err();
        assert!(matches!(err, MailError::Transient(_)));
        assert_eq!(mailer.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried() {
        let mailer = FlakyMailer {
            calls: AtomicU32::new(0),
            fail_first: u32::MAX,
            permanent: true,
        };
        let err = send_with_retry(&mailer, &message(), fast_policy())
            .await
            .unwrap_err();
        assert!(matches!(err, MailError::Permanent(_)));
        assert_eq!(mailer.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn confirmation_link_shape() {
        let msg = confirmation_email("https://app.example.com/", "a@b.com", "abc123");
        assert!(msg.text.contains("https://app.example.com/auth/confirm/abc123"));
        assert!(msg.html.contains("https://app.example.com/auth/confirm/abc123"));
        assert_eq!(msg.to, "a@b.com");
    }
}
