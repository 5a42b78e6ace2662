//! Signed, time-limited verification tokens for email confirmation.
//!
//! Tokens are HS256 JWTs over a `{userId, email}` claim with a fixed TTL.
//! They are single-purpose: nothing in the session path accepts them.

use anyhow::anyhow;
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::error::AuthError;

/// Default verification token lifetime: 24 hours.
pub const DEFAULT_TOKEN_TTL_SECONDS: i64 = 24 * 60 * 60;

/// The claim a verified token resolves to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationClaims {
    pub user_id: i64,
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: i64,
    email: String,
    iat: i64,
    exp: i64,
}

/// Issues and verifies email-confirmation tokens with a server-held secret.
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_seconds: i64,
}

impl TokenCodec {
    #[must_use]
    pub fn new(secret: &str, ttl_seconds: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_seconds,
        }
    }

    /// Sign a `{userId, email}` claim with issued-at and expiry embedded.
    pub fn issue(&self, user_id: i64, email: &str) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id,
            email: email.to_string(),
            iat: now,
            exp: now + self.ttl_seconds,
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|err| AuthError::Internal(anyhow!("failed to sign token: {err}")))
    }

    /// Verify signature and expiry, returning the embedded claim.
    ///
    /// The signature is checked before any claim is trusted, and the expiry
    /// is re-compared against the clock here rather than relying solely on
    /// the library's validation.
    pub fn verify(&self, token: &str) -> Result<VerificationClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|err| {
            match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken,
            }
        })?;

        // Enforced, not merely attempted: the exp claim is compared against
        // the current time again even though the decoder already checked it.
        if data.claims.exp <= Utc::now().timestamp() {
            return Err(AuthError::TokenExpired);
        }

        Ok(VerificationClaims {
            user_id: data.claims.sub,
            email: data.claims.email,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> TokenCodec {
        TokenCodec::new("test-secret", DEFAULT_TOKEN_TTL_SECONDS)
    }

    #[test]
    fn issue_and_verify_round_trip() {
        let token = codec().issue(42, "a@b.com").unwrap();
        let claims = codec().verify(&token).unwrap();
        assert_eq!(
            claims,
            VerificationClaims {
                user_id: 42,
                email: "a@b.com".to_string()
            }
        );
    }

    #[test]
    fn wrong_secret_is_invalid() {
        let token = codec().issue(1, "a@b.com").unwrap();
        let other = TokenCodec::new("other-secret", DEFAULT_TOKEN_TTL_SECONDS);
        assert!(matches!(other.verify(&token), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn garbage_is_invalid() {
        assert!(matches!(
            codec().verify("not.a.jwt"),
            Err(AuthError::InvalidToken)
        ));
        assert!(matches!(codec().verify(""), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn elapsed_ttl_is_expired() {
        let expired = TokenCodec::new("test-secret", -60);
        let token = expired.issue(1, "a@b.com").unwrap();
        assert!(matches!(
            expired.verify(&token),
            Err(AuthError::TokenExpired)
        ));
    }

    #[test]
    fn tampered_payload_is_invalid() {
        let token = codec().issue(1, "a@b.com").unwrap();
        let mut parts: Vec<String> = token.split('.').map(str::to_string).collect();
        // Flip a character in the payload segment; the signature no longer matches.
        parts[1] = format!("{}A", &parts[1][..parts[1].len() - 1]);
        let tampered = parts.join(".");
        assert!(matches!(
            codec().verify(&tampered),
            Err(AuthError::InvalidToken)
        ));
    }
}
