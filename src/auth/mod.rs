//! Account and session lifecycle: credential and federated sign-in, email
//! confirmation, and bearer-token sessions with sliding renewal.

pub mod credentials;
pub mod email;
pub mod error;
pub mod memory;
pub mod password;
pub mod postgres;
pub mod provider;
pub mod roles;
pub mod session;
pub mod state;
pub mod store;
pub mod token;

pub use credentials::{CredentialAuthenticator, SignUpRequest, SignedIn};
pub use error::AuthError;
pub use provider::{IdentityProvider, ProviderAuthenticator, ProviderClaims};
pub use session::{IssuedSession, ResolvedIdentity, SessionStore};
pub use state::{AuthConfig, AuthState};
pub use store::{AuthStore, ProviderType};
pub use token::TokenCodec;
