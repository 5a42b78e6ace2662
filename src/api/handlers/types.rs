//! Request/response types for the auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::store::UserRecord;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SignUpRequestBody {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_type: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ConfirmRequestBody {
    pub token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SignInRequestBody {
    pub email: String,
    pub password: String,
}

/// Verified profile claims, produced by the upstream OAuth exchange.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ProviderRequestBody {
    pub provider_id: String,
    pub email: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UserResponse {
    pub user_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

impl From<&UserRecord> for UserResponse {
    fn from(user: &UserRecord) -> Self {
        Self {
            user_id: user.id.to_string(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
            picture: user.picture.clone(),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    #[serde(flatten)]
    pub user: UserResponse,
    pub provider: String,
    pub roles: Vec<String>,
    pub expires_at: String,
}
