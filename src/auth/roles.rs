//! Role primitives used for authorization decisions outside this core.
//!
//! Role storage itself lives behind [`AuthStore::roles_for_user`]; this
//! module only defines the closed role set and the requirement check.

use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoleType {
    Admin,
    Moderator,
}

impl RoleType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Moderator => "moderator",
        }
    }
}

impl fmt::Display for RoleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoleType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "admin" => Ok(Self::Admin),
            "moderator" => Ok(Self::Moderator),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Does the role set satisfy the requirement?
#[must_use]
pub fn role_satisfies(roles: &[RoleType], required: RoleType) -> bool {
    roles.contains(&required)
}
