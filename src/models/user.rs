//! User model synchronized from the external identity provider.

use serde::{Deserialize, Serialize};

/// Role chosen at registration. Fixed for the lifetime of the account.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Player,
    Organizer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Player => "player",
            Role::Organizer => "organizer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "player" => Some(Role::Player),
            "organizer" => Some(Role::Organizer),
            _ => None,
        }
    }
}

/// A locally stored account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    /// Subject id issued by the identity provider
    pub clerk_id: String,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub created_at: String,
}

/// Request body for `POST /api/auth/register`.
///
/// `role` stays a raw string so a missing or unknown role is reported as a
/// field validation error instead of a body rejection.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Fields needed to insert a new user row.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub clerk_id: String,
    pub email: String,
    pub full_name: String,
    pub role: Role,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("player"), Some(Role::Player));
        assert_eq!(Role::parse("organizer"), Some(Role::Organizer));
        assert_eq!(Role::parse("Organizer"), None);
        assert_eq!(Role::parse(""), None);
    }

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::Organizer).unwrap(), "\"organizer\"");
    }
}
