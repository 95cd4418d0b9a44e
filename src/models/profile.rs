//! Player profile model.

use serde::{Deserialize, Serialize};

/// Self-assessed skill level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SkillLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl SkillLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkillLevel::Beginner => "beginner",
            SkillLevel::Intermediate => "intermediate",
            SkillLevel::Advanced => "advanced",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "beginner" => Some(SkillLevel::Beginner),
            "intermediate" => Some(SkillLevel::Intermediate),
            "advanced" => Some(SkillLevel::Advanced),
            _ => None,
        }
    }
}

/// Extended information a player keeps about themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerProfile {
    pub user_id: String,
    pub city: String,
    pub main_sport: String,
    pub level: SkillLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_position: Option<String>,
    pub updated_at: String,
}

/// Request body for creating or replacing a player profile.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerProfileRequest {
    pub city: String,
    pub main_sport: String,
    pub level: SkillLevel,
    #[serde(default)]
    pub preferred_position: Option<String>,
}
