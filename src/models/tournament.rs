//! Tournament model.

use serde::{Deserialize, Serialize};

/// A tournament owned by an organizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tournament {
    pub id: String,
    pub name: String,
    pub sport: String,
    pub city: String,
    /// Calendar date, `YYYY-MM-DD`
    pub start_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub organizer_id: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Compact tournament shape embedded in join request details.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TournamentSummary {
    pub id: String,
    pub name: String,
    pub sport: String,
    pub city: String,
}

/// Request body for creating a tournament.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTournamentRequest {
    pub name: String,
    pub sport: String,
    pub city: String,
    pub start_date: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Request body for updating a tournament.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTournamentRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sport: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}
