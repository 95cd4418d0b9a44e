//! Team model with its capacity bookkeeping.

use serde::{Deserialize, Serialize};

/// Upper bound on `max_capacity` accepted for any team.
pub const MAX_TEAM_CAPACITY: i64 = 50;

/// A team inside a tournament.
///
/// The tournament fields are denormalized from the owning tournament so
/// listings, filters and ownership checks need no second lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: String,
    pub name: String,
    pub tournament_id: String,
    pub tournament_name: String,
    pub sport: String,
    pub city: String,
    pub organizer_id: String,
    pub max_capacity: i64,
    /// Always equal to the number of rows in `team_members`
    pub current_capacity: i64,
    pub is_full: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Team {
    pub fn has_open_slot(&self) -> bool {
        self.current_capacity < self.max_capacity
    }
}

/// Capacity view of a team embedded in join request details.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamSummary {
    pub id: String,
    pub name: String,
    pub current_capacity: i64,
    pub max_capacity: i64,
}

/// Request body for creating a team.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTeamRequest {
    pub name: String,
    pub tournament_id: String,
    pub max_capacity: i64,
}

/// Request body for updating a team. The tournament cannot change.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTeamRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub max_capacity: Option<i64>,
}

/// Query parameters accepted by `GET /api/teams`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TeamFilter {
    #[serde(default)]
    pub tournament_id: Option<String>,
    #[serde(default)]
    pub sport: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub available: Option<bool>,
    #[serde(default)]
    pub search: Option<String>,
}

/// Check the capacity policy for a requested `max_capacity`.
pub fn capacity_in_bounds(max_capacity: i64) -> bool {
    (1..=MAX_TEAM_CAPACITY).contains(&max_capacity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_bounds() {
        assert!(!capacity_in_bounds(0));
        assert!(capacity_in_bounds(1));
        assert!(capacity_in_bounds(50));
        assert!(!capacity_in_bounds(51));
        assert!(!capacity_in_bounds(-3));
    }
}
