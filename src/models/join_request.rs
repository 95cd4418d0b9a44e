//! Join request model.

use serde::{Deserialize, Serialize};

use super::{TeamSummary, TournamentSummary, User};

/// Lifecycle state of a join request. `Accepted` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JoinRequestStatus {
    Pending,
    Accepted,
    Rejected,
}

impl JoinRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinRequestStatus::Pending => "pending",
            JoinRequestStatus::Accepted => "accepted",
            JoinRequestStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JoinRequestStatus::Pending),
            "accepted" => Some(JoinRequestStatus::Accepted),
            "rejected" => Some(JoinRequestStatus::Rejected),
            _ => None,
        }
    }
}

/// A player's application to join a team.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub id: String,
    pub player_id: String,
    pub team_id: String,
    pub status: JoinRequestStatus,
    pub message: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Join request with the player, team and tournament it refers to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequestDetail {
    pub id: String,
    pub status: JoinRequestStatus,
    pub message: String,
    pub player: User,
    pub team: TeamSummary,
    pub tournament: TournamentSummary,
    pub created_at: String,
    pub updated_at: String,
}

/// Request body for `POST /api/join-requests`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJoinRequestRequest {
    pub team_id: String,
    #[serde(default)]
    pub message: Option<String>,
}
