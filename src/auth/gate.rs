//! Per-action authorization.
//!
//! Every handler names the [`Action`] it performs and, when ownership
//! matters, the [`Resource`] it touches. Role requirements and ownership
//! rules live here and nowhere else.

use crate::errors::AppError;
use crate::models::{Role, Team, Tournament, User};

/// Operations exposed to authenticated users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ListTournaments,
    ViewTournament,
    ListTournamentTeams,
    CreateTournament,
    ListMyTournaments,
    UpdateTournament,
    DeleteTournament,
    ListTeams,
    ViewTeam,
    SearchTeams,
    ListTeamMembers,
    CreateTeam,
    UpdateTeam,
    DeleteTeam,
    CreateJoinRequest,
    ListMyJoinRequests,
    ListReceivedJoinRequests,
    ViewJoinRequest,
    AcceptJoinRequest,
    RejectJoinRequest,
    CancelJoinRequest,
    ManagePlayerProfile,
}

/// Role requirement of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    AnyRole,
    Player,
    Organizer,
}

/// Ownership facts about the resource an action targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    Tournament { organizer_id: String },
    Team { organizer_id: String },
    JoinRequest { player_id: String, organizer_id: String },
}

impl Resource {
    pub fn tournament(tournament: &Tournament) -> Self {
        Resource::Tournament {
            organizer_id: tournament.organizer_id.clone(),
        }
    }

    pub fn team(team: &Team) -> Self {
        Resource::Team {
            organizer_id: team.organizer_id.clone(),
        }
    }

    pub fn join_request(player_id: &str, team: &Team) -> Self {
        Resource::JoinRequest {
            player_id: player_id.to_string(),
            organizer_id: team.organizer_id.clone(),
        }
    }
}

impl Action {
    pub fn capability(self) -> Capability {
        use Action::*;
        match self {
            ListTournaments | ViewTournament | ListTournamentTeams | ListTeams | ViewTeam
            | SearchTeams | ListTeamMembers | ViewJoinRequest => Capability::AnyRole,
            CreateJoinRequest | ListMyJoinRequests | CancelJoinRequest | ManagePlayerProfile => {
                Capability::Player
            }
            CreateTournament | ListMyTournaments | UpdateTournament | DeleteTournament
            | CreateTeam | UpdateTeam | DeleteTeam | ListReceivedJoinRequests
            | AcceptJoinRequest | RejectJoinRequest => Capability::Organizer,
        }
    }
}

fn has_capability(role: Role, capability: Capability) -> bool {
    match capability {
        Capability::AnyRole => true,
        Capability::Player => role == Role::Player,
        Capability::Organizer => role == Role::Organizer,
    }
}

fn owns(user: &User, action: Action, resource: &Resource) -> bool {
    use Action::*;
    match (action, resource) {
        (UpdateTournament | DeleteTournament, Resource::Tournament { organizer_id })
        | (CreateTeam, Resource::Tournament { organizer_id })
        | (UpdateTeam | DeleteTeam, Resource::Team { organizer_id })
        | (
            AcceptJoinRequest | RejectJoinRequest,
            Resource::JoinRequest { organizer_id, .. },
        ) => *organizer_id == user.id,
        (CancelJoinRequest, Resource::JoinRequest { player_id, .. }) => *player_id == user.id,
        (
            ViewJoinRequest,
            Resource::JoinRequest {
                player_id,
                organizer_id,
            },
        ) => *player_id == user.id || *organizer_id == user.id,
        // Ownership-scoped action paired with the wrong resource kind
        (
            UpdateTournament | DeleteTournament | CreateTeam | UpdateTeam | DeleteTeam
            | AcceptJoinRequest | RejectJoinRequest | CancelJoinRequest | ViewJoinRequest,
            _,
        ) => false,
        _ => true,
    }
}

fn requires_resource(action: Action) -> bool {
    use Action::*;
    matches!(
        action,
        UpdateTournament
            | DeleteTournament
            | CreateTeam
            | UpdateTeam
            | DeleteTeam
            | AcceptJoinRequest
            | RejectJoinRequest
            | CancelJoinRequest
            | ViewJoinRequest
    )
}

/// Decide whether `user` may perform `action` on `resource`.
pub fn authorize(user: &User, action: Action, resource: Option<&Resource>) -> bool {
    if !has_capability(user.role, action.capability()) {
        return false;
    }
    match resource {
        Some(resource) => owns(user, action, resource),
        None => !requires_resource(action),
    }
}

/// Like [`authorize`], but produces the 403 error for the caller to propagate.
pub fn ensure(user: &User, action: Action, resource: Option<&Resource>) -> Result<(), AppError> {
    if authorize(user, action, resource) {
        return Ok(());
    }
    Err(denied(user, action))
}

/// Check only the role requirement, before the target resource is loaded.
pub fn ensure_role(user: &User, action: Action) -> Result<(), AppError> {
    if has_capability(user.role, action.capability()) {
        return Ok(());
    }
    Err(denied(user, action))
}

fn denied(user: &User, action: Action) -> AppError {
    tracing::debug!(user_id = %user.id, ?action, "authorization denied");
    let message = match action.capability() {
        Capability::Player if user.role != Role::Player => "Only players can perform this action",
        Capability::Organizer if user.role != Role::Organizer => {
            "Only organizers can perform this action"
        }
        _ => "You do not own this resource",
    };
    AppError::Forbidden(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str, role: Role) -> User {
        User {
            id: id.to_string(),
            clerk_id: format!("user_{}", id),
            email: format!("{}@example.com", id),
            full_name: id.to_string(),
            role,
            created_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_any_role_actions() {
        let player = user("p1", Role::Player);
        let organizer = user("o1", Role::Organizer);
        for action in [Action::ListTeams, Action::SearchTeams, Action::ListTournaments] {
            assert!(authorize(&player, action, None));
            assert!(authorize(&organizer, action, None));
        }
    }

    #[test]
    fn test_exact_role_actions() {
        let player = user("p1", Role::Player);
        let organizer = user("o1", Role::Organizer);

        assert!(authorize(&player, Action::CreateJoinRequest, None));
        assert!(!authorize(&organizer, Action::CreateJoinRequest, None));
        assert!(authorize(&organizer, Action::CreateTournament, None));
        assert!(!authorize(&player, Action::CreateTournament, None));
        assert!(authorize(&organizer, Action::ListReceivedJoinRequests, None));
        assert!(authorize(&player, Action::ManagePlayerProfile, None));
        assert!(!authorize(&organizer, Action::ManagePlayerProfile, None));
    }

    #[test]
    fn test_team_mutation_requires_tournament_owner() {
        let owner = user("o1", Role::Organizer);
        let other = user("o2", Role::Organizer);
        let team = Resource::Team {
            organizer_id: "o1".to_string(),
        };

        assert!(authorize(&owner, Action::UpdateTeam, Some(&team)));
        assert!(authorize(&owner, Action::DeleteTeam, Some(&team)));
        assert!(!authorize(&other, Action::UpdateTeam, Some(&team)));
        assert!(!authorize(&other, Action::DeleteTeam, Some(&team)));
    }

    #[test]
    fn test_join_request_ownership() {
        let owner = user("o1", Role::Organizer);
        let other = user("o2", Role::Organizer);
        let requester = user("p1", Role::Player);
        let bystander = user("p2", Role::Player);
        let request = Resource::JoinRequest {
            player_id: "p1".to_string(),
            organizer_id: "o1".to_string(),
        };

        assert!(authorize(&owner, Action::AcceptJoinRequest, Some(&request)));
        assert!(authorize(&owner, Action::RejectJoinRequest, Some(&request)));
        assert!(!authorize(&other, Action::AcceptJoinRequest, Some(&request)));
        assert!(!authorize(&other, Action::RejectJoinRequest, Some(&request)));
        assert!(!authorize(&requester, Action::AcceptJoinRequest, Some(&request)));

        assert!(authorize(&requester, Action::CancelJoinRequest, Some(&request)));
        assert!(!authorize(&bystander, Action::CancelJoinRequest, Some(&request)));
        assert!(!authorize(&owner, Action::CancelJoinRequest, Some(&request)));

        assert!(authorize(&requester, Action::ViewJoinRequest, Some(&request)));
        assert!(authorize(&owner, Action::ViewJoinRequest, Some(&request)));
        assert!(!authorize(&bystander, Action::ViewJoinRequest, Some(&request)));
        assert!(!authorize(&other, Action::ViewJoinRequest, Some(&request)));
    }

    #[test]
    fn test_owned_action_without_resource_is_denied() {
        let owner = user("o1", Role::Organizer);
        assert!(!authorize(&owner, Action::UpdateTournament, None));
        assert!(!authorize(&owner, Action::AcceptJoinRequest, None));
    }

    #[test]
    fn test_mismatched_resource_kind_is_denied() {
        let owner = user("o1", Role::Organizer);
        let tournament = Resource::Tournament {
            organizer_id: "o1".to_string(),
        };
        assert!(!authorize(&owner, Action::AcceptJoinRequest, Some(&tournament)));
    }

    #[test]
    fn test_ensure_role_ignores_ownership() {
        let organizer = user("o2", Role::Organizer);
        let player = user("p1", Role::Player);
        assert!(ensure_role(&organizer, Action::UpdateTeam).is_ok());
        assert!(ensure_role(&player, Action::UpdateTeam).is_err());
    }

    #[test]
    fn test_ensure_messages() {
        let player = user("p1", Role::Player);
        let err = ensure(&player, Action::CreateTeam, None).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(ref m) if m.contains("organizers")));

        let other = user("o2", Role::Organizer);
        let team = Resource::Team {
            organizer_id: "o1".to_string(),
        };
        let err = ensure(&other, Action::DeleteTeam, Some(&team)).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(ref m) if m.contains("own")));
    }
}
