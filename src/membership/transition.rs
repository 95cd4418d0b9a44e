//! Join request state machine.
//!
//! Every function here is pure: it receives the acting user and a snapshot
//! of the request and its team, checks authorization before state, and
//! returns the change to apply. Nothing is written until the plan reaches
//! `Repository::apply_membership_change`.

use crate::auth::gate::{self, Action, Resource};
use crate::errors::AppError;
use crate::models::{JoinRequest, JoinRequestStatus, Team, User};

/// A join request together with the team it targets.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request: JoinRequest,
    pub team: Team,
}

impl RequestContext {
    fn resource(&self) -> Resource {
        Resource::join_request(&self.request.player_id, &self.team)
    }
}

/// A planned membership mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipChange {
    /// Insert a pending request, guarded on the team still having room
    Open {
        request_id: String,
        player_id: String,
        team_id: String,
        message: String,
    },
    /// Reserve a slot, add the member, then mark the request accepted
    Admit {
        request_id: String,
        team_id: String,
        player_id: String,
    },
    /// Mark a pending request rejected
    Decline { request_id: String },
    /// Delete a pending request
    Withdraw { request_id: String },
    /// Delete a request in any state, undoing the membership it granted
    Expel { request_id: String },
}

impl MembershipChange {
    pub fn request_id(&self) -> &str {
        match self {
            MembershipChange::Open { request_id, .. }
            | MembershipChange::Admit { request_id, .. }
            | MembershipChange::Decline { request_id }
            | MembershipChange::Withdraw { request_id }
            | MembershipChange::Expel { request_id } => request_id,
        }
    }
}

fn require_pending(request: &JoinRequest) -> Result<(), AppError> {
    match request.status {
        JoinRequestStatus::Pending => Ok(()),
        status => Err(AppError::validation(format!(
            "This request has already been processed (status: {})",
            status.as_str()
        ))),
    }
}

fn team_full(team: &Team) -> AppError {
    AppError::invalid_field(
        "teamId",
        format!(
            "Team {} is full ({}/{})",
            team.name, team.current_capacity, team.max_capacity
        ),
    )
}

/// Plan a new pending request from `actor` to `team`.
pub fn open(
    actor: &User,
    team: &Team,
    existing: Option<&JoinRequest>,
    message: Option<&str>,
) -> Result<MembershipChange, AppError> {
    gate::ensure(actor, Action::CreateJoinRequest, None)?;

    if !team.has_open_slot() {
        return Err(team_full(team));
    }
    if existing.is_some() {
        return Err(AppError::invalid_field(
            "teamId",
            "You have already sent a request to this team",
        ));
    }

    Ok(MembershipChange::Open {
        request_id: uuid::Uuid::new_v4().to_string(),
        player_id: actor.id.clone(),
        team_id: team.id.clone(),
        message: message.map(str::trim).unwrap_or_default().to_string(),
    })
}

/// Plan accepting a request into its team.
pub fn admit(actor: &User, ctx: &RequestContext) -> Result<MembershipChange, AppError> {
    gate::ensure(actor, Action::AcceptJoinRequest, Some(&ctx.resource()))?;
    require_pending(&ctx.request)?;

    if !ctx.team.has_open_slot() {
        return Err(team_full(&ctx.team));
    }

    Ok(MembershipChange::Admit {
        request_id: ctx.request.id.clone(),
        team_id: ctx.team.id.clone(),
        player_id: ctx.request.player_id.clone(),
    })
}

/// Plan rejecting a request.
pub fn decline(actor: &User, ctx: &RequestContext) -> Result<MembershipChange, AppError> {
    gate::ensure(actor, Action::RejectJoinRequest, Some(&ctx.resource()))?;
    require_pending(&ctx.request)?;

    Ok(MembershipChange::Decline {
        request_id: ctx.request.id.clone(),
    })
}

/// Plan the requester withdrawing their own pending request.
pub fn withdraw(actor: &User, ctx: &RequestContext) -> Result<MembershipChange, AppError> {
    gate::ensure(actor, Action::CancelJoinRequest, Some(&ctx.resource()))?;
    require_pending(&ctx.request)
        .map_err(|_| AppError::validation("Only pending requests can be cancelled"))?;

    Ok(MembershipChange::Withdraw {
        request_id: ctx.request.id.clone(),
    })
}

/// Plan an administrative removal. Callers are authenticated by key, not role.
pub fn expel(request: &JoinRequest) -> MembershipChange {
    MembershipChange::Expel {
        request_id: request.id.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

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

    fn team(current: i64, max: i64) -> Team {
        Team {
            id: "t1".to_string(),
            name: "Lions".to_string(),
            tournament_id: "tr1".to_string(),
            tournament_name: "Spring Cup".to_string(),
            sport: "football".to_string(),
            city: "Lyon".to_string(),
            organizer_id: "o1".to_string(),
            max_capacity: max,
            current_capacity: current,
            is_full: current >= max,
            created_at: "2026-01-01T00:00:00Z".to_string(),
            updated_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    fn request(status: JoinRequestStatus) -> JoinRequest {
        JoinRequest {
            id: "r1".to_string(),
            player_id: "p1".to_string(),
            team_id: "t1".to_string(),
            status,
            message: String::new(),
            created_at: "2026-01-01T00:00:00Z".to_string(),
            updated_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    fn ctx(status: JoinRequestStatus, current: i64, max: i64) -> RequestContext {
        RequestContext {
            request: request(status),
            team: team(current, max),
        }
    }

    #[test]
    fn test_open_plans_pending_request() {
        let player = user("p1", Role::Player);
        let change = open(&player, &team(0, 2), None, Some("  keen striker ")).unwrap();
        match change {
            MembershipChange::Open {
                player_id,
                team_id,
                message,
                ..
            } => {
                assert_eq!(player_id, "p1");
                assert_eq!(team_id, "t1");
                assert_eq!(message, "keen striker");
            }
            other => panic!("unexpected plan {:?}", other),
        }
    }

    #[test]
    fn test_open_refuses_full_team_and_duplicates() {
        let player = user("p1", Role::Player);

        let err = open(&player, &team(2, 2), None, None).unwrap_err();
        assert!(matches!(err, AppError::Validation { field: Some(ref f), .. } if f == "teamId"));

        let existing = request(JoinRequestStatus::Rejected);
        let err = open(&player, &team(0, 2), Some(&existing), None).unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[test]
    fn test_open_requires_player() {
        let organizer = user("o1", Role::Organizer);
        let err = open(&organizer, &team(0, 2), None, None).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn test_admit_checks_owner_before_state() {
        let stranger = user("o2", Role::Organizer);
        let err = admit(&stranger, &ctx(JoinRequestStatus::Accepted, 2, 2)).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn test_admit_requires_pending_and_room() {
        let owner = user("o1", Role::Organizer);

        let plan = admit(&owner, &ctx(JoinRequestStatus::Pending, 1, 2)).unwrap();
        assert_eq!(
            plan,
            MembershipChange::Admit {
                request_id: "r1".to_string(),
                team_id: "t1".to_string(),
                player_id: "p1".to_string(),
            }
        );

        let err = admit(&owner, &ctx(JoinRequestStatus::Rejected, 0, 2)).unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));

        let err = admit(&owner, &ctx(JoinRequestStatus::Pending, 2, 2)).unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[test]
    fn test_decline_twice_is_refused() {
        let owner = user("o1", Role::Organizer);
        assert!(decline(&owner, &ctx(JoinRequestStatus::Pending, 0, 2)).is_ok());
        let err = decline(&owner, &ctx(JoinRequestStatus::Rejected, 0, 2)).unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[test]
    fn test_withdraw_only_by_requester_while_pending() {
        let requester = user("p1", Role::Player);
        let other = user("p2", Role::Player);

        assert_eq!(
            withdraw(&requester, &ctx(JoinRequestStatus::Pending, 0, 2)).unwrap(),
            MembershipChange::Withdraw {
                request_id: "r1".to_string()
            }
        );

        let err = withdraw(&other, &ctx(JoinRequestStatus::Pending, 0, 2)).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = withdraw(&requester, &ctx(JoinRequestStatus::Accepted, 1, 2)).unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[test]
    fn test_expel_targets_request() {
        let plan = expel(&request(JoinRequestStatus::Accepted));
        assert_eq!(plan.request_id(), "r1");
    }
}
