//! Join request lifecycle and team membership.
//!
//! [`MembershipEngine`] is the single entry point for creating, accepting,
//! rejecting, cancelling and administratively deleting join requests. It
//! loads a snapshot, asks [`transition`] for a plan and hands the plan to the
//! repository, which applies it in one transaction.

pub mod transition;

use std::sync::Arc;

use crate::auth::gate::{self, Action};
use crate::db::Repository;
use crate::errors::AppError;
use crate::models::{JoinRequest, User};

pub use transition::{MembershipChange, RequestContext};

pub struct MembershipEngine {
    repo: Arc<Repository>,
}

impl MembershipEngine {
    pub fn new(repo: Arc<Repository>) -> Self {
        Self { repo }
    }

    /// Load a request and the team it targets.
    pub async fn context(&self, request_id: &str) -> Result<RequestContext, AppError> {
        let request = self
            .repo
            .get_join_request(request_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Join request {} not found", request_id)))?;

        let team = self.repo.get_team(&request.team_id).await?.ok_or_else(|| {
            AppError::NotFound(format!("Team {} not found", request.team_id))
        })?;

        Ok(RequestContext { request, team })
    }

    pub async fn create(
        &self,
        actor: &User,
        team_id: &str,
        message: Option<&str>,
    ) -> Result<JoinRequest, AppError> {
        gate::ensure_role(actor, Action::CreateJoinRequest)?;
        let team = self
            .repo
            .get_team(team_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Team {} not found", team_id)))?;
        let existing = self.repo.find_join_request(&actor.id, team_id).await?;

        let change = transition::open(actor, &team, existing.as_ref(), message)?;
        let request = self.apply(&change).await?;

        tracing::info!(request_id = %request.id, team_id, player_id = %actor.id, "join request created");
        Ok(request)
    }

    pub async fn accept(&self, actor: &User, request_id: &str) -> Result<JoinRequest, AppError> {
        let ctx = self.context(request_id).await?;
        let change = transition::admit(actor, &ctx)?;
        self.apply(&change).await
    }

    pub async fn reject(&self, actor: &User, request_id: &str) -> Result<JoinRequest, AppError> {
        let ctx = self.context(request_id).await?;
        let change = transition::decline(actor, &ctx)?;
        self.apply(&change).await
    }

    pub async fn cancel(&self, actor: &User, request_id: &str) -> Result<(), AppError> {
        let ctx = self.context(request_id).await?;
        let change = transition::withdraw(actor, &ctx)?;
        self.repo.apply_membership_change(&change).await?;
        Ok(())
    }

    /// Administrative deletion; removes the membership an accepted request granted.
    pub async fn remove(&self, request_id: &str) -> Result<(), AppError> {
        let request = self
            .repo
            .get_join_request(request_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Join request {} not found", request_id)))?;

        self.repo
            .apply_membership_change(&transition::expel(&request))
            .await?;
        Ok(())
    }

    async fn apply(&self, change: &MembershipChange) -> Result<JoinRequest, AppError> {
        self.repo
            .apply_membership_change(change)
            .await?
            .ok_or_else(|| {
                AppError::Internal(format!(
                    "Join request {} missing after update",
                    change.request_id()
                ))
            })
    }
}
