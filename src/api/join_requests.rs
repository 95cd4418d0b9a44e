//! Join request API endpoints.
//!
//! State changes go through the membership engine; this module only reads
//! directly from the repository.

use axum::extract::{Path, State};

use super::{created, success, ApiResult, JsonBody};
use crate::auth::gate::{self, Action, Resource};
use crate::auth::CurrentUser;
use crate::errors::AppError;
use crate::models::{CreateJoinRequestRequest, JoinRequest, JoinRequestDetail};
use crate::AppState;

/// POST /api/join-requests - Ask to join a team.
pub async fn create_join_request(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    JsonBody(request): JsonBody<CreateJoinRequestRequest>,
) -> ApiResult<JoinRequest> {
    let join_request = state
        .membership
        .create(&user, &request.team_id, request.message.as_deref())
        .await?;

    created(join_request)
}

/// GET /api/join-requests/my - Requests the caller has sent.
pub async fn my_join_requests(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Vec<JoinRequestDetail>> {
    gate::ensure(&user, Action::ListMyJoinRequests, None)?;
    success(state.repo.list_join_requests_by_player(&user.id).await?)
}

/// GET /api/join-requests/received - Requests for teams in the caller's tournaments.
pub async fn received_join_requests(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Vec<JoinRequestDetail>> {
    gate::ensure(&user, Action::ListReceivedJoinRequests, None)?;
    success(state.repo.list_join_requests_by_organizer(&user.id).await?)
}

/// GET /api/join-requests/:id - One request, visible to its sender and the organizer.
pub async fn get_join_request(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<JoinRequestDetail> {
    let ctx = state.membership.context(&id).await?;
    gate::ensure(
        &user,
        Action::ViewJoinRequest,
        Some(&Resource::join_request(&ctx.request.player_id, &ctx.team)),
    )?;

    let detail = state
        .repo
        .get_join_request_detail(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Join request {} not found", id)))?;

    success(detail)
}

/// POST /api/join-requests/:id/accept
pub async fn accept_join_request(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<JoinRequest> {
    success(state.membership.accept(&user, &id).await?)
}

/// POST /api/join-requests/:id/reject
pub async fn reject_join_request(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<JoinRequest> {
    success(state.membership.reject(&user, &id).await?)
}

/// POST /api/join-requests/:id/cancel - Withdraw a pending request.
pub async fn cancel_join_request(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<()> {
    state.membership.cancel(&user, &id).await?;
    success(())
}
