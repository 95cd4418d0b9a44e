//! Administrative endpoints, guarded by the pre-shared key.

use axum::extract::{Path, State};

use super::{success, ApiResult};
use crate::AppState;

/// DELETE /api/admin/join-requests/:id - Delete any join request.
///
/// Deleting an accepted request also removes the player from the team.
pub async fn admin_delete_join_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    state.membership.remove(&id).await?;
    success(())
}
