//! Identity endpoints.

use axum::extract::State;

use super::{created, success, ApiResult, JsonBody};
use crate::auth::{Caller, CurrentUser};
use crate::models::{RegisterRequest, User};
use crate::AppState;

/// GET /api/auth/me - The caller's local account.
pub async fn me(CurrentUser(user): CurrentUser) -> ApiResult<User> {
    success(user)
}

/// POST /api/auth/register - Create the caller's account, or return the existing one.
pub async fn register(
    State(state): State<AppState>,
    caller: Caller,
    JsonBody(request): JsonBody<RegisterRequest>,
) -> ApiResult<User> {
    let (user, was_created) = state.identity.register(&caller, &request).await?;

    if was_created {
        created(user)
    } else {
        success(user)
    }
}
