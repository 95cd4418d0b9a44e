//! Player profile endpoints.

use axum::extract::State;

use super::{created, required, success, ApiResult, JsonBody};
use crate::auth::gate::{self, Action};
use crate::auth::CurrentUser;
use crate::errors::AppError;
use crate::models::{PlayerProfile, PlayerProfileRequest};
use crate::AppState;

fn validate(request: &PlayerProfileRequest) -> Result<(), AppError> {
    required("city", &request.city)?;
    required("mainSport", &request.main_sport)
}

/// GET /api/players/profile - The caller's profile.
pub async fn get_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<PlayerProfile> {
    gate::ensure(&user, Action::ManagePlayerProfile, None)?;

    let profile = state
        .repo
        .get_profile(&user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("Player profile not found".to_string()))?;

    success(profile)
}

/// POST /api/players/profile - Create the caller's profile.
pub async fn create_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    JsonBody(request): JsonBody<PlayerProfileRequest>,
) -> ApiResult<PlayerProfile> {
    gate::ensure(&user, Action::ManagePlayerProfile, None)?;
    validate(&request)?;

    created(state.repo.create_profile(&user.id, &request).await?)
}

/// PUT /api/players/profile - Replace the caller's profile.
pub async fn update_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    JsonBody(request): JsonBody<PlayerProfileRequest>,
) -> ApiResult<PlayerProfile> {
    gate::ensure(&user, Action::ManagePlayerProfile, None)?;
    validate(&request)?;

    success(state.repo.update_profile(&user.id, &request).await?)
}
