//! Tournament API endpoints.

use axum::extract::{Path, State};

use super::{created, required, success, ApiResult, JsonBody};
use crate::auth::gate::{self, Action, Resource};
use crate::auth::CurrentUser;
use crate::errors::AppError;
use crate::models::{
    CreateTournamentRequest, Team, TeamFilter, Tournament, UpdateTournamentRequest,
};
use crate::AppState;

fn validate_start_date(value: &str) -> Result<(), AppError> {
    chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|_| ())
        .map_err(|_| AppError::invalid_field("startDate", "startDate must be YYYY-MM-DD"))
}

async fn load(state: &AppState, id: &str) -> Result<Tournament, AppError> {
    state
        .repo
        .get_tournament(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Tournament {} not found", id)))
}

/// GET /api/tournaments - List all tournaments.
pub async fn list_tournaments(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Vec<Tournament>> {
    gate::ensure(&user, Action::ListTournaments, None)?;
    success(state.repo.list_tournaments().await?)
}

/// GET /api/tournaments/my - Tournaments owned by the caller.
pub async fn my_tournaments(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Vec<Tournament>> {
    gate::ensure(&user, Action::ListMyTournaments, None)?;
    success(state.repo.list_tournaments_by_organizer(&user.id).await?)
}

/// GET /api/tournaments/:id - Get a single tournament.
pub async fn get_tournament(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Tournament> {
    gate::ensure(&user, Action::ViewTournament, None)?;
    success(load(&state, &id).await?)
}

/// POST /api/tournaments - Create a tournament.
pub async fn create_tournament(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    JsonBody(request): JsonBody<CreateTournamentRequest>,
) -> ApiResult<Tournament> {
    gate::ensure(&user, Action::CreateTournament, None)?;

    required("name", &request.name)?;
    required("sport", &request.sport)?;
    required("city", &request.city)?;
    validate_start_date(&request.start_date)?;

    let tournament = state.repo.create_tournament(&user.id, &request).await?;
    tracing::info!(tournament_id = %tournament.id, organizer_id = %user.id, "tournament created");

    created(tournament)
}

/// PUT /api/tournaments/:id - Update a tournament.
pub async fn update_tournament(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    JsonBody(request): JsonBody<UpdateTournamentRequest>,
) -> ApiResult<Tournament> {
    gate::ensure_role(&user, Action::UpdateTournament)?;
    let existing = load(&state, &id).await?;
    gate::ensure(
        &user,
        Action::UpdateTournament,
        Some(&Resource::tournament(&existing)),
    )?;

    for (field, value) in [
        ("name", &request.name),
        ("sport", &request.sport),
        ("city", &request.city),
    ] {
        if let Some(value) = value {
            required(field, value)?;
        }
    }
    if let Some(start_date) = &request.start_date {
        validate_start_date(start_date)?;
    }

    let tournament = state.repo.update_tournament(&existing, &request).await?;

    // Teams carry the tournament's name, sport and city in the index
    let filter = TeamFilter {
        tournament_id: Some(tournament.id.clone()),
        ..TeamFilter::default()
    };
    match state.repo.list_teams(&filter).await {
        Ok(teams) => {
            if let Err(e) = state.search.index_teams(&teams).await {
                tracing::warn!("Failed to re-index teams of tournament {}: {}", tournament.id, e);
            }
        }
        Err(e) => tracing::warn!("Failed to load teams for re-indexing: {}", e),
    }

    success(tournament)
}

/// DELETE /api/tournaments/:id - Delete a tournament and everything under it.
pub async fn delete_tournament(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<()> {
    gate::ensure_role(&user, Action::DeleteTournament)?;
    let existing = load(&state, &id).await?;
    gate::ensure(
        &user,
        Action::DeleteTournament,
        Some(&Resource::tournament(&existing)),
    )?;

    state.repo.delete_tournament(&id).await?;
    tracing::info!(tournament_id = %id, "tournament deleted");

    if let Err(e) = state.search.remove_tournament(&id).await {
        tracing::warn!("Failed to remove teams of tournament {} from index: {}", id, e);
    }

    success(())
}

/// GET /api/tournaments/:id/teams - Teams of a tournament.
pub async fn tournament_teams(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Vec<Team>> {
    gate::ensure(&user, Action::ListTournamentTeams, None)?;
    load(&state, &id).await?;

    let filter = TeamFilter {
        tournament_id: Some(id),
        ..TeamFilter::default()
    };
    success(state.repo.list_teams(&filter).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_start_date() {
        assert!(validate_start_date("2026-06-01").is_ok());
        assert!(validate_start_date("01/06/2026").is_err());
        assert!(validate_start_date("2026-02-30").is_err());
    }
}
