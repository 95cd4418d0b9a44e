//! Team API endpoints, including full-text search.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use serde::Deserialize;

use super::{created, required, success, ApiResult, JsonBody};
use crate::auth::gate::{self, Action, Resource};
use crate::auth::CurrentUser;
use crate::errors::AppError;
use crate::models::{
    capacity_in_bounds, CreateTeamRequest, Team, TeamFilter, UpdateTeamRequest, User,
    MAX_TEAM_CAPACITY,
};
use crate::AppState;

const DEFAULT_SEARCH_LIMIT: usize = 20;
const MAX_SEARCH_LIMIT: usize = 100;
/// Hits fetched from the index before the availability filter and paging.
/// Pages must end inside it.
const SEARCH_WINDOW: usize = 1000;

/// Query parameters for search.
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub available: Option<bool>,
}

fn check_capacity(max_capacity: i64) -> Result<(), AppError> {
    if !capacity_in_bounds(max_capacity) {
        return Err(AppError::invalid_field(
            "maxCapacity",
            format!("maxCapacity must be between 1 and {}", MAX_TEAM_CAPACITY),
        ));
    }
    Ok(())
}

async fn load(state: &AppState, id: &str) -> Result<Team, AppError> {
    state
        .repo
        .get_team(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Team {} not found", id)))
}

async fn reindex(state: &AppState, team: &Team) {
    if let Err(e) = state.search.index_teams(std::slice::from_ref(team)).await {
        tracing::warn!("Failed to index team {}: {}", team.id, e);
    }
}

/// GET /api/teams - List teams, optionally filtered.
pub async fn list_teams(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(filter): Query<TeamFilter>,
) -> ApiResult<Vec<Team>> {
    gate::ensure(&user, Action::ListTeams, None)?;
    success(state.repo.list_teams(&filter).await?)
}

/// GET /api/teams/search - Full-text search over teams.
pub async fn search_teams(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<SearchParams>,
) -> ApiResult<Vec<Team>> {
    gate::ensure(&user, Action::SearchTeams, None)?;

    let limit = params
        .limit
        .unwrap_or(DEFAULT_SEARCH_LIMIT)
        .clamp(1, MAX_SEARCH_LIMIT);
    let offset = params.offset.unwrap_or(0);
    let only_available = params.available.unwrap_or(true);

    if offset.saturating_add(limit) > SEARCH_WINDOW {
        return Err(AppError::invalid_field(
            "offset",
            format!("offset + limit cannot exceed {}", SEARCH_WINDOW),
        ));
    }

    let hits = state.search.search(&params.q, SEARCH_WINDOW, 0)?;
    let ids: Vec<String> = hits.iter().map(|hit| hit.team_id.clone()).collect();

    // The database stays authoritative for capacity; stale hits drop out here
    let mut by_id: HashMap<String, Team> = state
        .repo
        .get_teams_by_ids(&ids, only_available)
        .await?
        .into_iter()
        .map(|team| (team.id.clone(), team))
        .collect();

    let teams: Vec<Team> = ids
        .iter()
        .filter_map(|id| by_id.remove(id))
        .skip(offset)
        .take(limit)
        .collect();

    success(teams)
}

/// GET /api/teams/:id - Get a single team.
pub async fn get_team(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Team> {
    gate::ensure(&user, Action::ViewTeam, None)?;
    success(load(&state, &id).await?)
}

/// GET /api/teams/:id/members - Members of a team.
pub async fn team_members(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Vec<User>> {
    gate::ensure(&user, Action::ListTeamMembers, None)?;
    load(&state, &id).await?;
    success(state.repo.list_team_members(&id).await?)
}

/// POST /api/teams - Create a team in one of the caller's tournaments.
pub async fn create_team(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    JsonBody(request): JsonBody<CreateTeamRequest>,
) -> ApiResult<Team> {
    gate::ensure_role(&user, Action::CreateTeam)?;

    let tournament = state
        .repo
        .get_tournament(&request.tournament_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("Tournament {} not found", request.tournament_id))
        })?;
    gate::ensure(
        &user,
        Action::CreateTeam,
        Some(&Resource::tournament(&tournament)),
    )?;

    required("name", &request.name)?;
    check_capacity(request.max_capacity)?;

    let team = state.repo.create_team(&request).await?;
    tracing::info!(team_id = %team.id, tournament_id = %team.tournament_id, "team created");

    reindex(&state, &team).await;
    created(team)
}

/// PUT /api/teams/:id - Rename a team or change its maximum capacity.
pub async fn update_team(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    JsonBody(request): JsonBody<UpdateTeamRequest>,
) -> ApiResult<Team> {
    gate::ensure_role(&user, Action::UpdateTeam)?;
    let existing = load(&state, &id).await?;
    gate::ensure(&user, Action::UpdateTeam, Some(&Resource::team(&existing)))?;

    if let Some(name) = &request.name {
        required("name", name)?;
    }
    if let Some(max_capacity) = request.max_capacity {
        check_capacity(max_capacity)?;
    }

    let team = state
        .repo
        .update_team(
            &id,
            request.name.as_deref().map(str::trim),
            request.max_capacity,
        )
        .await?;

    reindex(&state, &team).await;
    success(team)
}

/// DELETE /api/teams/:id - Delete a team with its requests and memberships.
pub async fn delete_team(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<()> {
    gate::ensure_role(&user, Action::DeleteTeam)?;
    let existing = load(&state, &id).await?;
    gate::ensure(&user, Action::DeleteTeam, Some(&Resource::team(&existing)))?;

    state.repo.delete_team(&id).await?;
    tracing::info!(team_id = %id, "team deleted");

    if let Err(e) = state.search.remove_team(&id).await {
        tracing::warn!("Failed to remove team {} from index: {}", id, e);
    }

    success(())
}
