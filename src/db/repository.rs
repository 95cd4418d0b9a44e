//! Database repository for CRUD operations.
//!
//! Uses prepared statements and transactions for data integrity. Writes to
//! join request status, team membership and `current_capacity` live in
//! `membership.rs` and are only reached through the membership engine.

use chrono::Utc;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use crate::errors::{is_unique_violation, AppError};
use crate::models::{
    CreateTeamRequest, CreateTournamentRequest, JoinRequest, JoinRequestDetail,
    JoinRequestStatus, NewUser, PlayerProfile, PlayerProfileRequest, Role, SkillLevel, Team,
    TeamFilter, TeamSummary, Tournament, TournamentSummary, UpdateTournamentRequest, User,
};

const USER_COLUMNS: &str = "id, clerk_id, email, full_name, role, created_at";

const TOURNAMENT_COLUMNS: &str =
    "id, name, sport, city, start_date, description, organizer_id, created_at, updated_at";

const TEAM_SELECT: &str = r#"SELECT t.id, t.name, t.tournament_id, tr.name AS tournament_name,
                  tr.sport, tr.city, tr.organizer_id, t.max_capacity, t.current_capacity,
                  t.created_at, t.updated_at
           FROM teams t
           JOIN tournaments tr ON tr.id = t.tournament_id"#;

pub(crate) const JOIN_REQUEST_COLUMNS: &str =
    "id, player_id, team_id, status, message, created_at, updated_at";

const JOIN_REQUEST_DETAIL_SELECT: &str = r#"SELECT jr.id, jr.status, jr.message, jr.created_at, jr.updated_at,
                  u.id AS player_id, u.clerk_id, u.email, u.full_name, u.role,
                  u.created_at AS player_created_at,
                  t.id AS team_id, t.name AS team_name, t.current_capacity, t.max_capacity,
                  tr.id AS tournament_id, tr.name AS tournament_name, tr.sport, tr.city
           FROM join_requests jr
           JOIN users u ON u.id = jr.player_id
           JOIN teams t ON t.id = jr.team_id
           JOIN tournaments tr ON tr.id = t.tournament_id"#;

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pub(crate) pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ==================== USER OPERATIONS ====================

    /// Find the local user linked to an identity provider subject.
    pub async fn find_user_by_clerk_id(&self, clerk_id: &str) -> Result<Option<User>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM users WHERE clerk_id = ?",
            USER_COLUMNS
        ))
        .bind(clerk_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    /// Insert a user, or return the row a concurrent registration already created.
    ///
    /// The flag is true only when this call inserted the row.
    pub async fn create_user(&self, new_user: &NewUser) -> Result<(User, bool), AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            "INSERT INTO users (id, clerk_id, email, full_name, role, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&new_user.clerk_id)
        .bind(&new_user.email)
        .bind(&new_user.full_name)
        .bind(new_user.role.as_str())
        .bind(&now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok((
                User {
                    id,
                    clerk_id: new_user.clerk_id.clone(),
                    email: new_user.email.clone(),
                    full_name: new_user.full_name.clone(),
                    role: new_user.role,
                    created_at: now,
                },
                true,
            )),
            Err(e) if is_unique_violation(&e) => {
                // Either the subject registered concurrently or the email belongs to someone else
                match self.find_user_by_clerk_id(&new_user.clerk_id).await? {
                    Some(existing) => Ok((existing, false)),
                    None => Err(AppError::invalid_field(
                        "email",
                        format!("Email {} is already registered", new_user.email),
                    )),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Replace a user's email. Returns false when another account holds it.
    pub async fn update_user_email(&self, id: &str, email: &str) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE users SET email = ? WHERE id = ?")
            .bind(email)
            .bind(id)
            .execute(&self.pool)
            .await;

        match result {
            Ok(done) => Ok(done.rows_affected() > 0),
            Err(e) if is_unique_violation(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    // ==================== TOURNAMENT OPERATIONS ====================

    /// List all tournaments, soonest first.
    pub async fn list_tournaments(&self) -> Result<Vec<Tournament>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM tournaments ORDER BY start_date, name",
            TOURNAMENT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(tournament_from_row).collect())
    }

    /// List the tournaments owned by an organizer.
    pub async fn list_tournaments_by_organizer(
        &self,
        organizer_id: &str,
    ) -> Result<Vec<Tournament>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM tournaments WHERE organizer_id = ? ORDER BY start_date, name",
            TOURNAMENT_COLUMNS
        ))
        .bind(organizer_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(tournament_from_row).collect())
    }

    /// Get a tournament by ID.
    pub async fn get_tournament(&self, id: &str) -> Result<Option<Tournament>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM tournaments WHERE id = ?",
            TOURNAMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(tournament_from_row))
    }

    /// Create a tournament owned by `organizer_id`.
    pub async fn create_tournament(
        &self,
        organizer_id: &str,
        request: &CreateTournamentRequest,
    ) -> Result<Tournament, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO tournaments (id, name, sport, city, start_date, description, organizer_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(request.name.trim())
        .bind(request.sport.trim())
        .bind(request.city.trim())
        .bind(&request.start_date)
        .bind(&request.description)
        .bind(organizer_id)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(Tournament {
            id,
            name: request.name.trim().to_string(),
            sport: request.sport.trim().to_string(),
            city: request.city.trim().to_string(),
            start_date: request.start_date.clone(),
            description: request.description.clone(),
            organizer_id: organizer_id.to_string(),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Apply a partial update to an existing tournament.
    pub async fn update_tournament(
        &self,
        existing: &Tournament,
        request: &UpdateTournamentRequest,
    ) -> Result<Tournament, AppError> {
        let now = Utc::now().to_rfc3339();

        let name = request
            .name
            .as_deref()
            .map(str::trim)
            .unwrap_or(&existing.name);
        let sport = request
            .sport
            .as_deref()
            .map(str::trim)
            .unwrap_or(&existing.sport);
        let city = request
            .city
            .as_deref()
            .map(str::trim)
            .unwrap_or(&existing.city);
        let start_date = request.start_date.as_ref().unwrap_or(&existing.start_date);
        let description = request
            .description
            .clone()
            .or(existing.description.clone());

        let result = sqlx::query(
            "UPDATE tournaments SET name = ?, sport = ?, city = ?, start_date = ?, description = ?, updated_at = ? WHERE id = ?",
        )
        .bind(name)
        .bind(sport)
        .bind(city)
        .bind(start_date)
        .bind(&description)
        .bind(&now)
        .bind(&existing.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Tournament {} not found",
                existing.id
            )));
        }

        Ok(Tournament {
            id: existing.id.clone(),
            name: name.to_string(),
            sport: sport.to_string(),
            city: city.to_string(),
            start_date: start_date.clone(),
            description,
            organizer_id: existing.organizer_id.clone(),
            created_at: existing.created_at.clone(),
            updated_at: now,
        })
    }

    /// Delete a tournament. Its teams, memberships and join requests cascade.
    pub async fn delete_tournament(&self, id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM tournaments WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Tournament {} not found", id)));
        }

        Ok(())
    }

    // ==================== TEAM OPERATIONS ====================

    /// List teams matching the given filters.
    pub async fn list_teams(&self, filter: &TeamFilter) -> Result<Vec<Team>, AppError> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(TEAM_SELECT);
        query.push(" WHERE 1 = 1");

        if let Some(tournament_id) = non_blank(&filter.tournament_id) {
            query.push(" AND t.tournament_id = ").push_bind(tournament_id);
        }
        if let Some(sport) = non_blank(&filter.sport) {
            query
                .push(" AND tr.sport = ")
                .push_bind(sport)
                .push(" COLLATE NOCASE");
        }
        if let Some(city) = non_blank(&filter.city) {
            query
                .push(" AND tr.city = ")
                .push_bind(city)
                .push(" COLLATE NOCASE");
        }
        if filter.available == Some(true) {
            query.push(" AND t.current_capacity < t.max_capacity");
        }
        if let Some(search) = non_blank(&filter.search) {
            query
                .push(" AND t.name LIKE ")
                .push_bind(format!("%{}%", escape_like(&search)))
                .push(" ESCAPE '\\'");
        }
        query.push(" ORDER BY t.name");

        let rows = query.build().fetch_all(&self.pool).await?;
        Ok(rows.iter().map(team_from_row).collect())
    }

    /// Get a team by ID.
    pub async fn get_team(&self, id: &str) -> Result<Option<Team>, AppError> {
        let row = sqlx::query(&format!("{} WHERE t.id = ?", TEAM_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(team_from_row))
    }

    /// Load the given teams in one query, in no particular order.
    ///
    /// Ids with no team are skipped. With `only_available`, full teams are
    /// skipped too.
    pub async fn get_teams_by_ids(
        &self,
        ids: &[String],
        only_available: bool,
    ) -> Result<Vec<Team>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(TEAM_SELECT);
        query.push(" WHERE t.id IN (");
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(id.clone());
        }
        separated.push_unseparated(")");
        if only_available {
            query.push(" AND t.current_capacity < t.max_capacity");
        }

        let rows = query.build().fetch_all(&self.pool).await?;
        Ok(rows.iter().map(team_from_row).collect())
    }

    /// Create an empty team inside a tournament.
    pub async fn create_team(&self, request: &CreateTeamRequest) -> Result<Team, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO teams (id, name, tournament_id, max_capacity, current_capacity, created_at, updated_at) VALUES (?, ?, ?, ?, 0, ?, ?)",
        )
        .bind(&id)
        .bind(request.name.trim())
        .bind(&request.tournament_id)
        .bind(request.max_capacity)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.get_team(&id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("Team {} vanished after insert", id)))
    }

    /// Update name and/or maximum capacity.
    ///
    /// The capacity guard sits in the UPDATE itself so a concurrent accept
    /// cannot push the member count above a freshly lowered maximum.
    pub async fn update_team(
        &self,
        id: &str,
        name: Option<&str>,
        max_capacity: Option<i64>,
    ) -> Result<Team, AppError> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            r#"UPDATE teams
               SET name = COALESCE(?, name),
                   max_capacity = COALESCE(?, max_capacity),
                   updated_at = ?
               WHERE id = ? AND current_capacity <= COALESCE(?, max_capacity)"#,
        )
        .bind(name)
        .bind(max_capacity)
        .bind(&now)
        .bind(id)
        .bind(max_capacity)
        .execute(&self.pool)
        .await?;

        let team = self
            .get_team(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Team {} not found", id)))?;

        if result.rows_affected() == 0 {
            return Err(AppError::invalid_field(
                "maxCapacity",
                format!(
                    "Team already has {} members; maxCapacity cannot go below that",
                    team.current_capacity
                ),
            ));
        }

        Ok(team)
    }

    /// Delete a team. Memberships and join requests cascade.
    pub async fn delete_team(&self, id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM teams WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Team {} not found", id)));
        }

        Ok(())
    }

    /// List the members of a team in joining order.
    pub async fn list_team_members(&self, team_id: &str) -> Result<Vec<User>, AppError> {
        let rows = sqlx::query(
            r#"SELECT u.id, u.clerk_id, u.email, u.full_name, u.role, u.created_at
               FROM team_members m
               JOIN users u ON u.id = m.user_id
               WHERE m.team_id = ?
               ORDER BY m.joined_at, u.full_name"#,
        )
        .bind(team_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(user_from_row).collect()
    }

    // ==================== JOIN REQUEST READS ====================

    /// Get a join request by ID.
    pub async fn get_join_request(&self, id: &str) -> Result<Option<JoinRequest>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM join_requests WHERE id = ?",
            JOIN_REQUEST_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(join_request_from_row).transpose()
    }

    /// Find the request a player sent to a team, if any.
    pub async fn find_join_request(
        &self,
        player_id: &str,
        team_id: &str,
    ) -> Result<Option<JoinRequest>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM join_requests WHERE player_id = ? AND team_id = ?",
            JOIN_REQUEST_COLUMNS
        ))
        .bind(player_id)
        .bind(team_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(join_request_from_row).transpose()
    }

    /// Get the detailed view of one join request.
    pub async fn get_join_request_detail(
        &self,
        id: &str,
    ) -> Result<Option<JoinRequestDetail>, AppError> {
        let row = sqlx::query(&format!("{} WHERE jr.id = ?", JOIN_REQUEST_DETAIL_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(join_request_detail_from_row).transpose()
    }

    /// Requests sent by a player, newest first.
    pub async fn list_join_requests_by_player(
        &self,
        player_id: &str,
    ) -> Result<Vec<JoinRequestDetail>, AppError> {
        let rows = sqlx::query(&format!(
            "{} WHERE jr.player_id = ? ORDER BY jr.created_at DESC",
            JOIN_REQUEST_DETAIL_SELECT
        ))
        .bind(player_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(join_request_detail_from_row).collect()
    }

    /// Requests addressed to teams in an organizer's tournaments, newest first.
    pub async fn list_join_requests_by_organizer(
        &self,
        organizer_id: &str,
    ) -> Result<Vec<JoinRequestDetail>, AppError> {
        let rows = sqlx::query(&format!(
            "{} WHERE tr.organizer_id = ? ORDER BY jr.created_at DESC",
            JOIN_REQUEST_DETAIL_SELECT
        ))
        .bind(organizer_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(join_request_detail_from_row).collect()
    }

    // ==================== PLAYER PROFILE OPERATIONS ====================

    /// Get a player's profile.
    pub async fn get_profile(&self, user_id: &str) -> Result<Option<PlayerProfile>, AppError> {
        let row = sqlx::query(
            "SELECT user_id, city, main_sport, level, preferred_position, updated_at FROM player_profiles WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(profile_from_row).transpose()
    }

    /// Create a profile; a player has at most one.
    pub async fn create_profile(
        &self,
        user_id: &str,
        request: &PlayerProfileRequest,
    ) -> Result<PlayerProfile, AppError> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            "INSERT INTO player_profiles (user_id, city, main_sport, level, preferred_position, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(request.city.trim())
        .bind(request.main_sport.trim())
        .bind(request.level.as_str())
        .bind(&request.preferred_position)
        .bind(&now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(profile_from_request(user_id, request, now)),
            Err(e) if is_unique_violation(&e) => Err(AppError::validation(
                "A profile already exists; use PUT to modify it",
            )),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace an existing profile.
    pub async fn update_profile(
        &self,
        user_id: &str,
        request: &PlayerProfileRequest,
    ) -> Result<PlayerProfile, AppError> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            "UPDATE player_profiles SET city = ?, main_sport = ?, level = ?, preferred_position = ?, updated_at = ? WHERE user_id = ?",
        )
        .bind(request.city.trim())
        .bind(request.main_sport.trim())
        .bind(request.level.as_str())
        .bind(&request.preferred_position)
        .bind(&now)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(
                "Player profile not found; create it first".to_string(),
            ));
        }

        Ok(profile_from_request(user_id, request, now))
    }
}

// Helper functions for row conversion

fn corrupt(column: &str, value: &str) -> AppError {
    AppError::Internal(format!("Unexpected value {:?} in column {}", value, column))
}

pub(crate) fn user_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<User, AppError> {
    let role: String = row.get("role");
    Ok(User {
        id: row.get("id"),
        clerk_id: row.get("clerk_id"),
        email: row.get("email"),
        full_name: row.get("full_name"),
        role: Role::parse(&role).ok_or_else(|| corrupt("role", &role))?,
        created_at: row.get("created_at"),
    })
}

fn tournament_from_row(row: &sqlx::sqlite::SqliteRow) -> Tournament {
    Tournament {
        id: row.get("id"),
        name: row.get("name"),
        sport: row.get("sport"),
        city: row.get("city"),
        start_date: row.get("start_date"),
        description: row.get("description"),
        organizer_id: row.get("organizer_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn team_from_row(row: &sqlx::sqlite::SqliteRow) -> Team {
    let max_capacity: i64 = row.get("max_capacity");
    let current_capacity: i64 = row.get("current_capacity");
    Team {
        id: row.get("id"),
        name: row.get("name"),
        tournament_id: row.get("tournament_id"),
        tournament_name: row.get("tournament_name"),
        sport: row.get("sport"),
        city: row.get("city"),
        organizer_id: row.get("organizer_id"),
        max_capacity,
        current_capacity,
        is_full: current_capacity >= max_capacity,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

pub(crate) fn join_request_from_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<JoinRequest, AppError> {
    let status: String = row.get("status");
    Ok(JoinRequest {
        id: row.get("id"),
        player_id: row.get("player_id"),
        team_id: row.get("team_id"),
        status: JoinRequestStatus::parse(&status).ok_or_else(|| corrupt("status", &status))?,
        message: row.get("message"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn join_request_detail_from_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<JoinRequestDetail, AppError> {
    let status: String = row.get("status");
    let role: String = row.get("role");
    Ok(JoinRequestDetail {
        id: row.get("id"),
        status: JoinRequestStatus::parse(&status).ok_or_else(|| corrupt("status", &status))?,
        message: row.get("message"),
        player: User {
            id: row.get("player_id"),
            clerk_id: row.get("clerk_id"),
            email: row.get("email"),
            full_name: row.get("full_name"),
            role: Role::parse(&role).ok_or_else(|| corrupt("role", &role))?,
            created_at: row.get("player_created_at"),
        },
        team: TeamSummary {
            id: row.get("team_id"),
            name: row.get("team_name"),
            current_capacity: row.get("current_capacity"),
            max_capacity: row.get("max_capacity"),
        },
        tournament: TournamentSummary {
            id: row.get("tournament_id"),
            name: row.get("tournament_name"),
            sport: row.get("sport"),
            city: row.get("city"),
        },
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn profile_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<PlayerProfile, AppError> {
    let level: String = row.get("level");
    Ok(PlayerProfile {
        user_id: row.get("user_id"),
        city: row.get("city"),
        main_sport: row.get("main_sport"),
        level: SkillLevel::parse(&level).ok_or_else(|| corrupt("level", &level))?,
        preferred_position: row.get("preferred_position"),
        updated_at: row.get("updated_at"),
    })
}

fn profile_from_request(
    user_id: &str,
    request: &PlayerProfileRequest,
    updated_at: String,
) -> PlayerProfile {
    PlayerProfile {
        user_id: user_id.to_string(),
        city: request.city.trim().to_string(),
        main_sport: request.main_sport.trim().to_string(),
        level: request.level,
        preferred_position: request.preferred_position.clone(),
        updated_at,
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off"), "50\\%\\_off");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(&Some("  Paris ".to_string())), Some("Paris".to_string()));
        assert_eq!(non_blank(&Some("   ".to_string())), None);
        assert_eq!(non_blank(&None), None);
    }
}
