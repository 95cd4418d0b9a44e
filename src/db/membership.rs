//! Transactional writes for join requests and team membership.
//!
//! These are the only statements that touch `join_requests.status`,
//! `team_members` or `teams.current_capacity`. Each plan runs in a single
//! transaction; a guard that matches zero rows rolls everything back.

use chrono::Utc;
use sqlx::Row;

use super::repository::{join_request_from_row, Repository, JOIN_REQUEST_COLUMNS};
use crate::errors::{is_unique_violation, AppError};
use crate::membership::MembershipChange;
use crate::models::{JoinRequest, JoinRequestStatus};

const RECOUNT_CAPACITY: &str = r#"UPDATE teams
       SET current_capacity = (SELECT COUNT(*) FROM team_members WHERE team_id = ?)
       WHERE id = ?"#;

impl Repository {
    /// Execute a planned membership change.
    ///
    /// Returns the request as stored afterwards, or `None` when the change
    /// deleted it.
    pub async fn apply_membership_change(
        &self,
        change: &MembershipChange,
    ) -> Result<Option<JoinRequest>, AppError> {
        match change {
            MembershipChange::Open {
                request_id,
                player_id,
                team_id,
                message,
            } => self
                .insert_join_request(request_id, player_id, team_id, message)
                .await
                .map(Some),
            MembershipChange::Admit {
                request_id,
                team_id,
                player_id,
            } => self
                .admit_member(request_id, team_id, player_id)
                .await
                .map(Some),
            MembershipChange::Decline { request_id } => {
                self.decline_join_request(request_id).await.map(Some)
            }
            MembershipChange::Withdraw { request_id } => {
                self.withdraw_join_request(request_id).await.map(|_| None)
            }
            MembershipChange::Expel { request_id } => {
                self.expel_join_request(request_id).await.map(|_| None)
            }
        }
    }

    async fn insert_join_request(
        &self,
        request_id: &str,
        player_id: &str,
        team_id: &str,
        message: &str,
    ) -> Result<JoinRequest, AppError> {
        let now = Utc::now().to_rfc3339();

        // The capacity guard and the insert are one statement
        let result = sqlx::query(
            r#"INSERT INTO join_requests (id, player_id, team_id, status, message, created_at, updated_at)
               SELECT ?, ?, ?, 'pending', ?, ?, ?
               WHERE EXISTS (SELECT 1 FROM teams WHERE id = ? AND current_capacity < max_capacity)"#,
        )
        .bind(request_id)
        .bind(player_id)
        .bind(team_id)
        .bind(message)
        .bind(&now)
        .bind(&now)
        .bind(team_id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => Err(AppError::invalid_field(
                "teamId",
                "This team is already full",
            )),
            Ok(_) => Ok(JoinRequest {
                id: request_id.to_string(),
                player_id: player_id.to_string(),
                team_id: team_id.to_string(),
                status: JoinRequestStatus::Pending,
                message: message.to_string(),
                created_at: now.clone(),
                updated_at: now,
            }),
            Err(e) if is_unique_violation(&e) => Err(AppError::invalid_field(
                "teamId",
                "You have already sent a request to this team",
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn admit_member(
        &self,
        request_id: &str,
        team_id: &str,
        player_id: &str,
    ) -> Result<JoinRequest, AppError> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        // Compare-and-swap on the counter. Being the first write, it also takes
        // the database write lock, which serializes concurrent accepts.
        let reserved = sqlx::query(
            r#"UPDATE teams
               SET current_capacity = current_capacity + 1, updated_at = ?
               WHERE id = ? AND current_capacity < max_capacity"#,
        )
        .bind(&now)
        .bind(team_id)
        .execute(&mut *tx)
        .await?;

        if reserved.rows_affected() == 0 {
            tx.rollback().await?;
            tracing::info!(request_id, team_id, "accept lost the race for the last slot");
            return Err(AppError::Conflict(
                "The team filled up while this request was being accepted; it is still pending"
                    .to_string(),
            ));
        }

        sqlx::query("INSERT OR IGNORE INTO team_members (team_id, user_id, joined_at) VALUES (?, ?, ?)")
            .bind(team_id)
            .bind(player_id)
            .bind(&now)
            .execute(&mut *tx)
            .await?;

        sqlx::query(RECOUNT_CAPACITY)
            .bind(team_id)
            .bind(team_id)
            .execute(&mut *tx)
            .await?;

        // Status goes last, once the membership is in place
        let accepted = sqlx::query(
            "UPDATE join_requests SET status = 'accepted', updated_at = ? WHERE id = ? AND status = 'pending'",
        )
        .bind(&now)
        .bind(request_id)
        .execute(&mut *tx)
        .await?;

        if accepted.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(self.stale_request(request_id).await);
        }

        let row = sqlx::query(&format!(
            "SELECT {} FROM join_requests WHERE id = ?",
            JOIN_REQUEST_COLUMNS
        ))
        .bind(request_id)
        .fetch_one(&mut *tx)
        .await?;
        let request = join_request_from_row(&row)?;

        tx.commit().await?;

        tracing::info!(request_id, team_id, player_id, "join request accepted");
        Ok(request)
    }

    async fn decline_join_request(&self, request_id: &str) -> Result<JoinRequest, AppError> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            "UPDATE join_requests SET status = 'rejected', updated_at = ? WHERE id = ? AND status = 'pending'",
        )
        .bind(&now)
        .bind(request_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.stale_request(request_id).await);
        }

        let request = self
            .get_join_request(request_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Join request {} not found", request_id)))?;

        tracing::info!(request_id, team_id = %request.team_id, "join request rejected");
        Ok(request)
    }

    async fn withdraw_join_request(&self, request_id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM join_requests WHERE id = ? AND status = 'pending'")
            .bind(request_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(self.stale_request(request_id).await);
        }

        tracing::info!(request_id, "join request cancelled");
        Ok(())
    }

    async fn expel_join_request(&self, request_id: &str) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query(
            "DELETE FROM join_requests WHERE id = ? RETURNING player_id, team_id, status",
        )
        .bind(request_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = removed else {
            tx.rollback().await?;
            return Err(AppError::NotFound(format!(
                "Join request {} not found",
                request_id
            )));
        };

        let player_id: String = row.get("player_id");
        let team_id: String = row.get("team_id");
        let status: String = row.get("status");

        let was_member = status == JoinRequestStatus::Accepted.as_str();
        if was_member {
            sqlx::query("DELETE FROM team_members WHERE team_id = ? AND user_id = ?")
                .bind(&team_id)
                .bind(&player_id)
                .execute(&mut *tx)
                .await?;

            sqlx::query(RECOUNT_CAPACITY)
                .bind(&team_id)
                .bind(&team_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        tracing::info!(
            request_id,
            team_id = %team_id,
            member_removed = was_member,
            "join request deleted by administrator"
        );
        Ok(())
    }

    /// Explain why a pending-guarded write matched nothing.
    async fn stale_request(&self, request_id: &str) -> AppError {
        match self.get_join_request(request_id).await {
            Ok(Some(request)) => AppError::validation(format!(
                "This request has already been processed (status: {})",
                request.status.as_str()
            )),
            Ok(None) => AppError::NotFound(format!("Join request {} not found", request_id)),
            Err(e) => e,
        }
    }
}
