//! Schedule repository.
//!
//! The schedule row and its recurring-day child rows are written together:
//! the compound create/update runs in one transaction so a crash can never
//! leave a recurring schedule without its weekday set.

use crate::db::connection::DbPool;
use crate::error::AppError;
use crate::models::schedule::{Schedule, ScheduleStatus};
use crate::types::{ScheduleId, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

const TABLE_NAME: &str = "schedules";
const SELECT_COLUMNS: &str = "id, user_id, title, start_date, start_time, duration_minutes, \
     starts_at, ends_at, is_recurring, is_active, status, created_at, updated_at";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ScheduleRepositoryTrait: Send + Sync {
    async fn find_by_id(&self, id: ScheduleId) -> Result<Schedule, AppError>;

    async fn find_recurring_days(&self, id: ScheduleId) -> Result<Vec<i16>, AppError>;

    /// First active schedule of `user_id` whose absolute window intersects
    /// `[starts_at, ends_at)`, skipping `exclude` when given (the schedule
    /// being rescheduled must not collide with itself).
    async fn find_active_overlapping(
        &self,
        user_id: UserId,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
        exclude: Option<ScheduleId>,
    ) -> Result<Option<Schedule>, AppError>;

    async fn create(&self, schedule: &Schedule, recurring_days: &[i16]) -> Result<(), AppError>;

    async fn update_timing(
        &self,
        schedule: &Schedule,
        recurring_days: &[i16],
    ) -> Result<(), AppError>;

    async fn set_inactive(&self, id: ScheduleId, status: ScheduleStatus) -> Result<(), AppError>;

    async fn find_owner_email(&self, user_id: UserId) -> Result<String, AppError>;

    /// Flips ended one-time schedules to expired. Returns how many changed.
    async fn expire_elapsed(&self, now: DateTime<Utc>) -> Result<u64, AppError>;
}

pub struct ScheduleRepository {
    pool: DbPool,
}

impl ScheduleRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn base_select_query() -> String {
        format!("SELECT {} FROM {}", SELECT_COLUMNS, TABLE_NAME)
    }
}

#[async_trait]
impl ScheduleRepositoryTrait for ScheduleRepository {
    async fn find_by_id(&self, id: ScheduleId) -> Result<Schedule, AppError> {
        let query = format!("{} WHERE id = $1", Self::base_select_query());
        let schedule = sqlx::query_as::<_, Schedule>(&query)
            .bind(id)
            .fetch_optional(self.pool.as_ref())
            .await?
            .ok_or_else(|| AppError::NotFound("Schedule not found".into()))?;
        Ok(schedule)
    }

    async fn find_recurring_days(&self, id: ScheduleId) -> Result<Vec<i16>, AppError> {
        let days = sqlx::query_scalar::<_, i16>(
            "SELECT day_of_week FROM schedule_recurring_days \
             WHERE schedule_id = $1 ORDER BY day_of_week ASC",
        )
        .bind(id)
        .fetch_all(self.pool.as_ref())
        .await?;
        Ok(days)
    }

    async fn find_active_overlapping(
        &self,
        user_id: UserId,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
        exclude: Option<ScheduleId>,
    ) -> Result<Option<Schedule>, AppError> {
        let query = format!(
            "{} WHERE user_id = $1 AND is_active = TRUE \
             AND starts_at < $3 AND ends_at > $2 \
             AND ($4::uuid IS NULL OR id <> $4) \
             LIMIT 1",
            Self::base_select_query()
        );
        let row = sqlx::query_as::<_, Schedule>(&query)
            .bind(user_id)
            .bind(starts_at)
            .bind(ends_at)
            .bind(exclude)
            .fetch_optional(self.pool.as_ref())
            .await?;
        Ok(row)
    }

    async fn create(&self, schedule: &Schedule, recurring_days: &[i16]) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        let query = format!(
            "INSERT INTO {} (id, user_id, title, start_date, start_time, duration_minutes, \
             starts_at, ends_at, is_recurring, is_active, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
            TABLE_NAME
        );
        sqlx::query(&query)
            .bind(schedule.id)
            .bind(schedule.user_id)
            .bind(&schedule.title)
            .bind(schedule.start_date)
            .bind(schedule.start_time)
            .bind(schedule.duration_minutes)
            .bind(schedule.starts_at)
            .bind(schedule.ends_at)
            .bind(schedule.is_recurring)
            .bind(schedule.is_active)
            .bind(schedule.status)
            .bind(schedule.created_at)
            .bind(schedule.updated_at)
            .execute(&mut *tx)
            .await?;
        for day in recurring_days {
            sqlx::query(
                "INSERT INTO schedule_recurring_days (schedule_id, day_of_week) VALUES ($1, $2)",
            )
            .bind(schedule.id)
            .bind(day)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn update_timing(
        &self,
        schedule: &Schedule,
        recurring_days: &[i16],
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        let query = format!(
            "UPDATE {} SET start_date = $2, start_time = $3, duration_minutes = $4, \
             starts_at = $5, ends_at = $6, is_recurring = $7, updated_at = $8 \
             WHERE id = $1",
            TABLE_NAME
        );
        sqlx::query(&query)
            .bind(schedule.id)
            .bind(schedule.start_date)
            .bind(schedule.start_time)
            .bind(schedule.duration_minutes)
            .bind(schedule.starts_at)
            .bind(schedule.ends_at)
            .bind(schedule.is_recurring)
            .bind(schedule.updated_at)
            .execute(&mut *tx)
            .await?;
        // Recurring days are recreated wholesale, never patched.
        sqlx::query("DELETE FROM schedule_recurring_days WHERE schedule_id = $1")
            .bind(schedule.id)
            .execute(&mut *tx)
            .await?;
        for day in recurring_days {
            sqlx::query(
                "INSERT INTO schedule_recurring_days (schedule_id, day_of_week) VALUES ($1, $2)",
            )
            .bind(schedule.id)
            .bind(day)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn set_inactive(&self, id: ScheduleId, status: ScheduleStatus) -> Result<(), AppError> {
        let query = format!(
            "UPDATE {} SET is_active = FALSE, status = $2, updated_at = NOW() WHERE id = $1",
            TABLE_NAME
        );
        sqlx::query(&query)
            .bind(id)
            .bind(status)
            .execute(self.pool.as_ref())
            .await?;
        Ok(())
    }

    async fn find_owner_email(&self, user_id: UserId) -> Result<String, AppError> {
        let email = sqlx::query_scalar::<_, String>("SELECT email FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(self.pool.as_ref())
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".into()))?;
        Ok(email)
    }

    async fn expire_elapsed(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let query = format!(
            "UPDATE {} SET is_active = FALSE, status = 'expired', updated_at = NOW() \
             WHERE is_active = TRUE AND is_recurring = FALSE AND ends_at < $1",
            TABLE_NAME
        );
        let result = sqlx::query(&query)
            .bind(now)
            .execute(self.pool.as_ref())
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_columns_include_the_absolute_window() {
        assert!(SELECT_COLUMNS.contains("starts_at"));
        assert!(SELECT_COLUMNS.contains("ends_at"));
        assert!(SELECT_COLUMNS.contains("is_recurring"));
    }
}
