//! Scheduled notification repository.
//!
//! Row-level operations over the durable reminder table. The engine's
//! recovery routine is the only consumer of `find_pending_future`.

use crate::db::connection::DbPool;
use crate::error::AppError;
use crate::models::notification::ScheduledNotification;
use crate::types::{NotificationId, ScheduleId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

const TABLE_NAME: &str = "scheduled_notifications";
const SELECT_COLUMNS: &str = "id, schedule_id, minutes_before, scheduled_for, is_executed, \
     job_token, is_recurring, recurring_day_of_week, created_at, updated_at";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationRepositoryTrait: Send + Sync {
    async fn create(&self, notification: &ScheduledNotification) -> Result<(), AppError>;

    /// All rows that are still pending and whose fire instant is after `now`.
    async fn find_pending_future(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScheduledNotification>, AppError>;

    async fn find_pending_for_schedule(
        &self,
        schedule_id: ScheduleId,
    ) -> Result<Vec<ScheduledNotification>, AppError>;

    /// Flips a pending row to executed. A row that is already gone or already
    /// executed (a fire racing a cancellation) is a no-op, not an error.
    async fn mark_executed(&self, id: NotificationId) -> Result<(), AppError>;

    /// Deletes rows that are still pending; executed rows stay as history.
    async fn delete_pending_for_schedule(&self, schedule_id: ScheduleId) -> Result<u64, AppError>;

    /// Prunes executed history older than `cutoff`.
    async fn delete_executed_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError>;
}

pub struct NotificationRepository {
    pool: DbPool,
}

impl NotificationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationRepositoryTrait for NotificationRepository {
    async fn create(&self, notification: &ScheduledNotification) -> Result<(), AppError> {
        let query = format!(
            "INSERT INTO {} (id, schedule_id, minutes_before, scheduled_for, is_executed, \
             job_token, is_recurring, recurring_day_of_week, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            TABLE_NAME
        );
        sqlx::query(&query)
            .bind(notification.id)
            .bind(notification.schedule_id)
            .bind(notification.minutes_before)
            .bind(notification.scheduled_for)
            .bind(notification.is_executed)
            .bind(notification.job_token)
            .bind(notification.is_recurring)
            .bind(notification.recurring_day_of_week)
            .bind(notification.created_at)
            .bind(notification.updated_at)
            .execute(self.pool.as_ref())
            .await?;
        Ok(())
    }

    async fn find_pending_future(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScheduledNotification>, AppError> {
        let query = format!(
            "SELECT {} FROM {} WHERE is_executed = FALSE AND scheduled_for > $1 \
             ORDER BY scheduled_for ASC",
            SELECT_COLUMNS, TABLE_NAME
        );
        let rows = sqlx::query_as::<_, ScheduledNotification>(&query)
            .bind(now)
            .fetch_all(self.pool.as_ref())
            .await?;
        Ok(rows)
    }

    async fn find_pending_for_schedule(
        &self,
        schedule_id: ScheduleId,
    ) -> Result<Vec<ScheduledNotification>, AppError> {
        let query = format!(
            "SELECT {} FROM {} WHERE schedule_id = $1 AND is_executed = FALSE \
             ORDER BY scheduled_for ASC",
            SELECT_COLUMNS, TABLE_NAME
        );
        let rows = sqlx::query_as::<_, ScheduledNotification>(&query)
            .bind(schedule_id)
            .fetch_all(self.pool.as_ref())
            .await?;
        Ok(rows)
    }

    async fn mark_executed(&self, id: NotificationId) -> Result<(), AppError> {
        let query = format!(
            "UPDATE {} SET is_executed = TRUE, updated_at = NOW() \
             WHERE id = $1 AND is_executed = FALSE",
            TABLE_NAME
        );
        sqlx::query(&query)
            .bind(id)
            .execute(self.pool.as_ref())
            .await?;
        Ok(())
    }

    async fn delete_pending_for_schedule(&self, schedule_id: ScheduleId) -> Result<u64, AppError> {
        let query = format!(
            "DELETE FROM {} WHERE schedule_id = $1 AND is_executed = FALSE",
            TABLE_NAME
        );
        let result = sqlx::query(&query)
            .bind(schedule_id)
            .execute(self.pool.as_ref())
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_executed_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let query = format!(
            "DELETE FROM {} WHERE is_executed = TRUE AND scheduled_for < $1",
            TABLE_NAME
        );
        let result = sqlx::query(&query)
            .bind(cutoff)
            .execute(self.pool.as_ref())
            .await?;
        Ok(result.rows_affected())
    }
}
