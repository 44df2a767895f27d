use crate::types::{ScheduleId, UserId};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Scheduled,
    Completed,
    Expired,
    Cancelled,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Scheduled => "scheduled",
            ScheduleStatus::Completed => "completed",
            ScheduleStatus::Expired => "expired",
            ScheduleStatus::Cancelled => "cancelled",
        }
    }
}

impl Default for ScheduleStatus {
    fn default() -> Self {
        ScheduleStatus::Scheduled
    }
}

/// A user's planned study block.
///
/// `start_date`/`start_time` hold the civil values as entered; `starts_at`/
/// `ends_at` are the computed absolute window all scheduling math runs on.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Schedule {
    pub id: ScheduleId,
    pub user_id: UserId,
    pub title: String,
    pub start_date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_minutes: i32,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub is_recurring: bool,
    pub is_active: bool,
    pub status: ScheduleStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Schedule {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: UserId,
        title: String,
        start_date: NaiveDate,
        start_time: NaiveTime,
        duration_minutes: i32,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
        is_recurring: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ScheduleId::new(),
            user_id,
            title,
            start_date,
            start_time,
            duration_minutes,
            starts_at,
            ends_at,
            is_recurring,
            is_active: true,
            status: ScheduleStatus::Scheduled,
            created_at: now,
            updated_at: now,
        }
    }

    /// Half-open interval intersection on the absolute window.
    pub fn overlaps(&self, starts_at: DateTime<Utc>, ends_at: DateTime<Utc>) -> bool {
        self.starts_at < ends_at && starts_at < self.ends_at
    }
}

/// Payload for creating a schedule. Date and time arrive as civil strings and
/// are parsed against the configured zone before anything else happens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSchedulePayload {
    pub user_id: UserId,
    pub title: String,
    pub start_date: String,
    pub start_time: String,
    pub duration_minutes: i32,
    #[serde(default)]
    pub is_recurring: bool,
    #[serde(default)]
    pub recurring_days: Vec<i16>,
}

/// Payload for changing a schedule's timing fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReschedulePayload {
    pub start_date: String,
    pub start_time: String,
    pub duration_minutes: i32,
    #[serde(default)]
    pub recurring_days: Vec<i16>,
}
