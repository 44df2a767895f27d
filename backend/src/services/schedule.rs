//! Schedule mutation service.
//!
//! The surface the CRUD layer calls for create/reschedule/delete. Civil
//! input is parsed and converted here, the no-overlap invariant is enforced
//! here, and every successful mutation hands off to the notification engine.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;

use crate::error::AppError;
use crate::models::schedule::{CreateSchedulePayload, ReschedulePayload, Schedule, ScheduleStatus};
use crate::repositories::ScheduleRepositoryTrait;
use crate::services::scheduler::NotificationScheduler;
use crate::types::ScheduleId;
use crate::utils::time;

pub struct ScheduleService {
    schedules: Arc<dyn ScheduleRepositoryTrait>,
    engine: NotificationScheduler,
    time_zone: Tz,
}

struct ResolvedWindow {
    start_date: NaiveDate,
    start_time: NaiveTime,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
}

impl ScheduleService {
    pub fn new(
        schedules: Arc<dyn ScheduleRepositoryTrait>,
        engine: NotificationScheduler,
        time_zone: Tz,
    ) -> Self {
        Self {
            schedules,
            engine,
            time_zone,
        }
    }

    pub async fn create_schedule(
        &self,
        payload: CreateSchedulePayload,
    ) -> Result<Schedule, AppError> {
        let window = self.resolve_window(
            &payload.start_date,
            &payload.start_time,
            payload.duration_minutes,
        )?;
        let recurring_days = normalize_recurring_days(payload.is_recurring, &payload.recurring_days)?;

        if let Some(existing) = self
            .schedules
            .find_active_overlapping(payload.user_id, window.starts_at, window.ends_at, None)
            .await?
        {
            return Err(AppError::Conflict(format!(
                "schedule overlaps active schedule '{}'",
                existing.title
            )));
        }

        let schedule = Schedule::new(
            payload.user_id,
            payload.title,
            window.start_date,
            window.start_time,
            payload.duration_minutes,
            window.starts_at,
            window.ends_at,
            payload.is_recurring,
        );
        self.schedules.create(&schedule, &recurring_days).await?;
        self.engine.schedule_notifications(schedule.id).await?;
        tracing::info!(schedule_id = %schedule.id, user_id = %schedule.user_id, "schedule created");
        Ok(schedule)
    }

    pub async fn reschedule(
        &self,
        schedule_id: ScheduleId,
        payload: ReschedulePayload,
    ) -> Result<Schedule, AppError> {
        let mut schedule = self.schedules.find_by_id(schedule_id).await?;
        let window = self.resolve_window(
            &payload.start_date,
            &payload.start_time,
            payload.duration_minutes,
        )?;
        let recurring_days =
            normalize_recurring_days(schedule.is_recurring, &payload.recurring_days)?;

        if let Some(existing) = self
            .schedules
            .find_active_overlapping(
                schedule.user_id,
                window.starts_at,
                window.ends_at,
                Some(schedule_id),
            )
            .await?
        {
            return Err(AppError::Conflict(format!(
                "schedule overlaps active schedule '{}'",
                existing.title
            )));
        }

        schedule.start_date = window.start_date;
        schedule.start_time = window.start_time;
        schedule.duration_minutes = payload.duration_minutes;
        schedule.starts_at = window.starts_at;
        schedule.ends_at = window.ends_at;
        schedule.updated_at = Utc::now();

        self.schedules.update_timing(&schedule, &recurring_days).await?;
        self.engine.update_schedule(schedule_id).await?;
        tracing::info!(%schedule_id, "schedule timing updated");
        Ok(schedule)
    }

    /// Soft delete: the row survives as history, the reminders do not.
    pub async fn remove_schedule(&self, schedule_id: ScheduleId) -> Result<(), AppError> {
        self.schedules
            .set_inactive(schedule_id, ScheduleStatus::Cancelled)
            .await?;
        self.engine.cancel_notifications(schedule_id).await?;
        tracing::info!(%schedule_id, "schedule cancelled");
        Ok(())
    }

    fn resolve_window(
        &self,
        start_date: &str,
        start_time: &str,
        duration_minutes: i32,
    ) -> Result<ResolvedWindow, AppError> {
        if duration_minutes <= 0 {
            return Err(AppError::BadRequest(
                "duration must be a positive number of minutes".into(),
            ));
        }
        let start_date = time::parse_civil_date(start_date)?;
        let start_time = time::parse_civil_time(start_time)?;
        let starts_at = time::to_absolute(start_date, start_time, &self.time_zone)?;
        let ends_at = time::add_minutes(starts_at, duration_minutes as i64);
        Ok(ResolvedWindow {
            start_date,
            start_time,
            starts_at,
            ends_at,
        })
    }
}

fn normalize_recurring_days(is_recurring: bool, days: &[i16]) -> Result<Vec<i16>, AppError> {
    if !is_recurring {
        return Ok(Vec::new());
    }
    if days.is_empty() {
        return Err(AppError::BadRequest(
            "a recurring schedule needs at least one weekday".into(),
        ));
    }
    let mut normalized: Vec<i16> = Vec::new();
    for &day in days {
        if !(0..=6).contains(&day) {
            return Err(AppError::BadRequest(format!(
                "weekday out of range (0-6): {}",
                day
            )));
        }
        if !normalized.contains(&day) {
            normalized.push(day);
        }
    }
    normalized.sort_unstable();
    Ok(normalized)
}
