//! Notification scheduling engine.
//!
//! Owns the lifecycle of every reminder: computes fire instants from a
//! schedule definition (pure planning), persists one pending row per planned
//! occurrence, arms one in-memory timer per row, and rebuilds the whole timer
//! set from the store after a restart. The in-memory disarm always completes
//! synchronously before any persistence write of a new plan begins, and all
//! mutating entry points serialize on one internal lock, so two overlapping
//! reschedules can never both leave live timers behind.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use tokio::sync::Mutex;

use crate::error::AppError;
use crate::models::notification::ScheduledNotification;
use crate::models::schedule::{Schedule, ScheduleStatus};
use crate::repositories::{NotificationRepositoryTrait, ScheduleRepositoryTrait};
use crate::services::timer_registry::{TimerHandle, TimerRegistry};
use crate::types::ScheduleId;
use crate::utils::time;

/// Fire-and-forget reminder delivery. Implementations must not retry; the
/// engine guarantees at most one attempt per computed instant.
#[cfg_attr(test, mockall::automock)]
pub trait ReminderDispatcher: Send + Sync {
    fn send_reminder(
        &self,
        recipient: &str,
        schedule_title: &str,
        minutes_before: i64,
        start_time_formatted: &str,
        duration_minutes: i64,
    ) -> Result<(), AppError>;
}

/// One planned reminder occurrence, before persistence or arming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedReminder {
    pub minutes_before: i64,
    pub fire_at: DateTime<Utc>,
    pub recurring_day: Option<i16>,
}

/// Computes the reminder plan for one schedule. Pure: no I/O, no clock reads.
///
/// One-time schedules yield `starts_at - offset` per offset; instants at or
/// before `now` are dropped rather than fired late, so a recovery run after
/// long downtime never spams past-due reminders. Recurring schedules yield,
/// per (weekday, offset), the next weekly fire instant strictly after `now`.
pub fn plan_reminders(
    schedule: &Schedule,
    recurring_days: &[i16],
    offsets: &[i64],
    now: DateTime<Utc>,
    tz: &Tz,
) -> Vec<PlannedReminder> {
    let mut plan = Vec::new();
    if schedule.is_recurring {
        for &day in recurring_days {
            if !(0..=6).contains(&day) {
                continue;
            }
            for &offset in offsets {
                if let Some(fire_at) = next_recurring_fire(schedule, day, offset, now, tz) {
                    plan.push(PlannedReminder {
                        minutes_before: offset,
                        fire_at,
                        recurring_day: Some(day),
                    });
                }
            }
        }
    } else {
        for &offset in offsets {
            let fire_at = time::add_minutes(schedule.starts_at, -offset);
            if fire_at <= now {
                continue;
            }
            plan.push(PlannedReminder {
                minutes_before: offset,
                fire_at,
                recurring_day: None,
            });
        }
    }
    plan
}

fn next_recurring_fire(
    schedule: &Schedule,
    day: i16,
    offset: i64,
    now: DateTime<Utc>,
    tz: &Tz,
) -> Option<DateTime<Utc>> {
    let today = now.with_timezone(tz).date_naive();
    let mut date = time::align_weekday_on_or_after(today, day as u32);
    // This week's occurrence may already be past; at most two steps are ever
    // needed, the extra iterations absorb zone-transition rejects.
    for _ in 0..4 {
        if let Ok(start) = time::to_absolute(date, schedule.start_time, tz) {
            let fire_at = time::add_minutes(start, -offset);
            if fire_at > now {
                return Some(fire_at);
            }
        }
        date += Duration::days(7);
    }
    None
}

struct ReminderContext {
    recipient: String,
    title: String,
    duration_minutes: i64,
}

struct SchedulerInner {
    schedules: Arc<dyn ScheduleRepositoryTrait>,
    notifications: Arc<dyn NotificationRepositoryTrait>,
    dispatcher: Arc<dyn ReminderDispatcher>,
    registry: TimerRegistry,
    time_zone: Tz,
    reminder_offsets: Vec<i64>,
    reschedule_lock: Mutex<()>,
    recovered: AtomicBool,
}

#[derive(Clone)]
pub struct NotificationScheduler {
    inner: Arc<SchedulerInner>,
}

impl NotificationScheduler {
    pub fn new(
        schedules: Arc<dyn ScheduleRepositoryTrait>,
        notifications: Arc<dyn NotificationRepositoryTrait>,
        dispatcher: Arc<dyn ReminderDispatcher>,
        registry: TimerRegistry,
        time_zone: Tz,
        reminder_offsets: Vec<i64>,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                schedules,
                notifications,
                dispatcher,
                registry,
                time_zone,
                reminder_offsets,
                reschedule_lock: Mutex::new(()),
                recovered: AtomicBool::new(false),
            }),
        }
    }

    /// Process bootstrap hook: runs recovery exactly once per process.
    pub async fn init(&self) -> Result<(), AppError> {
        if self.inner.recovered.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.recover_pending_notifications().await
    }

    /// Idempotently (re)computes and arms all reminders for one schedule.
    pub async fn schedule_notifications(&self, schedule_id: ScheduleId) -> Result<(), AppError> {
        let _guard = self.inner.reschedule_lock.lock().await;
        self.disarm(schedule_id).await?;
        self.arm(schedule_id).await
    }

    /// Stops every armed timer for the schedule and deletes its pending rows.
    /// Executed rows are retained as history.
    pub async fn cancel_notifications(&self, schedule_id: ScheduleId) -> Result<(), AppError> {
        let _guard = self.inner.reschedule_lock.lock().await;
        self.disarm(schedule_id).await
    }

    /// Convenience composition used whenever timing fields change.
    pub async fn update_schedule(&self, schedule_id: ScheduleId) -> Result<(), AppError> {
        self.cancel_notifications(schedule_id).await?;
        self.schedule_notifications(schedule_id).await
    }

    /// Called when a session tied to a one-time schedule ends or expires.
    /// Recurring schedules are left untouched.
    pub async fn mark_schedule_complete(&self, schedule_id: ScheduleId) -> Result<(), AppError> {
        let schedule = match self.inner.schedules.find_by_id(schedule_id).await {
            Ok(schedule) => schedule,
            Err(err) if err.is_not_found() => return Ok(()),
            Err(err) => return Err(err),
        };
        if schedule.is_recurring {
            return Ok(());
        }
        self.inner
            .schedules
            .set_inactive(schedule_id, ScheduleStatus::Completed)
            .await?;
        self.cancel_notifications(schedule_id).await
    }

    /// Rebuilds the timer set from the store after a restart.
    ///
    /// Deliberately coarse: the pending-future scan only tells us *which*
    /// schedules need re-arming; fire instants are recomputed from the current
    /// schedule definition, not replayed from the stale rows. Schedules whose
    /// whole reminder window elapsed during downtime get nothing.
    pub async fn recover_pending_notifications(&self) -> Result<(), AppError> {
        let pending = self.inner.notifications.find_pending_future(Utc::now()).await?;
        let mut seen = HashSet::new();
        let mut recovered = 0usize;
        for notification in &pending {
            if !seen.insert(notification.schedule_id) {
                continue;
            }
            let schedule = match self.inner.schedules.find_by_id(notification.schedule_id).await {
                Ok(schedule) => schedule,
                Err(err) if err.is_not_found() => continue,
                Err(err) => return Err(err),
            };
            if !schedule.is_active {
                continue;
            }
            if let Err(err) = self.schedule_notifications(schedule.id).await {
                tracing::error!(schedule_id = %schedule.id, error = %err, "recovery failed for schedule");
                continue;
            }
            recovered += 1;
        }
        tracing::info!(
            pending_rows = pending.len(),
            schedules = recovered,
            "recovered pending notifications"
        );
        Ok(())
    }

    /// Process shutdown hook. No persistence side effects: the armed set is
    /// store-derived and will be rebuilt by the next recovery run.
    pub fn shutdown(&self) {
        let stopped = self.inner.registry.cancel_all_global();
        tracing::info!(stopped, "notification timers stopped");
    }

    pub fn armed_timer_count(&self, schedule_id: ScheduleId) -> usize {
        self.inner.registry.handle_count(schedule_id)
    }

    pub fn armed_schedule_count(&self) -> usize {
        self.inner.registry.schedule_count()
    }

    /// Phase one of a reschedule. The registry abort happens synchronously,
    /// before the row delete is awaited, so no stale timer can fire once this
    /// returns.
    async fn disarm(&self, schedule_id: ScheduleId) -> Result<(), AppError> {
        let stopped = self.inner.registry.cancel_all(schedule_id);
        if stopped > 0 {
            tracing::debug!(%schedule_id, stopped, "stopped armed timers");
        }
        self.inner
            .notifications
            .delete_pending_for_schedule(schedule_id)
            .await?;
        Ok(())
    }

    /// Phase two: plan (pure), persist, then arm. Missing or inactive
    /// schedules are a silent no-op.
    async fn arm(&self, schedule_id: ScheduleId) -> Result<(), AppError> {
        let schedule = match self.inner.schedules.find_by_id(schedule_id).await {
            Ok(schedule) => schedule,
            Err(err) if err.is_not_found() => {
                tracing::debug!(%schedule_id, "schedule missing, nothing to arm");
                return Ok(());
            }
            Err(err) => return Err(err),
        };
        if !schedule.is_active {
            return Ok(());
        }

        let recurring_days = if schedule.is_recurring {
            self.inner.schedules.find_recurring_days(schedule_id).await?
        } else {
            Vec::new()
        };
        let recipient = self.inner.schedules.find_owner_email(schedule.user_id).await?;

        let plan = plan_reminders(
            &schedule,
            &recurring_days,
            &self.inner.reminder_offsets,
            Utc::now(),
            &self.inner.time_zone,
        );
        for planned in plan {
            let notification = ScheduledNotification::new(
                schedule_id,
                planned.minutes_before as i32,
                planned.fire_at,
                planned.recurring_day,
            );
            self.inner.notifications.create(&notification).await?;
            self.spawn_timer(&schedule, &recipient, notification);
        }
        tracing::debug!(
            %schedule_id,
            armed = self.inner.registry.handle_count(schedule_id),
            "reminders armed"
        );
        Ok(())
    }

    fn spawn_timer(&self, schedule: &Schedule, recipient: &str, notification: ScheduledNotification) {
        let inner = Arc::clone(&self.inner);
        let schedule_id = schedule.id;
        let job_token = notification.job_token;
        let minutes_before = notification.minutes_before as i64;
        let recurring_day = notification.recurring_day_of_week;
        let ctx = ReminderContext {
            recipient: recipient.to_string(),
            title: schedule.title.clone(),
            duration_minutes: schedule.duration_minutes as i64,
        };
        let task = tokio::spawn(async move {
            if notification.is_recurring {
                inner.run_recurring_timer(ctx, notification).await;
            } else {
                inner.run_one_shot_timer(ctx, notification).await;
            }
        });
        self.inner.registry.register(
            schedule_id,
            TimerHandle::new(job_token, minutes_before, recurring_day, task.abort_handle()),
        );
    }
}

impl SchedulerInner {
    async fn run_one_shot_timer(&self, ctx: ReminderContext, notification: ScheduledNotification) {
        sleep_until_instant(notification.scheduled_for).await;
        self.fire(&ctx, &notification).await;
        self.registry
            .remove(notification.schedule_id, notification.job_token);
    }

    async fn run_recurring_timer(&self, ctx: ReminderContext, mut notification: ScheduledNotification) {
        loop {
            sleep_until_instant(notification.scheduled_for).await;
            self.fire(&ctx, &notification).await;
            // Queue next week's occurrence so recovery always sees a pending row.
            let next = notification.next_occurrence();
            if let Err(err) = self.notifications.create(&next).await {
                tracing::error!(
                    schedule_id = %notification.schedule_id,
                    error = %err,
                    "could not persist next recurring occurrence, timer stops"
                );
                self.registry
                    .remove(notification.schedule_id, notification.job_token);
                return;
            }
            notification = next;
        }
    }

    /// Per-timer fire callback. Everything in here is contained: one bad
    /// reminder must never prevent others from firing.
    async fn fire(&self, ctx: &ReminderContext, notification: &ScheduledNotification) {
        let session_start = time::add_minutes(
            notification.scheduled_for,
            notification.minutes_before as i64,
        );
        let start_formatted = time::format_in_zone(session_start, &self.time_zone);
        match self.dispatcher.send_reminder(
            &ctx.recipient,
            &ctx.title,
            notification.minutes_before as i64,
            &start_formatted,
            ctx.duration_minutes,
        ) {
            Ok(()) => {
                if let Err(err) = self.notifications.mark_executed(notification.id).await {
                    tracing::error!(
                        schedule_id = %notification.schedule_id,
                        error = %err,
                        "reminder sent but row could not be marked executed"
                    );
                }
            }
            Err(err) => {
                tracing::error!(
                    schedule_id = %notification.schedule_id,
                    minutes_before = notification.minutes_before,
                    error = %err,
                    "reminder dispatch failed"
                );
            }
        }
    }
}

async fn sleep_until_instant(fire_at: DateTime<Utc>) {
    // A negative remainder means the instant just passed; fire immediately.
    let delay = (fire_at - Utc::now()).to_std().unwrap_or_default();
    tokio::time::sleep(delay).await;
}
