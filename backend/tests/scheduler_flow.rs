//! End-to-end engine flow against a real store: arm, cancel, recreate, and
//! restart recovery. Timers here are armed far in the future; the unit tests
//! in `services::scheduler` cover actual firing with a paused clock.

use chrono::{Duration, Utc};
use chrono_tz::Asia::Tokyo;
use std::sync::{Arc, OnceLock};
use studyplanner_backend::{
    error::AppError,
    repositories::{
        NotificationRepository, NotificationRepositoryTrait, ScheduleRepository,
        ScheduleRepositoryTrait,
    },
    services::{NotificationScheduler, ReminderDispatcher, TimerRegistry},
};
use tokio::sync::Mutex;

#[path = "support/mod.rs"]
mod support;

async fn integration_guard() -> tokio::sync::MutexGuard<'static, ()> {
    static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
    GUARD.get_or_init(|| Mutex::new(())).lock().await
}

struct NoopDispatcher;

impl ReminderDispatcher for NoopDispatcher {
    fn send_reminder(
        &self,
        _recipient: &str,
        _schedule_title: &str,
        _minutes_before: i64,
        _start_time_formatted: &str,
        _duration_minutes: i64,
    ) -> Result<(), AppError> {
        Ok(())
    }
}

fn build_engine(pool: &sqlx::PgPool) -> NotificationScheduler {
    let db = Arc::new(pool.clone());
    NotificationScheduler::new(
        Arc::new(ScheduleRepository::new(db.clone())),
        Arc::new(NotificationRepository::new(db)),
        Arc::new(NoopDispatcher),
        TimerRegistry::new(),
        Tokyo,
        vec![30, 5],
    )
}

#[tokio::test]
async fn arm_cancel_recreate_against_real_store() {
    let _guard = integration_guard().await;
    let pool = support::test_pool().await;
    support::reset_tables(&pool).await;

    let (user_id, _email) = support::seed_user(&pool).await;
    let schedule = support::make_schedule(user_id, Utc::now() + Duration::days(1), 60, false);
    ScheduleRepository::new(Arc::new(pool.clone()))
        .create(&schedule, &[])
        .await
        .expect("create schedule");

    let engine = build_engine(&pool);
    let notifications = NotificationRepository::new(Arc::new(pool.clone()));

    engine
        .schedule_notifications(schedule.id)
        .await
        .expect("arm schedule");
    let pending = notifications
        .find_pending_for_schedule(schedule.id)
        .await
        .expect("pending rows");
    assert_eq!(pending.len(), 2);
    assert_eq!(engine.armed_timer_count(schedule.id), 2);
    assert_eq!(
        pending[0].scheduled_for,
        schedule.starts_at - Duration::minutes(30)
    );
    assert_eq!(
        pending[1].scheduled_for,
        schedule.starts_at - Duration::minutes(5)
    );

    // Re-arming replaces, never accumulates.
    engine
        .schedule_notifications(schedule.id)
        .await
        .expect("re-arm schedule");
    assert_eq!(engine.armed_timer_count(schedule.id), 2);
    assert_eq!(
        notifications
            .find_pending_for_schedule(schedule.id)
            .await
            .expect("pending after re-arm")
            .len(),
        2
    );

    // Cancel then recreate leaves a fresh, equivalent set.
    engine
        .cancel_notifications(schedule.id)
        .await
        .expect("cancel schedule");
    assert_eq!(engine.armed_timer_count(schedule.id), 0);
    assert!(notifications
        .find_pending_for_schedule(schedule.id)
        .await
        .expect("pending after cancel")
        .is_empty());

    engine
        .schedule_notifications(schedule.id)
        .await
        .expect("recreate schedule");
    let recreated = notifications
        .find_pending_for_schedule(schedule.id)
        .await
        .expect("pending after recreate");
    assert_eq!(
        recreated
            .iter()
            .map(|n| (n.minutes_before, n.scheduled_for))
            .collect::<Vec<_>>(),
        pending
            .iter()
            .map(|n| (n.minutes_before, n.scheduled_for))
            .collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn recurring_cancel_leaves_no_pending_rows() {
    let _guard = integration_guard().await;
    let pool = support::test_pool().await;
    support::reset_tables(&pool).await;

    let (user_id, _email) = support::seed_user(&pool).await;
    let schedule = support::make_schedule(user_id, Utc::now() + Duration::days(1), 60, true);
    ScheduleRepository::new(Arc::new(pool.clone()))
        .create(&schedule, &[1])
        .await
        .expect("create recurring schedule");

    let engine = build_engine(&pool);
    let notifications = NotificationRepository::new(Arc::new(pool.clone()));

    engine
        .schedule_notifications(schedule.id)
        .await
        .expect("arm recurring schedule");
    let pending = notifications
        .find_pending_for_schedule(schedule.id)
        .await
        .expect("pending rows");
    assert_eq!(pending.len(), 2);
    assert!(pending.iter().all(|n| n.recurring_day_of_week == Some(1)));

    engine
        .cancel_notifications(schedule.id)
        .await
        .expect("cancel recurring schedule");
    assert!(notifications
        .find_pending_for_schedule(schedule.id)
        .await
        .expect("pending after cancel")
        .is_empty());
    assert_eq!(engine.armed_timer_count(schedule.id), 0);
}

#[tokio::test]
async fn restart_recovery_rebuilds_the_timer_set() {
    let _guard = integration_guard().await;
    let pool = support::test_pool().await;
    support::reset_tables(&pool).await;

    let (user_id, _email) = support::seed_user(&pool).await;
    let schedule = support::make_schedule(user_id, Utc::now() + Duration::days(1), 60, false);
    ScheduleRepository::new(Arc::new(pool.clone()))
        .create(&schedule, &[])
        .await
        .expect("create schedule");

    // First process arms and then "crashes" (its registry is simply dropped).
    let first = build_engine(&pool);
    first
        .schedule_notifications(schedule.id)
        .await
        .expect("arm in first process");
    first.shutdown();

    // Second process starts with an empty registry and recovers from rows.
    let second = build_engine(&pool);
    assert_eq!(second.armed_timer_count(schedule.id), 0);
    second.init().await.expect("recover");
    assert_eq!(second.armed_timer_count(schedule.id), 2);

    let notifications = NotificationRepository::new(Arc::new(pool.clone()));
    let pending = notifications
        .find_pending_for_schedule(schedule.id)
        .await
        .expect("pending after recovery");
    assert_eq!(pending.len(), 2);
    // Recovery recomputes from the schedule definition, so instants match it.
    assert_eq!(
        pending[0].scheduled_for,
        schedule.starts_at - Duration::minutes(30)
    );

    // A second recovery pass (e.g. a manual re-run) changes nothing.
    second
        .recover_pending_notifications()
        .await
        .expect("recover again");
    assert_eq!(second.armed_timer_count(schedule.id), 2);
}

#[tokio::test]
async fn recovery_ignores_cancelled_schedules() {
    let _guard = integration_guard().await;
    let pool = support::test_pool().await;
    support::reset_tables(&pool).await;

    let (user_id, _email) = support::seed_user(&pool).await;
    let schedule = support::make_schedule(user_id, Utc::now() + Duration::days(1), 60, false);
    let repo = ScheduleRepository::new(Arc::new(pool.clone()));
    repo.create(&schedule, &[]).await.expect("create schedule");

    let first = build_engine(&pool);
    first
        .schedule_notifications(schedule.id)
        .await
        .expect("arm in first process");
    first.shutdown();

    // The schedule is soft-deleted while the process is down.
    repo.set_inactive(
        schedule.id,
        studyplanner_backend::models::schedule::ScheduleStatus::Cancelled,
    )
    .await
    .expect("cancel schedule");

    let second = build_engine(&pool);
    second.init().await.expect("recover");
    assert_eq!(second.armed_timer_count(schedule.id), 0);
}
