//! Live session check-in coordinator.
//!
//! Once a study session starts, a ticking task nudges the user over their
//! live channel at a randomized cadence. The cadence is rolled once at
//! session start, not per tick. This runs independently of the notification
//! engine and never touches the persistent store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::task::AbortHandle;

use crate::services::channel::{ChannelEvent, ChannelRegistryTrait};
use crate::types::{SessionId, UserId};

const BASE_INTERVAL_MINUTES: f64 = 5.0;
const BASE_DURATION_MINUTES: f64 = 30.0;
const MIN_INTERVAL_MINUTES: f64 = 3.0;
const MAX_INTERVAL_MINUTES: f64 = 15.0;
const JITTER_RATIO: f64 = 0.3;

/// Computes the check-in cadence for a session of the given length.
///
/// Base 5 minutes scaled by `duration/30`, clamped to [3, 15] minutes, then
/// stretched by a ±30% factor. `jitter` is uniform in [0, 1) and must be
/// rolled exactly once per session.
pub fn check_in_interval(duration_minutes: i64, jitter: f64) -> Duration {
    let scaled = BASE_INTERVAL_MINUTES * duration_minutes as f64 / BASE_DURATION_MINUTES;
    let clamped = scaled.clamp(MIN_INTERVAL_MINUTES, MAX_INTERVAL_MINUTES);
    let factor = 1.0 - JITTER_RATIO + jitter * 2.0 * JITTER_RATIO;
    Duration::from_secs_f64(clamped * factor * 60.0)
}

struct LiveSession {
    session_id: SessionId,
    interval: Duration,
    last_check_in: Option<DateTime<Utc>>,
    remaining: u32,
    abort: AbortHandle,
}

struct CheckInInner {
    channels: Arc<dyn ChannelRegistryTrait>,
    sessions: Mutex<HashMap<UserId, LiveSession>>,
}

impl CheckInInner {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<UserId, LiveSession>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Clone)]
pub struct CheckInCoordinator {
    inner: Arc<CheckInInner>,
}

impl CheckInCoordinator {
    pub fn new(channels: Arc<dyn ChannelRegistryTrait>) -> Self {
        Self {
            inner: Arc::new(CheckInInner {
                channels,
                sessions: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Starts the check-in cadence for a freshly started session, replacing
    /// any previous session the user still had.
    pub fn start_session(&self, user_id: UserId, session_id: SessionId, duration_minutes: i64) {
        let jitter = rand::thread_rng().gen::<f64>();
        self.start_session_with_jitter(user_id, session_id, duration_minutes, jitter);
    }

    fn start_session_with_jitter(
        &self,
        user_id: UserId,
        session_id: SessionId,
        duration_minutes: i64,
        jitter: f64,
    ) {
        self.end_session(user_id);

        let interval = check_in_interval(duration_minutes, jitter);
        let remaining =
            (((duration_minutes * 60) as f64 / interval.as_secs_f64()).floor() as u32).max(1);

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            inner.run_ticker(user_id, interval).await;
        });

        self.inner.lock().insert(
            user_id,
            LiveSession {
                session_id,
                interval,
                last_check_in: None,
                remaining,
                abort: task.abort_handle(),
            },
        );
        tracing::debug!(
            %user_id,
            %session_id,
            interval_secs = interval.as_secs(),
            check_ins = remaining,
            "check-in cadence started"
        );
    }

    /// Stops the cadence and drops the session state.
    pub fn end_session(&self, user_id: UserId) {
        if let Some(session) = self.inner.lock().remove(&user_id) {
            session.abort.abort();
            tracing::debug!(%user_id, session_id = %session.session_id, "check-in cadence stopped");
        }
    }

    pub fn is_active(&self, user_id: UserId) -> bool {
        self.inner.lock().contains_key(&user_id)
    }

    pub fn active_session_count(&self) -> usize {
        self.inner.lock().len()
    }

    /// Remaining tick count for a live session, if any.
    pub fn remaining_check_ins(&self, user_id: UserId) -> Option<u32> {
        self.inner.lock().get(&user_id).map(|s| s.remaining)
    }

    /// The cadence rolled for a live session at its start.
    pub fn interval_for(&self, user_id: UserId) -> Option<Duration> {
        self.inner.lock().get(&user_id).map(|s| s.interval)
    }

    pub fn last_check_in(&self, user_id: UserId) -> Option<DateTime<Utc>> {
        self.inner.lock().get(&user_id).and_then(|s| s.last_check_in)
    }
}

impl CheckInInner {
    async fn run_ticker(self: Arc<Self>, user_id: UserId, interval: Duration) {
        loop {
            tokio::time::sleep(interval).await;

            if !self.channels.is_connected(user_id) {
                tracing::debug!(%user_id, "live channel gone, stopping check-ins");
                self.lock().remove(&user_id);
                return;
            }

            let event = ChannelEvent::check_in("Still studying? Check in to keep your session on track.");
            if let Err(err) = self.channels.send(user_id, event) {
                // Not retried; the next tick gets its own chance.
                tracing::warn!(%user_id, error = %err, "check-in delivery failed");
            }

            let mut sessions = self.lock();
            match sessions.get_mut(&user_id) {
                Some(session) => {
                    session.last_check_in = Some(Utc::now());
                    session.remaining = session.remaining.saturating_sub(1);
                    if session.remaining == 0 {
                        sessions.remove(&user_id);
                        return;
                    }
                }
                // Session ended while this tick was in flight.
                None => return,
            }
        }
    }
}
