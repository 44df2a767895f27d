//! In-memory bookkeeping for armed reminder timers.
//!
//! Process-local and never persisted: the engine rebuilds this map from the
//! notification store on every start. Each handle is aborted under the map
//! lock before its entry is dropped, so a stale timer cannot outlive a
//! reschedule.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::task::AbortHandle;
use uuid::Uuid;

use crate::types::ScheduleId;

/// A live armed timer for one reminder occurrence.
#[derive(Debug)]
pub struct TimerHandle {
    pub job_token: Uuid,
    pub minutes_before: i64,
    pub recurring_day: Option<i16>,
    abort: AbortHandle,
}

impl TimerHandle {
    pub fn new(
        job_token: Uuid,
        minutes_before: i64,
        recurring_day: Option<i16>,
        abort: AbortHandle,
    ) -> Self {
        Self {
            job_token,
            minutes_before,
            recurring_day,
            abort,
        }
    }

    fn stop(&self) {
        self.abort.abort();
    }
}

#[derive(Default)]
pub struct TimerRegistry {
    timers: Mutex<HashMap<ScheduleId, Vec<TimerHandle>>>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ScheduleId, Vec<TimerHandle>>> {
        self.timers.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn register(&self, schedule_id: ScheduleId, handle: TimerHandle) {
        self.lock().entry(schedule_id).or_default().push(handle);
    }

    /// Stops every timer armed for `schedule_id` and drops the entry.
    /// Returns how many handles were stopped.
    pub fn cancel_all(&self, schedule_id: ScheduleId) -> usize {
        let mut timers = self.lock();
        match timers.remove(&schedule_id) {
            Some(handles) => {
                for handle in &handles {
                    handle.stop();
                }
                handles.len()
            }
            None => 0,
        }
    }

    /// Full shutdown: stops every registered timer across all schedules.
    pub fn cancel_all_global(&self) -> usize {
        let mut timers = self.lock();
        let mut stopped = 0;
        for handles in timers.values() {
            for handle in handles {
                handle.stop();
                stopped += 1;
            }
        }
        timers.clear();
        stopped
    }

    /// Deregisters a single fired one-shot handle without aborting anything.
    pub fn remove(&self, schedule_id: ScheduleId, job_token: Uuid) {
        let mut timers = self.lock();
        if let Some(handles) = timers.get_mut(&schedule_id) {
            handles.retain(|h| h.job_token != job_token);
            if handles.is_empty() {
                timers.remove(&schedule_id);
            }
        }
    }

    pub fn handle_count(&self, schedule_id: ScheduleId) -> usize {
        self.lock().get(&schedule_id).map_or(0, Vec::len)
    }

    pub fn schedule_count(&self) -> usize {
        self.lock().len()
    }
}
