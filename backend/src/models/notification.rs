use crate::types::{NotificationId, ScheduleId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One persisted reminder instance: a single (schedule, offset, occurrence)
/// fire point. Pending rows are recreated, never duplicated, on reschedule;
/// executed rows are kept as history.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ScheduledNotification {
    pub id: NotificationId,
    pub schedule_id: ScheduleId,
    pub minutes_before: i32,
    pub scheduled_for: DateTime<Utc>,
    pub is_executed: bool,
    /// Opaque token correlating this row with the in-memory timer armed for it.
    pub job_token: Uuid,
    pub is_recurring: bool,
    pub recurring_day_of_week: Option<i16>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScheduledNotification {
    pub fn new(
        schedule_id: ScheduleId,
        minutes_before: i32,
        scheduled_for: DateTime<Utc>,
        recurring_day_of_week: Option<i16>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: NotificationId::new(),
            schedule_id,
            minutes_before,
            scheduled_for,
            is_executed: false,
            job_token: Uuid::new_v4(),
            is_recurring: recurring_day_of_week.is_some(),
            recurring_day_of_week,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_pending(&self) -> bool {
        !self.is_executed
    }

    /// The next weekly occurrence of a recurring reminder, queued after a fire.
    pub fn next_occurrence(&self) -> Self {
        Self::new(
            self.schedule_id,
            self.minutes_before,
            self.scheduled_for + chrono::Duration::weeks(1),
            self.recurring_day_of_week,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_notification_is_pending() {
        let n = ScheduledNotification::new(ScheduleId::new(), 30, Utc::now(), None);
        assert!(n.is_pending());
        assert!(!n.is_recurring);
        assert!(n.recurring_day_of_week.is_none());
    }

    #[test]
    fn recurring_day_implies_recurring_flag() {
        let n = ScheduledNotification::new(ScheduleId::new(), 5, Utc::now(), Some(1));
        assert!(n.is_recurring);
    }

    #[test]
    fn next_occurrence_is_one_week_out_with_fresh_identity() {
        let n = ScheduledNotification::new(ScheduleId::new(), 30, Utc::now(), Some(3));
        let next = n.next_occurrence();
        assert_eq!(next.scheduled_for, n.scheduled_for + chrono::Duration::weeks(1));
        assert_eq!(next.schedule_id, n.schedule_id);
        assert_eq!(next.minutes_before, n.minutes_before);
        assert_ne!(next.id, n.id);
        assert_ne!(next.job_token, n.job_token);
        assert!(next.is_pending());
    }
}
