pub mod notification;
pub mod schedule;

pub use notification::{NotificationRepository, NotificationRepositoryTrait};
pub use schedule::{ScheduleRepository, ScheduleRepositoryTrait};

#[cfg(test)]
pub use notification::MockNotificationRepositoryTrait;
#[cfg(test)]
pub use schedule::MockScheduleRepositoryTrait;
