pub mod channel;
pub mod checkin;
pub mod schedule;
pub mod scheduler;
pub mod timer_registry;

pub use channel::{ChannelEvent, ChannelEventKind, ChannelRegistry, ChannelRegistryTrait};
pub use checkin::CheckInCoordinator;
pub use schedule::ScheduleService;
pub use scheduler::{NotificationScheduler, ReminderDispatcher};
pub use timer_registry::{TimerHandle, TimerRegistry};
