pub mod notification;
pub mod schedule;
