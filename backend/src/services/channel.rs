//! Live channel registry.
//!
//! Keeps one outbound channel per connected user. The (excluded) socket layer
//! registers a channel on connect and unregisters on disconnect; the check-in
//! coordinator only ever talks through the trait.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::AppError;
use crate::types::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelEventKind {
    CheckIn,
    SessionEnded,
}

/// Wire shape of a live event: `{id, type, message, timestamp}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelEvent {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: ChannelEventKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ChannelEvent {
    fn new(kind: ChannelEventKind, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn check_in(message: impl Into<String>) -> Self {
        Self::new(ChannelEventKind::CheckIn, message)
    }

    pub fn session_ended(message: impl Into<String>) -> Self {
        Self::new(ChannelEventKind::SessionEnded, message)
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait ChannelRegistryTrait: Send + Sync {
    fn is_connected(&self, user_id: UserId) -> bool;

    /// Delivers one event. Failure means the channel is gone or closed; the
    /// caller logs and moves on, nothing is queued for retry.
    fn send(&self, user_id: UserId, event: ChannelEvent) -> Result<(), AppError>;
}

#[derive(Default)]
pub struct ChannelRegistry {
    channels: Mutex<HashMap<UserId, mpsc::UnboundedSender<ChannelEvent>>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<UserId, mpsc::UnboundedSender<ChannelEvent>>> {
        self.channels.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers a fresh channel for the user, replacing any previous one.
    pub fn register(&self, user_id: UserId) -> mpsc::UnboundedReceiver<ChannelEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().insert(user_id, tx);
        rx
    }

    pub fn unregister(&self, user_id: UserId) {
        self.lock().remove(&user_id);
    }
}

impl ChannelRegistryTrait for ChannelRegistry {
    fn is_connected(&self, user_id: UserId) -> bool {
        self.lock().get(&user_id).is_some_and(|tx| !tx.is_closed())
    }

    fn send(&self, user_id: UserId, event: ChannelEvent) -> Result<(), AppError> {
        let channels = self.lock();
        match channels.get(&user_id) {
            Some(tx) => tx
                .send(event)
                .map_err(|_| AppError::Dispatch(format!("channel for user {} is closed", user_id))),
            None => Err(AppError::Dispatch(format!(
                "no live channel for user {}",
                user_id
            ))),
        }
    }
}
