use crate::engine::alerts::AlertId;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use uuid::Uuid;

pub const DEFAULT_NOTIFICATION_CAP: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotificationId(Uuid);

impl NotificationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NotificationSource {
    Alert(AlertId),
    Movement { symbol: String, change_pct: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationEvent {
    pub id: NotificationId,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub source: NotificationSource,
}

impl NotificationEvent {
    pub fn new(message: String, source: NotificationSource, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: NotificationId::generate(),
            message,
            timestamp,
            source,
        }
    }

    pub fn alert_id(&self) -> Option<AlertId> {
        match self.source {
            NotificationSource::Alert(id) => Some(id),
            NotificationSource::Movement { .. } => None,
        }
    }
}

/// Newest-first list of notifications, at most one per alert rule.
#[derive(Debug, Clone)]
pub struct NotificationQueue {
    events: VecDeque<NotificationEvent>,
    cap: usize,
}

impl NotificationQueue {
    pub fn new(cap: usize) -> Self {
        Self {
            events: VecDeque::new(),
            cap: cap.max(1),
        }
    }

    /// Inserts at the head. Returns `false` if an event for the same alert is
    /// already queued. The oldest event is evicted past the cap.
    pub fn push(&mut self, event: NotificationEvent) -> bool {
        if let Some(alert) = event.alert_id() {
            if self.events.iter().any(|queued| queued.alert_id() == Some(alert)) {
                return false;
            }
        }
        self.events.push_front(event);
        self.events.truncate(self.cap);
        true
    }

    pub fn dismiss(&mut self, id: NotificationId) -> bool {
        let before = self.events.len();
        self.events.retain(|event| event.id != id);
        self.events.len() != before
    }

    pub fn list(&self) -> impl Iterator<Item = &NotificationEvent> {
        self.events.iter()
    }

    pub fn newest(&self) -> Option<&NotificationEvent> {
        self.events.front()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl Default for NotificationQueue {
    fn default() -> Self {
        Self::new(DEFAULT_NOTIFICATION_CAP)
    }
}
