//! Per-responder notification inbox. Pure data component — no business
//! logic, no knowledge of channels or events.

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use lifeline_common::{Notification, SignalEvent, TriageError, TriageResult};

/// Injected inbox store: constructed once, passed by Arc to all callers.
/// Each notification is exclusively owned by exactly one responder's inbox.
#[derive(Default)]
pub struct NotificationStore {
    inboxes: RwLock<HashMap<String, Vec<Notification>>>,
}

impl NotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Materialize an event into a responder's inbox. Assigns an id, sets
    /// `read = false`, and prepends (most-recent-first). The notification
    /// exists before this returns.
    pub async fn store(&self, responder_id: &str, event: &SignalEvent) -> Notification {
        let notification = Notification {
            id: Uuid::new_v4(),
            responder_id: responder_id.to_string(),
            kind: event.kind,
            title: event.title.clone(),
            message: event.message.clone(),
            priority: event.priority,
            sos_id: event.sos_id,
            payload: event.payload.clone(),
            created_at: Utc::now(),
            read: false,
        };

        let mut inboxes = self.inboxes.write().await;
        inboxes
            .entry(responder_id.to_string())
            .or_default()
            .insert(0, notification.clone());
        notification
    }

    /// Inbox contents (most-recent-first) plus the unread count.
    pub async fn list(&self, responder_id: &str) -> (Vec<Notification>, usize) {
        let inboxes = self.inboxes.read().await;
        let inbox = inboxes.get(responder_id).cloned().unwrap_or_default();
        let unread = inbox.iter().filter(|n| !n.read).count();
        (inbox, unread)
    }

    /// Idempotent: marking an already-read notification is a no-op, not an
    /// error. Unknown ids are NotFound.
    pub async fn mark_read(&self, responder_id: &str, notification_id: Uuid) -> TriageResult<()> {
        let mut inboxes = self.inboxes.write().await;
        let inbox = inboxes
            .get_mut(responder_id)
            .ok_or_else(|| TriageError::NotFound(format!("responder {responder_id}")))?;
        let notification = inbox
            .iter_mut()
            .find(|n| n.id == notification_id)
            .ok_or_else(|| TriageError::NotFound(format!("notification {notification_id}")))?;
        notification.read = true;
        Ok(())
    }
}
