//! Fan-out of a domain event to the in-app inbox and external channels.
//!
//! The in-app write is synchronous — the caller can state "the notification
//! now exists" when dispatch returns. External channel attempts run as
//! spawned tasks with a bounded timeout; a broken channel is recorded in the
//! report and never blocks the in-app write or the other channels.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use lifeline_common::SignalEvent;

use crate::channels::{ChannelKind, DeliveryChannel};
use crate::directory::ResponderDirectory;
use crate::store::NotificationStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered,
    Failed { reason: String },
    /// Channel not configured for this responder (missing contact means or
    /// channel disabled). Not a failure.
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelReport {
    pub channel: ChannelKind,
    pub outcome: DeliveryOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetReport {
    pub responder_id: String,
    pub notification_id: Uuid,
    pub channels: Vec<ChannelReport>,
}

/// Per-target, per-channel delivery outcome for one dispatched event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeliveryReport {
    pub targets: Vec<TargetReport>,
}

impl DeliveryReport {
    pub fn merge(mut self, other: DeliveryReport) -> Self {
        self.targets.extend(other.targets);
        self
    }

    /// Per-channel rollup for API responses (`notifications.channels`).
    pub fn channel_summary(&self) -> serde_json::Value {
        let mut summary = serde_json::Map::new();
        for target in &self.targets {
            for report in &target.channels {
                let entry = summary
                    .entry(report.channel.to_string())
                    .or_insert_with(|| serde_json::json!({"delivered": 0, "failed": 0, "skipped": 0}));
                let key = match report.outcome {
                    DeliveryOutcome::Delivered => "delivered",
                    DeliveryOutcome::Failed { .. } => "failed",
                    DeliveryOutcome::Skipped => "skipped",
                };
                entry[key] = serde_json::json!(entry[key].as_u64().unwrap_or(0) + 1);
            }
        }
        serde_json::json!({
            "in_app": self.targets.len(),
            "channels": summary,
        })
    }
}

pub struct NotificationDispatcher {
    store: Arc<NotificationStore>,
    directory: Arc<dyn ResponderDirectory>,
    channels: Vec<Arc<dyn DeliveryChannel>>,
    delivery_timeout: Duration,
}

impl NotificationDispatcher {
    pub fn new(
        store: Arc<NotificationStore>,
        directory: Arc<dyn ResponderDirectory>,
        channels: Vec<Arc<dyn DeliveryChannel>>,
        delivery_timeout: Duration,
    ) -> Self {
        Self {
            store,
            directory,
            channels,
            delivery_timeout,
        }
    }

    pub fn store(&self) -> &Arc<NotificationStore> {
        &self.store
    }

    /// Write the event to every target's inbox, then attempt each configured
    /// external channel independently under the delivery timeout.
    pub async fn dispatch(&self, event: &SignalEvent, targets: &[String]) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        for responder_id in targets {
            let notification = self.store.store(responder_id, event).await;
            let contact = self.directory.get_contact(responder_id).await;

            let attempts = self.channels.iter().map(|channel| {
                let channel = Arc::clone(channel);
                let contact = contact.clone();
                let notification = notification.clone();
                let timeout = self.delivery_timeout;
                let responder_id = responder_id.clone();

                tokio::spawn(async move {
                    let kind = channel.kind();
                    let contact = match contact {
                        Some(c) if channel.configured_for(&c) => c,
                        _ => {
                            return ChannelReport {
                                channel: kind,
                                outcome: DeliveryOutcome::Skipped,
                            }
                        }
                    };

                    let outcome =
                        match tokio::time::timeout(timeout, channel.deliver(&contact, &notification))
                            .await
                        {
                            Ok(Ok(())) => DeliveryOutcome::Delivered,
                            Ok(Err(e)) => {
                                warn!(responder_id = %responder_id, channel = %kind, error = %e, "Channel delivery failed");
                                DeliveryOutcome::Failed {
                                    reason: e.to_string(),
                                }
                            }
                            Err(_) => {
                                warn!(responder_id = %responder_id, channel = %kind, "Channel delivery timed out");
                                DeliveryOutcome::Failed {
                                    reason: format!("timed out after {timeout:?}"),
                                }
                            }
                        };
                    ChannelReport {
                        channel: kind,
                        outcome,
                    }
                })
            });

            let kinds: Vec<ChannelKind> = self.channels.iter().map(|c| c.kind()).collect();
            let channel_reports: Vec<ChannelReport> = join_all(attempts)
                .await
                .into_iter()
                .zip(kinds)
                .map(|(joined, kind)| {
                    joined.unwrap_or_else(|e| ChannelReport {
                        channel: kind,
                        outcome: DeliveryOutcome::Failed {
                            reason: format!("delivery task panicked: {e}"),
                        },
                    })
                })
                .collect();

            report.targets.push(TargetReport {
                responder_id: responder_id.clone(),
                notification_id: notification.id,
                channels: channel_reports,
            });
        }

        report
    }
}
