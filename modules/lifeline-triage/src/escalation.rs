//! Time-based auto-escalation sweep.
//!
//! Runs on a fixed interval independent of request traffic and shares the
//! repository's compare-and-swap discipline with the coordinator, so a
//! concurrent manual escalation and an automatic one never silently
//! overwrite each other.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use lifeline_common::{
    EscalationConfig, NotificationKind, SignalEvent, SosSignal, TriageError,
};
use lifeline_notify::{NotificationDispatcher, ResponderDirectory};

use crate::repo::{SignalChanges, SignalFilter, SignalRepository};

/// Outcome of evaluating one signal against the threshold table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationOutcome {
    /// Escalate to this level (current + 1).
    Escalate(u32),
    Skip(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Elapsed time has not reached threshold × (level + 1).
    BelowThreshold,
    /// Already at the configured maximum level.
    AtMaxLevel,
    /// No threshold configured for this priority.
    NoThreshold,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SweepStats {
    pub checked: usize,
    pub escalated: usize,
    pub skipped: usize,
    pub conflicts: usize,
    pub errors: usize,
}

/// Pure threshold evaluation, separated from the sweep for testing.
/// The Nth escalation fires once `elapsed >= threshold * (level + 1)`.
pub fn evaluate(signal: &SosSignal, now: DateTime<Utc>, config: &EscalationConfig) -> EscalationOutcome {
    if signal.escalation_level >= config.max_level {
        return EscalationOutcome::Skip(SkipReason::AtMaxLevel);
    }
    let Some(threshold) = config.threshold_for(signal.priority) else {
        return EscalationOutcome::Skip(SkipReason::NoThreshold);
    };

    let elapsed = now - signal.created_at;
    let required = threshold * (signal.escalation_level as i32 + 1);
    if elapsed >= required {
        EscalationOutcome::Escalate(signal.escalation_level + 1)
    } else {
        EscalationOutcome::Skip(SkipReason::BelowThreshold)
    }
}

/// Responder fan-out for an escalation event. Level 1 stays narrow (the
/// assigned responder and their team lead); level 2 and above widens to
/// every available responder in the region.
pub async fn escalation_targets(
    signal: &SosSignal,
    level: u32,
    directory: &dyn ResponderDirectory,
) -> Vec<String> {
    if level <= 1 {
        if let Some(responder) = &signal.assigned_responder {
            let mut targets = vec![responder.clone()];
            if let Some(lead) = directory.team_lead_of(responder).await {
                if !targets.contains(&lead) {
                    targets.push(lead);
                }
            }
            return targets;
        }
    }
    directory.available_responders().await
}

pub struct EscalationEngine {
    repo: Arc<dyn SignalRepository>,
    dispatcher: Arc<NotificationDispatcher>,
    directory: Arc<dyn ResponderDirectory>,
    config: EscalationConfig,
}

impl EscalationEngine {
    pub fn new(
        repo: Arc<dyn SignalRepository>,
        dispatcher: Arc<NotificationDispatcher>,
        directory: Arc<dyn ResponderDirectory>,
        config: EscalationConfig,
    ) -> Self {
        Self {
            repo,
            dispatcher,
            directory,
            config,
        }
    }

    /// One pass over all pending/acknowledged signals. A per-signal error
    /// is logged and does not abort the rest of the batch.
    pub async fn sweep(&self, now: DateTime<Utc>) -> SweepStats {
        let mut stats = SweepStats::default();

        let candidates = match self.repo.find(&SignalFilter::active()).await {
            Ok(signals) => signals,
            Err(e) => {
                error!(error = %e, "Escalation sweep failed to load candidates");
                stats.errors += 1;
                return stats;
            }
        };

        for signal in candidates {
            stats.checked += 1;
            match self.sweep_one(&signal, now).await {
                Ok(true) => stats.escalated += 1,
                Ok(false) => stats.skipped += 1,
                Err(TriageError::Conflict { .. }) => stats.conflicts += 1,
                Err(e) => {
                    error!(signal_id = %signal.id, error = %e, "Escalation failed for signal");
                    stats.errors += 1;
                }
            }
        }

        if stats.escalated > 0 || stats.errors > 0 {
            info!(
                checked = stats.checked,
                escalated = stats.escalated,
                skipped = stats.skipped,
                conflicts = stats.conflicts,
                errors = stats.errors,
                "Escalation sweep complete"
            );
        }
        stats
    }

    /// Evaluate and escalate one signal. On a version conflict the losing
    /// writer retries once against the refreshed record within this pass.
    async fn sweep_one(&self, signal: &SosSignal, now: DateTime<Utc>) -> Result<bool, TriageError> {
        let EscalationOutcome::Escalate(_) = evaluate(signal, now, &self.config) else {
            return Ok(false);
        };

        let mut current = self.repo.get(signal.id).await?;
        for attempt in 0..2 {
            let EscalationOutcome::Escalate(next_level) = evaluate(&current.record, now, &self.config)
            else {
                // Refreshed record no longer qualifies (e.g. manual
                // escalation won the race).
                return Ok(false);
            };

            let changes = SignalChanges {
                escalation_level: Some(next_level),
                auto_escalated_at: Some(now),
                ..Default::default()
            }
            .with_note(
                "escalation_engine",
                format!(
                    "auto-escalated to level {next_level} after {} minutes unattended",
                    (now - current.record.created_at).num_minutes()
                ),
                now,
            );

            match self
                .repo
                .conditional_update(signal.id, current.version, changes)
                .await
            {
                Ok(updated) => {
                    info!(
                        signal_id = %signal.id,
                        level = next_level,
                        priority = %updated.record.priority,
                        "Signal auto-escalated"
                    );
                    self.notify(&updated.record, next_level).await;
                    return Ok(true);
                }
                Err(TriageError::Conflict { expected, actual }) if attempt == 0 => {
                    warn!(
                        signal_id = %signal.id,
                        expected, actual,
                        "Concurrent mutation during sweep, retrying against refreshed record"
                    );
                    current = self.repo.get(signal.id).await?;
                }
                Err(e) => return Err(e),
            }
        }
        Err(TriageError::Conflict {
            expected: current.version,
            actual: current.version,
        })
    }

    async fn notify(&self, signal: &SosSignal, level: u32) {
        let targets = escalation_targets(signal, level, self.directory.as_ref()).await;
        if targets.is_empty() {
            warn!(signal_id = %signal.id, "No responders to notify for escalation");
            return;
        }
        let event = SignalEvent {
            kind: NotificationKind::Escalation,
            sos_id: signal.id,
            title: "SOS auto-escalated".to_string(),
            message: format!(
                "{} emergency unattended, now at escalation level {level}",
                signal.emergency_type
            ),
            priority: signal.priority,
            actor: "escalation_engine".to_string(),
            payload: SignalEvent::payload_for(signal),
        };
        self.dispatcher.dispatch(&event, &targets).await;
    }

    /// Long-lived timer task: one sweep per interval tick.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let interval_secs = self.config.sweep_interval_secs;
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(std::time::Duration::from_secs(interval_secs.max(1)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            info!(interval_secs, "Escalation sweep loop started");
            loop {
                ticker.tick().await;
                self.sweep(Utc::now()).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use lifeline_common::{EmergencyType, FileConfig, GeoPoint, Priority};

    fn config() -> EscalationConfig {
        FileConfig::default().escalation
    }

    fn make_signal(priority: Priority, created_at: DateTime<Utc>, level: u32) -> SosSignal {
        let mut signal = SosSignal::new(
            "citizen-1",
            GeoPoint {
                lat: 6.9271,
                lng: 79.8612,
            },
            "house on fire",
            EmergencyType::Fire,
            priority,
        );
        signal.created_at = created_at;
        signal.escalation_level = level;
        signal
    }

    #[test]
    fn critical_escalates_after_threshold() {
        // threshold(critical) = 10min in defaults
        let now = Utc::now();
        let signal = make_signal(Priority::Critical, now - Duration::minutes(11), 0);
        assert_eq!(
            evaluate(&signal, now, &config()),
            EscalationOutcome::Escalate(1)
        );
    }

    #[test]
    fn below_threshold_is_skipped() {
        let now = Utc::now();
        let signal = make_signal(Priority::Critical, now - Duration::minutes(9), 0);
        assert_eq!(
            evaluate(&signal, now, &config()),
            EscalationOutcome::Skip(SkipReason::BelowThreshold)
        );
    }

    #[test]
    fn second_escalation_waits_for_threshold_multiple() {
        // Level 1 at threshold 10min escalates again only at 20min elapsed.
        let now = Utc::now();
        let at_15 = make_signal(Priority::Critical, now - Duration::minutes(15), 1);
        assert_eq!(
            evaluate(&at_15, now, &config()),
            EscalationOutcome::Skip(SkipReason::BelowThreshold)
        );

        let at_21 = make_signal(Priority::Critical, now - Duration::minutes(21), 1);
        assert_eq!(
            evaluate(&at_21, now, &config()),
            EscalationOutcome::Escalate(2)
        );
    }

    #[test]
    fn at_max_level_is_skipped_not_error() {
        let cfg = config();
        let now = Utc::now();
        let signal = make_signal(Priority::Critical, now - Duration::hours(10), cfg.max_level);
        assert_eq!(
            evaluate(&signal, now, &cfg),
            EscalationOutcome::Skip(SkipReason::AtMaxLevel)
        );
    }

    #[test]
    fn low_priority_uses_longer_threshold() {
        let now = Utc::now();
        // threshold(low) = 30min in defaults
        let at_20 = make_signal(Priority::Low, now - Duration::minutes(20), 0);
        assert_eq!(
            evaluate(&at_20, now, &config()),
            EscalationOutcome::Skip(SkipReason::BelowThreshold)
        );
        let at_31 = make_signal(Priority::Low, now - Duration::minutes(31), 0);
        assert_eq!(
            evaluate(&at_31, now, &config()),
            EscalationOutcome::Escalate(1)
        );
    }

    #[test]
    fn missing_threshold_never_escalates() {
        let mut cfg = config();
        cfg.threshold_minutes.remove(&Priority::Low);
        let now = Utc::now();
        let signal = make_signal(Priority::Low, now - Duration::hours(48), 0);
        assert_eq!(
            evaluate(&signal, now, &cfg),
            EscalationOutcome::Skip(SkipReason::NoThreshold)
        );
    }
}
