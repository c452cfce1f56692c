//! Top-level orchestrator for signal lifecycle operations.
//!
//! Every mutation goes through the repository's compare-and-swap contract.
//! Retries carrying the same expected_version are idempotent: a call whose
//! effect is already applied returns the current state, a call whose
//! precondition no longer holds returns Conflict.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use lifeline_common::{
    EmergencyType, GeoPoint, NotificationKind, Priority, SignalEvent, SignalStatus, SosSignal,
    TriageError, TriageResult,
};
use lifeline_notify::{DeliveryReport, NotificationDispatcher, ResponderDirectory};

use crate::escalation::escalation_targets;
use crate::repo::{SignalChanges, SignalRepository, Versioned};

/// A citizen report entering the pipeline.
#[derive(Debug, Clone)]
pub struct IntakeRequest {
    pub reporter_id: String,
    pub location: GeoPoint,
    pub address: Option<String>,
    pub message: String,
    pub emergency_type: EmergencyType,
    pub priority: Priority,
}

pub struct AssignmentCoordinator {
    repo: Arc<dyn SignalRepository>,
    dispatcher: Arc<NotificationDispatcher>,
    directory: Arc<dyn ResponderDirectory>,
    max_escalation_level: u32,
}

impl AssignmentCoordinator {
    pub fn new(
        repo: Arc<dyn SignalRepository>,
        dispatcher: Arc<NotificationDispatcher>,
        directory: Arc<dyn ResponderDirectory>,
        max_escalation_level: u32,
    ) -> Self {
        Self {
            repo,
            dispatcher,
            directory,
            max_escalation_level,
        }
    }

    /// Create a signal from a citizen report: status pending, level 0.
    pub async fn intake(&self, request: IntakeRequest) -> TriageResult<SosSignal> {
        if !request.location.is_valid() {
            return Err(TriageError::Validation(format!(
                "location out of range: ({}, {})",
                request.location.lat, request.location.lng
            )));
        }
        if request.message.trim().is_empty() {
            return Err(TriageError::Validation("message must not be empty".into()));
        }

        let mut signal = SosSignal::new(
            request.reporter_id,
            request.location,
            request.message,
            request.emergency_type,
            request.priority,
        );
        signal.address = request.address;

        let inserted = self.repo.insert(signal).await?;
        info!(
            signal_id = %inserted.record.id,
            priority = %inserted.record.priority,
            emergency_type = %inserted.record.emergency_type,
            "SOS signal created"
        );
        Ok(inserted.record)
    }

    /// Assign (or, with the explicit flag, reassign) a responder.
    ///
    /// Applies a conditional update against the version captured at read
    /// time (or the caller-supplied expected_version). On success the status
    /// advances to acknowledged if pending, response_time is set if unset,
    /// and an assignment event is dispatched; reassignment additionally
    /// dispatches a withdrawal to the prior responder.
    pub async fn assign(
        &self,
        signal_id: Uuid,
        responder_id: &str,
        note: Option<String>,
        expected_version: Option<u64>,
        reassign: bool,
    ) -> TriageResult<(SosSignal, DeliveryReport)> {
        if self.directory.get_contact(responder_id).await.is_none() {
            return Err(TriageError::NotFound(format!("responder {responder_id}")));
        }

        let current = self.repo.get(signal_id).await?;
        let expected = expected_version.unwrap_or(current.version);

        if expected != current.version {
            return self.assign_retry_outcome(&current, responder_id, expected);
        }

        let signal = &current.record;
        let assignable = matches!(
            signal.status,
            SignalStatus::Pending | SignalStatus::Acknowledged
        );
        if !assignable && !reassign {
            return Err(TriageError::Validation(format!(
                "cannot assign in status {} without reassign flag",
                signal.status
            )));
        }
        if signal.status.is_terminal() {
            return Err(TriageError::Validation(format!(
                "cannot assign a signal in terminal status {}",
                signal.status
            )));
        }

        let prior_responder = signal.assigned_responder.clone();
        let switching = prior_responder.as_deref().is_some_and(|p| p != responder_id);
        if switching && !reassign {
            return Err(TriageError::Validation(
                "signal already assigned; reassignment requires the explicit flag".into(),
            ));
        }

        let now = Utc::now();
        let mut changes = SignalChanges {
            assigned_responder: Some(Some(responder_id.to_string())),
            ..Default::default()
        };
        if signal.status == SignalStatus::Pending {
            changes.status = Some(SignalStatus::Acknowledged);
        }
        if signal.response_time.is_none() {
            changes.response_time = Some(now);
        }
        let note_text = note.unwrap_or_else(|| format!("assigned to {responder_id}"));
        changes = changes.with_note(responder_id, note_text, now);

        let updated = match self.repo.conditional_update(signal_id, expected, changes).await {
            Ok(v) => v,
            Err(TriageError::Conflict { expected, .. }) => {
                let refreshed = self.repo.get(signal_id).await?;
                return self.assign_retry_outcome(&refreshed, responder_id, expected);
            }
            Err(e) => return Err(e),
        };

        info!(
            signal_id = %signal_id,
            responder_id,
            reassign = switching,
            "Responder assigned"
        );

        let mut report = DeliveryReport::default();
        if switching {
            if let Some(prior) = &prior_responder {
                let withdrawal = self.event(
                    &updated.record,
                    NotificationKind::Withdrawal,
                    "Assignment withdrawn",
                    format!("You are no longer assigned to this SOS signal; {responder_id} has taken over"),
                    responder_id,
                );
                report = report.merge(self.dispatcher.dispatch(&withdrawal, &[prior.clone()]).await);
            }
        }
        let assignment = self.event(
            &updated.record,
            NotificationKind::Assignment,
            "New SOS assignment",
            format!(
                "{} emergency reported: {}",
                updated.record.emergency_type, updated.record.message
            ),
            responder_id,
        );
        report = report.merge(
            self.dispatcher
                .dispatch(&assignment, &[responder_id.to_string()])
                .await,
        );

        Ok((updated.record, report))
    }

    /// Decide what a stale-version assign call means: if its effect is
    /// already in place, return the current state; otherwise Conflict.
    fn assign_retry_outcome(
        &self,
        current: &Versioned<SosSignal>,
        responder_id: &str,
        expected: u64,
    ) -> TriageResult<(SosSignal, DeliveryReport)> {
        let already_applied = current.record.assigned_responder.as_deref() == Some(responder_id)
            && current.record.status != SignalStatus::Pending;
        if already_applied {
            return Ok((current.record.clone(), DeliveryReport::default()));
        }
        Err(TriageError::Conflict {
            expected,
            actual: current.version,
        })
    }

    /// Advance the lifecycle state machine. Illegal transitions are rejected
    /// by the exhaustive transition table; entering a terminal state sets
    /// resolution_time.
    pub async fn update_status(
        &self,
        signal_id: Uuid,
        new_status: SignalStatus,
        note: Option<String>,
        actor: &str,
    ) -> TriageResult<(SosSignal, DeliveryReport)> {
        let current = self.repo.get(signal_id).await?;
        let signal = &current.record;

        if signal.status == new_status {
            // Retried call already applied.
            return Ok((signal.clone(), DeliveryReport::default()));
        }
        if !signal.status.can_transition_to(new_status) {
            return Err(TriageError::Validation(format!(
                "illegal status transition {} -> {}",
                signal.status, new_status
            )));
        }

        let now = Utc::now();
        let mut changes = SignalChanges {
            status: Some(new_status),
            ..Default::default()
        };
        if new_status.is_terminal() {
            changes.resolution_time = Some(now);
        }
        if signal.response_time.is_none() {
            // First transition out of pending.
            changes.response_time = Some(now);
        }
        if let Some(text) = note {
            changes = changes.with_note(actor, text, now);
        }

        let updated = self
            .repo
            .conditional_update(signal_id, current.version, changes)
            .await?;

        info!(
            signal_id = %signal_id,
            from = %signal.status,
            to = %new_status,
            "Status updated"
        );

        let mut report = DeliveryReport::default();
        if let Some(responder) = &updated.record.assigned_responder {
            let event = self.event(
                &updated.record,
                NotificationKind::StatusUpdate,
                "SOS status update",
                format!("Signal status changed to {new_status}"),
                actor,
            );
            report = self.dispatcher.dispatch(&event, &[responder.clone()]).await;
        }

        Ok((updated.record, report))
    }

    /// Manual escalation. The requested level must be at or above the
    /// current one — escalation never decreases. Equal level is the
    /// idempotent retry path.
    pub async fn escalate(
        &self,
        signal_id: Uuid,
        requested_level: u32,
        reason: &str,
        actor: &str,
    ) -> TriageResult<(SosSignal, DeliveryReport)> {
        let current = self.repo.get(signal_id).await?;
        let signal = &current.record;

        if requested_level < signal.escalation_level {
            return Err(TriageError::Validation(format!(
                "escalation level cannot decrease ({} -> {})",
                signal.escalation_level, requested_level
            )));
        }
        if requested_level > self.max_escalation_level {
            return Err(TriageError::Validation(format!(
                "escalation level {} exceeds maximum {}",
                requested_level, self.max_escalation_level
            )));
        }
        if requested_level == signal.escalation_level {
            return Ok((signal.clone(), DeliveryReport::default()));
        }

        let now = Utc::now();
        let changes = SignalChanges {
            escalation_level: Some(requested_level),
            ..Default::default()
        }
        .with_note(actor, format!("escalated to level {requested_level}: {reason}"), now);

        let updated = self
            .repo
            .conditional_update(signal_id, current.version, changes)
            .await?;

        info!(
            signal_id = %signal_id,
            level = requested_level,
            actor,
            "Signal escalated"
        );

        let targets =
            escalation_targets(&updated.record, requested_level, self.directory.as_ref()).await;
        let event = self.event(
            &updated.record,
            NotificationKind::Escalation,
            "SOS escalated",
            format!("Signal escalated to level {requested_level}: {reason}"),
            actor,
        );
        let report = self.dispatcher.dispatch(&event, &targets).await;

        Ok((updated.record, report))
    }

    fn event(
        &self,
        signal: &SosSignal,
        kind: NotificationKind,
        title: &str,
        message: String,
        actor: &str,
    ) -> SignalEvent {
        SignalEvent {
            kind,
            sos_id: signal.id,
            title: title.to_string(),
            message,
            priority: signal.priority,
            actor: actor.to_string(),
            payload: SignalEvent::payload_for(signal),
        }
    }
}
