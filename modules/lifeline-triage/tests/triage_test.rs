//! End-to-end tests for the triage pipeline: coordinator state machine,
//! optimistic assignment, escalation sweep, and inbox effects. Everything
//! runs against the in-memory repository, store, and directory.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};

use lifeline_common::{
    EmergencyType, FileConfig, GeoPoint, NotificationKind, Priority, SignalStatus, SosSignal,
    TriageError,
};
use lifeline_notify::{
    MemoryDirectory, NotificationDispatcher, NotificationStore, ResponderContact,
    ResponderDirectory,
};
use lifeline_triage::{
    cluster_signals, AssignmentCoordinator, EscalationEngine, IntakeRequest,
    MemorySignalRepository, SignalFilter, SignalRepository,
};

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    repo: Arc<MemorySignalRepository>,
    store: Arc<NotificationStore>,
    directory: Arc<MemoryDirectory>,
    coordinator: AssignmentCoordinator,
    engine: EscalationEngine,
}

async fn harness() -> Harness {
    let repo = Arc::new(MemorySignalRepository::new());
    let store = Arc::new(NotificationStore::new());
    let directory = Arc::new(MemoryDirectory::new());

    for responder in ["responder-1", "responder-2", "lead-1"] {
        directory
            .register(
                responder,
                ResponderContact {
                    email: Some(format!("{responder}@relief.example")),
                    phone: None,
                    push_token: None,
                },
            )
            .await;
    }
    directory.set_team_lead("responder-1", "lead-1").await;

    // No external channels: these tests exercise lifecycle + inbox effects.
    let dispatcher = Arc::new(NotificationDispatcher::new(
        store.clone(),
        directory.clone(),
        vec![],
        StdDuration::from_secs(5),
    ));

    let config = FileConfig::default();
    let coordinator = AssignmentCoordinator::new(
        repo.clone(),
        dispatcher.clone(),
        directory.clone(),
        config.escalation.max_level,
    );
    let engine = EscalationEngine::new(
        repo.clone(),
        dispatcher,
        directory.clone(),
        config.escalation,
    );

    Harness {
        repo,
        store,
        directory,
        coordinator,
        engine,
    }
}

fn intake_request(priority: Priority) -> IntakeRequest {
    IntakeRequest {
        reporter_id: "citizen-1".to_string(),
        location: GeoPoint {
            lat: 6.9271,
            lng: 79.8612,
        },
        address: Some("Galle Road, Colombo".to_string()),
        message: "trapped by rising flood water".to_string(),
        emergency_type: EmergencyType::Flood,
        priority,
    }
}

/// Insert a signal whose created_at lies in the past, for sweep scenarios.
async fn insert_aged(repo: &MemorySignalRepository, priority: Priority, age_minutes: i64) -> SosSignal {
    let mut signal = SosSignal::new(
        "citizen-1",
        GeoPoint {
            lat: 6.9271,
            lng: 79.8612,
        },
        "no contact since the landslide",
        EmergencyType::Landslide,
        priority,
    );
    signal.created_at = Utc::now() - Duration::minutes(age_minutes);
    repo.insert(signal).await.unwrap().record
}

// ---------------------------------------------------------------------------
// Intake + assignment
// ---------------------------------------------------------------------------

#[tokio::test]
async fn intake_creates_pending_level_zero() {
    let h = harness().await;
    let signal = h.coordinator.intake(intake_request(Priority::High)).await.unwrap();
    assert_eq!(signal.status, SignalStatus::Pending);
    assert_eq!(signal.escalation_level, 0);
    assert!(signal.assigned_responder.is_none());
    assert!(signal.response_time.is_none());
}

#[tokio::test]
async fn intake_rejects_invalid_location() {
    let h = harness().await;
    let mut request = intake_request(Priority::High);
    request.location = GeoPoint { lat: 95.0, lng: 79.8 };
    let err = h.coordinator.intake(request).await.unwrap_err();
    assert!(matches!(err, TriageError::Validation(_)));
}

#[tokio::test]
async fn assign_acknowledges_and_stores_unread_notification() {
    let h = harness().await;
    let signal = h.coordinator.intake(intake_request(Priority::Critical)).await.unwrap();

    let (updated, report) = h
        .coordinator
        .assign(signal.id, "responder-1", None, None, false)
        .await
        .unwrap();

    assert_eq!(updated.status, SignalStatus::Acknowledged);
    assert_eq!(updated.assigned_responder.as_deref(), Some("responder-1"));
    assert!(updated.response_time.is_some());
    assert_eq!(updated.notes.len(), 1);

    // The notification exists, unread, the moment assign returns.
    let (inbox, unread) = h.store.list("responder-1").await;
    assert_eq!(inbox.len(), 1);
    assert_eq!(unread, 1);
    assert!(!inbox[0].read);
    assert_eq!(inbox[0].kind, NotificationKind::Assignment);
    assert_eq!(inbox[0].sos_id, signal.id);
    assert_eq!(report.targets.len(), 1);
}

#[tokio::test]
async fn assign_unknown_responder_is_not_found() {
    let h = harness().await;
    let signal = h.coordinator.intake(intake_request(Priority::High)).await.unwrap();
    let err = h
        .coordinator
        .assign(signal.id, "nobody", None, None, false)
        .await
        .unwrap_err();
    assert!(matches!(err, TriageError::NotFound(_)));
}

#[tokio::test]
async fn concurrent_assigns_same_version_exactly_one_wins() {
    let h = harness().await;
    let signal = h.coordinator.intake(intake_request(Priority::High)).await.unwrap();
    let version = h.repo.get(signal.id).await.unwrap().version;

    let (a, b) = tokio::join!(
        h.coordinator
            .assign(signal.id, "responder-1", None, Some(version), false),
        h.coordinator
            .assign(signal.id, "responder-2", None, Some(version), false),
    );

    let outcomes = [a, b];
    let successes = outcomes.iter().filter(|r| r.is_ok()).count();
    let conflicts = outcomes
        .iter()
        .filter(|r| matches!(r, Err(TriageError::Conflict { .. })))
        .count();
    assert_eq!(successes, 1, "exactly one assign must win");
    assert_eq!(conflicts, 1, "the loser must get Conflict");

    // At most one responder is assigned.
    let current = h.repo.get(signal.id).await.unwrap().record;
    assert!(current.assigned_responder.is_some());
}

#[tokio::test]
async fn retried_assign_with_stale_version_is_idempotent() {
    let h = harness().await;
    let signal = h.coordinator.intake(intake_request(Priority::High)).await.unwrap();
    let version = h.repo.get(signal.id).await.unwrap().version;

    h.coordinator
        .assign(signal.id, "responder-1", None, Some(version), false)
        .await
        .unwrap();

    // Same call again with the now-stale version: already applied, so it
    // returns current state instead of erroring.
    let (retried, report) = h
        .coordinator
        .assign(signal.id, "responder-1", None, Some(version), false)
        .await
        .unwrap();
    assert_eq!(retried.assigned_responder.as_deref(), Some("responder-1"));
    assert!(report.targets.is_empty(), "no duplicate notification on retry");

    let (inbox, _) = h.store.list("responder-1").await;
    assert_eq!(inbox.len(), 1);

    // A different responder with the stale version still conflicts.
    let err = h
        .coordinator
        .assign(signal.id, "responder-2", None, Some(version), false)
        .await
        .unwrap_err();
    assert!(matches!(err, TriageError::Conflict { .. }));
}

#[tokio::test]
async fn reassignment_requires_flag_and_notifies_both_parties() {
    let h = harness().await;
    let signal = h.coordinator.intake(intake_request(Priority::High)).await.unwrap();
    h.coordinator
        .assign(signal.id, "responder-1", None, None, false)
        .await
        .unwrap();

    let err = h
        .coordinator
        .assign(signal.id, "responder-2", None, None, false)
        .await
        .unwrap_err();
    assert!(matches!(err, TriageError::Validation(_)));

    let (updated, report) = h
        .coordinator
        .assign(signal.id, "responder-2", None, None, true)
        .await
        .unwrap();
    assert_eq!(updated.assigned_responder.as_deref(), Some("responder-2"));
    assert_eq!(report.targets.len(), 2);

    let (prior_inbox, _) = h.store.list("responder-1").await;
    assert_eq!(prior_inbox[0].kind, NotificationKind::Withdrawal);
    let (new_inbox, _) = h.store.list("responder-2").await;
    assert_eq!(new_inbox[0].kind, NotificationKind::Assignment);
}

// ---------------------------------------------------------------------------
// Status transitions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn full_lifecycle_to_resolved_sets_resolution_time() {
    let h = harness().await;
    let signal = h.coordinator.intake(intake_request(Priority::High)).await.unwrap();
    h.coordinator
        .assign(signal.id, "responder-1", None, None, false)
        .await
        .unwrap();

    let (responding, _) = h
        .coordinator
        .update_status(signal.id, SignalStatus::Responding, None, "responder-1")
        .await
        .unwrap();
    assert_eq!(responding.status, SignalStatus::Responding);
    assert!(responding.resolution_time.is_none());

    let (resolved, report) = h
        .coordinator
        .update_status(
            signal.id,
            SignalStatus::Resolved,
            Some("family evacuated".to_string()),
            "responder-1",
        )
        .await
        .unwrap();
    assert_eq!(resolved.status, SignalStatus::Resolved);
    assert!(resolved.resolution_time.is_some());
    assert_eq!(report.targets.len(), 1, "assigned responder notified");

    let (inbox, _) = h.store.list("responder-1").await;
    assert_eq!(inbox[0].kind, NotificationKind::StatusUpdate);
}

#[tokio::test]
async fn terminal_state_rejects_backward_transition() {
    let h = harness().await;
    let signal = h.coordinator.intake(intake_request(Priority::Low)).await.unwrap();
    h.coordinator
        .update_status(signal.id, SignalStatus::FalseAlarm, None, "admin-1")
        .await
        .unwrap();

    let err = h
        .coordinator
        .update_status(signal.id, SignalStatus::Pending, None, "admin-1")
        .await
        .unwrap_err();
    assert!(matches!(err, TriageError::Validation(_)));
}

#[tokio::test]
async fn pending_cannot_skip_to_resolved() {
    let h = harness().await;
    let signal = h.coordinator.intake(intake_request(Priority::Low)).await.unwrap();
    let err = h
        .coordinator
        .update_status(signal.id, SignalStatus::Resolved, None, "admin-1")
        .await
        .unwrap_err();
    assert!(matches!(err, TriageError::Validation(_)));
}

#[tokio::test]
async fn false_alarm_from_pending_sets_resolution_and_response_time() {
    let h = harness().await;
    let signal = h.coordinator.intake(intake_request(Priority::Low)).await.unwrap();
    let (updated, report) = h
        .coordinator
        .update_status(signal.id, SignalStatus::FalseAlarm, None, "admin-1")
        .await
        .unwrap();
    assert!(updated.resolution_time.is_some());
    assert!(updated.response_time.is_some());
    assert!(report.targets.is_empty(), "no responder to notify");
}

// ---------------------------------------------------------------------------
// Manual escalation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn manual_escalation_never_decreases() {
    let h = harness().await;
    let signal = h.coordinator.intake(intake_request(Priority::High)).await.unwrap();
    h.coordinator
        .escalate(signal.id, 2, "no response from field", "admin-1")
        .await
        .unwrap();

    let err = h
        .coordinator
        .escalate(signal.id, 1, "oops", "admin-1")
        .await
        .unwrap_err();
    assert!(matches!(err, TriageError::Validation(_)));

    // Same level again is the idempotent no-op path.
    let (unchanged, report) = h
        .coordinator
        .escalate(signal.id, 2, "retry", "admin-1")
        .await
        .unwrap();
    assert_eq!(unchanged.escalation_level, 2);
    assert!(report.targets.is_empty());
}

#[tokio::test]
async fn manual_escalation_cannot_exceed_max_level() {
    let h = harness().await;
    let signal = h.coordinator.intake(intake_request(Priority::High)).await.unwrap();
    let err = h
        .coordinator
        .escalate(signal.id, 99, "panic", "admin-1")
        .await
        .unwrap_err();
    assert!(matches!(err, TriageError::Validation(_)));
}

#[tokio::test]
async fn level_two_escalation_notifies_all_available_responders() {
    let h = harness().await;
    let signal = h.coordinator.intake(intake_request(Priority::Critical)).await.unwrap();

    let (_, report) = h
        .coordinator
        .escalate(signal.id, 2, "mass casualty", "admin-1")
        .await
        .unwrap();
    let available = h.directory.available_responders().await;
    assert_eq!(report.targets.len(), available.len());
}

// ---------------------------------------------------------------------------
// Escalation sweep
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sweep_escalates_critical_after_threshold_then_waits() {
    let h = harness().await;
    // threshold(critical) = 10min in the default table
    let signal = insert_aged(&h.repo, Priority::Critical, 11).await;

    let stats = h.engine.sweep(Utc::now()).await;
    assert_eq!(stats.escalated, 1);

    let after_first = h.repo.get(signal.id).await.unwrap().record;
    assert_eq!(after_first.escalation_level, 1);
    assert!(after_first.auto_escalated_at.is_some());

    // 15 minutes elapsed is short of the next multiple (20min): unchanged.
    let stats = h.engine.sweep(signal.created_at + Duration::minutes(15)).await;
    assert_eq!(stats.escalated, 0);
    let after_second = h.repo.get(signal.id).await.unwrap().record;
    assert_eq!(after_second.escalation_level, 1);
}

#[tokio::test]
async fn sweep_skips_terminal_and_max_level_signals() {
    let h = harness().await;
    let aged = insert_aged(&h.repo, Priority::Critical, 120).await;

    // Drive to max level via repeated sweeps.
    for _ in 0..5 {
        h.engine.sweep(Utc::now()).await;
    }
    let maxed = h.repo.get(aged.id).await.unwrap().record;
    assert_eq!(
        maxed.escalation_level,
        FileConfig::default().escalation.max_level
    );

    // Further sweeps are clean no-ops, not errors.
    let stats = h.engine.sweep(Utc::now()).await;
    assert_eq!(stats.escalated, 0);
    assert_eq!(stats.errors, 0);
}

#[tokio::test]
async fn escalation_level_is_monotone_across_sweeps_and_manual_calls() {
    let h = harness().await;
    let signal = insert_aged(&h.repo, Priority::Critical, 25).await;

    let mut last_level = 0;
    for _ in 0..4 {
        h.engine.sweep(Utc::now()).await;
        let level = h.repo.get(signal.id).await.unwrap().record.escalation_level;
        assert!(level >= last_level, "escalation_level must never decrease");
        last_level = level;
    }
}

#[tokio::test]
async fn sweep_notifies_assigned_responder_and_team_lead_at_level_one() {
    let h = harness().await;
    let signal = insert_aged(&h.repo, Priority::Critical, 11).await;
    h.coordinator
        .assign(signal.id, "responder-1", None, None, false)
        .await
        .unwrap();

    h.engine.sweep(Utc::now()).await;

    let (responder_inbox, _) = h.store.list("responder-1").await;
    assert!(responder_inbox
        .iter()
        .any(|n| n.kind == NotificationKind::Escalation));
    let (lead_inbox, _) = h.store.list("lead-1").await;
    assert_eq!(lead_inbox.len(), 1);
    assert_eq!(lead_inbox[0].kind, NotificationKind::Escalation);
}

#[tokio::test]
async fn unassigned_signal_escalation_fans_out_to_available_pool() {
    let h = harness().await;
    insert_aged(&h.repo, Priority::Critical, 11).await;

    h.engine.sweep(Utc::now()).await;

    // No assignee at level 1 → the whole available pool is notified.
    for responder in h.directory.available_responders().await {
        let (inbox, unread) = h.store.list(&responder).await;
        assert_eq!(inbox.len(), 1, "{responder} should be notified");
        assert_eq!(unread, 1);
    }
}

// ---------------------------------------------------------------------------
// Cluster view
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cluster_view_keeps_responding_signals() {
    let h = harness().await;

    // Two co-located Colombo signals; one gets a responder en route.
    let pending = h.coordinator.intake(intake_request(Priority::High)).await.unwrap();
    let responding = h.coordinator.intake(intake_request(Priority::High)).await.unwrap();
    h.coordinator
        .assign(responding.id, "responder-1", None, None, false)
        .await
        .unwrap();
    h.coordinator
        .update_status(responding.id, SignalStatus::Responding, None, "responder-1")
        .await
        .unwrap();

    // The same snapshot-then-cluster sequence the clusters endpoint runs.
    let snapshot = h.repo.find(&SignalFilter::non_terminal()).await.unwrap();
    let clusters = cluster_signals(&snapshot, 2.0);

    assert_eq!(clusters.len(), 1);
    assert_eq!(clusters[0].member_count, 2);
    assert!(clusters[0].signal_ids.contains(&pending.id));
    assert!(
        clusters[0].signal_ids.contains(&responding.id),
        "a signal with a responder en route stays on the cluster view"
    );
}
