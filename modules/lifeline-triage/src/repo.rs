//! Signal storage behind a compare-and-swap contract.
//!
//! The repository enforces nothing about transition legality — that is the
//! coordinator's job — but it does refuse escalation_level decreases, the
//! one invariant that must hold regardless of caller.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use lifeline_common::{
    Priority, SignalNote, SignalStatus, SosSignal, TriageError, TriageResult,
};

/// A record paired with the version observed at read time. The version is
/// the expected value for a subsequent conditional update.
#[derive(Debug, Clone)]
pub struct Versioned<T> {
    pub version: u64,
    pub record: T,
}

/// Filter predicate for range queries. All fields are conjunctive.
#[derive(Debug, Clone, Default)]
pub struct SignalFilter {
    pub statuses: Option<Vec<SignalStatus>>,
    pub priority: Option<Priority>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}

impl SignalFilter {
    /// Signals the escalation sweep considers: awaiting a response.
    pub fn active() -> Self {
        Self {
            statuses: Some(vec![SignalStatus::Pending, SignalStatus::Acknowledged]),
            ..Default::default()
        }
    }

    /// Every non-terminal signal, including those with a responder en
    /// route. This is the cluster-view population.
    pub fn non_terminal() -> Self {
        Self {
            statuses: Some(vec![
                SignalStatus::Pending,
                SignalStatus::Acknowledged,
                SignalStatus::Responding,
            ]),
            ..Default::default()
        }
    }

    pub fn matches(&self, signal: &SosSignal) -> bool {
        if let Some(statuses) = &self.statuses {
            if !statuses.contains(&signal.status) {
                return false;
            }
        }
        if let Some(priority) = self.priority {
            if signal.priority != priority {
                return false;
            }
        }
        if let Some(after) = self.created_after {
            if signal.created_at < after {
                return false;
            }
        }
        if let Some(before) = self.created_before {
            if signal.created_at > before {
                return false;
            }
        }
        true
    }
}

/// Explicit change-set applied atomically under the record lock.
/// `assigned_responder` uses a double Option: outer None leaves the field
/// untouched, `Some(None)` clears it (withdrawal).
#[derive(Debug, Clone, Default)]
pub struct SignalChanges {
    pub status: Option<SignalStatus>,
    pub assigned_responder: Option<Option<String>>,
    pub escalation_level: Option<u32>,
    pub response_time: Option<DateTime<Utc>>,
    pub resolution_time: Option<DateTime<Utc>>,
    pub auto_escalated_at: Option<DateTime<Utc>>,
    pub notes: Vec<SignalNote>,
}

impl SignalChanges {
    pub fn with_note(
        mut self,
        author_id: impl Into<String>,
        text: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        self.notes.push(SignalNote {
            author_id: author_id.into(),
            text: text.into(),
            timestamp: now,
        });
        self
    }
}

/// Durable store of SOS signals: point lookup, filtered range query, and a
/// compare-and-swap conditional update.
#[async_trait]
pub trait SignalRepository: Send + Sync {
    async fn get(&self, id: Uuid) -> TriageResult<Versioned<SosSignal>>;

    /// Point-in-time snapshot of matching signals. No locking guarantees
    /// beyond the snapshot itself — advisory reads (clusters, dashboards)
    /// tolerate staleness.
    async fn find(&self, filter: &SignalFilter) -> TriageResult<Vec<SosSignal>>;

    async fn insert(&self, signal: SosSignal) -> TriageResult<Versioned<SosSignal>>;

    /// Apply `changes` iff the stored version equals `expected_version`.
    /// Returns `Conflict` without side effects otherwise.
    async fn conditional_update(
        &self,
        id: Uuid,
        expected_version: u64,
        changes: SignalChanges,
    ) -> TriageResult<Versioned<SosSignal>>;
}

/// In-memory repository. Per-record optimistic concurrency only — no global
/// lock is held across reads and writes from callers.
#[derive(Default)]
pub struct MemorySignalRepository {
    records: RwLock<HashMap<Uuid, Versioned<SosSignal>>>,
}

impl MemorySignalRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SignalRepository for MemorySignalRepository {
    async fn get(&self, id: Uuid) -> TriageResult<Versioned<SosSignal>> {
        let records = self.records.read().await;
        records
            .get(&id)
            .cloned()
            .ok_or_else(|| TriageError::NotFound(format!("signal {id}")))
    }

    async fn find(&self, filter: &SignalFilter) -> TriageResult<Vec<SosSignal>> {
        let records = self.records.read().await;
        let mut matched: Vec<SosSignal> = records
            .values()
            .filter(|v| filter.matches(&v.record))
            .map(|v| v.record.clone())
            .collect();
        matched.sort_by_key(|s| std::cmp::Reverse(s.created_at));
        Ok(matched)
    }

    async fn insert(&self, signal: SosSignal) -> TriageResult<Versioned<SosSignal>> {
        let mut records = self.records.write().await;
        let versioned = Versioned {
            version: 1,
            record: signal,
        };
        records.insert(versioned.record.id, versioned.clone());
        Ok(versioned)
    }

    async fn conditional_update(
        &self,
        id: Uuid,
        expected_version: u64,
        changes: SignalChanges,
    ) -> TriageResult<Versioned<SosSignal>> {
        let mut records = self.records.write().await;
        let current = records
            .get_mut(&id)
            .ok_or_else(|| TriageError::NotFound(format!("signal {id}")))?;

        if current.version != expected_version {
            return Err(TriageError::Conflict {
                expected: expected_version,
                actual: current.version,
            });
        }

        if let Some(level) = changes.escalation_level {
            if level < current.record.escalation_level {
                return Err(TriageError::Validation(format!(
                    "escalation_level cannot decrease ({} -> {})",
                    current.record.escalation_level, level
                )));
            }
        }

        let signal = &mut current.record;
        if let Some(status) = changes.status {
            signal.status = status;
        }
        if let Some(responder) = changes.assigned_responder {
            signal.assigned_responder = responder;
        }
        if let Some(level) = changes.escalation_level {
            signal.escalation_level = level;
        }
        if let Some(t) = changes.response_time {
            signal.response_time = Some(t);
        }
        if let Some(t) = changes.resolution_time {
            signal.resolution_time = Some(t);
        }
        if let Some(t) = changes.auto_escalated_at {
            signal.auto_escalated_at = Some(t);
        }
        signal.notes.extend(changes.notes);
        signal.updated_at = Utc::now();
        current.version += 1;

        Ok(current.clone())
    }
}
