pub mod analytics;
pub mod cluster;
pub mod coordinator;
pub mod escalation;
pub mod repo;

pub use analytics::{AnalyticsSummary, DashboardSummary};
pub use cluster::cluster_signals;
pub use coordinator::{AssignmentCoordinator, IntakeRequest};
pub use escalation::{EscalationEngine, EscalationOutcome, SkipReason, SweepStats};
pub use repo::{MemorySignalRepository, SignalChanges, SignalFilter, SignalRepository, Versioned};
