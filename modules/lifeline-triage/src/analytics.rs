//! Read-only aggregation over repository snapshots for the dashboard and
//! analytics endpoints. Advisory data: a stale snapshot is acceptable.

use std::collections::HashMap;

use serde::Serialize;

use lifeline_common::SosSignal;

/// Aggregate counts plus the filtered signal list for the admin dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSummary {
    pub total: usize,
    pub by_status: HashMap<String, usize>,
    pub by_priority: HashMap<String, usize>,
    pub signals: Vec<SosSignal>,
}

impl DashboardSummary {
    pub fn from_signals(signals: Vec<SosSignal>) -> Self {
        let mut by_status: HashMap<String, usize> = HashMap::new();
        let mut by_priority: HashMap<String, usize> = HashMap::new();
        for signal in &signals {
            *by_status.entry(signal.status.to_string()).or_insert(0) += 1;
            *by_priority.entry(signal.priority.to_string()).or_insert(0) += 1;
        }
        Self {
            total: signals.len(),
            by_status,
            by_priority,
            signals,
        }
    }
}

/// Response-performance rollup over a time range.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsSummary {
    pub total: usize,
    pub resolved: usize,
    pub false_alarms: usize,
    pub active: usize,
    pub by_emergency_type: HashMap<String, usize>,
    pub by_priority: HashMap<String, usize>,
    pub auto_escalated: usize,
    pub escalation_level_distribution: HashMap<u32, usize>,
    /// Mean minutes from creation to first acknowledgement, over signals
    /// that have been acknowledged.
    pub avg_response_minutes: Option<f64>,
    /// Mean minutes from creation to terminal resolution.
    pub avg_resolution_minutes: Option<f64>,
}

impl AnalyticsSummary {
    pub fn from_signals(signals: &[SosSignal]) -> Self {
        let mut by_emergency_type: HashMap<String, usize> = HashMap::new();
        let mut by_priority: HashMap<String, usize> = HashMap::new();
        let mut escalation_level_distribution: HashMap<u32, usize> = HashMap::new();
        let mut resolved = 0usize;
        let mut false_alarms = 0usize;
        let mut active = 0usize;
        let mut auto_escalated = 0usize;
        let mut response_minutes: Vec<f64> = Vec::new();
        let mut resolution_minutes: Vec<f64> = Vec::new();

        for signal in signals {
            *by_emergency_type
                .entry(signal.emergency_type.to_string())
                .or_insert(0) += 1;
            *by_priority.entry(signal.priority.to_string()).or_insert(0) += 1;
            *escalation_level_distribution
                .entry(signal.escalation_level)
                .or_insert(0) += 1;

            match signal.status {
                lifeline_common::SignalStatus::Resolved => resolved += 1,
                lifeline_common::SignalStatus::FalseAlarm => false_alarms += 1,
                _ => active += 1,
            }
            if signal.auto_escalated_at.is_some() {
                auto_escalated += 1;
            }
            if let Some(t) = signal.response_time {
                response_minutes.push((t - signal.created_at).num_seconds() as f64 / 60.0);
            }
            if let Some(t) = signal.resolution_time {
                resolution_minutes.push((t - signal.created_at).num_seconds() as f64 / 60.0);
            }
        }

        fn mean(values: &[f64]) -> Option<f64> {
            if values.is_empty() {
                None
            } else {
                Some(values.iter().sum::<f64>() / values.len() as f64)
            }
        }

        Self {
            total: signals.len(),
            resolved,
            false_alarms,
            active,
            by_emergency_type,
            by_priority,
            auto_escalated,
            escalation_level_distribution,
            avg_response_minutes: mean(&response_minutes),
            avg_resolution_minutes: mean(&resolution_minutes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use lifeline_common::{EmergencyType, GeoPoint, Priority, SignalStatus};

    fn make_signal(priority: Priority, status: SignalStatus) -> SosSignal {
        let mut signal = SosSignal::new(
            "citizen-1",
            GeoPoint {
                lat: 6.9,
                lng: 79.8,
            },
            "help",
            EmergencyType::Flood,
            priority,
        );
        signal.status = status;
        signal
    }

    #[test]
    fn dashboard_counts_by_status_and_priority() {
        let signals = vec![
            make_signal(Priority::High, SignalStatus::Pending),
            make_signal(Priority::High, SignalStatus::Acknowledged),
            make_signal(Priority::Low, SignalStatus::Pending),
        ];
        let summary = DashboardSummary::from_signals(signals);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.by_status["pending"], 2);
        assert_eq!(summary.by_status["acknowledged"], 1);
        assert_eq!(summary.by_priority["high"], 2);
    }

    #[test]
    fn analytics_averages_response_and_resolution() {
        let mut resolved = make_signal(Priority::Critical, SignalStatus::Resolved);
        resolved.response_time = Some(resolved.created_at + Duration::minutes(10));
        resolved.resolution_time = Some(resolved.created_at + Duration::minutes(60));

        let mut acked = make_signal(Priority::High, SignalStatus::Acknowledged);
        acked.response_time = Some(acked.created_at + Duration::minutes(20));

        let pending = make_signal(Priority::Low, SignalStatus::Pending);

        let summary = AnalyticsSummary::from_signals(&[resolved, acked, pending]);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.resolved, 1);
        assert_eq!(summary.active, 2);
        assert!((summary.avg_response_minutes.unwrap() - 15.0).abs() < 0.01);
        assert!((summary.avg_resolution_minutes.unwrap() - 60.0).abs() < 0.01);
    }

    #[test]
    fn analytics_empty_input_has_no_averages() {
        let summary = AnalyticsSummary::from_signals(&[]);
        assert_eq!(summary.total, 0);
        assert!(summary.avg_response_minutes.is_none());
        assert!(summary.avg_resolution_minutes.is_none());
    }

    #[test]
    fn analytics_counts_auto_escalations() {
        let mut escalated = make_signal(Priority::Critical, SignalStatus::Pending);
        escalated.escalation_level = 2;
        escalated.auto_escalated_at = Some(Utc::now());
        let plain = make_signal(Priority::Low, SignalStatus::Pending);

        let summary = AnalyticsSummary::from_signals(&[escalated, plain]);
        assert_eq!(summary.auto_escalated, 1);
        assert_eq!(summary.escalation_level_distribution[&2], 1);
        assert_eq!(summary.escalation_level_distribution[&0], 1);
    }
}
