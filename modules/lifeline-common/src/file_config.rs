use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::types::Priority;

/// TOML-backed operational policy. Secrets (gateway credentials) stay as
/// env vars; everything here is tunable per deployment without a rebuild.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub triage: TriageConfig,
    pub escalation: EscalationConfig,
    pub channels: ChannelsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TriageConfig {
    /// Default radius for the clusters endpoint when none is supplied.
    pub cluster_radius_km: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EscalationConfig {
    /// Minutes before the first escalation, keyed by priority. The Nth
    /// escalation fires at threshold × (N + 1) elapsed minutes.
    pub threshold_minutes: HashMap<Priority, u32>,
    pub max_level: u32,
    pub sweep_interval_secs: u64,
}

impl EscalationConfig {
    /// Threshold for a priority. Priorities absent from the table never
    /// auto-escalate.
    pub fn threshold_for(&self, priority: Priority) -> Option<chrono::Duration> {
        self.threshold_minutes
            .get(&priority)
            .map(|m| chrono::Duration::minutes(*m as i64))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelsConfig {
    pub email_enabled: bool,
    pub sms_enabled: bool,
    pub push_enabled: bool,
    /// Bound on each external channel attempt.
    pub delivery_timeout_secs: u64,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            triage: TriageConfig {
                cluster_radius_km: 2.0,
            },
            escalation: EscalationConfig {
                // Defaults only; deployments override via TOML. No single
                // authoritative production table exists.
                threshold_minutes: HashMap::from([
                    (Priority::Low, 30),
                    (Priority::Medium, 20),
                    (Priority::High, 15),
                    (Priority::Critical, 10),
                ]),
                max_level: 3,
                sweep_interval_secs: 60,
            },
            channels: ChannelsConfig {
                email_enabled: true,
                sms_enabled: true,
                push_enabled: true,
                delivery_timeout_secs: 5,
            },
        }
    }
}

/// Load and parse a TOML config file.
pub fn load_config(path: &Path) -> Result<FileConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: FileConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_all_priorities() {
        let cfg = FileConfig::default();
        for p in [
            Priority::Low,
            Priority::Medium,
            Priority::High,
            Priority::Critical,
        ] {
            assert!(cfg.escalation.threshold_for(p).is_some(), "missing {p}");
        }
    }

    #[test]
    fn toml_round_trip() {
        let toml_str = r#"
            [triage]
            cluster_radius_km = 5.0

            [escalation]
            max_level = 4
            sweep_interval_secs = 30

            [escalation.threshold_minutes]
            low = 45
            medium = 30
            high = 15
            critical = 10

            [channels]
            email_enabled = true
            sms_enabled = false
            push_enabled = true
            delivery_timeout_secs = 5
        "#;
        let cfg: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.triage.cluster_radius_km, 5.0);
        assert_eq!(cfg.escalation.max_level, 4);
        assert!(!cfg.channels.sms_enabled);
        assert_eq!(
            cfg.escalation.threshold_for(Priority::Low),
            Some(chrono::Duration::minutes(45))
        );
    }
}
