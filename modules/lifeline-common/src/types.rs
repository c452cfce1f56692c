use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Geo Types ---

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    /// Basic WGS84 range check. Intake rejects anything outside.
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }
}

/// Haversine great-circle distance between two lat/lng points in kilometers.
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let lat1_r = lat1.to_radians();
    let lat2_r = lat2.to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1_r.cos() * lat2_r.cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();
    EARTH_RADIUS_KM * c
}

// --- Enums ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    /// Ordinal used for dominant-priority selection in clusters.
    pub fn ordinal(&self) -> u8 {
        match self {
            Priority::Low => 0,
            Priority::Medium => 1,
            Priority::High => 2,
            Priority::Critical => 3,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Medium => write!(f, "medium"),
            Priority::High => write!(f, "high"),
            Priority::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(anyhow::anyhow!("Unknown priority: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyType {
    Flood,
    Fire,
    Earthquake,
    Landslide,
    Medical,
    Accident,
    Violence,
    Other,
}

impl std::fmt::Display for EmergencyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmergencyType::Flood => write!(f, "flood"),
            EmergencyType::Fire => write!(f, "fire"),
            EmergencyType::Earthquake => write!(f, "earthquake"),
            EmergencyType::Landslide => write!(f, "landslide"),
            EmergencyType::Medical => write!(f, "medical"),
            EmergencyType::Accident => write!(f, "accident"),
            EmergencyType::Violence => write!(f, "violence"),
            EmergencyType::Other => write!(f, "other"),
        }
    }
}

impl std::str::FromStr for EmergencyType {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flood" => Ok(Self::Flood),
            "fire" => Ok(Self::Fire),
            "earthquake" => Ok(Self::Earthquake),
            "landslide" => Ok(Self::Landslide),
            "medical" => Ok(Self::Medical),
            "accident" => Ok(Self::Accident),
            "violence" => Ok(Self::Violence),
            "other" => Ok(Self::Other),
            _ => Err(anyhow::anyhow!("Unknown emergency type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStatus {
    Pending,
    Acknowledged,
    Responding,
    Resolved,
    FalseAlarm,
}

impl SignalStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SignalStatus::Resolved | SignalStatus::FalseAlarm)
    }

    /// Exhaustive transition table. Any pair not listed here is illegal;
    /// escalation is an orthogonal attribute change, not a status move.
    pub fn can_transition_to(&self, next: SignalStatus) -> bool {
        use SignalStatus::*;
        matches!(
            (self, next),
            (Pending, Acknowledged)
                | (Pending, FalseAlarm)
                | (Acknowledged, Responding)
                | (Responding, Resolved)
        )
    }
}

impl std::fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalStatus::Pending => write!(f, "pending"),
            SignalStatus::Acknowledged => write!(f, "acknowledged"),
            SignalStatus::Responding => write!(f, "responding"),
            SignalStatus::Resolved => write!(f, "resolved"),
            SignalStatus::FalseAlarm => write!(f, "false_alarm"),
        }
    }
}

impl std::str::FromStr for SignalStatus {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "acknowledged" => Ok(Self::Acknowledged),
            "responding" => Ok(Self::Responding),
            "resolved" => Ok(Self::Resolved),
            "false_alarm" => Ok(Self::FalseAlarm),
            _ => Err(anyhow::anyhow!("Unknown signal status: {}", s)),
        }
    }
}

// --- SOS Signal ---

/// One entry in a signal's append-only note log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalNote {
    pub author_id: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// A reported emergency event with location, priority, and lifecycle status.
///
/// Mutated exclusively through the coordinator and the escalation sweep;
/// never physically deleted — terminal states are retained for analytics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SosSignal {
    pub id: Uuid,
    pub reporter_id: String,
    pub location: GeoPoint,
    pub address: Option<String>,
    pub message: String,
    pub emergency_type: EmergencyType,
    pub priority: Priority,
    pub status: SignalStatus,
    /// Monotonically non-decreasing for the lifetime of the record.
    pub escalation_level: u32,
    pub assigned_responder: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set no later than the first transition out of pending.
    pub response_time: Option<DateTime<Utc>>,
    /// Set iff status is terminal.
    pub resolution_time: Option<DateTime<Utc>>,
    pub auto_escalated_at: Option<DateTime<Utc>>,
    pub notes: Vec<SignalNote>,
}

impl SosSignal {
    pub fn new(
        reporter_id: impl Into<String>,
        location: GeoPoint,
        message: impl Into<String>,
        emergency_type: EmergencyType,
        priority: Priority,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            reporter_id: reporter_id.into(),
            location,
            address: None,
            message: message.into(),
            emergency_type,
            priority,
            status: SignalStatus::Pending,
            escalation_level: 0,
            assigned_responder: None,
            created_at: now,
            updated_at: now,
            response_time: None,
            resolution_time: None,
            auto_escalated_at: None,
            notes: Vec::new(),
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }
}

// --- Notifications ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Assignment,
    Withdrawal,
    StatusUpdate,
    Escalation,
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationKind::Assignment => write!(f, "assignment"),
            NotificationKind::Withdrawal => write!(f, "withdrawal"),
            NotificationKind::StatusUpdate => write!(f, "status_update"),
            NotificationKind::Escalation => write!(f, "escalation"),
        }
    }
}

/// A notification in exactly one responder's inbox. `sos_id` is a lookup
/// back-reference, never an ownership link — many inboxes may reference
/// the same signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub responder_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub priority: Priority,
    pub sos_id: Uuid,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

/// A domain event fanned out to delivery channels. Produced by the
/// coordinator and the escalation sweep, consumed by the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalEvent {
    pub kind: NotificationKind,
    pub sos_id: Uuid,
    pub title: String,
    pub message: String,
    pub priority: Priority,
    /// Who caused the event (admin id, responder id, or "escalation_engine").
    pub actor: String,
    /// Structured event data: location, emergency_type, citizen message, notes.
    pub payload: serde_json::Value,
}

impl SignalEvent {
    /// Build the standard payload carried on every event for a signal.
    pub fn payload_for(signal: &SosSignal) -> serde_json::Value {
        serde_json::json!({
            "location": { "lat": signal.location.lat, "lng": signal.location.lng },
            "address": signal.address,
            "emergency_type": signal.emergency_type.to_string(),
            "message": signal.message,
            "escalation_level": signal.escalation_level,
        })
    }
}

// --- Clusters ---

/// A set of spatially proximate, non-terminal signals grouped for dispatch
/// efficiency. Ephemeral — recomputed per query, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalCluster {
    pub signal_ids: Vec<Uuid>,
    pub centroid_lat: f64,
    pub centroid_lng: f64,
    pub dominant_priority: Priority,
    pub member_count: usize,
}
