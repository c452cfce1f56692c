use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use lifeline_common::{EmergencyType, GeoPoint, Priority, SignalStatus, TriageError};
use lifeline_notify::ResponderContact;
use lifeline_triage::{
    cluster_signals, AnalyticsSummary, DashboardSummary, IntakeRequest, SignalFilter,
    SignalRepository,
};

use crate::AppState;

// --- Request bodies ---

#[derive(Deserialize)]
pub struct SubmitSosBody {
    reporter_id: String,
    lat: f64,
    lng: f64,
    address: Option<String>,
    message: String,
    emergency_type: EmergencyType,
    priority: Priority,
}

#[derive(Deserialize)]
pub struct AssignBody {
    responder_id: String,
    note: Option<String>,
    expected_version: Option<u64>,
    #[serde(default)]
    reassign: bool,
}

#[derive(Deserialize)]
pub struct StatusBody {
    status: SignalStatus,
    note: Option<String>,
    actor: String,
}

#[derive(Deserialize)]
pub struct EscalateBody {
    level: u32,
    reason: String,
    actor: String,
}

#[derive(Deserialize)]
pub struct RegisterResponderBody {
    responder_id: String,
    email: Option<String>,
    phone: Option<String>,
    push_token: Option<String>,
    team_lead: Option<String>,
}

#[derive(Deserialize)]
pub struct MarkReadBody {
    responder_id: String,
}

// --- Query structs ---

#[derive(Deserialize)]
pub struct DashboardQuery {
    status: Option<String>,
    priority: Option<String>,
    /// Lookback window in hours.
    #[serde(alias = "timeRange")]
    time_range: Option<i64>,
}

#[derive(Deserialize)]
pub struct ClustersQuery {
    radius: Option<f64>,
}

#[derive(Deserialize)]
pub struct AnalyticsQuery {
    #[serde(alias = "timeRange")]
    time_range: Option<i64>,
}

#[derive(Deserialize)]
pub struct InboxQuery {
    responder_id: String,
}

// --- Helpers ---

fn error_response(e: &TriageError) -> axum::response::Response {
    let status = match e {
        TriageError::NotFound(_) => StatusCode::NOT_FOUND,
        TriageError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        TriageError::Conflict { .. } => StatusCode::CONFLICT,
        TriageError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let body = match e {
        TriageError::Conflict { expected, actual } => json!({
            "error": e.to_string(),
            "expected_version": expected,
            "actual_version": actual,
        }),
        _ => json!({ "error": e.to_string() }),
    };
    (status, Json(body)).into_response()
}

fn parse_statuses(raw: &str) -> Vec<SignalStatus> {
    raw.split(',')
        .filter_map(|s| SignalStatus::from_str(s.trim()).ok())
        .collect()
}

fn range_filter(time_range_hours: Option<i64>) -> SignalFilter {
    SignalFilter {
        created_after: time_range_hours.map(|h| Utc::now() - Duration::hours(h.max(0))),
        ..Default::default()
    }
}

// --- Handlers ---

pub async fn submit_sos(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubmitSosBody>,
) -> impl IntoResponse {
    let request = IntakeRequest {
        reporter_id: body.reporter_id,
        location: GeoPoint {
            lat: body.lat,
            lng: body.lng,
        },
        address: body.address,
        message: body.message,
        emergency_type: body.emergency_type,
        priority: body.priority,
    };

    match state.coordinator.intake(request).await {
        Ok(signal) => (StatusCode::CREATED, Json(json!({ "signal": signal }))).into_response(),
        Err(e) => {
            warn!(error = %e, "SOS intake failed");
            error_response(&e)
        }
    }
}

pub async fn assign_responder(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<AssignBody>,
) -> impl IntoResponse {
    match state
        .coordinator
        .assign(
            id,
            &body.responder_id,
            body.note,
            body.expected_version,
            body.reassign,
        )
        .await
    {
        Ok((signal, report)) => Json(json!({
            "signal": signal,
            "notifications": report.channel_summary(),
        }))
        .into_response(),
        Err(e) => {
            warn!(error = %e, signal_id = %id, "Assignment failed");
            error_response(&e)
        }
    }
}

pub async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<StatusBody>,
) -> impl IntoResponse {
    match state
        .coordinator
        .update_status(id, body.status, body.note, &body.actor)
        .await
    {
        Ok((signal, report)) => Json(json!({
            "signal": signal,
            "notifications": report.channel_summary(),
        }))
        .into_response(),
        Err(e) => {
            warn!(error = %e, signal_id = %id, "Status update failed");
            error_response(&e)
        }
    }
}

pub async fn escalate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<EscalateBody>,
) -> impl IntoResponse {
    match state
        .coordinator
        .escalate(id, body.level, &body.reason, &body.actor)
        .await
    {
        Ok((signal, report)) => Json(json!({
            "signal": signal,
            "notifications": report.channel_summary(),
        }))
        .into_response(),
        Err(e) => {
            warn!(error = %e, signal_id = %id, "Manual escalation failed");
            error_response(&e)
        }
    }
}

pub async fn get_signal(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.repo.get(id).await {
        Ok(versioned) => Json(json!({
            "signal": versioned.record,
            "version": versioned.version,
        }))
        .into_response(),
        Err(e) => {
            warn!(error = %e, signal_id = %id, "Signal lookup failed");
            error_response(&e)
        }
    }
}

pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DashboardQuery>,
) -> impl IntoResponse {
    let mut filter = range_filter(params.time_range);
    if let Some(raw) = &params.status {
        let statuses = parse_statuses(raw);
        if !statuses.is_empty() {
            filter.statuses = Some(statuses);
        }
    }
    if let Some(raw) = &params.priority {
        filter.priority = Priority::from_str(raw).ok();
    }

    match state.repo.find(&filter).await {
        Ok(signals) => Json(DashboardSummary::from_signals(signals)).into_response(),
        Err(e) => {
            warn!(error = %e, "Dashboard query failed");
            error_response(&e)
        }
    }
}

pub async fn clusters(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ClustersQuery>,
) -> impl IntoResponse {
    let radius = params
        .radius
        .unwrap_or(state.default_cluster_radius_km)
        .clamp(0.1, 50.0);

    match state.repo.find(&SignalFilter::non_terminal()).await {
        Ok(signals) => {
            let clusters = cluster_signals(&signals, radius);
            Json(json!({ "radius_km": radius, "clusters": clusters })).into_response()
        }
        Err(e) => {
            warn!(error = %e, "Cluster query failed");
            error_response(&e)
        }
    }
}

pub async fn analytics(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AnalyticsQuery>,
) -> impl IntoResponse {
    let filter = range_filter(params.time_range);
    match state.repo.find(&filter).await {
        Ok(signals) => Json(AnalyticsSummary::from_signals(&signals)).into_response(),
        Err(e) => {
            warn!(error = %e, "Analytics query failed");
            error_response(&e)
        }
    }
}

pub async fn register_responder(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterResponderBody>,
) -> impl IntoResponse {
    state
        .directory
        .register(
            body.responder_id.clone(),
            ResponderContact {
                email: body.email,
                phone: body.phone,
                push_token: body.push_token,
            },
        )
        .await;
    if let Some(lead) = body.team_lead {
        state.directory.set_team_lead(body.responder_id, lead).await;
    }
    StatusCode::NO_CONTENT
}

pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Query(params): Query<InboxQuery>,
) -> impl IntoResponse {
    let (notifications, unread_count) = state.store.list(&params.responder_id).await;
    Json(json!({
        "notifications": notifications,
        "unread_count": unread_count,
    }))
}

pub async fn mark_notification_read(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<MarkReadBody>,
) -> impl IntoResponse {
    match state.store.mark_read(&body.responder_id, id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            warn!(error = %e, notification_id = %id, "Mark-read failed");
            error_response(&e)
        }
    }
}
