use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{
    http::{header, HeaderValue},
    routing::{get, post, put},
    Router,
};
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lifeline_common::{file_config::load_config, AppConfig, FileConfig};
use lifeline_notify::{
    DeliveryChannel, EmailChannel, MemoryDirectory, NotificationDispatcher, NotificationStore,
    PushChannel, SmsChannel,
};
use lifeline_triage::{
    AssignmentCoordinator, EscalationEngine, MemorySignalRepository, SignalRepository,
};

mod rest;

pub struct AppState {
    pub repo: Arc<dyn SignalRepository>,
    pub coordinator: AssignmentCoordinator,
    pub store: Arc<NotificationStore>,
    pub directory: Arc<MemoryDirectory>,
    pub default_cluster_radius_km: f64,
}

/// Build the external channel set from config toggles and env credentials.
/// A toggled-on channel with missing credentials is dropped with a warning,
/// not a startup failure.
fn build_channels(config: &AppConfig, file_config: &FileConfig) -> Vec<Arc<dyn DeliveryChannel>> {
    let mut channels: Vec<Arc<dyn DeliveryChannel>> = Vec::new();

    if file_config.channels.sms_enabled {
        match (
            &config.sms_account_sid,
            &config.sms_auth_token,
            &config.sms_from_number,
        ) {
            (Some(sid), Some(token), Some(from)) => {
                channels.push(Arc::new(SmsChannel::new(sid, token, from)));
            }
            _ => tracing::warn!("SMS channel enabled but credentials missing; disabled"),
        }
    }
    if file_config.channels.email_enabled {
        match (&config.email_api_url, &config.email_api_key) {
            (Some(url), Some(key)) => channels.push(Arc::new(EmailChannel::new(url, key))),
            _ => tracing::warn!("Email channel enabled but credentials missing; disabled"),
        }
    }
    if file_config.channels.push_enabled {
        match (&config.push_api_url, &config.push_api_key) {
            (Some(url), Some(key)) => channels.push(Arc::new(PushChannel::new(url, key))),
            _ => tracing::warn!("Push channel enabled but credentials missing; disabled"),
        }
    }

    channels
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting lifeline-api");

    let config = AppConfig::from_env()?;
    let file_config = match &config.triage_config_path {
        Some(path) => load_config(Path::new(path))?,
        None => FileConfig::default(),
    };

    let repo = Arc::new(MemorySignalRepository::new());
    let store = Arc::new(NotificationStore::new());
    let directory = Arc::new(MemoryDirectory::new());

    let channels = build_channels(&config, &file_config);
    info!(channel_count = channels.len(), "External channels configured");

    let dispatcher = Arc::new(NotificationDispatcher::new(
        store.clone(),
        directory.clone(),
        channels,
        Duration::from_secs(file_config.channels.delivery_timeout_secs),
    ));

    let coordinator = AssignmentCoordinator::new(
        repo.clone(),
        dispatcher.clone(),
        directory.clone(),
        file_config.escalation.max_level,
    );

    let engine = Arc::new(EscalationEngine::new(
        repo.clone(),
        dispatcher,
        directory.clone(),
        file_config.escalation.clone(),
    ));
    engine.spawn();

    let state = Arc::new(AppState {
        repo,
        coordinator,
        store,
        directory,
        default_cluster_radius_km: file_config.triage.cluster_radius_km,
    });

    let app = Router::new()
        .route("/", get(|| async { "ok" }))
        // SOS lifecycle
        .route("/sos", post(rest::submit_sos))
        .route("/sos/{id}", get(rest::get_signal))
        .route("/sos/{id}/assign", put(rest::assign_responder))
        .route("/sos/{id}/status", put(rest::update_status))
        .route("/sos/{id}/escalate", post(rest::escalate))
        // Read models
        .route("/sos/dashboard", get(rest::dashboard))
        .route("/sos/clusters", get(rest::clusters))
        .route("/sos/analytics", get(rest::analytics))
        // Responders and their inbox
        .route("/responder", post(rest::register_responder))
        .route("/responder/notifications", get(rest::list_notifications))
        .route(
            "/responder/notifications/{id}/read",
            put(rest::mark_notification_read),
        )
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        // Method + path + status only: no query params, no reporter data
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        );

    let addr = format!("{}:{}", config.api_host, config.api_port);
    info!("Lifeline triage API starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
