//! HTTP server: router, middleware stack, and wiring from `AppConfig`.
//!
//! Request flow:
//! 1. Request tracing
//! 2. Origin check (unknown browser origins get 403, preflights included)
//! 3. CORS (preflight for known origins answered here)
//! 4. Per-client rate limit (`/api` only)
//! 5. Handler

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Request, State},
    http::{HeaderValue, Method, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::channels::{
    ChannelRoute, EmailChannel, EmailSender, NotificationDispatcher, SendGridMailer, SmsChannel,
    SmtpMailer, TwilioClient, WhatsAppChannel,
};
use crate::config::{AppConfig, EmailProviderConfig, RateLimitConfig};
use crate::error::Result;
use crate::leads::{LeadService, lead_routes};
use crate::rate_limit::{RateLimiter, rate_limit};
use crate::store::{LeadStore, LibSqlBackend};

/// JSON bodies larger than this are rejected with 413.
pub const MAX_BODY_BYTES: usize = 10 * 1024;

pub const ORIGIN_NOT_ALLOWED: &str = "CORS policy: Origin not allowed";

/// Build the full application router.
pub fn build_router(
    service: LeadService,
    allowed_origins: &[String],
    rate_limit_config: &RateLimitConfig,
) -> Router {
    let limiter = RateLimiter::new(rate_limit_config);
    let api_routes =
        lead_routes(service).layer(middleware::from_fn_with_state(limiter, rate_limit));

    let origins: Arc<[String]> = allowed_origins.into();
    let cors_origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(cors_origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(health))
        .nest("/api", api_routes)
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(middleware::from_fn_with_state(origins, check_origin))
        .layer(TraceLayer::new_for_http())
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().timestamp_millis(),
    }))
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({"error": "Not Found"})),
    )
}

/// Reject browser requests, preflights included, from unknown origins.
/// Requests without an `Origin` header (curl, server-to-server) pass.
async fn check_origin(
    State(allowed): State<Arc<[String]>>,
    req: Request,
    next: Next,
) -> Response {
    let origin = req
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    match origin {
        Some(origin) if !allowed.iter().any(|o| *o == origin) => {
            warn!(origin = %origin, "CORS: origin not allowed");
            (
                StatusCode::FORBIDDEN,
                Json(serde_json::json!({"error": ORIGIN_NOT_ALLOWED})),
            )
                .into_response()
        }
        _ => next.run(req).await,
    }
}

/// Wire one route per channel from config. Channels without a destination
/// are kept but never invoked.
pub fn build_dispatcher(config: &AppConfig) -> NotificationDispatcher {
    let twilio = Arc::new(TwilioClient::new(config.twilio.clone()));

    let mailer: Arc<dyn EmailSender> = match &config.email {
        EmailProviderConfig::Smtp(smtp) => Arc::new(SmtpMailer::new(smtp.clone())),
        EmailProviderConfig::SendGrid(sendgrid) => Arc::new(SendGridMailer::new(sendgrid.clone())),
    };

    let targets = &config.targets;
    NotificationDispatcher::new(vec![
        ChannelRoute::new(
            Arc::new(SmsChannel::new(twilio.clone())),
            targets.sms_to.clone(),
        ),
        ChannelRoute::new(
            Arc::new(WhatsAppChannel::new(twilio, config.twilio.whatsapp_from.clone())),
            targets.whatsapp_to.clone(),
        ),
        ChannelRoute::new(
            Arc::new(EmailChannel::new(mailer)),
            targets.email_to.clone(),
        ),
    ])
}

/// Open the store and assemble the submission service.
pub async fn build_service(config: &AppConfig) -> Result<LeadService> {
    let store: Arc<dyn LeadStore> = Arc::new(LibSqlBackend::new_local(&config.db_path).await?);
    let dispatcher = build_dispatcher(config);

    let planned: Vec<String> = dispatcher
        .planned()
        .iter()
        .map(|(channel, _)| channel.to_string())
        .collect();
    if planned.is_empty() {
        warn!("No notification destinations configured; leads will only be stored");
    } else {
        info!(channels = ?planned, "Notification channels enabled");
    }

    Ok(LeadService::new(store, dispatcher))
}

/// Bind and serve until Ctrl+C or SIGTERM.
pub async fn serve(config: AppConfig) -> Result<()> {
    let service = build_service(&config).await?;
    info!(origins = ?config.allowed_origins, "Allowed CORS origins");
    let app = build_router(service, &config.allowed_origins, &config.rate_limit);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!(error = %e, "Failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
