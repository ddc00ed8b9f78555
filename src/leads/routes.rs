//! REST endpoint for contact-form submissions.

use std::convert::Infallible;

use axum::{
    Json, Router,
    extract::{FromRequestParts, State, rejection::JsonRejection},
    http::{StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
    routing::post,
};
use tracing::{debug, error, warn};

use super::model::{ClientMeta, LeadSubmission};
use super::service::LeadService;
use crate::error::SubmitError;
use crate::rate_limit::client_addr;

pub const SUBMITTED_MESSAGE: &str = "Lead submitted successfully";
pub const SERVER_ERROR_MESSAGE: &str = "Server error. Try again later.";
pub const INVALID_BODY_MESSAGE: &str = "Invalid request body";

/// Build the lead routes. Mounted under `/api`.
pub fn lead_routes(service: LeadService) -> Router {
    Router::new()
        .route("/lead", post(submit_lead))
        .with_state(service)
}

impl<S: Send + Sync> FromRequestParts<S> for ClientMeta {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header_str = |name: header::HeaderName| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string()
        };
        Ok(ClientMeta {
            ip: client_addr(&parts.headers, &parts.extensions).unwrap_or_default(),
            user_agent: header_str(header::USER_AGENT),
            referrer: header_str(header::REFERER),
        })
    }
}

impl IntoResponse for SubmitError {
    fn into_response(self) -> Response {
        match self {
            Self::InvalidInput(message) => {
                (StatusCode::BAD_REQUEST, Json(serde_json::json!({"error": message})))
                    .into_response()
            }
            Self::Persistence(e) => {
                error!(error = %e, "Lead submission failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({"error": SERVER_ERROR_MESSAGE})),
                )
                    .into_response()
            }
        }
    }
}

async fn submit_lead(
    State(service): State<LeadService>,
    client: ClientMeta,
    payload: Result<Json<LeadSubmission>, JsonRejection>,
) -> Response {
    let submission = match payload {
        Ok(Json(submission)) => submission,
        Err(rejection) => return body_rejection(rejection),
    };

    match service.submit(submission, client).await {
        Ok(accepted) => {
            let lead_id = accepted.lead_id();
            accepted.spawn_notifications();
            (
                StatusCode::CREATED,
                Json(serde_json::json!({
                    "message": SUBMITTED_MESSAGE,
                    "leadId": lead_id,
                })),
            )
                .into_response()
        }
        Err(e) => {
            if let SubmitError::InvalidInput(message) = &e {
                debug!(reason = %message, "Rejected lead submission");
            }
            e.into_response()
        }
    }
}

fn body_rejection(rejection: JsonRejection) -> Response {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        warn!("Lead submission body too large");
        return (
            StatusCode::PAYLOAD_TOO_LARGE,
            Json(serde_json::json!({"error": "Request body too large"})),
        )
            .into_response();
    }
    debug!(reason = %rejection.body_text(), "Malformed lead submission body");
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({"error": INVALID_BODY_MESSAGE})),
    )
        .into_response()
}
