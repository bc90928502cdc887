use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use axum_client_ip::InsecureClientIp;
use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::{FeedbackRequest, TeamApplicationRequest, TelegramResponse};
use tracing::{info, warn};

use crate::api::AppState;
use crate::rate_limit::RateLimiter;

type FormResult = (StatusCode, Json<TelegramResponse>);

/// Client address as seen through the proxy headers, falling back to the peer.
fn client_ip(ip: Option<InsecureClientIp>) -> String {
    ip.map(|ip| ip.0.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn rejected(status: StatusCode, message: impl Into<String>) -> FormResult {
    (status, Json(TelegramResponse::failed(message)))
}

fn delivered(response: TelegramResponse) -> FormResult {
    let status = if response.success {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };

    (status, Json(response))
}

/// Rate limit first, then the body and its validation. `Ok` carries the form to send.
fn admit<T>(
    state: &AppState,
    client_ip: &str,
    action: &str,
    payload: Result<Json<T>, JsonRejection>,
    validate: impl FnOnce(&T) -> Result<(), Vec<String>>,
) -> Result<T, FormResult> {
    let decision = state
        .limiter
        .check(&RateLimiter::key(client_ip, action), Instant::now());
    if !decision.is_allowed() {
        warn!(client_ip, action, "Rate limit exceeded");
        return Err(rejected(StatusCode::TOO_MANY_REQUESTS, decision.message()));
    }

    let Json(form) = payload.map_err(|rejection| {
        warn!(client_ip, action, reason = %rejection.body_text(), "Unreadable form");
        rejected(StatusCode::BAD_REQUEST, rejection.body_text())
    })?;

    if let Err(errors) = validate(&form) {
        return Err(rejected(StatusCode::BAD_REQUEST, errors.join("; ")));
    }

    Ok(form)
}

pub async fn feedback(
    State(state): State<AppState>,
    ip: Option<InsecureClientIp>,
    payload: Result<Json<FeedbackRequest>, JsonRejection>,
) -> FormResult {
    let client_ip = client_ip(ip);
    let request = match admit(&state, &client_ip, "feedback", payload, FeedbackRequest::validate) {
        Ok(request) => request,
        Err(rejection) => return rejection,
    };

    info!(player_nick = %request.player_nick, "Received feedback");

    delivered(state.notifier.send_feedback(&request).await)
}

pub async fn team_application(
    State(state): State<AppState>,
    ip: Option<InsecureClientIp>,
    payload: Result<Json<TeamApplicationRequest>, JsonRejection>,
) -> FormResult {
    let client_ip = client_ip(ip);
    let request = match admit(&state, &client_ip, "team", payload, TeamApplicationRequest::validate) {
        Ok(request) => request,
        Err(rejection) => return rejection,
    };

    info!(
        player_nick = %request.player_nick,
        role = %request.role,
        "Received team application"
    );

    delivered(state.notifier.send_team_application(&request).await)
}

#[derive(Serialize)]
pub struct Health {
    status: &'static str,
    timestamp: DateTime<Utc>,
}

pub async fn health() -> Json<Health> {
    Json(Health {
        status: "healthy",
        timestamp: Utc::now(),
    })
}
