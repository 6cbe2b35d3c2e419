use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::state::AppState;

const SERVICE_NAME: &str = "adaptive-assessment";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(status))
        .route("/live", get(liveness))
        .route("/info", get(service_info))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Status {
    status: &'static str,
    timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    uptime: Option<u64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ServiceInfo {
    service: &'static str,
    version: &'static str,
    start_time: String,
    uptime: u64,
    question_bank_size: usize,
    engine: EngineSummary,
}

/// Thresholds the running engine was configured with.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EngineSummary {
    calibration_threshold: f64,
    difficulty_band: f64,
    stop_ci_width: f64,
    mastery_window: usize,
}

async fn status() -> Json<Status> {
    Json(Status {
        status: "ok",
        timestamp: rfc3339(Utc::now()),
        uptime: None,
    })
}

async fn liveness(State(state): State<AppState>) -> Json<Status> {
    Json(Status {
        status: "healthy",
        timestamp: rfc3339(Utc::now()),
        uptime: Some(state.uptime_seconds()),
    })
}

async fn service_info(State(state): State<AppState>) -> Json<ServiceInfo> {
    let engine = state.engine();
    let config = engine.config();

    Json(ServiceInfo {
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        start_time: rfc3339(state.started_at_system().into()),
        uptime: state.uptime_seconds(),
        question_bank_size: state.bank().len(),
        engine: EngineSummary {
            calibration_threshold: config.calibration.delta_threshold,
            difficulty_band: config.difficulty.band_half_width,
            stop_ci_width: config.knowledge.stop_ci_width,
            mastery_window: config.mastery.window,
        },
    })
}

fn rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
