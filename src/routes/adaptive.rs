use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::assessment::calibration::calibrate_with_threshold;
use crate::assessment::{AssessmentType, NextQuestionRequest, SessionKey};
use crate::response::{ok, AppError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/next-question", post(next_question))
        .route("/responses", post(record_response))
        .route("/questions", post(add_question))
        .route("/objectives/:objective_id/related", post(relate_objective))
        .route("/mastery/:objective_id", get(mastery_status))
        .route("/calibration/:objective_id", get(calibration_report))
        .route("/sessions/:session_id", get(session_state))
        .route("/sessions/:session_id/end", post(end_session))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserQuery {
    user_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionQuery {
    user_id: String,
    objective_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordResponsePayload {
    user_id: String,
    objective_id: String,
    session_id: Option<String>,
    question_id: Option<String>,
    topic: Option<String>,
    difficulty: f64,
    correct: bool,
    score: f64,
    confidence: u8,
    #[serde(default)]
    latency_ms: i64,
    assessment_type: AssessmentType,
    timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddQuestionPayload {
    objective_id: String,
    difficulty: f64,
    assessment_type: Option<AssessmentType>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AddQuestionData {
    id: String,
}

async fn next_question(
    State(state): State<AppState>,
    Json(payload): Json<NextQuestionRequest>,
) -> Result<Response, AppError> {
    let next = state.engine().next_question(&payload)?;
    Ok(ok(next).into_response())
}

async fn record_response(
    State(state): State<AppState>,
    Json(payload): Json<RecordResponsePayload>,
) -> Result<Response, AppError> {
    let engine = state.engine();
    let calibration = calibrate_with_threshold(
        payload.confidence,
        payload.score,
        engine.config().calibration.delta_threshold,
    )?;

    state.history().record(crate::assessment::Response {
        user_id: payload.user_id,
        objective_id: payload.objective_id,
        session_id: payload.session_id,
        question_id: payload.question_id,
        topic: payload.topic,
        difficulty_at_time: payload.difficulty,
        correct: payload.correct,
        score: payload.score,
        confidence: payload.confidence,
        latency_ms: payload.latency_ms,
        timestamp: payload.timestamp.unwrap_or_else(Utc::now),
        assessment_type: payload.assessment_type,
    })?;

    Ok(ok(calibration).into_response())
}

async fn add_question(
    State(state): State<AppState>,
    Json(payload): Json<AddQuestionPayload>,
) -> Result<Response, AppError> {
    let id = state.bank().add_question(
        &payload.objective_id,
        payload.difficulty,
        payload.assessment_type,
    )?;
    Ok(ok(AddQuestionData { id }).into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelatePayload {
    related_objective_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RelateData {
    objective_id: String,
    related_objective_id: String,
    created: bool,
}

async fn relate_objective(
    State(state): State<AppState>,
    Path(objective_id): Path<String>,
    Json(payload): Json<RelatePayload>,
) -> Result<Response, AppError> {
    if payload.related_objective_id.trim().is_empty() {
        return Err(AppError::validation("relatedObjectiveId must not be empty"));
    }
    let created = state
        .history()
        .relate(&objective_id, &payload.related_objective_id);
    Ok(ok(RelateData {
        objective_id,
        related_objective_id: payload.related_objective_id,
        created,
    })
    .into_response())
}

async fn mastery_status(
    State(state): State<AppState>,
    Path(objective_id): Path<String>,
    Query(query): Query<UserQuery>,
) -> Result<Response, AppError> {
    let report = state.engine().mastery_status(&query.user_id, &objective_id)?;
    Ok(ok(report).into_response())
}

async fn calibration_report(
    State(state): State<AppState>,
    Path(objective_id): Path<String>,
    Query(query): Query<UserQuery>,
) -> Result<Response, AppError> {
    let report = state
        .engine()
        .calibration_report(&query.user_id, &objective_id)?;
    Ok(ok(report).into_response())
}

async fn session_state(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<SessionQuery>,
) -> Result<Response, AppError> {
    let key = SessionKey::new(query.user_id, query.objective_id, session_id);
    let session = state.engine().session_state(&key)?;
    Ok(ok(session).into_response())
}

async fn end_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(body): Json<SessionQuery>,
) -> Result<Response, AppError> {
    let key = SessionKey::new(body.user_id, body.objective_id, session_id);
    let summary = state.engine().end_session(&key)?;
    Ok(ok(summary).into_response())
}
