#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Utc};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use adaptive_assessment::assessment::{AssessmentType, EngineConfig, Response};
use adaptive_assessment::routes;
use adaptive_assessment::state::AppState;

pub fn create_test_app() -> (Router, AppState) {
    let state = AppState::in_memory(EngineConfig::default());
    (routes::router(state.clone()), state)
}

pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub struct ResponseBuilder {
    response: Response,
}

impl ResponseBuilder {
    pub fn new(user_id: &str, objective_id: &str) -> Self {
        Self {
            response: Response {
                user_id: user_id.to_string(),
                objective_id: objective_id.to_string(),
                session_id: None,
                question_id: None,
                topic: None,
                difficulty_at_time: 50.0,
                correct: true,
                score: 90.0,
                confidence: 5,
                latency_ms: 8000,
                timestamp: Utc::now(),
                assessment_type: AssessmentType::Explanation,
            },
        }
    }

    pub fn session(mut self, session_id: &str) -> Self {
        self.response.session_id = Some(session_id.to_string());
        self
    }

    pub fn question(mut self, question_id: &str) -> Self {
        self.response.question_id = Some(question_id.to_string());
        self
    }

    pub fn topic(mut self, topic: &str) -> Self {
        self.response.topic = Some(topic.to_string());
        self
    }

    pub fn difficulty(mut self, difficulty: f64) -> Self {
        self.response.difficulty_at_time = difficulty;
        self
    }

    pub fn scored(mut self, score: f64, confidence: u8) -> Self {
        self.response.score = score;
        self.response.correct = score >= 60.0;
        self.response.confidence = confidence;
        self
    }

    pub fn kind(mut self, kind: AssessmentType) -> Self {
        self.response.assessment_type = kind;
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.response.timestamp = timestamp;
        self
    }

    pub fn build(self) -> Response {
        self.response
    }
}
