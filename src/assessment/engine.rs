use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::assessment::calibration::{
    calculate_mean_absolute_error, calibrate_with_threshold, correlate_with_min_samples,
    identify_overconfident_topics, identify_underconfident_topics, interpret_with_min_samples,
    normalize_confidence, trend_with_epsilon, validate_score, CalibrationResult,
    CalibrationTrend, CorrelationInterpretation, TopicCalibration, TopicDelta,
};
use crate::assessment::config::EngineConfig;
use crate::assessment::difficulty::{
    DifficultyAdjustment, DifficultyController, DifficultyRange, TrajectoryEvent,
};
use crate::assessment::error::{AssessmentError, AssessmentResult};
use crate::assessment::knowledge::{
    EfficiencyMetrics, IrtObservation, KnowledgeEstimate, KnowledgeEstimator,
};
use crate::assessment::mastery::{MasteryReport, MasteryVerifier};
use crate::assessment::session::{AdaptiveSessionState, SessionEvent, SessionStore};
use crate::assessment::store::{QuestionBank, ResponseHistory};
use crate::assessment::types::{HistoryQuery, QuestionItem, QuestionQuery, Response, SessionKey};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextQuestionRequest {
    pub user_id: String,
    pub objective_id: String,
    pub session_id: String,
    #[serde(default)]
    pub last_score: Option<f64>,
    #[serde(default)]
    pub last_confidence: Option<u8>,
}

impl NextQuestionRequest {
    pub fn key(&self) -> SessionKey {
        SessionKey::new(&self.user_id, &self.objective_id, &self.session_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionSelection {
    Selected { question: QuestionItem },
    NoEligibleItem { range: DifficultyRange },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextQuestion {
    pub difficulty: f64,
    pub range: DifficultyRange,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adjustment: Option<DifficultyAdjustment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calibration: Option<CalibrationResult>,
    pub can_stop_early: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub knowledge_estimate: Option<KnowledgeEstimate>,
    pub question_count: u32,
    pub selection: QuestionSelection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationReport {
    pub sample_count: usize,
    pub correlation: Option<f64>,
    pub interpretation: CorrelationInterpretation,
    pub trend: CalibrationTrend,
    pub mean_absolute_error: f64,
    pub overconfident_topics: Vec<TopicCalibration>,
    pub underconfident_topics: Vec<TopicCalibration>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub key: SessionKey,
    pub final_difficulty: f64,
    pub question_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub knowledge_estimate: Option<KnowledgeEstimate>,
    pub efficiency: EfficiencyMetrics,
    pub trajectory: Vec<TrajectoryEvent>,
}

pub struct AssessmentEngine {
    config: EngineConfig,
    controller: DifficultyController,
    estimator: KnowledgeEstimator,
    verifier: MasteryVerifier,
    bank: Arc<dyn QuestionBank>,
    history: Arc<dyn ResponseHistory>,
    sessions: Arc<dyn SessionStore>,
    session_locks: Mutex<HashMap<SessionKey, Arc<Mutex<()>>>>,
}

impl AssessmentEngine {
    pub fn new(
        config: EngineConfig,
        bank: Arc<dyn QuestionBank>,
        history: Arc<dyn ResponseHistory>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            controller: DifficultyController::new(config.difficulty.clone()),
            estimator: KnowledgeEstimator::new(config.knowledge.clone()),
            verifier: MasteryVerifier::new(
                config.mastery.clone(),
                config.calibration.delta_threshold,
            ),
            config,
            bank,
            history,
            sessions,
            session_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn controller(&self) -> &DifficultyController {
        &self.controller
    }

    pub fn estimator(&self) -> &KnowledgeEstimator {
        &self.estimator
    }

    /// Runs `f` while holding the session's lock. The lock entry is dropped
    /// from the map once no other caller holds or waits on it.
    fn with_session_lock<T>(&self, key: &SessionKey, f: impl FnOnce() -> T) -> T {
        let lock = Arc::clone(self.session_locks.lock().entry(key.clone()).or_default());
        let result = {
            let _guard = lock.lock();
            f()
        };

        let mut locks = self.session_locks.lock();
        drop(lock);
        if locks.get(key).map_or(false, |l| Arc::strong_count(l) == 1) {
            locks.remove(key);
        }
        result
    }

    /// Sessions with a caller currently inside or queued on their lock.
    pub fn locked_session_count(&self) -> usize {
        self.session_locks.lock().len()
    }

    fn objective_history(&self, user_id: &str, objective_id: &str) -> AssessmentResult<Vec<Response>> {
        self.history.responses(&HistoryQuery {
            user_id: user_id.to_string(),
            objective_id: objective_id.to_string(),
            since: None,
        })
    }

    /// One adaptive cycle: adjust difficulty from the last answer, re-estimate
    /// ability over this session, and pick the next eligible question.
    pub fn next_question(&self, request: &NextQuestionRequest) -> AssessmentResult<NextQuestion> {
        if let Some(score) = request.last_score {
            validate_score(score)?;
        }
        if let Some(confidence) = request.last_confidence {
            normalize_confidence(confidence)?;
        }

        let key = request.key();
        self.with_session_lock(&key, || self.advance(&key, request))
    }

    fn advance(
        &self,
        key: &SessionKey,
        request: &NextQuestionRequest,
    ) -> AssessmentResult<NextQuestion> {
        let mut events = self.sessions.load(key)?;
        let mut state = match AdaptiveSessionState::replay(key, &events) {
            Some(state) => state,
            None => {
                let started = self.start_session(key)?;
                self.sessions.append(key, events.len() as u64, vec![started.clone()])?;
                events.push(started);
                AdaptiveSessionState::replay(key, &events).ok_or_else(|| {
                    AssessmentError::SessionNotFound(key.session_id.clone())
                })?
            }
        };

        let mut pending = Vec::new();
        let mut adjustment = None;
        let mut calibration = None;

        if let Some(score) = request.last_score {
            calibration = request
                .last_confidence
                .map(|c| calibrate_with_threshold(c, score, self.config.calibration.delta_threshold))
                .transpose()?;

            let adj = self.controller.adjust_difficulty(
                state.current_difficulty,
                score,
                calibration.as_ref(),
                state.question_count,
            )?;

            tracing::info!(
                session = %key,
                from = state.current_difficulty,
                to = adj.new_difficulty,
                score,
                reason = %adj.reason,
                "difficulty adjusted"
            );

            pending.push(SessionEvent::Adjusted(TrajectoryEvent {
                from: state.current_difficulty,
                to: adj.new_difficulty,
                adjustment: adj.adjustment,
                reason: adj.reason.clone(),
                score,
                calibration: calibration.as_ref().map(|c| c.category),
                at: Utc::now(),
            }));
            adjustment = Some(adj);
        }

        let history = self.objective_history(&key.user_id, &key.objective_id)?;
        let knowledge_estimate = self.estimate_session(key, &history)?;
        if let Some(ref estimate) = knowledge_estimate {
            tracing::debug!(
                session = %key,
                theta = estimate.theta,
                ci_width = estimate.confidence_interval_width,
                iterations = estimate.iterations,
                "knowledge estimated"
            );
            pending.push(SessionEvent::Estimated(estimate.clone()));
        }

        if !pending.is_empty() {
            self.sessions.append(key, state.version, pending.clone())?;
            events.extend(pending);
            state = AdaptiveSessionState::replay(key, &events)
                .ok_or_else(|| AssessmentError::SessionNotFound(key.session_id.clone()))?;
        }

        let difficulty = state.current_difficulty;
        let range = self.controller.difficulty_range(difficulty);
        let selection = self.select_question(key, range, &history)?;

        Ok(NextQuestion {
            difficulty,
            range,
            adjustment,
            calibration,
            can_stop_early: knowledge_estimate
                .as_ref()
                .map_or(false, |e| e.should_stop_early),
            knowledge_estimate,
            question_count: state.question_count,
            selection,
        })
    }

    fn start_session(&self, key: &SessionKey) -> AssessmentResult<SessionEvent> {
        let history = self.objective_history(&key.user_id, &key.objective_id)?;
        let prior: Vec<Response> = history
            .into_iter()
            .filter(|r| !r.belongs_to_session(&key.session_id))
            .collect();
        let related = self
            .history
            .related_responses(&key.user_id, &key.objective_id)?;
        let initial = self.controller.calculate_initial_difficulty(&prior, &related);

        tracing::info!(
            session = %key,
            difficulty = initial.difficulty,
            rationale = %initial.rationale,
            "adaptive session started"
        );

        Ok(SessionEvent::Started {
            difficulty: initial.difficulty,
            rationale: initial.rationale,
            at: Utc::now(),
        })
    }

    fn estimate_session(
        &self,
        key: &SessionKey,
        history: &[Response],
    ) -> AssessmentResult<Option<KnowledgeEstimate>> {
        let session: Vec<IrtObservation> = history
            .iter()
            .filter(|r| r.belongs_to_session(&key.session_id))
            .map(Response::observation)
            .collect();
        let start = session
            .len()
            .saturating_sub(self.config.knowledge.estimation_window);
        self.estimator.estimate_knowledge(&session[start..])
    }

    fn select_question(
        &self,
        key: &SessionKey,
        range: DifficultyRange,
        history: &[Response],
    ) -> AssessmentResult<QuestionSelection> {
        let exclude_ids: Vec<String> = history
            .iter()
            .rev()
            .filter_map(|r| r.question_id.clone())
            .take(self.config.selection.recent_exclusion)
            .collect();

        let query = QuestionQuery {
            objective_id: key.objective_id.clone(),
            difficulty_min: range.min,
            difficulty_max: range.max,
            exclude_ids,
        };

        Ok(match self.bank.find_eligible(&query)? {
            Some(question) => QuestionSelection::Selected { question },
            None => {
                tracing::warn!(
                    session = %key,
                    min = range.min,
                    max = range.max,
                    "no eligible question in difficulty band"
                );
                QuestionSelection::NoEligibleItem { range }
            }
        })
    }

    pub fn mastery_status(&self, user_id: &str, objective_id: &str) -> AssessmentResult<MasteryReport> {
        let history = self.objective_history(user_id, objective_id)?;
        let progress = self.verifier.verify(&history)?;
        let report = self.verifier.report(progress);

        tracing::debug!(
            user_id,
            objective_id,
            status = ?report.status,
            met = report.criteria.met_count(),
            "mastery evaluated"
        );
        Ok(report)
    }

    pub fn calibration_report(
        &self,
        user_id: &str,
        objective_id: &str,
    ) -> AssessmentResult<CalibrationReport> {
        let params = &self.config.calibration;
        let history = self.objective_history(user_id, objective_id)?;

        let calibrations = history
            .iter()
            .map(|r| calibrate_with_threshold(r.confidence, r.score, params.delta_threshold))
            .collect::<AssessmentResult<Vec<_>>>()?;

        let confidences: Vec<f64> = calibrations.iter().map(|c| c.confidence_normalized).collect();
        let scores: Vec<f64> = history.iter().map(|r| r.score).collect();
        let deltas: Vec<f64> = calibrations.iter().map(|c| c.calibration_delta).collect();

        let min_samples = params.min_correlation_samples;
        let correlation = correlate_with_min_samples(&confidences, &scores, min_samples)?;

        let n = history.len();
        let window = params.report_window.max(1);
        let recent_start = n.saturating_sub(window);
        let prior_start = recent_start.saturating_sub(window);
        let recent = correlate_with_min_samples(
            &confidences[recent_start..],
            &scores[recent_start..],
            min_samples,
        )?;
        let prior = if recent_start > prior_start {
            correlate_with_min_samples(
                &confidences[prior_start..recent_start],
                &scores[prior_start..recent_start],
                min_samples,
            )?
        } else {
            None
        };

        let topic_deltas: Vec<TopicDelta> = history
            .iter()
            .zip(&deltas)
            .filter_map(|(r, delta)| {
                r.topic.as_ref().map(|topic| TopicDelta {
                    topic: topic.clone(),
                    delta: *delta,
                })
            })
            .collect();

        Ok(CalibrationReport {
            sample_count: n,
            correlation,
            interpretation: interpret_with_min_samples(correlation, min_samples),
            trend: trend_with_epsilon(recent, prior, params.trend_epsilon),
            mean_absolute_error: calculate_mean_absolute_error(&deltas),
            overconfident_topics: identify_overconfident_topics(
                &topic_deltas,
                params.delta_threshold,
                params.min_topic_samples,
            ),
            underconfident_topics: identify_underconfident_topics(
                &topic_deltas,
                params.delta_threshold,
                params.min_topic_samples,
            ),
        })
    }

    /// Current state of an active session, including its difficulty trajectory.
    pub fn session_state(&self, key: &SessionKey) -> AssessmentResult<AdaptiveSessionState> {
        let events = self.sessions.load(key)?;
        AdaptiveSessionState::replay(key, &events)
            .ok_or_else(|| AssessmentError::SessionNotFound(key.session_id.clone()))
    }

    pub fn end_session(&self, key: &SessionKey) -> AssessmentResult<SessionSummary> {
        let summary = self.with_session_lock(key, || {
            let events = self.sessions.archive(key)?;
            let state = AdaptiveSessionState::replay(key, &events)
                .ok_or_else(|| AssessmentError::SessionNotFound(key.session_id.clone()))?;

            Ok::<_, AssessmentError>(SessionSummary {
                key: key.clone(),
                final_difficulty: state.current_difficulty,
                question_count: state.question_count,
                efficiency: self
                    .estimator
                    .calculate_efficiency_metrics(state.question_count as usize),
                knowledge_estimate: state.last_knowledge_estimate,
                trajectory: state.trajectory,
            })
        })?;

        tracing::info!(
            session = %key,
            questions = summary.question_count,
            final_difficulty = summary.final_difficulty,
            "adaptive session ended"
        );
        Ok(summary)
    }
}
