use std::collections::{HashMap, HashSet};

use chrono::Utc;
use parking_lot::RwLock;

use crate::assessment::calibration::{normalize_confidence, validate_score};
use crate::assessment::error::{AssessmentError, AssessmentResult};
use crate::assessment::types::{AssessmentType, HistoryQuery, QuestionItem, QuestionQuery, Response};

pub trait QuestionBank: Send + Sync {
    /// The bank's single top pick within the band, least recently used first.
    fn find_eligible(&self, query: &QuestionQuery) -> AssessmentResult<Option<QuestionItem>>;
}

pub trait ResponseHistory: Send + Sync {
    /// Responses ordered oldest first.
    fn responses(&self, query: &HistoryQuery) -> AssessmentResult<Vec<Response>>;

    fn related_responses(
        &self,
        _user_id: &str,
        _objective_id: &str,
    ) -> AssessmentResult<Vec<Response>> {
        Ok(Vec::new())
    }
}

#[derive(Default)]
pub struct InMemoryQuestionBank {
    items: RwLock<Vec<QuestionItem>>,
}

impl InMemoryQuestionBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_question(
        &self,
        objective_id: &str,
        difficulty: f64,
        assessment_type: Option<AssessmentType>,
    ) -> AssessmentResult<String> {
        if !difficulty.is_finite() || !(0.0..=100.0).contains(&difficulty) {
            return Err(AssessmentError::InvalidDifficulty(difficulty));
        }
        let id = uuid::Uuid::new_v4().to_string();
        self.items.write().push(QuestionItem {
            id: id.clone(),
            objective_id: objective_id.to_string(),
            difficulty,
            assessment_type,
            last_used_at: None,
        });
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}

impl QuestionBank for InMemoryQuestionBank {
    fn find_eligible(&self, query: &QuestionQuery) -> AssessmentResult<Option<QuestionItem>> {
        let excluded: HashSet<&str> = query.exclude_ids.iter().map(String::as_str).collect();
        let mut items = self.items.write();

        let pick = items
            .iter_mut()
            .filter(|q| q.objective_id == query.objective_id)
            .filter(|q| q.difficulty >= query.difficulty_min && q.difficulty <= query.difficulty_max)
            .filter(|q| !excluded.contains(q.id.as_str()))
            .min_by_key(|q| q.last_used_at);

        Ok(pick.map(|q| {
            q.last_used_at = Some(Utc::now());
            q.clone()
        }))
    }
}

#[derive(Default)]
pub struct InMemoryResponseHistory {
    responses: RwLock<Vec<Response>>,
    related: RwLock<HashMap<String, Vec<String>>>,
}

impl InMemoryResponseHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a response after checking the confidence, score and difficulty scales.
    pub fn record(&self, response: Response) -> AssessmentResult<()> {
        normalize_confidence(response.confidence)?;
        validate_score(response.score)?;
        let d = response.difficulty_at_time;
        if !d.is_finite() || !(0.0..=100.0).contains(&d) {
            return Err(AssessmentError::InvalidDifficulty(d));
        }
        self.responses.write().push(response);
        Ok(())
    }

    /// Marks `related_objective_id` as a seed source for new sessions on
    /// `objective_id`. Returns `false` if the link already existed.
    pub fn relate(&self, objective_id: &str, related_objective_id: &str) -> bool {
        let mut related = self.related.write();
        let links = related.entry(objective_id.to_string()).or_default();
        if objective_id == related_objective_id
            || links.iter().any(|l| l == related_objective_id)
        {
            return false;
        }
        links.push(related_objective_id.to_string());
        true
    }
}

impl ResponseHistory for InMemoryResponseHistory {
    fn responses(&self, query: &HistoryQuery) -> AssessmentResult<Vec<Response>> {
        let mut matching: Vec<Response> = self
            .responses
            .read()
            .iter()
            .filter(|r| r.user_id == query.user_id && r.objective_id == query.objective_id)
            .filter(|r| query.since.map_or(true, |since| r.timestamp >= since))
            .cloned()
            .collect();
        matching.sort_by_key(|r| r.timestamp);
        Ok(matching)
    }

    fn related_responses(&self, user_id: &str, objective_id: &str) -> AssessmentResult<Vec<Response>> {
        let related = self.related.read().get(objective_id).cloned().unwrap_or_default();
        let mut matching: Vec<Response> = self
            .responses
            .read()
            .iter()
            .filter(|r| r.user_id == user_id && related.contains(&r.objective_id))
            .cloned()
            .collect();
        matching.sort_by_key(|r| r.timestamp);
        Ok(matching)
    }
}
