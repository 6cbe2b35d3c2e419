use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::assessment::knowledge::IrtObservation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssessmentType {
    Explanation,
    MultipleChoice,
    ClinicalReasoning,
    ConceptMap,
    Application,
}

/// One graded answer. Created once per submission and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub user_id: String,
    pub objective_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    pub difficulty_at_time: f64,
    pub correct: bool,
    pub score: f64,
    pub confidence: u8,
    pub latency_ms: i64,
    pub timestamp: DateTime<Utc>,
    pub assessment_type: AssessmentType,
}

impl Response {
    pub fn observation(&self) -> IrtObservation {
        IrtObservation {
            difficulty: self.difficulty_at_time,
            correct: self.correct,
            latency_ms: self.latency_ms,
        }
    }

    pub fn belongs_to_session(&self, session_id: &str) -> bool {
        self.session_id.as_deref() == Some(session_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionKey {
    pub user_id: String,
    pub objective_id: String,
    pub session_id: String,
}

impl SessionKey {
    pub fn new(
        user_id: impl Into<String>,
        objective_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            objective_id: objective_id.into(),
            session_id: session_id.into(),
        }
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.user_id, self.objective_id, self.session_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionItem {
    pub id: String,
    pub objective_id: String,
    pub difficulty: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assessment_type: Option<AssessmentType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionQuery {
    pub objective_id: String,
    pub difficulty_min: f64,
    pub difficulty_max: f64,
    pub exclude_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub user_id: String,
    pub objective_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assessment_type_wire_names() {
        let json = serde_json::to_value(AssessmentType::ConceptMap).unwrap();
        assert_eq!(json, "CONCEPT_MAP");
        let parsed: AssessmentType = serde_json::from_str("\"MULTIPLE_CHOICE\"").unwrap();
        assert_eq!(parsed, AssessmentType::MultipleChoice);
        assert!(serde_json::from_str::<AssessmentType>("\"ESSAY\"").is_err());
    }

    #[test]
    fn test_response_serializes_camel_case() {
        let response = Response {
            user_id: "u1".into(),
            objective_id: "o1".into(),
            session_id: Some("s1".into()),
            question_id: None,
            topic: None,
            difficulty_at_time: 50.0,
            correct: true,
            score: 90.0,
            confidence: 4,
            latency_ms: 4200,
            timestamp: Utc::now(),
            assessment_type: AssessmentType::ClinicalReasoning,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["difficultyAtTime"], 50.0);
        assert_eq!(json["assessmentType"], "CLINICAL_REASONING");
        assert!(json.get("questionId").is_none());
        assert!(response.belongs_to_session("s1"));
        assert!(!response.belongs_to_session("s2"));

        assert_eq!(response.observation().difficulty, 50.0);
    }
}
