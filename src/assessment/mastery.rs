//! Five-criterion mastery verification.
//!
//! Evidence is a window of consecutive responses on an objective.
//! `VERIFIED` requires every criterion at once within one window; there is no
//! partial credit, and once reached it is never revoked.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::assessment::calibration::{
    calibrate_with_threshold, classify_delta, CalibrationCategory, CALIBRATION_THRESHOLD,
};
use crate::assessment::config::MasteryParams;
use crate::assessment::error::AssessmentResult;
use crate::assessment::types::{AssessmentType, Response};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MasteryStatus {
    NotStarted,
    InProgress,
    Verified,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasteryCriteria {
    pub consecutive_high_scores: bool,
    pub multiple_assessment_types: bool,
    pub appropriate_difficulty: bool,
    pub accurate_calibration: bool,
    pub time_spaced: bool,
}

impl MasteryCriteria {
    pub fn all_met(&self) -> bool {
        self.consecutive_high_scores
            && self.multiple_assessment_types
            && self.appropriate_difficulty
            && self.accurate_calibration
            && self.time_spaced
    }

    pub fn met_count(&self) -> usize {
        [
            self.consecutive_high_scores,
            self.multiple_assessment_types,
            self.appropriate_difficulty,
            self.accurate_calibration,
            self.time_spaced,
        ]
        .iter()
        .filter(|met| **met)
        .count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentEvidence {
    pub assessment_type: AssessmentType,
    pub score: f64,
    pub date: DateTime<Utc>,
    pub calibration_delta: f64,
    pub difficulty: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MasteryProgress {
    NotStarted,
    InProgress {
        criteria: MasteryCriteria,
        evidence: Vec<AssessmentEvidence>,
    },
    Verified {
        criteria: MasteryCriteria,
        evidence: Vec<AssessmentEvidence>,
        verified_at: DateTime<Utc>,
    },
}

impl MasteryProgress {
    pub fn status(&self) -> MasteryStatus {
        match self {
            Self::NotStarted => MasteryStatus::NotStarted,
            Self::InProgress { .. } => MasteryStatus::InProgress,
            Self::Verified { .. } => MasteryStatus::Verified,
        }
    }

    pub fn criteria(&self) -> MasteryCriteria {
        match self {
            Self::NotStarted => MasteryCriteria::default(),
            Self::InProgress { criteria, .. } | Self::Verified { criteria, .. } => *criteria,
        }
    }

    pub fn evidence(&self) -> &[AssessmentEvidence] {
        match self {
            Self::NotStarted => &[],
            Self::InProgress { evidence, .. } | Self::Verified { evidence, .. } => evidence,
        }
    }

    pub fn verified_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Verified { verified_at, .. } => Some(*verified_at),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasteryReport {
    pub status: MasteryStatus,
    pub criteria: MasteryCriteria,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
    pub next_steps: Vec<String>,
    pub recent_assessments: Vec<AssessmentEvidence>,
}

#[derive(Debug, Clone)]
pub struct MasteryVerifier {
    params: MasteryParams,
    calibration_threshold: f64,
}

impl Default for MasteryVerifier {
    fn default() -> Self {
        Self::new(MasteryParams::default(), CALIBRATION_THRESHOLD)
    }
}

impl MasteryVerifier {
    pub fn new(params: MasteryParams, calibration_threshold: f64) -> Self {
        Self {
            params,
            calibration_threshold,
        }
    }

    /// `Verified` is terminal: once any window of consecutive responses met
    /// every criterion, later responses do not revoke it.
    pub fn verify(&self, history: &[Response]) -> AssessmentResult<MasteryProgress> {
        if history.is_empty() {
            return Ok(MasteryProgress::NotStarted);
        }

        let mut ordered: Vec<&Response> = history.iter().collect();
        ordered.sort_by_key(|r| r.timestamp);

        let evidence = ordered
            .iter()
            .map(|r| {
                let calibration =
                    calibrate_with_threshold(r.confidence, r.score, self.calibration_threshold)?;
                Ok(AssessmentEvidence {
                    assessment_type: r.assessment_type,
                    score: r.score,
                    date: r.timestamp,
                    calibration_delta: calibration.calibration_delta,
                    difficulty: r.difficulty_at_time,
                })
            })
            .collect::<AssessmentResult<Vec<_>>>()?;

        let size = self.params.window.max(1);
        for window in evidence.windows(size) {
            let criteria = self.evaluate(window);
            if !criteria.all_met() {
                continue;
            }
            if let Some(verified_at) = self.verified_at(window) {
                return Ok(MasteryProgress::Verified {
                    criteria,
                    evidence: window.to_vec(),
                    verified_at,
                });
            }
        }

        let latest = evidence[evidence.len().saturating_sub(size)..].to_vec();
        Ok(MasteryProgress::InProgress {
            criteria: self.evaluate(&latest),
            evidence: latest,
        })
    }

    fn verified_at(&self, window: &[AssessmentEvidence]) -> Option<DateTime<Utc>> {
        window
            .iter()
            .filter(|e| e.score >= self.params.high_score)
            .map(|e| e.date)
            .max()
    }

    /// Criteria 2-5 are judged over the high-scoring part of the window.
    pub fn evaluate(&self, window: &[AssessmentEvidence]) -> MasteryCriteria {
        let p = &self.params;
        let qualifying: Vec<&AssessmentEvidence> =
            window.iter().filter(|e| e.score >= p.high_score).collect();

        let consecutive_high_scores =
            window.len() >= p.window && qualifying.len() == window.len();

        let types: BTreeSet<AssessmentType> =
            qualifying.iter().map(|e| e.assessment_type).collect();
        let multiple_assessment_types = types.len() >= p.min_assessment_types;

        let appropriate_difficulty = !qualifying.is_empty()
            && qualifying.iter().all(|e| e.difficulty >= p.min_difficulty);

        let accurate_calibration = !qualifying.is_empty()
            && qualifying.iter().all(|e| {
                classify_delta(e.calibration_delta, self.calibration_threshold)
                    == CalibrationCategory::Calibrated
            });

        let time_spaced = match (
            qualifying.iter().map(|e| e.date).min(),
            qualifying.iter().map(|e| e.date).max(),
        ) {
            (Some(first), Some(last)) => last - first >= Duration::hours(p.min_span_hours),
            _ => false,
        };

        MasteryCriteria {
            consecutive_high_scores,
            multiple_assessment_types,
            appropriate_difficulty,
            accurate_calibration,
            time_spaced,
        }
    }

    pub fn next_steps(&self, criteria: &MasteryCriteria) -> Vec<String> {
        let p = &self.params;
        let mut steps = Vec::new();
        if !criteria.consecutive_high_scores {
            steps.push(format!(
                "Score {:.0} or higher on {} assessments in a row.",
                p.high_score, p.window
            ));
        }
        if !criteria.multiple_assessment_types {
            steps.push(format!(
                "Show mastery in at least {} different assessment formats.",
                p.min_assessment_types
            ));
        }
        if !criteria.appropriate_difficulty {
            steps.push(format!(
                "Answer questions at difficulty {:.0} or above.",
                p.min_difficulty
            ));
        }
        if !criteria.accurate_calibration {
            steps.push("Rate your confidence so it matches how well you actually perform.".to_string());
        }
        if !criteria.time_spaced {
            steps.push(format!(
                "Return to this objective after at least {} hours to confirm retention.",
                p.min_span_hours
            ));
        }
        steps
    }

    pub fn report(&self, progress: MasteryProgress) -> MasteryReport {
        let criteria = progress.criteria();
        MasteryReport {
            status: progress.status(),
            criteria,
            verified_at: progress.verified_at(),
            next_steps: self.next_steps(&criteria),
            recent_assessments: progress.evidence().to_vec(),
        }
    }
}
