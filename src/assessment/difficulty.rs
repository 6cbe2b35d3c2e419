use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::assessment::calibration::{validate_score, CalibrationCategory, CalibrationResult};
use crate::assessment::config::DifficultyParams;
use crate::assessment::error::{AssessmentError, AssessmentResult};
use crate::assessment::types::Response;

pub const MIN_DIFFICULTY: f64 = 0.0;
pub const MAX_DIFFICULTY: f64 = 100.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitialDifficulty {
    pub difficulty: f64,
    pub rationale: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DifficultyAdjustment {
    pub new_difficulty: f64,
    pub adjustment: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DifficultyRange {
    pub min: f64,
    pub max: f64,
}

impl DifficultyRange {
    pub fn contains(&self, difficulty: f64) -> bool {
        difficulty >= self.min && difficulty <= self.max
    }
}

/// One entry of a session's difficulty audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrajectoryEvent {
    pub from: f64,
    pub to: f64,
    pub adjustment: f64,
    pub reason: String,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calibration: Option<CalibrationCategory>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct DifficultyController {
    params: DifficultyParams,
}

impl DifficultyController {
    pub fn new(params: DifficultyParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &DifficultyParams {
        &self.params
    }

    /// Seeds a new session from the learner's past scores on this objective,
    /// falling back to a related objective's history and then to the baseline.
    pub fn calculate_initial_difficulty(
        &self,
        history: &[Response],
        related: &[Response],
    ) -> InitialDifficulty {
        let p = &self.params;

        if let Some((smoothed, n)) = self.smoothed_score(history) {
            let difficulty = self.shrink_toward_baseline(smoothed, n, 1.0);
            return InitialDifficulty {
                difficulty,
                rationale: format!(
                    "seeded from {n} prior responses on this objective (smoothed score {smoothed:.0})"
                ),
            };
        }

        if let Some((smoothed, n)) = self.smoothed_score(related) {
            let difficulty = self.shrink_toward_baseline(smoothed, n, p.related_weight);
            return InitialDifficulty {
                difficulty,
                rationale: format!(
                    "seeded from {n} responses on related objectives (smoothed score {smoothed:.0})"
                ),
            };
        }

        InitialDifficulty {
            difficulty: p.baseline,
            rationale: "no prior history - starting at baseline".to_string(),
        }
    }

    fn smoothed_score(&self, history: &[Response]) -> Option<(f64, usize)> {
        let mut ordered: Vec<&Response> = history
            .iter()
            .filter(|r| r.score.is_finite() && (0.0..=100.0).contains(&r.score))
            .collect();
        if ordered.is_empty() {
            return None;
        }
        ordered.sort_by_key(|r| r.timestamp);

        let alpha = self.params.smoothing_alpha;
        let mut ema = ordered[0].score;
        for r in &ordered[1..] {
            ema = alpha * r.score + (1.0 - alpha) * ema;
        }
        Some((ema, ordered.len()))
    }

    fn shrink_toward_baseline(&self, smoothed: f64, n: usize, weight: f64) -> f64 {
        let p = &self.params;
        let n = n as f64;
        let w = n / (n + p.shrinkage_prior) * weight;
        (p.baseline + w * (smoothed - p.baseline)).clamp(MIN_DIFFICULTY, MAX_DIFFICULTY)
    }

    pub fn annealing_factor(&self, question_count: u32) -> f64 {
        (1.0 / ((question_count as f64) + 1.0).sqrt()).max(self.params.annealing_floor)
    }

    pub fn adjust_difficulty(
        &self,
        current: f64,
        last_score: f64,
        calibration: Option<&CalibrationResult>,
        question_count: u32,
    ) -> AssessmentResult<DifficultyAdjustment> {
        validate_score(last_score)?;
        if !current.is_finite() {
            return Err(AssessmentError::InvalidDifficulty(current));
        }

        let p = &self.params;
        let current = current.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY);
        let anneal = self.annealing_factor(question_count);
        let shown = last_score.round() as i64;

        let (mut step, mut reason) = if last_score >= p.high_score {
            (
                p.large_step * anneal,
                format!("high score ({shown}) - increasing difficulty"),
            )
        } else if last_score >= p.moderate_score {
            (
                p.moderate_step * anneal,
                format!("solid score ({shown}) - moderately increasing difficulty"),
            )
        } else if last_score >= p.low_score {
            (0.0, format!("borderline score ({shown}) - holding difficulty"))
        } else {
            let shortfall = (p.low_score - last_score) / p.low_score;
            (
                -p.max_decrease * shortfall * anneal,
                format!("low score ({shown}) - decreasing difficulty"),
            )
        };

        match calibration.map(|c| c.category) {
            Some(CalibrationCategory::Overconfident) if last_score < p.moderate_score => {
                if step < 0.0 {
                    step *= p.overconfident_amplify;
                    reason.push_str("; confident but incorrect, stepping down faster");
                } else {
                    step = -p.overconfident_nudge * anneal;
                    reason.push_str("; confident but incorrect, easing difficulty");
                }
            }
            Some(CalibrationCategory::Underconfident)
                if last_score >= p.moderate_score && step > 0.0 =>
            {
                step *= p.underconfident_dampen;
                reason.push_str("; correct but unsure, tempering the increase");
            }
            _ => {}
        }

        let new_difficulty = (current + step).clamp(MIN_DIFFICULTY, MAX_DIFFICULTY);

        Ok(DifficultyAdjustment {
            new_difficulty,
            adjustment: new_difficulty - current,
            reason,
        })
    }

    /// Symmetric band around `difficulty` used to select eligible questions.
    pub fn difficulty_range(&self, difficulty: f64) -> DifficultyRange {
        let half = self.params.band_half_width;
        DifficultyRange {
            min: (difficulty - half).max(MIN_DIFFICULTY),
            max: (difficulty + half).min(MAX_DIFFICULTY),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assessment::calibration::calculate_calibration;
    use crate::assessment::types::AssessmentType;
    use chrono::Duration;

    fn response(score: f64, minutes_ago: i64) -> Response {
        Response {
            user_id: "u1".into(),
            objective_id: "o1".into(),
            session_id: None,
            question_id: None,
            topic: None,
            difficulty_at_time: 50.0,
            correct: score >= 60.0,
            score,
            confidence: 3,
            latency_ms: 5000,
            timestamp: Utc::now() - Duration::minutes(minutes_ago),
            assessment_type: AssessmentType::Explanation,
        }
    }

    #[test]
    fn test_initial_difficulty_without_history() {
        let controller = DifficultyController::default();
        let initial = controller.calculate_initial_difficulty(&[], &[]);
        assert_eq!(initial.difficulty, 50.0);
        assert_eq!(initial.rationale, "no prior history - starting at baseline");
    }

    #[test]
    fn test_initial_difficulty_from_strong_history() {
        let controller = DifficultyController::default();
        let history: Vec<Response> = (0..6).map(|i| response(90.0, 60 - i)).collect();
        let initial = controller.calculate_initial_difficulty(&history, &[]);
        assert!(initial.difficulty > 60.0 && initial.difficulty < 90.0);
        assert!(initial.rationale.contains("6 prior responses"));
    }

    #[test]
    fn test_related_history_weighs_less() {
        let controller = DifficultyController::default();
        let history: Vec<Response> = (0..6).map(|i| response(90.0, 60 - i)).collect();
        let direct = controller.calculate_initial_difficulty(&history, &[]);
        let related = controller.calculate_initial_difficulty(&[], &history);
        assert!(related.difficulty > 50.0);
        assert!(related.difficulty < direct.difficulty);
    }

    #[test]
    fn test_high_score_large_increase() {
        let controller = DifficultyController::default();
        let adj = controller.adjust_difficulty(50.0, 90.0, None, 0).unwrap();
        assert!((adj.new_difficulty - 65.0).abs() < 1e-9);
        assert!(adj.reason.contains("high score"));
    }

    #[test]
    fn test_annealing_shrinks_steps() {
        let controller = DifficultyController::default();
        let early = controller.adjust_difficulty(50.0, 90.0, None, 0).unwrap();
        let late = controller.adjust_difficulty(50.0, 90.0, None, 15).unwrap();
        assert!(late.adjustment < early.adjustment);
        assert!(late.adjustment > 0.0);
    }

    #[test]
    fn test_score_bands() {
        let controller = DifficultyController::default();
        let moderate = controller.adjust_difficulty(50.0, 70.0, None, 0).unwrap();
        assert!((moderate.adjustment - 8.0).abs() < 1e-9);

        let hold = controller.adjust_difficulty(50.0, 50.0, None, 0).unwrap();
        assert_eq!(hold.adjustment, 0.0);

        let slight = controller.adjust_difficulty(50.0, 30.0, None, 0).unwrap();
        let steep = controller.adjust_difficulty(50.0, 0.0, None, 0).unwrap();
        assert!(slight.adjustment < 0.0);
        assert!(steep.adjustment < slight.adjustment);
        assert!((steep.adjustment + 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_confident_but_wrong_steps_down_faster() {
        let controller = DifficultyController::default();
        let overconfident = calculate_calibration(5, 20.0).unwrap();
        let plain = controller.adjust_difficulty(50.0, 20.0, None, 0).unwrap();
        let amplified = controller
            .adjust_difficulty(50.0, 20.0, Some(&overconfident), 0)
            .unwrap();
        assert!(amplified.adjustment < plain.adjustment);
        assert!(amplified.reason.contains("confident but incorrect"));

        let borderline = calculate_calibration(5, 50.0).unwrap();
        let nudged = controller
            .adjust_difficulty(50.0, 50.0, Some(&borderline), 0)
            .unwrap();
        assert!(nudged.adjustment < 0.0);
    }

    #[test]
    fn test_unsure_but_correct_is_dampened() {
        let controller = DifficultyController::default();
        let underconfident = calculate_calibration(1, 95.0).unwrap();
        let plain = controller.adjust_difficulty(50.0, 95.0, None, 0).unwrap();
        let dampened = controller
            .adjust_difficulty(50.0, 95.0, Some(&underconfident), 0)
            .unwrap();
        assert!(dampened.adjustment > 0.0);
        assert!(dampened.adjustment < plain.adjustment);
    }

    #[test]
    fn test_adjust_clamps_to_bounds() {
        let controller = DifficultyController::default();
        let top = controller.adjust_difficulty(98.0, 100.0, None, 0).unwrap();
        assert_eq!(top.new_difficulty, 100.0);
        assert!((top.adjustment - 2.0).abs() < 1e-9);

        let overconfident = calculate_calibration(5, 0.0).unwrap();
        let bottom = controller
            .adjust_difficulty(3.0, 0.0, Some(&overconfident), 0)
            .unwrap();
        assert_eq!(bottom.new_difficulty, 0.0);
    }

    #[test]
    fn test_adjust_rejects_invalid_score() {
        let controller = DifficultyController::default();
        assert_eq!(
            controller.adjust_difficulty(50.0, 120.0, None, 0),
            Err(AssessmentError::InvalidScore(120.0))
        );
        assert!(controller.adjust_difficulty(f64::NAN, 50.0, None, 0).is_err());
    }

    #[test]
    fn test_difficulty_range() {
        let controller = DifficultyController::default();
        assert_eq!(
            controller.difficulty_range(50.0),
            DifficultyRange { min: 40.0, max: 60.0 }
        );
        assert_eq!(
            controller.difficulty_range(5.0),
            DifficultyRange { min: 0.0, max: 15.0 }
        );
        assert_eq!(
            controller.difficulty_range(95.0),
            DifficultyRange { min: 85.0, max: 100.0 }
        );
    }
}
