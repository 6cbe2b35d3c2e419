use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationParams {
    pub delta_threshold: f64,
    pub min_correlation_samples: usize,
    pub trend_epsilon: f64,
    pub min_topic_samples: usize,
    pub report_window: usize,
}

impl Default for CalibrationParams {
    fn default() -> Self {
        Self {
            delta_threshold: 15.0,
            min_correlation_samples: 5,
            trend_epsilon: 0.05,
            min_topic_samples: 3,
            report_window: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DifficultyParams {
    pub baseline: f64,
    pub band_half_width: f64,
    pub large_step: f64,
    pub moderate_step: f64,
    pub max_decrease: f64,
    pub high_score: f64,
    pub moderate_score: f64,
    pub low_score: f64,
    pub annealing_floor: f64,
    pub overconfident_amplify: f64,
    pub overconfident_nudge: f64,
    pub underconfident_dampen: f64,
    pub smoothing_alpha: f64,
    pub shrinkage_prior: f64,
    pub related_weight: f64,
}

impl Default for DifficultyParams {
    fn default() -> Self {
        Self {
            baseline: 50.0,
            band_half_width: 10.0,
            large_step: 15.0,
            moderate_step: 8.0,
            max_decrease: 20.0,
            high_score: 85.0,
            moderate_score: 60.0,
            low_score: 40.0,
            annealing_floor: 0.2,
            overconfident_amplify: 1.5,
            overconfident_nudge: 4.0,
            underconfident_dampen: 0.5,
            smoothing_alpha: 0.3,
            shrinkage_prior: 3.0,
            related_weight: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeParams {
    pub logistic_scale: f64,
    pub prior_mean: f64,
    pub prior_sd: f64,
    pub tolerance: f64,
    pub max_iterations: u32,
    pub max_step: f64,
    pub min_responses: usize,
    pub stop_ci_width: f64,
    pub rapid_guess_ms: i64,
    pub rapid_guess_weight: f64,
    pub estimation_window: usize,
    pub fixed_length_baseline: usize,
}

impl Default for KnowledgeParams {
    fn default() -> Self {
        Self {
            logistic_scale: 5.0,
            prior_mean: 50.0,
            prior_sd: 20.0,
            tolerance: 0.01,
            max_iterations: 50,
            max_step: 25.0,
            min_responses: 3,
            stop_ci_width: 10.0,
            rapid_guess_ms: 1000,
            rapid_guess_weight: 0.5,
            estimation_window: 20,
            fixed_length_baseline: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasteryParams {
    pub window: usize,
    pub high_score: f64,
    pub min_assessment_types: usize,
    pub min_difficulty: f64,
    pub min_span_hours: i64,
}

impl Default for MasteryParams {
    fn default() -> Self {
        Self {
            window: 3,
            high_score: 85.0,
            min_assessment_types: 2,
            min_difficulty: 60.0,
            min_span_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionParams {
    /// How many of the learner's latest answered questions are excluded from selection.
    pub recent_exclusion: usize,
}

impl Default for SelectionParams {
    fn default() -> Self {
        Self {
            recent_exclusion: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    pub calibration: CalibrationParams,
    pub difficulty: DifficultyParams,
    pub knowledge: KnowledgeParams,
    pub mastery: MasteryParams,
    pub selection: SelectionParams,
}
