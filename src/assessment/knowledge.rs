//! One-parameter logistic ability estimation on the 0-100 difficulty scale.
//!
//! `P(correct | θ, d) = 1 / (1 + exp(-(θ - d) / s))`. The estimate maximizes
//! the log-likelihood plus a weak normal prior so that all-correct and
//! all-wrong patterns still yield a finite θ.

use serde::{Deserialize, Serialize};

use crate::assessment::config::KnowledgeParams;
use crate::assessment::error::{AssessmentError, AssessmentResult};

const Z_95: f64 = 1.96;
const THETA_MIN: f64 = 0.0;
const THETA_MAX: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IrtObservation {
    pub difficulty: f64,
    pub correct: bool,
    pub latency_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeEstimate {
    pub theta: f64,
    pub standard_error: f64,
    pub confidence_interval_width: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub iterations: u32,
    pub response_count: usize,
    pub should_stop_early: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EfficiencyMetrics {
    pub questions_used: usize,
    pub baseline_questions: usize,
    pub questions_saved: usize,
    pub efficiency_gain_percent: f64,
}

#[derive(Debug, Clone, Default)]
pub struct KnowledgeEstimator {
    params: KnowledgeParams,
}

impl KnowledgeEstimator {
    pub fn new(params: KnowledgeParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &KnowledgeParams {
        &self.params
    }

    pub fn probability_correct(&self, theta: f64, difficulty: f64) -> f64 {
        1.0 / (1.0 + (-(theta - difficulty) / self.params.logistic_scale).exp())
    }

    fn weight(&self, obs: &IrtObservation) -> f64 {
        if obs.latency_ms > 0 && obs.latency_ms < self.params.rapid_guess_ms {
            self.params.rapid_guess_weight
        } else {
            1.0
        }
    }

    fn prior_precision(&self) -> f64 {
        1.0 / self.params.prior_sd.powi(2)
    }

    /// First derivative of the penalized log-likelihood.
    fn score_fn(&self, theta: f64, observations: &[IrtObservation]) -> f64 {
        let s = self.params.logistic_scale;
        let likelihood: f64 = observations
            .iter()
            .map(|o| {
                let u = if o.correct { 1.0 } else { 0.0 };
                self.weight(o) * (u - self.probability_correct(theta, o.difficulty)) / s
            })
            .sum();
        likelihood - (theta - self.params.prior_mean) * self.prior_precision()
    }

    /// Fisher information at `theta`, prior precision included.
    pub fn information(&self, theta: f64, observations: &[IrtObservation]) -> f64 {
        let s2 = self.params.logistic_scale.powi(2);
        let items: f64 = observations
            .iter()
            .map(|o| {
                let p = self.probability_correct(theta, o.difficulty);
                self.weight(o) * p * (1.0 - p) / s2
            })
            .sum();
        items + self.prior_precision()
    }

    pub fn should_stop_early(&self, interval_width: f64, response_count: usize) -> bool {
        response_count >= self.params.min_responses
            && interval_width.is_finite()
            && interval_width < self.params.stop_ci_width
    }

    /// Returns `Ok(None)` when fewer than the minimum number of observations exist.
    pub fn estimate_knowledge(
        &self,
        observations: &[IrtObservation],
    ) -> AssessmentResult<Option<KnowledgeEstimate>> {
        if observations.len() < self.params.min_responses {
            return Ok(None);
        }
        for o in observations {
            if !o.difficulty.is_finite() || !(0.0..=100.0).contains(&o.difficulty) {
                return Err(AssessmentError::InvalidDifficulty(o.difficulty));
            }
        }

        let (theta, iterations) = match self.newton_raphson(observations) {
            Ok(converged) => converged,
            Err(spent) => {
                let (theta, extra) = self.bisection(observations);
                (theta, spent + extra)
            }
        };

        let standard_error = 1.0 / self.information(theta, observations).sqrt();
        let half_width = Z_95 * standard_error;
        let confidence_interval_width = 2.0 * half_width;

        Ok(Some(KnowledgeEstimate {
            theta,
            standard_error,
            confidence_interval_width,
            lower_bound: (theta - half_width).max(THETA_MIN),
            upper_bound: (theta + half_width).min(THETA_MAX),
            iterations,
            response_count: observations.len(),
            should_stop_early: self.should_stop_early(confidence_interval_width, observations.len()),
        }))
    }

    /// `Err` carries the iterations spent before giving up.
    fn newton_raphson(&self, observations: &[IrtObservation]) -> Result<(f64, u32), u32> {
        let p = &self.params;
        let mut theta = p.prior_mean.clamp(THETA_MIN, THETA_MAX);

        for iteration in 1..=p.max_iterations {
            let gradient = self.score_fn(theta, observations);
            let info = self.information(theta, observations);
            if !gradient.is_finite() || !info.is_finite() || info <= 0.0 {
                return Err(iteration);
            }

            let step = (gradient / info).clamp(-p.max_step, p.max_step);
            let next = theta + step;
            if !next.is_finite() || !(THETA_MIN..=THETA_MAX).contains(&next) {
                return Err(iteration);
            }

            theta = next;
            if step.abs() < p.tolerance {
                return Ok((theta, iteration));
            }
        }

        Err(p.max_iterations)
    }

    /// The penalized score is strictly decreasing in θ, so bisection on its
    /// sign change always terminates inside the scale.
    fn bisection(&self, observations: &[IrtObservation]) -> (f64, u32) {
        let p = &self.params;
        let mut lo = THETA_MIN;
        let mut hi = THETA_MAX;

        if self.score_fn(lo, observations) <= 0.0 {
            return (lo, 1);
        }
        if self.score_fn(hi, observations) >= 0.0 {
            return (hi, 1);
        }

        let mut iterations = 0;
        while hi - lo > p.tolerance && iterations < p.max_iterations * 2 {
            iterations += 1;
            let mid = 0.5 * (lo + hi);
            if self.score_fn(mid, observations) > 0.0 {
                lo = mid;
            } else {
                hi = mid;
            }
        }

        (0.5 * (lo + hi), iterations)
    }

    /// Questions spent versus a fixed-length test; reporting only.
    pub fn calculate_efficiency_metrics(&self, response_count: usize) -> EfficiencyMetrics {
        let baseline = self.params.fixed_length_baseline;
        let saved = baseline.saturating_sub(response_count);
        let efficiency_gain_percent = if baseline == 0 {
            0.0
        } else {
            saved as f64 / baseline as f64 * 100.0
        };

        EfficiencyMetrics {
            questions_used: response_count,
            baseline_questions: baseline,
            questions_saved: saved,
            efficiency_gain_percent,
        }
    }
}
