//! Confidence calibration analysis.
//!
//! Compares a learner's self-reported confidence (1-5) with the score they
//! actually achieved (0-100). All functions are pure; array entry points are
//! guarded by [`validate_calibration_series`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::assessment::error::{AssessmentError, AssessmentResult};

pub const CALIBRATION_THRESHOLD: f64 = 15.0;
pub const MIN_CORRELATION_SAMPLES: usize = 5;
pub const TREND_EPSILON: f64 = 0.05;
pub const MIN_TOPIC_SAMPLES: usize = 3;

const STRONG_CORRELATION: f64 = 0.7;
const MODERATE_CORRELATION: f64 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CalibrationCategory {
    Overconfident,
    Underconfident,
    Calibrated,
}

impl CalibrationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Overconfident => "OVERCONFIDENT",
            Self::Underconfident => "UNDERCONFIDENT",
            Self::Calibrated => "CALIBRATED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationResult {
    pub confidence_normalized: f64,
    pub calibration_delta: f64,
    pub category: CalibrationCategory,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationStrength {
    Strong,
    Moderate,
    Weak,
    Insufficient,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationInterpretation {
    pub strength: CorrelationStrength,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CalibrationTrend {
    Improving,
    Stable,
    Declining,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicDelta {
    pub topic: String,
    pub delta: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicCalibration {
    pub topic: String,
    pub mean_delta: f64,
    pub sample_count: usize,
}

/// Maps a 1-5 confidence rating linearly onto 0-100.
pub fn normalize_confidence(confidence: u8) -> AssessmentResult<f64> {
    if !(1..=5).contains(&confidence) {
        return Err(AssessmentError::InvalidConfidence(confidence as f64));
    }
    Ok((confidence as f64 - 1.0) * 25.0)
}

pub fn classify_delta(delta: f64, threshold: f64) -> CalibrationCategory {
    if delta > threshold {
        CalibrationCategory::Overconfident
    } else if delta < -threshold {
        CalibrationCategory::Underconfident
    } else {
        CalibrationCategory::Calibrated
    }
}

pub fn calculate_calibration(confidence: u8, score: f64) -> AssessmentResult<CalibrationResult> {
    calibrate_with_threshold(confidence, score, CALIBRATION_THRESHOLD)
}

pub fn calibrate_with_threshold(
    confidence: u8,
    score: f64,
    threshold: f64,
) -> AssessmentResult<CalibrationResult> {
    let confidence_normalized = normalize_confidence(confidence)?;
    validate_score(score)?;

    let calibration_delta = confidence_normalized - score;
    let category = classify_delta(calibration_delta, threshold);
    let message = calibration_message(category, confidence_normalized, score);

    Ok(CalibrationResult {
        confidence_normalized,
        calibration_delta,
        category,
        message,
    })
}

fn calibration_message(category: CalibrationCategory, confidence: f64, score: f64) -> String {
    let confidence = confidence.round() as i64;
    let score = score.round() as i64;
    match category {
        CalibrationCategory::Overconfident => format!(
            "You felt {confidence}% confident but scored {score}%. Review the gaps before moving on."
        ),
        CalibrationCategory::Underconfident => format!(
            "You scored {score}% while feeling only {confidence}% confident. You know more than you think."
        ),
        CalibrationCategory::Calibrated => format!(
            "Your confidence ({confidence}%) matched your score ({score}%)."
        ),
    }
}

pub fn validate_score(score: f64) -> AssessmentResult<()> {
    if !score.is_finite() || !(0.0..=100.0).contains(&score) {
        return Err(AssessmentError::InvalidScore(score));
    }
    Ok(())
}

/// Both series must be finite, equally long, and within 0-100.
pub fn validate_calibration_series(confidences: &[f64], scores: &[f64]) -> AssessmentResult<()> {
    if confidences.len() != scores.len() {
        return Err(AssessmentError::LengthMismatch {
            left: confidences.len(),
            right: scores.len(),
        });
    }

    for (field, values) in [("confidence", confidences), ("score", scores)] {
        for (index, &value) in values.iter().enumerate() {
            if !value.is_finite() {
                return Err(AssessmentError::NonFiniteValue { field, index });
            }
            if !(0.0..=100.0).contains(&value) {
                return Err(AssessmentError::OutOfRange { field, index, value });
            }
        }
    }

    Ok(())
}

/// Pearson correlation between normalized confidences and scores.
///
/// Returns `Ok(None)` below [`MIN_CORRELATION_SAMPLES`] pairs and `Ok(Some(0.0))`
/// when either series has no variance.
pub fn calculate_correlation(confidences: &[f64], scores: &[f64]) -> AssessmentResult<Option<f64>> {
    correlate_with_min_samples(confidences, scores, MIN_CORRELATION_SAMPLES)
}

pub fn correlate_with_min_samples(
    confidences: &[f64],
    scores: &[f64],
    min_samples: usize,
) -> AssessmentResult<Option<f64>> {
    validate_calibration_series(confidences, scores)?;

    let n = confidences.len();
    if n < min_samples.max(2) {
        return Ok(None);
    }

    let nf = n as f64;
    let sum_x: f64 = confidences.iter().sum();
    let sum_y: f64 = scores.iter().sum();
    let sum_xy: f64 = confidences.iter().zip(scores).map(|(x, y)| x * y).sum();
    let sum_xx: f64 = confidences.iter().map(|x| x * x).sum();
    let sum_yy: f64 = scores.iter().map(|y| y * y).sum();

    let numerator = nf * sum_xy - sum_x * sum_y;
    let denominator = ((nf * sum_xx - sum_x.powi(2)) * (nf * sum_yy - sum_y.powi(2))).sqrt();

    if denominator == 0.0 || !denominator.is_finite() {
        return Ok(Some(0.0));
    }

    Ok(Some((numerator / denominator).clamp(-1.0, 1.0)))
}

pub fn interpret_correlation(r: Option<f64>) -> CorrelationInterpretation {
    interpret_with_min_samples(r, MIN_CORRELATION_SAMPLES)
}

pub fn interpret_with_min_samples(r: Option<f64>, min_samples: usize) -> CorrelationInterpretation {
    let Some(r) = r else {
        return CorrelationInterpretation {
            strength: CorrelationStrength::Insufficient,
            message: format!(
                "Insufficient data: at least {min_samples} assessments are needed to measure calibration."
            ),
        };
    };

    let (strength, message) = if r >= STRONG_CORRELATION {
        (
            CorrelationStrength::Strong,
            "Strong calibration: your confidence reliably tracks your performance.",
        )
    } else if r >= MODERATE_CORRELATION {
        (
            CorrelationStrength::Moderate,
            "Moderate calibration: your confidence partly tracks your performance.",
        )
    } else {
        (
            CorrelationStrength::Weak,
            "Weak calibration: your confidence does not yet predict your performance.",
        )
    };

    CorrelationInterpretation {
        strength,
        message: message.to_string(),
    }
}

pub fn calculate_trend(recent: Option<f64>, prior: Option<f64>) -> CalibrationTrend {
    trend_with_epsilon(recent, prior, TREND_EPSILON)
}

/// Changes within `epsilon` either way count as stable.
pub fn trend_with_epsilon(recent: Option<f64>, prior: Option<f64>, epsilon: f64) -> CalibrationTrend {
    let (Some(recent), Some(prior)) = (recent, prior) else {
        return CalibrationTrend::Stable;
    };

    let epsilon = epsilon.abs();
    let change = recent - prior;
    if change > epsilon {
        CalibrationTrend::Improving
    } else if change < -epsilon {
        CalibrationTrend::Declining
    } else {
        CalibrationTrend::Stable
    }
}

fn group_by_topic(assessments: &[TopicDelta]) -> BTreeMap<&str, Vec<f64>> {
    let mut groups: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for a in assessments {
        groups.entry(a.topic.as_str()).or_default().push(a.delta);
    }
    groups
}

fn topics_where(
    assessments: &[TopicDelta],
    min_count: usize,
    keep: impl Fn(f64) -> bool,
) -> Vec<TopicCalibration> {
    group_by_topic(assessments)
        .into_iter()
        .filter(|(_, deltas)| deltas.len() >= min_count)
        .map(|(topic, deltas)| TopicCalibration {
            topic: topic.to_string(),
            mean_delta: deltas.iter().sum::<f64>() / deltas.len() as f64,
            sample_count: deltas.len(),
        })
        .filter(|t| keep(t.mean_delta))
        .collect()
}

/// Topics whose mean delta exceeds `+threshold`, most overconfident first.
pub fn identify_overconfident_topics(
    assessments: &[TopicDelta],
    threshold: f64,
    min_count: usize,
) -> Vec<TopicCalibration> {
    let threshold = threshold.abs();
    let mut topics = topics_where(assessments, min_count, |mean| mean > threshold);
    topics.sort_by(|a, b| b.mean_delta.total_cmp(&a.mean_delta));
    topics
}

/// Topics whose mean delta falls below `-threshold`, most underconfident first.
pub fn identify_underconfident_topics(
    assessments: &[TopicDelta],
    threshold: f64,
    min_count: usize,
) -> Vec<TopicCalibration> {
    let threshold = threshold.abs();
    let mut topics = topics_where(assessments, min_count, |mean| mean < -threshold);
    topics.sort_by(|a, b| a.mean_delta.total_cmp(&b.mean_delta));
    topics
}

pub fn calculate_mean_absolute_error(deltas: &[f64]) -> f64 {
    if deltas.is_empty() {
        return 0.0;
    }
    deltas.iter().map(|d| d.abs()).sum::<f64>() / deltas.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic(name: &str, delta: f64) -> TopicDelta {
        TopicDelta {
            topic: name.to_string(),
            delta,
        }
    }

    #[test]
    fn test_normalize_confidence_exact_map() {
        let mapped: Vec<f64> = (1..=5).map(|c| normalize_confidence(c).unwrap()).collect();
        assert_eq!(mapped, vec![0.0, 25.0, 50.0, 75.0, 100.0]);
    }

    #[test]
    fn test_normalize_confidence_rejects_out_of_range() {
        assert_eq!(
            normalize_confidence(0),
            Err(AssessmentError::InvalidConfidence(0.0))
        );
        assert!(normalize_confidence(6).is_err());
    }

    #[test]
    fn test_calibration_categories() {
        let over = calculate_calibration(5, 50.0).unwrap();
        assert_eq!(over.calibration_delta, 50.0);
        assert_eq!(over.category, CalibrationCategory::Overconfident);

        let under = calculate_calibration(1, 50.0).unwrap();
        assert_eq!(under.calibration_delta, -50.0);
        assert_eq!(under.category, CalibrationCategory::Underconfident);

        let calibrated = calculate_calibration(3, 50.0).unwrap();
        assert_eq!(calibrated.calibration_delta, 0.0);
        assert_eq!(calibrated.category, CalibrationCategory::Calibrated);
    }

    #[test]
    fn test_calibration_boundary_is_calibrated() {
        // delta of exactly 15 does not cross the threshold
        let result = calculate_calibration(4, 60.0).unwrap();
        assert_eq!(result.calibration_delta, 15.0);
        assert_eq!(result.category, CalibrationCategory::Calibrated);
    }

    #[test]
    fn test_calibration_message_embeds_values() {
        let result = calculate_calibration(5, 49.6).unwrap();
        assert!(result.message.contains("100%"));
        assert!(result.message.contains("50%"));
    }

    #[test]
    fn test_calibration_rejects_bad_score() {
        assert_eq!(
            calculate_calibration(3, 101.0),
            Err(AssessmentError::InvalidScore(101.0))
        );
        assert!(calculate_calibration(3, -0.5).is_err());
        assert!(calculate_calibration(3, f64::NAN).is_err());
    }

    #[test]
    fn test_correlation_insufficient_samples() {
        let r = calculate_correlation(&[0.0, 25.0, 50.0, 75.0], &[10.0, 20.0, 30.0, 40.0]).unwrap();
        assert_eq!(r, None);
    }

    #[test]
    fn test_correlation_min_samples_is_configurable() {
        let x = [0.0, 25.0, 50.0, 75.0];
        let y = [10.0, 20.0, 30.0, 40.0];
        let r = correlate_with_min_samples(&x, &y, 3).unwrap().unwrap();
        assert!((r - 1.0).abs() < 1e-9);
        assert_eq!(correlate_with_min_samples(&x, &y, 8).unwrap(), None);
        assert!(interpret_with_min_samples(None, 8).message.contains('8'));
    }

    #[test]
    fn test_correlation_perfect_linear() {
        let x = [0.0, 25.0, 50.0, 75.0, 100.0];
        let y = [10.0, 30.0, 50.0, 70.0, 90.0];
        let r = calculate_correlation(&x, &y).unwrap().unwrap();
        assert!((r - 1.0).abs() < 1e-9);

        let y_rev = [90.0, 70.0, 50.0, 30.0, 10.0];
        let r = calculate_correlation(&x, &y_rev).unwrap().unwrap();
        assert!((r + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_correlation_constant_series_is_zero() {
        let x = [50.0; 6];
        let y = [10.0, 20.0, 30.0, 40.0, 50.0, 60.0];
        assert_eq!(calculate_correlation(&x, &y).unwrap(), Some(0.0));
        assert_eq!(calculate_correlation(&x, &x).unwrap(), Some(0.0));
    }

    #[test]
    fn test_correlation_length_mismatch() {
        let err = calculate_correlation(&[1.0, 2.0], &[1.0]).unwrap_err();
        assert_eq!(err, AssessmentError::LengthMismatch { left: 2, right: 1 });
    }

    #[test]
    fn test_validation_rejects_out_of_range_and_nan() {
        assert!(matches!(
            validate_calibration_series(&[0.0, 120.0], &[1.0, 2.0]),
            Err(AssessmentError::OutOfRange {
                field: "confidence",
                index: 1,
                ..
            })
        ));
        assert!(matches!(
            validate_calibration_series(&[0.0], &[f64::INFINITY]),
            Err(AssessmentError::NonFiniteValue {
                field: "score",
                index: 0
            })
        ));
    }

    #[test]
    fn test_interpret_correlation() {
        assert_eq!(
            interpret_correlation(Some(0.7)).strength,
            CorrelationStrength::Strong
        );
        assert_eq!(
            interpret_correlation(Some(0.4)).strength,
            CorrelationStrength::Moderate
        );
        assert_eq!(
            interpret_correlation(Some(0.39)).strength,
            CorrelationStrength::Weak
        );
        assert_eq!(
            interpret_correlation(Some(-0.9)).strength,
            CorrelationStrength::Weak
        );
        let none = interpret_correlation(None);
        assert_eq!(none.strength, CorrelationStrength::Insufficient);
        assert!(none.message.contains("Insufficient data"));
    }

    #[test]
    fn test_trend() {
        assert_eq!(calculate_trend(Some(0.8), Some(0.6)), CalibrationTrend::Improving);
        assert_eq!(calculate_trend(Some(0.5), Some(0.6)), CalibrationTrend::Declining);
        assert_eq!(calculate_trend(Some(0.62), Some(0.6)), CalibrationTrend::Stable);
        assert_eq!(calculate_trend(None, Some(0.6)), CalibrationTrend::Stable);
        assert_eq!(calculate_trend(Some(0.6), None), CalibrationTrend::Stable);
        assert_eq!(
            trend_with_epsilon(Some(0.62), Some(0.6), 0.01),
            CalibrationTrend::Improving
        );
        assert_eq!(
            trend_with_epsilon(Some(0.5), Some(0.6), 0.2),
            CalibrationTrend::Stable
        );
    }

    #[test]
    fn test_overconfident_topics_require_min_count() {
        let assessments = vec![
            topic("renal", 30.0),
            topic("renal", 30.0),
            topic("cardiac", 20.0),
            topic("cardiac", 25.0),
            topic("cardiac", 15.0),
        ];
        let topics =
            identify_overconfident_topics(&assessments, CALIBRATION_THRESHOLD, MIN_TOPIC_SAMPLES);
        assert_eq!(topics.len(), 1);
        assert_eq!(topics[0].topic, "cardiac");
        assert!((topics[0].mean_delta - 20.0).abs() < 1e-9);
        assert_eq!(topics[0].sample_count, 3);
    }

    #[test]
    fn test_topics_sorted_worst_first() {
        let mut assessments = Vec::new();
        for _ in 0..3 {
            assessments.push(topic("a", 20.0));
            assessments.push(topic("b", 40.0));
            assessments.push(topic("c", -30.0));
            assessments.push(topic("d", -50.0));
        }

        let over = identify_overconfident_topics(&assessments, 15.0, 3);
        let names: Vec<&str> = over.iter().map(|t| t.topic.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);

        let under = identify_underconfident_topics(&assessments, -15.0, 3);
        let names: Vec<&str> = under.iter().map(|t| t.topic.as_str()).collect();
        assert_eq!(names, vec!["d", "c"]);
    }

    #[test]
    fn test_mean_absolute_error() {
        assert_eq!(calculate_mean_absolute_error(&[]), 0.0);
        assert_eq!(calculate_mean_absolute_error(&[10.0, -20.0, 30.0]), 20.0);
    }
}
