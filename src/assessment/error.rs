#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AssessmentError {
    #[error("confidence must be between 1 and 5, got {0}")]
    InvalidConfidence(f64),
    #[error("score must be between 0 and 100, got {0}")]
    InvalidScore(f64),
    #[error("difficulty must be between 0 and 100, got {0}")]
    InvalidDifficulty(f64),
    #[error("{field} value at index {index} must be between 0 and 100, got {value}")]
    OutOfRange {
        field: &'static str,
        index: usize,
        value: f64,
    },
    #[error("{field} value at index {index} is not a finite number")]
    NonFiniteValue { field: &'static str, index: usize },
    #[error("series lengths differ: {left} confidences vs {right} scores")]
    LengthMismatch { left: usize, right: usize },
    #[error("session {session_id} was modified concurrently (expected version {expected}, found {actual})")]
    SessionConflict {
        session_id: String,
        expected: u64,
        actual: u64,
    },
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("collaborator failure: {0}")]
    Collaborator(String),
}

pub type AssessmentResult<T> = Result<T, AssessmentError>;
