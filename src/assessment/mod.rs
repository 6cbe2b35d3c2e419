//! Adaptive assessment core: calibration analysis, difficulty control,
//! ability estimation and mastery verification for one learning objective.

pub mod calibration;
pub mod config;
pub mod difficulty;
pub mod engine;
pub mod error;
pub mod knowledge;
pub mod mastery;
pub mod session;
pub mod store;
pub mod types;

pub use config::EngineConfig;
pub use engine::{AssessmentEngine, NextQuestion, NextQuestionRequest, QuestionSelection};
pub use error::{AssessmentError, AssessmentResult};
pub use types::*;
