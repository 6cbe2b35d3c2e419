use std::sync::Arc;
use std::time::{Instant, SystemTime};

use crate::assessment::session::InMemorySessionStore;
use crate::assessment::store::{InMemoryQuestionBank, InMemoryResponseHistory};
use crate::assessment::{AssessmentEngine, EngineConfig};

#[derive(Clone)]
pub struct AppState {
    started_at: Instant,
    started_at_system: SystemTime,
    engine: Arc<AssessmentEngine>,
    history: Arc<InMemoryResponseHistory>,
    bank: Arc<InMemoryQuestionBank>,
}

impl AppState {
    /// Engine backed by in-process collaborators.
    pub fn in_memory(config: EngineConfig) -> Self {
        let history = Arc::new(InMemoryResponseHistory::new());
        let bank = Arc::new(InMemoryQuestionBank::new());
        let sessions = Arc::new(InMemorySessionStore::new());
        let engine = Arc::new(AssessmentEngine::new(
            config,
            bank.clone(),
            history.clone(),
            sessions,
        ));

        Self {
            started_at: Instant::now(),
            started_at_system: SystemTime::now(),
            engine,
            history,
            bank,
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn started_at_system(&self) -> SystemTime {
        self.started_at_system
    }

    pub fn engine(&self) -> Arc<AssessmentEngine> {
        Arc::clone(&self.engine)
    }

    pub fn history(&self) -> Arc<InMemoryResponseHistory> {
        Arc::clone(&self.history)
    }

    pub fn bank(&self) -> Arc<InMemoryQuestionBank> {
        Arc::clone(&self.bank)
    }
}
