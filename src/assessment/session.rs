//! Adaptive session state as an append-only event log.
//!
//! `current_difficulty` and `question_count` are never stored directly; they
//! are a fold over the session's events. Appends are compare-and-swap on the
//! log length so a writer holding a stale view is rejected.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::assessment::difficulty::TrajectoryEvent;
use crate::assessment::error::{AssessmentError, AssessmentResult};
use crate::assessment::knowledge::KnowledgeEstimate;
use crate::assessment::types::SessionKey;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    Started {
        difficulty: f64,
        rationale: String,
        at: DateTime<Utc>,
    },
    Adjusted(TrajectoryEvent),
    Estimated(KnowledgeEstimate),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptiveSessionState {
    pub key: SessionKey,
    pub current_difficulty: f64,
    pub question_count: u32,
    pub trajectory: Vec<TrajectoryEvent>,
    pub last_knowledge_estimate: Option<KnowledgeEstimate>,
    pub initial_rationale: String,
    pub started_at: DateTime<Utc>,
    pub version: u64,
}

impl AdaptiveSessionState {
    /// Folds a session log into its current state. `None` until the log
    /// contains a `Started` event.
    pub fn replay(key: &SessionKey, events: &[SessionEvent]) -> Option<Self> {
        let mut state: Option<Self> = None;

        for event in events {
            match (event, &mut state) {
                (
                    SessionEvent::Started {
                        difficulty,
                        rationale,
                        at,
                    },
                    slot @ None,
                ) => {
                    *slot = Some(Self {
                        key: key.clone(),
                        current_difficulty: *difficulty,
                        question_count: 0,
                        trajectory: Vec::new(),
                        last_knowledge_estimate: None,
                        initial_rationale: rationale.clone(),
                        started_at: *at,
                        version: 0,
                    });
                }
                (SessionEvent::Adjusted(step), Some(s)) => {
                    s.current_difficulty = step.to;
                    s.trajectory.push(step.clone());
                    s.question_count = s.trajectory.len() as u32;
                }
                (SessionEvent::Estimated(estimate), Some(s)) => {
                    s.last_knowledge_estimate = Some(estimate.clone());
                }
                _ => {
                    tracing::warn!(session = %key, "ignoring out-of-order session event");
                }
            }
        }

        if let Some(s) = state.as_mut() {
            s.version = events.len() as u64;
        }
        state
    }
}

pub trait SessionStore: Send + Sync {
    fn load(&self, key: &SessionKey) -> AssessmentResult<Vec<SessionEvent>>;

    /// Appends `events` if the stored log still has `expected_version` events.
    /// Returns the new version.
    fn append(
        &self,
        key: &SessionKey,
        expected_version: u64,
        events: Vec<SessionEvent>,
    ) -> AssessmentResult<u64>;

    /// Moves the session out of the active set and returns its full log.
    fn archive(&self, key: &SessionKey) -> AssessmentResult<Vec<SessionEvent>>;
}

#[derive(Default)]
pub struct InMemorySessionStore {
    active: RwLock<HashMap<SessionKey, Vec<SessionEvent>>>,
    archived: RwLock<HashMap<SessionKey, Vec<SessionEvent>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_count(&self) -> usize {
        self.active.read().len()
    }

    pub fn archived(&self, key: &SessionKey) -> Option<Vec<SessionEvent>> {
        self.archived.read().get(key).cloned()
    }
}

impl SessionStore for InMemorySessionStore {
    fn load(&self, key: &SessionKey) -> AssessmentResult<Vec<SessionEvent>> {
        Ok(self.active.read().get(key).cloned().unwrap_or_default())
    }

    fn append(
        &self,
        key: &SessionKey,
        expected_version: u64,
        events: Vec<SessionEvent>,
    ) -> AssessmentResult<u64> {
        let mut active = self.active.write();
        let log = active.entry(key.clone()).or_default();
        let actual = log.len() as u64;
        if actual != expected_version {
            return Err(AssessmentError::SessionConflict {
                session_id: key.session_id.clone(),
                expected: expected_version,
                actual,
            });
        }
        log.extend(events);
        Ok(log.len() as u64)
    }

    fn archive(&self, key: &SessionKey) -> AssessmentResult<Vec<SessionEvent>> {
        let log = self
            .active
            .write()
            .remove(key)
            .ok_or_else(|| AssessmentError::SessionNotFound(key.session_id.clone()))?;
        self.archived.write().insert(key.clone(), log.clone());
        Ok(log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> SessionKey {
        SessionKey::new("u1", "o1", "s1")
    }

    fn started(difficulty: f64) -> SessionEvent {
        SessionEvent::Started {
            difficulty,
            rationale: "baseline".into(),
            at: Utc::now(),
        }
    }

    fn adjusted(from: f64, to: f64) -> SessionEvent {
        SessionEvent::Adjusted(TrajectoryEvent {
            from,
            to,
            adjustment: to - from,
            reason: "test".into(),
            score: 90.0,
            calibration: None,
            at: Utc::now(),
        })
    }

    #[test]
    fn test_replay_empty_log_has_no_state() {
        assert!(AdaptiveSessionState::replay(&key(), &[]).is_none());
        assert!(AdaptiveSessionState::replay(&key(), &[adjusted(50.0, 60.0)]).is_none());
    }

    #[test]
    fn test_replay_folds_trajectory() {
        let events = vec![started(50.0), adjusted(50.0, 65.0), adjusted(65.0, 70.0)];
        let state = AdaptiveSessionState::replay(&key(), &events).unwrap();
        assert_eq!(state.current_difficulty, 70.0);
        assert_eq!(state.question_count, 2);
        assert_eq!(state.trajectory.len() as u32, state.question_count);
        assert_eq!(state.version, 3);
    }

    #[test]
    fn test_append_rejects_stale_version() {
        let store = InMemorySessionStore::new();
        let k = key();
        assert_eq!(store.append(&k, 0, vec![started(50.0)]).unwrap(), 1);
        assert_eq!(store.append(&k, 1, vec![adjusted(50.0, 65.0)]).unwrap(), 2);

        let err = store.append(&k, 1, vec![adjusted(50.0, 60.0)]).unwrap_err();
        assert!(matches!(
            err,
            AssessmentError::SessionConflict {
                expected: 1,
                actual: 2,
                ..
            }
        ));
        assert_eq!(store.load(&k).unwrap().len(), 2);
    }

    #[test]
    fn test_archive_moves_log() {
        let store = InMemorySessionStore::new();
        let k = key();
        store.append(&k, 0, vec![started(50.0)]).unwrap();
        let log = store.archive(&k).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(store.active_count(), 0);
        assert!(store.archived(&k).is_some());
        assert!(matches!(
            store.archive(&k),
            Err(AssessmentError::SessionNotFound(_))
        ));
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let json = serde_json::to_value(adjusted(50.0, 65.0)).unwrap();
        assert_eq!(json["type"], "adjusted");
        assert_eq!(json["to"], 65.0);
    }
}
