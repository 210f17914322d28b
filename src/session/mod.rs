//! Diagnostic sessions.
//!
//! A [`Session`] owns its symptom ledger and the results of the last turn.
//! [`Session::advance`] computes the next state without side effects; the
//! [`DiagnosisService`] serializes turns per session and swaps the result in.

mod service;
mod turn;

pub use service::{ChatOutcome, DiagnosisService};
pub use turn::{ConfirmedPhenomenon, IgnoredInput, NextStep, TurnInput, TurnOutcome};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::engine::{Diagnosis, DiagnosisStatus, Hypothesis, Recommendation};
use crate::symptom::Symptom;

/// State of one diagnostic conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique session identifier.
    pub id: String,
    /// Problem statement the session was opened with.
    pub user_problem: String,
    /// Confirmed and denied evidence.
    pub symptom: Symptom,
    /// Hypotheses from the last turn.
    pub hypotheses: Vec<Hypothesis>,
    /// Recommendations from the last turn.
    pub recommendations: Vec<Recommendation>,
    /// Completed turns.
    pub round_count: u32,
    pub status: DiagnosisStatus,
    pub stuck: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnosis: Option<Diagnosis>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create a new session with a generated UUID
    pub fn new(user_problem: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_problem: user_problem.into(),
            symptom: Symptom::new(),
            hypotheses: Vec::new(),
            recommendations: Vec::new(),
            round_count: 0,
            status: DiagnosisStatus::Exploring,
            stuck: false,
            diagnosis: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Start over, keeping the id and the problem statement
    pub fn reset(&mut self) {
        self.symptom = Symptom::new();
        self.hypotheses.clear();
        self.recommendations.clear();
        self.round_count = 0;
        self.status = DiagnosisStatus::Exploring;
        self.stuck = false;
        self.diagnosis = None;
        self.updated_at = Utc::now();
    }
}

/// Process-local session registry.
///
/// Each session sits behind its own mutex so that turns on one session are
/// serialized while different sessions proceed in parallel.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, Arc<Mutex<Session>>>>>,
}

impl SessionStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session
    pub async fn insert(&self, session: Session) {
        let id = session.id.clone();
        self.sessions
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(session)));
    }

    /// Handle to a session
    pub async fn get(&self, id: &str) -> Option<Arc<Mutex<Session>>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Remove a session; returns whether it existed
    pub async fn remove(&self, id: &str) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    /// Number of live sessions
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no session is live
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
