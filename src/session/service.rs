use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use super::{Session, SessionStore, TurnInput, TurnOutcome};
use crate::config::DiagnosisConfig;
use crate::engine::top_confidence;
use crate::error::{AppResult, DiagnosisError, DiagnosisResult};
use crate::graph::GraphHandle;
use crate::matcher::{MatchRequest, Matcher};

/// Result of a free-text turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChatOutcome {
    /// The text was ambiguous; nothing was recorded.
    Clarify {
        /// Candidate readings offered by the matcher.
        options: Vec<String>,
    },
    /// The text was applied as a turn.
    Turn(TurnOutcome),
}

/// Entry point for diagnostic sessions.
///
/// Owns the session registry and reads the knowledge graph through a
/// [`GraphHandle`]; each turn works against a single graph snapshot.
#[derive(Clone)]
pub struct DiagnosisService {
    graph: GraphHandle,
    sessions: SessionStore,
    matcher: Option<Arc<dyn Matcher>>,
    config: DiagnosisConfig,
}

impl DiagnosisService {
    /// Create a service without a matcher; free-text turns are unavailable
    pub fn new(graph: GraphHandle, config: DiagnosisConfig) -> Self {
        Self {
            graph,
            sessions: SessionStore::new(),
            matcher: None,
            config,
        }
    }

    /// Attach a semantic matcher
    pub fn with_matcher(mut self, matcher: Arc<dyn Matcher>) -> Self {
        self.matcher = Some(matcher);
        self
    }

    /// Graph handle, for refreshing the snapshot
    pub fn graph(&self) -> &GraphHandle {
        &self.graph
    }

    /// Active thresholds
    pub fn config(&self) -> &DiagnosisConfig {
        &self.config
    }

    /// Whether free-text turns are available
    pub fn has_matcher(&self) -> bool {
        self.matcher.is_some()
    }

    /// Open a session for a problem statement
    pub async fn create_session(&self, user_problem: &str) -> DiagnosisResult<String> {
        let user_problem = user_problem.trim();
        if user_problem.is_empty() {
            return Err(DiagnosisError::InvalidInput {
                field: "user_problem".to_string(),
                reason: "must not be empty".to_string(),
            });
        }

        let session = Session::new(user_problem);
        let id = session.id.clone();
        self.sessions.insert(session).await;

        info!(session_id = %id, "Diagnostic session created");
        Ok(id)
    }

    /// Apply structured evidence to a session
    pub async fn turn(&self, session_id: &str, input: TurnInput) -> DiagnosisResult<TurnOutcome> {
        let handle = self.session_handle(session_id).await?;
        let mut session = handle.lock().await;
        Ok(self.apply(&mut session, &input))
    }

    /// Resolve free text through the matcher and apply it as a turn.
    ///
    /// The session stays locked across the matcher call so the text is
    /// matched against the state it will be applied to. A clarification
    /// request or a matcher failure leaves the session untouched.
    pub async fn chat(&self, session_id: &str, text: &str) -> AppResult<ChatOutcome> {
        let matcher = self
            .matcher
            .as_ref()
            .ok_or(DiagnosisError::MatcherUnavailable)?;
        let text = text.trim();
        if text.is_empty() {
            return Err(DiagnosisError::InvalidInput {
                field: "text".to_string(),
                reason: "must not be empty".to_string(),
            }
            .into());
        }

        let handle = self.session_handle(session_id).await?;
        let mut session = handle.lock().await;

        let request = MatchRequest::new(text)
            .with_dialogue_history(
                session
                    .symptom
                    .observations()
                    .iter()
                    .map(|o| o.description.clone())
                    .collect(),
            )
            .with_pending_recommendations(
                session
                    .recommendations
                    .iter()
                    .map(|r| r.phenomenon_id.clone())
                    .collect(),
            );

        let result = matcher.match_text(&request).await?;
        if result.needs_clarification {
            debug!(
                session_id = %session_id,
                options = result.clarification_options.len(),
                "Matcher asked for clarification"
            );
            return Ok(ChatOutcome::Clarify {
                options: result.clarification_options,
            });
        }

        let input = TurnInput::from_match_result(&result, text);
        Ok(ChatOutcome::Turn(self.apply(&mut session, &input)))
    }

    /// Copy of a session's current state
    pub async fn get_session(&self, session_id: &str) -> DiagnosisResult<Session> {
        let handle = self.session_handle(session_id).await?;
        let session = handle.lock().await;
        Ok(session.clone())
    }

    /// Clear a session's evidence, keeping its id and problem statement
    pub async fn reset(&self, session_id: &str) -> DiagnosisResult<Session> {
        let handle = self.session_handle(session_id).await?;
        let mut session = handle.lock().await;
        session.reset();

        info!(session_id = %session_id, "Diagnostic session reset");
        Ok(session.clone())
    }

    /// Destroy a session
    pub async fn delete_session(&self, session_id: &str) -> DiagnosisResult<()> {
        if !self.sessions.remove(session_id).await {
            return Err(DiagnosisError::SessionNotFound {
                session_id: session_id.to_string(),
            });
        }

        info!(session_id = %session_id, "Diagnostic session deleted");
        Ok(())
    }

    /// Number of live sessions
    pub async fn session_count(&self) -> usize {
        self.sessions.len().await
    }

    async fn session_handle(
        &self,
        session_id: &str,
    ) -> DiagnosisResult<Arc<tokio::sync::Mutex<Session>>> {
        self.sessions
            .get(session_id)
            .await
            .ok_or_else(|| DiagnosisError::SessionNotFound {
                session_id: session_id.to_string(),
            })
    }

    fn apply(&self, session: &mut Session, input: &TurnInput) -> TurnOutcome {
        let graph = self.graph.snapshot();
        let (next, outcome) = session.advance(input, graph.as_ref(), &self.config);
        *session = next;

        info!(
            session_id = %outcome.session_id,
            round = outcome.round,
            status = %outcome.status,
            stuck = outcome.stuck,
            hypotheses = outcome.hypotheses.len(),
            top_confidence = top_confidence(&outcome.hypotheses),
            ignored = outcome.ignored.len(),
            "Turn applied"
        );
        outcome
    }
}

impl std::fmt::Debug for DiagnosisService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiagnosisService")
            .field("graph", &self.graph)
            .field("has_matcher", &self.matcher.is_some())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod service_tests;
