use serde::{Deserialize, Serialize};

use crate::engine::{MultiMatch, RootCauseMatch, TicketMatch};

/// Request sent to the matcher for one operator message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRequest {
    /// Operator message to resolve.
    pub text: String,
    /// Earlier observations in the session, oldest first.
    #[serde(default)]
    pub dialogue_history: Vec<String>,
    /// Phenomenon ids the operator was last asked to check.
    #[serde(default)]
    pub pending_recommendations: Vec<String>,
}

impl MatchRequest {
    /// Create a request with no context
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            dialogue_history: Vec::new(),
            pending_recommendations: Vec::new(),
        }
    }

    /// Set the dialogue history
    pub fn with_dialogue_history(mut self, history: Vec<String>) -> Self {
        self.dialogue_history = history;
        self
    }

    /// Set the pending recommendation ids
    pub fn with_pending_recommendations(mut self, pending: Vec<String>) -> Self {
        self.pending_recommendations = pending;
        self
    }
}

/// A scored match against a phenomenon or root cause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredMatch {
    /// Entity identifier.
    pub id: String,
    /// Match score (0.0-1.0).
    pub score: f64,
}

/// A scored match against a historical ticket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredTicketMatch {
    /// Ticket identifier.
    pub id: String,
    /// Root cause the ticket belongs to.
    pub root_cause_id: String,
    /// Match score (0.0-1.0).
    pub score: f64,
}

/// Matcher output for one message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Phenomena the message describes.
    #[serde(default)]
    pub phenomena: Vec<ScoredMatch>,
    /// Root causes the message mentions directly.
    #[serde(default)]
    pub root_causes: Vec<ScoredMatch>,
    /// Historical tickets resembling the message.
    #[serde(default)]
    pub tickets: Vec<ScoredTicketMatch>,
    /// The message was too ambiguous to resolve.
    #[serde(default)]
    pub needs_clarification: bool,
    /// Candidate readings to offer the operator when clarification is needed.
    #[serde(default)]
    pub clarification_options: Vec<String>,
}

impl MatchResult {
    /// Whether nothing at all was matched
    pub fn is_empty(&self) -> bool {
        self.phenomena.is_empty() && self.root_causes.is_empty() && self.tickets.is_empty()
    }

    /// Root-cause and ticket matches as engine evidence
    pub fn multi_match(&self) -> MultiMatch {
        MultiMatch {
            root_causes: self
                .root_causes
                .iter()
                .map(|m| RootCauseMatch {
                    root_cause_id: m.id.clone(),
                    score: m.score,
                })
                .collect(),
            tickets: self
                .tickets
                .iter()
                .map(|m| TicketMatch {
                    ticket_id: m.id.clone(),
                    root_cause_id: m.root_cause_id.clone(),
                    score: m.score,
                })
                .collect(),
        }
    }
}
