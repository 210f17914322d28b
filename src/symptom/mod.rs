//! Per-session symptom ledger.
//!
//! Records confirmed observations and the phenomena/root causes ruled out by
//! denials. Blocking is one-way: nothing here removes an id from a blocked set,
//! only [`Symptom::default`] (via a session reset) starts over.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::graph::{GraphStore, Phenomenon};

/// Where an observation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationSource {
    /// Resolved to a phenomenon and confirmed.
    Confirmed,
    /// Free text that did not resolve to any phenomenon.
    UserInput,
}

impl std::fmt::Display for ObservationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObservationSource::Confirmed => write!(f, "confirmed"),
            ObservationSource::UserInput => write!(f, "user_input"),
        }
    }
}

/// A single recorded observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Unique observation identifier.
    pub id: String,
    /// Observation text; unique within a symptom.
    pub description: String,
    /// Origin of the observation.
    pub source: ObservationSource,
    /// Phenomenon the observation resolved to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_phenomenon_id: Option<String>,
    /// Match confidence (0.0-1.0), 1.0 for direct confirmations.
    pub match_score: f64,
    /// When the observation was recorded.
    pub created_at: DateTime<Utc>,
}

impl Observation {
    /// Observation confirming a phenomenon.
    pub fn confirmed(phenomenon: &Phenomenon, match_score: f64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            description: phenomenon.description.clone(),
            source: ObservationSource::Confirmed,
            matched_phenomenon_id: Some(phenomenon.id.clone()),
            match_score: match_score.clamp(0.0, 1.0),
            created_at: Utc::now(),
        }
    }

    /// Unmatched free-text observation.
    pub fn user_input(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            description: text.into(),
            source: ObservationSource::UserInput,
            matched_phenomenon_id: None,
            match_score: 0.0,
            created_at: Utc::now(),
        }
    }
}

/// Result of recording a confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recorded {
    /// A new observation was appended.
    Added,
    /// The phenomenon was already confirmed; its score was raised.
    Upgraded,
    /// Already present with an equal or higher score.
    Unchanged,
}

/// Session-scoped record of what has been confirmed and denied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Symptom {
    observations: Vec<Observation>,
    blocked_phenomenon_ids: BTreeSet<String>,
    blocked_root_cause_ids: BTreeSet<String>,
}

impl Symptom {
    /// Empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Observations in insertion order.
    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    /// Denied phenomena.
    pub fn blocked_phenomenon_ids(&self) -> &BTreeSet<String> {
        &self.blocked_phenomenon_ids
    }

    /// Root causes ruled out by denials.
    pub fn blocked_root_cause_ids(&self) -> &BTreeSet<String> {
        &self.blocked_root_cause_ids
    }

    /// Whether the phenomenon was denied.
    pub fn is_phenomenon_blocked(&self, phenomenon_id: &str) -> bool {
        self.blocked_phenomenon_ids.contains(phenomenon_id)
    }

    /// Whether the root cause was ruled out.
    pub fn is_root_cause_blocked(&self, root_cause_id: &str) -> bool {
        self.blocked_root_cause_ids.contains(root_cause_id)
    }

    /// Observations that resolved to a phenomenon.
    pub fn confirmed_observations(&self) -> impl Iterator<Item = &Observation> {
        self.observations
            .iter()
            .filter(|o| o.source == ObservationSource::Confirmed && o.matched_phenomenon_id.is_some())
    }

    /// Ids of all confirmed phenomena.
    pub fn confirmed_phenomenon_ids(&self) -> BTreeSet<String> {
        self.confirmed_observations()
            .filter_map(|o| o.matched_phenomenon_id.clone())
            .collect()
    }

    /// Number of distinct confirmed phenomena.
    pub fn confirmed_count(&self) -> usize {
        self.confirmed_phenomenon_ids().len()
    }

    /// Whether nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
            && self.blocked_phenomenon_ids.is_empty()
            && self.blocked_root_cause_ids.is_empty()
    }

    /// Record a confirmed phenomenon.
    ///
    /// Confirming the same phenomenon (or the same description) again never
    /// adds a second observation; a higher score replaces the stored one.
    pub fn confirm(&mut self, phenomenon: &Phenomenon, match_score: f64) -> Recorded {
        let score = match_score.clamp(0.0, 1.0);
        let existing = self.observations.iter_mut().find(|o| {
            o.matched_phenomenon_id.as_deref() == Some(phenomenon.id.as_str())
                || o.description == phenomenon.description
        });

        match existing {
            Some(obs) if obs.source == ObservationSource::UserInput => {
                // Earlier unmatched text now resolves to this phenomenon.
                obs.source = ObservationSource::Confirmed;
                obs.matched_phenomenon_id = Some(phenomenon.id.clone());
                obs.match_score = score;
                Recorded::Upgraded
            }
            Some(obs) if score > obs.match_score => {
                obs.match_score = score;
                Recorded::Upgraded
            }
            Some(_) => Recorded::Unchanged,
            None => {
                self.observations.push(Observation::confirmed(phenomenon, score));
                Recorded::Added
            }
        }
    }

    /// Record unmatched free text. Returns `false` for a repeated description.
    pub fn record_user_input(&mut self, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() || self.observations.iter().any(|o| o.description == text) {
            return false;
        }
        self.observations.push(Observation::user_input(text));
        true
    }

    /// Deny a phenomenon, blocking it and every root cause linked to it.
    ///
    /// Returns the root causes that became blocked by this call.
    pub fn deny(&mut self, phenomenon_id: &str, graph: &dyn GraphStore) -> Vec<String> {
        self.blocked_phenomenon_ids.insert(phenomenon_id.to_string());

        graph
            .root_causes_of(phenomenon_id)
            .into_keys()
            .filter(|rc| self.blocked_root_cause_ids.insert(rc.clone()))
            .collect()
    }
}
