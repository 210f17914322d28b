use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::Session;
use crate::config::DiagnosisConfig;
use crate::engine::{
    assemble_diagnosis, classify, compute_hypotheses, is_stuck, recommend, Diagnosis,
    DiagnosisStatus, Hypothesis, MultiMatch, PlannerConfig, Recommendation, RootCauseMatch,
    TicketMatch,
};
use crate::graph::GraphStore;
use crate::matcher::MatchResult;

fn default_score() -> f64 {
    1.0
}

/// A phenomenon the operator confirmed, with the match confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmedPhenomenon {
    pub phenomenon_id: String,
    #[serde(default = "default_score")]
    pub score: f64,
}

/// Evidence supplied for one turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnInput {
    #[serde(default)]
    pub confirmed: Vec<ConfirmedPhenomenon>,
    #[serde(default)]
    pub denied: Vec<String>,
    #[serde(default)]
    pub root_cause_matches: Vec<RootCauseMatch>,
    #[serde(default)]
    pub ticket_matches: Vec<TicketMatch>,
    /// Free text that resolved to no phenomenon; recorded as user input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unmatched_text: Option<String>,
}

impl TurnInput {
    /// Empty turn
    pub fn new() -> Self {
        Self::default()
    }

    /// Confirm a phenomenon with full confidence
    pub fn confirm(self, phenomenon_id: impl Into<String>) -> Self {
        self.confirm_with_score(phenomenon_id, 1.0)
    }

    /// Confirm a phenomenon with a match score
    pub fn confirm_with_score(mut self, phenomenon_id: impl Into<String>, score: f64) -> Self {
        self.confirmed.push(ConfirmedPhenomenon {
            phenomenon_id: phenomenon_id.into(),
            score,
        });
        self
    }

    /// Deny a phenomenon
    pub fn deny(mut self, phenomenon_id: impl Into<String>) -> Self {
        self.denied.push(phenomenon_id.into());
        self
    }

    /// Add a direct root-cause match
    pub fn with_root_cause_match(mut self, root_cause_id: impl Into<String>, score: f64) -> Self {
        self.root_cause_matches.push(RootCauseMatch {
            root_cause_id: root_cause_id.into(),
            score,
        });
        self
    }

    /// Add a ticket match
    pub fn with_ticket_match(
        mut self,
        ticket_id: impl Into<String>,
        root_cause_id: impl Into<String>,
        score: f64,
    ) -> Self {
        self.ticket_matches.push(TicketMatch {
            ticket_id: ticket_id.into(),
            root_cause_id: root_cause_id.into(),
            score,
        });
        self
    }

    /// Record unmatched free text
    pub fn with_unmatched_text(mut self, text: impl Into<String>) -> Self {
        self.unmatched_text = Some(text.into());
        self
    }

    /// Turn a matcher result for `text` into turn evidence.
    ///
    /// Text that matched no phenomenon is kept as unmatched user input.
    pub fn from_match_result(result: &MatchResult, text: &str) -> Self {
        let multi = result.multi_match();
        Self {
            confirmed: result
                .phenomena
                .iter()
                .map(|m| ConfirmedPhenomenon {
                    phenomenon_id: m.id.clone(),
                    score: m.score,
                })
                .collect(),
            denied: Vec::new(),
            root_cause_matches: multi.root_causes,
            ticket_matches: multi.tickets,
            unmatched_text: result.phenomena.is_empty().then(|| text.to_string()),
        }
    }
}

/// An input item skipped during a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IgnoredInput {
    /// Which input list the item came from.
    pub field: String,
    /// Offending identifier or value.
    pub value: String,
    pub reason: String,
}

/// What the caller should do after a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NextStep {
    /// Ask the operator to check these phenomena.
    Recommend {
        recommendations: Vec<Recommendation>,
    },
    /// A root cause was identified.
    Diagnose { diagnosis: Diagnosis },
    /// Nothing left worth asking; more free-form evidence is needed.
    InsufficientInformation,
}

/// Result of one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub session_id: String,
    /// Round count after this turn.
    pub round: u32,
    pub status: DiagnosisStatus,
    /// Hint that the session is going nowhere.
    pub stuck: bool,
    pub hypotheses: Vec<Hypothesis>,
    pub next: NextStep,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignored: Vec<IgnoredInput>,
}

fn valid_score(score: f64) -> bool {
    score.is_finite() && (0.0..=1.0).contains(&score)
}

impl Session {
    /// Apply one turn of evidence, returning the next session state.
    ///
    /// Denials are applied before confirmations, so a phenomenon both
    /// confirmed and denied in the same turn ends up denied. Invalid items
    /// are skipped and listed in [`TurnOutcome::ignored`]; they never fail
    /// the turn.
    pub fn advance(
        &self,
        input: &TurnInput,
        graph: &dyn GraphStore,
        config: &DiagnosisConfig,
    ) -> (Session, TurnOutcome) {
        let mut next = self.clone();
        let mut ignored = Vec::new();
        let mut skip = |field: &str, value: &str, reason: &str| {
            warn!(
                session_id = %self.id,
                field,
                value,
                reason,
                "Ignoring invalid turn input"
            );
            ignored.push(IgnoredInput {
                field: field.to_string(),
                value: value.to_string(),
                reason: reason.to_string(),
            });
        };

        for phenomenon_id in &input.denied {
            if graph.phenomenon(phenomenon_id).is_none() {
                skip("denied", phenomenon_id, "unknown phenomenon");
                continue;
            }
            let blocked = next.symptom.deny(phenomenon_id, graph);
            debug!(
                session_id = %self.id,
                phenomenon_id = %phenomenon_id,
                blocked_root_causes = ?blocked,
                "Phenomenon denied"
            );
        }

        for item in &input.confirmed {
            if !valid_score(item.score) {
                skip("confirmed", &item.phenomenon_id, "score outside [0, 1]");
                continue;
            }
            let Some(phenomenon) = graph.phenomenon(&item.phenomenon_id) else {
                skip("confirmed", &item.phenomenon_id, "unknown phenomenon");
                continue;
            };
            if next.symptom.is_phenomenon_blocked(&phenomenon.id) {
                skip("confirmed", &item.phenomenon_id, "phenomenon was denied");
                continue;
            }
            let recorded = next.symptom.confirm(phenomenon, item.score);
            debug!(
                session_id = %self.id,
                phenomenon_id = %phenomenon.id,
                ?recorded,
                "Phenomenon confirmed"
            );
        }

        if let Some(text) = &input.unmatched_text {
            next.symptom.record_user_input(text);
        }

        let mut multi = MultiMatch::default();
        for m in &input.root_cause_matches {
            if !valid_score(m.score) {
                skip("root_cause_matches", &m.root_cause_id, "score outside [0, 1]");
            } else if graph.root_cause(&m.root_cause_id).is_none() {
                skip("root_cause_matches", &m.root_cause_id, "unknown root cause");
            } else {
                multi.root_causes.push(m.clone());
            }
        }
        for m in &input.ticket_matches {
            if !valid_score(m.score) {
                skip("ticket_matches", &m.ticket_id, "score outside [0, 1]");
            } else if graph.ticket(&m.ticket_id).is_none()
                && graph.root_cause(&m.root_cause_id).is_none()
            {
                skip("ticket_matches", &m.ticket_id, "unknown ticket and root cause");
            } else {
                multi.tickets.push(m.clone());
            }
        }

        let hypotheses = compute_hypotheses(
            &next.symptom,
            graph,
            (!multi.is_empty()).then_some(&multi),
        );
        next.round_count = self.round_count + 1;

        let (status, next_step) = if let Some(diagnosis) = &self.diagnosis {
            // Terminal until reset: evidence is still recorded, nothing is planned.
            next.recommendations.clear();
            (
                DiagnosisStatus::Diagnosed,
                NextStep::Diagnose {
                    diagnosis: diagnosis.clone(),
                },
            )
        } else {
            let status = classify(&hypotheses, config);
            let diagnosis = (status == DiagnosisStatus::Confirming)
                .then(|| hypotheses.first())
                .flatten()
                .and_then(|leader| assemble_diagnosis(leader, &next.symptom, graph));

            match diagnosis {
                Some(diagnosis) => {
                    next.diagnosis = Some(diagnosis.clone());
                    next.recommendations.clear();
                    next.status = DiagnosisStatus::Diagnosed;
                    (status, NextStep::Diagnose { diagnosis })
                }
                None => {
                    let recommendations = recommend(
                        &hypotheses,
                        &next.symptom,
                        graph,
                        &PlannerConfig::from(config),
                    );
                    next.status = status;
                    next.recommendations = recommendations.clone();
                    let step = if recommendations.is_empty() {
                        NextStep::InsufficientInformation
                    } else {
                        NextStep::Recommend { recommendations }
                    };
                    (status, step)
                }
            }
        };

        next.stuck = next.diagnosis.is_none() && is_stuck(next.round_count, &hypotheses, config);
        next.hypotheses = hypotheses.clone();
        next.updated_at = Utc::now();

        let outcome = TurnOutcome {
            session_id: next.id.clone(),
            round: next.round_count,
            status,
            stuck: next.stuck,
            hypotheses,
            next: next_step,
            ignored,
        };
        (next, outcome)
    }
}

#[cfg(test)]
#[path = "turn_tests.rs"]
mod turn_tests;
