use serde::{Deserialize, Serialize};

use super::Hypothesis;
use crate::config::DiagnosisConfig;
use crate::graph::GraphStore;
use crate::symptom::Symptom;

/// Maximum number of reference tickets attached to a diagnosis.
pub const MAX_REFERENCE_TICKETS: usize = 3;

/// Lifecycle of a diagnostic session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosisStatus {
    /// No hypothesis, or the leader is still weak.
    #[default]
    Exploring,
    /// A plausible leader exists.
    Narrowing,
    /// The leader crossed the high-confidence threshold.
    Confirming,
    /// A diagnosis was recorded; terminal until reset.
    Diagnosed,
}

impl std::fmt::Display for DiagnosisStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiagnosisStatus::Exploring => write!(f, "exploring"),
            DiagnosisStatus::Narrowing => write!(f, "narrowing"),
            DiagnosisStatus::Confirming => write!(f, "confirming"),
            DiagnosisStatus::Diagnosed => write!(f, "diagnosed"),
        }
    }
}

/// Classify ranked hypotheses. Never returns [`DiagnosisStatus::Diagnosed`];
/// that state is entered by the session once a diagnosis is recorded.
pub fn classify(hypotheses: &[Hypothesis], config: &DiagnosisConfig) -> DiagnosisStatus {
    let top = top_confidence(hypotheses);
    if top >= config.high_confidence_threshold {
        DiagnosisStatus::Confirming
    } else if top >= config.narrowing_threshold {
        DiagnosisStatus::Narrowing
    } else {
        DiagnosisStatus::Exploring
    }
}

/// Whether the session has gone on long enough without a credible leader.
///
/// `round` is the round count after the current turn.
pub fn is_stuck(round: u32, hypotheses: &[Hypothesis], config: &DiagnosisConfig) -> bool {
    round >= config.stuck_round_threshold
        && top_confidence(hypotheses) < config.stuck_confidence_threshold
}

/// Confidence of the leading hypothesis, 0.0 when there is none.
pub fn top_confidence(hypotheses: &[Hypothesis]) -> f64 {
    hypotheses.first().map(|h| h.confidence).unwrap_or(0.0)
}

/// Historical ticket cited by a diagnosis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceTicket {
    /// Ticket identifier.
    pub ticket_id: String,
    /// Ticket title, when recorded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Confirmed phenomena also recorded on the ticket.
    pub overlap: usize,
    /// Total phenomena on the ticket.
    pub phenomena_count: usize,
}

/// Final diagnosis for a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnosis {
    /// Diagnosed root cause.
    pub root_cause_id: String,
    /// Root cause description.
    pub description: String,
    /// Confidence of the leader when the diagnosis was made.
    pub confidence: f64,
    /// Descriptions of the confirmed phenomena supporting the root cause.
    pub observed_phenomena: Vec<String>,
    /// Remediation recorded for the root cause.
    pub solution: String,
    /// Most similar historical tickets, best first.
    pub reference_tickets: Vec<ReferenceTicket>,
    /// Human-readable explanation.
    pub reasoning: String,
}

/// Build the diagnosis for the leading hypothesis.
///
/// Returns `None` when the root cause is no longer in the graph.
pub fn assemble_diagnosis(
    leader: &Hypothesis,
    symptom: &Symptom,
    graph: &dyn GraphStore,
) -> Option<Diagnosis> {
    let root_cause = graph.root_cause(&leader.root_cause_id)?;
    let confirmed = symptom.confirmed_phenomenon_ids();

    let observed_phenomena: Vec<String> = leader
        .contributing_phenomenon_ids
        .iter()
        .map(|id| {
            graph
                .phenomenon(id)
                .map(|p| p.description.clone())
                .unwrap_or_else(|| id.clone())
        })
        .collect();

    let mut references: Vec<ReferenceTicket> = graph
        .tickets_of(&root_cause.id)
        .into_iter()
        .map(|t| ReferenceTicket {
            ticket_id: t.id.clone(),
            title: t.title.clone(),
            overlap: t.phenomenon_ids.intersection(&confirmed).count(),
            phenomena_count: t.phenomenon_ids.len(),
        })
        .filter(|r| r.overlap > 0)
        .collect();
    references.sort_by(|a, b| {
        b.overlap
            .cmp(&a.overlap)
            .then(a.phenomena_count.cmp(&b.phenomena_count))
            .then_with(|| a.ticket_id.cmp(&b.ticket_id))
    });
    references.truncate(MAX_REFERENCE_TICKETS);

    let reasoning = reasoning(
        &root_cause.description,
        leader.confidence,
        &observed_phenomena,
        &references,
    );

    Some(Diagnosis {
        root_cause_id: root_cause.id.clone(),
        description: root_cause.description.clone(),
        confidence: leader.confidence,
        observed_phenomena,
        solution: root_cause.solution.clone(),
        reference_tickets: references,
        reasoning,
    })
}

fn reasoning(
    description: &str,
    confidence: f64,
    observed: &[String],
    references: &[ReferenceTicket],
) -> String {
    let mut text = format!(
        "Root cause \"{}\" reached {:.0}% confidence",
        description,
        confidence * 100.0
    );
    if !observed.is_empty() {
        text.push_str(&format!(" from observed phenomena: {}", observed.join("; ")));
    }
    text.push('.');
    if let Some(best) = references.first() {
        text.push_str(&format!(
            " Closest historical ticket {} shares {} of its {} phenomena.",
            best.ticket_id, best.overlap, best.phenomena_count
        ));
    }
    text
}
