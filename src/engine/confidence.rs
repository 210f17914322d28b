use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use crate::graph::GraphStore;
use crate::symptom::Symptom;

/// Weight of phenomenon evidence.
pub const PHENOMENON_WEIGHT: f64 = 0.5;
/// Weight of a direct root-cause match.
pub const ROOT_CAUSE_WEIGHT: f64 = 0.3;
/// Weight of a historical ticket match.
pub const TICKET_WEIGHT: f64 = 0.2;

/// Leader confidence above which suppression may apply.
pub const SUPPRESSION_LEADER_THRESHOLD: f64 = 0.45;
/// Minimum lead over the runner-up for suppression.
pub const SUPPRESSION_GAP_THRESHOLD: f64 = 0.04;
/// Factor applied to every non-leading hypothesis when suppression fires.
pub const SUPPRESSION_PENALTY: f64 = 0.7;

/// A ranked root-cause candidate, derived fresh every turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hypothesis {
    /// Root cause this hypothesis stands for.
    pub root_cause_id: String,
    /// Root cause description.
    pub description: String,
    /// Normalized confidence (0.0-1.0).
    pub confidence: f64,
    /// Observations that contributed evidence.
    pub contributing_observation_ids: Vec<String>,
    /// Phenomena that contributed evidence.
    pub contributing_phenomenon_ids: Vec<String>,
}

/// Semantic match of free text against a root cause description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootCauseMatch {
    /// Matched root cause.
    pub root_cause_id: String,
    /// Match strength (0.0-1.0).
    pub score: f64,
}

/// Semantic match of free text against a historical ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketMatch {
    /// Matched ticket.
    pub ticket_id: String,
    /// Root cause the matcher attributed the ticket to; the graph's own
    /// attribution wins when the ticket is known.
    pub root_cause_id: String,
    /// Match strength (0.0-1.0).
    pub score: f64,
}

/// Root-cause and ticket evidence for one turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MultiMatch {
    /// Direct root-cause matches.
    #[serde(default)]
    pub root_causes: Vec<RootCauseMatch>,
    /// Historical ticket matches.
    #[serde(default)]
    pub tickets: Vec<TicketMatch>,
}

impl MultiMatch {
    /// Whether there is no evidence at all.
    pub fn is_empty(&self) -> bool {
        self.root_causes.is_empty() && self.tickets.is_empty()
    }
}

#[derive(Debug, Default)]
struct Evidence {
    raw: f64,
    observation_ids: Vec<String>,
    phenomenon_ids: Vec<String>,
}

impl Evidence {
    fn note_observation(&mut self, observation_id: &str, phenomenon_id: &str) {
        if !self.observation_ids.iter().any(|id| id == observation_id) {
            self.observation_ids.push(observation_id.to_string());
        }
        if !self.phenomenon_ids.iter().any(|id| id == phenomenon_id) {
            self.phenomenon_ids.push(phenomenon_id.to_string());
        }
    }
}

/// Rank root-cause hypotheses for the current evidence.
///
/// Blocked root causes never appear in the result. An empty symptom with no
/// multi-match evidence yields an empty list.
pub fn compute_hypotheses(
    symptom: &Symptom,
    graph: &dyn GraphStore,
    multi_match: Option<&MultiMatch>,
) -> Vec<Hypothesis> {
    let mut evidence: BTreeMap<String, Evidence> = BTreeMap::new();

    for obs in symptom.confirmed_observations() {
        let Some(phenomenon_id) = obs.matched_phenomenon_id.as_deref() else {
            continue;
        };
        if symptom.is_phenomenon_blocked(phenomenon_id) {
            continue;
        }

        for root_cause_id in graph.root_causes_of(phenomenon_id).into_keys() {
            if symptom.is_root_cause_blocked(&root_cause_id) {
                continue;
            }
            if graph.root_cause(&root_cause_id).is_none() {
                warn!(
                    phenomenon_id = %phenomenon_id,
                    root_cause_id = %root_cause_id,
                    "Graph inconsistency: edge to unknown root cause, skipping"
                );
                continue;
            }

            let weight = graph.normalized_weight(phenomenon_id, &root_cause_id);
            let contribution = obs.match_score * weight * PHENOMENON_WEIGHT;
            if contribution <= 0.0 {
                continue;
            }

            let entry = evidence.entry(root_cause_id).or_default();
            entry.raw += contribution;
            entry.note_observation(&obs.id, phenomenon_id);
        }
    }

    if let Some(multi) = multi_match {
        for (root_cause_id, score) in best_root_cause_scores(multi) {
            if accepts(symptom, graph, &root_cause_id) {
                evidence.entry(root_cause_id).or_default().raw += score * ROOT_CAUSE_WEIGHT;
            }
        }
        for (root_cause_id, score) in best_ticket_scores(multi, graph) {
            if accepts(symptom, graph, &root_cause_id) {
                evidence.entry(root_cause_id).or_default().raw += score * TICKET_WEIGHT;
            }
        }
    }

    let confirmed = symptom.confirmed_phenomenon_ids();
    let mut hypotheses: Vec<Hypothesis> = evidence
        .into_iter()
        .filter(|(_, e)| e.raw > 0.0)
        .filter_map(|(root_cause_id, e)| {
            let root_cause = graph.root_cause(&root_cause_id)?;
            let factor = normalization_factor(graph, &confirmed, &root_cause_id);
            let confidence = (e.raw / factor).min(1.0);

            debug!(
                root_cause_id = %root_cause_id,
                raw = e.raw,
                factor,
                confidence,
                "Scored hypothesis"
            );

            Some(Hypothesis {
                root_cause_id,
                description: root_cause.description.clone(),
                confidence,
                contributing_observation_ids: e.observation_ids,
                contributing_phenomenon_ids: e.phenomenon_ids,
            })
        })
        .collect();

    sort_hypotheses(&mut hypotheses);
    apply_competitive_suppression(&mut hypotheses);
    hypotheses
}

/// Divisor turning a raw score into a confidence.
///
/// Uses the phenomenon count of the ticket that best matches the confirmed
/// set, so completing a small reference ticket reaches 1.0 regardless of how
/// many phenomena the root cause has globally. Without an overlapping ticket
/// the root cause's full phenomenon set is used.
pub fn normalization_factor(
    graph: &dyn GraphStore,
    confirmed: &BTreeSet<String>,
    root_cause_id: &str,
) -> f64 {
    let count = graph
        .best_ticket_for(confirmed, root_cause_id)
        .map(|(_, count)| count)
        .unwrap_or_else(|| graph.phenomena_of(root_cause_id).len())
        .max(1);

    count as f64 * PHENOMENON_WEIGHT
}

/// Penalize every hypothesis but the leader once the leader is clearly ahead.
///
/// Returns whether the penalty was applied.
pub fn apply_competitive_suppression(hypotheses: &mut [Hypothesis]) -> bool {
    if hypotheses.len() < 2 {
        return false;
    }

    let leader = hypotheses[0].confidence;
    let gap = leader - hypotheses[1].confidence;
    if leader <= SUPPRESSION_LEADER_THRESHOLD || gap <= SUPPRESSION_GAP_THRESHOLD {
        return false;
    }

    for h in hypotheses.iter_mut().skip(1) {
        h.confidence *= SUPPRESSION_PENALTY;
    }
    sort_hypotheses(hypotheses);

    debug!(
        leader = %hypotheses[0].root_cause_id,
        leader_confidence = leader,
        gap,
        "Competitive suppression applied"
    );
    true
}

/// Descending by confidence, ties by root cause id.
pub fn sort_hypotheses(hypotheses: &mut [Hypothesis]) {
    hypotheses.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| a.root_cause_id.cmp(&b.root_cause_id))
    });
}

fn accepts(symptom: &Symptom, graph: &dyn GraphStore, root_cause_id: &str) -> bool {
    if symptom.is_root_cause_blocked(root_cause_id) {
        return false;
    }
    if graph.root_cause(root_cause_id).is_none() {
        warn!(
            root_cause_id = %root_cause_id,
            "Graph inconsistency: match references unknown root cause, skipping"
        );
        return false;
    }
    true
}

fn usable_score(score: f64) -> Option<f64> {
    (score.is_finite() && score > 0.0).then(|| score.min(1.0))
}

/// Highest score per root cause.
fn best_root_cause_scores(multi: &MultiMatch) -> BTreeMap<String, f64> {
    let mut best: BTreeMap<String, f64> = BTreeMap::new();
    for m in &multi.root_causes {
        if let Some(score) = usable_score(m.score) {
            let slot = best.entry(m.root_cause_id.clone()).or_insert(0.0);
            *slot = slot.max(score);
        }
    }
    best
}

/// Highest score per ticket, then summed onto each ticket's root cause.
fn best_ticket_scores(multi: &MultiMatch, graph: &dyn GraphStore) -> BTreeMap<String, f64> {
    let mut per_ticket: BTreeMap<&str, (String, f64)> = BTreeMap::new();
    for m in &multi.tickets {
        let Some(score) = usable_score(m.score) else {
            continue;
        };
        let root_cause_id = match graph.ticket(&m.ticket_id) {
            Some(ticket) => {
                if ticket.root_cause_id != m.root_cause_id {
                    debug!(
                        ticket_id = %m.ticket_id,
                        claimed = %m.root_cause_id,
                        stored = %ticket.root_cause_id,
                        "Ticket match root cause differs from graph, using graph"
                    );
                }
                ticket.root_cause_id.clone()
            }
            None => m.root_cause_id.clone(),
        };

        let slot = per_ticket
            .entry(m.ticket_id.as_str())
            .or_insert((root_cause_id, 0.0));
        slot.1 = slot.1.max(score);
    }

    let mut by_root_cause: BTreeMap<String, f64> = BTreeMap::new();
    for (_, (root_cause_id, score)) in per_ticket {
        *by_root_cause.entry(root_cause_id).or_insert(0.0) += score;
    }
    by_root_cause
}
