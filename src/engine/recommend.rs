use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

use super::Hypothesis;
use crate::config::DiagnosisConfig;
use crate::graph::GraphStore;
use crate::symptom::Symptom;

/// A phenomenon worth asking the operator about next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Phenomenon to check.
    pub phenomenon_id: String,
    /// Phenomenon description.
    pub description: String,
    /// How to check it.
    pub observation_method: String,
    /// Why it is being asked, naming the strongest supporting hypothesis.
    pub reason: String,
    /// Leading hypotheses linked to this phenomenon, strongest first.
    pub related_hypothesis_ids: Vec<String>,
    /// Share of the leading hypotheses linked to it (0.0-1.0).
    pub information_gain: f64,
}

/// Planner limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannerConfig {
    /// Leading hypotheses to draw candidates from.
    pub top_k: usize,
    /// Maximum recommendations returned.
    pub max_out: usize,
    /// Confirmed count at which the per-root-cause cap rises from 1 to 2.
    pub diversity_threshold: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            max_out: 5,
            diversity_threshold: 3,
        }
    }
}

impl From<&DiagnosisConfig> for PlannerConfig {
    fn from(config: &DiagnosisConfig) -> Self {
        Self {
            top_k: config.recommend_top_k.max(1),
            max_out: config.recommend_max,
            diversity_threshold: config.diversity_threshold,
        }
    }
}

struct Candidate<'a> {
    /// (root cause id, confidence) in hypothesis rank order.
    supporters: Vec<(&'a str, f64)>,
    weight: f64,
}

/// Select the next phenomena to ask about.
///
/// Candidates are the phenomena of the top `top_k` hypotheses that are
/// neither confirmed nor denied. An empty result means there is nothing left
/// to ask, not an error.
pub fn recommend(
    hypotheses: &[Hypothesis],
    symptom: &Symptom,
    graph: &dyn GraphStore,
    config: &PlannerConfig,
) -> Vec<Recommendation> {
    let top_k = config.top_k.max(1);
    let leading = &hypotheses[..hypotheses.len().min(top_k)];
    let confirmed = symptom.confirmed_phenomenon_ids();

    let mut candidates: BTreeMap<String, Candidate<'_>> = BTreeMap::new();
    for h in leading {
        for phenomenon_id in graph.phenomena_of(&h.root_cause_id) {
            if confirmed.contains(&phenomenon_id) || symptom.is_phenomenon_blocked(&phenomenon_id)
            {
                continue;
            }
            let candidate = candidates.entry(phenomenon_id).or_insert_with_key(|pid| {
                Candidate {
                    supporters: Vec::new(),
                    weight: graph.normalized_weight(pid, &h.root_cause_id),
                }
            });
            candidate
                .supporters
                .push((h.root_cause_id.as_str(), h.confidence));
        }
    }

    let mut ranked: Vec<(String, Candidate<'_>, f64)> = candidates
        .into_iter()
        .map(|(pid, c)| {
            let gain = c.supporters.len() as f64 / top_k as f64;
            (pid, c, gain.min(1.0))
        })
        .collect();

    ranked.sort_by(|(pa, a, ga), (pb, b, gb)| {
        gb.total_cmp(ga)
            .then_with(|| b.supporters[0].1.total_cmp(&a.supporters[0].1))
            .then_with(|| b.weight.total_cmp(&a.weight))
            .then_with(|| pa.cmp(pb))
    });

    let per_root_cause_cap = if symptom.confirmed_count() < config.diversity_threshold {
        1
    } else {
        2
    };

    let mut taken: HashMap<&str, usize> = HashMap::new();
    let mut out = Vec::new();
    for (phenomenon_id, candidate, gain) in ranked {
        if out.len() >= config.max_out {
            break;
        }

        let (supporting_id, supporting_confidence) = candidate.supporters[0];
        let count = taken.entry(supporting_id).or_insert(0);
        if *count >= per_root_cause_cap {
            continue;
        }

        let Some(phenomenon) = graph.phenomenon(&phenomenon_id) else {
            warn!(
                phenomenon_id = %phenomenon_id,
                root_cause_id = %supporting_id,
                "Graph inconsistency: linked phenomenon missing from store, skipping"
            );
            continue;
        };
        *count += 1;

        let supporting_description = hypotheses
            .iter()
            .find(|h| h.root_cause_id == supporting_id)
            .map(|h| h.description.as_str())
            .unwrap_or(supporting_id);

        out.push(Recommendation {
            phenomenon_id: phenomenon.id.clone(),
            description: phenomenon.description.clone(),
            observation_method: phenomenon.observation_method.clone(),
            reason: reason(
                supporting_description,
                supporting_confidence,
                candidate.supporters.len(),
            ),
            related_hypothesis_ids: candidate
                .supporters
                .iter()
                .map(|(id, _)| id.to_string())
                .collect(),
            information_gain: gain,
        });
    }

    debug!(
        hypotheses = leading.len(),
        recommendations = out.len(),
        per_root_cause_cap,
        "Planned recommendations"
    );

    out
}

fn reason(description: &str, confidence: f64, shared_by: usize) -> String {
    let base = format!(
        "Supports hypothesis \"{}\" ({:.0}% confidence)",
        description,
        confidence * 100.0
    );
    if shared_by > 1 {
        format!("{}; shared by {} leading hypotheses", base, shared_by)
    } else {
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::compute_hypotheses;
    use crate::graph::KnowledgeGraph;

    fn graph() -> KnowledgeGraph {
        KnowledgeGraph::builder()
            .phenomenon("P1", "wait_io high", "iostat")
            .phenomenon("P2", "dirty pages accumulating", "engine status")
            .phenomenon("P3", "fsync latency spikes", "perf trace")
            .phenomenon("P4", "buffer pool hit ratio low", "show status")
            .phenomenon("P5", "checkpoint age near limit", "engine status")
            .phenomenon("P6", "temp tables on disk", "show status")
            .root_cause("RC1", "disk saturation", "faster storage")
            .root_cause("RC2", "undersized buffer pool", "raise buffer pool")
            .root_cause("RC3", "redo log too small", "grow redo log")
            .ticket("T1", "RC1", ["P1", "P2", "P3"])
            .ticket("T2", "RC2", ["P1", "P4", "P2"])
            .ticket("T3", "RC3", ["P1", "P5", "P6"])
            .build()
    }

    fn hypothesis(id: &str, description: &str, confidence: f64) -> Hypothesis {
        Hypothesis {
            root_cause_id: id.to_string(),
            description: description.to_string(),
            confidence,
            contributing_observation_ids: Vec::new(),
            contributing_phenomenon_ids: Vec::new(),
        }
    }

    fn config(diversity_threshold: usize) -> PlannerConfig {
        PlannerConfig {
            top_k: 3,
            max_out: 5,
            diversity_threshold,
        }
    }

    #[test]
    fn test_no_hypotheses_no_recommendations() {
        let graph = graph();
        assert!(recommend(&[], &Symptom::new(), &graph, &PlannerConfig::default()).is_empty());
    }

    #[test]
    fn test_shared_phenomenon_ranks_first() {
        let graph = graph();
        let hyps = vec![
            hypothesis("RC1", "disk saturation", 0.4),
            hypothesis("RC2", "undersized buffer pool", 0.3),
            hypothesis("RC3", "redo log too small", 0.2),
        ];

        let recs = recommend(&hyps, &Symptom::new(), &graph, &config(3));

        // P1 is linked to all three, P2 to two.
        assert_eq!(recs[0].phenomenon_id, "P1");
        assert!((recs[0].information_gain - 1.0).abs() < 1e-9);
        assert_eq!(recs[0].related_hypothesis_ids, vec!["RC1", "RC2", "RC3"]);
        assert!(recs[0].reason.contains("disk saturation"));
        assert!(recs[0].reason.contains("shared by 3"));
    }

    #[test]
    fn test_diversity_cap_one_per_root_cause_early() {
        let graph = graph();
        let hyps = vec![hypothesis("RC1", "disk saturation", 0.5)];

        let recs = recommend(&hyps, &Symptom::new(), &graph, &config(3));
        assert_eq!(recs.len(), 1);
        assert!((recs[0].information_gain - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_diversity_cap_rises_after_threshold() {
        let graph = graph();
        let mut symptom = Symptom::new();
        let p5 = graph.phenomenon("P5").cloned().unwrap();
        symptom.confirm(&p5, 1.0);
        let hyps = compute_hypotheses(&symptom, &graph, None);
        assert_eq!(hyps[0].root_cause_id, "RC3");

        let early = recommend(&hyps, &symptom, &graph, &config(3));
        assert_eq!(early.len(), 1);

        let late = recommend(&hyps, &symptom, &graph, &config(1));
        assert_eq!(late.len(), 2);
        assert!(late.iter().all(|r| r.phenomenon_id != "P5"));
    }

    #[test]
    fn test_confirmed_and_denied_are_excluded() {
        let graph = graph();
        let mut symptom = Symptom::new();
        let p2 = graph.phenomenon("P2").cloned().unwrap();
        symptom.confirm(&p2, 1.0);
        symptom.deny("P4", &graph);

        let hyps = vec![
            hypothesis("RC1", "disk saturation", 0.6),
            hypothesis("RC2", "undersized buffer pool", 0.3),
            hypothesis("RC3", "redo log too small", 0.1),
        ];
        let recs = recommend(&hyps, &symptom, &graph, &config(0));

        assert!(!recs.is_empty());
        for r in &recs {
            assert_ne!(r.phenomenon_id, "P2");
            assert_ne!(r.phenomenon_id, "P4");
        }
    }

    #[test]
    fn test_exhausted_candidates_return_empty() {
        let graph = graph();
        let mut symptom = Symptom::new();
        for id in ["P1", "P2", "P3"] {
            let p = graph.phenomenon(id).cloned().unwrap();
            symptom.confirm(&p, 1.0);
        }
        let hyps = vec![hypothesis("RC1", "disk saturation", 0.9)];

        assert!(recommend(&hyps, &symptom, &graph, &config(3)).is_empty());
    }

    #[test]
    fn test_max_out_truncates() {
        let graph = graph();
        let hyps = vec![
            hypothesis("RC1", "disk saturation", 0.4),
            hypothesis("RC2", "undersized buffer pool", 0.3),
            hypothesis("RC3", "redo log too small", 0.2),
        ];
        let planner = PlannerConfig {
            top_k: 3,
            max_out: 2,
            diversity_threshold: 0,
        };

        let recs = recommend(&hyps, &Symptom::new(), &graph, &planner);
        assert_eq!(recs.len(), 2);
        assert!(recs[0].information_gain >= recs[1].information_gain);
    }
}
