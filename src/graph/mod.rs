//! Knowledge graph store for phenomena, root causes and historical tickets.
//!
//! The graph is read-only during a diagnostic run. It is built once (from
//! SQLite via [`SqliteGraphSource`] or in code via [`KnowledgeGraphBuilder`])
//! and published through a [`GraphHandle`], which replaces the whole snapshot
//! on refresh instead of mutating it in place.

mod sqlite;

pub use sqlite::SqliteGraphSource;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock};
use tracing::warn;

/// A standardized, checkable symptom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phenomenon {
    /// Unique phenomenon identifier.
    pub id: String,
    /// What the operator would observe.
    pub description: String,
    /// How to check for it.
    pub observation_method: String,
}

/// A diagnosed underlying problem with its remediation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootCause {
    /// Unique root cause identifier.
    pub id: String,
    /// Human-readable description.
    pub description: String,
    /// Remediation text.
    pub solution: String,
    /// Number of historical tickets attributed to this root cause.
    pub ticket_count: u32,
}

/// A historical incident linking a root cause to the phenomena seen with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    /// Unique ticket identifier.
    pub id: String,
    /// Root cause the incident was attributed to.
    pub root_cause_id: String,
    /// Optional incident title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Phenomena recorded on the ticket.
    pub phenomenon_ids: BTreeSet<String>,
}

/// Entity counts, used for startup logging and the `graph-stats` command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    /// Phenomenon count.
    pub phenomena: usize,
    /// Root cause count.
    pub root_causes: usize,
    /// Ticket count.
    pub tickets: usize,
    /// Distinct phenomenon/root-cause edges.
    pub edges: usize,
}

/// Read API over the knowledge graph.
///
/// Edge weights are co-occurrence counts: the number of tickets of a root
/// cause that also list the phenomenon.
pub trait GraphStore: Send + Sync {
    /// Look up a phenomenon.
    fn phenomenon(&self, id: &str) -> Option<&Phenomenon>;

    /// Look up a root cause.
    fn root_cause(&self, id: &str) -> Option<&RootCause>;

    /// Look up a ticket.
    fn ticket(&self, id: &str) -> Option<&Ticket>;

    /// Ticket co-occurrence count for the pair, 0 when unlinked.
    fn edge_weight(&self, phenomenon_id: &str, root_cause_id: &str) -> u32;

    /// Largest edge weight among all phenomena linked to the root cause.
    fn max_edge_weight(&self, root_cause_id: &str) -> u32;

    /// All phenomena ever linked to the root cause, sorted by id.
    fn phenomena_of(&self, root_cause_id: &str) -> Vec<String>;

    /// Root causes linked to the phenomenon with their edge weights.
    fn root_causes_of(&self, phenomenon_id: &str) -> BTreeMap<String, u32>;

    /// Tickets attributed to the root cause, sorted by id.
    fn tickets_of(&self, root_cause_id: &str) -> Vec<&Ticket>;

    /// Entity counts.
    fn stats(&self) -> GraphStats;

    /// Ticket of `root_cause_id` sharing the most phenomena with
    /// `phenomenon_ids`, returned with its phenomenon count.
    ///
    /// Ties go to the smaller ticket, then the lower id. `None` when no
    /// ticket overlaps at all.
    fn best_ticket_for(
        &self,
        phenomenon_ids: &BTreeSet<String>,
        root_cause_id: &str,
    ) -> Option<(String, usize)> {
        self.tickets_of(root_cause_id)
            .into_iter()
            .map(|t| {
                let overlap = t.phenomenon_ids.intersection(phenomenon_ids).count();
                (overlap, t)
            })
            .filter(|(overlap, _)| *overlap > 0)
            .min_by(|(oa, a), (ob, b)| {
                ob.cmp(oa)
                    .then(a.phenomenon_ids.len().cmp(&b.phenomenon_ids.len()))
                    .then(a.id.cmp(&b.id))
            })
            .map(|(_, t)| (t.id.clone(), t.phenomenon_ids.len()))
    }

    /// `edge_weight / max_edge_weight`, in `[0, 1]`.
    fn normalized_weight(&self, phenomenon_id: &str, root_cause_id: &str) -> f64 {
        let max = self.max_edge_weight(root_cause_id);
        if max == 0 {
            return 0.0;
        }
        f64::from(self.edge_weight(phenomenon_id, root_cause_id)) / f64::from(max)
    }
}

/// In-memory, immutable knowledge graph snapshot.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeGraph {
    phenomena: HashMap<String, Phenomenon>,
    root_causes: HashMap<String, RootCause>,
    tickets: HashMap<String, Ticket>,
    tickets_by_root_cause: HashMap<String, Vec<String>>,
    /// phenomenon id -> root cause id -> weight
    by_phenomenon: HashMap<String, BTreeMap<String, u32>>,
    /// root cause id -> phenomenon id -> weight
    by_root_cause: HashMap<String, BTreeMap<String, u32>>,
}

impl KnowledgeGraph {
    /// Start building a graph.
    pub fn builder() -> KnowledgeGraphBuilder {
        KnowledgeGraphBuilder::default()
    }

    /// Graph with no entities.
    pub fn empty() -> Self {
        Self::default()
    }
}

impl GraphStore for KnowledgeGraph {
    fn phenomenon(&self, id: &str) -> Option<&Phenomenon> {
        self.phenomena.get(id)
    }

    fn root_cause(&self, id: &str) -> Option<&RootCause> {
        self.root_causes.get(id)
    }

    fn ticket(&self, id: &str) -> Option<&Ticket> {
        self.tickets.get(id)
    }

    fn edge_weight(&self, phenomenon_id: &str, root_cause_id: &str) -> u32 {
        self.by_phenomenon
            .get(phenomenon_id)
            .and_then(|rcs| rcs.get(root_cause_id))
            .copied()
            .unwrap_or(0)
    }

    fn max_edge_weight(&self, root_cause_id: &str) -> u32 {
        self.by_root_cause
            .get(root_cause_id)
            .and_then(|ps| ps.values().max())
            .copied()
            .unwrap_or(0)
    }

    fn phenomena_of(&self, root_cause_id: &str) -> Vec<String> {
        self.by_root_cause
            .get(root_cause_id)
            .map(|ps| ps.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn root_causes_of(&self, phenomenon_id: &str) -> BTreeMap<String, u32> {
        self.by_phenomenon
            .get(phenomenon_id)
            .cloned()
            .unwrap_or_default()
    }

    fn tickets_of(&self, root_cause_id: &str) -> Vec<&Ticket> {
        self.tickets_by_root_cause
            .get(root_cause_id)
            .map(|ids| ids.iter().filter_map(|id| self.tickets.get(id)).collect())
            .unwrap_or_default()
    }

    fn stats(&self) -> GraphStats {
        GraphStats {
            phenomena: self.phenomena.len(),
            root_causes: self.root_causes.len(),
            tickets: self.tickets.len(),
            edges: self.by_phenomenon.values().map(BTreeMap::len).sum(),
        }
    }
}

/// Collects entities and derives the weighted edges from tickets.
#[derive(Debug, Default)]
pub struct KnowledgeGraphBuilder {
    phenomena: Vec<Phenomenon>,
    root_causes: Vec<RootCause>,
    tickets: Vec<Ticket>,
}

impl KnowledgeGraphBuilder {
    /// Add a phenomenon.
    pub fn phenomenon(
        mut self,
        id: impl Into<String>,
        description: impl Into<String>,
        observation_method: impl Into<String>,
    ) -> Self {
        self.phenomena.push(Phenomenon {
            id: id.into(),
            description: description.into(),
            observation_method: observation_method.into(),
        });
        self
    }

    /// Add a root cause.
    pub fn root_cause(
        mut self,
        id: impl Into<String>,
        description: impl Into<String>,
        solution: impl Into<String>,
    ) -> Self {
        self.root_causes.push(RootCause {
            id: id.into(),
            description: description.into(),
            solution: solution.into(),
            ticket_count: 0,
        });
        self
    }

    /// Add a ticket linking a root cause to phenomena.
    pub fn ticket<I, S>(
        mut self,
        id: impl Into<String>,
        root_cause_id: impl Into<String>,
        phenomena: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tickets.push(Ticket {
            id: id.into(),
            root_cause_id: root_cause_id.into(),
            title: None,
            phenomenon_ids: phenomena.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Add pre-built entities.
    pub fn push_phenomenon(&mut self, phenomenon: Phenomenon) {
        self.phenomena.push(phenomenon);
    }

    /// Add a pre-built root cause.
    pub fn push_root_cause(&mut self, root_cause: RootCause) {
        self.root_causes.push(root_cause);
    }

    /// Add a pre-built ticket.
    pub fn push_ticket(&mut self, ticket: Ticket) {
        self.tickets.push(ticket);
    }

    /// Validate references and derive edges.
    ///
    /// Tickets pointing at unknown root causes, and ticket phenomena that are
    /// not in the store, are logged and skipped. A root cause with no stored
    /// ticket count gets the number of its tickets.
    pub fn build(self) -> KnowledgeGraph {
        let mut graph = KnowledgeGraph::default();

        for p in self.phenomena {
            graph.phenomena.insert(p.id.clone(), p);
        }
        for rc in self.root_causes {
            graph.root_causes.insert(rc.id.clone(), rc);
        }

        for mut ticket in self.tickets {
            if graph.tickets.contains_key(&ticket.id) {
                warn!(ticket_id = %ticket.id, "Duplicate ticket id, keeping the first");
                continue;
            }
            if !graph.root_causes.contains_key(&ticket.root_cause_id) {
                warn!(
                    ticket_id = %ticket.id,
                    root_cause_id = %ticket.root_cause_id,
                    "Graph inconsistency: ticket references unknown root cause, skipping"
                );
                continue;
            }

            let known = &graph.phenomena;
            ticket.phenomenon_ids.retain(|pid| {
                let exists = known.contains_key(pid);
                if !exists {
                    warn!(
                        ticket_id = %ticket.id,
                        phenomenon_id = %pid,
                        "Graph inconsistency: ticket references unknown phenomenon, skipping edge"
                    );
                }
                exists
            });

            for pid in &ticket.phenomenon_ids {
                *graph
                    .by_phenomenon
                    .entry(pid.clone())
                    .or_default()
                    .entry(ticket.root_cause_id.clone())
                    .or_insert(0) += 1;
                *graph
                    .by_root_cause
                    .entry(ticket.root_cause_id.clone())
                    .or_default()
                    .entry(pid.clone())
                    .or_insert(0) += 1;
            }

            graph
                .tickets_by_root_cause
                .entry(ticket.root_cause_id.clone())
                .or_default()
                .push(ticket.id.clone());
            graph.tickets.insert(ticket.id.clone(), ticket);
        }

        for ids in graph.tickets_by_root_cause.values_mut() {
            ids.sort();
        }

        for rc in graph.root_causes.values_mut() {
            if rc.ticket_count == 0 {
                rc.ticket_count = graph
                    .tickets_by_root_cause
                    .get(&rc.id)
                    .map(|ids| ids.len() as u32)
                    .unwrap_or(0);
            }
        }

        graph
    }
}

/// Shared handle to the current graph snapshot.
///
/// Readers take an `Arc` for the duration of a turn. Refreshing publishes a
/// complete new snapshot; sessions already holding the old one finish with it.
#[derive(Clone)]
pub struct GraphHandle {
    current: Arc<RwLock<Arc<dyn GraphStore>>>,
}

impl GraphHandle {
    /// Wrap an initial snapshot.
    pub fn new(graph: impl GraphStore + 'static) -> Self {
        let graph: Arc<dyn GraphStore> = Arc::new(graph);
        Self {
            current: Arc::new(RwLock::new(graph)),
        }
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<dyn GraphStore> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Replace the whole store.
    pub fn swap(&self, graph: impl GraphStore + 'static) {
        let graph: Arc<dyn GraphStore> = Arc::new(graph);
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = graph;
    }
}

impl std::fmt::Debug for GraphHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphHandle")
            .field("stats", &self.snapshot().stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_graph() -> KnowledgeGraph {
        KnowledgeGraph::builder()
            .phenomenon("P1", "wait_io ratio abnormally high", "check iostat")
            .phenomenon("P2", "slow query log growing", "tail slow log")
            .phenomenon("P3", "replication lag rising", "show replica status")
            .root_cause("RC1", "disk saturation", "move data files to faster storage")
            .root_cause("RC2", "missing index", "add index")
            .ticket("T1", "RC1", ["P1", "P2"])
            .ticket("T2", "RC1", ["P1", "P2", "P3"])
            .ticket("T3", "RC1", ["P1"])
            .ticket("T4", "RC2", ["P2"])
            .build()
    }

    #[test]
    fn test_edges_count_ticket_cooccurrence() {
        let graph = sample_graph();
        assert_eq!(graph.edge_weight("P1", "RC1"), 3);
        assert_eq!(graph.edge_weight("P2", "RC1"), 2);
        assert_eq!(graph.edge_weight("P3", "RC1"), 1);
        assert_eq!(graph.edge_weight("P3", "RC2"), 0);
        assert_eq!(graph.max_edge_weight("RC1"), 3);
    }

    #[test]
    fn test_normalized_weight() {
        let graph = sample_graph();
        assert!((graph.normalized_weight("P1", "RC1") - 1.0).abs() < 1e-9);
        assert!((graph.normalized_weight("P3", "RC1") - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(graph.normalized_weight("P1", "RC-unknown"), 0.0);
    }

    #[test]
    fn test_lookups() {
        let graph = sample_graph();
        assert_eq!(graph.phenomena_of("RC1"), vec!["P1", "P2", "P3"]);
        let rcs = graph.root_causes_of("P2");
        assert_eq!(rcs.get("RC1"), Some(&2));
        assert_eq!(rcs.get("RC2"), Some(&1));
        assert_eq!(graph.tickets_of("RC1").len(), 3);
        assert_eq!(graph.root_cause("RC1").map(|rc| rc.ticket_count), Some(3));
    }

    #[test]
    fn test_best_ticket_prefers_overlap_then_smaller_ticket() {
        let graph = sample_graph();
        let confirmed: BTreeSet<String> = ["P1", "P2"].iter().map(|s| s.to_string()).collect();
        // T1 and T2 both overlap twice; T1 is smaller.
        assert_eq!(
            graph.best_ticket_for(&confirmed, "RC1"),
            Some(("T1".to_string(), 2))
        );

        let confirmed: BTreeSet<String> = ["P3"].iter().map(|s| s.to_string()).collect();
        assert_eq!(
            graph.best_ticket_for(&confirmed, "RC1"),
            Some(("T2".to_string(), 3))
        );
    }

    #[test]
    fn test_best_ticket_none_without_overlap() {
        let graph = sample_graph();
        assert_eq!(graph.best_ticket_for(&BTreeSet::new(), "RC1"), None);
    }

    #[test]
    fn test_build_skips_inconsistent_references() {
        let graph = KnowledgeGraph::builder()
            .phenomenon("P1", "a", "b")
            .root_cause("RC1", "c", "d")
            .ticket("T1", "RC-missing", ["P1"])
            .ticket("T2", "RC1", ["P1", "P-missing"])
            .build();

        assert!(graph.ticket("T1").is_none());
        assert_eq!(graph.edge_weight("P1", "RC1"), 1);
        assert!(graph.root_causes_of("P-missing").is_empty());
        assert_eq!(
            graph.stats(),
            GraphStats {
                phenomena: 1,
                root_causes: 1,
                tickets: 1,
                edges: 1
            }
        );
    }

    #[test]
    fn test_graph_handle_swap_replaces_snapshot() {
        let handle = GraphHandle::new(KnowledgeGraph::empty());
        let before = handle.snapshot();
        assert_eq!(before.stats().phenomena, 0);

        handle.swap(sample_graph());

        assert_eq!(handle.snapshot().stats().phenomena, 3);
        // Readers holding the old snapshot are unaffected.
        assert_eq!(before.stats().phenomena, 0);
    }
}
