//! Diagnostic engine: the deterministic, side-effect free core.
//!
//! - [`compute_hypotheses`]: weighted evidence propagation from the symptom
//!   ledger over the knowledge graph, with ticket-aware normalization and
//!   competitive suppression
//! - [`recommend`]: picks the next phenomena worth asking about
//! - [`classify`] / [`assemble_diagnosis`]: session state thresholds and the
//!   final diagnosis
//!
//! Every function here takes its inputs by reference and returns fresh
//! values; callers own all mutable state.

mod confidence;
mod recommend;
mod state;

pub use confidence::*;
pub use recommend::*;
pub use state::*;
