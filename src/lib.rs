//! # MCP Root-Cause Diagnosis Server
//!
//! A Model Context Protocol (MCP) server that guides an operator from a
//! vague database incident report to a root cause, using a knowledge graph
//! of phenomena, root causes and historical tickets.
//!
//! ## Features
//!
//! - **Confidence propagation**: weighted evidence from confirmed phenomena,
//!   root-cause matches and ticket matches, normalized against the closest
//!   historical ticket
//! - **Recommendations**: the next phenomena worth checking, ranked by how
//!   many leading hypotheses they discriminate
//! - **Session state machine**: exploring, narrowing, confirming, diagnosed
//! - **Free-text turns**: operator messages resolved by a semantic matcher
//!
//! ## Architecture
//!
//! ```text
//! MCP Client → MCP Server (Rust) → DiagnosisService → engine (pure)
//!                    ↓                     ↓
//!          SQLite (knowledge graph)   Matcher (HTTP)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use mcp_rootcause_diagnosis::graph::{GraphHandle, KnowledgeGraph};
//! use mcp_rootcause_diagnosis::session::{DiagnosisService, TurnInput};
//! use mcp_rootcause_diagnosis::config::DiagnosisConfig;
//!
//! let graph = KnowledgeGraph::builder()
//!     .phenomenon("P1", "wait_io high", "iostat -x 1")
//!     .root_cause("RC1", "disk saturation", "move to faster storage")
//!     .ticket("T1", "RC1", ["P1"])
//!     .build();
//! let service = DiagnosisService::new(GraphHandle::new(graph), DiagnosisConfig::default());
//! let id = service.create_session("database is slow").await?;
//! let outcome = service.turn(&id, TurnInput::new().confirm("P1")).await?;
//! ```

#![warn(missing_docs)]

/// Configuration management for the MCP server.
pub mod config;
/// Diagnostic engine: propagation, planning and state classification.
pub mod engine;
/// Error types and result aliases for the application.
pub mod error;
/// Knowledge graph model, store and SQLite source.
pub mod graph;
/// Semantic matcher abstraction and HTTP client.
pub mod matcher;
/// MCP server implementation and request handling.
pub mod server;
/// Diagnostic sessions and the session service.
pub mod session;
/// Per-session symptom ledger.
pub mod symptom;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use server::{AppState, McpServer, SharedState};
pub use session::DiagnosisService;
