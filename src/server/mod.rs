//! Server module for MCP protocol handling.
//!
//! This module provides:
//! - MCP server implementation over stdio
//! - Typed tool call parsing and routing
//! - Shared application state management

mod handlers;
mod mcp;

pub use handlers::*;
pub use mcp::*;

use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::graph::{GraphStats, GraphStore, SqliteGraphSource};
use crate::session::DiagnosisService;

/// Application state shared across handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Diagnostic session service.
    pub service: DiagnosisService,
    /// Database the graph snapshot was loaded from, if any.
    ///
    /// Without it the graph cannot be reloaded at runtime.
    pub graph_source: Option<SqliteGraphSource>,
}

impl AppState {
    /// Create new application state
    pub fn new(config: Config, service: DiagnosisService) -> Self {
        Self {
            config,
            service,
            graph_source: None,
        }
    }

    /// Attach the database the graph is reloaded from
    pub fn with_graph_source(mut self, source: SqliteGraphSource) -> Self {
        self.graph_source = Some(source);
        self
    }

    /// Counts for the current graph snapshot
    pub fn graph_stats(&self) -> GraphStats {
        self.service.graph().snapshot().stats()
    }

    /// Rebuild the graph from its database and swap it in.
    ///
    /// Turns already in flight finish against the snapshot they started with.
    pub async fn reload_graph(&self) -> AppResult<GraphStats> {
        let source = self.graph_source.as_ref().ok_or_else(|| AppError::Config {
            message: "No graph database configured; cannot reload".to_string(),
        })?;

        let graph = source.load().await?;
        let stats = graph.stats();
        self.service.graph().swap(graph);

        info!(
            phenomena = stats.phenomena,
            root_causes = stats.root_causes,
            tickets = stats.tickets,
            edges = stats.edges,
            "Knowledge graph reloaded"
        );
        Ok(stats)
    }
}

/// Shared application state handle
pub type SharedState = Arc<AppState>;
