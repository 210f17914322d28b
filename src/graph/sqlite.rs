use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;
use tracing::{debug, info};

use super::{KnowledgeGraph, Phenomenon, RootCause, Ticket};
use crate::config::GraphConfig;
use crate::error::{GraphError, GraphResult};

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed source for knowledge graph snapshots
#[derive(Debug, Clone)]
pub struct SqliteGraphSource {
    pool: SqlitePool,
}

impl SqliteGraphSource {
    /// Open (or create) the graph database
    pub async fn new(config: &GraphConfig) -> GraphResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| GraphError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| GraphError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| GraphError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let source = Self { pool };
        source.run_migrations().await?;

        Ok(source)
    }

    /// In-memory database, for tests
    pub async fn new_in_memory() -> GraphResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| {
            GraphError::Connection {
                message: format!("Invalid database URL: {}", e),
            }
        })?;

        // A single connection keeps every query on the same in-memory database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| GraphError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let source = Self { pool };
        source.run_migrations().await?;

        Ok(source)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> GraphResult<()> {
        info!("Running knowledge graph migrations...");

        MIGRATOR.run(&self.pool).await.map_err(|e| GraphError::Migration {
            message: format!("Failed to run migrations: {}", e),
        })?;

        info!("Knowledge graph migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool (the import pipeline writes through it)
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Read every table and build an immutable snapshot.
    ///
    /// Rows that reference missing entities are dropped by the builder with
    /// a warning rather than failing the load.
    pub async fn load(&self) -> GraphResult<KnowledgeGraph> {
        let phenomena: Vec<PhenomenonRow> = sqlx::query_as(
            r#"
            SELECT id, description, observation_method
            FROM phenomena
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let root_causes: Vec<RootCauseRow> = sqlx::query_as(
            r#"
            SELECT id, description, solution, ticket_count
            FROM root_causes
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let tickets: Vec<TicketRow> = sqlx::query_as(
            r#"
            SELECT id, root_cause_id, title
            FROM tickets
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let links: Vec<TicketPhenomenonRow> = sqlx::query_as(
            r#"
            SELECT ticket_id, phenomenon_id
            FROM ticket_phenomena
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        debug!(
            phenomena = phenomena.len(),
            root_causes = root_causes.len(),
            tickets = tickets.len(),
            links = links.len(),
            "Loaded knowledge graph rows"
        );

        let mut by_ticket: HashMap<String, BTreeSet<String>> = HashMap::new();
        for link in links {
            by_ticket
                .entry(link.ticket_id)
                .or_default()
                .insert(link.phenomenon_id);
        }

        let mut builder = KnowledgeGraph::builder();
        for row in phenomena {
            builder.push_phenomenon(row.into());
        }
        for row in root_causes {
            builder.push_root_cause(row.into());
        }
        for row in tickets {
            let phenomenon_ids = by_ticket.remove(&row.id).unwrap_or_default();
            builder.push_ticket(Ticket {
                id: row.id,
                root_cause_id: row.root_cause_id,
                title: row.title,
                phenomenon_ids,
            });
        }

        let graph = builder.build();
        let stats = super::GraphStore::stats(&graph);
        info!(
            phenomena = stats.phenomena,
            root_causes = stats.root_causes,
            tickets = stats.tickets,
            edges = stats.edges,
            "Knowledge graph snapshot built"
        );

        Ok(graph)
    }
}

// Internal row types for SQLx mapping
#[derive(sqlx::FromRow)]
struct PhenomenonRow {
    id: String,
    description: String,
    observation_method: String,
}

impl From<PhenomenonRow> for Phenomenon {
    fn from(row: PhenomenonRow) -> Self {
        Self {
            id: row.id,
            description: row.description,
            observation_method: row.observation_method,
        }
    }
}

#[derive(sqlx::FromRow)]
struct RootCauseRow {
    id: String,
    description: String,
    solution: String,
    ticket_count: i64,
}

impl From<RootCauseRow> for RootCause {
    fn from(row: RootCauseRow) -> Self {
        Self {
            id: row.id,
            description: row.description,
            solution: row.solution,
            ticket_count: u32::try_from(row.ticket_count.max(0)).unwrap_or(u32::MAX),
        }
    }
}

#[derive(sqlx::FromRow)]
struct TicketRow {
    id: String,
    root_cause_id: String,
    title: Option<String>,
}

#[derive(sqlx::FromRow)]
struct TicketPhenomenonRow {
    ticket_id: String,
    phenomenon_id: String,
}
