use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mcp_rootcause_diagnosis::{
    config::{Config, LogFormat},
    graph::{GraphHandle, GraphStore, SqliteGraphSource},
    matcher::HttpMatcher,
    server::{AppState, McpServer},
    session::DiagnosisService,
};

#[derive(Debug, Parser)]
#[command(name = "mcp-rootcause-diagnosis", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the MCP server over stdio (default)
    Serve,
    /// Print knowledge graph statistics as JSON and exit
    GraphStats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&config);

    // Open the knowledge graph database
    let source = match SqliteGraphSource::new(&config.graph).await {
        Ok(s) => {
            info!(path = %config.graph.path.display(), "Graph database initialized");
            s
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize graph database");
            return Err(e.into());
        }
    };
    let graph = source.load().await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::GraphStats => {
            println!("{}", serde_json::to_string_pretty(&graph.stats())?);
            Ok(())
        }
        Command::Serve => serve(config, source, graph).await,
    }
}

async fn serve(
    config: Config,
    source: SqliteGraphSource,
    graph: mcp_rootcause_diagnosis::graph::KnowledgeGraph,
) -> anyhow::Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        "MCP root-cause diagnosis server starting..."
    );

    let mut service = DiagnosisService::new(GraphHandle::new(graph), config.diagnosis.clone());

    // Free-text turns need a matcher; structured turns work without one
    match &config.matcher {
        Some(matcher_config) => match HttpMatcher::new(matcher_config, config.request.clone()) {
            Ok(matcher) => {
                info!(base_url = %matcher.base_url(), "Matcher client initialized");
                service = service.with_matcher(Arc::new(matcher));
            }
            Err(e) => {
                error!(error = %e, "Failed to initialize matcher client");
                return Err(e.into());
            }
        },
        None => info!("MATCHER_BASE_URL not set, diagnosis_chat disabled"),
    }

    // Create application state
    let state = Arc::new(AppState::new(config, service).with_graph_source(source));

    // Start MCP server
    let server = McpServer::new(state);

    info!("Server ready, waiting for requests on stdin...");

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
