//! Courier dispatch server binary entrypoint.
//!
//! Reads provider batches as newline-delimited JSON from stdin, one array of
//! `{"token": ..., "payload": ...}` objects per line, and hands them to the
//! supervisor. EOF or Ctrl+C drains the pipeline and exits.

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use courier_common::config::AppConfig;
use courier_common::types::Batch;
use courier_dispatch::gateway::HttpConnector;
use courier_dispatch::{Handlers, Supervisor};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("courier_server=info,courier_dispatch=info")
        }))
        .json()
        .init();

    tracing::info!("Courier dispatch server starting...");

    // Load configuration
    let config = AppConfig::from_env()?;

    let connector = HttpConnector::new(config.gateway_url.clone(), config.gateway_timeout());
    let handlers = Handlers::logging(config.error_hook.clone());

    let mut supervisor = Supervisor::start(&config, &connector, handlers).await?;
    tracing::info!(gateway_url = %config.gateway_url, "Supervisor started");

    tokio::select! {
        result = ingest(&supervisor) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Ingestion stopped with error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal, stopping gracefully...");
        }
    }

    let outcome = supervisor.shutdown().await;
    let stats = serde_json::to_string(&supervisor.stats())?;
    tracing::info!(outcome = ?outcome, stats = %stats, "Courier dispatch server stopped.");
    Ok(())
}

/// Feed stdin batches into the supervisor until EOF.
async fn ingest(supervisor: &Supervisor) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }

        let batch: Batch = match serde_json::from_str(&line) {
            Ok(batch) => batch,
            Err(e) => {
                tracing::warn!(line = line_no, error = %e, "Skipping malformed batch");
                continue;
            }
        };

        let request_size = batch.len();
        if let Err(e) = supervisor.enqueue_client_request(batch) {
            tracing::warn!(line = line_no, request_size, error = %e, "Batch rejected");
        }
    }

    tracing::info!(lines = line_no, "Reached end of input");
    Ok(())
}
