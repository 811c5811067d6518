//! Query processing worker binary.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fingraph_agent::AgentRunner;
use fingraph_arango::ArangoClient;
use fingraph_chats::ChatStore;
use fingraph_queue::{EventBus, JobStore};
use fingraph_worker::{QueueConsumer, WorkerConfig};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS-enabled Redis)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive("fingraph=info".parse().unwrap()))
        .init();

    info!("Starting fingraph-worker");

    // Load configuration
    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    // Create store and bus clients
    let jobs = match JobStore::from_env() {
        Ok(jobs) => jobs,
        Err(e) => {
            error!("Failed to create job store: {}", e);
            std::process::exit(1);
        }
    };
    let bus = match EventBus::from_env() {
        Ok(bus) => bus,
        Err(e) => {
            error!("Failed to create event bus: {}", e);
            std::process::exit(1);
        }
    };
    let graph = match ArangoClient::from_env() {
        Ok(graph) => graph,
        Err(e) => {
            error!("Failed to create graph client: {}", e);
            std::process::exit(1);
        }
    };

    let chats = ChatStore::new(graph, config.chats_dir.clone());
    let runner = AgentRunner::from_env(bus.clone());

    let consumer = Arc::new(QueueConsumer::new(config, jobs, bus, chats, runner));

    // Graceful shutdown on SIGINT/SIGTERM; the current job drains first.
    {
        let consumer = Arc::clone(&consumer);
        tokio::spawn(async move {
            shutdown_signal().await;
            info!("Received shutdown signal");
            consumer.shutdown();
        });
    }

    if let Err(e) = consumer.run().await {
        error!("Consumer error: {}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    ctrl_c.await.expect("Failed to install CTRL+C handler");
}
