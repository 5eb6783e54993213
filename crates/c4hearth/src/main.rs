use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use c4hearth::Config;
use c4hearth::Engine;
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// How long integrations get to finish their shutdown hooks
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Control4 blinds and shades bridge
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "c4hearth.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(config.logging.targets())
        .init();

    tracing::info!("c4hearth starting");
    tracing::info!("Loaded config from: {}", args.config.display());

    let engine = Arc::new(Engine::new());
    engine.register_integrations_from_config(&config);
    if engine.integration_count() == 0 {
        tracing::warn!("No integrations configured");
    }

    let engine_task = tokio::spawn({
        let engine = engine.clone();
        async move {
            if let Err(e) = engine.run().await {
                tracing::error!("Engine error: {}", e);
            }
        }
    });

    let api_shutdown = match &config.api {
        Some(api) => {
            let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
            let listen = api.listen.clone();
            let port = api.port;
            let engine = engine.clone();
            let handle = tokio::spawn(async move {
                if let Err(e) = c4hearth::api::serve(listen, port, engine, shutdown_rx).await {
                    tracing::error!("HTTP API server error: {}", e);
                }
            });
            Some((shutdown_tx, handle))
        }
        None => {
            tracing::info!("HTTP API disabled");
            None
        }
    };

    tracing::info!("Press Ctrl+C to exit");
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received shutdown signal"),
        Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
    }

    if let Some((shutdown_tx, handle)) = api_shutdown {
        let _ = shutdown_tx.send(());
        if let Err(e) = handle.await {
            tracing::warn!("HTTP API task failed: {}", e);
        }
    }

    tracing::info!("Shutting down integrations...");
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, engine.shutdown())
        .await
        .is_err()
    {
        tracing::warn!("Integrations did not shut down within {:?}", SHUTDOWN_TIMEOUT);
    }
    engine_task.abort();

    tracing::info!("c4hearth shutdown complete");
    Ok(())
}
