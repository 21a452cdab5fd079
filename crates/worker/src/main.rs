//! `crawlgrid-worker` -- runs a set of crawl missions over a fixed pool of
//! executors.
//!
//! Reads mission definitions from `MISSIONS_FILE`, fetches through direct
//! HTTP or browser-grid sessions, appends extracted entities to a JSON-lines
//! file, and prints a JSON report per mission when every mission is done.
//! Ctrl-C / SIGTERM stops the engine, draining in-flight fetches first.
//!
//! See [`WorkerConfig::from_env`] for the environment variables.

use std::sync::Arc;

use crawlgrid_core::{Logger, TracingLogger};
use crawlgrid_engine::{EngineHandle, Orchestrator};
use crawlgrid_events::{EventBus, ProgressTally};
use crawlgrid_store::{JsonLinesStore, Store};
use crawlgrid_worker::{load_missions, WorkerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crawlgrid=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WorkerConfig::from_env()?;
    let specs = load_missions(&config.missions_file)?;
    let executors = config.build_executors()?;

    tracing::info!(
        missions = specs.len(),
        executors = executors.len(),
        fetch_timeout_secs = config.fetch_timeout.as_secs(),
        output = %config.output_path.display(),
        "Starting crawlgrid-worker",
    );

    let store: Arc<dyn Store> = Arc::new(JsonLinesStore::open(&config.output_path).await?);
    let logger: Arc<dyn Logger> = Arc::new(TracingLogger);

    // --- Event services ---
    let events = Arc::new(EventBus::default());
    let tally_handle = tokio::spawn(ProgressTally::run(events.subscribe()));

    // --- Missions ---
    let mut orchestrator = Orchestrator::new(
        executors,
        config.engine_config(),
        Arc::clone(&logger),
        Arc::clone(&events),
    );
    for spec in specs {
        orchestrator.register_mission(spec.into_plan(Arc::clone(&store)));
    }

    let signal_handle = tokio::spawn(stop_on_signal(orchestrator.handle()));
    let reports = orchestrator.start_all().await;
    signal_handle.abort();

    for report in &reports {
        tracing::info!(
            mission = %report.name,
            state = %report.state,
            visited = report.visited,
            fetched = report.fetched,
            failed = report.failed,
            entities = report.entities_saved,
            "Mission finished",
        );
    }
    println!("{}", serde_json::to_string_pretty(&reports)?);

    // Dropping the last bus reference closes the channel and ends the tally.
    drop(events);
    let progress = tally_handle.await?;
    tracing::info!(
        dispatched = progress.dispatched,
        succeeded = progress.succeeded,
        failed = progress.failed,
        lagged = progress.lagged,
        "Shutdown complete",
    );

    Ok(())
}

/// Drain on the first signal; abandon in-flight work if draining times out.
async fn stop_on_signal(handle: EngineHandle) {
    shutdown_signal().await;

    match handle.stop(true).await {
        Ok(()) => tracing::info!("In-flight fetches drained"),
        Err(e) => {
            tracing::warn!(error = %e, "Drain did not finish, abandoning in-flight fetches");
            if let Err(e) = handle.stop(false).await {
                tracing::error!(error = %e, "Forced stop failed");
            }
        }
    }
}

/// Wait for a shutdown signal (Ctrl-C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), stopping missions");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, stopping missions");
        }
    }
}
