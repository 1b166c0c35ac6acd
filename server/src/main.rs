use std::process::ExitCode;
use std::sync::Arc;

use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

use schemalyze::config::apply_stage_overrides;
use schemalyze::pipeline::BroadcastProgress;
use schemalyze::scheduler::{spawn_retention_sweeper, HttpCallbackNotifier};
use schemalyze::{
    default_stage_set, load_service_config, logging, JobEventBroadcaster, JobStore,
    MemoryJobStore, Scheduler,
};
use schemalyze_server::{router, AllowedOrigins, AppState, ServerError};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("schemalyze-server: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), ServerError> {
    let config = load_service_config()?;
    logging::init(config.log_format)?;

    info!("Starting schemalyze-server v{}", env!("CARGO_PKG_VERSION"));

    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());

    let mut stages = default_stage_set();
    apply_stage_overrides(&config, &mut stages)?;

    let events = JobEventBroadcaster::new(config.event_capacity);
    let notifier = HttpCallbackNotifier::new(config.callback_timeout())?;
    let scheduler = Arc::new(
        Scheduler::new(Arc::clone(&store), stages, config.scheduler_options())
            .with_progress(Arc::new(BroadcastProgress::new(events.clone())))
            .with_notifier(Arc::new(notifier)),
    );

    let shutdown = CancellationToken::new();
    let sweeper = spawn_retention_sweeper(
        Arc::clone(&store),
        config.retention(),
        config.sweep_interval(),
        shutdown.clone(),
    );

    let state = AppState::new(Arc::clone(&scheduler), events).with_shutdown(shutdown.clone());
    let app = router(state, AllowedOrigins::new(config.allowed_origins.clone()));

    let listener = tokio::net::TcpListener::bind(&config.listen_address)
        .await
        .map_err(|source| ServerError::Bind {
            address: config.listen_address.clone(),
            source,
        })?;
    info!("Listening on http://{}", config.listen_address);

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown signal received");
        signal_token.cancel();
    });

    let graceful = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { graceful.cancelled().await })
        .await
        .map_err(ServerError::Serve)?;

    shutdown.cancel();
    let stopped = scheduler.shutdown().await;
    if stopped > 0 {
        info!("Cancelled {} unfinished jobs", stopped);
    }
    if let Err(e) = sweeper.await {
        warn!("Retention sweeper ended abnormally: {}", e);
    }

    info!("Shutdown complete");
    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
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
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
