use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use fleetbook::api::{self, AppState};
use fleetbook::clock::SystemClock;
use fleetbook::config::Config;
use fleetbook::engine::Engine;
use fleetbook::notify::NotifyHub;
use fleetbook::sweeper;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    fleetbook::observability::init(config.metrics_port)?;

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let notify = Arc::new(NotifyHub::new());
    let engine = Arc::new(Engine::with_options(
        config.wal_path(),
        notify.clone(),
        Arc::new(SystemClock),
        config.approval_policy,
    )?);

    if let Some(admin) = &config.bootstrap_admin {
        if engine.bootstrap_admin(&admin.name, &admin.email).await?.is_none() {
            info!("active admin present, skipping bootstrap of {}", admin.email);
        }
    }

    tokio::spawn(sweeper::run_sweeper(engine.clone(), config.sweep_interval));
    tokio::spawn(sweeper::run_compactor(engine.clone(), config.compact_threshold));

    // Delivery is out of scope; notices are logged for whatever tails them.
    let mut notices = notify.subscribe();
    tokio::spawn(async move {
        loop {
            match notices.recv().await {
                Ok(n) => info!(
                    "notice to {} <{}>: booking {} on {} is {}",
                    n.recipient_name, n.recipient_email, n.booking_id, n.resource_name, n.status
                ),
                Err(RecvError::Lagged(skipped)) => warn!("notice logger lagged, {skipped} notices dropped"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let app = api::create_router(AppState::new(engine));

    let addr = format!("{}:{}", config.bind, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("fleetbook listening on {addr}");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  approval policy: {:?}", config.approval_policy);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    // Graceful shutdown: stop accepting on SIGTERM/ctrl-c, drain in-flight requests
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => {}
                        _ = sigterm.recv() => {}
                    }
                }
                Err(e) => {
                    warn!("failed to register SIGTERM handler: {e}");
                    ctrl_c.await.ok();
                }
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
        info!("shutdown signal received, draining requests");
    };

    axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;

    info!("fleetbook stopped");
    Ok(())
}
