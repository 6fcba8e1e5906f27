use crate::args::ServeOptions;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::Path;
use stemforge::{build_router, AppState};
use stemforge_core::{janitor, AudioService, Config};
use tokio::signal;
use tracing::{info, warn};

pub async fn run(options: &ServeOptions, config_path: Option<&Path>) -> Result<()> {
    let mut config = Config::load(config_path)?;
    if let Some(port) = options.port {
        config.server.port = port;
    }
    if let Some(ref host) = options.host {
        config.server.host = host.clone();
    }
    if options.no_separation {
        config.separation.enabled = false;
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid listen address {}:{}",
                config.server.host, config.server.port
            )
        })?;

    info!("Initializing separation model...");
    let service = AudioService::start(config.clone())
        .await
        .context("Failed to prepare storage directories")?;
    if service.separator().is_ready() {
        info!("Separation model initialized successfully");
    }

    if config.retention.enabled {
        spawn_janitor(&config);
    }

    let app = build_router(AppState::new(service));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

fn spawn_janitor(config: &Config) {
    let roots = vec![
        config.storage.upload_dir.clone(),
        config.storage.processed_dir.clone(),
    ];
    let max_age = config.retention_max_age();
    let every = config.sweep_interval();

    info!(
        "Retention enabled: removing files older than {}h every {}m",
        config.retention.max_age_hours,
        every.as_secs() / 60
    );

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            janitor::sweep_async(roots.clone(), max_age).await;
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
