use std::sync::Arc;

use anyhow::Result;
use tokio::signal;
use tracing::{error, info};

use dinein_api::{
    app_router,
    config::{init_tracing, load_config},
    db::{establish_connection, run_migrations},
    events, AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config()?;
    init_tracing(&config.log_level, config.log_json);
    info!(environment = %config.environment, "Starting dine-in order service");

    let db = Arc::new(establish_connection(&config).await?);
    if config.auto_migrate {
        run_migrations(db.as_ref()).await?;
    }

    let (event_sender, event_receiver) = events::channel(1024);
    tokio::spawn(async move {
        events::process_events(event_receiver).await;
    });

    let config = Arc::new(config);
    let state = AppState::new(db, config.clone(), event_sender);
    let app = app_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
