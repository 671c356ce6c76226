use anyhow::{Context, Result};
use core_runtime::config::AppConfig;
use core_runtime::logging::init_logging;
use core_service::SyncServiceBuilder;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env().context("invalid configuration")?;
    init_logging(config.logging.clone()).context("failed to initialise logging")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        bind = %config.http_bind,
        interval_secs = config.sync_interval.as_secs(),
        delete_source = config.delete_source_after_transfer,
        "Recording sync starting"
    );

    let service = SyncServiceBuilder::new(config)
        .build()
        .await
        .context("failed to build sync service")?;

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    service.serve(shutdown).await?;
    info!("Recording sync stopped");
    Ok(())
}

async fn wait_for_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
    shutdown.cancel();
}
