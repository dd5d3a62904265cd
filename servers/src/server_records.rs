use anyhow::Result;
use lib_common::api::{ApiState, router};
use lib_common::records::{MemRecordStore, Records};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod records_logic;
use records_logic::{config, logger};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = config::load_config()?;
    let _log_guard = logger::setup_logging(&settings.log_dir, &settings.log_level)?;
    info!(
        port = settings.port,
        pipeline = ?settings.pipeline,
        encoder = ?settings.encoder,
        "configuration loaded"
    );

    // Every request token is a child of this one.
    let shutdown = CancellationToken::new();

    let store = MemRecordStore::new(settings.pipeline);
    let records = Records::with_relay_capacity(store, settings.pipeline.relay_capacity);
    let state = ApiState::new(records, shutdown.clone()).with_encoder(settings.encoder);
    let app = router(state, settings.credentials.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    let listener = TcpListener::bind(addr).await?;
    info!("records server listening on http://{}", addr);

    let server_token = shutdown.clone();
    let mut server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(server_token.cancelled_owned())
            .await
    });

    // Wait for shutdown signal
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Ctrl-C received, initiating shutdown.");
        }
        _ = terminate() => {
            info!("SIGTERM received, initiating shutdown.");
        }
        res = &mut server_handle => {
            // The server stopped on its own; nothing left to drain.
            res??;
            warn!("server exited before a shutdown signal");
            return Ok(());
        }
    }

    // Cancels in-flight searches and stops accepting connections.
    shutdown.cancel();

    match tokio::time::timeout(settings.shutdown_grace, &mut server_handle).await {
        Ok(res) => res??,
        Err(_) => {
            error!(
                "in-flight requests did not finish within {:?}; aborting",
                settings.shutdown_grace
            );
            server_handle.abort();
        }
    }

    info!("Shutdown complete.");
    Ok(())
}

async fn terminate() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term_signal) => {
                term_signal.recv().await;
            }
            Err(e) => {
                warn!("cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        // On non-unix platforms, just wait forever.
        std::future::pending::<()>().await;
    }
}
