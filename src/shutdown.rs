//! Graceful Shutdown Module
//!
//! Stops accepting connections on SIGINT/SIGTERM and gives in-flight
//! requests a bounded grace period.

use std::future::{Future, IntoFuture};
use std::io;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

/// Waits for SIGTERM or SIGINT.
///
/// If a handler cannot be installed the corresponding branch never
/// completes, so the other signal still works.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown");
        }
    }
}

/// Serves `app` until `signal` resolves, then drains connections for at
/// most `grace_period`.
pub async fn serve_with_graceful_shutdown<F>(
    listener: TcpListener,
    app: Router,
    signal: F,
    grace_period: Duration,
) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (signalled_tx, signalled_rx) = oneshot::channel::<()>();

    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        signal.await;
        let _ = signalled_tx.send(());
    });
    let server = server.into_future();
    tokio::pin!(server);

    tokio::select! {
        biased;
        result = &mut server => return result,
        _ = signalled_rx => {}
    }

    match tokio::time::timeout(grace_period, server).await {
        Ok(result) => {
            info!("All connections drained");
            result
        }
        Err(_) => {
            warn!(
                grace_period_secs = grace_period.as_secs(),
                "Shutdown timeout reached, dropping remaining connections"
            );
            Ok(())
        }
    }
}
