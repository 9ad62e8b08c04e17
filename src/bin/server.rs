//! The process entry point: wires `tracing`, builds an [`AppState`], and
//! serves the routes from [`dealsengine::http::router`] behind a
//! `tower-http` connection timeout. Signal handling implements the
//! graceful-drain contract of §7: `SIGINT`/`SIGTERM` flips
//! `AppState::draining` and triggers `axum::serve`'s graceful shutdown,
//! which lets in-flight requests finish before the process exits; a
//! second signal exits immediately via `std::process::exit`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dealsengine::{http, AppState, SystemClock};
use tower_http::timeout::TimeoutLayer;

const CONNECTION_LIFETIME: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let state = Arc::new(AppState::new(Arc::new(SystemClock)));
    let app = http::router(state.clone()).layer(TimeoutLayer::new(CONNECTION_LIFETIME));

    let addr: SocketAddr = std::env::var("DEALSENGINE_LISTEN")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 8080)));

    tracing::info!(%addr, "deals-server starting");
    let listener = tokio::net::TcpListener::bind(addr).await.expect("bind listen address");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let shutdown_state = state.clone();
    tokio::spawn(async move {
        wait_for_drain_signal().await;
        tracing::warn!("received shutdown signal, draining");
        shutdown_state.begin_drain();

        // A second signal during drain exits immediately rather than
        // waiting for in-flight requests to finish (§7).
        tokio::spawn(async {
            wait_for_drain_signal().await;
            tracing::warn!("received second shutdown signal, exiting immediately");
            std::process::exit(1);
        });

        let _ = shutdown_tx.send(());
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .await
        .expect("server error");
}

/// Resolves once SIGINT/SIGTERM fires. Called once to begin drain, and
/// again afterward so a second signal can be distinguished and force an
/// immediate exit (§7).
async fn wait_for_drain_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
