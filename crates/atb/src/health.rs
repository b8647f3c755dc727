use std::net::SocketAddr;

use anyhow::Context;
use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub fn router() -> Router {
    Router::new()
        .route("/", get(ok))
        .route("/healthz", get(ok))
}

async fn ok() -> &'static str {
    "ok"
}

/// Bind the liveness listener. Binding happens up front so a taken port fails startup.
pub async fn bind(port: u16) -> anyhow::Result<TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind health endpoint on {addr}"))
}

/// Serve until `shutdown` is cancelled.
pub async fn serve(listener: TcpListener, shutdown: CancellationToken) -> anyhow::Result<()> {
    let local_addr = listener
        .local_addr()
        .context("failed to resolve health endpoint address")?;
    info!(%local_addr, "health endpoint listening");

    axum::serve(listener, router())
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("health endpoint exited unexpectedly")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn answers_ok_and_stops_on_cancel() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(serve(listener, shutdown.clone()));

        for path in ["/", "/healthz"] {
            let resp = reqwest::get(format!("http://{addr}{path}"))
                .await
                .expect("request");
            assert_eq!(resp.status(), reqwest::StatusCode::OK);
            assert_eq!(resp.text().await.expect("body"), "ok");
        }

        shutdown.cancel();
        let joined = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("server should stop")
            .expect("join");
        assert!(joined.is_ok());
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let shutdown = CancellationToken::new();
        tokio::spawn(serve(listener, shutdown.clone()));

        let resp = reqwest::get(format!("http://{addr}/nope"))
            .await
            .expect("request");
        assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
        shutdown.cancel();
    }
}
