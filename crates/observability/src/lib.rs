//! # vcsync-observability
//!
//! Observability-Crate fuer vcsync:
//! - Prometheus-kompatible Metriken (`/metrics`)
//! - Health-Check-Endpunkt (`/health`)
//! - Structured JSON Logging via tracing-subscriber
//! - Request-Timing Middleware

pub mod health;
pub mod logging;
pub mod metrics;
pub mod middleware;

pub use health::{health_router, HealthResponse, HealthState, HealthStatus};
pub use logging::{log_format_gueltig, log_level_gueltig, logging_initialisieren};
pub use metrics::{metrics_router, RelaisMetriken};
pub use middleware::timing_middleware;

use anyhow::Result;
use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Baut den kombinierten Router (Metriken + Health + Timing)
pub fn observability_router(metriken: RelaisMetriken) -> Router {
    Router::new()
        .merge(metrics_router(metriken.clone()))
        .merge(health_router(HealthState::neu(metriken.clone())))
        .layer(axum::middleware::from_fn_with_state(
            metriken,
            timing_middleware,
        ))
}

/// Startet den Observability-HTTP-Server (Metriken + Health)
///
/// Endpunkte:
/// - `GET /metrics` – Prometheus scrape format
/// - `GET /health`  – Health-Check JSON
///
/// Laeuft bis `abbruch` ausgeloest wird.
pub async fn observability_server_starten(
    bind_addr: SocketAddr,
    metriken: RelaisMetriken,
    abbruch: CancellationToken,
) -> Result<()> {
    let listener = TcpListener::bind(bind_addr).await?;
    observability_server_mit_listener(listener, metriken, abbruch).await
}

/// Wie [`observability_server_starten`], aber mit bereits gebundenem Listener
pub async fn observability_server_mit_listener(
    listener: TcpListener,
    metriken: RelaisMetriken,
    abbruch: CancellationToken,
) -> Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(addr = %addr, "Observability-Server gestartet");

    axum::serve(listener, observability_router(metriken))
        .with_graceful_shutdown(abbruch.cancelled_owned())
        .await?;

    tracing::info!(addr = %addr, "Observability-Server beendet");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn http_get(addr: SocketAddr, pfad: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let anfrage = format!("GET {pfad} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(anfrage.as_bytes()).await.unwrap();
        let mut antwort = String::new();
        stream.read_to_string(&mut antwort).await.unwrap();
        antwort
    }

    #[tokio::test]
    async fn server_liefert_metrics_und_health() {
        let metriken = RelaisMetriken::neu().unwrap();
        metriken.sitzungen_gestartet.inc();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let abbruch = CancellationToken::new();
        let task = tokio::spawn(observability_server_mit_listener(
            listener,
            metriken.clone(),
            abbruch.clone(),
        ));

        let metrics = http_get(addr, "/metrics").await;
        assert!(metrics.starts_with("HTTP/1.1 200"));
        assert!(metrics.contains("vcsync_sitzungen_gestartet_total 1"));

        let health = http_get(addr, "/health").await;
        assert!(health.starts_with("HTTP/1.1 200"));
        assert!(health.contains("\"status\":\"healthy\""));

        // Timing-Middleware hat beide Anfragen erfasst
        let count = metriken
            .http_request_duration_seconds
            .with_label_values(&["GET", "/health"])
            .get_sample_count();
        assert_eq!(count, 1);

        abbruch.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn unbekannter_pfad_liefert_404() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let abbruch = CancellationToken::new();
        let task = tokio::spawn(observability_server_mit_listener(
            listener,
            RelaisMetriken::neu().unwrap(),
            abbruch.clone(),
        ));

        let antwort = http_get(addr, "/gibtsnicht").await;
        assert!(antwort.starts_with("HTTP/1.1 404"));

        abbruch.cancel();
        task.await.unwrap().unwrap();
    }
}
