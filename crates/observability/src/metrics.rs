//! Prometheus-kompatible Metriken fuer vcsync
//!
//! Registrierte Metriken:
//! - `vcsync_sitzungen_gestartet_total` – Counter: Erfolgreich gestartete Relais-Sitzungen
//! - `vcsync_sitzungen_fehlgeschlagen_total` – Counter: Abgebrochene oder gescheiterte Starts
//! - `vcsync_sitzung_aktiv` – Gauge: 1 solange eine Sitzung laeuft
//! - `vcsync_transport_verbunden` – Gauge: 0 nach einer Trennung durch den Transport
//! - `vcsync_pipelines_aktiv` – Gauge: Aktuell dekodierende Sprecher
//! - `vcsync_pipelines_erstellt_total` – Counter: Insgesamt aufgebaute Sprecher-Pipelines
//! - `vcsync_mischpult_eingaenge` – Gauge: Angesteckte Mischpult-Eingaenge
//! - `vcsync_pakete_dekodiert_total` – Counter: Dekodierte Voice-Pakete
//! - `vcsync_pakete_verworfen_total` – Counter: Verworfene Voice-Pakete
//! - `vcsync_frames_gesendet_total` – Counter: Ausgelieferte Ausgangs-Frames
//! - `vcsync_abbau_fehler_total` – Counter: Fehler beim Abbau einer Sitzung
//! - `vcsync_http_request_duration_seconds` – Histogram: HTTP-Antwortzeit

use anyhow::Result;
use axum::{extract::State, response::IntoResponse, routing::get, Router};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Alle vcsync-Prometheus-Metriken
#[derive(Clone)]
pub struct RelaisMetriken {
    pub registry: Arc<Registry>,

    // Sitzungs-Metriken
    pub sitzungen_gestartet: IntCounter,
    pub sitzungen_fehlgeschlagen: IntCounter,
    pub sitzung_aktiv: IntGauge,
    pub transport_verbunden: IntGauge,
    pub abbau_fehler: IntCounter,

    // Audio-Metriken
    pub pipelines_aktiv: IntGauge,
    pub pipelines_erstellt: IntCounter,
    pub mischpult_eingaenge: IntGauge,
    pub pakete_dekodiert: IntCounter,
    pub pakete_verworfen: IntCounter,
    pub frames_gesendet: IntCounter,

    // HTTP-Metriken
    pub http_request_duration_seconds: HistogramVec,
}

fn zaehler(registry: &Registry, name: &str, hilfe: &str) -> Result<IntCounter> {
    let metrik = IntCounter::with_opts(Opts::new(name, hilfe))?;
    registry.register(Box::new(metrik.clone()))?;
    Ok(metrik)
}

fn messwert(registry: &Registry, name: &str, hilfe: &str) -> Result<IntGauge> {
    let metrik = IntGauge::with_opts(Opts::new(name, hilfe))?;
    registry.register(Box::new(metrik.clone()))?;
    Ok(metrik)
}

impl RelaisMetriken {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        let sitzungen_gestartet = zaehler(
            &registry,
            "vcsync_sitzungen_gestartet_total",
            "Erfolgreich gestartete Relais-Sitzungen",
        )?;
        let sitzungen_fehlgeschlagen = zaehler(
            &registry,
            "vcsync_sitzungen_fehlgeschlagen_total",
            "Abgebrochene oder gescheiterte Sitzungsstarts",
        )?;
        let sitzung_aktiv = messwert(&registry, "vcsync_sitzung_aktiv", "1 solange eine Sitzung laeuft")?;
        let transport_verbunden = messwert(
            &registry,
            "vcsync_transport_verbunden",
            "0 nachdem der Transport eine Sitzung getrennt hat",
        )?;
        transport_verbunden.set(1);
        let abbau_fehler = zaehler(
            &registry,
            "vcsync_abbau_fehler_total",
            "Fehler beim Abbau einer Sitzung",
        )?;

        let pipelines_aktiv = messwert(&registry, "vcsync_pipelines_aktiv", "Aktuell dekodierende Sprecher")?;
        let pipelines_erstellt = zaehler(
            &registry,
            "vcsync_pipelines_erstellt_total",
            "Insgesamt aufgebaute Sprecher-Pipelines",
        )?;
        let mischpult_eingaenge = messwert(
            &registry,
            "vcsync_mischpult_eingaenge",
            "Angesteckte Mischpult-Eingaenge",
        )?;
        let pakete_dekodiert = zaehler(&registry, "vcsync_pakete_dekodiert_total", "Dekodierte Voice-Pakete")?;
        let pakete_verworfen = zaehler(
            &registry,
            "vcsync_pakete_verworfen_total",
            "Verworfene Voice-Pakete (kaputt oder ausser Reihe)",
        )?;
        let frames_gesendet = zaehler(
            &registry,
            "vcsync_frames_gesendet_total",
            "Ausgelieferte Ausgangs-Frames",
        )?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "vcsync_http_request_duration_seconds",
                "HTTP-Antwortzeit in Sekunden",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
            &["method", "path"],
        )?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            sitzungen_gestartet,
            sitzungen_fehlgeschlagen,
            sitzung_aktiv,
            transport_verbunden,
            abbau_fehler,
            pipelines_aktiv,
            pipelines_erstellt,
            mischpult_eingaenge,
            pakete_dekodiert,
            pakete_verworfen,
            frames_gesendet,
            http_request_duration_seconds,
        })
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: RelaisMetriken) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(State(metriken): State<RelaisMetriken>) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            axum::http::StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metriken_erstellen_erfolgreich() {
        assert!(RelaisMetriken::neu().is_ok());
    }

    #[test]
    fn zwei_registries_kollidieren_nicht() {
        // Jede Instanz hat ihre eigene Registry
        assert!(RelaisMetriken::neu().is_ok());
        assert!(RelaisMetriken::neu().is_ok());
    }

    #[test]
    fn export_enthaelt_relais_metriken() {
        let m = RelaisMetriken::neu().unwrap();
        m.sitzungen_gestartet.inc();
        m.pipelines_aktiv.set(3);
        m.http_request_duration_seconds
            .with_label_values(&["GET", "/metrics"])
            .observe(0.002);

        let text = m.exportieren().unwrap();
        assert!(text.contains("vcsync_sitzungen_gestartet_total 1"));
        assert!(text.contains("vcsync_pipelines_aktiv 3"));
        assert!(text.contains("vcsync_transport_verbunden 1"));
        assert!(text.contains("vcsync_http_request_duration_seconds_bucket"));
    }

    #[test]
    fn klone_teilen_werte() {
        let m = RelaisMetriken::neu().unwrap();
        let k = m.clone();
        k.frames_gesendet.inc_by(50);
        assert_eq!(m.frames_gesendet.get(), 50);
    }
}
