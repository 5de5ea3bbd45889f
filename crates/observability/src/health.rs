//! Health-Check-Endpunkt fuer vcsync
//!
//! Endpoint: `GET /health`
//! Response: JSON mit Status, Version, Uptime und Relais-Zustand

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::metrics::RelaisMetriken;

/// Status des Health-Checks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

/// Antwort des Health-Check-Endpunkts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub relais_aktiv: bool,
    pub aktive_sprecher: i64,
    pub transport_verbunden: bool,
}

/// Geteilter Zustand fuer den Health-Check-Handler
#[derive(Clone)]
pub struct HealthState {
    pub start_time: Arc<Instant>,
    pub metriken: RelaisMetriken,
}

impl HealthState {
    pub fn neu(metriken: RelaisMetriken) -> Self {
        Self {
            start_time: Arc::new(Instant::now()),
            metriken,
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Baut die Antwort aus den aktuellen Metriken
    pub fn antwort(&self) -> HealthResponse {
        let transport_verbunden = self.metriken.transport_verbunden.get() == 1;
        HealthResponse {
            // Nach einer Trennung laeuft der Prozess weiter, aber ohne Relais
            status: if transport_verbunden {
                HealthStatus::Healthy
            } else {
                HealthStatus::Degraded
            },
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.uptime_seconds(),
            relais_aktiv: self.metriken.sitzung_aktiv.get() == 1,
            aktive_sprecher: self.metriken.pipelines_aktiv.get(),
            transport_verbunden,
        }
    }
}

/// Axum-Router fuer den `/health`-Endpunkt
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
}

/// `GET /health` – immer 200, auch bei `degraded`; die Probe soll den
/// Prozess nach einer Trennung nicht neu starten lassen
async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.antwort()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frischer_zustand_ist_healthy() {
        let state = HealthState::neu(RelaisMetriken::neu().unwrap());
        let antwort = state.antwort();
        assert_eq!(antwort.status, HealthStatus::Healthy);
        assert!(!antwort.relais_aktiv);
        assert!(antwort.uptime_seconds < 5);
    }

    #[test]
    fn trennung_fuehrt_zu_degraded() {
        let metriken = RelaisMetriken::neu().unwrap();
        let state = HealthState::neu(metriken.clone());
        metriken.transport_verbunden.set(0);
        assert_eq!(state.antwort().status, HealthStatus::Degraded);
    }

    #[test]
    fn relais_zustand_aus_metriken() {
        let metriken = RelaisMetriken::neu().unwrap();
        let state = HealthState::neu(metriken.clone());
        metriken.sitzung_aktiv.set(1);
        metriken.pipelines_aktiv.set(2);
        let antwort = state.antwort();
        assert!(antwort.relais_aktiv);
        assert_eq!(antwort.aktive_sprecher, 2);
    }

    #[test]
    fn health_response_serialisierung() {
        let response = HealthResponse {
            status: HealthStatus::Healthy,
            version: "0.1.0".to_string(),
            uptime_seconds: 3600,
            relais_aktiv: true,
            aktive_sprecher: 1,
            transport_verbunden: true,
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"status\":\"healthy\""));
        assert!(json.contains("\"uptime_seconds\":3600"));
        assert!(json.contains("\"relais_aktiv\":true"));
    }
}
