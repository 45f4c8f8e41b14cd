//! Health-Check-Endpunkt fuer Relais
//!
//! Endpoint: `GET /health`
//! Response: JSON mit Status, Version, Uptime und Zustand der Media-Engine

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Status des Health-Checks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Antwort des Health-Check-Endpunkts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub engine_ready: bool,
    pub accepting_peers: bool,
}

/// Geteilter Zustand fuer den Health-Check-Handler
#[derive(Clone)]
pub struct HealthState {
    start_time: Arc<Instant>,
    engine_bereit: Arc<AtomicBool>,
    nimmt_peers_an: Arc<AtomicBool>,
}

impl HealthState {
    pub fn neu() -> Self {
        Self {
            start_time: Arc::new(Instant::now()),
            engine_bereit: Arc::new(AtomicBool::new(true)),
            nimmt_peers_an: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn engine_status_setzen(&self, bereit: bool) {
        self.engine_bereit.store(bereit, Ordering::Relaxed);
    }

    /// Markiert ob der Signaling-Server neue Peers annimmt (false ab Shutdown)
    pub fn annahme_setzen(&self, aktiv: bool) {
        self.nimmt_peers_an.store(aktiv, Ordering::Relaxed);
    }

    /// Berechnet die aktuelle Health-Antwort
    pub fn bericht(&self) -> HealthResponse {
        let engine_ready = self.engine_bereit.load(Ordering::Relaxed);
        let accepting_peers = self.nimmt_peers_an.load(Ordering::Relaxed);
        let status = match (engine_ready, accepting_peers) {
            (false, _) => HealthStatus::Unhealthy,
            (true, false) => HealthStatus::Degraded,
            (true, true) => HealthStatus::Healthy,
        };
        HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.uptime_seconds(),
            engine_ready,
            accepting_peers,
        }
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::neu()
    }
}

/// Axum-Router fuer den `/health`-Endpunkt
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
}

/// `GET /health` – gibt den Serverstatus zurueck
async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let response = state.bericht();
    let http_status = match response.status {
        // Degraded bleibt 200, damit Probes waehrend des Herunterfahrens nicht fehlschlagen
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (http_status, Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frischer_zustand_ist_gesund() {
        let state = HealthState::neu();
        let bericht = state.bericht();
        assert_eq!(bericht.status, HealthStatus::Healthy);
        assert!(bericht.uptime_seconds < 5);
    }

    #[test]
    fn shutdown_ist_degraded() {
        let state = HealthState::neu();
        state.annahme_setzen(false);
        assert_eq!(state.bericht().status, HealthStatus::Degraded);
    }

    #[test]
    fn engine_ausfall_ist_unhealthy() {
        let state = HealthState::neu();
        state.engine_status_setzen(false);
        assert_eq!(state.bericht().status, HealthStatus::Unhealthy);
        state.engine_status_setzen(true);
        assert_eq!(state.bericht().status, HealthStatus::Healthy);
    }

    #[test]
    fn health_response_serialisierung() {
        let response = HealthResponse {
            status: HealthStatus::Healthy,
            version: "0.1.0".to_string(),
            uptime_seconds: 3600,
            engine_ready: true,
            accepting_peers: true,
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"status\":\"healthy\""));
        assert!(json.contains("\"uptime_seconds\":3600"));
        assert!(json.contains("\"engine_ready\":true"));
    }
}
