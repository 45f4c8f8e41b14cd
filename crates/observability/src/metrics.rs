//! Prometheus-kompatible Metriken fuer Relais
//!
//! Registrierte Metriken:
//! - `relais_connected_peers` – Gauge: Aktuell verbundene Peers
//! - `relais_rooms_active` – Gauge: Aktive Raeume
//! - `relais_room_members` – Gauge: Raum-Mitgliedschaften
//! - `relais_transports_active` – Gauge: Registrierte Transports
//! - `relais_producers_active` – Gauge: Registrierte Producer
//! - `relais_consumers_active` – Gauge: Registrierte Consumer
//! - `relais_signaling_requests_total` – Counter: Signaling-Nachrichten (type, result)
//! - `relais_signaling_request_duration_seconds` – Histogram: Bearbeitungszeit (type)
//! - `relais_http_requests_total` – Counter: HTTP-Anfragen (method, path, status)

use anyhow::Result;
use axum::{extract::State, response::IntoResponse, routing::get, Router};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;

/// Momentaufnahme der Sitzungszaehler fuer die Gauges
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SitzungsZaehler {
    pub peers: usize,
    pub raeume: usize,
    pub mitglieder: usize,
    pub transports: usize,
    pub producers: usize,
    pub consumers: usize,
}

/// Alle Relais-Prometheus-Metriken
#[derive(Clone)]
pub struct RelaisMetrics {
    pub registry: Arc<Registry>,

    // Sitzungs-Metriken
    pub connected_peers: IntGauge,
    pub rooms_active: IntGauge,
    pub room_members: IntGauge,
    pub transports_active: IntGauge,
    pub producers_active: IntGauge,
    pub consumers_active: IntGauge,

    // Signaling-Metriken
    pub signaling_requests_total: IntCounterVec,
    pub signaling_request_duration_seconds: HistogramVec,

    // HTTP-Metriken
    pub http_requests_total: IntCounterVec,
}

fn gauge(registry: &Registry, name: &str, hilfe: &str) -> Result<IntGauge> {
    let gauge = IntGauge::with_opts(Opts::new(name, hilfe))?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

impl RelaisMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        // --- Sitzungs-Metriken ---
        let connected_peers = gauge(
            &registry,
            "relais_connected_peers",
            "Anzahl aktuell verbundener Peers",
        )?;
        let rooms_active = gauge(&registry, "relais_rooms_active", "Anzahl aktiver Raeume")?;
        let room_members = gauge(
            &registry,
            "relais_room_members",
            "Anzahl der Raum-Mitgliedschaften",
        )?;
        let transports_active = gauge(
            &registry,
            "relais_transports_active",
            "Anzahl registrierter WebRTC-Transports",
        )?;
        let producers_active = gauge(
            &registry,
            "relais_producers_active",
            "Anzahl registrierter Producer",
        )?;
        let consumers_active = gauge(
            &registry,
            "relais_consumers_active",
            "Anzahl registrierter Consumer",
        )?;

        // --- Signaling-Metriken ---
        let signaling_requests_total = IntCounterVec::new(
            Opts::new(
                "relais_signaling_requests_total",
                "Gesamtanzahl bearbeiteter Signaling-Nachrichten",
            ),
            &["type", "result"],
        )?;
        registry.register(Box::new(signaling_requests_total.clone()))?;

        let signaling_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "relais_signaling_request_duration_seconds",
                "Bearbeitungszeit einer Signaling-Nachricht in Sekunden",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 1.0]),
            &["type"],
        )?;
        registry.register(Box::new(signaling_request_duration_seconds.clone()))?;

        // --- HTTP-Metriken ---
        let http_requests_total = IntCounterVec::new(
            Opts::new("relais_http_requests_total", "Gesamtanzahl HTTP-Anfragen"),
            &["method", "path", "status"],
        )?;
        registry.register(Box::new(http_requests_total.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            connected_peers,
            rooms_active,
            room_members,
            transports_active,
            producers_active,
            consumers_active,
            signaling_requests_total,
            signaling_request_duration_seconds,
            http_requests_total,
        })
    }

    /// Uebernimmt die aktuellen Sitzungszaehler in die Gauges
    pub fn zaehler_setzen(&self, zaehler: SitzungsZaehler) {
        let setzen = |gauge: &IntGauge, wert: usize| {
            gauge.set(i64::try_from(wert).unwrap_or(i64::MAX));
        };
        setzen(&self.connected_peers, zaehler.peers);
        setzen(&self.rooms_active, zaehler.raeume);
        setzen(&self.room_members, zaehler.mitglieder);
        setzen(&self.transports_active, zaehler.transports);
        setzen(&self.producers_active, zaehler.producers);
        setzen(&self.consumers_active, zaehler.consumers);
    }

    /// Zaehlt eine bearbeitete Signaling-Nachricht
    ///
    /// `ergebnis` ist `ok` oder der Fehlercode der Antwort.
    pub fn anfrage_erfassen(&self, typ: &str, ergebnis: &str, dauer: Duration) {
        self.signaling_requests_total
            .with_label_values(&[typ, ergebnis])
            .inc();
        self.signaling_request_duration_seconds
            .with_label_values(&[typ])
            .observe(dauer.as_secs_f64());
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
pub fn metrics_router(metriken: RelaisMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(State(metriken): State<RelaisMetrics>) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            axum::http::StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4",
            )],
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
        let metriken = RelaisMetrics::neu().unwrap();
        assert!(!metriken.registry.gather().is_empty());
    }

    #[test]
    fn zaehler_werden_uebernommen() {
        let metriken = RelaisMetrics::neu().unwrap();
        metriken.zaehler_setzen(SitzungsZaehler {
            peers: 2,
            raeume: 1,
            mitglieder: 2,
            transports: 4,
            producers: 2,
            consumers: 2,
        });
        assert_eq!(metriken.connected_peers.get(), 2);
        assert_eq!(metriken.rooms_active.get(), 1);
        assert_eq!(metriken.transports_active.get(), 4);
        assert_eq!(metriken.consumers_active.get(), 2);
    }

    #[test]
    fn signaling_anfragen_mit_labels() {
        let metriken = RelaisMetrics::neu().unwrap();
        metriken.anfrage_erfassen("produce", "ok", Duration::from_millis(2));
        metriken.anfrage_erfassen("produce", "ok", Duration::from_millis(3));
        metriken.anfrage_erfassen("consume", "CAPABILITY_MISMATCH", Duration::from_millis(1));

        let ok = metriken
            .signaling_requests_total
            .with_label_values(&["produce", "ok"])
            .get();
        assert_eq!(ok, 2);
        let fehler = metriken
            .signaling_requests_total
            .with_label_values(&["consume", "CAPABILITY_MISMATCH"])
            .get();
        assert_eq!(fehler, 1);
    }

    #[test]
    fn metriken_export_prometheus_format() {
        let metriken = RelaisMetrics::neu().unwrap();
        metriken.connected_peers.set(5);
        metriken.anfrage_erfassen("ping", "ok", Duration::from_micros(100));

        let output = metriken.exportieren().unwrap();
        assert!(output.contains("relais_connected_peers 5"));
        assert!(output.contains("relais_signaling_requests_total"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }
}
