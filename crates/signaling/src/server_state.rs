//! Gemeinsamer Server-Zustand fuer den Signaling-Service
//!
//! Haelt alle geteilten Services und Zustands-Manager, die sicher zwischen
//! tokio-Tasks geteilt werden koennen.

use relais_engine::MediaEngine;
use relais_observability::{RelaisMetrics, SitzungsZaehler};
use relais_protocol::wire::DEFAULT_MAX_FRAME_SIZE;
use relais_session::{RegistryConfig, SessionRegistry};
use std::sync::Arc;

use crate::broadcast::EventBroadcaster;
use crate::peers::PeerManager;

/// Konfiguration fuer den Signaling-Service
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    /// Anzeigename des Servers (nur fuer Logs)
    pub server_name: String,
    /// Maximale Anzahl gleichzeitig verbundener Peers
    pub max_peers: usize,
    /// Keepalive-Intervall in Sekunden
    pub keepalive_sek: u64,
    /// Timeout fuer inaktive Verbindungen in Sekunden
    pub verbindungs_timeout_sek: u64,
    /// Maximale Frame-Groesse in Bytes
    pub max_frame_groesse: usize,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            server_name: "Relais".to_string(),
            max_peers: 1024,
            keepalive_sek: 30,
            verbindungs_timeout_sek: 90,
            max_frame_groesse: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// Gemeinsamer Server-Zustand (thread-safe, Arc-geteilt)
pub struct SignalingState {
    /// Server-Konfiguration
    pub config: Arc<SignalingConfig>,
    /// Media-Engine (Router, Transports, Producer, Consumer)
    pub engine: Arc<dyn MediaEngine>,
    /// Autoritatives Sitzungsmodell
    pub registry: SessionRegistry,
    /// Verbundene Peers
    pub peers: PeerManager,
    /// Send-Queues aller Peers
    pub broadcaster: EventBroadcaster,
    /// Prometheus-Metriken
    pub metriken: RelaisMetrics,
}

impl SignalingState {
    /// Erstellt einen neuen SignalingState samt Registry
    pub fn neu(
        config: SignalingConfig,
        engine: Arc<dyn MediaEngine>,
        registry_config: RegistryConfig,
        metriken: RelaisMetrics,
    ) -> Arc<Self> {
        let registry = SessionRegistry::neu(Arc::clone(&engine), registry_config);
        Arc::new(Self {
            config: Arc::new(config),
            engine,
            registry,
            peers: PeerManager::neu(),
            broadcaster: EventBroadcaster::neu(),
            metriken,
        })
    }

    /// Aktuelle Zaehlerstaende fuer die Metrik-Gauges
    pub fn sitzungs_zaehler(&self) -> SitzungsZaehler {
        let statistik = self.registry.statistik();
        SitzungsZaehler {
            peers: self.peers.anzahl(),
            raeume: statistik.raeume,
            mitglieder: statistik.mitglieder,
            transports: statistik.transports,
            producers: statistik.producers,
            consumers: statistik.consumers,
        }
    }

    /// Uebernimmt die aktuellen Zaehlerstaende in die Metriken
    pub fn metriken_aktualisieren(&self) {
        self.metriken.zaehler_setzen(self.sitzungs_zaehler());
    }
}
