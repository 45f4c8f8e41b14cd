//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use relais_engine::LokaleEngineConfig;
use relais_protocol::wire::DEFAULT_MAX_FRAME_SIZE;
use relais_session::RegistryConfig;
use relais_signaling::SignalingConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Allgemeine Server-Einstellungen
    pub server: ServerEinstellungen,
    /// Netzwerk-Einstellungen (Signaling-Listener)
    pub netzwerk: NetzwerkEinstellungen,
    /// Media-Engine-Einstellungen
    pub medien: MedienEinstellungen,
    /// Raum-Verwaltung
    pub raeume: RaumEinstellungen,
    /// Verbindungs-Einstellungen (Keepalive, Frames)
    pub verbindung: VerbindungsEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Observability-Einstellungen (Metriken, Health)
    pub observability: ObservabilityEinstellungen,
}

/// Allgemeine Server-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename des Servers
    pub name: String,
    /// Maximale Anzahl gleichzeitiger Peers
    pub max_peers: usize,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "Relais".into(),
            max_peers: 1024,
        }
    }
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse fuer Signaling und Observability
    pub bind_adresse: String,
    /// Port fuer die Signaling-Verbindungen
    pub signaling_port: u16,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            signaling_port: 4443,
        }
    }
}

/// Auswahl der Media-Engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineArt {
    /// In-Process-Engine ohne Paketweiterleitung
    #[default]
    Lokal,
    /// mediasoup-Worker (Feature `mediasoup`)
    Mediasoup,
}

/// Media-Engine-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MedienEinstellungen {
    pub engine: EngineArt,
    /// IP auf der die Engine lauscht
    pub listen_ip: String,
    /// IP die in den ICE-Kandidaten angekuendigt wird
    pub announced_ip: String,
    pub rtc_min_port: u16,
    pub rtc_max_port: u16,
    pub enable_udp: bool,
    pub enable_tcp: bool,
    pub prefer_udp: bool,
    /// Anfaengliche ausgehende Bitrate in bit/s
    pub initial_outgoing_bitrate: u32,
}

impl Default for MedienEinstellungen {
    fn default() -> Self {
        let engine = LokaleEngineConfig::default();
        Self {
            engine: EngineArt::default(),
            listen_ip: engine.listen_ip,
            announced_ip: engine.announced_ip,
            rtc_min_port: engine.rtc_min_port,
            rtc_max_port: engine.rtc_max_port,
            enable_udp: engine.enable_udp,
            enable_tcp: engine.enable_tcp,
            prefer_udp: engine.prefer_udp,
            initial_outgoing_bitrate: engine.initial_outgoing_bitrate,
        }
    }
}

/// Raum-Verwaltung
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RaumEinstellungen {
    /// Leere Raeume ohne Transports entfernen und ihren Router schliessen
    pub automatisch_entfernen: bool,
}

impl Default for RaumEinstellungen {
    fn default() -> Self {
        Self {
            automatisch_entfernen: true,
        }
    }
}

/// Verbindungs-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerbindungsEinstellungen {
    /// Intervall der Server-Pings in Sekunden
    pub keepalive_sek: u64,
    /// Trennung nach so vielen Sekunden ohne eingehenden Frame
    pub timeout_sek: u64,
    /// Maximale Frame-Groesse in Bytes
    pub max_frame_groesse: usize,
}

impl Default for VerbindungsEinstellungen {
    fn default() -> Self {
        Self {
            keepalive_sek: 30,
            timeout_sek: 90,
            max_frame_groesse: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Observability-Einstellungen (Metriken + Health-Check)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    /// Aktiviert den Observability-Server
    pub aktiviert: bool,
    /// Port fuer Metriken und Health (Standard: 9300)
    pub port: u16,
    /// Intervall fuer die Aktualisierung der Gauges in Sekunden
    pub aktualisierung_sek: u64,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: true,
            port: 9300,
            aktualisierung_sek: 5,
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        let config: Self = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => toml::from_str(&inhalt)
                .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Self::default()
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
                ))
            }
        };
        config.pruefen()?;
        Ok(config)
    }

    /// Prueft Werte die serde allein nicht abfangen kann
    pub fn pruefen(&self) -> anyhow::Result<()> {
        if self.medien.rtc_min_port > self.medien.rtc_max_port {
            anyhow::bail!(
                "medien.rtc_min_port ({}) liegt ueber rtc_max_port ({})",
                self.medien.rtc_min_port,
                self.medien.rtc_max_port
            );
        }
        if !self.medien.enable_udp && !self.medien.enable_tcp {
            anyhow::bail!("medien: mindestens UDP oder TCP muss aktiviert sein");
        }
        if self.verbindung.keepalive_sek == 0
            || self.verbindung.timeout_sek <= self.verbindung.keepalive_sek
        {
            anyhow::bail!("verbindung.timeout_sek muss groesser als keepalive_sek (> 0) sein");
        }
        if self.medien.engine == EngineArt::Mediasoup && !cfg!(feature = "mediasoup") {
            anyhow::bail!("medien.engine = \"mediasoup\" erfordert das Feature `mediasoup`");
        }
        if self.server.max_peers == 0 {
            anyhow::bail!("server.max_peers muss groesser als 0 sein");
        }
        Ok(())
    }

    /// Bind-Adresse fuer den Signaling-Listener
    pub fn signaling_bind_adresse(&self) -> anyhow::Result<SocketAddr> {
        adresse(&self.netzwerk.bind_adresse, self.netzwerk.signaling_port)
    }

    /// Bind-Adresse fuer den Observability-Server
    pub fn observability_bind_adresse(&self) -> anyhow::Result<SocketAddr> {
        adresse(&self.netzwerk.bind_adresse, self.observability.port)
    }

    pub fn engine_config(&self) -> LokaleEngineConfig {
        let m = &self.medien;
        LokaleEngineConfig {
            listen_ip: m.listen_ip.clone(),
            announced_ip: m.announced_ip.clone(),
            rtc_min_port: m.rtc_min_port,
            rtc_max_port: m.rtc_max_port,
            enable_udp: m.enable_udp,
            enable_tcp: m.enable_tcp,
            prefer_udp: m.prefer_udp,
            initial_outgoing_bitrate: m.initial_outgoing_bitrate,
            ..Default::default()
        }
    }

    #[cfg(feature = "mediasoup")]
    pub fn mediasoup_config(&self) -> relais_engine::MediasoupConfig {
        let m = &self.medien;
        relais_engine::MediasoupConfig {
            listen_ip: m.listen_ip.clone(),
            announced_ip: m.announced_ip.clone(),
            rtc_min_port: m.rtc_min_port,
            rtc_max_port: m.rtc_max_port,
            enable_udp: m.enable_udp,
            enable_tcp: m.enable_tcp,
            prefer_udp: m.prefer_udp,
            initial_outgoing_bitrate: m.initial_outgoing_bitrate,
        }
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            raeume_automatisch_entfernen: self.raeume.automatisch_entfernen,
            ..Default::default()
        }
    }

    pub fn signaling_config(&self) -> SignalingConfig {
        SignalingConfig {
            server_name: self.server.name.clone(),
            max_peers: self.server.max_peers,
            keepalive_sek: self.verbindung.keepalive_sek,
            verbindungs_timeout_sek: self.verbindung.timeout_sek,
            max_frame_groesse: self.verbindung.max_frame_groesse,
        }
    }
}

fn adresse(host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    format!("{host}:{port}")
        .parse()
        .map_err(|e| anyhow::anyhow!("Ungueltige Bind-Adresse '{host}:{port}': {e}"))
}
