//! MediaEngine-Trait und Austauschtypen
//!
//! Alle Aufrufe sind asynchron und liefern explizite `Result`-Typen, damit
//! Fehler strukturell und nicht per Callback-Konvention weitergegeben werden.
//! Die Engine vergibt alle Transport-, Producer- und Consumer-IDs.

use async_trait::async_trait;
use relais_core::{ConsumerId, MediaKind, ProducerId, RoomId, TransportId};
use relais_protocol::rtp::{
    DtlsParameters, IceCandidate, IceParameters, RtpCapabilities, RtpCodecCapability,
    RtpParameters,
};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::EngineResult;

// ---------------------------------------------------------------------------
// Eingabetypen
// ---------------------------------------------------------------------------

/// Konfiguration eines Raum-Routers
#[derive(Debug, Clone)]
pub struct RouterOptionen {
    /// Raum fuer den der Router angelegt wird
    pub room_id: RoomId,
    /// Codecs die der Router unterstuetzt
    pub media_codecs: Vec<RtpCodecCapability>,
}

impl RouterOptionen {
    /// Router-Optionen mit den Standard-Codecs (Opus und VP8)
    pub fn mit_standard_codecs(room_id: RoomId) -> Self {
        Self {
            room_id,
            media_codecs: standard_media_codecs(),
        }
    }
}

/// Standard-Codecs eines Raum-Routers
///
/// `audio/opus` mit 48 kHz und zwei Kanaelen sowie `video/VP8` mit 90 kHz.
pub fn standard_media_codecs() -> Vec<RtpCodecCapability> {
    vec![
        RtpCodecCapability {
            kind: MediaKind::Audio,
            mime_type: "audio/opus".into(),
            preferred_payload_type: None,
            clock_rate: 48000,
            channels: Some(2),
            parameters: Default::default(),
            rtcp_feedback: vec![],
        },
        RtpCodecCapability {
            kind: MediaKind::Video,
            mime_type: "video/VP8".into(),
            preferred_payload_type: None,
            clock_rate: 90000,
            channels: None,
            parameters: Default::default(),
            rtcp_feedback: vec![],
        },
    ]
}

/// Optionen beim Anlegen eines WebRTC-Transports
#[derive(Debug, Clone, Copy, Default)]
pub struct TransportOptionen {
    /// Nur TCP-Kandidaten anbieten
    pub force_tcp: bool,
}

// ---------------------------------------------------------------------------
// Ausgabetypen
// ---------------------------------------------------------------------------

/// Per-Raum-Routing-Kontext der Engine
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingContext {
    /// Engine-interne Router-ID
    pub router_id: Uuid,
    /// Raum zu dem der Router gehoert
    pub room_id: RoomId,
    /// Capability-Descriptor fuer Clients (Codecs + Header-Extensions)
    pub rtp_capabilities: RtpCapabilities,
}

/// Ergebnis einer Transport-Erstellung
#[derive(Debug, Clone)]
pub struct TransportParameter {
    pub id: TransportId,
    pub ice_parameters: IceParameters,
    pub ice_candidates: Vec<IceCandidate>,
    pub dtls_parameters: DtlsParameters,
}

/// Handle auf einen Producer in der Engine
#[derive(Debug, Clone)]
pub struct ProducerHandle {
    pub id: ProducerId,
    pub kind: MediaKind,
    pub rtp_parameters: RtpParameters,
}

/// Handle auf einen Consumer in der Engine
#[derive(Debug, Clone)]
pub struct ConsumerHandle {
    pub id: ConsumerId,
    pub producer_id: ProducerId,
    pub kind: MediaKind,
    pub rtp_parameters: RtpParameters,
    /// Consumer werden immer pausiert angelegt
    pub pausiert: bool,
}

/// Schliessbare Engine-Ressource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ressource {
    Router(Uuid),
    Transport(TransportId),
    Producer(ProducerId),
    Consumer(ConsumerId),
}

impl std::fmt::Display for Ressource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Ressource::Router(id) => write!(f, "router:{id}"),
            Ressource::Transport(id) => id.fmt(f),
            Ressource::Producer(id) => id.fmt(f),
            Ressource::Consumer(id) => id.fmt(f),
        }
    }
}

/// Ereignisse die die Engine von sich aus meldet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEreignis {
    /// Transport wurde engine-seitig geschlossen (z.B. DTLS-Zustand `closed`)
    TransportGeschlossen {
        transport_id: TransportId,
        grund: String,
    },
}

// ---------------------------------------------------------------------------
// MediaEngine
// ---------------------------------------------------------------------------

/// Schnittstelle zur Media-Engine
///
/// Implementierungen muessen thread-safe sein; der Signaling-Layer ruft sie
/// aus vielen Verbindungs-Tasks gleichzeitig auf.
#[async_trait]
pub trait MediaEngine: Send + Sync + 'static {
    /// Legt einen Router fuer einen Raum an
    async fn routing_kontext_erstellen(
        &self,
        optionen: &RouterOptionen,
    ) -> EngineResult<RoutingContext>;

    /// Legt einen WebRTC-Transport auf dem Router an
    async fn transport_erstellen(
        &self,
        routing: &RoutingContext,
        optionen: &TransportOptionen,
    ) -> EngineResult<TransportParameter>;

    /// Verbindet einen Transport mit den DTLS-Parametern des Clients
    async fn transport_verbinden(
        &self,
        transport_id: &TransportId,
        dtls_parameters: &DtlsParameters,
    ) -> EngineResult<()>;

    /// Legt einen Producer auf einem Transport an
    async fn produzieren(
        &self,
        transport_id: &TransportId,
        kind: MediaKind,
        rtp_parameters: &RtpParameters,
    ) -> EngineResult<ProducerHandle>;

    /// Prueft ob ein Client mit den gegebenen Capabilities den Producer empfangen kann
    async fn kann_konsumieren(
        &self,
        routing: &RoutingContext,
        producer_id: &ProducerId,
        rtp_capabilities: &RtpCapabilities,
    ) -> bool;

    /// Legt einen (pausierten) Consumer an
    async fn konsumieren(
        &self,
        transport_id: &TransportId,
        producer_id: &ProducerId,
        rtp_capabilities: &RtpCapabilities,
    ) -> EngineResult<ConsumerHandle>;

    /// Setzt einen pausierten Consumer fort
    async fn fortsetzen(&self, consumer_id: &ConsumerId) -> EngineResult<()>;

    /// Schliesst eine Ressource; unbekannte Ressourcen werden ignoriert
    async fn schliessen(&self, ressource: Ressource);

    /// Abonniert Engine-Ereignisse
    fn ereignisse_abonnieren(&self) -> broadcast::Receiver<EngineEreignis>;

    /// Meldet ob die Engine Anfragen bedienen kann
    ///
    /// Wird vom Health-Check abgefragt; `false` heisst, dass kein weiterer
    /// Media-Plane-Aufruf gelingen wird (z.B. Worker-Prozess beendet).
    fn bereit(&self) -> bool;
}
