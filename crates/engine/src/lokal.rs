//! In-Process-Media-Engine
//!
//! `LokaleEngine` haelt alle Engine-Objekte im Speicher und erzeugt ICE-,
//! DTLS- und Kandidaten-Daten aus der Konfiguration. Pakete werden nicht
//! weitergeleitet; die Engine dient als Gegenstueck fuer den Signaling-Layer
//! im Einzelbetrieb und in Tests.
//!
//! Fuer Tests bietet sie Fehlerinjektion pro Operation, einen Zaehler fuer
//! erstellte Router und das Simulieren eines DTLS-Abbruchs.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use relais_core::{ConsumerId, MediaKind, ProducerId, TransportId};
use relais_protocol::rtp::{
    DtlsFingerprint, DtlsParameters, DtlsRole, IceCandidate, IceParameters, RtcpFeedback,
    RtcpParameters, RtpCapabilities, RtpCodecCapability, RtpEncodingParameters,
    RtpHeaderExtension, RtpParameters, TransportProtocol,
};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::engine::{
    ConsumerHandle, EngineEreignis, MediaEngine, ProducerHandle, Ressource, RouterOptionen,
    RoutingContext, TransportOptionen, TransportParameter,
};
use crate::error::{EngineError, EngineResult};

/// Erste dynamische Payload-Type-Nummer fuer Router-Codecs
const ERSTER_PAYLOAD_TYPE: u8 = 100;

/// Kapazitaet des Ereignis-Kanals
const EREIGNIS_KAPAZITAET: usize = 256;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Konfiguration der lokalen Engine
#[derive(Debug, Clone)]
pub struct LokaleEngineConfig {
    /// IP auf der die Engine lauscht
    pub listen_ip: String,
    /// IP die Clients in den ICE-Kandidaten sehen
    pub announced_ip: String,
    /// Erster RTC-Port
    pub rtc_min_port: u16,
    /// Letzter RTC-Port (inklusive)
    pub rtc_max_port: u16,
    pub enable_udp: bool,
    pub enable_tcp: bool,
    pub prefer_udp: bool,
    /// Anfaengliche ausgehende Bitrate in bit/s
    pub initial_outgoing_bitrate: u32,
    /// Kuenstliche Verzoegerung jeder Operation (nur fuer Tests)
    pub kuenstliche_latenz_ms: u64,
}

impl Default for LokaleEngineConfig {
    fn default() -> Self {
        Self {
            listen_ip: "0.0.0.0".into(),
            announced_ip: "127.0.0.1".into(),
            rtc_min_port: 20000,
            rtc_max_port: 29999,
            enable_udp: true,
            enable_tcp: true,
            prefer_udp: true,
            initial_outgoing_bitrate: 1_000_000,
            kuenstliche_latenz_ms: 0,
        }
    }
}

/// Engine-Operationen fuer die Fehlerinjektion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineOperation {
    RouterErstellen,
    TransportErstellen,
    TransportVerbinden,
    Produzieren,
    Konsumieren,
    Fortsetzen,
}

// ---------------------------------------------------------------------------
// Interne Objekte
// ---------------------------------------------------------------------------

struct TransportEintrag {
    router_id: Uuid,
    port: u16,
    /// DTLS-Parameter des Clients nach erfolgreichem Connect
    remote_dtls: Option<DtlsParameters>,
}

struct ProducerEintrag {
    transport_id: TransportId,
    router_id: Uuid,
    kind: MediaKind,
    rtp_parameters: RtpParameters,
}

struct ConsumerEintrag {
    transport_id: TransportId,
    producer_id: ProducerId,
    pausiert: bool,
}

struct Inner {
    config: LokaleEngineConfig,
    router: DashMap<Uuid, RoutingContext>,
    transports: DashMap<TransportId, TransportEintrag>,
    producers: DashMap<ProducerId, ProducerEintrag>,
    consumers: DashMap<ConsumerId, ConsumerEintrag>,
    port_zaehler: AtomicU32,
    router_erstellt: AtomicUsize,
    fehler: Mutex<HashSet<EngineOperation>>,
    bereit: AtomicBool,
    ereignisse: broadcast::Sender<EngineEreignis>,
}

// ---------------------------------------------------------------------------
// LokaleEngine
// ---------------------------------------------------------------------------

/// In-Process-Implementierung von [`MediaEngine`]
///
/// Clone ist guenstig (Arc); alle Klone teilen denselben Zustand.
#[derive(Clone)]
pub struct LokaleEngine {
    inner: Arc<Inner>,
}

impl LokaleEngine {
    /// Erstellt eine neue lokale Engine
    pub fn neu(config: LokaleEngineConfig) -> Self {
        let (ereignisse, _) = broadcast::channel(EREIGNIS_KAPAZITAET);
        tracing::info!(
            listen_ip = %config.listen_ip,
            announced_ip = %config.announced_ip,
            rtc_min_port = config.rtc_min_port,
            rtc_max_port = config.rtc_max_port,
            "Lokale Media-Engine initialisiert"
        );
        Self {
            inner: Arc::new(Inner {
                config,
                router: DashMap::new(),
                transports: DashMap::new(),
                producers: DashMap::new(),
                consumers: DashMap::new(),
                port_zaehler: AtomicU32::new(0),
                router_erstellt: AtomicUsize::new(0),
                fehler: Mutex::new(HashSet::new()),
                bereit: AtomicBool::new(true),
                ereignisse,
            }),
        }
    }

    /// Gibt die Konfiguration zurueck
    pub fn config(&self) -> &LokaleEngineConfig {
        &self.inner.config
    }

    /// Anzahl aller jemals erstellten Router
    pub fn router_erstellt_anzahl(&self) -> usize {
        self.inner.router_erstellt.load(Ordering::SeqCst)
    }

    pub fn router_anzahl(&self) -> usize {
        self.inner.router.len()
    }

    pub fn transport_anzahl(&self) -> usize {
        self.inner.transports.len()
    }

    pub fn producer_anzahl(&self) -> usize {
        self.inner.producers.len()
    }

    pub fn consumer_anzahl(&self) -> usize {
        self.inner.consumers.len()
    }

    /// Prueft ob ein Transport in der Engine noch existiert
    pub fn hat_transport(&self, transport_id: &TransportId) -> bool {
        self.inner.transports.contains_key(transport_id)
    }

    /// Prueft ob ein Producer in der Engine noch existiert
    pub fn hat_producer(&self, producer_id: &ProducerId) -> bool {
        self.inner.producers.contains_key(producer_id)
    }

    /// Pausenzustand eines Consumers (None wenn unbekannt)
    pub fn consumer_pausiert(&self, consumer_id: &ConsumerId) -> Option<bool> {
        self.inner.consumers.get(consumer_id).map(|c| c.pausiert)
    }

    /// Laesst die naechsten Aufrufe einer Operation fehlschlagen
    pub fn fehler_injizieren(&self, operation: EngineOperation) {
        self.inner.fehler.lock().insert(operation);
    }

    /// Hebt eine Fehlerinjektion wieder auf
    pub fn fehler_entfernen(&self, operation: EngineOperation) {
        self.inner.fehler.lock().remove(&operation);
    }

    /// Simuliert den Ausfall (`false`) oder die Wiederherstellung der Engine
    ///
    /// Eine ausgefallene Engine lehnt jede Operation ab.
    pub fn bereit_setzen(&self, bereit: bool) {
        self.inner.bereit.store(bereit, Ordering::SeqCst);
        if !bereit {
            tracing::warn!("Lokale Media-Engine als ausgefallen markiert");
        }
    }

    /// Simuliert den DTLS-Zustand `closed` eines Transports
    ///
    /// Der Transport wird samt Producern und Consumern entfernt und ein
    /// [`EngineEreignis::TransportGeschlossen`] gemeldet.
    pub fn dtls_schliessen(&self, transport_id: &TransportId) {
        if self.transport_entfernen(transport_id) {
            // Fehler nur wenn kein Abonnent existiert
            let _ = self.inner.ereignisse.send(EngineEreignis::TransportGeschlossen {
                transport_id: *transport_id,
                grund: "DTLS-Zustand closed".into(),
            });
        }
    }

    // -----------------------------------------------------------------------
    // Interne Hilfsfunktionen
    // -----------------------------------------------------------------------

    async fn vorbereiten(&self, operation: EngineOperation) -> EngineResult<()> {
        if self.inner.config.kuenstliche_latenz_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.inner.config.kuenstliche_latenz_ms))
                .await;
        }
        if !self.inner.bereit.load(Ordering::SeqCst) {
            return Err(EngineError::Intern("Engine nicht bereit".into()));
        }
        if self.inner.fehler.lock().contains(&operation) {
            return Err(EngineError::Intern(format!(
                "Injizierter Fehler in {operation:?}"
            )));
        }
        Ok(())
    }

    fn naechster_port(&self) -> u16 {
        let min = self.inner.config.rtc_min_port;
        let max = self.inner.config.rtc_max_port.max(min);
        let spanne = u32::from(max - min) + 1;
        let versatz = self.inner.port_zaehler.fetch_add(1, Ordering::Relaxed) % spanne;
        // versatz < spanne <= u16::MAX + 1, min + versatz <= max
        min + versatz as u16
    }

    fn kandidaten(&self, port: u16, force_tcp: bool) -> Vec<IceCandidate> {
        let config = &self.inner.config;
        let (udp_prio, tcp_prio) = if config.prefer_udp {
            (1_076_302_079, 1_076_276_479)
        } else {
            (1_076_276_479, 1_076_302_079)
        };

        let mut kandidaten = Vec::new();
        if config.enable_udp && !force_tcp {
            kandidaten.push(IceCandidate {
                foundation: "udpcandidate".into(),
                priority: udp_prio,
                ip: config.announced_ip.clone(),
                protocol: TransportProtocol::Udp,
                port,
                typ: "host".into(),
                tcp_type: None,
            });
        }
        if config.enable_tcp || force_tcp {
            kandidaten.push(IceCandidate {
                foundation: "tcpcandidate".into(),
                priority: tcp_prio,
                ip: config.announced_ip.clone(),
                protocol: TransportProtocol::Tcp,
                port,
                typ: "host".into(),
                tcp_type: Some("passive".into()),
            });
        }
        kandidaten
    }

    /// Entfernt einen Transport samt abhaengiger Objekte
    fn transport_entfernen(&self, transport_id: &TransportId) -> bool {
        if self.inner.transports.remove(transport_id).is_none() {
            return false;
        }

        let producers: Vec<ProducerId> = self
            .inner
            .producers
            .iter()
            .filter(|p| p.transport_id == *transport_id)
            .map(|p| *p.key())
            .collect();
        for producer_id in producers {
            self.producer_entfernen(&producer_id);
        }

        self.inner
            .consumers
            .retain(|_, c| c.transport_id != *transport_id);
        true
    }

    fn producer_entfernen(&self, producer_id: &ProducerId) -> bool {
        if self.inner.producers.remove(producer_id).is_none() {
            return false;
        }
        self.inner
            .consumers
            .retain(|_, c| c.producer_id != *producer_id);
        true
    }
}

impl Default for LokaleEngine {
    fn default() -> Self {
        Self::neu(LokaleEngineConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Erzeugung von Parametern
// ---------------------------------------------------------------------------

fn rtcp_feedback_fuer(kind: MediaKind) -> Vec<RtcpFeedback> {
    let fb = |typ: &str, parameter: &str| RtcpFeedback {
        typ: typ.into(),
        parameter: parameter.into(),
    };
    match kind {
        MediaKind::Audio => vec![fb("transport-cc", "")],
        MediaKind::Video => vec![
            fb("nack", ""),
            fb("nack", "pli"),
            fb("ccm", "fir"),
            fb("goog-remb", ""),
            fb("transport-cc", ""),
        ],
    }
}

fn standard_header_extensions() -> Vec<RtpHeaderExtension> {
    let ext = |kind, uri: &str, preferred_id| RtpHeaderExtension {
        kind,
        uri: uri.into(),
        preferred_id,
        direction: Some("sendrecv".into()),
    };
    vec![
        ext(MediaKind::Audio, "urn:ietf:params:rtp-hdrext:sdes:mid", 1),
        ext(MediaKind::Video, "urn:ietf:params:rtp-hdrext:sdes:mid", 1),
        ext(
            MediaKind::Video,
            "http://www.webrtc.org/experiments/rtp-hdrext/abs-send-time",
            4,
        ),
        ext(
            MediaKind::Video,
            "http://www.ietf.org/id/draft-holmer-rmcat-transport-wide-cc-extensions-01",
            5,
        ),
        ext(MediaKind::Audio, "urn:ietf:params:rtp-hdrext:ssrc-audio-level", 10),
    ]
}

/// Vergibt Payload-Types und RTCP-Feedback fuer die Router-Codecs
fn router_capabilities(media_codecs: &[RtpCodecCapability]) -> RtpCapabilities {
    let mut naechster_pt = ERSTER_PAYLOAD_TYPE;
    let codecs = media_codecs
        .iter()
        .map(|codec| {
            let mut codec = codec.clone();
            if codec.preferred_payload_type.is_none() {
                codec.preferred_payload_type = Some(naechster_pt);
                naechster_pt = naechster_pt.saturating_add(1);
            }
            if codec.rtcp_feedback.is_empty() {
                codec.rtcp_feedback = rtcp_feedback_fuer(codec.kind);
            }
            codec
        })
        .collect();

    RtpCapabilities {
        codecs,
        header_extensions: standard_header_extensions(),
    }
}

fn ice_parameter() -> IceParameters {
    let ufrag = Uuid::new_v4().simple().to_string();
    IceParameters {
        username_fragment: ufrag[..16].to_string(),
        password: Uuid::new_v4().simple().to_string(),
        ice_lite: true,
    }
}

fn dtls_parameter() -> DtlsParameters {
    let bytes: Vec<u8> = Uuid::new_v4()
        .as_bytes()
        .iter()
        .chain(Uuid::new_v4().as_bytes().iter())
        .copied()
        .collect();
    let value = bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":");
    DtlsParameters {
        role: DtlsRole::Auto,
        fingerprints: vec![DtlsFingerprint {
            algorithm: "sha-256".into(),
            value,
        }],
    }
}

// ---------------------------------------------------------------------------
// MediaEngine
// ---------------------------------------------------------------------------

#[async_trait]
impl MediaEngine for LokaleEngine {
    async fn routing_kontext_erstellen(
        &self,
        optionen: &RouterOptionen,
    ) -> EngineResult<RoutingContext> {
        self.vorbereiten(EngineOperation::RouterErstellen).await?;

        if optionen.media_codecs.is_empty() {
            return Err(EngineError::Abgelehnt("Router ohne Codecs".into()));
        }

        let routing = RoutingContext {
            router_id: Uuid::new_v4(),
            room_id: optionen.room_id.clone(),
            rtp_capabilities: router_capabilities(&optionen.media_codecs),
        };
        self.inner.router.insert(routing.router_id, routing.clone());
        self.inner.router_erstellt.fetch_add(1, Ordering::SeqCst);

        tracing::debug!(router_id = %routing.router_id, room_id = %routing.room_id, "Router erstellt");
        Ok(routing)
    }

    async fn transport_erstellen(
        &self,
        routing: &RoutingContext,
        optionen: &TransportOptionen,
    ) -> EngineResult<TransportParameter> {
        self.vorbereiten(EngineOperation::TransportErstellen).await?;

        if !self.inner.router.contains_key(&routing.router_id) {
            return Err(EngineError::Unbekannt(format!("router:{}", routing.router_id)));
        }

        let port = self.naechster_port();
        let ice_candidates = self.kandidaten(port, optionen.force_tcp);
        if ice_candidates.is_empty() {
            return Err(EngineError::Abgelehnt(
                "Weder UDP noch TCP aktiviert".into(),
            ));
        }

        let id = TransportId::new();
        self.inner.transports.insert(
            id,
            TransportEintrag {
                router_id: routing.router_id,
                port,
                remote_dtls: None,
            },
        );

        tracing::debug!(
            transport_id = %id,
            port,
            force_tcp = optionen.force_tcp,
            bitrate = self.inner.config.initial_outgoing_bitrate,
            "Transport erstellt"
        );
        Ok(TransportParameter {
            id,
            ice_parameters: ice_parameter(),
            ice_candidates,
            dtls_parameters: dtls_parameter(),
        })
    }

    async fn transport_verbinden(
        &self,
        transport_id: &TransportId,
        dtls_parameters: &DtlsParameters,
    ) -> EngineResult<()> {
        self.vorbereiten(EngineOperation::TransportVerbinden).await?;

        dtls_parameters.pruefen().map_err(EngineError::Dtls)?;

        let mut transport = self
            .inner
            .transports
            .get_mut(transport_id)
            .ok_or_else(|| EngineError::Unbekannt(transport_id.to_string()))?;

        match transport.remote_dtls.clone() {
            // Wiederholtes Verbinden mit identischen Parametern ist harmlos
            Some(vorhanden) if vorhanden == *dtls_parameters => Ok(()),
            Some(_) => Err(EngineError::Dtls(
                "Transport ist bereits mit anderen DTLS-Parametern verbunden".into(),
            )),
            None => {
                transport.remote_dtls = Some(dtls_parameters.clone());
                tracing::debug!(transport_id = %transport_id, port = transport.port, "Transport verbunden");
                Ok(())
            }
        }
    }

    async fn produzieren(
        &self,
        transport_id: &TransportId,
        kind: MediaKind,
        rtp_parameters: &RtpParameters,
    ) -> EngineResult<ProducerHandle> {
        self.vorbereiten(EngineOperation::Produzieren).await?;

        rtp_parameters.pruefen(kind).map_err(EngineError::Abgelehnt)?;

        let router_id = self
            .inner
            .transports
            .get(transport_id)
            .map(|t| t.router_id)
            .ok_or_else(|| EngineError::Unbekannt(transport_id.to_string()))?;

        let codec = rtp_parameters
            .primaerer_codec()
            .ok_or_else(|| EngineError::Abgelehnt("Kein Codec".into()))?;
        let unterstuetzt = self
            .inner
            .router
            .get(&router_id)
            .map(|r| r.rtp_capabilities.codec_fuer(codec).is_some())
            .unwrap_or(false);
        if !unterstuetzt {
            return Err(EngineError::Abgelehnt(format!(
                "Codec {} wird vom Router nicht unterstuetzt",
                codec.mime_type
            )));
        }

        let id = ProducerId::new();
        self.inner.producers.insert(
            id,
            ProducerEintrag {
                transport_id: *transport_id,
                router_id,
                kind,
                rtp_parameters: rtp_parameters.clone(),
            },
        );

        tracing::debug!(producer_id = %id, transport_id = %transport_id, %kind, "Producer erstellt");
        Ok(ProducerHandle {
            id,
            kind,
            rtp_parameters: rtp_parameters.clone(),
        })
    }

    async fn kann_konsumieren(
        &self,
        routing: &RoutingContext,
        producer_id: &ProducerId,
        rtp_capabilities: &RtpCapabilities,
    ) -> bool {
        let Some(producer) = self.inner.producers.get(producer_id) else {
            return false;
        };
        if producer.router_id != routing.router_id {
            return false;
        }
        producer
            .rtp_parameters
            .primaerer_codec()
            .map(|codec| rtp_capabilities.codec_fuer(codec).is_some())
            .unwrap_or(false)
    }

    async fn konsumieren(
        &self,
        transport_id: &TransportId,
        producer_id: &ProducerId,
        rtp_capabilities: &RtpCapabilities,
    ) -> EngineResult<ConsumerHandle> {
        self.vorbereiten(EngineOperation::Konsumieren).await?;

        let router_id = self
            .inner
            .transports
            .get(transport_id)
            .map(|t| t.router_id)
            .ok_or_else(|| EngineError::Unbekannt(transport_id.to_string()))?;

        let (kind, quelle) = {
            let producer = self
                .inner
                .producers
                .get(producer_id)
                .ok_or_else(|| EngineError::Unbekannt(producer_id.to_string()))?;
            if producer.router_id != router_id {
                return Err(EngineError::Abgelehnt(
                    "Producer gehoert zu einem anderen Router".into(),
                ));
            }
            (producer.kind, producer.rtp_parameters.clone())
        };

        let codec = quelle
            .primaerer_codec()
            .ok_or_else(|| EngineError::Abgelehnt("Producer ohne Codec".into()))?;
        let faehigkeit = rtp_capabilities.codec_fuer(codec).ok_or_else(|| {
            EngineError::Abgelehnt(format!("Client unterstuetzt {} nicht", codec.mime_type))
        })?;

        let mut consumer_codec = codec.clone();
        if let Some(pt) = faehigkeit.preferred_payload_type {
            consumer_codec.payload_type = pt;
        }

        let id = ConsumerId::new();
        // SSRC aus der Consumer-ID ableiten, damit sie pro Consumer stabil ist
        let ssrc = id.inner().as_u128() as u32;
        let rtp_parameters = RtpParameters {
            mid: None,
            codecs: vec![consumer_codec],
            header_extensions: vec![],
            encodings: vec![RtpEncodingParameters {
                ssrc: Some(ssrc),
                ..Default::default()
            }],
            rtcp: RtcpParameters {
                cname: quelle.rtcp.cname.clone(),
                reduced_size: true,
            },
        };

        self.inner.consumers.insert(
            id,
            ConsumerEintrag {
                transport_id: *transport_id,
                producer_id: *producer_id,
                pausiert: true,
            },
        );

        tracing::debug!(consumer_id = %id, producer_id = %producer_id, "Consumer erstellt (pausiert)");
        Ok(ConsumerHandle {
            id,
            producer_id: *producer_id,
            kind,
            rtp_parameters,
            pausiert: true,
        })
    }

    async fn fortsetzen(&self, consumer_id: &ConsumerId) -> EngineResult<()> {
        self.vorbereiten(EngineOperation::Fortsetzen).await?;

        let mut consumer = self
            .inner
            .consumers
            .get_mut(consumer_id)
            .ok_or_else(|| EngineError::Unbekannt(consumer_id.to_string()))?;
        consumer.pausiert = false;
        tracing::trace!(consumer_id = %consumer_id, "Consumer fortgesetzt");
        Ok(())
    }

    async fn schliessen(&self, ressource: Ressource) {
        let entfernt = match &ressource {
            Ressource::Router(router_id) => {
                let entfernt = self.inner.router.remove(router_id).is_some();
                let transports: Vec<TransportId> = self
                    .inner
                    .transports
                    .iter()
                    .filter(|t| t.router_id == *router_id)
                    .map(|t| *t.key())
                    .collect();
                for transport_id in transports {
                    self.transport_entfernen(&transport_id);
                }
                entfernt
            }
            Ressource::Transport(id) => self.transport_entfernen(id),
            Ressource::Producer(id) => self.producer_entfernen(id),
            Ressource::Consumer(id) => self.inner.consumers.remove(id).is_some(),
        };

        if entfernt {
            tracing::debug!(ressource = %ressource, "Engine-Ressource geschlossen");
        }
    }

    fn ereignisse_abonnieren(&self) -> broadcast::Receiver<EngineEreignis> {
        self.inner.ereignisse.subscribe()
    }

    fn bereit(&self) -> bool {
        self.inner.bereit.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
