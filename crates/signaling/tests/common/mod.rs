//! Gemeinsame Hilfen fuer die Signaling-Integrationstests
//!
//! Die Tests laufen direkt gegen den `MessageDispatcher` mit `LokaleEngine`
//! und den mpsc-Queues des Broadcasters; Sockets braucht nur der TCP-Test.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use relais_core::{ConsumerId, MediaKind, PeerId, ProducerId, RoomId, TransportId};
use relais_engine::{
    ConsumerHandle, EngineEreignis, EngineOperation, EngineResult, LokaleEngine, MediaEngine,
    ProducerHandle, Ressource, RouterOptionen, RoutingContext, TransportOptionen,
    TransportParameter,
};
use relais_observability::RelaisMetrics;
use relais_protocol::control::*;
use relais_protocol::rtp::{
    DtlsFingerprint, DtlsParameters, DtlsRole, RtpCapabilities, RtpCodecParameters, RtpParameters,
};
use relais_session::RegistryConfig;
use relais_signaling::{DispatcherContext, MessageDispatcher, SignalingConfig, SignalingState};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

pub struct Umgebung {
    pub state: Arc<SignalingState>,
    pub engine: LokaleEngine,
    pub dispatcher: MessageDispatcher,
}

pub struct TestPeer {
    pub ctx: DispatcherContext,
    pub rx: mpsc::Receiver<ControlMessage>,
    request_id: u32,
}

impl TestPeer {
    pub fn id(&self) -> PeerId {
        self.ctx.peer_id
    }

    /// Alle bisher eingegangenen Server-Ereignisse
    pub fn ereignisse(&mut self) -> Vec<ControlPayload> {
        let mut ereignisse = Vec::new();
        while let Ok(nachricht) = self.rx.try_recv() {
            assert_eq!(nachricht.request_id, 0, "Ereignisse tragen requestId 0");
            ereignisse.push(nachricht.payload);
        }
        ereignisse
    }
}

impl Umgebung {
    pub fn neu() -> Self {
        Self::mit_engine(LokaleEngine::default())
    }

    pub fn mit_engine(engine: LokaleEngine) -> Self {
        Self::mit_config(engine, RegistryConfig::default())
    }

    pub fn mit_config(engine: LokaleEngine, registry_config: RegistryConfig) -> Self {
        Self::aufbauen(Arc::new(engine.clone()), engine, registry_config)
    }

    /// Dispatcher gegen eine [`HakenEngine`] ueber der lokalen Engine
    pub fn mit_haken(haken: Arc<HakenEngine>) -> Self {
        let lokal = haken.lokal.clone();
        Self::aufbauen(haken, lokal, RegistryConfig::default())
    }

    fn aufbauen(
        media_engine: Arc<dyn MediaEngine>,
        engine: LokaleEngine,
        registry_config: RegistryConfig,
    ) -> Self {
        let state = SignalingState::neu(
            SignalingConfig::default(),
            media_engine,
            registry_config,
            RelaisMetrics::neu().unwrap(),
        );
        let dispatcher = MessageDispatcher::neu(Arc::clone(&state));
        Self {
            state,
            engine,
            dispatcher,
        }
    }

    /// Simuliert eine neue Verbindung
    pub fn peer(&self) -> TestPeer {
        let peer_id = PeerId::new();
        let adresse = "127.0.0.1:50000".parse().unwrap();
        self.state
            .peers
            .peer_reservieren(peer_id, adresse, self.state.config.max_peers)
            .unwrap();
        let rx = self.state.broadcaster.peer_registrieren(peer_id);
        TestPeer {
            ctx: DispatcherContext::neu(peer_id, adresse),
            rx,
            request_id: 0,
        }
    }

    /// Sendet eine Nachricht und fuehrt die Folgeaktionen wie die Verbindung aus
    pub async fn senden(&self, peer: &mut TestPeer, payload: ControlPayload) -> Option<ControlMessage> {
        peer.request_id += 1;
        let nachricht = ControlMessage::new(peer.request_id, payload);
        let antwort = self.dispatcher.dispatch(nachricht, &mut peer.ctx).await;
        if let Some(ref a) = antwort.nachricht {
            assert_eq!(a.request_id, peer.request_id, "Antwort muss requestId spiegeln");
        }
        self.dispatcher.nachlauf_ausfuehren(antwort.nachlauf).await;
        antwort.nachricht
    }

    pub async fn trennen(&self, peer: &TestPeer) {
        self.dispatcher.peer_cleanup(&peer.ctx).await;
    }

    // -----------------------------------------------------------------------
    // Ablauf-Hilfen (erwarten Erfolg)
    // -----------------------------------------------------------------------

    pub async fn beitreten(&self, peer: &mut TestPeer, raum: &str) -> RtpCapabilities {
        let antwort = self
            .senden(
                peer,
                ControlPayload::GetRouterRtpCapabilities(GetRouterRtpCapabilitiesRequest {
                    room_id: RoomId::neu(raum),
                }),
            )
            .await;
        match antwort.map(|a| a.payload) {
            Some(ControlPayload::RouterRtpCapabilities(caps)) => caps,
            anderes => panic!("Erwartet routerRtpCapabilities, erhalten {anderes:?}"),
        }
    }

    pub async fn transport(&self, peer: &mut TestPeer, raum: &str) -> TransportId {
        let antwort = self
            .senden(
                peer,
                ControlPayload::CreateWebRtcTransport(CreateWebRtcTransportRequest {
                    room_id: RoomId::neu(raum),
                    force_tcp: false,
                }),
            )
            .await;
        match antwort.map(|a| a.payload) {
            Some(ControlPayload::WebRtcTransportCreated(t)) => t.id,
            anderes => panic!("Erwartet webRtcTransportCreated, erhalten {anderes:?}"),
        }
    }

    pub async fn verbinden(&self, peer: &mut TestPeer, transport_id: TransportId) -> Option<ControlMessage> {
        self.senden(
            peer,
            ControlPayload::ConnectTransport(ConnectTransportRequest {
                transport_id,
                dtls_parameters: dtls_parameter(),
            }),
        )
        .await
    }

    pub async fn produce_anfrage(
        &self,
        peer: &mut TestPeer,
        raum: &str,
        transport_id: TransportId,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    ) -> Option<ControlMessage> {
        self.senden(
            peer,
            ControlPayload::Produce(ProduceRequest {
                transport_id,
                kind,
                rtp_parameters,
                room_id: RoomId::neu(raum),
            }),
        )
        .await
    }

    pub async fn produzieren(
        &self,
        peer: &mut TestPeer,
        raum: &str,
        transport_id: TransportId,
        kind: MediaKind,
    ) -> ProducerId {
        let parameter = match kind {
            MediaKind::Audio => opus_parameter(),
            MediaKind::Video => vp8_parameter(),
        };
        let antwort = self
            .produce_anfrage(peer, raum, transport_id, kind, parameter)
            .await;
        match antwort.map(|a| a.payload) {
            Some(ControlPayload::Produced(p)) => p.id,
            anderes => panic!("Erwartet produced, erhalten {anderes:?}"),
        }
    }

    pub async fn consume_anfrage(
        &self,
        peer: &mut TestPeer,
        raum: &str,
        transport_id: TransportId,
        producer_id: ProducerId,
        rtp_capabilities: RtpCapabilities,
    ) -> Option<ControlMessage> {
        self.senden(
            peer,
            ControlPayload::Consume(ConsumeRequest {
                transport_id,
                producer_id,
                rtp_capabilities,
                room_id: RoomId::neu(raum),
            }),
        )
        .await
    }

    pub async fn konsumieren(
        &self,
        peer: &mut TestPeer,
        raum: &str,
        transport_id: TransportId,
        producer_id: ProducerId,
        rtp_capabilities: RtpCapabilities,
    ) -> ConsumerId {
        let antwort = self
            .consume_anfrage(peer, raum, transport_id, producer_id, rtp_capabilities)
            .await;
        match antwort.map(|a| a.payload) {
            Some(ControlPayload::Consumed(c)) => c.id,
            anderes => panic!("Erwartet consumed, erhalten {anderes:?}"),
        }
    }

    pub async fn transport_schliessen(&self, peer: &mut TestPeer, transport_id: TransportId) {
        let antwort = self
            .senden(
                peer,
                ControlPayload::CloseTransport(CloseTransportRequest { transport_id }),
            )
            .await;
        assert!(antwort.is_none(), "closeTransport hat keine Antwort");
    }
}

// ---------------------------------------------------------------------------
// HakenEngine
// ---------------------------------------------------------------------------

type Haken = Box<dyn FnOnce() + Send>;

/// Delegiert an eine `LokaleEngine` und fuehrt nach dem ersten erfolgreichen
/// Aufruf einer Operation einmalig einen Haken aus
///
/// So laesst sich die Registry zwischen Engine-Aufruf und Eintrag veraendern.
pub struct HakenEngine {
    pub lokal: LokaleEngine,
    haken: Mutex<Option<(EngineOperation, Haken)>>,
}

impl HakenEngine {
    pub fn neu() -> Arc<Self> {
        Arc::new(Self {
            lokal: LokaleEngine::default(),
            haken: Mutex::new(None),
        })
    }

    pub fn nach(&self, operation: EngineOperation, haken: impl FnOnce() + Send + 'static) {
        *self.haken.lock() = Some((operation, Box::new(haken)));
    }

    fn ausloesen(&self, operation: EngineOperation) {
        let haken = {
            let mut guard = self.haken.lock();
            match guard.take() {
                Some((op, haken)) if op == operation => Some(haken),
                anderes => {
                    *guard = anderes;
                    None
                }
            }
        };
        if let Some(haken) = haken {
            haken();
        }
    }
}

#[async_trait]
impl MediaEngine for HakenEngine {
    async fn routing_kontext_erstellen(
        &self,
        optionen: &RouterOptionen,
    ) -> EngineResult<RoutingContext> {
        let ergebnis = self.lokal.routing_kontext_erstellen(optionen).await?;
        self.ausloesen(EngineOperation::RouterErstellen);
        Ok(ergebnis)
    }

    async fn transport_erstellen(
        &self,
        routing: &RoutingContext,
        optionen: &TransportOptionen,
    ) -> EngineResult<TransportParameter> {
        let ergebnis = self.lokal.transport_erstellen(routing, optionen).await?;
        self.ausloesen(EngineOperation::TransportErstellen);
        Ok(ergebnis)
    }

    async fn transport_verbinden(
        &self,
        transport_id: &TransportId,
        dtls_parameters: &DtlsParameters,
    ) -> EngineResult<()> {
        self.lokal.transport_verbinden(transport_id, dtls_parameters).await?;
        self.ausloesen(EngineOperation::TransportVerbinden);
        Ok(())
    }

    async fn produzieren(
        &self,
        transport_id: &TransportId,
        kind: MediaKind,
        rtp_parameters: &RtpParameters,
    ) -> EngineResult<ProducerHandle> {
        let ergebnis = self.lokal.produzieren(transport_id, kind, rtp_parameters).await?;
        self.ausloesen(EngineOperation::Produzieren);
        Ok(ergebnis)
    }

    async fn kann_konsumieren(
        &self,
        routing: &RoutingContext,
        producer_id: &ProducerId,
        rtp_capabilities: &RtpCapabilities,
    ) -> bool {
        self.lokal
            .kann_konsumieren(routing, producer_id, rtp_capabilities)
            .await
    }

    async fn konsumieren(
        &self,
        transport_id: &TransportId,
        producer_id: &ProducerId,
        rtp_capabilities: &RtpCapabilities,
    ) -> EngineResult<ConsumerHandle> {
        let ergebnis = self
            .lokal
            .konsumieren(transport_id, producer_id, rtp_capabilities)
            .await?;
        self.ausloesen(EngineOperation::Konsumieren);
        Ok(ergebnis)
    }

    async fn fortsetzen(&self, consumer_id: &ConsumerId) -> EngineResult<()> {
        self.lokal.fortsetzen(consumer_id).await?;
        self.ausloesen(EngineOperation::Fortsetzen);
        Ok(())
    }

    async fn schliessen(&self, ressource: Ressource) {
        self.lokal.schliessen(ressource).await;
    }

    fn ereignisse_abonnieren(&self) -> broadcast::Receiver<EngineEreignis> {
        self.lokal.ereignisse_abonnieren()
    }

    fn bereit(&self) -> bool {
        self.lokal.bereit()
    }
}

// ---------------------------------------------------------------------------
// Testdaten
// ---------------------------------------------------------------------------

pub fn opus_parameter() -> RtpParameters {
    RtpParameters {
        codecs: vec![RtpCodecParameters {
            mime_type: "audio/opus".into(),
            payload_type: 111,
            clock_rate: 48000,
            channels: Some(2),
            parameters: Default::default(),
            rtcp_feedback: vec![],
        }],
        ..Default::default()
    }
}

pub fn vp8_parameter() -> RtpParameters {
    RtpParameters {
        codecs: vec![RtpCodecParameters {
            mime_type: "video/VP8".into(),
            payload_type: 96,
            clock_rate: 90000,
            channels: None,
            parameters: Default::default(),
            rtcp_feedback: vec![],
        }],
        ..Default::default()
    }
}

pub fn dtls_parameter() -> DtlsParameters {
    DtlsParameters {
        role: DtlsRole::Client,
        fingerprints: vec![DtlsFingerprint {
            algorithm: "sha-256".into(),
            value: "AB:CD:EF:01:23:45:67:89".into(),
        }],
    }
}

/// Capabilities die nur die Codecs einer Medienart enthalten
pub fn nur(caps: &RtpCapabilities, kind: MediaKind) -> RtpCapabilities {
    RtpCapabilities {
        codecs: caps
            .codecs
            .iter()
            .filter(|c| c.kind == kind)
            .cloned()
            .collect(),
        header_extensions: vec![],
    }
}

/// Entpackt eine Fehler-Antwort
pub fn fehler(antwort: Option<ControlMessage>) -> ErrorResponse {
    match antwort.map(|a| a.payload) {
        Some(ControlPayload::Error(e)) => e,
        anderes => panic!("Erwartet error, erhalten {anderes:?}"),
    }
}
