//! Media-Engine auf Basis von mediasoup
//!
//! Startet einen mediasoup-Worker und bildet Router, WebRTC-Transports,
//! Producer und Consumer auf die Relais-IDs ab. mediasoup-Objekte schliessen
//! sich beim Drop; `schliessen` entfernt sie daher nur aus den Tabellen.
//!
//! RTP- und DTLS-Typen haben auf beiden Seiten dieselbe JSON-Form und werden
//! ueber `serde_json::Value` umgewandelt.

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use mediasoup::data_structures::{
    DtlsParameters as DtlsParametersMs, DtlsState, IceCandidate as IceCandidateMs, ListenInfo,
    Protocol,
};
use mediasoup::prelude as ms;
use mediasoup::prelude::Transport as _;
use relais_core::{ConsumerId, MediaKind, ProducerId, TransportId};
use relais_protocol::rtp::{
    DtlsParameters, IceCandidate, IceParameters, RtpCapabilities, RtpParameters,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::engine::{
    ConsumerHandle, EngineEreignis, MediaEngine, ProducerHandle, Ressource, RouterOptionen,
    RoutingContext, TransportOptionen, TransportParameter,
};
use crate::error::{EngineError, EngineResult};

const EREIGNIS_KAPAZITAET: usize = 256;

/// Konfiguration der mediasoup-Engine
#[derive(Debug, Clone)]
pub struct MediasoupConfig {
    pub listen_ip: String,
    /// Leer: mediasoup kuendigt `listen_ip` an
    pub announced_ip: String,
    pub rtc_min_port: u16,
    pub rtc_max_port: u16,
    pub enable_udp: bool,
    pub enable_tcp: bool,
    pub prefer_udp: bool,
    pub initial_outgoing_bitrate: u32,
}

struct TransportEintrag {
    router_id: Uuid,
    transport: ms::WebRtcTransport,
}

struct ProducerEintrag {
    transport_id: TransportId,
    router_id: Uuid,
    producer: ms::Producer,
}

struct ConsumerEintrag {
    transport_id: TransportId,
    producer_id: ProducerId,
    consumer: ms::Consumer,
}

struct Inner {
    config: MediasoupConfig,
    listen_ip: IpAddr,
    // Haelt den Worker-Prozess am Leben
    _worker_manager: ms::WorkerManager,
    worker: ms::Worker,
    worker_tot: Arc<AtomicBool>,
    router: DashMap<Uuid, ms::Router>,
    transports: DashMap<TransportId, TransportEintrag>,
    producers: DashMap<ProducerId, ProducerEintrag>,
    consumers: DashMap<ConsumerId, ConsumerEintrag>,
    ereignisse: broadcast::Sender<EngineEreignis>,
}

/// [`MediaEngine`] mit einem mediasoup-Worker
#[derive(Clone)]
pub struct MediasoupEngine {
    inner: Arc<Inner>,
}

impl MediasoupEngine {
    /// Startet den Worker-Prozess
    pub async fn starten(config: MediasoupConfig) -> EngineResult<Self> {
        let listen_ip: IpAddr = config.listen_ip.parse().map_err(|e| {
            EngineError::Abgelehnt(format!("Ungueltige listen_ip '{}': {e}", config.listen_ip))
        })?;

        let worker_manager = ms::WorkerManager::new();
        let worker = worker_manager
            .create_worker(ms::WorkerSettings::default())
            .await
            .map_err(|e| EngineError::Intern(format!("Worker konnte nicht starten: {e}")))?;

        let worker_tot = Arc::new(AtomicBool::new(false));
        {
            let worker_tot = Arc::clone(&worker_tot);
            worker
                .on_dead(move |grund| {
                    worker_tot.store(true, Ordering::SeqCst);
                    tracing::error!(grund = ?grund, "mediasoup-Worker beendet");
                })
                .detach();
        }

        tracing::info!(
            worker_id = %worker.id(),
            listen_ip = %listen_ip,
            announced_ip = %config.announced_ip,
            rtc_min_port = config.rtc_min_port,
            rtc_max_port = config.rtc_max_port,
            "mediasoup-Engine gestartet"
        );

        let (ereignisse, _) = broadcast::channel(EREIGNIS_KAPAZITAET);
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                listen_ip,
                _worker_manager: worker_manager,
                worker,
                worker_tot,
                router: DashMap::new(),
                transports: DashMap::new(),
                producers: DashMap::new(),
                consumers: DashMap::new(),
                ereignisse,
            }),
        })
    }

    fn listen_info(&self, protokoll: Protocol) -> ListenInfo {
        let config = &self.inner.config;
        ListenInfo {
            protocol: protokoll,
            ip: self.inner.listen_ip,
            announced_address: (!config.announced_ip.is_empty())
                .then(|| config.announced_ip.clone()),
            expose_internal_ip: false,
            port: None,
            port_range: Some(config.rtc_min_port..=config.rtc_max_port),
            flags: None,
            send_buffer_size: None,
            recv_buffer_size: None,
        }
    }

    fn router(&self, router_id: &Uuid) -> EngineResult<ms::Router> {
        self.inner
            .router
            .get(router_id)
            .map(|r| r.clone())
            .ok_or_else(|| EngineError::Unbekannt(format!("router:{router_id}")))
    }

    fn transport(&self, transport_id: &TransportId) -> EngineResult<(Uuid, ms::WebRtcTransport)> {
        self.inner
            .transports
            .get(transport_id)
            .map(|t| (t.router_id, t.transport.clone()))
            .ok_or_else(|| EngineError::Unbekannt(transport_id.to_string()))
    }

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

/// Wandelt zwischen Relais- und mediasoup-Typen mit gleicher JSON-Form
fn umwandeln<T: Serialize, U: DeserializeOwned>(wert: &T) -> EngineResult<U> {
    let json = serde_json::to_value(wert)
        .map_err(|e| EngineError::Intern(format!("Serialisierung: {e}")))?;
    serde_json::from_value(json).map_err(|e| EngineError::Abgelehnt(e.to_string()))
}

fn kandidat_umwandeln(kandidat: &IceCandidateMs) -> EngineResult<IceCandidate> {
    let mut json = serde_json::to_value(kandidat)
        .map_err(|e| EngineError::Intern(format!("Serialisierung: {e}")))?;
    adresse_als_ip(&mut json);
    serde_json::from_value(json).map_err(|e| EngineError::Intern(e.to_string()))
}

/// ICE-Kandidaten tragen die Adresse je nach mediasoup-Version als `address`
fn adresse_als_ip(kandidat: &mut serde_json::Value) {
    if let Some(objekt) = kandidat.as_object_mut() {
        if !objekt.contains_key("ip") {
            if let Some(adresse) = objekt.remove("address") {
                objekt.insert("ip".into(), adresse);
            }
        }
    }
}

fn anfrage_fehler(kontext: &str, fehler: impl std::fmt::Display) -> EngineError {
    EngineError::Intern(format!("{kontext}: {fehler}"))
}

#[async_trait]
impl MediaEngine for MediasoupEngine {
    async fn routing_kontext_erstellen(
        &self,
        optionen: &RouterOptionen,
    ) -> EngineResult<RoutingContext> {
        let codecs: Vec<ms::RtpCodecCapability> = umwandeln(&optionen.media_codecs)?;
        let router = self
            .inner
            .worker
            .create_router(ms::RouterOptions::new(codecs))
            .await
            .map_err(|e| anfrage_fehler("Router", e))?;

        let rtp_capabilities: RtpCapabilities = umwandeln(router.rtp_capabilities())?;
        let router_id = Uuid::new_v4();
        self.inner.router.insert(router_id, router);

        tracing::debug!(router_id = %router_id, room_id = %optionen.room_id, "mediasoup-Router erstellt");
        Ok(RoutingContext {
            router_id,
            room_id: optionen.room_id.clone(),
            rtp_capabilities,
        })
    }

    async fn transport_erstellen(
        &self,
        routing: &RoutingContext,
        optionen: &TransportOptionen,
    ) -> EngineResult<TransportParameter> {
        let router = self.router(&routing.router_id)?;
        let config = &self.inner.config;

        let udp = config.enable_udp && !optionen.force_tcp;
        let tcp = config.enable_tcp || optionen.force_tcp;
        let (erstes, zweites) = if udp {
            (Protocol::Udp, tcp.then_some(Protocol::Tcp))
        } else {
            (Protocol::Tcp, None)
        };
        let mut listen_infos = ms::WebRtcTransportListenInfos::new(self.listen_info(erstes));
        if let Some(protokoll) = zweites {
            listen_infos = listen_infos.insert(self.listen_info(protokoll));
        }

        let mut transport_optionen = ms::WebRtcTransportOptions::new(listen_infos);
        transport_optionen.enable_udp = udp;
        transport_optionen.enable_tcp = tcp;
        transport_optionen.prefer_udp = config.prefer_udp && udp;
        transport_optionen.initial_available_outgoing_bitrate = config.initial_outgoing_bitrate;

        let transport = router
            .create_webrtc_transport(transport_optionen)
            .await
            .map_err(|e| anfrage_fehler("WebRTC-Transport", e))?;

        let id = TransportId::new();
        let ice_parameters: IceParameters = umwandeln(transport.ice_parameters())?;
        let ice_candidates = transport
            .ice_candidates()
            .iter()
            .map(kandidat_umwandeln)
            .collect::<EngineResult<Vec<_>>>()?;
        let dtls_parameters: DtlsParameters = umwandeln(&transport.dtls_parameters())?;

        {
            let ereignisse = self.inner.ereignisse.clone();
            transport
                .on_dtls_state_change(move |zustand| {
                    if matches!(zustand, DtlsState::Closed | DtlsState::Failed) {
                        // Fehler nur wenn kein Abonnent existiert
                        let _ = ereignisse.send(EngineEreignis::TransportGeschlossen {
                            transport_id: id,
                            grund: format!("DTLS-Zustand {zustand:?}"),
                        });
                    }
                })
                .detach();
        }

        self.inner.transports.insert(
            id,
            TransportEintrag {
                router_id: routing.router_id,
                transport,
            },
        );

        tracing::debug!(transport_id = %id, router_id = %routing.router_id, force_tcp = optionen.force_tcp, "mediasoup-Transport erstellt");
        Ok(TransportParameter {
            id,
            ice_parameters,
            ice_candidates,
            dtls_parameters,
        })
    }

    async fn transport_verbinden(
        &self,
        transport_id: &TransportId,
        dtls_parameters: &DtlsParameters,
    ) -> EngineResult<()> {
        let (_, transport) = self.transport(transport_id)?;
        let dtls_parameters: DtlsParametersMs = umwandeln(dtls_parameters)?;
        transport
            .connect(ms::WebRtcTransportRemoteParameters { dtls_parameters })
            .await
            .map_err(|e| EngineError::Dtls(e.to_string()))
    }

    async fn produzieren(
        &self,
        transport_id: &TransportId,
        kind: MediaKind,
        rtp_parameters: &RtpParameters,
    ) -> EngineResult<ProducerHandle> {
        let (router_id, transport) = self.transport(transport_id)?;
        let ms_kind: ms::MediaKind = umwandeln(&kind)?;
        let ms_parameter: ms::RtpParameters = umwandeln(rtp_parameters)?;

        let producer = transport
            .produce(ms::ProducerOptions::new(ms_kind, ms_parameter))
            .await
            .map_err(|e| EngineError::Abgelehnt(e.to_string()))?;

        let id = ProducerId::new();
        self.inner.producers.insert(
            id,
            ProducerEintrag {
                transport_id: *transport_id,
                router_id,
                producer,
            },
        );

        tracing::debug!(producer_id = %id, transport_id = %transport_id, kind = %kind, "mediasoup-Producer erstellt");
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
        let Ok(router) = self.router(&routing.router_id) else {
            return false;
        };
        let Some(ms_producer_id) = self
            .inner
            .producers
            .get(producer_id)
            .filter(|p| p.router_id == routing.router_id)
            .map(|p| p.producer.id())
        else {
            return false;
        };
        match umwandeln::<_, ms::RtpCapabilities>(rtp_capabilities) {
            Ok(caps) => router.can_consume(&ms_producer_id, &caps),
            Err(e) => {
                tracing::debug!(fehler = %e, "Client-Capabilities nicht lesbar");
                false
            }
        }
    }

    async fn konsumieren(
        &self,
        transport_id: &TransportId,
        producer_id: &ProducerId,
        rtp_capabilities: &RtpCapabilities,
    ) -> EngineResult<ConsumerHandle> {
        let (_, transport) = self.transport(transport_id)?;
        let (ms_producer_id, kind) = self
            .inner
            .producers
            .get(producer_id)
            .map(|p| (p.producer.id(), p.producer.kind()))
            .ok_or_else(|| EngineError::Unbekannt(producer_id.to_string()))?;
        let caps: ms::RtpCapabilities = umwandeln(rtp_capabilities)?;

        let mut optionen = ms::ConsumerOptions::new(ms_producer_id, caps);
        optionen.paused = true;
        let consumer = transport
            .consume(optionen)
            .await
            .map_err(|e| EngineError::Abgelehnt(e.to_string()))?;

        let rtp_parameters: RtpParameters = umwandeln(consumer.rtp_parameters())?;
        let kind: MediaKind = umwandeln(&kind)?;
        let id = ConsumerId::new();
        self.inner.consumers.insert(
            id,
            ConsumerEintrag {
                transport_id: *transport_id,
                producer_id: *producer_id,
                consumer,
            },
        );

        tracing::debug!(consumer_id = %id, producer_id = %producer_id, "mediasoup-Consumer erstellt (pausiert)");
        Ok(ConsumerHandle {
            id,
            producer_id: *producer_id,
            kind,
            rtp_parameters,
            pausiert: true,
        })
    }

    async fn fortsetzen(&self, consumer_id: &ConsumerId) -> EngineResult<()> {
        let consumer = self
            .inner
            .consumers
            .get(consumer_id)
            .map(|c| c.consumer.clone())
            .ok_or_else(|| EngineError::Unbekannt(consumer_id.to_string()))?;
        consumer
            .resume()
            .await
            .map_err(|e| anfrage_fehler("Consumer fortsetzen", e))
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
            tracing::trace!(ressource = %ressource, "mediasoup-Ressource geschlossen");
        }
    }

    fn ereignisse_abonnieren(&self) -> broadcast::Receiver<EngineEreignis> {
        self.inner.ereignisse.subscribe()
    }

    fn bereit(&self) -> bool {
        !self.inner.worker_tot.load(Ordering::SeqCst) && !self.inner.worker.closed()
    }
}
