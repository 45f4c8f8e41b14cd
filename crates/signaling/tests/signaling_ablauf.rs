//! Integrationstests fuer die Signaling-Nachrichten (Dispatcher + LokaleEngine)

mod common;

use common::*;
use relais_core::{MediaKind, ProducerId, RoomId, TransportId};
use relais_engine::{EngineOperation, LokaleEngine, LokaleEngineConfig};
use relais_protocol::control::*;
use relais_protocol::rtp::RtpParameters;
use relais_protocol::wire::Eingang;
use relais_signaling::{DispatcherContext, MessageDispatcher};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Raeume
// ---------------------------------------------------------------------------

#[tokio::test]
async fn raum_42_zwei_peers_ein_router() {
    let u = Umgebung::neu();
    let mut a = u.peer();
    let mut b = u.peer();

    // A nennt den Raum als Zahl, B als String
    let json = r#"{"requestId": 1, "payload": {"type": "getRouterRtpCapabilities", "roomId": 42}}"#;
    let antwort = u
        .dispatcher
        .dispatch(ControlMessage::from_json(json).unwrap(), &mut a.ctx)
        .await;
    let caps_a = match antwort.nachricht.map(|n| n.payload) {
        Some(ControlPayload::RouterRtpCapabilities(caps)) => caps,
        anderes => panic!("Erwartet routerRtpCapabilities, erhalten {anderes:?}"),
    };
    let caps_b = u.beitreten(&mut b, "42").await;

    assert_eq!(caps_a, caps_b);
    assert_eq!(u.engine.router_erstellt_anzahl(), 1);
    assert_eq!(u.state.registry.mitglieder(&RoomId::neu("42")).len(), 2);
    assert_eq!(a.ctx.raum, Some(RoomId::neu("42")));
    assert_eq!(
        u.state.peers.peer(&b.id()).unwrap().room_id,
        Some(RoomId::neu("42"))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn gleichzeitige_capability_anfragen_ein_router() {
    let engine = LokaleEngine::neu(LokaleEngineConfig {
        kuenstliche_latenz_ms: 20,
        ..Default::default()
    });
    let u = Umgebung::mit_engine(engine);

    let mut tasks = Vec::new();
    for i in 0..16u32 {
        let state = Arc::clone(&u.state);
        tasks.push(tokio::spawn(async move {
            let dispatcher = MessageDispatcher::neu(state);
            let mut ctx = DispatcherContext::neu(
                relais_core::PeerId::new(),
                "127.0.0.1:1".parse().unwrap(),
            );
            let anfrage = ControlMessage::new(
                i + 1,
                ControlPayload::GetRouterRtpCapabilities(GetRouterRtpCapabilitiesRequest {
                    room_id: RoomId::neu("gleichzeitig"),
                }),
            );
            match dispatcher.dispatch(anfrage, &mut ctx).await.nachricht.map(|n| n.payload) {
                Some(ControlPayload::RouterRtpCapabilities(caps)) => caps,
                anderes => panic!("Erwartet routerRtpCapabilities, erhalten {anderes:?}"),
            }
        }));
    }

    let mut alle = Vec::new();
    for task in tasks {
        alle.push(task.await.unwrap());
    }

    assert_eq!(u.engine.router_erstellt_anzahl(), 1);
    assert!(alle.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(
        u.state.registry.mitglieder(&RoomId::neu("gleichzeitig")).len(),
        16
    );
}

#[tokio::test]
async fn anderer_raum_ist_ungueltig() {
    let u = Umgebung::neu();
    let mut a = u.peer();
    u.beitreten(&mut a, "eins").await;

    let antwort = u
        .senden(
            &mut a,
            ControlPayload::GetRouterRtpCapabilities(GetRouterRtpCapabilitiesRequest {
                room_id: RoomId::neu("zwei"),
            }),
        )
        .await;
    assert_eq!(fehler(antwort).code, ErrorCode::InvalidRequest);
    assert!(!u.state.registry.raum_existiert(&RoomId::neu("zwei")));
    assert_eq!(u.engine.router_erstellt_anzahl(), 1);
}

#[tokio::test]
async fn leere_raum_id_ist_ungueltig() {
    let u = Umgebung::neu();
    let mut a = u.peer();
    let antwort = u
        .senden(
            &mut a,
            ControlPayload::GetRouterRtpCapabilities(GetRouterRtpCapabilitiesRequest {
                room_id: RoomId::neu("  "),
            }),
        )
        .await;
    assert_eq!(fehler(antwort).code, ErrorCode::InvalidRequest);
    assert_eq!(u.engine.router_erstellt_anzahl(), 0);
}

#[tokio::test]
async fn router_fehler_legt_keinen_raum_an() {
    let u = Umgebung::neu();
    u.engine.fehler_injizieren(EngineOperation::RouterErstellen);
    let mut a = u.peer();

    let antwort = u
        .senden(
            &mut a,
            ControlPayload::GetRouterRtpCapabilities(GetRouterRtpCapabilitiesRequest {
                room_id: RoomId::neu("kaputt"),
            }),
        )
        .await;
    assert_eq!(fehler(antwort).code, ErrorCode::EngineError);
    assert!(a.ctx.raum.is_none());
    assert_eq!(u.state.registry.statistik().mitglieder, 0);

    // Nach Behebung funktioniert derselbe Raum
    u.engine.fehler_entfernen(EngineOperation::RouterErstellen);
    u.beitreten(&mut a, "kaputt").await;
    assert_eq!(u.engine.router_erstellt_anzahl(), 1);
}

// ---------------------------------------------------------------------------
// Transports
// ---------------------------------------------------------------------------

#[tokio::test]
async fn transport_ohne_raum_ist_room_not_found() {
    let u = Umgebung::neu();
    let mut a = u.peer();
    let antwort = u
        .senden(
            &mut a,
            ControlPayload::CreateWebRtcTransport(CreateWebRtcTransportRequest {
                room_id: RoomId::neu("unbekannt"),
                force_tcp: false,
            }),
        )
        .await;
    assert_eq!(fehler(antwort).code, ErrorCode::RoomNotFound);
    assert_eq!(u.engine.transport_anzahl(), 0);
    assert_eq!(a.ctx.raum, None);
}

#[tokio::test]
async fn transport_mit_force_tcp_hat_nur_tcp_kandidaten() {
    let u = Umgebung::neu();
    let mut a = u.peer();
    u.beitreten(&mut a, "tcp").await;

    let antwort = u
        .senden(
            &mut a,
            ControlPayload::CreateWebRtcTransport(CreateWebRtcTransportRequest {
                room_id: RoomId::neu("tcp"),
                force_tcp: true,
            }),
        )
        .await;
    match antwort.map(|a| a.payload) {
        Some(ControlPayload::WebRtcTransportCreated(t)) => {
            assert!(!t.ice_candidates.is_empty());
            assert!(t
                .ice_candidates
                .iter()
                .all(|c| c.protocol == relais_protocol::rtp::TransportProtocol::Tcp));
        }
        anderes => panic!("Erwartet webRtcTransportCreated, erhalten {anderes:?}"),
    }
}

#[tokio::test]
async fn transport_schliessen_dann_verbinden_ist_nicht_gefunden() {
    let u = Umgebung::neu();
    let mut a = u.peer();
    u.beitreten(&mut a, "r").await;
    let t = u.transport(&mut a, "r").await;

    u.transport_schliessen(&mut a, t).await;
    assert!(!u.engine.hat_transport(&t));

    let f = fehler(u.verbinden(&mut a, t).await);
    assert_eq!(f.code, ErrorCode::TransportNotFound);
    assert_eq!(f.message, "ERROR");
}

#[tokio::test]
async fn verbinden_ist_idempotent() {
    let u = Umgebung::neu();
    let mut a = u.peer();
    u.beitreten(&mut a, "r").await;
    let t = u.transport(&mut a, "r").await;

    for _ in 0..2 {
        match u.verbinden(&mut a, t).await.map(|n| n.payload) {
            Some(ControlPayload::TransportConnected(r)) => {
                assert_eq!(r.status, ConnectStatus::Success)
            }
            anderes => panic!("Erwartet transportConnected, erhalten {anderes:?}"),
        }
    }
    assert_eq!(
        u.state.registry.transport_info(&t).unwrap().zustand,
        relais_session::TransportZustand::Connected
    );
}

#[tokio::test]
async fn verbinden_ohne_fingerprint_ist_ungueltig() {
    let u = Umgebung::neu();
    let mut a = u.peer();
    u.beitreten(&mut a, "r").await;
    let t = u.transport(&mut a, "r").await;

    let mut dtls = dtls_parameter();
    dtls.fingerprints.clear();
    let antwort = u
        .senden(
            &mut a,
            ControlPayload::ConnectTransport(ConnectTransportRequest {
                transport_id: t,
                dtls_parameters: dtls,
            }),
        )
        .await;
    assert_eq!(fehler(antwort).code, ErrorCode::InvalidRequest);
    assert_eq!(
        u.state.registry.transport_info(&t).unwrap().zustand,
        relais_session::TransportZustand::Pending
    );
}

#[tokio::test]
async fn dtls_fehler_der_engine_ist_engine_error() {
    let u = Umgebung::neu();
    let mut a = u.peer();
    u.beitreten(&mut a, "r").await;
    let t = u.transport(&mut a, "r").await;

    u.engine.fehler_injizieren(EngineOperation::TransportVerbinden);
    assert_eq!(fehler(u.verbinden(&mut a, t).await).code, ErrorCode::EngineError);
    assert_eq!(
        u.state.registry.transport_info(&t).unwrap().zustand,
        relais_session::TransportZustand::Pending
    );
}

#[tokio::test]
async fn fremder_transport_ist_nicht_gefunden() {
    let u = Umgebung::neu();
    let mut a = u.peer();
    let mut b = u.peer();
    u.beitreten(&mut a, "r").await;
    u.beitreten(&mut b, "r").await;
    let t_a = u.transport(&mut a, "r").await;

    let f = fehler(
        u.produce_anfrage(&mut b, "r", t_a, MediaKind::Audio, opus_parameter())
            .await,
    );
    assert_eq!(f.code, ErrorCode::TransportNotFound);
    assert_eq!(f.message, "Transport not found");

    let f = fehler(u.verbinden(&mut b, t_a).await);
    assert_eq!(f.code, ErrorCode::TransportNotFound);

    // Fremdes closeTransport wird ignoriert
    u.transport_schliessen(&mut b, t_a).await;
    assert!(u.engine.hat_transport(&t_a));
}

#[tokio::test]
async fn transport_engine_fehler_laesst_registry_unveraendert() {
    let u = Umgebung::neu();
    let mut a = u.peer();
    u.beitreten(&mut a, "r").await;
    u.engine.fehler_injizieren(EngineOperation::TransportErstellen);

    let antwort = u
        .senden(
            &mut a,
            ControlPayload::CreateWebRtcTransport(CreateWebRtcTransportRequest {
                room_id: RoomId::neu("r"),
                force_tcp: false,
            }),
        )
        .await;
    assert_eq!(fehler(antwort).code, ErrorCode::EngineError);
    assert_eq!(u.state.registry.statistik().transports, 0);
}

#[tokio::test]
async fn fehlgeschlagener_erster_transport_bindet_nicht() {
    let u = Umgebung::neu();
    let mut a = u.peer();
    let mut b = u.peer();
    u.beitreten(&mut a, "r").await;
    u.engine.fehler_injizieren(EngineOperation::TransportErstellen);

    // B beginnt direkt mit createWebRtcTransport
    let antwort = u
        .senden(
            &mut b,
            ControlPayload::CreateWebRtcTransport(CreateWebRtcTransportRequest {
                room_id: RoomId::neu("r"),
                force_tcp: false,
            }),
        )
        .await;
    assert_eq!(fehler(antwort).code, ErrorCode::EngineError);
    assert!(!u.state.registry.mitglieder(&RoomId::neu("r")).contains(&b.id()));
    assert_eq!(b.ctx.raum, None);
    assert_eq!(u.state.peers.peer(&b.id()).and_then(|e| e.room_id), None);

    u.engine.fehler_entfernen(EngineOperation::TransportErstellen);
    u.beitreten(&mut b, "anderer").await;
    assert_eq!(b.ctx.raum, Some(RoomId::neu("anderer")));
}

#[tokio::test]
async fn erster_transport_macht_zum_mitglied() {
    let u = Umgebung::neu();
    let mut a = u.peer();
    let mut b = u.peer();
    u.beitreten(&mut a, "r").await;

    u.transport(&mut b, "r").await;
    assert!(u.state.registry.mitglieder(&RoomId::neu("r")).contains(&b.id()));
    assert_eq!(b.ctx.raum, Some(RoomId::neu("r")));
}

// ---------------------------------------------------------------------------
// Producer
// ---------------------------------------------------------------------------

#[tokio::test]
async fn produce_benachrichtigt_nur_andere_mitglieder() {
    let u = Umgebung::neu();
    let mut a = u.peer();
    let mut b = u.peer();
    let mut fremd = u.peer();
    u.beitreten(&mut a, "r").await;
    u.beitreten(&mut b, "r").await;
    u.beitreten(&mut fremd, "anderer").await;

    let t = u.transport(&mut a, "r").await;
    let p = u.produzieren(&mut a, "r", t, MediaKind::Audio).await;

    assert!(a.ereignisse().is_empty(), "Ausloeser bekommt kein newProducer");
    assert!(fremd.ereignisse().is_empty());
    match b.ereignisse().as_slice() {
        [ControlPayload::NewProducer(e)] => {
            assert_eq!(e.producer_id, p);
            assert_eq!(e.kind, MediaKind::Audio);
            assert_eq!(e.peer_id, a.id());
        }
        anderes => panic!("Erwartet ein newProducer, erhalten {anderes:?}"),
    }
}

#[tokio::test]
async fn produce_mit_ungueltigen_parametern() {
    let u = Umgebung::neu();
    let mut a = u.peer();
    u.beitreten(&mut a, "r").await;
    let t = u.transport(&mut a, "r").await;

    // Kein Codec
    let antwort = u
        .produce_anfrage(&mut a, "r", t, MediaKind::Audio, RtpParameters::default())
        .await;
    assert_eq!(fehler(antwort).code, ErrorCode::InvalidRequest);

    // Video-Codec als Audio
    let antwort = u
        .produce_anfrage(&mut a, "r", t, MediaKind::Audio, vp8_parameter())
        .await;
    assert_eq!(fehler(antwort).code, ErrorCode::InvalidRequest);

    assert_eq!(u.engine.producer_anzahl(), 0);
    assert_eq!(u.state.registry.statistik().producers, 0);
}

#[tokio::test]
async fn produce_engine_fehler_laesst_registry_unveraendert() {
    let u = Umgebung::neu();
    let mut a = u.peer();
    let mut b = u.peer();
    u.beitreten(&mut a, "r").await;
    u.beitreten(&mut b, "r").await;
    let t = u.transport(&mut a, "r").await;

    u.engine.fehler_injizieren(EngineOperation::Produzieren);
    let antwort = u
        .produce_anfrage(&mut a, "r", t, MediaKind::Audio, opus_parameter())
        .await;
    assert_eq!(fehler(antwort).code, ErrorCode::EngineError);
    assert_eq!(u.state.registry.statistik().producers, 0);
    assert!(b.ereignisse().is_empty());
}

#[tokio::test]
async fn get_producers_liefert_nur_fremde() {
    let u = Umgebung::neu();
    let mut a = u.peer();
    let mut b = u.peer();
    u.beitreten(&mut a, "r").await;
    u.beitreten(&mut b, "r").await;
    let t_a = u.transport(&mut a, "r").await;
    let t_b = u.transport(&mut b, "r").await;
    let p_a = u.produzieren(&mut a, "r", t_a, MediaKind::Video).await;
    u.produzieren(&mut b, "r", t_b, MediaKind::Audio).await;

    // Spaet beitretender Peer sieht beide, B nur den von A
    let mut c = u.peer();
    u.beitreten(&mut c, "r").await;
    let liste = |antwort: Option<ControlMessage>| match antwort.map(|n| n.payload) {
        Some(ControlPayload::ProducerList(l)) => l.producers,
        anderes => panic!("Erwartet producerList, erhalten {anderes:?}"),
    };
    let anfrage = || {
        ControlPayload::GetProducers(GetProducersRequest {
            room_id: RoomId::neu("r"),
        })
    };

    assert_eq!(liste(u.senden(&mut c, anfrage()).await).len(), 2);
    let fuer_b = liste(u.senden(&mut b, anfrage()).await);
    assert_eq!(
        fuer_b,
        vec![ProducerInfo {
            producer_id: p_a,
            kind: MediaKind::Video,
            peer_id: a.id(),
        }]
    );
}

#[tokio::test]
async fn get_producers_unbekannter_raum() {
    let u = Umgebung::neu();
    let mut a = u.peer();
    let antwort = u
        .senden(
            &mut a,
            ControlPayload::GetProducers(GetProducersRequest {
                room_id: RoomId::neu("leer"),
            }),
        )
        .await;
    assert_eq!(fehler(antwort).code, ErrorCode::RoomNotFound);
}

#[tokio::test]
async fn close_producer_entfernt_consumer() {
    let u = Umgebung::neu();
    let mut a = u.peer();
    let mut b = u.peer();
    u.beitreten(&mut a, "r").await;
    let caps = u.beitreten(&mut b, "r").await;
    let t_a = u.transport(&mut a, "r").await;
    let t_b = u.transport(&mut b, "r").await;
    let p = u.produzieren(&mut a, "r", t_a, MediaKind::Audio).await;
    let c = u.konsumieren(&mut b, "r", t_b, p, caps).await;
    b.ereignisse();

    // Fremdes closeProducer wird ignoriert
    let antwort = u
        .senden(
            &mut b,
            ControlPayload::CloseProducer(CloseProducerRequest { producer_id: p }),
        )
        .await;
    assert!(antwort.is_none());
    assert!(u.engine.hat_producer(&p));

    let antwort = u
        .senden(
            &mut a,
            ControlPayload::CloseProducer(CloseProducerRequest { producer_id: p }),
        )
        .await;
    assert!(antwort.is_none());
    assert!(!u.engine.hat_producer(&p));
    assert!(u.state.registry.consumer_info(&c).is_none());
    assert!(u.engine.hat_transport(&t_a), "Transport bleibt bestehen");

    let ereignisse = b.ereignisse();
    assert!(ereignisse
        .iter()
        .any(|e| matches!(e, ControlPayload::ProducerClosed(pc) if pc.producer_id == p)));
    assert!(ereignisse.iter().any(
        |e| matches!(e, ControlPayload::ConsumerClosed(cc) if cc.consumer_id == c && cc.producer_id == p)
    ));
    assert!(a.ereignisse().is_empty());
}

// ---------------------------------------------------------------------------
// Consumer
// ---------------------------------------------------------------------------

#[tokio::test]
async fn consume_wird_nach_antwort_fortgesetzt() {
    let u = Umgebung::neu();
    let mut a = u.peer();
    let mut b = u.peer();
    u.beitreten(&mut a, "r").await;
    let caps = u.beitreten(&mut b, "r").await;
    let t_a = u.transport(&mut a, "r").await;
    let t_b = u.transport(&mut b, "r").await;
    let p = u.produzieren(&mut a, "r", t_a, MediaKind::Audio).await;

    // Ohne Nachlauf bleibt der Consumer pausiert
    let anfrage = ControlMessage::new(
        77,
        ControlPayload::Consume(ConsumeRequest {
            transport_id: t_b,
            producer_id: p,
            rtp_capabilities: caps,
            room_id: RoomId::neu("r"),
        }),
    );
    let antwort = u.dispatcher.dispatch(anfrage, &mut b.ctx).await;
    let consumer_id = match antwort.nachricht.as_ref().map(|n| &n.payload) {
        Some(ControlPayload::Consumed(c)) => {
            assert_eq!(c.producer_id, p);
            assert_eq!(c.kind, MediaKind::Audio);
            assert_eq!(c.rtp_parameters.codecs[0].mime_type, "audio/opus");
            c.id
        }
        anderes => panic!("Erwartet consumed, erhalten {anderes:?}"),
    };
    assert_eq!(u.engine.consumer_pausiert(&consumer_id), Some(true));
    assert!(u.state.registry.consumer_info(&consumer_id).unwrap().pausiert);

    u.dispatcher.nachlauf_ausfuehren(antwort.nachlauf).await;
    assert_eq!(u.engine.consumer_pausiert(&consumer_id), Some(false));
    assert!(!u.state.registry.consumer_info(&consumer_id).unwrap().pausiert);
}

#[tokio::test]
async fn inkompatibler_consume_legt_nichts_an() {
    let u = Umgebung::neu();
    let mut a = u.peer();
    let mut b = u.peer();
    u.beitreten(&mut a, "r").await;
    let caps = u.beitreten(&mut b, "r").await;
    let t_a = u.transport(&mut a, "r").await;
    let t_b = u.transport(&mut b, "r").await;
    let p = u.produzieren(&mut a, "r", t_a, MediaKind::Audio).await;

    let f = fehler(
        u.consume_anfrage(&mut b, "r", t_b, p, nur(&caps, MediaKind::Video))
            .await,
    );
    assert_eq!(f.code, ErrorCode::CapabilityMismatch);
    assert_eq!(f.message, "Cannot consume");
    assert_eq!(u.engine.consumer_anzahl(), 0);
    assert_eq!(u.state.registry.statistik().consumers, 0);

    // Spaeteres Schliessen hat nichts zusaetzlich zu bereinigen
    u.transport_schliessen(&mut b, t_b).await;
    assert_eq!(u.engine.consumer_anzahl(), 0);
    assert_eq!(u.state.registry.statistik().transports, 1);
    assert_eq!(u.state.registry.statistik().producers, 1);
    assert!(a.ereignisse().is_empty());
}

#[tokio::test]
async fn consume_fehlerreihenfolge() {
    let u = Umgebung::neu();
    let mut a = u.peer();
    let mut b = u.peer();
    u.beitreten(&mut a, "r").await;
    let caps = u.beitreten(&mut b, "r").await;
    let t_a = u.transport(&mut a, "r").await;
    let t_b = u.transport(&mut b, "r").await;
    let p = u.produzieren(&mut a, "r", t_a, MediaKind::Audio).await;

    // Unbekannter Transport vor unbekanntem Producer
    let f = fehler(
        u.consume_anfrage(&mut b, "r", TransportId::new(), ProducerId::new(), caps.clone())
            .await,
    );
    assert_eq!(f.code, ErrorCode::TransportNotFound);
    assert_eq!(f.message, "Transport not found");

    // Unbekannter Producer vor inkompatiblen Capabilities
    let f = fehler(
        u.consume_anfrage(&mut b, "r", t_b, ProducerId::new(), nur(&caps, MediaKind::Video))
            .await,
    );
    assert_eq!(f.code, ErrorCode::ProducerNotFound);

    // Producer aus einem anderen Raum ist nicht auffindbar
    let mut c = u.peer();
    u.beitreten(&mut c, "anderer").await;
    let t_c = u.transport(&mut c, "anderer").await;
    let f = fehler(u.consume_anfrage(&mut c, "anderer", t_c, p, caps).await);
    assert_eq!(f.code, ErrorCode::ProducerNotFound);
}

#[tokio::test]
async fn consume_engine_fehler_laesst_registry_unveraendert() {
    let u = Umgebung::neu();
    let mut a = u.peer();
    let mut b = u.peer();
    u.beitreten(&mut a, "r").await;
    let caps = u.beitreten(&mut b, "r").await;
    let t_a = u.transport(&mut a, "r").await;
    let t_b = u.transport(&mut b, "r").await;
    let p = u.produzieren(&mut a, "r", t_a, MediaKind::Audio).await;

    u.engine.fehler_injizieren(EngineOperation::Konsumieren);
    let f = fehler(u.consume_anfrage(&mut b, "r", t_b, p, caps).await);
    assert_eq!(f.code, ErrorCode::EngineError);
    assert_eq!(u.state.registry.statistik().consumers, 0);
}

// ---------------------------------------------------------------------------
// Protokoll
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ping_pong() {
    let u = Umgebung::neu();
    let mut a = u.peer();

    match u
        .senden(&mut a, ControlPayload::Ping(PingMessage { timestamp_ms: 1234 }))
        .await
        .map(|n| n.payload)
    {
        Some(ControlPayload::Pong(p)) => {
            assert_eq!(p.echo_timestamp_ms, 1234);
            assert!(p.server_timestamp_ms > 0);
        }
        anderes => panic!("Erwartet pong, erhalten {anderes:?}"),
    }

    let antwort = u
        .senden(
            &mut a,
            ControlPayload::Pong(PongMessage {
                echo_timestamp_ms: 1,
                server_timestamp_ms: 2,
            }),
        )
        .await;
    assert!(antwort.is_none());
}

#[tokio::test]
async fn server_nachricht_vom_client_ist_ungueltig() {
    let u = Umgebung::neu();
    let mut a = u.peer();
    let antwort = u
        .senden(
            &mut a,
            ControlPayload::Produced(ProducedResponse {
                id: ProducerId::new(),
            }),
        )
        .await;
    assert_eq!(fehler(antwort).code, ErrorCode::InvalidRequest);
}

#[tokio::test]
async fn kaputter_frame_wird_beantwortet_ohne_zustand() {
    let u = Umgebung::neu();

    let eingang = Eingang::aus_bytes(br#"{"requestId": 5, "payload": {"type": "teleport"}}"#);
    let antwort = match eingang {
        Eingang::Ungueltig { request_id, grund } => u.dispatcher.ungueltig(request_id, &grund),
        Eingang::Nachricht(n) => panic!("Unerwartet gueltig: {n:?}"),
    };
    assert_eq!(antwort.request_id, 5);
    assert!(matches!(
        antwort.payload,
        ControlPayload::Error(ErrorResponse { code: ErrorCode::InvalidRequest, .. })
    ));
    assert_eq!(u.state.registry.statistik(), Default::default());
}

#[tokio::test]
async fn anfragen_werden_gezaehlt() {
    let u = Umgebung::neu();
    let mut a = u.peer();
    u.beitreten(&mut a, "r").await;
    fehler(
        u.senden(
            &mut a,
            ControlPayload::CreateWebRtcTransport(CreateWebRtcTransportRequest {
                room_id: RoomId::neu("x"),
                force_tcp: false,
            }),
        )
        .await,
    );

    let zaehler = &u.state.metriken.signaling_requests_total;
    assert_eq!(
        zaehler
            .with_label_values(&["getRouterRtpCapabilities", "ok"])
            .get(),
        1
    );
    assert_eq!(
        zaehler
            .with_label_values(&["createWebRtcTransport", "INVALID_REQUEST"])
            .get(),
        1
    );

    u.state.metriken_aktualisieren();
    assert_eq!(u.state.metriken.rooms_active.get(), 1);
    assert_eq!(u.state.metriken.connected_peers.get(), 1);
}
