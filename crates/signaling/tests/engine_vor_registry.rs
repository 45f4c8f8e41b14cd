//! Engine-Aufruf gelingt, der Registry-Eintrag danach nicht
//!
//! Die `HakenEngine` veraendert die Registry direkt nach dem erfolgreichen
//! Engine-Aufruf. Der Handler muss die frisch erzeugte Engine-Ressource dann
//! wieder schliessen.

mod common;

use common::*;
use relais_core::{MediaKind, RoomId};
use relais_engine::EngineOperation;
use relais_protocol::control::*;

#[tokio::test]
async fn transport_ohne_raum_wird_in_engine_geschlossen() {
    let haken = HakenEngine::neu();
    let u = Umgebung::mit_haken(haken.clone());
    let mut a = u.peer();
    let mut b = u.peer();
    u.beitreten(&mut a, "r").await;

    // A verlaesst den Raum, bevor B's Transport eingetragen wird
    let registry = u.state.registry.clone();
    let a_id = a.id();
    haken.nach(EngineOperation::TransportErstellen, move || {
        registry.raum_verlassen(&RoomId::neu("r"), a_id);
    });

    let antwort = u
        .senden(
            &mut b,
            ControlPayload::CreateWebRtcTransport(CreateWebRtcTransportRequest {
                room_id: RoomId::neu("r"),
                force_tcp: false,
            }),
        )
        .await;
    assert_eq!(fehler(antwort).code, ErrorCode::RoomNotFound);
    assert_eq!(u.engine.transport_anzahl(), 0);
    assert_eq!(u.state.registry.statistik().transports, 0);
    assert!(!u.state.registry.raum_existiert(&RoomId::neu("r")));
    assert_eq!(b.ctx.raum, None);
}

#[tokio::test]
async fn producer_auf_geschlossenem_transport_wird_in_engine_geschlossen() {
    let haken = HakenEngine::neu();
    let u = Umgebung::mit_haken(haken.clone());
    let mut a = u.peer();
    let mut b = u.peer();
    u.beitreten(&mut a, "r").await;
    u.beitreten(&mut b, "r").await;
    let t = u.transport(&mut a, "r").await;

    let registry = u.state.registry.clone();
    haken.nach(EngineOperation::Produzieren, move || {
        registry.transport_schliessen(&t);
    });

    let antwort = u
        .produce_anfrage(&mut a, "r", t, MediaKind::Audio, opus_parameter())
        .await;
    assert_eq!(fehler(antwort).code, ErrorCode::TransportNotFound);
    assert_eq!(u.engine.producer_anzahl(), 0);
    assert_eq!(u.state.registry.statistik().producers, 0);
    assert!(
        b.ereignisse().is_empty(),
        "kein newProducer fuer einen nie eingetragenen Producer"
    );
}

#[tokio::test]
async fn consumer_auf_geschlossenem_transport_wird_in_engine_geschlossen() {
    let haken = HakenEngine::neu();
    let u = Umgebung::mit_haken(haken.clone());
    let mut a = u.peer();
    let mut b = u.peer();
    u.beitreten(&mut a, "r").await;
    let caps = u.beitreten(&mut b, "r").await;
    let t_a = u.transport(&mut a, "r").await;
    let t_b = u.transport(&mut b, "r").await;
    let p = u.produzieren(&mut a, "r", t_a, MediaKind::Audio).await;
    b.ereignisse();

    let registry = u.state.registry.clone();
    haken.nach(EngineOperation::Konsumieren, move || {
        registry.transport_schliessen(&t_b);
    });

    let antwort = u.consume_anfrage(&mut b, "r", t_b, p, caps).await;
    assert_eq!(fehler(antwort).code, ErrorCode::TransportNotFound);
    assert_eq!(u.engine.consumer_anzahl(), 0);
    assert_eq!(u.state.registry.statistik().consumers, 0);

    // Der Producer von A bleibt unberuehrt
    assert!(u.engine.hat_producer(&p));
    assert_eq!(u.state.registry.statistik().producers, 1);
}
