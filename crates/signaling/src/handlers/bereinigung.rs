//! Anwenden einer Registry-Bereinigung
//!
//! Schliesst die entfernten Engine-Ressourcen und benachrichtigt betroffene
//! Peers. Genutzt von closeTransport, closeProducer, dem Trennen einer
//! Verbindung und von engine-seitig geschlossenen Transports.

use relais_core::PeerId;
use relais_protocol::control::{
    ConsumerClosedEvent, ControlMessage, ControlPayload, ProducerClosedEvent,
};
use relais_session::Bereinigung;

use crate::server_state::SignalingState;

/// Wendet eine Bereinigung an
///
/// `ausloeser` ist der Peer der die Entfernung angestossen hat; er bekommt
/// keine Ereignisse. `None` bei engine-seitigem Schliessen.
pub async fn bereinigung_anwenden(
    state: &SignalingState,
    bereinigung: &Bereinigung,
    ausloeser: Option<PeerId>,
) {
    if bereinigung.ist_leer() {
        return;
    }

    for ressource in bereinigung.ressourcen() {
        state.engine.schliessen(ressource).await;
    }

    if !bereinigung.producers.is_empty() {
        let mitglieder = bereinigung
            .room_id
            .as_ref()
            .map(|room_id| state.registry.mitglieder(room_id))
            .unwrap_or_default();
        for producer in &bereinigung.producers {
            let ereignis =
                ControlMessage::ereignis(ControlPayload::ProducerClosed(ProducerClosedEvent {
                    producer_id: producer.id,
                }));
            state
                .broadcaster
                .an_peers_senden(&mitglieder, ausloeser, &ereignis);
        }
    }

    for consumer in &bereinigung.consumers {
        if Some(consumer.peer_id) == ausloeser {
            continue;
        }
        let ereignis = ControlMessage::ereignis(ControlPayload::ConsumerClosed(ConsumerClosedEvent {
            consumer_id: consumer.id,
            producer_id: consumer.producer_id,
        }));
        state.broadcaster.an_peer_senden(&consumer.peer_id, ereignis);
    }

    tracing::debug!(
        room_id = ?bereinigung.room_id,
        transports = bereinigung.transports.len(),
        producers = bereinigung.producers.len(),
        consumers = bereinigung.consumers.len(),
        "Bereinigung angewendet"
    );
}
