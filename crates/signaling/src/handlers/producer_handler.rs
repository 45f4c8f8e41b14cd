//! Producer-Handler – produce, closeProducer, getProducers

use relais_core::{RelaisError, Result};
use relais_engine::Ressource;
use relais_protocol::control::{
    CloseProducerRequest, ControlMessage, ControlPayload, GetProducersRequest,
    NewProducerEvent, ProduceRequest, ProducedResponse, ProducerInfo, ProducerListResponse,
};
use std::sync::Arc;

use super::bereinigung::bereinigung_anwenden;
use super::{eigener_transport, raum_binden, raum_pruefen};
use crate::dispatcher::DispatcherContext;
use crate::server_state::SignalingState;

/// Legt einen Producer auf einem eigenen Transport an
///
/// Nach Erfolg erhalten alle anderen Mitglieder des Raums `newProducer`.
pub async fn handle_produce(
    request: ProduceRequest,
    request_id: u32,
    ctx: &mut DispatcherContext,
    state: &Arc<SignalingState>,
) -> Result<ControlMessage> {
    raum_pruefen(ctx, &request.room_id)?;
    request
        .rtp_parameters
        .pruefen(request.kind)
        .map_err(RelaisError::UngueltigeAnfrage)?;

    let transport = eigener_transport(state, ctx.peer_id, &request.transport_id)?;
    if transport.room_id != request.room_id {
        return Err(RelaisError::ungueltig(format!(
            "Transport gehoert zu {}",
            transport.room_id
        )));
    }

    let handle = state
        .engine
        .produzieren(&request.transport_id, request.kind, &request.rtp_parameters)
        .await?;

    let info = match state.registry.producer_erfassen(&request.transport_id, &handle) {
        Ok(info) => info,
        Err(e) => {
            state.engine.schliessen(Ressource::Producer(handle.id)).await;
            return Err(e);
        }
    };
    raum_binden(state, ctx, &info.room_id);

    tracing::info!(
        peer_id = %ctx.peer_id,
        room_id = %info.room_id,
        producer_id = %info.id,
        kind = %info.kind,
        "Producer erstellt"
    );

    let ereignis = ControlMessage::ereignis(ControlPayload::NewProducer(NewProducerEvent {
        producer_id: info.id,
        kind: info.kind,
        peer_id: info.peer_id,
    }));
    let mitglieder = state.registry.mitglieder(&info.room_id);
    let benachrichtigt = state
        .broadcaster
        .an_peers_senden(&mitglieder, Some(ctx.peer_id), &ereignis);
    tracing::debug!(producer_id = %info.id, benachrichtigt, "newProducer verteilt");

    Ok(ControlMessage::new(
        request_id,
        ControlPayload::Produced(ProducedResponse { id: info.id }),
    ))
}

/// Schliesst einen eigenen Producer und alle Consumer die ihn empfangen
///
/// Unbekannte oder fremde Producer werden stillschweigend ignoriert.
pub async fn handle_close_producer(
    request: CloseProducerRequest,
    ctx: &DispatcherContext,
    state: &Arc<SignalingState>,
) {
    match state.registry.producer_info(&request.producer_id) {
        Ok(info) if info.peer_id == ctx.peer_id => {
            let bereinigung = state.registry.producer_schliessen(&request.producer_id);
            bereinigung_anwenden(state, &bereinigung, Some(ctx.peer_id)).await;
        }
        _ => {
            tracing::debug!(
                peer_id = %ctx.peer_id,
                producer_id = %request.producer_id,
                "closeProducer fuer unbekannten Producer ignoriert"
            );
        }
    }
}

/// Listet die Producer der anderen Peers im Raum
pub async fn handle_get_producers(
    request: GetProducersRequest,
    request_id: u32,
    ctx: &DispatcherContext,
    state: &Arc<SignalingState>,
) -> Result<ControlMessage> {
    raum_pruefen(ctx, &request.room_id)?;

    let producers = state
        .registry
        .producers_im_raum(&request.room_id)?
        .into_iter()
        .filter(|p| p.peer_id != ctx.peer_id)
        .map(|p| ProducerInfo {
            producer_id: p.id,
            kind: p.kind,
            peer_id: p.peer_id,
        })
        .collect();

    Ok(ControlMessage::new(
        request_id,
        ControlPayload::ProducerList(ProducerListResponse { producers }),
    ))
}
