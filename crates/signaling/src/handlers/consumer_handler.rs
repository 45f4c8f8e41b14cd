//! Consumer-Handler – consume

use relais_core::{RelaisError, Result};
use relais_engine::Ressource;
use relais_protocol::control::{ConsumeRequest, ConsumedResponse, ControlMessage, ControlPayload};
use std::sync::Arc;

use super::{eigener_transport, raum_pruefen};
use crate::dispatcher::{Antwort, DispatcherContext, Folgeaktion};
use crate::server_state::SignalingState;

/// Legt einen pausierten Consumer fuer einen Producer im selben Raum an
///
/// Fehlerreihenfolge: Transport, Producer, Capabilities. Der Consumer wird
/// erst nach dem Senden der Antwort fortgesetzt.
pub async fn handle_consume(
    request: ConsumeRequest,
    request_id: u32,
    ctx: &DispatcherContext,
    state: &Arc<SignalingState>,
) -> Result<Antwort> {
    raum_pruefen(ctx, &request.room_id)?;

    let transport = eigener_transport(state, ctx.peer_id, &request.transport_id)?;
    let producer_raum = state.registry.raum_fuer_producer(&request.producer_id)?;
    if producer_raum != transport.room_id {
        return Err(RelaisError::ProducerNichtGefunden(request.producer_id));
    }

    let routing = state.registry.routing_kontext(&transport.room_id)?;
    let kompatibel = state
        .engine
        .kann_konsumieren(&routing, &request.producer_id, &request.rtp_capabilities)
        .await;
    if !kompatibel {
        tracing::debug!(
            peer_id = %ctx.peer_id,
            producer_id = %request.producer_id,
            "Capabilities nicht kompatibel"
        );
        return Err(RelaisError::CapabilityMismatch(request.producer_id));
    }

    let handle = state
        .engine
        .konsumieren(
            &request.transport_id,
            &request.producer_id,
            &request.rtp_capabilities,
        )
        .await?;

    let info = match state.registry.consumer_erfassen(
        &request.transport_id,
        &request.producer_id,
        &handle,
        kompatibel,
    ) {
        Ok(info) => info,
        Err(e) => {
            state.engine.schliessen(Ressource::Consumer(handle.id)).await;
            return Err(e);
        }
    };

    tracing::info!(
        peer_id = %ctx.peer_id,
        consumer_id = %info.id,
        producer_id = %info.producer_id,
        kind = %info.kind,
        "Consumer erstellt"
    );

    let nachricht = ControlMessage::new(
        request_id,
        ControlPayload::Consumed(ConsumedResponse {
            id: handle.id,
            producer_id: handle.producer_id,
            kind: handle.kind,
            rtp_parameters: handle.rtp_parameters,
        }),
    );
    Ok(Antwort::mit(nachricht).danach(Folgeaktion::ConsumerFortsetzen(info.id)))
}
