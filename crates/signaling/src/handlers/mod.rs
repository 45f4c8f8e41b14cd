//! Handler fuer alle Signaling-Nachrichten
//!
//! Jeder Handler ist fuer einen Nachrichtentyp zustaendig und hat Zugriff
//! auf den gemeinsamen SignalingState. Media-Plane-Operationen laufen immer
//! in der Reihenfolge Pruefen, Engine-Aufruf, Registry-Eintrag.

pub mod bereinigung;
pub mod consumer_handler;
pub mod producer_handler;
pub mod router_handler;
pub mod transport_handler;

use relais_core::{PeerId, RelaisError, Result, RoomId, TransportId};
use relais_session::TransportInfo;

use crate::dispatcher::DispatcherContext;
use crate::server_state::SignalingState;

/// Prueft den `roomId` einer Nachricht gegen die Raum-Bindung der Verbindung
///
/// Eine Verbindung ist an hoechstens einen Raum gebunden.
pub(crate) fn raum_pruefen(ctx: &DispatcherContext, room_id: &RoomId) -> Result<()> {
    if room_id.ist_leer() {
        return Err(RelaisError::ungueltig("roomId fehlt"));
    }
    match &ctx.raum {
        Some(gebunden) if gebunden != room_id => Err(RelaisError::ungueltig(format!(
            "Verbindung ist bereits an {gebunden} gebunden"
        ))),
        _ => Ok(()),
    }
}

/// Bindet die Verbindung an einen Raum (idempotent)
pub(crate) fn raum_binden(state: &SignalingState, ctx: &mut DispatcherContext, room_id: &RoomId) {
    if ctx.raum.is_none() {
        ctx.raum = Some(room_id.clone());
        state.peers.raum_setzen(&ctx.peer_id, room_id.clone());
        tracing::debug!(peer_id = %ctx.peer_id, room_id = %room_id, "Verbindung an Raum gebunden");
    }
}

/// Liefert einen Transport nur wenn er dem Peer gehoert
///
/// Fremde Transports werden wie unbekannte gemeldet.
pub(crate) fn eigener_transport(
    state: &SignalingState,
    peer_id: PeerId,
    transport_id: &TransportId,
) -> Result<TransportInfo> {
    let info = state.registry.transport_info(transport_id)?;
    if info.peer_id != peer_id {
        tracing::debug!(
            peer_id = %peer_id,
            besitzer = %info.peer_id,
            transport_id = %transport_id,
            "Zugriff auf fremden Transport"
        );
        return Err(RelaisError::TransportNichtGefunden(*transport_id));
    }
    Ok(info)
}
