//! Transport-Handler – createWebRtcTransport, connectTransport, closeTransport

use relais_core::{RelaisError, Result};
use relais_engine::{Ressource, TransportOptionen};
use relais_protocol::control::{
    CloseTransportRequest, ConnectStatus, ConnectTransportRequest, ControlMessage,
    ControlPayload, CreateWebRtcTransportRequest, ErrorCode, TransportConnectedResponse,
    TransportCreatedResponse,
};
use relais_session::TransportZustand;
use std::sync::Arc;

use super::bereinigung::bereinigung_anwenden;
use super::{eigener_transport, raum_binden, raum_pruefen};
use crate::dispatcher::DispatcherContext;
use crate::server_state::SignalingState;

/// Legt einen WebRTC-Transport im Raum an
///
/// Der Raum muss bereits existieren (`getRouterRtpCapabilities` zuerst).
/// Mitgliedschaft und Raum-Bindung entstehen erst mit dem registrierten
/// Transport.
pub async fn handle_create_transport(
    request: CreateWebRtcTransportRequest,
    request_id: u32,
    ctx: &mut DispatcherContext,
    state: &Arc<SignalingState>,
) -> Result<ControlMessage> {
    raum_pruefen(ctx, &request.room_id)?;
    let routing = state.registry.routing_kontext(&request.room_id)?;

    let optionen = TransportOptionen {
        force_tcp: request.force_tcp,
    };
    let parameter = state.engine.transport_erstellen(&routing, &optionen).await?;

    if let Err(e) =
        state
            .registry
            .transport_registrieren(&request.room_id, ctx.peer_id, parameter.id)
    {
        state.engine.schliessen(Ressource::Transport(parameter.id)).await;
        return Err(e);
    }
    raum_binden(state, ctx, &request.room_id);

    tracing::info!(
        peer_id = %ctx.peer_id,
        room_id = %request.room_id,
        transport_id = %parameter.id,
        force_tcp = request.force_tcp,
        "Transport erstellt"
    );

    Ok(ControlMessage::new(
        request_id,
        ControlPayload::WebRtcTransportCreated(TransportCreatedResponse {
            id: parameter.id,
            ice_parameters: parameter.ice_parameters,
            ice_candidates: parameter.ice_candidates,
            dtls_parameters: parameter.dtls_parameters,
        }),
    ))
}

/// Verbindet einen Transport mit den DTLS-Parametern des Clients
///
/// Unbekannte Transports werden mit dem Text `ERROR` beantwortet, den
/// bestehende Clients an dieser Stelle erwarten.
pub async fn handle_connect_transport(
    request: ConnectTransportRequest,
    request_id: u32,
    ctx: &DispatcherContext,
    state: &Arc<SignalingState>,
) -> Result<ControlMessage> {
    request
        .dtls_parameters
        .pruefen()
        .map_err(RelaisError::UngueltigeAnfrage)?;

    let nicht_gefunden =
        || ControlMessage::error(request_id, ErrorCode::TransportNotFound, "ERROR");

    let info = match eigener_transport(state, ctx.peer_id, &request.transport_id) {
        Ok(info) => info,
        Err(RelaisError::TransportNichtGefunden(_)) => return Ok(nicht_gefunden()),
        Err(e) => return Err(e),
    };

    if info.zustand != TransportZustand::Connected {
        state
            .engine
            .transport_verbinden(&request.transport_id, &request.dtls_parameters)
            .await?;
        match state
            .registry
            .transport_verbunden_markieren(&request.transport_id)
        {
            Ok(_) => {}
            // Waehrend des Engine-Aufrufs geschlossen
            Err(RelaisError::TransportNichtGefunden(_)) => return Ok(nicht_gefunden()),
            Err(e) => return Err(e),
        }
        tracing::debug!(peer_id = %ctx.peer_id, transport_id = %request.transport_id, "Transport verbunden");
    }

    Ok(ControlMessage::new(
        request_id,
        ControlPayload::TransportConnected(TransportConnectedResponse {
            status: ConnectStatus::Success,
        }),
    ))
}

/// Schliesst einen eigenen Transport samt Kaskade
///
/// Unbekannte oder fremde Transports werden stillschweigend ignoriert.
pub async fn handle_close_transport(
    request: CloseTransportRequest,
    ctx: &DispatcherContext,
    state: &Arc<SignalingState>,
) {
    if eigener_transport(state, ctx.peer_id, &request.transport_id).is_err() {
        tracing::debug!(
            peer_id = %ctx.peer_id,
            transport_id = %request.transport_id,
            "closeTransport fuer unbekannten Transport ignoriert"
        );
        return;
    }

    let bereinigung = state.registry.transport_schliessen(&request.transport_id);
    bereinigung_anwenden(state, &bereinigung, Some(ctx.peer_id)).await;
}
