//! Router-Handler – getRouterRtpCapabilities

use relais_core::Result;
use relais_protocol::control::{ControlMessage, ControlPayload, GetRouterRtpCapabilitiesRequest};
use std::sync::Arc;

use super::{raum_binden, raum_pruefen};
use crate::dispatcher::DispatcherContext;
use crate::server_state::SignalingState;

/// Liefert die Router-Capabilities eines Raums
///
/// Legt den Raum beim ersten Zugriff an und traegt den Peer als Mitglied ein.
pub async fn handle_get_router_rtp_capabilities(
    request: GetRouterRtpCapabilitiesRequest,
    request_id: u32,
    ctx: &mut DispatcherContext,
    state: &Arc<SignalingState>,
) -> Result<ControlMessage> {
    raum_pruefen(ctx, &request.room_id)?;

    let routing = state
        .registry
        .raum_beitreten(&request.room_id, ctx.peer_id)
        .await?;
    raum_binden(state, ctx, &request.room_id);

    Ok(ControlMessage::new(
        request_id,
        ControlPayload::RouterRtpCapabilities(routing.rtp_capabilities),
    ))
}
