//! Peer-Connection – Verwaltet eine einzelne Signaling-Verbindung
//!
//! Jede Verbindung bekommt eine `PeerConnection` in einem eigenen tokio-Task.
//! Nachrichten einer Verbindung werden strikt nacheinander verarbeitet.
//!
//! ## Ablauf
//! ```text
//! Verbunden -> (Nachrichten, Ereignisse, Pings) -> Getrennt -> Cleanup
//! ```
//!
//! ## Keepalive
//! - Server sendet alle `keepalive_sek` einen Ping
//! - Ohne eingehenden Frame innerhalb von `verbindungs_timeout_sek` wird
//!   die Verbindung getrennt

use futures_util::{SinkExt, StreamExt};
use relais_core::PeerId;
use relais_protocol::{
    control::{ControlMessage, ErrorCode},
    wire::{Eingang, FrameCodec},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;

use crate::dispatcher::{DispatcherContext, MessageDispatcher};
use crate::error::{SignalingError, SignalingResult};
use crate::server_state::SignalingState;

/// Verarbeitet eine einzelne Signaling-Verbindung
pub struct PeerConnection {
    state: Arc<SignalingState>,
    peer_id: PeerId,
    peer_addr: SocketAddr,
}

impl PeerConnection {
    /// Erstellt eine PeerConnection fuer einen bereits reservierten Peer
    ///
    /// Der Platz wurde mit `PeerManager::peer_reservieren` belegt und wird
    /// im Cleanup wieder freigegeben.
    pub fn neu(state: Arc<SignalingState>, peer_id: PeerId, peer_addr: SocketAddr) -> Self {
        Self {
            state,
            peer_id,
            peer_addr,
        }
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    /// Startet die Verbindungs-Verarbeitungsschleife
    ///
    /// Laeuft bis die Verbindung getrennt wird oder ein Shutdown-Signal
    /// eingeht; danach werden alle Ressourcen des Peers bereinigt.
    pub async fn verarbeiten<S>(self, stream: S, shutdown_rx: tokio::sync::watch::Receiver<bool>)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let peer_addr = self.peer_addr;
        let mut ctx = DispatcherContext::neu(self.peer_id, peer_addr);
        let dispatcher = MessageDispatcher::neu(Arc::clone(&self.state));

        let ergebnis = self
            .schleife(stream, shutdown_rx, &dispatcher, &mut ctx)
            .await;
        match ergebnis {
            Ok(()) => tracing::info!(peer = %peer_addr, "Verbindung beendet"),
            Err(e) => tracing::warn!(peer = %peer_addr, fehler = %e, "Verbindung abgebrochen"),
        }

        dispatcher.peer_cleanup(&ctx).await;
        tracing::debug!(peer = %peer_addr, "Verbindungs-Task beendet");
    }

    async fn schleife<S>(
        &self,
        stream: S,
        mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
        dispatcher: &MessageDispatcher,
        ctx: &mut DispatcherContext,
    ) -> SignalingResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let peer_addr = self.peer_addr;
        let keepalive_intervall = Duration::from_secs(self.state.config.keepalive_sek);
        let timeout_sek = self.state.config.verbindungs_timeout_sek;
        let timeout_dauer = Duration::from_secs(timeout_sek);

        let mut framed = Framed::new(
            stream,
            FrameCodec::with_max_size(self.state.config.max_frame_groesse),
        );
        let mut ereignis_rx = self.state.broadcaster.peer_registrieren(self.peer_id);

        let mut letzter_empfang = Instant::now();
        let mut naechster_ping = Instant::now() + keepalive_intervall;
        let mut ping_request_id: u32 = 0;

        loop {
            let jetzt = Instant::now();

            if jetzt.duration_since(letzter_empfang) > timeout_dauer {
                return Err(SignalingError::Timeout(timeout_sek));
            }

            // Naechster Weckzeitpunkt: Ping oder Timeout, was zuerst kommt
            let bis_ping = naechster_ping.saturating_duration_since(jetzt);
            let bis_timeout = (letzter_empfang + timeout_dauer).saturating_duration_since(jetzt);
            let warten = bis_ping.min(bis_timeout) + Duration::from_millis(1);

            tokio::select! {
                // Eingehender Frame vom Client
                frame = framed.next() => {
                    match frame {
                        Some(Ok(Eingang::Nachricht(nachricht))) => {
                            letzter_empfang = Instant::now();
                            let antwort = dispatcher.dispatch(nachricht, ctx).await;
                            if let Some(nachricht) = antwort.nachricht {
                                framed.send(nachricht).await?;
                            }
                            dispatcher.nachlauf_ausfuehren(antwort.nachlauf).await;
                        }
                        Some(Ok(Eingang::Ungueltig { request_id, grund })) => {
                            letzter_empfang = Instant::now();
                            tracing::debug!(peer = %peer_addr, request_id, grund = %grund, "Ungueltiger Frame");
                            framed.send(dispatcher.ungueltig(request_id, &grund)).await?;
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            tracing::info!(peer = %peer_addr, "Verbindung vom Client getrennt");
                            return Ok(());
                        }
                    }
                }

                // Server-Ereignis fuer diesen Peer
                Some(ereignis) = ereignis_rx.recv() => {
                    framed.send(ereignis).await?;
                }

                // Keepalive-Ping
                _ = tokio::time::sleep(warten) => {
                    if Instant::now() >= naechster_ping {
                        ping_request_id = ping_request_id.wrapping_add(1);
                        let ts = std::time::SystemTime::now()
                            .duration_since(std::time::UNIX_EPOCH)
                            .unwrap_or_default()
                            .as_millis() as u64;
                        framed.send(ControlMessage::ping(ping_request_id, ts)).await?;
                        naechster_ping = Instant::now() + keepalive_intervall;
                    }
                }

                // Shutdown-Signal
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!(peer = %peer_addr, "Shutdown-Signal – Verbindung wird getrennt");
                        let abschied = ControlMessage::error(
                            0,
                            ErrorCode::InternalError,
                            "Server wird heruntergefahren",
                        );
                        let _ = framed.send(abschied).await;
                        return Ok(());
                    }
                }
            }
        }
    }
}
