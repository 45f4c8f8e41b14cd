//! TCP-Listener – Bindet Socket, akzeptiert Verbindungen
//!
//! Der `SignalingServer` bindet einen TCP-Socket und startet fuer jede
//! eingehende Verbindung einen eigenen tokio-Task mit einer `PeerConnection`.
//! Die Tasks laufen auf der Multi-Thread-Runtime parallel.

use relais_core::PeerId;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::connection::PeerConnection;
use crate::ereignisse::engine_ereignisse_verarbeiten;
use crate::error::SignalingResult;
use crate::server_state::SignalingState;

/// TCP-Signaling-Server
pub struct SignalingServer {
    state: Arc<SignalingState>,
    bind_addr: SocketAddr,
}

impl SignalingServer {
    pub fn neu(state: Arc<SignalingState>, bind_addr: SocketAddr) -> Self {
        Self { state, bind_addr }
    }

    /// Bindet den Socket und bedient ihn bis `shutdown_rx` `true` meldet
    pub async fn starten(
        self,
        shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) -> SignalingResult<()> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        listener_bedienen(self.state, listener, shutdown_rx).await
    }

    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }
}

/// Accept-Loop auf einem bereits gebundenen Listener
///
/// Startet zusaetzlich die Verarbeitung der Engine-Ereignisse.
pub async fn listener_bedienen(
    state: Arc<SignalingState>,
    listener: TcpListener,
    mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
) -> SignalingResult<()> {
    let lokale_addr = listener.local_addr()?;
    tracing::info!(
        adresse = %lokale_addr,
        server = %state.config.server_name,
        "TCP Signaling-Server gestartet"
    );

    let ereignis_task = tokio::spawn(engine_ereignisse_verarbeiten(
        Arc::clone(&state),
        shutdown_rx.clone(),
    ));

    loop {
        tokio::select! {
            // Neue eingehende Verbindung
            result = listener.accept() => {
                match result {
                    Ok((stream, peer_addr)) => {
                        let peer_id = PeerId::new();
                        if let Err(e) = state.peers.peer_reservieren(peer_id, peer_addr, state.config.max_peers) {
                            tracing::warn!(peer = %peer_addr, fehler = %e, "Verbindung abgelehnt");
                            drop(stream);
                            continue;
                        }
                        if let Err(e) = stream.set_nodelay(true) {
                            tracing::debug!(peer = %peer_addr, fehler = %e, "TCP_NODELAY nicht gesetzt");
                        }

                        tracing::debug!(peer = %peer_addr, "Verbindung akzeptiert");
                        let verbindung = PeerConnection::neu(Arc::clone(&state), peer_id, peer_addr);
                        let shutdown_rx_clone = shutdown_rx.clone();
                        tokio::spawn(async move {
                            verbindung.verarbeiten(stream, shutdown_rx_clone).await;
                        });
                    }
                    Err(e) => {
                        tracing::error!(fehler = %e, "TCP-Accept-Fehler");
                        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                    }
                }
            }

            // Shutdown-Signal
            Ok(()) = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("Signaling-Server: Shutdown-Signal empfangen");
                    break;
                }
            }
        }
    }

    ereignis_task.abort();
    tracing::info!("TCP Signaling-Server gestoppt");
    Ok(())
}
