//! Engine-Ereignisse – Reaktion auf engine-seitig geschlossene Transports
//!
//! Meldet die Engine einen Transport als geschlossen (z.B. DTLS-Zustand
//! `closed`), wird er aus der Registry entfernt wie bei `closeTransport`.
//! Benachrichtigt werden alle betroffenen Peers, auch der Besitzer.

use relais_engine::EngineEreignis;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use crate::handlers::bereinigung::bereinigung_anwenden;
use crate::server_state::SignalingState;

/// Verarbeitet Engine-Ereignisse bis zum Shutdown
pub async fn engine_ereignisse_verarbeiten(
    state: Arc<SignalingState>,
    mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
) {
    let mut ereignisse = state.engine.ereignisse_abonnieren();

    loop {
        tokio::select! {
            ereignis = ereignisse.recv() => {
                match ereignis {
                    Ok(ereignis) => ereignis_anwenden(&state, ereignis).await,
                    Err(RecvError::Lagged(verpasst)) => {
                        tracing::warn!(verpasst, "Engine-Ereignisse verpasst");
                    }
                    Err(RecvError::Closed) => {
                        tracing::debug!("Engine-Ereigniskanal geschlossen");
                        break;
                    }
                }
            }

            Ok(()) = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
}

/// Wendet ein einzelnes Engine-Ereignis an
pub async fn ereignis_anwenden(state: &SignalingState, ereignis: EngineEreignis) {
    match ereignis {
        EngineEreignis::TransportGeschlossen {
            transport_id,
            grund,
        } => {
            let bereinigung = state.registry.transport_schliessen(&transport_id);
            if bereinigung.ist_leer() {
                return;
            }
            tracing::info!(transport_id = %transport_id, grund = %grund, "Transport von der Engine geschlossen");
            bereinigung_anwenden(state, &bereinigung, None).await;
        }
    }
}
