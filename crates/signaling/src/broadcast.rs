//! Event-Broadcaster – Sendet Server-Ereignisse an Peers
//!
//! Der EventBroadcaster verwaltet die Send-Queues aller verbundenen Peers.
//! Wer in welchem Raum ist, weiss nur die Registry; der Broadcaster
//! bekommt die Empfaenger als Liste uebergeben.
//!
//! Gesendet wird nicht-blockierend. Ist die Queue eines Peers voll, wird
//! das Ereignis fuer diesen Peer verworfen.

use dashmap::DashMap;
use relais_core::PeerId;
use relais_protocol::control::ControlMessage;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Groesse der Send-Queue pro Peer
const SEND_QUEUE_GROESSE: usize = 64;

// ---------------------------------------------------------------------------
// PeerSender
// ---------------------------------------------------------------------------

/// Handle auf die Send-Queue eines verbundenen Peers
#[derive(Clone, Debug)]
pub struct PeerSender {
    pub peer_id: PeerId,
    pub tx: mpsc::Sender<ControlMessage>,
}

impl PeerSender {
    /// Sendet eine Nachricht nicht-blockierend an den Peer
    ///
    /// Gibt `false` zurueck wenn die Queue voll oder geschlossen ist.
    pub fn senden(&self, nachricht: ControlMessage) -> bool {
        match self.tx.try_send(nachricht) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(peer_id = %self.peer_id, "Send-Queue voll – Ereignis verworfen");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(peer_id = %self.peer_id, "Send-Queue geschlossen (Peer getrennt)");
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// EventBroadcaster
// ---------------------------------------------------------------------------

/// Zentraler Event-Broadcaster fuer alle verbundenen Peers
///
/// Clone teilt den inneren Zustand.
#[derive(Clone, Default)]
pub struct EventBroadcaster {
    peers: Arc<DashMap<PeerId, PeerSender>>,
}

impl EventBroadcaster {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Registriert einen Peer und gibt seine Empfangs-Queue zurueck
    ///
    /// Die Verbindung liest aus dieser Queue und schreibt auf den Socket.
    pub fn peer_registrieren(&self, peer_id: PeerId) -> mpsc::Receiver<ControlMessage> {
        let (tx, rx) = mpsc::channel(SEND_QUEUE_GROESSE);
        self.peers.insert(peer_id, PeerSender { peer_id, tx });
        tracing::debug!(peer_id = %peer_id, "Peer im Broadcaster registriert");
        rx
    }

    /// Entfernt einen Peer; weitere Ereignisse an ihn werden verworfen
    pub fn peer_entfernen(&self, peer_id: &PeerId) {
        if self.peers.remove(peer_id).is_some() {
            tracing::debug!(peer_id = %peer_id, "Peer aus Broadcaster entfernt");
        }
    }

    /// Sendet eine Nachricht an einen einzelnen Peer
    pub fn an_peer_senden(&self, peer_id: &PeerId, nachricht: ControlMessage) -> bool {
        match self.peers.get(peer_id) {
            Some(sender) => sender.senden(nachricht),
            None => {
                tracing::debug!(peer_id = %peer_id, "Senden an unbekannten Peer");
                false
            }
        }
    }

    /// Sendet eine Nachricht an alle angegebenen Peers ausser dem Ausloeser
    ///
    /// Gibt die Anzahl der erfolgreichen Sendungen zurueck.
    pub fn an_peers_senden(
        &self,
        empfaenger: &[PeerId],
        ausgeschlossen: Option<PeerId>,
        nachricht: &ControlMessage,
    ) -> usize {
        empfaenger
            .iter()
            .filter(|peer_id| Some(**peer_id) != ausgeschlossen)
            .filter(|peer_id| self.an_peer_senden(peer_id, nachricht.clone()))
            .count()
    }

    pub fn peer_anzahl(&self) -> usize {
        self.peers.len()
    }

    pub fn ist_registriert(&self, peer_id: &PeerId) -> bool {
        self.peers.contains_key(peer_id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
