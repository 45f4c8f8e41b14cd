//! Peer-Manager – Verwaltet die verbundenen Peers
//!
//! Haelt den ephemeren Zustand jeder Signaling-Verbindung: Adresse,
//! Verbindungszeitpunkt und den gebundenen Raum. Transports gehoeren der
//! Registry; beim Trennen werden sie dort ueber die Peer-ID gefunden.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use relais_core::{PeerId, RoomId};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::error::{SignalingError, SignalingResult};

/// Eintrag eines verbundenen Peers
#[derive(Debug, Clone)]
pub struct PeerEintrag {
    pub peer_id: PeerId,
    pub adresse: SocketAddr,
    /// Raum an den die Verbindung gebunden ist (hoechstens einer)
    pub room_id: Option<RoomId>,
    pub verbunden_seit: DateTime<Utc>,
}

/// Verwaltet alle verbundenen Peers
///
/// Clone teilt den inneren Zustand.
#[derive(Clone, Default)]
pub struct PeerManager {
    peers: Arc<DashMap<PeerId, PeerEintrag>>,
    /// Serialisiert Pruefen und Eintragen bei der Annahme
    annahme: Arc<Mutex<()>>,
}

impl PeerManager {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Reserviert den Platz eines neuen Peers, sofern `max_peers` es zulaesst
    ///
    /// Pruefen und Eintragen passieren unter derselben Sperre; gleichzeitige
    /// Verbindungen koennen das Limit daher nicht ueberschreiten. Freigegeben
    /// wird der Platz mit [`peer_getrennt`](Self::peer_getrennt).
    pub fn peer_reservieren(
        &self,
        peer_id: PeerId,
        adresse: SocketAddr,
        max_peers: usize,
    ) -> SignalingResult<()> {
        let _annahme = self.annahme.lock();
        if self.peers.len() >= max_peers {
            return Err(SignalingError::ServerVoll(max_peers));
        }
        self.peers.insert(
            peer_id,
            PeerEintrag {
                peer_id,
                adresse,
                room_id: None,
                verbunden_seit: Utc::now(),
            },
        );
        tracing::info!(peer_id = %peer_id, peer = %adresse, "Peer verbunden");
        Ok(())
    }

    /// Entfernt einen Peer; ein zweiter Aufruf ist ein No-op
    pub fn peer_getrennt(&self, peer_id: &PeerId) -> Option<PeerEintrag> {
        let (_, eintrag) = self.peers.remove(peer_id)?;
        let dauer = Utc::now() - eintrag.verbunden_seit;
        tracing::info!(
            peer_id = %peer_id,
            peer = %eintrag.adresse,
            dauer_sek = dauer.num_seconds(),
            "Peer getrennt"
        );
        Some(eintrag)
    }

    /// Vermerkt den gebundenen Raum eines Peers
    pub fn raum_setzen(&self, peer_id: &PeerId, room_id: RoomId) {
        if let Some(mut eintrag) = self.peers.get_mut(peer_id) {
            eintrag.room_id = Some(room_id);
        }
    }

    pub fn peer(&self, peer_id: &PeerId) -> Option<PeerEintrag> {
        self.peers.get(peer_id).map(|e| e.clone())
    }

    pub fn anzahl(&self) -> usize {
        self.peers.len()
    }

}
