//! Snapshot-Typen und Transport-Zustandsautomat

use chrono::{DateTime, Utc};
use relais_core::{
    ConsumerId, MediaKind, PeerId, ProducerId, RelaisError, Result, RoomId, TransportId,
};
use relais_engine::Ressource;
use relais_protocol::rtp::RtpParameters;
use serde::Serialize;

// ---------------------------------------------------------------------------
// TransportZustand
// ---------------------------------------------------------------------------

/// Aushandlungszustand eines Transports
///
/// `Pending -> Connected` genau einmal, niemals rueckwaerts. Geschlossen ist
/// ein Transport, sobald er aus der Registry entfernt wurde; das ist aus
/// jedem Zustand moeglich und endgueltig, Anfragen sehen danach
/// `TransportNichtGefunden`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportZustand {
    Pending,
    Connected,
}

impl TransportZustand {
    /// Wendet einen Zustandsuebergang an
    ///
    /// Ein bereits verbundener Transport darf erneut bestaetigt werden.
    pub fn uebergang(self, ziel: TransportZustand) -> Result<TransportZustand> {
        use TransportZustand::*;
        match (self, ziel) {
            (Pending, Connected) | (Connected, Connected) => Ok(Connected),
            (Pending, Pending) | (Connected, Pending) => Err(RelaisError::UngueltigerZustand(
                format!("{self:?} -> Pending ist nicht erlaubt"),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// Momentaufnahme eines Transports
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransportInfo {
    pub id: TransportId,
    pub room_id: RoomId,
    pub peer_id: PeerId,
    pub zustand: TransportZustand,
    pub erstellt_am: DateTime<Utc>,
}

/// Momentaufnahme eines Producers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProducerInfo {
    pub id: ProducerId,
    pub room_id: RoomId,
    pub transport_id: TransportId,
    pub peer_id: PeerId,
    pub kind: MediaKind,
    pub rtp_parameters: RtpParameters,
    pub erstellt_am: DateTime<Utc>,
}

/// Momentaufnahme eines Consumers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsumerInfo {
    pub id: ConsumerId,
    pub room_id: RoomId,
    pub transport_id: TransportId,
    pub peer_id: PeerId,
    pub producer_id: ProducerId,
    pub kind: MediaKind,
    pub pausiert: bool,
}

/// Zaehlerstaende der Registry (fuer Metriken)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStatistik {
    pub raeume: usize,
    pub mitglieder: usize,
    pub transports: usize,
    pub producers: usize,
    pub consumers: usize,
}

// ---------------------------------------------------------------------------
// Bereinigung
// ---------------------------------------------------------------------------

/// Entfernter Producer samt Besitzer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntfernterProducer {
    pub id: ProducerId,
    pub peer_id: PeerId,
}

/// Entfernter Consumer samt Besitzer und referenziertem Producer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntfernterConsumer {
    pub id: ConsumerId,
    pub peer_id: PeerId,
    pub producer_id: ProducerId,
}

/// Ergebnis einer kaskadierenden Entfernung
///
/// Listet alles was aus der Registry entfernt wurde. Eine leere Bereinigung
/// bedeutet dass nichts (mehr) zu entfernen war.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bereinigung {
    pub room_id: Option<RoomId>,
    pub transports: Vec<TransportId>,
    pub producers: Vec<EntfernterProducer>,
    pub consumers: Vec<EntfernterConsumer>,
}

impl Bereinigung {
    pub fn ist_leer(&self) -> bool {
        self.transports.is_empty() && self.producers.is_empty() && self.consumers.is_empty()
    }

    /// Fuehrt eine weitere Bereinigung in diese zusammen
    pub fn zusammenfuehren(&mut self, andere: Bereinigung) {
        if self.room_id.is_none() {
            self.room_id = andere.room_id;
        }
        self.transports.extend(andere.transports);
        self.producers.extend(andere.producers);
        self.consumers.extend(andere.consumers);
    }

    /// Engine-Ressourcen in Schliess-Reihenfolge (Consumer, Producer, Transports)
    pub fn ressourcen(&self) -> Vec<Ressource> {
        self.consumers
            .iter()
            .map(|c| Ressource::Consumer(c.id))
            .chain(self.producers.iter().map(|p| Ressource::Producer(p.id)))
            .chain(self.transports.iter().map(|t| Ressource::Transport(*t)))
            .collect()
    }
}
