//! Fehlertypen fuer Relais
//!
//! Zentraler Fehler-Enum fuer alle Fehler, die einem Client als Antwort auf
//! eine Signaling-Nachricht gemeldet werden. Kein Fehler beendet die
//! Verbindung oder den Prozess; jeder wird synchron in der Antwort gemeldet.

use crate::types::{ProducerId, RoomId, TransportId};
use thiserror::Error;

/// Globaler Result-Alias fuer Relais
pub type Result<T> = std::result::Result<T, RelaisError>;

/// Alle moeglichen Fehler der Session- und Signaling-Schicht
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelaisError {
    // --- Protokoll ---
    #[error("Ungueltige Anfrage: {0}")]
    UngueltigeAnfrage(String),

    // --- Registry ---
    #[error("Raum nicht gefunden: {0}")]
    RaumNichtGefunden(RoomId),

    #[error("Transport nicht gefunden: {0}")]
    TransportNichtGefunden(TransportId),

    #[error("Producer nicht gefunden: {0}")]
    ProducerNichtGefunden(ProducerId),

    #[error("Capabilities nicht kompatibel mit {0}")]
    CapabilityMismatch(ProducerId),

    #[error("Ungueltiger Zustandsuebergang: {0}")]
    UngueltigerZustand(String),

    // --- Media-Engine ---
    #[error("Engine-Fehler: {0}")]
    Engine(String),

    // --- Intern ---
    #[error("Interner Fehler: {0}")]
    Intern(String),
}

impl RelaisError {
    /// Erstellt einen internen Fehler aus einer beliebigen Nachricht
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Erstellt einen Fehler fuer ungueltige Anfragen
    pub fn ungueltig(msg: impl Into<String>) -> Self {
        Self::UngueltigeAnfrage(msg.into())
    }

    /// Gibt true zurueck wenn eine Wiederholung derselben Anfrage sinnvoll sein koennte
    ///
    /// Nur Engine-Fehler sind potentiell voruebergehend; fehlende Ressourcen
    /// tauchen durch Wiederholen nicht wieder auf.
    pub fn ist_wiederholbar(&self) -> bool {
        matches!(self, Self::Engine(_))
    }
}
