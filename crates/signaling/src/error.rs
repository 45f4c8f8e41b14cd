//! Fehlertypen fuer den Signaling-Service
//!
//! Protokollfehler einzelner Nachrichten sind `RelaisError` und landen in der
//! Antwort. `SignalingError` beschreibt nur Fehler die eine einzelne
//! Verbindung beenden.

use thiserror::Error;

/// Verbindungsfehler des Signaling-Service
#[derive(Debug, Error)]
pub enum SignalingError {
    /// IO-Fehler (TCP, Socket, Frame-Grenze verloren)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// Keine eingehenden Frames innerhalb des Timeouts
    #[error("Timeout nach {0} Sekunden ohne Nachricht")]
    Timeout(u64),

    /// Maximale Anzahl gleichzeitiger Peers erreicht
    #[error("Server ist voll ({0} Peers)")]
    ServerVoll(usize),

    /// Interner Fehler
    #[error("Interner Fehler: {0}")]
    Intern(String),
}

impl SignalingError {
    /// Erstellt einen internen Fehler
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }
}

/// Result-Typ fuer den Signaling-Service
pub type SignalingResult<T> = Result<T, SignalingError>;
