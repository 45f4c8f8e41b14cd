//! Fehlertypen der Media-Engine

use relais_core::RelaisError;
use thiserror::Error;

/// Fehler die eine Media-Engine melden kann
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Die referenzierte Engine-Ressource existiert nicht (mehr)
    #[error("Unbekannte Ressource: {0}")]
    Unbekannt(String),

    /// Parameter wurden von der Engine abgelehnt
    #[error("Abgelehnt: {0}")]
    Abgelehnt(String),

    /// DTLS-Aushandlung fehlgeschlagen
    #[error("DTLS-Fehler: {0}")]
    Dtls(String),

    /// Interner Engine-Fehler
    #[error("Interner Engine-Fehler: {0}")]
    Intern(String),
}

/// Result-Typ der Media-Engine
pub type EngineResult<T> = Result<T, EngineError>;

impl From<EngineError> for RelaisError {
    fn from(fehler: EngineError) -> Self {
        RelaisError::Engine(fehler.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_fehler_wird_relais_fehler() {
        let fehler: RelaisError = EngineError::Dtls("Fingerprint passt nicht".into()).into();
        assert_eq!(
            fehler,
            RelaisError::Engine("DTLS-Fehler: Fingerprint passt nicht".into())
        );
        assert!(fehler.ist_wiederholbar());
    }
}
