//! Gemeinsame Identifikationstypen fuer Relais
//!
//! Alle IDs verwenden das Newtype-Pattern um Verwechslungen zwischen
//! verschiedenen ID-Arten zur Compilezeit auszuschliessen. Transport-,
//! Producer- und Consumer-IDs werden ausschliesslich von der Media-Engine
//! vergeben, Peer-IDs vom Signaling-Layer pro Netzwerkverbindung.
//!
//! Auf dem Draht erscheinen alle UUID-IDs als nackter UUID-String,
//! `Display` stellt fuer Logs ein Praefix voran.

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $praefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Erstellt eine neue zufaellige ID
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Gibt die innere UUID zurueck
            pub fn inner(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($praefix, ":{}"), self.0)
            }
        }
    };
}

uuid_id!(
    /// Eindeutige Peer-ID (eine pro Netzwerkverbindung)
    PeerId,
    "peer"
);

uuid_id!(
    /// Eindeutige Transport-ID (von der Media-Engine vergeben)
    TransportId,
    "transport"
);

uuid_id!(
    /// Eindeutige Producer-ID (von der Media-Engine vergeben)
    ProducerId,
    "producer"
);

uuid_id!(
    /// Eindeutige Consumer-ID (von der Media-Engine vergeben)
    ConsumerId,
    "consumer"
);

// ---------------------------------------------------------------------------
// RoomId
// ---------------------------------------------------------------------------

/// Opaker Raum-Schluessel
///
/// Clients duerfen Raeume als String oder als Zahl adressieren. Zahlen werden
/// auf ihre Dezimaldarstellung normalisiert, `42` und `"42"` bezeichnen also
/// denselben Raum.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Erstellt eine RoomId aus einem beliebigen String
    pub fn neu(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Gibt den Schluessel als &str zurueck
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prueft ob der Schluessel leer ist (ungueltig im Protokoll)
    pub fn ist_leer(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "room:{}", self.0)
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        Self::neu(s)
    }
}

impl<'de> Deserialize<'de> for RoomId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Roh {
            Text(String),
            Ganzzahl(i64),
            Vorzeichenlos(u64),
        }

        Ok(match Roh::deserialize(deserializer)? {
            Roh::Text(s) => RoomId(s),
            Roh::Ganzzahl(n) => RoomId(n.to_string()),
            Roh::Vorzeichenlos(n) => RoomId(n.to_string()),
        })
    }
}

// ---------------------------------------------------------------------------
// MediaKind
// ---------------------------------------------------------------------------

/// Art eines Medienstroms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    /// Gibt den Protokoll-Namen zurueck ("audio" / "video")
    pub fn als_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.als_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_id_eindeutig() {
        let a = TransportId::new();
        let b = TransportId::new();
        assert_ne!(a, b, "Zwei neue TransportIds muessen verschieden sein");
    }

    #[test]
    fn producer_id_display() {
        let id = ProducerId(Uuid::nil());
        assert!(id.to_string().starts_with("producer:"));
    }

    #[test]
    fn ids_auf_dem_draht_ohne_praefix() {
        let id = ConsumerId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.inner()));
        let zurueck: ConsumerId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, zurueck);
    }

    #[test]
    fn room_id_zahl_und_string_identisch() {
        let zahl: RoomId = serde_json::from_str("42").unwrap();
        let text: RoomId = serde_json::from_str("\"42\"").unwrap();
        assert_eq!(zahl, text);
        assert_eq!(zahl.as_str(), "42");
    }

    #[test]
    fn room_id_leer_erkannt() {
        assert!(RoomId::neu("  ").ist_leer());
        assert!(!RoomId::neu("lobby").ist_leer());
    }

    #[test]
    fn room_id_objekt_wird_abgelehnt() {
        let ergebnis: std::result::Result<RoomId, _> = serde_json::from_str("{\"a\":1}");
        assert!(ergebnis.is_err());
    }

    #[test]
    fn media_kind_kleingeschrieben() {
        assert_eq!(serde_json::to_string(&MediaKind::Video).unwrap(), "\"video\"");
        let kind: MediaKind = serde_json::from_str("\"audio\"").unwrap();
        assert_eq!(kind, MediaKind::Audio);
        assert!(serde_json::from_str::<MediaKind>("\"screen\"").is_err());
    }
}
