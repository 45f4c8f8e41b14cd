//! relais-core – Gemeinsame Typen, IDs und Fehlertypen
//!
//! Dieses Crate stellt die fundamentalen Bausteine bereit, die von allen
//! anderen Relais-Crates gemeinsam genutzt werden.

pub mod error;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{RelaisError, Result};
pub use types::{ConsumerId, MediaKind, PeerId, ProducerId, RoomId, TransportId};
