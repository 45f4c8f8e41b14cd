//! relais-protocol – Signaling-Protokoll-Definitionen
//!
//! Dieses Crate definiert alle Nachrichtentypen, RTP/ICE/DTLS-Strukturen
//! und das Frame-Format, die zwischen Client und Server ausgetauscht werden.

pub mod control;
pub mod rtp;
pub mod wire;

pub use control::{ControlMessage, ControlPayload, ErrorCode};
pub use wire::{Eingang, FrameCodec};
