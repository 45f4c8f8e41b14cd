//! relais-signaling – Signaling-Schicht des SFU
//!
//! Dieser Crate nimmt Signaling-Verbindungen an, verarbeitet die
//! Protokoll-Nachrichten und haelt ueber die [`relais_session::SessionRegistry`]
//! den Sitzungszustand konsistent mit der Media-Engine.
//!
//! ## Architektur
//!
//! ```text
//! TCP Listener (SignalingServer)
//!     |
//!     v
//! PeerConnection (pro Verbindung ein Task)
//!     |
//!     v
//! MessageDispatcher
//!     |
//!     +-- router_handler     (getRouterRtpCapabilities)
//!     +-- transport_handler  (createWebRtcTransport, connectTransport, closeTransport)
//!     +-- producer_handler   (produce, closeProducer, getProducers)
//!     +-- consumer_handler   (consume)
//!
//! PeerManager      – Verbundene Peers und ihr Raum
//! EventBroadcaster – Ereignisse an einzelne Peers senden
//! Engine-Ereignisse – Engine-seitig geschlossene Transports bereinigen
//! ```

pub mod broadcast;
pub mod connection;
pub mod dispatcher;
pub mod ereignisse;
pub mod error;
pub mod handlers;
pub mod peers;
pub mod server_state;
pub mod tcp;

// Bequeme Re-Exporte
pub use broadcast::EventBroadcaster;
pub use connection::PeerConnection;
pub use dispatcher::{Antwort, DispatcherContext, Folgeaktion, MessageDispatcher};
pub use error::{SignalingError, SignalingResult};
pub use peers::PeerManager;
pub use server_state::{SignalingConfig, SignalingState};
pub use tcp::{listener_bedienen, SignalingServer};
