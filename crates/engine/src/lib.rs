//! relais-engine – Schnittstelle zur Media-Engine
//!
//! Der Signaling-Layer leitet selbst keine Pakete weiter. Alles was
//! Media-Plane-Zustand erzeugt (Router, Transports, Producer, Consumer)
//! laeuft ueber den [`MediaEngine`]-Trait.
//!
//! ## Module
//! - [`engine`] – Der `MediaEngine`-Trait und seine Ein-/Ausgabetypen
//! - [`error`] – Fehlertyp der Engine
//! - [`lokal`] – In-Process-Engine (`LokaleEngine`) fuer Betrieb ohne
//!   externen Medienserver und fuer Tests
//! - `mediasoup_engine` – Produktiv-Engine mit mediasoup-Worker (Feature
//!   `mediasoup`)

pub mod engine;
pub mod error;
pub mod lokal;
#[cfg(feature = "mediasoup")]
pub mod mediasoup_engine;

pub use engine::{
    ConsumerHandle, EngineEreignis, MediaEngine, ProducerHandle, Ressource, RouterOptionen,
    RoutingContext, TransportOptionen, TransportParameter, standard_media_codecs,
};
pub use error::{EngineError, EngineResult};
pub use lokal::{EngineOperation, LokaleEngine, LokaleEngineConfig};
#[cfg(feature = "mediasoup")]
pub use mediasoup_engine::{MediasoupConfig, MediasoupEngine};
