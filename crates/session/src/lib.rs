//! relais-session – Autoritatives Sitzungsmodell
//!
//! Die [`SessionRegistry`] ist der einzige Besitzer der Raum-, Transport-,
//! Producer- und Consumer-Tabellen. Jeder Raum hat eine eigene Sperre;
//! Operationen auf verschiedenen Raeumen laufen parallel.
//!
//! Die Registry verschickt selbst keine Benachrichtigungen. Operationen die
//! Objekte entfernen liefern eine [`Bereinigung`], aus der der Aufrufer
//! Engine-Ressourcen schliesst und Ereignisse erzeugt.
//!
//! ## Module
//! - [`model`] – Snapshots, Transport-Zustandsautomat, Bereinigung
//! - [`registry`] – Die Registry selbst

pub mod model;
pub mod registry;

pub use model::{
    Bereinigung, ConsumerInfo, EntfernterConsumer, EntfernterProducer, ProducerInfo,
    RegistryStatistik, TransportInfo, TransportZustand,
};
pub use registry::{RegistryConfig, SessionRegistry};
