//! Signaling-Protokoll (TCP)
//!
//! Definiert alle Nachrichten die ueber die Signaling-Verbindung zwischen
//! Client und Server ausgetauscht werden.
//!
//! ## Design
//! - Request/Response Pattern: jede Nachricht hat eine `requestId: u32`
//! - Server-Events (neuer Producer, geschlossene Producer/Consumer) tragen `requestId: 0`
//! - JSON-Serialisierung via serde, Feldnamen in camelCase wie im WebRTC-Umfeld ueblich
//! - Tagged Enum fuer typsichere Nachrichtentypen (`"type": "produce"`)

use relais_core::{ConsumerId, MediaKind, PeerId, ProducerId, RelaisError, RoomId, TransportId};
use serde::{Deserialize, Serialize};

use crate::rtp::{DtlsParameters, IceCandidate, IceParameters, RtpCapabilities, RtpParameters};

/// Request-ID fuer vom Server initiierte Nachrichten
pub const EREIGNIS_REQUEST_ID: u32 = 0;

// ---------------------------------------------------------------------------
// Fehler-Codes
// ---------------------------------------------------------------------------

/// Standardisierte Fehler-Codes fuer Error-Responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidRequest,
    RoomNotFound,
    TransportNotFound,
    ProducerNotFound,
    CapabilityMismatch,
    EngineError,
    InternalError,
}

impl ErrorCode {
    /// Wire-Darstellung des Codes (auch als Metrik-Label)
    pub fn als_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::RoomNotFound => "ROOM_NOT_FOUND",
            ErrorCode::TransportNotFound => "TRANSPORT_NOT_FOUND",
            ErrorCode::ProducerNotFound => "PRODUCER_NOT_FOUND",
            ErrorCode::CapabilityMismatch => "CAPABILITY_MISMATCH",
            ErrorCode::EngineError => "ENGINE_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl From<&RelaisError> for ErrorCode {
    fn from(fehler: &RelaisError) -> Self {
        match fehler {
            RelaisError::UngueltigeAnfrage(_) => ErrorCode::InvalidRequest,
            RelaisError::RaumNichtGefunden(_) => ErrorCode::RoomNotFound,
            RelaisError::TransportNichtGefunden(_) => ErrorCode::TransportNotFound,
            RelaisError::ProducerNichtGefunden(_) => ErrorCode::ProducerNotFound,
            RelaisError::CapabilityMismatch(_) => ErrorCode::CapabilityMismatch,
            RelaisError::Engine(_) => ErrorCode::EngineError,
            RelaisError::UngueltigerZustand(_) | RelaisError::Intern(_) => {
                ErrorCode::InternalError
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Router-Capabilities
// ---------------------------------------------------------------------------

/// Capabilities des Raum-Routers abfragen (legt den Raum bei Bedarf an)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetRouterRtpCapabilitiesRequest {
    pub room_id: RoomId,
}

// ---------------------------------------------------------------------------
// Transport-Nachrichten
// ---------------------------------------------------------------------------

/// WebRTC-Transport im Raum anlegen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWebRtcTransportRequest {
    pub room_id: RoomId,
    /// Nur TCP-Kandidaten anbieten (z.B. hinter restriktiven Firewalls)
    #[serde(default)]
    pub force_tcp: bool,
}

/// Parameter des neu angelegten Transports
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportCreatedResponse {
    pub id: TransportId,
    pub ice_parameters: IceParameters,
    pub ice_candidates: Vec<IceCandidate>,
    pub dtls_parameters: DtlsParameters,
}

/// DTLS-Parameter des Clients uebermitteln
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectTransportRequest {
    pub transport_id: TransportId,
    pub dtls_parameters: DtlsParameters,
}

/// Ergebnis-Literal einer Transport-Verbindung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectStatus {
    #[serde(rename = "SUCCESS")]
    Success,
}

/// Bestaetigung der Transport-Verbindung
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConnectedResponse {
    pub status: ConnectStatus,
}

/// Transport schliessen (keine Antwort)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseTransportRequest {
    pub transport_id: TransportId,
}

// ---------------------------------------------------------------------------
// Producer-Nachrichten
// ---------------------------------------------------------------------------

/// Medienstrom auf einem Transport senden
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProduceRequest {
    pub transport_id: TransportId,
    pub kind: MediaKind,
    pub rtp_parameters: RtpParameters,
    pub room_id: RoomId,
}

/// ID des neuen Producers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProducedResponse {
    pub id: ProducerId,
}

/// Producer schliessen (keine Antwort)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseProducerRequest {
    pub producer_id: ProducerId,
}

/// Bereits vorhandene Producer eines Raums abfragen (fuer spaet beitretende Peers)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetProducersRequest {
    pub room_id: RoomId,
}

/// Oeffentliche Producer-Informationen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducerInfo {
    pub producer_id: ProducerId,
    pub kind: MediaKind,
    pub peer_id: PeerId,
}

/// Liste der Producer anderer Peers im Raum
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProducerListResponse {
    pub producers: Vec<ProducerInfo>,
}

// ---------------------------------------------------------------------------
// Consumer-Nachrichten
// ---------------------------------------------------------------------------

/// Producer eines anderen Peers empfangen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeRequest {
    pub transport_id: TransportId,
    pub producer_id: ProducerId,
    pub rtp_capabilities: RtpCapabilities,
    pub room_id: RoomId,
}

/// Daten des (pausiert) angelegten Consumers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumedResponse {
    pub id: ConsumerId,
    pub producer_id: ProducerId,
    pub kind: MediaKind,
    pub rtp_parameters: RtpParameters,
}

// ---------------------------------------------------------------------------
// Server-Events
// ---------------------------------------------------------------------------

/// Neuer Producer im Raum verfuegbar
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProducerEvent {
    pub producer_id: ProducerId,
    pub kind: MediaKind,
    pub peer_id: PeerId,
}

/// Producer wurde entfernt
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducerClosedEvent {
    pub producer_id: ProducerId,
}

/// Consumer wurde durch Kaskade entfernt
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerClosedEvent {
    pub consumer_id: ConsumerId,
    pub producer_id: ProducerId,
}

// ---------------------------------------------------------------------------
// Keepalive
// ---------------------------------------------------------------------------

/// Ping (Client -> Server oder Server -> Client)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingMessage {
    /// Unix-Timestamp in Millisekunden fuer RTT-Messung
    pub timestamp_ms: u64,
}

/// Pong-Antwort (spiegelt Timestamp zurueck)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PongMessage {
    pub echo_timestamp_ms: u64,
    pub server_timestamp_ms: u64,
}

// ---------------------------------------------------------------------------
// Haupt-Enum: ControlPayload
// ---------------------------------------------------------------------------

/// Alle moeglichen Signaling-Nachrichten (typsicher via Tagged Enum)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ControlPayload {
    // Router
    GetRouterRtpCapabilities(GetRouterRtpCapabilitiesRequest),
    RouterRtpCapabilities(RtpCapabilities),

    // Transport
    CreateWebRtcTransport(CreateWebRtcTransportRequest),
    WebRtcTransportCreated(TransportCreatedResponse),
    ConnectTransport(ConnectTransportRequest),
    TransportConnected(TransportConnectedResponse),
    CloseTransport(CloseTransportRequest),

    // Producer
    Produce(ProduceRequest),
    Produced(ProducedResponse),
    CloseProducer(CloseProducerRequest),
    GetProducers(GetProducersRequest),
    ProducerList(ProducerListResponse),

    // Consumer
    Consume(ConsumeRequest),
    Consumed(ConsumedResponse),

    // Events
    NewProducer(NewProducerEvent),
    ProducerClosed(ProducerClosedEvent),
    ConsumerClosed(ConsumerClosedEvent),

    // Keepalive
    Ping(PingMessage),
    Pong(PongMessage),

    // Error
    Error(ErrorResponse),
}

impl ControlPayload {
    /// Protokollname der Nachricht (fuer Logs und Metrik-Labels)
    pub fn typ_name(&self) -> &'static str {
        match self {
            ControlPayload::GetRouterRtpCapabilities(_) => "getRouterRtpCapabilities",
            ControlPayload::RouterRtpCapabilities(_) => "routerRtpCapabilities",
            ControlPayload::CreateWebRtcTransport(_) => "createWebRtcTransport",
            ControlPayload::WebRtcTransportCreated(_) => "webRtcTransportCreated",
            ControlPayload::ConnectTransport(_) => "connectTransport",
            ControlPayload::TransportConnected(_) => "transportConnected",
            ControlPayload::CloseTransport(_) => "closeTransport",
            ControlPayload::Produce(_) => "produce",
            ControlPayload::Produced(_) => "produced",
            ControlPayload::CloseProducer(_) => "closeProducer",
            ControlPayload::GetProducers(_) => "getProducers",
            ControlPayload::ProducerList(_) => "producerList",
            ControlPayload::Consume(_) => "consume",
            ControlPayload::Consumed(_) => "consumed",
            ControlPayload::NewProducer(_) => "newProducer",
            ControlPayload::ProducerClosed(_) => "producerClosed",
            ControlPayload::ConsumerClosed(_) => "consumerClosed",
            ControlPayload::Ping(_) => "ping",
            ControlPayload::Pong(_) => "pong",
            ControlPayload::Error(_) => "error",
        }
    }
}

/// Standardisierte Fehler-Antwort
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Control-Frame (Umschlag fuer alle Nachrichten)
// ---------------------------------------------------------------------------

/// Signaling-Nachricht mit Request/Response-Zuordnung
///
/// Jede Nachricht traegt eine `requestId` die der Client vergibt.
/// Der Server kopiert die ID in die Antwort damit der Client
/// Request und Response zuordnen kann.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlMessage {
    pub request_id: u32,
    pub payload: ControlPayload,
}

impl ControlMessage {
    /// Erstellt eine neue Control-Nachricht
    pub fn new(request_id: u32, payload: ControlPayload) -> Self {
        Self {
            request_id,
            payload,
        }
    }

    /// Erstellt ein Server-Event (ohne zugehoerigen Request)
    pub fn ereignis(payload: ControlPayload) -> Self {
        Self::new(EREIGNIS_REQUEST_ID, payload)
    }

    /// Erstellt eine Ping-Nachricht
    pub fn ping(request_id: u32, timestamp_ms: u64) -> Self {
        Self::new(
            request_id,
            ControlPayload::Ping(PingMessage { timestamp_ms }),
        )
    }

    /// Erstellt eine Pong-Antwort
    pub fn pong(request_id: u32, echo_timestamp_ms: u64, server_timestamp_ms: u64) -> Self {
        Self::new(
            request_id,
            ControlPayload::Pong(PongMessage {
                echo_timestamp_ms,
                server_timestamp_ms,
            }),
        )
    }

    /// Erstellt eine Fehler-Antwort
    pub fn error(request_id: u32, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(
            request_id,
            ControlPayload::Error(ErrorResponse {
                code,
                message: message.into(),
            }),
        )
    }

    /// Erstellt eine Fehler-Antwort aus einem RelaisError
    ///
    /// Fehlende Transports und inkompatible Capabilities werden mit den
    /// Texten gemeldet, die bestehende Clients erwarten.
    pub fn fehler(request_id: u32, fehler: &RelaisError) -> Self {
        let message = match fehler {
            RelaisError::TransportNichtGefunden(_) => "Transport not found".to_string(),
            RelaisError::CapabilityMismatch(_) => "Cannot consume".to_string(),
            anderer => anderer.to_string(),
        };
        Self::error(request_id, ErrorCode::from(fehler), message)
    }

    /// Serialisiert die Nachricht als JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserialisiert eine Nachricht aus JSON
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
