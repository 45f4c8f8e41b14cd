//! RTP-, ICE- und DTLS-Parametertypen
//!
//! Die Typen spiegeln das JSON-Format wider, das WebRTC-Clients (z.B.
//! mediasoup-client) im Signaling austauschen. Der Signaling-Layer
//! interpretiert sie nur soweit noetig (Kind-Pruefung, Codec-Abgleich);
//! alles andere wird unveraendert an die Media-Engine durchgereicht.

use relais_core::MediaKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Capabilities (Router und Client)
// ---------------------------------------------------------------------------

/// RTCP-Feedback-Eintrag eines Codecs (z.B. `nack`, `transport-cc`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RtcpFeedback {
    #[serde(rename = "type")]
    pub typ: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub parameter: String,
}

/// Codec-Faehigkeit eines Routers oder Clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpCodecCapability {
    pub kind: MediaKind,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_payload_type: Option<u8>,
    pub clock_rate: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<u8>,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub rtcp_feedback: Vec<RtcpFeedback>,
}

impl RtpCodecCapability {
    /// Prueft ob diese Faehigkeit einen konkreten Codec abdeckt
    ///
    /// Verglichen werden MIME-Typ (ohne Gross-/Kleinschreibung), Taktrate und
    /// bei Audio die Kanalanzahl.
    pub fn deckt_ab(&self, codec: &RtpCodecParameters) -> bool {
        self.mime_type.eq_ignore_ascii_case(&codec.mime_type)
            && self.clock_rate == codec.clock_rate
            && (self.kind == MediaKind::Video || self.channels.unwrap_or(1) == codec.channels.unwrap_or(1))
    }
}

/// RTP-Header-Extension einer Capability-Liste
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpHeaderExtension {
    pub kind: MediaKind,
    pub uri: String,
    pub preferred_id: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
}

/// Vollstaendige RTP-Capabilities (Router-Descriptor oder Client-Angebot)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpCapabilities {
    #[serde(default)]
    pub codecs: Vec<RtpCodecCapability>,
    #[serde(default)]
    pub header_extensions: Vec<RtpHeaderExtension>,
}

impl RtpCapabilities {
    /// Sucht die erste Faehigkeit die den gegebenen Codec abdeckt
    pub fn codec_fuer(&self, codec: &RtpCodecParameters) -> Option<&RtpCodecCapability> {
        self.codecs.iter().find(|c| c.deckt_ab(codec))
    }
}

// ---------------------------------------------------------------------------
// RTP-Parameter (Producer/Consumer)
// ---------------------------------------------------------------------------

/// Konkreter Codec eines Producers oder Consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpCodecParameters {
    pub mime_type: String,
    pub payload_type: u8,
    pub clock_rate: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<u8>,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub rtcp_feedback: Vec<RtcpFeedback>,
}

/// Ausgehandelte Header-Extension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RtpHeaderExtensionParameters {
    pub uri: String,
    pub id: u16,
}

/// Encoding (Simulcast-Layer oder einzelner Stream)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpEncodingParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssrc: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_bitrate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scalability_mode: Option<String>,
}

/// RTCP-Einstellungen
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtcpParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cname: Option<String>,
    #[serde(default = "standard_reduced_size")]
    pub reduced_size: bool,
}

fn standard_reduced_size() -> bool {
    true
}

/// RTP-Parameter eines Producers oder Consumers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mid: Option<String>,
    pub codecs: Vec<RtpCodecParameters>,
    #[serde(default)]
    pub header_extensions: Vec<RtpHeaderExtensionParameters>,
    #[serde(default)]
    pub encodings: Vec<RtpEncodingParameters>,
    #[serde(default)]
    pub rtcp: RtcpParameters,
}

impl RtpParameters {
    /// Prueft die Form der Parameter gegen die angegebene Medienart
    ///
    /// Mindestens ein Codec muss vorhanden sein, und jeder MIME-Typ muss zur
    /// Art passen (`audio/...` bzw. `video/...`).
    pub fn pruefen(&self, kind: MediaKind) -> Result<(), String> {
        if self.codecs.is_empty() {
            return Err("rtpParameters enthalten keinen Codec".into());
        }
        let praefix = format!("{}/", kind.als_str());
        for codec in &self.codecs {
            if !codec.mime_type.to_ascii_lowercase().starts_with(&praefix) {
                return Err(format!(
                    "Codec {} passt nicht zur Medienart {}",
                    codec.mime_type, kind
                ));
            }
        }
        Ok(())
    }

    /// Primaerer Codec (der erste in der Liste)
    pub fn primaerer_codec(&self) -> Option<&RtpCodecParameters> {
        self.codecs.first()
    }
}

// ---------------------------------------------------------------------------
// ICE / DTLS
// ---------------------------------------------------------------------------

/// ICE-Zugangsdaten eines Transports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceParameters {
    pub username_fragment: String,
    pub password: String,
    #[serde(default)]
    pub ice_lite: bool,
}

/// Transportprotokoll eines ICE-Kandidaten
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportProtocol {
    Udp,
    Tcp,
}

/// ICE-Kandidat des Servers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub foundation: String,
    pub priority: u32,
    pub ip: String,
    pub protocol: TransportProtocol,
    pub port: u16,
    #[serde(rename = "type")]
    pub typ: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcp_type: Option<String>,
}

/// DTLS-Rolle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DtlsRole {
    #[default]
    Auto,
    Client,
    Server,
}

/// Zertifikats-Fingerprint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DtlsFingerprint {
    pub algorithm: String,
    pub value: String,
}

/// DTLS-Parameter eines Endpunkts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DtlsParameters {
    #[serde(default)]
    pub role: DtlsRole,
    pub fingerprints: Vec<DtlsFingerprint>,
}

impl DtlsParameters {
    /// Prueft ob mindestens ein Fingerprint angegeben wurde
    pub fn pruefen(&self) -> Result<(), String> {
        if self.fingerprints.is_empty() {
            return Err("dtlsParameters enthalten keinen Fingerprint".into());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
