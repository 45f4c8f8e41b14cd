//! Wire-Format fuer TCP-Verbindungen
//!
//! Frame-basiertes Protokoll: Length(u32 big-endian) + JSON-Payload.
//!
//! ## Frame-Format
//!
//! ```text
//! +--------+--------+--------+--------+----...----+
//! | Laenge (u32 BE) | 4 Bytes        | Payload    |
//! +--------+--------+--------+--------+----...----+
//! ```
//!
//! Die Laenge gibt die Anzahl der Payload-Bytes an (ohne die 4 Laengen-Bytes).
//! Maximale Frame-Groesse ist konfigurierbar (Standard: 1 MB).
//!
//! Ein Frame mit kaputtem JSON oder unbekanntem Nachrichtentyp beendet die
//! Verbindung nicht: der Decoder liefert `Eingang::Ungueltig`, damit der
//! Server mit `INVALID_REQUEST` antworten kann. Nur ein ueberlanger Frame ist
//! fatal, weil danach keine Frame-Grenze mehr bekannt ist.

use bytes::{Buf, BufMut, BytesMut};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, Encoder};

use crate::control::ControlMessage;

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Standard-maximale Frame-Groesse (1 MB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Groesse des Laengen-Felds in Bytes
pub const LENGTH_FIELD_SIZE: usize = 4;

// ---------------------------------------------------------------------------
// Eingang
// ---------------------------------------------------------------------------

/// Ergebnis der Dekodierung eines vollstaendigen Frames
#[derive(Debug, Clone)]
pub enum Eingang {
    /// Gueltige Nachricht
    Nachricht(ControlMessage),
    /// Frame war vollstaendig, aber keine gueltige Nachricht
    Ungueltig {
        /// `requestId` falls sie sich aus dem JSON lesen liess, sonst 0
        request_id: u32,
        grund: String,
    },
}

impl Eingang {
    /// Dekodiert eine Payload; schlaegt nie fehl
    pub fn aus_bytes(payload: &[u8]) -> Self {
        let wert: serde_json::Value = match serde_json::from_slice(payload) {
            Ok(w) => w,
            Err(e) => {
                return Eingang::Ungueltig {
                    request_id: 0,
                    grund: format!("Kein gueltiges JSON: {e}"),
                }
            }
        };

        let request_id = wert
            .get("requestId")
            .and_then(serde_json::Value::as_u64)
            .and_then(|id| u32::try_from(id).ok())
            .unwrap_or(0);

        match serde_json::from_value::<ControlMessage>(wert) {
            Ok(nachricht) => Eingang::Nachricht(nachricht),
            Err(e) => Eingang::Ungueltig {
                request_id,
                grund: format!("Ungueltige Nachricht: {e}"),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// FrameCodec
// ---------------------------------------------------------------------------

/// tokio-util Codec fuer frame-basierte TCP-Verbindungen
///
/// Implementiert `Encoder<ControlMessage>` und `Decoder<Item = Eingang>` fuer nahtlose
/// Integration mit `tokio_util::codec::Framed`.
///
/// # Beispiel
///
/// ```rust,no_run
/// use tokio_util::codec::Framed;
/// use relais_protocol::wire::FrameCodec;
///
/// // let stream = TcpStream::connect(...).await?;
/// // let framed = Framed::new(stream, FrameCodec::new());
/// ```
#[derive(Debug, Clone)]
pub struct FrameCodec {
    /// Maximale erlaubte Frame-Groesse in Bytes
    max_frame_size: usize,
}

impl FrameCodec {
    /// Erstellt einen neuen `FrameCodec` mit Standard-Limits
    pub fn new() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Erstellt einen `FrameCodec` mit benutzerdefinierter maximaler Frame-Groesse
    pub fn with_max_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// Gibt die konfigurierte maximale Frame-Groesse zurueck
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Decoder-Implementierung
// ---------------------------------------------------------------------------

impl Decoder for FrameCodec {
    type Item = Eingang;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Warte auf mindestens 4 Bytes fuer das Laengen-Feld
        if src.len() < LENGTH_FIELD_SIZE {
            return Ok(None);
        }

        // Laenge lesen (big-endian u32) ohne den Buffer zu veraendern
        let length = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;

        // Keine Resynchronisation moeglich – Verbindung muss beendet werden
        laenge_pruefen(length, self.max_frame_size)?;

        // Pruefen ob der vollstaendige Frame bereits im Buffer ist
        let total_size = LENGTH_FIELD_SIZE + length;
        if src.len() < total_size {
            // Speicher vorbelegen um Reallocations zu vermeiden
            src.reserve(total_size - src.len());
            return Ok(None);
        }

        // Laengen-Feld verbrauchen
        src.advance(LENGTH_FIELD_SIZE);

        // Payload-Bytes extrahieren
        let payload = src.split_to(length);

        Ok(Some(Eingang::aus_bytes(&payload)))
    }
}

// ---------------------------------------------------------------------------
// Encoder-Implementierung
// ---------------------------------------------------------------------------

impl Encoder<ControlMessage> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, item: ControlMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        // JSON serialisieren
        let json = serde_json::to_vec(&item).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("JSON-Serialisierung fehlgeschlagen: {}", e),
            )
        })?;

        laenge_pruefen(json.len(), self.max_frame_size)?;

        // Laengen-Feld + Payload schreiben
        dst.reserve(LENGTH_FIELD_SIZE + json.len());
        dst.put_u32(json.len() as u32);
        dst.put_slice(&json);

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Hilfsfunktionen fuer direktes async Lesen/Schreiben
// ---------------------------------------------------------------------------

fn laenge_pruefen(laenge: usize, maximum: usize) -> io::Result<()> {
    if laenge > maximum {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Frame zu gross: {laenge} Bytes (Maximum: {maximum} Bytes)"),
        ));
    }
    Ok(())
}

/// Liest eine Server-Nachricht aus einem `AsyncRead` (Client-Seite)
///
/// Anders als der Decoder ist diese Funktion strikt: Server senden nur
/// gueltige Nachrichten, alles andere ist ein `InvalidData`-Fehler.
pub async fn read_frame<R>(reader: &mut R, max_frame_size: usize) -> io::Result<ControlMessage>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; LENGTH_FIELD_SIZE];
    reader.read_exact(&mut len_buf).await?;
    let length = u32::from_be_bytes(len_buf) as usize;
    laenge_pruefen(length, max_frame_size)?;

    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload).await?;

    match Eingang::aus_bytes(&payload) {
        Eingang::Nachricht(nachricht) => Ok(nachricht),
        Eingang::Ungueltig { grund, .. } => Err(io::Error::new(io::ErrorKind::InvalidData, grund)),
    }
}

/// Schreibt eine Nachricht als Frame in einen `AsyncWrite` (Client-Seite)
pub async fn write_frame<W>(
    writer: &mut W,
    message: &ControlMessage,
    max_frame_size: usize,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let json = serde_json::to_vec(message)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    laenge_pruefen(json.len(), max_frame_size)?;

    writer.write_all(&(json.len() as u32).to_be_bytes()).await?;
    writer.write_all(&json).await?;
    writer.flush().await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
