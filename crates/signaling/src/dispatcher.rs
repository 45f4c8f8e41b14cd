//! Message-Dispatcher – Routet ControlMessages an die richtigen Handler
//!
//! Der Dispatcher empfaengt ControlMessages einer Verbindung, bestimmt den
//! Handler und gibt die Antwort samt Folgeaktionen zurueck. Fehler der
//! Handler werden hier in `error`-Antworten uebersetzt; keine Nachricht
//! beendet die Verbindung.
//!
//! ## Folgeaktionen
//! Manche Schritte duerfen erst laufen, nachdem die Antwort geschrieben
//! wurde (ein Consumer wird erst nach `consumed` fortgesetzt). Die
//! Verbindung fuehrt sie ueber [`MessageDispatcher::nachlauf_ausfuehren`] aus.

use relais_core::{ConsumerId, PeerId, RelaisError, Result, RoomId};
use relais_engine::Ressource;
use relais_protocol::control::{ControlMessage, ControlPayload, ErrorCode};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use crate::handlers::bereinigung::bereinigung_anwenden;
use crate::handlers::{consumer_handler, producer_handler, router_handler, transport_handler};
use crate::server_state::SignalingState;

/// Dispatcher-Kontext – Informationen ueber die aktuelle Verbindung
#[derive(Debug, Clone)]
pub struct DispatcherContext {
    /// Peer-ID dieser Verbindung
    pub peer_id: PeerId,
    /// Adresse der Gegenstelle
    pub peer_addr: SocketAddr,
    /// Gebundener Raum (ab der ersten Nachricht die einen Raum nennt)
    pub raum: Option<RoomId>,
}

impl DispatcherContext {
    pub fn neu(peer_id: PeerId, peer_addr: SocketAddr) -> Self {
        Self {
            peer_id,
            peer_addr,
            raum: None,
        }
    }
}

/// Aktion die nach dem Senden der Antwort ausgefuehrt wird
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Folgeaktion {
    /// Pausiert angelegten Consumer fortsetzen
    ConsumerFortsetzen(ConsumerId),
}

/// Ergebnis eines Dispatch-Vorgangs
#[derive(Debug, Clone, Default)]
pub struct Antwort {
    /// Antwort an den Client (`None` bei Fire-and-forget-Nachrichten)
    pub nachricht: Option<ControlMessage>,
    /// Nach dem Senden auszufuehren
    pub nachlauf: Vec<Folgeaktion>,
}

impl Antwort {
    /// Keine Antwort
    pub fn keine() -> Self {
        Self::default()
    }

    /// Antwort ohne Folgeaktionen
    pub fn mit(nachricht: ControlMessage) -> Self {
        Self {
            nachricht: Some(nachricht),
            nachlauf: Vec::new(),
        }
    }

    /// Haengt eine Folgeaktion an
    pub fn danach(mut self, aktion: Folgeaktion) -> Self {
        self.nachlauf.push(aktion);
        self
    }

    /// Fehlercode der Antwort, falls es eine Fehler-Antwort ist
    pub fn fehlercode(&self) -> Option<ErrorCode> {
        match &self.nachricht {
            Some(ControlMessage {
                payload: ControlPayload::Error(e),
                ..
            }) => Some(e.code),
            _ => None,
        }
    }
}

/// Zentraler Message-Dispatcher
pub struct MessageDispatcher {
    state: Arc<SignalingState>,
}

impl MessageDispatcher {
    pub fn neu(state: Arc<SignalingState>) -> Self {
        Self { state }
    }

    /// Verarbeitet eine eingehende ControlMessage
    pub async fn dispatch(&self, message: ControlMessage, ctx: &mut DispatcherContext) -> Antwort {
        let request_id = message.request_id;
        let typ = message.payload.typ_name();
        let start = Instant::now();

        tracing::trace!(peer_id = %ctx.peer_id, request_id, typ, "Nachricht empfangen");

        let antwort = match self.routen(message.payload, request_id, ctx).await {
            Ok(antwort) => antwort,
            Err(fehler) => {
                if fehler.ist_wiederholbar() || matches!(fehler, RelaisError::Intern(_)) {
                    tracing::warn!(peer_id = %ctx.peer_id, request_id, typ, fehler = %fehler, "Anfrage fehlgeschlagen");
                } else {
                    tracing::debug!(peer_id = %ctx.peer_id, request_id, typ, fehler = %fehler, "Anfrage abgelehnt");
                }
                Antwort::mit(ControlMessage::fehler(request_id, &fehler))
            }
        };

        let ergebnis = antwort.fehlercode().map_or("ok", |code| code.als_str());
        self.state
            .metriken
            .anfrage_erfassen(typ, ergebnis, start.elapsed());
        antwort
    }

    async fn routen(
        &self,
        payload: ControlPayload,
        request_id: u32,
        ctx: &mut DispatcherContext,
    ) -> Result<Antwort> {
        let state = &self.state;
        match payload {
            // -------------------------------------------------------------------
            // Router
            // -------------------------------------------------------------------
            ControlPayload::GetRouterRtpCapabilities(req) => {
                router_handler::handle_get_router_rtp_capabilities(req, request_id, ctx, state)
                    .await
                    .map(Antwort::mit)
            }

            // -------------------------------------------------------------------
            // Transport
            // -------------------------------------------------------------------
            ControlPayload::CreateWebRtcTransport(req) => {
                transport_handler::handle_create_transport(req, request_id, ctx, state)
                    .await
                    .map(Antwort::mit)
            }

            ControlPayload::ConnectTransport(req) => {
                transport_handler::handle_connect_transport(req, request_id, ctx, state)
                    .await
                    .map(Antwort::mit)
            }

            ControlPayload::CloseTransport(req) => {
                transport_handler::handle_close_transport(req, ctx, state).await;
                Ok(Antwort::keine())
            }

            // -------------------------------------------------------------------
            // Producer
            // -------------------------------------------------------------------
            ControlPayload::Produce(req) => {
                producer_handler::handle_produce(req, request_id, ctx, state)
                    .await
                    .map(Antwort::mit)
            }

            ControlPayload::CloseProducer(req) => {
                producer_handler::handle_close_producer(req, ctx, state).await;
                Ok(Antwort::keine())
            }

            ControlPayload::GetProducers(req) => {
                producer_handler::handle_get_producers(req, request_id, ctx, state)
                    .await
                    .map(Antwort::mit)
            }

            // -------------------------------------------------------------------
            // Consumer
            // -------------------------------------------------------------------
            ControlPayload::Consume(req) => {
                consumer_handler::handle_consume(req, request_id, ctx, state).await
            }

            // -------------------------------------------------------------------
            // Keepalive
            // -------------------------------------------------------------------
            ControlPayload::Ping(ping) => {
                let server_ts = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_millis() as u64;
                Ok(Antwort::mit(ControlMessage::pong(
                    request_id,
                    ping.timestamp_ms,
                    server_ts,
                )))
            }

            ControlPayload::Pong(_) => {
                tracing::trace!(peer_id = %ctx.peer_id, "Pong empfangen");
                Ok(Antwort::keine())
            }

            // -------------------------------------------------------------------
            // Server->Client-Nachrichten vom Client
            // -------------------------------------------------------------------
            ControlPayload::RouterRtpCapabilities(_)
            | ControlPayload::WebRtcTransportCreated(_)
            | ControlPayload::TransportConnected(_)
            | ControlPayload::Produced(_)
            | ControlPayload::ProducerList(_)
            | ControlPayload::Consumed(_)
            | ControlPayload::NewProducer(_)
            | ControlPayload::ProducerClosed(_)
            | ControlPayload::ConsumerClosed(_)
            | ControlPayload::Error(_) => {
                tracing::warn!(
                    peer_id = %ctx.peer_id,
                    request_id,
                    "Unerwartete Server->Client Nachricht vom Client empfangen"
                );
                Err(RelaisError::ungueltig("Unerwartete Nachricht"))
            }
        }
    }

    /// Antwort auf einen Frame der keine gueltige Nachricht war
    pub fn ungueltig(&self, request_id: u32, grund: &str) -> ControlMessage {
        self.state
            .metriken
            .anfrage_erfassen("unbekannt", ErrorCode::InvalidRequest.als_str(), Default::default());
        ControlMessage::error(request_id, ErrorCode::InvalidRequest, grund)
    }

    /// Fuehrt die Folgeaktionen einer Antwort aus
    pub async fn nachlauf_ausfuehren(&self, nachlauf: Vec<Folgeaktion>) {
        for aktion in nachlauf {
            match aktion {
                Folgeaktion::ConsumerFortsetzen(consumer_id) => {
                    match self.state.engine.fortsetzen(&consumer_id).await {
                        Ok(()) => {
                            if !self.state.registry.consumer_fortgesetzt_markieren(&consumer_id) {
                                tracing::debug!(consumer_id = %consumer_id, "Consumer vor dem Fortsetzen entfernt");
                            }
                        }
                        Err(e) => {
                            tracing::warn!(consumer_id = %consumer_id, fehler = %e, "Consumer konnte nicht fortgesetzt werden");
                        }
                    }
                }
            }
        }
    }

    /// Bereinigt alle Ressourcen eines Peers beim Trennen
    ///
    /// Schliesst alle eigenen Transports samt Kaskade und verlaesst den Raum.
    /// Ein zweiter Aufruf ist ein No-op.
    pub async fn peer_cleanup(&self, ctx: &DispatcherContext) {
        let state = &self.state;

        for transport_id in state.registry.transports_von_peer(ctx.peer_id) {
            let bereinigung = state.registry.transport_schliessen(&transport_id);
            bereinigung_anwenden(state, &bereinigung, Some(ctx.peer_id)).await;
        }

        if let Some(room_id) = &ctx.raum {
            if let Some(routing) = state.registry.raum_verlassen(room_id, ctx.peer_id) {
                state
                    .engine
                    .schliessen(Ressource::Router(routing.router_id))
                    .await;
            }
        }

        state.broadcaster.peer_entfernen(&ctx.peer_id);
        state.peers.peer_getrennt(&ctx.peer_id);

        tracing::debug!(peer_id = %ctx.peer_id, "Peer-Ressourcen bereinigt");
    }
}
