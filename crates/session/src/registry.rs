//! Session-Registry
//!
//! Aufbau:
//! - `raeume`: DashMap<RoomId, Arc<RaumEintrag>>, jeder Raum mit eigenem
//!   `parking_lot::Mutex` um seine Tabellen
//! - Sekundaerindizes Transport/Producer/Consumer -> RoomId
//!
//! Sperr-Reihenfolge: `raeume`-Shard, dann Raum-Mutex, dann Indizes. Ueber
//! ein `.await` wird keine Sperre gehalten; der Routing-Kontext eines Raums
//! wird ueber eine `OnceCell` genau einmal erzeugt.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use relais_core::{
    ConsumerId, MediaKind, PeerId, ProducerId, RelaisError, Result, RoomId, TransportId,
};
use relais_engine::{
    standard_media_codecs, ConsumerHandle, MediaEngine, ProducerHandle, RouterOptionen,
    RoutingContext,
};
use relais_protocol::rtp::{RtpCodecCapability, RtpParameters};
use tokio::sync::OnceCell;

use crate::model::{
    Bereinigung, ConsumerInfo, EntfernterConsumer, EntfernterProducer, ProducerInfo,
    RegistryStatistik, TransportInfo, TransportZustand,
};

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Konfiguration der Registry
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Codecs fuer neue Raum-Router
    pub media_codecs: Vec<RtpCodecCapability>,
    /// Leere Raeume ohne Transports entfernen
    pub raeume_automatisch_entfernen: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            media_codecs: standard_media_codecs(),
            raeume_automatisch_entfernen: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Interne Tabellen
// ---------------------------------------------------------------------------

struct TransportEintrag {
    peer_id: PeerId,
    zustand: TransportZustand,
    erstellt_am: DateTime<Utc>,
}

struct ProducerEintrag {
    transport_id: TransportId,
    peer_id: PeerId,
    kind: MediaKind,
    rtp_parameters: RtpParameters,
    erstellt_am: DateTime<Utc>,
}

struct ConsumerEintrag {
    transport_id: TransportId,
    peer_id: PeerId,
    producer_id: ProducerId,
    kind: MediaKind,
    pausiert: bool,
}

#[derive(Default)]
struct RaumZustand {
    mitglieder: HashSet<PeerId>,
    transports: HashMap<TransportId, TransportEintrag>,
    producers: HashMap<ProducerId, ProducerEintrag>,
    consumers: HashMap<ConsumerId, ConsumerEintrag>,
}

impl RaumZustand {
    fn ist_verwaist(&self) -> bool {
        self.mitglieder.is_empty() && self.transports.is_empty()
    }

    fn producer_info(&self, room_id: &RoomId, id: ProducerId) -> Option<ProducerInfo> {
        self.producers.get(&id).map(|p| ProducerInfo {
            id,
            room_id: room_id.clone(),
            transport_id: p.transport_id,
            peer_id: p.peer_id,
            kind: p.kind,
            rtp_parameters: p.rtp_parameters.clone(),
            erstellt_am: p.erstellt_am,
        })
    }

    /// Entfernt einen Producer und alle Consumer die ihn referenzieren
    fn producer_entfernen(&mut self, producer_id: ProducerId, bereinigung: &mut Bereinigung) {
        let Some(producer) = self.producers.remove(&producer_id) else {
            return;
        };
        bereinigung.producers.push(EntfernterProducer {
            id: producer_id,
            peer_id: producer.peer_id,
        });

        let abhaengig: Vec<ConsumerId> = self
            .consumers
            .iter()
            .filter(|(_, c)| c.producer_id == producer_id)
            .map(|(id, _)| *id)
            .collect();
        for consumer_id in abhaengig {
            self.consumer_entfernen(consumer_id, bereinigung);
        }
    }

    fn consumer_entfernen(&mut self, consumer_id: ConsumerId, bereinigung: &mut Bereinigung) {
        if let Some(consumer) = self.consumers.remove(&consumer_id) {
            bereinigung.consumers.push(EntfernterConsumer {
                id: consumer_id,
                peer_id: consumer.peer_id,
                producer_id: consumer.producer_id,
            });
        }
    }

    /// Entfernt einen Transport samt seiner Producer und Consumer
    ///
    /// Consumer auf anderen Transports, die einen entfernten Producer
    /// referenzieren, werden mit entfernt.
    fn transport_entfernen(&mut self, transport_id: TransportId, bereinigung: &mut Bereinigung) {
        if self.transports.remove(&transport_id).is_none() {
            return;
        }
        bereinigung.transports.push(transport_id);

        let eigene_producer: Vec<ProducerId> = self
            .producers
            .iter()
            .filter(|(_, p)| p.transport_id == transport_id)
            .map(|(id, _)| *id)
            .collect();
        for producer_id in eigene_producer {
            self.producer_entfernen(producer_id, bereinigung);
        }

        let eigene_consumer: Vec<ConsumerId> = self
            .consumers
            .iter()
            .filter(|(_, c)| c.transport_id == transport_id)
            .map(|(id, _)| *id)
            .collect();
        for consumer_id in eigene_consumer {
            self.consumer_entfernen(consumer_id, bereinigung);
        }
    }
}

struct RaumEintrag {
    routing: OnceCell<RoutingContext>,
    zustand: Mutex<RaumZustand>,
}

impl RaumEintrag {
    fn neu() -> Arc<Self> {
        Arc::new(Self {
            routing: OnceCell::new(),
            zustand: Mutex::new(RaumZustand::default()),
        })
    }
}

struct RegistryInner {
    engine: Arc<dyn MediaEngine>,
    config: RegistryConfig,
    raeume: DashMap<RoomId, Arc<RaumEintrag>>,
    transport_index: DashMap<TransportId, RoomId>,
    producer_index: DashMap<ProducerId, RoomId>,
    consumer_index: DashMap<ConsumerId, RoomId>,
}

// ---------------------------------------------------------------------------
// SessionRegistry
// ---------------------------------------------------------------------------

/// Autoritative Sitzungs-Registry
///
/// Clone ist guenstig (Arc); alle Klone teilen denselben Zustand.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

impl SessionRegistry {
    /// Erstellt eine leere Registry
    pub fn neu(engine: Arc<dyn MediaEngine>, config: RegistryConfig) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                engine,
                config,
                raeume: DashMap::new(),
                transport_index: DashMap::new(),
                producer_index: DashMap::new(),
                consumer_index: DashMap::new(),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Raeume
    // -----------------------------------------------------------------------

    /// Liefert den Routing-Kontext eines Raums und legt den Raum bei Bedarf an
    ///
    /// Bei gleichzeitigem Erstzugriff wird der Kontext genau einmal von der
    /// Engine erzeugt; alle Aufrufer erhalten denselben Kontext.
    pub async fn raum_sicherstellen(&self, room_id: &RoomId) -> Result<RoutingContext> {
        let eintrag = self
            .inner
            .raeume
            .entry(room_id.clone())
            .or_insert_with(RaumEintrag::neu)
            .clone();
        self.routing_initialisieren(room_id, &eintrag).await
    }

    /// Wie [`raum_sicherstellen`](Self::raum_sicherstellen), traegt den Peer
    /// aber atomar mit der Anlage als Mitglied ein
    ///
    /// Schlaegt die Router-Erstellung fehl, wird die Mitgliedschaft wieder
    /// entfernt.
    pub async fn raum_beitreten(
        &self,
        room_id: &RoomId,
        peer_id: PeerId,
    ) -> Result<RoutingContext> {
        let (eintrag, neu_beigetreten) = {
            let guard = self
                .inner
                .raeume
                .entry(room_id.clone())
                .or_insert_with(RaumEintrag::neu);
            let neu_beigetreten = guard.zustand.lock().mitglieder.insert(peer_id);
            (guard.clone(), neu_beigetreten)
        };

        if neu_beigetreten {
            tracing::debug!(room_id = %room_id, peer_id = %peer_id, "Peer tritt Raum bei");
        }

        match self.routing_initialisieren(room_id, &eintrag).await {
            Ok(routing) => Ok(routing),
            Err(e) => {
                if neu_beigetreten {
                    self.raum_verlassen(room_id, peer_id);
                }
                Err(e)
            }
        }
    }

    async fn routing_initialisieren(
        &self,
        room_id: &RoomId,
        eintrag: &RaumEintrag,
    ) -> Result<RoutingContext> {
        let routing = eintrag
            .routing
            .get_or_try_init(|| async {
                let optionen = RouterOptionen {
                    room_id: room_id.clone(),
                    media_codecs: self.inner.config.media_codecs.clone(),
                };
                let routing = self.inner.engine.routing_kontext_erstellen(&optionen).await?;
                tracing::info!(room_id = %room_id, router_id = %routing.router_id, "Raum erstellt");
                Ok::<_, RelaisError>(routing)
            })
            .await?;
        Ok(routing.clone())
    }

    /// Entfernt die Mitgliedschaft eines Peers
    ///
    /// Ist der Raum danach leer und ohne Transports, wird er entfernt (sofern
    /// aktiviert). Der Routing-Kontext des entfernten Raums wird zurueckgegeben,
    /// damit der Aufrufer ihn in der Engine schliesst.
    pub fn raum_verlassen(&self, room_id: &RoomId, peer_id: PeerId) -> Option<RoutingContext> {
        let entfernen = self.inner.config.raeume_automatisch_entfernen;
        let (_, eintrag) = self.inner.raeume.remove_if(room_id, |_, raum| {
            let mut zustand = raum.zustand.lock();
            zustand.mitglieder.remove(&peer_id);
            entfernen && zustand.ist_verwaist()
        })?;

        tracing::info!(room_id = %room_id, "Leerer Raum entfernt");
        eintrag.routing.get().cloned()
    }

    /// Routing-Kontext eines bestehenden Raums
    pub fn routing_kontext(&self, room_id: &RoomId) -> Result<RoutingContext> {
        self.inner
            .raeume
            .get(room_id)
            .and_then(|raum| raum.routing.get().cloned())
            .ok_or_else(|| RelaisError::RaumNichtGefunden(room_id.clone()))
    }

    pub fn raum_existiert(&self, room_id: &RoomId) -> bool {
        self.inner.raeume.contains_key(room_id)
    }

    /// Mitglieder eines Raums (leer wenn der Raum nicht existiert)
    pub fn mitglieder(&self, room_id: &RoomId) -> Vec<PeerId> {
        self.inner
            .raeume
            .get(room_id)
            .map(|raum| raum.zustand.lock().mitglieder.iter().copied().collect())
            .unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // Transports
    // -----------------------------------------------------------------------

    /// Registriert einen von der Engine erzeugten Transport
    ///
    /// Der Besitzer wird unter derselben Sperre Mitglied des Raums, damit
    /// ein fehlgeschlagener Engine-Aufruf keine Mitgliedschaft hinterlaesst.
    pub fn transport_registrieren(
        &self,
        room_id: &RoomId,
        peer_id: PeerId,
        transport_id: TransportId,
    ) -> Result<TransportId> {
        let raum = self
            .inner
            .raeume
            .get(room_id)
            .ok_or_else(|| RelaisError::RaumNichtGefunden(room_id.clone()))?;
        let mut zustand = raum.zustand.lock();
        zustand.mitglieder.insert(peer_id);
        zustand.transports.insert(
            transport_id,
            TransportEintrag {
                peer_id,
                zustand: TransportZustand::Pending,
                erstellt_am: Utc::now(),
            },
        );
        self.inner
            .transport_index
            .insert(transport_id, room_id.clone());

        tracing::debug!(room_id = %room_id, peer_id = %peer_id, transport_id = %transport_id, "Transport registriert");
        Ok(transport_id)
    }

    /// Momentaufnahme eines Transports
    pub fn transport_info(&self, transport_id: &TransportId) -> Result<TransportInfo> {
        let room_id = self.raum_fuer_transport(transport_id)?;
        let raum = self
            .inner
            .raeume
            .get(&room_id)
            .ok_or(RelaisError::TransportNichtGefunden(*transport_id))?;
        let zustand = raum.zustand.lock();
        let t = zustand
            .transports
            .get(transport_id)
            .ok_or(RelaisError::TransportNichtGefunden(*transport_id))?;
        Ok(TransportInfo {
            id: *transport_id,
            room_id: room_id.clone(),
            peer_id: t.peer_id,
            zustand: t.zustand,
            erstellt_am: t.erstellt_am,
        })
    }

    /// Markiert einen Transport als verbunden
    pub fn transport_verbunden_markieren(
        &self,
        transport_id: &TransportId,
    ) -> Result<TransportZustand> {
        self.mit_transport(transport_id, |_, t| {
            t.zustand = t.zustand.uebergang(TransportZustand::Connected)?;
            Ok(t.zustand)
        })
    }

    /// Schliesst einen Transport samt Kaskade
    ///
    /// Unbekannte oder bereits geschlossene Transports ergeben eine leere
    /// Bereinigung.
    pub fn transport_schliessen(&self, transport_id: &TransportId) -> Bereinigung {
        let Some(room_id) = self
            .inner
            .transport_index
            .get(transport_id)
            .map(|r| r.value().clone())
        else {
            return Bereinigung::default();
        };

        let mut bereinigung = Bereinigung {
            room_id: Some(room_id.clone()),
            ..Default::default()
        };
        if let Some(raum) = self.inner.raeume.get(&room_id) {
            let mut zustand = raum.zustand.lock();
            zustand.transport_entfernen(*transport_id, &mut bereinigung);
            self.indizes_bereinigen(&bereinigung);
        }
        // Index auch dann entfernen wenn der Raum schon weg ist
        self.inner.transport_index.remove(transport_id);

        if !bereinigung.ist_leer() {
            tracing::debug!(
                transport_id = %transport_id,
                producers = bereinigung.producers.len(),
                consumers = bereinigung.consumers.len(),
                "Transport geschlossen"
            );
        }
        bereinigung
    }

    /// Alle Transports eines Peers
    pub fn transports_von_peer(&self, peer_id: PeerId) -> Vec<TransportId> {
        self.inner
            .raeume
            .iter()
            .flat_map(|raum| {
                raum.zustand
                    .lock()
                    .transports
                    .iter()
                    .filter(|(_, t)| t.peer_id == peer_id)
                    .map(|(id, _)| *id)
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Producer
    // -----------------------------------------------------------------------

    /// Erfasst einen von der Engine erzeugten Producer
    ///
    /// Der Producer wird im Raum des Transports auffindbar. Die Rueckgabe
    /// enthaelt alles was fuer die `newProducer`-Benachrichtigung noetig ist.
    pub fn producer_erfassen(
        &self,
        transport_id: &TransportId,
        producer: &ProducerHandle,
    ) -> Result<ProducerInfo> {
        let room_id = self.raum_fuer_transport(transport_id)?;
        let raum = self
            .inner
            .raeume
            .get(&room_id)
            .ok_or(RelaisError::TransportNichtGefunden(*transport_id))?;
        let mut zustand = raum.zustand.lock();
        // Transport kann waehrend des Engine-Aufrufs geschlossen worden sein
        let peer_id = zustand
            .transports
            .get(transport_id)
            .map(|t| t.peer_id)
            .ok_or(RelaisError::TransportNichtGefunden(*transport_id))?;

        zustand.producers.insert(
            producer.id,
            ProducerEintrag {
                transport_id: *transport_id,
                peer_id,
                kind: producer.kind,
                rtp_parameters: producer.rtp_parameters.clone(),
                erstellt_am: Utc::now(),
            },
        );
        self.inner.producer_index.insert(producer.id, room_id.clone());

        tracing::debug!(room_id = %room_id, producer_id = %producer.id, kind = %producer.kind, "Producer erfasst");
        zustand
            .producer_info(&room_id, producer.id)
            .ok_or_else(|| RelaisError::intern("Producer nach Einfuegen nicht auffindbar"))
    }

    /// Momentaufnahme eines Producers
    pub fn producer_info(&self, producer_id: &ProducerId) -> Result<ProducerInfo> {
        let room_id = self.raum_fuer_producer(producer_id)?;
        let raum = self
            .inner
            .raeume
            .get(&room_id)
            .ok_or(RelaisError::ProducerNichtGefunden(*producer_id))?;
        let zustand = raum.zustand.lock();
        zustand
            .producer_info(&room_id, *producer_id)
            .ok_or(RelaisError::ProducerNichtGefunden(*producer_id))
    }

    /// Schliesst einen Producer und alle davon abhaengigen Consumer
    pub fn producer_schliessen(&self, producer_id: &ProducerId) -> Bereinigung {
        let Some(room_id) = self
            .inner
            .producer_index
            .get(producer_id)
            .map(|r| r.value().clone())
        else {
            return Bereinigung::default();
        };

        let mut bereinigung = Bereinigung {
            room_id: Some(room_id.clone()),
            ..Default::default()
        };
        if let Some(raum) = self.inner.raeume.get(&room_id) {
            let mut zustand = raum.zustand.lock();
            zustand.producer_entfernen(*producer_id, &mut bereinigung);
            self.indizes_bereinigen(&bereinigung);
        }
        self.inner.producer_index.remove(producer_id);
        bereinigung
    }

    /// Raum eines Producers
    pub fn raum_fuer_producer(&self, producer_id: &ProducerId) -> Result<RoomId> {
        self.inner
            .producer_index
            .get(producer_id)
            .map(|r| r.value().clone())
            .ok_or(RelaisError::ProducerNichtGefunden(*producer_id))
    }

    /// Alle Producer eines Raums (fuer spaet beitretende Peers)
    pub fn producers_im_raum(&self, room_id: &RoomId) -> Result<Vec<ProducerInfo>> {
        let raum = self
            .inner
            .raeume
            .get(room_id)
            .ok_or_else(|| RelaisError::RaumNichtGefunden(room_id.clone()))?;
        let zustand = raum.zustand.lock();
        let mut producers: Vec<ProducerInfo> = zustand
            .producers
            .keys()
            .filter_map(|id| zustand.producer_info(room_id, *id))
            .collect();
        producers.sort_by_key(|p| p.erstellt_am);
        Ok(producers)
    }

    // -----------------------------------------------------------------------
    // Consumer
    // -----------------------------------------------------------------------

    /// Erfasst einen von der Engine erzeugten Consumer
    ///
    /// Fehlerreihenfolge: unbekannter Transport, Producer nicht im Raum des
    /// Transports, inkompatible Capabilities (`kompatibel == false`).
    pub fn consumer_erfassen(
        &self,
        transport_id: &TransportId,
        producer_id: &ProducerId,
        consumer: &ConsumerHandle,
        kompatibel: bool,
    ) -> Result<ConsumerInfo> {
        let room_id = self.raum_fuer_transport(transport_id)?;
        let raum = self
            .inner
            .raeume
            .get(&room_id)
            .ok_or(RelaisError::TransportNichtGefunden(*transport_id))?;
        let mut zustand = raum.zustand.lock();

        let peer_id = zustand
            .transports
            .get(transport_id)
            .map(|t| t.peer_id)
            .ok_or(RelaisError::TransportNichtGefunden(*transport_id))?;
        let kind = zustand
            .producers
            .get(producer_id)
            .map(|p| p.kind)
            .ok_or(RelaisError::ProducerNichtGefunden(*producer_id))?;
        if !kompatibel {
            return Err(RelaisError::CapabilityMismatch(*producer_id));
        }

        zustand.consumers.insert(
            consumer.id,
            ConsumerEintrag {
                transport_id: *transport_id,
                peer_id,
                producer_id: *producer_id,
                kind,
                pausiert: consumer.pausiert,
            },
        );
        self.inner.consumer_index.insert(consumer.id, room_id.clone());

        tracing::debug!(room_id = %room_id, consumer_id = %consumer.id, producer_id = %producer_id, "Consumer erfasst");
        Ok(ConsumerInfo {
            id: consumer.id,
            room_id: room_id.clone(),
            transport_id: *transport_id,
            peer_id,
            producer_id: *producer_id,
            kind,
            pausiert: consumer.pausiert,
        })
    }

    /// Markiert einen Consumer als fortgesetzt
    ///
    /// Gibt false zurueck wenn der Consumer inzwischen entfernt wurde.
    pub fn consumer_fortgesetzt_markieren(&self, consumer_id: &ConsumerId) -> bool {
        let Some(room_id) = self
            .inner
            .consumer_index
            .get(consumer_id)
            .map(|r| r.value().clone())
        else {
            return false;
        };
        let Some(raum) = self.inner.raeume.get(&room_id) else {
            return false;
        };
        let mut zustand = raum.zustand.lock();
        match zustand.consumers.get_mut(consumer_id) {
            Some(c) => {
                c.pausiert = false;
                true
            }
            None => false,
        }
    }

    /// Momentaufnahme eines Consumers
    pub fn consumer_info(&self, consumer_id: &ConsumerId) -> Option<ConsumerInfo> {
        let room_id = self
            .inner
            .consumer_index
            .get(consumer_id)
            .map(|r| r.value().clone())?;
        let raum = self.inner.raeume.get(&room_id)?;
        let zustand = raum.zustand.lock();
        zustand.consumers.get(consumer_id).map(|c| ConsumerInfo {
            id: *consumer_id,
            room_id: room_id.clone(),
            transport_id: c.transport_id,
            peer_id: c.peer_id,
            producer_id: c.producer_id,
            kind: c.kind,
            pausiert: c.pausiert,
        })
    }

    // -----------------------------------------------------------------------
    // Statistik
    // -----------------------------------------------------------------------

    pub fn statistik(&self) -> RegistryStatistik {
        let mitglieder = self
            .inner
            .raeume
            .iter()
            .map(|raum| raum.zustand.lock().mitglieder.len())
            .sum();
        RegistryStatistik {
            raeume: self.inner.raeume.len(),
            mitglieder,
            transports: self.inner.transport_index.len(),
            producers: self.inner.producer_index.len(),
            consumers: self.inner.consumer_index.len(),
        }
    }

    // -----------------------------------------------------------------------
    // Interne Hilfsfunktionen
    // -----------------------------------------------------------------------

    fn raum_fuer_transport(&self, transport_id: &TransportId) -> Result<RoomId> {
        self.inner
            .transport_index
            .get(transport_id)
            .map(|r| r.value().clone())
            .ok_or(RelaisError::TransportNichtGefunden(*transport_id))
    }

    /// Fuehrt `f` unter der Raum-Sperre auf dem Transport-Eintrag aus
    fn mit_transport<T>(
        &self,
        transport_id: &TransportId,
        f: impl FnOnce(&RoomId, &mut TransportEintrag) -> Result<T>,
    ) -> Result<T> {
        let room_id = self.raum_fuer_transport(transport_id)?;
        let raum = self
            .inner
            .raeume
            .get(&room_id)
            .ok_or(RelaisError::TransportNichtGefunden(*transport_id))?;
        let mut zustand = raum.zustand.lock();
        let transport = zustand
            .transports
            .get_mut(transport_id)
            .ok_or(RelaisError::TransportNichtGefunden(*transport_id))?;
        f(&room_id, transport)
    }

    fn indizes_bereinigen(&self, bereinigung: &Bereinigung) {
        for id in &bereinigung.transports {
            self.inner.transport_index.remove(id);
        }
        for p in &bereinigung.producers {
            self.inner.producer_index.remove(&p.id);
        }
        for c in &bereinigung.consumers {
            self.inner.consumer_index.remove(&c.id);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
