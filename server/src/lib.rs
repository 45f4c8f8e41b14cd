//! relais-server – Bibliotheks-Root
//!
//! Verdrahtet Engine, Registry, Signaling und Observability zu einem
//! lauffaehigen Server.

pub mod config;

use anyhow::Result;
use config::{EngineArt, ServerConfig};
use relais_engine::{LokaleEngine, MediaEngine};
use relais_observability::{observability_server_starten, HealthState, RelaisMetrics};
use relais_signaling::{SignalingServer, SignalingState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
    pub state: Arc<SignalingState>,
    pub health: HealthState,
}

impl Server {
    /// Erstellt die konfigurierte Engine sowie Registry und Metriken
    pub async fn neu(config: ServerConfig) -> Result<Self> {
        let engine = engine_erstellen(&config).await?;
        Self::mit_engine(config, engine)
    }

    /// Wie [`neu`](Self::neu), aber mit einer bereits erzeugten Engine
    pub fn mit_engine(config: ServerConfig, engine: Arc<dyn MediaEngine>) -> Result<Self> {
        let metriken = RelaisMetrics::neu()?;
        let health = HealthState::neu();
        health.engine_status_setzen(engine.bereit());
        let state = SignalingState::neu(
            config.signaling_config(),
            engine,
            config.registry_config(),
            metriken,
        );
        Ok(Self {
            config,
            state,
            health,
        })
    }

    /// Startet alle Subsysteme und laeuft bis Ctrl-C
    pub async fn starten(self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let health = self.health.clone();

        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => tracing::info!("Shutdown-Signal empfangen, Server wird beendet"),
                Err(e) => tracing::error!(fehler = %e, "Ctrl-C-Handler fehlgeschlagen"),
            }
            health.annahme_setzen(false);
            let _ = shutdown_tx.send(true);
        });

        self.laufen(shutdown_rx).await
    }

    /// Laeuft bis `shutdown_rx` `true` meldet
    ///
    /// Reihenfolge:
    /// 1. Observability-Server (falls aktiviert)
    /// 2. Periodische Aktualisierung der Gauges
    /// 3. Signaling-Listener (blockiert bis Shutdown)
    pub async fn laufen(self, shutdown_rx: watch::Receiver<bool>) -> Result<()> {
        let signaling_addr = self.config.signaling_bind_adresse()?;

        tracing::info!(
            server_name = %self.config.server.name,
            signaling = %signaling_addr,
            max_peers = self.config.server.max_peers,
            "Server startet"
        );

        let observability_task = if self.config.observability.aktiviert {
            let addr = self.config.observability_bind_adresse()?;
            let metriken = self.state.metriken.clone();
            let health = self.health.clone();
            let rx = shutdown_rx.clone();
            Some(tokio::spawn(async move {
                if let Err(e) = observability_server_starten(addr, metriken, health, rx).await {
                    tracing::error!(fehler = %e, "Observability-Server beendet");
                }
            }))
        } else {
            tracing::info!("Observability deaktiviert");
            None
        };

        let intervall = Duration::from_secs(self.config.observability.aktualisierung_sek.max(1));
        let gauge_task = tokio::spawn(gauges_aktualisieren(
            Arc::clone(&self.state),
            self.health.clone(),
            intervall,
            shutdown_rx.clone(),
        ));

        let server = SignalingServer::neu(Arc::clone(&self.state), signaling_addr);
        let ergebnis = server.starten(shutdown_rx).await;
        self.health.annahme_setzen(false);

        gauge_task.abort();
        if let Some(task) = observability_task {
            let _ = task.await;
        }

        ergebnis?;
        tracing::info!("Server beendet");
        Ok(())
    }
}

async fn engine_erstellen(config: &ServerConfig) -> Result<Arc<dyn MediaEngine>> {
    match config.medien.engine {
        EngineArt::Lokal => Ok(Arc::new(LokaleEngine::neu(config.engine_config()))),
        #[cfg(feature = "mediasoup")]
        EngineArt::Mediasoup => {
            let engine = relais_engine::MediasoupEngine::starten(config.mediasoup_config()).await?;
            Ok(Arc::new(engine))
        }
        #[cfg(not(feature = "mediasoup"))]
        EngineArt::Mediasoup => {
            anyhow::bail!("relais-server wurde ohne das Feature `mediasoup` gebaut")
        }
    }
}

/// Aktualisiert Gauges und Engine-Status im festen Intervall
fn zustand_uebernehmen(state: &SignalingState, health: &HealthState) {
    state.metriken_aktualisieren();
    let bereit = state.engine.bereit();
    if bereit != health.bericht().engine_ready {
        if bereit {
            tracing::info!("Media-Engine wieder bereit");
        } else {
            tracing::error!("Media-Engine nicht bereit");
        }
    }
    health.engine_status_setzen(bereit);
}

async fn gauges_aktualisieren(
    state: Arc<SignalingState>,
    health: HealthState,
    intervall: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(intervall);
    loop {
        tokio::select! {
            _ = ticker.tick() => zustand_uebernehmen(&state, &health),
            Ok(()) = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
}
