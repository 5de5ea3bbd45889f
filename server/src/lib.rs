//! vcsync-server – Bibliotheks-Root
//!
//! Verdrahtet UDP-Transport, Relais-Steuerung, Commander und
//! Observability und stellt den Einstiegspunkt fuer Tests bereit.

pub mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use config::ServerConfig;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use vcsync_commander::{BedienerAuth, CommandExecutor, CommanderState, TcpServer, TcpServerKonfig};
use vcsync_observability::{observability_server_mit_listener, RelaisMetriken};
use vcsync_relay::{RelaisSteuerung, StoppAnlass, StoppErgebnis};
use vcsync_voice::UdpAnbieter;

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

/// Server mit bereits gebundenen Listenern
pub struct GebundenerServer {
    steuerung: RelaisSteuerung,
    commander: Option<(TcpListener, CommanderState, TcpServerKonfig)>,
    observability: Option<(TcpListener, RelaisMetriken)>,
}

impl Server {
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet alle Subsysteme und laeuft bis SIGINT oder SIGTERM
    pub async fn starten(self) -> Result<()> {
        let abbruch = CancellationToken::new();
        let mut signale = BeendenSignale::registrieren()?;
        let signal = abbruch.clone();
        tokio::spawn(async move {
            let name = signale.empfangen().await;
            tracing::info!(signal = name, "Shutdown-Signal empfangen, Server wird beendet");
            signal.cancel();
        });

        self.binden().await?.laufen(abbruch).await
    }

    /// Baut alle Komponenten und bindet die TCP-Listener.
    /// Die UDP-Kanaele werden erst beim Start des Relais gebunden.
    pub async fn binden(self) -> Result<GebundenerServer> {
        let config = self.config;
        let metriken = RelaisMetriken::neu()?;
        let anbieter = UdpAnbieter::neu(config.udp_konfig()?);
        let relais_konfig = config.relais_konfig();

        tracing::info!(
            quelle = %relais_konfig.quell_kanal,
            ziel = %relais_konfig.ziel_kanal,
            codec = ?relais_konfig.codec,
            "Relais konfiguriert"
        );

        let steuerung = RelaisSteuerung::neu(
            Arc::new(anbieter.clone()),
            relais_konfig,
            metriken.clone(),
        );

        let commander = if config.commander.aktiviert {
            let addr = config.commander_bind_adresse()?;
            let listener = TcpListener::bind(addr).await?;
            let executor = CommandExecutor::neu(steuerung.clone(), Arc::new(anbieter));
            let auth = BedienerAuth::neu(config.commander.token.clone());
            if !auth.erforderlich() {
                tracing::warn!("Kein Operator-Token gesetzt, Commander ist ohne Anmeldung nutzbar");
            }
            let tcp_konfig = TcpServerKonfig {
                bind_addr: addr,
                max_verbindungen: config.commander.max_verbindungen,
                zeilenlimit_bytes: config.commander.zeilenlimit_bytes,
            };
            Some((listener, CommanderState::neu(executor, auth), tcp_konfig))
        } else {
            None
        };

        let observability = if config.observability.aktiviert {
            let listener = TcpListener::bind(config.observability_bind_adresse()?).await?;
            Some((listener, metriken))
        } else {
            None
        };

        Ok(GebundenerServer {
            steuerung,
            commander,
            observability,
        })
    }
}

// ---------------------------------------------------------------------------
// Signale
// ---------------------------------------------------------------------------

/// Signale, die den Prozess ueber denselben Abbau beenden
///
/// Die Handler werden beim Registrieren installiert, nicht erst beim Warten.
pub struct BeendenSignale {
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl BeendenSignale {
    pub fn registrieren() -> Result<Self> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let terminate = signal(SignalKind::terminate())
                .map_err(|e| anyhow::anyhow!("SIGTERM-Handler nicht installierbar: {e}"))?;
            Ok(Self { terminate })
        }
        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    /// Wartet auf das erste Signal und liefert seinen Namen
    pub async fn empfangen(&mut self) -> &'static str {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(fehler = %e, "Ctrl-C-Handler fehlgeschlagen");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            if self.terminate.recv().await.is_none() {
                std::future::pending::<()>().await;
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => "SIGINT",
            _ = terminate => "SIGTERM",
        }
    }
}

impl GebundenerServer {
    pub fn steuerung(&self) -> &RelaisSteuerung {
        &self.steuerung
    }

    pub fn commander_adresse(&self) -> Option<SocketAddr> {
        self.commander
            .as_ref()
            .and_then(|(listener, _, _)| listener.local_addr().ok())
    }

    pub fn observability_adresse(&self) -> Option<SocketAddr> {
        self.observability
            .as_ref()
            .and_then(|(listener, _)| listener.local_addr().ok())
    }

    /// Laeuft bis `abbruch` ausgeloest wird und baut dann eine laufende
    /// Sitzung ab
    pub async fn laufen(self, abbruch: CancellationToken) -> Result<()> {
        let mut aufgaben: Vec<(&'static str, JoinHandle<Result<()>>)> = Vec::new();

        if let Some((listener, state, konfig)) = self.commander {
            let abbruch = abbruch.child_token();
            aufgaben.push((
                "commander",
                tokio::spawn(async move {
                    TcpServer::neu(konfig)
                        .mit_listener(listener, state, abbruch)
                        .await
                        .map_err(anyhow::Error::from)
                }),
            ));
        }
        if let Some((listener, metriken)) = self.observability {
            aufgaben.push((
                "observability",
                tokio::spawn(observability_server_mit_listener(
                    listener,
                    metriken,
                    abbruch.child_token(),
                )),
            ));
        }

        tracing::info!("Server laeuft. Warte auf Shutdown-Signal (SIGINT/SIGTERM)...");
        abbruch.cancelled().await;

        match self.steuerung.stoppen(StoppAnlass::Prozessende).await {
            StoppErgebnis::Gestoppt(bericht) if !bericht.fehlerfrei() => {
                tracing::warn!(fehler = ?bericht.fehler, "Relais mit Fehlern abgebaut");
            }
            StoppErgebnis::Gestoppt(bericht) => {
                tracing::info!(frames = bericht.frames_gesendet, "Relais abgebaut");
            }
            anderes => tracing::debug!(ergebnis = ?anderes, "Kein aktives Relais beim Beenden"),
        }

        for (name, aufgabe) in aufgaben {
            match aufgabe.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(dienst = name, fehler = %e, "Dienst mit Fehler beendet"),
                Err(e) => tracing::warn!(dienst = name, fehler = %e, "Dienst-Task abgebrochen"),
            }
        }

        tracing::info!("Server beendet");
        Ok(())
    }
}
