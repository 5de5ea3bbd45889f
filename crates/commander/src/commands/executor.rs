//! Einheitlicher Befehlsausfuehrer
//!
//! Enthaelt die gesamte Logik hinter den Commander-Befehlen. Der
//! TCP-Zugang uebersetzt nur Zeilen in [`Command`] und Antworten zurueck.

use std::sync::Arc;

use vcsync_core::UserId;
use vcsync_relay::{RelaisSteuerung, StartErgebnis, StoppAnlass, StoppErgebnis};
use vcsync_voice::{alle_stumm_setzen, MitgliederVerwaltung};

use crate::commands::types::{Command, Response};
use crate::error::CommanderResult;

pub struct CommandExecutor {
    steuerung: RelaisSteuerung,
    mitglieder: Arc<dyn MitgliederVerwaltung>,
}

impl CommandExecutor {
    pub fn neu(steuerung: RelaisSteuerung, mitglieder: Arc<dyn MitgliederVerwaltung>) -> Arc<Self> {
        Arc::new(Self {
            steuerung,
            mitglieder,
        })
    }

    pub fn steuerung(&self) -> &RelaisSteuerung {
        &self.steuerung
    }

    /// Fuehrt einen Befehl aus. `operator` ist die Identitaet des
    /// angemeldeten Bedieners, falls bekannt.
    pub async fn ausfuehren(
        &self,
        cmd: Command,
        operator: Option<UserId>,
    ) -> CommanderResult<Response> {
        tracing::debug!(befehl = ?cmd, operator = ?operator, "Befehl wird ausgefuehrt");
        match cmd {
            Command::StartSync => self.starten().await,
            Command::StopSync => Ok(self.stoppen().await),
            Command::AlleStumm { stumm } => self.alle_stumm(stumm, operator).await,
            Command::Status => Ok(Response::Status {
                status: self.steuerung.status(),
            }),
        }
    }

    async fn starten(&self) -> CommanderResult<Response> {
        let antwort = match self.steuerung.starten().await? {
            StartErgebnis::Gestartet(sitzung) => Response::Gestartet { sitzung },
            StartErgebnis::BereitsAktiv(zustand) => Response::BereitsAktiv { zustand },
            StartErgebnis::Abgebrochen => Response::StartAbgebrochen,
        };
        Ok(antwort)
    }

    async fn stoppen(&self) -> Response {
        match self.steuerung.stoppen(StoppAnlass::Befehl).await {
            StoppErgebnis::Gestoppt(bericht) => Response::Gestoppt { bericht },
            StoppErgebnis::NichtAktiv => Response::NichtAktiv,
            StoppErgebnis::BereitsStoppend => Response::BereitsStoppend,
            StoppErgebnis::StartAbgebrochen => Response::StartAbgebrochen,
        }
    }

    async fn alle_stumm(&self, stumm: bool, operator: Option<UserId>) -> CommanderResult<Response> {
        let kanal = self.steuerung.konfig().ziel_kanal;
        let bericht = alle_stumm_setzen(&*self.mitglieder, kanal, stumm, operator).await?;
        Ok(Response::MassenStumm { bericht })
    }
}
