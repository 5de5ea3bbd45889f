//! Command- und Response-Typen fuer den Befehlsausfuehrer

use serde::Serialize;
use vcsync_core::SessionId;
use vcsync_relay::{AbbauBericht, RelaisStatus, RelaisZustand};
use vcsync_voice::MassenStummBericht;

/// Alle unterstuetzten Commander-Befehle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Relais starten
    StartSync,
    /// Relais stoppen
    StopSync,
    /// Alle Nicht-Operatoren im Zielkanal (ent)stummen
    AlleStumm { stumm: bool },
    /// Zustand abfragen
    Status,
}

impl Command {
    /// Befehle, die den Relais-Zustand veraendern
    pub fn ist_schreibend(&self) -> bool {
        !matches!(self, Self::Status)
    }
}

/// Antwort auf einen erfolgreich verarbeiteten Befehl
///
/// Bedienfehler wie ein doppelter Start sind keine Fehler, sondern
/// eigene Bestaetigungen.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "art", rename_all = "snake_case")]
pub enum Response {
    Gestartet { sitzung: SessionId },
    BereitsAktiv { zustand: RelaisZustand },
    StartAbgebrochen,
    Gestoppt { bericht: AbbauBericht },
    NichtAktiv,
    BereitsStoppend,
    MassenStumm { bericht: MassenStummBericht },
    Status { status: RelaisStatus },
}
