//! Ausgang des Relais: Mischpult -> Zielverbindung
//!
//! Pro Sitzung wird genau eine Ausgangs-Ressource gebaut und genau einmal
//! an die Zielverbindung uebergeben. Ohne angesteckte Eingaenge spielt sie
//! Stille und bleibt bis zum Zerstoeren der Verbindung aktiv.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::info;
use vcsync_audio::{AusgangsRessource, MischBus};
use vcsync_core::ChannelId;
use vcsync_voice::SprachVerbindung;

use crate::error::RelaisResult;

#[derive(Debug)]
pub struct Herausgeber {
    kanal: ChannelId,
    ausgeliefert: Arc<AtomicU64>,
}

impl Herausgeber {
    /// Verdrahtet den Bus mit der Zielverbindung
    pub fn verdrahten(bus: &MischBus, ziel: &dyn SprachVerbindung) -> RelaisResult<Self> {
        let ressource = AusgangsRessource::neu(bus.clone());
        let ausgeliefert = ressource.zaehler();
        ziel.abspielen(ressource)?;

        info!(kanal = %ziel.kanal(), "Ausgang mit Zielkanal verbunden");
        Ok(Self {
            kanal: ziel.kanal(),
            ausgeliefert,
        })
    }

    pub fn kanal(&self) -> ChannelId {
        self.kanal
    }

    /// Bisher an die Zielverbindung gelieferte Frames
    pub fn frames_gesendet(&self) -> u64 {
        self.ausgeliefert.load(Ordering::Relaxed)
    }
}
