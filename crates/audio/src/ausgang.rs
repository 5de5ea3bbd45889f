//! Abspielbare Ausgangs-Ressource
//!
//! Verpackt den Mischpult-Ausgang als einen Strom von 20-ms-Frames im
//! festen Takt. Die Ressource lebt so lange wie die Relais-Sitzung und
//! liefert Stille, solange kein Eingang angesteckt ist.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::time::{interval, Interval, MissedTickBehavior};
use vcsync_protocol::RELAIS_FORMAT;

use crate::frame::PcmFrame;
use crate::mixer::MischBus;

pub struct AusgangsRessource {
    bus: MischBus,
    takt: Interval,
    ausgeliefert: Arc<AtomicU64>,
}

impl AusgangsRessource {
    pub fn neu(bus: MischBus) -> Self {
        let mut takt = interval(RELAIS_FORMAT.frame_dauer());
        // nach einer Verzoegerung nicht nachholen, sonst kaeme ein Schwall Frames
        takt.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            bus,
            takt,
            ausgeliefert: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Wartet auf den naechsten Takt und mischt einen Frame
    pub async fn naechster_frame(&mut self) -> PcmFrame {
        self.takt.tick().await;
        let frame = self.bus.mischen();
        self.ausgeliefert.fetch_add(1, Ordering::Relaxed);
        frame
    }

    /// Zaehler der ausgelieferten Frames; bleibt nach dem Verschieben der
    /// Ressource in die Verbindung lesbar
    pub fn zaehler(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.ausgeliefert)
    }

    pub fn bus(&self) -> &MischBus {
        &self.bus
    }
}

impl std::fmt::Debug for AusgangsRessource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AusgangsRessource")
            .field("ausgeliefert", &self.ausgeliefert.load(Ordering::Relaxed))
            .finish()
    }
}
