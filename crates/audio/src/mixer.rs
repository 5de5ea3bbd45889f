//! Mischpult (N-zu-1) fuer das Relais
//!
//! Jeder aktive Sprecher besitzt einen `MischEingang`, in den seine
//! Dekodier-Pipeline PCM schreibt. Der Ausgangstakt ruft pro Frame
//! `MischBus::mischen()` auf und erhaelt die saettigende Summe aller
//! angeschlossenen Eingaenge. Fehlende Daten zaehlen als Stille.
//!
//! An- und Abstecken sind O(1) und duerfen jederzeit passieren, auch
//! waehrend gemischt wird: `mischen()` arbeitet auf einem Schnappschuss
//! der Eingangsmenge.
//!
//! Eingaenge, die laenger als das Bereinigungsintervall nichts geschrieben
//! haben, werden geleert. So bleibt weder alter Ton noch Speicher liegen,
//! wenn ein Schreiber verschwindet ohne abgesteckt zu werden.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};
use vcsync_protocol::RELAIS_FORMAT;

use crate::error::{AudioError, AudioResult};
use crate::frame::{PcmFrame, FRAME_SAMPLES};

/// Kennung eines Eingangs innerhalb eines Busses
pub type EingangId = u64;

/// Einstellungen des Mischpults
#[derive(Debug, Clone, Copy)]
pub struct MischBusKonfig {
    /// Maximal gepufferte Audiodauer pro Eingang
    pub max_puffer: Duration,
    /// Intervall, nach dem ungenutzte Eingaenge geleert werden
    pub bereinigungs_intervall: Duration,
}

impl Default for MischBusKonfig {
    fn default() -> Self {
        Self {
            max_puffer: Duration::from_millis(1000),
            bereinigungs_intervall: Duration::from_millis(250),
        }
    }
}

/// Momentaufnahme der Mischpult-Zaehler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MischStatistik {
    pub eingaenge: usize,
    pub frames_gemischt: u64,
    pub samples_verworfen: u64,
}

struct PufferInhalt {
    samples: VecDeque<i16>,
    letzte_schreibung: Instant,
}

struct EingangPuffer {
    id: EingangId,
    bezeichnung: String,
    angeschlossen: AtomicBool,
    inhalt: Mutex<PufferInhalt>,
}

struct MischBusInner {
    eingaenge: DashMap<EingangId, Arc<EingangPuffer>>,
    naechste_id: AtomicU64,
    max_samples: usize,
    bereinigungs_intervall: Duration,
    letzte_bereinigung: Mutex<Instant>,
    frames_gemischt: AtomicU64,
    samples_verworfen: Arc<AtomicU64>,
}

/// Dynamisches Mischpult; Klone teilen denselben Zustand
#[derive(Clone)]
pub struct MischBus {
    inner: Arc<MischBusInner>,
}

impl MischBus {
    pub fn neu(konfig: MischBusKonfig) -> Self {
        let max_samples = RELAIS_FORMAT
            .samples_fuer(konfig.max_puffer)
            .max(FRAME_SAMPLES);
        Self {
            inner: Arc::new(MischBusInner {
                eingaenge: DashMap::new(),
                naechste_id: AtomicU64::new(1),
                max_samples,
                bereinigungs_intervall: konfig.bereinigungs_intervall,
                letzte_bereinigung: Mutex::new(Instant::now()),
                frames_gemischt: AtomicU64::new(0),
                samples_verworfen: Arc::new(AtomicU64::new(0)),
            }),
        }
    }

    /// Steckt einen neuen Eingang an
    pub fn eingang_hinzufuegen(&self, bezeichnung: impl Into<String>) -> MischEingang {
        let id = self.inner.naechste_id.fetch_add(1, Ordering::Relaxed);
        let puffer = Arc::new(EingangPuffer {
            id,
            bezeichnung: bezeichnung.into(),
            angeschlossen: AtomicBool::new(true),
            inhalt: Mutex::new(PufferInhalt {
                samples: VecDeque::with_capacity(FRAME_SAMPLES * 2),
                letzte_schreibung: Instant::now(),
            }),
        });
        self.inner.eingaenge.insert(id, Arc::clone(&puffer));
        debug!(eingang = id, bezeichnung = %puffer.bezeichnung, "Mischpult-Eingang angesteckt");

        MischEingang {
            puffer,
            max_samples: self.inner.max_samples,
            verworfen: Arc::clone(&self.inner.samples_verworfen),
        }
    }

    /// Steckt einen Eingang ab. Schlaegt nie fehl; gibt `false` zurueck
    /// wenn der Eingang nicht (mehr) angeschlossen war.
    pub fn eingang_entfernen(&self, id: EingangId) -> bool {
        let Some((_, puffer)) = self.inner.eingaenge.remove(&id) else {
            return false;
        };
        puffer.angeschlossen.store(false, Ordering::Release);
        puffer.inhalt.lock().samples.clear();
        debug!(eingang = id, bezeichnung = %puffer.bezeichnung, "Mischpult-Eingang abgesteckt");
        true
    }

    pub fn anzahl_eingaenge(&self) -> usize {
        self.inner.eingaenge.len()
    }

    /// Mischt den naechsten Frame
    pub fn mischen(&self) -> PcmFrame {
        let jetzt = Instant::now();
        self.bereinigung_falls_faellig(jetzt);

        let schnappschuss: Vec<Arc<EingangPuffer>> = self
            .inner
            .eingaenge
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();

        let mut summe = [0i32; FRAME_SAMPLES];
        for puffer in &schnappschuss {
            let mut inhalt = puffer.inhalt.lock();
            if !puffer.angeschlossen.load(Ordering::Acquire) {
                continue;
            }
            let verfuegbar = inhalt.samples.len().min(FRAME_SAMPLES);
            for (ziel, sample) in summe.iter_mut().zip(inhalt.samples.drain(..verfuegbar)) {
                *ziel += i32::from(sample);
            }
        }

        let samples = summe
            .iter()
            .map(|&s| s.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16)
            .collect();

        self.inner.frames_gemischt.fetch_add(1, Ordering::Relaxed);
        trace!(eingaenge = schnappschuss.len(), "Frame gemischt");

        // Laenge ist durch das Summen-Array festgelegt
        PcmFrame::aus_samples(samples).unwrap_or_else(|_| PcmFrame::stille())
    }

    /// Leert alle Eingaenge, die seit dem Bereinigungsintervall nicht mehr
    /// geschrieben wurden. Gibt die Anzahl geleerter Eingaenge zurueck.
    pub fn bereinigen(&self, jetzt: Instant) -> usize {
        let mut geleert = 0;
        for eintrag in self.inner.eingaenge.iter() {
            let mut inhalt = eintrag.value().inhalt.lock();
            let alter = jetzt.saturating_duration_since(inhalt.letzte_schreibung);
            if !inhalt.samples.is_empty() && alter >= self.inner.bereinigungs_intervall {
                self.inner
                    .samples_verworfen
                    .fetch_add(inhalt.samples.len() as u64, Ordering::Relaxed);
                inhalt.samples.clear();
                inhalt.samples.shrink_to(FRAME_SAMPLES * 2);
                geleert += 1;
            }
        }
        if geleert > 0 {
            debug!(geleert, "Veraltete Mischpult-Eingaenge geleert");
        }
        geleert
    }

    pub fn statistik(&self) -> MischStatistik {
        MischStatistik {
            eingaenge: self.anzahl_eingaenge(),
            frames_gemischt: self.inner.frames_gemischt.load(Ordering::Relaxed),
            samples_verworfen: self.inner.samples_verworfen.load(Ordering::Relaxed),
        }
    }

    /// Steckt alle Eingaenge ab
    pub fn leeren(&self) -> usize {
        let ids: Vec<EingangId> = self.inner.eingaenge.iter().map(|e| *e.key()).collect();
        ids.into_iter().filter(|id| self.eingang_entfernen(*id)).count()
    }

    fn bereinigung_falls_faellig(&self, jetzt: Instant) {
        let faellig = {
            let mut letzte = self.inner.letzte_bereinigung.lock();
            if jetzt.saturating_duration_since(*letzte) >= self.inner.bereinigungs_intervall {
                *letzte = jetzt;
                true
            } else {
                false
            }
        };
        if faellig {
            self.bereinigen(jetzt);
        }
    }
}

/// Schreibseite eines Mischpult-Eingangs
pub struct MischEingang {
    puffer: Arc<EingangPuffer>,
    max_samples: usize,
    verworfen: Arc<AtomicU64>,
}

impl MischEingang {
    pub fn id(&self) -> EingangId {
        self.puffer.id
    }

    pub fn bezeichnung(&self) -> &str {
        &self.puffer.bezeichnung
    }

    pub fn ist_angeschlossen(&self) -> bool {
        self.puffer.angeschlossen.load(Ordering::Acquire)
    }

    /// Haengt Samples an. Laeuft der Puffer ueber, fallen die aeltesten
    /// Samples heraus.
    pub fn schreiben(&self, samples: &[i16]) -> AudioResult<()> {
        let mut inhalt = self.puffer.inhalt.lock();
        if !self.ist_angeschlossen() {
            return Err(AudioError::EingangGetrennt(self.puffer.bezeichnung.clone()));
        }
        inhalt.samples.extend(samples.iter().copied());
        inhalt.letzte_schreibung = Instant::now();

        let ueberschuss = inhalt.samples.len().saturating_sub(self.max_samples);
        if ueberschuss > 0 {
            inhalt.samples.drain(..ueberschuss);
            self.verworfen.fetch_add(ueberschuss as u64, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Aktuell gepufferte Samples
    pub fn gepuffert(&self) -> usize {
        self.puffer.inhalt.lock().samples.len()
    }
}

impl std::fmt::Debug for MischEingang {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MischEingang")
            .field("id", &self.puffer.id)
            .field("bezeichnung", &self.puffer.bezeichnung)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
