//! Relais-Steuerung: Lebenszyklus genau einer Sitzung
//!
//! Zustandsautomat `Leerlauf -> Startend -> Aktiv -> Stoppend -> Leerlauf`.
//! Der Zustand liegt hinter einem synchronen Mutex, der nie ueber ein
//! `.await` gehalten wird. Waehrend `Startend` gehoert der Aufbau allein
//! dem startenden Aufrufer; ein Stopp bricht nur dessen Token ab.
//!
//! Stopp per Befehl, Trennung durch den Transport und Prozessende laufen
//! alle durch dieselbe Abbau-Routine.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::select_all;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use vcsync_audio::{decoder_fabrik, DecoderFabrik};
use vcsync_core::{SessionId, UserId, VerbindungsStatus};
use vcsync_observability::RelaisMetriken;
use vcsync_voice::VerbindungsAnbieter;

use crate::error::{FehlerKlasse, RelaisError, RelaisResult};
use crate::konfig::RelaisKonfig;
use crate::session::Sitzung;
use crate::tracker::AbbauBericht;

/// Sichtbarer Zustand der Steuerung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelaisZustand {
    Leerlauf,
    Startend,
    Aktiv,
    Stoppend,
}

impl std::fmt::Display for RelaisZustand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Leerlauf => "leerlauf",
            Self::Startend => "startend",
            Self::Aktiv => "aktiv",
            Self::Stoppend => "stoppend",
        };
        f.write_str(s)
    }
}

/// Ausloeser eines Stopps
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoppAnlass {
    /// Operator hat gestoppt
    Befehl,
    /// Eine der Verbindungen wurde getrennt
    Getrennt(String),
    /// Prozess wird beendet
    Prozessende,
}

impl std::fmt::Display for StoppAnlass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Befehl => f.write_str("befehl"),
            Self::Getrennt(grund) => write!(f, "getrennt ({grund})"),
            Self::Prozessende => f.write_str("prozessende"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartErgebnis {
    Gestartet(SessionId),
    /// Es laeuft schon ein Start, eine Sitzung oder ein Stopp
    BereitsAktiv(RelaisZustand),
    /// Ein Stopp kam waehrend des Aufbaus
    Abgebrochen,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoppErgebnis {
    Gestoppt(AbbauBericht),
    NichtAktiv,
    BereitsStoppend,
    /// Ein laufender Start wurde abgebrochen
    StartAbgebrochen,
}

/// Momentaufnahme fuer `status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelaisStatus {
    pub zustand: RelaisZustand,
    pub sitzung: Option<SessionId>,
    pub seit: Option<DateTime<Utc>>,
    pub aktive_sprecher: Vec<UserId>,
    pub frames_gesendet: u64,
}

enum Zustand {
    Leerlauf,
    Startend { abbruch: CancellationToken },
    Aktiv(Box<Sitzung>),
    Stoppend,
}

impl Zustand {
    fn sichtbar(&self) -> RelaisZustand {
        match self {
            Self::Leerlauf => RelaisZustand::Leerlauf,
            Self::Startend { .. } => RelaisZustand::Startend,
            Self::Aktiv(_) => RelaisZustand::Aktiv,
            Self::Stoppend => RelaisZustand::Stoppend,
        }
    }
}

struct SteuerungInner {
    anbieter: Arc<dyn VerbindungsAnbieter>,
    konfig: RelaisKonfig,
    fabrik: DecoderFabrik,
    metriken: RelaisMetriken,
    zustand: Mutex<Zustand>,
}

/// Steuerung des Relais; Klone teilen denselben Zustand
#[derive(Clone)]
pub struct RelaisSteuerung {
    inner: Arc<SteuerungInner>,
}

impl RelaisSteuerung {
    pub fn neu(
        anbieter: Arc<dyn VerbindungsAnbieter>,
        konfig: RelaisKonfig,
        metriken: RelaisMetriken,
    ) -> Self {
        let fabrik = decoder_fabrik(konfig.codec);
        Self::mit_fabrik(anbieter, konfig, fabrik, metriken)
    }

    /// Wie [`RelaisSteuerung::neu`], aber mit eigener Decoder-Fabrik
    pub fn mit_fabrik(
        anbieter: Arc<dyn VerbindungsAnbieter>,
        konfig: RelaisKonfig,
        fabrik: DecoderFabrik,
        metriken: RelaisMetriken,
    ) -> Self {
        Self {
            inner: Arc::new(SteuerungInner {
                anbieter,
                konfig,
                fabrik,
                metriken,
                zustand: Mutex::new(Zustand::Leerlauf),
            }),
        }
    }

    pub fn konfig(&self) -> &RelaisKonfig {
        &self.inner.konfig
    }

    pub fn metriken(&self) -> &RelaisMetriken {
        &self.inner.metriken
    }

    pub fn zustand(&self) -> RelaisZustand {
        self.inner.zustand.lock().sichtbar()
    }

    pub fn status(&self) -> RelaisStatus {
        let zustand = self.inner.zustand.lock();
        match &*zustand {
            Zustand::Aktiv(sitzung) => RelaisStatus {
                zustand: RelaisZustand::Aktiv,
                sitzung: Some(sitzung.id()),
                seit: Some(sitzung.gestartet_am()),
                aktive_sprecher: sitzung.aktive_sprecher(),
                frames_gesendet: sitzung.frames_gesendet(),
            },
            andere => RelaisStatus {
                zustand: andere.sichtbar(),
                sitzung: None,
                seit: None,
                aktive_sprecher: Vec::new(),
                frames_gesendet: 0,
            },
        }
    }

    /// Startet eine Sitzung.
    ///
    /// `Err` nur wenn der Aufbau scheitert; die Steuerung steht danach
    /// wieder im Leerlauf.
    pub async fn starten(&self) -> RelaisResult<StartErgebnis> {
        let abbruch = CancellationToken::new();
        {
            let mut zustand = self.inner.zustand.lock();
            if !matches!(*zustand, Zustand::Leerlauf) {
                let sichtbar = zustand.sichtbar();
                info!(zustand = %sichtbar, "Start abgelehnt, Relais laeuft bereits");
                return Ok(StartErgebnis::BereitsAktiv(sichtbar));
            }
            *zustand = Zustand::Startend {
                abbruch: abbruch.clone(),
            };
        }

        let konfig = &self.inner.konfig;
        info!(quelle = %konfig.quell_kanal, ziel = %konfig.ziel_kanal, "Relais startet");

        let ergebnis = Sitzung::aufbauen(
            &*self.inner.anbieter,
            konfig,
            Arc::clone(&self.inner.fabrik),
            self.inner.metriken.clone(),
            abbruch.clone(),
        )
        .await;

        let sitzung = match ergebnis {
            Ok(sitzung) => sitzung,
            Err(e) => {
                *self.inner.zustand.lock() = Zustand::Leerlauf;
                self.inner.metriken.sitzungen_fehlgeschlagen.inc();
                return match e {
                    RelaisError::Abgebrochen => {
                        info!("Start abgebrochen");
                        Ok(StartErgebnis::Abgebrochen)
                    }
                    e => {
                        warn!(fehler = %e, klasse = ?e.klasse(), "Relais-Start fehlgeschlagen");
                        Err(e)
                    }
                };
            }
        };

        let id = sitzung.id();
        let statusquellen: Vec<watch::Receiver<VerbindungsStatus>> = [sitzung.quelle(), sitzung.ziel()]
            .into_iter()
            .flatten()
            .map(|v| v.status())
            .collect();

        // Ein Stopp kann zwischen Aufbau und Aktivierung gekommen sein
        let verworfen = {
            let mut zustand = self.inner.zustand.lock();
            if abbruch.is_cancelled() {
                Some(sitzung)
            } else {
                *zustand = Zustand::Aktiv(Box::new(sitzung));
                None
            }
        };
        if let Some(mut sitzung) = verworfen {
            let bericht = sitzung.abbauen().await;
            drop(sitzung);
            *self.inner.zustand.lock() = Zustand::Leerlauf;
            self.inner.metriken.sitzungen_fehlgeschlagen.inc();
            info!(verbindungen = bericht.verbindungen_zerstoert, "Start nach Aufbau abgebrochen");
            return Ok(StartErgebnis::Abgebrochen);
        }

        self.inner.metriken.sitzungen_gestartet.inc();
        self.inner.metriken.sitzung_aktiv.set(1);
        self.inner.metriken.transport_verbunden.set(1);
        self.waechter_starten(abbruch, statusquellen);

        info!(sitzung = %id, "Relais aktiv");
        Ok(StartErgebnis::Gestartet(id))
    }

    /// Stoppt die laufende Sitzung; im Leerlauf ohne Wirkung
    pub async fn stoppen(&self, anlass: StoppAnlass) -> StoppErgebnis {
        let mut sitzung = {
            let mut zustand = self.inner.zustand.lock();
            match std::mem::replace(&mut *zustand, Zustand::Stoppend) {
                Zustand::Leerlauf => {
                    *zustand = Zustand::Leerlauf;
                    return StoppErgebnis::NichtAktiv;
                }
                Zustand::Startend { abbruch } => {
                    abbruch.cancel();
                    *zustand = Zustand::Startend { abbruch };
                    info!(anlass = %anlass, "Laufender Start wird abgebrochen");
                    return StoppErgebnis::StartAbgebrochen;
                }
                Zustand::Stoppend => return StoppErgebnis::BereitsStoppend,
                Zustand::Aktiv(sitzung) => sitzung,
            }
        };

        info!(sitzung = %sitzung.id(), anlass = %anlass, "Relais stoppt");
        let bericht = sitzung.abbauen().await;
        drop(sitzung);

        let metriken = &self.inner.metriken;
        metriken.sitzung_aktiv.set(0);
        metriken.pipelines_aktiv.set(0);
        metriken.mischpult_eingaenge.set(0);
        metriken.frames_gesendet.inc_by(bericht.frames_gesendet);
        if matches!(anlass, StoppAnlass::Getrennt(_)) {
            metriken.transport_verbunden.set(0);
        }
        if !bericht.fehlerfrei() {
            metriken.abbau_fehler.inc_by(bericht.fehler.len() as u64);
            warn!(fehler = ?bericht.fehler, "Abbau mit Fehlern abgeschlossen");
        }

        *self.inner.zustand.lock() = Zustand::Leerlauf;
        info!(
            anlass = %anlass,
            pipelines = bericht.pipelines_abgebaut,
            verbindungen = bericht.verbindungen_zerstoert,
            "Relais gestoppt"
        );
        StoppErgebnis::Gestoppt(bericht)
    }

    /// Beobachtet beide Verbindungen; eine Trennung stoppt die Sitzung
    fn waechter_starten(
        &self,
        abbruch: CancellationToken,
        quellen: Vec<watch::Receiver<VerbindungsStatus>>,
    ) {
        if quellen.is_empty() {
            return;
        }
        let steuerung = self.clone();
        tokio::spawn(async move {
            let trennungen = quellen
                .into_iter()
                .map(|rx| Box::pin(trennung_abwarten(rx)));
            let grund = tokio::select! {
                _ = abbruch.cancelled() => return,
                (grund, _, _) = select_all(trennungen) => grund,
            };
            warn!(grund = %grund, klasse = ?FehlerKlasse::Transport, "Verbindung getrennt, Relais wird abgebaut");
            steuerung.stoppen(StoppAnlass::Getrennt(grund)).await;
        });
    }
}

/// Wartet bis die Verbindung als getrennt gemeldet wird. Ein Zerstoeren
/// zaehlt nicht als Trennung.
async fn trennung_abwarten(mut rx: watch::Receiver<VerbindungsStatus>) -> String {
    loop {
        let getrennt = match &*rx.borrow_and_update() {
            VerbindungsStatus::Getrennt { grund } => Some(grund.clone()),
            _ => None,
        };
        if let Some(grund) = getrennt {
            return grund;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
