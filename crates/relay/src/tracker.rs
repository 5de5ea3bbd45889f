//! Teilnehmer-Verfolger
//!
//! Ein einzelner Task pro Sitzung verarbeitet die Sprech-Ereignisse der
//! Quellverbindung und die Ende-Meldungen der Pipelines. Nur dieser Task
//! legt Pipelines an oder baut sie ab, pro Sprecher existiert daher
//! hoechstens eine.
//!
//! Nach dem Abbruch werden keine neuen Pipelines mehr angelegt. Der
//! Abbau laeuft so lange ueber die Pipeline-Tabelle, bis sie leer ist.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use vcsync_audio::{DecoderFabrik, MischBus};
use vcsync_core::{SprechEreignis, UserId};
use vcsync_observability::RelaisMetriken;
use vcsync_voice::SprachVerbindung;

use crate::error::{RelaisError, RelaisResult};
use crate::pipeline::{PipelineAbschluss, PipelineEnde, TeilnehmerPipeline};

/// Ergebnis eines Abbaus; Fehler werden gesammelt statt abzubrechen
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct AbbauBericht {
    pub pipelines_abgebaut: usize,
    pub verbindungen_zerstoert: usize,
    pub frames_gesendet: u64,
    pub fehler: Vec<String>,
}

impl AbbauBericht {
    pub fn fehlerfrei(&self) -> bool {
        self.fehler.is_empty()
    }

    pub(crate) fn uebernehmen(&mut self, anderer: AbbauBericht) {
        self.pipelines_abgebaut += anderer.pipelines_abgebaut;
        self.verbindungen_zerstoert += anderer.verbindungen_zerstoert;
        self.frames_gesendet += anderer.frames_gesendet;
        self.fehler.extend(anderer.fehler);
    }
}

/// Oeffentlich sichtbarer Stand der aktiven Sprecher
pub type AktiveSprecher = Arc<DashMap<UserId, DateTime<Utc>>>;

pub struct TeilnehmerVerfolger {
    quelle: Arc<dyn SprachVerbindung>,
    bus: MischBus,
    fabrik: DecoderFabrik,
    nachlauf: Duration,
    metriken: RelaisMetriken,
    abbruch: CancellationToken,
    pipelines: HashMap<UserId, TeilnehmerPipeline>,
    aktive: AktiveSprecher,
    naechste_generation: u64,
    ende_tx: mpsc::UnboundedSender<PipelineEnde>,
    ende_rx: mpsc::UnboundedReceiver<PipelineEnde>,
}

impl TeilnehmerVerfolger {
    pub fn neu(
        quelle: Arc<dyn SprachVerbindung>,
        bus: MischBus,
        fabrik: DecoderFabrik,
        nachlauf: Duration,
        metriken: RelaisMetriken,
        abbruch: CancellationToken,
    ) -> Self {
        let (ende_tx, ende_rx) = mpsc::unbounded_channel();
        Self {
            quelle,
            bus,
            fabrik,
            nachlauf,
            metriken,
            abbruch,
            pipelines: HashMap::new(),
            aktive: Arc::new(DashMap::new()),
            naechste_generation: 1,
            ende_tx,
            ende_rx,
        }
    }

    /// Startet den Verfolger-Task auf dem Ereignis-Strom
    pub fn starten(self, ereignisse: mpsc::UnboundedReceiver<SprechEreignis>) -> VerfolgerHandle {
        let aktive = Arc::clone(&self.aktive);
        let abbruch = self.abbruch.clone();
        let task = tokio::spawn(self.laufen(ereignisse));
        VerfolgerHandle {
            task: Some(task),
            aktive,
            abbruch,
        }
    }

    async fn laufen(mut self, mut ereignisse: mpsc::UnboundedReceiver<SprechEreignis>) -> AbbauBericht {
        let mut ereignisse_offen = true;
        debug!(kanal = %self.quelle.kanal(), "Teilnehmer-Verfolger gestartet");

        loop {
            tokio::select! {
                biased;
                _ = self.abbruch.cancelled() => break,
                Some(ende) = self.ende_rx.recv() => self.pipeline_beendet(ende).await,
                ereignis = ereignisse.recv(), if ereignisse_offen => match ereignis {
                    Some(SprechEreignis::Start(sprecher)) => self.sprecher_start(sprecher).await,
                    Some(SprechEreignis::Stopp(sprecher)) => {
                        // Das Ende bestimmt allein der Nachlauf des Abonnements
                        trace!(sprecher = %sprecher, "Sprechende gemeldet");
                    }
                    None => {
                        warn!(kanal = %self.quelle.kanal(), "Sprech-Ereignisse beendet, keine neuen Sprecher mehr");
                        ereignisse_offen = false;
                    }
                },
            }
        }

        self.alle_abbauen().await
    }

    async fn sprecher_start(&mut self, sprecher: UserId) {
        if let Some(vorhanden) = self.pipelines.get(&sprecher) {
            if !vorhanden.ist_beendet() {
                trace!(sprecher = %sprecher, "Pipeline besteht bereits");
                return;
            }
            // Nachlauf gerade abgelaufen, Ende-Meldung noch unterwegs
            if let Some(alt) = self.pipelines.remove(&sprecher) {
                if let Err(e) = self.abschliessen(alt).await {
                    warn!(sprecher = %sprecher, fehler = %e, "Alte Pipeline nicht sauber abgebaut");
                }
            }
        }

        let generation = self.naechste_generation;
        self.naechste_generation += 1;

        match TeilnehmerPipeline::aufbauen(
            sprecher,
            generation,
            &*self.quelle,
            &self.bus,
            &self.fabrik,
            self.nachlauf,
            self.abbruch.child_token(),
            self.ende_tx.clone(),
            self.metriken.clone(),
        ) {
            Ok(pipeline) => {
                self.pipelines.insert(sprecher, pipeline);
                self.aktive.insert(sprecher, Utc::now());
                self.metriken.pipelines_erstellt.inc();
                self.metriken.pipelines_aktiv.set(self.pipelines.len() as i64);
                self.metriken.mischpult_eingaenge.set(self.bus.anzahl_eingaenge() as i64);
                info!(sprecher = %sprecher, aktiv = self.pipelines.len(), "Sprecher angeschlossen");
            }
            Err(e) => {
                warn!(sprecher = %sprecher, fehler = %e, "Pipeline konnte nicht aufgebaut werden");
            }
        }
    }

    async fn pipeline_beendet(&mut self, ende: PipelineEnde) {
        let passt = self
            .pipelines
            .get(&ende.sprecher)
            .is_some_and(|p| p.generation() == ende.generation);
        if !passt {
            return;
        }
        if let Some(pipeline) = self.pipelines.remove(&ende.sprecher) {
            match self.abschliessen(pipeline).await {
                Ok(abschluss) => info!(
                    sprecher = %ende.sprecher,
                    grund = ?abschluss.grund,
                    aktiv = self.pipelines.len(),
                    "Sprecher getrennt"
                ),
                Err(e) => warn!(sprecher = %ende.sprecher, fehler = %e, "Pipeline-Abbau fehlgeschlagen"),
            }
        }
    }

    async fn abschliessen(&mut self, pipeline: TeilnehmerPipeline) -> RelaisResult<PipelineAbschluss> {
        let sprecher = pipeline.sprecher();
        let ergebnis = pipeline.abbauen().await;

        self.aktive.remove(&sprecher);
        self.metriken.pipelines_aktiv.set(self.pipelines.len() as i64);
        self.metriken.mischpult_eingaenge.set(self.bus.anzahl_eingaenge() as i64);
        ergebnis
    }

    async fn alle_abbauen(mut self) -> AbbauBericht {
        let mut bericht = AbbauBericht::default();
        loop {
            let sprecher: Vec<UserId> = self.pipelines.keys().copied().collect();
            if sprecher.is_empty() {
                break;
            }
            for id in sprecher {
                let Some(pipeline) = self.pipelines.remove(&id) else {
                    continue;
                };
                match self.abschliessen(pipeline).await {
                    Ok(_) => bericht.pipelines_abgebaut += 1,
                    Err(e) => {
                        warn!(sprecher = %id, fehler = %e, "Pipeline-Abbau fehlgeschlagen");
                        bericht.fehler.push(e.to_string());
                    }
                }
            }
        }
        debug!(abgebaut = bericht.pipelines_abgebaut, "Teilnehmer-Verfolger beendet");
        bericht
    }
}

/// Griff auf den laufenden Verfolger
pub struct VerfolgerHandle {
    task: Option<JoinHandle<AbbauBericht>>,
    aktive: AktiveSprecher,
    abbruch: CancellationToken,
}

impl VerfolgerHandle {
    /// Aktuell angeschlossene Sprecher, aufsteigend sortiert
    pub fn aktive_sprecher(&self) -> Vec<UserId> {
        let mut liste: Vec<UserId> = self.aktive.iter().map(|e| *e.key()).collect();
        liste.sort();
        liste
    }

    pub fn anzahl_aktiv(&self) -> usize {
        self.aktive.len()
    }

    /// Bricht den Verfolger ab und wartet, bis alle Pipelines abgebaut sind
    pub async fn beenden(&mut self) -> RelaisResult<AbbauBericht> {
        self.abbruch.cancel();
        let Some(task) = self.task.take() else {
            return Ok(AbbauBericht::default());
        };
        task.await
            .map_err(|e| RelaisError::Abbau(format!("Verfolger-Task: {e}")))
    }
}
