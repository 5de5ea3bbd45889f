//! Teilnehmer-Pipeline: ein Sprecher, vom Rohstrom bis ins Mischpult
//!
//! Eine Pipeline besteht aus Mischpult-Eingang, Dekodier-Pipeline und dem
//! Audio-Abonnement des Sprechers. Ein eigener Task liest Pakete aus dem
//! Abonnement, dekodiert sie und schreibt das PCM in den Eingang.
//!
//! Endet das Abonnement (Nachlauf abgelaufen) oder wird der Token
//! abgebrochen, gibt der Task seine Ressourcen immer in derselben
//! Reihenfolge frei: Eingang abstecken, Decoder freigeben, Rohstrom
//! freigeben. Danach meldet er das Ende an den Verfolger.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use vcsync_audio::{
    DecoderFabrik, DekodierPipeline, DekodierStatistik, EingangId, MischBus, MischEingang,
};
use vcsync_core::UserId;
use vcsync_observability::RelaisMetriken;
use vcsync_voice::{AudioAbo, EndeVerhalten, SprachVerbindung};

use crate::error::{RelaisError, RelaisResult};

/// Warum eine Pipeline endete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndeGrund {
    /// Nachlauf ohne Audio abgelaufen
    Stille,
    /// Sitzung oder Verfolger hat abgebrochen
    Abgebrochen,
    /// Eingang wurde von aussen abgesteckt
    EingangGetrennt,
}

/// Meldung des Pipeline-Tasks an den Verfolger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineEnde {
    pub sprecher: UserId,
    pub generation: u64,
}

/// Ergebnis eines beendeten Pipeline-Tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineAbschluss {
    pub sprecher: UserId,
    pub grund: EndeGrund,
    pub statistik: DekodierStatistik,
}

pub struct TeilnehmerPipeline {
    sprecher: UserId,
    generation: u64,
    eingang_id: EingangId,
    bus: MischBus,
    abbruch: CancellationToken,
    beendet: Arc<AtomicBool>,
    task: Option<JoinHandle<PipelineAbschluss>>,
}

impl TeilnehmerPipeline {
    /// Baut die Pipeline auf und startet den Dekodier-Task.
    ///
    /// Schlaegt das Abonnieren fehl, wird der bereits angesteckte Eingang
    /// wieder entfernt.
    #[allow(clippy::too_many_arguments)]
    pub fn aufbauen(
        sprecher: UserId,
        generation: u64,
        quelle: &dyn SprachVerbindung,
        bus: &MischBus,
        fabrik: &DecoderFabrik,
        nachlauf: Duration,
        abbruch: CancellationToken,
        ende_tx: mpsc::UnboundedSender<PipelineEnde>,
        metriken: RelaisMetriken,
    ) -> RelaisResult<Self> {
        let decoder = fabrik().map_err(|e| RelaisError::Pipeline {
            sprecher,
            grund: e.to_string(),
        })?;

        let eingang = bus.eingang_hinzufuegen(sprecher.to_string());
        let eingang_id = eingang.id();

        let abo = match quelle.audio_abonnieren(sprecher, EndeVerhalten::NachStille(nachlauf)) {
            Ok(abo) => abo,
            Err(e) => {
                bus.eingang_entfernen(eingang_id);
                return Err(RelaisError::Pipeline {
                    sprecher,
                    grund: e.to_string(),
                });
            }
        };

        let beendet = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(dekodier_schleife(
            DekodierTask {
                sprecher,
                generation,
                abo,
                dekodierer: DekodierPipeline::neu(decoder),
                eingang,
                bus: bus.clone(),
                abbruch: abbruch.clone(),
                beendet: Arc::clone(&beendet),
                metriken,
            },
            ende_tx,
        ));

        debug!(sprecher = %sprecher, generation, eingang = eingang_id, "Pipeline aufgebaut");

        Ok(Self {
            sprecher,
            generation,
            eingang_id,
            bus: bus.clone(),
            abbruch,
            beendet,
            task: Some(task),
        })
    }

    pub fn sprecher(&self) -> UserId {
        self.sprecher
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn eingang_id(&self) -> EingangId {
        self.eingang_id
    }

    /// `true` sobald der Task seine Schleife verlassen hat
    pub fn ist_beendet(&self) -> bool {
        self.beendet.load(Ordering::Acquire)
    }

    /// Baut die Pipeline ab: zuerst Eingang abstecken, dann Task
    /// abbrechen und auf die Freigabe von Decoder und Rohstrom warten.
    pub async fn abbauen(mut self) -> RelaisResult<PipelineAbschluss> {
        self.bus.eingang_entfernen(self.eingang_id);
        self.abbruch.cancel();

        let Some(task) = self.task.take() else {
            return Err(RelaisError::Abbau(format!(
                "Pipeline {} wurde bereits abgebaut",
                self.sprecher
            )));
        };
        task.await.map_err(|e| RelaisError::Pipeline {
            sprecher: self.sprecher,
            grund: format!("Task beendet mit Fehler: {e}"),
        })
    }
}

impl Drop for TeilnehmerPipeline {
    fn drop(&mut self) {
        if self.task.is_some() {
            self.bus.eingang_entfernen(self.eingang_id);
            self.abbruch.cancel();
        }
    }
}

impl std::fmt::Debug for TeilnehmerPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TeilnehmerPipeline")
            .field("sprecher", &self.sprecher)
            .field("generation", &self.generation)
            .field("eingang_id", &self.eingang_id)
            .field("beendet", &self.ist_beendet())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Dekodier-Task
// ---------------------------------------------------------------------------

struct DekodierTask {
    sprecher: UserId,
    generation: u64,
    abo: AudioAbo,
    dekodierer: DekodierPipeline,
    eingang: MischEingang,
    bus: MischBus,
    abbruch: CancellationToken,
    beendet: Arc<AtomicBool>,
    metriken: RelaisMetriken,
}

async fn dekodier_schleife(
    task: DekodierTask,
    ende_tx: mpsc::UnboundedSender<PipelineEnde>,
) -> PipelineAbschluss {
    let DekodierTask {
        sprecher,
        generation,
        mut abo,
        mut dekodierer,
        eingang,
        bus,
        abbruch,
        beendet,
        metriken,
    } = task;

    let grund = loop {
        tokio::select! {
            biased;
            _ = abbruch.cancelled() => break EndeGrund::Abgebrochen,
            paket = abo.naechstes() => {
                let Some(paket) = paket else {
                    break EndeGrund::Stille;
                };
                match dekodierer.verarbeiten(&paket) {
                    Some(samples) => {
                        metriken.pakete_dekodiert.inc();
                        if eingang.schreiben(&samples).is_err() {
                            break EndeGrund::EingangGetrennt;
                        }
                    }
                    None if paket.ist_audio() => {
                        metriken.pakete_verworfen.inc();
                    }
                    None => trace!(sprecher = %sprecher, "Stille-Paket uebersprungen"),
                }
            }
        }
    };
    beendet.store(true, Ordering::Release);

    // Reihenfolge ist fest: Eingang, Decoder, Rohstrom
    bus.eingang_entfernen(eingang.id());
    drop(eingang);
    let statistik = dekodierer.statistik();
    drop(dekodierer);
    drop(abo);

    debug!(
        sprecher = %sprecher,
        generation,
        ?grund,
        dekodiert = statistik.dekodiert,
        verworfen = statistik.verworfen(),
        "Pipeline beendet"
    );

    // Der Verfolger ist beim Sitzungsabbau eventuell schon weg
    let _ = ende_tx.send(PipelineEnde { sprecher, generation });

    PipelineAbschluss {
        sprecher,
        grund,
        statistik,
    }
}
