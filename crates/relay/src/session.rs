//! Relais-Sitzung
//!
//! Besitzt fuer die Dauer eines aktiven Relais beide Verbindungen, das
//! Mischpult, den Ausgang und den Teilnehmer-Verfolger. Jedes Teil ist
//! optional, damit der Abbau auch nach einem halb fertigen Aufbau
//! funktioniert. `abbauen()` darf beliebig oft aufgerufen werden.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vcsync_audio::{DecoderFabrik, MischBus};
use vcsync_core::{ChannelId, SessionId, UserId};
use vcsync_observability::RelaisMetriken;
use vcsync_voice::{BeitrittsAnfrage, SprachVerbindung, VerbindungsAnbieter, VoiceError};

use crate::error::{RelaisError, RelaisResult};
use crate::konfig::RelaisKonfig;
use crate::publisher::Herausgeber;
use crate::tracker::{AbbauBericht, TeilnehmerVerfolger, VerfolgerHandle};

pub struct Sitzung {
    id: SessionId,
    gestartet_am: DateTime<Utc>,
    konfig: RelaisKonfig,
    abbruch: CancellationToken,
    quelle: Option<Arc<dyn SprachVerbindung>>,
    ziel: Option<Arc<dyn SprachVerbindung>>,
    bus: Option<MischBus>,
    herausgeber: Option<Herausgeber>,
    verfolger: Option<VerfolgerHandle>,
}

impl Sitzung {
    /// Baut eine Sitzung vollstaendig auf.
    ///
    /// Beide Kanaele werden gleichzeitig betreten. Scheitert irgendein
    /// Schritt, wird das bereits Aufgebaute wieder abgebaut bevor der
    /// Fehler zurueckkommt.
    pub async fn aufbauen(
        anbieter: &dyn VerbindungsAnbieter,
        konfig: &RelaisKonfig,
        fabrik: DecoderFabrik,
        metriken: RelaisMetriken,
        abbruch: CancellationToken,
    ) -> RelaisResult<Self> {
        let mut sitzung = Self {
            id: SessionId::new(),
            gestartet_am: Utc::now(),
            konfig: konfig.clone(),
            abbruch,
            quelle: None,
            ziel: None,
            bus: None,
            herausgeber: None,
            verfolger: None,
        };

        if let Err(e) = sitzung.verdrahten(anbieter, fabrik, metriken).await {
            let bericht = sitzung.abbauen().await;
            if !bericht.fehlerfrei() {
                warn!(sitzung = %sitzung.id, fehler = ?bericht.fehler, "Abbau nach Fehlstart unvollstaendig");
            }
            return Err(e);
        }
        Ok(sitzung)
    }

    async fn verdrahten(
        &mut self,
        anbieter: &dyn VerbindungsAnbieter,
        fabrik: DecoderFabrik,
        metriken: RelaisMetriken,
    ) -> RelaisResult<()> {
        let quell_kanal = self.konfig.quell_kanal;
        let ziel_kanal = self.konfig.ziel_kanal;

        let (quelle, ziel) = tokio::join!(
            anbieter.beitreten(BeitrittsAnfrage::quelle(quell_kanal), self.abbruch.clone()),
            anbieter.beitreten(BeitrittsAnfrage::ziel(ziel_kanal), self.abbruch.clone()),
        );

        // Erfolgreiche Seite zuerst sichern, damit der Abbau sie findet
        let quelle = quelle.map(|v| {
            self.quelle = Some(Arc::clone(&v));
            v
        });
        let ziel = ziel.map(|v| {
            self.ziel = Some(Arc::clone(&v));
            v
        });

        if self.abbruch.is_cancelled() {
            return Err(RelaisError::Abgebrochen);
        }
        let quelle = quelle.map_err(|e| beitritts_fehler(quell_kanal, e))?;
        let ziel = ziel.map_err(|e| beitritts_fehler(ziel_kanal, e))?;
        debug!(sitzung = %self.id, quelle = %quell_kanal, ziel = %ziel_kanal, "Beide Kanaele betreten");

        let ereignisse = quelle.sprech_ereignisse()?;

        let bus = MischBus::neu(self.konfig.misch_bus());
        self.bus = Some(bus.clone());

        self.herausgeber = Some(Herausgeber::verdrahten(&bus, &*ziel)?);

        let verfolger = TeilnehmerVerfolger::neu(
            quelle,
            bus,
            fabrik,
            self.konfig.nachlauf,
            metriken,
            self.abbruch.child_token(),
        );
        self.verfolger = Some(verfolger.starten(ereignisse));
        Ok(())
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn gestartet_am(&self) -> DateTime<Utc> {
        self.gestartet_am
    }

    pub fn abbruch(&self) -> &CancellationToken {
        &self.abbruch
    }

    pub fn quelle(&self) -> Option<&Arc<dyn SprachVerbindung>> {
        self.quelle.as_ref()
    }

    pub fn ziel(&self) -> Option<&Arc<dyn SprachVerbindung>> {
        self.ziel.as_ref()
    }

    pub fn aktive_sprecher(&self) -> Vec<UserId> {
        self.verfolger
            .as_ref()
            .map(VerfolgerHandle::aktive_sprecher)
            .unwrap_or_default()
    }

    pub fn frames_gesendet(&self) -> u64 {
        self.herausgeber.as_ref().map_or(0, Herausgeber::frames_gesendet)
    }

    /// Baut die Sitzung ab.
    ///
    /// Reihenfolge: Token abbrechen, alle Pipelines abbauen (Eingang vor
    /// Pipeline), beide Verbindungen zerstoeren, Mischpult und Ausgang
    /// freigeben. Fehler einzelner Schritte landen im Bericht, der Abbau
    /// laeuft trotzdem weiter.
    pub async fn abbauen(&mut self) -> AbbauBericht {
        self.abbruch.cancel();
        let mut bericht = AbbauBericht::default();

        if let Some(mut verfolger) = self.verfolger.take() {
            match verfolger.beenden().await {
                Ok(teil) => bericht.uebernehmen(teil),
                Err(e) => bericht.fehler.push(e.to_string()),
            }
        }

        let frist = self.konfig.zerstoer_frist;
        let quelle = self.quelle.take();
        let ziel = self.ziel.take();
        let (q, z) = tokio::join!(zerstoeren(quelle, frist), zerstoeren(ziel, frist));
        for ergebnis in [q, z] {
            match ergebnis {
                Some(Ok(())) => bericht.verbindungen_zerstoert += 1,
                Some(Err(e)) => bericht.fehler.push(e),
                None => {}
            }
        }

        if let Some(bus) = self.bus.take() {
            let uebrig = bus.leeren();
            if uebrig > 0 {
                warn!(sitzung = %self.id, uebrig, "Mischpult hatte nach dem Abbau noch Eingaenge");
            }
        }
        if let Some(herausgeber) = self.herausgeber.take() {
            bericht.frames_gesendet = herausgeber.frames_gesendet();
        }

        if bericht.pipelines_abgebaut > 0 || bericht.verbindungen_zerstoert > 0 {
            info!(
                sitzung = %self.id,
                pipelines = bericht.pipelines_abgebaut,
                verbindungen = bericht.verbindungen_zerstoert,
                frames = bericht.frames_gesendet,
                fehler = bericht.fehler.len(),
                "Sitzung abgebaut"
            );
        }
        bericht
    }
}

impl Drop for Sitzung {
    fn drop(&mut self) {
        self.abbruch.cancel();
    }
}

fn beitritts_fehler(kanal: ChannelId, fehler: VoiceError) -> RelaisError {
    match fehler {
        VoiceError::Abgebrochen => RelaisError::Abgebrochen,
        quelle => RelaisError::Beitritt { kanal, quelle },
    }
}

async fn zerstoeren(
    verbindung: Option<Arc<dyn SprachVerbindung>>,
    frist: std::time::Duration,
) -> Option<Result<(), String>> {
    let verbindung = verbindung?;
    let kanal = verbindung.kanal();
    let ergebnis = match tokio::time::timeout(frist, verbindung.zerstoeren()).await {
        Ok(()) => Ok(()),
        Err(_) => {
            warn!(kanal = %kanal, "Zerstoeren der Verbindung ueberschritt die Frist");
            Err(format!("Zerstoeren von {kanal} ueberschritt {} ms", frist.as_millis()))
        }
    };
    Some(ergebnis)
}
