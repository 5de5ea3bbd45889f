//! In-Process-Transport
//!
//! Dieselbe Schnittstelle wie der UDP-Transport, aber komplett ueber
//! Kanaele im Speicher. Wird fuer lokale Verdrahtung und Tests genutzt:
//! Sprech-Ereignisse, Pakete, Beitrittsfehler und Trennungen lassen sich
//! von aussen einspeisen, abgespielte Frames, Stummschaltungen und
//! Zerstoerungen von aussen ablesen.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use vcsync_audio::{AusgangsRessource, PcmFrame};
use vcsync_core::{ChannelId, SprechEreignis, UserId, VerbindungsStatus};
use vcsync_protocol::VoicePacket;

use crate::error::{VoiceError, VoiceResult};
use crate::mitglieder::{Mitglied, MitgliederVerwaltung};
use crate::transport::{
    abo_kanal, AudioAbo, BeitrittsAnfrage, EndeVerhalten, SprachVerbindung, VerbindungsAnbieter,
};

/// Obergrenze mitgeschnittener Frames pro Kanal (5 Minuten)
const MAX_MITSCHNITT: usize = 15_000;

#[derive(Default)]
struct KanalZustand {
    aktuelle: Mutex<Option<Arc<SpeicherVerbindungInner>>>,
    mitschnitt: Arc<Mutex<VecDeque<PcmFrame>>>,
    mitglieder: DashMap<UserId, Mitglied>,
    beitritte: AtomicUsize,
    zerstoerungen: AtomicUsize,
    abspiel_aufrufe: AtomicUsize,
    abonnements: DashMap<UserId, usize>,
    beitritts_fehler: Mutex<Option<String>>,
}

#[derive(Default)]
struct SpeicherAnbieterInner {
    kanaele: DashMap<ChannelId, Arc<KanalZustand>>,
    beitritts_verzoegerung: Mutex<Option<Duration>>,
    stumm_fehler: DashMap<UserId, String>,
}

/// Anbieter fuer In-Process-Verbindungen; Klone teilen denselben Zustand
#[derive(Clone, Default)]
pub struct SpeicherAnbieter {
    inner: Arc<SpeicherAnbieterInner>,
}

impl SpeicherAnbieter {
    pub fn neu() -> Self {
        Self::default()
    }

    fn kanal(&self, kanal: ChannelId) -> Arc<KanalZustand> {
        Arc::clone(self.inner.kanaele.entry(kanal).or_default().value())
    }

    fn verbindung(&self, kanal: ChannelId) -> Option<Arc<SpeicherVerbindungInner>> {
        let zustand = self.kanal(kanal);
        let aktuelle = zustand.aktuelle.lock().clone();
        aktuelle
    }

    // -----------------------------------------------------------------------
    // Steuerung von aussen
    // -----------------------------------------------------------------------

    /// Laesst jeden weiteren Beitritt zu `kanal` fehlschlagen
    pub fn beitritt_fehlschlagen_lassen(&self, kanal: ChannelId, grund: impl Into<String>) {
        *self.kanal(kanal).beitritts_fehler.lock() = Some(grund.into());
    }

    pub fn beitritt_zulassen(&self, kanal: ChannelId) {
        *self.kanal(kanal).beitritts_fehler.lock() = None;
    }

    /// Verzoegert jeden Beitritt (abbrechbar ueber den Sitzungs-Token)
    pub fn beitritts_verzoegerung_setzen(&self, verzoegerung: Option<Duration>) {
        *self.inner.beitritts_verzoegerung.lock() = verzoegerung;
    }

    /// Meldet Sprechbeginn. `false`, wenn keine offene Verbindung besteht.
    pub fn sprechen_beginnen(&self, kanal: ChannelId, sprecher: UserId) -> bool {
        self.ereignis_senden(kanal, SprechEreignis::Start(sprecher))
    }

    pub fn sprechen_beenden(&self, kanal: ChannelId, sprecher: UserId) -> bool {
        self.ereignis_senden(kanal, SprechEreignis::Stopp(sprecher))
    }

    fn ereignis_senden(&self, kanal: ChannelId, ereignis: SprechEreignis) -> bool {
        let Some(verbindung) = self.verbindung(kanal) else {
            return false;
        };
        let gesendet = match verbindung.ereignis_tx.lock().as_ref() {
            Some(tx) => tx.send(ereignis).is_ok(),
            None => false,
        };
        gesendet
    }

    /// Schliesst den Ereignis-Strom der aktuellen Verbindung
    pub fn ereignisse_schliessen(&self, kanal: ChannelId) {
        if let Some(verbindung) = self.verbindung(kanal) {
            verbindung.ereignis_tx.lock().take();
        }
    }

    /// Reicht ein Paket an das Abonnement des Sprechers weiter.
    /// `false`, wenn kein offenes Abonnement existiert oder es voll ist.
    pub fn paket_einspeisen(&self, kanal: ChannelId, sprecher: UserId, paket: VoicePacket) -> bool {
        let Some(verbindung) = self.verbindung(kanal) else {
            return false;
        };
        let Some(tx) = verbindung.abos.get(&sprecher).map(|e| e.value().clone()) else {
            return false;
        };
        match tx.try_send(paket) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Closed(_)) => {
                verbindung.abos.remove(&sprecher);
                false
            }
            Err(mpsc::error::TrySendError::Full(_)) => false,
        }
    }

    /// Simuliert eine Trennung durch den Transport
    pub fn trennen(&self, kanal: ChannelId, grund: impl Into<String>) {
        if let Some(verbindung) = self.verbindung(kanal) {
            verbindung
                .status_tx
                .send_replace(VerbindungsStatus::Getrennt { grund: grund.into() });
        }
    }

    pub fn mitglied_hinzufuegen(&self, kanal: ChannelId, mitglied: Mitglied) {
        self.kanal(kanal).mitglieder.insert(mitglied.id, mitglied);
    }

    pub fn mitglied(&self, kanal: ChannelId, id: UserId) -> Option<Mitglied> {
        let zustand = self.kanal(kanal);
        let mitglied = zustand.mitglieder.get(&id).map(|m| m.clone());
        mitglied
    }

    /// Laesst jede Stummschaltung dieses Mitglieds fehlschlagen
    pub fn stumm_fehler_setzen(&self, id: UserId, grund: impl Into<String>) {
        self.inner.stumm_fehler.insert(id, grund.into());
    }

    // -----------------------------------------------------------------------
    // Beobachtung
    // -----------------------------------------------------------------------

    /// Bisher abgespielte Frames
    pub fn gespielte_frames(&self, kanal: ChannelId) -> Vec<PcmFrame> {
        let zustand = self.kanal(kanal);
        let frames = zustand.mitschnitt.lock().iter().cloned().collect();
        frames
    }

    pub fn mitschnitt_leeren(&self, kanal: ChannelId) {
        self.kanal(kanal).mitschnitt.lock().clear();
    }

    pub fn beitritte(&self, kanal: ChannelId) -> usize {
        self.kanal(kanal).beitritte.load(Ordering::SeqCst)
    }

    pub fn zerstoerungen(&self, kanal: ChannelId) -> usize {
        self.kanal(kanal).zerstoerungen.load(Ordering::SeqCst)
    }

    pub fn abspiel_aufrufe(&self, kanal: ChannelId) -> usize {
        self.kanal(kanal).abspiel_aufrufe.load(Ordering::SeqCst)
    }

    /// Wie oft der Sprecher insgesamt abonniert wurde
    pub fn abonnements(&self, kanal: ChannelId, sprecher: UserId) -> usize {
        let zustand = self.kanal(kanal);
        let anzahl = zustand.abonnements.get(&sprecher).map_or(0, |n| *n);
        anzahl
    }

    /// Aktuell offene Abonnements
    pub fn offene_abos(&self, kanal: ChannelId) -> usize {
        let Some(verbindung) = self.verbindung(kanal) else {
            return 0;
        };
        let offen = verbindung.abos.iter().filter(|e| !e.value().is_closed()).count();
        offen
    }

    /// Gibt es eine nicht zerstoerte Verbindung?
    pub fn verbunden(&self, kanal: ChannelId) -> bool {
        match self.verbindung(kanal) {
            Some(v) => {
                let zerstoert = matches!(*v.status_tx.borrow(), VerbindungsStatus::Zerstoert);
                !zerstoert
            }
            None => false,
        }
    }
}

#[async_trait]
impl VerbindungsAnbieter for SpeicherAnbieter {
    async fn beitreten(
        &self,
        anfrage: BeitrittsAnfrage,
        abbruch: CancellationToken,
    ) -> VoiceResult<Arc<dyn SprachVerbindung>> {
        let verzoegerung = *self.inner.beitritts_verzoegerung.lock();
        if let Some(dauer) = verzoegerung {
            tokio::select! {
                _ = abbruch.cancelled() => return Err(VoiceError::Abgebrochen),
                _ = tokio::time::sleep(dauer) => {}
            }
        }
        if abbruch.is_cancelled() {
            return Err(VoiceError::Abgebrochen);
        }

        let zustand = self.kanal(anfrage.kanal);
        if let Some(grund) = zustand.beitritts_fehler.lock().clone() {
            return Err(VoiceError::BeitrittFehlgeschlagen {
                kanal: anfrage.kanal,
                grund,
            });
        }

        let (ereignis_tx, ereignis_rx) = mpsc::unbounded_channel();
        let (status_tx, _) = watch::channel(VerbindungsStatus::Bereit);
        let inner = Arc::new(SpeicherVerbindungInner {
            anfrage: anfrage.clone(),
            ereignis_tx: Mutex::new(Some(ereignis_tx)),
            ereignis_rx: Mutex::new(Some(ereignis_rx)),
            abos: DashMap::new(),
            status_tx,
            abspielen: Mutex::new(None),
            zustand: Arc::downgrade(&zustand),
        });

        *zustand.aktuelle.lock() = Some(Arc::clone(&inner));
        zustand.beitritte.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(kanal = %anfrage.kanal, gruppe = %anfrage.gruppe, "Speicher-Verbindung hergestellt");

        Ok(Arc::new(SpeicherVerbindung { inner }))
    }
}

#[async_trait]
impl MitgliederVerwaltung for SpeicherAnbieter {
    async fn mitglieder(&self, kanal: ChannelId) -> VoiceResult<Vec<Mitglied>> {
        let mut liste: Vec<Mitglied> = self
            .kanal(kanal)
            .mitglieder
            .iter()
            .map(|m| m.value().clone())
            .collect();
        liste.sort_by_key(|m| m.id);
        Ok(liste)
    }

    async fn stumm_setzen(&self, kanal: ChannelId, mitglied: UserId, stumm: bool) -> VoiceResult<()> {
        if let Some(grund) = self.inner.stumm_fehler.get(&mitglied) {
            return Err(VoiceError::StummSchaltung {
                mitglied,
                grund: grund.clone(),
            });
        }
        let zustand = self.kanal(kanal);
        let mut eintrag = zustand
            .mitglieder
            .get_mut(&mitglied)
            .ok_or(VoiceError::MitgliedUnbekannt(mitglied))?;
        eintrag.stumm = stumm;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Verbindung
// ---------------------------------------------------------------------------

struct SpeicherVerbindungInner {
    anfrage: BeitrittsAnfrage,
    ereignis_tx: Mutex<Option<mpsc::UnboundedSender<SprechEreignis>>>,
    ereignis_rx: Mutex<Option<mpsc::UnboundedReceiver<SprechEreignis>>>,
    abos: DashMap<UserId, mpsc::Sender<VoicePacket>>,
    status_tx: watch::Sender<VerbindungsStatus>,
    abspielen: Mutex<Option<JoinHandle<()>>>,
    zustand: Weak<KanalZustand>,
}

pub struct SpeicherVerbindung {
    inner: Arc<SpeicherVerbindungInner>,
}

#[async_trait]
impl SprachVerbindung for SpeicherVerbindung {
    fn kanal(&self) -> ChannelId {
        self.inner.anfrage.kanal
    }

    fn sprech_ereignisse(&self) -> VoiceResult<mpsc::UnboundedReceiver<SprechEreignis>> {
        self.inner
            .ereignis_rx
            .lock()
            .take()
            .ok_or(VoiceError::EreignisseBereitsVergeben)
    }

    fn audio_abonnieren(&self, sprecher: UserId, ende: EndeVerhalten) -> VoiceResult<AudioAbo> {
        if self.inner.status_tx.borrow().ist_beendet() {
            return Err(VoiceError::Getrennt {
                kanal: self.kanal(),
                grund: "Verbindung beendet".into(),
            });
        }
        let (tx, abo) = abo_kanal(sprecher, ende);
        self.inner.abos.insert(sprecher, tx);
        if let Some(zustand) = self.inner.zustand.upgrade() {
            *zustand.abonnements.entry(sprecher).or_insert(0) += 1;
        }
        Ok(abo)
    }

    fn abspielen(&self, mut ressource: AusgangsRessource) -> VoiceResult<()> {
        if self.inner.anfrage.selbst_stumm {
            return Err(VoiceError::AbspielenVerweigert(format!(
                "{} ist selbst stumm geschaltet",
                self.kanal()
            )));
        }
        let Some(zustand) = self.inner.zustand.upgrade() else {
            return Err(VoiceError::AbspielenVerweigert("Anbieter existiert nicht mehr".into()));
        };
        zustand.abspiel_aufrufe.fetch_add(1, Ordering::SeqCst);

        let mitschnitt = Arc::clone(&zustand.mitschnitt);
        let task = tokio::spawn(async move {
            loop {
                let frame = ressource.naechster_frame().await;
                let mut m = mitschnitt.lock();
                if m.len() >= MAX_MITSCHNITT {
                    m.pop_front();
                }
                m.push_back(frame);
            }
        });
        if let Some(alt) = self.inner.abspielen.lock().replace(task) {
            alt.abort();
        }
        Ok(())
    }

    fn status(&self) -> watch::Receiver<VerbindungsStatus> {
        self.inner.status_tx.subscribe()
    }

    async fn zerstoeren(&self) {
        if matches!(*self.inner.status_tx.borrow(), VerbindungsStatus::Zerstoert) {
            return;
        }
        self.inner.status_tx.send_replace(VerbindungsStatus::Zerstoert);
        if let Some(task) = self.inner.abspielen.lock().take() {
            task.abort();
        }
        self.inner.abos.clear();
        self.inner.ereignis_tx.lock().take();
        if let Some(zustand) = self.inner.zustand.upgrade() {
            zustand.zerstoerungen.fetch_add(1, Ordering::SeqCst);
        }
        tracing::debug!(kanal = %self.kanal(), "Speicher-Verbindung zerstoert");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcsync_audio::{MischBus, MischBusKonfig};

    const KANAL: ChannelId = ChannelId(1);

    async fn beitreten(anbieter: &SpeicherAnbieter, anfrage: BeitrittsAnfrage) -> Arc<dyn SprachVerbindung> {
        anbieter
            .beitreten(anfrage, CancellationToken::new())
            .await
            .expect("Beitritt muss klappen")
    }

    #[tokio::test]
    async fn ereignisse_werden_zugestellt() {
        let anbieter = SpeicherAnbieter::neu();
        let verbindung = beitreten(&anbieter, BeitrittsAnfrage::quelle(KANAL)).await;
        let mut rx = verbindung.sprech_ereignisse().unwrap();
        assert!(matches!(
            verbindung.sprech_ereignisse(),
            Err(VoiceError::EreignisseBereitsVergeben)
        ));

        assert!(anbieter.sprechen_beginnen(KANAL, UserId(5)));
        assert_eq!(rx.recv().await, Some(SprechEreignis::Start(UserId(5))));
    }

    #[tokio::test]
    async fn pakete_erreichen_das_abonnement() {
        let anbieter = SpeicherAnbieter::neu();
        let verbindung = beitreten(&anbieter, BeitrittsAnfrage::quelle(KANAL)).await;
        assert!(!anbieter.paket_einspeisen(KANAL, UserId(5), VoicePacket::neu_keepalive(5)));

        let mut abo = verbindung.audio_abonnieren(UserId(5), EndeVerhalten::Manuell).unwrap();
        let paket = VoicePacket::neu_audio(1, 0, 5, vec![1, 0, 1, 0]);
        assert!(anbieter.paket_einspeisen(KANAL, UserId(5), paket.clone()));
        assert_eq!(abo.naechstes().await, Some(paket));
        assert_eq!(anbieter.abonnements(KANAL, UserId(5)), 1);
        assert_eq!(anbieter.offene_abos(KANAL), 1);
    }

    #[tokio::test]
    async fn beitrittsfehler_und_abbruch() {
        let anbieter = SpeicherAnbieter::neu();
        anbieter.beitritt_fehlschlagen_lassen(KANAL, "kein Zugriff");
        let err = anbieter
            .beitreten(BeitrittsAnfrage::quelle(KANAL), CancellationToken::new())
            .await
            .err();
        assert!(matches!(err, Some(VoiceError::BeitrittFehlgeschlagen { .. })));

        anbieter.beitritt_zulassen(KANAL);
        let token = CancellationToken::new();
        token.cancel();
        let err = anbieter.beitreten(BeitrittsAnfrage::quelle(KANAL), token).await.err();
        assert!(matches!(err, Some(VoiceError::Abgebrochen)));
        assert_eq!(anbieter.beitritte(KANAL), 0);
    }

    #[tokio::test]
    async fn selbst_stumm_verweigert_abspielen() {
        let anbieter = SpeicherAnbieter::neu();
        let verbindung = beitreten(&anbieter, BeitrittsAnfrage::quelle(KANAL)).await;
        let ressource = AusgangsRessource::neu(MischBus::neu(MischBusKonfig::default()));
        assert!(matches!(
            verbindung.abspielen(ressource),
            Err(VoiceError::AbspielenVerweigert(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn abspielen_schneidet_frames_mit() {
        let anbieter = SpeicherAnbieter::neu();
        let verbindung = beitreten(&anbieter, BeitrittsAnfrage::ziel(KANAL)).await;
        verbindung
            .abspielen(AusgangsRessource::neu(MischBus::neu(MischBusKonfig::default())))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let frames = anbieter.gespielte_frames(KANAL);
        assert!(frames.len() >= 5);
        assert!(frames.iter().all(PcmFrame::ist_stille));
    }

    #[tokio::test(start_paused = true)]
    async fn zerstoeren_ist_idempotent() {
        let anbieter = SpeicherAnbieter::neu();
        let verbindung = beitreten(&anbieter, BeitrittsAnfrage::ziel(KANAL)).await;
        verbindung
            .abspielen(AusgangsRessource::neu(MischBus::neu(MischBusKonfig::default())))
            .unwrap();
        let status = verbindung.status();

        verbindung.zerstoeren().await;
        verbindung.zerstoeren().await;
        assert_eq!(anbieter.zerstoerungen(KANAL), 1);
        assert_eq!(*status.borrow(), VerbindungsStatus::Zerstoert);
        assert!(!anbieter.verbunden(KANAL));

        tokio::time::sleep(Duration::from_millis(10)).await;
        let vorher = anbieter.gespielte_frames(KANAL).len();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(anbieter.gespielte_frames(KANAL).len(), vorher);
    }

    #[tokio::test]
    async fn trennen_meldet_status() {
        let anbieter = SpeicherAnbieter::neu();
        let verbindung = beitreten(&anbieter, BeitrittsAnfrage::quelle(KANAL)).await;
        let mut status = verbindung.status();
        anbieter.trennen(KANAL, "Netz weg");
        status.changed().await.unwrap();
        assert!(status.borrow().ist_getrennt());
    }

    #[tokio::test]
    async fn mitglieder_stumm_schalten() {
        let anbieter = SpeicherAnbieter::neu();
        anbieter.mitglied_hinzufuegen(KANAL, Mitglied::neu(UserId(2), "anna"));
        anbieter.stumm_setzen(KANAL, UserId(2), true).await.unwrap();
        assert!(anbieter.mitglied(KANAL, UserId(2)).unwrap().stumm);
        assert!(matches!(
            anbieter.stumm_setzen(KANAL, UserId(3), true).await,
            Err(VoiceError::MitgliedUnbekannt(_))
        ));
    }
}
