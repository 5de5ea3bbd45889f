//! UDP-Sprach-Transport
//!
//! Jeder konfigurierte Kanal entspricht einer lokalen UDP-Adresse. Ein
//! Beitritt bindet diese Adresse; jede Gegenstelle, die Pakete an den
//! Kanal schickt, wird anhand ihrer SSRC als Mitglied gefuehrt.
//!
//! ## Architektur
//!
//! ```text
//! UDP Socket (recv_from)
//!     |
//!     v
//! VoicePacket::decode()            <- Validierung
//!     |
//!     v
//! MitgliederRegister::beruehren()  <- Mitglied anlegen / auffrischen
//!     |
//!     +--> Sprech-Ereignis (Start/Stopp)
//!     +--> Audio-Abonnement des Sprechers (mpsc)
//!
//! AusgangsRessource (20 ms Takt) --> Encoder --> Send-Queue pro Mitglied --> send_to
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use vcsync_audio::{encoder_erstellen, AusgangsRessource, PaketEncoder};
use vcsync_core::{ChannelId, SprechEreignis, UserId, VerbindungsStatus};
use vcsync_protocol::codec::{CodecArt, OpusConfig, RELAIS_FORMAT};
use vcsync_protocol::voice::{PacketType, VoiceFlags, VoicePacket, VoicePacketHeader, MAX_NUTZDATEN_LAENGE};

use crate::error::{VoiceError, VoiceResult};
use crate::mitglieder::{Mitglied, MitgliederVerwaltung};
use crate::transport::{
    abo_kanal, AudioAbo, BeitrittsAnfrage, EndeVerhalten, SprachVerbindung, VerbindungsAnbieter,
};

/// Empfangspuffer: Header + maximale Nutzdaten + Reserve
const UDP_BUFFER_SIZE: usize = VoicePacketHeader::SIZE + MAX_NUTZDATEN_LAENGE + 64;

/// Timeout fuer stille Mitglieder (30 Sekunden ohne Paket)
pub const MITGLIED_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct UdpTransportKonfig {
    /// Kanal -> lokale Bind-Adresse
    pub kanaele: HashMap<ChannelId, SocketAddr>,
    /// SSRC der eigenen Sendungen
    pub eigene_ssrc: u32,
    /// Gegenstellen, die als Bots gelten
    pub bot_ssrcs: Vec<u32>,
    pub mitglied_timeout: Duration,
    /// Ohne Audio fuer diese Dauer gilt ein Sprecher als verstummt
    pub sprech_timeout: Duration,
    pub codec: CodecArt,
    pub opus: OpusConfig,
    /// Groesse der Send-Queue pro Mitglied
    pub sende_queue_groesse: usize,
}

impl Default for UdpTransportKonfig {
    fn default() -> Self {
        Self {
            kanaele: HashMap::new(),
            eigene_ssrc: 1,
            bot_ssrcs: Vec::new(),
            mitglied_timeout: MITGLIED_TIMEOUT,
            sprech_timeout: Duration::from_millis(200),
            codec: CodecArt::Opus,
            opus: OpusConfig::default(),
            sende_queue_groesse: 128,
        }
    }
}

// ---------------------------------------------------------------------------
// SendeWarteschlange – Sende-Task pro Mitglied
// ---------------------------------------------------------------------------

/// Handle fuer den Sende-Task eines Mitglieds
///
/// Wird `tx` gedroppt, endet der Task nach dem Leeren der Queue.
struct SendeWarteschlange {
    tx: mpsc::Sender<Arc<Vec<u8>>>,
    ziel: SocketAddr,
    task: JoinHandle<()>,
}

impl SendeWarteschlange {
    fn starten(socket: Arc<UdpSocket>, ziel: SocketAddr, groesse: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<Arc<Vec<u8>>>(groesse);

        let task = tokio::spawn(async move {
            while let Some(daten) = rx.recv().await {
                match socket.send_to(&daten, ziel).await {
                    Ok(_) => {
                        tracing::trace!(bytes = daten.len(), ziel = %ziel, "UDP-Paket gesendet");
                    }
                    Err(e) => {
                        tracing::warn!(fehler = %e, ziel = %ziel, "UDP-Sendefehler");
                    }
                }
            }
            tracing::debug!(ziel = %ziel, "Sende-Task beendet");
        });

        Self { tx, ziel, task }
    }
}

// ---------------------------------------------------------------------------
// Mitglieder-Register
// ---------------------------------------------------------------------------

struct MitgliedEintrag {
    mitglied: Mitglied,
    adresse: SocketAddr,
    letztes_paket: Instant,
}

/// Ergebnis von `MitgliederRegister::beruehren`
struct Beruehrung {
    id: UserId,
    neu: bool,
    stumm: bool,
}

/// Mitglieder eines Kanals; ueberdauert einzelne Verbindungen
#[derive(Default)]
struct MitgliederRegister {
    eintraege: DashMap<UserId, MitgliedEintrag>,
}

impl MitgliederRegister {
    fn beruehren(&self, ssrc: u32, adresse: SocketAddr, ist_bot: bool) -> Beruehrung {
        let id = UserId::aus_ssrc(ssrc);
        let mut neu = false;
        let mut eintrag = self.eintraege.entry(id).or_insert_with(|| {
            neu = true;
            MitgliedEintrag {
                mitglied: Mitglied {
                    id,
                    name: format!("ssrc-{ssrc}"),
                    ist_bot,
                    stumm: false,
                },
                adresse,
                letztes_paket: Instant::now(),
            }
        });
        eintrag.adresse = adresse;
        eintrag.letztes_paket = Instant::now();
        Beruehrung {
            id,
            neu,
            stumm: eintrag.mitglied.stumm,
        }
    }

    fn inaktive_entfernen(&self, timeout: Duration) -> Vec<UserId> {
        let jetzt = Instant::now();
        let inaktiv: Vec<UserId> = self
            .eintraege
            .iter()
            .filter(|e| jetzt.saturating_duration_since(e.letztes_paket) > timeout)
            .map(|e| *e.key())
            .collect();
        for id in &inaktiv {
            self.eintraege.remove(id);
        }
        inaktiv
    }

    fn liste(&self) -> Vec<Mitglied> {
        let mut liste: Vec<Mitglied> = self.eintraege.iter().map(|e| e.mitglied.clone()).collect();
        liste.sort_by_key(|m| m.id);
        liste
    }

    fn stumm_setzen(&self, id: UserId, stumm: bool) -> VoiceResult<()> {
        let mut eintrag = self
            .eintraege
            .get_mut(&id)
            .ok_or(VoiceError::MitgliedUnbekannt(id))?;
        eintrag.mitglied.stumm = stumm;
        Ok(())
    }

    fn ziele(&self) -> Vec<(UserId, SocketAddr)> {
        self.eintraege.iter().map(|e| (*e.key(), e.adresse)).collect()
    }
}

// ---------------------------------------------------------------------------
// UdpAnbieter
// ---------------------------------------------------------------------------

struct UdpAnbieterInner {
    konfig: Arc<UdpTransportKonfig>,
    register: DashMap<ChannelId, Arc<MitgliederRegister>>,
}

/// Verbindungs-Anbieter ueber UDP; Klone teilen dasselbe Mitglieder-Register
#[derive(Clone)]
pub struct UdpAnbieter {
    inner: Arc<UdpAnbieterInner>,
}

impl UdpAnbieter {
    pub fn neu(konfig: UdpTransportKonfig) -> Self {
        Self {
            inner: Arc::new(UdpAnbieterInner {
                konfig: Arc::new(konfig),
                register: DashMap::new(),
            }),
        }
    }

    fn register(&self, kanal: ChannelId) -> Arc<MitgliederRegister> {
        Arc::clone(self.inner.register.entry(kanal).or_default().value())
    }

    fn kanal_pruefen(&self, kanal: ChannelId) -> VoiceResult<SocketAddr> {
        self.inner
            .konfig
            .kanaele
            .get(&kanal)
            .copied()
            .ok_or(VoiceError::KanalUnbekannt(kanal))
    }

    /// Bindet die Kanal-Adresse und startet Empfang und Wartung
    pub async fn verbinden(
        &self,
        anfrage: BeitrittsAnfrage,
        abbruch: CancellationToken,
    ) -> VoiceResult<Arc<UdpVerbindung>> {
        let adresse = self.kanal_pruefen(anfrage.kanal)?;

        let socket = tokio::select! {
            _ = abbruch.cancelled() => return Err(VoiceError::Abgebrochen),
            ergebnis = UdpSocket::bind(adresse) => ergebnis.map_err(|e| VoiceError::BeitrittFehlgeschlagen {
                kanal: anfrage.kanal,
                grund: e.to_string(),
            })?,
        };

        tracing::info!(
            kanal = %anfrage.kanal,
            gruppe = %anfrage.gruppe,
            addr = %adresse,
            selbst_stumm = anfrage.selbst_stumm,
            selbst_taub = anfrage.selbst_taub,
            "UDP-Kanal gebunden"
        );

        let register = self.register(anfrage.kanal);
        Ok(UdpVerbindung::starten(
            anfrage,
            socket,
            register,
            Arc::clone(&self.inner.konfig),
            abbruch.child_token(),
        ))
    }

    /// Aktuell bekannte Mitglieder eines Kanals
    pub fn mitglieder_in(&self, kanal: ChannelId) -> VoiceResult<Vec<Mitglied>> {
        self.kanal_pruefen(kanal)?;
        Ok(self.register(kanal).liste())
    }
}

#[async_trait]
impl VerbindungsAnbieter for UdpAnbieter {
    async fn beitreten(
        &self,
        anfrage: BeitrittsAnfrage,
        abbruch: CancellationToken,
    ) -> VoiceResult<Arc<dyn SprachVerbindung>> {
        let verbindung = self.verbinden(anfrage, abbruch).await?;
        Ok(verbindung)
    }
}

#[async_trait]
impl MitgliederVerwaltung for UdpAnbieter {
    async fn mitglieder(&self, kanal: ChannelId) -> VoiceResult<Vec<Mitglied>> {
        self.mitglieder_in(kanal)
    }

    async fn stumm_setzen(&self, kanal: ChannelId, mitglied: UserId, stumm: bool) -> VoiceResult<()> {
        self.kanal_pruefen(kanal)?;
        self.register(kanal).stumm_setzen(mitglied, stumm)?;
        tracing::debug!(kanal = %kanal, mitglied = %mitglied, stumm, "Mitglied umgeschaltet");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// UdpVerbindung
// ---------------------------------------------------------------------------

struct UdpVerbindungInner {
    anfrage: BeitrittsAnfrage,
    socket: Arc<UdpSocket>,
    register: Arc<MitgliederRegister>,
    konfig: Arc<UdpTransportKonfig>,
    token: CancellationToken,
    ereignis_tx: Mutex<Option<mpsc::UnboundedSender<SprechEreignis>>>,
    ereignis_rx: Mutex<Option<mpsc::UnboundedReceiver<SprechEreignis>>>,
    abos: DashMap<UserId, mpsc::Sender<VoicePacket>>,
    /// Aktive Sprecher mit Zeitpunkt des letzten Audio-Pakets
    sprechend: DashMap<UserId, Instant>,
    sende: DashMap<UserId, SendeWarteschlange>,
    status_tx: watch::Sender<VerbindungsStatus>,
    abspielen: Mutex<Option<JoinHandle<()>>>,
    aufgaben: Mutex<Vec<JoinHandle<()>>>,
}

pub struct UdpVerbindung {
    inner: Arc<UdpVerbindungInner>,
}

impl UdpVerbindung {
    fn starten(
        anfrage: BeitrittsAnfrage,
        socket: UdpSocket,
        register: Arc<MitgliederRegister>,
        konfig: Arc<UdpTransportKonfig>,
        token: CancellationToken,
    ) -> Arc<Self> {
        let (ereignis_tx, ereignis_rx) = mpsc::unbounded_channel();
        let (status_tx, _) = watch::channel(VerbindungsStatus::Bereit);

        let inner = Arc::new(UdpVerbindungInner {
            anfrage,
            socket: Arc::new(socket),
            register,
            konfig,
            token,
            ereignis_tx: Mutex::new(Some(ereignis_tx)),
            ereignis_rx: Mutex::new(Some(ereignis_rx)),
            abos: DashMap::new(),
            sprechend: DashMap::new(),
            sende: DashMap::new(),
            status_tx,
            abspielen: Mutex::new(None),
            aufgaben: Mutex::new(Vec::new()),
        });

        let empfang = tokio::spawn(Arc::clone(&inner).empfangs_schleife());
        let wartung = tokio::spawn(Arc::clone(&inner).wartungs_schleife());
        inner.aufgaben.lock().extend([empfang, wartung]);

        Arc::new(Self { inner })
    }

    /// Gibt die lokale Bind-Adresse zurueck
    pub fn lokale_adresse(&self) -> std::io::Result<SocketAddr> {
        self.inner.socket.local_addr()
    }
}

impl UdpVerbindungInner {
    async fn empfangs_schleife(self: Arc<Self>) {
        // Empfangspuffer wird wiederverwendet (kein Heap pro Paket)
        let mut buf = vec![0u8; UDP_BUFFER_SIZE];

        tracing::debug!(kanal = %self.anfrage.kanal, "Empfangs-Loop gestartet");

        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                ergebnis = self.socket.recv_from(&mut buf) => match ergebnis {
                    Ok((len, absender)) => self.paket_verarbeiten(&buf[..len], absender),
                    Err(e) => {
                        tracing::error!(kanal = %self.anfrage.kanal, fehler = %e, "UDP-Empfangsfehler");
                        self.als_getrennt_markieren(e.to_string());
                        break;
                    }
                },
            }
        }

        tracing::debug!(kanal = %self.anfrage.kanal, "Empfangs-Loop beendet");
    }

    /// Verarbeitet ein eingehendes UDP-Paket
    ///
    /// Hot Path: schneller Ausstieg bei allem, was nicht weitergereicht wird.
    fn paket_verarbeiten(&self, daten: &[u8], absender: SocketAddr) {
        let paket = match VoicePacket::decode(daten) {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!(fehler = %e, absender = %absender, "Ungueltiges Voice-Paket");
                return;
            }
        };

        let ssrc = paket.header.ssrc;
        if ssrc == self.konfig.eigene_ssrc {
            return;
        }

        let ist_bot = self.konfig.bot_ssrcs.contains(&ssrc);
        let beruehrung = self.register.beruehren(ssrc, absender, ist_bot);
        if beruehrung.neu {
            tracing::info!(
                kanal = %self.anfrage.kanal,
                mitglied = %beruehrung.id,
                adresse = %absender,
                "Neues Mitglied im Kanal"
            );
        }

        if paket.header.packet_type == PacketType::Keepalive {
            return;
        }
        if self.anfrage.selbst_taub {
            tracing::trace!(mitglied = %beruehrung.id, "Selbst taub, Audio ignoriert");
            return;
        }
        if beruehrung.stumm {
            tracing::trace!(mitglied = %beruehrung.id, "Stummes Mitglied, Paket ignoriert");
            return;
        }

        let sprecher = beruehrung.id;
        if paket.ist_audio() || paket.spricht_start() {
            // Abonnement ist nach Stille ausgelaufen, der Sprecher muss neu gemeldet werden
            if self.abos.remove_if(&sprecher, |_, tx| tx.is_closed()).is_some() {
                self.sprechend.remove(&sprecher);
            }
            let war_still = self.sprechend.insert(sprecher, Instant::now()).is_none();
            if war_still {
                self.ereignis_melden(SprechEreignis::Start(sprecher));
            }
        }

        let stopp = paket.spricht_stop();
        self.weiterleiten(sprecher, paket);

        if stopp && self.sprechend.remove(&sprecher).is_some() {
            self.ereignis_melden(SprechEreignis::Stopp(sprecher));
        }
    }

    fn weiterleiten(&self, sprecher: UserId, paket: VoicePacket) {
        let Some(tx) = self.abos.get(&sprecher).map(|e| e.value().clone()) else {
            return;
        };
        match tx.try_send(paket) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(p)) => {
                tracing::trace!(sprecher = %sprecher, sequence = p.header.sequence, "Abonnement voll, Paket verworfen");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                // Naechstes Audio-Paket meldet den Sprecher neu an
                self.abos.remove_if(&sprecher, |_, t| t.is_closed());
                self.sprechend.remove(&sprecher);
            }
        }
    }

    fn ereignis_melden(&self, ereignis: SprechEreignis) {
        tracing::debug!(kanal = %self.anfrage.kanal, ?ereignis, "Sprech-Ereignis");
        if let Some(tx) = self.ereignis_tx.lock().as_ref() {
            let _ = tx.send(ereignis);
        }
    }

    fn als_getrennt_markieren(&self, grund: String) {
        self.status_tx.send_if_modified(|status| {
            if status.ist_beendet() {
                false
            } else {
                *status = VerbindungsStatus::Getrennt { grund };
                true
            }
        });
    }

    async fn wartungs_schleife(self: Arc<Self>) {
        let pruef_intervall = (self.konfig.sprech_timeout / 2).max(Duration::from_millis(10));
        let mut sprech_takt = interval(pruef_intervall);
        sprech_takt.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut mitglieder_takt = interval(Duration::from_secs(1));
        mitglieder_takt.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                _ = sprech_takt.tick() => self.verstummte_pruefen(),
                _ = mitglieder_takt.tick() => self.inaktive_mitglieder_entfernen(),
            }
        }
    }

    fn verstummte_pruefen(&self) {
        let jetzt = Instant::now();
        let timeout = self.konfig.sprech_timeout;
        let verstummt: Vec<UserId> = self
            .sprechend
            .iter()
            .filter(|e| jetzt.saturating_duration_since(*e.value()) >= timeout)
            .map(|e| *e.key())
            .collect();

        for sprecher in verstummt {
            let entfernt = self
                .sprechend
                .remove_if(&sprecher, |_, letzte| jetzt.saturating_duration_since(*letzte) >= timeout)
                .is_some();
            if entfernt {
                self.ereignis_melden(SprechEreignis::Stopp(sprecher));
            }
        }
    }

    fn inaktive_mitglieder_entfernen(&self) {
        for id in self.register.inaktive_entfernen(self.konfig.mitglied_timeout) {
            self.sende.remove(&id);
            if self.sprechend.remove(&id).is_some() {
                self.ereignis_melden(SprechEreignis::Stopp(id));
            }
            tracing::info!(kanal = %self.anfrage.kanal, mitglied = %id, "Inaktives Mitglied entfernt");
        }
    }

    async fn abspiel_schleife(self: Arc<Self>, mut ressource: AusgangsRessource, mut encoder: Box<dyn PaketEncoder>) {
        let ticks_pro_frame = RELAIS_FORMAT.frame_samples as u32;
        let mut sequenz: u32 = 0;
        let mut zeitstempel: u32 = 0;
        let mut sendet = false;

        loop {
            let frame = tokio::select! {
                _ = self.token.cancelled() => break,
                frame = ressource.naechster_frame() => frame,
            };
            zeitstempel = zeitstempel.wrapping_add(ticks_pro_frame);

            if frame.ist_stille() {
                if sendet {
                    sendet = false;
                    sequenz = sequenz.wrapping_add(1);
                    let paket = VoicePacket::neu_silence(sequenz, zeitstempel, self.konfig.eigene_ssrc)
                        .mit_flags(VoiceFlags::SPEAKING_STOP);
                    self.an_alle_senden(paket.encode());
                }
                continue;
            }

            let nutzdaten = match encoder.kodieren(&frame) {
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!(fehler = %e, "Frame nicht kodierbar, uebersprungen");
                    continue;
                }
            };

            sequenz = sequenz.wrapping_add(1);
            let mut paket = VoicePacket::neu_audio(sequenz, zeitstempel, self.konfig.eigene_ssrc, nutzdaten);
            if !sendet {
                paket = paket.mit_flags(VoiceFlags::SPEAKING_START);
                sendet = true;
            }
            self.an_alle_senden(paket.encode());
        }

        tracing::debug!(kanal = %self.anfrage.kanal, "Abspiel-Loop beendet");
    }

    fn an_alle_senden(&self, daten: Vec<u8>) {
        let daten = Arc::new(daten);
        for (id, adresse) in self.register.ziele() {
            let veraltet = self.sende.get(&id).is_some_and(|w| w.ziel != adresse);
            if veraltet {
                self.sende.remove(&id);
            }
            let tx = self
                .sende
                .entry(id)
                .or_insert_with(|| {
                    SendeWarteschlange::starten(
                        Arc::clone(&self.socket),
                        adresse,
                        self.konfig.sende_queue_groesse,
                    )
                })
                .tx
                .clone();
            if tx.try_send(Arc::clone(&daten)).is_err() {
                tracing::trace!(mitglied = %id, "Send-Queue voll, Paket verworfen");
            }
        }
    }
}

#[async_trait]
impl SprachVerbindung for UdpVerbindung {
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
        Ok(abo)
    }

    fn abspielen(&self, ressource: AusgangsRessource) -> VoiceResult<()> {
        if self.inner.anfrage.selbst_stumm {
            return Err(VoiceError::AbspielenVerweigert(format!(
                "{} ist selbst stumm geschaltet",
                self.kanal()
            )));
        }
        let encoder = encoder_erstellen(self.inner.konfig.codec, &self.inner.konfig.opus)?;
        let task = tokio::spawn(Arc::clone(&self.inner).abspiel_schleife(ressource, encoder));
        if let Some(alt) = self.inner.abspielen.lock().replace(task) {
            alt.abort();
        }
        tracing::info!(kanal = %self.kanal(), codec = ?self.inner.konfig.codec, "Abspielen gestartet");
        Ok(())
    }

    fn status(&self) -> watch::Receiver<VerbindungsStatus> {
        self.inner.status_tx.subscribe()
    }

    async fn zerstoeren(&self) {
        let erstmals = self.inner.status_tx.send_if_modified(|status| {
            if matches!(status, VerbindungsStatus::Zerstoert) {
                false
            } else {
                *status = VerbindungsStatus::Zerstoert;
                true
            }
        });
        if !erstmals {
            return;
        }

        self.inner.token.cancel();
        self.inner.ereignis_tx.lock().take();
        self.inner.abos.clear();
        self.inner.sprechend.clear();

        // Alle Tasks beenden, damit der Socket vor dem Rueckkehren frei ist
        let mut tasks: Vec<JoinHandle<()>> = self.inner.aufgaben.lock().drain(..).collect();
        tasks.extend(self.inner.abspielen.lock().take());
        let sende_ids: Vec<UserId> = self.inner.sende.iter().map(|e| *e.key()).collect();
        for id in sende_ids {
            if let Some((_, warteschlange)) = self.inner.sende.remove(&id) {
                warteschlange.task.abort();
                tasks.push(warteschlange.task);
            }
        }
        for task in tasks {
            task.abort();
            let _ = task.await;
        }

        tracing::info!(kanal = %self.kanal(), "UDP-Verbindung zerstoert");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
