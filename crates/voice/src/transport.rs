//! Schnittstelle zu einem Sprach-Transport
//!
//! Das Relais spricht ausschliesslich ueber `VerbindungsAnbieter` und
//! `SprachVerbindung` mit dem Transport. Eine Verbindung liefert:
//! - einen Strom von Sprech-Ereignissen pro Sprecher
//! - pro Sprecher ein Audio-Abonnement mit Stille-Ende
//! - eine Senke fuer genau eine Ausgangs-Ressource
//! - Status-Aenderungen (insbesondere Trennung)

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use vcsync_audio::AusgangsRessource;
use vcsync_core::{ChannelId, SprechEreignis, UserId, VerbindungsStatus};
use vcsync_protocol::VoicePacket;

use crate::error::VoiceResult;

/// Beitritt zu einem Kanal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeitrittsAnfrage {
    pub kanal: ChannelId,
    /// Identitaet, unter der beigetreten wird
    pub gruppe: String,
    pub selbst_stumm: bool,
    pub selbst_taub: bool,
}

impl BeitrittsAnfrage {
    /// Zuhoerende Seite: stumm, nicht taub
    pub fn quelle(kanal: ChannelId) -> Self {
        Self {
            kanal,
            gruppe: "sprecher".into(),
            selbst_stumm: true,
            selbst_taub: false,
        }
    }

    /// Abspielende Seite: taub, nicht stumm
    pub fn ziel(kanal: ChannelId) -> Self {
        Self {
            kanal,
            gruppe: "zuhoerer".into(),
            selbst_stumm: false,
            selbst_taub: true,
        }
    }
}

/// Wann ein Audio-Abonnement endet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndeVerhalten {
    /// Nach dieser Dauer ohne Audio-Paket
    NachStille(Duration),
    /// Erst wenn der Transport das Abonnement schliesst
    Manuell,
}

#[async_trait]
pub trait VerbindungsAnbieter: Send + Sync {
    /// Tritt einem Kanal bei. Der Token gehoert der Sitzung; wird er
    /// abgebrochen, bricht auch ein laufender Beitritt ab.
    async fn beitreten(
        &self,
        anfrage: BeitrittsAnfrage,
        abbruch: CancellationToken,
    ) -> VoiceResult<Arc<dyn SprachVerbindung>>;
}

#[async_trait]
pub trait SprachVerbindung: Send + Sync {
    fn kanal(&self) -> ChannelId;

    /// Uebergibt den Ereignis-Strom. Nur einmal pro Verbindung moeglich.
    fn sprech_ereignisse(&self) -> VoiceResult<mpsc::UnboundedReceiver<SprechEreignis>>;

    /// Abonniert die rohen Pakete eines Sprechers. Ein neues Abonnement
    /// fuer denselben Sprecher ersetzt ein bestehendes.
    fn audio_abonnieren(&self, sprecher: UserId, ende: EndeVerhalten) -> VoiceResult<AudioAbo>;

    /// Spielt die Ressource ab, bis die Verbindung zerstoert wird
    fn abspielen(&self, ressource: AusgangsRessource) -> VoiceResult<()>;

    fn status(&self) -> watch::Receiver<VerbindungsStatus>;

    /// Verlaesst den Kanal. Mehrfacher Aufruf ist harmlos.
    async fn zerstoeren(&self);
}

// ---------------------------------------------------------------------------
// Audio-Abonnement
// ---------------------------------------------------------------------------

/// Paketstrom eines einzelnen Sprechers
///
/// Bei `EndeVerhalten::NachStille` endet der Strom, sobald fuer die
/// angegebene Dauer kein Audio-Paket kam. Die Frist laeuft ab dem
/// Abonnieren und wird nur durch hoerbares Audio verlaengert, nicht durch
/// Stille- oder DTX-Pakete.
pub struct AudioAbo {
    sprecher: UserId,
    rx: mpsc::Receiver<VoicePacket>,
    ende: EndeVerhalten,
    frist: Instant,
    beendet: bool,
}

impl AudioAbo {
    pub fn neu(sprecher: UserId, rx: mpsc::Receiver<VoicePacket>, ende: EndeVerhalten) -> Self {
        let mut abo = Self {
            sprecher,
            rx,
            ende,
            frist: Instant::now(),
            beendet: false,
        };
        abo.frist_erneuern();
        abo
    }

    pub fn sprecher(&self) -> UserId {
        self.sprecher
    }

    /// Naechstes Paket oder `None`, wenn der Strom zu Ende ist
    pub async fn naechstes(&mut self) -> Option<VoicePacket> {
        if self.beendet {
            return None;
        }

        let ergebnis = match self.ende {
            EndeVerhalten::Manuell => self.rx.recv().await,
            EndeVerhalten::NachStille(_) => match timeout_at(self.frist, self.rx.recv()).await {
                Ok(paket) => paket,
                Err(_) => {
                    tracing::trace!(sprecher = %self.sprecher, "Abonnement nach Stille beendet");
                    None
                }
            },
        };

        match ergebnis {
            Some(paket) => {
                if paket.ist_audio() {
                    self.frist_erneuern();
                }
                Some(paket)
            }
            None => {
                self.beendet = true;
                self.rx.close();
                None
            }
        }
    }

    pub fn ist_beendet(&self) -> bool {
        self.beendet
    }

    fn frist_erneuern(&mut self) {
        if let EndeVerhalten::NachStille(fenster) = self.ende {
            self.frist = Instant::now() + fenster;
        }
    }
}

impl std::fmt::Debug for AudioAbo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioAbo")
            .field("sprecher", &self.sprecher)
            .field("ende", &self.ende)
            .field("beendet", &self.beendet)
            .finish()
    }
}

/// Puffer pro Abonnement; laeuft er voll, werden Pakete verworfen
pub const ABO_PUFFER: usize = 64;

/// Erstellt Sende- und Empfangsseite eines Abonnements
pub fn abo_kanal(sprecher: UserId, ende: EndeVerhalten) -> (mpsc::Sender<VoicePacket>, AudioAbo) {
    let (tx, rx) = mpsc::channel(ABO_PUFFER);
    (tx, AudioAbo::neu(sprecher, rx, ende))
}
