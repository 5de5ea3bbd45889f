//! Einstellungen einer Relais-Sitzung

use std::time::Duration;

use vcsync_audio::MischBusKonfig;
use vcsync_core::ChannelId;
use vcsync_protocol::CodecArt;

/// Standard-Nachlauf: so lange Stille beendet das Abonnement eines Sprechers
pub const STANDARD_NACHLAUF: Duration = Duration::from_millis(100);

/// Standard-Intervall, nach dem verwaiste Mischpult-Eingaenge geleert werden
pub const STANDARD_BEREINIGUNG: Duration = Duration::from_millis(250);

/// Frist fuer das Zerstoeren einer Verbindung beim Abbau
pub const STANDARD_ZERSTOER_FRIST: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct RelaisKonfig {
    /// Kanal, aus dem Sprache abgegriffen wird
    pub quell_kanal: ChannelId,
    /// Kanal, in den der Mix gespielt wird
    pub ziel_kanal: ChannelId,
    pub nachlauf: Duration,
    pub bereinigung: Duration,
    /// Maximal gepufferte Audiodauer pro Sprecher
    pub max_puffer: Duration,
    pub zerstoer_frist: Duration,
    /// Codec der eingehenden Sprecher-Pakete
    pub codec: CodecArt,
}

impl Default for RelaisKonfig {
    fn default() -> Self {
        Self {
            quell_kanal: ChannelId(1),
            ziel_kanal: ChannelId(2),
            nachlauf: STANDARD_NACHLAUF,
            bereinigung: STANDARD_BEREINIGUNG,
            max_puffer: Duration::from_millis(1000),
            zerstoer_frist: STANDARD_ZERSTOER_FRIST,
            codec: CodecArt::Opus,
        }
    }
}

impl RelaisKonfig {
    pub fn misch_bus(&self) -> MischBusKonfig {
        MischBusKonfig {
            max_puffer: self.max_puffer,
            bereinigungs_intervall: self.bereinigung,
        }
    }

    /// Prueft die Einstellungen vor dem ersten Start
    pub fn validieren(&self) -> Result<(), String> {
        if self.quell_kanal == self.ziel_kanal {
            return Err(format!(
                "Quell- und Zielkanal duerfen nicht gleich sein ({})",
                self.quell_kanal
            ));
        }
        if self.nachlauf.is_zero() {
            return Err("nachlauf muss groesser als 0 sein".into());
        }
        if self.bereinigung.is_zero() {
            return Err("bereinigung muss groesser als 0 sein".into());
        }
        Ok(())
    }
}
