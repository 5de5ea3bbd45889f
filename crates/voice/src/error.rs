//! Fehlertypen der Sprach-Transporte

use thiserror::Error;
use vcsync_audio::AudioError;
use vcsync_core::{ChannelId, UserId};

#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("Kanal {0} ist nicht konfiguriert")]
    KanalUnbekannt(ChannelId),

    #[error("Beitritt zu {kanal} fehlgeschlagen: {grund}")]
    BeitrittFehlgeschlagen { kanal: ChannelId, grund: String },

    #[error("Vorgang abgebrochen")]
    Abgebrochen,

    #[error("Verbindung zu {kanal} getrennt: {grund}")]
    Getrennt { kanal: ChannelId, grund: String },

    #[error("Sprech-Ereignisse wurden bereits abgeholt")]
    EreignisseBereitsVergeben,

    #[error("Abspielen verweigert: {0}")]
    AbspielenVerweigert(String),

    #[error("Mitglied {0} ist im Kanal nicht bekannt")]
    MitgliedUnbekannt(UserId),

    #[error("Stummschaltung von {mitglied} fehlgeschlagen: {grund}")]
    StummSchaltung { mitglied: UserId, grund: String },

    #[error("Audio-Fehler: {0}")]
    Audio(#[from] AudioError),

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),
}

impl VoiceError {
    /// Fehler, die auf einen Verlust des Transports hinweisen
    pub fn ist_transport_verlust(&self) -> bool {
        matches!(self, Self::Getrennt { .. } | Self::Io(_))
    }
}

pub type VoiceResult<T> = Result<T, VoiceError>;
