//! Fehlertypen fuer den vcsync Commander

use thiserror::Error;
use vcsync_relay::{FehlerKlasse, RelaisError};
use vcsync_voice::VoiceError;

/// Alle moeglichen Fehler im Commander-Crate
#[derive(Debug, Error)]
pub enum CommanderError {
    #[error("Authentifizierung fehlgeschlagen: {0}")]
    Authentifizierung(String),

    #[error("Nicht autorisiert: {0}")]
    NichtAutorisiert(String),

    #[error("Verbindungslimit erreicht (max. {max})")]
    VerbindungsLimit { max: usize },

    #[error("Ungueltige Eingabe: {0}")]
    UngueltigeEingabe(String),

    #[error("Relais: {0}")]
    Relais(#[from] RelaisError),

    #[error("Transport: {0}")]
    Voice(#[from] VoiceError),

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protokollfehler: {0}")]
    Protokoll(String),
}

pub type CommanderResult<T> = Result<T, CommanderError>;

impl CommanderError {
    /// Fehler-Code fuer TCP-Protokoll-Antworten
    pub fn fehler_code(&self) -> u32 {
        match self {
            Self::Authentifizierung(_) => 1001,
            Self::NichtAutorisiert(_) => 1002,
            Self::VerbindungsLimit { .. } => 1003,
            Self::UngueltigeEingabe(_) => 1005,
            Self::Relais(e) => match e.klasse() {
                FehlerKlasse::Initialisierung => 2001,
                FehlerKlasse::Transport => 2002,
                FehlerKlasse::Dekodierung => 2003,
            },
            Self::Voice(_) => 2005,
            Self::Io(_) => 5001,
            Self::Protokoll(_) => 5003,
        }
    }
}
