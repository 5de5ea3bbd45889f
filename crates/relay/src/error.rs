//! Fehlertypen des Relais-Kerns

use thiserror::Error;
use vcsync_audio::AudioError;
use vcsync_core::{ChannelId, UserId};
use vcsync_voice::VoiceError;

/// Grobe Einordnung eines Fehlers; bestimmt wie die Sitzung reagiert
///
/// Falsche Bedienung ist kein Fehler, sie endet in `StartErgebnis` bzw.
/// `StoppErgebnis`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FehlerKlasse {
    /// Verbindung verloren oder kaputt: Sitzung wird abgebaut
    Transport,
    /// Einzelnes Paket oder einzelner Decoder: wird verworfen
    Dekodierung,
    /// Start kann nicht abgeschlossen werden: zurueck in den Leerlauf
    Initialisierung,
}

#[derive(Debug, Error)]
pub enum RelaisError {
    #[error("Beitritt zu {kanal} fehlgeschlagen: {quelle}")]
    Beitritt {
        kanal: ChannelId,
        #[source]
        quelle: VoiceError,
    },

    #[error("Start wurde abgebrochen")]
    Abgebrochen,

    #[error("Pipeline fuer {sprecher} fehlgeschlagen: {grund}")]
    Pipeline { sprecher: UserId, grund: String },

    #[error("Abbau fehlgeschlagen: {0}")]
    Abbau(String),

    #[error("Transport-Fehler: {0}")]
    Voice(#[from] VoiceError),

    #[error("Audio-Fehler: {0}")]
    Audio(#[from] AudioError),
}

impl RelaisError {
    pub fn klasse(&self) -> FehlerKlasse {
        match self {
            Self::Beitritt { .. } | Self::Abgebrochen => FehlerKlasse::Initialisierung,
            Self::Abbau(_) => FehlerKlasse::Transport,
            Self::Pipeline { .. } | Self::Audio(_) => FehlerKlasse::Dekodierung,
            Self::Voice(e) if e.ist_transport_verlust() => FehlerKlasse::Transport,
            Self::Voice(VoiceError::Audio(_)) => FehlerKlasse::Dekodierung,
            Self::Voice(_) => FehlerKlasse::Initialisierung,
        }
    }
}

pub type RelaisResult<T> = Result<T, RelaisError>;
