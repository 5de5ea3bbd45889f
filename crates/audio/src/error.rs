//! Fehlertypen fuer Codec, Dekodierung und Mischpult

use thiserror::Error;

/// Alle moeglichen Fehler der Audio-Schicht
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Codec-Fehler: {0}")]
    CodecFehler(String),

    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    #[error("Ungueltige Frame-Laenge: erwartet {erwartet} Samples, erhalten {erhalten}")]
    UngueltigeFrameLaenge { erwartet: usize, erhalten: usize },

    #[error("Ungerade Byte-Anzahl fuer s16le: {0}")]
    UngeradeByteAnzahl(usize),

    #[error("Mischpult-Eingang '{0}' ist nicht mehr angeschlossen")]
    EingangGetrennt(String),
}

pub type AudioResult<T> = Result<T, AudioError>;
