//! vcsync-audio – Audio-Schicht des Relais
//!
//! - [`codec`] – Opus (audiopus) und rohes s16le hinter `PaketDecoder`/`PaketEncoder`
//! - [`dekodierer`] – Dekodier-Pipeline pro Sprecher
//! - [`mixer`] – dynamisches N-zu-1 Mischpult mit Saettigung
//! - [`ausgang`] – getaktete Ausgangs-Ressource ueber dem Mischpult
//!
//! Alle Grenzen arbeiten im Format 48 kHz, Stereo, i16, 960er-Frames.

pub mod ausgang;
pub mod codec;
pub mod dekodierer;
pub mod error;
pub mod frame;
pub mod mixer;

// Bequeme Re-Exporte der wichtigsten Typen
pub use ausgang::AusgangsRessource;
pub use codec::{
    decoder_fabrik, encoder_erstellen, DecoderFabrik, OpusDecoder, OpusEncoder, PaketDecoder,
    PaketEncoder, PcmDecoder, PcmEncoder,
};
pub use dekodierer::{DekodierPipeline, DekodierStatistik};
pub use error::{AudioError, AudioResult};
pub use frame::{PcmFrame, FRAME_SAMPLES};
pub use mixer::{EingangId, MischBus, MischBusKonfig, MischEingang, MischStatistik};
