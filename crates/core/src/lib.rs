//! vcsync-core – Gemeinsame Typen und Ereignisse
//!
//! Dieses Crate stellt die Identitaeten und Ereignistypen bereit, die
//! zwischen Transport, Audio-Pfad und Relais-Steuerung ausgetauscht werden.

pub mod event;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use event::{SprechEreignis, VerbindungsStatus};
pub use types::{ChannelId, SessionId, UserId};
