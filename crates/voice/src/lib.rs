//! vcsync-voice – Sprach-Transporte
//!
//! ## Module
//! - [`transport`] – Traits `VerbindungsAnbieter`/`SprachVerbindung` und das Audio-Abonnement
//! - [`udp`] – UDP-Transport mit Send-Queue pro Mitglied
//! - [`speicher`] – In-Process-Transport fuer lokale Verdrahtung und Tests
//! - [`mitglieder`] – Kanal-Mitglieder und Massen-Stummschaltung

pub mod error;
pub mod mitglieder;
pub mod speicher;
pub mod transport;
pub mod udp;

pub use error::{VoiceError, VoiceResult};
pub use mitglieder::{alle_stumm_setzen, MassenStummBericht, Mitglied, MitgliederVerwaltung};
pub use speicher::SpeicherAnbieter;
pub use transport::{AudioAbo, BeitrittsAnfrage, EndeVerhalten, SprachVerbindung, VerbindungsAnbieter};
pub use udp::{UdpAnbieter, UdpTransportKonfig, UdpVerbindung};
