//! vcsync-protocol – Netzwerk- und Formatdefinitionen
//!
//! - [`voice`] – binaeres UDP-Voice-Paket (Header + Codec-Nutzdaten)
//! - [`codec`] – Audio-Formatvertrag (48 kHz, Stereo, s16, 960er-Frames)
//!   und Opus-Konfiguration

pub mod codec;
pub mod voice;

pub use codec::{CodecArt, OpusConfig, PcmFormat, RELAIS_FORMAT};
pub use voice::{PacketType, VoiceFlags, VoicePacket, VoicePacketHeader};
