//! Voice-Protokoll (UDP)
//!
//! Binaere Paketstruktur fuer komprimiertes Audio. Ein Paket traegt genau
//! einen Codec-Frame eines Senders, identifiziert ueber seine SSRC.
//!
//! ## Paketformat (Header = 16 Bytes, kein serde)
//!
//! ```text
//! Offset  Len  Beschreibung
//! ------  ---  -----------
//!  0       1   Version
//!  1       1   PacketType (0 = Audio, 1 = Silence, 2 = Keepalive)
//!  2       2   Flags (big-endian)
//!  4       4   SequenzNummer (big-endian)
//!  8       4   Zeitstempel (big-endian, 48 kHz-Ticks)
//! 12       4   SSRC – Sender-Kennung (big-endian)
//! 16+      N   Nutzdaten (Codec-Bytes)
//! ```

use bytes::Bytes;
use std::io;

/// Aktuelle Protokollversion
pub const PROTOKOLL_VERSION: u8 = 1;

/// Maximale Nutzdaten-Laenge.
///
/// Ein unkomprimierter 20-ms-Frame (960 x 2 x 2 Bytes) muss hineinpassen,
/// damit auch der PCM-Codec ueber dasselbe Paketformat laeuft.
pub const MAX_NUTZDATEN_LAENGE: usize = 4096;

/// Bit-Masken fuer das Flags-Feld im Header
pub struct VoiceFlags;

impl VoiceFlags {
    /// Discontinuous Transmission – Stille-Paket
    pub const DTX: u16 = 0x0004;
    /// Beginn einer Sprechsequenz
    pub const SPEAKING_START: u16 = 0x0010;
    /// Ende einer Sprechsequenz
    pub const SPEAKING_STOP: u16 = 0x0020;
}

/// Art des Voice-Paketes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    /// Codec-Audio-Frame
    Audio = 0,
    /// Stille / Comfort-Noise (DTX), verlaengert keine Sprechphase
    Silence = 1,
    /// Reine Anmeldung/Lebenszeichen eines Zuhoerers ohne Audio
    Keepalive = 2,
}

impl PacketType {
    /// Konvertiert ein Byte in einen `PacketType`.
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Audio),
            1 => Some(Self::Silence),
            2 => Some(Self::Keepalive),
            _ => None,
        }
    }
}

/// 16-Byte Header eines Voice-UDP-Pakets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoicePacketHeader {
    /// Protokollversion (muss == `PROTOKOLL_VERSION` sein)
    pub version: u8,
    /// Pakettyp
    pub packet_type: PacketType,
    /// Flags-Bitmask (siehe `VoiceFlags`)
    pub flags: u16,
    /// Monoton steigende Sequenznummer pro Sender
    pub sequence: u32,
    /// Zeitstempel in 48 kHz-Ticks
    pub timestamp: u32,
    /// Sender-Kennung
    pub ssrc: u32,
}

impl VoicePacketHeader {
    /// Header-Groesse in Bytes
    pub const SIZE: usize = 16;

    /// Erstellt einen neuen Header mit aktueller Protokollversion
    pub fn new(packet_type: PacketType, flags: u16, sequence: u32, timestamp: u32, ssrc: u32) -> Self {
        Self {
            version: PROTOKOLL_VERSION,
            packet_type,
            flags,
            sequence,
            timestamp,
            ssrc,
        }
    }

    /// Serialisiert den Header (big-endian)
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0] = self.version;
        buf[1] = self.packet_type as u8;
        buf[2..4].copy_from_slice(&self.flags.to_be_bytes());
        buf[4..8].copy_from_slice(&self.sequence.to_be_bytes());
        buf[8..12].copy_from_slice(&self.timestamp.to_be_bytes());
        buf[12..16].copy_from_slice(&self.ssrc.to_be_bytes());
        buf
    }

    /// Deserialisiert einen Header
    ///
    /// # Fehler
    /// `InvalidData` bei zu kurzem Puffer, falscher Version oder unbekanntem Typ
    pub fn decode(buf: &[u8]) -> io::Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(ungueltig(format!(
                "Header zu kurz: {} Bytes (erwartet {})",
                buf.len(),
                Self::SIZE
            )));
        }

        if buf[0] != PROTOKOLL_VERSION {
            return Err(ungueltig(format!(
                "Ungueltige Protokollversion: {} (erwartet {})",
                buf[0], PROTOKOLL_VERSION
            )));
        }

        let packet_type = PacketType::from_u8(buf[1])
            .ok_or_else(|| ungueltig(format!("Unbekannter PacketType: {}", buf[1])))?;

        Ok(Self {
            version: buf[0],
            packet_type,
            flags: u16::from_be_bytes([buf[2], buf[3]]),
            sequence: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            timestamp: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
            ssrc: u32::from_be_bytes([buf[12], buf[13], buf[14], buf[15]]),
        })
    }

    /// Prueft ob ein bestimmtes Flag gesetzt ist
    pub fn hat_flag(&self, flag: u16) -> bool {
        self.flags & flag != 0
    }
}

/// Vollstaendiges Voice-Paket (Header + Codec-Nutzdaten)
///
/// Die Nutzdaten liegen als `Bytes` vor, damit das Weiterreichen an
/// mehrere Empfaenger ohne Kopie auskommt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoicePacket {
    pub header: VoicePacketHeader,
    pub payload: Bytes,
}

impl VoicePacket {
    /// Erstellt ein Audio-Paket
    pub fn neu_audio(sequence: u32, timestamp: u32, ssrc: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            header: VoicePacketHeader::new(PacketType::Audio, 0, sequence, timestamp, ssrc),
            payload: payload.into(),
        }
    }

    /// Erstellt ein Stille/DTX-Paket
    pub fn neu_silence(sequence: u32, timestamp: u32, ssrc: u32) -> Self {
        Self {
            header: VoicePacketHeader::new(PacketType::Silence, VoiceFlags::DTX, sequence, timestamp, ssrc),
            payload: Bytes::new(),
        }
    }

    /// Erstellt ein Keepalive-Paket (Anmeldung als Zuhoerer)
    pub fn neu_keepalive(ssrc: u32) -> Self {
        Self {
            header: VoicePacketHeader::new(PacketType::Keepalive, 0, 0, 0, ssrc),
            payload: Bytes::new(),
        }
    }

    /// Setzt zusaetzliche Flags (Builder-Stil)
    pub fn mit_flags(mut self, flags: u16) -> Self {
        self.header.flags |= flags;
        self
    }

    /// Serialisiert das gesamte Paket
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.groesse());
        buf.extend_from_slice(&self.header.encode());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Deserialisiert und validiert ein Paket
    pub fn decode(buf: &[u8]) -> io::Result<Self> {
        let header = VoicePacketHeader::decode(buf)?;
        let nutzdaten = &buf[VoicePacketHeader::SIZE..];

        if nutzdaten.len() > MAX_NUTZDATEN_LAENGE {
            return Err(ungueltig(format!(
                "Nutzdaten zu lang: {} Bytes (Maximum {})",
                nutzdaten.len(),
                MAX_NUTZDATEN_LAENGE
            )));
        }

        Ok(Self {
            header,
            payload: Bytes::copy_from_slice(nutzdaten),
        })
    }

    /// Gesamtgroesse in Bytes
    pub fn groesse(&self) -> usize {
        VoicePacketHeader::SIZE + self.payload.len()
    }

    /// Traegt das Paket hoerbares Audio?
    pub fn ist_audio(&self) -> bool {
        self.header.packet_type == PacketType::Audio && !self.header.hat_flag(VoiceFlags::DTX)
    }

    /// Sequenznummer des Senders
    pub fn sequenz(&self) -> u32 {
        self.header.sequence
    }

    /// Prueft ob die Sprachaktivitaet beginnt
    pub fn spricht_start(&self) -> bool {
        self.header.hat_flag(VoiceFlags::SPEAKING_START)
    }

    /// Prueft ob die Sprachaktivitaet endet
    pub fn spricht_stop(&self) -> bool {
        self.header.hat_flag(VoiceFlags::SPEAKING_STOP)
    }
}

fn ungueltig(nachricht: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, nachricht)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_big_endian_byte_reihenfolge() {
        let header = VoicePacketHeader::new(PacketType::Audio, 0x0102, 0x01020304, 0x05060708, 0x090A0B0C);
        let bytes = header.encode();
        assert_eq!(&bytes[2..4], &[0x01, 0x02]);
        assert_eq!(&bytes[4..8], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&bytes[8..12], &[0x05, 0x06, 0x07, 0x08]);
        assert_eq!(&bytes[12..16], &[0x09, 0x0A, 0x0B, 0x0C]);
    }

    #[test]
    fn header_decode_falsche_version() {
        let mut bytes = VoicePacketHeader::new(PacketType::Audio, 0, 1, 0, 0).encode();
        bytes[0] = 99;
        assert!(VoicePacketHeader::decode(&bytes).is_err());
    }

    #[test]
    fn header_decode_zu_kurz() {
        assert!(VoicePacketHeader::decode(&[0u8; 8]).is_err());
    }

    #[test]
    fn header_decode_unbekannter_packet_type() {
        let mut bytes = VoicePacketHeader::new(PacketType::Audio, 0, 0, 0, 0).encode();
        bytes[1] = 255;
        assert!(VoicePacketHeader::decode(&bytes).is_err());
    }

    #[test]
    fn paket_traegt_nutzdaten_und_ssrc() {
        let paket = VoicePacket::neu_audio(100, 4800, 0xCAFE, vec![0xAB; 120]);
        let decoded = VoicePacket::decode(&paket.encode()).expect("Decode muss erfolgreich sein");
        assert_eq!(decoded.header.ssrc, 0xCAFE);
        assert_eq!(decoded.sequenz(), 100);
        assert_eq!(decoded.payload.len(), 120);
        assert!(decoded.ist_audio());
    }

    #[test]
    fn stille_paket_ist_kein_audio() {
        let paket = VoicePacket::neu_silence(5, 240, 0x1234);
        assert!(paket.header.hat_flag(VoiceFlags::DTX));
        assert!(!paket.ist_audio());
        assert!(paket.payload.is_empty());
    }

    #[test]
    fn keepalive_ist_kein_audio() {
        let paket = VoicePacket::neu_keepalive(9);
        assert_eq!(paket.header.packet_type, PacketType::Keepalive);
        assert!(!paket.ist_audio());
    }

    #[test]
    fn zu_grosse_nutzdaten_abgelehnt() {
        let mut buf = VoicePacketHeader::new(PacketType::Audio, 0, 0, 0, 0).encode().to_vec();
        buf.extend(vec![0u8; MAX_NUTZDATEN_LAENGE + 1]);
        assert!(VoicePacket::decode(&buf).is_err());
    }

    #[test]
    fn unkomprimierter_frame_passt_in_ein_paket() {
        let frame_bytes = crate::codec::RELAIS_FORMAT.samples_pro_frame() * 2;
        assert!(frame_bytes <= MAX_NUTZDATEN_LAENGE);
    }

    #[test]
    fn sprech_flags() {
        let paket = VoicePacket::neu_audio(1, 0, 1, vec![1]).mit_flags(VoiceFlags::SPEAKING_START);
        assert!(paket.spricht_start());
        assert!(!paket.spricht_stop());
    }
}
