//! PCM-Frames im Relais-Format
//!
//! Ein `PcmFrame` enthaelt immer genau einen 20-ms-Frame interleaved
//! Stereo-Samples (1920 x i16). Die Laenge wird beim Erzeugen geprueft.

use vcsync_protocol::RELAIS_FORMAT;

use crate::error::{AudioError, AudioResult};

/// Interleaved Samples pro Frame
pub const FRAME_SAMPLES: usize = RELAIS_FORMAT.samples_pro_frame();

/// Ein Frame rohes PCM (s16, 48 kHz, Stereo)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmFrame {
    samples: Vec<i16>,
}

impl PcmFrame {
    /// Ein Frame reiner Stille
    pub fn stille() -> Self {
        Self {
            samples: vec![0; FRAME_SAMPLES],
        }
    }

    /// Uebernimmt genau `FRAME_SAMPLES` Samples
    pub fn aus_samples(samples: Vec<i16>) -> AudioResult<Self> {
        if samples.len() != FRAME_SAMPLES {
            return Err(AudioError::UngueltigeFrameLaenge {
                erwartet: FRAME_SAMPLES,
                erhalten: samples.len(),
            });
        }
        Ok(Self { samples })
    }

    /// Liest einen Frame aus s16le-Bytes
    pub fn aus_bytes(bytes: &[u8]) -> AudioResult<Self> {
        Self::aus_samples(s16le_zu_samples(bytes)?)
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn in_samples(self) -> Vec<i16> {
        self.samples
    }

    /// Serialisiert den Frame als s16le
    pub fn zu_bytes(&self) -> Vec<u8> {
        samples_zu_s16le(&self.samples)
    }

    /// Enthaelt der Frame nur Nullen?
    pub fn ist_stille(&self) -> bool {
        self.samples.iter().all(|&s| s == 0)
    }

    /// Groesster Betrag im Frame
    pub fn spitzenwert(&self) -> u16 {
        self.samples
            .iter()
            .map(|s| s.unsigned_abs())
            .max()
            .unwrap_or(0)
    }
}

/// Wandelt s16le-Bytes in Samples um
pub fn s16le_zu_samples(bytes: &[u8]) -> AudioResult<Vec<i16>> {
    if bytes.len() % 2 != 0 {
        return Err(AudioError::UngeradeByteAnzahl(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|paar| i16::from_le_bytes([paar[0], paar[1]]))
        .collect())
}

/// Wandelt Samples in s16le-Bytes um
pub fn samples_zu_s16le(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        bytes.extend_from_slice(&s.to_le_bytes());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stille_hat_volle_laenge() {
        let frame = PcmFrame::stille();
        assert_eq!(frame.samples().len(), 1920);
        assert!(frame.ist_stille());
        assert_eq!(frame.spitzenwert(), 0);
    }

    #[test]
    fn falsche_laenge_abgelehnt() {
        let err = PcmFrame::aus_samples(vec![0; 960]).unwrap_err();
        assert!(matches!(
            err,
            AudioError::UngueltigeFrameLaenge {
                erwartet: 1920,
                erhalten: 960
            }
        ));
    }

    #[test]
    fn bytes_sind_little_endian() {
        let mut samples = vec![0i16; FRAME_SAMPLES];
        samples[0] = 0x0102;
        samples[1] = -1;
        let frame = PcmFrame::aus_samples(samples).unwrap();
        let bytes = frame.zu_bytes();
        assert_eq!(&bytes[..4], &[0x02, 0x01, 0xFF, 0xFF]);
        assert_eq!(PcmFrame::aus_bytes(&bytes).unwrap(), frame);
    }

    #[test]
    fn ungerade_bytes_abgelehnt() {
        assert!(s16le_zu_samples(&[1, 2, 3]).is_err());
    }

    #[test]
    fn spitzenwert_von_i16_min() {
        let mut samples = vec![0i16; FRAME_SAMPLES];
        samples[10] = i16::MIN;
        let frame = PcmFrame::aus_samples(samples).unwrap();
        assert_eq!(frame.spitzenwert(), 32768);
    }
}
