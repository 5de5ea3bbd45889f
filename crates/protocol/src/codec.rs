//! Audio-Formatvertrag und Codec-Konfiguration
//!
//! Jede Grenze im Relais (Dekodierung, Mischpult, Ausgabe) arbeitet mit
//! demselben festen PCM-Format: 2 Kanaele, 16 Bit signed, 48 kHz und
//! 960 Samples pro Kanal und Frame (20 ms).

use serde::{Deserialize, Serialize};
use std::time::Duration;

// ---------------------------------------------------------------------------
// PCM-Format
// ---------------------------------------------------------------------------

/// Beschreibung eines rohen PCM-Formats (interleaved, signed)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PcmFormat {
    /// Anzahl der Kanaele
    pub kanaele: u16,
    /// Bits pro Sample
    pub bits: u16,
    /// Abtastrate in Hz
    pub abtastrate: u32,
    /// Samples pro Kanal und Frame
    pub frame_samples: usize,
}

/// Das einzige Format, das im Relais verwendet wird
pub const RELAIS_FORMAT: PcmFormat = PcmFormat {
    kanaele: 2,
    bits: 16,
    abtastrate: 48_000,
    frame_samples: 960,
};

impl PcmFormat {
    /// Interleaved Samples pro Frame (alle Kanaele)
    pub const fn samples_pro_frame(&self) -> usize {
        self.frame_samples * self.kanaele as usize
    }

    /// Bytes eines Frames im Rohformat
    pub const fn bytes_pro_frame(&self) -> usize {
        self.samples_pro_frame() * (self.bits as usize / 8)
    }

    /// Dauer eines Frames
    pub fn frame_dauer(&self) -> Duration {
        Duration::from_micros(self.frame_samples as u64 * 1_000_000 / u64::from(self.abtastrate))
    }

    /// Interleaved Samples fuer eine gegebene Dauer
    pub fn samples_fuer(&self, dauer: Duration) -> usize {
        let pro_kanal = dauer.as_micros() as u64 * u64::from(self.abtastrate) / 1_000_000;
        pro_kanal as usize * self.kanaele as usize
    }
}

// ---------------------------------------------------------------------------
// Codec-Auswahl
// ---------------------------------------------------------------------------

/// Codec der Voice-Pakete
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecArt {
    /// Opus (Standard)
    #[default]
    Opus,
    /// Unkomprimiertes s16le, ein Frame pro Paket
    Pcm,
}

/// Opus-Anwendungsmodus
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpusApplication {
    /// Optimiert fuer Sprachverstaendlichkeit
    #[default]
    Voip,
    /// Optimiert fuer allgemeine Audio-Qualitaet
    Audio,
}

/// Encoder-Einstellungen fuer den ausgehenden Opus-Strom
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpusConfig {
    /// Ziel-Bitrate in kbps (6–510)
    pub bitrate_kbps: u16,
    /// Anwendungsmodus
    pub application: OpusApplication,
    /// Komplexitaet (0–10)
    pub complexity: u8,
    /// Forward Error Correction
    pub fec_enabled: bool,
}

impl Default for OpusConfig {
    fn default() -> Self {
        Self {
            bitrate_kbps: 64,
            application: OpusApplication::Voip,
            complexity: 9,
            fec_enabled: true,
        }
    }
}

impl OpusConfig {
    /// Validiert die Konfiguration
    pub fn validieren(&self) -> Result<(), String> {
        if self.bitrate_kbps < 6 || self.bitrate_kbps > 510 {
            return Err(format!(
                "Bitrate muss zwischen 6 und 510 kbps liegen (war: {})",
                self.bitrate_kbps
            ));
        }
        if self.complexity > 10 {
            return Err(format!(
                "Komplexitaet muss zwischen 0 und 10 liegen (war: {})",
                self.complexity
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relais_format_masse() {
        assert_eq!(RELAIS_FORMAT.samples_pro_frame(), 1920);
        assert_eq!(RELAIS_FORMAT.bytes_pro_frame(), 3840);
        assert_eq!(RELAIS_FORMAT.frame_dauer(), Duration::from_millis(20));
    }

    #[test]
    fn samples_fuer_dauer() {
        // 100 ms Stereo bei 48 kHz
        assert_eq!(RELAIS_FORMAT.samples_fuer(Duration::from_millis(100)), 9600);
    }

    #[test]
    fn opus_config_standard_gueltig() {
        assert!(OpusConfig::default().validieren().is_ok());
    }

    #[test]
    fn opus_config_ungueltige_werte() {
        let mut config = OpusConfig::default();
        config.bitrate_kbps = 5;
        assert!(config.validieren().is_err());

        let mut config = OpusConfig::default();
        config.complexity = 11;
        assert!(config.validieren().is_err());
    }

    #[test]
    fn codec_art_aus_toml() {
        #[derive(Deserialize)]
        struct Abschnitt {
            codec: CodecArt,
        }
        let a: Abschnitt = toml::from_str("codec = \"pcm\"").unwrap();
        assert_eq!(a.codec, CodecArt::Pcm);
    }

    #[test]
    fn opus_config_teilweise_aus_json() {
        let config: OpusConfig = serde_json::from_str(r#"{"bitrate_kbps": 96}"#).unwrap();
        assert_eq!(config.bitrate_kbps, 96);
        assert_eq!(config.complexity, 9);
    }
}
