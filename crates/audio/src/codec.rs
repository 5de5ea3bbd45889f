//! Codec-Grenze: Opus (audiopus) und unkomprimiertes s16le
//!
//! Beide Richtungen arbeiten fest im Relais-Format (48 kHz, Stereo, i16).
//! Der Relais-Kern kennt nur die Traits `PaketDecoder`/`PaketEncoder`;
//! welcher Codec dahinter steckt entscheidet die Konfiguration.

use std::sync::Arc;

use audiopus::{
    coder::{Decoder, Encoder},
    Application, Bitrate, Channels, SampleRate,
};
use tracing::debug;

use vcsync_protocol::codec::{CodecArt, OpusApplication, OpusConfig};

use crate::error::{AudioError, AudioResult};
use crate::frame::{s16le_zu_samples, PcmFrame, FRAME_SAMPLES};

/// Maximale Opus-Paketdauer (120 ms) in interleaved Samples
const MAX_OPUS_SAMPLES: usize = 5760 * 2;

/// Maximale Groesse eines kodierten Opus-Pakets
const MAX_OPUS_BYTES: usize = 4000;

/// Wandelt Codec-Nutzdaten eines Pakets in PCM-Samples um
pub trait PaketDecoder: Send {
    /// Dekodiert genau ein Paket. Die Laenge des Ergebnisses haengt von der
    /// Paketdauer ab und ist immer ein Vielfaches der Kanalanzahl.
    fn dekodieren(&mut self, daten: &[u8]) -> AudioResult<Vec<i16>>;
}

/// Kodiert einen PCM-Frame fuer den Versand
pub trait PaketEncoder: Send {
    fn kodieren(&mut self, frame: &PcmFrame) -> AudioResult<Vec<u8>>;
}

/// Erzeugt pro Sprecher einen frischen Decoder
pub type DecoderFabrik = Arc<dyn Fn() -> AudioResult<Box<dyn PaketDecoder>> + Send + Sync>;

/// Liefert die Decoder-Fabrik fuer einen Codec
pub fn decoder_fabrik(art: CodecArt) -> DecoderFabrik {
    match art {
        CodecArt::Opus => Arc::new(|| Ok(Box::new(OpusDecoder::neu()?) as Box<dyn PaketDecoder>)),
        CodecArt::Pcm => Arc::new(|| Ok(Box::new(PcmDecoder) as Box<dyn PaketDecoder>)),
    }
}

/// Erstellt den Encoder fuer den ausgehenden Strom
pub fn encoder_erstellen(art: CodecArt, config: &OpusConfig) -> AudioResult<Box<dyn PaketEncoder>> {
    match art {
        CodecArt::Opus => Ok(Box::new(OpusEncoder::neu(config)?)),
        CodecArt::Pcm => Ok(Box::new(PcmEncoder)),
    }
}

// ---------------------------------------------------------------------------
// Opus
// ---------------------------------------------------------------------------

/// Opus-Decoder fuer 48 kHz Stereo
pub struct OpusDecoder {
    decoder: Decoder,
}

impl OpusDecoder {
    pub fn neu() -> AudioResult<Self> {
        let decoder = Decoder::new(SampleRate::Hz48000, Channels::Stereo)
            .map_err(|e| AudioError::CodecFehler(e.to_string()))?;
        Ok(Self { decoder })
    }
}

impl PaketDecoder for OpusDecoder {
    fn dekodieren(&mut self, daten: &[u8]) -> AudioResult<Vec<i16>> {
        if daten.is_empty() {
            return Err(AudioError::CodecFehler("Leeres Opus-Paket".into()));
        }
        let mut ausgabe = vec![0i16; MAX_OPUS_SAMPLES];
        let pro_kanal = self
            .decoder
            .decode(Some(daten), &mut ausgabe[..], false)
            .map_err(|e| AudioError::CodecFehler(e.to_string()))?;
        ausgabe.truncate(pro_kanal * 2);
        Ok(ausgabe)
    }
}

/// Opus-Encoder fuer 48 kHz Stereo, 20-ms-Frames
pub struct OpusEncoder {
    encoder: Encoder,
}

impl OpusEncoder {
    pub fn neu(config: &OpusConfig) -> AudioResult<Self> {
        config.validieren().map_err(AudioError::Konfiguration)?;

        let application = match config.application {
            OpusApplication::Voip => Application::Voip,
            OpusApplication::Audio => Application::Audio,
        };

        let mut encoder = Encoder::new(SampleRate::Hz48000, Channels::Stereo, application)
            .map_err(|e| AudioError::CodecFehler(e.to_string()))?;

        encoder
            .set_bitrate(Bitrate::BitsPerSecond(i32::from(config.bitrate_kbps) * 1000))
            .map_err(|e| AudioError::CodecFehler(e.to_string()))?;
        encoder
            .set_complexity(config.complexity)
            .map_err(|e| AudioError::CodecFehler(e.to_string()))?;
        encoder
            .set_inband_fec(config.fec_enabled)
            .map_err(|e| AudioError::CodecFehler(e.to_string()))?;

        debug!(
            bitrate_kbps = config.bitrate_kbps,
            complexity = config.complexity,
            "OpusEncoder erstellt"
        );

        Ok(Self { encoder })
    }
}

impl PaketEncoder for OpusEncoder {
    fn kodieren(&mut self, frame: &PcmFrame) -> AudioResult<Vec<u8>> {
        let mut ausgabe = vec![0u8; MAX_OPUS_BYTES];
        let geschrieben = self
            .encoder
            .encode(frame.samples(), &mut ausgabe[..])
            .map_err(|e| AudioError::CodecFehler(e.to_string()))?;
        ausgabe.truncate(geschrieben);
        Ok(ausgabe)
    }
}

// ---------------------------------------------------------------------------
// PCM (unkomprimiert)
// ---------------------------------------------------------------------------

/// Nutzdaten sind bereits s16le im Relais-Format
pub struct PcmDecoder;

impl PaketDecoder for PcmDecoder {
    fn dekodieren(&mut self, daten: &[u8]) -> AudioResult<Vec<i16>> {
        let samples = s16le_zu_samples(daten)?;
        if samples.is_empty() || samples.len() % 2 != 0 || samples.len() > FRAME_SAMPLES * 6 {
            return Err(AudioError::UngueltigeFrameLaenge {
                erwartet: FRAME_SAMPLES,
                erhalten: samples.len(),
            });
        }
        Ok(samples)
    }
}

/// Sendet Frames unveraendert als s16le
pub struct PcmEncoder;

impl PaketEncoder for PcmEncoder {
    fn kodieren(&mut self, frame: &PcmFrame) -> AudioResult<Vec<u8>> {
        Ok(frame.zu_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sinus_frame() -> PcmFrame {
        let samples = (0..FRAME_SAMPLES)
            .map(|i| ((i as f32 / 24.0).sin() * 8000.0) as i16)
            .collect();
        PcmFrame::aus_samples(samples).unwrap()
    }

    #[test]
    fn pcm_codec_ist_verlustfrei() {
        let frame = sinus_frame();
        let mut enc = PcmEncoder;
        let mut dec = PcmDecoder;
        let bytes = enc.kodieren(&frame).unwrap();
        assert_eq!(dec.dekodieren(&bytes).unwrap(), frame.samples());
    }

    #[test]
    fn pcm_decoder_lehnt_muell_ab() {
        let mut dec = PcmDecoder;
        assert!(dec.dekodieren(&[]).is_err());
        assert!(dec.dekodieren(&[1, 2, 3]).is_err());
        // ein einzelnes Sample passt nicht zu Stereo
        assert!(dec.dekodieren(&[1, 2]).is_err());
    }

    #[test]
    fn opus_encoder_und_decoder_erstellbar() {
        assert!(OpusEncoder::neu(&OpusConfig::default()).is_ok());
        assert!(OpusDecoder::neu().is_ok());
    }

    #[test]
    fn opus_encoder_ungueltige_konfiguration() {
        let config = OpusConfig {
            bitrate_kbps: 2,
            ..OpusConfig::default()
        };
        assert!(OpusEncoder::neu(&config).is_err());
    }

    #[test]
    fn opus_frame_liefert_volle_frame_laenge() {
        let mut enc = OpusEncoder::neu(&OpusConfig::default()).unwrap();
        let mut dec = OpusDecoder::neu().unwrap();
        let paket = enc.kodieren(&sinus_frame()).unwrap();
        assert!(!paket.is_empty());
        let samples = dec.dekodieren(&paket).unwrap();
        assert_eq!(samples.len(), FRAME_SAMPLES);
    }

    #[test]
    fn opus_decoder_lehnt_leeres_paket_ab() {
        let mut dec = OpusDecoder::neu().unwrap();
        assert!(dec.dekodieren(&[]).is_err());
    }

    #[test]
    fn fabrik_liefert_unabhaengige_decoder() {
        let fabrik = decoder_fabrik(CodecArt::Pcm);
        let mut a = fabrik().unwrap();
        let mut b = fabrik().unwrap();
        assert_eq!(a.dekodieren(&[1, 0, 2, 0]).unwrap(), vec![1, 2]);
        assert_eq!(b.dekodieren(&[3, 0, 4, 0]).unwrap(), vec![3, 4]);
    }
}
