//! Dekodier-Pipeline eines einzelnen Sprechers
//!
//! Nimmt Voice-Pakete in Empfangsreihenfolge entgegen und liefert PCM im
//! Relais-Format. Kaputte oder veraltete Pakete werden verworfen, die
//! Pipeline laeuft danach normal weiter.

use tracing::trace;
use vcsync_protocol::VoicePacket;

use crate::codec::PaketDecoder;

/// Zaehler einer Dekodier-Pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DekodierStatistik {
    /// Erfolgreich dekodierte Pakete
    pub dekodiert: u64,
    /// Nicht dekodierbare Pakete
    pub fehlerhaft: u64,
    /// Doppelte oder zu spaet eingetroffene Pakete
    pub ausser_reihe: u64,
}

impl DekodierStatistik {
    pub fn verworfen(&self) -> u64 {
        self.fehlerhaft + self.ausser_reihe
    }
}

pub struct DekodierPipeline {
    decoder: Box<dyn PaketDecoder>,
    letzte_sequenz: Option<u32>,
    statistik: DekodierStatistik,
}

impl DekodierPipeline {
    pub fn neu(decoder: Box<dyn PaketDecoder>) -> Self {
        Self {
            decoder,
            letzte_sequenz: None,
            statistik: DekodierStatistik::default(),
        }
    }

    /// Verarbeitet ein Paket.
    ///
    /// Gibt `None` zurueck wenn das Paket kein hoerbares Audio traegt oder
    /// verworfen wurde.
    pub fn verarbeiten(&mut self, paket: &VoicePacket) -> Option<Vec<i16>> {
        if !paket.ist_audio() {
            return None;
        }

        let sequenz = paket.sequenz();
        if let Some(letzte) = self.letzte_sequenz {
            // Abstand mit Ueberlauf: alles in der hinteren Haelfte des
            // Zahlenraums gilt als alt
            let abstand = sequenz.wrapping_sub(letzte);
            if abstand == 0 || abstand > u32::MAX / 2 {
                self.statistik.ausser_reihe += 1;
                trace!(sequenz, letzte, "Paket ausser Reihe verworfen");
                return None;
            }
        }

        match self.decoder.dekodieren(&paket.payload) {
            Ok(samples) => {
                self.letzte_sequenz = Some(sequenz);
                self.statistik.dekodiert += 1;
                Some(samples)
            }
            Err(e) => {
                self.statistik.fehlerhaft += 1;
                trace!(sequenz, fehler = %e, "Paket nicht dekodierbar");
                None
            }
        }
    }

    pub fn statistik(&self) -> DekodierStatistik {
        self.statistik
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::PcmDecoder;

    fn paket(seq: u32, payload: Vec<u8>) -> VoicePacket {
        VoicePacket::neu_audio(seq, seq * 960, 7, payload)
    }

    #[test]
    fn dekodiert_in_reihenfolge() {
        let mut p = DekodierPipeline::neu(Box::new(PcmDecoder));
        assert_eq!(p.verarbeiten(&paket(1, vec![1, 0, 2, 0])), Some(vec![1, 2]));
        assert_eq!(p.verarbeiten(&paket(3, vec![3, 0, 4, 0])), Some(vec![3, 4]));
        assert_eq!(p.statistik().dekodiert, 2);
    }

    #[test]
    fn doppelte_und_alte_pakete_verworfen() {
        let mut p = DekodierPipeline::neu(Box::new(PcmDecoder));
        assert!(p.verarbeiten(&paket(10, vec![1, 0, 1, 0])).is_some());
        assert!(p.verarbeiten(&paket(10, vec![1, 0, 1, 0])).is_none());
        assert!(p.verarbeiten(&paket(9, vec![1, 0, 1, 0])).is_none());
        assert!(p.verarbeiten(&paket(11, vec![1, 0, 1, 0])).is_some());
        assert_eq!(p.statistik().ausser_reihe, 2);
    }

    #[test]
    fn sequenz_ueberlauf_wird_akzeptiert() {
        let mut p = DekodierPipeline::neu(Box::new(PcmDecoder));
        let mut a = paket(0, vec![1, 0, 1, 0]);
        a.header.sequence = u32::MAX;
        assert!(p.verarbeiten(&a).is_some());
        assert!(p.verarbeiten(&paket(0, vec![1, 0, 1, 0])).is_some());
    }

    #[test]
    fn kaputtes_paket_bricht_pipeline_nicht_ab() {
        let mut p = DekodierPipeline::neu(Box::new(PcmDecoder));
        assert!(p.verarbeiten(&paket(1, vec![1, 2, 3])).is_none());
        assert!(p.verarbeiten(&paket(2, vec![5, 0, 6, 0])).is_some());
        let s = p.statistik();
        assert_eq!(s.fehlerhaft, 1);
        assert_eq!(s.dekodiert, 1);
        assert_eq!(s.verworfen(), 1);
    }

    #[test]
    fn stille_pakete_erzeugen_nichts() {
        let mut p = DekodierPipeline::neu(Box::new(PcmDecoder));
        assert!(p.verarbeiten(&VoicePacket::neu_silence(1, 0, 7)).is_none());
        assert_eq!(p.statistik(), DekodierStatistik::default());
    }
}
