//! Ereignistypen des Sprach-Transports
//!
//! `SprechEreignis` ist der typisierte Strom von Sprechbeginn/Sprechende,
//! den eine Quell-Verbindung liefert. `VerbindungsStatus` beschreibt den
//! Lebenszyklus einer einzelnen Sprachverbindung.

use crate::types::UserId;
use serde::{Deserialize, Serialize};

/// Sprechaktivitaet eines einzelnen Sprechers im Quell-Kanal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SprechEreignis {
    /// Der Sprecher hat begonnen Audio zu senden
    Start(UserId),
    /// Der Sprecher hat aufgehoert Audio zu senden
    Stopp(UserId),
}

impl SprechEreignis {
    /// Gibt den betroffenen Sprecher zurueck
    pub fn sprecher(&self) -> UserId {
        match self {
            Self::Start(id) | Self::Stopp(id) => *id,
        }
    }
}

/// Zustand einer Sprachverbindung
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerbindungsStatus {
    /// Beitritt laeuft noch
    Verbindend,
    /// Verbindung steht, Audio fliesst
    Bereit,
    /// Verbindung wurde vom Transport getrennt
    Getrennt { grund: String },
    /// Verbindung wurde lokal zerstoert
    Zerstoert,
}

impl VerbindungsStatus {
    /// Gibt true zurueck wenn die Verbindung unerwartet getrennt wurde
    pub fn ist_getrennt(&self) -> bool {
        matches!(self, Self::Getrennt { .. })
    }

    /// Gibt true zurueck wenn keine weitere Nutzung moeglich ist
    pub fn ist_beendet(&self) -> bool {
        matches!(self, Self::Getrennt { .. } | Self::Zerstoert)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sprecher_aus_ereignis() {
        assert_eq!(SprechEreignis::Start(UserId(3)).sprecher(), UserId(3));
        assert_eq!(SprechEreignis::Stopp(UserId(4)).sprecher(), UserId(4));
    }

    #[test]
    fn status_klassifizierung() {
        let getrennt = VerbindungsStatus::Getrennt {
            grund: "Socket geschlossen".into(),
        };
        assert!(getrennt.ist_getrennt());
        assert!(getrennt.ist_beendet());
        assert!(!VerbindungsStatus::Zerstoert.ist_getrennt());
        assert!(VerbindungsStatus::Zerstoert.ist_beendet());
        assert!(!VerbindungsStatus::Bereit.ist_beendet());
    }

    #[test]
    fn status_ist_serde_kompatibel() {
        let json = serde_json::to_string(&VerbindungsStatus::Bereit).unwrap();
        assert_eq!(json, "\"bereit\"");
    }
}
