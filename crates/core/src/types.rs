//! Identifikationstypen fuer vcsync
//!
//! Alle IDs verwenden das Newtype-Pattern um Verwechslungen zwischen
//! Sprecher-, Kanal- und Sitzungs-IDs zur Compilezeit auszuschliessen.
//! Benutzer und Kanaele werden vom Transport numerisch vergeben
//! (SSRC bzw. konfigurierte Kanalnummer), Sitzungen lokal per UUID.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Eindeutige Benutzer-ID (Sprecher bzw. Kanal-Mitglied)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub u64);

impl UserId {
    /// Leitet die UserId aus einer SSRC des Voice-Protokolls ab
    pub fn aus_ssrc(ssrc: u32) -> Self {
        Self(u64::from(ssrc))
    }

    /// Gibt den inneren Wert zurueck
    pub fn inner(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "user:{}", self.0)
    }
}

impl std::str::FromStr for UserId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix("user:").unwrap_or(s).parse().map(Self)
    }
}

/// Eindeutige Kanal-ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId(pub u64);

impl ChannelId {
    /// Gibt den inneren Wert zurueck
    pub fn inner(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "channel:{}", self.0)
    }
}

/// Eindeutige ID einer Relais-Sitzung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Erstellt eine neue zufaellige SessionId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_eindeutig() {
        let a = SessionId::new();
        let b = SessionId::new();
        assert_ne!(a, b, "Zwei neue SessionIds muessen verschieden sein");
    }

    #[test]
    fn user_id_aus_ssrc() {
        assert_eq!(UserId::aus_ssrc(0xCAFE), UserId(0xCAFE));
    }

    #[test]
    fn user_id_parsen_mit_und_ohne_praefix() {
        assert_eq!("42".parse::<UserId>().unwrap(), UserId(42));
        assert_eq!("user:42".parse::<UserId>().unwrap(), UserId(42));
        assert!("user:abc".parse::<UserId>().is_err());
    }

    #[test]
    fn display_praefixe() {
        assert_eq!(UserId(7).to_string(), "user:7");
        assert_eq!(ChannelId(9).to_string(), "channel:9");
        assert!(SessionId(Uuid::nil()).to_string().starts_with("session:"));
    }

    #[test]
    fn ids_sind_serde_kompatibel() {
        let uid = UserId(1234);
        let json = serde_json::to_string(&uid).unwrap();
        let uid2: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(uid, uid2);
    }
}
