//! Operator-Anmeldung
//!
//! Ein einziges gemeinsames Token schuetzt alle schreibenden und lesenden
//! Befehle. Ist kein Token konfiguriert, ist der Commander offen.

use vcsync_core::UserId;

use crate::error::{CommanderError, CommanderResult};

/// Identitaet einer angemeldeten Commander-Verbindung
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bediener {
    /// Wird bei Massen-Stummschaltung ausgenommen
    pub operator: Option<UserId>,
}

#[derive(Debug, Clone, Default)]
pub struct BedienerAuth {
    token: Option<String>,
}

impl BedienerAuth {
    pub fn neu(token: Option<String>) -> Self {
        // Leeres Token zaehlt als nicht gesetzt
        Self {
            token: token.filter(|t| !t.is_empty()),
        }
    }

    /// Muss sich eine Verbindung vor Befehlen anmelden?
    pub fn erforderlich(&self) -> bool {
        self.token.is_some()
    }

    /// Prueft das uebergebene Token
    pub fn pruefen(&self, token: &str) -> CommanderResult<()> {
        match &self.token {
            None => Ok(()),
            Some(erwartet) if gleich_konstant(erwartet.as_bytes(), token.as_bytes()) => Ok(()),
            Some(_) => Err(CommanderError::Authentifizierung("Ungueltiges Token".into())),
        }
    }
}

/// Vergleich ohne fruehen Abbruch beim ersten abweichenden Byte
fn gleich_konstant(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
