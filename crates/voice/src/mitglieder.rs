//! Kanal-Mitglieder und Massen-Stummschaltung
//!
//! `alle_stumm_setzen` listet die Mitglieder eines Kanals, laesst Bots und
//! eine optionale Ausnahme (den Operator) aus und schaltet alle anderen
//! gleichzeitig stumm bzw. frei. Einzelne Fehlschlaege brechen den Rest
//! nicht ab, sondern landen getrennt im Bericht.

use async_trait::async_trait;
use futures_util::future::join_all;
use serde::Serialize;
use vcsync_core::{ChannelId, UserId};

use crate::error::VoiceResult;

/// Ein Mitglied eines Sprachkanals
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mitglied {
    pub id: UserId,
    pub name: String,
    pub ist_bot: bool,
    pub stumm: bool,
}

impl Mitglied {
    pub fn neu(id: UserId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            ist_bot: false,
            stumm: false,
        }
    }

    pub fn bot(id: UserId, name: impl Into<String>) -> Self {
        Self {
            ist_bot: true,
            ..Self::neu(id, name)
        }
    }
}

#[async_trait]
pub trait MitgliederVerwaltung: Send + Sync {
    async fn mitglieder(&self, kanal: ChannelId) -> VoiceResult<Vec<Mitglied>>;

    async fn stumm_setzen(&self, kanal: ChannelId, mitglied: UserId, stumm: bool) -> VoiceResult<()>;
}

/// Ergebnis einer Massen-Stummschaltung
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MassenStummBericht {
    pub stumm: bool,
    /// Erfolgreich umgeschaltete Mitglieder
    pub betroffen: Vec<UserId>,
    /// Bots und Ausnahme
    pub uebersprungen: usize,
    /// Mitglieder, deren Umschaltung fehlschlug, mit Grund
    pub fehlgeschlagen: Vec<(UserId, String)>,
}

impl MassenStummBericht {
    pub fn vollstaendig(&self) -> bool {
        self.fehlgeschlagen.is_empty()
    }
}

pub async fn alle_stumm_setzen(
    verwaltung: &dyn MitgliederVerwaltung,
    kanal: ChannelId,
    stumm: bool,
    ausnahme: Option<UserId>,
) -> VoiceResult<MassenStummBericht> {
    let mitglieder = verwaltung.mitglieder(kanal).await?;

    let (ziele, uebersprungen): (Vec<_>, Vec<_>) = mitglieder
        .into_iter()
        .partition(|m| !m.ist_bot && Some(m.id) != ausnahme);

    let aufrufe = ziele.iter().map(|m| async move {
        let ergebnis = verwaltung.stumm_setzen(kanal, m.id, stumm).await;
        (m.id, ergebnis)
    });

    let mut bericht = MassenStummBericht {
        stumm,
        uebersprungen: uebersprungen.len(),
        ..MassenStummBericht::default()
    };

    for (id, ergebnis) in join_all(aufrufe).await {
        match ergebnis {
            Ok(()) => bericht.betroffen.push(id),
            Err(e) => {
                tracing::warn!(mitglied = %id, kanal = %kanal, fehler = %e, "Stummschaltung fehlgeschlagen");
                bericht.fehlgeschlagen.push((id, e.to_string()));
            }
        }
    }

    tracing::info!(
        kanal = %kanal,
        stumm,
        betroffen = bericht.betroffen.len(),
        fehlgeschlagen = bericht.fehlgeschlagen.len(),
        "Massen-Stummschaltung abgeschlossen"
    );
    Ok(bericht)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VoiceError;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    struct TestVerwaltung {
        mitglieder: Vec<Mitglied>,
        stumm: Mutex<HashMap<UserId, bool>>,
        fehler_bei: Option<UserId>,
    }

    #[async_trait]
    impl MitgliederVerwaltung for TestVerwaltung {
        async fn mitglieder(&self, _kanal: ChannelId) -> VoiceResult<Vec<Mitglied>> {
            Ok(self.mitglieder.clone())
        }

        async fn stumm_setzen(&self, _kanal: ChannelId, mitglied: UserId, stumm: bool) -> VoiceResult<()> {
            if Some(mitglied) == self.fehler_bei {
                return Err(VoiceError::StummSchaltung {
                    mitglied,
                    grund: "keine Berechtigung".into(),
                });
            }
            self.stumm.lock().insert(mitglied, stumm);
            Ok(())
        }
    }

    fn verwaltung(fehler_bei: Option<UserId>) -> TestVerwaltung {
        TestVerwaltung {
            mitglieder: vec![
                Mitglied::neu(UserId(1), "operator"),
                Mitglied::neu(UserId(2), "anna"),
                Mitglied::neu(UserId(3), "ben"),
                Mitglied::bot(UserId(9), "relais"),
            ],
            stumm: Mutex::new(HashMap::new()),
            fehler_bei,
        }
    }

    #[tokio::test]
    async fn bots_und_operator_bleiben_unberuehrt() {
        let v = verwaltung(None);
        let bericht = alle_stumm_setzen(&v, ChannelId(1), true, Some(UserId(1))).await.unwrap();
        assert_eq!(bericht.betroffen, vec![UserId(2), UserId(3)]);
        assert_eq!(bericht.uebersprungen, 2);
        assert!(bericht.vollstaendig());

        let stumm = v.stumm.lock();
        assert_eq!(stumm.get(&UserId(2)), Some(&true));
        assert!(!stumm.contains_key(&UserId(1)));
        assert!(!stumm.contains_key(&UserId(9)));
    }

    #[tokio::test]
    async fn einzelner_fehler_wird_getrennt_gemeldet() {
        let v = verwaltung(Some(UserId(2)));
        let bericht = alle_stumm_setzen(&v, ChannelId(1), false, None).await.unwrap();
        assert_eq!(bericht.betroffen, vec![UserId(1), UserId(3)]);
        assert_eq!(bericht.fehlgeschlagen.len(), 1);
        assert_eq!(bericht.fehlgeschlagen[0].0, UserId(2));
        assert!(!bericht.vollstaendig());
        assert_eq!(v.stumm.lock().get(&UserId(3)), Some(&false));
    }
}
