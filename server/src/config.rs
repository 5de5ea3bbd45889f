//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use serde::{Deserialize, Serialize};
use vcsync_core::ChannelId;
use vcsync_observability::{log_format_gueltig, log_level_gueltig};
use vcsync_protocol::{CodecArt, OpusConfig};
use vcsync_relay::RelaisKonfig;
use vcsync_voice::UdpTransportKonfig;

/// Umgebungsvariable, die das Operator-Token ersetzt
pub const TOKEN_UMGEBUNG: &str = "VCSYNC_COMMANDER_TOKEN";

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub relais: RelaisEinstellungen,
    pub audio: AudioEinstellungen,
    pub udp: UdpEinstellungen,
    pub commander: CommanderEinstellungen,
    pub logging: LoggingEinstellungen,
    pub observability: ObservabilityEinstellungen,
}

/// Relais: welche Kanaele, welche Zeitfenster
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaisEinstellungen {
    pub quell_kanal: u64,
    pub ziel_kanal: u64,
    /// Stille in ms, nach der die Pipeline eines Sprechers endet
    pub nachlauf_ms: u64,
    /// Intervall fuer das Leeren verwaister Mischpult-Eingaenge
    pub bereinigung_ms: u64,
    pub max_puffer_ms: u64,
    /// Ohne Audio fuer diese Dauer meldet der UDP-Transport Sprech-Ende
    pub sprech_timeout_ms: u64,
    pub zerstoer_frist_ms: u64,
}

impl Default for RelaisEinstellungen {
    fn default() -> Self {
        Self {
            quell_kanal: 1,
            ziel_kanal: 2,
            nachlauf_ms: 100,
            bereinigung_ms: 250,
            max_puffer_ms: 1000,
            sprech_timeout_ms: 200,
            zerstoer_frist_ms: 5000,
        }
    }
}

/// Audio-Einstellungen
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioEinstellungen {
    /// `opus` oder `pcm`
    pub codec: CodecArt,
    pub opus: OpusConfig,
}

/// UDP-Transport
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UdpEinstellungen {
    /// Kanal-ID -> lokale Bind-Adresse
    pub kanaele: BTreeMap<String, String>,
    pub eigene_ssrc: u32,
    /// SSRCs, die als Bots gelten und nie stumm geschaltet werden
    pub bot_ssrcs: Vec<u32>,
    pub mitglied_timeout_secs: u64,
    pub sende_queue_groesse: usize,
}

impl Default for UdpEinstellungen {
    fn default() -> Self {
        let kanaele = [
            ("1".to_string(), "127.0.0.1:9987".to_string()),
            ("2".to_string(), "127.0.0.1:9988".to_string()),
        ]
        .into_iter()
        .collect();
        Self {
            kanaele,
            eigene_ssrc: 1,
            bot_ssrcs: Vec::new(),
            mitglied_timeout_secs: 30,
            sende_queue_groesse: 128,
        }
    }
}

/// Commander (TCP-Bedienschnittstelle)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommanderEinstellungen {
    pub aktiviert: bool,
    pub bind_adresse: String,
    pub port: u16,
    /// Operator-Token; leer oder fehlend = keine Anmeldung noetig
    pub token: Option<String>,
    pub max_verbindungen: usize,
    pub zeilenlimit_bytes: usize,
}

impl Default for CommanderEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: true,
            bind_adresse: "127.0.0.1".into(),
            port: 9301,
            token: None,
            max_verbindungen: 16,
            zeilenlimit_bytes: 4096,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Observability-Einstellungen (Metriken + Health-Check)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    pub aktiviert: bool,
    pub bind_adresse: String,
    pub port: u16,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: true,
            bind_adresse: "127.0.0.1".into(),
            port: 9300,
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        let mut config = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => Self::aus_toml(&inhalt)
                .with_context(|| format!("Konfigurationsfehler in '{pfad}'"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Self::default()
            }
            Err(e) => bail!("Konfigurationsdatei '{pfad}' nicht lesbar: {e}"),
        };

        config.token_ueberschreiben(std::env::var(TOKEN_UMGEBUNG).ok());
        config.validieren()?;
        Ok(config)
    }

    pub fn aus_toml(inhalt: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(inhalt)?)
    }

    /// Ein gesetztes Token aus der Umgebung hat Vorrang vor der Datei
    pub fn token_ueberschreiben(&mut self, token: Option<String>) {
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            self.commander.token = Some(token);
        }
    }

    /// Prueft alle Abschnitte, bevor irgendetwas gebunden wird
    pub fn validieren(&self) -> anyhow::Result<()> {
        self.relais_konfig()
            .validieren()
            .map_err(|e| anyhow!("[relais]: {e}"))?;
        if self.relais.sprech_timeout_ms < self.relais.nachlauf_ms {
            bail!(
                "[relais]: sprech_timeout_ms ({}) darf nicht kleiner als nachlauf_ms ({}) sein",
                self.relais.sprech_timeout_ms,
                self.relais.nachlauf_ms
            );
        }
        self.audio
            .opus
            .validieren()
            .map_err(|e| anyhow!("[audio.opus]: {e}"))?;

        let udp = self.udp_konfig()?;
        for kanal in [self.relais.quell_kanal, self.relais.ziel_kanal] {
            if !udp.kanaele.contains_key(&ChannelId(kanal)) {
                bail!("[udp]: keine Adresse fuer Kanal {kanal} konfiguriert");
            }
        }

        if !log_level_gueltig(&self.logging.level) {
            bail!("[logging]: ungueltiges Level '{}'", self.logging.level);
        }
        if !log_format_gueltig(&self.logging.format) {
            bail!("[logging]: ungueltiges Format '{}'", self.logging.format);
        }
        if self.commander.max_verbindungen == 0 {
            bail!("[commander]: max_verbindungen muss groesser als 0 sein");
        }
        self.commander_bind_adresse()?;
        self.observability_bind_adresse()?;
        Ok(())
    }

    pub fn relais_konfig(&self) -> RelaisKonfig {
        let r = &self.relais;
        RelaisKonfig {
            quell_kanal: ChannelId(r.quell_kanal),
            ziel_kanal: ChannelId(r.ziel_kanal),
            nachlauf: Duration::from_millis(r.nachlauf_ms),
            bereinigung: Duration::from_millis(r.bereinigung_ms),
            max_puffer: Duration::from_millis(r.max_puffer_ms),
            zerstoer_frist: Duration::from_millis(r.zerstoer_frist_ms),
            codec: self.audio.codec,
        }
    }

    pub fn udp_konfig(&self) -> anyhow::Result<UdpTransportKonfig> {
        let mut kanaele = HashMap::with_capacity(self.udp.kanaele.len());
        for (id, adresse) in &self.udp.kanaele {
            let id: u64 = id
                .parse()
                .map_err(|_| anyhow!("[udp.kanaele]: ungueltige Kanal-ID '{id}'"))?;
            let adresse: SocketAddr = adresse
                .parse()
                .map_err(|_| anyhow!("[udp.kanaele]: ungueltige Adresse '{adresse}' fuer Kanal {id}"))?;
            kanaele.insert(ChannelId(id), adresse);
        }

        Ok(UdpTransportKonfig {
            kanaele,
            eigene_ssrc: self.udp.eigene_ssrc,
            bot_ssrcs: self.udp.bot_ssrcs.clone(),
            mitglied_timeout: Duration::from_secs(self.udp.mitglied_timeout_secs),
            sprech_timeout: Duration::from_millis(self.relais.sprech_timeout_ms),
            codec: self.audio.codec,
            opus: self.audio.opus.clone(),
            sende_queue_groesse: self.udp.sende_queue_groesse,
        })
    }

    /// Bind-Adresse fuer den Commander-TCP-Server
    pub fn commander_bind_adresse(&self) -> anyhow::Result<SocketAddr> {
        bind_adresse("commander", &self.commander.bind_adresse, self.commander.port)
    }

    /// Bind-Adresse fuer den Observability-Server
    pub fn observability_bind_adresse(&self) -> anyhow::Result<SocketAddr> {
        bind_adresse(
            "observability",
            &self.observability.bind_adresse,
            self.observability.port,
        )
    }
}

fn bind_adresse(abschnitt: &str, host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    format!("{host}:{port}")
        .parse()
        .map_err(|_| anyhow!("[{abschnitt}]: ungueltige Bind-Adresse '{host}:{port}'"))
}
