//! Logging-Setup via tracing-subscriber
//!
//! `[logging].level` ist entweder ein einfaches Level (`debug`) oder eine
//! vollstaendige Filter-Direktive (`info,vcsync_relay=trace`). Ein einfaches
//! Level wird um leisere Voreinstellungen fuer den HTTP-Stack ergaenzt.
//!
//! Umgebungsvariablen haben Vorrang vor der Konfiguration:
//! - `VCSYNC_LOG_LEVEL`
//! - `VCSYNC_LOG_FORMAT` (text/json)

use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, EnvFilter};

const EINFACHE_LEVEL: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// hyper loggt jede Verbindung des Metrik-Servers auf debug
const LEISE_ABHAENGIGKEITEN: &str = "hyper=warn,hyper_util=warn";

/// Initialisiert das Logging-System. Schlaegt fehl, wenn bereits ein
/// globaler Subscriber gesetzt ist.
pub fn logging_initialisieren(level: &str, format: &str) -> Result<()> {
    let level = std::env::var("VCSYNC_LOG_LEVEL").unwrap_or_else(|_| level.to_string());
    let format = std::env::var("VCSYNC_LOG_FORMAT").unwrap_or_else(|_| format.to_string());

    let filter = filter_bauen(&level).unwrap_or_else(|| {
        eprintln!("Ungueltiger Log-Filter '{level}', verwende 'info'");
        EnvFilter::new("info")
    });

    let ergebnis = if format == "json" {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_current_span(true)
            .try_init()
    } else {
        fmt().with_env_filter(filter).with_target(true).try_init()
    };
    ergebnis.map_err(|e| anyhow!("Logging bereits initialisiert: {e}"))
}

/// Baut den Filter; `None` bei ungueltiger Direktive
fn filter_bauen(level: &str) -> Option<EnvFilter> {
    let level = level.trim();
    if level.is_empty() {
        return None;
    }
    let direktive = if EINFACHE_LEVEL.contains(&level) {
        format!("{level},{LEISE_ABHAENGIGKEITEN}")
    } else {
        level.to_string()
    };
    EnvFilter::try_new(direktive).ok()
}

/// Einfaches Level oder gueltige Filter-Direktive?
pub fn log_level_gueltig(level: &str) -> bool {
    filter_bauen(level).is_some()
}

pub fn log_format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}
