//! Zeilenparser fuer den TCP-Commander
//!
//! Befehle haben die Form:
//!   befehlsname key1=wert1 key2="wert mit leerzeichen"
//!
//! Sonderzeichen in Werten werden mit Backslash escaped:
//!   \s = Leerzeichen, \n = Newline, \\ = Backslash, \| = Pipe

use std::collections::HashMap;

use crate::error::{CommanderError, CommanderResult};

/// Eine zerlegte Befehlszeile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeparsterBefehl {
    /// Befehlsname, klein geschrieben
    pub name: String,
    pub params: HashMap<String, String>,
}

impl GeparsterBefehl {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn pflicht_param(&self, key: &str) -> CommanderResult<&str> {
        self.param(key).ok_or_else(|| {
            CommanderError::UngueltigeEingabe(format!("Pflicht-Parameter fehlt: {key}"))
        })
    }

    /// Optionaler Parameter als u64; ein vorhandener, aber ungueltiger Wert
    /// ist ein Fehler
    pub fn u64_param(&self, key: &str) -> CommanderResult<Option<u64>> {
        self.param(key)
            .map(|s| {
                s.parse::<u64>().map_err(|_| {
                    CommanderError::UngueltigeEingabe(format!("Ungueltige Zahl fuer '{key}': {s}"))
                })
            })
            .transpose()
    }
}

/// Zerlegt eine Befehlszeile
pub fn zeile_parsen(zeile: &str) -> CommanderResult<GeparsterBefehl> {
    let zeile = zeile.trim();
    if zeile.is_empty() {
        return Err(CommanderError::Protokoll("Leere Befehlszeile".into()));
    }

    let mut tokens = zerlegen(zeile).into_iter();
    let name = tokens
        .next()
        .map(|t| t.to_lowercase())
        .ok_or_else(|| CommanderError::Protokoll("Kein Befehlsname".into()))?;

    let mut params = HashMap::new();
    for token in tokens {
        match token.split_once('=') {
            Some((key, wert)) if !key.is_empty() => {
                params.insert(key.to_lowercase(), wert_dekodieren(wert));
            }
            _ => {
                return Err(CommanderError::Protokoll(format!(
                    "Erwartet key=wert, erhalten: {token}"
                )))
            }
        }
    }

    Ok(GeparsterBefehl { name, params })
}

/// Trennt an Leerzeichen ausserhalb von Anfuehrungszeichen. Escapes bleiben
/// stehen und werden erst pro Wert aufgeloest.
fn zerlegen(eingabe: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut aktuell = String::new();
    let mut in_quotes = false;
    let mut zeichen = eingabe.chars();

    while let Some(c) = zeichen.next() {
        match c {
            '"' => in_quotes = !in_quotes,
            ' ' | '\t' if !in_quotes => {
                if !aktuell.is_empty() {
                    tokens.push(std::mem::take(&mut aktuell));
                }
            }
            '\\' => {
                aktuell.push('\\');
                if let Some(naechstes) = zeichen.next() {
                    aktuell.push(naechstes);
                }
            }
            _ => aktuell.push(c),
        }
    }
    if !aktuell.is_empty() {
        tokens.push(aktuell);
    }
    tokens
}

/// Loest Escape-Sequenzen in einem Wert auf
fn wert_dekodieren(s: &str) -> String {
    let mut ergebnis = String::with_capacity(s.len());
    let mut zeichen = s.chars();

    while let Some(c) = zeichen.next() {
        if c != '\\' {
            ergebnis.push(c);
            continue;
        }
        match zeichen.next() {
            Some('s') => ergebnis.push(' '),
            Some('n') => ergebnis.push('\n'),
            Some('\\') => ergebnis.push('\\'),
            Some('|') => ergebnis.push('|'),
            Some('"') => ergebnis.push('"'),
            Some(anderes) => {
                ergebnis.push('\\');
                ergebnis.push(anderes);
            }
            None => ergebnis.push('\\'),
        }
    }
    ergebnis
}

/// Escaped einen Wert fuer die Ausgabe
pub fn wert_kodieren(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace(' ', "\\s")
        .replace('\n', "\\n")
        .replace('|', "\\|")
}

/// Erfolgs-Antwortzeile
pub fn ok_antwort(params: &[(&str, String)]) -> String {
    if params.is_empty() {
        return "ok\n".to_string();
    }
    let kv: Vec<String> = params
        .iter()
        .map(|(k, v)| format!("{k}={}", wert_kodieren(v)))
        .collect();
    format!("ok {}\n", kv.join(" "))
}

/// Fehler-Antwortzeile
pub fn fehler_antwort(fehler: &CommanderError) -> String {
    format!(
        "error id={} msg={}\n",
        fehler.fehler_code(),
        wert_kodieren(&fehler.to_string())
    )
}
