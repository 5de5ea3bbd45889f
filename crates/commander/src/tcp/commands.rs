//! Uebersetzt geparste Zeilen in [`Command`]-Werte

use crate::commands::types::Command;
use crate::error::{CommanderError, CommanderResult};
use crate::tcp::parser::GeparsterBefehl;

/// `login` und `quit` behandelt die Verbindung selbst; hier landen nur
/// Befehle fuer den Executor
pub fn tcp_befehl_zu_command(cmd: &GeparsterBefehl) -> CommanderResult<Command> {
    match cmd.name.as_str() {
        "start-sync" => Ok(Command::StartSync),
        "stop-sync" => Ok(Command::StopSync),
        "mute-all" => Ok(Command::AlleStumm { stumm: true }),
        "unmute-all" => Ok(Command::AlleStumm { stumm: false }),
        "status" => Ok(Command::Status),
        other => Err(CommanderError::Protokoll(format!(
            "Unbekannter Befehl: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tcp::parser::zeile_parsen;

    fn uebersetzen(zeile: &str) -> CommanderResult<Command> {
        tcp_befehl_zu_command(&zeile_parsen(zeile).unwrap())
    }

    #[test]
    fn bekannte_befehle() {
        assert_eq!(uebersetzen("start-sync").unwrap(), Command::StartSync);
        assert_eq!(uebersetzen("Stop-Sync").unwrap(), Command::StopSync);
        assert_eq!(
            uebersetzen("mute-all").unwrap(),
            Command::AlleStumm { stumm: true }
        );
        assert_eq!(
            uebersetzen("unmute-all").unwrap(),
            Command::AlleStumm { stumm: false }
        );
        assert_eq!(uebersetzen("status").unwrap(), Command::Status);
    }

    #[test]
    fn unbekannter_befehl_gibt_fehler() {
        let fehler = uebersetzen("serverinfo").unwrap_err();
        assert_eq!(fehler.fehler_code(), 5003);
    }
}
