//! TCP-Server fuer den Commander
//!
//! Zeilenbasiertes Protokoll.
//! Format: befehlsname [key=wert ...]\n
//! Antworten: ok [...] oder error id=N msg=...

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use vcsync_core::UserId;

use crate::auth::{Bediener, BedienerAuth};
use crate::commands::executor::CommandExecutor;
use crate::commands::types::Response;
use crate::error::{CommanderError, CommanderResult};
use crate::tcp::commands::tcp_befehl_zu_command;
use crate::tcp::parser::{fehler_antwort, ok_antwort, zeile_parsen};
use crate::tcp::session::TcpSession;

const WILLKOMMEN: &[u8] = b"VCSYNC\nWelcome to the vcsync commander\n";

#[derive(Debug, Clone)]
pub struct TcpServerKonfig {
    pub bind_addr: SocketAddr,
    pub max_verbindungen: usize,
    pub zeilenlimit_bytes: usize,
}

impl Default for TcpServerKonfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 9301)),
            max_verbindungen: 16,
            zeilenlimit_bytes: 4096,
        }
    }
}

/// Gemeinsamer Zustand aller Verbindungen
#[derive(Clone)]
pub struct CommanderState {
    pub executor: Arc<CommandExecutor>,
    pub auth: Arc<BedienerAuth>,
}

impl CommanderState {
    pub fn neu(executor: Arc<CommandExecutor>, auth: BedienerAuth) -> Self {
        Self {
            executor,
            auth: Arc::new(auth),
        }
    }
}

pub struct TcpServer {
    konfig: TcpServerKonfig,
}

impl TcpServer {
    pub fn neu(konfig: TcpServerKonfig) -> Self {
        Self { konfig }
    }

    /// Bindet die konfigurierte Adresse und bedient sie bis zum Abbruch
    pub async fn starten(self, state: CommanderState, abbruch: CancellationToken) -> CommanderResult<()> {
        let listener = TcpListener::bind(self.konfig.bind_addr).await?;
        self.mit_listener(listener, state, abbruch).await
    }

    /// Bedient einen bereits gebundenen Listener bis zum Abbruch
    pub async fn mit_listener(
        self,
        listener: TcpListener,
        state: CommanderState,
        abbruch: CancellationToken,
    ) -> CommanderResult<()> {
        let addr = listener.local_addr()?;
        tracing::info!(addr = %addr, "TCP-Commander-Server gestartet");

        let verbindungszaehler = Arc::new(AtomicUsize::new(0));
        let max_verbindungen = self.konfig.max_verbindungen;

        loop {
            let (stream, peer_addr) = tokio::select! {
                biased;
                _ = abbruch.cancelled() => break,
                ergebnis = listener.accept() => match ergebnis {
                    Ok(verbindung) => verbindung,
                    Err(e) => {
                        tracing::warn!(fehler = %e, "Annehmen einer Verbindung fehlgeschlagen");
                        continue;
                    }
                },
            };

            let Some(platz) = VerbindungsPlatz::belegen(&verbindungszaehler, max_verbindungen) else {
                tracing::warn!(
                    peer = %peer_addr,
                    max = max_verbindungen,
                    "Verbindung abgelehnt: Connection-Limit erreicht"
                );
                tokio::spawn(ablehnen(stream, max_verbindungen));
                continue;
            };

            let state = state.clone();
            let zeilenlimit = self.konfig.zeilenlimit_bytes;
            let abbruch = abbruch.child_token();
            tokio::spawn(async move {
                tracing::debug!(peer = %peer_addr, "Neue Commander-Verbindung");
                verbindung_behandeln(stream, peer_addr, state, zeilenlimit, abbruch).await;
                drop(platz);
            });
        }

        tracing::info!(addr = %addr, "TCP-Commander-Server beendet");
        Ok(())
    }
}

/// Belegter Platz im Verbindungslimit; wird beim Drop freigegeben
struct VerbindungsPlatz {
    zaehler: Arc<AtomicUsize>,
}

impl VerbindungsPlatz {
    fn belegen(zaehler: &Arc<AtomicUsize>, max: usize) -> Option<Self> {
        let vorher = zaehler.fetch_add(1, Ordering::SeqCst);
        if vorher >= max {
            zaehler.fetch_sub(1, Ordering::SeqCst);
            return None;
        }
        Some(Self {
            zaehler: Arc::clone(zaehler),
        })
    }
}

impl Drop for VerbindungsPlatz {
    fn drop(&mut self) {
        self.zaehler.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn ablehnen(mut stream: TcpStream, max: usize) {
    let antwort = fehler_antwort(&CommanderError::VerbindungsLimit { max });
    let _ = stream.write_all(antwort.as_bytes()).await;
    let _ = stream.shutdown().await;
}

async fn verbindung_behandeln(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: CommanderState,
    zeilenlimit: usize,
    abbruch: CancellationToken,
) {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut session = TcpSession::neu(peer_addr);

    if writer.write_all(WILLKOMMEN).await.is_err() {
        return;
    }

    let mut zeile = String::new();
    loop {
        zeile.clear();
        let mut begrenzt = (&mut reader).take(zeilenlimit as u64);
        let gelesen = tokio::select! {
            _ = abbruch.cancelled() => break,
            r = begrenzt.read_line(&mut zeile) => r,
        };
        match gelesen {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(peer = %peer_addr, fehler = %e, "Lesefehler auf Commander-Verbindung");
                break;
            }
        }

        if !zeile.ends_with('\n') && zeile.len() >= zeilenlimit {
            if !rest_verwerfen(&mut reader).await {
                break;
            }
            let fehler = CommanderError::Protokoll(format!("Zeile laenger als {zeilenlimit} Bytes"));
            if writer.write_all(fehler_antwort(&fehler).as_bytes()).await.is_err() {
                break;
            }
            continue;
        }
        if zeile.trim().is_empty() {
            continue;
        }

        let antwort = verarbeite_befehl(&zeile, &mut session, &state).await;
        if writer.write_all(antwort.as_bytes()).await.is_err() {
            break;
        }
        if session.ist_beendend() {
            break;
        }
    }

    tracing::debug!(peer = %peer_addr, session = %session.id, "Commander-Verbindung beendet");
}

/// Ueberspringt den Rest einer zu langen Zeile. `false` bei Verbindungsende.
async fn rest_verwerfen<R: AsyncBufRead + Unpin>(reader: &mut R) -> bool {
    loop {
        let puffer = match reader.fill_buf().await {
            Ok(p) => p,
            Err(_) => return false,
        };
        if puffer.is_empty() {
            return false;
        }
        if let Some(pos) = puffer.iter().position(|&b| b == b'\n') {
            reader.consume(pos + 1);
            return true;
        }
        let n = puffer.len();
        reader.consume(n);
    }
}

/// Verarbeitet eine Befehlszeile und gibt die Antwortzeile zurueck
async fn verarbeite_befehl(zeile: &str, session: &mut TcpSession, state: &CommanderState) -> String {
    match befehl_ausfuehren(zeile, session, state).await {
        Ok(antwort) => antwort,
        Err(e) => {
            tracing::debug!(peer = %session.client_addr, fehler = %e, "Befehl abgelehnt");
            fehler_antwort(&e)
        }
    }
}

async fn befehl_ausfuehren(
    zeile: &str,
    session: &mut TcpSession,
    state: &CommanderState,
) -> CommanderResult<String> {
    let parsed = zeile_parsen(zeile)?;

    // Sonderbefehle: login, quit
    match parsed.name.as_str() {
        "login" => {
            if state.auth.erforderlich() {
                state.auth.pruefen(parsed.pflicht_param("token")?)?;
            }
            let operator = parsed.u64_param("operator")?.map(UserId);
            session.anmelden(Bediener { operator });
            tracing::info!(peer = %session.client_addr, operator = ?operator, "Bediener angemeldet");
            return Ok(ok_antwort(&[("msg", "logged in".into())]));
        }
        "quit" => {
            session.beenden();
            return Ok(ok_antwort(&[("msg", "bye".into())]));
        }
        _ => {}
    }

    if state.auth.erforderlich() && !session.ist_authentifiziert() {
        return Err(CommanderError::NichtAutorisiert(
            "Nicht angemeldet, bitte zuerst 'login' aufrufen".into(),
        ));
    }

    let command = tcp_befehl_zu_command(&parsed)?;
    if command.ist_schreibend() {
        tracing::info!(peer = %session.client_addr, befehl = %parsed.name, "Commander-Befehl");
    }
    let antwort = state.executor.ausfuehren(command, session.operator()).await?;
    Ok(antwort_formatieren(antwort))
}

/// Formatiert eine Response als Antwortzeile
fn antwort_formatieren(resp: Response) -> String {
    match resp {
        Response::Gestartet { sitzung } => ok_antwort(&[
            ("msg", "relay started".into()),
            ("session", sitzung.inner().to_string()),
        ]),
        Response::BereitsAktiv { zustand } => ok_antwort(&[
            ("msg", "already running".into()),
            ("state", zustand.to_string()),
        ]),
        Response::StartAbgebrochen => ok_antwort(&[("msg", "start cancelled".into())]),
        Response::Gestoppt { bericht } => {
            let mut params = vec![
                ("msg", "relay stopped".to_string()),
                ("pipelines", bericht.pipelines_abgebaut.to_string()),
                ("connections", bericht.verbindungen_zerstoert.to_string()),
                ("frames", bericht.frames_gesendet.to_string()),
            ];
            if !bericht.fehlerfrei() {
                params.push(("teardown_errors", bericht.fehler.join("|")));
            }
            ok_antwort(&params)
        }
        Response::NichtAktiv => ok_antwort(&[("msg", "not running".into())]),
        Response::BereitsStoppend => ok_antwort(&[("msg", "already stopping".into())]),
        Response::MassenStumm { bericht } => {
            let aktion = if bericht.stumm { "mute" } else { "unmute" };
            let mut params = vec![
                ("action", aktion.to_string()),
                ("affected", bericht.betroffen.len().to_string()),
                ("skipped", bericht.uebersprungen.to_string()),
                ("failed", bericht.fehlgeschlagen.len().to_string()),
            ];
            if !bericht.vollstaendig() {
                let ids: Vec<String> = bericht
                    .fehlgeschlagen
                    .iter()
                    .map(|(id, _)| id.0.to_string())
                    .collect();
                params.push(("failed_ids", ids.join(",")));
            }
            ok_antwort(&params)
        }
        Response::Status { status } => {
            let sprecher: Vec<String> = status
                .aktive_sprecher
                .iter()
                .map(|id| id.0.to_string())
                .collect();
            let mut params = vec![
                ("state", status.zustand.to_string()),
                ("speakers", sprecher.len().to_string()),
                ("frames", status.frames_gesendet.to_string()),
            ];
            if let Some(sitzung) = status.sitzung {
                params.push(("session", sitzung.inner().to_string()));
            }
            if let Some(seit) = status.seit {
                params.push(("since", seit.to_rfc3339()));
            }
            if !sprecher.is_empty() {
                params.push(("speaker_ids", sprecher.join(",")));
            }
            ok_antwort(&params)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
    use vcsync_core::ChannelId;
    use vcsync_observability::RelaisMetriken;
    use vcsync_protocol::CodecArt;
    use vcsync_relay::{RelaisKonfig, RelaisSteuerung};
    use vcsync_voice::{Mitglied, SpeicherAnbieter};

    const ZIEL: ChannelId = ChannelId(2);

    struct Client {
        lesen: BufReader<OwnedReadHalf>,
        schreiben: OwnedWriteHalf,
    }

    impl Client {
        async fn verbinden(addr: SocketAddr) -> Self {
            let stream = TcpStream::connect(addr).await.unwrap();
            let (r, w) = stream.into_split();
            Self {
                lesen: BufReader::new(r),
                schreiben: w,
            }
        }

        async fn zeile(&mut self) -> String {
            let mut zeile = String::new();
            self.lesen.read_line(&mut zeile).await.unwrap();
            zeile
        }

        async fn begruessung(&mut self) {
            assert_eq!(self.zeile().await, "VCSYNC\n");
            assert!(self.zeile().await.starts_with("Welcome"));
        }

        async fn senden(&mut self, befehl: &str) -> String {
            self.schreiben
                .write_all(format!("{befehl}\n").as_bytes())
                .await
                .unwrap();
            self.zeile().await
        }
    }

    async fn server_starten(
        token: Option<&str>,
        konfig: TcpServerKonfig,
    ) -> (SpeicherAnbieter, SocketAddr, CancellationToken) {
        let anbieter = SpeicherAnbieter::neu();
        let steuerung = RelaisSteuerung::neu(
            Arc::new(anbieter.clone()),
            RelaisKonfig {
                codec: CodecArt::Pcm,
                ..RelaisKonfig::default()
            },
            RelaisMetriken::neu().unwrap(),
        );
        let executor = CommandExecutor::neu(steuerung, Arc::new(anbieter.clone()));
        let state = CommanderState::neu(executor, BedienerAuth::neu(token.map(String::from)));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let abbruch = CancellationToken::new();
        let server = TcpServer::neu(konfig);
        tokio::spawn(server.mit_listener(listener, state, abbruch.clone()));
        (anbieter, addr, abbruch)
    }

    #[tokio::test]
    async fn start_stopp_ueber_tcp() {
        let (_anbieter, addr, abbruch) = server_starten(None, TcpServerKonfig::default()).await;
        let mut client = Client::verbinden(addr).await;
        client.begruessung().await;

        assert!(client.senden("status").await.starts_with("ok state=leerlauf"));
        assert!(client
            .senden("start-sync")
            .await
            .starts_with("ok msg=relay\\sstarted session="));
        assert_eq!(
            client.senden("start-sync").await,
            "ok msg=already\\srunning state=aktiv\n"
        );
        assert!(client.senden("status").await.starts_with("ok state=aktiv"));
        assert!(client
            .senden("stop-sync")
            .await
            .starts_with("ok msg=relay\\sstopped pipelines=0 connections=2"));
        assert_eq!(client.senden("stop-sync").await, "ok msg=not\\srunning\n");

        assert_eq!(client.senden("quit").await, "ok msg=bye\n");
        assert_eq!(client.zeile().await, "");
        abbruch.cancel();
    }

    #[tokio::test]
    async fn token_schuetzt_befehle() {
        let (anbieter, addr, abbruch) =
            server_starten(Some("geheim"), TcpServerKonfig::default()).await;
        anbieter.mitglied_hinzufuegen(ZIEL, Mitglied::neu(vcsync_core::UserId(1), "op"));
        anbieter.mitglied_hinzufuegen(ZIEL, Mitglied::neu(vcsync_core::UserId(2), "gast"));
        anbieter.mitglied_hinzufuegen(ZIEL, Mitglied::bot(vcsync_core::UserId(3), "bot"));

        let mut client = Client::verbinden(addr).await;
        client.begruessung().await;

        assert!(client.senden("mute-all").await.starts_with("error id=1002"));
        assert!(client.senden("login token=falsch").await.starts_with("error id=1001"));
        assert!(client.senden("login").await.starts_with("error id=1005"));
        assert_eq!(
            client.senden("login token=geheim operator=1").await,
            "ok msg=logged\\sin\n"
        );
        assert_eq!(
            client.senden("mute-all").await,
            "ok action=mute affected=1 skipped=2 failed=0\n"
        );
        assert!(anbieter.mitglied(ZIEL, vcsync_core::UserId(2)).unwrap().stumm);

        anbieter.stumm_fehler_setzen(vcsync_core::UserId(2), "abgelehnt");
        assert_eq!(
            client.senden("unmute-all").await,
            "ok action=unmute affected=0 skipped=2 failed=1 failed_ids=2\n"
        );
        abbruch.cancel();
    }

    #[tokio::test]
    async fn fehler_halten_die_verbindung_offen() {
        let (_anbieter, addr, abbruch) = server_starten(None, TcpServerKonfig::default()).await;
        let mut client = Client::verbinden(addr).await;
        client.begruessung().await;

        assert!(client.senden("serverinfo").await.starts_with("error id=5003"));
        assert!(client.senden("login operator=abc").await.starts_with("error id=1005"));
        assert!(client.senden("status").await.starts_with("ok "));
        abbruch.cancel();
    }

    #[tokio::test]
    async fn zu_lange_zeile_wird_verworfen() {
        let konfig = TcpServerKonfig {
            zeilenlimit_bytes: 32,
            ..TcpServerKonfig::default()
        };
        let (_anbieter, addr, abbruch) = server_starten(None, konfig).await;
        let mut client = Client::verbinden(addr).await;
        client.begruessung().await;

        let lang = format!("status {}", "x=y ".repeat(20));
        assert!(client.senden(&lang).await.starts_with("error id=5003"));
        // Die Verbindung bleibt nutzbar
        assert!(client.senden("status").await.starts_with("ok state=leerlauf"));
        abbruch.cancel();
    }

    #[tokio::test]
    async fn verbindungslimit_greift() {
        let konfig = TcpServerKonfig {
            max_verbindungen: 1,
            ..TcpServerKonfig::default()
        };
        let (_anbieter, addr, abbruch) = server_starten(None, konfig).await;

        let mut erster = Client::verbinden(addr).await;
        erster.begruessung().await;

        let mut zweiter = Client::verbinden(addr).await;
        assert!(zweiter.zeile().await.starts_with("error id=1003"));

        // Nach dem Schliessen wird der Platz frei
        assert_eq!(erster.senden("quit").await, "ok msg=bye\n");
        assert_eq!(erster.zeile().await, "");
        drop(erster);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let mut dritter = Client::verbinden(addr).await;
        dritter.begruessung().await;
        abbruch.cancel();
    }
}
