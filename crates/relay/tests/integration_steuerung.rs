//! Integration-Tests fuer den Zustandsautomaten der Relais-Steuerung
//! (In-Process-Transport, PCM-Codec, pausierte Uhr)

use std::sync::Arc;
use std::time::Duration;

use vcsync_core::{ChannelId, UserId};
use vcsync_observability::RelaisMetriken;
use vcsync_protocol::CodecArt;
use vcsync_relay::{
    FehlerKlasse, RelaisError, RelaisKonfig, RelaisSteuerung, RelaisZustand, StartErgebnis,
    StoppAnlass, StoppErgebnis,
};
use vcsync_voice::SpeicherAnbieter;

const QUELLE: ChannelId = ChannelId(100);
const ZIEL: ChannelId = ChannelId(200);

fn steuerung() -> (SpeicherAnbieter, RelaisSteuerung) {
    let anbieter = SpeicherAnbieter::neu();
    let konfig = RelaisKonfig {
        quell_kanal: QUELLE,
        ziel_kanal: ZIEL,
        codec: CodecArt::Pcm,
        ..RelaisKonfig::default()
    };
    let steuerung = RelaisSteuerung::neu(
        Arc::new(anbieter.clone()),
        konfig,
        RelaisMetriken::neu().expect("Metriken"),
    );
    (anbieter, steuerung)
}

async fn kurz_warten() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

#[tokio::test(start_paused = true)]
async fn stopp_im_leerlauf_ist_wirkungslos() {
    let (anbieter, s) = steuerung();
    assert_eq!(s.stoppen(StoppAnlass::Befehl).await, StoppErgebnis::NichtAktiv);
    assert_eq!(s.zustand(), RelaisZustand::Leerlauf);
    assert_eq!(anbieter.beitritte(QUELLE), 0);
    assert_eq!(anbieter.zerstoerungen(QUELLE), 0);
}

#[tokio::test(start_paused = true)]
async fn zweiter_start_meldet_bereits_aktiv() {
    let (anbieter, s) = steuerung();
    assert!(matches!(s.starten().await, Ok(StartErgebnis::Gestartet(_))));
    assert_eq!(
        s.starten().await.unwrap(),
        StartErgebnis::BereitsAktiv(RelaisZustand::Aktiv)
    );
    // Keine zweite Sitzung
    assert_eq!(anbieter.beitritte(QUELLE), 1);
    assert_eq!(anbieter.beitritte(ZIEL), 1);
    assert_eq!(s.metriken().sitzungen_gestartet.get(), 1);
}

#[tokio::test(start_paused = true)]
async fn gleichzeitige_starts_ergeben_eine_sitzung() {
    let (anbieter, s) = steuerung();
    anbieter.beitritts_verzoegerung_setzen(Some(Duration::from_millis(50)));

    let (a, b) = tokio::join!(s.starten(), s.starten());
    let ergebnisse = [a.unwrap(), b.unwrap()];
    let gestartet = ergebnisse
        .iter()
        .filter(|e| matches!(e, StartErgebnis::Gestartet(_)))
        .count();
    assert_eq!(gestartet, 1);
    assert!(ergebnisse.contains(&StartErgebnis::BereitsAktiv(RelaisZustand::Startend)));
    assert_eq!(s.zustand(), RelaisZustand::Aktiv);
}

#[tokio::test(start_paused = true)]
async fn stopp_waehrend_start_bricht_ab() {
    let (anbieter, s) = steuerung();
    anbieter.beitritts_verzoegerung_setzen(Some(Duration::from_secs(1)));

    let starter = {
        let s = s.clone();
        tokio::spawn(async move { s.starten().await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(s.zustand(), RelaisZustand::Startend);

    assert_eq!(s.stoppen(StoppAnlass::Befehl).await, StoppErgebnis::StartAbgebrochen);
    assert_eq!(starter.await.unwrap().unwrap(), StartErgebnis::Abgebrochen);
    assert_eq!(s.zustand(), RelaisZustand::Leerlauf);
    assert_eq!(anbieter.beitritte(QUELLE), 0);
    assert_eq!(anbieter.beitritte(ZIEL), 0);

    // Danach ist ein normaler Start moeglich
    anbieter.beitritts_verzoegerung_setzen(None);
    assert!(matches!(s.starten().await, Ok(StartErgebnis::Gestartet(_))));
}

#[tokio::test(start_paused = true)]
async fn fehlgeschlagener_beitritt_fuehrt_in_den_leerlauf() {
    let (anbieter, s) = steuerung();
    anbieter.beitritt_fehlschlagen_lassen(QUELLE, "Kanal existiert nicht");

    let fehler = s.starten().await.unwrap_err();
    assert!(matches!(fehler, RelaisError::Beitritt { kanal, .. } if kanal == QUELLE));
    assert_eq!(fehler.klasse(), FehlerKlasse::Initialisierung);
    assert_eq!(s.zustand(), RelaisZustand::Leerlauf);
    assert_eq!(s.metriken().sitzungen_fehlgeschlagen.get(), 1);

    // Die erfolgreich betretene Seite wurde wieder verlassen
    assert_eq!(anbieter.beitritte(ZIEL), 1);
    assert_eq!(anbieter.zerstoerungen(ZIEL), 1);
    assert!(!anbieter.verbunden(ZIEL));

    anbieter.beitritt_zulassen(QUELLE);
    assert!(matches!(s.starten().await, Ok(StartErgebnis::Gestartet(_))));
}

#[tokio::test(start_paused = true)]
async fn trennung_baut_die_sitzung_ab() {
    let (anbieter, s) = steuerung();
    s.starten().await.unwrap();
    anbieter.sprechen_beginnen(QUELLE, UserId(1));
    kurz_warten().await;

    anbieter.trennen(ZIEL, "Netzwerk weg");
    kurz_warten().await;

    assert_eq!(s.zustand(), RelaisZustand::Leerlauf);
    assert_eq!(anbieter.zerstoerungen(QUELLE), 1);
    assert_eq!(anbieter.zerstoerungen(ZIEL), 1);
    assert_eq!(anbieter.offene_abos(QUELLE), 0);
    assert_eq!(s.metriken().transport_verbunden.get(), 0);
    assert_eq!(s.metriken().sitzung_aktiv.get(), 0);

    // Neustart stellt den Transport-Zustand wieder her
    assert!(matches!(s.starten().await, Ok(StartErgebnis::Gestartet(_))));
    assert_eq!(s.metriken().transport_verbunden.get(), 1);
}

#[tokio::test(start_paused = true)]
async fn prozessende_hinterlaesst_keine_pipelines() {
    let (anbieter, s) = steuerung();
    s.starten().await.unwrap();
    for id in 1..=3 {
        anbieter.sprechen_beginnen(QUELLE, UserId(id));
    }
    kurz_warten().await;
    assert_eq!(s.status().aktive_sprecher.len(), 3);

    let StoppErgebnis::Gestoppt(bericht) = s.stoppen(StoppAnlass::Prozessende).await else {
        panic!("Sitzung haette gestoppt werden muessen");
    };
    assert_eq!(bericht.pipelines_abgebaut, 3);
    assert_eq!(bericht.verbindungen_zerstoert, 2);
    assert!(bericht.fehlerfrei());

    assert!(!anbieter.verbunden(QUELLE));
    assert!(!anbieter.verbunden(ZIEL));
    assert_eq!(anbieter.offene_abos(QUELLE), 0);
    assert_eq!(s.metriken().pipelines_aktiv.get(), 0);
    assert_eq!(s.zustand(), RelaisZustand::Leerlauf);

    // Zweiter Stopp ist harmlos
    assert_eq!(s.stoppen(StoppAnlass::Prozessende).await, StoppErgebnis::NichtAktiv);
}

#[tokio::test(start_paused = true)]
async fn status_im_betrieb() {
    let (anbieter, s) = steuerung();
    let StartErgebnis::Gestartet(id) = s.starten().await.unwrap() else {
        panic!("Start erwartet");
    };
    anbieter.sprechen_beginnen(QUELLE, UserId(7));
    tokio::time::sleep(Duration::from_millis(60)).await;

    let status = s.status();
    assert_eq!(status.zustand, RelaisZustand::Aktiv);
    assert_eq!(status.sitzung, Some(id));
    assert_eq!(status.aktive_sprecher, vec![UserId(7)]);
    assert!(status.frames_gesendet >= 3);

    let json = serde_json::to_string(&status).unwrap();
    assert!(json.contains("\"zustand\":\"aktiv\""));
}

#[tokio::test(start_paused = true)]
async fn geschlossene_ereignisse_halten_die_sitzung() {
    let (anbieter, s) = steuerung();
    s.starten().await.unwrap();
    anbieter.ereignisse_schliessen(QUELLE);
    kurz_warten().await;

    assert_eq!(s.zustand(), RelaisZustand::Aktiv);
    assert!(matches!(s.stoppen(StoppAnlass::Befehl).await, StoppErgebnis::Gestoppt(_)));
}
