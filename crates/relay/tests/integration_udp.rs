//! Integration-Tests: echter UDP-Transport mit Teilnehmer-Verfolger
//!
//! Laeuft mit realer Uhr, da Pakete ueber lokale Sockets gehen.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use vcsync_audio::frame::samples_zu_s16le;
use vcsync_audio::{decoder_fabrik, MischBus, MischBusKonfig, FRAME_SAMPLES};
use vcsync_core::{ChannelId, UserId};
use vcsync_observability::RelaisMetriken;
use vcsync_protocol::{CodecArt, VoicePacket};
use vcsync_relay::{TeilnehmerVerfolger, VerfolgerHandle};
use vcsync_voice::{BeitrittsAnfrage, SprachVerbindung, UdpAnbieter, UdpTransportKonfig, UdpVerbindung};

const QUELLE: ChannelId = ChannelId(1);
const SSRC: u32 = 77;
const SPRECHER: UserId = UserId(77);
const TAKT: Duration = Duration::from_millis(20);
const NACHLAUF: Duration = Duration::from_millis(100);

struct Aufbau {
    verbindung: Arc<UdpVerbindung>,
    adresse: SocketAddr,
    bus: MischBus,
    handle: VerfolgerHandle,
    sock: UdpSocket,
}

async fn aufbauen() -> Aufbau {
    let anbieter = UdpAnbieter::neu(UdpTransportKonfig {
        kanaele: HashMap::from([(QUELLE, "127.0.0.1:0".parse().unwrap())]),
        codec: CodecArt::Pcm,
        sprech_timeout: Duration::from_millis(200),
        ..UdpTransportKonfig::default()
    });
    let verbindung = anbieter
        .verbinden(BeitrittsAnfrage::quelle(QUELLE), CancellationToken::new())
        .await
        .unwrap();
    let adresse = verbindung.lokale_adresse().unwrap();
    let ereignisse = verbindung.sprech_ereignisse().unwrap();

    let bus = MischBus::neu(MischBusKonfig::default());
    let quelle: Arc<dyn SprachVerbindung> = verbindung.clone();
    let handle = TeilnehmerVerfolger::neu(
        quelle,
        bus.clone(),
        decoder_fabrik(CodecArt::Pcm),
        NACHLAUF,
        RelaisMetriken::neu().unwrap(),
        CancellationToken::new(),
    )
    .starten(ereignisse);

    let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    Aufbau {
        verbindung,
        adresse,
        bus,
        handle,
        sock,
    }
}

fn frame_paket(seq: u32) -> VoicePacket {
    let samples = vec![1000i16; FRAME_SAMPLES];
    VoicePacket::neu_audio(seq, seq * 960, SSRC, samples_zu_s16le(&samples))
}

/// Sendet `takte` Frames im 20-ms-Raster und meldet, ob der Sprecher
/// zwischendurch mit Mischpult-Eingang verfolgt wurde
async fn sprechen(aufbau: &Aufbau, start: u32, takte: u32) -> bool {
    let mut verfolgt = false;
    for seq in start..start + takte {
        aufbau
            .sock
            .send_to(&frame_paket(seq).encode(), aufbau.adresse)
            .await
            .unwrap();
        tokio::time::sleep(TAKT).await;
        verfolgt |= aufbau.handle.aktive_sprecher() == vec![SPRECHER] && aufbau.bus.anzahl_eingaenge() == 1;
    }
    verfolgt
}

#[tokio::test]
async fn sprecher_nach_kurzer_pause_wieder_verfolgt() {
    let mut aufbau = aufbauen().await;

    assert!(sprechen(&aufbau, 0, 5).await, "Sprecher wurde nie angeschlossen");

    // Pause laenger als der Nachlauf, kuerzer als der Sprech-Timeout
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(aufbau.handle.aktive_sprecher().is_empty());
    assert_eq!(aufbau.bus.anzahl_eingaenge(), 0);

    assert!(
        sprechen(&aufbau, 5, 15).await,
        "Sprecher nach der Pause nicht wieder angeschlossen"
    );
    assert_eq!(aufbau.handle.aktive_sprecher(), vec![SPRECHER]);
    assert_eq!(aufbau.bus.anzahl_eingaenge(), 1);

    let bericht = aufbau.handle.beenden().await.unwrap();
    assert_eq!(bericht.pipelines_abgebaut, 1);
    assert_eq!(aufbau.bus.anzahl_eingaenge(), 0);
    aufbau.verbindung.zerstoeren().await;
}

#[tokio::test]
async fn lange_pause_baut_ebenfalls_neu_auf() {
    let mut aufbau = aufbauen().await;

    assert!(sprechen(&aufbau, 0, 5).await);
    // Sprech-Timeout laeuft ab, regulaerer Stopp
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(aufbau.handle.aktive_sprecher().is_empty());

    assert!(sprechen(&aufbau, 5, 10).await);

    aufbau.handle.beenden().await.unwrap();
    aufbau.verbindung.zerstoeren().await;
}
