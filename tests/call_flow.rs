//! End-to-End-Tests: zwei Sessions verbinden sich im selben Prozess über
//! das In-Memory-Signaling-Paar und den echten Verhandlungsstack.

use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use teleconsult::{
    default_ice_servers, CallSession, ConnectionState, InMemorySignaling, LocalStream,
    LocalTrack, PeerConnection, PeerEvent, SessionConfig, SessionEvent, StaticMediaDevices,
    TrackKind, TrackSource,
};
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::rtp::header::Header;
use webrtc::rtp::packet::Packet;
use webrtc::track::track_local::TrackLocalWriter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn session_pair() -> (CallSession, CallSession) {
    let (sig_a, sig_b) = InMemorySignaling::pair();
    let a = CallSession::new(
        SessionConfig::default(),
        Arc::new(StaticMediaDevices),
        sig_a,
    );
    let b = CallSession::new(
        SessionConfig::default(),
        Arc::new(StaticMediaDevices),
        sig_b,
    );
    (a, b)
}

/// Pollt eine Bedingung bis zum Timeout
async fn wait_until<F>(mut condition: F, timeout: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    condition()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_full_call_flow_reaches_connected() -> anyhow::Result<()> {
    init_tracing();
    let (a, b) = session_pair();

    let mut a_events = a.subscribe();
    a.initialize().await;
    b.initialize().await;

    // Die Anruferseite initiiert; die Gegenseite beantwortet das Offer
    // automatisch über ihre Signaling-Pumpe
    a.create_offer().await;

    assert!(
        wait_until(|| a.is_connected() && b.is_connected(), Duration::from_secs(30)).await,
        "peers did not reach connected: a={:?}, b={:?}",
        a.snapshot(),
        b.snapshot()
    );

    // Zustandsfolge der Anruferseite: connecting kommt strikt vor connected
    tokio::time::sleep(Duration::from_millis(200)).await;
    let mut states = Vec::new();
    while let Ok(event) = a_events.try_recv() {
        if let SessionEvent::StateChanged(state) = event {
            states.push(state);
        }
    }
    let connecting = states
        .iter()
        .position(|s| *s == ConnectionState::Connecting)
        .expect("connecting was never reported");
    let connected = states
        .iter()
        .position(|s| *s == ConnectionState::Connected)
        .expect("connected was never reported");
    assert!(connecting < connected, "state sequence: {:?}", states);

    // Erst eingespeiste Frames machen den entfernten Track sichtbar
    let video = a
        .snapshot()
        .local_stream
        .expect("local stream missing")
        .video_track()
        .expect("video track missing");
    let writer = video.writer();
    let feeder = tokio::spawn(async move {
        for i in 0u16..500 {
            let packet = Packet {
                header: Header {
                    version: 2,
                    payload_type: 96,
                    sequence_number: i,
                    timestamp: u32::from(i) * 3000,
                    ssrc: 0x7465_6c65,
                    ..Default::default()
                },
                payload: Bytes::from_static(&[0u8; 64]),
            };
            let _ = writer.write_rtp(&packet).await;
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    });

    assert!(
        wait_until(
            || b
                .snapshot()
                .remote_stream
                .map(|r| r.video().is_some())
                .unwrap_or(false),
            Duration::from_secs(10)
        )
        .await,
        "remote video track never arrived on the callee side"
    );
    feeder.abort();

    // Bildschirmfreigabe auf der laufenden Verbindung
    let stream = a.snapshot().local_stream.expect("local stream missing");
    let camera = stream.video_track().expect("video track missing");
    a.start_screen_share().await;
    assert!(a.is_screen_sharing());
    assert_eq!(
        stream.video_track().expect("video slot empty").source(),
        TrackSource::Display
    );

    a.stop_screen_share().await;
    assert!(!a.is_screen_sharing());
    assert_eq!(
        stream.video_track().expect("video slot empty").id(),
        camera.id()
    );

    // Doppeltes Auflegen ist beobachtbar identisch mit einfachem
    a.end_call();
    let first = a.snapshot();
    a.end_call();
    let second = a.snapshot();
    for snapshot in [&first, &second] {
        assert_eq!(snapshot.connection_state, ConnectionState::Closed);
        assert!(snapshot.local_stream.is_none());
        assert!(snapshot.remote_stream.is_none());
    }

    b.end_call();
    Ok(())
}

fn adapter_stream(stream_id: &str) -> LocalStream {
    let audio = LocalTrack::new(TrackKind::Audio, TrackSource::Microphone, stream_id);
    let video = LocalTrack::new(TrackKind::Video, TrackSource::Camera, stream_id);
    LocalStream::new(stream_id.to_owned(), audio, video)
}

/// Pumpt Candidates zur Gegenseite und meldet den Connected-Zustand
fn pump_adapter_events(
    from: &PeerConnection,
    to: Arc<PeerConnection>,
    connected: Arc<AtomicBool>,
) -> tokio::task::JoinHandle<()> {
    let mut events = from.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                PeerEvent::LocalCandidate(candidate) => {
                    let _ = to.add_remote_candidate(candidate).await;
                }
                PeerEvent::StateChanged(RTCPeerConnectionState::Connected) => {
                    connected.store(true, Ordering::SeqCst);
                }
                _ => {}
            }
        }
    })
}

#[tokio::test(flavor = "multi_thread")]
async fn test_candidates_before_offer_still_connect() -> anyhow::Result<()> {
    init_tracing();

    let a = Arc::new(PeerConnection::new(default_ice_servers()));
    let b = Arc::new(PeerConnection::new(default_ice_servers()));
    a.open(&adapter_stream("stream-a")).await?;
    b.open(&adapter_stream("stream-b")).await?;

    // A's Candidates von Hand einsammeln, bevor B irgendetwas kennt
    let mut a_events = a.subscribe();
    let offer = a.create_offer().await?;

    let mut early_candidates = Vec::new();
    let collect_deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < collect_deadline {
        match tokio::time::timeout(Duration::from_millis(250), a_events.recv()).await {
            Ok(Ok(PeerEvent::LocalCandidate(candidate))) => early_candidates.push(candidate),
            Ok(Ok(_)) => {}
            _ => break,
        }
    }
    assert!(
        !early_candidates.is_empty(),
        "no local candidates were gathered"
    );

    // Zustellung in verdrehter Reihenfolge: erst alle Candidates, dann
    // das Offer; kein Candidate darf dabei verloren gehen
    for candidate in early_candidates {
        b.add_remote_candidate(candidate).await?;
    }
    let answer = b.create_answer(offer).await?;
    a.accept_answer(answer).await?;

    let a_connected = Arc::new(AtomicBool::new(false));
    let b_connected = Arc::new(AtomicBool::new(false));
    let pump_a = pump_adapter_events(&a, Arc::clone(&b), Arc::clone(&a_connected));
    let pump_b = pump_adapter_events(&b, Arc::clone(&a), Arc::clone(&b_connected));

    assert!(
        wait_until(
            || a_connected.load(Ordering::SeqCst) && b_connected.load(Ordering::SeqCst),
            Duration::from_secs(30)
        )
        .await,
        "adapters did not reach connected"
    );

    pump_a.abort();
    pump_b.abort();
    a.close().await;
    b.close().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_connection_loss_is_reported_non_fatally() -> anyhow::Result<()> {
    init_tracing();
    let (a, b) = session_pair();

    a.initialize().await;
    b.initialize().await;
    a.create_offer().await;

    assert!(
        wait_until(|| a.is_connected() && b.is_connected(), Duration::from_secs(30)).await,
        "peers did not reach connected"
    );

    // Die Gegenseite legt auf; die eigene Session bleibt offen und meldet
    // den Verlust nur als Fehler im Snapshot
    b.end_call();

    assert!(
        wait_until(
            || a
                .snapshot()
                .error
                .map(|e| e.kind() == "ConnectionLost")
                .unwrap_or(false),
            Duration::from_secs(60)
        )
        .await,
        "connection loss was never reported: {:?}",
        a.snapshot()
    );

    // Kein automatisches Schließen: erst end_call beendet die Session
    assert_ne!(a.connection_state(), ConnectionState::Closed);
    a.end_call();
    assert_eq!(a.connection_state(), ConnectionState::Closed);
    Ok(())
}
