//! Track Model - lokale und entfernte Medien-Tracks
//!
//! Lokale Tracks kapseln den RTP-Sendetrack zusammen mit dem
//! Enabled/Stopped-Zustand; der Frame-Produzent der Anwendung konsultiert
//! das Enabled-Flag. Entfernte Tracks kommen direkt von der Peer Connection.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use uuid::Uuid;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

// ============================================================================
// TRACK CLASSIFICATION
// ============================================================================

/// Art eines Tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

impl TrackKind {
    /// Ordnet einen entfernten Track ein (Unspecified wird verworfen)
    pub fn of_remote(track: &TrackRemote) -> Option<Self> {
        match track.kind() {
            RTPCodecType::Audio => Some(Self::Audio),
            RTPCodecType::Video => Some(Self::Video),
            RTPCodecType::Unspecified => None,
        }
    }
}

/// Herkunft eines lokalen Tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackSource {
    Microphone,
    Camera,
    Display,
}

// ============================================================================
// LOCAL TRACK
// ============================================================================

/// Lokaler Medien-Track
///
/// `enabled` entspricht dem Stummschalten ohne Neuverhandlung; `stop`
/// gibt die Aufnahmeressource endgültig frei. Das Ended-Signal setzt die
/// Plattform, wenn die Aufnahme von außen beendet wird (z.B. das
/// Betriebssystem-Steuerelement der Bildschirmfreigabe).
pub struct LocalTrack {
    id: String,
    kind: TrackKind,
    source: TrackSource,
    rtp: Arc<TrackLocalStaticRTP>,
    enabled: AtomicBool,
    stopped: AtomicBool,
    ended_flag: AtomicBool,
    ended: Notify,
}

impl LocalTrack {
    /// Erstellt einen neuen lokalen Track für den angegebenen Stream
    pub fn new(kind: TrackKind, source: TrackSource, stream_id: &str) -> Arc<Self> {
        let id = Uuid::new_v4().to_string();

        let codec = match kind {
            TrackKind::Audio => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: 48000,
                channels: 2,
                ..Default::default()
            },
            TrackKind::Video => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                clock_rate: 90000,
                ..Default::default()
            },
        };

        let rtp = Arc::new(TrackLocalStaticRTP::new(
            codec,
            id.clone(),
            stream_id.to_owned(),
        ));

        Arc::new(Self {
            id,
            kind,
            source,
            rtp,
            enabled: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
            ended_flag: AtomicBool::new(false),
            ended: Notify::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn source(&self) -> TrackSource {
        self.source
    }

    /// Gibt den RTP-Sendetrack für die Peer Connection zurück
    pub fn rtp(&self) -> Arc<dyn TrackLocal + Send + Sync> {
        Arc::clone(&self.rtp) as Arc<dyn TrackLocal + Send + Sync>
    }

    /// Gibt den konkreten RTP-Track zum Einspeisen von Frames zurück
    ///
    /// Der Produzent konsultiert vor dem Schreiben `is_enabled`.
    pub fn writer(&self) -> Arc<TrackLocalStaticRTP> {
        Arc::clone(&self.rtp)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Kippt das Enabled-Flag und gibt den neuen Zustand zurück
    pub fn toggle(&self) -> bool {
        // fetch_xor liefert den alten Wert
        !self.enabled.fetch_xor(true, Ordering::SeqCst)
    }

    /// Gibt die Aufnahmeressource frei (idempotent)
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            tracing::debug!("Local track stopped: {} ({:?})", self.id, self.source);
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Meldet das externe Aufnahme-Ende (Plattform-Seite)
    pub fn mark_ended(&self) {
        self.ended_flag.store(true, Ordering::SeqCst);
        self.ended.notify_waiters();
    }

    pub fn has_ended(&self) -> bool {
        self.ended_flag.load(Ordering::SeqCst)
    }

    /// Wartet auf das externe Aufnahme-Ende
    pub async fn ended(&self) {
        loop {
            // Future vor der Flag-Prüfung anlegen, sonst geht ein
            // zeitgleiches mark_ended verloren
            let notified = self.ended.notified();
            if self.ended_flag.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }
}

impl fmt::Debug for LocalTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalTrack")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("source", &self.source)
            .field("enabled", &self.is_enabled())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

// ============================================================================
// LOCAL STREAM
// ============================================================================

/// Gebündelter lokaler Medienzustand
///
/// Hält höchstens einen Audio- und einen Video-Slot; der Video-Slot trägt
/// entweder den Kamera- oder den Display-Track, nie beide.
pub struct LocalStream {
    id: String,
    audio: Mutex<Option<Arc<LocalTrack>>>,
    video: Mutex<Option<Arc<LocalTrack>>>,
}

impl LocalStream {
    pub fn new(id: String, audio: Arc<LocalTrack>, video: Arc<LocalTrack>) -> Self {
        Self {
            id,
            audio: Mutex::new(Some(audio)),
            video: Mutex::new(Some(video)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn audio_track(&self) -> Option<Arc<LocalTrack>> {
        self.audio.lock().clone()
    }

    pub fn video_track(&self) -> Option<Arc<LocalTrack>> {
        self.video.lock().clone()
    }

    /// Installiert einen neuen Video-Track und gibt den verdrängten zurück
    ///
    /// Ob der alte Track gestoppt oder geparkt wird, entscheidet der
    /// Aufrufer.
    pub fn swap_video(&self, new: Arc<LocalTrack>) -> Option<Arc<LocalTrack>> {
        self.video.lock().replace(new)
    }

    /// Gibt alle aktuell gehaltenen Tracks zurück
    pub fn tracks(&self) -> Vec<Arc<LocalTrack>> {
        let mut tracks = Vec::with_capacity(2);
        if let Some(audio) = self.audio.lock().clone() {
            tracks.push(audio);
        }
        if let Some(video) = self.video.lock().clone() {
            tracks.push(video);
        }
        tracks
    }

    /// Stoppt alle gehaltenen Tracks (Teardown-Pfad)
    pub fn stop_all(&self) {
        for track in self.tracks() {
            track.stop();
        }
    }
}

impl fmt::Debug for LocalStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalStream")
            .field("id", &self.id)
            .field("audio", &self.audio_track().map(|t| t.id().to_owned()))
            .field("video", &self.video_track().map(|t| t.id().to_owned()))
            .finish()
    }
}

// ============================================================================
// REMOTE STREAM
// ============================================================================

/// Medien der Gegenstelle
///
/// Pro Anruf wird genau ein entfernter Stream erwartet; trifft ein Track
/// derselben Art erneut ein, ersetzt er den vorhandenen (Reconnect, kein
/// Fehler).
#[derive(Clone, Default)]
pub struct RemoteStream {
    audio: Option<Arc<TrackRemote>>,
    video: Option<Arc<TrackRemote>>,
}

impl RemoteStream {
    pub fn insert(&mut self, kind: TrackKind, track: Arc<TrackRemote>) {
        match kind {
            TrackKind::Audio => self.audio = Some(track),
            TrackKind::Video => self.video = Some(track),
        }
    }

    pub fn audio(&self) -> Option<Arc<TrackRemote>> {
        self.audio.clone()
    }

    pub fn video(&self) -> Option<Arc<TrackRemote>> {
        self.video.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.audio.is_none() && self.video.is_none()
    }
}

impl fmt::Debug for RemoteStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteStream")
            .field("has_audio", &self.audio.is_some())
            .field("has_video", &self.video.is_some())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn camera_track() -> Arc<LocalTrack> {
        LocalTrack::new(TrackKind::Video, TrackSource::Camera, "stream-test")
    }

    #[test]
    fn test_toggle_parity() {
        let track = camera_track();
        assert!(track.is_enabled());

        // Ungerade Anzahl Toggles → deaktiviert, gerade → aktiviert
        assert!(!track.toggle());
        assert!(track.toggle());
        assert!(!track.toggle());
        assert!(!track.is_enabled());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let track = camera_track();
        track.stop();
        track.stop();
        assert!(track.is_stopped());
    }

    #[test]
    fn test_swap_video_returns_displaced_track() {
        let audio = LocalTrack::new(TrackKind::Audio, TrackSource::Microphone, "stream-test");
        let camera = camera_track();
        let stream = LocalStream::new("stream-test".to_owned(), audio, Arc::clone(&camera));

        let display = LocalTrack::new(TrackKind::Video, TrackSource::Display, "display-test");
        let displaced = stream.swap_video(Arc::clone(&display)).unwrap();

        assert_eq!(displaced.id(), camera.id());
        assert_eq!(stream.video_track().unwrap().id(), display.id());
    }

    #[test]
    fn test_stop_all_stops_both_slots() {
        let audio = LocalTrack::new(TrackKind::Audio, TrackSource::Microphone, "stream-test");
        let video = camera_track();
        let stream = LocalStream::new(
            "stream-test".to_owned(),
            Arc::clone(&audio),
            Arc::clone(&video),
        );

        stream.stop_all();
        assert!(audio.is_stopped());
        assert!(video.is_stopped());
    }

    #[tokio::test]
    async fn test_ended_signal_wakes_waiter() {
        let track = LocalTrack::new(TrackKind::Video, TrackSource::Display, "display-test");

        let waiter = {
            let track = Arc::clone(&track);
            tokio::spawn(async move { track.ended().await })
        };

        // Dem Waiter Zeit geben, sich zu registrieren
        tokio::task::yield_now().await;
        track.mark_ended();

        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("waiter timed out")
            .expect("waiter panicked");
    }

    #[tokio::test]
    async fn test_ended_signal_before_waiter() {
        let track = LocalTrack::new(TrackKind::Video, TrackSource::Display, "display-test");
        track.mark_ended();

        // Flag ist bereits gesetzt, ended() kehrt sofort zurück
        tokio::time::timeout(std::time::Duration::from_secs(1), track.ended())
            .await
            .expect("ended() should resolve immediately");
    }
}
