//! Call Session - Orchestrierung eines Anrufs
//!
//! Besitzt Medien, Verbindungsadapter und Signaling-Verdrahtung für genau
//! einen Anruf und bildet die öffentliche Steuerfläche ab. Jede asynchrone
//! Vervollständigung prüft vor dem Schreiben, ob sie noch zur aktuellen
//! Session-Epoche gehört; nach `end_call` laufende Vervollständigungen
//! greifen damit ins Leere.

use super::state::ConnectionState;
use crate::media::{
    DisplayConstraints, LocalStream, LocalTrack, MediaConstraints, MediaDevices, MediaError,
    RemoteStream, TrackKind,
};
use crate::peer::{default_ice_servers, PeerConnection, PeerEvent, TrackReplacer};
use crate::signaling::{SignalingChannel, SignalingMessage};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Fehlertaxonomie der Steuerfläche
///
/// Fehler werden nie über die öffentlichen Operationen geworfen, sondern
/// in den Snapshot (`last_error`) geschrieben; die Anwendung entscheidet
/// über Wiederholung oder Auflegen.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    #[error("camera or microphone access denied")]
    PermissionDenied,

    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("negotiation failed: {0}")]
    NegotiationFailed(String),

    #[error("connection lost: {0}")]
    ConnectionLost(String),

    #[error("screen sharing unavailable: {0}")]
    ScreenShareUnavailable(String),
}

impl CallError {
    /// Stabiler Diskriminator für die UI-Zuordnung
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PermissionDenied => "PermissionDenied",
            Self::DeviceUnavailable(_) => "DeviceUnavailable",
            Self::NegotiationFailed(_) => "NegotiationFailed",
            Self::ConnectionLost(_) => "ConnectionLost",
            Self::ScreenShareUnavailable(_) => "ScreenShareUnavailable",
        }
    }
}

impl From<MediaError> for CallError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::PermissionDenied => Self::PermissionDenied,
            MediaError::DeviceUnavailable(detail) => Self::DeviceUnavailable(detail),
            MediaError::CaptureUnsupported(detail) => Self::ScreenShareUnavailable(detail),
        }
    }
}

// ============================================================================
// SESSION EVENTS & SNAPSHOT
// ============================================================================

/// Events die von der Session ausgelöst werden
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged(ConnectionState),
    LocalStreamChanged,
    RemoteStreamChanged,
    ScreenShareChanged(bool),
    Error(CallError),
    Ended,
}

/// Lesbarer Gesamtzustand für die Anwendung
#[derive(Clone)]
pub struct SessionSnapshot {
    pub local_stream: Option<Arc<LocalStream>>,
    pub remote_stream: Option<RemoteStream>,
    pub connection_state: ConnectionState,
    pub is_connected: bool,
    pub is_screen_sharing: bool,
    pub connected_at: Option<DateTime<Utc>>,
    pub error: Option<CallError>,
}

impl fmt::Debug for SessionSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSnapshot")
            .field("connection_state", &self.connection_state)
            .field("is_connected", &self.is_connected)
            .field("is_screen_sharing", &self.is_screen_sharing)
            .field("has_local", &self.local_stream.is_some())
            .field("has_remote", &self.remote_stream.is_some())
            .field("error", &self.error)
            .finish()
    }
}

// ============================================================================
// SESSION CONFIGURATION
// ============================================================================

/// Konfiguration einer Session; der ICE-Server-Satz ist danach fixiert
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub ice_servers: Vec<RTCIceServer>,
    pub constraints: MediaConstraints,
    pub display: DisplayConstraints,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ice_servers: default_ice_servers(),
            constraints: MediaConstraints::default(),
            display: DisplayConstraints::default(),
        }
    }
}

// ============================================================================
// SHARED SESSION STATE
// ============================================================================

#[derive(Default)]
struct Fields {
    connection: ConnectionState,
    local: Option<Arc<LocalStream>>,
    remote: Option<RemoteStream>,
    connected_at: Option<DateTime<Utc>>,
    last_error: Option<CallError>,
}

/// Von Pumpen und Steuerfläche geteilter Zustand
struct Shared {
    epoch: AtomicU64,
    fields: Mutex<Fields>,
}

impl Shared {
    fn new() -> Self {
        Self {
            epoch: AtomicU64::new(0),
            fields: Mutex::new(Fields::default()),
        }
    }

    fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn bump_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.current_epoch() == epoch
    }
}

// ============================================================================
// CALL SESSION
// ============================================================================

/// Sitzungsautomat eines Zwei-Parteien-Anrufs
pub struct CallSession {
    config: SessionConfig,
    devices: Arc<dyn MediaDevices>,
    signaling: Arc<dyn SignalingChannel>,
    peer: Arc<PeerConnection>,
    replacer: Arc<TrackReplacer>,
    shared: Arc<Shared>,
    event_tx: broadcast::Sender<SessionEvent>,
    video_slot: Arc<tokio::sync::Mutex<()>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl CallSession {
    /// Erstellt eine neue Session mit injizierter Plattform und Signaling
    pub fn new(
        config: SessionConfig,
        devices: Arc<dyn MediaDevices>,
        signaling: Arc<dyn SignalingChannel>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        let peer = Arc::new(PeerConnection::new(config.ice_servers.clone()));

        Self {
            config,
            devices,
            signaling,
            peer,
            replacer: Arc::new(TrackReplacer::new()),
            shared: Arc::new(Shared::new()),
            event_tx,
            video_slot: Arc::new(tokio::sync::Mutex::new(())),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Gibt einen Event-Receiver zurück
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// Gibt den aktuellen Gesamtzustand zurück
    pub fn snapshot(&self) -> SessionSnapshot {
        let fields = self.shared.fields.lock();
        SessionSnapshot {
            local_stream: fields.local.clone(),
            remote_stream: fields.remote.clone(),
            connection_state: fields.connection,
            is_connected: fields.connection == ConnectionState::Connected,
            is_screen_sharing: self.replacer.is_sharing(),
            connected_at: fields.connected_at,
            error: fields.last_error.clone(),
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.fields.lock().connection
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    pub fn is_screen_sharing(&self) -> bool {
        self.replacer.is_sharing()
    }

    pub fn last_error(&self) -> Option<CallError> {
        self.shared.fields.lock().last_error.clone()
    }

    /// Baut die Session auf: Medien beschaffen, Verbindung öffnen, Pumpen
    /// starten
    ///
    /// Schlägt die Beschaffung fehl, bleibt der Zustand bei `new` und der
    /// Fehler steht im Snapshot.
    pub async fn initialize(&self) {
        let epoch = self.begin_session();

        let media = match self
            .devices
            .acquire_user_media(&self.config.constraints)
            .await
        {
            Ok(media) => media,
            Err(e) => {
                self.record_error(CallError::from(e));
                return;
            }
        };

        let stream = Arc::new(media.into_stream());

        if !self.shared.is_current(epoch) {
            // Die Freigabe kam erst nach end_call zurück
            stream.stop_all();
            return;
        }

        {
            let mut fields = self.shared.fields.lock();
            fields.local = Some(Arc::clone(&stream));
        }
        let _ = self.event_tx.send(SessionEvent::LocalStreamChanged);

        if let Err(e) = self.peer.open(&stream).await {
            stream.stop_all();
            self.shared.fields.lock().local = None;
            self.record_error(CallError::NegotiationFailed(e.to_string()));
            return;
        }

        if !self.shared.is_current(epoch) {
            // end_call lief während des Verbindungsaufbaus
            self.peer.close_detached();
            stream.stop_all();
            return;
        }

        apply_transition(&self.shared, &self.event_tx, epoch, ConnectionState::Connecting);
        self.spawn_pumps(epoch);

        tracing::info!("Call session initialized");
    }

    /// Erstellt das lokale Offer und sendet es über den Signaling-Kanal
    pub async fn create_offer(&self) {
        let epoch = self.shared.current_epoch();

        match self.peer.create_offer().await {
            Ok(offer) => {
                if !self.shared.is_current(epoch) {
                    return;
                }
                tracing::info!("Sending offer");
                if let Err(e) = self.signaling.send_offer(offer).await {
                    self.record_error(CallError::NegotiationFailed(e.to_string()));
                }
            }
            Err(e) => self.record_error(CallError::NegotiationFailed(e.to_string())),
        }
    }

    /// Beantwortet ein extern übergebenes Offer
    pub async fn create_answer(&self, offer: RTCSessionDescription) {
        let epoch = self.shared.current_epoch();

        match self.peer.create_answer(offer).await {
            Ok(answer) => {
                if !self.shared.is_current(epoch) {
                    return;
                }
                tracing::info!("Sending answer");
                if let Err(e) = self.signaling.send_answer(answer).await {
                    self.record_error(CallError::NegotiationFailed(e.to_string()));
                }
            }
            Err(e) => self.record_error(CallError::NegotiationFailed(e.to_string())),
        }
    }

    /// Reicht einen extern zugestellten Candidate an den Adapter durch
    pub async fn add_remote_candidate(&self, candidate: RTCIceCandidateInit) {
        if let Err(e) = self.peer.add_remote_candidate(candidate).await {
            tracing::warn!("Failed to apply remote ICE candidate: {}", e);
        }
    }

    /// Kippt das Enabled-Flag des lokalen Audio-Tracks
    pub fn toggle_audio(&self) {
        let track = self
            .shared
            .fields
            .lock()
            .local
            .as_ref()
            .and_then(|s| s.audio_track());

        if let Some(track) = track {
            let enabled = track.toggle();
            tracing::debug!("Audio track enabled: {}", enabled);
        }
    }

    /// Kippt das Enabled-Flag des lokalen Video-Tracks
    ///
    /// Während einer Bildschirmfreigabe ein No-op: die Kamera ist geparkt
    /// und hängt nicht an der Verbindung.
    pub async fn toggle_video(&self) {
        // Serialisiert gegen laufende Track-Wechsel
        let _slot = self.video_slot.lock().await;

        if self.replacer.is_sharing() {
            return;
        }

        let track = self
            .shared
            .fields
            .lock()
            .local
            .as_ref()
            .and_then(|s| s.video_track());

        if let Some(track) = track {
            let enabled = track.toggle();
            tracing::debug!("Video track enabled: {}", enabled);
        }
    }

    /// Startet die Bildschirmfreigabe
    ///
    /// `is_screen_sharing` kippt nur nach bestätigtem Tausch; ein
    /// fehlgeschlagener Versuch lässt die Kamera aktiv.
    pub async fn start_screen_share(&self) {
        let epoch = self.shared.current_epoch();
        let _slot = self.video_slot.lock().await;

        if !self.shared.is_current(epoch) || self.replacer.is_sharing() {
            return;
        }

        let stream = match self.shared.fields.lock().local.clone() {
            Some(stream) => stream,
            None => return,
        };

        let display = match self
            .devices
            .acquire_display_media(&self.config.display)
            .await
        {
            Ok(display) => display,
            Err(e) => {
                self.record_error(CallError::ScreenShareUnavailable(e.to_string()));
                return;
            }
        };

        // Es wird nur der Video-Track gesendet
        if let Some(audio) = display.audio {
            audio.stop();
        }
        let video = display.video;

        if !self.shared.is_current(epoch) {
            video.stop();
            return;
        }

        match self
            .replacer
            .start(&self.peer, &stream, Arc::clone(&video))
            .await
        {
            Ok(()) => {
                let _ = self.event_tx.send(SessionEvent::ScreenShareChanged(true));
                let _ = self.event_tx.send(SessionEvent::LocalStreamChanged);
                self.watch_display_end(epoch, video);
            }
            Err(e) => {
                video.stop();
                self.record_error(CallError::ScreenShareUnavailable(e.to_string()));
            }
        }
    }

    /// Beendet die Bildschirmfreigabe und reinstalliert die Kamera
    pub async fn stop_screen_share(&self) {
        let epoch = self.shared.current_epoch();
        stop_screen_share_inner(
            epoch,
            &self.shared,
            &self.peer,
            &self.replacer,
            &self.event_tx,
            &self.video_slot,
        )
        .await;
    }

    /// Beendet den Anruf und gibt alle Ressourcen frei
    ///
    /// Mehrfaches Aufrufen ist unschädlich; auch vor abgeschlossenem
    /// `initialize` sicher.
    pub fn end_call(&self) {
        self.shared.bump_epoch();

        for task in self.tasks.lock().drain(..) {
            task.abort();
        }

        let was_closed = {
            let mut fields = self.shared.fields.lock();
            let was_closed = fields.connection == ConnectionState::Closed
                && fields.local.is_none()
                && fields.remote.is_none();

            if let Some(stream) = fields.local.take() {
                stream.stop_all();
            }
            fields.remote = None;
            fields.connected_at = None;
            fields.last_error = None;
            fields.connection = ConnectionState::Closed;

            was_closed
        };

        self.replacer.reset();
        self.peer.close_detached();

        if !was_closed {
            tracing::info!("Call ended");
            let _ = self
                .event_tx
                .send(SessionEvent::StateChanged(ConnectionState::Closed));
            let _ = self.event_tx.send(SessionEvent::Ended);
        }
    }

    // ========================================================================
    // PRIVATE METHODS
    // ========================================================================

    /// Eröffnet eine neue Session-Epoche und räumt die vorige vollständig ab
    fn begin_session(&self) -> u64 {
        let epoch = self.shared.bump_epoch();

        for task in self.tasks.lock().drain(..) {
            task.abort();
        }

        let previous = {
            let mut fields = self.shared.fields.lock();
            std::mem::take(&mut *fields)
        };
        if let Some(stream) = previous.local {
            stream.stop_all();
        }

        self.replacer.reset();
        self.peer.close_detached();

        epoch
    }

    fn record_error(&self, error: CallError) {
        record_error_in(&self.shared, &self.event_tx, error);
    }

    /// Startet die Ereignis-Pumpen der aktuellen Epoche
    fn spawn_pumps(&self, epoch: u64) {
        // Peer-Events: Zustand, entfernte Tracks, lokale Candidates
        let mut peer_rx = self.peer.subscribe();
        let shared = Arc::clone(&self.shared);
        let signaling = Arc::clone(&self.signaling);
        let event_tx = self.event_tx.clone();
        let peer_pump = tokio::spawn(async move {
            while let Ok(event) = peer_rx.recv().await {
                if !shared.is_current(epoch) {
                    break;
                }
                handle_peer_event(event, epoch, &shared, &event_tx, &signaling).await;
            }
        });

        // Eingehende Signaling-Nachrichten
        let mut signaling_rx = self.signaling.subscribe();
        let shared = Arc::clone(&self.shared);
        let signaling = Arc::clone(&self.signaling);
        let peer = Arc::clone(&self.peer);
        let event_tx = self.event_tx.clone();
        let signaling_pump = tokio::spawn(async move {
            while let Ok(msg) = signaling_rx.recv().await {
                if !shared.is_current(epoch) {
                    break;
                }
                handle_signaling_message(msg, epoch, &peer, &signaling, &shared, &event_tx).await;
            }
        });

        self.tasks.lock().extend([peer_pump, signaling_pump]);
    }

    /// Beobachtet das Ended-Signal des Display-Tracks
    ///
    /// Beendet der Benutzer die Freigabe über das Plattform-Steuerelement,
    /// läuft automatisch der Stopp-Pfad.
    fn watch_display_end(&self, epoch: u64, track: Arc<LocalTrack>) {
        let shared = Arc::clone(&self.shared);
        let peer = Arc::clone(&self.peer);
        let replacer = Arc::clone(&self.replacer);
        let event_tx = self.event_tx.clone();
        let video_slot = Arc::clone(&self.video_slot);

        let watcher = tokio::spawn(async move {
            track.ended().await;
            if !shared.is_current(epoch) {
                return;
            }
            tracing::info!("Display track ended, restoring camera");
            stop_screen_share_inner(epoch, &shared, &peer, &replacer, &event_tx, &video_slot)
                .await;
        });

        self.tasks.lock().push(watcher);
    }
}

impl fmt::Debug for CallSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallSession")
            .field("connection_state", &self.connection_state())
            .field("is_screen_sharing", &self.is_screen_sharing())
            .finish()
    }
}

impl Drop for CallSession {
    fn drop(&mut self) {
        // Entsorgungspfad: end_call ist idempotent
        self.end_call();
    }
}

// ============================================================================
// EVENT HANDLER
// ============================================================================

fn record_error_in(
    shared: &Shared,
    event_tx: &broadcast::Sender<SessionEvent>,
    error: CallError,
) {
    tracing::error!("Call error: {}", error);
    shared.fields.lock().last_error = Some(error.clone());
    let _ = event_tx.send(SessionEvent::Error(error));
}

/// Wendet einen gemeldeten Zustand gegen die Übergangstabelle an
fn apply_transition(
    shared: &Shared,
    event_tx: &broadcast::Sender<SessionEvent>,
    epoch: u64,
    next: ConnectionState,
) {
    if !shared.is_current(epoch) {
        return;
    }

    let changed = {
        let mut fields = shared.fields.lock();
        if fields.connection == next {
            false
        } else if fields.connection.can_transition(next) {
            fields.connection = next;
            if next == ConnectionState::Connected && fields.connected_at.is_none() {
                fields.connected_at = Some(Utc::now());
            }
            true
        } else {
            tracing::warn!(
                "Ignoring illegal connection state transition: {} -> {}",
                fields.connection,
                next
            );
            false
        }
    };

    if changed {
        tracing::info!("Connection state: {}", next);
        let _ = event_tx.send(SessionEvent::StateChanged(next));
    }
}

/// Verarbeitet ein Ereignis des Verbindungsadapters
async fn handle_peer_event(
    event: PeerEvent,
    epoch: u64,
    shared: &Arc<Shared>,
    event_tx: &broadcast::Sender<SessionEvent>,
    signaling: &Arc<dyn SignalingChannel>,
) {
    match event {
        PeerEvent::StateChanged(platform_state) => {
            let Some(next) = ConnectionState::from_platform(platform_state) else {
                return;
            };

            apply_transition(shared, event_tx, epoch, next);

            if matches!(
                next,
                ConnectionState::Disconnected | ConnectionState::Failed
            ) {
                // Die Verbindung bleibt offen; Schließen ist eine
                // Entscheidung des Aufrufers (Retry/ICE-Restart möglich)
                record_error_in(
                    shared,
                    event_tx,
                    CallError::ConnectionLost(format!("connection state: {}", next)),
                );
            }
        }

        PeerEvent::RemoteTrack { track } => {
            let Some(kind) = TrackKind::of_remote(&track) else {
                return;
            };

            {
                let mut fields = shared.fields.lock();
                fields
                    .remote
                    .get_or_insert_with(RemoteStream::default)
                    .insert(kind, track);
            }
            let _ = event_tx.send(SessionEvent::RemoteStreamChanged);
        }

        PeerEvent::LocalCandidate(candidate) => {
            tracing::debug!("Sending local ICE candidate");
            if let Err(e) = signaling.send_candidate(candidate).await {
                tracing::warn!("Failed to send ICE candidate: {}", e);
            }
        }
    }
}

/// Verarbeitet eine eingehende Signaling-Nachricht
///
/// Offers werden automatisch beantwortet (Angerufenen-Pfad); wer das
/// Offer initiiert, entscheidet weiterhin die Anwendung.
async fn handle_signaling_message(
    msg: SignalingMessage,
    epoch: u64,
    peer: &Arc<PeerConnection>,
    signaling: &Arc<dyn SignalingChannel>,
    shared: &Arc<Shared>,
    event_tx: &broadcast::Sender<SessionEvent>,
) {
    match msg {
        SignalingMessage::Offer { sdp, .. } => {
            tracing::info!("Remote offer received");
            match peer.create_answer(sdp).await {
                Ok(answer) => {
                    if !shared.is_current(epoch) {
                        return;
                    }
                    if let Err(e) = signaling.send_answer(answer).await {
                        record_error_in(
                            shared,
                            event_tx,
                            CallError::NegotiationFailed(e.to_string()),
                        );
                    }
                }
                Err(e) => record_error_in(
                    shared,
                    event_tx,
                    CallError::NegotiationFailed(e.to_string()),
                ),
            }
        }

        SignalingMessage::Answer { sdp, .. } => {
            tracing::info!("Remote answer received");
            if let Err(e) = peer.accept_answer(sdp).await {
                record_error_in(
                    shared,
                    event_tx,
                    CallError::NegotiationFailed(e.to_string()),
                );
            }
        }

        SignalingMessage::Candidate { candidate, .. } => {
            tracing::debug!("Remote ICE candidate received");
            if let Err(e) = peer.add_remote_candidate(candidate).await {
                tracing::warn!("Failed to apply remote ICE candidate: {}", e);
            }
        }
    }
}

/// Stopp-Pfad der Bildschirmfreigabe (auch vom Ended-Watcher genutzt)
async fn stop_screen_share_inner(
    epoch: u64,
    shared: &Arc<Shared>,
    peer: &Arc<PeerConnection>,
    replacer: &Arc<TrackReplacer>,
    event_tx: &broadcast::Sender<SessionEvent>,
    video_slot: &Arc<tokio::sync::Mutex<()>>,
) {
    let _slot = video_slot.lock().await;

    if !shared.is_current(epoch) || !replacer.is_sharing() {
        return;
    }

    let stream = match shared.fields.lock().local.clone() {
        Some(stream) => stream,
        None => return,
    };

    match replacer.stop(peer, &stream).await {
        Ok(()) => {
            let _ = event_tx.send(SessionEvent::ScreenShareChanged(false));
            let _ = event_tx.send(SessionEvent::LocalStreamChanged);
        }
        Err(e) => record_error_in(
            shared,
            event_tx,
            CallError::ScreenShareUnavailable(e.to_string()),
        ),
    }
}

// ============================================================================
// TESTS
// ============================================================================
