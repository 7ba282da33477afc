//! Peer Connection Adapter - Kapselung der WebRTC-Verhandlungsprimitive
//!
//! Verwaltet genau eine verhandelbare Verbindung: Aufbau mit festem
//! ICE-Server-Satz, Anbinden der lokalen Tracks, Offer/Answer-Austausch
//! und getrickelte ICE-Candidates. Candidates, die vor der Remote
//! Description eintreffen, werden gepuffert und nach dem Setzen in
//! Eintreffreihenfolge angewendet.

use crate::media::LocalStream;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::track::track_remote::TrackRemote;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug)]
pub enum PeerError {
    #[error("WebRTC error: {0}")]
    WebRTC(String),

    #[error("peer connection not open")]
    NotOpen,

    #[error("peer connection already open")]
    AlreadyOpen,

    #[error("answer received before an offer was sent")]
    UnexpectedAnswer,
}

// ============================================================================
// PEER EVENTS
// ============================================================================

/// Ereignisse der Peer Connection, in Plattform-Reihenfolge
#[derive(Clone)]
pub enum PeerEvent {
    /// Die Verbindung hat ihren Zustand gewechselt
    StateChanged(RTCPeerConnectionState),

    /// Ein Track der Gegenstelle ist eingetroffen
    RemoteTrack { track: Arc<TrackRemote> },

    /// Der lokale ICE-Agent hat einen Candidate entdeckt
    LocalCandidate(RTCIceCandidateInit),
}

// ============================================================================
// ICE SERVER CONFIGURATION
// ============================================================================

/// Standard STUN-Server Konfiguration
pub fn default_ice_servers() -> Vec<RTCIceServer> {
    vec![RTCIceServer {
        urls: vec![
            "stun:stun.l.google.com:19302".to_string(),
            "stun:stun1.l.google.com:19302".to_string(),
        ],
        ..Default::default()
    }]
}

// ============================================================================
// PEER CONNECTION
// ============================================================================

/// Adapter um eine einzelne `RTCPeerConnection`
pub struct PeerConnection {
    ice_servers: Vec<RTCIceServer>,
    pc: Mutex<Option<Arc<RTCPeerConnection>>>,
    pending_candidates: Mutex<Vec<RTCIceCandidateInit>>,
    remote_ready: AtomicBool,
    offer_sent: AtomicBool,
    event_tx: broadcast::Sender<PeerEvent>,
}

impl PeerConnection {
    /// Erstellt einen Adapter mit dem bei Session-Erstellung fixierten
    /// ICE-Server-Satz
    pub fn new(ice_servers: Vec<RTCIceServer>) -> Self {
        let (event_tx, _) = broadcast::channel(100);

        Self {
            ice_servers,
            pc: Mutex::new(None),
            pending_candidates: Mutex::new(Vec::new()),
            remote_ready: AtomicBool::new(false),
            offer_sent: AtomicBool::new(false),
            event_tx,
        }
    }

    /// Gibt einen Event-Receiver zurück
    pub fn subscribe(&self) -> broadcast::Receiver<PeerEvent> {
        self.event_tx.subscribe()
    }

    pub fn is_open(&self) -> bool {
        self.pc.lock().is_some()
    }

    /// Öffnet die Verbindung und bindet alle lokalen Tracks als Sender an
    ///
    /// Schlägt fehl, wenn ohne zwischenzeitliches `close` bereits eine
    /// Verbindung existiert.
    pub async fn open(&self, local: &LocalStream) -> Result<(), PeerError> {
        if self.pc.lock().is_some() {
            return Err(PeerError::AlreadyOpen);
        }

        // Media Engine mit Standard-Codecs konfigurieren
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| PeerError::WebRTC(e.to_string()))?;

        // Interceptors für RTCP, NACK etc.
        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .map_err(|e| PeerError::WebRTC(e.to_string()))?;

        // API erstellen
        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        // RTCConfiguration mit ICE Servern
        let config = RTCConfiguration {
            ice_servers: self.ice_servers.clone(),
            ..Default::default()
        };

        // Peer Connection erstellen
        let pc = Arc::new(
            api.new_peer_connection(config)
                .await
                .map_err(|e| PeerError::WebRTC(e.to_string()))?,
        );

        // Lokale Tracks als Sender anbinden (sendrecv, also bidirektional)
        for track in local.tracks() {
            pc.add_track(track.rtp())
                .await
                .map_err(|e| PeerError::WebRTC(e.to_string()))?;
        }

        // Event Handler registrieren
        self.register_handlers(&pc);

        // Genau eine Verbindung pro open/close-Zyklus
        let mut slot = self.pc.lock();
        if slot.is_some() {
            let loser = pc;
            tokio::spawn(async move {
                let _ = loser.close().await;
            });
            return Err(PeerError::AlreadyOpen);
        }
        *slot = Some(pc);

        Ok(())
    }

    /// Erstellt das lokale Offer und setzt es als Local Description
    pub async fn create_offer(&self) -> Result<RTCSessionDescription, PeerError> {
        let pc = self.require_open()?;

        let offer = pc
            .create_offer(None)
            .await
            .map_err(|e| PeerError::WebRTC(e.to_string()))?;

        pc.set_local_description(offer.clone())
            .await
            .map_err(|e| PeerError::WebRTC(e.to_string()))?;

        self.offer_sent.store(true, Ordering::SeqCst);

        Ok(offer)
    }

    /// Verarbeitet ein entferntes Offer und erstellt das Answer
    pub async fn create_answer(
        &self,
        offer: RTCSessionDescription,
    ) -> Result<RTCSessionDescription, PeerError> {
        let pc = self.require_open()?;

        pc.set_remote_description(offer)
            .await
            .map_err(|e| PeerError::WebRTC(e.to_string()))?;

        self.remote_ready.store(true, Ordering::SeqCst);
        self.flush_pending(&pc).await;

        let answer = pc
            .create_answer(None)
            .await
            .map_err(|e| PeerError::WebRTC(e.to_string()))?;

        pc.set_local_description(answer.clone())
            .await
            .map_err(|e| PeerError::WebRTC(e.to_string()))?;

        Ok(answer)
    }

    /// Verarbeitet das Answer der Gegenstelle auf der Offer-Seite
    ///
    /// Ein Answer vor gesendetem Offer wird abgewiesen.
    pub async fn accept_answer(&self, answer: RTCSessionDescription) -> Result<(), PeerError> {
        if !self.offer_sent.load(Ordering::SeqCst) {
            return Err(PeerError::UnexpectedAnswer);
        }

        let pc = self.require_open()?;

        pc.set_remote_description(answer)
            .await
            .map_err(|e| PeerError::WebRTC(e.to_string()))?;

        self.remote_ready.store(true, Ordering::SeqCst);
        self.flush_pending(&pc).await;

        Ok(())
    }

    /// Wendet einen getrickelten Candidate an
    ///
    /// Vor gesetzter Remote Description wird gepuffert statt verworfen;
    /// Anwendungsfehler sind nicht fatal und werden nur geloggt.
    pub async fn add_remote_candidate(
        &self,
        candidate: RTCIceCandidateInit,
    ) -> Result<(), PeerError> {
        let pc = self.require_open()?;

        if !self.remote_ready.load(Ordering::SeqCst) {
            tracing::debug!("Queueing ICE candidate until remote description is set");
            self.pending_candidates.lock().push(candidate);
            return Ok(());
        }

        if let Err(e) = pc.add_ice_candidate(candidate).await {
            tracing::warn!("Failed to add ICE candidate: {}", e);
        }

        Ok(())
    }

    /// Liefert den Sender des ausgehenden Video-Tracks
    pub async fn video_sender(&self) -> Result<Option<Arc<RTCRtpSender>>, PeerError> {
        let pc = self.require_open()?;

        for sender in pc.get_senders().await {
            if let Some(track) = sender.track().await {
                if track.kind() == RTPCodecType::Video {
                    return Ok(Some(sender));
                }
            }
        }

        Ok(None)
    }

    /// Schließt die Verbindung (idempotent)
    pub async fn close(&self) {
        let pc = self.take_and_reset();
        if let Some(pc) = pc {
            if let Err(e) = pc.close().await {
                tracing::warn!("Failed to close peer connection: {}", e);
            }
        }
    }

    /// Synchroner Teardown-Pfad: Schließen wird in den Hintergrund gegeben
    pub fn close_detached(&self) {
        let pc = self.take_and_reset();
        if let Some(pc) = pc {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        let _ = pc.close().await;
                    });
                }
                Err(_) => {
                    // Kein Runtime mehr aktiv; die Verbindung wird mit dem
                    // letzten Arc freigegeben
                    tracing::debug!("Dropping peer connection without explicit close");
                }
            }
        }
    }

    // ========================================================================
    // PRIVATE METHODS
    // ========================================================================

    fn require_open(&self) -> Result<Arc<RTCPeerConnection>, PeerError> {
        self.pc.lock().clone().ok_or(PeerError::NotOpen)
    }

    fn take_and_reset(&self) -> Option<Arc<RTCPeerConnection>> {
        self.remote_ready.store(false, Ordering::SeqCst);
        self.offer_sent.store(false, Ordering::SeqCst);
        self.pending_candidates.lock().clear();
        self.pc.lock().take()
    }

    pub(crate) fn pending_candidate_count(&self) -> usize {
        self.pending_candidates.lock().len()
    }

    /// Wendet gepufferte Candidates in Eintreffreihenfolge an
    async fn flush_pending(&self, pc: &Arc<RTCPeerConnection>) {
        let pending: Vec<RTCIceCandidateInit> =
            std::mem::take(&mut *self.pending_candidates.lock());

        if pending.is_empty() {
            return;
        }

        tracing::debug!("Applying {} queued ICE candidate(s)", pending.len());
        for candidate in pending {
            if let Err(e) = pc.add_ice_candidate(candidate).await {
                tracing::warn!("Failed to add queued ICE candidate: {}", e);
            }
        }
    }

    /// Registriert die drei Beobachter der Verbindung
    fn register_handlers(&self, pc: &Arc<RTCPeerConnection>) {
        // Connection State Handler
        let event_tx = self.event_tx.clone();
        pc.on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
            tracing::info!("Peer connection state: {:?}", s);
            let _ = event_tx.send(PeerEvent::StateChanged(s));
            Box::pin(async {})
        }));

        // ICE Candidate Handler (Trickle: sofort weiterreichen, kein Batching)
        let event_tx = self.event_tx.clone();
        pc.on_ice_candidate(Box::new(move |candidate| {
            if let Some(c) = candidate {
                match c.to_json() {
                    Ok(init) => {
                        let _ = event_tx.send(PeerEvent::LocalCandidate(init));
                    }
                    Err(e) => {
                        tracing::warn!("Failed to serialize ICE candidate: {}", e);
                    }
                }
            }
            Box::pin(async {})
        }));

        // Track Handler (eingehende Medien der Gegenstelle)
        let event_tx = self.event_tx.clone();
        pc.on_track(Box::new(move |track, _, _| {
            let event_tx = event_tx.clone();
            Box::pin(async move {
                tracing::info!("Received remote track: {:?}", track.kind());
                let _ = event_tx.send(PeerEvent::RemoteTrack { track });
            })
        }));
    }
}

impl std::fmt::Debug for PeerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerConnection")
            .field("is_open", &self.is_open())
            .field("pending_candidates", &self.pending_candidate_count())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================
