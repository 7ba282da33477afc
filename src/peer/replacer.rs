//! Track Replacer - Tausch des ausgehenden Video-Tracks ohne Neuverhandlung
//!
//! Beim Start der Bildschirmfreigabe wird der Kamera-Track geparkt (nicht
//! gestoppt) und der Display-Track auf dem Video-Sender installiert; beim
//! Stoppen läuft derselbe Pfad rückwärts und der Display-Track wird
//! freigegeben.

use super::connection::{PeerConnection, PeerError};
use crate::media::{LocalStream, LocalTrack};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug)]
pub enum ReplaceError {
    #[error("peer error: {0}")]
    Peer(#[from] PeerError),

    #[error("no outbound video sender on the connection")]
    NoVideoSender,

    #[error("WebRTC error: {0}")]
    WebRTC(String),
}

// ============================================================================
// TRACK REPLACER
// ============================================================================

/// Verwalter des ausgehenden Video-Slots während der Bildschirmfreigabe
///
/// `sharing` ist die einzige Autorität über den Freigabe-Zustand; es kippt
/// nur nach bestätigtem Tausch.
pub struct TrackReplacer {
    parked: Mutex<Option<Arc<LocalTrack>>>,
    sharing: AtomicBool,
}

impl TrackReplacer {
    pub fn new() -> Self {
        Self {
            parked: Mutex::new(None),
            sharing: AtomicBool::new(false),
        }
    }

    pub fn is_sharing(&self) -> bool {
        self.sharing.load(Ordering::SeqCst)
    }

    /// Installiert den Display-Track und parkt den Kamera-Track
    ///
    /// Bei bereits aktiver Freigabe ein No-op.
    pub async fn start(
        &self,
        peer: &PeerConnection,
        stream: &LocalStream,
        display: Arc<LocalTrack>,
    ) -> Result<(), ReplaceError> {
        if self.is_sharing() {
            return Ok(());
        }

        let displaced = Self::replace(peer, stream, display).await?;

        // Der Kamera-Track bleibt geparkt und wird beim Stoppen reinstalliert
        *self.parked.lock() = displaced;
        self.sharing.store(true, Ordering::SeqCst);

        tracing::info!("Screen sharing started");
        Ok(())
    }

    /// Reinstalliert den geparkten Kamera-Track und stoppt den Display-Track
    ///
    /// Ohne aktive Freigabe ein No-op.
    pub async fn stop(
        &self,
        peer: &PeerConnection,
        stream: &LocalStream,
    ) -> Result<(), ReplaceError> {
        if !self.is_sharing() {
            return Ok(());
        }

        let camera = match self.parked.lock().take() {
            Some(camera) => camera,
            None => {
                tracing::warn!("Screen sharing active without parked camera track");
                self.sharing.store(false, Ordering::SeqCst);
                return Ok(());
            }
        };

        match Self::replace(peer, stream, Arc::clone(&camera)).await {
            Ok(displaced) => {
                // Nur der verdrängte Display-Track wird gestoppt, nie die
                // reinstallierte Kamera
                if let Some(display) = displaced {
                    display.stop();
                }
                self.sharing.store(false, Ordering::SeqCst);
                tracing::info!("Screen sharing stopped");
                Ok(())
            }
            Err(e) => {
                // Stash wiederherstellen, damit ein weiterer Stopp-Versuch
                // möglich bleibt
                *self.parked.lock() = Some(camera);
                Err(e)
            }
        }
    }

    /// Teardown-Pfad: Stash freigeben und Freigabe-Zustand zurücksetzen
    pub fn reset(&self) {
        if let Some(camera) = self.parked.lock().take() {
            camera.stop();
        }
        self.sharing.store(false, Ordering::SeqCst);
    }

    // ========================================================================
    // PRIVATE METHODS
    // ========================================================================

    /// Tauscht den Track auf dem Video-Sender und im lokalen Stream
    async fn replace(
        peer: &PeerConnection,
        stream: &LocalStream,
        new: Arc<LocalTrack>,
    ) -> Result<Option<Arc<LocalTrack>>, ReplaceError> {
        let sender = peer
            .video_sender()
            .await?
            .ok_or(ReplaceError::NoVideoSender)?;

        sender
            .replace_track(Some(new.rtp()))
            .await
            .map_err(|e| ReplaceError::WebRTC(e.to_string()))?;

        // Erst nach erfolgreichem Sender-Tausch wird der Stream-Slot
        // umgehängt, damit Beobachter nie einen halben Zustand sehen
        Ok(stream.swap_video(new))
    }
}

impl Default for TrackReplacer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TrackReplacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackReplacer")
            .field("is_sharing", &self.is_sharing())
            .field("has_parked", &self.parked.lock().is_some())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================
