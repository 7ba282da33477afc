//! Signaling Channel - Vertrag zum Transport der Verhandlungsnachrichten
//!
//! Der Transport selbst (Message-Bus, Raum-Server, manuelles Durchreichen)
//! liegt außerhalb dieses Crates; verlangt wird nur mindestens-einmalige,
//! reihenfolgetreue Zustellung pro Nachrichtenart.

use super::messages::SignalingMessage;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug, Clone)]
pub enum SignalingError {
    #[error("signaling channel closed")]
    Closed,

    #[error("failed to send message: {0}")]
    SendFailed(String),
}

// ============================================================================
// SIGNALING CHANNEL TRAIT
// ============================================================================

/// Nachrichtenkanal zur Gegenstelle
///
/// Drei ausgehende Sendepunkte und ein eingehendes Abonnement; mehr sieht
/// die Session vom Transport nicht.
#[async_trait]
pub trait SignalingChannel: Send + Sync {
    /// Sendet das lokale Offer an die Gegenstelle
    async fn send_offer(&self, sdp: RTCSessionDescription) -> Result<(), SignalingError>;

    /// Sendet das lokale Answer an die Gegenstelle
    async fn send_answer(&self, sdp: RTCSessionDescription) -> Result<(), SignalingError>;

    /// Sendet einen lokal entdeckten ICE Candidate an die Gegenstelle
    async fn send_candidate(&self, candidate: RTCIceCandidateInit)
        -> Result<(), SignalingError>;

    /// Gibt einen Receiver für eingehende Nachrichten zurück
    fn subscribe(&self) -> broadcast::Receiver<SignalingMessage>;
}
