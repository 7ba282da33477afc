//! In-Memory Signaling - Kanalpaar für Tests und lokale Verdrahtung
//!
//! Zwei kreuzweise verbundene Endpunkte im selben Prozess. Über die
//! Fehler-Schalter lässt sich eine unkooperative Gegenstelle nachstellen:
//! Candidates verwerfen oder Nachrichten zurückhalten und erst später
//! gesammelt zustellen (Umordnung gegenüber dem Offer/Answer-Fluss).

use super::channel::{SignalingChannel, SignalingError};
use super::messages::SignalingMessage;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

/// Kanalkapazität pro Richtung
const CHANNEL_CAPACITY: usize = 256;

/// Ein Endpunkt eines In-Memory-Signaling-Paars
pub struct InMemorySignaling {
    outbound: broadcast::Sender<SignalingMessage>,
    inbound: broadcast::Sender<SignalingMessage>,
    drop_candidates: AtomicBool,
    held: Mutex<Option<Vec<SignalingMessage>>>,
}

impl InMemorySignaling {
    /// Erstellt zwei kreuzweise verbundene Endpunkte
    pub fn pair() -> (Arc<Self>, Arc<Self>) {
        let (a_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (b_tx, _) = broadcast::channel(CHANNEL_CAPACITY);

        let a = Arc::new(Self {
            outbound: a_tx.clone(),
            inbound: b_tx.clone(),
            drop_candidates: AtomicBool::new(false),
            held: Mutex::new(None),
        });
        let b = Arc::new(Self {
            outbound: b_tx,
            inbound: a_tx,
            drop_candidates: AtomicBool::new(false),
            held: Mutex::new(None),
        });

        (a, b)
    }

    /// Verwirft ausgehende Candidates (unkooperative Gegenstelle)
    pub fn set_drop_candidates(&self, drop: bool) {
        self.drop_candidates.store(drop, Ordering::SeqCst);
    }

    /// Hält ausgehende Nachrichten zurück, bis `release` gerufen wird
    pub fn hold(&self) {
        let mut held = self.held.lock();
        if held.is_none() {
            *held = Some(Vec::new());
        }
    }

    /// Stellt alle zurückgehaltenen Nachrichten in Originalreihenfolge zu
    pub fn release(&self) {
        let buffered = self.held.lock().take();
        if let Some(buffered) = buffered {
            tracing::debug!("Releasing {} held signaling message(s)", buffered.len());
            for msg in buffered {
                let _ = self.outbound.send(msg);
            }
        }
    }

    fn dispatch(&self, msg: SignalingMessage) -> Result<(), SignalingError> {
        if matches!(msg, SignalingMessage::Candidate { .. })
            && self.drop_candidates.load(Ordering::SeqCst)
        {
            tracing::debug!("Dropping candidate message (fault injection)");
            return Ok(());
        }

        if let Some(buffered) = self.held.lock().as_mut() {
            buffered.push(msg);
            return Ok(());
        }

        // Ohne Abonnenten verpufft die Nachricht; das ist im
        // In-Memory-Kanal kein Fehler
        let _ = self.outbound.send(msg);
        Ok(())
    }
}

#[async_trait]
impl SignalingChannel for InMemorySignaling {
    async fn send_offer(&self, sdp: RTCSessionDescription) -> Result<(), SignalingError> {
        self.dispatch(SignalingMessage::offer(sdp))
    }

    async fn send_answer(&self, sdp: RTCSessionDescription) -> Result<(), SignalingError> {
        self.dispatch(SignalingMessage::answer(sdp))
    }

    async fn send_candidate(
        &self,
        candidate: RTCIceCandidateInit,
    ) -> Result<(), SignalingError> {
        self.dispatch(SignalingMessage::candidate(candidate))
    }

    fn subscribe(&self) -> broadcast::Receiver<SignalingMessage> {
        self.inbound.subscribe()
    }
}

impl std::fmt::Debug for InMemorySignaling {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemorySignaling")
            .field("drop_candidates", &self.drop_candidates.load(Ordering::SeqCst))
            .field("holding", &self.held.lock().is_some())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(n: u16) -> RTCIceCandidateInit {
        RTCIceCandidateInit {
            candidate: format!("candidate:1 1 udp 2130706431 127.0.0.1 {} typ host", n),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_pair_delivers_cross_wise() {
        let (a, b) = InMemorySignaling::pair();
        let mut b_rx = b.subscribe();

        a.send_candidate(candidate(1000)).await.unwrap();

        match b_rx.recv().await.unwrap() {
            SignalingMessage::Candidate { candidate, .. } => {
                assert!(candidate.candidate.contains("1000"));
            }
            _ => panic!("expected candidate"),
        }
    }

    #[tokio::test]
    async fn test_drop_candidates_swallows_only_candidates() {
        let (a, b) = InMemorySignaling::pair();
        let mut b_rx = b.subscribe();
        a.set_drop_candidates(true);

        a.send_candidate(candidate(2000)).await.unwrap();
        assert!(matches!(
            b_rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_hold_and_release_preserves_order() {
        let (a, b) = InMemorySignaling::pair();
        let mut b_rx = b.subscribe();

        a.hold();
        a.send_candidate(candidate(3000)).await.unwrap();
        a.send_candidate(candidate(3001)).await.unwrap();
        assert!(matches!(
            b_rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));

        a.release();
        let first = b_rx.recv().await.unwrap();
        let second = b_rx.recv().await.unwrap();
        assert!(matches!(first, SignalingMessage::Candidate { candidate, .. } if candidate.candidate.contains("3000")));
        assert!(matches!(second, SignalingMessage::Candidate { candidate, .. } if candidate.candidate.contains("3001")));
    }
}
