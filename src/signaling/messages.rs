//! Message Types für den Signaling-Austausch
//!
//! Die drei Nachrichtenarten des Offer/Answer-Flows als getaggte Union.
//! Jede Nachricht trägt wie im restlichen Protokoll einen
//! Millisekunden-Zeitstempel.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

/// Signaling-Nachricht zwischen den beiden Gesprächsteilnehmern
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalingMessage {
    /// SDP Offer der einleitenden Seite
    Offer {
        sdp: RTCSessionDescription,
        timestamp: i64,
    },

    /// SDP Answer der angerufenen Seite
    Answer {
        sdp: RTCSessionDescription,
        timestamp: i64,
    },

    /// Getrickelter ICE Candidate
    Candidate {
        candidate: RTCIceCandidateInit,
        timestamp: i64,
    },
}

impl SignalingMessage {
    pub fn offer(sdp: RTCSessionDescription) -> Self {
        Self::Offer {
            sdp,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    pub fn answer(sdp: RTCSessionDescription) -> Self {
        Self::Answer {
            sdp,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    pub fn candidate(candidate: RTCIceCandidateInit) -> Self {
        Self::Candidate {
            candidate,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            Self::Offer { timestamp, .. }
            | Self::Answer { timestamp, .. }
            | Self::Candidate { timestamp, .. } => *timestamp,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_message_round_trip() {
        let msg = SignalingMessage::candidate(RTCIceCandidateInit {
            candidate: "candidate:1 1 udp 2130706431 127.0.0.1 54321 typ host".to_owned(),
            ..Default::default()
        });

        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"candidate\""));

        let parsed: SignalingMessage = serde_json::from_str(&json).unwrap();
        match parsed {
            SignalingMessage::Candidate { candidate, .. } => {
                assert!(candidate.candidate.contains("typ host"));
            }
            _ => panic!("expected candidate message"),
        }
    }

    #[test]
    fn test_messages_carry_timestamps() {
        let msg = SignalingMessage::candidate(RTCIceCandidateInit::default());
        assert!(msg.timestamp() > 0);
    }
}
