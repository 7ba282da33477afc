//! Connection State - geschlossener Zustandsraum der Verbindung
//!
//! Spiegelt die Zustandsmeldungen des Verbindungsadapters eins zu eins,
//! aber nur entlang der erlaubten Übergänge; `Closed` ist terminal und
//! akzeptiert keine weiteren Übergänge.

use serde::{Deserialize, Serialize};
use std::fmt;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;

/// Verbindungszustand eines Anrufs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionState {
    /// Ordnet eine Plattform-Meldung ein (`Unspecified` wird verworfen)
    pub fn from_platform(state: RTCPeerConnectionState) -> Option<Self> {
        match state {
            RTCPeerConnectionState::New => Some(Self::New),
            RTCPeerConnectionState::Connecting => Some(Self::Connecting),
            RTCPeerConnectionState::Connected => Some(Self::Connected),
            RTCPeerConnectionState::Disconnected => Some(Self::Disconnected),
            RTCPeerConnectionState::Failed => Some(Self::Failed),
            RTCPeerConnectionState::Closed => Some(Self::Closed),
            RTCPeerConnectionState::Unspecified => None,
        }
    }

    /// Prüft einen Übergang gegen die Übergangstabelle
    ///
    /// Gleiche Zustände sind kein Übergang und liefern `false`.
    pub fn can_transition(self, next: Self) -> bool {
        use ConnectionState::*;

        matches!(
            (self, next),
            (New, Connecting)
                | (New, Closed)
                | (Connecting, Connected)
                | (Connecting, Disconnected)
                | (Connecting, Failed)
                | (Connecting, Closed)
                | (Connected, Disconnected)
                | (Connected, Failed)
                | (Connected, Closed)
                | (Disconnected, Connected)
                | (Disconnected, Failed)
                | (Disconnected, Closed)
                | (Failed, Closed)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == Self::Closed
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::ConnectionState::*;
    use super::*;

    #[test]
    fn test_standard_call_path_is_legal() {
        assert!(New.can_transition(Connecting));
        assert!(Connecting.can_transition(Connected));
        assert!(Connected.can_transition(Disconnected));
        assert!(Disconnected.can_transition(Connected));
        assert!(Disconnected.can_transition(Failed));
    }

    #[test]
    fn test_every_state_may_close() {
        for state in [New, Connecting, Connected, Disconnected, Failed] {
            assert!(state.can_transition(Closed), "{} must close", state);
        }
    }

    #[test]
    fn test_closed_is_terminal() {
        for next in [New, Connecting, Connected, Disconnected, Failed, Closed] {
            assert!(!Closed.can_transition(next));
        }
    }

    #[test]
    fn test_connected_requires_connecting() {
        // Der direkte Sprung aus New nach Connected ist verboten
        assert!(!New.can_transition(Connected));
        assert!(!New.can_transition(Disconnected));
        assert!(!New.can_transition(Failed));
    }

    #[test]
    fn test_failed_only_closes() {
        assert!(!Failed.can_transition(Connected));
        assert!(!Failed.can_transition(Connecting));
        assert!(Failed.can_transition(Closed));
    }

    #[test]
    fn test_same_state_is_not_a_transition() {
        for state in [New, Connecting, Connected, Disconnected, Failed, Closed] {
            assert!(!state.can_transition(state));
        }
    }

    #[test]
    fn test_platform_mapping() {
        assert_eq!(
            ConnectionState::from_platform(RTCPeerConnectionState::Connected),
            Some(Connected)
        );
        assert_eq!(
            ConnectionState::from_platform(RTCPeerConnectionState::Unspecified),
            None
        );
    }

    #[test]
    fn test_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Connecting).unwrap(), "\"connecting\"");
    }
}
