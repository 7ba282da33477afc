//! Media Constraints - Aufnahmeparameter für Kamera und Mikrofon
//!
//! Die Werte entsprechen den Vorgaben der Gegenstelle im Konsultations-Flow:
//! 720p-Video und ein Sprach-Audioprofil mit aktiver Signalaufbereitung.

use serde::{Deserialize, Serialize};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Ziel-Breite des Kamerabilds
pub const DEFAULT_VIDEO_WIDTH: u32 = 1280;

/// Ziel-Höhe des Kamerabilds
pub const DEFAULT_VIDEO_HEIGHT: u32 = 720;

// ============================================================================
// CONSTRAINT TYPES
// ============================================================================

/// Audio-Aufnahmeparameter (Sprachprofil)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl Default for AudioConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

/// Video-Aufnahmeparameter (feste Zielauflösung)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoConstraints {
    pub width: u32,
    pub height: u32,
}

impl Default for VideoConstraints {
    fn default() -> Self {
        Self {
            width: DEFAULT_VIDEO_WIDTH,
            height: DEFAULT_VIDEO_HEIGHT,
        }
    }
}

/// Aufnahmeparameter für die lokale Medienbeschaffung
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaConstraints {
    pub audio: AudioConstraints,
    pub video: VideoConstraints,
}

/// Aufnahmeparameter für Bildschirmfreigabe
///
/// Video ist immer Pflicht; Audio wird angefragt, darf aber von der
/// Plattform verweigert werden.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayConstraints {
    pub with_audio: bool,
}

impl Default for DisplayConstraints {
    fn default() -> Self {
        Self { with_audio: true }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_audio_profile() {
        let audio = AudioConstraints::default();

        // Alle drei Aufbereitungsstufen sind im Sprachprofil aktiv
        assert!(audio.echo_cancellation);
        assert!(audio.noise_suppression);
        assert!(audio.auto_gain_control);
    }

    #[test]
    fn test_default_video_resolution() {
        let video = VideoConstraints::default();

        assert_eq!(video.width, 1280);
        assert_eq!(video.height, 720);
    }
}
