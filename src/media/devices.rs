//! Media Devices - Beschaffung lokaler Aufnahme-Tracks
//!
//! Die Plattform wird als injizierte Fähigkeit modelliert: die Session
//! fordert Kamera/Mikrofon bzw. Bildschirmaufnahme an und bekommt fertige
//! lokale Tracks zurück. `StaticMediaDevices` ist die mitgelieferte
//! Anbindung auf Basis statischer RTP-Tracks.

use super::constraints::{DisplayConstraints, MediaConstraints};
use super::track::{LocalStream, LocalTrack, TrackKind, TrackSource};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("camera or microphone access denied")]
    PermissionDenied,

    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("display capture not supported: {0}")]
    CaptureUnsupported(String),
}

// ============================================================================
// ACQUISITION RESULTS
// ============================================================================

/// Ergebnis der Kamera/Mikrofon-Beschaffung
pub struct UserMedia {
    pub stream_id: String,
    pub audio: Arc<LocalTrack>,
    pub video: Arc<LocalTrack>,
}

impl UserMedia {
    /// Bündelt die Tracks zum lokalen Medienzustand der Session
    pub fn into_stream(self) -> LocalStream {
        LocalStream::new(self.stream_id, self.audio, self.video)
    }
}

/// Ergebnis der Bildschirmaufnahme-Beschaffung
///
/// Video ist Pflicht, Audio darf fehlen.
pub struct DisplayMedia {
    pub video: Arc<LocalTrack>,
    pub audio: Option<Arc<LocalTrack>>,
}

// ============================================================================
// MEDIA DEVICES TRAIT
// ============================================================================

/// Zugriff auf die Aufnahme-Hardware der Plattform
///
/// Beide Operationen öffnen Aufnahmeressourcen; die zurückgegebenen Tracks
/// müssen beim Beenden des Anrufs über `stop()` freigegeben werden.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Fordert einen Audio- und einen Video-Track an
    async fn acquire_user_media(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<UserMedia, MediaError>;

    /// Fordert einen Bildschirmaufnahme-Track an
    async fn acquire_display_media(
        &self,
        constraints: &DisplayConstraints,
    ) -> Result<DisplayMedia, MediaError>;
}

// ============================================================================
// STATIC MEDIA DEVICES
// ============================================================================

/// Plattform-Anbindung über statische RTP-Tracks
///
/// Erteilt jede Anfrage; die Anwendung speist die Frames selbst in die
/// RTP-Tracks ein. Für Tests und Umgebungen ohne echte Gerätefreigabe.
#[derive(Debug, Default)]
pub struct StaticMediaDevices;

#[async_trait]
impl MediaDevices for StaticMediaDevices {
    async fn acquire_user_media(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<UserMedia, MediaError> {
        let stream_id = Uuid::new_v4().to_string();

        tracing::debug!(
            "Acquiring user media: {}x{}, echo_cancellation={}",
            constraints.video.width,
            constraints.video.height,
            constraints.audio.echo_cancellation
        );

        Ok(UserMedia {
            audio: LocalTrack::new(TrackKind::Audio, TrackSource::Microphone, &stream_id),
            video: LocalTrack::new(TrackKind::Video, TrackSource::Camera, &stream_id),
            stream_id,
        })
    }

    async fn acquire_display_media(
        &self,
        constraints: &DisplayConstraints,
    ) -> Result<DisplayMedia, MediaError> {
        let stream_id = Uuid::new_v4().to_string();

        tracing::debug!("Acquiring display media, with_audio={}", constraints.with_audio);

        Ok(DisplayMedia {
            video: LocalTrack::new(TrackKind::Video, TrackSource::Display, &stream_id),
            audio: None,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_user_media_tracks_share_stream_id() {
        let devices = StaticMediaDevices;
        let media = devices
            .acquire_user_media(&MediaConstraints::default())
            .await
            .unwrap();

        assert_eq!(media.audio.kind(), TrackKind::Audio);
        assert_eq!(media.video.kind(), TrackKind::Video);
        assert_eq!(media.audio.source(), TrackSource::Microphone);
        assert_eq!(media.video.source(), TrackSource::Camera);

        let stream = media.into_stream();
        assert_eq!(stream.tracks().len(), 2);
    }

    #[tokio::test]
    async fn test_display_media_is_video_only() {
        let devices = StaticMediaDevices;
        let media = devices
            .acquire_display_media(&DisplayConstraints::default())
            .await
            .unwrap();

        assert_eq!(media.video.source(), TrackSource::Display);
        assert!(media.audio.is_none());
    }
}
