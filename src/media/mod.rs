//! Media Module - lokale Medienbeschaffung und Track-Modell
//!
//! Dieses Modul verwaltet:
//! - Aufnahmeparameter (Auflösung, Audio-Aufbereitung)
//! - Lokale Tracks und deren Enabled/Stopped-Zustand
//! - Den gebündelten lokalen und entfernten Medienzustand
//! - Die injizierte Plattform-Fähigkeit zur Gerätebeschaffung

mod constraints;
mod devices;
mod track;

pub use constraints::{
    AudioConstraints, DisplayConstraints, MediaConstraints, VideoConstraints,
    DEFAULT_VIDEO_HEIGHT, DEFAULT_VIDEO_WIDTH,
};
pub use devices::{DisplayMedia, MediaDevices, MediaError, StaticMediaDevices, UserMedia};
pub use track::{LocalStream, LocalTrack, RemoteStream, TrackKind, TrackSource};
