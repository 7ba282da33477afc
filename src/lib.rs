//! Teleconsult - P2P Video Consultation Call Engine
//!
//! Sitzungsverwaltung für einen Zwei-Parteien-Videoanruf:
//! - Beschaffung lokaler Kamera/Mikrofon-Tracks über eine injizierte
//!   Plattform-Fähigkeit
//! - WebRTC Offer/Answer-Verhandlung mit getrickelten ICE-Candidates
//! - Validierter Verbindungszustandsautomat mit Snapshot und Events
//! - Bildschirmfreigabe per Track-Tausch ohne Neuverhandlung
//!
//! Der Signaling-Transport bleibt außen vor und wird als Kanalvertrag
//! injiziert; UI-Belange (Rendering, Terminplanung) liegen in der
//! konsumierenden Anwendung.

pub mod media;
pub mod peer;
pub mod session;
pub mod signaling;

pub use media::{
    AudioConstraints, DisplayConstraints, LocalStream, LocalTrack, MediaConstraints,
    MediaDevices, MediaError, RemoteStream, StaticMediaDevices, TrackKind, TrackSource,
    VideoConstraints,
};
pub use peer::{
    default_ice_servers, PeerConnection, PeerError, PeerEvent, ReplaceError, TrackReplacer,
};
pub use session::{
    CallError, CallSession, ConnectionState, SessionConfig, SessionEvent, SessionSnapshot,
};
pub use signaling::{InMemorySignaling, SignalingChannel, SignalingError, SignalingMessage};
