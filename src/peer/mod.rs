//! Peer Module - Verbindungsadapter und Track-Tausch
//!
//! Dieses Modul verwaltet:
//! - Die gekapselte WebRTC Peer Connection (Offer/Answer, Candidates)
//! - Den Candidate-Puffer für verfrüht eintreffende Candidates
//! - Den Tausch des ausgehenden Video-Tracks (Bildschirmfreigabe)

mod connection;
mod replacer;

pub use connection::{default_ice_servers, PeerConnection, PeerError, PeerEvent};
pub use replacer::{ReplaceError, TrackReplacer};
