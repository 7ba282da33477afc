//! Session Module - Sitzungsautomat und öffentliche Steuerfläche
//!
//! Dieses Modul verwaltet:
//! - Den Verbindungszustand mit validierter Übergangstabelle
//! - Die Steuerfläche des Anrufs (Aufbau, Toggles, Freigabe, Auflegen)
//! - Den Snapshot- und Event-Zugang für die Anwendung

mod call;
mod state;

pub use call::{CallError, CallSession, SessionConfig, SessionEvent, SessionSnapshot};
pub use state::ConnectionState;
