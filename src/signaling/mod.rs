//! Signaling Module - Nachrichtenvertrag zur Gegenstelle
//!
//! Dieses Modul verwaltet den Out-of-Band-Austausch der
//! Verhandlungsnachrichten:
//! - Die getaggte Nachrichten-Union (Offer, Answer, Candidate)
//! - Den Kanalvertrag mit drei Sendepunkten und einem Abonnement
//! - Ein In-Memory-Kanalpaar für Tests und lokale Verdrahtung
//!

mod channel;
mod memory;
mod messages;

pub use channel::{SignalingChannel, SignalingError};
pub use memory::InMemorySignaling;
pub use messages::SignalingMessage;
