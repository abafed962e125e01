//! Eventing - Intents and Notices
//!
//! All coupling between the presentation layer and the network layer goes
//! through these two enums: presentation emits [`Intent`] values onto the
//! action bus and re-reads the shared store when a [`Notice`] arrives.

pub mod intent;
pub mod notice;

pub use intent::*;
pub use notice::*;
