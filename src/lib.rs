//! Portcullis Console Library
//!
//! Headless controller that keeps a local, in-memory view of portcullis
//! services synchronized with the management API. Presentation layers emit
//! [`eventing::Intent`] values onto the [`services::ActionBus`], read the
//! [`state::SharedStore`] when an [`eventing::Notice`] arrives, and never
//! call the network layer directly.

pub mod config;
pub mod domain;
pub mod error;
pub mod eventing;
pub mod services;
pub mod state;
