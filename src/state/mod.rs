//! State - Shared Store
//!
//! Single authoritative in-memory snapshot of server-reported services,
//! plus the pending-operation counter driving the busy indicator.

pub mod store;

pub use store::*;
