//! Domain - Service Documents
//!
//! Data shapes exchanged with the management API. The controller passes
//! `config` and `proxying` documents through unchanged; only `name` and
//! `running` carry meaning at this layer.

pub mod service;

pub use service::*;
