//! Service Layer
//!
//! Network access and intent dispatch. The [`Backend`] trait is the exact
//! outbound HTTP contract; [`HttpBackend`] implements it with reqwest and
//! [`ActionBus`] translates intents into backend calls, store mutations and
//! reconciliation notices.
//!
//! ```text
//! presentation ──Intent──▶ ActionBus ──HTTP──▶ management API
//!      ▲                      │
//!      │                      ├── SharedStore (replace_all / replace_one)
//!      └──────Notice──────────┘
//! ```

mod api;
mod bus;

pub use api::*;
pub use bus::*;
