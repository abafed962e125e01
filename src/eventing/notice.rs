//! Notice - Outbound Events to the Presentation Layer
//!
//! Broadcast after the shared store has changed (or an operation needs
//! user-visible feedback). Listeners re-read the store; notices carry no
//! collection data of their own.

use crate::domain::ServiceDetail;

/// Events broadcast by the action bus
#[derive(Clone, Debug, PartialEq)]
pub enum Notice {
    /// The collection was replaced after a `load-services` reconciliation
    LoadedServices,

    /// Detail fields for one service arrived (editor views)
    Loaded {
        /// Service name the detail belongs to
        name: String,
        /// Config, handler and proxying documents from the server
        detail: ServiceDetail,
    },

    /// The collection was replaced after a `reload-all` reconciliation
    ReloadAllDone,

    /// A single-service reload failed; the presentation should fall back
    /// to its default view
    NavigateHome,

    /// A handler failed; the store was left untouched by the failure
    OperationFailed {
        /// Label of the failing intent
        intent: &'static str,
        /// Human-readable error description
        message: String,
    },
}
