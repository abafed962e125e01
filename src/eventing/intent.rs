//! Intent - Closed Set of Presentation Requests
//!
//! A tagged union replaces string-keyed handler registration: exactly one
//! handler exists per variant, so a single user action can never fan out to
//! duplicate network requests.

use crate::domain::Service;

/// A named request from the presentation layer
///
/// Every variant maps to one network operation against the canonical
/// `/api/service/...` route family (collection routes under
/// `/api/services`). Mutating intents reconcile by re-fetching from the
/// server; the optimistic local payload is never applied to the store.
#[derive(Clone, Debug, PartialEq)]
pub enum Intent {
    /// Fetch the full collection and replace the store wholesale
    LoadServices,

    /// Fetch one service's detail fields for an editor view
    ///
    /// Leaves the store collection untouched; the result travels in a
    /// [`Notice::Loaded`](crate::eventing::Notice::Loaded).
    LoadService { name: String },

    /// Write the given service's config and handler to the server
    ///
    /// No reconciliation follows; callers that need fresh state chain a
    /// reload themselves.
    UpdateService(Service),

    /// Write several services concurrently and, once **all** writes have
    /// settled successfully, reconcile with a full reload
    UpdateServices(Vec<Service>),

    /// Delete a service, then reconcile with a full reload
    DeleteService { name: String },

    /// Re-fetch one service and replace its store entry
    ReloadService { name: String },

    /// Re-fetch the full collection and replace the store wholesale
    ReloadAll,

    /// Push the **current local** config and handler for `name` to the
    /// server, then reconcile with a full reload
    PatchService { name: String },

    /// Set the run state of a service, then reconcile that one entry
    StartStopService { name: String, running: bool },

    /// Push the whole collection to the server, then reconcile with a
    /// full reload
    PatchAll(Vec<Service>),
}

impl Intent {
    /// Stable label for logging and failure notices
    pub fn label(&self) -> &'static str {
        match self {
            Intent::LoadServices => "load-services",
            Intent::LoadService { .. } => "load-service",
            Intent::UpdateService(_) => "update-service",
            Intent::UpdateServices(_) => "update-services",
            Intent::DeleteService { .. } => "delete-service",
            Intent::ReloadService { .. } => "reload-service",
            Intent::ReloadAll => "reload-all",
            Intent::PatchService { .. } => "patch-service",
            Intent::StartStopService { .. } => "startstop-service",
            Intent::PatchAll(_) => "patch-all",
        }
    }
}
