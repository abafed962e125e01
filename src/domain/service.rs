//! Service documents as reported by the management API.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A managed proxy service as the server reports it
///
/// `name` is the unique, immutable identifier. `config` and `proxying` are
/// opaque documents owned by the server; the controller never inspects them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Service {
    /// Unique service name (key in all single-service routes)
    pub name: String,
    /// Opaque configuration document
    pub config: Value,
    /// Handler selecting the service behavior
    pub handler: String,
    /// Opaque proxying document, absent for non-proxying services
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxying: Option<Value>,
    /// Whether the service is currently running
    #[serde(default)]
    pub running: bool,
}

impl Service {
    /// Create a service with the given name and handler and an empty config
    pub fn new(name: impl Into<String>, handler: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: Value::Null,
            handler: handler.into(),
            proxying: None,
            running: false,
        }
    }
}

/// The field subset a single-service GET is guaranteed to carry
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServiceDetail {
    /// Opaque configuration document
    pub config: Value,
    /// Handler selecting the service behavior
    pub handler: String,
    /// Opaque proxying document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxying: Option<Value>,
}

impl From<Service> for ServiceDetail {
    fn from(service: Service) -> Self {
        Self {
            config: service.config,
            handler: service.handler,
            proxying: service.proxying,
        }
    }
}

/// Body of a config write: exactly `{config, handler}`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfigPatch {
    /// Opaque configuration document
    pub config: Value,
    /// Handler selecting the service behavior
    pub handler: String,
}

impl From<&Service> for ConfigPatch {
    fn from(service: &Service) -> Self {
        Self {
            config: service.config.clone(),
            handler: service.handler.clone(),
        }
    }
}

/// Body of a run-state write: exactly `{running}`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    /// Desired running state
    pub running: bool,
}
