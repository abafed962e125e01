//! Management API Backend
//!
//! HTTP access to the canonical route family: the collection lives under
//! `/api/services`, single services under `/api/service/<name>` with
//! `/config` and `/running` subroutes for writes.

use crate::domain::{ConfigPatch, RunState, Service};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Outbound contract against the management API
///
/// Abstracted behind a trait so the action bus can be driven against an
/// in-memory backend in tests.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// GET the full service collection
    async fn fetch_all(&self) -> Result<Vec<Service>>;

    /// GET a single service by name
    async fn fetch_one(&self, name: &str) -> Result<Service>;

    /// POST a config write for one service
    async fn post_config(&self, name: &str, patch: &ConfigPatch) -> Result<()>;

    /// POST a run-state write for one service
    async fn post_running(&self, name: &str, running: bool) -> Result<()>;

    /// POST the full collection in one request
    async fn post_all(&self, services: &[Service]) -> Result<()>;

    /// DELETE a single service by name
    async fn delete(&self, name: &str) -> Result<()>;
}

/// Reqwest-backed implementation of [`Backend`]
#[derive(Clone, Debug)]
pub struct HttpBackend {
    http: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    /// Create a backend for the given base URL (e.g. `http://127.0.0.1:5000`)
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn collection_url(&self) -> String {
        format!("{}/api/services", self.base_url)
    }

    fn service_url(&self, name: &str) -> String {
        format!("{}/api/service/{}", self.base_url, name)
    }

    /// Map a 404 on a single-service route to [`Error::NotFound`]
    fn check_found(response: reqwest::Response, name: &str) -> Result<reqwest::Response> {
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::NotFound {
                name: name.to_string(),
            });
        }
        Ok(response.error_for_status()?)
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn fetch_all(&self) -> Result<Vec<Service>> {
        let body: Value = self
            .http
            .get(self.collection_url())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        normalize_collection(body)
    }

    async fn fetch_one(&self, name: &str) -> Result<Service> {
        let response = self.http.get(self.service_url(name)).send().await?;
        let service = Self::check_found(response, name)?.json().await?;
        Ok(service)
    }

    async fn post_config(&self, name: &str, patch: &ConfigPatch) -> Result<()> {
        let url = format!("{}/config", self.service_url(name));
        let response = self.http.post(url).json(patch).send().await?;
        Self::check_found(response, name)?;
        Ok(())
    }

    async fn post_running(&self, name: &str, running: bool) -> Result<()> {
        let url = format!("{}/running", self.service_url(name));
        let response = self
            .http
            .post(url)
            .json(&RunState { running })
            .send()
            .await?;
        Self::check_found(response, name)?;
        Ok(())
    }

    async fn post_all(&self, services: &[Service]) -> Result<()> {
        // The server consumes the collection keyed by name, each entry in
        // config-write body shape.
        let body: BTreeMap<&str, ConfigPatch> = services
            .iter()
            .map(|service| (service.name.as_str(), ConfigPatch::from(service)))
            .collect();
        self.http
            .post(self.collection_url())
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let response = self.http.delete(self.service_url(name)).send().await?;
        Self::check_found(response, name)?;
        Ok(())
    }
}

/// Normalize a collection response into an ordered service list
///
/// The server reports the collection either as an array or as an object
/// keyed by name; object entries are ordered by name for determinism.
fn normalize_collection(body: Value) -> Result<Vec<Service>> {
    match body {
        Value::Array(entries) => entries
            .into_iter()
            .map(|entry| Ok(serde_json::from_value(entry)?))
            .collect(),
        Value::Object(entries) => {
            let sorted: BTreeMap<String, Value> = entries.into_iter().collect();
            sorted
                .into_values()
                .map(|entry| Ok(serde_json::from_value(entry)?))
                .collect()
        }
        other => Err(Error::Invalid {
            message: format!("unexpected collection shape: {other}"),
        }),
    }
}
