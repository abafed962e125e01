//! Action Bus
//!
//! Translates intents into network operations, store mutations and
//! reconciliation notices. Every mutating intent reconciles by re-fetching
//! authoritative state from the server instead of applying the caller's
//! optimistic payload; the store therefore never holds a partial overlay.
//!
//! Each network-touching handler holds an operation guard for its whole
//! lifetime, so the pending counter drains to zero on success, failure and
//! cancellation alike.

use crate::domain::{ConfigPatch, Service};
use crate::error::{Error, Result};
use crate::eventing::{Intent, Notice};
use crate::services::Backend;
use crate::state::SharedStore;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

/// Capacity of the outbound notice channel
const NOTICE_CHANNEL_CAPACITY: usize = 64;

/// Intent dispatcher wired to a store and a backend
///
/// Cheap to clone; clones share the store, the backend and both channels.
/// The presentation layer keeps a clone for [`emit`](ActionBus::emit) and
/// [`subscribe`](ActionBus::subscribe) while [`run`](ActionBus::run)
/// consumes the intent queue.
pub struct ActionBus<B> {
    store: SharedStore,
    backend: Arc<B>,
    intents: mpsc::UnboundedSender<Intent>,
    notices: broadcast::Sender<Notice>,
}

impl<B: Backend> ActionBus<B> {
    /// Create a bus over the given store and backend
    ///
    /// Returns the bus together with the receiving end of the intent queue,
    /// to be passed to [`run`](ActionBus::run).
    pub fn new(store: SharedStore, backend: B) -> (Self, mpsc::UnboundedReceiver<Intent>) {
        let (intents, rx) = mpsc::unbounded_channel();
        let (notices, _) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);
        (
            Self {
                store,
                backend: Arc::new(backend),
                intents,
                notices,
            },
            rx,
        )
    }

    /// The shared store this bus mutates
    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Subscribe to outbound notices
    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    /// Enqueue an intent for dispatch
    pub fn emit(&self, intent: Intent) -> Result<()> {
        self.intents
            .send(intent)
            .map_err(|err| Error::ChannelSend {
                message: err.to_string(),
            })
    }

    /// Consume the intent queue, spawning one task per intent
    ///
    /// Operations from different intents run concurrently; there is no
    /// cross-intent ordering guarantee. Failures are logged and surfaced as
    /// [`Notice::OperationFailed`].
    pub async fn run(self, mut rx: mpsc::UnboundedReceiver<Intent>) {
        while let Some(intent) = rx.recv().await {
            let bus = self.clone();
            tokio::spawn(async move {
                let label = intent.label();
                if let Err(err) = bus.dispatch(intent).await {
                    tracing::warn!("{label} failed: {err}");
                    bus.notify(Notice::OperationFailed {
                        intent: label,
                        message: err.to_string(),
                    });
                }
            });
        }
    }

    /// Handle a single intent
    ///
    /// Exactly one handler exists per variant; follow-up reconciliation
    /// travels back through the intent queue.
    pub async fn dispatch(&self, intent: Intent) -> Result<()> {
        tracing::debug!("dispatching {}", intent.label());
        match intent {
            Intent::LoadServices => self.load_services().await,
            Intent::LoadService { name } => self.load_service(name).await,
            Intent::UpdateService(service) => self.update_service(service).await,
            Intent::UpdateServices(services) => self.update_services(services).await,
            Intent::DeleteService { name } => self.delete_service(name).await,
            Intent::ReloadService { name } => self.reload_service(name).await,
            Intent::ReloadAll => self.reload_all().await,
            Intent::PatchService { name } => self.patch_service(name).await,
            Intent::StartStopService { name, running } => {
                self.start_stop_service(name, running).await
            }
            Intent::PatchAll(services) => self.patch_all(services).await,
        }
    }

    fn notify(&self, notice: Notice) {
        // No subscribers is fine; notices are fire-and-forget.
        let _ = self.notices.send(notice);
    }

    // ==================== Handlers ====================

    async fn load_services(&self) -> Result<()> {
        let _op = self.store.operation();
        let services = self.backend.fetch_all().await?;
        tracing::debug!(count = services.len(), "collection reconciled");
        self.store.replace_all(services);
        self.notify(Notice::LoadedServices);
        Ok(())
    }

    async fn load_service(&self, name: String) -> Result<()> {
        let _op = self.store.operation();
        let service = self.backend.fetch_one(&name).await?;
        self.notify(Notice::Loaded {
            name,
            detail: service.into(),
        });
        Ok(())
    }

    async fn update_service(&self, service: Service) -> Result<()> {
        let _op = self.store.operation();
        let patch = ConfigPatch::from(&service);
        self.backend.post_config(&service.name, &patch).await
    }

    /// Fan out one config write per service and wait for all of them
    ///
    /// The batch counts as a single pending operation. If any write is
    /// rejected the aggregate fails and no reconciliation is emitted; writes
    /// that already reached the server stand until the next full reload.
    async fn update_services(&self, services: Vec<Service>) -> Result<()> {
        let total = services.len();
        let _op = self.store.operation();
        let writes = services.iter().map(|service| {
            let backend = Arc::clone(&self.backend);
            let name = service.name.clone();
            let patch = ConfigPatch::from(service);
            async move { backend.post_config(&name, &patch).await }
        });
        let failed = join_all(writes)
            .await
            .into_iter()
            .filter(Result::is_err)
            .count();
        if failed > 0 {
            return Err(Error::Batch { failed, total });
        }
        self.emit(Intent::LoadServices)
    }

    async fn delete_service(&self, name: String) -> Result<()> {
        let _op = self.store.operation();
        self.backend.delete(&name).await?;
        tracing::info!("deleted service {name}");
        self.emit(Intent::ReloadAll)
    }

    /// Re-fetch one service; on failure fall back to the default view
    async fn reload_service(&self, name: String) -> Result<()> {
        let _op = self.store.operation();
        match self.backend.fetch_one(&name).await {
            Ok(service) => {
                self.store.replace_one(&name, service);
                Ok(())
            }
            Err(err) => {
                tracing::warn!("reload of {name} failed: {err}");
                self.notify(Notice::NavigateHome);
                Err(err)
            }
        }
    }

    async fn reload_all(&self) -> Result<()> {
        let _op = self.store.operation();
        let services = self.backend.fetch_all().await?;
        self.store.replace_all(services);
        self.notify(Notice::ReloadAllDone);
        Ok(())
    }

    /// Push the current local config for `name`, then reconcile
    async fn patch_service(&self, name: String) -> Result<()> {
        let _op = self.store.operation();
        let service = self.store.lookup(&name).ok_or_else(|| Error::NotFound {
            name: name.clone(),
        })?;
        self.backend
            .post_config(&name, &ConfigPatch::from(&service))
            .await?;
        self.emit(Intent::ReloadAll)
    }

    async fn start_stop_service(&self, name: String, running: bool) -> Result<()> {
        let _op = self.store.operation();
        self.backend.post_running(&name, running).await?;
        self.emit(Intent::ReloadService { name })
    }

    async fn patch_all(&self, services: Vec<Service>) -> Result<()> {
        let _op = self.store.operation();
        self.backend.post_all(&services).await?;
        self.emit(Intent::ReloadAll)
    }
}

impl<B> Clone for ActionBus<B> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            backend: self.backend.clone(),
            intents: self.intents.clone(),
            notices: self.notices.clone(),
        }
    }
}

impl<B> std::fmt::Debug for ActionBus<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionBus")
            .field("pending", &self.store.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::broadcast::error::TryRecvError;

    fn svc(name: &str) -> Service {
        let mut service = Service::new(name, "http");
        service.config = json!({"for": name});
        service
    }

    fn lock<T>(lock: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
        lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// In-memory backend with injectable write failures
    #[derive(Default)]
    struct MockBackend {
        services: Mutex<Vec<Service>>,
        fail_config_for: Option<String>,
        calls: Mutex<Vec<String>>,
    }

    impl MockBackend {
        fn seeded(services: Vec<Service>) -> Self {
            Self {
                services: Mutex::new(services),
                ..Default::default()
            }
        }

        fn record(&self, call: impl Into<String>) {
            lock(&self.calls).push(call.into());
        }

        fn calls(&self) -> Vec<String> {
            lock(&self.calls).clone()
        }
    }

    #[async_trait]
    impl Backend for MockBackend {
        async fn fetch_all(&self) -> Result<Vec<Service>> {
            self.record("fetch_all");
            Ok(lock(&self.services).clone())
        }

        async fn fetch_one(&self, name: &str) -> Result<Service> {
            self.record(format!("fetch_one {name}"));
            lock(&self.services)
                .iter()
                .find(|s| s.name == name)
                .cloned()
                .ok_or_else(|| Error::NotFound {
                    name: name.to_string(),
                })
        }

        async fn post_config(&self, name: &str, patch: &ConfigPatch) -> Result<()> {
            self.record(format!("post_config {name}"));
            if self.fail_config_for.as_deref() == Some(name) {
                return Err(Error::Invalid {
                    message: format!("write rejected for {name}"),
                });
            }
            let mut services = lock(&self.services);
            match services.iter_mut().find(|s| s.name == name) {
                Some(existing) => {
                    existing.config = patch.config.clone();
                    existing.handler = patch.handler.clone();
                }
                None => {
                    let mut created = Service::new(name, patch.handler.clone());
                    created.config = patch.config.clone();
                    services.push(created);
                }
            }
            Ok(())
        }

        async fn post_running(&self, name: &str, running: bool) -> Result<()> {
            self.record(format!("post_running {name} {running}"));
            lock(&self.services)
                .iter_mut()
                .find(|s| s.name == name)
                .map(|s| s.running = running)
                .ok_or_else(|| Error::NotFound {
                    name: name.to_string(),
                })
        }

        async fn post_all(&self, services: &[Service]) -> Result<()> {
            self.record(format!("post_all {}", services.len()));
            for service in services {
                self.post_config(&service.name, &ConfigPatch::from(service))
                    .await?;
            }
            Ok(())
        }

        async fn delete(&self, name: &str) -> Result<()> {
            self.record(format!("delete {name}"));
            let mut services = lock(&self.services);
            let before = services.len();
            services.retain(|s| s.name != name);
            if services.len() == before {
                return Err(Error::NotFound {
                    name: name.to_string(),
                });
            }
            Ok(())
        }
    }

    fn bus_with(
        backend: MockBackend,
    ) -> (
        ActionBus<MockBackend>,
        mpsc::UnboundedReceiver<Intent>,
        broadcast::Receiver<Notice>,
    ) {
        let (bus, intents) = ActionBus::new(SharedStore::new(), backend);
        let notices = bus.subscribe();
        (bus, intents, notices)
    }

    #[tokio::test]
    async fn load_services_reconciles_and_notifies_once() {
        let (bus, _intents, mut notices) =
            bus_with(MockBackend::seeded(vec![svc("a"), svc("b")]));

        bus.dispatch(Intent::LoadServices).await.expect("dispatch");

        let names: Vec<_> = bus.store().services().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(notices.try_recv().expect("notice"), Notice::LoadedServices);
        assert!(matches!(notices.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(bus.store().pending(), 0);
    }

    #[tokio::test]
    async fn update_services_aggregate_failure_skips_reconciliation() {
        let mut backend = MockBackend::seeded(vec![svc("a"), svc("b"), svc("c")]);
        backend.fail_config_for = Some("b".to_string());
        let (bus, mut intents, _notices) = bus_with(backend);

        let result = bus
            .dispatch(Intent::UpdateServices(vec![svc("a"), svc("b"), svc("c")]))
            .await;

        match result {
            Err(Error::Batch { failed, total }) => {
                assert_eq!(failed, 1);
                assert_eq!(total, 3);
            }
            other => panic!("expected batch error, got {other:?}"),
        }
        // No LoadServices follow-up and no counter leak.
        assert!(intents.try_recv().is_err());
        assert_eq!(bus.store().pending(), 0);
    }

    #[tokio::test]
    async fn update_services_success_emits_full_reload() {
        let (bus, mut intents, _notices) =
            bus_with(MockBackend::seeded(vec![svc("a"), svc("b")]));

        bus.dispatch(Intent::UpdateServices(vec![svc("a"), svc("b")]))
            .await
            .expect("dispatch");

        assert_eq!(intents.try_recv().expect("follow-up"), Intent::LoadServices);
        assert_eq!(bus.store().pending(), 0);
    }

    #[tokio::test]
    async fn delete_reconciles_and_collection_omits_entry() {
        let (bus, mut intents, _notices) =
            bus_with(MockBackend::seeded(vec![svc("a"), svc("x")]));
        bus.dispatch(Intent::LoadServices).await.expect("seed load");

        bus.dispatch(Intent::DeleteService {
            name: "x".to_string(),
        })
        .await
        .expect("delete");

        let follow_up = intents.try_recv().expect("follow-up intent");
        assert_eq!(follow_up, Intent::ReloadAll);
        bus.dispatch(follow_up).await.expect("reconcile");

        assert!(bus.store().lookup("x").is_none());
        assert!(bus.store().lookup("a").is_some());
        assert_eq!(bus.store().pending(), 0);
    }

    #[tokio::test]
    async fn reload_missing_service_navigates_home_without_store_change() {
        let (bus, _intents, mut notices) = bus_with(MockBackend::seeded(vec![svc("a")]));
        bus.dispatch(Intent::LoadServices).await.expect("seed load");
        notices.try_recv().expect("seed notice");
        let before = bus.store().services();

        let result = bus
            .dispatch(Intent::ReloadService {
                name: "missing".to_string(),
            })
            .await;

        assert!(matches!(result, Err(Error::NotFound { .. })));
        assert_eq!(bus.store().services(), before);
        assert_eq!(notices.try_recv().expect("notice"), Notice::NavigateHome);
        assert_eq!(bus.store().pending(), 0);
    }

    #[tokio::test]
    async fn reload_service_replaces_single_entry() {
        let backend = MockBackend::seeded(vec![svc("a"), svc("b")]);
        let (bus, _intents, _notices) = bus_with(backend);
        bus.dispatch(Intent::LoadServices).await.expect("seed load");

        // Server-side change invisible to the store until reloaded.
        {
            let mut services = lock(&bus.backend.services);
            if let Some(s) = services.iter_mut().find(|s| s.name == "b") {
                s.running = true;
            }
        }
        assert!(!bus.store().lookup("b").expect("b").running);

        bus.dispatch(Intent::ReloadService {
            name: "b".to_string(),
        })
        .await
        .expect("reload");

        assert!(bus.store().lookup("b").expect("b").running);
        assert_eq!(bus.store().pending(), 0);
    }

    #[tokio::test]
    async fn patch_service_pushes_local_config_then_reconciles() {
        let (bus, mut intents, _notices) = bus_with(MockBackend::seeded(vec![svc("a")]));
        bus.dispatch(Intent::LoadServices).await.expect("seed load");

        bus.dispatch(Intent::PatchService {
            name: "a".to_string(),
        })
        .await
        .expect("patch");

        assert!(bus.backend.calls().contains(&"post_config a".to_string()));
        assert_eq!(intents.try_recv().expect("follow-up"), Intent::ReloadAll);
    }

    #[tokio::test]
    async fn patch_service_unknown_local_name_never_touches_network() {
        let (bus, _intents, _notices) = bus_with(MockBackend::default());

        let result = bus
            .dispatch(Intent::PatchService {
                name: "ghost".to_string(),
            })
            .await;

        assert!(matches!(result, Err(Error::NotFound { .. })));
        assert!(bus.backend.calls().is_empty());
        assert_eq!(bus.store().pending(), 0);
    }

    #[tokio::test]
    async fn start_stop_chains_into_single_reload() {
        let (bus, mut intents, _notices) = bus_with(MockBackend::seeded(vec![svc("a")]));
        bus.dispatch(Intent::LoadServices).await.expect("seed load");

        bus.dispatch(Intent::StartStopService {
            name: "a".to_string(),
            running: true,
        })
        .await
        .expect("startstop");

        let follow_up = intents.try_recv().expect("follow-up intent");
        assert_eq!(
            follow_up,
            Intent::ReloadService {
                name: "a".to_string()
            }
        );
        bus.dispatch(follow_up).await.expect("reconcile");
        assert!(bus.store().lookup("a").expect("a").running);
    }

    #[tokio::test]
    async fn load_service_emits_detail_without_store_change() {
        let mut detailed = svc("a");
        detailed.proxying = Some(json!({"active": true}));
        let (bus, _intents, mut notices) = bus_with(MockBackend::seeded(vec![detailed.clone()]));

        bus.dispatch(Intent::LoadService {
            name: "a".to_string(),
        })
        .await
        .expect("load");

        match notices.try_recv() {
            Ok(Notice::Loaded { name, detail }) => {
                assert_eq!(name, "a");
                assert_eq!(detail.config, detailed.config);
                assert_eq!(detail.proxying, detailed.proxying);
            }
            other => panic!("expected Loaded notice, got {other:?}"),
        }
        assert!(bus.store().is_empty());
        assert_eq!(bus.store().pending(), 0);
    }

    #[tokio::test]
    async fn update_service_emits_no_reconciliation() {
        let (bus, mut intents, mut notices) = bus_with(MockBackend::seeded(vec![svc("a")]));

        bus.dispatch(Intent::UpdateService(svc("a")))
            .await
            .expect("update");

        assert!(intents.try_recv().is_err());
        assert!(matches!(notices.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn patch_all_posts_collection_then_reconciles() {
        let (bus, mut intents, _notices) = bus_with(MockBackend::default());

        bus.dispatch(Intent::PatchAll(vec![svc("a"), svc("b")]))
            .await
            .expect("patch all");

        assert!(bus.backend.calls().contains(&"post_all 2".to_string()));
        assert_eq!(intents.try_recv().expect("follow-up"), Intent::ReloadAll);
    }

    #[tokio::test]
    async fn run_loop_drives_emitted_intents_to_settlement() {
        let (bus, intents) = ActionBus::new(
            SharedStore::new(),
            MockBackend::seeded(vec![svc("a"), svc("b")]),
        );
        let mut notices = bus.subscribe();
        let handle = bus.clone();
        tokio::spawn(bus.run(intents));

        handle.emit(Intent::LoadServices).expect("emit");

        let notice = tokio::time::timeout(Duration::from_secs(5), notices.recv())
            .await
            .expect("notice in time")
            .expect("channel open");
        assert_eq!(notice, Notice::LoadedServices);
        assert_eq!(handle.store().len(), 2);
        assert_eq!(handle.store().pending(), 0);
    }

    #[tokio::test]
    async fn run_loop_reports_failures_as_notices() {
        let (bus, intents) = ActionBus::new(SharedStore::new(), MockBackend::default());
        let mut notices = bus.subscribe();
        let handle = bus.clone();
        tokio::spawn(bus.run(intents));

        handle
            .emit(Intent::DeleteService {
                name: "ghost".to_string(),
            })
            .expect("emit");

        let notice = tokio::time::timeout(Duration::from_secs(5), notices.recv())
            .await
            .expect("notice in time")
            .expect("channel open");
        match notice {
            Notice::OperationFailed { intent, .. } => assert_eq!(intent, "delete-service"),
            other => panic!("expected failure notice, got {other:?}"),
        }
        assert_eq!(handle.store().pending(), 0);
    }
}
