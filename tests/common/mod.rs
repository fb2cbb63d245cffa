//! Common test utilities
//!
//! In-memory fakes standing in for the Kubernetes API, Azure Resource
//! Manager and the real controllers.

#![allow(dead_code, reason = "Each test binary uses a different subset of helpers")]

use async_trait::async_trait;
use restic_node_agent::crd::{BackupStorageLocation, BackupStorageLocationSpec};
use restic_node_agent::provider::{
    LocationLookup, LookupError, Provision, ProvisionError, RepositoryEnvironment,
    StorageKeyResolver,
};
use restic_node_agent::runtime::{Lifecycle, LifecycleState, TaskRegistry, Workload};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use zeroize::Zeroizing;

pub const NAMESPACE: &str = "heptio-ark";

/// Shared, ordered record of what happened during a test
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn position(&self, event: &str) -> Option<usize> {
        self.events().iter().position(|e| e == event)
    }
}

pub fn location(name: &str, provider: &str, config: &[(&str, &str)]) -> BackupStorageLocation {
    let mut location = BackupStorageLocation::new(
        name,
        BackupStorageLocationSpec {
            provider: provider.to_string(),
            object_storage: None,
            config: config
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect::<BTreeMap<_, _>>(),
        },
    );
    location.metadata.namespace = Some(NAMESPACE.to_string());
    location
}

/// Location lookup backed by a map, or failing every call
#[derive(Debug, Default)]
pub struct FakeLocations {
    locations: HashMap<String, BackupStorageLocation>,
    unavailable: bool,
}

impl FakeLocations {
    pub fn with(locations: impl IntoIterator<Item = BackupStorageLocation>) -> Self {
        Self {
            locations: locations
                .into_iter()
                .map(|location| (location.metadata.name.clone().unwrap_or_default(), location))
                .collect(),
            unavailable: false,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            locations: HashMap::new(),
            unavailable: true,
        }
    }
}

#[async_trait]
impl LocationLookup for FakeLocations {
    async fn get_location(&self, name: &str) -> Result<Option<BackupStorageLocation>, LookupError> {
        if self.unavailable {
            return Err(Box::new(std::io::Error::other("connection refused")));
        }
        Ok(self.locations.get(name).cloned())
    }
}

/// Storage key resolver returning a fixed key, or failing
#[derive(Debug, Default)]
pub struct FakeKeys {
    pub fail: bool,
    pub calls: Mutex<Vec<(String, String)>>,
}

impl FakeKeys {
    pub fn failing() -> Self {
        Self {
            fail: true,
            calls: Mutex::default(),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

pub const FAKE_STORAGE_KEY: &str = "c2VjcmV0LWtleQ==";

#[async_trait]
impl StorageKeyResolver for FakeKeys {
    async fn storage_account_key(
        &self,
        resource_group: &str,
        storage_account: &str,
    ) -> anyhow::Result<Zeroizing<String>> {
        self.calls
            .lock()
            .unwrap()
            .push((resource_group.to_string(), storage_account.to_string()));
        if self.fail {
            anyhow::bail!("identity endpoint unreachable");
        }
        Ok(Zeroizing::new(FAKE_STORAGE_KEY.to_string()))
    }
}

/// Provisioner wrapper that records when provisioning ran
#[derive(Debug)]
pub struct LoggingProvisioner<P> {
    pub inner: P,
    pub log: EventLog,
}

#[async_trait]
impl<P: Provision> Provision for LoggingProvisioner<P> {
    async fn provision(
        &self,
        location_name: &str,
    ) -> Result<RepositoryEnvironment, ProvisionError> {
        self.log.push("provision");
        self.inner.provision(location_name).await
    }
}

/// Workload whose streams and loops are plain tasks waiting on the token
///
/// Each loop sleeps for `drain` after cancellation and records the
/// lifecycle state it observed when it finished.
#[derive(Debug, Clone)]
pub struct RecordingWorkload {
    pub log: EventLog,
    pub lifecycle: Arc<OnceLock<Lifecycle>>,
    pub drain: Duration,
    /// The restore loop returns immediately instead of waiting for cancellation
    pub restore_exits_early: bool,
}

impl RecordingWorkload {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            lifecycle: Arc::new(OnceLock::new()),
            drain: Duration::from_millis(50),
            restore_exits_early: false,
        }
    }

    /// Let loops observe the orchestrator's lifecycle
    pub fn observe(&self, lifecycle: Lifecycle) {
        let _ = self.lifecycle.set(lifecycle);
    }
}

impl Workload for RecordingWorkload {
    type Streams = Vec<&'static str>;

    fn start_streams(&self, registry: &TaskRegistry, token: &CancellationToken) -> Self::Streams {
        self.log.push("streams");
        for stream in ["pods", "credentials"] {
            let token = token.clone();
            registry.spawn(format!("watch/{stream}"), async move {
                token.cancelled().await;
            });
        }
        vec!["pods", "credentials"]
    }

    fn start_reconcilers(
        &self,
        streams: Self::Streams,
        environment: Arc<RepositoryEnvironment>,
        registry: &TaskRegistry,
        token: &CancellationToken,
    ) {
        assert_eq!(streams, vec!["pods", "credentials"]);
        self.log.push("reconcilers");
        self.log.push(format!("environment has {} variables", environment.len()));

        for loop_name in ["backup", "restore"] {
            let token = token.clone();
            let log = self.log.clone();
            let lifecycle = Arc::clone(&self.lifecycle);
            let drain = self.drain;
            let exits_early = self.restore_exits_early && loop_name == "restore";

            registry.spawn(format!("controller/{loop_name}"), async move {
                if exits_early {
                    log.push(format!("{loop_name} exited"));
                    return;
                }
                token.cancelled().await;
                log.push(format!("{loop_name} observed cancellation"));
                tokio::time::sleep(drain).await;
                let state = lifecycle
                    .get()
                    .map_or(LifecycleState::ShuttingDown, Lifecycle::state);
                log.push(format!("{loop_name} finished in {state}"));
            });
        }
    }
}
