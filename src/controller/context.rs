//! Shared state handed to both reconciliation loops.

use crate::constants::{CREDENTIALS_SECRET_KEY, CREDENTIALS_SECRET_NAME};
use crate::controller::backoff::FibonacciBackoff;
use crate::controller::ReconcileError;
use crate::crd::{PodReference, PodVolumeBackup, PodVolumeRestore};
use crate::provider::RepositoryEnvironment;
use crate::watch::WatchCache;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod, Secret};
use kube::{Api, Client};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use zeroize::Zeroizing;

/// Lookup of persistent volume claims across namespaces
#[derive(Clone)]
pub struct VolumeClaims {
    client: Client,
}

impl VolumeClaims {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// UID of the named claim, `None` if it does not exist
    pub async fn claim_uid(&self, namespace: &str, name: &str) -> Result<Option<String>, kube::Error> {
        let claims: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), namespace);
        Ok(claims.get_opt(name).await?.and_then(|claim| claim.metadata.uid))
    }
}

impl std::fmt::Debug for VolumeClaims {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolumeClaims").finish_non_exhaustive()
    }
}

/// Tunables for the reconciliation loops
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSettings {
    pub restic_binary: PathBuf,
    pub host_pods_path: PathBuf,
    pub requeue_min_secs: u64,
    pub requeue_max_secs: u64,
}

/// Context shared by the backup and restore loops
pub struct ControllerContext {
    pub namespace: String,
    pub node_name: String,
    pub backups: Api<PodVolumeBackup>,
    pub restores: Api<PodVolumeRestore>,
    pub pods: WatchCache<Pod>,
    pub credentials: WatchCache<Secret>,
    pub claims: VolumeClaims,
    pub environment: Arc<RepositoryEnvironment>,
    pub settings: ControllerSettings,
    /// Backoff state per resource key (`kind/namespace/name`) and when it was last used
    backoff: Mutex<HashMap<String, (FibonacciBackoff, Instant)>>,
}

impl std::fmt::Debug for ControllerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerContext")
            .field("namespace", &self.namespace)
            .field("node_name", &self.node_name)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ControllerContext {
    #[allow(clippy::too_many_arguments, reason = "Plain wiring of independently built handles")]
    pub fn new(
        namespace: String,
        node_name: String,
        backups: Api<PodVolumeBackup>,
        restores: Api<PodVolumeRestore>,
        pods: WatchCache<Pod>,
        credentials: WatchCache<Secret>,
        claims: VolumeClaims,
        environment: Arc<RepositoryEnvironment>,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            namespace,
            node_name,
            backups,
            restores,
            pods,
            credentials,
            claims,
            environment,
            settings,
            backoff: Mutex::new(HashMap::new()),
        }
    }

    /// Pod referenced by a backup or restore, if it runs on this node
    pub fn pod(&self, reference: &PodReference) -> Option<Arc<Pod>> {
        self.pods.get(Some(&reference.namespace), &reference.name)
    }

    pub fn repository_password(&self) -> Result<Zeroizing<String>, ReconcileError> {
        repository_password(&self.credentials, &self.namespace)
    }

    /// Wait until both caches hold their first full snapshot
    ///
    /// Returns `false` if the token was cancelled first.
    pub async fn wait_for_caches(&self, token: &CancellationToken) -> bool {
        wait_for_caches(&self.pods, &self.credentials, token).await
    }

    /// Next requeue delay for a failing resource
    pub fn next_backoff(&self, key: &str) -> Duration {
        self.next_backoff_at(key, Instant::now())
    }

    /// Entries untouched for longer than this belong to resources that were
    /// deleted or recovered without a clean reconcile
    fn backoff_expiry(&self) -> Duration {
        Duration::from_secs(self.settings.requeue_max_secs.max(1).saturating_mul(2))
    }

    fn next_backoff_at(&self, key: &str, now: Instant) -> Duration {
        let expiry = self.backoff_expiry();
        match self.backoff.lock() {
            Ok(mut states) => {
                states.retain(|_, (_, last_used)| now.saturating_duration_since(*last_used) <= expiry);
                let (backoff, last_used) = states.entry(key.to_string()).or_insert_with(|| {
                    (
                        FibonacciBackoff::new(self.settings.requeue_min_secs, self.settings.requeue_max_secs),
                        now,
                    )
                });
                *last_used = now;
                backoff.next_backoff()
            }
            Err(e) => {
                warn!("Failed to lock backoff states: {}, using minimum backoff", e);
                Duration::from_secs(self.settings.requeue_min_secs.max(1))
            }
        }
    }

    /// Forget the backoff state of a resource after it reconciled cleanly
    pub fn reset_backoff(&self, key: &str) {
        if let Ok(mut states) = self.backoff.lock() {
            states.remove(key);
        }
    }
}

/// Wait for the pod and credentials caches to finish their initial list
///
/// Reconciling earlier would report a pod or the repository password as
/// missing just because its stream has not synced yet.
pub async fn wait_for_caches(
    pods: &WatchCache<Pod>,
    credentials: &WatchCache<Secret>,
    token: &CancellationToken,
) -> bool {
    if pods.is_ready() && credentials.is_ready() {
        return true;
    }
    info!("Waiting for pod and credentials caches to sync");
    tokio::select! {
        () = token.cancelled() => false,
        (pods_ready, credentials_ready) = async {
            tokio::join!(pods.wait_until_ready(), credentials.wait_until_ready())
        } => pods_ready && credentials_ready,
    }
}

/// Read the repository password from the credentials cache
pub fn repository_password(
    credentials: &WatchCache<Secret>,
    namespace: &str,
) -> Result<Zeroizing<String>, ReconcileError> {
    let missing = |reason: &str| {
        ReconcileError::MissingCredentials(format!("{namespace}/{CREDENTIALS_SECRET_NAME}: {reason}"))
    };

    let secret = credentials
        .get(Some(namespace), CREDENTIALS_SECRET_NAME)
        .ok_or_else(|| missing("secret not found"))?;
    let value = secret
        .data
        .as_ref()
        .and_then(|data| data.get(CREDENTIALS_SECRET_KEY))
        .ok_or_else(|| missing("key repository-password not present"))?;

    String::from_utf8(value.0.clone())
        .map(Zeroizing::new)
        .map_err(|e| missing(&format!("password is not valid UTF-8: {e}")))
}
