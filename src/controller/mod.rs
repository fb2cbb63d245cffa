//! # Reconciliation Loops
//!
//! Pod volume backup and restore controllers plus everything they share.
//!
//! - `context`: handles, caches and backoff state shared by both loops
//! - `pod_volume_backup` / `pod_volume_restore`: the two loops
//! - `restic`: restic command lines
//! - `volume`: host path resolution for pod volumes
//! - `error_policy` / `backoff`: requeue policy for failed reconciliations

pub mod backoff;
pub mod context;
pub mod error_policy;
pub mod pod_volume_backup;
pub mod pod_volume_restore;
pub mod restic;
pub mod volume;

pub use context::{ControllerContext, ControllerSettings, VolumeClaims};
pub use restic::ResticError;

use crate::constants::FIELD_MANAGER;
use kube::api::{Patch, PatchParams};
use kube::Api;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use thiserror::Error;

/// Errors raised while reconciling a pod volume backup or restore
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error(transparent)]
    Restic(#[from] ResticError),

    #[error("pod {0} not found on this node")]
    PodNotFound(String),

    #[error("pod {0} has no UID")]
    MissingPodUid(String),

    #[error("volume {volume} not found under {path}")]
    VolumeNotFound { volume: String, path: String },

    #[error("expected one host directory for volume {volume}, found {count}")]
    AmbiguousVolume { volume: String, count: usize },

    #[error("repository password unavailable ({0})")]
    MissingCredentials(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Merge-patch the status subresource of `name`
pub(crate) async fn patch_status<K, S>(api: &Api<K>, name: &str, status: &S) -> Result<K, kube::Error>
where
    K: Clone + DeserializeOwned + Debug,
    S: Serialize,
{
    let params = PatchParams {
        field_manager: Some(FIELD_MANAGER.to_string()),
        ..PatchParams::default()
    };
    api.patch_status(name, &params, &Patch::Merge(serde_json::json!({ "status": status })))
        .await
}

/// Current time in the RFC3339 form stored in status timestamps
pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
