//! # PodVolumeBackup
//!
//! One volume of one pod to be backed up by the agent running on the pod's node.

use crate::crd::{PodReference, PodVolumePhase};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// PodVolumeBackup Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: ark.heptio.com/v1
/// kind: PodVolumeBackup
/// metadata:
///   name: backup-1-abcde
///   namespace: heptio-ark
/// spec:
///   node: node-7
///   pod:
///     namespace: shop
///     name: db-0
///     uid: 5f1c...
///   volume: data
///   repoIdentifier: azure:ark-backups:/restic/shop
///   tags:
///     backup: backup-1
/// ```
#[derive(kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "PodVolumeBackup",
    group = "ark.heptio.com",
    version = "v1",
    namespaced,
    status = "crate::crd::PodVolumeBackupStatus",
    printcolumn = r#"{"name":"Node", "type":"string", "jsonPath":".spec.node"}, {"name":"Phase", "type":"string", "jsonPath":".status.phase"}, {"name":"Snapshot", "type":"string", "jsonPath":".status.snapshotID"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PodVolumeBackupSpec {
    /// Node the pod runs on; only that node's agent processes the backup
    pub node: String,
    pub pod: PodReference,
    /// Name of the pod volume to back up
    pub volume: String,
    /// restic repository the snapshot is written to
    pub repo_identifier: String,
    /// Tags attached to the restic snapshot
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// Status of a PodVolumeBackup
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PodVolumeBackupStatus {
    #[serde(default)]
    pub phase: Option<PodVolumePhase>,
    /// Host path that was backed up
    #[serde(default)]
    pub path: Option<String>,
    /// Identifier of the restic snapshot
    #[serde(default, rename = "snapshotID")]
    pub snapshot_id: Option<String>,
    /// Failure reason when the phase is `Failed`
    #[serde(default)]
    pub message: Option<String>,
    /// RFC3339 time processing started
    #[serde(default)]
    pub start_timestamp: Option<String>,
    /// RFC3339 time processing finished
    #[serde(default)]
    pub completion_timestamp: Option<String>,
}
