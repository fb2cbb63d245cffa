//! # PodVolumeRestore
//!
//! One restic snapshot to be restored into a volume of a pod on this node.

use crate::crd::{PodReference, PodVolumePhase};
use serde::{Deserialize, Serialize};

/// PodVolumeRestore Custom Resource Definition
#[derive(kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "PodVolumeRestore",
    group = "ark.heptio.com",
    version = "v1",
    namespaced,
    status = "crate::crd::PodVolumeRestoreStatus",
    printcolumn = r#"{"name":"Pod", "type":"string", "jsonPath":".spec.pod.name"}, {"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PodVolumeRestoreSpec {
    pub pod: PodReference,
    /// Name of the pod volume to restore into
    pub volume: String,
    pub repo_identifier: String,
    #[serde(rename = "snapshotID")]
    pub snapshot_id: String,
}

/// Status of a PodVolumeRestore
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PodVolumeRestoreStatus {
    #[serde(default)]
    pub phase: Option<PodVolumePhase>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub start_timestamp: Option<String>,
    #[serde(default)]
    pub completion_timestamp: Option<String>,
}
