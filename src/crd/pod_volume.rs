//! Types shared by `PodVolumeBackup` and `PodVolumeRestore`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference to the pod whose volume is backed up or restored
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PodReference {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub uid: Option<String>,
}

impl PodReference {
    /// Cache key in `namespace/name` form
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// Processing phase of a pod volume backup or restore
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub enum PodVolumePhase {
    #[default]
    New,
    InProgress,
    Completed,
    Failed,
}

impl PodVolumePhase {
    /// Whether the resource still has to be picked up by this agent
    ///
    /// An absent phase counts as `New`.
    pub fn is_pending(phase: Option<Self>) -> bool {
        matches!(phase, None | Some(Self::New))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "New",
            Self::InProgress => "InProgress",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        }
    }
}

impl fmt::Display for PodVolumePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
