//! # BackupStorageLocation
//!
//! Describes where backups are stored and which provider serves the bucket.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// BackupStorageLocation Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: ark.heptio.com/v1
/// kind: BackupStorageLocation
/// metadata:
///   name: default
///   namespace: heptio-ark
/// spec:
///   provider: azure
///   objectStorage:
///     bucket: ark-backups
///   config:
///     resourceGroup: ark-rg
///     storageAccount: arkstorage
/// ```
#[derive(kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "BackupStorageLocation",
    group = "ark.heptio.com",
    version = "v1",
    namespaced,
    printcolumn = r#"{"name":"Provider", "type":"string", "jsonPath":".spec.provider"}, {"name":"Bucket", "type":"string", "jsonPath":".spec.objectStorage.bucket"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct BackupStorageLocationSpec {
    /// Object storage provider name (`aws`, `azure`, `gcp`, ...)
    pub provider: String,
    #[serde(default)]
    pub object_storage: Option<ObjectStorageLocation>,
    /// Provider-specific settings
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

/// Bucket and optional prefix backups are written under
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ObjectStorageLocation {
    pub bucket: String,
    #[serde(default)]
    pub prefix: Option<String>,
}

impl BackupStorageLocationSpec {
    /// Look up a provider config value, treating empty strings as absent
    pub fn config_value(&self, key: &str) -> Option<&str> {
        self.config
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }
}
