//! # Typed API Client
//!
//! `ArkV1Client` wraps a `kube::Client` and hands out namespace-scoped handles
//! for the `ark.heptio.com/v1` resources.

use crate::crd::{BackupStorageLocation, PodVolumeBackup, PodVolumeRestore};
use kube::{Api, Client, Config};
use std::fmt;

/// Typed client for the `ark.heptio.com/v1` API group
#[derive(Clone)]
pub struct ArkV1Client {
    client: Client,
}

impl ArkV1Client {
    /// Infer connection settings from the in-cluster service account or the local kubeconfig
    pub async fn default_config() -> Result<Config, kube::config::InferConfigError> {
        Config::infer().await
    }

    /// Build a client from explicit connection settings
    pub fn new_for_config(config: Config) -> Result<Self, kube::Error> {
        Ok(Self::new(Client::try_from(config)?))
    }

    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Underlying untyped client, used for core resources (pods, secrets, claims)
    pub fn client(&self) -> Client {
        self.client.clone()
    }

    pub fn backup_storage_locations(&self, namespace: &str) -> Api<BackupStorageLocation> {
        Api::namespaced(self.client.clone(), namespace)
    }

    pub fn pod_volume_backups(&self, namespace: &str) -> Api<PodVolumeBackup> {
        Api::namespaced(self.client.clone(), namespace)
    }

    pub fn pod_volume_restores(&self, namespace: &str) -> Api<PodVolumeRestore> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

impl fmt::Debug for ArkV1Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArkV1Client").finish_non_exhaustive()
    }
}
