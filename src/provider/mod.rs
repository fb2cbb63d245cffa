//! # Credential Provisioning
//!
//! Resolves the startup `BackupStorageLocation` and builds the environment
//! every restic invocation runs with.
//!
//! Provisioning runs exactly once, before any watch stream or reconciliation
//! loop starts. The result is frozen in a [`RepositoryEnvironment`] and only
//! ever read afterwards.
//!
//! - `environment`: the immutable variable map handed to restic
//! - `azure`: storage account name and key placement for the `azure` provider

pub mod azure;
mod environment;

pub use azure::{ArmStorageKeyResolver, StorageKeyResolver};
pub use environment::RepositoryEnvironment;

use crate::crd::BackupStorageLocation;
use crate::observability::metrics;
use async_trait::async_trait;
use kube::Api;
use std::error::Error as StdError;
use thiserror::Error;
use tracing::{info, info_span, Instrument};

/// Boxed transport failure reported by a [`LocationLookup`]
pub type LookupError = Box<dyn StdError + Send + Sync>;

/// Errors raised while provisioning repository credentials
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("backup storage location {namespace}/{name} not found")]
    LocationNotFound { namespace: String, name: String },

    #[error("unable to fetch backup storage location {name}: {source}")]
    ApiUnavailable {
        name: String,
        #[source]
        source: LookupError,
    },

    #[error("backup storage location {location} (provider {provider}) is missing config key {key}")]
    InvalidProviderConfig {
        provider: String,
        location: String,
        key: &'static str,
    },

    #[error("unable to resolve {provider} credentials: {source:#}")]
    CredentialResolution {
        provider: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Point lookup of a storage location by name
#[async_trait]
pub trait LocationLookup: Send + Sync {
    /// Returns `Ok(None)` when the location does not exist
    async fn get_location(&self, name: &str) -> Result<Option<BackupStorageLocation>, LookupError>;
}

#[async_trait]
impl LocationLookup for Api<BackupStorageLocation> {
    async fn get_location(&self, name: &str) -> Result<Option<BackupStorageLocation>, LookupError> {
        self.get_opt(name).await.map_err(|e| Box::new(e) as LookupError)
    }
}

/// Produces the repository environment for a named storage location
#[async_trait]
pub trait Provision: Send + Sync {
    async fn provision(&self, location_name: &str) -> Result<RepositoryEnvironment, ProvisionError>;
}

/// Provisioner backed by a location lookup and an Azure storage key resolver
#[derive(Debug)]
pub struct CredentialProvisioner<L, K> {
    namespace: String,
    locations: L,
    storage_keys: K,
}

impl<L, K> CredentialProvisioner<L, K>
where
    L: LocationLookup,
    K: StorageKeyResolver,
{
    pub fn new(namespace: impl Into<String>, locations: L, storage_keys: K) -> Self {
        Self {
            namespace: namespace.into(),
            locations,
            storage_keys,
        }
    }

    async fn resolve(&self, location_name: &str) -> Result<RepositoryEnvironment, ProvisionError> {
        let location = self
            .locations
            .get_location(location_name)
            .await
            .map_err(|source| ProvisionError::ApiUnavailable {
                name: location_name.to_string(),
                source,
            })?
            .ok_or_else(|| ProvisionError::LocationNotFound {
                namespace: self.namespace.clone(),
                name: location_name.to_string(),
            })?;

        let provider = location.spec.provider.as_str();
        let result = match provider {
            azure::PROVIDER_NAME => {
                azure::restic_environment(location_name, &location.spec, &self.storage_keys).await
            }
            // Other providers read credentials from files mounted into the pod
            _ => Ok(RepositoryEnvironment::default()),
        };

        metrics::record_credential_provisioning(
            provider,
            if result.is_ok() { "success" } else { "error" },
        );

        if let Ok(environment) = &result {
            info!(
                location = location_name,
                provider,
                variables = environment.len(),
                "Repository credentials provisioned"
            );
        }
        result
    }
}

#[async_trait]
impl<L, K> Provision for CredentialProvisioner<L, K>
where
    L: LocationLookup,
    K: StorageKeyResolver,
{
    async fn provision(&self, location_name: &str) -> Result<RepositoryEnvironment, ProvisionError> {
        let span = info_span!(
            "agent.startup.provision",
            location = location_name,
            namespace = %self.namespace
        );
        self.resolve(location_name).instrument(span).await
    }
}
