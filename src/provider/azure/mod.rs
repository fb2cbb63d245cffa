//! # Azure Credential Placement
//!
//! restic's Azure backend reads the storage account name and key from
//! `AZURE_ACCOUNT_NAME` and `AZURE_ACCOUNT_KEY`. The name comes straight
//! from the location config; the key is looked up through Azure Resource
//! Manager.

mod storage_keys;

pub use storage_keys::ArmStorageKeyResolver;

use crate::crd::BackupStorageLocationSpec;
use crate::provider::{ProvisionError, RepositoryEnvironment};
use async_trait::async_trait;
use zeroize::Zeroizing;

/// Provider name that requires credential placement
pub const PROVIDER_NAME: &str = "azure";

/// Location config key naming the storage account's resource group
pub const RESOURCE_GROUP_CONFIG_KEY: &str = "resourceGroup";

/// Location config key naming the storage account
pub const STORAGE_ACCOUNT_CONFIG_KEY: &str = "storageAccount";

pub const ACCOUNT_NAME_ENV_VAR: &str = "AZURE_ACCOUNT_NAME";
pub const ACCOUNT_KEY_ENV_VAR: &str = "AZURE_ACCOUNT_KEY";

/// Looks up an access key for a storage account
#[async_trait]
pub trait StorageKeyResolver: Send + Sync {
    async fn storage_account_key(
        &self,
        resource_group: &str,
        storage_account: &str,
    ) -> anyhow::Result<Zeroizing<String>>;
}

/// Build the restic environment for an Azure backed location
pub async fn restic_environment<K>(
    location_name: &str,
    spec: &BackupStorageLocationSpec,
    resolver: &K,
) -> Result<RepositoryEnvironment, ProvisionError>
where
    K: StorageKeyResolver + ?Sized,
{
    let required = |key: &'static str| {
        spec.config_value(key)
            .ok_or_else(|| ProvisionError::InvalidProviderConfig {
                provider: PROVIDER_NAME.to_string(),
                location: location_name.to_string(),
                key,
            })
    };

    let resource_group = required(RESOURCE_GROUP_CONFIG_KEY)?;
    let storage_account = required(STORAGE_ACCOUNT_CONFIG_KEY)?;

    let key = resolver
        .storage_account_key(resource_group, storage_account)
        .await
        .map_err(|source| ProvisionError::CredentialResolution {
            provider: PROVIDER_NAME.to_string(),
            source,
        })?;

    Ok(RepositoryEnvironment::default()
        .with_var(ACCOUNT_NAME_ENV_VAR, storage_account)
        .with_var(ACCOUNT_KEY_ENV_VAR, key.as_str()))
}
