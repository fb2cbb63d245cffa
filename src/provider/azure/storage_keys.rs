//! Storage account key lookup through the Azure Resource Manager `listKeys` API.

use crate::provider::azure::StorageKeyResolver;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use azure_core::credentials::{TokenCredential, TokenRequestOptions};
use azure_identity::{ManagedIdentityCredential, WorkloadIdentityCredential};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};
use zeroize::Zeroizing;

const MANAGEMENT_ENDPOINT: &str = "https://management.azure.com";
const MANAGEMENT_SCOPE: &str = "https://management.azure.com/.default";
const STORAGE_API_VERSION: &str = "2023-01-01";

/// Resolves storage account keys with the pod's Azure identity
///
/// Credentials are only created on first use, so locations of other
/// providers never touch Azure.
pub struct ArmStorageKeyResolver {
    subscription_id: Option<String>,
    client_id: Option<String>,
    use_workload_identity: bool,
}

impl std::fmt::Debug for ArmStorageKeyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArmStorageKeyResolver")
            .field("subscription_id", &self.subscription_id)
            .field("use_workload_identity", &self.use_workload_identity)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct ListKeysResponse {
    #[serde(default)]
    keys: Vec<StorageAccountKey>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StorageAccountKey {
    #[serde(default)]
    key_name: String,
    value: String,
}

impl std::fmt::Debug for StorageAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageAccountKey")
            .field("key_name", &self.key_name)
            .finish_non_exhaustive()
    }
}

impl ArmStorageKeyResolver {
    /// Read identity settings injected by the Azure workload identity webhook
    pub fn from_env() -> Self {
        Self {
            subscription_id: std::env::var("AZURE_SUBSCRIPTION_ID")
                .ok()
                .filter(|value| !value.is_empty()),
            client_id: std::env::var("AZURE_CLIENT_ID")
                .ok()
                .filter(|value| !value.is_empty()),
            use_workload_identity: std::env::var_os("AZURE_FEDERATED_TOKEN_FILE").is_some(),
        }
    }

    fn credential(&self) -> Result<Arc<dyn TokenCredential>> {
        // Only support Workload Identity or Managed Identity
        let credential: Arc<dyn TokenCredential> = if self.use_workload_identity {
            info!("Using Azure Workload Identity to resolve storage account keys");
            let options = azure_identity::WorkloadIdentityCredentialOptions {
                client_id: self.client_id.clone(),
                ..Default::default()
            };
            WorkloadIdentityCredential::new(Some(options))
                .context("Failed to create WorkloadIdentityCredential")?
        } else {
            info!("Using Managed Identity to resolve storage account keys");
            ManagedIdentityCredential::new(None)
                .context("Failed to create ManagedIdentityCredential")?
        };
        Ok(credential)
    }

    fn list_keys_url(subscription_id: &str, resource_group: &str, storage_account: &str) -> String {
        format!(
            "{MANAGEMENT_ENDPOINT}/subscriptions/{subscription_id}/resourceGroups/{resource_group}/providers/Microsoft.Storage/storageAccounts/{storage_account}/listKeys?api-version={STORAGE_API_VERSION}"
        )
    }
}

#[async_trait]
impl StorageKeyResolver for ArmStorageKeyResolver {
    async fn storage_account_key(
        &self,
        resource_group: &str,
        storage_account: &str,
    ) -> Result<Zeroizing<String>> {
        let Some(subscription_id) = self.subscription_id.as_deref() else {
            bail!("AZURE_SUBSCRIPTION_ID must be set to look up storage account keys");
        };

        let token = self
            .credential()?
            .get_token(&[MANAGEMENT_SCOPE], Some(TokenRequestOptions::default()))
            .await
            .context("Failed to get Azure Resource Manager access token")?;

        let client = Client::builder()
            .build()
            .context("Failed to create HTTP client")?;

        let url = Self::list_keys_url(subscription_id, resource_group, storage_account);
        debug!(resource_group, storage_account, "Listing storage account keys");

        let response = client
            .post(&url)
            .bearer_auth(token.token.secret())
            .header("Content-Length", "0")
            .send()
            .await
            .context("Failed to call storage account listKeys")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("storage account listKeys returned {status}: {body}");
        }

        let keys: ListKeysResponse = response
            .json()
            .await
            .context("Failed to parse storage account listKeys response")?;

        keys.keys
            .into_iter()
            .next()
            .map(|key| Zeroizing::new(key.value))
            .with_context(|| format!("storage account {storage_account} returned no access keys"))
    }
}
