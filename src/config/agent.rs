//! # Agent Configuration
//!
//! Node agent settings loaded from environment variables.
//!
//! The DaemonSet injects `HEPTIO_ARK_NAMESPACE` and `NODE_NAME` through the
//! downward API. Both are required: an empty node name would turn the pod
//! watch into a filter that matches only unscheduled pods, so it is rejected
//! at startup instead.

use crate::constants::{
    DEFAULT_HOST_PODS_PATH, DEFAULT_METRICS_PORT, DEFAULT_RECONCILE_ERROR_REQUEUE_MAX_SECS,
    DEFAULT_RECONCILE_ERROR_REQUEUE_SECS, DEFAULT_RESTIC_BINARY,
    DEFAULT_SHUTDOWN_PROGRESS_INTERVAL_SECS, NAMESPACE_ENV_VAR, NODE_NAME_ENV_VAR,
};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while resolving the agent configuration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required environment variable is unset or empty
    #[error("environment variable {0} must be set to a non-empty value")]
    MissingVariable(&'static str),
}

/// Node agent configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    /// System namespace holding the credentials secret, storage locations and
    /// the pod volume backup/restore resources
    pub namespace: String,
    /// Name of the node this agent is scheduled on
    pub node_name: String,
    /// Port for the metrics and probe server
    pub metrics_port: u16,
    /// restic executable used for every data-moving operation
    pub restic_binary: PathBuf,
    /// Host directory containing `<pod-uid>/volumes/...`
    pub host_pods_path: PathBuf,
    /// First requeue delay after a failed reconciliation (seconds)
    pub reconcile_error_requeue_secs: u64,
    /// Upper bound for the requeue delay (seconds)
    pub reconcile_error_requeue_max_secs: u64,
    /// How often shutdown logs the number of tasks still running (seconds)
    pub shutdown_progress_interval_secs: u64,
}

impl AgentConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let namespace = required(&lookup, NAMESPACE_ENV_VAR)?;
        let node_name = required(&lookup, NODE_NAME_ENV_VAR)?;

        let restic_binary = lookup("RESTIC_BINARY")
            .filter(|value| !value.is_empty())
            .map_or_else(
                || which::which(DEFAULT_RESTIC_BINARY).unwrap_or_else(|_| DEFAULT_RESTIC_BINARY.into()),
                PathBuf::from,
            );

        Ok(Self {
            namespace,
            node_name,
            metrics_port: parsed_or_default(&lookup, "METRICS_PORT", DEFAULT_METRICS_PORT),
            restic_binary,
            host_pods_path: lookup("HOST_PODS_PATH")
                .filter(|value| !value.is_empty())
                .map_or_else(|| PathBuf::from(DEFAULT_HOST_PODS_PATH), PathBuf::from),
            reconcile_error_requeue_secs: parsed_or_default(
                &lookup,
                "RECONCILE_ERROR_REQUEUE_SECS",
                DEFAULT_RECONCILE_ERROR_REQUEUE_SECS,
            ),
            reconcile_error_requeue_max_secs: parsed_or_default(
                &lookup,
                "RECONCILE_ERROR_REQUEUE_MAX_SECS",
                DEFAULT_RECONCILE_ERROR_REQUEUE_MAX_SECS,
            ),
            shutdown_progress_interval_secs: parsed_or_default(
                &lookup,
                "SHUTDOWN_PROGRESS_INTERVAL_SECS",
                DEFAULT_SHUTDOWN_PROGRESS_INTERVAL_SECS,
            ),
        })
    }

    /// Get shutdown progress log interval
    pub fn shutdown_progress_interval(&self) -> Duration {
        Duration::from_secs(self.shutdown_progress_interval_secs.max(1))
    }
}

fn required<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or(ConfigError::MissingVariable(key))
}

/// Read a variable and parse it, falling back to the default on absence or parse failure
fn parsed_or_default<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
