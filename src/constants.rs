//! # Constants
//!
//! Shared constants used throughout the node agent.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Environment variable holding the system namespace (credentials and locations live here)
pub const NAMESPACE_ENV_VAR: &str = "HEPTIO_ARK_NAMESPACE";

/// Environment variable holding the name of the node this agent runs on
pub const NODE_NAME_ENV_VAR: &str = "NODE_NAME";

/// Name of the secret holding the restic repository password
pub const CREDENTIALS_SECRET_NAME: &str = "ark-restic-credentials";

/// Key inside the credentials secret holding the repository password
pub const CREDENTIALS_SECRET_KEY: &str = "repository-password";

/// Default backup storage location consulted at startup
pub const DEFAULT_BACKUP_STORAGE_LOCATION: &str = "default";

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8085;

/// Default mount point of the kubelet pods directory inside the agent container
pub const DEFAULT_HOST_PODS_PATH: &str = "/host_pods";

/// Fallback restic binary name when it is not found on `PATH`
pub const DEFAULT_RESTIC_BINARY: &str = "restic";

/// Default first requeue delay after a failed reconciliation (seconds)
pub const DEFAULT_RECONCILE_ERROR_REQUEUE_SECS: u64 = 5;

/// Default maximum requeue delay after repeated failures (seconds)
pub const DEFAULT_RECONCILE_ERROR_REQUEUE_MAX_SECS: u64 = 300;

/// Default interval between "still waiting" log lines during shutdown (seconds)
pub const DEFAULT_SHUTDOWN_PROGRESS_INTERVAL_SECS: u64 = 10;

/// Server-side watch timeout (seconds)
/// Must stay below the client read timeout so idle watches are closed by the API server first
pub const WATCH_TIMEOUT_SECS: u32 = 290;

/// Field manager recorded on status patches
pub const FIELD_MANAGER: &str = "ark-restic-server";

/// Directory created inside a restored volume to hold completion markers
pub const RESTORE_DONE_MARKER_DIR: &str = ".ark";

/// Tag added to snapshots of volumes backed by a persistent volume claim
pub const PVC_UID_TAG: &str = "pvc-uid";
