//! # Custom Resource Definitions
//!
//! CRD types for the `ark.heptio.com/v1` API group consumed by the node agent.
//!
//! ## Module Structure
//!
//! - `location.rs` - `BackupStorageLocation`, read once at startup for credential placement
//! - `pod_volume.rs` - Types shared by pod volume backups and restores
//! - `backup.rs` - `PodVolumeBackup` spec and status
//! - `restore.rs` - `PodVolumeRestore` spec and status

mod backup;
mod location;
mod pod_volume;
mod restore;

pub use backup::{PodVolumeBackup, PodVolumeBackupSpec, PodVolumeBackupStatus};
pub use location::{BackupStorageLocation, BackupStorageLocationSpec, ObjectStorageLocation};
pub use pod_volume::{PodReference, PodVolumePhase};
pub use restore::{PodVolumeRestore, PodVolumeRestoreSpec, PodVolumeRestoreStatus};
