//! restic Node Agent Library
//!
//! Building blocks of the `ark-restic` node agent: custom resources, the
//! typed API client, credential provisioning, node-scoped watches, the
//! backup and restore loops, and the lifecycle runtime tying them together.

pub mod cli;
pub mod client;
pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod provider;
pub mod runtime;
pub mod server;
pub mod watch;

#[cfg(test)]
mod testing;

pub use client::ArkV1Client;
pub use crd::{BackupStorageLocation, PodVolumeBackup, PodVolumeRestore};
