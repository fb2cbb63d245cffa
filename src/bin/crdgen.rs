//! # CRD Generator
//!
//! Prints the CustomResourceDefinitions consumed by the node agent as a
//! multi-document YAML stream.
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/ark.yaml
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use anyhow::{Context, Result};
use kube::core::CustomResourceExt;
use restic_node_agent::crd::{BackupStorageLocation, PodVolumeBackup, PodVolumeRestore};

fn main() -> Result<()> {
    let crds = [
        BackupStorageLocation::crd(),
        PodVolumeBackup::crd(),
        PodVolumeRestore::crd(),
    ];

    for crd in crds {
        let yaml = serde_yaml::to_string(&crd).context("Failed to serialize CRD to YAML")?;
        println!("---");
        print!("{yaml}");
    }
    Ok(())
}
