//! Locating pod volumes on the host.
//!
//! The kubelet keeps each pod volume at
//! `<pods dir>/<pod uid>/volumes/<plugin>/<volume name>`; the plugin
//! directory (e.g. `kubernetes.io~empty-dir`) is not known up front.

use crate::constants::RESTORE_DONE_MARKER_DIR;
use crate::controller::ReconcileError;
use k8s_openapi::api::core::v1::Pod;
use std::path::{Path, PathBuf};

/// Find the single host directory backing `volume` of the pod with `pod_uid`
pub fn find_volume_dir(host_pods_path: &Path, pod_uid: &str, volume: &str) -> Result<PathBuf, ReconcileError> {
    let volumes = host_pods_path.join(pod_uid).join("volumes");
    let not_found = || ReconcileError::VolumeNotFound {
        volume: volume.to_string(),
        path: volumes.display().to_string(),
    };

    let entries = match std::fs::read_dir(&volumes) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
        Err(e) => return Err(e.into()),
    };

    let mut matches = Vec::new();
    for entry in entries {
        let candidate = entry?.path().join(volume);
        if candidate.is_dir() {
            matches.push(candidate);
        }
    }

    match matches.len() {
        0 => Err(not_found()),
        1 => Ok(matches.remove(0)),
        count => Err(ReconcileError::AmbiguousVolume {
            volume: volume.to_string(),
            count,
        }),
    }
}

/// Claim backing `volume`, if the pod mounts it from a persistent volume claim
pub fn volume_claim_name<'a>(pod: &'a Pod, volume: &str) -> Option<&'a str> {
    pod.spec
        .as_ref()?
        .volumes
        .as_ref()?
        .iter()
        .find(|candidate| candidate.name == volume)?
        .persistent_volume_claim
        .as_ref()
        .map(|claim| claim.claim_name.as_str())
}

/// Write the empty `.ark/<restore uid>` file marking a finished restore
pub fn write_done_marker(volume_dir: &Path, restore_uid: &str) -> std::io::Result<PathBuf> {
    let marker_dir = volume_dir.join(RESTORE_DONE_MARKER_DIR);
    std::fs::create_dir_all(&marker_dir)?;
    let marker = marker_dir.join(restore_uid);
    std::fs::File::create(&marker)?;
    Ok(marker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{PersistentVolumeClaimVolumeSource, PodSpec, Volume};

    #[test]
    fn test_find_volume_dir_across_plugins() {
        let root = tempfile::tempdir().unwrap();
        let expected = root.path().join("uid-1/volumes/kubernetes.io~empty-dir/data");
        std::fs::create_dir_all(&expected).unwrap();
        std::fs::create_dir_all(root.path().join("uid-1/volumes/kubernetes.io~secret/token")).unwrap();

        assert_eq!(find_volume_dir(root.path(), "uid-1", "data").unwrap(), expected);
    }

    #[test]
    fn test_missing_volume_is_reported() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("uid-1/volumes/kubernetes.io~empty-dir/other")).unwrap();

        assert!(matches!(
            find_volume_dir(root.path(), "uid-1", "data"),
            Err(ReconcileError::VolumeNotFound { .. })
        ));
        assert!(matches!(
            find_volume_dir(root.path(), "uid-unknown", "data"),
            Err(ReconcileError::VolumeNotFound { .. })
        ));
    }

    #[test]
    fn test_same_volume_under_two_plugins_is_ambiguous() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("uid-1/volumes/a/data")).unwrap();
        std::fs::create_dir_all(root.path().join("uid-1/volumes/b/data")).unwrap();

        assert!(matches!(
            find_volume_dir(root.path(), "uid-1", "data"),
            Err(ReconcileError::AmbiguousVolume { count: 2, .. })
        ));
    }

    #[test]
    fn test_volume_claim_name() {
        let pod = Pod {
            spec: Some(PodSpec {
                volumes: Some(vec![
                    Volume {
                        name: "scratch".to_string(),
                        ..Default::default()
                    },
                    Volume {
                        name: "data".to_string(),
                        persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                            claim_name: "data-db-0".to_string(),
                            read_only: None,
                        }),
                        ..Default::default()
                    },
                ]),
                ..Default::default()
            }),
            ..Default::default()
        };

        assert_eq!(volume_claim_name(&pod, "data"), Some("data-db-0"));
        assert_eq!(volume_claim_name(&pod, "scratch"), None);
        assert_eq!(volume_claim_name(&pod, "missing"), None);
    }

    #[test]
    fn test_done_marker_location() {
        let volume = tempfile::tempdir().unwrap();
        let marker = write_done_marker(volume.path(), "restore-uid").unwrap();

        assert_eq!(marker, volume.path().join(".ark/restore-uid"));
        assert!(marker.is_file());
    }
}
