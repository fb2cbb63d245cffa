//! # Pod Volume Backup Loop
//!
//! Backs up pod volumes on this node with restic:
//!
//! 1. skip backups for other nodes and backups already picked up
//! 2. mark the backup `InProgress`
//! 3. resolve the volume directory of the cached pod
//! 4. run `restic backup`, then `restic snapshots` to read the snapshot id
//! 5. record `Completed` (path and snapshot id) or `Failed` (message)

use crate::constants::{PVC_UID_TAG, WATCH_TIMEOUT_SECS};
use crate::controller::error_policy::{requeue_with_backoff, resource_key};
use crate::controller::restic::{parse_snapshot_id, write_password_file, ResticCommand};
use crate::controller::volume::{find_volume_dir, volume_claim_name};
use crate::controller::{now_rfc3339, patch_status, ControllerContext, ReconcileError};
use crate::crd::{PodVolumeBackup, PodVolumeBackupStatus, PodVolumePhase};
use crate::observability::metrics;
use futures::StreamExt;
use kube_runtime::controller::{self, Action, Controller};
use kube_runtime::watcher;
use kube::{Api, ResourceExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

/// Controller name used in metrics and logs
pub const CONTROLLER_NAME: &str = "pod-volume-backup";

/// Outcome of a successful backup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupOutcome {
    pub path: String,
    pub snapshot_id: String,
}

/// Whether this agent should pick up `backup`
pub fn should_process(backup: &PodVolumeBackup, node_name: &str) -> bool {
    backup.spec.node == node_name
        && PodVolumePhase::is_pending(backup.status.as_ref().and_then(|status| status.phase))
}

/// Run the backup loop until the token is cancelled
///
/// One worker: a backup in flight is finished before the next starts, and
/// the loop drains in-flight work before returning on shutdown.
pub async fn run(api: Api<PodVolumeBackup>, ctx: Arc<ControllerContext>, token: CancellationToken) {
    if !ctx.wait_for_caches(&token).await {
        info!("Pod volume backup controller stopped before caches synced");
        return;
    }

    info!("Starting pod volume backup controller");
    Controller::new(api, watcher::Config::default().timeout(WATCH_TIMEOUT_SECS))
        .with_config(controller::Config::default().concurrency(1))
        .graceful_shutdown_on(token.cancelled_owned())
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((object, _)) => debug!(backup = %object.name, "Reconciled pod volume backup"),
                Err(e) => warn!(error = %e, "Pod volume backup controller error"),
            }
        })
        .await;
    info!("Pod volume backup controller stopped");
}

pub async fn reconcile(
    backup: Arc<PodVolumeBackup>,
    ctx: Arc<ControllerContext>,
) -> Result<Action, ReconcileError> {
    if !should_process(&backup, &ctx.node_name) {
        return Ok(Action::await_change());
    }

    let name = backup.name_any();
    let span = info_span!(
        "agent.reconcile",
        controller = CONTROLLER_NAME,
        backup = %name,
        pod = %backup.spec.pod.key(),
        volume = %backup.spec.volume
    );

    async move {
        metrics::increment_reconciliations(CONTROLLER_NAME);
        info!("Backup starting");

        let mut status = PodVolumeBackupStatus {
            phase: Some(PodVolumePhase::InProgress),
            start_timestamp: Some(now_rfc3339()),
            ..Default::default()
        };
        patch_status(&ctx.backups, &name, &status).await?;

        match back_up_volume(&backup, &ctx).await {
            Ok(outcome) => {
                info!(snapshot = %outcome.snapshot_id, path = %outcome.path, "Backup completed");
                status.phase = Some(PodVolumePhase::Completed);
                status.path = Some(outcome.path);
                status.snapshot_id = Some(outcome.snapshot_id);
            }
            Err(e) => {
                warn!(error = %e, "Backup failed");
                status.phase = Some(PodVolumePhase::Failed);
                status.message = Some(e.to_string());
            }
        }
        status.completion_timestamp = Some(now_rfc3339());
        patch_status(&ctx.backups, &name, &status).await?;

        ctx.reset_backoff(&resource_key(backup.as_ref()));
        Ok(Action::await_change())
    }
    .instrument(span)
    .await
}

fn error_policy(backup: Arc<PodVolumeBackup>, error: &ReconcileError, ctx: Arc<ControllerContext>) -> Action {
    requeue_with_backoff(CONTROLLER_NAME, backup.as_ref(), error, &ctx)
}

async fn back_up_volume(backup: &PodVolumeBackup, ctx: &ControllerContext) -> Result<BackupOutcome, ReconcileError> {
    let spec = &backup.spec;
    let pod = ctx
        .pod(&spec.pod)
        .ok_or_else(|| ReconcileError::PodNotFound(spec.pod.key()))?;
    let pod_uid = pod
        .metadata
        .uid
        .clone()
        .or_else(|| spec.pod.uid.clone())
        .ok_or_else(|| ReconcileError::MissingPodUid(spec.pod.key()))?;

    let path = find_volume_dir(&ctx.settings.host_pods_path, &pod_uid, &spec.volume)?;

    let mut tags = spec.tags.clone();
    if let Some(claim) = volume_claim_name(&pod, &spec.volume) {
        if let Some(claim_uid) = ctx.claims.claim_uid(&spec.pod.namespace, claim).await? {
            tags.insert(PVC_UID_TAG.to_string(), claim_uid);
        }
    }

    let password = ctx.repository_password()?;
    let password_file = write_password_file(&password)?;
    let binary = &ctx.settings.restic_binary;

    ResticCommand::backup(binary, &spec.repo_identifier, password_file.path(), &path, &tags)
        .run(&ctx.environment)
        .await?;

    let snapshots = ResticCommand::snapshots(binary, &spec.repo_identifier, password_file.path(), &snapshot_tags(&tags))
        .run(&ctx.environment)
        .await?;

    Ok(BackupOutcome {
        path: path.display().to_string(),
        snapshot_id: parse_snapshot_id(&snapshots)?,
    })
}

/// Tags used to find the snapshot just taken
///
/// The `pvc-uid` tag is shared by every backup of a claim, so it is left out.
fn snapshot_tags(tags: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    tags.iter()
        .filter(|(key, _)| key.as_str() != PVC_UID_TAG)
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{PodReference, PodVolumeBackupSpec};
    use crate::testing::{
        controller_context, empty_list, fake_client, mark_synced, node_caches, Reply, NAMESPACE, NODE,
    };
    use axum::http::StatusCode;
    use std::path::Path;
    use std::time::Duration;

    fn backup(node: &str, phase: Option<PodVolumePhase>) -> PodVolumeBackup {
        let mut backup = PodVolumeBackup::new(
            "backup-1-abcde",
            PodVolumeBackupSpec {
                node: node.to_string(),
                pod: PodReference {
                    namespace: "shop".to_string(),
                    name: "db-0".to_string(),
                    uid: None,
                },
                volume: "data".to_string(),
                repo_identifier: "repo".to_string(),
                tags: BTreeMap::new(),
            },
        );
        backup.metadata.namespace = Some(NAMESPACE.to_string());
        backup.status = phase.map(|phase| PodVolumeBackupStatus {
            phase: Some(phase),
            ..Default::default()
        });
        backup
    }

    #[test]
    fn test_only_pending_backups_for_this_node_are_processed() {
        assert!(should_process(&backup("node-7", None), "node-7"));
        assert!(should_process(&backup("node-7", Some(PodVolumePhase::New)), "node-7"));
        assert!(!should_process(&backup("node-8", None), "node-7"));
        assert!(!should_process(&backup("node-7", Some(PodVolumePhase::InProgress)), "node-7"));
        assert!(!should_process(&backup("node-7", Some(PodVolumePhase::Completed)), "node-7"));
        assert!(!should_process(&backup("node-7", Some(PodVolumePhase::Failed)), "node-7"));
    }

    #[test]
    fn test_snapshot_lookup_ignores_claim_tag() {
        let tags = BTreeMap::from([
            ("backup".to_string(), "nightly".to_string()),
            (PVC_UID_TAG.to_string(), "claim-uid".to_string()),
        ]);

        let lookup = snapshot_tags(&tags);
        assert_eq!(lookup.len(), 1);
        assert_eq!(lookup.get("backup").map(String::as_str), Some("nightly"));
    }

    #[tokio::test]
    async fn test_backup_loop_waits_for_caches_before_listing() {
        let (client, requests) = fake_client(|_, _, uri| {
            if uri.contains("watch=true") {
                Reply::Hang
            } else {
                empty_list("ark.heptio.com/v1", "PodVolumeBackupList")
            }
        });
        let ((pods, mut pod_writer), (credentials, mut credential_writer)) = node_caches();
        let ctx = Arc::new(controller_context(client.clone(), pods, credentials, Path::new("/host_pods")));
        let token = CancellationToken::new();
        let task = tokio::spawn(run(Api::namespaced(client, NAMESPACE), ctx, token.clone()));

        // Only the pod cache is synced: a pending backup would see no password yet
        mark_synced(&mut pod_writer);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(requests.len(), 0, "no backup may be listed before both caches sync");

        mark_synced(&mut credential_writer);
        tokio::time::timeout(Duration::from_secs(5), async {
            while requests.len() == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("backup loop should start once the caches synced");
        assert!(requests.requests()[0].contains("/apis/ark.heptio.com/v1/namespaces/heptio-ark/podvolumebackups"));

        token.cancel();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("backup loop should stop on cancellation")
            .unwrap();
    }

    #[tokio::test]
    async fn test_backup_of_pod_missing_from_synced_cache_is_marked_failed() {
        let pending = backup(NODE, None);
        let echoed = serde_json::to_value(&pending).unwrap();
        let (client, requests) = fake_client(move |_, _, _| Reply::Json(StatusCode::OK, echoed.clone()));
        let ((pods, mut pod_writer), (credentials, mut credential_writer)) = node_caches();
        mark_synced(&mut pod_writer);
        mark_synced(&mut credential_writer);
        let ctx = Arc::new(controller_context(client, pods, credentials, Path::new("/host_pods")));

        let action = reconcile(Arc::new(pending), ctx).await.unwrap();

        assert_eq!(action, Action::await_change());
        let patches: Vec<_> = requests
            .requests()
            .into_iter()
            .filter(|request| request.starts_with("PATCH") && request.contains("/podvolumebackups/backup-1-abcde/status"))
            .collect();
        assert_eq!(patches.len(), 2, "expected InProgress then Failed: {patches:?}");
    }

    #[tokio::test]
    async fn test_backup_for_other_node_is_ignored() {
        let (client, requests) = fake_client(|_, _, _| Reply::Hang);
        let ((pods, _), (credentials, _)) = node_caches();
        let ctx = Arc::new(controller_context(client, pods, credentials, Path::new("/host_pods")));

        let action = reconcile(Arc::new(backup("node-9", None)), ctx).await.unwrap();

        assert_eq!(action, Action::await_change());
        assert_eq!(requests.len(), 0);
    }
}
