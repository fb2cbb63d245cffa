//! # Pod Volume Restore Loop
//!
//! Restores restic snapshots into volumes of pods running on this node.
//! A restore whose pod is not in the node's pod cache belongs to another
//! agent (or its pod is not scheduled yet) and is left untouched until a
//! pod cache change names it.

use crate::constants::WATCH_TIMEOUT_SECS;
use crate::controller::error_policy::{requeue_with_backoff, resource_key};
use crate::controller::restic::{write_password_file, ResticCommand};
use crate::controller::volume::{find_volume_dir, write_done_marker};
use crate::controller::{now_rfc3339, patch_status, ControllerContext, ReconcileError};
use crate::crd::{PodVolumePhase, PodVolumeRestore, PodVolumeRestoreStatus};
use crate::observability::metrics;
use crate::watch::{WatchCache, WatchChange};
use futures::{stream, Stream, StreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube_runtime::controller::{self, Action, Controller};
use kube_runtime::reflector::{ObjectRef, Store};
use kube_runtime::watcher;
use kube::{Api, ResourceExt};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

/// Controller name used in metrics and logs
pub const CONTROLLER_NAME: &str = "pod-volume-restore";

pub fn is_pending(restore: &PodVolumeRestore) -> bool {
    PodVolumePhase::is_pending(restore.status.as_ref().and_then(|status| status.phase))
}

/// Run the restore loop until the token is cancelled
pub async fn run(api: Api<PodVolumeRestore>, ctx: Arc<ControllerContext>, token: CancellationToken) {
    if !ctx.wait_for_caches(&token).await {
        info!("Pod volume restore controller stopped before caches synced");
        return;
    }

    info!("Starting pod volume restore controller");
    let restores = Controller::new(api, watcher::Config::default().timeout(WATCH_TIMEOUT_SECS));
    let triggers = pod_change_triggers(&ctx.pods, restores.store());
    restores
        .with_config(controller::Config::default().concurrency(1))
        .reconcile_on(triggers)
        .graceful_shutdown_on(token.cancelled_owned())
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((object, _)) => debug!(restore = %object.name, "Reconciled pod volume restore"),
                Err(e) => warn!(error = %e, "Pod volume restore controller error"),
            }
        })
        .await;
    info!("Pod volume restore controller stopped");
}

pub async fn reconcile(
    restore: Arc<PodVolumeRestore>,
    ctx: Arc<ControllerContext>,
) -> Result<Action, ReconcileError> {
    if !is_pending(&restore) {
        return Ok(Action::await_change());
    }

    let Some(pod) = ctx.pod(&restore.spec.pod) else {
        debug!(restore = %restore.name_any(), pod = %restore.spec.pod.key(), "Pod not on this node");
        return Ok(Action::await_change());
    };

    let name = restore.name_any();
    let span = info_span!(
        "agent.reconcile",
        controller = CONTROLLER_NAME,
        restore = %name,
        pod = %restore.spec.pod.key(),
        volume = %restore.spec.volume,
        snapshot = %restore.spec.snapshot_id
    );

    async move {
        metrics::increment_reconciliations(CONTROLLER_NAME);
        info!("Restore starting");

        let mut status = PodVolumeRestoreStatus {
            phase: Some(PodVolumePhase::InProgress),
            start_timestamp: Some(now_rfc3339()),
            ..Default::default()
        };
        patch_status(&ctx.restores, &name, &status).await?;

        let pod_uid = pod
            .metadata
            .uid
            .clone()
            .or_else(|| restore.spec.pod.uid.clone());
        match restore_volume(&restore, pod_uid, &ctx).await {
            Ok(()) => {
                info!("Restore completed");
                status.phase = Some(PodVolumePhase::Completed);
            }
            Err(e) => {
                warn!(error = %e, "Restore failed");
                status.phase = Some(PodVolumePhase::Failed);
                status.message = Some(e.to_string());
            }
        }
        status.completion_timestamp = Some(now_rfc3339());
        patch_status(&ctx.restores, &name, &status).await?;

        ctx.reset_backoff(&resource_key(restore.as_ref()));
        Ok(Action::await_change())
    }
    .instrument(span)
    .await
}

fn error_policy(restore: Arc<PodVolumeRestore>, error: &ReconcileError, ctx: Arc<ControllerContext>) -> Action {
    requeue_with_backoff(CONTROLLER_NAME, restore.as_ref(), error, &ctx)
}

/// Pending restores whose pod may have just appeared in the pod cache
fn restores_for_pod_change(
    change: &WatchChange<Pod>,
    restores: &Store<PodVolumeRestore>,
) -> Vec<ObjectRef<PodVolumeRestore>> {
    let targets = |restore: &PodVolumeRestore| match change {
        WatchChange::Applied(pod) => {
            pod.metadata.namespace.as_deref() == Some(restore.spec.pod.namespace.as_str())
                && pod.metadata.name.as_deref() == Some(restore.spec.pod.name.as_str())
        }
        WatchChange::Resynced => true,
        WatchChange::Deleted(_) => false,
    };

    restores
        .state()
        .iter()
        .filter(|restore| is_pending(restore) && targets(restore))
        .map(|restore| ObjectRef::from_obj(&**restore))
        .collect()
}

/// Reconcile triggers derived from pod cache notifications
///
/// A lagging subscriber re-checks every pending restore, the same as a resync.
fn pod_change_triggers(
    pods: &WatchCache<Pod>,
    restores: Store<PodVolumeRestore>,
) -> impl Stream<Item = ObjectRef<PodVolumeRestore>> + Send + 'static {
    stream::unfold(pods.subscribe(), |mut changes| async move {
        let change = match changes.recv().await {
            Ok(change) => change,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Pod change notifications lagged, re-checking pending restores");
                WatchChange::Resynced
            }
            Err(RecvError::Closed) => return None,
        };
        Some((change, changes))
    })
    .flat_map(move |change| stream::iter(restores_for_pod_change(&change, &restores)))
}

async fn restore_volume(
    restore: &PodVolumeRestore,
    pod_uid: Option<String>,
    ctx: &ControllerContext,
) -> Result<(), ReconcileError> {
    let spec = &restore.spec;
    let pod_uid = pod_uid.ok_or_else(|| ReconcileError::MissingPodUid(spec.pod.key()))?;
    let volume_dir = find_volume_dir(&ctx.settings.host_pods_path, &pod_uid, &spec.volume)?;

    let password = ctx.repository_password()?;
    let password_file = write_password_file(&password)?;

    ResticCommand::restore(
        &ctx.settings.restic_binary,
        &spec.repo_identifier,
        password_file.path(),
        &spec.snapshot_id,
        &volume_dir,
    )
    .run(&ctx.environment)
    .await?;

    // Lets the pod's init container know the volume is ready
    let restore_uid = restore.uid().unwrap_or_else(|| restore.name_any());
    let marker = write_done_marker(&volume_dir, &restore_uid)?;
    debug!(marker = %marker.display(), "Wrote restore done marker");
    Ok(())
}
