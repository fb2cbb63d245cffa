//! # Error Policy
//!
//! Requeue failed reconciliations with a per-resource Fibonacci backoff so
//! one failing resource never delays the others.

use crate::controller::{ControllerContext, ReconcileError};
use crate::observability::metrics;
use kube_runtime::controller::Action;
use kube::{Resource, ResourceExt};
use tracing::{error, info};

/// Backoff key of a resource: `kind/namespace/name`
pub fn resource_key<K>(object: &K) -> String
where
    K: Resource<DynamicType = ()>,
{
    format!(
        "{}/{}/{}",
        K::kind(&()),
        object.namespace().unwrap_or_default(),
        object.name_any()
    )
}

/// Count the failure and compute the requeue action for `object`
pub fn requeue_with_backoff<K>(
    controller: &'static str,
    object: &K,
    error: &ReconcileError,
    ctx: &ControllerContext,
) -> Action
where
    K: Resource<DynamicType = ()>,
{
    let name = object.name_any();
    let namespace = object.namespace().unwrap_or_default();

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "agent.reconcile.error",
        controller,
        resource.name = %name,
        resource.namespace = %namespace,
        error = %error
    );
    let _error_guard = error_span.enter();

    error!("Reconciliation error for {}/{}: {}", namespace, name, error);
    metrics::increment_reconciliation_errors(controller);

    let delay = ctx.next_backoff(&resource_key(object));
    info!("Retrying in {}s", delay.as_secs());
    Action::requeue(delay)
}
