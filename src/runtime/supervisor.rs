//! # Reconciliation Supervisor
//!
//! Wires the backup and restore loops to the shared caches and runs each as
//! its own registered task.

use crate::client::ArkV1Client;
use crate::config::AgentConfig;
use crate::controller::{
    pod_volume_backup, pod_volume_restore, ControllerContext, ControllerSettings, VolumeClaims,
};
use crate::crd::{PodVolumeBackup, PodVolumeRestore};
use crate::provider::RepositoryEnvironment;
use crate::runtime::orchestrator::Workload;
use crate::runtime::registry::TaskRegistry;
use crate::watch::{NodeCaches, NodeWatches};
use kube::Api;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info_span, Instrument};

/// Typed handles the loops operate on
#[derive(Debug, Clone)]
pub struct ApiHandles {
    pub backups: Api<PodVolumeBackup>,
    pub restores: Api<PodVolumeRestore>,
    pub claims: VolumeClaims,
}

/// Starts the two reconciliation loops
#[derive(Debug, Clone)]
pub struct ReconciliationSupervisor {
    namespace: String,
    node_name: String,
    settings: ControllerSettings,
}

impl ReconciliationSupervisor {
    pub fn new(namespace: impl Into<String>, node_name: impl Into<String>, settings: ControllerSettings) -> Self {
        Self {
            namespace: namespace.into(),
            node_name: node_name.into(),
            settings,
        }
    }

    /// Spawn both loops as registered tasks; returns without waiting for them
    pub fn start(
        &self,
        caches: NodeCaches,
        apis: ApiHandles,
        environment: Arc<RepositoryEnvironment>,
        registry: &TaskRegistry,
        token: &CancellationToken,
    ) {
        let ctx = Arc::new(ControllerContext::new(
            self.namespace.clone(),
            self.node_name.clone(),
            apis.backups.clone(),
            apis.restores.clone(),
            caches.pods,
            caches.credentials,
            apis.claims,
            environment,
            self.settings.clone(),
        ));

        registry.spawn(
            format!("controller/{}", pod_volume_backup::CONTROLLER_NAME),
            pod_volume_backup::run(apis.backups, Arc::clone(&ctx), token.clone()).instrument(info_span!(
                "agent.controller",
                controller = pod_volume_backup::CONTROLLER_NAME
            )),
        );
        registry.spawn(
            format!("controller/{}", pod_volume_restore::CONTROLLER_NAME),
            pod_volume_restore::run(apis.restores, ctx, token.clone()).instrument(info_span!(
                "agent.controller",
                controller = pod_volume_restore::CONTROLLER_NAME
            )),
        );
    }
}

/// The node agent's workload: node-scoped watches feeding the two loops
#[derive(Debug)]
pub struct NodeAgent {
    client: ArkV1Client,
    namespace: String,
    node_name: String,
    supervisor: ReconciliationSupervisor,
}

impl NodeAgent {
    pub fn new(client: ArkV1Client, config: &AgentConfig) -> Self {
        let settings = ControllerSettings {
            restic_binary: config.restic_binary.clone(),
            host_pods_path: config.host_pods_path.clone(),
            requeue_min_secs: config.reconcile_error_requeue_secs,
            requeue_max_secs: config.reconcile_error_requeue_max_secs,
        };
        Self {
            client,
            namespace: config.namespace.clone(),
            node_name: config.node_name.clone(),
            supervisor: ReconciliationSupervisor::new(&config.namespace, &config.node_name, settings),
        }
    }
}

impl Workload for NodeAgent {
    type Streams = NodeCaches;

    fn start_streams(&self, registry: &TaskRegistry, token: &CancellationToken) -> NodeCaches {
        NodeWatches::new(self.client.client(), &self.namespace, &self.node_name).start(registry, token)
    }

    fn start_reconcilers(
        &self,
        streams: NodeCaches,
        environment: Arc<RepositoryEnvironment>,
        registry: &TaskRegistry,
        token: &CancellationToken,
    ) {
        let apis = ApiHandles {
            backups: self.client.pod_volume_backups(&self.namespace),
            restores: self.client.pod_volume_restores(&self.namespace),
            claims: VolumeClaims::new(self.client.client()),
        };
        self.supervisor
            .start(streams, apis, environment, registry, token);
    }
}
