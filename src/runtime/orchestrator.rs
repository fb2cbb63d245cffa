//! # Lifecycle Orchestrator
//!
//! Drives one agent run from credential provisioning to the final join:
//!
//! 1. provision repository credentials (must succeed, nothing runs before it)
//! 2. start the watch streams
//! 3. start the reconciliation loops
//! 4. install the shutdown signal listener
//! 5. block until the token is cancelled
//! 6. wait for every registered task to finish

use crate::config::ConfigError;
use crate::constants::DEFAULT_SHUTDOWN_PROGRESS_INTERVAL_SECS;
use crate::provider::{Provision, ProvisionError, RepositoryEnvironment};
use crate::runtime::lifecycle::{Lifecycle, LifecycleError, LifecycleState};
use crate::runtime::registry::TaskRegistry;
use crate::runtime::signals;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Fatal errors that abort startup or end a run abnormally
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("credential provisioning failed: {0}")]
    Provision(#[from] ProvisionError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("unable to load Kubernetes client configuration: {0}")]
    InferConfig(#[from] kube::config::InferConfigError),

    #[error("unable to create Kubernetes client: {0}")]
    Transport(#[from] kube::Error),

    #[error("task {task} stopped unexpectedly")]
    TaskFailed { task: String },
}

/// Everything the orchestrator starts once credentials are in place
///
/// Both methods must only dispatch work onto the registry and return
/// promptly; neither may wait for a stream to sync.
pub trait Workload: Send + Sync {
    /// Handles produced by the streams and consumed by the loops
    type Streams: Send;

    fn start_streams(&self, registry: &TaskRegistry, token: &CancellationToken) -> Self::Streams;

    fn start_reconcilers(
        &self,
        streams: Self::Streams,
        environment: Arc<RepositoryEnvironment>,
        registry: &TaskRegistry,
        token: &CancellationToken,
    );
}

/// Runs a [`Workload`] behind a one-shot [`Provision`] step
#[derive(Debug)]
pub struct Orchestrator<P, W> {
    provisioner: P,
    workload: W,
    location: String,
    token: CancellationToken,
    registry: TaskRegistry,
    lifecycle: Lifecycle,
    shutdown_progress_interval: Duration,
}

impl<P, W> Orchestrator<P, W>
where
    P: Provision,
    W: Workload,
{
    pub fn new(provisioner: P, workload: W, location: impl Into<String>, token: CancellationToken) -> Self {
        Self {
            provisioner,
            workload,
            location: location.into(),
            registry: TaskRegistry::new(token.clone()),
            token,
            lifecycle: Lifecycle::new(),
            shutdown_progress_interval: Duration::from_secs(DEFAULT_SHUTDOWN_PROGRESS_INTERVAL_SECS),
        }
    }

    #[must_use]
    pub fn with_shutdown_progress_interval(mut self, interval: Duration) -> Self {
        self.shutdown_progress_interval = interval;
        self
    }

    /// Observable lifecycle, e.g. for readiness probes
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle.clone()
    }

    /// Registry for auxiliary tasks that must join the shutdown barrier
    pub fn registry(&self) -> TaskRegistry {
        self.registry.clone()
    }

    /// Run until cancellation and every task has finished
    ///
    /// Returns an error without starting any stream or loop when
    /// provisioning fails, and after the full join when shutdown was caused
    /// by a task that panicked or returned early.
    pub async fn run(self) -> Result<(), StartupError> {
        let Self {
            provisioner,
            workload,
            location,
            token,
            registry,
            lifecycle,
            shutdown_progress_interval,
        } = self;

        let environment = match provisioner.provision(&location).await {
            Ok(environment) => Arc::new(environment),
            Err(e) => {
                error!(location = %location, error = %e, "Unable to provision repository credentials");
                lifecycle.advance(LifecycleState::Stopped)?;
                // Auxiliary tasks registered before run() still have to be joined
                token.cancel();
                registry.close();
                registry.wait().await;
                return Err(e.into());
            }
        };
        lifecycle.advance(LifecycleState::CredentialsReady)?;

        lifecycle.advance(LifecycleState::StreamsStarting)?;
        info!("Starting controllers");
        let streams = workload.start_streams(&registry, &token);
        workload.start_reconcilers(streams, environment, &registry, &token);
        signals::cancel_on_shutdown(&registry, token.clone());

        lifecycle.advance(LifecycleState::Running)?;
        info!(tasks = registry.len(), "Controllers started successfully");

        token.cancelled().await;

        lifecycle.advance(LifecycleState::ShuttingDown)?;
        info!("Waiting for all controllers to shut down gracefully");
        registry.close();

        let wait = registry.wait();
        tokio::pin!(wait);
        loop {
            tokio::select! {
                () = &mut wait => break,
                () = tokio::time::sleep(shutdown_progress_interval) => {
                    warn!(remaining = registry.len(), "Still waiting for tasks to finish");
                }
            }
        }

        lifecycle.advance(LifecycleState::Stopped)?;
        info!("All controllers stopped");

        match registry.first_failure() {
            Some(task) => Err(StartupError::TaskFailed { task }),
            None => Ok(()),
        }
    }
}
