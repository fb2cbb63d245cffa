//! # Lifecycle
//!
//! Process lifecycle state machine:
//!
//! ```text
//! Initializing -> CredentialsReady -> StreamsStarting -> Running -> ShuttingDown -> Stopped
//!      |                                                                              ^
//!      +------------------------- provisioning failure ------------------------------+
//! ```

use crate::observability::metrics;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Initializing,
    CredentialsReady,
    StreamsStarting,
    /// Every stream and loop has been dispatched; caches may still be syncing
    Running,
    ShuttingDown,
    Stopped,
}

impl LifecycleState {
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Initializing, Self::CredentialsReady | Self::Stopped)
                | (Self::CredentialsReady, Self::StreamsStarting)
                | (Self::StreamsStarting, Self::Running)
                | (Self::Running, Self::ShuttingDown)
                | (Self::ShuttingDown, Self::Stopped)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initializing => "Initializing",
            Self::CredentialsReady => "CredentialsReady",
            Self::StreamsStarting => "StreamsStarting",
            Self::Running => "Running",
            Self::ShuttingDown => "ShuttingDown",
            Self::Stopped => "Stopped",
        }
    }

    fn metric_value(self) -> i64 {
        match self {
            Self::Initializing => 0,
            Self::CredentialsReady => 1,
            Self::StreamsStarting => 2,
            Self::Running => 3,
            Self::ShuttingDown => 4,
            Self::Stopped => 5,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("illegal lifecycle transition from {from} to {to}")]
    IllegalTransition {
        from: LifecycleState,
        to: LifecycleState,
    },
}

/// Shared, observable lifecycle state
#[derive(Debug, Clone)]
pub struct Lifecycle {
    state: Arc<watch::Sender<LifecycleState>>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        metrics::set_lifecycle_state(LifecycleState::Initializing.metric_value());
        let (state, _) = watch::channel(LifecycleState::Initializing);
        Self {
            state: Arc::new(state),
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Move to `next`, rejecting transitions the state machine does not allow
    pub fn advance(&self, next: LifecycleState) -> Result<(), LifecycleError> {
        let mut result = Ok(());
        self.state.send_if_modified(|current| {
            if current.can_transition_to(next) {
                info!(from = %current, to = %next, "Lifecycle transition");
                *current = next;
                true
            } else {
                result = Err(LifecycleError::IllegalTransition {
                    from: *current,
                    to: next,
                });
                false
            }
        });

        if result.is_ok() {
            metrics::set_lifecycle_state(next.metric_value());
        }
        result
    }

    /// Wait until the lifecycle reaches `target`
    pub async fn wait_for(&self, target: LifecycleState) {
        let mut receiver = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close while waiting
        let _ = receiver.wait_for(|state| *state == target).await;
    }
}
