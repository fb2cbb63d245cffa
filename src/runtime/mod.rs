//! # Runtime
//!
//! Process lifecycle of the node agent.
//!
//! - `initialization`: crypto provider, tracing and build info
//! - `lifecycle`: the lifecycle state machine
//! - `registry`: completion barrier for background tasks
//! - `signals`: SIGTERM/SIGINT listener
//! - `orchestrator`: provision, start, wait for cancellation, join
//! - `supervisor`: wiring of the reconciliation loops

pub mod initialization;
pub mod lifecycle;
pub mod orchestrator;
pub mod registry;
pub mod signals;
pub mod supervisor;

pub use lifecycle::{Lifecycle, LifecycleError, LifecycleState};
pub use orchestrator::{Orchestrator, StartupError, Workload};
pub use registry::TaskRegistry;
pub use supervisor::{ApiHandles, NodeAgent, ReconciliationSupervisor};
