//! # Configuration
//!
//! Agent-level settings resolved once at startup.
//!
//! - `agent`: settings loaded from environment variables (namespace, node identity, tuning)

mod agent;

pub use agent::{AgentConfig, ConfigError};
