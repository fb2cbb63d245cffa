//! # Initialization
//!
//! Process-wide setup performed before the orchestrator runs: rustls crypto
//! provider, tracing subscriber and build info.

use crate::cli::LogLevel;
use tracing::info;

/// Install ring as the rustls crypto provider
///
/// Required for rustls 0.23+ before any TLS connection is made. Installing
/// twice is harmless.
pub fn install_crypto_provider() {
    // Err means a provider is already installed
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// Set up the tracing subscriber
///
/// `RUST_LOG` takes precedence over the CLI log level when set.
pub fn init_tracing(level: LogLevel) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| level.directive().into()),
        )
        .init();
}

pub fn log_build_info() {
    info!(
        "Build info: datetime={}, git_hash={}",
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_SHA")
    );
}
