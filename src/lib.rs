//! # unpack-relay
//!
//! Backend library for bots and services that accept a compressed archive,
//! extract it, classify and group the contents, and re-deliver them through
//! an outbound messaging channel — one archive job per user, processed
//! end-to-end with cancellation, password retry, and partial-failure
//! reporting.
//!
//! ## Design Philosophy
//!
//! unpack-relay is designed to be:
//! - **Transport-agnostic** - The messaging service is a trait you implement
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to events, no polling required
//! - **Cooperative** - Cancellation is observed at defined checkpoints, and
//!   working directories are released on every exit path
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use unpack_relay::{Config, Dispatcher};
//! use unpack_relay::media::{CliMediaInspector, MediaInspector, NoOpMediaInspector};
//! use unpack_relay::types::{OwnerId, SourceRef};
//!
//! # async fn example(transport: Arc<dyn unpack_relay::Transport>) -> unpack_relay::Result<()> {
//! let config = Config::default();
//!
//! // Fall back to a no-op inspector when ffprobe/ffmpeg are missing
//! let media: Arc<dyn MediaInspector> = match CliMediaInspector::from_config(&config.tools) {
//!     Some(inspector) => Arc::new(inspector),
//!     None => Arc::new(NoOpMediaInspector),
//! };
//!
//! let dispatcher = Dispatcher::new(config, transport, media).await?;
//!
//! // Subscribe to events
//! let mut events = dispatcher.subscribe();
//! tokio::spawn(async move {
//!     while let Ok(event) = events.recv().await {
//!         println!("Event: {:?}", event);
//!     }
//! });
//!
//! let source = SourceRef {
//!     message_id: 100,
//!     file_name: "photos.zip".to_string(),
//!     size_bytes: 1_048_576,
//! };
//! dispatcher.submit(OwnerId(7), source).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// File classification (MIME labels and semantic categories)
pub mod classify;
/// Configuration types
pub mod config;
/// Job dispatcher and per-owner queues (decomposed into focused submodules)
pub mod dispatcher;
/// Error types
pub mod error;
/// Archive extraction
pub mod extraction;
/// Batch grouping of classified files
pub mod grouping;
/// Media inspection and silent-audio repair
pub mod media;
/// Outbound transport trait
pub mod transport;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use dispatcher::Dispatcher;
pub use error::{Error, ExtractError, JobError, Result};
pub use extraction::ExtractOutcome;
pub use media::{CliMediaInspector, MediaInspector, MediaProbe, NoOpMediaInspector};
pub use transport::{Transport, UploadMetadata, VideoAttributes};
pub use types::{
    Batch, BatchKind, ClassifiedFile, ContentCategory, Event, JobId, JobReport, JobState,
    JobSummary, OwnerId, OwnerStatus, SourceRef, SubmitOutcome,
};

/// Helper function to run the dispatcher with graceful signal handling.
///
/// Waits for a termination signal and then calls the dispatcher's
/// `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use unpack_relay::{Dispatcher, run_with_shutdown};
///
/// # async fn example(dispatcher: Dispatcher) -> unpack_relay::Result<()> {
/// // Run with automatic signal handling
/// run_with_shutdown(dispatcher).await?;
/// # Ok(())
/// # }
/// ```
pub async fn run_with_shutdown(dispatcher: Dispatcher) -> Result<()> {
    wait_for_signal().await;
    dispatcher.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
