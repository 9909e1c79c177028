//! # MirrorDom
//!
//! The unified API for MirrorDom: keep remote copies of a live, mutable
//! document tree in sync with the original.
//!
//! ## Overview
//!
//! MirrorDom provides:
//!
//! - **Differ**: compares a live tree with a snapshot and emits
//!   positionally addressed change records
//! - **Patch applier**: replays those records onto an independent copy
//! - **Relay**: per-scope change logs with one monotonic change id
//! - **Sessions**: broadcaster and viewer state machines, including
//!   embedded frames and recovery from divergence
//! - **Driver**: a timer loop ticking a session until shut down
//!
//! ## Key Concepts
//!
//! - **Scope**: the main document or one embedded frame document.
//! - **Path**: child offsets over addressable nodes only.
//! - **Change log**: per-scope full document plus the diff sets after it.
//! - **Reset**: a full resend of a scope, the answer to any desync.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio::sync::Mutex;
//! use mirrordom::{in_memory, shutdown_channel, Document, MirrorConfig, PollDriver};
//!
//! async fn example() -> mirrordom::Result<()> {
//!     let live = Arc::new(Mutex::new(Document::html()));
//!     let config = MirrorConfig::default();
//!     let interval = config.broadcaster.poll_interval;
//!     let (mut sender, _viewer, _relay) = in_memory(config, live);
//!
//!     let (handle, shutdown) = shutdown_channel();
//!     let driver = PollDriver::new(interval);
//!     // Call handle.shutdown() from elsewhere to stop the loop.
//!     let _ = handle;
//!     driver.run(&mut sender, shutdown).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `mirrordom::core` - Document model, paths, differ and patch applier
//! - `mirrordom::store` - Relay change log storage and sanitisation
//! - `mirrordom::sync` - Session protocol, relay and convergence checks

pub mod config;
pub mod driver;
pub mod error;
pub mod session;

// Re-export component crates
pub use mirrordom_core as core;
pub use mirrordom_store as store;
pub use mirrordom_sync as sync;

// Re-export main types for convenience
pub use config::MirrorConfig;
pub use driver::{shutdown_channel, DriverReport, PollDriver, Shutdown, ShutdownHandle};
pub use error::{MirrorError, Result};
pub use session::{in_memory, BroadcastSession, Session, TickOutcome, ViewSession};

// Re-export commonly used types
pub use mirrordom_core::{DiffRecord, DocType, Document, FramePath, Path, ReadyState};
pub use mirrordom_sync::{
    verify_convergence, Broadcaster, BroadcasterConfig, ConvergenceResult, PollOutcome, Relay,
    Viewer, ViewerConfig, ViewerEvent, ViewerStatus,
};
