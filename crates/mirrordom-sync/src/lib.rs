//! # MirrorDom Sync
//!
//! Session protocol for mirroring a live document tree to remote viewers.
//!
//! ## Overview
//!
//! A broadcaster diffs its live tree against snapshots, scope by scope,
//! and pushes the results to a relay. The relay keeps one change log per
//! scope and serves viewers polling for everything since their last
//! applied change id. Viewers replay the logs onto a local copy.
//!
//! ## Key Properties
//!
//! - **Ordered**: Change ids increase strictly; logs replay in id order
//! - **Self-healing**: Any desync ends in a full resend of every scope
//! - **Sanitised**: The relay stores no script, event handler or active link
//! - **Non-overlapping**: One round or poll in flight per session
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mirrordom_core::Document;
//! use mirrordom_sync::{
//!     Broadcaster, BroadcasterConfig, MemoryTransport, Relay, Viewer, ViewerConfig,
//! };
//!
//! async fn example(live: &Document) -> mirrordom_sync::Result<()> {
//!     let relay = Arc::new(Relay::in_memory());
//!     let mut broadcaster =
//!         Broadcaster::new(MemoryTransport::new(relay.clone()), BroadcasterConfig::default());
//!     let mut viewer = Viewer::new(MemoryTransport::new(relay), ViewerConfig::default());
//!
//!     broadcaster.poll(live).await?;
//!     viewer.poll().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Message Flow
//!
//! ```text
//! Broadcaster                  Relay                      Viewer
//!   |-- send_update ----------->|                           |
//!   |<- last_change_id, reset --|                           |
//!   |                           |<-------- get_update ------|
//!   |                           |--- changesets ----------->|
//! ```

pub mod broadcaster;
pub mod convergence;
pub mod error;
pub mod messages;
pub mod registry;
pub mod relay;
pub mod transport;
pub mod viewer;

pub use broadcaster::{Broadcaster, BroadcasterConfig, RoundReport};
pub use convergence::{
    active_content, scope_digests, tree_digest, verify_convergence, ConvergenceResult, TreeDigest,
};
pub use error::{Result, SyncError};
pub use messages::{
    limits, FrameMessage, GetUpdateRequest, GetUpdateResponse, InitData, SendUpdateRequest,
    SendUpdateResponse, GET_UPDATE, SEND_UPDATE,
};
pub use registry::{ScopeRegistry, ScopeState};
pub use relay::Relay;
pub use transport::{memory::MemoryTransport, Transport, TransportExt};
pub use viewer::{PendingApply, PollOutcome, Viewer, ViewerConfig, ViewerEvent, ViewerStatus};
