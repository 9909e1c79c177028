//! ChangeStore trait: the abstract interface for per-scope change logs.
//!
//! The relay is storage-agnostic; it only talks to this trait. The bundled
//! implementation is [`MemoryStore`](crate::MemoryStore).

use async_trait::async_trait;
use mirrordom_core::{DiffRecord, FramePath};

use crate::changelog::{ChangeEntry, Changelog, ErrorCode};
use crate::error::Result;

/// Async interface for change log persistence.
///
/// # Design Notes
///
/// - **Shared counter**: every scope draws ids from one strictly increasing
///   counter; the first id is 0.
/// - **Scope ordering**: [`ChangeStore::changes_since`] returns containing
///   scopes before the scopes nested in them.
/// - **Main scope**: `["m"]` is never dropped by [`ChangeStore::update_frames`].
#[async_trait]
pub trait ChangeStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Counter
    // ─────────────────────────────────────────────────────────────────────────

    /// Allocate the next change id.
    async fn next_change_id(&self) -> Result<u64>;

    /// Most recently allocated id, `None` before the first change.
    async fn last_change_id(&self) -> Result<Option<u64>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Change logs
    // ─────────────────────────────────────────────────────────────────────────

    /// Start a fresh log for `frame` from a full document.
    ///
    /// `props` becomes the first diff set and shares the log's first id.
    async fn init_frame(
        &self,
        frame: &FramePath,
        init_html: String,
        props: Vec<DiffRecord>,
        url: Option<String>,
    ) -> Result<u64>;

    /// Append a diff set to the log of `frame`.
    ///
    /// Fails with `UnknownFrame` when the scope has no log; the id is
    /// consumed either way.
    async fn add_diffs(&self, frame: &FramePath, diffs: Vec<DiffRecord>) -> Result<u64>;

    /// Replace the log of `frame` with a failure report.
    async fn record_error(&self, frame: &FramePath, code: ErrorCode, message: String) -> Result<u64>;

    /// The log of `frame`, if any.
    async fn changelog(&self, frame: &FramePath) -> Result<Option<Changelog>>;

    /// All scopes with a log.
    async fn frames(&self) -> Result<Vec<FramePath>>;

    /// Drop the logs of scopes nested inside `frame`. Returns the dropped
    /// scopes.
    async fn remove_descendants(&self, frame: &FramePath) -> Result<Vec<FramePath>>;

    /// Drop the logs of scopes not listed in `active`, except the main
    /// scope. Returns the dropped scopes.
    async fn update_frames(&self, active: &[FramePath]) -> Result<Vec<FramePath>>;

    /// Drop every log.
    async fn clear(&self) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    /// Entries for every scope since `since`, shortest frame path first.
    async fn changes_since(&self, since: Option<u64>) -> Result<Vec<(FramePath, ChangeEntry)>>;

    /// Whether the main scope was (re)initialized at or after `change_id`.
    async fn has_main_reset_since(&self, change_id: Option<u64>) -> Result<bool> {
        let Some(main) = self.changelog(&FramePath::main()).await? else {
            return Ok(false);
        };
        if main.is_error() {
            return Ok(false);
        }
        Ok(change_id.map_or(true, |id| main.first_change_id >= id))
    }
}
