//! In-memory implementation of the ChangeStore trait.
//!
//! Logs live for as long as the store; there is no persistence.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use tracing::debug;

use mirrordom_core::{DiffRecord, FramePath};

use crate::changelog::{ChangeEntry, Changelog, ErrorCode};
use crate::error::{Result, StoreError};
use crate::traits::ChangeStore;

/// In-memory store. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Change logs by scope.
    changelogs: HashMap<FramePath, Changelog>,

    /// Last allocated change id.
    last_change_id: Option<u64>,
}

impl MemoryStoreInner {
    fn allocate(&mut self) -> u64 {
        let next = self.last_change_id.map_or(0, |id| id + 1);
        self.last_change_id = Some(next);
        next
    }
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner.write().map_err(|_| StoreError::LockPoisoned)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChangeStore for MemoryStore {
    async fn next_change_id(&self) -> Result<u64> {
        Ok(self.write()?.allocate())
    }

    async fn last_change_id(&self) -> Result<Option<u64>> {
        Ok(self.read()?.last_change_id)
    }

    async fn init_frame(
        &self,
        frame: &FramePath,
        init_html: String,
        props: Vec<DiffRecord>,
        url: Option<String>,
    ) -> Result<u64> {
        let mut inner = self.write()?;
        let id = inner.allocate();
        let mut log = Changelog::new(init_html, id, url);
        log.add_diff_set(id, props);
        inner.changelogs.insert(frame.clone(), log);
        Ok(id)
    }

    async fn add_diffs(&self, frame: &FramePath, diffs: Vec<DiffRecord>) -> Result<u64> {
        let mut inner = self.write()?;
        let id = inner.allocate();
        let log = inner
            .changelogs
            .get_mut(frame)
            .ok_or_else(|| StoreError::UnknownFrame(frame.to_string()))?;
        log.add_diff_set(id, diffs);
        Ok(id)
    }

    async fn record_error(&self, frame: &FramePath, code: ErrorCode, message: String) -> Result<u64> {
        let mut inner = self.write()?;
        let id = inner.allocate();
        inner
            .changelogs
            .insert(frame.clone(), Changelog::failed(code, message, id));
        Ok(id)
    }

    async fn changelog(&self, frame: &FramePath) -> Result<Option<Changelog>> {
        Ok(self.read()?.changelogs.get(frame).cloned())
    }

    async fn frames(&self) -> Result<Vec<FramePath>> {
        let mut frames: Vec<FramePath> = self.read()?.changelogs.keys().cloned().collect();
        frames.sort();
        Ok(frames)
    }

    async fn remove_descendants(&self, frame: &FramePath) -> Result<Vec<FramePath>> {
        let mut inner = self.write()?;
        let doomed: Vec<FramePath> = inner
            .changelogs
            .keys()
            .filter(|f| f.len() > frame.len() && f.is_within(frame))
            .cloned()
            .collect();
        for f in &doomed {
            debug!(frame = %f, parent = %frame, "removing nested scope of restarted frame");
            inner.changelogs.remove(f);
        }
        Ok(doomed)
    }

    async fn update_frames(&self, active: &[FramePath]) -> Result<Vec<FramePath>> {
        let mut inner = self.write()?;
        let doomed: Vec<FramePath> = inner
            .changelogs
            .keys()
            .filter(|f| !f.is_main() && !active.contains(f))
            .cloned()
            .collect();
        if !doomed.is_empty() {
            debug!(count = doomed.len(), "dropping logs of inactive frames");
        }
        for f in &doomed {
            inner.changelogs.remove(f);
        }
        Ok(doomed)
    }

    async fn clear(&self) -> Result<()> {
        self.write()?.changelogs.clear();
        Ok(())
    }

    async fn changes_since(&self, since: Option<u64>) -> Result<Vec<(FramePath, ChangeEntry)>> {
        let inner = self.read()?;
        let mut changes: Vec<(FramePath, ChangeEntry)> = inner
            .changelogs
            .iter()
            .map(|(frame, log)| (frame.clone(), log.diffs_since(since)))
            .collect();
        changes.sort_by(|(a, _), (b, _)| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
        Ok(changes)
    }
}
