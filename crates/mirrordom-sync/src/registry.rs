//! Broadcaster-side registry of scopes and their snapshots.

use std::collections::BTreeMap;

use tracing::debug;

use mirrordom_core::{DiffRecord, FrameStep, FramePath, Path, Snapshot};

/// What the broadcaster remembers about one scope.
#[derive(Debug, Clone)]
pub struct ScopeState {
    /// Diff baseline.
    pub snapshot: Snapshot,
    /// Generation of the document the snapshot was taken from.
    pub generation: u64,
    /// The next round must send the scope whole.
    pub needs_reset: bool,
}

impl ScopeState {
    pub fn new(snapshot: Snapshot, generation: u64) -> Self {
        Self {
            snapshot,
            generation,
            needs_reset: false,
        }
    }
}

/// Scopes keyed by frame path.
#[derive(Debug, Default)]
pub struct ScopeRegistry {
    scopes: BTreeMap<FramePath, ScopeState>,
}

impl ScopeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    pub fn contains(&self, frame: &FramePath) -> bool {
        self.scopes.contains_key(frame)
    }

    pub fn get(&self, frame: &FramePath) -> Option<&ScopeState> {
        self.scopes.get(frame)
    }

    pub fn get_mut(&mut self, frame: &FramePath) -> Option<&mut ScopeState> {
        self.scopes.get_mut(frame)
    }

    pub fn insert(&mut self, frame: FramePath, state: ScopeState) {
        self.scopes.insert(frame, state);
    }

    pub fn frames(&self) -> impl Iterator<Item = &FramePath> {
        self.scopes.keys()
    }

    /// Forget every scope nested inside `frame`.
    pub fn remove_descendants(&mut self, frame: &FramePath) -> Vec<FramePath> {
        let doomed: Vec<FramePath> = self
            .scopes
            .keys()
            .filter(|f| f.len() > frame.len() && f.is_within(frame))
            .cloned()
            .collect();
        for f in &doomed {
            self.scopes.remove(f);
        }
        doomed
    }

    /// Forget the scopes nested in `frame` whose frame element is removed
    /// by one of the structural `records` just diffed in `frame`.
    pub fn remove_truncated(&mut self, frame: &FramePath, records: &[DiffRecord]) -> Vec<FramePath> {
        let structural: Vec<&Path> = records
            .iter()
            .filter(|r| r.is_structural())
            .map(DiffRecord::path)
            .collect();
        if structural.is_empty() {
            return Vec::new();
        }
        let doomed: Vec<FramePath> = self
            .scopes
            .keys()
            .filter(|f| match host_path(frame, f) {
                Some(host) => structural.iter().any(|p| p.truncates(&host)),
                None => false,
            })
            .cloned()
            .collect();
        for f in &doomed {
            debug!(frame = %f, "frame element replaced, dropping scope");
            self.scopes.remove(f);
        }
        doomed
    }

    /// Keep the main scope and the scopes listed in `active`.
    pub fn retain_active(&mut self, active: &[FramePath]) -> Vec<FramePath> {
        let doomed: Vec<FramePath> = self
            .scopes
            .keys()
            .filter(|f| !f.is_main() && !active.contains(f))
            .cloned()
            .collect();
        for f in &doomed {
            self.scopes.remove(f);
        }
        doomed
    }

    /// Make every scope go out whole on the next round.
    pub fn mark_all_for_reset(&mut self) {
        for state in self.scopes.values_mut() {
            state.needs_reset = true;
        }
    }

    pub fn clear(&mut self) {
        self.scopes.clear();
    }
}

/// Path, inside the scope `outer`, of the frame element leading towards
/// the nested scope `inner`.
fn host_path(outer: &FramePath, inner: &FramePath) -> Option<Path> {
    if inner.len() <= outer.len() || !inner.is_within(outer) {
        return None;
    }
    let offsets: Vec<usize> = inner.steps()[outer.len()..]
        .iter()
        .map_while(|step| match step {
            FrameStep::Offset(n) => Some(*n),
            _ => None,
        })
        .collect();
    if offsets.is_empty() {
        None
    } else {
        Some(Path::new(offsets))
    }
}
