//! Lockstep tree differ.
//!
//! Walks the live tree and a [`Snapshot`] side by side with an explicit
//! stack, comparing addressable units at equal positions. The first
//! structural mismatch at a depth ends that depth: the live tail is
//! re-sent as a run of replacements and the walk ascends.

use std::ops::Range;

use tracing::debug;

use crate::dom::{Document, NodeId};
use crate::filter::{elements_with_paths, is_ignored_attribute, units, Unit};
use crate::markup::serialize;
use crate::path::Path;
use crate::properties::{capture, diff_properties, PropertyTable};
use crate::record::{DiffRecord, ReplaceContent};
use crate::snapshot::{Snapshot, SnapshotKind};
use crate::types::{AttributeMap, DocType, PropertyMap};

/// Result of diffing a scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffOutcome {
    Unchanged,
    Changed(Vec<DiffRecord>),
    /// The scope root itself changed and no positional record can express
    /// it. The whole scope must be resent.
    NeedsReset,
}

impl DiffOutcome {
    /// Records of the outcome; empty unless [`DiffOutcome::Changed`].
    pub fn records(&self) -> &[DiffRecord] {
        match self {
            DiffOutcome::Changed(records) => records,
            _ => &[],
        }
    }

    pub fn is_unchanged(&self) -> bool {
        matches!(self, DiffOutcome::Unchanged)
    }
}

struct Level {
    live: Vec<Unit>,
    snap: Range<usize>,
    offset: usize,
    doc_type: DocType,
}

impl Level {
    fn snap_at(&self) -> Option<usize> {
        let index = self.snap.start + self.offset;
        (index < self.snap.end).then_some(index)
    }
}

/// Diff the live document against a snapshot captured from it earlier.
pub fn diff(doc: &Document, snapshot: &Snapshot, table: &mut PropertyTable) -> DiffOutcome {
    let root = doc.root();
    let Some(root_el) = doc.element(root) else {
        return DiffOutcome::NeedsReset;
    };
    match &snapshot.root().kind {
        SnapshotKind::Element { tag, doc_type, .. }
            if *tag == root_el.tag && *doc_type == root_el.doc_type => {}
        _ => return DiffOutcome::NeedsReset,
    }

    let mut records = Vec::new();
    let mut path = Path::root();
    compare_element(doc, root, snapshot, Snapshot::ROOT, &path, table, &mut records);

    let mut stack = vec![Level {
        live: units(doc, root),
        snap: snapshot.children(Snapshot::ROOT),
        offset: 0,
        doc_type: root_el.doc_type,
    }];

    while let Some(level) = stack.last_mut() {
        let live = level.live.get(level.offset).cloned();
        let snap = level.snap_at();

        let descend = match (live, snap) {
            (None, None) => None,
            (Some(_), None) => {
                replace_run(doc, level, &path, table, &mut records);
                None
            }
            (None, Some(s)) => {
                records.push(DiffRecord::Deleted {
                    path: path.child(level.offset),
                    doc_type: snapshot.doc_type(s),
                });
                None
            }
            (Some(unit), Some(s)) => {
                if !same_structure(doc, &unit, snapshot, s) {
                    replace_run(doc, level, &path, table, &mut records);
                    None
                } else if let Unit::Element(id) = unit {
                    let child_path = path.child(level.offset);
                    compare_element(doc, id, snapshot, s, &child_path, table, &mut records);
                    let live_children = units(doc, id);
                    let snap_children = snapshot.children(s);
                    if live_children.is_empty() && snap_children.is_empty() {
                        level.offset += 1;
                        continue;
                    }
                    let doc_type = doc.element(id).map_or(level.doc_type, |el| el.doc_type);
                    Some(Level {
                        live: live_children,
                        snap: snap_children,
                        offset: 0,
                        doc_type,
                    })
                } else {
                    level.offset += 1;
                    continue;
                }
            }
        };

        match descend {
            Some(child) => {
                path.push(stack.last().map_or(0, |l| l.offset));
                stack.push(child);
            }
            None => {
                stack.pop();
                if let Some(parent) = stack.last_mut() {
                    path.pop();
                    parent.offset += 1;
                }
            }
        }
    }

    if records.is_empty() {
        DiffOutcome::Unchanged
    } else {
        debug!(records = records.len(), "diff produced records");
        DiffOutcome::Changed(records)
    }
}

fn same_structure(doc: &Document, unit: &Unit, snapshot: &Snapshot, index: usize) -> bool {
    let Some(node) = snapshot.node(index) else {
        return false;
    };
    match (unit, &node.kind) {
        (Unit::Element(id), SnapshotKind::Element { tag, doc_type, .. }) => doc
            .element(*id)
            .map_or(false, |el| el.tag == *tag && el.doc_type == *doc_type),
        (Unit::Text { text, .. }, SnapshotKind::Text(old)) => text == old,
        _ => false,
    }
}

fn compare_element(
    doc: &Document,
    id: NodeId,
    snapshot: &Snapshot,
    index: usize,
    path: &Path,
    table: &mut PropertyTable,
    records: &mut Vec<DiffRecord>,
) {
    let (Some(el), Some(SnapshotKind::Element { attributes, properties, .. })) =
        (doc.element(id), snapshot.node(index).map(|n| &n.kind))
    else {
        return;
    };

    let (changed, removed) = diff_attributes(el.doc_type, &el.tag, attributes, &el.attributes);
    if !changed.is_empty() || !removed.is_empty() {
        records.push(DiffRecord::AttributesChanged {
            path: path.clone(),
            doc_type: el.doc_type,
            changed,
            removed,
        });
    }

    let live_props = capture(doc, id, table);
    let (changed, removed) = diff_properties(properties, &live_props);
    if !changed.is_empty() || !removed.is_empty() {
        records.push(DiffRecord::PropertiesChanged {
            path: path.clone(),
            doc_type: el.doc_type,
            changed,
            removed,
        });
    }
}

/// Symmetric attribute comparison, skipping ignored attributes.
pub fn diff_attributes(
    doc_type: DocType,
    tag: &str,
    old: &AttributeMap,
    new: &AttributeMap,
) -> (AttributeMap, Vec<String>) {
    let compared = |name: &str| !is_ignored_attribute(doc_type, tag, name);
    let changed = new
        .iter()
        .filter(|(k, v)| compared(k.as_str()) && old.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let removed = old
        .keys()
        .filter(|k| compared(k.as_str()) && !new.contains_key(*k))
        .cloned()
        .collect();
    (changed, removed)
}

/// Present properties of every element under `id`, keyed by path relative
/// to it.
pub fn subtree_properties(doc: &Document, id: NodeId, table: &mut PropertyTable) -> Vec<(Path, PropertyMap)> {
    elements_with_paths(doc, id)
        .into_iter()
        .filter_map(|(path, el)| {
            let props = capture(doc, el, table);
            (!props.is_empty()).then_some((path, props))
        })
        .collect()
}

/// `PropertiesChanged` records that bring a freshly parsed copy of the
/// whole scope up to the live property state.
pub fn property_records(doc: &Document, table: &mut PropertyTable) -> Vec<DiffRecord> {
    subtree_properties(doc, doc.root(), table)
        .into_iter()
        .map(|(path, changed)| {
            let doc_type = crate::filter::resolve_element(doc, &path)
                .ok()
                .and_then(|id| doc.element(id))
                .map_or(DocType::Html, |el| el.doc_type);
            DiffRecord::PropertiesChanged {
                path,
                doc_type,
                changed,
                removed: Vec::new(),
            }
        })
        .collect()
}

/// Emit replacements for the live units from the level's offset on.
fn replace_run(
    doc: &Document,
    level: &Level,
    parent: &Path,
    table: &mut PropertyTable,
    records: &mut Vec<DiffRecord>,
) {
    let mut i = level.offset;
    while i < level.live.len() {
        match &level.live[i] {
            Unit::Element(id) => {
                let trailing_text = match level.live.get(i + 1) {
                    Some(Unit::Text { text, .. }) => Some(text.clone()),
                    _ => None,
                };
                let doc_type = doc.element(*id).map_or(level.doc_type, |el| el.doc_type);
                records.push(DiffRecord::Replace {
                    path: parent.child(i),
                    doc_type,
                    content: ReplaceContent::Markup(serialize(doc, *id)),
                    props: subtree_properties(doc, *id, table),
                    trailing_text: trailing_text.clone(),
                });
                i += if trailing_text.is_some() { 2 } else { 1 };
            }
            Unit::Text { text, .. } => {
                records.push(DiffRecord::replace_text(parent.child(i), level.doc_type, text.clone()));
                i += 1;
            }
        }
    }
}
