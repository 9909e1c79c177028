//! Immutable snapshot of a scope, the reference side of every diff.
//!
//! Nodes live in a flat arena laid out breadth-first, so each node's
//! children occupy one contiguous index range. Only addressable units are
//! captured: a coalesced text run becomes a single text node.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::dom::{Document, NodeId};
use crate::filter::{units, Unit};
use crate::path::Path;
use crate::properties::{apply_properties, capture, PropertyTable};
use crate::types::{AttributeMap, DocType, PropertyMap};

/// Payload of a snapshot node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnapshotKind {
    Element {
        tag: String,
        doc_type: DocType,
        attributes: AttributeMap,
        properties: PropertyMap,
    },
    Text(String),
}

/// One arena entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotNode {
    pub kind: SnapshotKind,
    pub parent: Option<usize>,
    pub children: Range<usize>,
}

/// Detached copy of a scope's addressable tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    nodes: Vec<SnapshotNode>,
}

impl Snapshot {
    /// Index of the root node.
    pub const ROOT: usize = 0;

    /// Capture the whole document.
    pub fn capture(doc: &Document, table: &mut PropertyTable) -> Self {
        Self::capture_from(doc, doc.root(), table)
    }

    /// Capture the subtree rooted at element `root`.
    pub fn capture_from(doc: &Document, root: NodeId, table: &mut PropertyTable) -> Self {
        let mut nodes = vec![SnapshotNode {
            kind: element_kind(doc, root, table),
            parent: None,
            children: 0..0,
        }];
        let mut queue = std::collections::VecDeque::from([(Self::ROOT, root)]);

        while let Some((index, id)) = queue.pop_front() {
            let start = nodes.len();
            for unit in units(doc, id) {
                let kind = match &unit {
                    Unit::Element(child) => {
                        queue.push_back((nodes.len(), *child));
                        element_kind(doc, *child, table)
                    }
                    Unit::Text { text, .. } => SnapshotKind::Text(text.clone()),
                };
                nodes.push(SnapshotNode {
                    kind,
                    parent: Some(index),
                    children: 0..0,
                });
            }
            nodes[index].children = start..nodes.len();
        }
        Self { nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, index: usize) -> Option<&SnapshotNode> {
        self.nodes.get(index)
    }

    pub fn root(&self) -> &SnapshotNode {
        &self.nodes[Self::ROOT]
    }

    /// Child index range of node `index`.
    pub fn children(&self, index: usize) -> Range<usize> {
        self.nodes
            .get(index)
            .map_or(0..0, |n| n.children.clone())
    }

    /// Dialect of node `index`; text nodes take their parent's.
    pub fn doc_type(&self, index: usize) -> DocType {
        let mut current = Some(index);
        while let Some(i) = current {
            match self.nodes.get(i) {
                Some(SnapshotNode {
                    kind: SnapshotKind::Element { doc_type, .. },
                    ..
                }) => return *doc_type,
                Some(node) => current = node.parent,
                None => break,
            }
        }
        DocType::Html
    }

    /// Arena index of the node at `path`.
    pub fn get(&self, path: &Path) -> Option<usize> {
        let mut index = Self::ROOT;
        for &offset in path.as_slice() {
            let range = self.children(index);
            index = range.start + offset;
            if index >= range.end {
                return None;
            }
        }
        Some(index)
    }

    /// Rebuild a live document with the captured shape.
    pub fn to_document(&self) -> Document {
        let (tag, doc_type) = match &self.root().kind {
            SnapshotKind::Element { tag, doc_type, .. } => (tag.as_str(), *doc_type),
            SnapshotKind::Text(_) => ("html", DocType::Html),
        };
        let mut doc = Document::new(tag, doc_type);
        let root = doc.root();
        let mut pending = vec![(Self::ROOT, root)];
        let mut props = Vec::new();

        while let Some((index, id)) = pending.pop() {
            if let SnapshotKind::Element { attributes, properties, .. } = &self.nodes[index].kind {
                if let Some(el) = doc.element_mut(id) {
                    el.attributes = attributes.clone();
                }
                props.push((id, properties));
            }
            for child in self.children(index) {
                let created = match &self.nodes[child].kind {
                    SnapshotKind::Element { tag, doc_type, .. } => doc.create_element(tag, *doc_type),
                    SnapshotKind::Text(text) => doc.create_text(text),
                };
                doc.append_child(id, created);
                pending.push((child, created));
            }
        }
        for (id, properties) in props {
            apply_properties(&mut doc, id, properties);
        }
        doc
    }
}

fn element_kind(doc: &Document, id: NodeId, table: &mut PropertyTable) -> SnapshotKind {
    match doc.element(id) {
        Some(el) => SnapshotKind::Element {
            tag: el.tag.clone(),
            doc_type: el.doc_type,
            attributes: el.attributes.clone(),
            properties: capture(doc, id, table),
        },
        None => SnapshotKind::Text(doc.text(id).unwrap_or_default().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PropValue;

    #[test]
    fn test_capture_layout() {
        let doc = Document::parse(
            "<html><head><title>x</title></head><body>\n<ul><li>a</li><li>b</li></ul>\n<p>hi <!-- c -->there</p></body></html>",
        )
        .unwrap();
        let snap = Snapshot::capture(&doc, &mut PropertyTable::new());

        assert_eq!(snap.children(Snapshot::ROOT).len(), 2);
        let head = snap.get(&Path::new(vec![0])).unwrap();
        assert!(snap.children(head).is_empty());

        let li = snap.get(&Path::new(vec![1, 0, 1])).unwrap();
        assert!(matches!(&snap.node(li).unwrap().kind, SnapshotKind::Element { tag, .. } if tag == "li"));

        let run = snap.get(&Path::new(vec![1, 1, 0])).unwrap();
        assert_eq!(snap.node(run).unwrap().kind, SnapshotKind::Text("hi there".into()));
        assert_eq!(snap.doc_type(run), DocType::Html);
        assert!(snap.get(&Path::new(vec![1, 2])).is_none());
    }

    #[test]
    fn test_children_are_contiguous() {
        let doc = Document::parse("<html><head/><body><div><a/><b/></div><div><i/></div></body></html>").unwrap();
        let snap = Snapshot::capture(&doc, &mut PropertyTable::new());
        for i in 0..snap.len() {
            for child in snap.children(i) {
                assert_eq!(snap.node(child).unwrap().parent, Some(i));
            }
        }
    }

    #[test]
    fn test_capture_properties_and_rebuild() {
        let mut doc = Document::parse(r#"<html><head/><body><input type="checkbox"/></body></html>"#).unwrap();
        let input = doc.children(doc.body().unwrap())[0];
        doc.element_mut(input)
            .unwrap()
            .properties
            .insert("checked".into(), PropValue::Bool(true));

        let mut table = PropertyTable::new();
        let snap = Snapshot::capture(&doc, &mut table);
        let rebuilt = snap.to_document();
        assert_eq!(Snapshot::capture(&rebuilt, &mut table), snap);
    }

    #[test]
    fn test_serde_round_trip() {
        let doc = Document::parse("<html><head/><body><p>x</p></body></html>").unwrap();
        let snap = Snapshot::capture(&doc, &mut PropertyTable::new());
        let json = serde_json::to_string(&snap).unwrap();
        let back: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snap);
    }
}
