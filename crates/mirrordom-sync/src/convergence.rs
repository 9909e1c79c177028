//! Convergence verification between a live document and its mirror.
//!
//! Each scope is reduced to a deterministic digest over its addressable
//! tree: the nodes every path sees, their attributes and their captured
//! properties. Two scopes converge when their digests match and the
//! mirror holds nothing the relay would have scrubbed.

use std::fmt;

use mirrordom_core::filter::{
    elements_with_paths, is_ignored_attribute, scope_document, units, Unit, IGNORED_TAGS,
};
use mirrordom_core::properties::capture;
use mirrordom_core::{Document, FramePath, NodeId, PropValue, PropertyTable};
use mirrordom_store::sanitise::{is_active_attribute, sanitised_attribute};

/// Digest of one scope's addressable tree.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreeDigest(pub [u8; 32]);

impl TreeDigest {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for TreeDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TreeDigest({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for TreeDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Compute the digest of a single scope document.
///
/// Nested frames contribute only their host element; their content is a
/// scope of its own.
///
/// Algorithm:
/// 1. Walk the addressable units from the root, depth first
/// 2. Hash each element's dialect, tag, compared attributes and present
///    properties, then its units; hash each text unit's text
/// 3. Attributes are hashed as a relay stores them, so an active `href`
///    and its neutralised form agree
pub fn tree_digest(doc: &Document) -> TreeDigest {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"mirrordom-tree-v0:");
    let mut table = PropertyTable::new();
    hash_element(doc, doc.root(), &mut table, &mut hasher);
    TreeDigest(*hasher.finalize().as_bytes())
}

fn hash_element(doc: &Document, id: NodeId, table: &mut PropertyTable, hasher: &mut blake3::Hasher) {
    let Some(el) = doc.element(id) else {
        return;
    };
    hasher.update(b"E");
    hasher.update(el.doc_type.as_str().as_bytes());
    field(hasher, el.tag.to_ascii_lowercase().as_bytes());

    for (name, value) in &el.attributes {
        if is_ignored_attribute(el.doc_type, &el.tag, name) {
            continue;
        }
        if let Some(value) = sanitised_attribute(el.doc_type, &el.tag, name, value) {
            hasher.update(b"A");
            field(hasher, name.as_bytes());
            field(hasher, value.as_bytes());
        }
    }

    for (key, value) in capture(doc, id, table) {
        hasher.update(b"P");
        field(hasher, key.as_bytes());
        match value {
            PropValue::Bool(b) => hasher.update(&[b as u8]),
            PropValue::Int(i) => hasher.update(&i.to_le_bytes()),
            PropValue::Text(s) => field(hasher, s.as_bytes()),
        };
    }

    let children = units(doc, id);
    hasher.update(&(children.len() as u64).to_le_bytes());
    for unit in &children {
        match unit {
            Unit::Element(child) => hash_element(doc, *child, table, hasher),
            Unit::Text { text, .. } => {
                hasher.update(b"T");
                field(hasher, text.as_bytes());
            }
        }
    }
}

/// Length-prefixed write, so adjacent fields cannot run together.
fn field<'a>(hasher: &'a mut blake3::Hasher, bytes: &[u8]) -> &'a mut blake3::Hasher {
    hasher.update(&(bytes.len() as u64).to_le_bytes());
    hasher.update(bytes)
}

/// Digests of every scope whose document is ready, outer scopes first.
pub fn scope_digests(doc: &Document) -> Vec<(FramePath, TreeDigest)> {
    let mut out = Vec::new();
    let mut pending = vec![FramePath::main()];
    while let Some(frame) = pending.pop() {
        let Ok(scope) = scope_document(doc, &frame) else {
            continue;
        };
        out.push((frame.clone(), tree_digest(scope)));

        let mut children = Vec::new();
        for (path, id) in elements_with_paths(scope, scope.root()) {
            let ready = scope
                .frame(id)
                .map_or(false, |f| f.is_ready() && f.document().map_or(false, |d| !d.is_loading()));
            if ready {
                children.push(frame.child_scope(&path));
            }
        }
        pending.extend(children.into_iter().rev());
    }
    out
}

/// Result of convergence verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvergenceResult {
    /// Every scope of both trees is identical.
    Converged,
    /// The scope at `frame` differs.
    Diverged { frame: FramePath, reason: String },
}

impl ConvergenceResult {
    /// Check if the trees have converged.
    pub fn is_converged(&self) -> bool {
        matches!(self, ConvergenceResult::Converged)
    }
}

/// Verify that `mirror` shows the same content as `source`, scope by scope.
pub fn verify_convergence(source: &Document, mirror: &Document) -> ConvergenceResult {
    let local = scope_digests(source);
    let remote = scope_digests(mirror);

    for (frame, digest) in &local {
        match remote.iter().find(|(f, _)| f == frame) {
            None => {
                return ConvergenceResult::Diverged {
                    frame: frame.clone(),
                    reason: "scope missing on mirror".into(),
                };
            }
            Some((_, theirs)) if theirs != digest => {
                return ConvergenceResult::Diverged {
                    frame: frame.clone(),
                    reason: format!("tree digest mismatch: source={}, mirror={}", digest, theirs),
                };
            }
            Some(_) => {}
        }
    }

    if let Some((frame, _)) = remote.iter().find(|(f, _)| !local.iter().any(|(l, _)| l == f)) {
        return ConvergenceResult::Diverged {
            frame: frame.clone(),
            reason: "unexpected scope on mirror".into(),
        };
    }

    for (frame, _) in &remote {
        let Ok(scope) = scope_document(mirror, frame) else {
            continue;
        };
        if let Some(found) = active_content(scope) {
            return ConvergenceResult::Diverged {
                frame: frame.clone(),
                reason: format!("active content on mirror: {}", found),
            };
        }
    }

    ConvergenceResult::Converged
}

/// First element of `doc` carrying content the relay scrubs.
pub fn active_content(doc: &Document) -> Option<String> {
    let root = doc.root();
    for id in doc.descendants(root) {
        let Some(el) = doc.element(id) else {
            continue;
        };
        if id != root && IGNORED_TAGS.iter().any(|t| el.has_tag(t)) {
            return Some(format!("<{}> element", el.tag));
        }
        if let Some((name, _)) = el
            .attributes
            .iter()
            .find(|(name, value)| is_active_attribute(el.doc_type, &el.tag, name.as_str(), value.as_str()))
        {
            return Some(format!("{} on <{}>", name, el.tag));
        }
    }
    None
}
