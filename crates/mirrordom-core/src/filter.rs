//! Addressable-node filtering.
//!
//! Every traversal in the system (snapshot capture, diffing, patching and
//! path diagnostics) sees a node's children through [`units`]. Skipped
//! nodes never count towards path offsets, and runs of text collapse into a
//! single unit, so both sides compute identical offsets even when their
//! engines split or pad text differently.

use crate::dom::{Document, Frame, NodeId, NodeKind};
use crate::error::PathError;
use crate::path::{FramePath, Path};
use crate::types::DocType;

/// Element types that never participate in addressing.
pub const IGNORED_TAGS: [&str; 3] = ["meta", "script", "title"];

/// The only addressable children of an html document element.
pub const ROOT_SECTIONS: [&str; 2] = ["head", "body"];

/// One addressable child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unit {
    Element(NodeId),
    /// A coalesced run of text nodes. `nodes` lists the text nodes of the
    /// run in order; ignored nodes between them are not listed.
    Text { nodes: Vec<NodeId>, text: String },
}

impl Unit {
    /// First raw node of the unit.
    pub fn first(&self) -> NodeId {
        match self {
            Unit::Element(id) => *id,
            Unit::Text { nodes, .. } => nodes[0],
        }
    }

    /// Last raw node of the unit.
    pub fn last(&self) -> NodeId {
        match self {
            Unit::Element(id) => *id,
            Unit::Text { nodes, .. } => nodes[nodes.len() - 1],
        }
    }

    pub fn element(&self) -> Option<NodeId> {
        match self {
            Unit::Element(id) => Some(*id),
            Unit::Text { .. } => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Unit::Element(_) => None,
            Unit::Text { text, .. } => Some(text),
        }
    }
}

fn is_html_document_element(doc: &Document, id: NodeId) -> bool {
    id == doc.root()
        && doc
            .element(id)
            .map_or(false, |el| el.doc_type == DocType::Html && el.has_tag("html"))
}

/// Whether an element child of `parent` takes part in addressing.
pub fn is_addressable_element(doc: &Document, parent: NodeId, id: NodeId) -> bool {
    let Some(el) = doc.element(id) else {
        return false;
    };
    if IGNORED_TAGS.iter().any(|t| el.has_tag(t)) {
        return false;
    }
    if is_html_document_element(doc, parent) {
        return ROOT_SECTIONS.iter().any(|t| el.has_tag(t));
    }
    true
}

/// Attributes the receiving side synthesizes itself and that are never
/// compared: `style` everywhere (carried as the `style.cssText` property)
/// and `src` on html frame elements.
pub fn is_ignored_attribute(doc_type: DocType, tag: &str, name: &str) -> bool {
    if name == "style" {
        return true;
    }
    doc_type == DocType::Html && name == "src" && crate::dom::is_frame_tag(tag)
}

/// Addressable children of `parent`, in order.
///
/// Frame elements report no children: their content is a separate scope.
pub fn units(doc: &Document, parent: NodeId) -> Vec<Unit> {
    let mut out = Vec::new();
    let Some(el) = doc.element(parent) else {
        return out;
    };
    if el.is_frame() {
        return out;
    }
    let skip_text = is_html_document_element(doc, parent);

    let mut run: Vec<NodeId> = Vec::new();
    let mut run_text = String::new();
    let flush = |run: &mut Vec<NodeId>, run_text: &mut String, out: &mut Vec<Unit>| {
        if !run.is_empty() && !skip_text && !run_text.trim().is_empty() {
            out.push(Unit::Text {
                nodes: std::mem::take(run),
                text: std::mem::take(run_text),
            });
        } else {
            run.clear();
            run_text.clear();
        }
    };

    for &child in doc.children(parent) {
        match doc.kind(child) {
            Some(NodeKind::Text(t)) => {
                run.push(child);
                run_text.push_str(t);
            }
            Some(NodeKind::Element(_)) if is_addressable_element(doc, parent, child) => {
                flush(&mut run, &mut run_text, &mut out);
                out.push(Unit::Element(child));
            }
            _ => {}
        }
    }
    flush(&mut run, &mut run_text, &mut out);
    out
}

/// Raw child offset at which the unit `index` of `parent` begins, for
/// truncation purposes.
///
/// Everything after the previous unit is included, so that skipped nodes
/// between two units (typically whitespace) go away together with the
/// tail and cannot merge into a text unit appended afterwards.
pub fn truncation_point(doc: &Document, parent: NodeId, units: &[Unit], index: usize) -> usize {
    if index == 0 {
        return 0;
    }
    let children = doc.children(parent);
    match units.get(index - 1) {
        Some(prev) => children
            .iter()
            .position(|&c| c == prev.last())
            .map_or(children.len(), |p| p + 1),
        None => children.len(),
    }
}

/// Resolve `path` starting from `start`.
pub fn resolve_from(doc: &Document, start: NodeId, path: &Path) -> Option<Unit> {
    let mut current = Unit::Element(start);
    for &offset in path.as_slice() {
        let parent = current.element()?;
        current = units(doc, parent).into_iter().nth(offset)?;
    }
    Some(current)
}

/// Resolve `path` against the document root.
pub fn resolve(doc: &Document, path: &Path) -> Result<Unit, PathError> {
    resolve_from(doc, doc.root(), path).ok_or_else(|| PathError::at(doc, path))
}

/// Resolve `path` and require an element there.
pub fn resolve_element(doc: &Document, path: &Path) -> Result<NodeId, PathError> {
    resolve(doc, path)?
        .element()
        .ok_or_else(|| PathError::at(doc, path))
}

/// Addressable elements under `start` (inclusive) with their paths
/// relative to it, in document order.
pub fn elements_with_paths(doc: &Document, start: NodeId) -> Vec<(Path, NodeId)> {
    let mut out = Vec::new();
    let mut stack = vec![(Path::root(), start)];
    while let Some((path, id)) = stack.pop() {
        let children = units(doc, id);
        out.push((path.clone(), id));
        for (offset, unit) in children.iter().enumerate().rev() {
            if let Unit::Element(child) = unit {
                stack.push((path.child(offset), *child));
            }
        }
    }
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Frame scopes
// ─────────────────────────────────────────────────────────────────────────────

/// The document of the scope at `frame_path`, searched from the main
/// document `doc`.
pub fn scope_document<'a>(doc: &'a Document, frame_path: &FramePath) -> Result<&'a Document, PathError> {
    let chain = frame_path
        .frame_chain()
        .ok_or_else(|| PathError::at(doc, &Path::root()))?;
    let mut current = doc;
    for path in &chain {
        let id = resolve_element(current, path)?;
        current = current
            .frame(id)
            .and_then(Frame::document)
            .ok_or_else(|| PathError::at(current, path))?;
    }
    Ok(current)
}

/// Mutable access to the scope document at `frame_path`.
pub fn scope_document_mut<'a>(
    doc: &'a mut Document,
    frame_path: &FramePath,
) -> Result<&'a mut Document, PathError> {
    let chain = frame_path
        .frame_chain()
        .ok_or_else(|| PathError::at(doc, &Path::root()))?;
    let mut current = doc;
    for path in &chain {
        let id = resolve_element(current, path)?;
        if current.frame(id).and_then(Frame::document).is_none() {
            return Err(PathError::at(current, path));
        }
        current = match current.frame_mut(id).and_then(Frame::document_mut) {
            Some(next) => next,
            None => return Err(frame_missing(path)),
        };
    }
    Ok(current)
}

/// The frame element that hosts the scope at `frame_path`.
///
/// `None` for the main scope, which is not hosted by any frame element.
pub fn scope_frame_mut<'a>(
    doc: &'a mut Document,
    frame_path: &FramePath,
) -> Result<Option<&'a mut Frame>, PathError> {
    let Some((parent, path)) = frame_path.split_parent() else {
        if frame_path.is_main() {
            return Ok(None);
        }
        return Err(PathError::at(doc, &Path::root()));
    };
    let container = scope_document_mut(doc, &parent)?;
    let id = resolve_element(container, &path)?;
    if container.frame(id).is_none() {
        return Err(PathError::at(container, &path));
    }
    Ok(container.frame_mut(id))
}

fn frame_missing(path: &Path) -> PathError {
    PathError {
        path: path.clone(),
        root: "<frame>".to_string(),
        trace: String::new(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Diagnostics
// ─────────────────────────────────────────────────────────────────────────────

/// Short description of a node, e.g. `<DIV #main class="wide">`.
pub fn describe_node(doc: &Document, id: NodeId) -> String {
    match doc.kind(id) {
        Some(NodeKind::Element(el)) => {
            let name = if el.doc_type.preserves_case() {
                el.tag.clone()
            } else {
                el.tag.to_ascii_uppercase()
            };
            let mut desc = format!("<{}", name);
            if let Some(id) = el.attribute("id") {
                desc.push_str(&format!(" #{}", id));
            }
            if let Some(class) = el.attribute("class") {
                desc.push_str(&format!(" class=\"{}\"", class));
            }
            desc.push('>');
            desc
        }
        Some(NodeKind::Text(_)) => "#text".to_string(),
        Some(NodeKind::Comment(_)) => "#comment".to_string(),
        None => "<detached>".to_string(),
    }
}

fn describe_unit(doc: &Document, unit: &Unit) -> String {
    match unit {
        Unit::Element(id) => describe_node(doc, *id),
        Unit::Text { .. } => "#text".to_string(),
    }
}

fn describe_level(doc: &Document, parent: Option<NodeId>, offset: usize) -> (String, Option<NodeId>, bool) {
    let children = parent.map(|p| units(doc, p)).unwrap_or_default();
    let mut parts = Vec::new();
    for j in 0..=offset {
        match children.get(j) {
            Some(unit) => parts.push(format!("{}: {}", j, describe_unit(doc, unit))),
            None => {
                parts.push(format!("{}: null :(", j));
                return (parts.join(" -> "), None, true);
            }
        }
    }
    let next = children.get(offset).and_then(Unit::element);
    (parts.join(" -> "), next, next.is_none())
}

/// Trace of the siblings walked while resolving `path`, one line per
/// depth, stopping at the first failure.
pub fn describe_path(doc: &Document, path: &Path) -> String {
    let mut lines = Vec::new();
    let mut node = Some(doc.root());
    for (depth, &offset) in path.as_slice().iter().enumerate() {
        let (line, next, stop) = describe_level(doc, node, offset);
        lines.push(line);
        node = next;
        if stop && depth + 1 < path.len() {
            break;
        }
    }
    lines.join("\n")
}

/// Like [`describe_path`], across frame boundaries.
pub fn describe_frame_path(doc: &Document, frame_path: &FramePath) -> String {
    use crate::path::FrameStep;

    let mut lines = Vec::new();
    let mut current = doc;
    let mut node = Some(doc.root());
    for step in frame_path.steps() {
        match step {
            FrameStep::Main => lines.push("m: main document".to_string()),
            FrameStep::Frame => {
                let next = node
                    .and_then(|id| current.frame(id))
                    .and_then(Frame::document);
                match next {
                    Some(inner) => {
                        lines.push("i: descending into frame".to_string());
                        current = inner;
                        node = Some(inner.root());
                    }
                    None => {
                        lines.push("i: no frame document :(".to_string());
                        break;
                    }
                }
            }
            FrameStep::Offset(offset) => {
                let (line, next, stop) = describe_level(current, node, *offset);
                lines.push(line);
                node = next;
                if stop {
                    break;
                }
            }
        }
    }
    lines.join("\n")
}
