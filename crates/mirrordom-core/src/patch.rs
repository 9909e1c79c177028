//! Patch application: replaying diff records and full-document resets.

use tracing::debug;

use crate::dom::{Document, NodeId};
use crate::error::{ApplyError, DiffError, MarkupError, PathError};
use crate::filter::{resolve, resolve_element, resolve_from, truncation_point, units};
use crate::markup::{parse_document, parse_fragment};
use crate::path::Path;
use crate::properties::{apply_properties, clear_property};
use crate::record::{DiffRecord, ReplaceContent};
use crate::types::{DocType, PropertyMap};

/// Apply `records` in order.
///
/// Stops at the first failure; records before it stay applied.
pub fn apply_diffs(doc: &mut Document, records: &[DiffRecord]) -> Result<(), ApplyError> {
    for record in records {
        apply_diff(doc, record)?;
    }
    if !records.is_empty() {
        debug!(records = records.len(), "applied diff records");
    }
    Ok(())
}

/// Apply a single record.
pub fn apply_diff(doc: &mut Document, record: &DiffRecord) -> Result<(), ApplyError> {
    match record {
        DiffRecord::Replace {
            path,
            doc_type,
            content,
            trailing_text,
            props,
        } => replace(doc, path, *doc_type, content, trailing_text.as_deref(), props),
        DiffRecord::AttributesChanged {
            path, changed, removed, ..
        } => {
            let id = target_element(doc, path)?;
            for (name, value) in changed {
                doc.set_attribute(id, name, value);
            }
            for name in removed {
                doc.remove_attribute(id, name);
            }
            Ok(())
        }
        DiffRecord::PropertiesChanged {
            path, changed, removed, ..
        } => {
            let id = target_element(doc, path)?;
            apply_properties(doc, id, changed);
            for key in removed {
                clear_property(doc, id, key);
            }
            Ok(())
        }
        DiffRecord::Deleted { path, .. } => {
            let (parent, cut) = cut_point(doc, path, false)?;
            doc.remove_children_from(parent, cut);
            Ok(())
        }
    }
}

fn target_element(doc: &Document, path: &Path) -> Result<NodeId, ApplyError> {
    let unit = resolve(doc, path)?;
    unit.element()
        .ok_or_else(|| DiffError::NotAnElement { path: path.clone() }.into())
}

/// Parent element and raw child offset from which a record at `path`
/// truncates. `append` allows the offset one past the last unit.
fn cut_point(doc: &Document, path: &Path, append: bool) -> Result<(NodeId, usize), ApplyError> {
    let (parent_path, index) = path
        .split_last()
        .ok_or_else(|| DiffError::RootTarget { path: path.clone() })?;
    let parent = resolve_element(doc, &parent_path)?;
    let children = units(doc, parent);
    let limit = if append { children.len() + 1 } else { children.len() };
    if index >= limit {
        return Err(PathError::at(doc, path).into());
    }
    Ok((parent, truncation_point(doc, parent, &children, index)))
}

fn replace(
    doc: &mut Document,
    path: &Path,
    doc_type: DocType,
    content: &ReplaceContent,
    trailing_text: Option<&str>,
    props: &[(Path, PropertyMap)],
) -> Result<(), ApplyError> {
    let markup_error = |source: MarkupError| DiffError::Markup {
        path: path.clone(),
        source,
    };
    let fragment = match content {
        ReplaceContent::Markup(markup) => Some(parse_fragment(markup, doc_type).map_err(markup_error)?),
        ReplaceContent::Text(_) => None,
    };

    let (parent, cut) = cut_point(doc, path, true)?;
    doc.remove_children_from(parent, cut);

    match (content, fragment) {
        (_, Some(fragment)) => {
            let node = doc
                .import(&fragment, fragment.root())
                .ok_or_else(|| markup_error(MarkupError::Empty))?;
            doc.append_child(parent, node);

            for (relative, changed) in props {
                let id = resolve_from(doc, node, relative)
                    .and_then(|unit| unit.element())
                    .ok_or_else(|| DiffError::PropertyPath {
                        path: path.clone(),
                        relative: relative.clone(),
                    })?;
                apply_properties(doc, id, changed);
            }
        }
        (ReplaceContent::Text(text), None) => {
            let node = doc.create_text(text);
            doc.append_child(parent, node);
        }
        (ReplaceContent::Markup(_), None) => {}
    }

    if let Some(text) = trailing_text {
        let node = doc.create_text(text);
        doc.append_child(parent, node);
    }
    Ok(())
}

/// Replace the content of `doc` with the serialized document `markup`.
///
/// Head and body are refilled in place so the live root survives; a
/// document without that structure has its root rebuilt.
pub fn apply_document(doc: &mut Document, markup: &str) -> Result<(), ApplyError> {
    let parsed = parse_document(markup).map_err(|source| DiffError::Markup {
        path: Path::root(),
        source,
    })?;
    let root = doc.root();

    let sections = (doc.head(), doc.body(), parsed.head(), parsed.body());
    let (Some(head), Some(body), Some(new_head), Some(new_body)) = sections else {
        rebuild_root(doc, &parsed);
        return Ok(());
    };

    doc.clear_children(head);
    for &child in parsed.children(new_head) {
        if let Some(node) = doc.import(&parsed, child) {
            doc.append_child(head, node);
        }
    }

    clear_property(doc, body, "style.cssText");
    if let (Some(el), Some(source)) = (doc.element_mut(body), parsed.element(new_body)) {
        el.attributes = source.attributes.clone();
        el.properties.clear();
    }
    doc.clear_children(body);
    let imported: Vec<NodeId> = parsed
        .children(new_body)
        .iter()
        .filter_map(|&child| doc.import(&parsed, child))
        .collect();
    for node in imported {
        doc.append_child(body, node);
    }

    if let (Some(el), Some(source)) = (doc.element_mut(root), parsed.element(parsed.root())) {
        el.attributes = source.attributes.clone();
    }
    Ok(())
}

fn rebuild_root(doc: &mut Document, parsed: &Document) {
    let root = doc.root();
    if let (Some(el), Some(source)) = (doc.element_mut(root), parsed.element(parsed.root())) {
        el.tag = source.tag.clone();
        el.doc_type = source.doc_type;
        el.attributes = source.attributes.clone();
        el.properties.clear();
    }
    doc.clear_children(root);
    for &child in parsed.children(parsed.root()) {
        if let Some(node) = doc.import(parsed, child) {
            doc.append_child(root, node);
        }
    }
}
