//! Scrubbing of active content before it reaches a change log.
//!
//! Removes what a viewer must never execute or follow:
//! `script`, `title` and `meta` elements, comments, `on*` handler
//! attributes and frame `src`. Link targets (`href` on any html element)
//! are neutralised to `#`, in full documents, subtrees and attribute
//! records alike.
//!
//! Every node removed here is already skipped by addressing, so paths
//! computed on the broadcaster stay valid on the sanitised copy.

use tracing::warn;

use mirrordom_core::dom::is_frame_tag;
use mirrordom_core::filter::IGNORED_TAGS;
use mirrordom_core::{
    parse_document, parse_fragment, serialize_document, AttributeMap, DiffRecord, DocType,
    Document, MarkupError, NodeId, NodeKind, ReplaceContent,
};

/// Value written over every link target.
pub const NEUTRAL_HREF: &str = "#";

/// Whether `name` is an event handler attribute.
pub fn is_event_handler(name: &str) -> bool {
    name.len() > 2 && name.get(..2).map_or(false, |p| p.eq_ignore_ascii_case("on"))
}

/// Sanitise a full serialized document.
pub fn sanitise_html(markup: &str) -> Result<String, MarkupError> {
    let mut doc = parse_document(markup)?;
    sanitise_document(&mut doc);
    Ok(serialize_document(&doc))
}

/// Sanitise a serialized subtree whose root is in `dialect`.
pub fn sanitise_fragment(markup: &str, dialect: DocType) -> Result<String, MarkupError> {
    let mut doc = parse_fragment(markup, dialect)?;
    sanitise_document(&mut doc);
    Ok(serialize_document(&doc))
}

/// Sanitise `doc` in place.
pub fn sanitise_document(doc: &mut Document) {
    let root = doc.root();
    let mut doomed: Vec<NodeId> = Vec::new();
    for id in doc.descendants(root) {
        match doc.kind(id) {
            Some(NodeKind::Comment(_)) => doomed.push(id),
            Some(NodeKind::Element(el))
                if id != root && IGNORED_TAGS.iter().any(|t| el.has_tag(t)) =>
            {
                doomed.push(id)
            }
            Some(NodeKind::Element(_)) => scrub_attributes(doc, id),
            _ => {}
        }
    }
    // Removing an ancestor first frees its descendants; skip those.
    for id in doomed {
        if doc.node(id).is_some() {
            doc.remove(id);
        }
    }
}

fn scrub_attributes(doc: &mut Document, id: NodeId) {
    let Some(el) = doc.element_mut(id) else {
        return;
    };
    let (doc_type, tag) = (el.doc_type, el.tag.clone());
    el.attributes = scrubbed(doc_type, &tag, std::mem::take(&mut el.attributes));
}

fn scrubbed(doc_type: DocType, tag: &str, attributes: AttributeMap) -> AttributeMap {
    attributes
        .into_iter()
        .filter_map(|(name, value)| {
            sanitised_attribute(doc_type, tag, &name, &value)
                .map(str::to_string)
                .map(|value| (name, value))
        })
        .collect()
}

/// Sanitise diff records before they are stored.
///
/// Subtree markup that cannot be parsed is kept as sent; the viewer
/// reports it when applying.
pub fn sanitise_records(records: Vec<DiffRecord>) -> Vec<DiffRecord> {
    records.into_iter().map(sanitise_record).collect()
}

fn sanitise_record(record: DiffRecord) -> DiffRecord {
    match record {
        DiffRecord::Replace {
            path,
            doc_type,
            content: ReplaceContent::Markup(markup),
            trailing_text,
            props,
        } => {
            let markup = match sanitise_fragment(&markup, doc_type) {
                Ok(clean) => clean,
                Err(err) => {
                    warn!(path = %path, error = %err, "could not sanitise subtree, storing as sent");
                    markup
                }
            };
            DiffRecord::Replace {
                path,
                doc_type,
                content: ReplaceContent::Markup(markup),
                trailing_text,
                props,
            }
        }
        DiffRecord::AttributesChanged {
            path,
            doc_type,
            changed,
            removed,
        } => {
            // Records carry no tag, so every html href is neutralised.
            let changed = scrubbed(doc_type, "", changed);
            DiffRecord::AttributesChanged {
                path,
                doc_type,
                changed,
                removed,
            }
        }
        other => other,
    }
}

/// The value an attribute keeps after sanitising, `None` when it is
/// dropped. Lets a digest of the unsanitised tree match the stored one.
pub fn sanitised_attribute<'a>(doc_type: DocType, tag: &str, name: &str, value: &'a str) -> Option<&'a str> {
    if is_event_handler(name) {
        return None;
    }
    if doc_type != DocType::Html {
        return Some(value);
    }
    if name.eq_ignore_ascii_case("src") && is_frame_tag(tag) {
        return None;
    }
    if name.eq_ignore_ascii_case("href") {
        return Some(NEUTRAL_HREF);
    }
    Some(value)
}

/// Whether `value` would be changed or dropped by sanitising.
pub fn is_active_attribute(doc_type: DocType, tag: &str, name: &str, value: &str) -> bool {
    sanitised_attribute(doc_type, tag, name, value) != Some(value)
}
