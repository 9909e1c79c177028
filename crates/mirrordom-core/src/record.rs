//! Diff records and their array-tagged wire form.
//!
//! ```text
//! ["node",    doc_type, path, markup, trailing_text|null, [[rel_path, {prop: value}], ...]]
//! ["text",    doc_type, path, text, null]
//! ["attribs", doc_type, path, {name: value}, [removed...]]
//! ["props",   doc_type, path, {prop: value}, [removed...]]
//! ["deleted", doc_type, path]
//! ```

use std::fmt;

use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::ser::{self, Serializer};
use serde::{Deserialize, Serialize};

use crate::path::Path;
use crate::types::{AttributeMap, DocType, PropertyMap};

/// Content of a [`DiffRecord::Replace`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplaceContent {
    /// Serialized element subtree.
    Markup(String),
    /// A text run.
    Text(String),
}

/// One change between a snapshot and the live tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffRecord {
    /// Rebuild the node at `path`, dropping it and every sibling after it.
    Replace {
        path: Path,
        doc_type: DocType,
        content: ReplaceContent,
        /// Text run directly following the element, appended after it.
        /// Markup replaces only; a text replace carrying one fails to encode.
        trailing_text: Option<String>,
        /// Properties for elements of the new subtree, by relative path.
        props: Vec<(Path, PropertyMap)>,
    },
    AttributesChanged {
        path: Path,
        doc_type: DocType,
        changed: AttributeMap,
        removed: Vec<String>,
    },
    PropertiesChanged {
        path: Path,
        doc_type: DocType,
        changed: PropertyMap,
        removed: Vec<String>,
    },
    /// Remove the node at `path` and every sibling after it.
    Deleted { path: Path, doc_type: DocType },
}

impl DiffRecord {
    pub fn path(&self) -> &Path {
        match self {
            DiffRecord::Replace { path, .. }
            | DiffRecord::AttributesChanged { path, .. }
            | DiffRecord::PropertiesChanged { path, .. }
            | DiffRecord::Deleted { path, .. } => path,
        }
    }

    pub fn doc_type(&self) -> DocType {
        match self {
            DiffRecord::Replace { doc_type, .. }
            | DiffRecord::AttributesChanged { doc_type, .. }
            | DiffRecord::PropertiesChanged { doc_type, .. }
            | DiffRecord::Deleted { doc_type, .. } => *doc_type,
        }
    }

    /// Wire tag of the record.
    pub fn kind(&self) -> &'static str {
        match self {
            DiffRecord::Replace {
                content: ReplaceContent::Markup(_),
                ..
            } => "node",
            DiffRecord::Replace {
                content: ReplaceContent::Text(_),
                ..
            } => "text",
            DiffRecord::AttributesChanged { .. } => "attribs",
            DiffRecord::PropertiesChanged { .. } => "props",
            DiffRecord::Deleted { .. } => "deleted",
        }
    }

    /// Whether the record drops the node at its path and its right siblings.
    pub fn is_structural(&self) -> bool {
        matches!(self, DiffRecord::Replace { .. } | DiffRecord::Deleted { .. })
    }

    /// Shorthand for a text-run replacement.
    pub fn replace_text(path: Path, doc_type: DocType, text: impl Into<String>) -> Self {
        DiffRecord::Replace {
            path,
            doc_type,
            content: ReplaceContent::Text(text.into()),
            trailing_text: None,
            props: Vec::new(),
        }
    }
}

impl Serialize for DiffRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DiffRecord::Replace {
                path,
                doc_type,
                content: ReplaceContent::Markup(markup),
                trailing_text,
                props,
            } => ("node", doc_type, path, markup, trailing_text, props).serialize(serializer),
            DiffRecord::Replace {
                content: ReplaceContent::Text(_),
                trailing_text: Some(_),
                ..
            } => Err(ser::Error::custom("text replace cannot carry trailing text")),
            DiffRecord::Replace {
                path,
                doc_type,
                content: ReplaceContent::Text(text),
                ..
            } => ("text", doc_type, path, text, Option::<&str>::None).serialize(serializer),
            DiffRecord::AttributesChanged {
                path,
                doc_type,
                changed,
                removed,
            } => ("attribs", doc_type, path, changed, removed).serialize(serializer),
            DiffRecord::PropertiesChanged {
                path,
                doc_type,
                changed,
                removed,
            } => ("props", doc_type, path, changed, removed).serialize(serializer),
            DiffRecord::Deleted { path, doc_type } => ("deleted", doc_type, path).serialize(serializer),
        }
    }
}

const KINDS: &[&str] = &["node", "text", "attribs", "props", "deleted"];

struct RecordVisitor;

fn next<'de, A, T>(seq: &mut A, index: usize) -> Result<T, A::Error>
where
    A: SeqAccess<'de>,
    T: Deserialize<'de>,
{
    seq.next_element()?
        .ok_or_else(|| de::Error::invalid_length(index, &RecordVisitor))
}

impl<'de> Visitor<'de> for RecordVisitor {
    type Value = DiffRecord;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an array-tagged diff record")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<DiffRecord, A::Error> {
        let kind: String = next(&mut seq, 0)?;
        if !KINDS.contains(&kind.as_str()) {
            return Err(de::Error::unknown_variant(&kind, KINDS));
        }
        let doc_type: DocType = next(&mut seq, 1)?;
        let path: Path = next(&mut seq, 2)?;

        let record = match kind.as_str() {
            "node" => {
                let markup: String = next(&mut seq, 3)?;
                let trailing_text: Option<String> = seq.next_element()?.flatten();
                let props: Option<Vec<(Path, PropertyMap)>> = seq.next_element()?.flatten();
                DiffRecord::Replace {
                    path,
                    doc_type,
                    content: ReplaceContent::Markup(markup),
                    trailing_text,
                    props: props.unwrap_or_default(),
                }
            }
            "text" => {
                let mut text: String = next(&mut seq, 3)?;
                if let Some(child_text) = seq.next_element::<Option<String>>()?.flatten() {
                    text.push_str(&child_text);
                }
                DiffRecord::replace_text(path, doc_type, text)
            }
            "attribs" => DiffRecord::AttributesChanged {
                path,
                doc_type,
                changed: next(&mut seq, 3)?,
                removed: next(&mut seq, 4)?,
            },
            "props" => DiffRecord::PropertiesChanged {
                path,
                doc_type,
                changed: next(&mut seq, 3)?,
                removed: next(&mut seq, 4)?,
            },
            _ => DiffRecord::Deleted { path, doc_type },
        };
        Ok(record)
    }
}

impl<'de> Deserialize<'de> for DiffRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_seq(RecordVisitor)
    }
}
