//! Error types for MirrorDom core.

use thiserror::Error;

use crate::dom::Document;
use crate::filter::{describe_node, describe_path};
use crate::path::Path;

/// A path could not be resolved against the live tree.
///
/// This is the primary desync signal: the receiving tree no longer has the
/// shape the sender assumed. Always recoverable by a full resync.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("couldn't retrieve path {path} for node {root}")]
pub struct PathError {
    /// The path that failed to resolve.
    pub path: Path,
    /// Description of the node resolution started from.
    pub root: String,
    /// Per-depth trace of the siblings that were walked.
    pub trace: String,
}

impl PathError {
    /// Build an error for `path` resolved from the root of `doc`.
    pub fn at(doc: &Document, path: &Path) -> Self {
        Self {
            path: path.clone(),
            root: describe_node(doc, doc.root()),
            trace: describe_path(doc, path),
        }
    }

    /// Human-readable sibling trace, one line per depth.
    pub fn describe_path(&self) -> &str {
        &self.trace
    }
}

/// A record's path resolved but the record itself could not be applied.
#[derive(Debug, Error)]
pub enum DiffError {
    /// The record expects an element at its path but found text.
    #[error("record at {path} targets a non-element node")]
    NotAnElement { path: Path },

    /// The record cannot address the scope root itself.
    #[error("record at {path} cannot target the scope root")]
    RootTarget { path: Path },

    /// The serialized subtree could not be parsed.
    #[error("malformed markup in record at {path}: {source}")]
    Markup {
        path: Path,
        #[source]
        source: MarkupError,
    },

    /// A bundled property entry points outside the new subtree.
    #[error("property path {relative} does not resolve under {path}")]
    PropertyPath { path: Path, relative: Path },
}

/// Serialized markup could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarkupError {
    #[error("xml error: {0}")]
    Xml(String),

    #[error("markup is not valid utf-8")]
    Utf8,

    #[error("markup contains no element")]
    Empty,

    #[error("markup has more than one root element")]
    MultipleRoots,

    #[error("text outside the root element")]
    StrayText,

    #[error("element left unclosed at end of markup")]
    Unclosed,
}

impl From<std::str::Utf8Error> for MarkupError {
    fn from(_: std::str::Utf8Error) -> Self {
        MarkupError::Utf8
    }
}

/// Failure while applying records or a full reset.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Diff(#[from] DiffError),
}
