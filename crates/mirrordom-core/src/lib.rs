//! # MirrorDom Core
//!
//! Pure primitives for MirrorDom: positional paths, an arena document
//! model, snapshots, the lockstep differ and the patch applier.
//!
//! This crate contains no I/O, no storage, no networking. It is pure
//! computation over ordered trees.
//!
//! ## Key Types
//!
//! - [`Document`] - Live, mutable document tree with embedded frames
//! - [`Snapshot`] - Immutable arena copy of a scope, the diff reference
//! - [`DiffRecord`] - One positional change, with an array-tagged wire form
//! - [`Path`] / [`FramePath`] - Addresses of nodes and of scopes
//! - [`PropertyTable`] - Memoized out-of-band property lookup
//!
//! ## Round trip
//!
//! ```
//! use mirrordom_core::{apply_diffs, diff, Document, PropertyTable, Snapshot};
//!
//! let before = Document::parse("<html><head/><body><p>a</p></body></html>").unwrap();
//! let after = Document::parse("<html><head/><body><p>a</p><p>b</p></body></html>").unwrap();
//!
//! let mut table = PropertyTable::new();
//! let snapshot = Snapshot::capture(&before, &mut table);
//! let outcome = diff(&after, &snapshot, &mut table);
//!
//! let mut mirror = before.clone();
//! apply_diffs(&mut mirror, outcome.records()).unwrap();
//! assert_eq!(Snapshot::capture(&mirror, &mut table), Snapshot::capture(&after, &mut table));
//! ```

pub mod differ;
pub mod dom;
pub mod error;
pub mod filter;
pub mod markup;
pub mod patch;
pub mod path;
pub mod properties;
pub mod record;
pub mod snapshot;
pub mod types;

pub use differ::{diff, property_records, DiffOutcome};
pub use dom::{Document, Element, Frame, NodeId, NodeKind, ReadyState, BLANK_URL};
pub use error::{ApplyError, DiffError, MarkupError, PathError};
pub use filter::{describe_frame_path, describe_node, describe_path, Unit};
pub use markup::{parse_document, parse_fragment, serialize, serialize_document};
pub use patch::{apply_diff, apply_diffs, apply_document};
pub use path::{is_prefix_of, FramePath, FrameStep, Path};
pub use properties::PropertyTable;
pub use record::{DiffRecord, ReplaceContent};
pub use snapshot::{Snapshot, SnapshotKind, SnapshotNode};
pub use types::{AttributeMap, DocType, PropValue, PropertyMap};
