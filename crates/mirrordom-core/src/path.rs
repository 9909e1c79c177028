//! Positional addressing over ordered trees.
//!
//! A [`Path`] lists, per depth, the 0-based offset of a node among its
//! addressable siblings. A [`FramePath`] extends this with scope markers so
//! an address can cross into embedded sub-documents.

use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

/// Positional address of a node relative to a scope root.
///
/// The empty path is the root itself.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(Vec<usize>);

impl Path {
    /// The root path.
    pub const fn root() -> Self {
        Self(Vec::new())
    }

    /// Create from raw offsets.
    pub fn new(offsets: Vec<usize>) -> Self {
        Self(offsets)
    }

    /// Offsets as a slice.
    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Last offset, if any.
    pub fn last(&self) -> Option<usize> {
        self.0.last().copied()
    }

    /// Path of the parent, or `None` for the root.
    pub fn parent(&self) -> Option<Path> {
        if self.0.is_empty() {
            None
        } else {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    /// Split into parent path and final offset.
    pub fn split_last(&self) -> Option<(Path, usize)> {
        self.0
            .split_last()
            .map(|(last, rest)| (Self(rest.to_vec()), *last))
    }

    /// Path of the `offset`-th child of this node.
    pub fn child(&self, offset: usize) -> Path {
        let mut offsets = Vec::with_capacity(self.0.len() + 1);
        offsets.extend_from_slice(&self.0);
        offsets.push(offset);
        Self(offsets)
    }

    pub fn push(&mut self, offset: usize) {
        self.0.push(offset);
    }

    pub fn pop(&mut self) -> Option<usize> {
        self.0.pop()
    }

    /// `self` followed by `tail`.
    pub fn concat(&self, tail: &Path) -> Path {
        let mut offsets = self.0.clone();
        offsets.extend_from_slice(&tail.0);
        Self(offsets)
    }

    /// Sub-path covering `start..end` of the offsets.
    pub fn slice(&self, start: usize, end: usize) -> Path {
        let end = end.min(self.0.len());
        let start = start.min(end);
        Self(self.0[start..end].to_vec())
    }

    /// True iff `self` is `outer` or lies inside it.
    pub fn is_within(&self, outer: &Path) -> bool {
        self.0.starts_with(&outer.0)
    }

    /// True iff a replace or delete at `self` removes the node at `other`.
    ///
    /// Both operations drop the addressed node together with every right
    /// sibling, so `other` is affected when it shares `self`'s parent and
    /// sits at or after `self`'s offset at that depth.
    pub fn truncates(&self, other: &Path) -> bool {
        let Some((parent, offset)) = self.split_last() else {
            return true;
        };
        other.0.len() > parent.0.len()
            && other.0.starts_with(&parent.0)
            && other.0[parent.0.len()] >= offset
    }
}

/// True iff `inner` is `outer` or a descendant path of it.
pub fn is_prefix_of(inner: &Path, outer: &Path) -> bool {
    inner.is_within(outer)
}

impl From<Vec<usize>> for Path {
    fn from(offsets: Vec<usize>) -> Self {
        Self(offsets)
    }
}

impl From<&[usize]> for Path {
    fn from(offsets: &[usize]) -> Self {
        Self(offsets.to_vec())
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Path({})", self)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, offset) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", offset)?;
        }
        f.write_str("]")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Frame paths
// ─────────────────────────────────────────────────────────────────────────────

/// One step of a [`FramePath`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FrameStep {
    /// The main document (`"m"`).
    Main,
    /// Descend into the embedded document of the frame element reached so
    /// far (`"i"`).
    Frame,
    /// Child offset within the current document.
    Offset(usize),
}

impl Serialize for FrameStep {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FrameStep::Main => serializer.serialize_str("m"),
            FrameStep::Frame => serializer.serialize_str("i"),
            FrameStep::Offset(n) => serializer.serialize_u64(*n as u64),
        }
    }
}

impl<'de> Deserialize<'de> for FrameStep {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct StepVisitor;

        impl<'de> Visitor<'de> for StepVisitor {
            type Value = FrameStep;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("\"m\", \"i\" or a non-negative offset")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<FrameStep, E> {
                usize::try_from(v)
                    .map(FrameStep::Offset)
                    .map_err(|_| E::custom("frame path offset out of range"))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<FrameStep, E> {
                usize::try_from(v)
                    .map(FrameStep::Offset)
                    .map_err(|_| E::custom("negative frame path offset"))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<FrameStep, E> {
                match v {
                    "m" => Ok(FrameStep::Main),
                    "i" => Ok(FrameStep::Frame),
                    other => Err(E::unknown_variant(other, &["m", "i"])),
                }
            }
        }

        deserializer.deserialize_any(StepVisitor)
    }
}

/// Address of a scope, possibly nested inside embedded frames.
///
/// `["m"]` is the main scope; `["m", 1, 4, "i"]` is the scope of the frame
/// element at `[1,4]` in the main document.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FramePath(Vec<FrameStep>);

impl FramePath {
    /// The main scope.
    pub fn main() -> Self {
        Self(vec![FrameStep::Main])
    }

    /// Create from raw steps.
    pub fn new(steps: Vec<FrameStep>) -> Self {
        Self(steps)
    }

    pub fn steps(&self) -> &[FrameStep] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True iff this is exactly `["m"]`.
    pub fn is_main(&self) -> bool {
        self.0.len() == 1 && self.0[0] == FrameStep::Main
    }

    /// Scope of the frame element at `path` inside this scope.
    pub fn child_scope(&self, path: &Path) -> FramePath {
        let mut steps = self.0.clone();
        steps.extend(path.as_slice().iter().map(|&n| FrameStep::Offset(n)));
        steps.push(FrameStep::Frame);
        Self(steps)
    }

    /// True iff `self` is `outer` or a scope nested inside it.
    pub fn is_within(&self, outer: &FramePath) -> bool {
        self.0.starts_with(&outer.0)
    }

    /// The frame elements to descend through, one path per nesting level.
    ///
    /// Returns `None` unless the frame path is well formed: a leading
    /// `"m"`, then zero or more groups of offsets each closed by `"i"`.
    pub fn frame_chain(&self) -> Option<Vec<Path>> {
        let (first, rest) = self.0.split_first()?;
        if *first != FrameStep::Main {
            return None;
        }
        let mut chain = Vec::new();
        let mut current = Vec::new();
        for step in rest {
            match step {
                FrameStep::Offset(n) => current.push(*n),
                FrameStep::Frame => {
                    if current.is_empty() {
                        return None;
                    }
                    chain.push(Path::new(std::mem::take(&mut current)));
                }
                FrameStep::Main => return None,
            }
        }
        if current.is_empty() {
            Some(chain)
        } else {
            None
        }
    }

    /// Split into the containing scope and the frame element's path within
    /// it. `None` for the main scope or a malformed path.
    pub fn split_parent(&self) -> Option<(FramePath, Path)> {
        let mut chain = self.frame_chain()?;
        let last = chain.pop()?;
        let mut parent = FramePath::main();
        for path in &chain {
            parent = parent.child_scope(path);
        }
        Some((parent, last))
    }
}

impl From<Vec<FrameStep>> for FramePath {
    fn from(steps: Vec<FrameStep>) -> Self {
        Self(steps)
    }
}

impl fmt::Debug for FramePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FramePath({})", self)
    }
}

impl fmt::Display for FramePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, step) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            match step {
                FrameStep::Main => f.write_str("m")?,
                FrameStep::Frame => f.write_str("i")?,
                FrameStep::Offset(n) => write!(f, "{}", n)?,
            }
        }
        f.write_str(")")
    }
}
