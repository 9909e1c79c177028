//! Arena-backed live document tree.
//!
//! A [`Document`] owns its nodes in a flat arena addressed by [`NodeId`].
//! Elements named `iframe`/`frame` carry an embedded [`Frame`] whose
//! document is an independent tree, synchronized as its own scope.

use std::borrow::Cow;
use std::fmt;

use crate::error::MarkupError;
use crate::types::{AttributeMap, DocType, PropertyMap};

/// Blank page URL used when a frame is reset.
pub const BLANK_URL: &str = "about:blank";

/// Index of a node inside its owning [`Document`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

/// Loading state of a document or frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadyState {
    /// Frame element exists but nothing has been loaded into it.
    Uninitialized,
    /// A load is in progress; content must not be touched.
    Loading,
    /// Content is ready.
    #[default]
    Complete,
}

/// Embedded sub-document of a frame element.
#[derive(Debug, Clone)]
pub struct Frame {
    ready_state: ReadyState,
    document: Option<Box<Document>>,
    /// Number of documents installed so far; stamps each new document's
    /// generation.
    loads: u64,
}

impl Frame {
    /// A frame with no content yet.
    pub fn uninitialized() -> Self {
        Self {
            ready_state: ReadyState::Uninitialized,
            document: None,
            loads: 0,
        }
    }

    pub fn ready_state(&self) -> ReadyState {
        self.ready_state
    }

    /// The embedded document, present once something has been loaded.
    pub fn document(&self) -> Option<&Document> {
        self.document.as_deref()
    }

    pub fn document_mut(&mut self) -> Option<&mut Document> {
        self.document.as_deref_mut()
    }

    /// Whether the frame holds a complete document that may be read or
    /// patched.
    pub fn is_ready(&self) -> bool {
        self.ready_state == ReadyState::Complete && self.document.is_some()
    }

    /// Install a freshly loaded document and mark the frame complete.
    pub fn load(&mut self, mut document: Document) {
        document.generation = self.loads;
        document.ready_state = ReadyState::Complete;
        self.loads += 1;
        self.document = Some(Box::new(document));
        self.ready_state = ReadyState::Complete;
    }

    /// Start navigating to the blank page. Content is replaced by an empty
    /// document and the frame stays `Loading` until [`Frame::finish_load`].
    pub fn reset_to_blank(&mut self, url: &str) {
        let mut blank = Document::html();
        blank.url = Some(url.to_string());
        blank.ready_state = ReadyState::Loading;
        blank.generation = self.loads;
        self.loads += 1;
        self.document = Some(Box::new(blank));
        self.ready_state = ReadyState::Loading;
    }

    /// Mark an in-progress load as finished.
    pub fn finish_load(&mut self) {
        if self.document.is_none() {
            self.reset_to_blank(BLANK_URL);
        }
        if let Some(doc) = self.document.as_deref_mut() {
            doc.ready_state = ReadyState::Complete;
        }
        self.ready_state = ReadyState::Complete;
    }
}

/// An element node's data.
#[derive(Debug, Clone)]
pub struct Element {
    /// Tag name: lowercase for the default dialect, as written for svg.
    pub tag: String,
    pub doc_type: DocType,
    pub attributes: AttributeMap,
    /// Out-of-band state that markup cannot carry.
    pub properties: PropertyMap,
    /// Embedded document, for frame elements only.
    pub frame: Option<Frame>,
}

impl Element {
    pub fn new(tag: &str, doc_type: DocType) -> Self {
        let tag = if doc_type.preserves_case() {
            tag.to_string()
        } else {
            tag.to_ascii_lowercase()
        };
        let frame = (doc_type == DocType::Html && is_frame_tag(&tag)).then(Frame::uninitialized);
        Self {
            tag,
            doc_type,
            attributes: AttributeMap::new(),
            properties: PropertyMap::new(),
            frame,
        }
    }

    /// Case-insensitive tag comparison.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tag.eq_ignore_ascii_case(tag)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(self.attribute_key(name).as_ref()).map(String::as_str)
    }

    /// Attribute names fold to lower case outside SVG, as tags do.
    pub fn attribute_key<'a>(&self, name: &'a str) -> Cow<'a, str> {
        if self.doc_type.preserves_case() || !name.bytes().any(|b| b.is_ascii_uppercase()) {
            Cow::Borrowed(name)
        } else {
            Cow::Owned(name.to_ascii_lowercase())
        }
    }

    pub fn is_frame(&self) -> bool {
        self.frame.is_some()
    }
}

/// Whether a tag names a frame element.
pub fn is_frame_tag(tag: &str) -> bool {
    tag.eq_ignore_ascii_case("iframe") || tag.eq_ignore_ascii_case("frame")
}

/// Node payload.
#[derive(Debug, Clone)]
pub enum NodeKind {
    Element(Element),
    Text(String),
    /// Never addressable.
    Comment(String),
}

/// A node slot in the arena.
#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// A live document tree.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Option<Node>>,
    free: Vec<NodeId>,
    root: NodeId,
    ready_state: ReadyState,
    url: Option<String>,
    generation: u64,
}

impl Document {
    /// A document holding a single root element.
    pub fn new(root_tag: &str, doc_type: DocType) -> Self {
        let root = Node {
            kind: NodeKind::Element(Element::new(root_tag, doc_type)),
            parent: None,
            children: Vec::new(),
        };
        Self {
            nodes: vec![Some(root)],
            free: Vec::new(),
            root: NodeId(0),
            ready_state: ReadyState::Complete,
            url: None,
            generation: 0,
        }
    }

    /// `<html><head/><body/></html>`.
    pub fn html() -> Self {
        let mut doc = Self::new("html", DocType::Html);
        let root = doc.root;
        let head = doc.create_element("head", DocType::Html);
        let body = doc.create_element("body", DocType::Html);
        doc.append_child(root, head);
        doc.append_child(root, body);
        doc
    }

    /// Parse serialized markup into a new document.
    pub fn parse(markup: &str) -> Result<Self, MarkupError> {
        crate::markup::parse_document(markup)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Document state
    // ─────────────────────────────────────────────────────────────────────────

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn ready_state(&self) -> ReadyState {
        self.ready_state
    }

    pub fn set_ready_state(&mut self, state: ReadyState) {
        self.ready_state = state;
    }

    pub fn is_loading(&self) -> bool {
        self.ready_state != ReadyState::Complete
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn set_url(&mut self, url: Option<String>) {
        self.url = url;
    }

    /// Bumped whenever the document navigates to a new page.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Replace the whole content with `next`, as a page navigation would.
    pub fn navigate(&mut self, next: Document) {
        let generation = self.generation + 1;
        *self = next;
        self.generation = generation;
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index()).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.index()).and_then(Option::as_mut)
    }

    pub fn kind(&self, id: NodeId) -> Option<&NodeKind> {
        self.node(id).map(|n| &n.kind)
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match self.kind(id) {
            Some(NodeKind::Element(el)) => Some(el),
            _ => None,
        }
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match self.node_mut(id).map(|n| &mut n.kind) {
            Some(NodeKind::Element(el)) => Some(el),
            _ => None,
        }
    }

    /// Text of a text node.
    pub fn text(&self, id: NodeId) -> Option<&str> {
        match self.kind(id) {
            Some(NodeKind::Text(t)) => Some(t),
            _ => None,
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.parent)
    }

    /// Raw children, including non-addressable ones.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Raw offset of `id` within its parent's children.
    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|&c| c == id)
    }

    /// First direct child element with the given tag.
    pub fn child_element(&self, parent: NodeId, tag: &str) -> Option<NodeId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|&c| self.element(c).map_or(false, |el| el.has_tag(tag)))
    }

    pub fn head(&self) -> Option<NodeId> {
        self.child_element(self.root, "head")
    }

    pub fn body(&self) -> Option<NodeId> {
        self.child_element(self.root, "body")
    }

    /// `id` and everything below it, in document order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if self.node(current).is_none() {
                continue;
            }
            out.push(current);
            stack.extend(self.children(current).iter().rev());
        }
        out
    }

    /// Concatenated text of all text nodes under `id`.
    pub fn text_content(&self, id: NodeId) -> String {
        self.descendants(id)
            .into_iter()
            .filter_map(|n| self.text(n))
            .collect()
    }

    pub fn frame(&self, id: NodeId) -> Option<&Frame> {
        self.element(id).and_then(|el| el.frame.as_ref())
    }

    pub fn frame_mut(&mut self, id: NodeId) -> Option<&mut Frame> {
        self.element_mut(id).and_then(|el| el.frame.as_mut())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Construction
    // ─────────────────────────────────────────────────────────────────────────

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let node = Node {
            kind,
            parent: None,
            children: Vec::new(),
        };
        if let Some(id) = self.free.pop() {
            self.nodes[id.index()] = Some(node);
            id
        } else {
            let id = NodeId(self.nodes.len() as u32);
            self.nodes.push(Some(node));
            id
        }
    }

    /// Create a detached element.
    pub fn create_element(&mut self, tag: &str, doc_type: DocType) -> NodeId {
        self.alloc(NodeKind::Element(Element::new(tag, doc_type)))
    }

    /// Create a detached text node.
    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.alloc(NodeKind::Text(text.to_string()))
    }

    /// Create a detached comment.
    pub fn create_comment(&mut self, text: &str) -> NodeId {
        self.alloc(NodeKind::Comment(text.to_string()))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Mutation
    // ─────────────────────────────────────────────────────────────────────────

    /// Append `child` as the last child of `parent`, detaching it first.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        let len = self.children(parent).len();
        self.insert_child(parent, len, child);
    }

    /// Insert `child` at raw offset `index` of `parent`.
    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) {
        if parent == child || self.element(parent).is_none() || self.node(child).is_none() {
            return;
        }
        self.detach(child);
        if let Some(p) = self.node_mut(parent) {
            let index = index.min(p.children.len());
            p.children.insert(index, child);
        }
        if let Some(c) = self.node_mut(child) {
            c.parent = Some(parent);
        }
    }

    /// Unlink `id` from its parent, keeping it allocated.
    pub fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.parent(id) else {
            return;
        };
        if let Some(p) = self.node_mut(parent) {
            p.children.retain(|&c| c != id);
        }
        if let Some(n) = self.node_mut(id) {
            n.parent = None;
        }
    }

    /// Detach `id` and free its whole subtree.
    pub fn remove(&mut self, id: NodeId) {
        if id == self.root {
            return;
        }
        self.detach(id);
        for node in self.descendants(id) {
            self.nodes[node.index()] = None;
            self.free.push(node);
        }
    }

    /// Remove the raw children of `parent` from offset `index` on.
    pub fn remove_children_from(&mut self, parent: NodeId, index: usize) {
        let doomed: Vec<NodeId> = self.children(parent).iter().skip(index).copied().collect();
        for id in doomed {
            self.remove(id);
        }
    }

    /// Remove every child of `parent`.
    pub fn clear_children(&mut self, parent: NodeId) {
        self.remove_children_from(parent, 0);
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) {
        if let Some(el) = self.element_mut(id) {
            let key = el.attribute_key(name).into_owned();
            el.attributes.insert(key, value.to_string());
        }
    }

    pub fn remove_attribute(&mut self, id: NodeId, name: &str) {
        if let Some(el) = self.element_mut(id) {
            let key = el.attribute_key(name).into_owned();
            el.attributes.remove(&key);
        }
    }

    /// Replace the value of a text node. Returns false for other nodes.
    pub fn set_text(&mut self, id: NodeId, text: &str) -> bool {
        match self.node_mut(id).map(|n| &mut n.kind) {
            Some(NodeKind::Text(t)) => {
                *t = text.to_string();
                true
            }
            _ => false,
        }
    }

    /// Deep-copy `source_id` from another document into this one, detached.
    ///
    /// Frame elements come across without content: their embedded document
    /// is a separate scope and starts uninitialized.
    pub fn import(&mut self, source: &Document, source_id: NodeId) -> Option<NodeId> {
        let copy_one = |this: &mut Document, id: NodeId| -> Option<NodeId> {
            let created = match source.kind(id)? {
                NodeKind::Element(el) => {
                    let new_id = this.create_element(&el.tag, el.doc_type);
                    if let Some(target) = this.element_mut(new_id) {
                        target.attributes = el.attributes.clone();
                        target.properties = el.properties.clone();
                    }
                    new_id
                }
                NodeKind::Text(t) => this.create_text(t),
                NodeKind::Comment(c) => this.create_comment(c),
            };
            Some(created)
        };

        let top = copy_one(self, source_id)?;
        let mut pending = vec![(source_id, top)];
        while let Some((src, dst)) = pending.pop() {
            if source.frame(src).is_some() {
                continue;
            }
            for &child in source.children(src) {
                if let Some(copied) = copy_one(self, child) {
                    self.append_child(dst, copied);
                    pending.push((child, copied));
                }
            }
        }
        Some(top)
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::html()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_skeleton() {
        let doc = Document::html();
        assert!(doc.head().is_some());
        assert!(doc.body().is_some());
        assert_eq!(doc.len(), 3);
        assert_eq!(doc.element(doc.root()).unwrap().tag, "html");
    }

    #[test]
    fn test_append_and_remove_reuses_slots() {
        let mut doc = Document::html();
        let body = doc.body().unwrap();
        let ul = doc.create_element("UL", DocType::Html);
        let li = doc.create_element("li", DocType::Html);
        let text = doc.create_text("a");
        doc.append_child(body, ul);
        doc.append_child(ul, li);
        doc.append_child(li, text);

        assert_eq!(doc.element(ul).unwrap().tag, "ul");
        assert_eq!(doc.text_content(ul), "a");
        assert_eq!(doc.len(), 6);

        doc.remove(ul);
        assert_eq!(doc.len(), 3);
        assert!(doc.children(body).is_empty());

        let again = doc.create_element("p", DocType::Html);
        assert!(again.index() < 6);
    }

    #[test]
    fn test_insert_child_moves_node() {
        let mut doc = Document::html();
        let body = doc.body().unwrap();
        let a = doc.create_element("a", DocType::Html);
        let b = doc.create_element("b", DocType::Html);
        doc.append_child(body, a);
        doc.append_child(body, b);
        doc.insert_child(body, 0, b);
        assert_eq!(doc.children(body), &[b, a]);
        assert_eq!(doc.index_in_parent(a), Some(1));
    }

    #[test]
    fn test_remove_children_from() {
        let mut doc = Document::html();
        let body = doc.body().unwrap();
        for tag in ["p", "div", "span"] {
            let id = doc.create_element(tag, DocType::Html);
            doc.append_child(body, id);
        }
        doc.remove_children_from(body, 1);
        assert_eq!(doc.children(body).len(), 1);
    }

    #[test]
    fn test_svg_keeps_tag_case_and_frames_attach() {
        let mut doc = Document::html();
        let grad = doc.create_element("linearGradient", DocType::Svg);
        assert_eq!(doc.element(grad).unwrap().tag, "linearGradient");

        let iframe = doc.create_element("IFRAME", DocType::Html);
        let frame = doc.frame(iframe).unwrap();
        assert_eq!(frame.ready_state(), ReadyState::Uninitialized);
        assert!(frame.document().is_none());
    }

    #[test]
    fn test_html_attribute_names_fold_case() {
        let mut doc = Document::html();
        let body = doc.body().unwrap();
        doc.set_attribute(body, "Title", "a");
        assert_eq!(doc.element(body).unwrap().attributes.get("title").map(String::as_str), Some("a"));
        assert_eq!(doc.element(body).unwrap().attribute("TITLE"), Some("a"));
        doc.remove_attribute(body, "TITLE");
        assert!(doc.element(body).unwrap().attributes.is_empty());

        let svg = doc.create_element("svg", DocType::Svg);
        doc.set_attribute(svg, "viewBox", "0 0 1 1");
        assert_eq!(doc.element(svg).unwrap().attribute("viewBox"), Some("0 0 1 1"));
        assert_eq!(doc.element(svg).unwrap().attribute("viewbox"), None);
    }

    #[test]
    fn test_frame_load_cycle() {
        let mut frame = Frame::uninitialized();
        frame.reset_to_blank(BLANK_URL);
        assert_eq!(frame.ready_state(), ReadyState::Loading);
        assert!(!frame.is_ready());

        frame.finish_load();
        assert!(frame.is_ready());
        let first = frame.document().unwrap().generation();

        frame.load(Document::html());
        assert!(frame.document().unwrap().generation() > first);
    }

    #[test]
    fn test_import_skips_frame_content() {
        let mut source = Document::html();
        let body = source.body().unwrap();
        let iframe = source.create_element("iframe", DocType::Html);
        source.append_child(body, iframe);
        source.frame_mut(iframe).unwrap().load(Document::html());

        let mut target = Document::html();
        let copied = target.import(&source, body).unwrap();
        let copied_iframe = target.children(copied)[0];
        let frame = target.frame(copied_iframe).unwrap();
        assert_eq!(frame.ready_state(), ReadyState::Uninitialized);
    }

    #[test]
    fn test_navigate_bumps_generation() {
        let mut doc = Document::html();
        let before = doc.generation();
        doc.navigate(Document::html());
        assert_eq!(doc.generation(), before + 1);
    }
}
