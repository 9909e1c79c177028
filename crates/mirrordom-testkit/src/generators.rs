//! Proptest generators for property-based testing.
//!
//! Trees are generated as [`TreeSpec`] values and rendered to markup, then
//! edited with [`Mutation`] scripts applied to the parsed document.

use std::collections::BTreeMap;

use proptest::prelude::*;

use mirrordom_core::filter::elements_with_paths;
use mirrordom_core::properties::assign_property;
use mirrordom_core::{DocType, Document, NodeId, PropValue};

/// Tags used for generated elements.
pub const TAGS: [&str; 7] = ["div", "p", "span", "ul", "li", "em", "a"];

/// Attribute names used for generated elements. `href` is neutralised and
/// `onclick` dropped on the way through the relay.
pub const ATTRIBUTES: [&str; 6] = ["id", "class", "title", "data-k", "href", "onclick"];

/// Elements that are mirrored nowhere.
pub const IGNORED: [&str; 3] = ["script", "meta", "title"];

/// SVG element names, in their case-sensitive spelling.
pub const SVG_TAGS: [&str; 4] = ["rect", "circle", "g", "linearGradient"];

/// VML element names.
pub const VML_TAGS: [&str; 2] = ["shape", "oval"];

/// A generated subtree.
#[derive(Debug, Clone)]
pub enum TreeSpec {
    Text(String),
    Comment(String),
    Element {
        tag: &'static str,
        attributes: BTreeMap<&'static str, String>,
        children: Vec<TreeSpec>,
    },
    /// Script, meta or title element with optional text.
    Ignored { tag: &'static str, text: String },
    /// An `svg` element holding one level of shapes.
    Svg(Vec<&'static str>),
    /// A childless VML element.
    Vml(&'static str),
    Control(Control),
    /// A frame whose document has `body` as its body content.
    Frame(Vec<TreeSpec>),
}

/// Form controls, the carriers of out-of-band properties.
#[derive(Debug, Clone)]
pub enum Control {
    Checkbox,
    TextInput(String),
    Select(usize),
}

impl TreeSpec {
    /// Append the markup of this subtree to `out`. Frames are written
    /// empty; [`build_page`] loads their documents.
    pub fn render(&self, out: &mut String) {
        match self {
            TreeSpec::Text(text) => out.push_str(text),
            TreeSpec::Comment(text) => out.push_str(&format!("<!--{}-->", text)),
            TreeSpec::Element {
                tag,
                attributes,
                children,
            } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attributes {
                    out.push_str(&format!(" {}=\"{}\"", name, value));
                }
                if children.is_empty() {
                    out.push_str("/>");
                    return;
                }
                out.push('>');
                for child in children {
                    child.render(out);
                }
                out.push_str(&format!("</{}>", tag));
            }
            TreeSpec::Ignored { tag, text } if text.is_empty() => out.push_str(&format!("<{}/>", tag)),
            TreeSpec::Ignored { tag, text } => out.push_str(&format!("<{0}>{1}</{0}>", tag, text)),
            TreeSpec::Svg(shapes) => {
                out.push_str(r#"<svg viewBox="0 0 1 1">"#);
                for shape in shapes {
                    out.push_str(&format!(r#"<{} fill="red"/>"#, shape));
                }
                out.push_str("</svg>");
            }
            TreeSpec::Vml(tag) => out.push_str(&format!("<v:{}/>", tag)),
            TreeSpec::Control(Control::Checkbox) => out.push_str(r#"<input type="checkbox"/>"#),
            TreeSpec::Control(Control::TextInput(value)) => {
                out.push_str(&format!(r#"<input type="text" value="{}"/>"#, value))
            }
            TreeSpec::Control(Control::Select(options)) => {
                out.push_str("<select>");
                for i in 0..*options {
                    out.push_str(&format!("<option>o{}</option>", i));
                }
                out.push_str("</select>");
            }
            TreeSpec::Frame(_) => out.push_str("<iframe/>"),
        }
    }

    fn frames<'a>(&'a self, out: &mut Vec<&'a [TreeSpec]>) {
        match self {
            TreeSpec::Frame(body) => out.push(body),
            TreeSpec::Element { children, .. } => {
                for child in children {
                    child.frames(out);
                }
            }
            _ => {}
        }
    }
}

/// Markup of an html page whose body holds `body`.
pub fn render_page(body: &[TreeSpec]) -> String {
    let mut out = String::from("<html><head/><body>");
    for spec in body {
        spec.render(&mut out);
    }
    out.push_str("</body></html>");
    out
}

/// Parse the page for `body` and load every frame it declares.
pub fn build_page(body: &[TreeSpec]) -> Document {
    let mut doc = Document::parse(&render_page(body))
        .unwrap_or_else(|e| panic!("generated page does not parse: {}", e));
    let mut contents = Vec::new();
    for spec in body {
        spec.frames(&mut contents);
    }
    let hosts: Vec<NodeId> = doc
        .descendants(doc.root())
        .into_iter()
        .filter(|&id| doc.frame(id).is_some())
        .collect();
    for (host, content) in hosts.into_iter().zip(contents) {
        let inner = build_page(content);
        if let Some(frame) = doc.frame_mut(host) {
            frame.load(inner);
        }
    }
    doc
}

/// Generate a tag name.
pub fn tag() -> impl Strategy<Value = &'static str> {
    prop::sample::select(TAGS.to_vec())
}

/// Generate an attribute name.
pub fn attribute_name() -> impl Strategy<Value = &'static str> {
    prop::sample::select(ATTRIBUTES.to_vec())
}

/// Generate non-blank text that needs no escaping.
pub fn text() -> impl Strategy<Value = String> {
    "[a-z]{1,6}".prop_map(String::from)
}

/// Generate a whitespace-only run.
pub fn whitespace() -> impl Strategy<Value = String> {
    "[ \n\t]{1,3}".prop_map(String::from)
}

/// Generate an attribute value.
pub fn attribute_value() -> impl Strategy<Value = String> {
    "[a-z0-9]{0,4}".prop_map(String::from)
}

fn attributes() -> impl Strategy<Value = BTreeMap<&'static str, String>> {
    prop::collection::btree_map(attribute_name(), attribute_value(), 0..3)
}

fn control() -> impl Strategy<Value = Control> {
    prop_oneof![
        Just(Control::Checkbox),
        attribute_value().prop_map(Control::TextInput),
        (1usize..4).prop_map(Control::Select),
    ]
}

fn leaf() -> impl Strategy<Value = TreeSpec> {
    prop_oneof![
        4 => text().prop_map(TreeSpec::Text),
        1 => whitespace().prop_map(TreeSpec::Text),
        1 => "[a-z ]{0,6}".prop_map(TreeSpec::Comment),
        3 => (tag(), attributes()).prop_map(|(tag, attributes)| TreeSpec::Element {
            tag,
            attributes,
            children: Vec::new(),
        }),
        1 => (prop::sample::select(IGNORED.to_vec()), "[a-z]{0,4}")
            .prop_map(|(tag, text)| TreeSpec::Ignored { tag, text }),
        1 => prop::collection::vec(prop::sample::select(SVG_TAGS.to_vec()), 0..3).prop_map(TreeSpec::Svg),
        1 => prop::sample::select(VML_TAGS.to_vec()).prop_map(TreeSpec::Vml),
        1 => control().prop_map(TreeSpec::Control),
    ]
}

fn nest(inner: BoxedStrategy<TreeSpec>) -> impl Strategy<Value = TreeSpec> {
    (tag(), attributes(), prop::collection::vec(inner, 0..4)).prop_map(|(tag, attributes, children)| {
        TreeSpec::Element {
            tag,
            attributes,
            children,
        }
    })
}

/// Generate a frameless subtree up to four levels deep.
pub fn tree_spec() -> impl Strategy<Value = TreeSpec> {
    leaf().prop_recursive(4, 48, 4, nest)
}

/// Generate a subtree that may hold frames, one level of nesting deep.
pub fn framed_tree_spec() -> impl Strategy<Value = TreeSpec> {
    let framed_leaf = prop_oneof![
        6 => leaf(),
        1 => prop::collection::vec(tree_spec(), 0..3).prop_map(TreeSpec::Frame),
    ];
    framed_leaf.prop_recursive(3, 32, 4, nest)
}

/// Generate the content of a page body without frames.
pub fn body_spec() -> impl Strategy<Value = Vec<TreeSpec>> {
    prop::collection::vec(tree_spec(), 0..5)
}

/// Generate the content of a page body, frames included. Build it with
/// [`build_page`].
pub fn framed_body_spec() -> impl Strategy<Value = Vec<TreeSpec>> {
    prop::collection::vec(framed_tree_spec(), 0..5)
}

/// One edit of a live document.
///
/// `target` picks an element under the body (the body included) modulo
/// their number, so every script applies to every tree. Frame elements
/// and options are never picked, and a picked select keeps its content:
/// the chosen option is only carried as the select's `selectedIndex`.
#[derive(Debug, Clone)]
pub enum Mutation {
    Append {
        target: usize,
        tag: &'static str,
        text: String,
    },
    InsertText {
        target: usize,
        at: usize,
        text: String,
    },
    Remove {
        target: usize,
    },
    SetText {
        target: usize,
        text: String,
    },
    SetAttribute {
        target: usize,
        name: &'static str,
        value: String,
    },
    RemoveAttribute {
        target: usize,
        name: &'static str,
    },
    /// Assign a property, preferring form controls as targets.
    SetProperty {
        target: usize,
        key: &'static str,
        value: PropValue,
    },
}

fn property() -> impl Strategy<Value = (&'static str, PropValue)> {
    prop_oneof![
        any::<bool>().prop_map(|b| ("checked", PropValue::Bool(b))),
        any::<bool>().prop_map(|b| ("disabled", PropValue::Bool(b))),
        attribute_value().prop_map(|v| ("value", PropValue::Text(v))),
        (-1i64..4).prop_map(|i| ("selectedIndex", PropValue::Int(i))),
    ]
}

/// Generate a mutation.
pub fn mutation() -> impl Strategy<Value = Mutation> {
    prop_oneof![
        (any::<usize>(), tag(), text()).prop_map(|(target, tag, text)| Mutation::Append {
            target,
            tag,
            text
        }),
        (any::<usize>(), any::<usize>(), prop_oneof![text(), whitespace()])
            .prop_map(|(target, at, text)| Mutation::InsertText { target, at, text }),
        any::<usize>().prop_map(|target| Mutation::Remove { target }),
        (any::<usize>(), text()).prop_map(|(target, text)| Mutation::SetText { target, text }),
        (any::<usize>(), attribute_name(), attribute_value()).prop_map(|(target, name, value)| {
            Mutation::SetAttribute {
                target,
                name,
                value,
            }
        }),
        (any::<usize>(), attribute_name())
            .prop_map(|(target, name)| Mutation::RemoveAttribute { target, name }),
        (any::<usize>(), property())
            .prop_map(|(target, (key, value))| Mutation::SetProperty { target, key, value }),
    ]
}

/// Generate a mutation script.
pub fn mutations(max: usize) -> impl Strategy<Value = Vec<Mutation>> {
    prop::collection::vec(mutation(), 0..=max)
}

fn targets(doc: &Document) -> Vec<NodeId> {
    match doc.body() {
        Some(body) => elements_with_paths(doc, body)
            .into_iter()
            .map(|(_, id)| id)
            .filter(|&id| doc.frame(id).is_none() && !has_tag(doc, id, "option"))
            .collect(),
        None => Vec::new(),
    }
}

fn has_tag(doc: &Document, id: NodeId, tag: &str) -> bool {
    doc.element(id).map_or(false, |el| el.has_tag(tag))
}

fn is_control(doc: &Document, id: NodeId) -> bool {
    has_tag(doc, id, "input") || has_tag(doc, id, "select")
}

/// Apply one mutation to `doc`.
pub fn apply_mutation(doc: &mut Document, mutation: &Mutation) {
    let targets = targets(doc);
    if targets.is_empty() {
        return;
    }
    let pick = |index: usize| targets[index % targets.len()];
    let container = |index: usize| Some(pick(index)).filter(|&id| !has_tag(doc, id, "select"));

    match mutation {
        Mutation::Append { target, tag, text } => {
            let Some(parent) = container(*target) else {
                return;
            };
            // Children of svg elements are svg elements themselves.
            let doc_type = match doc.element(parent).map(|el| el.doc_type) {
                Some(DocType::Svg) => DocType::Svg,
                _ => DocType::Html,
            };
            let el = doc.create_element(tag, doc_type);
            let content = doc.create_text(text);
            doc.append_child(el, content);
            doc.append_child(parent, el);
        }
        Mutation::InsertText { target, at, text } => {
            let Some(parent) = container(*target) else {
                return;
            };
            let index = at % (doc.children(parent).len() + 1);
            let node = doc.create_text(text);
            doc.insert_child(parent, index, node);
        }
        Mutation::Remove { target } => {
            // The body itself stays.
            if target % targets.len() != 0 {
                doc.remove(pick(*target));
            }
        }
        Mutation::SetText { target, text } => {
            let Some(parent) = container(*target) else {
                return;
            };
            doc.clear_children(parent);
            let node = doc.create_text(text);
            doc.append_child(parent, node);
        }
        Mutation::SetAttribute {
            target,
            name,
            value,
        } => doc.set_attribute(pick(*target), name, value),
        Mutation::RemoveAttribute { target, name } => doc.remove_attribute(pick(*target), name),
        Mutation::SetProperty { target, key, value } => {
            let controls: Vec<NodeId> = targets.iter().copied().filter(|&id| is_control(doc, id)).collect();
            let id = match controls.len() {
                0 => pick(*target),
                n => controls[target % n],
            };
            assign_property(doc, id, key, value);
        }
    }
}
