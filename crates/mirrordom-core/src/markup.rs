//! Markup codec: serialize subtrees to XML text and parse them back.
//!
//! Serialization is XHTML-flavoured: every element is closed, empty
//! elements self-close, VML elements carry a `v:` prefix. Parsing uses
//! `quick-xml` and decides each element's dialect from its prefix, its
//! parent and the dialect the caller expects.

use quick_xml::escape::{escape, resolve_predefined_entity};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::dom::{Document, NodeId, NodeKind};
use crate::error::MarkupError;
use crate::types::DocType;

/// Prefix marking VML elements in serialized markup.
pub const VML_PREFIX: &str = "v:";

// ─────────────────────────────────────────────────────────────────────────────
// Serialization
// ─────────────────────────────────────────────────────────────────────────────

fn qualified_name(tag: &str, doc_type: DocType) -> String {
    match doc_type {
        DocType::Vml => format!("{}{}", VML_PREFIX, tag),
        _ => tag.to_string(),
    }
}

/// Comment text may not contain `--` or end in `-`; a space splits each
/// such run so the comment cannot close early.
fn push_comment_text(out: &mut String, text: &str) {
    let mut prev = None;
    for c in text.chars() {
        if c == '-' && prev == Some('-') {
            out.push(' ');
        }
        out.push(c);
        prev = Some(c);
    }
    if prev == Some('-') {
        out.push(' ');
    }
}

/// Serialize node `id` and everything below it.
///
/// Frame elements are written without content; their documents are
/// separate scopes.
pub fn serialize(doc: &Document, id: NodeId) -> String {
    enum Step {
        Open(NodeId),
        Close(String),
    }

    let mut out = String::new();
    let mut stack = vec![Step::Open(id)];
    while let Some(step) = stack.pop() {
        let id = match step {
            Step::Close(name) => {
                out.push_str("</");
                out.push_str(&name);
                out.push('>');
                continue;
            }
            Step::Open(id) => id,
        };
        match doc.kind(id) {
            Some(NodeKind::Text(text)) => out.push_str(&escape(text.as_str())),
            Some(NodeKind::Comment(text)) => {
                out.push_str("<!--");
                push_comment_text(&mut out, text);
                out.push_str("-->");
            }
            Some(NodeKind::Element(el)) => {
                let name = qualified_name(&el.tag, el.doc_type);
                out.push('<');
                out.push_str(&name);
                for (key, value) in &el.attributes {
                    out.push(' ');
                    out.push_str(key);
                    out.push_str("=\"");
                    out.push_str(&escape(value.as_str()));
                    out.push('"');
                }
                let children = doc.children(id);
                if el.is_frame() || children.is_empty() {
                    out.push_str("/>");
                    continue;
                }
                out.push('>');
                stack.push(Step::Close(name));
                stack.extend(children.iter().rev().map(|&c| Step::Open(c)));
            }
            None => {}
        }
    }
    out
}

/// Serialize the whole document.
pub fn serialize_document(doc: &Document) -> String {
    serialize(doc, doc.root())
}

// ─────────────────────────────────────────────────────────────────────────────
// Parsing
// ─────────────────────────────────────────────────────────────────────────────

fn resolve_reference(name: &str) -> Option<String> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse().ok()?,
        };
        return char::from_u32(code).map(String::from);
    }
    if let Some(resolved) = resolve_predefined_entity(name) {
        return Some(resolved.to_string());
    }
    match name {
        "nbsp" => Some('\u{a0}'.to_string()),
        _ => None,
    }
}

/// Expand character and entity references. Unknown references are kept
/// as written.
fn unescape_lenient(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        match tail.find(';') {
            Some(end) => match resolve_reference(&tail[1..end]) {
                Some(resolved) => {
                    out.push_str(&resolved);
                    rest = &tail[end + 1..];
                }
                None => {
                    out.push('&');
                    rest = &tail[1..];
                }
            },
            None => {
                out.push_str(tail);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

struct TreeBuilder {
    dialect: DocType,
    doc: Option<Document>,
    stack: Vec<NodeId>,
    closed: bool,
}

impl TreeBuilder {
    fn new(dialect: DocType) -> Self {
        Self {
            dialect,
            doc: None,
            stack: Vec::new(),
            closed: false,
        }
    }

    fn element_type(&self, raw: &str) -> (String, DocType) {
        let parent_type = match (&self.doc, self.stack.last()) {
            (Some(doc), Some(&parent)) => doc.element(parent).map(|el| el.doc_type),
            _ => None,
        };
        let prefixed = raw.len() > VML_PREFIX.len()
            && raw
                .get(..VML_PREFIX.len())
                .map_or(false, |p| p.eq_ignore_ascii_case(VML_PREFIX));
        if prefixed {
            return (raw[VML_PREFIX.len()..].to_ascii_lowercase(), DocType::Vml);
        }
        match parent_type.unwrap_or(self.dialect) {
            DocType::Svg => (raw.to_string(), DocType::Svg),
            _ if raw.eq_ignore_ascii_case("svg") => ("svg".to_string(), DocType::Svg),
            DocType::Vml if parent_type.is_none() => (raw.to_ascii_lowercase(), DocType::Vml),
            _ => (raw.to_ascii_lowercase(), DocType::Html),
        }
    }

    fn start(&mut self, start: &BytesStart<'_>) -> Result<(), MarkupError> {
        if self.closed {
            return Err(MarkupError::MultipleRoots);
        }
        let raw = std::str::from_utf8(start.name().as_ref())?.to_string();
        let (tag, doc_type) = self.element_type(&raw);

        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| MarkupError::Xml(e.to_string()))?;
            let key = std::str::from_utf8(attr.key.as_ref())?;
            let key = if doc_type.preserves_case() {
                key.to_string()
            } else {
                key.to_ascii_lowercase()
            };
            let value = unescape_lenient(std::str::from_utf8(&attr.value)?);
            attributes.push((key, value));
        }

        let id = match (&mut self.doc, self.stack.last()) {
            (Some(doc), Some(&parent)) => {
                let id = doc.create_element(&tag, doc_type);
                doc.append_child(parent, id);
                id
            }
            (None, _) => {
                let doc = Document::new(&tag, doc_type);
                let id = doc.root();
                self.doc = Some(doc);
                id
            }
            (Some(_), None) => return Err(MarkupError::MultipleRoots),
        };
        if let Some(el) = self.doc.as_mut().and_then(|d| d.element_mut(id)) {
            el.attributes.extend(attributes);
        }
        self.stack.push(id);
        Ok(())
    }

    fn end(&mut self) {
        self.stack.pop();
        if self.stack.is_empty() {
            self.closed = true;
        }
    }

    fn text(&mut self, text: &str) -> Result<(), MarkupError> {
        let (Some(doc), Some(&parent)) = (&mut self.doc, self.stack.last()) else {
            if text.trim().is_empty() {
                return Ok(());
            }
            return Err(MarkupError::StrayText);
        };
        if let Some(&last) = doc.children(parent).last() {
            if let Some(NodeKind::Text(existing)) = doc.kind(last) {
                let merged = format!("{}{}", existing, text);
                doc.set_text(last, &merged);
                return Ok(());
            }
        }
        let id = doc.create_text(text);
        doc.append_child(parent, id);
        Ok(())
    }

    fn comment(&mut self, text: &str) {
        if let (Some(doc), Some(&parent)) = (&mut self.doc, self.stack.last()) {
            let id = doc.create_comment(text);
            doc.append_child(parent, id);
        }
    }

    fn finish(self) -> Result<Document, MarkupError> {
        if !self.stack.is_empty() {
            return Err(MarkupError::Unclosed);
        }
        self.doc.ok_or(MarkupError::Empty)
    }
}

/// Parse markup whose root element is in `dialect` into a new document
/// rooted at that element.
pub fn parse_fragment(markup: &str, dialect: DocType) -> Result<Document, MarkupError> {
    let mut reader = Reader::from_str(markup);
    reader.config_mut().trim_text(false);
    let mut builder = TreeBuilder::new(dialect);

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => builder.start(&e)?,
            Ok(Event::Empty(e)) => {
                builder.start(&e)?;
                builder.end();
            }
            Ok(Event::End(_)) => builder.end(),
            Ok(Event::Text(e)) => {
                let raw = std::str::from_utf8(&e)?;
                builder.text(&unescape_lenient(raw))?;
            }
            Ok(Event::CData(e)) => builder.text(std::str::from_utf8(&e)?)?,
            Ok(Event::GeneralRef(e)) => {
                let name = std::str::from_utf8(&e)?;
                let text = resolve_reference(name).unwrap_or_else(|| format!("&{};", name));
                builder.text(&text)?;
            }
            Ok(Event::Comment(e)) => builder.comment(std::str::from_utf8(&e)?),
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(MarkupError::Xml(e.to_string())),
        }
    }
    builder.finish()
}

/// Parse a serialized html document.
pub fn parse_document(markup: &str) -> Result<Document, MarkupError> {
    parse_fragment(markup, DocType::Html)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_escapes_and_self_closes() {
        let mut doc = Document::new("div", DocType::Html);
        let root = doc.root();
        doc.set_attribute(root, "title", "a \"b\" & c");
        let text = doc.create_text("1 < 2");
        let br = doc.create_element("br", DocType::Html);
        doc.append_child(root, text);
        doc.append_child(root, br);

        let out = serialize_document(&doc);
        assert_eq!(out, r#"<div title="a &quot;b&quot; &amp; c">1 &lt; 2<br/></div>"#);

        let back = parse_fragment(&out, DocType::Html).unwrap();
        assert_eq!(back.element(back.root()).unwrap().attribute("title"), Some("a \"b\" & c"));
        assert_eq!(back.text_content(back.root()), "1 < 2");
    }

    #[test]
    fn test_dialects() {
        let doc = parse_document(
            r#"<html><head/><body><svg viewBox="0 0 1 1"><linearGradient/></svg><v:Shape/></body></html>"#,
        )
        .unwrap();
        let body = doc.body().unwrap();
        let svg = doc.children(body)[0];
        let grad = doc.children(svg)[0];
        let shape = doc.children(body)[1];

        assert_eq!(doc.element(svg).unwrap().doc_type, DocType::Svg);
        assert_eq!(doc.element(svg).unwrap().attribute("viewBox"), Some("0 0 1 1"));
        assert_eq!(doc.element(grad).unwrap().tag, "linearGradient");
        assert_eq!(doc.element(shape).unwrap().doc_type, DocType::Vml);
        assert_eq!(doc.element(shape).unwrap().tag, "shape");

        assert!(serialize(&doc, shape).starts_with("<v:shape"));
    }

    #[test]
    fn test_svg_fragment_root_dialect() {
        let doc = parse_fragment("<clipPath><rect/></clipPath>", DocType::Svg).unwrap();
        let root = doc.element(doc.root()).unwrap();
        assert_eq!(root.tag, "clipPath");
        assert_eq!(root.doc_type, DocType::Svg);
    }

    #[test]
    fn test_references() {
        let doc = parse_fragment("<p>a&nbsp;b &#65;&#x42; &amp; &bogus;</p>", DocType::Html).unwrap();
        assert_eq!(doc.text_content(doc.root()), "a\u{a0}b AB & &bogus;");
        assert_eq!(doc.children(doc.root()).len(), 1);
    }

    #[test]
    fn test_frames_serialize_without_content() {
        let mut doc = parse_document("<html><head/><body><iframe name=\"f\"/></body></html>").unwrap();
        let iframe = doc.children(doc.body().unwrap())[0];
        doc.frame_mut(iframe).unwrap().load(Document::html());
        assert_eq!(serialize(&doc, iframe), r#"<iframe name="f"/>"#);
    }

    #[test]
    fn test_comments_round_trip() {
        let doc = parse_fragment("<div><!-- note -->x</div>", DocType::Html).unwrap();
        assert_eq!(serialize_document(&doc), "<div><!-- note -->x</div>");
    }

    #[test]
    fn test_comment_text_cannot_close_early() {
        let mut doc = Document::new("div", DocType::Html);
        let root = doc.root();
        let comment = doc.create_comment("x--><p>leak</p><!--y-");
        let text = doc.create_text("z");
        doc.append_child(root, comment);
        doc.append_child(root, text);

        let out = serialize_document(&doc);
        assert_eq!(out, "<div><!--x- -><p>leak</p><!- -y- -->z</div>");

        let back = parse_fragment(&out, DocType::Html).unwrap();
        let children = back.children(back.root());
        assert_eq!(children.len(), 2);
        assert!(matches!(back.kind(children[0]), Some(NodeKind::Comment(_))));
        assert_eq!(back.text_content(back.root()), "z");
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_document("").unwrap_err(), MarkupError::Empty);
        assert_eq!(parse_document("<a/><b/>").unwrap_err(), MarkupError::MultipleRoots);
        assert_eq!(parse_document("<a/>junk").unwrap_err(), MarkupError::StrayText);
        assert!(matches!(
            parse_document("<a><b>"),
            Err(MarkupError::Unclosed) | Err(MarkupError::Xml(_))
        ));
        assert!(matches!(parse_document("<a></b>"), Err(MarkupError::Xml(_))));
    }
}
