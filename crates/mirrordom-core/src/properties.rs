//! Out-of-band element properties.
//!
//! Some element state never shows up in serialized markup (a toggled
//! checkbox, the chosen option of a select, inline style text). This module
//! knows, per dialect and tag, which such properties exist, how to read
//! them from a live element and how to assign them back.

use std::collections::HashMap;
use std::sync::Arc;

use crate::dom::{Document, NodeId};
use crate::types::{DocType, PropValue, PropertyMap};

/// A property name with an optional tag restriction.
#[derive(Debug, Clone, Copy)]
pub struct PropertySpec {
    pub name: &'static str,
    /// Tags the property is restricted to; empty means every tag.
    pub only_on: &'static [&'static str],
}

impl PropertySpec {
    const fn any(name: &'static str) -> Self {
        Self { name, only_on: &[] }
    }

    const fn only(name: &'static str, only_on: &'static [&'static str]) -> Self {
        Self { name, only_on }
    }

    /// Whether the property applies to an element with `tag`.
    pub fn applies_to(&self, tag: &str) -> bool {
        self.only_on.is_empty() || self.only_on.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

pub const HTML_PROPERTIES: &[PropertySpec] = &[
    PropertySpec::any("disabled"),
    PropertySpec::only("value", &["input"]),
    PropertySpec::any("checked"),
    PropertySpec::any("style.cssText"),
    PropertySpec::any("className"),
    PropertySpec::only("colSpan", &["td", "th"]),
    PropertySpec::only("selectedIndex", &["select"]),
];

pub const SVG_PROPERTIES: &[PropertySpec] = &[PropertySpec::any("style.cssText")];

pub const VML_PROPERTIES: &[PropertySpec] = &[
    PropertySpec::any("style.cssText"),
    PropertySpec::any("runtimeStyle.cssText"),
    PropertySpec::only("path.v", &["shape"]),
    PropertySpec::any("strokeColor.value"),
    PropertySpec::any("strokeweight"),
];

/// The property specs of a dialect.
pub fn specs(doc_type: DocType) -> &'static [PropertySpec] {
    match doc_type {
        DocType::Html => HTML_PROPERTIES,
        DocType::Svg => SVG_PROPERTIES,
        DocType::Vml => VML_PROPERTIES,
    }
}

/// Property names applicable to `tag` in `doc_type`, uncached.
pub fn applicable(doc_type: DocType, tag: &str) -> Vec<&'static str> {
    specs(doc_type)
        .iter()
        .filter(|spec| spec.applies_to(tag))
        .map(|spec| spec.name)
        .collect()
}

/// Memoized `(doc_type, tag)` → property list.
///
/// Owned by a session; never shared between sessions.
#[derive(Debug, Default)]
pub struct PropertyTable {
    cache: HashMap<(DocType, String), Arc<[&'static str]>>,
}

impl PropertyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Properties applicable to `tag`, computing them on first use.
    pub fn lookup(&mut self, doc_type: DocType, tag: &str) -> Arc<[&'static str]> {
        let key = (doc_type, tag.to_ascii_lowercase());
        self.cache
            .entry(key)
            .or_insert_with(|| applicable(doc_type, tag).into())
            .clone()
    }

    /// Number of memoized entries.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Reading
// ─────────────────────────────────────────────────────────────────────────────

/// `option` descendants of a select, in document order.
fn options(doc: &Document, select: NodeId) -> Vec<NodeId> {
    doc.descendants(select)
        .into_iter()
        .skip(1)
        .filter(|&id| doc.element(id).map_or(false, |el| el.has_tag("option")))
        .collect()
}

fn is_selected(doc: &Document, option: NodeId) -> bool {
    doc.element(option).map_or(false, |el| match el.properties.get("selected") {
        Some(v) => v.as_bool(),
        None => el.attributes.contains_key("selected"),
    })
}

fn selected_index(doc: &Document, select: NodeId) -> i64 {
    let options = options(doc, select);
    if options.is_empty() {
        return -1;
    }
    options
        .iter()
        .position(|&o| is_selected(doc, o))
        .map_or(0, |i| i as i64)
}

/// Current value of property `key` on element `id`.
pub fn read_property(doc: &Document, id: NodeId, key: &str) -> Option<PropValue> {
    let el = doc.element(id)?;
    let value = match key {
        "className" => PropValue::Text(el.attribute("class").unwrap_or_default().to_string()),
        "style.cssText" => PropValue::Text(el.attribute("style").unwrap_or_default().to_string()),
        "colSpan" => PropValue::Int(
            el.attribute("colspan")
                .and_then(|v| v.trim().parse::<i64>().ok())
                .filter(|n| *n >= 1)
                .unwrap_or(1),
        ),
        "selectedIndex" => PropValue::Int(selected_index(doc, id)),
        "checked" | "disabled" => PropValue::Bool(match el.properties.get(key) {
            Some(v) => v.as_bool(),
            None => el.attributes.contains_key(key),
        }),
        "value" => match el.properties.get(key) {
            Some(v) => v.clone(),
            None => PropValue::Text(el.attribute("value").unwrap_or_default().to_string()),
        },
        _ => el.properties.get(key)?.clone(),
    };
    Some(value)
}

/// Present properties of element `id`.
pub fn capture(doc: &Document, id: NodeId, table: &mut PropertyTable) -> PropertyMap {
    let mut out = PropertyMap::new();
    let Some(el) = doc.element(id) else {
        return out;
    };
    for key in table.lookup(el.doc_type, &el.tag).iter() {
        if let Some(value) = read_property(doc, id, key) {
            if value.is_present() {
                out.insert((*key).to_string(), value);
            }
        }
    }
    out
}

/// Changed and removed keys going from `old` to `new`.
pub fn diff_properties(old: &PropertyMap, new: &PropertyMap) -> (PropertyMap, Vec<String>) {
    let changed = new
        .iter()
        .filter(|(k, v)| old.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let removed = old
        .keys()
        .filter(|k| !new.contains_key(*k))
        .cloned()
        .collect();
    (changed, removed)
}

// ─────────────────────────────────────────────────────────────────────────────
// Writing
// ─────────────────────────────────────────────────────────────────────────────

fn reflect(doc: &mut Document, id: NodeId, attribute: &str, value: &PropValue) {
    let text = value.to_attribute_value();
    if text.is_empty() {
        doc.remove_attribute(id, attribute);
    } else {
        doc.set_attribute(id, attribute, &text);
    }
}

fn store(doc: &mut Document, id: NodeId, key: &str, value: PropValue) {
    if let Some(el) = doc.element_mut(id) {
        el.properties.insert(key.to_string(), value);
    }
}

fn radio_group(doc: &Document, id: NodeId) -> Option<String> {
    let el = doc.element(id)?;
    let is_radio = el.has_tag("input")
        && el
            .attribute("type")
            .map_or(false, |t| t.eq_ignore_ascii_case("radio"));
    if !is_radio {
        return None;
    }
    el.attribute("name").map(str::to_string)
}

fn uncheck_radio_group(doc: &mut Document, id: NodeId, name: &str) {
    let others: Vec<NodeId> = doc
        .descendants(doc.root())
        .into_iter()
        .filter(|&other| other != id && radio_group(doc, other).as_deref() == Some(name))
        .collect();
    for other in others {
        store(doc, other, "checked", PropValue::Bool(false));
    }
}

fn select_option(doc: &mut Document, select: NodeId, index: i64) {
    for (i, option) in options(doc, select).into_iter().enumerate() {
        store(doc, option, "selected", PropValue::Bool(i as i64 == index));
    }
}

/// Assign `value` to property `key` of element `id`, with DOM semantics.
pub fn assign_property(doc: &mut Document, id: NodeId, key: &str, value: &PropValue) {
    match key {
        "className" => reflect(doc, id, "class", value),
        "style.cssText" => reflect(doc, id, "style", value),
        "colSpan" => {
            let span = value.as_int().unwrap_or(1).max(1);
            doc.set_attribute(id, "colspan", &span.to_string());
        }
        "selectedIndex" => select_option(doc, id, value.as_int().unwrap_or(-1)),
        "checked" => {
            let checked = value.as_bool();
            store(doc, id, key, PropValue::Bool(checked));
            if checked {
                if let Some(name) = radio_group(doc, id) {
                    uncheck_radio_group(doc, id, &name);
                }
            }
        }
        "disabled" => store(doc, id, key, PropValue::Bool(value.as_bool())),
        _ => store(doc, id, key, value.clone()),
    }
}

/// Reset property `key` of element `id` to its absent value.
pub fn clear_property(doc: &mut Document, id: NodeId, key: &str) {
    match key {
        "className" => doc.remove_attribute(id, "class"),
        "style.cssText" => doc.remove_attribute(id, "style"),
        "colSpan" => doc.remove_attribute(id, "colspan"),
        "selectedIndex" => select_option(doc, id, 0),
        "checked" | "disabled" => store(doc, id, key, PropValue::Bool(false)),
        "value" => store(doc, id, key, PropValue::Text(String::new())),
        _ => {
            if let Some(el) = doc.element_mut(id) {
                el.properties.remove(key);
            }
        }
    }
}

/// Assign every entry of `props` to element `id`.
pub fn apply_properties(doc: &mut Document, id: NodeId, props: &PropertyMap) {
    for (key, value) in props {
        assign_property(doc, id, key, value);
    }
}
