//! A small owned element tree built from quick-xml events, with slash-separated path lookups.
//!
//! Paths are relative to the element they are evaluated on. A step is an element local name,
//! optionally followed by one `[@attr='value']` predicate; an empty step (`a//b`, or a leading
//! `//`) searches all descendants. Matches come back in document order.

use once_cell::sync::Lazy;
use quick_xml::{
    Decoder, Reader,
    events::{BytesStart, Event},
};
use regex::Regex;

use crate::translator::non_blank;

#[derive(Debug, Clone)]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, Default)]
pub struct Element {
    /// Local name, namespace prefix removed.
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    fn from_start(e: &BytesStart<'_>, decoder: Decoder) -> Self {
        let attributes = e
            .attributes()
            .flatten()
            .map(|a| {
                let value = match a.decode_and_unescape_value(decoder) {
                    Ok(v) => v.into_owned(),
                    Err(_) => String::from_utf8_lossy(a.value.as_ref()).to_string(),
                };
                (
                    String::from_utf8_lossy(a.key.local_name().as_ref()).to_string(),
                    value,
                )
            })
            .collect();
        Element {
            name: String::from_utf8_lossy(e.local_name().as_ref()).to_string(),
            attributes,
            children: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    fn push_descendants<'a>(&'a self, out: &mut Vec<&'a Element>) {
        for child in self.elements() {
            out.push(child);
            child.push_descendants(out);
        }
    }

    /// All text below this element, concatenated in document order.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                Node::Text(t) => out.push_str(t),
                Node::Element(e) => e.collect_text(out),
            }
        }
    }

    pub fn select(&self, path: &str) -> Vec<&Element> {
        let mut current = vec![self];
        let mut descend = false;
        for raw in path.split('/') {
            if raw.is_empty() {
                descend = true;
                continue;
            }
            let step = Step::parse(raw);
            let mut next: Vec<&Element> = Vec::new();
            for ctx in &current {
                let candidates: Vec<&Element> = if descend {
                    let mut all = Vec::new();
                    ctx.push_descendants(&mut all);
                    all
                } else {
                    ctx.elements().collect()
                };
                for c in candidates {
                    if step.matches(c) && !next.iter().any(|seen| std::ptr::eq(*seen, c)) {
                        next.push(c);
                    }
                }
            }
            current = next;
            descend = false;
        }
        current
    }

    pub fn find(&self, path: &str) -> Option<&Element> {
        self.select(path).into_iter().next()
    }

    pub fn exists(&self, path: &str) -> bool {
        self.find(path).is_some()
    }

    /// Trimmed text of the first match; `None` if nothing matches or the text is blank.
    pub fn find_text(&self, path: &str) -> Option<String> {
        self.find(path).and_then(|e| non_blank(&e.text()))
    }
}

struct Step<'p> {
    name: &'p str,
    predicate: Option<(&'p str, &'p str)>,
}

static PREDICATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^([^\[]+)\[@([\w:-]+)=['"]([^'"]*)['"]\]$"#).unwrap());

impl<'p> Step<'p> {
    fn parse(raw: &'p str) -> Self {
        match PREDICATE_RE.captures(raw) {
            Some(c) => {
                let (_, [name, attr, value]) = c.extract();
                Step {
                    name,
                    predicate: Some((attr, value)),
                }
            }
            None => Step {
                name: raw,
                predicate: None,
            },
        }
    }

    fn matches(&self, e: &Element) -> bool {
        (self.name == "*" || e.name == self.name)
            && self
                .predicate
                .is_none_or(|(attr, value)| e.attr(attr) == Some(value))
    }
}

/// Parse `xml` into its root element.
pub fn parse(xml: &str) -> Result<Element, String> {
    let mut reader = Reader::from_str(xml);

    // The bottom of the stack collects top-level nodes.
    let mut stack: Vec<Element> = vec![Element::default()];
    let mut buf = Vec::new();
    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| format!("at byte {}: {e}", reader.buffer_position()))?;
        match event {
            Event::Eof => break,
            Event::Start(e) => stack.push(Element::from_start(&e, reader.decoder())),
            Event::Empty(e) => push_node(
                &mut stack,
                Node::Element(Element::from_start(&e, reader.decoder())),
            ),
            Event::End(_) => {
                if stack.len() < 2 {
                    return Err("unexpected closing tag".to_string());
                }
                if let Some(done) = stack.pop() {
                    push_node(&mut stack, Node::Element(done));
                }
            }
            Event::Text(t) => {
                push_node(&mut stack, Node::Text(String::from_utf8_lossy(t.as_ref()).to_string()))
            }
            Event::CData(t) => {
                push_node(&mut stack, Node::Text(String::from_utf8_lossy(t.as_ref()).to_string()))
            }
            Event::GeneralRef(r) => {
                let name = String::from_utf8_lossy(r.as_ref()).to_string();
                let resolved = resolve_reference(&name)
                    .ok_or_else(|| format!("unknown entity reference &{name};"))?;
                push_node(&mut stack, Node::Text(resolved));
            }
            _ => {}
        }
        buf.clear();
    }

    if stack.len() != 1 {
        return Err("unexpected end of document inside an open element".to_string());
    }
    let top = stack.pop().unwrap_or_default();
    let mut roots = top.children.into_iter().filter_map(|n| match n {
        Node::Element(e) => Some(e),
        Node::Text(_) => None,
    });
    match (roots.next(), roots.next()) {
        (Some(root), None) => Ok(root),
        (None, _) => Err("no root element".to_string()),
        (Some(_), Some(_)) => Err("more than one root element".to_string()),
    }
}

fn push_node(stack: &mut [Element], node: Node) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
    }
}

fn resolve_reference(name: &str) -> Option<String> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse().ok()?,
        };
        return char::from_u32(code).map(String::from);
    }
    quick_xml::escape::resolve_predefined_entity(name).map(String::from)
}
