//! Minimal XML tree with a path-step query language.
//!
//! Feeds are parsed with `quick-xml` into an arena of nodes (document order
//! equals index order). Queries are a small XPath subset, enough for RSS and
//! Atom style selectors:
//!
//! | Syntax | Meaning |
//! |--------|---------|
//! | `item`, `/item` | child elements named `item` |
//! | `//item`, `a//item` | descendants named `item` |
//! | `item[2]` | the second `item` among its siblings (1-based) |
//! | `*` | any element |
//! | `.` | the context node itself |
//!
//! Paths are always evaluated relative to the context node, so `/title`
//! on an `item` means the item's `title` child.

use crate::error::FeedError;
use crate::scraper::element::Element;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

#[derive(Debug)]
enum Child {
    Element(usize),
    Text(String),
}

#[derive(Debug)]
struct XmlNode {
    name: String,
    attrs: Vec<(String, String)>,
    parent: Option<usize>,
    children: Vec<Child>,
}

/// Parsed XML document.
#[derive(Debug)]
pub struct XmlDocument {
    nodes: Vec<XmlNode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
}

#[derive(Debug)]
struct Step {
    axis: Axis,
    name: String,
    position: Option<usize>,
}

impl Step {
    fn parse(part: &str, axis: Axis) -> Self {
        let (name, position) = match part.split_once('[') {
            Some((name, rest)) => (name, rest.trim_end_matches(']').trim().parse().ok()),
            None => (part, None),
        };
        Step {
            axis,
            name: name.trim().to_string(),
            position,
        }
    }

    fn matches(&self, name: &str) -> bool {
        self.name == "*" || self.name == name
    }
}

fn parse_path(path: &str) -> Vec<Step> {
    let mut rest = path.trim();
    let mut axis = Axis::Child;
    if let Some(stripped) = rest.strip_prefix("//") {
        axis = Axis::Descendant;
        rest = stripped;
    } else if let Some(stripped) = rest.strip_prefix('/') {
        rest = stripped;
    }

    let mut steps = Vec::new();
    for part in rest.split('/') {
        if part.is_empty() {
            axis = Axis::Descendant;
            continue;
        }
        steps.push(Step::parse(part, axis));
        axis = Axis::Child;
    }
    steps
}

fn unescape_lossy(raw: &str) -> String {
    match unescape(raw) {
        Ok(text) => text.into_owned(),
        Err(_) => raw.to_string(),
    }
}

impl XmlDocument {
    /// Index of the synthetic document node every query starts from.
    pub const ROOT: usize = 0;

    pub fn parse(body: &str) -> Result<Self, FeedError> {
        let mut reader = Reader::from_str(body);
        let mut doc = XmlDocument {
            nodes: vec![XmlNode {
                name: String::new(),
                attrs: Vec::new(),
                parent: None,
                children: Vec::new(),
            }],
        };
        let mut stack = vec![Self::ROOT];

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    let idx = doc.push_element(&stack, &e);
                    stack.push(idx);
                }
                Event::Empty(e) => {
                    doc.push_element(&stack, &e);
                }
                Event::End(_) => {
                    if stack.len() > 1 {
                        stack.pop();
                    }
                }
                Event::Text(t) => {
                    let text = unescape_lossy(&String::from_utf8_lossy(&t));
                    doc.push_text(&stack, text);
                }
                Event::CData(c) => {
                    doc.push_text(&stack, String::from_utf8_lossy(&c).into_owned());
                }
                Event::GeneralRef(r) => {
                    let raw = format!("&{};", String::from_utf8_lossy(&r));
                    doc.push_text(&stack, unescape_lossy(&raw));
                }
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(doc)
    }

    fn push_element(&mut self, stack: &[usize], start: &BytesStart<'_>) -> usize {
        let parent = *stack.last().unwrap_or(&Self::ROOT);
        let mut attrs = Vec::new();
        // Malformed attributes are skipped rather than failing the feed.
        for attr in start.attributes().flatten() {
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = unescape_lossy(&String::from_utf8_lossy(&attr.value));
            attrs.push((key, value));
        }

        let idx = self.nodes.len();
        self.nodes.push(XmlNode {
            name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            attrs,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent].children.push(Child::Element(idx));
        idx
    }

    fn push_text(&mut self, stack: &[usize], text: String) {
        if text.is_empty() {
            return;
        }
        let parent = *stack.last().unwrap_or(&Self::ROOT);
        self.nodes[parent].children.push(Child::Text(text));
    }

    fn child_elements(&self, node: usize) -> impl Iterator<Item = usize> + '_ {
        self.nodes[node].children.iter().filter_map(|c| match c {
            Child::Element(idx) => Some(*idx),
            Child::Text(_) => None,
        })
    }

    /// Element descendants of `node` in document order.
    fn descendants(&self, node: usize) -> Vec<usize> {
        let mut out = Vec::new();
        let mut pending: Vec<usize> = self.child_elements(node).collect();
        pending.reverse();
        while let Some(next) = pending.pop() {
            out.push(next);
            let from = pending.len();
            pending.extend(self.child_elements(next));
            pending[from..].reverse();
        }
        out
    }

    /// 1-based position of `node` among its siblings accepted by `step`.
    fn sibling_position(&self, node: usize, step: &Step) -> usize {
        let Some(parent) = self.nodes[node].parent else {
            return 1;
        };
        self.child_elements(parent)
            .filter(|&sibling| step.matches(self.name(sibling)))
            .position(|sibling| sibling == node)
            .map_or(1, |p| p + 1)
    }

    /// Elements matched by `path` relative to `context`, in document order.
    pub fn select(&self, context: usize, path: &str) -> Vec<usize> {
        let mut current = vec![context];
        for step in parse_path(path) {
            if step.name == "." {
                continue;
            }
            let mut next = Vec::new();
            for &node in &current {
                let candidates: Vec<usize> = match step.axis {
                    Axis::Child => self.child_elements(node).collect(),
                    Axis::Descendant => self.descendants(node),
                };
                next.extend(candidates.into_iter().filter(|&c| {
                    step.matches(self.name(c))
                        && step
                            .position
                            .is_none_or(|p| self.sibling_position(c, &step) == p)
                }));
            }
            next.sort_unstable();
            next.dedup();
            current = next;
        }
        current
    }

    fn name(&self, node: usize) -> &str {
        &self.nodes[node].name
    }

    pub fn attribute(&self, node: usize, name: &str) -> Option<&str> {
        self.nodes[node]
            .attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Concatenated text of the node and all its descendants.
    pub fn inner_text(&self, node: usize) -> String {
        let mut out = String::new();
        let mut pending: Vec<&Child> = self.nodes[node].children.iter().rev().collect();
        while let Some(child) = pending.pop() {
            match child {
                Child::Text(t) => out.push_str(t),
                Child::Element(idx) => pending.extend(self.nodes[*idx].children.iter().rev()),
            }
        }
        out
    }

    pub fn element(&self, node: usize) -> XmlElement<'_> {
        XmlElement { doc: self, node }
    }
}

/// A matched XML element.
pub struct XmlElement<'a> {
    doc: &'a XmlDocument,
    node: usize,
}

impl Element for XmlElement<'_> {
    fn attr(&self, name: &str) -> String {
        self.doc.attribute(self.node, name).unwrap_or_default().to_string()
    }

    fn child_attr(&self, path: &str, name: &str) -> String {
        self.doc
            .select(self.node, path)
            .into_iter()
            .find_map(|n| self.doc.attribute(n, name).map(str::to_string))
            .unwrap_or_default()
    }

    fn child_text(&self, path: &str) -> String {
        self.doc
            .select(self.node, path)
            .first()
            .map(|&n| self.doc.inner_text(n).trim().to_string())
            .unwrap_or_default()
    }

    fn child_values(&self, path: &str, attribute: Option<&str>) -> Vec<String> {
        self.doc
            .select(self.node, path)
            .into_iter()
            .map(|n| match attribute {
                Some(name) => self.doc.attribute(n, name).unwrap_or_default().to_string(),
                None => self.doc.inner_text(n).trim().to_string(),
            })
            .collect()
    }
}
