//! Node capability shared by every document format.
//!
//! Field resolvers only ever ask a node for its own attribute, a child's
//! attribute, a child's text, or every value under a child path. HTML nodes
//! answer with CSS selectors, XML nodes with path steps
//! ([`crate::scraper::xml`]) and JSON records with dotted paths
//! ([`crate::scraper::json`]).

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::error::FeedError;

/// Read access to a matched entry node.
///
/// Absent nodes or attributes resolve to empty strings; they are never
/// errors.
pub trait Element {
    /// The node's own attribute.
    fn attr(&self, name: &str) -> String;
    /// Attribute of the first child matching `path`.
    fn child_attr(&self, path: &str, name: &str) -> String;
    /// Trimmed text under `path`. HTML joins the text of every match; XML
    /// and JSON read the first one.
    fn child_text(&self, path: &str) -> String;
    /// Text (or `attribute` when given) of every child matching `path`.
    fn child_values(&self, path: &str, attribute: Option<&str>) -> Vec<String>;
}

/// A matched HTML element.
pub struct HtmlElement<'a> {
    inner: ElementRef<'a>,
}

impl<'a> HtmlElement<'a> {
    pub fn new(inner: ElementRef<'a>) -> Self {
        Self { inner }
    }

    fn select_children(&self, path: &str) -> Vec<ElementRef<'a>> {
        match Selector::parse(path) {
            Ok(selector) => self.inner.select(&selector).collect(),
            Err(e) => {
                debug!(selector = %path, error = %e, "Ignoring invalid child selector");
                Vec::new()
            }
        }
    }
}

fn text_of(el: &ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

impl Element for HtmlElement<'_> {
    fn attr(&self, name: &str) -> String {
        self.inner.value().attr(name).unwrap_or_default().to_string()
    }

    fn child_attr(&self, path: &str, name: &str) -> String {
        self.select_children(path)
            .into_iter()
            .find_map(|child| child.value().attr(name).map(str::to_string))
            .unwrap_or_default()
    }

    fn child_text(&self, path: &str) -> String {
        self.select_children(path)
            .iter()
            .flat_map(|child| child.text())
            .collect::<String>()
            .trim()
            .to_string()
    }

    fn child_values(&self, path: &str, attribute: Option<&str>) -> Vec<String> {
        self.select_children(path)
            .iter()
            .map(|child| match attribute {
                Some(name) => child.value().attr(name).unwrap_or_default().to_string(),
                None => text_of(child),
            })
            .collect()
    }
}

/// Compile the entry selector of an HTML source.
pub fn entry_selector(selector: &str) -> Result<Selector, FeedError> {
    Selector::parse(selector).map_err(|e| FeedError::Selector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

/// Call `on_entry` for each node of `body` matching `selector`, in document
/// order.
///
/// The parsed document never outlives this call.
pub fn for_each_html<F>(body: &str, selector: &Selector, mut on_entry: F)
where
    F: FnMut(&HtmlElement<'_>),
{
    let document = Html::parse_document(body);
    for node in document.select(selector) {
        on_entry(&HtmlElement::new(node));
    }
}
