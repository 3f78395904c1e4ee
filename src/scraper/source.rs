//! Declarative source definitions and field resolvers.
//!
//! A [`SourceDefinition`] is deserialized from one YAML file per site and
//! never mutated afterwards. It tells the extractor where to go
//! ([`SourceDefinition::page_urls`]), how to read each matched node
//! ([`Attributes`]) and how to turn the raw strings into an [`Entry`]
//! ([`SourceDefinition::build_entry`]).
//!
//! ```yaml
//! name: voxel
//! enabled: true
//! base_url: https://www.voxel.com.br
//! paths:
//!   - /noticias
//! limit: 5
//! parser: HTML
//! attributes:
//!   entry_selector: "#news > article"
//!   link: { path: "h2 a", attribute: href }
//!   title: { path: "h2 a" }
//!   image: { path: figure, attribute: style, parse_strategy: style }
//!   category:
//!     path_finder: { path: "ul.tags > li" }
//!     allows: [pc, xbox]
//! ```

use crate::error::FeedError;
use crate::models::Entry;
use crate::scraper::element::Element;
use crate::utils::{contains_some, to_lower};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

static RE_STYLE_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\((.*?)\)").expect("style url regex is valid"));

/// Document format of a source's pages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ParserKind {
    #[default]
    #[serde(alias = "html", alias = "Html")]
    Html,
    #[serde(alias = "xml", alias = "Xml")]
    Xml,
    #[serde(alias = "json", alias = "Json")]
    Json,
}

/// Post-processing applied to a resolved raw value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseStrategy {
    /// Pull the URL out of a CSS declaration such as
    /// `background-image: url(//cdn.site/a.png)`.
    Style,
}

/// Rule resolving a single string from a node.
///
/// With an empty `path` the node's own `attribute` is read; otherwise the
/// first child matching `path` is used, reading its `attribute` or, when no
/// attribute is configured, its trimmed text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathFinder {
    pub path: String,
    pub attribute: String,
    pub parse_strategy: Option<ParseStrategy>,
}

impl PathFinder {
    /// Resolve the value on `el`. Missing nodes or attributes yield `""`.
    pub fn find<E: Element + ?Sized>(&self, el: &E) -> String {
        let raw = self.find_raw(el);
        match self.parse_strategy {
            Some(ParseStrategy::Style) => parse_style(&raw),
            None => raw,
        }
    }

    fn find_raw<E: Element + ?Sized>(&self, el: &E) -> String {
        match (self.path.is_empty(), self.attribute.is_empty()) {
            (true, true) => String::new(),
            (true, false) => el.attr(&self.attribute),
            (false, false) => el.child_attr(&self.path, &self.attribute),
            (false, true) => el.child_text(&self.path),
        }
    }
}

/// Category resolver plus allow-list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryFinder {
    pub path_finder: PathFinder,
    pub allows: Vec<String>,
}

impl CategoryFinder {
    /// Every category label found under the node, lower-cased.
    pub fn find<E: Element + ?Sized>(&self, el: &E) -> Vec<String> {
        if self.path_finder.path.is_empty() {
            return Vec::new();
        }
        let attribute = Some(self.path_finder.attribute.as_str()).filter(|a| !a.is_empty());
        let values: Vec<String> = el
            .child_values(&self.path_finder.path, attribute)
            .into_iter()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect();
        to_lower(&values)
    }

    /// An empty allow-list admits everything; otherwise at least one
    /// category must appear in it, ignoring case.
    pub fn allows(&self, categories: &[String]) -> bool {
        if self.allows.is_empty() {
            return true;
        }
        contains_some(&to_lower(&self.allows), &to_lower(categories))
    }
}

/// Field resolver rules for one source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Attributes {
    /// CSS selector (HTML), path query (XML) or dotted path to the entry
    /// array (JSON).
    pub entry_selector: String,
    pub link: PathFinder,
    pub title: PathFinder,
    pub image: PathFinder,
    pub category: CategoryFinder,
}

/// Declarative description of one site.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceDefinition {
    pub name: String,
    pub enabled: bool,
    pub base_url: String,
    pub paths: Vec<String>,
    /// Maximum entries accepted per run, `0` for no limit.
    pub limit: usize,
    pub parser: ParserKind,
    /// Consumed by the story renderer, carried through untouched.
    pub supports_stories: bool,
    pub attributes: Attributes,
}

impl SourceDefinition {
    /// Reject definitions the extractor could never run.
    pub fn validate(&self) -> Result<(), FeedError> {
        let invalid = |reason: &str| FeedError::SourceDefinition {
            name: self.name.clone(),
            reason: reason.to_string(),
        };
        if self.name.trim().is_empty() {
            return Err(invalid("name is empty"));
        }
        if self.paths.is_empty() {
            return Err(invalid("no paths configured"));
        }
        if self.parser != ParserKind::Json && self.attributes.entry_selector.trim().is_empty() {
            return Err(invalid("entry_selector is empty"));
        }
        Ok(())
    }

    /// Absolute page URLs to visit, in configured order.
    pub fn page_urls(&self) -> Result<Vec<String>, FeedError> {
        self.paths
            .iter()
            .map(|path| {
                let joined = if is_absolute(path) {
                    Url::parse(path).map(|_| path.clone())
                } else {
                    self.join(path).map(String::from)
                };
                joined.map_err(|e| FeedError::InvalidUrl {
                    url: path.clone(),
                    reason: format!("{e} (base {:?})", self.base_url),
                })
            })
            .collect()
    }

    /// Assemble an entry, resolving `link` and `image` against the base URL.
    pub fn build_entry(
        &self,
        title: String,
        link: &str,
        image: &str,
        categories: Vec<String>,
    ) -> Entry {
        Entry {
            title,
            url: self.absolute_url(link),
            image: self.absolute_url(image),
            categories,
            source_name: self.name.clone(),
        }
    }

    /// Resolve `path` to an absolute URL; empty values stay empty.
    pub fn absolute_url(&self, path: &str) -> String {
        if path.is_empty() || is_absolute(path) {
            return path.to_string();
        }
        if path.starts_with("//") {
            return format!("https:{path}");
        }
        self.join(path)
            .map(String::from)
            .unwrap_or_else(|_| path.to_string())
    }

    /// Join `path` under the base URL, treating the base as a directory.
    fn join(&self, path: &str) -> Result<Url, url::ParseError> {
        let mut base = Url::parse(&self.base_url)?;
        if !base.path().ends_with('/') {
            let dir = format!("{}/", base.path());
            base.set_path(&dir);
        }
        base.join(path.trim_start_matches('/'))
    }
}

fn is_absolute(path: &str) -> bool {
    path.starts_with("http://") || path.starts_with("https://")
}

/// Extract the parenthesized URL from a CSS declaration.
pub fn parse_style(style: &str) -> String {
    let Some(caps) = RE_STYLE_URL.captures(style) else {
        return String::new();
    };
    let url = caps[1].trim().trim_matches(|c| c == '"' || c == '\'');
    if url.starts_with("//") {
        format!("https:{url}")
    } else {
        url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Flat node: attributes by name, children by path.
    #[derive(Default)]
    struct FakeNode {
        attrs: HashMap<String, String>,
        texts: HashMap<String, Vec<String>>,
        child_attrs: HashMap<(String, String), Vec<String>>,
    }

    impl Element for FakeNode {
        fn attr(&self, name: &str) -> String {
            self.attrs.get(name).cloned().unwrap_or_default()
        }
        fn child_attr(&self, path: &str, name: &str) -> String {
            self.child_values(path, Some(name)).into_iter().next().unwrap_or_default()
        }
        fn child_text(&self, path: &str) -> String {
            self.child_values(path, None).into_iter().next().unwrap_or_default()
        }
        fn child_values(&self, path: &str, attribute: Option<&str>) -> Vec<String> {
            match attribute {
                Some(a) => self
                    .child_attrs
                    .get(&(path.to_string(), a.to_string()))
                    .cloned()
                    .unwrap_or_default(),
                None => self.texts.get(path).cloned().unwrap_or_default(),
            }
        }
    }

    fn source(base_url: &str) -> SourceDefinition {
        SourceDefinition {
            name: "test".into(),
            base_url: base_url.into(),
            paths: vec!["/news".into()],
            attributes: Attributes {
                entry_selector: "article".into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_path_finder_without_path_reads_own_attribute() {
        let mut node = FakeNode::default();
        node.attrs.insert("href".into(), "/a".into());

        let finder = PathFinder { attribute: "href".into(), ..Default::default() };
        assert_eq!(finder.find(&node), "/a");

        let empty = PathFinder::default();
        assert_eq!(empty.find(&node), "");
    }

    #[test]
    fn test_path_finder_child_text_and_attr() {
        let mut node = FakeNode::default();
        node.texts.insert("h2 a".into(), vec!["Good news 1".into()]);
        node.child_attrs.insert(("h2 a".into(), "href".into()), vec!["/n/1".into()]);

        let title = PathFinder { path: "h2 a".into(), ..Default::default() };
        let link = PathFinder { path: "h2 a".into(), attribute: "href".into(), ..Default::default() };
        assert_eq!(title.find(&node), "Good news 1");
        assert_eq!(link.find(&node), "/n/1");
    }

    #[test]
    fn test_path_finder_style_strategy() {
        let mut node = FakeNode::default();
        node.child_attrs.insert(
            ("figure".into(), "style".into()),
            vec!["background-image: url(//cdn.net/images/news-1.png);".into()],
        );
        let finder = PathFinder {
            path: "figure".into(),
            attribute: "style".into(),
            parse_strategy: Some(ParseStrategy::Style),
        };
        assert_eq!(finder.find(&node), "https://cdn.net/images/news-1.png");
    }

    #[test]
    fn test_parse_style_variants() {
        assert_eq!(parse_style("background: url('https://a.b/c.jpg')"), "https://a.b/c.jpg");
        assert_eq!(parse_style("background: url(\"//a.b/c.jpg\")"), "https://a.b/c.jpg");
        assert_eq!(parse_style("color: red"), "");
    }

    #[test]
    fn test_category_filter_empty_allow_list_admits_all() {
        let finder = CategoryFinder::default();
        assert!(finder.allows(&[]));
        assert!(finder.allows(&["anything".into()]));
    }

    #[test]
    fn test_category_filter_requires_intersection_ignoring_case() {
        let finder = CategoryFinder {
            allows: vec!["A1".into(), "h7".into()],
            ..Default::default()
        };
        assert!(finder.allows(&["x".into(), "a1".into()]));
        assert!(finder.allows(&["H7".into()]));
        assert!(!finder.allows(&["b2".into()]));
        assert!(!finder.allows(&[]));
    }

    #[test]
    fn test_category_find_lowercases_and_skips_blank() {
        let mut node = FakeNode::default();
        node.texts.insert("ul > li".into(), vec![" PC ".into(), "".into(), "Xbox".into()]);
        let finder = CategoryFinder {
            path_finder: PathFinder { path: "ul > li".into(), ..Default::default() },
            allows: vec![],
        };
        assert_eq!(finder.find(&node), vec!["pc", "xbox"]);
        assert!(CategoryFinder::default().find(&node).is_empty());
    }

    #[test]
    fn test_absolute_url_resolution() {
        let s = source("http://json.com");
        assert_eq!(s.absolute_url("https://x.y/z"), "https://x.y/z");
        assert_eq!(s.absolute_url("//cdn.y/z.png"), "https://cdn.y/z.png");
        assert_eq!(s.absolute_url("/hot-1.htm"), "http://json.com/hot-1.htm");
        assert_eq!(s.absolute_url(""), "");
        assert_eq!(s.absolute_url("hot-1.htm"), "http://json.com/hot-1.htm");
    }

    #[test]
    fn test_absolute_url_with_trailing_slash_or_path_base() {
        let s = source("https://site.test/");
        assert_eq!(s.absolute_url("/a/1"), "https://site.test/a/1");
        assert_eq!(s.absolute_url("a/1"), "https://site.test/a/1");

        let s = source("https://site.test/games");
        assert_eq!(s.absolute_url("/a/1"), "https://site.test/games/a/1");
        assert_eq!(s.absolute_url("a/1?p=2"), "https://site.test/games/a/1?p=2");
    }

    #[test]
    fn test_relative_url_without_base_is_kept() {
        assert_eq!(source("").absolute_url("news/1"), "news/1");
    }

    #[test]
    fn test_build_entry_sets_source_and_absolute_links() {
        let s = source("http://json.com");
        let e = s.build_entry("T".into(), "/a", "//img.y/a.png", vec!["pc".into()]);
        assert_eq!(e.url, "http://json.com/a");
        assert_eq!(e.image, "https://img.y/a.png");
        assert_eq!(e.source_name, "test");
        assert_eq!(e.categories, vec!["pc"]);
    }

    #[test]
    fn test_page_urls_in_configured_order() {
        let mut s = source("https://site.test");
        s.paths = vec!["/b".into(), "/a".into(), "https://other.test/feed".into()];
        assert_eq!(
            s.page_urls().unwrap(),
            vec!["https://site.test/b", "https://site.test/a", "https://other.test/feed"]
        );
    }

    #[test]
    fn test_page_urls_join_trailing_slash_base() {
        let mut s = source("https://site.test/");
        s.paths = vec!["/news".into(), "feed.xml".into()];
        assert_eq!(
            s.page_urls().unwrap(),
            vec!["https://site.test/news", "https://site.test/feed.xml"]
        );
    }

    #[test]
    fn test_page_urls_rejects_relative_without_base() {
        let s = source("");
        assert!(matches!(s.page_urls(), Err(FeedError::InvalidUrl { .. })));
    }

    #[test]
    fn test_validate() {
        assert!(source("https://a.b").validate().is_ok());

        let mut no_paths = source("https://a.b");
        no_paths.paths.clear();
        assert!(no_paths.validate().is_err());

        let mut json = source("https://a.b");
        json.parser = ParserKind::Json;
        json.attributes.entry_selector.clear();
        assert!(json.validate().is_ok());
    }

    #[test]
    fn test_deserialize_yaml_definition() {
        let yaml = r#"
name: voxel
enabled: true
base_url: https://www.voxel.com.br
paths:
  - /noticias
limit: 5
parser: xml
supports_stories: true
attributes:
  entry_selector: "//channel/item"
  link: { path: /link }
  title: { path: /title }
  image: { path: enclosure, attribute: url }
  category:
    path_finder: { path: /category }
    allows: [a1, h7]
"#;
        let def: SourceDefinition = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(def.parser, ParserKind::Xml);
        assert_eq!(def.limit, 5);
        assert!(def.supports_stories);
        assert_eq!(def.attributes.image.attribute, "url");
        assert_eq!(def.attributes.category.allows, vec!["a1", "h7"]);
        assert_eq!(def.attributes.category.path_finder.path, "/category");
    }

    #[test]
    fn test_parser_defaults_to_html() {
        let def: SourceDefinition = serde_yaml::from_str("name: x\npaths: [/]\n").unwrap();
        assert_eq!(def.parser, ParserKind::Html);
        assert_eq!(def.limit, 0);
        assert!(!def.enabled);
    }
}
