//! Document tree: elements with ordered attributes, child elements and text.

use docweave_shared::{DocweaveError, Result};

use crate::path::{ElementPath, PathNode};
use crate::reader;

/// A child of an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

impl Node {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Self::Element(el) => Some(el),
            Self::Text(_) => None,
        }
    }
}

impl From<Element> for Node {
    fn from(el: Element) -> Self {
        Self::Element(el)
    }
}

/// An element: name, attributes in document order, and children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

/// A parsed document. Comments, processing instructions and the XML
/// declaration are not kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub root: Element,
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

impl Document {
    pub fn new(root: Element) -> Self {
        Self { root }
    }

    pub fn parse(xml: &str) -> Result<Self> {
        Self::from_bytes(xml.as_bytes())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            root: reader::read_root(bytes)?,
        })
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| DocweaveError::io(path, e))?;
        Self::from_bytes(&bytes).map_err(|e| match e {
            DocweaveError::Parse { message } => {
                DocweaveError::parse(format!("{}: {message}", path.display()))
            }
            other => other,
        })
    }

    /// Select elements with the document node as context: `a/b` and `/a/b`
    /// both start at the root element.
    pub fn select(&self, path: &ElementPath) -> Vec<&Element> {
        self.root.select_from(path, true)
    }

    pub fn select_first(&self, path: &ElementPath) -> Option<&Element> {
        self.select(path).into_iter().next()
    }

    pub fn for_each_match_mut<F>(&mut self, path: &ElementPath, f: F) -> Result<usize>
    where
        F: FnMut(&mut Element) -> Result<()>,
    {
        self.root.for_each_match_mut_from(path, true, f)
    }

    /// Replace each matching element with the nodes returned by `f`; `None`
    /// leaves the element unchanged. The root element itself is never replaced.
    pub fn replace_matches<F>(&mut self, path: &ElementPath, f: F) -> Result<usize>
    where
        F: FnMut(&Element) -> Result<Option<Vec<Node>>>,
    {
        self.root.replace_matches_from(path, true, f)
    }

    pub fn to_xml_string(&self) -> String {
        self.root.to_xml_string()
    }
}

impl std::str::FromStr for Document {
    type Err = DocweaveError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

// ---------------------------------------------------------------------------
// Element
// ---------------------------------------------------------------------------

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.push_text(text);
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set an attribute, replacing an existing value in place.
    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((key, value)),
        }
    }

    pub fn remove_attr(&mut self, key: &str) -> Option<String> {
        let pos = self.attributes.iter().position(|(k, _)| k == key)?;
        Some(self.attributes.remove(pos).1)
    }

    pub fn push_element(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    /// Append text, merging with a trailing text node.
    pub fn push_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        if text.is_empty() {
            return;
        }
        match self.children.last_mut() {
            Some(Node::Text(existing)) => existing.push_str(&text),
            _ => self.children.push(Node::Text(text)),
        }
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(Node::as_element)
    }

    pub fn find_child(&self, name: &str) -> Option<&Element> {
        self.child_elements().find(|el| el.name == name)
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }

    pub fn has_content(&self) -> bool {
        self.children.iter().any(|node| match node {
            Node::Element(_) => true,
            Node::Text(t) => !t.trim().is_empty(),
        })
    }

    /// Select with this element as context. Relative paths start at its
    /// children; absolute paths treat it as the root.
    pub fn select(&self, path: &ElementPath) -> Vec<&Element> {
        self.select_from(path, path.is_absolute())
    }

    pub fn select_first(&self, path: &ElementPath) -> Option<&Element> {
        self.select(path).into_iter().next()
    }

    pub fn for_each_match_mut<F>(&mut self, path: &ElementPath, f: F) -> Result<usize>
    where
        F: FnMut(&mut Element) -> Result<()>,
    {
        let include_self = path.is_absolute();
        self.for_each_match_mut_from(path, include_self, f)
    }

    pub fn replace_matches<F>(&mut self, path: &ElementPath, f: F) -> Result<usize>
    where
        F: FnMut(&Element) -> Result<Option<Vec<Node>>>,
    {
        let include_self = path.is_absolute();
        self.replace_matches_from(path, include_self, f)
    }

    pub fn to_xml_string(&self) -> String {
        let mut out = String::new();
        write_element(self, &mut out);
        out
    }

    // -- internals ---------------------------------------------------------

    fn select_from(&self, path: &ElementPath, include_self: bool) -> Vec<&Element> {
        self.match_positions(path, include_self)
            .iter()
            .filter_map(|pos| self.element_at(pos))
            .collect()
    }

    fn for_each_match_mut_from<F>(
        &mut self,
        path: &ElementPath,
        include_self: bool,
        mut f: F,
    ) -> Result<usize>
    where
        F: FnMut(&mut Element) -> Result<()>,
    {
        // Positions are computed up front and visited last-to-first, so edits
        // never invalidate a position that is still pending.
        let positions = self.match_positions(path, include_self);
        for pos in positions.iter().rev() {
            if let Some(el) = self.element_at_mut(pos) {
                f(el)?;
            }
        }
        Ok(positions.len())
    }

    fn replace_matches_from<F>(
        &mut self,
        path: &ElementPath,
        include_self: bool,
        mut f: F,
    ) -> Result<usize>
    where
        F: FnMut(&Element) -> Result<Option<Vec<Node>>>,
    {
        let positions = self.match_positions(path, include_self);
        let mut replaced = 0;
        for pos in positions.iter().rev() {
            let Some((&last, parent_pos)) = pos.split_last() else {
                continue;
            };
            let Some(parent) = self.element_at_mut(parent_pos) else {
                continue;
            };
            let Some(Node::Element(target)) = parent.children.get(last) else {
                continue;
            };
            if let Some(nodes) = f(target)? {
                parent.children.splice(last..=last, nodes);
                replaced += 1;
            }
        }
        Ok(replaced)
    }

    /// Child-index paths of all matches, in document order. The empty path is
    /// this element itself.
    fn match_positions(&self, path: &ElementPath, include_self: bool) -> Vec<Vec<usize>> {
        let mut out = Vec::new();
        if path.is_self() {
            out.push(Vec::new());
            return out;
        }

        let mut chain: Vec<&Element> = Vec::new();
        let mut position: Vec<usize> = Vec::new();
        if include_self {
            chain.push(self);
            if path.matches(&chain) {
                out.push(Vec::new());
            }
        }
        collect_positions(self, path, &mut chain, &mut position, &mut out);
        out
    }

    fn element_at(&self, pos: &[usize]) -> Option<&Element> {
        let mut current = self;
        for &i in pos {
            current = current.children.get(i)?.as_element()?;
        }
        Some(current)
    }

    fn element_at_mut(&mut self, pos: &[usize]) -> Option<&mut Element> {
        let mut current = self;
        for &i in pos {
            current = match current.children.get_mut(i)? {
                Node::Element(el) => el,
                Node::Text(_) => return None,
            };
        }
        Some(current)
    }
}

impl PathNode for Element {
    fn node_name(&self) -> &str {
        &self.name
    }

    fn node_attr(&self, key: &str) -> Option<&str> {
        self.attr(key)
    }
}

fn collect_positions<'a>(
    parent: &'a Element,
    path: &ElementPath,
    chain: &mut Vec<&'a Element>,
    position: &mut Vec<usize>,
    out: &mut Vec<Vec<usize>>,
) {
    if path.is_fixed_depth() && chain.len() >= path.depth() {
        return;
    }
    for (i, node) in parent.children.iter().enumerate() {
        let Node::Element(child) = node else {
            continue;
        };
        chain.push(child);
        position.push(i);
        if path.matches(chain) {
            out.push(position.clone());
        }
        collect_positions(child, path, chain, position, out);
        position.pop();
        chain.pop();
    }
}

fn collect_text(el: &Element, out: &mut String) {
    for node in &el.children {
        match node {
            Node::Text(t) => out.push_str(t),
            Node::Element(child) => collect_text(child, out),
        }
    }
}

fn write_element(el: &Element, out: &mut String) {
    out.push('<');
    out.push_str(&el.name);
    for (key, value) in &el.attributes {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        out.push_str(&quick_xml::escape::escape(value.as_str()));
        out.push('"');
    }
    if el.children.is_empty() {
        out.push_str(" />");
        return;
    }
    out.push('>');
    for node in &el.children {
        match node {
            Node::Text(t) => out.push_str(&quick_xml::escape::partial_escape(t.as_str())),
            Node::Element(child) => write_element(child, out),
        }
    }
    out.push_str("</");
    out.push_str(&el.name);
    out.push('>');
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(expr: &str) -> ElementPath {
        ElementPath::parse(expr).unwrap()
    }

    const TOPIC: &str = r#"<?xml version="1.0"?>
<!-- generated -->
<document id="T:A">
  <summary>Says <b>hello</b> &amp; more</summary>
  <section><referenceLink target="T:B" /><referenceLink target="T:C">see C</referenceLink></section>
</document>"#;

    #[test]
    fn parse_keeps_structure_and_text() {
        let doc = Document::parse(TOPIC).unwrap();
        assert_eq!(doc.root.name, "document");
        assert_eq!(doc.root.attr("id"), Some("T:A"));

        let summary = doc.root.find_child("summary").unwrap();
        assert_eq!(summary.text(), "Says hello & more");
        assert_eq!(summary.find_child("b").unwrap().text(), "hello");
    }

    #[test]
    fn parse_rejects_malformed_input() {
        assert!(Document::parse("<a><b></a>").is_err());
        assert!(Document::parse("<a>").is_err());
        assert!(Document::parse("   ").is_err());
    }

    #[test]
    fn cdata_becomes_text() {
        let doc = Document::parse("<code><![CDATA[if a < b]]></code>").unwrap();
        assert_eq!(doc.root.text(), "if a < b");
        assert_eq!(doc.to_xml_string(), "<code>if a &lt; b</code>");
    }

    #[test]
    fn serialization_escapes_and_reparses() {
        let el = Element::new("a")
            .with_attr("title", "x \"quoted\" & <tag>")
            .with_text("1 < 2 & 3")
            .with_child(Element::new("empty"));
        let xml = el.to_xml_string();
        assert!(xml.ends_with("<empty /></a>"));

        let reparsed = Document::parse(&xml).unwrap();
        assert_eq!(reparsed.root, el);
    }

    #[test]
    fn select_relative_and_absolute() {
        let doc = Document::parse(TOPIC).unwrap();
        assert_eq!(doc.select(&path("//referenceLink")).len(), 2);
        assert_eq!(doc.select(&path("/document/summary")).len(), 1);
        assert_eq!(doc.select(&path("document/summary")).len(), 1);
        assert_eq!(doc.select(&path("summary")).len(), 0);

        // From an element, relative paths start at its children.
        assert_eq!(doc.root.select(&path("summary")).len(), 1);
        assert_eq!(doc.root.select(&path(".")).len(), 1);
        let first = doc
            .select_first(&path("//referenceLink[@target='T:C']"))
            .unwrap();
        assert_eq!(first.text(), "see C");
    }

    #[test]
    fn for_each_match_mut_edits_in_place() {
        let mut doc = Document::parse(TOPIC).unwrap();
        let count = doc
            .for_each_match_mut(&path("//referenceLink"), |el| {
                el.set_attr("seen", "yes");
                Ok(())
            })
            .unwrap();
        assert_eq!(count, 2);
        assert!(
            doc.select(&path("//referenceLink"))
                .iter()
                .all(|el| el.attr("seen") == Some("yes"))
        );
    }

    #[test]
    fn replace_matches_splices_nodes() {
        let mut doc = Document::parse(TOPIC).unwrap();
        let replaced = doc
            .replace_matches(&path("//referenceLink"), |el| {
                let target = el.attr("target").unwrap_or_default().to_string();
                Ok(Some(vec![
                    Node::Element(Element::new("a").with_attr("href", target)),
                    Node::Text("!".into()),
                ]))
            })
            .unwrap();
        assert_eq!(replaced, 2);

        let section = doc.root.find_child("section").unwrap();
        let hrefs: Vec<_> = section
            .child_elements()
            .map(|a| a.attr("href").unwrap())
            .collect();
        assert_eq!(hrefs, vec!["T:B", "T:C"]);
        assert_eq!(section.children.len(), 4);
        assert!(doc.select(&path("//referenceLink")).is_empty());
    }

    #[test]
    fn replace_matches_none_leaves_element() {
        let mut doc = Document::parse(TOPIC).unwrap();
        let replaced = doc
            .replace_matches(&path("//referenceLink"), |_| Ok(None))
            .unwrap();
        assert_eq!(replaced, 0);
        assert_eq!(doc.select(&path("//referenceLink")).len(), 2);
    }

    #[test]
    fn push_text_merges_adjacent_text() {
        let mut el = Element::new("p");
        el.push_text("a");
        el.push_text("b");
        el.push_text("");
        assert_eq!(el.children, vec![Node::Text("ab".into())]);
        assert!(el.has_content());
        assert!(!Element::new("p").with_text("  ").has_content());
    }

    #[test]
    fn attributes_are_replaced_in_place() {
        let mut el = Element::new("a").with_attr("x", "1").with_attr("y", "2");
        el.set_attr("x", "3");
        assert_eq!(
            el.attributes,
            vec![("x".into(), "3".into()), ("y".into(), "2".into())]
        );
        assert_eq!(el.remove_attr("y"), Some("2".into()));
        assert_eq!(el.remove_attr("y"), None);
    }
}
