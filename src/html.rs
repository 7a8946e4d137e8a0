use crate::error::Result;
use kuchiki::traits::TendrilSink;
use kuchiki::{NodeData, NodeRef};
use std::path::Path;

/// A parsed HTML document. Nodes handed out are shared handles into this tree;
/// the tracker reads them and, for enhancement and highlighting, edits a few
/// attributes in place.
#[derive(Clone)]
pub struct Document {
    root: NodeRef,
}

impl Document {
    pub fn parse(html: &str) -> Self {
        Self {
            root: kuchiki::parse_html().one(html),
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let html = std::fs::read_to_string(path)?;
        Ok(Self::parse(&html))
    }

    pub fn node(&self) -> &NodeRef {
        &self.root
    }

    /// Every element in document order.
    pub fn elements(&self) -> Vec<NodeRef> {
        self.root
            .descendants()
            .filter(|node| node.as_element().is_some())
            .collect()
    }

    /// Elements matching a CSS selector, in document order. An invalid selector
    /// matches nothing.
    pub fn select_all(&self, selector: &str) -> Vec<NodeRef> {
        match self.root.select(selector) {
            Ok(found) => found.map(|el| el.as_node().clone()).collect(),
            Err(()) => Vec::new(),
        }
    }

    pub fn select_first(&self, selector: &str) -> Option<NodeRef> {
        self.root
            .select_first(selector)
            .ok()
            .map(|el| el.as_node().clone())
    }

    /// The `<html>` element.
    pub fn root_element(&self) -> Option<NodeRef> {
        self.root
            .children()
            .find(|child| child.as_element().is_some())
    }

    pub fn body(&self) -> Option<NodeRef> {
        self.select_first("body")
    }

    /// Text of the first `<title>`, untrimmed. `None` when there is no title.
    pub fn title(&self) -> Option<String> {
        self.select_first("title").map(|title| title.text_contents())
    }

    pub fn to_html(&self) -> String {
        self.root.to_string()
    }
}

pub fn tag_name(node: &NodeRef) -> Option<String> {
    node.as_element()
        .map(|el| el.name.local.as_ref().to_ascii_lowercase())
}

pub fn is_tag(node: &NodeRef, tag: &str) -> bool {
    node.as_element()
        .map(|el| el.name.local.as_ref().eq_ignore_ascii_case(tag))
        .unwrap_or(false)
}

pub fn attr(node: &NodeRef, name: &str) -> Option<String> {
    let element = node.as_element()?;
    let attrs = element.attributes.borrow();
    attrs.get(name).map(|value| value.to_string())
}

pub fn has_attr(node: &NodeRef, name: &str) -> bool {
    node.as_element()
        .map(|el| el.attributes.borrow().contains(name))
        .unwrap_or(false)
}

/// Attribute value when present and not blank after trimming.
pub fn non_blank_attr(node: &NodeRef, name: &str) -> Option<String> {
    attr(node, name).filter(|value| !value.trim().is_empty())
}

pub fn set_attr(node: &NodeRef, name: &str, value: &str) {
    if let Some(element) = node.as_element() {
        element
            .attributes
            .borrow_mut()
            .insert(name, value.to_string());
    }
}

pub fn remove_attr(node: &NodeRef, name: &str) {
    if let Some(element) = node.as_element() {
        element.attributes.borrow_mut().remove(name);
    }
}

pub fn class_list(node: &NodeRef) -> Vec<String> {
    attr(node, "class")
        .map(|class| class.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

pub fn parent_element(node: &NodeRef) -> Option<NodeRef> {
    node.parent().filter(|parent| parent.as_element().is_some())
}

/// Rendered-ish text: `script`/`style` skipped, whitespace collapsed, trimmed.
pub fn visible_text(node: &NodeRef) -> String {
    let mut out = String::new();
    collect_text(node, &mut out);
    normalize_text(&out)
}

/// Builds a detached element by parsing a one-element fragment.
pub(crate) fn detached_element(tag: &str) -> Option<NodeRef> {
    let scratch = kuchiki::parse_html().one(format!("<{tag}></{tag}>"));
    let element = scratch.select_first(tag).ok()?.as_node().clone();
    element.detach();
    Some(element)
}

fn collect_text(node: &NodeRef, out: &mut String) {
    match node.data() {
        NodeData::Text(text) => {
            out.push_str(&text.borrow());
        }
        NodeData::Element(element) => {
            let tag = element.name.local.as_ref();
            if tag.eq_ignore_ascii_case("br") {
                out.push('\n');
                return;
            }
            if tag.eq_ignore_ascii_case("script") || tag.eq_ignore_ascii_case("style") {
                return;
            }
            for child in node.children() {
                collect_text(&child, out);
            }
        }
        NodeData::Document(_) | NodeData::DocumentFragment => {
            for child in node.children() {
                collect_text(&child, out);
            }
        }
        _ => {}
    }
}

fn normalize_text(text: &str) -> String {
    let mut out = String::new();
    let mut in_space = false;
    for ch in text.chars() {
        let ch = if ch == '\u{00A0}' { ' ' } else { ch };
        if ch.is_whitespace() {
            if !in_space {
                out.push(' ');
                in_space = true;
            }
        } else {
            out.push(ch);
            in_space = false;
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parser_synthesizes_html_head_and_body() {
        let doc = Document::parse("<p>hello</p>");
        let root = doc.root_element().expect("html");
        assert_eq!(tag_name(&root).as_deref(), Some("html"));
        assert!(doc.body().is_some());
        assert!(doc.title().is_none());
    }

    #[test]
    fn visible_text_skips_script_and_collapses_whitespace() {
        let doc = Document::parse(
            "<button id=b>\n  Save <script>var x = 1;</script>\u{00A0} draft\n</button>",
        );
        let button = doc.select_first("#b").expect("button");
        assert_eq!(visible_text(&button), "Save draft");
    }

    #[test]
    fn attribute_helpers_edit_in_place() {
        let doc = Document::parse("<img id=i alt='  ' class=' a  b '>");
        let img = doc.select_first("#i").expect("img");
        assert!(has_attr(&img, "alt"));
        assert!(non_blank_attr(&img, "alt").is_none());
        assert_eq!(class_list(&img), vec!["a", "b"]);
        set_attr(&img, "alt", "Logo");
        assert_eq!(attr(&img, "alt").as_deref(), Some("Logo"));
        remove_attr(&img, "alt");
        assert!(!has_attr(&img, "alt"));
    }

    #[test]
    fn detached_element_has_no_parent() {
        let div = detached_element("div").expect("div");
        assert!(div.parent().is_none());
        assert!(is_tag(&div, "div"));
    }
}
