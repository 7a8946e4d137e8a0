//! Node locators.
//!
//! A locator is either `#<id>` or a chain of `tag.class1.class2` segments from
//! the root element down to the node, joined by `" > "`. It is a best-effort
//! structural path: it is not unique when siblings share tag and classes, and it
//! goes stale when the tree is edited. Re-resolving against an unchanged tree
//! returns the first element in document order that the locator describes.

use crate::html::{self, Document};
use kuchiki::NodeRef;

const SEPARATOR: &str = " > ";

/// Computes the locator for `node`. Non-element nodes yield an empty string.
pub fn resolve(node: &NodeRef) -> String {
    if let Some(id) = html::attr(node, "id") {
        if !id.is_empty() {
            return format!("#{id}");
        }
    }

    let mut path: Vec<String> = node
        .inclusive_ancestors()
        .take_while(|ancestor| ancestor.as_element().is_some())
        .map(|element| segment_for(&element))
        .collect();
    path.reverse();
    path.join(SEPARATOR)
}

fn segment_for(element: &NodeRef) -> String {
    let mut segment = html::tag_name(element).unwrap_or_default();
    let classes = html::class_list(element);
    if !classes.is_empty() {
        segment.push('.');
        segment.push_str(&classes.join("."));
    }
    segment
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Locator {
    Id(String),
    Path(Vec<Segment>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Segment {
    tag: String,
    classes: Vec<String>,
}

impl Segment {
    fn matches(&self, element: &NodeRef) -> bool {
        if !html::is_tag(element, &self.tag) {
            return false;
        }
        let classes = html::class_list(element);
        self.classes.iter().all(|wanted| classes.contains(wanted))
    }
}

fn parse_locator(locator: &str) -> Option<Locator> {
    let locator = locator.trim();
    if let Some(id) = locator.strip_prefix('#') {
        return (!id.is_empty()).then(|| Locator::Id(id.to_string()));
    }
    let mut segments = Vec::new();
    for raw in locator.split(SEPARATOR) {
        let mut parts = raw.trim().split('.');
        let tag = parts.next().unwrap_or("").to_ascii_lowercase();
        if tag.is_empty() {
            return None;
        }
        let classes: Vec<String> = parts
            .filter(|class| !class.is_empty())
            .map(str::to_string)
            .collect();
        segments.push(Segment { tag, classes });
    }
    (!segments.is_empty()).then_some(Locator::Path(segments))
}

/// Finds the first element in document order described by `locator`.
pub fn query(doc: &Document, locator: &str) -> Option<NodeRef> {
    match parse_locator(locator)? {
        Locator::Id(id) => doc
            .elements()
            .into_iter()
            .find(|element| html::attr(element, "id").as_deref() == Some(id.as_str())),
        Locator::Path(segments) => doc
            .elements()
            .into_iter()
            .find(|element| path_matches(element, &segments)),
    }
}

// Root-anchored child chain: the last segment is the element itself, each
// earlier segment matches the next parent up, and the first has no element
// parent.
fn path_matches(element: &NodeRef, segments: &[Segment]) -> bool {
    let mut current = Some(element.clone());
    for segment in segments.iter().rev() {
        let Some(node) = current else {
            return false;
        };
        if !segment.matches(&node) {
            return false;
        }
        current = html::parent_element(&node);
    }
    current.is_none()
}
