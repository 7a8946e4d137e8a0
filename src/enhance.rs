//! Reversible presentation fixes.
//!
//! Every value is saved to the [`StyleSnapshot`] before it is overwritten, the
//! first time a given node and property are touched. Later passes never
//! overwrite a saved value, so `apply` may run any number of times before a
//! single `revert` restores the pristine state.

use crate::debug::DebugLogger;
use crate::html::{self, Document};
use crate::rules::PristineAttributes;
use crate::style::InlineStyle;
use kuchiki::{Node, NodeRef};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::rc::Rc;

const TEXT_BEARING: &str = "p, span, label, a, li, h1, h2, h3, h4, h5, h6, td, th, button";
const INTERACTIVE: &str = "a, button, input, select, textarea";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Slot {
    Style(&'static str),
    Attr(&'static str),
}

struct NodeSnapshot {
    node: NodeRef,
    raw_style: Option<String>,
    saved: Vec<(Slot, Option<String>)>,
}

impl NodeSnapshot {
    fn restore(&self) {
        let mut style = InlineStyle::of(&self.node);
        let mut style_touched = false;
        for (slot, value) in &self.saved {
            match slot {
                Slot::Style(name) => {
                    style.set(name, value.as_deref().unwrap_or(""));
                    style_touched = true;
                }
                Slot::Attr(name) => match value {
                    Some(value) => html::set_attr(&self.node, name, value),
                    None => html::remove_attr(&self.node, name),
                },
            }
        }
        if !style_touched {
            return;
        }
        // Put the original text back verbatim when nothing else changed it.
        let original = self.raw_style.as_deref().map(InlineStyle::parse);
        match (&self.raw_style, original) {
            (Some(raw), Some(original)) if original == style => {
                html::set_attr(&self.node, "style", raw)
            }
            (None, _) if style.is_empty() => html::remove_attr(&self.node, "style"),
            _ => style.write_to(&self.node),
        }
    }
}

/// Saved pre-enhancement values, keyed by node identity.
#[derive(Default)]
pub struct StyleSnapshot {
    entries: Vec<NodeSnapshot>,
    index: HashMap<*const Node, usize>,
}

impl StyleSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, node: &NodeRef) -> Option<&NodeSnapshot> {
        let slot = *self.index.get(&Rc::as_ptr(&node.0))?;
        self.entries.get(slot)
    }

    /// Number of nodes with saved values.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, node: &NodeRef) -> bool {
        self.index.contains_key(&Rc::as_ptr(&node.0))
    }

    /// Saved inline value for `property`. Outer `None` when nothing was saved;
    /// inner `None` when the property was not set inline.
    pub fn saved_style(&self, node: &NodeRef, property: &str) -> Option<Option<&str>> {
        self.entry(node)?
            .saved
            .iter()
            .find_map(|(slot, value)| match slot {
                Slot::Style(name) if *name == property => Some(value.as_deref()),
                _ => None,
            })
    }

    fn save(&mut self, node: &NodeRef, slot: Slot) {
        let key = Rc::as_ptr(&node.0);
        let slot_index = match self.index.get(&key) {
            Some(&i) => i,
            None => {
                self.index.insert(key, self.entries.len());
                self.entries.push(NodeSnapshot {
                    node: node.clone(),
                    raw_style: html::attr(node, "style"),
                    saved: Vec::new(),
                });
                self.entries.len() - 1
            }
        };
        let entry = &mut self.entries[slot_index];
        if entry.saved.iter().any(|(saved, _)| *saved == slot) {
            return;
        }
        let value = match &slot {
            Slot::Style(name) => {
                let current = InlineStyle::of(node);
                Some(current.get(name).to_string()).filter(|v| !v.is_empty())
            }
            Slot::Attr(name) => html::attr(node, name),
        };
        entry.saved.push((slot, value));
    }

    fn save_style(&mut self, node: &NodeRef, property: &'static str) {
        self.save(node, Slot::Style(property));
    }

    fn save_attr(&mut self, node: &NodeRef, name: &'static str) {
        self.save(node, Slot::Attr(name));
    }

    /// Writes every saved value back, then forgets them all.
    fn restore_all(&mut self) -> usize {
        let restored = self.entries.len();
        for entry in &self.entries {
            entry.restore();
        }
        self.entries.clear();
        self.index.clear();
        restored
    }
}

/// Scans read through the snapshot, so fixes never change what is reported.
impl PristineAttributes for StyleSnapshot {
    fn pristine_attr(&self, node: &NodeRef, name: &str) -> Option<Option<String>> {
        let entry = self.entry(node)?;
        if name == "style" {
            let touched = entry
                .saved
                .iter()
                .any(|(slot, _)| matches!(slot, Slot::Style(_)));
            return touched.then(|| entry.raw_style.clone());
        }
        entry.saved.iter().find_map(|(slot, value)| match slot {
            Slot::Attr(saved) if *saved == name => Some(value.clone()),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnhancePalette {
    pub text_color: String,
    pub text_background: String,
    pub missing_alt_outline: String,
    pub focus_outline: String,
    /// Alt text written onto images that have none. `None` leaves alt alone.
    pub stub_alt: Option<String>,
}

pub const DEFAULT_STUB_ALT: &str = "Decorative image";

impl Default for EnhancePalette {
    fn default() -> Self {
        Self {
            text_color: "#000000".to_string(),
            text_background: "#ffffff".to_string(),
            missing_alt_outline: "3px solid #d32f2f".to_string(),
            focus_outline: "2px solid #1976d2".to_string(),
            stub_alt: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnhanceSummary {
    pub text_elements: usize,
    pub images_outlined: usize,
    pub alt_stubbed: usize,
    pub interactive_outlined: usize,
    pub tabindex_fixed: usize,
}

pub struct EnhancementEngine {
    snapshot: StyleSnapshot,
    palette: EnhancePalette,
    debug: Option<DebugLogger>,
}

impl EnhancementEngine {
    pub fn new(palette: EnhancePalette) -> Self {
        Self {
            snapshot: StyleSnapshot::new(),
            palette,
            debug: None,
        }
    }

    pub fn with_debug(mut self, debug: Option<DebugLogger>) -> Self {
        self.debug = debug;
        self
    }

    pub fn palette(&self) -> &EnhancePalette {
        &self.palette
    }

    pub fn snapshot(&self) -> &StyleSnapshot {
        &self.snapshot
    }

    pub fn apply(&mut self, doc: &Document) -> EnhanceSummary {
        let mut summary = EnhanceSummary::default();

        for el in doc.select_all(TEXT_BEARING) {
            self.snapshot.save_style(&el, "color");
            self.snapshot.save_style(&el, "background-color");
            let mut style = InlineStyle::of(&el);
            style.set("color", &self.palette.text_color);
            style.set("background-color", &self.palette.text_background);
            style.write_to(&el);
            summary.text_elements += 1;
        }

        for img in doc.select_all("img") {
            if html::non_blank_attr(&img, "alt").is_some() {
                continue;
            }
            self.snapshot.save_style(&img, "outline");
            let mut style = InlineStyle::of(&img);
            style.set("outline", &self.palette.missing_alt_outline);
            style.write_to(&img);
            summary.images_outlined += 1;

            if let Some(stub) = &self.palette.stub_alt {
                self.snapshot.save_attr(&img, "alt");
                html::set_attr(&img, "alt", stub);
                summary.alt_stubbed += 1;
            }
        }

        for el in doc.select_all(INTERACTIVE) {
            self.snapshot.save_style(&el, "outline");
            let mut style = InlineStyle::of(&el);
            style.set("outline", &self.palette.focus_outline);
            style.write_to(&el);
            summary.interactive_outlined += 1;

            if html::attr(&el, "tabindex").as_deref().map(str::trim) == Some("-1") {
                self.snapshot.save_attr(&el, "tabindex");
                html::set_attr(&el, "tabindex", "0");
                summary.tabindex_fixed += 1;
            }
        }

        tracing::debug!(
            text = summary.text_elements,
            images = summary.images_outlined,
            interactive = summary.interactive_outlined,
            saved_nodes = self.snapshot.len(),
            "enhancement applied"
        );
        if let Some(debug) = &self.debug {
            debug.log_event(
                "enhance.apply",
                json!({
                    "text_elements": summary.text_elements,
                    "images_outlined": summary.images_outlined,
                    "alt_stubbed": summary.alt_stubbed,
                    "interactive_outlined": summary.interactive_outlined,
                    "tabindex_fixed": summary.tabindex_fixed,
                    "saved_nodes": self.snapshot.len(),
                }),
            );
            debug.increment("enhance.apply", 1);
        }
        summary
    }

    /// Restores every saved node and clears the snapshot. Returns the number
    /// of nodes restored.
    pub fn revert(&mut self) -> usize {
        let restored = self.snapshot.restore_all();
        tracing::debug!(restored, "enhancement reverted");
        if let Some(debug) = &self.debug {
            debug.log_event("enhance.revert", json!({ "restored": restored }));
            debug.increment("enhance.revert", 1);
        }
        restored
    }
}

impl Default for EnhancementEngine {
    fn default() -> Self {
        Self::new(EnhancePalette::default())
    }
}
