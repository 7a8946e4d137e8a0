//! The heuristic checklist. Every rule is a read-only predicate over the whole
//! document; rules never see each other's output.

use crate::error::RuleError;
use crate::html::{self, Document};
use crate::selector;
use crate::style::{ResolvedColors, StyleResolver};
use a11y_report_contract::{LocatorKind, RULE_CATALOG_V1, RuleDef, Severity};
use kuchiki::NodeRef;
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;
use std::collections::HashSet;

/// One raw match of one rule against one node (or the document).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    #[serde(rename = "rule")]
    pub rule_id: String,
    pub message: String,
    pub severity: Severity,
    #[serde(rename = "selector")]
    pub locator: String,
}

impl Finding {
    pub fn new(
        rule_id: impl Into<String>,
        message: impl Into<String>,
        severity: Severity,
        locator: impl Into<String>,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            message: message.into(),
            severity,
            locator: locator.into(),
        }
    }

    fn at_node(def: &RuleDef, node: &NodeRef) -> Self {
        Self::new(def.rule, def.message, def.severity, selector::resolve(node))
    }

    fn at_fixed(def: &RuleDef) -> Self {
        let locator = match def.locator {
            LocatorKind::Fixed(locator) => locator,
            LocatorKind::PerNode => "html",
        };
        Self::new(def.rule, def.message, def.severity, locator)
    }
}

/// Attribute values from before presentation fixes overwrote them.
pub trait PristineAttributes {
    /// `Some(original)` when `name` on `node` has been overwritten, where
    /// `original` is `None` if the attribute was absent.
    fn pristine_attr(&self, node: &NodeRef, name: &str) -> Option<Option<String>>;
}

/// What a rule gets to look at. Style resolution is built on first use and
/// shared by every rule in the pass.
pub struct RuleContext<'a> {
    doc: &'a Document,
    pristine: Option<&'a dyn PristineAttributes>,
    styles: OnceCell<StyleResolver>,
}

impl<'a> RuleContext<'a> {
    pub fn new(doc: &'a Document) -> Self {
        Self {
            doc,
            pristine: None,
            styles: OnceCell::new(),
        }
    }

    /// Rules see attributes as authored, not as `pristine`'s fixes left them.
    pub fn with_pristine(doc: &'a Document, pristine: &'a dyn PristineAttributes) -> Self {
        Self {
            pristine: Some(pristine),
            ..Self::new(doc)
        }
    }

    pub fn document(&self) -> &Document {
        self.doc
    }

    pub fn styles(&self) -> &StyleResolver {
        self.styles
            .get_or_init(|| StyleResolver::from_document(self.doc))
    }

    pub fn attr(&self, node: &NodeRef, name: &str) -> Option<String> {
        match self.pristine.and_then(|pristine| pristine.pristine_attr(node, name)) {
            Some(original) => original,
            None => html::attr(node, name),
        }
    }

    pub fn has_attr(&self, node: &NodeRef, name: &str) -> bool {
        self.attr(node, name).is_some()
    }

    pub fn colors(&self, node: &NodeRef) -> Option<ResolvedColors> {
        self.styles()
            .resolve_with(node, |element| self.attr(element, "style"))
    }

    /// Elements matching `css` in document order. A selector the engine cannot
    /// compile is a rule bug and fails the rule.
    pub fn select(&self, rule: &str, css: &str) -> Result<Vec<NodeRef>, RuleError> {
        match self.doc.node().select(css) {
            Ok(found) => Ok(found.map(|el| el.as_node().clone()).collect()),
            Err(()) => Err(RuleError::new(rule, format!("invalid selector `{css}`"))),
        }
    }
}

pub trait Rule {
    /// Reported rule id, e.g. `WCAG 1.1.1`. Not unique across rules.
    fn id(&self) -> &'static str;

    /// Unique registry key.
    fn key(&self) -> &'static str;

    fn evaluate(&self, cx: &RuleContext<'_>) -> Result<Vec<Finding>, RuleError>;
}

const IMG_ALT: &RuleDef = &RULE_CATALOG_V1[0];
const IMG_DECORATIVE_ROLE: &RuleDef = &RULE_CATALOG_V1[1];
const BUTTON_NAME: &RuleDef = &RULE_CATALOG_V1[2];
const FORM_LABEL: &RuleDef = &RULE_CATALOG_V1[3];
const LINK_PURPOSE: &RuleDef = &RULE_CATALOG_V1[4];
const KEYBOARD_CLICK: &RuleDef = &RULE_CATALOG_V1[5];
const HTML_LANG: &RuleDef = &RULE_CATALOG_V1[6];
const DOCUMENT_TITLE: &RuleDef = &RULE_CATALOG_V1[7];
const DUPLICATE_ID: &RuleDef = &RULE_CATALOG_V1[8];
const HEADING_STRUCTURE: &RuleDef = &RULE_CATALOG_V1[9];
const COLOR_CONTRAST: &RuleDef = &RULE_CATALOG_V1[10];

/// Link texts that say nothing about the destination.
pub const VAGUE_LINK_TEXT: [&str; 3] = ["click here", "read more", "more"];

macro_rules! catalog_rule {
    ($name:ident, $def:expr) => {
        pub struct $name;

        impl $name {
            const DEF: &'static RuleDef = $def;
        }
    };
}

catalog_rule!(MissingAltText, IMG_ALT);
catalog_rule!(DecorativeImageRole, IMG_DECORATIVE_ROLE);
catalog_rule!(ButtonName, BUTTON_NAME);
catalog_rule!(FormLabel, FORM_LABEL);
catalog_rule!(LinkPurpose, LINK_PURPOSE);
catalog_rule!(KeyboardClickable, KEYBOARD_CLICK);
catalog_rule!(PageLanguage, HTML_LANG);
catalog_rule!(PageTitle, DOCUMENT_TITLE);
catalog_rule!(DuplicateId, DUPLICATE_ID);
catalog_rule!(HeadingStructure, HEADING_STRUCTURE);
catalog_rule!(ColorContrast, COLOR_CONTRAST);

/// Non-empty attribute value, the way a script's truthiness check sees it.
fn truthy_attr(node: &NodeRef, name: &str) -> bool {
    html::attr(node, name)
        .map(|value| !value.is_empty())
        .unwrap_or(false)
}

impl Rule for MissingAltText {
    fn id(&self) -> &'static str {
        Self::DEF.rule
    }

    fn key(&self) -> &'static str {
        Self::DEF.key
    }

    fn evaluate(&self, cx: &RuleContext<'_>) -> Result<Vec<Finding>, RuleError> {
        Ok(cx
            .select(self.key(), "img")?
            .iter()
            .filter(|img| {
                cx.attr(img, "alt")
                    .filter(|alt| !alt.trim().is_empty())
                    .is_none()
            })
            .map(|img| Finding::at_node(Self::DEF, img))
            .collect())
    }
}

impl Rule for DecorativeImageRole {
    fn id(&self) -> &'static str {
        Self::DEF.rule
    }

    fn key(&self) -> &'static str {
        Self::DEF.key
    }

    fn evaluate(&self, cx: &RuleContext<'_>) -> Result<Vec<Finding>, RuleError> {
        Ok(cx
            .select(self.key(), "img")?
            .iter()
            .filter(|img| cx.attr(img, "alt").as_deref() == Some(""))
            .filter(|img| !cx.has_attr(img, "role"))
            .map(|img| Finding::at_node(Self::DEF, img))
            .collect())
    }
}

impl Rule for ButtonName {
    fn id(&self) -> &'static str {
        Self::DEF.rule
    }

    fn key(&self) -> &'static str {
        Self::DEF.key
    }

    fn evaluate(&self, cx: &RuleContext<'_>) -> Result<Vec<Finding>, RuleError> {
        Ok(cx
            .select(self.key(), "button")?
            .iter()
            .filter(|button| {
                html::visible_text(button).is_empty()
                    && !truthy_attr(button, "aria-label")
                    && !truthy_attr(button, "aria-labelledby")
            })
            .map(|button| Finding::at_node(Self::DEF, button))
            .collect())
    }
}

impl Rule for FormLabel {
    fn id(&self) -> &'static str {
        Self::DEF.rule
    }

    fn key(&self) -> &'static str {
        Self::DEF.key
    }

    fn evaluate(&self, cx: &RuleContext<'_>) -> Result<Vec<Finding>, RuleError> {
        let labelled: HashSet<String> = cx
            .select(self.key(), "label[for]")?
            .iter()
            .filter_map(|label| html::attr(label, "for"))
            .collect();
        Ok(cx
            .select(self.key(), "input, textarea, select")?
            .iter()
            .filter(|control| {
                let has_label = html::attr(control, "id")
                    .map(|id| !id.is_empty() && labelled.contains(&id))
                    .unwrap_or(false);
                !has_label
                    && !truthy_attr(control, "aria-label")
                    && !truthy_attr(control, "aria-labelledby")
            })
            .map(|control| Finding::at_node(Self::DEF, control))
            .collect())
    }
}

impl Rule for LinkPurpose {
    fn id(&self) -> &'static str {
        Self::DEF.rule
    }

    fn key(&self) -> &'static str {
        Self::DEF.key
    }

    fn evaluate(&self, cx: &RuleContext<'_>) -> Result<Vec<Finding>, RuleError> {
        Ok(cx
            .select(self.key(), "a")?
            .iter()
            .filter(|link| {
                let text = html::visible_text(link).to_lowercase();
                VAGUE_LINK_TEXT.contains(&text.as_str())
            })
            .map(|link| Finding::at_node(Self::DEF, link))
            .collect())
    }
}

impl Rule for KeyboardClickable {
    fn id(&self) -> &'static str {
        Self::DEF.rule
    }

    fn key(&self) -> &'static str {
        Self::DEF.key
    }

    fn evaluate(&self, cx: &RuleContext<'_>) -> Result<Vec<Finding>, RuleError> {
        Ok(cx
            .select(self.key(), "[onclick]")?
            .iter()
            .filter(|el| !html::is_tag(el, "button") && !html::is_tag(el, "a"))
            .filter(|el| !cx.has_attr(el, "tabindex"))
            .map(|el| Finding::at_node(Self::DEF, el))
            .collect())
    }
}

impl Rule for PageLanguage {
    fn id(&self) -> &'static str {
        Self::DEF.rule
    }

    fn key(&self) -> &'static str {
        Self::DEF.key
    }

    fn evaluate(&self, cx: &RuleContext<'_>) -> Result<Vec<Finding>, RuleError> {
        let has_lang = cx
            .document()
            .root_element()
            .map(|root| html::has_attr(&root, "lang"))
            .unwrap_or(false);
        Ok(if has_lang {
            Vec::new()
        } else {
            vec![Finding::at_fixed(Self::DEF)]
        })
    }
}

impl Rule for PageTitle {
    fn id(&self) -> &'static str {
        Self::DEF.rule
    }

    fn key(&self) -> &'static str {
        Self::DEF.key
    }

    fn evaluate(&self, cx: &RuleContext<'_>) -> Result<Vec<Finding>, RuleError> {
        let titled = cx
            .document()
            .title()
            .map(|title| !title.trim().is_empty())
            .unwrap_or(false);
        Ok(if titled {
            Vec::new()
        } else {
            vec![Finding::at_fixed(Self::DEF)]
        })
    }
}

impl Rule for DuplicateId {
    fn id(&self) -> &'static str {
        Self::DEF.rule
    }

    fn key(&self) -> &'static str {
        Self::DEF.key
    }

    // The first element carrying an id passes; each later one is reported.
    fn evaluate(&self, cx: &RuleContext<'_>) -> Result<Vec<Finding>, RuleError> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut findings = Vec::new();
        for el in cx.select(self.key(), "[id]")? {
            let Some(id) = html::attr(&el, "id").filter(|id| !id.is_empty()) else {
                continue;
            };
            if !seen.insert(id) {
                findings.push(Finding::at_node(Self::DEF, &el));
            }
        }
        Ok(findings)
    }
}

impl Rule for HeadingStructure {
    fn id(&self) -> &'static str {
        Self::DEF.rule
    }

    fn key(&self) -> &'static str {
        Self::DEF.key
    }

    fn evaluate(&self, cx: &RuleContext<'_>) -> Result<Vec<Finding>, RuleError> {
        let headings = cx.select(self.key(), "h1, h2, h3, h4, h5, h6")?;
        Ok(if headings.is_empty() {
            vec![Finding::at_fixed(Self::DEF)]
        } else {
            Vec::new()
        })
    }
}

const NON_RENDERED: [&str; 5] = ["script", "style", "noscript", "template", "title"];

impl Rule for ColorContrast {
    fn id(&self) -> &'static str {
        Self::DEF.rule
    }

    fn key(&self) -> &'static str {
        Self::DEF.key
    }

    // Only flags the degenerate case of identical foreground and background.
    fn evaluate(&self, cx: &RuleContext<'_>) -> Result<Vec<Finding>, RuleError> {
        let Some(body) = cx.document().body() else {
            return Ok(Vec::new());
        };
        let mut findings = Vec::new();
        for el in body.inclusive_descendants() {
            let Some(tag) = html::tag_name(&el) else {
                continue;
            };
            if NON_RENDERED.contains(&tag.as_str()) || html::visible_text(&el).is_empty() {
                continue;
            }
            let Some(colors) = cx.colors(&el) else {
                continue;
            };
            if colors.color == colors.background && !colors.color.is_transparent() {
                findings.push(Finding::at_node(Self::DEF, &el));
            }
        }
        Ok(findings)
    }
}

/// Ordered rule registry. Scan output follows registry order.
pub struct RuleSet {
    rules: Vec<Box<dyn Rule>>,
}

impl RuleSet {
    /// The fixed checklist, in catalog order.
    pub fn standard() -> Self {
        let rules: Vec<Box<dyn Rule>> = vec![
            Box::new(MissingAltText),
            Box::new(DecorativeImageRole),
            Box::new(ButtonName),
            Box::new(FormLabel),
            Box::new(LinkPurpose),
            Box::new(KeyboardClickable),
            Box::new(PageLanguage),
            Box::new(PageTitle),
            Box::new(DuplicateId),
            Box::new(HeadingStructure),
            Box::new(ColorContrast),
        ];
        Self { rules }
    }

    pub fn push(&mut self, rule: Box<dyn Rule>) {
        self.rules.push(rule);
    }

    pub fn with(mut self, rule: Box<dyn Rule>) -> Self {
        self.push(rule);
        self
    }

    /// Drops every rule whose key or reported id equals `key`.
    pub fn without(mut self, key: &str) -> Self {
        self.rules
            .retain(|rule| rule.key() != key && rule.id() != key);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Rule> {
        self.rules.iter().map(|rule| rule.as_ref())
    }

    pub fn keys(&self) -> Vec<&'static str> {
        self.rules.iter().map(|rule| rule.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::standard()
    }
}

impl FromIterator<Box<dyn Rule>> for RuleSet {
    fn from_iter<I: IntoIterator<Item = Box<dyn Rule>>>(iter: I) -> Self {
        Self {
            rules: iter.into_iter().collect(),
        }
    }
}
