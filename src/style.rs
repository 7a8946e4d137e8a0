use crate::html::{self, Document};
use crate::types::Rgba;
use kuchiki::{NodeRef, Selector, Selectors, Specificity};
use lightningcss::declaration::DeclarationBlock;
use lightningcss::properties::custom::{Token, TokenOrValue};
use lightningcss::properties::{Property, PropertyId};
use lightningcss::rules::{CssRule, CssRuleList};
use lightningcss::stylesheet::{ParserOptions, PrinterOptions, StyleAttribute, StyleSheet};
use lightningcss::traits::ToCss;
use lightningcss::values::color::{CssColor, SRGB};

/// Colors an element ends up painted with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedColors {
    pub color: Rgba,
    pub background: Rgba,
}

impl Default for ResolvedColors {
    fn default() -> Self {
        Self {
            color: Rgba::BLACK,
            background: Rgba::TRANSPARENT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColorValue {
    Value(Rgba),
    CurrentColor,
    Inherit,
    Initial,
    Unset,
}

#[derive(Debug, Clone, Copy, Default)]
struct StyleDelta {
    color: Option<ColorValue>,
    background: Option<ColorValue>,
}

impl StyleDelta {
    fn is_empty(&self) -> bool {
        self.color.is_none() && self.background.is_none()
    }

    fn merge(&mut self, other: &StyleDelta) {
        if other.color.is_some() {
            self.color = other.color;
        }
        if other.background.is_some() {
            self.background = other.background;
        }
    }
}

struct RuleEntry {
    selector: Selector,
    specificity: Specificity,
    order: usize,
    normal: StyleDelta,
    important: StyleDelta,
}

/// Cascade for the two properties the contrast heuristic needs: `color` and
/// `background-color`. Sources are the document's `<style>` blocks and inline
/// `style` attributes. Print-only media blocks are skipped; all other media
/// blocks apply.
pub struct StyleResolver {
    rules: Vec<RuleEntry>,
}

impl StyleResolver {
    pub fn new(css: &str) -> Self {
        let mut rules = Vec::new();
        let mut order = 0usize;

        fn append_rule_list(css_rules: CssRuleList, rules: &mut Vec<RuleEntry>, order: &mut usize) {
            for rule in css_rules.0 {
                match rule {
                    CssRule::Style(style) => {
                        let (normal_delta, important_delta) =
                            style_from_declarations(&style.declarations);
                        if normal_delta.is_empty() && important_delta.is_empty() {
                            *order += 1;
                            continue;
                        }
                        let selectors = style
                            .selectors
                            .to_css_string(PrinterOptions::default())
                            .unwrap_or_default();
                        let Ok(compiled) = Selectors::compile(&selectors) else {
                            tracing::debug!(selectors = %selectors, "skipping unsupported selector");
                            *order += 1;
                            continue;
                        };
                        for selector in compiled.0 {
                            rules.push(RuleEntry {
                                specificity: selector.specificity(),
                                selector,
                                order: *order,
                                normal: normal_delta,
                                important: important_delta,
                            });
                        }
                        *order += 1;
                    }
                    CssRule::Media(media) => {
                        let query = media
                            .query
                            .to_css_string(PrinterOptions::default())
                            .unwrap_or_default()
                            .to_ascii_lowercase();
                        if is_print_only(&query) {
                            continue;
                        }
                        append_rule_list(media.rules, rules, order);
                    }
                    _ => {}
                }
            }
        }

        if !css.trim().is_empty() {
            match StyleSheet::parse(css, ParserOptions::default()) {
                Ok(sheet) => append_rule_list(sheet.rules, &mut rules, &mut order),
                Err(err) => tracing::debug!(error = ?err, "stylesheet did not parse"),
            }
        }

        rules.sort_by(|a, b| {
            a.specificity
                .cmp(&b.specificity)
                .then(a.order.cmp(&b.order))
        });

        Self { rules }
    }

    /// Collects every `<style>` block outside inline SVG.
    pub fn from_document(doc: &Document) -> Self {
        let mut css = String::new();
        for style in doc.select_all("style") {
            let nested_in_svg = style.ancestors().any(|ancestor| html::is_tag(&ancestor, "svg"));
            if nested_in_svg {
                continue;
            }
            css.push_str(&style.text_contents());
            css.push('\n');
        }
        Self::new(&css)
    }

    pub fn resolve(&self, node: &NodeRef) -> Option<ResolvedColors> {
        self.resolve_with(node, |element| html::attr(element, "style"))
    }

    /// Same cascade, with each element's inline `style` read through
    /// `inline_style` instead of from the tree.
    pub fn resolve_with(
        &self,
        node: &NodeRef,
        inline_style: impl Fn(&NodeRef) -> Option<String>,
    ) -> Option<ResolvedColors> {
        node.as_element()?;
        let mut chain: Vec<NodeRef> = node
            .ancestors()
            .filter(|ancestor| ancestor.as_element().is_some())
            .collect();
        chain.reverse();
        chain.push(node.clone());

        let mut resolved = ResolvedColors::default();
        for element in &chain {
            resolved = self.compute(element, inline_style(element), resolved);
        }
        Some(resolved)
    }

    fn compute(
        &self,
        node: &NodeRef,
        inline: Option<String>,
        parent: ResolvedColors,
    ) -> ResolvedColors {
        let mut declared = StyleDelta::default();
        let (inline_normal, inline_important) = inline
            .map(|raw| inline_deltas(&raw))
            .unwrap_or_default();

        if let Some(element) = node.clone().into_element_ref() {
            let matched: Vec<&RuleEntry> = self
                .rules
                .iter()
                .filter(|rule| rule.selector.matches(&element))
                .collect();
            for rule in &matched {
                declared.merge(&rule.normal);
            }
            declared.merge(&inline_normal);
            for rule in &matched {
                declared.merge(&rule.important);
            }
            declared.merge(&inline_important);
        }

        let color = match declared.color {
            Some(ColorValue::Value(value)) => value,
            Some(ColorValue::Initial) => Rgba::BLACK,
            Some(ColorValue::Inherit | ColorValue::Unset | ColorValue::CurrentColor) | None => {
                parent.color
            }
        };
        let background = match declared.background {
            Some(ColorValue::Value(value)) => value,
            Some(ColorValue::CurrentColor) => color,
            Some(ColorValue::Inherit) => parent.background,
            Some(ColorValue::Initial | ColorValue::Unset) | None => Rgba::TRANSPARENT,
        };
        ResolvedColors { color, background }
    }
}

fn is_print_only(query: &str) -> bool {
    query.contains("print") && !query.contains("screen") && !query.contains("all")
}

fn inline_deltas(raw: &str) -> (StyleDelta, StyleDelta) {
    match StyleAttribute::parse(raw, ParserOptions::default()) {
        Ok(style) => style_from_declarations(&style.declarations),
        Err(_) => (StyleDelta::default(), StyleDelta::default()),
    }
}

fn style_from_declarations(block: &DeclarationBlock) -> (StyleDelta, StyleDelta) {
    let mut normal = StyleDelta::default();
    let mut important = StyleDelta::default();
    apply_properties(&block.declarations, &mut normal);
    apply_properties(&block.important_declarations, &mut important);
    (normal, important)
}

fn apply_properties(props: &[Property], delta: &mut StyleDelta) {
    for prop in props {
        match prop {
            Property::Color(color) => {
                if let Some(value) = color_value(color) {
                    delta.color = Some(value);
                }
            }
            Property::BackgroundColor(color) => {
                if let Some(value) = color_value(color) {
                    delta.background = Some(value);
                }
            }
            Property::Background(layers) => {
                if let Some(value) = layers.last().and_then(|layer| color_value(&layer.color)) {
                    delta.background = Some(value);
                }
            }
            Property::Unparsed(unparsed) => match &unparsed.property_id {
                PropertyId::Color => {
                    if let Some(value) = keyword_value(&unparsed.value.0) {
                        delta.color = Some(value);
                    }
                }
                PropertyId::BackgroundColor => {
                    if let Some(value) = keyword_value(&unparsed.value.0) {
                        delta.background = Some(value);
                    }
                }
                _ => {}
            },
            _ => {}
        }
    }
}

fn color_value(color: &CssColor) -> Option<ColorValue> {
    if matches!(color, CssColor::CurrentColor) {
        return Some(ColorValue::CurrentColor);
    }
    let srgb = SRGB::try_from(color).ok()?;
    Some(ColorValue::Value(Rgba::from_unit(
        srgb.r, srgb.g, srgb.b, srgb.alpha,
    )))
}

fn keyword_value(tokens: &[TokenOrValue]) -> Option<ColorValue> {
    for token in tokens {
        match token {
            TokenOrValue::Token(Token::Ident(ident)) => {
                return match ident.as_ref().to_ascii_lowercase().as_str() {
                    "inherit" => Some(ColorValue::Inherit),
                    "initial" => Some(ColorValue::Initial),
                    "unset" | "revert" => Some(ColorValue::Unset),
                    "currentcolor" => Some(ColorValue::CurrentColor),
                    _ => None,
                };
            }
            TokenOrValue::Color(color) => return color_value(color),
            TokenOrValue::Token(Token::WhiteSpace(_)) => continue,
            _ => return None,
        }
    }
    None
}

/// Ordered view of an element's `style` attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InlineStyle {
    declarations: Vec<(String, String)>,
}

impl InlineStyle {
    pub fn parse(raw: &str) -> Self {
        let mut style = Self::default();
        for part in split_declarations(raw) {
            let Some((name, value)) = part.split_once(':') else {
                continue;
            };
            let name = name.trim().to_ascii_lowercase();
            let value = value.trim();
            if name.is_empty() || value.is_empty() {
                continue;
            }
            style.set(&name, value);
        }
        style
    }

    pub fn of(node: &NodeRef) -> Self {
        html::attr(node, "style")
            .map(|raw| Self::parse(&raw))
            .unwrap_or_default()
    }

    /// Declared value, or an empty string when the property is not set inline.
    pub fn get(&self, name: &str) -> &str {
        self.declarations
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
            .unwrap_or("")
    }

    /// Setting an empty value removes the declaration.
    pub fn set(&mut self, name: &str, value: &str) {
        let name = name.to_ascii_lowercase();
        if value.trim().is_empty() {
            self.remove(&name);
            return;
        }
        match self.declarations.iter_mut().find(|(key, _)| *key == name) {
            Some(entry) => entry.1 = value.trim().to_string(),
            None => self.declarations.push((name, value.trim().to_string())),
        }
    }

    pub fn remove(&mut self, name: &str) {
        self.declarations
            .retain(|(key, _)| !key.eq_ignore_ascii_case(name));
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    pub fn to_css(&self) -> String {
        self.declarations
            .iter()
            .map(|(name, value)| format!("{name}: {value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Writes the declarations back, dropping the attribute once empty.
    pub fn write_to(&self, node: &NodeRef) {
        if self.is_empty() {
            html::remove_attr(node, "style");
        } else {
            html::set_attr(node, "style", &self.to_css());
        }
    }
}

fn split_declarations(raw: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    for ch in raw.chars() {
        if let Some(q) = quote {
            if ch == q {
                quote = None;
            }
            current.push(ch);
            continue;
        }
        match ch {
            '"' | '\'' => {
                quote = Some(ch);
                current.push(ch);
            }
            '(' => {
                depth += 1;
                current.push(ch);
            }
            ')' => {
                depth = (depth - 1).max(0);
                current.push(ch);
            }
            ';' if depth == 0 => {
                if !current.trim().is_empty() {
                    out.push(current.trim().to_string());
                }
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    if !current.trim().is_empty() {
        out.push(current.trim().to_string());
    }
    out
}
