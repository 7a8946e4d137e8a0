use crate::html::{self, Document};
use crate::selector;
use crate::style::InlineStyle;
use crate::types::Rect;
use kuchiki::NodeRef;
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub const OVERLAY_ID: &str = "__accessibility_highlight__";
pub const DEFAULT_HIGHLIGHT_DELAY: Duration = Duration::from_millis(3000);
const OVERLAY_PADDING: f32 = 6.0;

/// Host geometry. The tree itself has no layout, so the embedding host answers
/// for box positions and scrolling.
pub trait Viewport {
    fn bounding_client_rect(&self, node: &NodeRef) -> Option<Rect>;

    /// Smooth-scrolls `node` to the vertical center of the viewport.
    fn scroll_into_view(&mut self, node: &NodeRef);
}

/// Geometry table keyed by locator. Unknown nodes report an empty box at the
/// origin.
#[derive(Debug, Default)]
pub struct StaticViewport {
    boxes: HashMap<String, Rect>,
    scrolled: Vec<String>,
}

impl StaticViewport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_box(mut self, locator: impl Into<String>, rect: Rect) -> Self {
        self.boxes.insert(locator.into(), rect);
        self
    }

    /// Locators scrolled to, oldest first.
    pub fn scrolled(&self) -> &[String] {
        &self.scrolled
    }
}

impl Viewport for StaticViewport {
    fn bounding_client_rect(&self, node: &NodeRef) -> Option<Rect> {
        let locator = selector::resolve(node);
        Some(self.boxes.get(&locator).copied().unwrap_or_default())
    }

    fn scroll_into_view(&mut self, node: &NodeRef) {
        self.scrolled.push(selector::resolve(node));
    }
}

struct ActiveOverlay {
    overlay: NodeRef,
    expires_at: Instant,
}

/// Draws at most one overlay at a time over a located node. The host drives
/// the clock through [`Highlighter::expire`].
pub struct Highlighter {
    delay: Duration,
    active: Option<ActiveOverlay>,
}

impl Highlighter {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            active: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Returns false when the locator resolves to nothing or the node has no
    /// box; neither case is an error.
    pub fn highlight(
        &mut self,
        doc: &Document,
        locator: &str,
        viewport: &mut dyn Viewport,
        now: Instant,
    ) -> bool {
        let Some(target) = selector::query(doc, locator) else {
            tracing::debug!(locator, "highlight target not found");
            return false;
        };
        self.clear();
        remove_stale_overlays(doc);

        viewport.scroll_into_view(&target);
        let Some(rect) = viewport.bounding_client_rect(&target) else {
            tracing::warn!(locator, "highlight target has no box");
            return false;
        };
        let Some(host) = doc.body().or_else(|| doc.root_element()) else {
            tracing::warn!(locator, "document has no element to host the overlay");
            return false;
        };
        let Some(overlay) = build_overlay(rect.inflate(OVERLAY_PADDING)) else {
            tracing::warn!(locator, "could not build highlight overlay");
            return false;
        };
        host.append(overlay.clone());
        self.active = Some(ActiveOverlay {
            overlay,
            expires_at: now + self.delay,
        });
        true
    }

    /// Removes the overlay once its delay has elapsed. Returns true when an
    /// overlay was removed.
    pub fn expire(&mut self, now: Instant) -> bool {
        match &self.active {
            Some(active) if now >= active.expires_at => self.clear(),
            _ => false,
        }
    }

    pub fn clear(&mut self) -> bool {
        match self.active.take() {
            Some(active) => {
                active.overlay.detach();
                true
            }
            None => false,
        }
    }
}

impl Default for Highlighter {
    fn default() -> Self {
        Self::new(DEFAULT_HIGHLIGHT_DELAY)
    }
}

fn remove_stale_overlays(doc: &Document) {
    for stale in doc.select_all(&format!("#{OVERLAY_ID}")) {
        stale.detach();
    }
}

fn build_overlay(rect: Rect) -> Option<NodeRef> {
    let overlay = html::detached_element("div")?;
    html::set_attr(&overlay, "id", OVERLAY_ID);
    let mut style = InlineStyle::default();
    style.set("position", "fixed");
    style.set("top", &px(rect.y));
    style.set("left", &px(rect.x));
    style.set("width", &px(rect.width));
    style.set("height", &px(rect.height));
    style.set("border", "3px solid red");
    style.set("border-radius", "8px");
    style.set("z-index", "999999");
    style.set("pointer-events", "none");
    style.set("box-shadow", "0 0 0 9999px rgba(0,0,0,0.25)");
    style.write_to(&overlay);
    Some(overlay)
}

fn px(value: f32) -> String {
    format!("{value}px")
}
