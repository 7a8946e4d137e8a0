use crate::enhance::{EnhanceSummary, EnhancementEngine};
use crate::highlight::{Highlighter, StaticViewport, Viewport};
use crate::html::Document;
use crate::messaging::{Request, Response};
use crate::scan::{ScanEngine, SeveritySummary};
use std::time::Instant;

/// Page-side state: the tree plus everything that reads or edits it. Lives as
/// long as the page does; the snapshot table dies with it.
pub struct DocContext {
    document: Document,
    scanner: ScanEngine,
    highlighter: Highlighter,
    enhancer: EnhancementEngine,
    viewport: Box<dyn Viewport>,
    last_enhance: Option<EnhanceSummary>,
}

impl DocContext {
    pub fn new(document: Document) -> Self {
        Self {
            document,
            scanner: ScanEngine::default(),
            highlighter: Highlighter::default(),
            enhancer: EnhancementEngine::default(),
            viewport: Box::new(StaticViewport::new()),
            last_enhance: None,
        }
    }

    pub fn with_scanner(mut self, scanner: ScanEngine) -> Self {
        self.scanner = scanner;
        self
    }

    pub fn with_highlighter(mut self, highlighter: Highlighter) -> Self {
        self.highlighter = highlighter;
        self
    }

    pub fn with_enhancer(mut self, enhancer: EnhancementEngine) -> Self {
        self.enhancer = enhancer;
        self
    }

    pub fn with_viewport(mut self, viewport: Box<dyn Viewport>) -> Self {
        self.viewport = viewport;
        self
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn enhancer(&self) -> &EnhancementEngine {
        &self.enhancer
    }

    pub fn last_enhance(&self) -> Option<EnhanceSummary> {
        self.last_enhance
    }

    pub fn highlight_active(&self) -> bool {
        self.highlighter.is_active()
    }

    pub fn handle(&mut self, request: Request) -> Response {
        self.handle_at(request, Instant::now())
    }

    pub fn handle_at(&mut self, request: Request, now: Instant) -> Response {
        tracing::debug!(action = request.action(), "handling request");
        self.highlighter.expire(now);
        match request {
            Request::ScanAccessibility => {
                let (issues, _) = self
                    .scanner
                    .scan_pristine(&self.document, self.enhancer.snapshot());
                let summary = SeveritySummary::from_findings(&issues);
                Response::Scan { issues, summary }
            }
            Request::HighlightIssue { selector } => {
                let shown = self.highlighter.highlight(
                    &self.document,
                    &selector,
                    self.viewport.as_mut(),
                    now,
                );
                if !shown {
                    tracing::info!(selector = %selector, "nothing to highlight");
                }
                Response::Ack
            }
            Request::EnhanceAccessibility => {
                self.last_enhance = Some(self.enhancer.apply(&self.document));
                Response::Ack
            }
            Request::RevertAccessibility => {
                self.enhancer.revert();
                self.last_enhance = None;
                Response::Ack
            }
        }
    }

    /// Lets the host advance the overlay timer between requests.
    pub fn tick(&mut self, now: Instant) -> bool {
        self.highlighter.expire(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enhance::{DEFAULT_STUB_ALT, EnhancePalette};
    use crate::highlight::{DEFAULT_HIGHLIGHT_DELAY, OVERLAY_ID};

    #[test]
    fn enhance_and_revert_round_trip_through_requests() {
        let mut context = DocContext::new(Document::parse("<p id=p>x</p><img src=a.png>"));
        let before = context.document().to_html();
        assert_eq!(context.handle(Request::EnhanceAccessibility), Response::Ack);
        assert_eq!(
            context.last_enhance().map(|summary| summary.images_outlined),
            Some(1)
        );
        assert_ne!(before, context.document().to_html());
        assert_eq!(context.handle(Request::RevertAccessibility), Response::Ack);
        assert!(context.last_enhance().is_none());
        assert_eq!(before, context.document().to_html());
    }

    #[test]
    fn enhancement_does_not_change_scan_results() {
        let enhancer = EnhancementEngine::new(EnhancePalette {
            stub_alt: Some(DEFAULT_STUB_ALT.to_string()),
            ..EnhancePalette::default()
        });
        let mut context = DocContext::new(Document::parse(
            "<html lang=en><head><title>t</title></head><body><h1>h</h1><img src=a.png></body></html>",
        ))
        .with_enhancer(enhancer);
        let before = context.handle(Request::ScanAccessibility);
        context.handle(Request::EnhanceAccessibility);
        assert_eq!(context.last_enhance().map(|summary| summary.alt_stubbed), Some(1));
        assert_eq!(context.handle(Request::ScanAccessibility), before);
        let Response::Scan { issues, .. } = before else {
            panic!("scan response");
        };
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn highlight_miss_still_acks() {
        let mut context = DocContext::new(Document::parse("<p id=p>x</p>"));
        let response = context.handle(Request::HighlightIssue {
            selector: "#nope".to_string(),
        });
        assert_eq!(response, Response::Ack);
        assert!(!context.highlight_active());
    }

    #[test]
    fn overlay_clears_on_tick() {
        let mut context = DocContext::new(Document::parse("<p id=p>x</p>"));
        let start = Instant::now();
        context.handle_at(
            Request::HighlightIssue {
                selector: "#p".to_string(),
            },
            start,
        );
        assert!(context.highlight_active());
        assert!(context.document().select_first(&format!("#{OVERLAY_ID}")).is_some());
        assert!(context.tick(start + DEFAULT_HIGHLIGHT_DELAY));
        assert!(context.document().select_first(&format!("#{OVERLAY_ID}")).is_none());
    }
}
