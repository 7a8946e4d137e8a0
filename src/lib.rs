mod aggregate;
mod config;
mod control;
mod debug;
mod doc_context;
mod enhance;
mod error;
mod highlight;
mod html;
mod messaging;
mod metrics;
mod report;
mod rules;
mod scan;
mod selector;
mod style;
#[cfg(test)]
mod test_pages;
mod types;

pub use a11y_report_contract::{
    RULE_CATALOG_V1, ReportAck, ReportIssue, ReportPayload, RuleDef, Severity,
    contract_fingerprint_sha256, rule_catalog_v1_hash_sha256, rule_catalog_v1_json,
};
pub use aggregate::{Aggregate, IssueGroup, MAX_SCORE, aggregate, score};
pub use config::{DEFAULT_HIGHLIGHT_DELAY_MS, DEFAULT_REPORT_TIMEOUT_MS, TrackerConfig};
pub use control::{ControlSurface, OperatorNotice, ScanView, UNREACHABLE_NOTICE};
pub use debug::DebugLogger;
pub use doc_context::DocContext;
pub use enhance::{
    DEFAULT_STUB_ALT, EnhancePalette, EnhanceSummary, EnhancementEngine, StyleSnapshot,
};
pub use error::{Result, RuleError, TrackerError, TransportError};
pub use highlight::{DEFAULT_HIGHLIGHT_DELAY, Highlighter, OVERLAY_ID, StaticViewport, Viewport};
pub use html::Document;
pub use messaging::{Channel, InProcessChannel, Request, Response};
pub use metrics::{RuleMetrics, ScanMetrics};
pub use report::{DEFAULT_REPORT_TIMEOUT, HttpReportSink, ReportSink};
pub use rules::{Finding, PristineAttributes, Rule, RuleContext, RuleSet, VAGUE_LINK_TEXT};
pub use scan::{ScanEngine, SeveritySummary};
pub use selector::{query, resolve};
pub use style::{InlineStyle, ResolvedColors, StyleResolver};
pub use types::{Rect, Rgba};

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

/// Configured entry point. Hands out engines and page contexts that share one
/// rule selection, palette, and debug trace.
pub struct AccessibilityTracker {
    disabled_rules: Vec<String>,
    highlight_delay: Duration,
    palette: EnhancePalette,
    report_endpoint: Option<String>,
    report_timeout: Duration,
    debug: Option<DebugLogger>,
}

#[derive(Clone)]
pub struct TrackerBuilder {
    disabled_rules: Vec<String>,
    highlight_delay: Duration,
    palette: EnhancePalette,
    report_endpoint: Option<String>,
    report_timeout: Duration,
    debug_path: Option<PathBuf>,
}

/// Result of a one-shot scan: raw findings, their grouping, and timing.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub findings: Vec<Finding>,
    pub aggregate: Aggregate,
    pub summary: SeveritySummary,
    pub metrics: ScanMetrics,
}

impl AccessibilityTracker {
    pub fn builder() -> TrackerBuilder {
        TrackerBuilder::new()
    }

    pub fn rule_set(&self) -> RuleSet {
        self.disabled_rules
            .iter()
            .fold(RuleSet::standard(), |set, key| set.without(key))
    }

    pub fn scan_engine(&self) -> ScanEngine {
        ScanEngine::new(self.rule_set()).with_debug(self.debug.clone())
    }

    pub fn enhancement_engine(&self) -> EnhancementEngine {
        EnhancementEngine::new(self.palette.clone()).with_debug(self.debug.clone())
    }

    pub fn highlighter(&self) -> Highlighter {
        Highlighter::new(self.highlight_delay)
    }

    pub fn scan(&self, doc: &Document) -> ScanOutcome {
        Self::outcome(self.scan_engine().scan_with_metrics(doc))
    }

    /// Scans `doc` while `enhancement`'s fixes are applied. Findings describe
    /// the markup as authored.
    pub fn scan_enhanced(&self, doc: &Document, enhancement: &EnhancementEngine) -> ScanOutcome {
        Self::outcome(
            self.scan_engine()
                .scan_pristine(doc, enhancement.snapshot()),
        )
    }

    fn outcome((findings, metrics): (Vec<Finding>, ScanMetrics)) -> ScanOutcome {
        let aggregate = aggregate::aggregate(&findings);
        let summary = SeveritySummary::from_findings(&findings);
        tracing::info!(
            findings = findings.len(),
            groups = aggregate.groups.len(),
            score = aggregate.score,
            "scan complete"
        );
        ScanOutcome {
            findings,
            aggregate,
            summary,
            metrics,
        }
    }

    /// Applies presentation fixes. The returned engine holds the saved
    /// values; call `revert` on it to undo them.
    pub fn enhance(&self, doc: &Document) -> (EnhancementEngine, EnhanceSummary) {
        let mut engine = self.enhancement_engine();
        let summary = engine.apply(doc);
        (engine, summary)
    }

    /// Wraps `doc` in a page context wired with this tracker's engines.
    pub fn open(&self, doc: Document) -> Rc<RefCell<DocContext>> {
        self.open_with_viewport(doc, Box::new(StaticViewport::new()))
    }

    pub fn open_with_viewport(
        &self,
        doc: Document,
        viewport: Box<dyn Viewport>,
    ) -> Rc<RefCell<DocContext>> {
        let context = DocContext::new(doc)
            .with_scanner(self.scan_engine())
            .with_highlighter(self.highlighter())
            .with_enhancer(self.enhancement_engine())
            .with_viewport(viewport);
        Rc::new(RefCell::new(context))
    }

    /// `None` when no collector endpoint is configured.
    pub fn report_sink(&self) -> Result<Option<HttpReportSink>> {
        match &self.report_endpoint {
            Some(endpoint) => Ok(Some(HttpReportSink::new(endpoint, self.report_timeout)?)),
            None => Ok(None),
        }
    }

    pub fn emit_debug_summary(&self, context: &str) {
        if let Some(logger) = &self.debug {
            logger.emit_summary(context);
            logger.flush();
        }
    }
}

impl TrackerBuilder {
    pub fn new() -> Self {
        Self {
            disabled_rules: Vec::new(),
            highlight_delay: DEFAULT_HIGHLIGHT_DELAY,
            palette: EnhancePalette::default(),
            report_endpoint: None,
            report_timeout: DEFAULT_REPORT_TIMEOUT,
            debug_path: None,
        }
    }

    pub fn from_config(config: &TrackerConfig) -> Self {
        let mut builder = Self::new()
            .highlight_delay(Duration::from_millis(config.highlight_delay_ms))
            .report_timeout(Duration::from_millis(config.report_timeout_ms))
            .stub_alt(config.stub_alt_text.clone());
        if let Some(endpoint) = &config.report_endpoint {
            builder = builder.report_endpoint(endpoint.clone());
        }
        if let Some(path) = &config.debug_log {
            builder = builder.debug_log(path.clone());
        }
        for key in &config.disabled_rules {
            builder = builder.disable_rule(key.clone());
        }
        builder
    }

    /// Skips a rule by catalog key or reported rule id.
    pub fn disable_rule(mut self, key: impl Into<String>) -> Self {
        self.disabled_rules.push(key.into());
        self
    }

    pub fn highlight_delay(mut self, delay: Duration) -> Self {
        self.highlight_delay = delay;
        self
    }

    pub fn palette(mut self, palette: EnhancePalette) -> Self {
        self.palette = palette;
        self
    }

    pub fn stub_alt(mut self, alt: Option<String>) -> Self {
        self.palette.stub_alt = alt;
        self
    }

    pub fn report_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.report_endpoint = Some(endpoint.into());
        self
    }

    pub fn report_timeout(mut self, timeout: Duration) -> Self {
        self.report_timeout = timeout;
        self
    }

    pub fn debug_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<AccessibilityTracker> {
        for key in &self.disabled_rules {
            let known = RULE_CATALOG_V1
                .iter()
                .any(|def| def.key == key.as_str() || def.rule == key.as_str());
            if !known {
                return Err(TrackerError::InvalidConfiguration(format!(
                    "unknown rule `{key}`"
                )));
            }
        }
        if self.report_timeout.is_zero() {
            return Err(TrackerError::InvalidConfiguration(
                "report_timeout_ms must be > 0".to_string(),
            ));
        }
        if let Some(stub) = &self.palette.stub_alt {
            if stub.trim().is_empty() {
                return Err(TrackerError::InvalidConfiguration(
                    "stub_alt_text must not be blank".to_string(),
                ));
            }
        }
        let debug = match self.debug_path {
            Some(path) => Some(DebugLogger::new(path)?),
            None => None,
        };
        Ok(AccessibilityTracker {
            disabled_rules: self.disabled_rules,
            highlight_delay: self.highlight_delay,
            palette: self.palette,
            report_endpoint: self.report_endpoint,
            report_timeout: self.report_timeout,
            debug,
        })
    }
}

impl Default for TrackerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_rules_are_not_run() {
        let tracker = AccessibilityTracker::builder()
            .disable_rule("html-lang")
            .disable_rule("WCAG 2.4.1")
            .build()
            .expect("tracker");
        let outcome = tracker.scan(&Document::parse("<h1>x</h1>"));
        assert!(outcome.findings.is_empty());
        assert_eq!(outcome.aggregate.score, 10);
        assert_eq!(outcome.metrics.rules.len(), 9);
    }

    #[test]
    fn unknown_rule_is_rejected() {
        let err = AccessibilityTracker::builder()
            .disable_rule("no-such-rule")
            .build()
            .err()
            .expect("invalid");
        assert!(matches!(err, TrackerError::InvalidConfiguration(_)));
    }

    #[test]
    fn config_flows_into_engines() {
        let config = TrackerConfig::from_toml_str(
            r#"
            highlight_delay_ms = 500
            stub_alt_text = "Decorative image"
            report_endpoint = "http://127.0.0.1:9"
            "#,
        )
        .expect("config");
        let tracker = TrackerBuilder::from_config(&config).build().expect("tracker");
        assert_eq!(tracker.highlighter().delay(), Duration::from_millis(500));
        let sink = tracker.report_sink().expect("sink").expect("configured");
        assert_eq!(sink.url(), "http://127.0.0.1:9/api/report");

        let doc = Document::parse("<img src=a.png>");
        let (_engine, summary) = tracker.enhance(&doc);
        assert_eq!(summary.alt_stubbed, 1);
    }

    #[test]
    fn enhance_hands_back_an_engine_that_reverts() {
        let tracker = AccessibilityTracker::builder()
            .stub_alt(Some(DEFAULT_STUB_ALT.to_string()))
            .build()
            .expect("tracker");
        let doc = Document::parse(
            "<html lang=en><head><title>t</title></head><body><h1>h</h1>\
             <p style='color: red'>x</p><img src=a.png></body></html>",
        );
        let before_html = doc.to_html();
        let before = tracker.scan(&doc);
        assert_eq!(before.aggregate.groups.len(), 1);

        let (mut engine, summary) = tracker.enhance(&doc);
        assert_eq!(summary.alt_stubbed, 1);
        let during = tracker.scan_enhanced(&doc, &engine);
        assert_eq!(during.aggregate, before.aggregate);

        assert_eq!(engine.revert(), 3);
        assert_eq!(doc.to_html(), before_html);
    }

    #[test]
    fn debug_trace_is_written_and_summarized() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("trace.jsonl");
        let tracker = AccessibilityTracker::builder()
            .debug_log(&path)
            .build()
            .expect("tracker");
        tracker.scan(&Document::parse("<p>x</p>"));
        tracker.emit_debug_summary("test");
        let text = std::fs::read_to_string(&path).expect("trace");
        let last = text.lines().last().expect("summary line");
        let summary: serde_json::Value = serde_json::from_str(last).expect("json");
        assert_eq!(summary["type"], "debug.summary");
        assert_eq!(summary["counts"]["scan.passes"], 1);
    }

    #[test]
    fn page_context_round_trip_through_control_surface() {
        let tracker = AccessibilityTracker::builder().build().expect("tracker");
        let context = tracker.open(Document::parse("<img src=a.png><p>x</p>"));
        let mut surface = ControlSurface::new(InProcessChannel::connect(&context));
        let view = surface.scan().expect("scan");
        assert_eq!(view.score, 6);
        surface.enhance().expect("enhance");
        surface.revert().expect("revert");
    }
}
