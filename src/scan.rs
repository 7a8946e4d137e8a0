use crate::debug::DebugLogger;
use crate::html::Document;
use crate::metrics::{RuleMetrics, ScanMetrics};
use crate::rules::{Finding, PristineAttributes, Rule, RuleContext, RuleSet};
use a11y_report_contract::Severity;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;
use std::time::Instant;

/// Runs every registered rule once over a document and concatenates the
/// findings in registry order. A rule that errors or panics contributes
/// nothing; the rest of the pass is unaffected.
pub struct ScanEngine {
    rules: RuleSet,
    debug: Option<DebugLogger>,
}

impl ScanEngine {
    pub fn new(rules: RuleSet) -> Self {
        Self { rules, debug: None }
    }

    pub fn with_debug(mut self, debug: Option<DebugLogger>) -> Self {
        self.debug = debug;
        self
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn scan(&self, doc: &Document) -> Vec<Finding> {
        self.scan_with_metrics(doc).0
    }

    pub fn scan_with_metrics(&self, doc: &Document) -> (Vec<Finding>, ScanMetrics) {
        self.run(&RuleContext::new(doc))
    }

    /// Scans `doc` as authored, reading any attribute `pristine` has
    /// overwritten from its saved value instead of the tree.
    pub fn scan_pristine(
        &self,
        doc: &Document,
        pristine: &dyn PristineAttributes,
    ) -> (Vec<Finding>, ScanMetrics) {
        self.run(&RuleContext::with_pristine(doc, pristine))
    }

    fn run(&self, cx: &RuleContext<'_>) -> (Vec<Finding>, ScanMetrics) {
        let started = Instant::now();
        let mut findings = Vec::new();
        let mut metrics = ScanMetrics::default();

        for rule in self.rules.iter() {
            let rule_started = Instant::now();
            let outcome = run_isolated(rule, cx);
            let elapsed_ms = rule_started.elapsed().as_secs_f64() * 1000.0;
            let mut entry = RuleMetrics {
                rule_id: rule.key().to_string(),
                elapsed_ms,
                ..RuleMetrics::default()
            };
            match outcome {
                Ok(found) => {
                    entry.findings = found.len();
                    findings.extend(found);
                }
                Err(reason) => {
                    entry.failed = true;
                    tracing::warn!(rule = rule.key(), %reason, "rule failed; skipping");
                    if let Some(debug) = &self.debug {
                        debug.log_event(
                            "scan.rule_failed",
                            json!({ "rule": rule.key(), "reason": reason }),
                        );
                        debug.increment("scan.rule_failed", 1);
                    }
                }
            }
            if let Some(debug) = &self.debug {
                debug.log_event(
                    "scan.rule",
                    json!({
                        "rule": rule.key(),
                        "findings": entry.findings,
                        "ms": elapsed_ms,
                    }),
                );
            }
            metrics.rules.push(entry);
        }

        metrics.total_findings = findings.len();
        metrics.total_ms = started.elapsed().as_secs_f64() * 1000.0;
        tracing::debug!(
            rules = metrics.rules.len(),
            findings = metrics.total_findings,
            ms = metrics.total_ms,
            "scan finished"
        );
        if let Some(debug) = &self.debug {
            debug.increment("scan.passes", 1);
            debug.increment("scan.findings", metrics.total_findings as u64);
        }
        (findings, metrics)
    }
}

impl Default for ScanEngine {
    fn default() -> Self {
        Self::new(RuleSet::standard())
    }
}

thread_local! {
    static EVALUATING: Cell<bool> = const { Cell::new(false) };
}

static QUIET_RULE_PANICS: Once = Once::new();

// A rule panic is reported once, through `warn!`. Panics outside rule
// evaluation still reach the previously installed hook.
fn install_panic_filter() {
    QUIET_RULE_PANICS.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if !EVALUATING.with(Cell::get) {
                previous(info);
            }
        }));
    });
}

fn run_isolated(rule: &dyn Rule, cx: &RuleContext<'_>) -> Result<Vec<Finding>, String> {
    install_panic_filter();
    EVALUATING.with(|flag| flag.set(true));
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| rule.evaluate(cx)));
    EVALUATING.with(|flag| flag.set(false));
    match outcome {
        Ok(Ok(found)) => Ok(found),
        Ok(Err(err)) => Err(err.to_string()),
        Err(payload) => Err(panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "rule panicked".to_string()
    }
}

/// Per-severity counts over raw findings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeveritySummary {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl SeveritySummary {
    pub fn from_findings(findings: &[Finding]) -> Self {
        let mut summary = Self::default();
        for finding in findings {
            match finding.severity {
                Severity::High => summary.high += 1,
                Severity::Medium => summary.medium += 1,
                Severity::Low => summary.low += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.high + self.medium + self.low
    }
}
