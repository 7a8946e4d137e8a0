use crate::aggregate::{Aggregate, IssueGroup, aggregate};
use crate::error::TransportError;
use crate::messaging::{Channel, Request, Response};
use crate::report::ReportSink;
use crate::rules::Finding;
use crate::scan::SeveritySummary;
use a11y_report_contract::ReportAck;
use chrono::Utc;
use std::fmt;

pub const UNREACHABLE_NOTICE: &str = "Unable to reach the page. Reload the page and retry.";

/// What the operator is told when an action fails. Nothing is retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorNotice {
    Unreachable,
    ReportFailed(String),
}

impl OperatorNotice {
    pub fn message(&self) -> String {
        match self {
            OperatorNotice::Unreachable => UNREACHABLE_NOTICE.to_string(),
            OperatorNotice::ReportFailed(reason) => format!("Failed to send report: {reason}"),
        }
    }
}

impl fmt::Display for OperatorNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

impl std::error::Error for OperatorNotice {}

impl From<TransportError> for OperatorNotice {
    fn from(err: TransportError) -> Self {
        tracing::warn!(error = %err, "document context did not answer");
        OperatorNotice::Unreachable
    }
}

/// Everything a display needs from one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanView {
    pub findings: Vec<Finding>,
    pub groups: Vec<IssueGroup>,
    pub score: u8,
    pub summary: SeveritySummary,
}

impl ScanView {
    fn aggregate(&self) -> Aggregate {
        Aggregate {
            groups: self.groups.clone(),
            score: self.score,
        }
    }
}

/// Operator-side driver over a [`Channel`].
pub struct ControlSurface<C: Channel> {
    channel: C,
    last_scan: Option<ScanView>,
}

impl<C: Channel> ControlSurface<C> {
    pub fn new(channel: C) -> Self {
        Self {
            channel,
            last_scan: None,
        }
    }

    pub fn last_scan(&self) -> Option<&ScanView> {
        self.last_scan.as_ref()
    }

    pub fn scan(&mut self) -> Result<ScanView, OperatorNotice> {
        let response = self.channel.call(&Request::ScanAccessibility)?;
        let Response::Scan { issues, summary } = response else {
            return Err(TransportError::Malformed("expected scan results".to_string()).into());
        };
        let Aggregate { groups, score } = aggregate(&issues);
        let view = ScanView {
            findings: issues,
            groups,
            score,
            summary,
        };
        self.last_scan = Some(view.clone());
        Ok(view)
    }

    pub fn highlight(&self, locator: &str) -> Result<(), OperatorNotice> {
        self.expect_ack(&Request::HighlightIssue {
            selector: locator.to_string(),
        })
    }

    pub fn enhance(&self) -> Result<(), OperatorNotice> {
        self.expect_ack(&Request::EnhanceAccessibility)
    }

    pub fn revert(&self) -> Result<(), OperatorNotice> {
        self.expect_ack(&Request::RevertAccessibility)
    }

    /// Sends the latest scan, scanning first if there is none yet.
    pub fn send_report(
        &mut self,
        scanned_url: &str,
        sink: &dyn ReportSink,
    ) -> Result<ReportAck, OperatorNotice> {
        let view = match self.last_scan.clone() {
            Some(view) => view,
            None => self.scan()?,
        };
        let payload = view.aggregate().to_report(scanned_url, Utc::now());
        sink.submit(&payload).map_err(|err| {
            tracing::warn!(error = %err, "report not delivered");
            OperatorNotice::ReportFailed(err.to_string())
        })
    }

    fn expect_ack(&self, request: &Request) -> Result<(), OperatorNotice> {
        match self.channel.call(request)? {
            Response::Ack => Ok(()),
            Response::Scan { .. } => {
                Err(TransportError::Malformed("unexpected scan results".to_string()).into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc_context::DocContext;
    use crate::error::{Result, TrackerError};
    use crate::html::Document;
    use crate::messaging::InProcessChannel;
    use a11y_report_contract::ReportPayload;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    struct FailingSink {
        calls: Cell<usize>,
    }

    impl ReportSink for FailingSink {
        fn submit(&self, _payload: &ReportPayload) -> Result<ReportAck> {
            self.calls.set(self.calls.get() + 1);
            Err(TrackerError::ReportRejected { status: 500 })
        }
    }

    struct RecordingSink {
        seen: RefCell<Vec<ReportPayload>>,
    }

    impl ReportSink for RecordingSink {
        fn submit(&self, payload: &ReportPayload) -> Result<ReportAck> {
            self.seen.borrow_mut().push(payload.clone());
            Ok(ReportAck {
                message: "ok".to_string(),
            })
        }
    }

    fn surface(html: &str) -> (Rc<RefCell<DocContext>>, ControlSurface<InProcessChannel>) {
        let context = Rc::new(RefCell::new(DocContext::new(Document::parse(html))));
        let surface = ControlSurface::new(InProcessChannel::connect(&context));
        (context, surface)
    }

    #[test]
    fn scan_view_groups_and_scores() {
        let (_context, mut surface) = surface("<img><img><a href=#>more</a>");
        let view = surface.scan().expect("scan");
        // missing alt, vague link, lang, title, headings
        assert_eq!(view.groups.len(), 5);
        assert_eq!(view.score, 5);
        assert_eq!(view.findings.len(), 6);
        assert_eq!(view.summary.total(), 6);
        assert_eq!(surface.last_scan(), Some(&view));
    }

    #[test]
    fn lost_page_tells_the_operator_to_reload() {
        let (context, mut surface) = surface("<p>x</p>");
        drop(context);
        let notice = surface.scan().expect_err("unreachable");
        assert_eq!(notice, OperatorNotice::Unreachable);
        assert_eq!(notice.to_string(), UNREACHABLE_NOTICE);
        assert_eq!(surface.enhance(), Err(OperatorNotice::Unreachable));
        assert!(surface.last_scan().is_none());
    }

    #[test]
    fn failed_report_is_surfaced_once() {
        let (_context, mut surface) = surface("<p>x</p>");
        let sink = FailingSink {
            calls: Cell::new(0),
        };
        let notice = surface
            .send_report("https://example.test/", &sink)
            .expect_err("500");
        assert!(matches!(notice, OperatorNotice::ReportFailed(_)));
        assert!(notice.message().contains("500"));
        assert_eq!(sink.calls.get(), 1);
    }

    #[test]
    fn report_reflects_latest_scan() {
        let (_context, mut surface) = surface(
            "<html lang=en><head><title>t</title></head><body><h1>h</h1><img></body></html>",
        );
        let sink = RecordingSink {
            seen: RefCell::new(Vec::new()),
        };
        let ack = surface.send_report("https://example.test/", &sink).expect("ack");
        assert_eq!(ack.message, "ok");
        let seen = sink.seen.borrow();
        assert_eq!(seen[0].accessibility_score, 9);
        assert_eq!(seen[0].issues[0].occurrences, 1);
        assert!(seen[0].scanned_at.ends_with('Z'));
    }

    #[test]
    fn highlight_and_enhance_round_trip() {
        let (context, surface) = surface("<p id=p>x</p>");
        surface.highlight("#p").expect("highlight");
        surface.highlight("#missing").expect("miss is not an error");
        assert!(context.borrow().highlight_active());
        let before = context.borrow().document().to_html();
        surface.enhance().expect("enhance");
        surface.revert().expect("revert");
        assert_eq!(before, context.borrow().document().to_html());
    }
}
