//! Request/response contract between a control surface and the document
//! context that owns the tree. One call carries one request and yields exactly
//! one response or a transport failure.

use crate::doc_context::DocContext;
use crate::error::TransportError;
use crate::rules::Finding;
use crate::scan::SeveritySummary;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Request {
    ScanAccessibility,
    HighlightIssue { selector: String },
    EnhanceAccessibility,
    RevertAccessibility,
}

impl Request {
    pub fn action(&self) -> &'static str {
        match self {
            Request::ScanAccessibility => "scanAccessibility",
            Request::HighlightIssue { .. } => "highlightIssue",
            Request::EnhanceAccessibility => "enhanceAccessibility",
            Request::RevertAccessibility => "revertAccessibility",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Response {
    Scan {
        issues: Vec<Finding>,
        summary: SeveritySummary,
    },
    /// Side-effect actions carry no payload.
    Ack,
}

pub trait Channel {
    fn call(&self, request: &Request) -> Result<Response, TransportError>;
}

/// Same-thread channel to a [`DocContext`]. Messages cross the boundary as
/// JSON, so only what serializes reaches the other side. The channel does not
/// keep the context alive.
#[derive(Clone)]
pub struct InProcessChannel {
    target: Weak<RefCell<DocContext>>,
}

impl InProcessChannel {
    pub fn connect(context: &Rc<RefCell<DocContext>>) -> Self {
        Self {
            target: Rc::downgrade(context),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.target.strong_count() > 0
    }
}

impl Channel for InProcessChannel {
    fn call(&self, request: &Request) -> Result<Response, TransportError> {
        let context = self.target.upgrade().ok_or(TransportError::Unreachable)?;
        let wire = serde_json::to_string(request)
            .map_err(|err| TransportError::Malformed(err.to_string()))?;
        let request: Request = serde_json::from_str(&wire)
            .map_err(|err| TransportError::Malformed(err.to_string()))?;

        let response = {
            let mut context = context
                .try_borrow_mut()
                .map_err(|_| TransportError::Busy)?;
            context.handle(request)
        };

        let wire = serde_json::to_string(&response)
            .map_err(|err| TransportError::Malformed(err.to_string()))?;
        serde_json::from_str(&wire).map_err(|err| TransportError::Malformed(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html::Document;
    use serde_json::json;

    #[test]
    fn requests_use_action_tags() {
        let value = serde_json::to_value(Request::HighlightIssue {
            selector: "#a".to_string(),
        })
        .expect("json");
        assert_eq!(value, json!({ "action": "highlightIssue", "selector": "#a" }));
        let parsed: Request =
            serde_json::from_value(json!({ "action": "scanAccessibility" })).expect("parse");
        assert_eq!(parsed, Request::ScanAccessibility);
        assert_eq!(parsed.action(), "scanAccessibility");
    }

    #[test]
    fn scan_response_carries_findings_on_the_wire() {
        let context = Rc::new(RefCell::new(DocContext::new(Document::parse("<img>"))));
        let channel = InProcessChannel::connect(&context);
        let response = channel.call(&Request::ScanAccessibility).expect("response");
        let Response::Scan { issues, summary } = response else {
            panic!("expected scan response");
        };
        assert_eq!(issues[0].rule_id, "WCAG 1.1.1");
        assert_eq!(summary.total(), issues.len());

        let value = serde_json::to_value(&issues[0]).expect("json");
        assert_eq!(value["rule"], "WCAG 1.1.1");
        assert_eq!(value["selector"], "html > body > img");
    }

    #[test]
    fn dropped_context_is_unreachable() {
        let context = Rc::new(RefCell::new(DocContext::new(Document::parse("<p>x</p>"))));
        let channel = InProcessChannel::connect(&context);
        assert!(channel.is_connected());
        drop(context);
        assert!(!channel.is_connected());
        assert_eq!(
            channel.call(&Request::EnhanceAccessibility),
            Err(TransportError::Unreachable)
        );
    }

    #[test]
    fn borrowed_context_is_busy() {
        let context = Rc::new(RefCell::new(DocContext::new(Document::parse("<p>x</p>"))));
        let channel = InProcessChannel::connect(&context);
        let _held = context.borrow();
        assert_eq!(
            channel.call(&Request::RevertAccessibility),
            Err(TransportError::Busy)
        );
    }
}
