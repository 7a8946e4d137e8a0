use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::OnceLock;

pub const CONTRACT_ID: &str = "a11y.report_contract";
pub const CONTRACT_VERSION: &str = "1";

pub const RULE_CATALOG_ID: &str = "a11y.rule_catalog.v1";

/// Path the reporting sink listens on, relative to its base endpoint.
pub const REPORT_PATH: &str = "/api/report";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::High => "High",
            Severity::Medium => "Medium",
            Severity::Low => "Low",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a rule's findings point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocatorKind {
    /// One finding per offending node, located through the selector resolver.
    PerNode,
    /// At most one finding per document, with a constant locator.
    Fixed(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleDef {
    pub key: &'static str,
    pub rule: &'static str,
    pub criterion: &'static str,
    pub message: &'static str,
    pub severity: Severity,
    pub locator: LocatorKind,
}

pub const RULE_CATALOG_V1: [RuleDef; 11] = [
    RuleDef { key: "img-alt", rule: "WCAG 1.1.1", criterion: "Non-text Content", message: "Image missing alt attribute", severity: Severity::High, locator: LocatorKind::PerNode },
    RuleDef { key: "img-decorative-role", rule: "WCAG 1.1.1", criterion: "Non-text Content", message: "Decorative image missing role='presentation'", severity: Severity::Low, locator: LocatorKind::PerNode },
    RuleDef { key: "button-name", rule: "WCAG 4.1.2", criterion: "Name, Role, Value", message: "Button missing accessible label", severity: Severity::High, locator: LocatorKind::PerNode },
    RuleDef { key: "form-label", rule: "WCAG 3.3.2", criterion: "Labels or Instructions", message: "Form input missing label", severity: Severity::Medium, locator: LocatorKind::PerNode },
    RuleDef { key: "link-purpose", rule: "WCAG 2.4.4", criterion: "Link Purpose (In Context)", message: "Link text is not descriptive", severity: Severity::Medium, locator: LocatorKind::PerNode },
    RuleDef { key: "keyboard-click", rule: "WCAG 2.1.1", criterion: "Keyboard", message: "Clickable element is not keyboard accessible", severity: Severity::Medium, locator: LocatorKind::PerNode },
    RuleDef { key: "html-lang", rule: "WCAG 1.3.1", criterion: "Info and Relationships", message: "Page is missing language attribute", severity: Severity::Medium, locator: LocatorKind::Fixed("html") },
    RuleDef { key: "document-title", rule: "WCAG 2.4.1", criterion: "Bypass Blocks", message: "Page title is missing or empty", severity: Severity::Medium, locator: LocatorKind::Fixed("title") },
    RuleDef { key: "duplicate-id", rule: "WCAG 4.1.1", criterion: "Parsing", message: "Duplicate ID found on page", severity: Severity::High, locator: LocatorKind::PerNode },
    RuleDef { key: "heading-structure", rule: "WCAG 2.4.6", criterion: "Headings and Labels", message: "Page has no heading structure", severity: Severity::Low, locator: LocatorKind::Fixed("body") },
    RuleDef { key: "color-contrast", rule: "WCAG 1.4.3", criterion: "Contrast (Minimum)", message: "Text may have insufficient color contrast", severity: Severity::Low, locator: LocatorKind::PerNode },
];

pub fn rule_def(key: &str) -> Option<&'static RuleDef> {
    RULE_CATALOG_V1.iter().find(|def| def.key == key)
}

/// One grouped issue as the reporting sink receives it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportIssue {
    pub rule: String,
    pub message: String,
    pub severity: Severity,
    pub occurrences: usize,
    pub selector: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPayload {
    pub scanned_url: String,
    /// ISO-8601 timestamp in UTC.
    pub scanned_at: String,
    pub accessibility_score: u8,
    pub total_issue_types: usize,
    pub issues: Vec<ReportIssue>,
}

/// Body of a successful (2xx) sink response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportAck {
    pub message: String,
}

static RULE_CATALOG_JSON: OnceLock<String> = OnceLock::new();
static RULE_CATALOG_HASH: OnceLock<String> = OnceLock::new();
static CONTRACT_FINGERPRINT: OnceLock<String> = OnceLock::new();

fn locator_value(kind: LocatorKind) -> Value {
    match kind {
        LocatorKind::PerNode => json!({ "kind": "per_node" }),
        LocatorKind::Fixed(locator) => json!({ "kind": "fixed", "locator": locator }),
    }
}

/// Canonical JSON rendering of the rule catalog. Key order is fixed so the
/// hash only moves when the catalog itself does.
pub fn rule_catalog_v1_json() -> &'static str {
    RULE_CATALOG_JSON.get_or_init(|| {
        let entries: Vec<Value> = RULE_CATALOG_V1
            .iter()
            .map(|def| {
                json!({
                    "key": def.key,
                    "rule": def.rule,
                    "criterion": def.criterion,
                    "message": def.message,
                    "severity": def.severity.as_str(),
                    "locator": locator_value(def.locator),
                })
            })
            .collect();
        let root = json!({
            "schema": RULE_CATALOG_ID,
            "entries": entries,
        });
        serde_json::to_string_pretty(&root).unwrap_or_default()
    })
}

fn hex_sha256(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        use std::fmt::Write;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

pub fn rule_catalog_v1_hash_sha256() -> String {
    RULE_CATALOG_HASH
        .get_or_init(|| hex_sha256(rule_catalog_v1_json().as_bytes()))
        .clone()
}

pub fn contract_fingerprint_sha256() -> String {
    CONTRACT_FINGERPRINT
        .get_or_init(|| {
            let mut hasher = Sha256::new();
            hasher.update(CONTRACT_ID.as_bytes());
            hasher.update(b"\n");
            hasher.update(CONTRACT_VERSION.as_bytes());
            hasher.update(b"\n");
            hasher.update(RULE_CATALOG_ID.as_bytes());
            hasher.update(b"\n");
            hasher.update(rule_catalog_v1_hash_sha256().as_bytes());
            let digest = hasher.finalize();
            let mut out = String::with_capacity(digest.len() * 2);
            for b in digest {
                use std::fmt::Write;
                let _ = write!(&mut out, "{:02x}", b);
            }
            out
        })
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_fingerprint_is_stable_and_nonempty() {
        let a = contract_fingerprint_sha256();
        let b = contract_fingerprint_sha256();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, rule_catalog_v1_hash_sha256());
    }

    #[test]
    fn catalog_keys_are_unique() {
        for (i, def) in RULE_CATALOG_V1.iter().enumerate() {
            assert!(
                RULE_CATALOG_V1[i + 1..].iter().all(|other| other.key != def.key),
                "duplicate key {}",
                def.key
            );
        }
        assert_eq!(rule_def("img-alt").map(|d| d.rule), Some("WCAG 1.1.1"));
        assert!(rule_def("unknown").is_none());
    }

    #[test]
    fn catalog_json_lists_every_rule_in_order() {
        let root: Value = serde_json::from_str(rule_catalog_v1_json()).expect("catalog json");
        assert_eq!(root["schema"], RULE_CATALOG_ID);
        let keys: Vec<&str> = root["entries"]
            .as_array()
            .expect("entries")
            .iter()
            .filter_map(|e| e["key"].as_str())
            .collect();
        let expected: Vec<&str> = RULE_CATALOG_V1.iter().map(|d| d.key).collect();
        assert_eq!(keys, expected);
        assert_eq!(root["entries"][6]["locator"]["locator"], "html");
    }

    #[test]
    fn payload_uses_camel_case_wire_names() {
        let payload = ReportPayload {
            scanned_url: "https://example.test/".to_string(),
            scanned_at: "2026-01-02T03:04:05.000Z".to_string(),
            accessibility_score: 9,
            total_issue_types: 1,
            issues: vec![ReportIssue {
                rule: "WCAG 1.1.1".to_string(),
                message: "Image missing alt attribute".to_string(),
                severity: Severity::High,
                occurrences: 3,
                selector: "html > body > img".to_string(),
            }],
        };
        let value = serde_json::to_value(&payload).expect("serialize");
        assert_eq!(value["scannedUrl"], "https://example.test/");
        assert_eq!(value["accessibilityScore"], 9);
        assert_eq!(value["totalIssueTypes"], 1);
        assert_eq!(value["issues"][0]["severity"], "High");
        assert_eq!(value["issues"][0]["occurrences"], 3);
    }
}
