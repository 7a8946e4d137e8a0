use crate::rules::Finding;
use a11y_report_contract::{ReportIssue, ReportPayload, Severity};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const MAX_SCORE: u8 = 10;

/// Findings folded by `(rule_id, message)`. Severity and locator come from the
/// first member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueGroup {
    #[serde(rename = "rule")]
    pub rule_id: String,
    pub message: String,
    pub severity: Severity,
    #[serde(rename = "selector")]
    pub locator: String,
    #[serde(rename = "occurrences")]
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregate {
    pub groups: Vec<IssueGroup>,
    pub score: u8,
}

/// Groups in first-seen order.
pub fn aggregate(findings: &[Finding]) -> Aggregate {
    let mut groups: Vec<IssueGroup> = Vec::new();
    let mut index: HashMap<(&str, &str), usize> = HashMap::new();
    for finding in findings {
        let key = (finding.rule_id.as_str(), finding.message.as_str());
        if let Some(&slot) = index.get(&key) {
            groups[slot].count += 1;
            continue;
        }
        index.insert(key, groups.len());
        groups.push(IssueGroup {
            rule_id: finding.rule_id.clone(),
            message: finding.message.clone(),
            severity: finding.severity,
            locator: finding.locator.clone(),
            count: 1,
        });
    }
    let score = score(groups.len());
    Aggregate { groups, score }
}

/// `max(10 - groups, 0)`.
pub fn score(group_count: usize) -> u8 {
    let penalty = group_count.min(MAX_SCORE as usize) as u8;
    MAX_SCORE - penalty
}

impl Aggregate {
    pub fn total_occurrences(&self) -> usize {
        self.groups.iter().map(|group| group.count).sum()
    }

    /// Report body for the collector, stamped with `scanned_at`.
    pub fn to_report(&self, scanned_url: &str, scanned_at: DateTime<Utc>) -> ReportPayload {
        ReportPayload {
            scanned_url: scanned_url.to_string(),
            scanned_at: scanned_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            accessibility_score: self.score,
            total_issue_types: self.groups.len(),
            issues: self
                .groups
                .iter()
                .map(|group| ReportIssue {
                    rule: group.rule_id.clone(),
                    message: group.message.clone(),
                    severity: group.severity,
                    occurrences: group.count,
                    selector: group.locator.clone(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html::Document;
    use crate::scan::ScanEngine;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn finding(rule: &str, message: &str, locator: &str) -> Finding {
        Finding::new(rule, message, Severity::Medium, locator)
    }

    #[test]
    fn identical_missing_alt_images_fold_into_one_group() {
        let doc = Document::parse(
            "<html lang=en><head><title>t</title></head><body><h1>h</h1>\
             <img src=1><img src=2><img src=3></body></html>",
        );
        let findings = ScanEngine::default().scan(&doc);
        assert_eq!(findings.len(), 3);
        let result = aggregate(&findings);
        assert_eq!(result.groups.len(), 1);
        assert_eq!(result.groups[0].count, 3);
        assert_eq!(result.groups[0].severity, Severity::High);
        assert_eq!(result.score, 9);
    }

    #[test]
    fn missing_lang_and_title_score_eight() {
        let doc = Document::parse("<html><head></head><body><h1>h</h1></body></html>");
        let result = aggregate(&ScanEngine::default().scan(&doc));
        let locators: Vec<&str> = result.groups.iter().map(|g| g.locator.as_str()).collect();
        assert_eq!(locators, vec!["html", "title"]);
        assert_eq!(result.score, 8);
    }

    #[test]
    fn groups_keep_first_seen_order_and_locator() {
        let findings = vec![
            finding("B", "b", "#b1"),
            finding("A", "a", "#a1"),
            finding("B", "b", "#b2"),
            finding("A", "other", "#a2"),
        ];
        let result = aggregate(&findings);
        let keys: Vec<(&str, &str, &str, usize)> = result
            .groups
            .iter()
            .map(|g| (g.rule_id.as_str(), g.message.as_str(), g.locator.as_str(), g.count))
            .collect();
        assert_eq!(
            keys,
            vec![("B", "b", "#b1", 2), ("A", "a", "#a1", 1), ("A", "other", "#a2", 1)]
        );
        assert_eq!(result.total_occurrences(), 4);
        assert_eq!(aggregate(&findings), result);
    }

    #[test]
    fn score_is_bounded_and_non_increasing() {
        assert_eq!(aggregate(&[]).score, 10);
        assert_eq!(score(0), 10);
        assert_eq!(score(3), 7);
        assert_eq!(score(10), 0);
        assert_eq!(score(25), 0);
        for n in 0..20 {
            assert!(score(n + 1) <= score(n));
        }
    }

    #[test]
    fn report_payload_uses_collector_field_names() {
        let result = aggregate(&[finding("WCAG 2.4.4", "Link text is not descriptive", "#more")]);
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).single().expect("time");
        let payload = result.to_report("https://example.test/", at);
        let value = serde_json::to_value(&payload).expect("json");
        assert_eq!(value["scannedUrl"], "https://example.test/");
        assert_eq!(value["scannedAt"], "2024-05-01T12:30:00.000Z");
        assert_eq!(value["accessibilityScore"], 9);
        assert_eq!(value["totalIssueTypes"], 1);
        assert_eq!(value["issues"][0]["occurrences"], 1);
        assert_eq!(value["issues"][0]["selector"], "#more");
        assert_eq!(value["issues"][0]["severity"], "Medium");
    }

    const RULES: [&str; 4] = ["WCAG 1.1.1", "WCAG 2.4.4", "WCAG 3.1.1", "WCAG 4.1.1"];
    const MESSAGES: [&str; 3] = ["first", "second", "third"];

    proptest! {
        #[test]
        fn regrouping_is_idempotent(
            picks in prop::collection::vec((0usize..4, 0usize..3, 0usize..5), 0..40),
        ) {
            let findings: Vec<Finding> = picks
                .iter()
                .map(|&(rule, message, node)| finding(RULES[rule], MESSAGES[message], &format!("#n{node}")))
                .collect();
            let once = aggregate(&findings);
            let expanded: Vec<Finding> = once
                .groups
                .iter()
                .flat_map(|group| {
                    std::iter::repeat_n(
                        Finding::new(
                            group.rule_id.clone(),
                            group.message.clone(),
                            group.severity,
                            group.locator.clone(),
                        ),
                        group.count,
                    )
                })
                .collect();
            prop_assert_eq!(once.total_occurrences(), findings.len());
            prop_assert_eq!(once.score, score(once.groups.len()));
            prop_assert_eq!(&aggregate(&findings), &once);
            prop_assert_eq!(aggregate(&expanded), once);
        }
    }
}
