#[derive(Debug, Clone, Default)]
pub struct RuleMetrics {
    pub rule_id: String,
    pub findings: usize,
    pub elapsed_ms: f64,
    pub failed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ScanMetrics {
    pub rules: Vec<RuleMetrics>,
    pub total_ms: f64,
    pub total_findings: usize,
}

impl ScanMetrics {
    pub fn failed_rules(&self) -> impl Iterator<Item = &str> {
        self.rules
            .iter()
            .filter(|rule| rule.failed)
            .map(|rule| rule.rule_id.as_str())
    }
}
