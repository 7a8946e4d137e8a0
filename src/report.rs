use crate::error::{Result, TrackerError};
use a11y_report_contract::{REPORT_PATH, ReportAck, ReportPayload};
use std::time::Duration;

pub const DEFAULT_REPORT_TIMEOUT: Duration = Duration::from_secs(10);

/// Where finished reports go. One submission per call; callers decide what to
/// tell the operator on failure.
pub trait ReportSink {
    fn submit(&self, payload: &ReportPayload) -> Result<ReportAck>;
}

/// Posts reports as JSON to `{endpoint}/api/report`.
pub struct HttpReportSink {
    url: String,
    client: reqwest::blocking::Client,
}

impl HttpReportSink {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let endpoint = endpoint.trim().trim_end_matches('/');
        if endpoint.is_empty() {
            return Err(TrackerError::InvalidConfiguration(
                "report endpoint is empty".to_string(),
            ));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| TrackerError::ReportDelivery(err.to_string()))?;
        Ok(Self {
            url: format!("{endpoint}{REPORT_PATH}"),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl ReportSink for HttpReportSink {
    fn submit(&self, payload: &ReportPayload) -> Result<ReportAck> {
        let response = self
            .client
            .post(&self.url)
            .json(payload)
            .send()
            .map_err(|err| TrackerError::ReportDelivery(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            tracing::warn!(url = %self.url, status = status.as_u16(), "report rejected");
            return Err(TrackerError::ReportRejected {
                status: status.as_u16(),
            });
        }
        let ack: ReportAck = response
            .json()
            .map_err(|err| TrackerError::ReportDelivery(err.to_string()))?;
        tracing::info!(url = %self.url, message = %ack.message, "report delivered");
        Ok(ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn payload() -> ReportPayload {
        ReportPayload {
            scanned_url: "https://example.test/".to_string(),
            scanned_at: "2024-05-01T12:30:00.000Z".to_string(),
            accessibility_score: 10,
            total_issue_types: 0,
            issues: Vec::new(),
        }
    }

    // The blocking client must be built and dropped off the async runtime.
    async fn submit_to(server: &MockServer) -> Result<ReportAck> {
        let endpoint = format!("{}/", server.uri());
        tokio::task::spawn_blocking(move || {
            let sink = HttpReportSink::new(&endpoint, Duration::from_secs(5))?;
            assert!(sink.url().ends_with("/api/report"));
            sink.submit(&payload())
        })
        .await
        .expect("submit task")
    }

    #[tokio::test]
    async fn server_error_is_rejected_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/report"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let err = submit_to(&server).await.expect_err("500");
        assert!(matches!(err, TrackerError::ReportRejected { status: 500 }));
        server.verify().await;
    }

    #[tokio::test]
    async fn success_returns_collector_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/report"))
            .and(body_json(json!({
                "scannedUrl": "https://example.test/",
                "scannedAt": "2024-05-01T12:30:00.000Z",
                "accessibilityScore": 10,
                "totalIssueTypes": 0,
                "issues": [],
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "message": "Report received" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let ack = submit_to(&server).await.expect("ack");
        assert_eq!(ack.message, "Report received");
    }

    #[test]
    fn empty_endpoint_is_a_config_error() {
        assert!(matches!(
            HttpReportSink::new("  ", DEFAULT_REPORT_TIMEOUT),
            Err(TrackerError::InvalidConfiguration(_))
        ));
    }
}
