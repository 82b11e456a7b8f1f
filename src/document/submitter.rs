use serde::Deserialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::analytics::stats::SubmissionStats;
use crate::config::Config;
use crate::document::model::Document;
use crate::error::{AppError, Result};
use crate::http::pool::create_http_client;
use crate::http::rate_limiter::{RateLimiter, RatePermit};
use crate::http::transport::{
    HttpResponse, HttpTransport, OutboundRequest, ReqwestTransport, TransportError,
};
use crate::utils::time::{elapsed_ms, now_instant};

const CONTENT_TYPE: &str = "Content-Type";
const APPLICATION_JSON: &str = "application/json";
const SIGNATURE: &str = "Signature";
const STATUS_OK: u16 = 200;

/// What happens to a submission's permit once the request is finished.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PermitRelease {
    /// Return the permit to the pool as soon as the submission completes.
    #[default]
    OnCompletion,
    /// Keep it consumed until the next window reset, capping submissions
    /// (not just concurrent ones) at the window capacity.
    AtWindowReset,
}

/// Successful submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionResult {
    pub status: u16,
    pub body: String,
}

pub struct DocumentSubmitter {
    transport: Arc<dyn HttpTransport>,
    limiter: Arc<RateLimiter>,
    endpoint: Url,
    permit_release: PermitRelease,
    stats: Arc<SubmissionStats>,
}

impl DocumentSubmitter {
    pub fn new(transport: Arc<dyn HttpTransport>, limiter: Arc<RateLimiter>, endpoint: Url) -> Self {
        Self {
            transport,
            limiter,
            endpoint,
            permit_release: PermitRelease::default(),
            stats: Arc::new(SubmissionStats::new()),
        }
    }

    /// Reqwest transport and a fresh limiter, both sized from `config`.
    /// Must be called inside a Tokio runtime.
    pub fn from_config(config: &Config) -> Result<Self> {
        let endpoint = config.endpoint()?;
        let client = create_http_client(config.connect_timeout(), config.request_timeout())?;
        let limiter = RateLimiter::new(config.request_limit, config.window())?;

        Ok(Self::new(Arc::new(ReqwestTransport::new(client)), Arc::new(limiter), endpoint)
            .with_permit_release(config.permit_release))
    }

    pub fn with_permit_release(mut self, permit_release: PermitRelease) -> Self {
        self.permit_release = permit_release;
        self
    }

    pub fn with_stats(mut self, stats: Arc<SubmissionStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn stats(&self) -> &Arc<SubmissionStats> {
        &self.stats
    }

    /// Submits `document` signed with `signature`, waiting for a rate-limit
    /// permit first. The permit is accounted for on every exit path.
    #[instrument(skip_all, fields(doc_id = %document.doc_id))]
    pub async fn submit(&self, document: &Document, signature: &str) -> Result<SubmissionResult> {
        let start = now_instant();
        let permit = self.limiter.acquire().await?;
        let outcome = self.send(document, signature).await;
        self.finish(permit, start, outcome)
    }

    /// As [`submit`](Self::submit), abandoned when `cancel` fires. A cancelled
    /// permit wait fails with [`AppError::Cancelled`]; a cancelled request
    /// fails as a transport fault.
    #[instrument(skip_all, fields(doc_id = %document.doc_id))]
    pub async fn submit_with_cancel(
        &self,
        document: &Document,
        signature: &str,
        cancel: &CancellationToken,
    ) -> Result<SubmissionResult> {
        let start = now_instant();
        let permit = self.limiter.acquire_with_cancel(cancel).await?;
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AppError::TransportFailure(TransportError::Cancelled)),
            outcome = self.send(document, signature) => outcome,
        };
        self.finish(permit, start, outcome)
    }

    async fn send(&self, document: &Document, signature: &str) -> Result<SubmissionResult> {
        let body = serde_json::to_string(document)?;

        let request = OutboundRequest::post(self.endpoint.clone())
            .header(CONTENT_TYPE, APPLICATION_JSON)
            .header(SIGNATURE, signature)
            .body(body);

        debug!(url = %self.endpoint, "Posting document");
        let HttpResponse { status, body } = self.transport.send(request).await?;

        if status != STATUS_OK {
            return Err(AppError::RemoteRejected { status, body });
        }

        Ok(SubmissionResult { status, body })
    }

    fn finish(
        &self,
        permit: RatePermit<'_>,
        start: std::time::Instant,
        outcome: Result<SubmissionResult>,
    ) -> Result<SubmissionResult> {
        match self.permit_release {
            PermitRelease::OnCompletion => drop(permit),
            PermitRelease::AtWindowReset => permit.forget(),
        }

        let latency = elapsed_ms(start);
        self.stats.inc_submitted();
        self.stats.update_latency(latency);

        match &outcome {
            Ok(_) => {
                self.stats.inc_accepted();
                info!(latency_ms = latency, "Document accepted");
            }
            Err(AppError::RemoteRejected { status, body }) => {
                self.stats.inc_rejected();
                warn!(status, body = %body, latency_ms = latency, "Document rejected");
            }
            Err(AppError::TransportFailure(e)) => {
                self.stats.inc_transport_failures();
                warn!(error = %e, latency_ms = latency, "Document transport failed");
            }
            Err(e) => {
                self.stats.inc_other_failures();
                warn!(error = %e, "Document submission failed");
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::model::fixtures::document;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    enum Reply {
        Status(u16, &'static str),
        ConnectError,
        Hang,
    }

    struct FakeTransport {
        reply: Reply,
        requests: Mutex<Vec<OutboundRequest>>,
    }

    impl FakeTransport {
        fn new(reply: Reply) -> Arc<Self> {
            Arc::new(Self {
                reply,
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl HttpTransport for FakeTransport {
        async fn send(&self, request: OutboundRequest) -> std::result::Result<HttpResponse, TransportError> {
            self.requests.lock().push(request);
            match self.reply {
                Reply::Status(status, body) => Ok(HttpResponse {
                    status,
                    body: body.to_string(),
                }),
                Reply::ConnectError => Err(TransportError::Connect("connection refused".into())),
                Reply::Hang => std::future::pending().await,
            }
        }
    }

    fn endpoint() -> Url {
        Url::parse("https://ismp.test/api/v3/lk/documents/create").unwrap()
    }

    fn submitter(transport: Arc<FakeTransport>, capacity: usize) -> DocumentSubmitter {
        let limiter = RateLimiter::new(capacity, Duration::from_secs(1)).unwrap();
        DocumentSubmitter::new(transport, Arc::new(limiter), endpoint())
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_success_returns_permit() {
        let transport = FakeTransport::new(Reply::Status(200, "{\"ok\":true}"));
        let submitter = submitter(transport.clone(), 3);

        let result = submitter.submit(&document("doc-1"), "sig-1").await.unwrap();

        assert_eq!(result.status, 200);
        assert_eq!(result.body, "{\"ok\":true}");
        assert_eq!(submitter.limiter().available_permits(), 3);
        assert_eq!(submitter.stats().accepted.load(Ordering::Relaxed), 1);

        let requests = transport.requests.lock();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.url, endpoint());
        assert_eq!(request.header_value("Content-Type"), Some("application/json"));
        assert_eq!(request.header_value("Signature"), Some("sig-1"));

        let sent: Document = serde_json::from_str(&request.body).unwrap();
        assert_eq!(sent, document("doc-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_non_200_is_rejected() {
        let transport = FakeTransport::new(Reply::Status(500, "error"));
        let submitter = submitter(transport, 3);

        let err = submitter.submit(&document("doc-2"), "sig").await.unwrap_err();

        match err {
            AppError::RemoteRejected { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "error");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(submitter.limiter().available_permits(), 3);
        assert_eq!(submitter.stats().rejected.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_success_codes_are_rejected() {
        let transport = FakeTransport::new(Reply::Status(201, "created"));
        let submitter = submitter(transport, 1);

        let err = submitter.submit(&document("doc-3"), "sig").await.unwrap_err();
        assert!(matches!(err, AppError::RemoteRejected { status: 201, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_fault_releases_permit() {
        let transport = FakeTransport::new(Reply::ConnectError);
        let submitter = submitter(transport, 2);

        let err = submitter.submit(&document("doc-4"), "sig").await.unwrap_err();

        assert!(matches!(err, AppError::TransportFailure(TransportError::Connect(_))));
        assert_eq!(submitter.limiter().available_permits(), 2);
        assert_eq!(submitter.stats().transport_failures.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_reset_policy_holds_permit() {
        let transport = FakeTransport::new(Reply::Status(200, ""));
        let submitter = submitter(transport, 2).with_permit_release(PermitRelease::AtWindowReset);

        submitter.submit(&document("a"), "sig").await.unwrap();
        submitter.submit(&document("b"), "sig").await.unwrap();
        assert_eq!(submitter.limiter().available_permits(), 0);

        let start = tokio::time::Instant::now();
        submitter.submit(&document("c"), "sig").await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(900));
        assert_eq!(submitter.stats().submitted.load(Ordering::Relaxed), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_in_flight_request() {
        let transport = FakeTransport::new(Reply::Hang);
        let submitter = submitter(transport, 1);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let err = submitter
            .submit_with_cancel(&document("doc-5"), "sig", &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::TransportFailure(TransportError::Cancelled)));
        assert_eq!(submitter.limiter().available_permits(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_waiting_for_permit() {
        let transport = FakeTransport::new(Reply::Status(200, ""));
        let submitter = submitter(transport.clone(), 1).with_permit_release(PermitRelease::AtWindowReset);
        submitter.submit(&document("first"), "sig").await.unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = submitter
            .submit_with_cancel(&document("second"), "sig", &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Cancelled(_)));
        assert_eq!(transport.requests.lock().len(), 1);
        assert_eq!(submitter.stats().submitted.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_submissions_share_limiter() {
        let transport = FakeTransport::new(Reply::Status(200, ""));
        let submitter = Arc::new(
            submitter(transport.clone(), 3).with_permit_release(PermitRelease::AtWindowReset),
        );
        let start = tokio::time::Instant::now();

        let mut handles = Vec::new();
        for i in 0..7 {
            let submitter = submitter.clone();
            handles.push(tokio::spawn(async move {
                submitter.submit(&document(&format!("doc-{i}")), "sig").await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(transport.requests.lock().len(), 7);
        // 3 + 3 + 1 across three windows.
        assert!(start.elapsed() >= Duration::from_secs(2));
    }
}
