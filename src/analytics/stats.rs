use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

#[derive(Debug, Default)]
pub struct SubmissionStats {
    pub submitted: AtomicU64,
    pub accepted: AtomicU64,
    pub rejected: AtomicU64,
    pub transport_failures: AtomicU64,
    pub other_failures: AtomicU64,

    // Last observed value only, gauge-style.
    pub last_latency_ms: AtomicU64,
}

impl SubmissionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_transport_failures(&self) {
        self.transport_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_other_failures(&self) {
        self.other_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn update_latency(&self, ms: u64) {
        self.last_latency_ms.store(ms, Ordering::Relaxed);
    }

    pub fn log_stats(&self) {
        info!(
            submitted = self.submitted.load(Ordering::Relaxed),
            accepted = self.accepted.load(Ordering::Relaxed),
            rejected = self.rejected.load(Ordering::Relaxed),
            transport_failures = self.transport_failures.load(Ordering::Relaxed),
            other_failures = self.other_failures.load(Ordering::Relaxed),
            last_latency_ms = self.last_latency_ms.load(Ordering::Relaxed),
            "Submission stats"
        );
    }
}
