//! Prometheus-compatible metrics for the Warden server.
//!
//! Tracks request counts plus queue and governance activity.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Metrics registry shared across handlers.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    /// Total HTTP requests served.
    pub http_requests_total: AtomicU64,
    /// Total HTTP errors (4xx + 5xx).
    pub http_errors_total: AtomicU64,
    /// Total jobs enqueued through the API.
    pub jobs_enqueued_total: AtomicU64,
    /// Total jobs cancelled through the API.
    pub jobs_cancelled_total: AtomicU64,
    /// Total requests refused because the broker was unreachable.
    pub queue_unavailable_total: AtomicU64,
    /// Server start time for uptime calculation.
    pub started_at: Instant,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                http_requests_total: AtomicU64::new(0),
                http_errors_total: AtomicU64::new(0),
                jobs_enqueued_total: AtomicU64::new(0),
                jobs_cancelled_total: AtomicU64::new(0),
                queue_unavailable_total: AtomicU64::new(0),
                started_at: Instant::now(),
            }),
        }
    }

    pub fn inc_http_requests(&self) {
        self.inner
            .http_requests_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_http_errors(&self) {
        self.inner.http_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_jobs_enqueued(&self) {
        self.inner
            .jobs_enqueued_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_jobs_cancelled(&self) {
        self.inner
            .jobs_cancelled_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_queue_unavailable(&self) {
        self.inner
            .queue_unavailable_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.inner.started_at.elapsed().as_secs()
    }

    /// Render in Prometheus text exposition format. Cache and queue gauges
    /// are passed in by the handler so the registry stays a plain counter
    /// set.
    pub fn render_prometheus(
        &self,
        cache_hits: u64,
        cache_misses: u64,
        queue_depth: Option<usize>,
    ) -> String {
        let m = &self.inner;
        let mut out = format!(
            r#"# HELP warden_uptime_seconds Time since the server started.
# TYPE warden_uptime_seconds gauge
warden_uptime_seconds {}

# HELP warden_http_requests_total Total HTTP requests served.
# TYPE warden_http_requests_total counter
warden_http_requests_total {}

# HELP warden_http_errors_total Total HTTP errors (4xx/5xx).
# TYPE warden_http_errors_total counter
warden_http_errors_total {}

# HELP warden_jobs_enqueued_total Total jobs enqueued through the API.
# TYPE warden_jobs_enqueued_total counter
warden_jobs_enqueued_total {}

# HELP warden_jobs_cancelled_total Total jobs cancelled through the API.
# TYPE warden_jobs_cancelled_total counter
warden_jobs_cancelled_total {}

# HELP warden_queue_unavailable_total Requests refused because the broker was unreachable.
# TYPE warden_queue_unavailable_total counter
warden_queue_unavailable_total {}

# HELP warden_governance_cache_hits_total Governance decision cache hits.
# TYPE warden_governance_cache_hits_total counter
warden_governance_cache_hits_total {}

# HELP warden_governance_cache_misses_total Governance decision cache misses.
# TYPE warden_governance_cache_misses_total counter
warden_governance_cache_misses_total {}
"#,
            self.uptime_secs(),
            m.http_requests_total.load(Ordering::Relaxed),
            m.http_errors_total.load(Ordering::Relaxed),
            m.jobs_enqueued_total.load(Ordering::Relaxed),
            m.jobs_cancelled_total.load(Ordering::Relaxed),
            m.queue_unavailable_total.load(Ordering::Relaxed),
            cache_hits,
            cache_misses,
        );
        if let Some(depth) = queue_depth {
            out.push_str(&format!(
                "\n# HELP warden_queue_depth Jobs currently queued.\n# TYPE warden_queue_depth gauge\nwarden_queue_depth {depth}\n"
            ));
        }
        out
    }
}
