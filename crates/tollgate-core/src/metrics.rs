//! Access control counters.
//!
//! Collected by the gateway and exported in Prometheus text format.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::RwLock;

use crate::error::AuthError;

/// Counters for access decisions and credential operations.
pub struct AuthMetrics {
    started_at: Instant,

    requests_allowed: AtomicU64,
    requests_denied: AtomicU64,

    logins_succeeded: AtomicU64,
    logins_failed: AtomicU64,
    registrations: AtomicU64,
    tokens_issued: AtomicU64,

    failures_by_kind: RwLock<BTreeMap<&'static str, AtomicU64>>,
}

impl AuthMetrics {
    /// Create an empty set of counters.
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            requests_allowed: AtomicU64::new(0),
            requests_denied: AtomicU64::new(0),
            logins_succeeded: AtomicU64::new(0),
            logins_failed: AtomicU64::new(0),
            registrations: AtomicU64::new(0),
            tokens_issued: AtomicU64::new(0),
            failures_by_kind: RwLock::new(BTreeMap::new()),
        }
    }

    /// Record an admitted request.
    pub fn record_allowed(&self) {
        self.requests_allowed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a rejected request.
    pub fn record_denied(&self, err: &AuthError) {
        self.requests_denied.fetch_add(1, Ordering::Relaxed);
        self.record_failure(err);
    }

    /// Record a successful login.
    pub fn record_login(&self) {
        self.logins_succeeded.fetch_add(1, Ordering::Relaxed);
        self.tokens_issued.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed login.
    pub fn record_login_failure(&self, err: &AuthError) {
        self.logins_failed.fetch_add(1, Ordering::Relaxed);
        self.record_failure(err);
    }

    /// Record a completed registration.
    pub fn record_registration(&self) {
        self.registrations.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failure by kind.
    pub fn record_failure(&self, err: &AuthError) {
        let kind = err.kind();
        {
            let counters = self.failures_by_kind.read();
            if let Some(counter) = counters.get(kind) {
                counter.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        self.failures_by_kind
            .write()
            .entry(kind)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    // Getters

    /// Get uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Get admitted request count.
    pub fn requests_allowed(&self) -> u64 {
        self.requests_allowed.load(Ordering::Relaxed)
    }

    /// Get rejected request count.
    pub fn requests_denied(&self) -> u64 {
        self.requests_denied.load(Ordering::Relaxed)
    }

    /// Get successful login count.
    pub fn logins_succeeded(&self) -> u64 {
        self.logins_succeeded.load(Ordering::Relaxed)
    }

    /// Get failed login count.
    pub fn logins_failed(&self) -> u64 {
        self.logins_failed.load(Ordering::Relaxed)
    }

    /// Get registration count.
    pub fn registrations(&self) -> u64 {
        self.registrations.load(Ordering::Relaxed)
    }

    /// Get issued token count.
    pub fn tokens_issued(&self) -> u64 {
        self.tokens_issued.load(Ordering::Relaxed)
    }

    /// Get the failure count for an error kind.
    pub fn failures(&self, kind: &str) -> u64 {
        self.failures_by_kind
            .read()
            .get(kind)
            .map(|counter| counter.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Export metrics in Prometheus text format.
    pub fn to_prometheus(&self) -> String {
        let mut out = String::new();

        out.push_str("# HELP tollgate_uptime_seconds Gateway uptime in seconds\n");
        out.push_str("# TYPE tollgate_uptime_seconds gauge\n");
        out.push_str(&format!("tollgate_uptime_seconds {}\n\n", self.uptime_secs()));

        out.push_str("# HELP tollgate_requests_allowed_total Requests admitted by access control\n");
        out.push_str("# TYPE tollgate_requests_allowed_total counter\n");
        out.push_str(&format!(
            "tollgate_requests_allowed_total {}\n\n",
            self.requests_allowed()
        ));

        out.push_str("# HELP tollgate_requests_denied_total Requests rejected by access control\n");
        out.push_str("# TYPE tollgate_requests_denied_total counter\n");
        out.push_str(&format!(
            "tollgate_requests_denied_total {}\n\n",
            self.requests_denied()
        ));

        out.push_str("# HELP tollgate_logins_total Login attempts by outcome\n");
        out.push_str("# TYPE tollgate_logins_total counter\n");
        out.push_str(&format!(
            "tollgate_logins_total{{outcome=\"success\"}} {}\n",
            self.logins_succeeded()
        ));
        out.push_str(&format!(
            "tollgate_logins_total{{outcome=\"failure\"}} {}\n\n",
            self.logins_failed()
        ));

        out.push_str("# HELP tollgate_registrations_total Users registered\n");
        out.push_str("# TYPE tollgate_registrations_total counter\n");
        out.push_str(&format!(
            "tollgate_registrations_total {}\n\n",
            self.registrations()
        ));

        out.push_str("# HELP tollgate_tokens_issued_total Access tokens issued\n");
        out.push_str("# TYPE tollgate_tokens_issued_total counter\n");
        out.push_str(&format!(
            "tollgate_tokens_issued_total {}\n\n",
            self.tokens_issued()
        ));

        out.push_str("# HELP tollgate_failures_total Access control failures by kind\n");
        out.push_str("# TYPE tollgate_failures_total counter\n");
        for (kind, counter) in self.failures_by_kind.read().iter() {
            out.push_str(&format!(
                "tollgate_failures_total{{kind=\"{}\"}} {}\n",
                kind,
                counter.load(Ordering::Relaxed)
            ));
        }

        out
    }
}

impl Default for AuthMetrics {
    fn default() -> Self {
        Self::new()
    }
}
