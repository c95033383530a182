use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use dashmap::DashMap;
use serde::Serialize;

use crate::error::AppError;

/// Monotonic counters accumulated by the pipeline, reset only at process
/// start. Updates never block (atomics and sharded maps) and memory is
/// bounded by the number of API methods, not by call volume.
pub struct HealthMonitor {
    started_at: Instant,
    api_success: DashMap<String, u64>,
    api_failure: DashMap<String, u64>,
    network_errors: AtomicU64,
    parse_errors: AtomicU64,
    api_errors: AtomicU64,
    ip_restrictions: AtomicU64,
    internal_errors: AtomicU64,
    keyword_errors: AtomicU64,
    listings_discarded: AtomicU64,
    publish_ok: AtomicU64,
    publish_failed: AtomicU64,
}

impl HealthMonitor {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            api_success: DashMap::new(),
            api_failure: DashMap::new(),
            network_errors: AtomicU64::new(0),
            parse_errors: AtomicU64::new(0),
            api_errors: AtomicU64::new(0),
            ip_restrictions: AtomicU64::new(0),
            internal_errors: AtomicU64::new(0),
            keyword_errors: AtomicU64::new(0),
            listings_discarded: AtomicU64::new(0),
            publish_ok: AtomicU64::new(0),
            publish_failed: AtomicU64::new(0),
        }
    }

    pub fn record_api_call(&self, method: &str, success: bool) {
        let map = if success { &self.api_success } else { &self.api_failure };
        *map.entry(method.to_string()).or_insert(0) += 1;
    }

    /// Categorize a surfaced error. Cancellation is not a health event.
    pub fn record_failure(&self, err: &AppError) {
        match err {
            AppError::Http(_) => self.network_errors.fetch_add(1, Ordering::Relaxed),
            AppError::Json(_) | AppError::Unparseable(_) => {
                self.parse_errors.fetch_add(1, Ordering::Relaxed)
            }
            AppError::Api { .. } => self.api_errors.fetch_add(1, Ordering::Relaxed),
            AppError::Cancelled => return,
            _ => self.internal_errors.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn record_api_error(&self) {
        self.api_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ip_restriction(&self) {
        self.ip_restrictions.fetch_add(1, Ordering::Relaxed);
    }

    /// One keyword pass gave up on an error (the cycle itself continued).
    pub fn record_keyword_error(&self) {
        self.keyword_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// A single listing failed structural validation and was dropped.
    pub fn record_discarded_listing(&self) {
        self.listings_discarded.fetch_add(1, Ordering::Relaxed);
    }

    /// Publisher-side counter; the publisher lives outside this pipeline.
    pub fn record_publish(&self, success: bool) {
        let counter = if success { &self.publish_ok } else { &self.publish_failed };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Immutable snapshot for periodic logging.
    pub fn report(&self) -> HealthReport {
        HealthReport {
            uptime_secs: self.started_at.elapsed().as_secs(),
            api_success: map_snapshot(&self.api_success),
            api_failure: map_snapshot(&self.api_failure),
            network_errors: self.network_errors.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            api_errors: self.api_errors.load(Ordering::Relaxed),
            ip_restrictions: self.ip_restrictions.load(Ordering::Relaxed),
            internal_errors: self.internal_errors.load(Ordering::Relaxed),
            keyword_errors: self.keyword_errors.load(Ordering::Relaxed),
            listings_discarded: self.listings_discarded.load(Ordering::Relaxed),
            publish_ok: self.publish_ok.load(Ordering::Relaxed),
            publish_failed: self.publish_failed.load(Ordering::Relaxed),
        }
    }
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}

fn map_snapshot(map: &DashMap<String, u64>) -> BTreeMap<String, u64> {
    map.iter().map(|e| (e.key().clone(), *e.value())).collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub uptime_secs: u64,
    pub api_success: BTreeMap<String, u64>,
    pub api_failure: BTreeMap<String, u64>,
    pub network_errors: u64,
    pub parse_errors: u64,
    pub api_errors: u64,
    pub ip_restrictions: u64,
    pub internal_errors: u64,
    pub keyword_errors: u64,
    pub listings_discarded: u64,
    pub publish_ok: u64,
    pub publish_failed: u64,
}
