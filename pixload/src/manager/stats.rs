//! Manager counters.

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Lock-free counters updated by the manager and its pipelines.
#[derive(Debug, Default)]
pub struct ManagerStats {
    requests: AtomicU64,
    cache_hits: AtomicU64,
    coalesced: AtomicU64,
    pipelines_started: AtomicU64,
    pipelines_succeeded: AtomicU64,
    pipelines_failed: AtomicU64,
    pipelines_cancelled: AtomicU64,
    data_cache_hits: AtomicU64,
    disk_hits: AtomicU64,
    fetch_retries: AtomicU64,
    bytes_fetched: AtomicU64,
}

/// Point-in-time copy of [`ManagerStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ManagerStatsSnapshot {
    pub requests: u64,
    pub cache_hits: u64,
    pub coalesced: u64,
    pub pipelines_started: u64,
    pub pipelines_succeeded: u64,
    pub pipelines_failed: u64,
    pub pipelines_cancelled: u64,
    pub data_cache_hits: u64,
    pub disk_hits: u64,
    pub fetch_retries: u64,
    pub bytes_fetched: u64,
}

impl ManagerStatsSnapshot {
    /// Fraction of requests served from the memory cache.
    pub fn cache_hit_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.requests as f64
        }
    }

    /// Pipelines neither finished nor cancelled.
    pub fn pipelines_in_flight(&self) -> u64 {
        self.pipelines_started
            .saturating_sub(self.pipelines_succeeded + self.pipelines_failed + self.pipelines_cancelled)
    }
}

macro_rules! counter {
    ($($name:ident => $field:ident),* $(,)?) => {
        $(
            pub(crate) fn $name(&self) {
                self.$field.fetch_add(1, Ordering::Relaxed);
            }
        )*
    };
}

impl ManagerStats {
    pub fn new() -> Self {
        Self::default()
    }

    counter! {
        record_request => requests,
        record_cache_hit => cache_hits,
        record_coalesced => coalesced,
        record_pipeline_started => pipelines_started,
        record_pipeline_succeeded => pipelines_succeeded,
        record_pipeline_failed => pipelines_failed,
        record_pipeline_cancelled => pipelines_cancelled,
        record_data_cache_hit => data_cache_hits,
        record_disk_hit => disk_hits,
        record_fetch_retry => fetch_retries,
    }

    pub(crate) fn record_bytes_fetched(&self, bytes: u64) {
        self.bytes_fetched.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ManagerStatsSnapshot {
        ManagerStatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            pipelines_started: self.pipelines_started.load(Ordering::Relaxed),
            pipelines_succeeded: self.pipelines_succeeded.load(Ordering::Relaxed),
            pipelines_failed: self.pipelines_failed.load(Ordering::Relaxed),
            pipelines_cancelled: self.pipelines_cancelled.load(Ordering::Relaxed),
            data_cache_hits: self.data_cache_hits.load(Ordering::Relaxed),
            disk_hits: self.disk_hits.load(Ordering::Relaxed),
            fetch_retries: self.fetch_retries.load(Ordering::Relaxed),
            bytes_fetched: self.bytes_fetched.load(Ordering::Relaxed),
        }
    }

    /// Emits one structured `info!` line with the current counters.
    pub fn log_stats(&self) {
        let s = self.snapshot();
        info!(
            requests = s.requests,
            cache_hits = s.cache_hits,
            hit_rate = %format!("{:.1}%", s.cache_hit_rate() * 100.0),
            coalesced = s.coalesced,
            started = s.pipelines_started,
            succeeded = s.pipelines_succeeded,
            failed = s.pipelines_failed,
            cancelled = s.pipelines_cancelled,
            data_cache_hits = s.data_cache_hits,
            disk_hits = s.disk_hits,
            retries = s.fetch_retries,
            bytes_fetched = s.bytes_fetched,
            "Image manager stats"
        );
    }
}
