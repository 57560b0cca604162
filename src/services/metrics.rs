use chrono::Utc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use tracing::info;

use super::orchestrator::CycleReport;

/// Process-lifetime counters
pub struct Metrics {
    pub cycles_completed: AtomicU64,
    pub cycles_failed: AtomicU64,
    pub orders_submitted: AtomicU64,
    pub orders_failed: AtomicU64,
    pub gains_updated: AtomicU64,
    last_cycle_at: AtomicI64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            cycles_completed: AtomicU64::new(0),
            cycles_failed: AtomicU64::new(0),
            orders_submitted: AtomicU64::new(0),
            orders_failed: AtomicU64::new(0),
            gains_updated: AtomicU64::new(0),
            last_cycle_at: AtomicI64::new(0),
        }
    }

    pub fn record_cycle(&self, report: &CycleReport) {
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
        self.orders_submitted
            .fetch_add(u64::from(report.decisions.orders_submitted()), Ordering::Relaxed);
        self.orders_failed
            .fetch_add(u64::from(report.decisions.order_failures), Ordering::Relaxed);
        if let Some(gains) = report.gains {
            self.gains_updated
                .fetch_add(u64::from(gains.updated), Ordering::Relaxed);
        }
        self.last_cycle_at.store(Utc::now().timestamp(), Ordering::Relaxed);
    }

    pub fn record_failed_cycle(&self) {
        self.cycles_failed.fetch_add(1, Ordering::Relaxed);
        self.last_cycle_at.store(Utc::now().timestamp(), Ordering::Relaxed);
    }

    pub fn last_cycle_at(&self) -> Option<i64> {
        match self.last_cycle_at.load(Ordering::Relaxed) {
            0 => None,
            ts => Some(ts),
        }
    }

    /// Get current metrics as a one-line summary
    pub fn summary(&self) -> String {
        format!(
            "cycles ok={} failed={} | orders {}/{} failed | gains updated={}",
            self.cycles_completed.load(Ordering::Relaxed),
            self.cycles_failed.load(Ordering::Relaxed),
            self.orders_failed.load(Ordering::Relaxed),
            self.orders_submitted.load(Ordering::Relaxed),
            self.gains_updated.load(Ordering::Relaxed),
        )
    }

    /// Log periodic status
    pub fn log_status(&self) {
        info!("Status: {}", self.summary());
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
