//! Per map view draw counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters updated by producers, the timer task and the render
/// thread.
#[derive(Debug, Default)]
pub struct DrawMetrics {
    requested: AtomicU64,
    coalesced: AtomicU64,
    fired: AtomicU64,
    rendered: AtomicU64,
    cancelled: AtomicU64,
    failed: AtomicU64,
}

impl DrawMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn draw_requested(&self) {
        self.requested.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn draw_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn draw_fired(&self) {
        self.fired.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn draw_rendered(&self) {
        self.rendered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn draw_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn draw_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> DrawMetricsSnapshot {
        DrawMetricsSnapshot {
            requested: self.requested.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            fired: self.fired.load(Ordering::Relaxed),
            rendered: self.rendered.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Copy of [`DrawMetrics`] at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrawMetricsSnapshot {
    /// `schedule` calls accepted.
    pub requested: u64,
    /// Requests folded into an already pending draw.
    pub coalesced: u64,
    /// Debounce timers that fired and handed a draw to the renderer.
    pub fired: u64,
    /// Draws that reached a successful terminal status.
    pub rendered: u64,
    /// Draws stopped through cancellation.
    pub cancelled: u64,
    /// Draws that failed to start or ended with a failure status.
    pub failed: u64,
}

impl DrawMetricsSnapshot {
    /// Fraction of requests that did not cause their own draw.
    pub fn coalesce_ratio(&self) -> f64 {
        if self.requested == 0 {
            0.0
        } else {
            self.coalesced as f64 / self.requested as f64
        }
    }
}
