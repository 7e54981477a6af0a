//! Pagination Estimator: predicts how many physical pages a rendered document needs.
//!
//! The estimate drives the live preview (how many page containers to render) and is
//! recomputed by the export slicer from the same measurement, so both always agree.
//!
//! # Rules
//! - `page_count = max(1, ceil(total_height_px / pixels_per_page))`
//! - An empty document, or a measurement element that is not mounted yet, is one page.
//! - Preview recomputation is debounced: a burst of edits produces one estimate once the
//!   document has been quiet for the debounce window.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};
use tracing::debug;

use crate::export::error::ExportError;
use crate::export::geometry::PageGeometry;

/// Quiet period before the preview estimate is recomputed.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

// ────────────────────────────────────────────────────────────────────────────
// Estimate
// ────────────────────────────────────────────────────────────────────────────

/// Number of physical pages a document occupies. Always at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageEstimate(u32);

impl PageEstimate {
    pub const MIN: PageEstimate = PageEstimate(1);

    pub fn get(self) -> u32 {
        self.0
    }
}

impl Default for PageEstimate {
    fn default() -> Self {
        Self::MIN
    }
}

/// Computes `max(1, ceil(total_height_px / pixels_per_page))`.
pub fn estimate_pages(
    total_height_px: u32,
    pixels_per_page: u32,
) -> Result<PageEstimate, ExportError> {
    if pixels_per_page == 0 {
        return Err(ExportError::InvalidGeometry(
            "pixels_per_page must be greater than zero".to_string(),
        ));
    }
    Ok(PageEstimate(total_height_px.div_ceil(pixels_per_page).max(1)))
}

/// Estimates from an optional measurement. `None` means the offscreen measurement
/// element has not been laid out yet, which is treated as a single page.
pub fn estimate_from_measurement(height_px: Option<u32>, geometry: &PageGeometry) -> PageEstimate {
    height_px
        .and_then(|height| estimate_pages(height, geometry.pixels_per_page).ok())
        .unwrap_or_default()
}

// ────────────────────────────────────────────────────────────────────────────
// Debounced preview paginator
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct PendingMeasurement {
    height_px: Option<u32>,
    changed_at: Instant,
}

/// Debounce state machine for the live preview.
///
/// Callers report every content mutation with [`record_change`](Self::record_change)
/// and call [`poll`](Self::poll) when [`deadline`](Self::deadline) passes. There is no
/// background worker; time is supplied by the caller.
#[derive(Debug, Clone)]
pub struct PreviewPaginator {
    pixels_per_page: u32,
    debounce: Duration,
    pending: Option<PendingMeasurement>,
    current: PageEstimate,
}

impl PreviewPaginator {
    pub fn new(geometry: &PageGeometry, debounce: Duration) -> Self {
        Self {
            pixels_per_page: geometry.pixels_per_page,
            debounce,
            pending: None,
            current: PageEstimate::MIN,
        }
    }

    /// The last published estimate.
    pub fn current(&self) -> PageEstimate {
        self.current
    }

    /// Records a content mutation. Restarts the debounce window.
    pub fn record_change(&mut self, height_px: Option<u32>, now: Instant) {
        self.pending = Some(PendingMeasurement {
            height_px,
            changed_at: now,
        });
    }

    /// When the pending measurement becomes eligible for recomputation, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.map(|pending| pending.changed_at + self.debounce)
    }

    /// Recomputes the estimate if the debounce window has elapsed.
    ///
    /// Returns the recomputed estimate, or `None` when nothing was due.
    pub fn poll(&mut self, now: Instant) -> Option<PageEstimate> {
        let pending = self.pending?;
        if now < pending.changed_at + self.debounce {
            return None;
        }
        self.pending = None;
        self.current = pending
            .height_px
            .and_then(|height| estimate_pages(height, self.pixels_per_page).ok())
            .unwrap_or_default();
        Some(self.current)
    }
}

/// Drives a [`PreviewPaginator`] from a stream of measurements.
///
/// Each received value is the current offscreen height (`None` while unmounted).
/// Estimates are published on `estimates` only when they change. When the sender side
/// closes, any pending measurement is flushed after its debounce window and the loop
/// returns.
pub async fn run_preview_paginator(
    mut changes: mpsc::Receiver<Option<u32>>,
    estimates: watch::Sender<PageEstimate>,
    mut paginator: PreviewPaginator,
) {
    let publish = |estimate: PageEstimate| {
        estimates.send_if_modified(|current| {
            if *current == estimate {
                false
            } else {
                debug!("Preview page estimate changed: {} → {}", current.get(), estimate.get());
                *current = estimate;
                true
            }
        });
    };

    loop {
        let deadline = paginator.deadline();
        tokio::select! {
            change = changes.recv() => match change {
                Some(height_px) => paginator.record_change(height_px, Instant::now()),
                None => {
                    if let Some(deadline) = paginator.deadline() {
                        sleep_until(deadline).await;
                        if let Some(estimate) = paginator.poll(Instant::now()) {
                            publish(estimate);
                        }
                    }
                    break;
                }
            },
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                if let Some(estimate) = paginator.poll(Instant::now()) {
                    publish(estimate);
                }
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
