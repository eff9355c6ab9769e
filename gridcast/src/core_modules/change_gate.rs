// THEORY:
// The `ChangeGate` decides, once per frame, whether the current grid is worth a
// write. It combines two filters:
//
// 1.  **Rate limit**: either wall-clock (`Interval`) or frame-count based
//     (`EveryNFrames`). Outside the eligible window nothing is compared.
// 2.  **Change detection**: inside the window, a grid identical to the last one
//     that actually reached the device is suppressed. The clock or counter
//     still advances, so a static scene costs nothing on the wire.
//
// The baseline is an owned copy taken only after a successful write. A failed
// write leaves it untouched, so the next eligible frame retries the same
// content. The gate knows nothing about the transport; the pipeline consults
// readiness and connection before it ever asks the gate.

use crate::core_modules::activation_grid::ActivationGrid;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

pub const DEFAULT_SEND_INTERVAL_MS: u64 = 500;

/// How often a changed grid may be sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RateLimit {
    /// At most one send every `ms` milliseconds.
    Interval { ms: u64 },
    /// Only frames whose ordinal is a multiple of `n` are eligible.
    EveryNFrames { n: u32 },
}

impl Default for RateLimit {
    fn default() -> Self {
        RateLimit::Interval {
            ms: DEFAULT_SEND_INTERVAL_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Outside the rate-limit window.
    Throttled,
    /// Eligible, but the device already shows this grid.
    Unchanged,
    /// Eligible and different from the last sent grid.
    Send,
}

#[derive(Debug, Clone)]
pub struct ChangeGate {
    rate_limit: RateLimit,
    last_send_time: Option<Instant>,
    frame_counter: u64,
    last_sent: Option<ActivationGrid>,
}

impl ChangeGate {
    pub fn new(rate_limit: RateLimit) -> Self {
        Self {
            rate_limit,
            last_send_time: None,
            frame_counter: 0,
            last_sent: None,
        }
    }

    pub fn rate_limit(&self) -> RateLimit {
        self.rate_limit
    }

    /// Classifies `grid` for the frame at `now`, advancing the rate-limit
    /// state whenever the frame falls inside the window.
    pub fn evaluate(&mut self, grid: &ActivationGrid, now: Instant) -> GateDecision {
        if !self.advance_window(now) {
            return GateDecision::Throttled;
        }
        match &self.last_sent {
            Some(previous) if previous == grid => GateDecision::Unchanged,
            _ => GateDecision::Send,
        }
    }

    fn advance_window(&mut self, now: Instant) -> bool {
        match self.rate_limit {
            RateLimit::Interval { ms } => {
                let interval = Duration::from_millis(ms);
                let eligible = self
                    .last_send_time
                    .is_none_or(|last| now.saturating_duration_since(last) >= interval);
                if eligible {
                    self.last_send_time = Some(now);
                }
                eligible
            }
            RateLimit::EveryNFrames { n } => {
                let n = u64::from(n.max(1));
                let eligible = self.frame_counter % n == 0;
                self.frame_counter = self.frame_counter.wrapping_add(1);
                eligible
            }
        }
    }

    /// Stores a copy of `grid` as the new comparison baseline. Call only after
    /// the write succeeded.
    pub fn record_sent(&mut self, grid: &ActivationGrid) {
        self.last_sent = Some(grid.clone());
    }

    pub fn last_sent(&self) -> Option<&ActivationGrid> {
        self.last_sent.as_ref()
    }

    /// Forget the baseline and the rate-limit state, as after a disconnect.
    pub fn reset(&mut self) {
        self.last_send_time = None;
        self.frame_counter = 0;
        self.last_sent = None;
    }
}
