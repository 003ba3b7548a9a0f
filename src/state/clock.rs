//! Drift-free countdown clocks.
//!
//! A running clock never counts ticks: it remembers the wall-clock instant it was
//! started at and the remaining time at that instant (the basis), and derives the
//! current value from the wall-clock delta. Suspending the process or missing ticks
//! therefore cannot desynchronize the value shown to viewers.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Current wall-clock time in epoch milliseconds.
pub fn wall_clock_ms() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Width of the window below a threshold in which a warning may fire.
const WARNING_WINDOW_MS: u64 = 1_000;
const PLAYER_THRESHOLDS_MS: &[u64] = &[60_000, 30_000, 10_000];
const INTERVAL_THRESHOLDS_MS: &[u64] = &[60_000, 15_000];

/// What a clock measures; selects its warning thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum ClockKind {
    /// Possession time of one side.
    Player,
    /// Shared warmup clock.
    Warmup,
    /// Shared break between ends.
    Interval,
}

impl ClockKind {
    /// Ordered thresholds (milliseconds remaining) at which a warning cue fires.
    pub fn thresholds(self) -> &'static [u64] {
        match self {
            ClockKind::Player => PLAYER_THRESHOLDS_MS,
            ClockKind::Interval => INTERVAL_THRESHOLDS_MS,
            ClockKind::Warmup => &[],
        }
    }
}

/// Notification produced by a clock operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEvent {
    /// The clock started counting down from `remaining_ms`.
    Started { remaining_ms: u64 },
    /// The clock was stopped; `remaining_ms` is the value frozen at the stop instant.
    Stopped { remaining_ms: u64 },
    /// The remaining time crossed a warning threshold.
    Warning { threshold_ms: u64 },
    /// The clock reached zero and stopped itself.
    Expired,
}

/// Countdown clock state, serializable so a reloaded controller can resume it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Clock {
    kind: ClockKind,
    limit_ms: u64,
    remaining_ms: u64,
    running: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    started_at_ms: Option<i64>,
    #[serde(default)]
    basis_ms: u64,
    #[serde(default)]
    #[schema(value_type = Vec<u64>)]
    warnings_fired: BTreeSet<u64>,
    #[serde(default)]
    expired: bool,
}

impl Clock {
    /// Build a stopped clock showing its full limit.
    pub fn new(kind: ClockKind, limit_ms: u64) -> Self {
        Self {
            kind,
            limit_ms,
            remaining_ms: limit_ms,
            running: false,
            started_at_ms: None,
            basis_ms: limit_ms,
            warnings_fired: BTreeSet::new(),
            expired: false,
        }
    }

    /// Which family of clock this is.
    pub fn kind(&self) -> ClockKind {
        self.kind
    }

    /// Full duration the clock resets to.
    pub fn limit_ms(&self) -> u64 {
        self.limit_ms
    }

    /// Whether the clock is counting down.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Whether the clock reached zero.
    pub fn is_expired(&self) -> bool {
        self.expired
    }

    /// Value held while stopped. A running clock only refreshes it on expiry; use
    /// [`Clock::remaining_at`] for the live value.
    pub fn remaining_ms(&self) -> u64 {
        self.remaining_ms
    }

    /// Thresholds already announced since the last reset.
    pub fn warnings_fired(&self) -> &BTreeSet<u64> {
        &self.warnings_fired
    }

    /// Remaining time at wall-clock instant `now_ms`.
    pub fn remaining_at(&self, now_ms: i64) -> u64 {
        match (self.running, self.started_at_ms) {
            (true, Some(started_at)) => {
                let elapsed = now_ms.saturating_sub(started_at).max(0) as u64;
                self.basis_ms.saturating_sub(elapsed)
            }
            _ => self.remaining_ms,
        }
    }

    /// Start counting down from the current remaining value.
    ///
    /// Returns `None` when the clock is already running or has nothing left.
    pub fn start(&mut self, now_ms: i64) -> Option<ClockEvent> {
        if self.running || self.remaining_ms == 0 {
            return None;
        }
        self.basis_ms = self.remaining_ms;
        self.started_at_ms = Some(now_ms);
        self.running = true;
        Some(ClockEvent::Started {
            remaining_ms: self.remaining_ms,
        })
    }

    /// Freeze the value computed at `now_ms` and stop.
    pub fn stop(&mut self, now_ms: i64) -> Option<ClockEvent> {
        if !self.running {
            return None;
        }
        let remaining_ms = self.remaining_at(now_ms);
        self.remaining_ms = remaining_ms;
        self.basis_ms = remaining_ms;
        self.running = false;
        self.started_at_ms = None;
        Some(ClockEvent::Stopped { remaining_ms })
    }

    /// Evaluate the clock at `now_ms`, firing threshold warnings and expiry.
    ///
    /// The stored state only changes when something fires, so ticking a running
    /// clock between thresholds is a no-op.
    pub fn tick(&mut self, now_ms: i64) -> Vec<ClockEvent> {
        if !self.running {
            return Vec::new();
        }

        let remaining = self.remaining_at(now_ms);

        let mut events = Vec::new();
        for &threshold in self.kind.thresholds() {
            let in_window =
                remaining <= threshold && remaining > threshold.saturating_sub(WARNING_WINDOW_MS);
            if in_window && self.warnings_fired.insert(threshold) {
                events.push(ClockEvent::Warning {
                    threshold_ms: threshold,
                });
            }
        }

        if remaining == 0 {
            self.remaining_ms = 0;
            self.running = false;
            self.started_at_ms = None;
            self.basis_ms = 0;
            if !self.expired {
                self.expired = true;
                events.push(ClockEvent::Expired);
            }
        }

        events
    }

    /// Stop without notification and show `remaining_ms`.
    ///
    /// Warning flags and the expiry latch reset whenever something is left to count.
    pub fn rearm(&mut self, remaining_ms: u64) {
        self.running = false;
        self.started_at_ms = None;
        self.remaining_ms = remaining_ms;
        self.basis_ms = remaining_ms;
        if remaining_ms > 0 {
            self.warnings_fired.clear();
            self.expired = false;
        }
    }

    /// Replace the limit and re-arm to it.
    pub fn reset(&mut self, limit_ms: u64) {
        self.limit_ms = limit_ms;
        self.rearm(limit_ms);
    }

    /// Re-arm to the current limit.
    pub fn reset_to_limit(&mut self) {
        self.rearm(self.limit_ms);
    }

    /// Change the limit. A stopped clock still showing its old limit follows the
    /// new one; a clock in use keeps its value.
    pub fn set_limit(&mut self, limit_ms: u64) {
        let untouched = !self.running && self.remaining_ms == self.limit_ms;
        self.limit_ms = limit_ms;
        if untouched {
            self.rearm(limit_ms);
        }
    }
}
