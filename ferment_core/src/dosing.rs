//! Nutrient pump windows.
//!
//! A schedule fire opens a window of the given number of seconds; an
//! independent manual toggle keeps the pump on regardless. The pump runs while
//! either is active, and start/stop are only emitted on the transitions.
use std::time::{Duration, Instant};

use serde::Serialize;

/// Pump transition the caller has to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PumpEdge {
    Start,
    Stop,
}

/// Longest window a single fire may open.
const MAX_WINDOW: Duration = Duration::from_secs(24 * 3600);

#[derive(Debug, Clone, Default)]
pub struct DosingController {
    dosing_until: Option<Instant>,
    manual_on: bool,
    running: bool,
}

impl DosingController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a window for the positive durations (seconds) fired this minute.
    ///
    /// Returns the window length, or `None` when nothing positive fired.
    pub fn fire(&mut self, durations: &[f64], now: Instant) -> Option<Duration> {
        let total: f64 = durations
            .iter()
            .copied()
            .filter(|d| d.is_finite() && *d > 0.0)
            .sum();
        if total <= 0.0 {
            return None;
        }
        let window = Duration::from_secs_f64(total.min(MAX_WINDOW.as_secs_f64()));
        self.dosing_until = Some(now + window);
        Some(window)
    }

    pub fn schedule_active(&self, now: Instant) -> bool {
        self.dosing_until.is_some_and(|until| now < until)
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        self.dosing_until
            .map_or(Duration::ZERO, |until| until.saturating_duration_since(now))
    }

    pub fn manual_on(&self) -> bool {
        self.manual_on
    }

    pub fn set_manual(&mut self, on: bool) {
        self.manual_on = on;
    }

    pub fn toggle_manual(&mut self) -> bool {
        self.manual_on = !self.manual_on;
        self.manual_on
    }

    /// Whether the pump was last commanded on.
    pub fn running(&self) -> bool {
        self.running
    }

    /// Recompute the desired pump state; returns the edge to apply, if any.
    pub fn update(&mut self, now: Instant) -> Option<PumpEdge> {
        if self.dosing_until.is_some() && !self.schedule_active(now) {
            self.dosing_until = None;
        }
        let should_run = self.schedule_active(now) || self.manual_on;
        if should_run == self.running {
            return None;
        }
        self.running = should_run;
        Some(if should_run {
            PumpEdge::Start
        } else {
            PumpEdge::Stop
        })
    }

    /// Clear the window and the manual toggle.
    pub fn stop_all(&mut self) {
        self.dosing_until = None;
        self.manual_on = false;
    }

    /// Forget the commanded state so the next update re-emits the edge.
    pub fn mark_stopped(&mut self) {
        self.running = false;
    }
}
