//! Per-channel sampling cadence.
use std::time::{Duration, Instant};

/// Next-due bookkeeping for one flow channel.
#[derive(Debug, Clone)]
pub struct SampleSchedule {
    period: Duration,
    next_due: Option<Instant>,
}

impl SampleSchedule {
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(Duration::from_millis(1)),
            next_due: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.next_due
    }

    /// A channel that has never been sampled is due immediately.
    pub fn is_due(&self, now: Instant) -> bool {
        self.next_due.is_none_or(|due| now >= due)
    }

    /// Record an attempt at `now`, successful or not.
    pub fn mark_attempt(&mut self, now: Instant) {
        self.next_due = Some(now + self.period);
    }

    /// Time until the channel is next due; zero when overdue.
    pub fn wait(&self, now: Instant) -> Duration {
        self.next_due
            .map_or(Duration::ZERO, |due| due.saturating_duration_since(now))
    }
}
