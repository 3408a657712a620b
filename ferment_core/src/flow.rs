//! In-memory flow history per channel.
use std::collections::VecDeque;

use chrono::{NaiveDateTime, TimeDelta};
use serde::Serialize;

use crate::linearize::{FlowReading, FlowStatus};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FlowSample {
    pub timestamp: NaiveDateTime,
    pub flow: f64,
    pub rate: f64,
    pub current_ma: f64,
    pub voltage: f64,
    pub status: FlowStatus,
}

impl FlowSample {
    pub fn from_reading(timestamp: NaiveDateTime, r: &FlowReading) -> Self {
        Self {
            timestamp,
            flow: r.flow,
            rate: r.rate,
            current_ma: r.current_ma,
            voltage: r.voltage,
            status: r.status,
        }
    }
}

/// Summary of the samples in a display window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FlowStats {
    pub count: usize,
    pub last_flow: f64,
    pub last_rate: f64,
    pub mean_flow: f64,
    pub max_flow: f64,
    pub mean_rate: f64,
    pub max_rate: f64,
}

/// Append-only ring bounded by age rather than count.
#[derive(Debug, Clone)]
pub struct FlowRing {
    retention: TimeDelta,
    samples: VecDeque<FlowSample>,
}

fn hours_delta(hours: f64) -> TimeDelta {
    let secs = (hours.max(0.0) * 3600.0).min(1e15);
    TimeDelta::milliseconds((secs * 1000.0) as i64)
}

impl FlowRing {
    pub fn new(retention_hours: f64) -> Self {
        Self {
            retention: hours_delta(retention_hours),
            samples: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn last(&self) -> Option<&FlowSample> {
        self.samples.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FlowSample> {
        self.samples.iter()
    }

    /// Append and drop anything older than the retention horizon.
    pub fn push(&mut self, sample: FlowSample) {
        let now = sample.timestamp;
        self.samples.push_back(sample);
        self.prune(now);
    }

    /// Keep samples with `timestamp >= now - retention`; returns how many were dropped.
    pub fn prune(&mut self, now: NaiveDateTime) -> usize {
        let cutoff = now
            .checked_sub_signed(self.retention)
            .unwrap_or(NaiveDateTime::MIN);
        let before = self.samples.len();
        self.samples.retain(|s| s.timestamp >= cutoff);
        before - self.samples.len()
    }

    /// Samples within `hours` of the newest one; `None` or 0 means all.
    pub fn windowed(&self, hours: Option<f64>) -> Vec<FlowSample> {
        let Some(last) = self.samples.back() else {
            return Vec::new();
        };
        match hours.filter(|h| *h > 0.0) {
            None => self.samples.iter().copied().collect(),
            Some(h) => {
                let cutoff = last
                    .timestamp
                    .checked_sub_signed(hours_delta(h))
                    .unwrap_or(NaiveDateTime::MIN);
                self.samples
                    .iter()
                    .filter(|s| s.timestamp >= cutoff)
                    .copied()
                    .collect()
            }
        }
    }

    pub fn stats(&self, hours: Option<f64>) -> Option<FlowStats> {
        let window = self.windowed(hours);
        let last = window.last()?;
        let n = window.len() as f64;
        let fold_max = |f: fn(&FlowSample) -> f64| window.iter().map(f).fold(f64::NEG_INFINITY, f64::max);
        Some(FlowStats {
            count: window.len(),
            last_flow: last.flow,
            last_rate: last.rate,
            mean_flow: window.iter().map(|s| s.flow).sum::<f64>() / n,
            max_flow: fold_max(|s| s.flow),
            mean_rate: window.iter().map(|s| s.rate).sum::<f64>() / n,
            max_rate: fold_max(|s| s.rate),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + TimeDelta::hours(i64::from(h))
    }

    fn sample(h: u32, flow: f64) -> FlowSample {
        FlowSample {
            timestamp: at(h),
            flow,
            rate: flow / 10.0,
            current_ma: 4.0,
            voltage: 0.588,
            status: FlowStatus::Ok,
        }
    }

    #[test]
    fn prune_drops_only_expired_samples_in_order() {
        let mut ring = FlowRing::new(10.0);
        for h in 0..5 {
            ring.push(sample(h, f64::from(h)));
        }
        assert_eq!(ring.len(), 5);
        assert_eq!(ring.prune(at(12)), 2);
        let flows: Vec<f64> = ring.iter().map(|s| s.flow).collect();
        assert_eq!(flows, [2.0, 3.0, 4.0]);
    }

    #[test]
    fn push_prunes_against_new_sample() {
        let mut ring = FlowRing::new(1.0);
        ring.push(sample(0, 1.0));
        ring.push(sample(1, 2.0));
        ring.push(sample(3, 3.0));
        assert_eq!(ring.len(), 1);
    }

    #[test]
    fn window_is_relative_to_newest_sample() {
        let mut ring = FlowRing::new(504.0);
        for h in 0..10 {
            ring.push(sample(h, f64::from(h)));
        }
        assert_eq!(ring.windowed(Some(2.0)).len(), 3);
        assert_eq!(ring.windowed(None).len(), 10);
        assert_eq!(ring.windowed(Some(0.0)).len(), 10);
    }

    #[test]
    fn stats_over_window() {
        let mut ring = FlowRing::new(504.0);
        assert!(ring.stats(None).is_none());
        ring.push(sample(0, 10.0));
        ring.push(sample(1, 30.0));
        ring.push(sample(2, 20.0));
        let s = ring.stats(None).unwrap();
        assert_eq!(s.count, 3);
        assert_eq!(s.last_flow, 20.0);
        assert_eq!(s.mean_flow, 20.0);
        assert_eq!(s.max_flow, 30.0);
        assert_eq!(s.max_rate, 3.0);
    }
}
