//! Date-keyed daily event calendars.
//!
//! A [`DaySchedule`] maps a calendar date to its events, kept sorted by time
//! of day. Events with the same time keep their insertion order, so the
//! answer of [`DaySchedule::value_at`] is deterministic even with duplicates.
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::CalendarError;
use crate::util::truncate_to_minute;

/// Minute-resolution time of day, 00:00 to 23:59.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

impl TimeOfDay {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        (hour <= 23 && minute <= 59).then_some(Self { hour, minute })
    }

    pub fn of(ts: NaiveDateTime) -> Self {
        Self {
            hour: ts.hour() as u8,
            minute: ts.minute() as u8,
        }
    }

    pub fn hour(self) -> u8 {
        self.hour
    }

    pub fn minute(self) -> u8 {
        self.minute
    }

    pub fn as_naive(self) -> NaiveTime {
        NaiveTime::from_hms_opt(u32::from(self.hour), u32::from(self.minute), 0)
            .unwrap_or(NaiveTime::MIN)
    }
}

impl FromStr for TimeOfDay {
    type Err = CalendarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || CalendarError::InvalidTime(s.to_owned());
        let (h, m) = s.trim().split_once(':').ok_or_else(bad)?;
        let hour: u8 = h.trim().parse().map_err(|_| bad())?;
        let minute: u8 = m.trim().parse().map_err(|_| bad())?;
        Self::new(hour, minute).ok_or_else(bad)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = CalendarError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(t: TimeOfDay) -> Self {
        t.to_string()
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent<V> {
    pub time: TimeOfDay,
    pub value: V,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DaySchedule<V> {
    days: BTreeMap<NaiveDate, Vec<CalendarEvent<V>>>,
}

impl<V> Default for DaySchedule<V> {
    fn default() -> Self {
        Self {
            days: BTreeMap::new(),
        }
    }
}

impl<V: Copy> DaySchedule<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// Total number of events across all dates.
    pub fn len(&self) -> usize {
        self.days.values().map(Vec::len).sum()
    }

    /// Insert without edit-time checks; used by imports and tests.
    pub fn insert(&mut self, date: NaiveDate, time: TimeOfDay, value: V) {
        let day = self.days.entry(date).or_default();
        let at = day.partition_point(|e| e.time <= time);
        day.insert(at, CalendarEvent { time, value });
    }

    /// Value of the latest event on `ts`'s date at or before its time of day.
    pub fn value_at(&self, ts: NaiveDateTime, default: V) -> V {
        self.lookup(ts).unwrap_or(default)
    }

    pub fn lookup(&self, ts: NaiveDateTime) -> Option<V> {
        let day = self.days.get(&ts.date())?;
        let now = TimeOfDay::of(ts);
        let n = day.partition_point(|e| e.time <= now);
        n.checked_sub(1).map(|i| day[i].value)
    }

    /// Values of every event whose time equals `ts` truncated to the minute.
    ///
    /// Callers that tick more than once a minute gate this with a [`MinuteGate`].
    pub fn fire_at_minute(&self, ts: NaiveDateTime) -> Vec<V> {
        let now = TimeOfDay::of(ts);
        self.days
            .get(&ts.date())
            .map(|day| {
                day.iter()
                    .filter(|e| e.time == now)
                    .map(|e| e.value)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Time-sorted events on `date`.
    pub fn events_on(&self, date: NaiveDate) -> &[CalendarEvent<V>] {
        self.days.get(&date).map_or(&[], Vec::as_slice)
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.days.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, &CalendarEvent<V>)> + '_ {
        self.days
            .iter()
            .flat_map(|(d, evs)| evs.iter().map(move |e| (*d, e)))
    }

    pub fn add_event(
        &mut self,
        date: NaiveDate,
        time: &str,
        value: V,
        today: NaiveDate,
    ) -> Result<(), CalendarError> {
        if date < today {
            return Err(CalendarError::PastDate(date));
        }
        let time: TimeOfDay = time.parse()?;
        self.insert(date, time, value);
        Ok(())
    }

    /// Replace event `index` of the time-sorted listing for `date`.
    pub fn edit_event(
        &mut self,
        date: NaiveDate,
        index: usize,
        time: &str,
        value: V,
        today: NaiveDate,
    ) -> Result<(), CalendarError> {
        if date < today {
            return Err(CalendarError::PastDate(date));
        }
        let time: TimeOfDay = time.parse()?;
        self.delete_event(date, index)?;
        self.insert(date, time, value);
        Ok(())
    }

    /// Remove event `index` of `date`; an emptied day is dropped.
    pub fn delete_event(&mut self, date: NaiveDate, index: usize) -> Result<CalendarEvent<V>, CalendarError> {
        let missing = CalendarError::NoSuchEvent { date, index };
        let day = self.days.get_mut(&date).ok_or(missing)?;
        if index >= day.len() {
            return Err(CalendarError::NoSuchEvent { date, index });
        }
        let ev = day.remove(index);
        if day.is_empty() {
            self.days.remove(&date);
        }
        Ok(ev)
    }

    /// Drop every event on `date`; returns how many were removed.
    pub fn clear_day(&mut self, date: NaiveDate) -> usize {
        self.days.remove(&date).map_or(0, |d| d.len())
    }
}

/// Remembers the last minute processed so minute events fire once.
#[derive(Debug, Default, Clone)]
pub struct MinuteGate {
    last: Option<NaiveDateTime>,
}

impl MinuteGate {
    /// True the first time a given minute is seen.
    pub fn enter(&mut self, ts: NaiveDateTime) -> bool {
        let minute = truncate_to_minute(ts);
        if self.last == Some(minute) {
            return false;
        }
        self.last = Some(minute);
        true
    }

    pub fn last(&self) -> Option<NaiveDateTime> {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, day).unwrap()
    }

    fn at(day: u32, h: u32, m: u32, s: u32) -> NaiveDateTime {
        d(day).and_hms_opt(h, m, s).unwrap()
    }

    fn t(s: &str) -> TimeOfDay {
        s.parse().unwrap()
    }

    #[rstest]
    #[case("00:00", true)]
    #[case("9:05", true)]
    #[case("23:59", true)]
    #[case("24:00", false)]
    #[case("12:60", false)]
    #[case("1200", false)]
    #[case("ab:cd", false)]
    #[case("-1:00", false)]
    fn time_validation(#[case] raw: &str, #[case] ok: bool) {
        assert_eq!(raw.parse::<TimeOfDay>().is_ok(), ok, "{raw}");
    }

    #[test]
    fn time_formats_zero_padded() {
        assert_eq!(t("9:05").to_string(), "09:05");
    }

    #[test]
    fn value_at_boundaries() {
        let mut s = DaySchedule::new();
        s.insert(d(10), t("14:00"), 22.0);
        s.insert(d(10), t("08:00"), 20.0);
        assert_eq!(s.value_at(at(10, 7, 59, 59), -1.0), -1.0);
        assert_eq!(s.value_at(at(10, 8, 0, 0), -1.0), 20.0);
        assert_eq!(s.value_at(at(10, 13, 59, 0), -1.0), 20.0);
        assert_eq!(s.value_at(at(10, 14, 0, 0), -1.0), 22.0);
        assert_eq!(s.value_at(at(11, 23, 0, 0), -1.0), -1.0);
    }

    #[test]
    fn duplicate_times_resolve_to_last_inserted() {
        let mut s = DaySchedule::new();
        s.insert(d(10), t("08:00"), 1.0);
        s.insert(d(10), t("08:00"), 2.0);
        assert_eq!(s.value_at(at(10, 9, 0, 0), 0.0), 2.0);
        assert_eq!(s.fire_at_minute(at(10, 8, 0, 30)), vec![1.0, 2.0]);
    }

    #[test]
    fn fire_matches_exact_minute_only() {
        let mut s = DaySchedule::new();
        s.insert(d(10), t("09:00"), 30.0);
        assert_eq!(s.fire_at_minute(at(10, 9, 0, 0)), vec![30.0]);
        assert_eq!(s.fire_at_minute(at(10, 9, 0, 59)), vec![30.0]);
        assert!(s.fire_at_minute(at(10, 9, 1, 0)).is_empty());
        assert!(s.fire_at_minute(at(11, 9, 0, 0)).is_empty());
    }

    #[test]
    fn minute_gate_fires_once_per_minute() {
        let mut g = MinuteGate::default();
        assert!(g.enter(at(10, 9, 0, 0)));
        assert!(!g.enter(at(10, 9, 0, 30)));
        assert!(g.enter(at(10, 9, 1, 0)));
        assert!(g.enter(at(11, 9, 1, 0)));
    }

    #[test]
    fn add_rejects_past_dates_and_bad_times() {
        let mut s = DaySchedule::new();
        assert!(matches!(
            s.add_event(d(9), "08:00", 1.0, d(10)),
            Err(CalendarError::PastDate(_))
        ));
        assert!(matches!(
            s.add_event(d(10), "8h", 1.0, d(10)),
            Err(CalendarError::InvalidTime(_))
        ));
        s.add_event(d(10), "08:00", 1.0, d(10)).unwrap();
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn past_events_still_evaluate() {
        let mut s = DaySchedule::new();
        s.insert(d(1), t("06:00"), 18.0);
        assert_eq!(s.value_at(at(1, 7, 0, 0), 0.0), 18.0);
    }

    #[test]
    fn edit_delete_clear() {
        let mut s = DaySchedule::new();
        s.add_event(d(10), "12:00", 2.0, d(10)).unwrap();
        s.add_event(d(10), "06:00", 1.0, d(10)).unwrap();
        s.edit_event(d(10), 1, "05:00", 3.0, d(10)).unwrap();
        let times: Vec<String> = s.events_on(d(10)).iter().map(|e| e.time.to_string()).collect();
        assert_eq!(times, ["05:00", "06:00"]);
        assert_eq!(s.events_on(d(10))[0].value, 3.0);

        assert!(s.delete_event(d(10), 5).is_err());
        s.delete_event(d(10), 0).unwrap();
        s.delete_event(d(10), 0).unwrap();
        assert_eq!(s.dates().count(), 0);

        s.add_event(d(12), "01:00", 1.0, d(10)).unwrap();
        s.add_event(d(12), "02:00", 1.0, d(10)).unwrap();
        assert_eq!(s.clear_day(d(12)), 2);
        assert!(s.is_empty());
    }

    #[test]
    fn serializes_with_string_times() {
        let mut s = DaySchedule::new();
        s.insert(d(10), t("8:00"), 20.5);
        let json = serde_json::to_string(&s).unwrap();
        assert_eq!(json, r#"{"2025-06-10":[{"time":"08:00","value":20.5}]}"#);
        let back: DaySchedule<f64> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }
}
