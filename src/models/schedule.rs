// src/models/schedule.rs

//! Scheduled run slots and run-type resolution.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Block name used for runs that match no scheduled slot.
pub const MANUAL_BLOCK: &str = "manual";

/// A scheduled poll time (UTC).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduleSlot {
    pub hour: u32,
    pub minute: u32,

    /// Period this slot belongs to (e.g., "morning", "evening")
    pub block: String,

    /// Whether this slot opens its period
    #[serde(default)]
    pub first_run: bool,
}

impl ScheduleSlot {
    pub fn new(hour: u32, minute: u32, block: &str, first_run: bool) -> Self {
        Self {
            hour,
            minute,
            block: block.to_string(),
            first_run,
        }
    }

    fn minute_of_day(&self) -> u32 {
        self.hour * 60 + self.minute
    }
}

/// Where the current invocation sits in the schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunInfo {
    pub block: String,

    /// 1-based slot number, 0 for manual runs
    pub slot: usize,

    /// "HH:MM" of the matched slot, or "manual"
    pub scheduled: String,

    pub first_run: bool,
}

impl RunInfo {
    pub fn manual() -> Self {
        Self {
            block: MANUAL_BLOCK.to_string(),
            slot: 0,
            scheduled: MANUAL_BLOCK.to_string(),
            first_run: true,
        }
    }

    pub fn is_manual(&self) -> bool {
        self.slot == 0
    }
}

const MINUTES_PER_DAY: u32 = 24 * 60;

/// Match `now` against the slots. A slot matches when `now` falls within
/// `window_minutes` after its start, wrapping past midnight; the most recent
/// matching start wins. No match is a manual run, which always opens its own
/// period.
pub fn resolve_run(slots: &[ScheduleSlot], window_minutes: u32, now: DateTime<Utc>) -> RunInfo {
    let current = now.hour() * 60 + now.minute();
    let elapsed = |s: &ScheduleSlot| {
        (current + MINUTES_PER_DAY - s.minute_of_day() % MINUTES_PER_DAY) % MINUTES_PER_DAY
    };

    slots
        .iter()
        .enumerate()
        .filter(|(_, s)| elapsed(s) <= window_minutes)
        .min_by_key(|(_, s)| elapsed(s))
        .map(|(index, s)| RunInfo {
            block: s.block.clone(),
            slot: index + 1,
            scheduled: format!("{:02}:{:02}", s.hour, s.minute),
            first_run: s.first_run,
        })
        .unwrap_or_else(RunInfo::manual)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn slots() -> Vec<ScheduleSlot> {
        vec![
            ScheduleSlot::new(6, 30, "morning", true),
            ScheduleSlot::new(7, 0, "morning", false),
            ScheduleSlot::new(8, 0, "morning", false),
            ScheduleSlot::new(15, 30, "evening", true),
            ScheduleSlot::new(16, 0, "evening", false),
            ScheduleSlot::new(16, 30, "evening", false),
        ]
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 2, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_first_slot_of_morning() {
        let run = resolve_run(&slots(), 30, at(6, 41));
        assert_eq!(run.slot, 1);
        assert_eq!(run.block, "morning");
        assert_eq!(run.scheduled, "06:30");
        assert!(run.first_run);
    }

    #[test]
    fn test_subsequent_slot() {
        let run = resolve_run(&slots(), 30, at(16, 5));
        assert_eq!(run.slot, 5);
        assert_eq!(run.block, "evening");
        assert!(!run.first_run);
    }

    #[test]
    fn test_overlapping_windows_pick_latest_start() {
        let run = resolve_run(&slots(), 30, at(7, 0));
        assert_eq!(run.scheduled, "07:00");
        assert!(!run.first_run);
    }

    #[test]
    fn test_window_wraps_past_midnight() {
        let late = vec![
            ScheduleSlot::new(22, 0, "night", true),
            ScheduleSlot::new(23, 45, "night", false),
        ];
        let run = resolve_run(&late, 30, at(0, 5));
        assert_eq!(run.scheduled, "23:45");
        assert_eq!(run.slot, 2);

        assert!(resolve_run(&late, 30, at(0, 16)).is_manual());
        assert_eq!(resolve_run(&late, 30, at(23, 50)).scheduled, "23:45");
    }

    #[test]
    fn test_unscheduled_time_is_manual() {
        let run = resolve_run(&slots(), 30, at(12, 0));
        assert!(run.is_manual());
        assert!(run.first_run);
        assert_eq!(run.block, MANUAL_BLOCK);
    }

    #[test]
    fn test_window_end_is_inclusive() {
        assert_eq!(resolve_run(&slots(), 30, at(8, 30)).slot, 3);
        assert!(resolve_run(&slots(), 30, at(8, 31)).is_manual());
    }
}
