//! Weekly schedule data model
//!
//! Seven day-records, each holding an ordered list of activities. This is the
//! sole source of truth for what the automaton should do and when. Mutations
//! go through explicit operations so the no-overlap invariant holds at all
//! times; callers persist after every mutation.

use crate::error::{Error, Result};
use crate::time::TimeOfDay;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// A one-shot announcement nested inside an activity's time range.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InterimAnnouncement {
    pub id: String,
    pub time: TimeOfDay,
    #[serde(rename = "soundId")]
    pub sound_id: String,
    pub enabled: bool,
}

/// Activity category, carried through to timelines and the UI.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    ShiftStart,
    ShiftEnd,
    BreakStart,
    BreakEnd,
    #[default]
    Custom,
}

/// A scheduled named interval with optional start/end sounds and announcements.
///
/// The `[start_time, end_time)` window is half-open; two activities on the
/// same day never overlap.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Activity {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: ActivityKind,
    #[serde(rename = "startTime")]
    pub start_time: TimeOfDay,
    #[serde(rename = "endTime")]
    pub end_time: TimeOfDay,
    #[serde(rename = "startSoundId", default)]
    pub start_sound_id: Option<String>,
    #[serde(rename = "endSoundId", default)]
    pub end_sound_id: Option<String>,
    #[serde(rename = "startAnnouncementId", default)]
    pub start_announcement_id: Option<String>,
    #[serde(rename = "endAnnouncementId", default)]
    pub end_announcement_id: Option<String>,
    #[serde(rename = "playMusic", default)]
    pub play_music: bool,
    #[serde(rename = "interimAnnouncements", default)]
    pub interim_announcements: Vec<InterimAnnouncement>,
}

impl Activity {
    /// Whether `time` falls inside the half-open activity window.
    pub fn contains(&self, time: TimeOfDay) -> bool {
        self.start_time <= time && time < self.end_time
    }

    /// Half-open interval overlap with another activity.
    pub fn overlaps(&self, other: &Activity) -> bool {
        self.start_time < other.end_time && self.end_time > other.start_time
    }
}

/// One weekday's schedule. Exactly seven of these exist at all times.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DaySchedule {
    #[serde(rename = "dayOfWeek")]
    pub day_of_week: u8,
    #[serde(rename = "dayName")]
    pub day_name: String,
    pub enabled: bool,
    #[serde(default)]
    pub activities: Vec<Activity>,
}

const DAY_NAMES: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// The full weekly schedule: an ordered collection of seven `DaySchedule`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct WeekSchedule {
    days: Vec<DaySchedule>,
}

impl Default for WeekSchedule {
    /// Weekdays enabled, weekend disabled, no activities.
    fn default() -> Self {
        let days = DAY_NAMES
            .iter()
            .enumerate()
            .map(|(i, name)| DaySchedule {
                day_of_week: i as u8,
                day_name: (*name).to_string(),
                enabled: i < 5,
                activities: Vec::new(),
            })
            .collect();
        Self { days }
    }
}

impl WeekSchedule {
    pub fn days(&self) -> &[DaySchedule] {
        &self.days
    }

    /// Schedule for a weekday index (0 = Monday .. 6 = Sunday).
    pub fn day(&self, day_of_week: u8) -> Option<&DaySchedule> {
        self.days.iter().find(|d| d.day_of_week == day_of_week)
    }

    /// Replace the whole week. Missing days are filled from defaults so the
    /// seven-day invariant survives partial documents.
    pub fn replace_all(&mut self, days: Vec<DaySchedule>) {
        let mut fresh = WeekSchedule::default();
        for day in days {
            if let Some(slot) = fresh
                .days
                .iter_mut()
                .find(|d| d.day_of_week == day.day_of_week)
            {
                *slot = day;
            }
        }
        self.days = fresh.days;
    }

    /// Replace a single day's record.
    pub fn replace_day(&mut self, day: DaySchedule) -> Result<()> {
        let slot = self
            .days
            .iter_mut()
            .find(|d| d.day_of_week == day.day_of_week)
            .ok_or_else(|| Error::Schedule(format!("no such weekday: {}", day.day_of_week)))?;
        *slot = day;
        Ok(())
    }

    /// Insert an activity, rejecting any half-open interval overlap with an
    /// existing activity on the same day. On rejection nothing is mutated.
    pub fn add_activity(&mut self, day_of_week: u8, activity: Activity) -> Result<()> {
        if activity.end_time <= activity.start_time {
            return Err(Error::Schedule(format!(
                "activity '{}' ends at or before it starts",
                activity.name
            )));
        }
        let day = self
            .days
            .iter_mut()
            .find(|d| d.day_of_week == day_of_week)
            .ok_or_else(|| Error::Schedule(format!("no such weekday: {}", day_of_week)))?;

        if let Some(existing) = day.activities.iter().find(|a| a.overlaps(&activity)) {
            return Err(Error::ScheduleConflict(format!(
                "'{}' ({}-{}) overlaps '{}' ({}-{})",
                activity.name,
                activity.start_time,
                activity.end_time,
                existing.name,
                existing.start_time,
                existing.end_time
            )));
        }

        day.activities.push(activity);
        day.activities.sort_by_key(|a| a.start_time);
        Ok(())
    }

    /// Remove an activity by id. Returns whether anything was removed.
    pub fn remove_activity(&mut self, day_of_week: u8, activity_id: &str) -> bool {
        if let Some(day) = self.days.iter_mut().find(|d| d.day_of_week == day_of_week) {
            let before = day.activities.len();
            day.activities.retain(|a| a.id != activity_id);
            return day.activities.len() < before;
        }
        false
    }

    /// Load from a JSON document. A missing or unreadable file falls back to
    /// the default week so the automaton never starts without a schedule.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<WeekSchedule>(&contents) {
                Ok(mut schedule) => {
                    // Re-fill so partial documents still carry all seven days
                    let days = std::mem::take(&mut schedule.days);
                    let mut full = WeekSchedule::default();
                    full.replace_all(days);
                    full
                }
                Err(e) => {
                    warn!("schedule document {} is malformed: {}", path.display(), e);
                    WeekSchedule::default()
                }
            },
            Err(_) => WeekSchedule::default(),
        }
    }

    /// Persist to a JSON document.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn activity(id: &str, start: &str, end: &str) -> Activity {
        Activity {
            id: id.to_string(),
            name: id.to_string(),
            kind: ActivityKind::Custom,
            start_time: start.parse().unwrap(),
            end_time: end.parse().unwrap(),
            start_sound_id: None,
            end_sound_id: None,
            start_announcement_id: None,
            end_announcement_id: None,
            play_music: false,
            interim_announcements: Vec::new(),
        }
    }

    #[test]
    fn default_week_has_seven_days_weekend_disabled() {
        let week = WeekSchedule::default();
        assert_eq!(week.days().len(), 7);
        for day in week.days() {
            assert_eq!(day.enabled, day.day_of_week < 5);
        }
        assert_eq!(week.day(0).unwrap().day_name, "Monday");
        assert_eq!(week.day(6).unwrap().day_name, "Sunday");
    }

    #[test]
    fn add_activity_keeps_sorted_order() {
        let mut week = WeekSchedule::default();
        week.add_activity(0, activity("b", "12:00", "12:30")).unwrap();
        week.add_activity(0, activity("a", "08:00", "08:10")).unwrap();
        let ids: Vec<_> = week.day(0).unwrap().activities.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[test]
    fn overlapping_add_fails_without_mutating() {
        let mut week = WeekSchedule::default();
        week.add_activity(0, activity("a", "08:00", "09:00")).unwrap();
        let before = week.clone();

        let err = week.add_activity(0, activity("b", "08:30", "09:30")).unwrap_err();
        assert!(matches!(err, Error::ScheduleConflict(_)));
        assert_eq!(week, before);
    }

    #[test]
    fn touching_intervals_do_not_overlap() {
        let mut week = WeekSchedule::default();
        week.add_activity(0, activity("a", "08:00", "09:00")).unwrap();
        // half-open windows: [08:00,09:00) then [09:00,10:00) is legal
        week.add_activity(0, activity("b", "09:00", "10:00")).unwrap();
        assert_eq!(week.day(0).unwrap().activities.len(), 2);
    }

    #[test]
    fn inverted_window_rejected() {
        let mut week = WeekSchedule::default();
        assert!(week.add_activity(0, activity("a", "09:00", "08:00")).is_err());
        assert!(week.add_activity(0, activity("a", "09:00", "09:00")).is_err());
    }

    #[test]
    fn remove_activity_by_id() {
        let mut week = WeekSchedule::default();
        week.add_activity(2, activity("x", "10:00", "10:30")).unwrap();
        assert!(week.remove_activity(2, "x"));
        assert!(!week.remove_activity(2, "x"));
        assert!(week.day(2).unwrap().activities.is_empty());
    }

    #[test]
    fn contains_is_half_open() {
        let a = activity("a", "08:00", "08:10");
        assert!(a.contains("08:00".parse().unwrap()));
        assert!(a.contains("08:09".parse().unwrap()));
        assert!(!a.contains("08:10".parse().unwrap()));
    }

    #[test]
    fn persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schedule.json");

        let mut week = WeekSchedule::default();
        let mut act = activity("a", "08:00", "08:45");
        act.play_music = true;
        act.interim_announcements.push(InterimAnnouncement {
            id: "i1".to_string(),
            time: "08:20".parse().unwrap(),
            sound_id: "chime".to_string(),
            enabled: true,
        });
        week.add_activity(4, act).unwrap();
        week.save(&path).unwrap();

        let loaded = WeekSchedule::load(&path);
        assert_eq!(loaded, week);
    }

    #[test]
    fn load_of_missing_or_garbage_file_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        assert_eq!(WeekSchedule::load(&missing), WeekSchedule::default());

        let garbage = dir.path().join("garbage.json");
        std::fs::write(&garbage, "{not json").unwrap();
        assert_eq!(WeekSchedule::load(&garbage), WeekSchedule::default());
    }

    #[test]
    fn replace_all_refills_missing_days() {
        let mut week = WeekSchedule::default();
        let mut saturday = week.day(5).unwrap().clone();
        saturday.enabled = true;
        week.replace_all(vec![saturday]);
        assert_eq!(week.days().len(), 7);
        assert!(week.day(5).unwrap().enabled);
        assert!(week.day(0).unwrap().enabled);
    }
}
