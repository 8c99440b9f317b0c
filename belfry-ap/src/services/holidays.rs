//! Holiday calendar service
//!
//! Holidays come from a user-maintained JSON calendar (date -> name) under
//! the data root. When enabled, a holiday silences the whole automated day;
//! individual dates can be muted in the configuration to run normally.

use crate::scheduler::hooks::HolidayOracle;
use belfry_common::config::ConfigStore;
use belfry_common::Result;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::warn;

const DATE_FORMAT: &str = "%d.%m.%Y";

#[derive(Debug, Clone, Serialize)]
pub struct HolidayEntry {
    pub date: String,
    pub name: String,
    pub muted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpcomingHoliday {
    pub date: String,
    pub name: String,
    pub days_until: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HolidayStatus {
    pub enabled: bool,
    pub skip_on_holidays: bool,
    pub country: String,
    pub is_holiday_today: bool,
    pub today_holiday_name: Option<String>,
    pub upcoming_holidays: Vec<UpcomingHoliday>,
    pub all_holidays: Vec<HolidayEntry>,
}

pub struct HolidayService {
    path: PathBuf,
    /// date string ("DD.MM.YYYY") -> holiday name
    calendar: Mutex<BTreeMap<String, String>>,
    config: Arc<ConfigStore>,
}

fn date_stamp(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

impl HolidayService {
    pub fn open(path: PathBuf, config: Arc<ConfigStore>) -> Self {
        let calendar = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(map) => map,
                Err(e) => {
                    warn!("holiday calendar {} is malformed: {}", path.display(), e);
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };
        Self {
            path,
            calendar: Mutex::new(calendar),
            config,
        }
    }

    fn save_locked(&self, calendar: &BTreeMap<String, String>) {
        let result = (|| -> Result<()> {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&self.path, serde_json::to_string_pretty(calendar)?)?;
            Ok(())
        })();
        if let Err(e) = result {
            warn!(
                "failed to persist holiday calendar to {}: {}",
                self.path.display(),
                e
            );
        }
    }

    /// Whether automated cues should be silenced on `date`.
    pub fn is_holiday_on(&self, date: NaiveDate) -> bool {
        let config = self.config.get().holidays;
        if !config.enabled || !config.skip_on_holidays {
            return false;
        }
        let stamp = date_stamp(date);
        if !self.calendar.lock().unwrap().contains_key(&stamp) {
            return false;
        }
        // a muted holiday runs like a normal day
        !config.muted_dates.contains(&stamp)
    }

    pub fn holiday_name(&self, date: NaiveDate) -> Option<String> {
        self.calendar
            .lock()
            .unwrap()
            .get(&date_stamp(date))
            .cloned()
    }

    /// Add or rename a calendar entry.
    pub fn set_holiday(&self, date: NaiveDate, name: &str) {
        let mut calendar = self.calendar.lock().unwrap();
        calendar.insert(date_stamp(date), name.to_string());
        self.save_locked(&calendar);
    }

    /// Remove a calendar entry. Returns whether it existed.
    pub fn remove_holiday(&self, date: NaiveDate) -> bool {
        let mut calendar = self.calendar.lock().unwrap();
        let removed = calendar.remove(&date_stamp(date)).is_some();
        if removed {
            self.save_locked(&calendar);
        }
        removed
    }

    /// Mute or unmute one date (muted holidays run as normal days).
    pub fn set_holiday_muted(&self, date_str: &str, muted: bool) {
        let date_str = date_str.to_string();
        self.config.update(|c| {
            let list = &mut c.holidays.muted_dates;
            if muted && !list.contains(&date_str) {
                list.push(date_str.clone());
            } else if !muted {
                list.retain(|d| d != &date_str);
            }
        });
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.config.update(|c| c.holidays.enabled = enabled);
    }

    pub fn set_skip_on_holidays(&self, skip: bool) {
        self.config.update(|c| c.holidays.skip_on_holidays = skip);
    }

    /// All calendar entries sorted by date, annotated with the muted flag.
    pub fn all_holidays(&self) -> Vec<HolidayEntry> {
        let muted = self.config.get().holidays.muted_dates;
        let mut entries: Vec<(NaiveDate, HolidayEntry)> = self
            .calendar
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(date, name)| {
                let parsed = NaiveDate::parse_from_str(date, DATE_FORMAT).ok()?;
                Some((
                    parsed,
                    HolidayEntry {
                        date: date.clone(),
                        name: name.clone(),
                        muted: muted.contains(date),
                    },
                ))
            })
            .collect();
        entries.sort_by_key(|(date, _)| *date);
        entries.into_iter().map(|(_, entry)| entry).collect()
    }

    /// The next `count` holidays at or after `today`.
    pub fn upcoming_holidays(&self, count: usize, today: NaiveDate) -> Vec<UpcomingHoliday> {
        let mut upcoming: Vec<UpcomingHoliday> = self
            .calendar
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(date, name)| {
                let parsed = NaiveDate::parse_from_str(date, DATE_FORMAT).ok()?;
                (parsed >= today).then(|| UpcomingHoliday {
                    date: date.clone(),
                    name: name.clone(),
                    days_until: (parsed - today).num_days(),
                })
            })
            .collect();
        upcoming.sort_by_key(|h| h.days_until);
        upcoming.truncate(count);
        upcoming
    }

    pub fn status(&self) -> HolidayStatus {
        let today = chrono::Local::now().date_naive();
        let config = self.config.get().holidays;
        HolidayStatus {
            enabled: config.enabled,
            skip_on_holidays: config.skip_on_holidays,
            country: config.country,
            is_holiday_today: self.is_holiday_on(today),
            today_holiday_name: self.holiday_name(today),
            upcoming_holidays: self.upcoming_holidays(10, today),
            all_holidays: self.all_holidays(),
        }
    }
}

impl HolidayOracle for HolidayService {
    fn is_holiday_today(&self) -> bool {
        self.is_holiday_on(chrono::Local::now().date_naive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> (HolidayService, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(ConfigStore::open(dir.path().join("config.toml")));
        let service = HolidayService::open(dir.path().join("holidays.json"), config);
        (service, dir)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn calendar_entry_silences_the_day() {
        let (service, _dir) = service();
        let day = date(2025, 4, 23);
        assert!(!service.is_holiday_on(day));

        service.set_holiday(day, "National Sovereignty Day");
        assert!(service.is_holiday_on(day));
        assert_eq!(
            service.holiday_name(day).as_deref(),
            Some("National Sovereignty Day")
        );
        assert!(!service.is_holiday_on(date(2025, 4, 24)));
    }

    #[test]
    fn muted_holiday_runs_as_normal_day() {
        let (service, _dir) = service();
        let day = date(2025, 4, 23);
        service.set_holiday(day, "Holiday");

        service.set_holiday_muted("23.04.2025", true);
        assert!(!service.is_holiday_on(day));

        service.set_holiday_muted("23.04.2025", false);
        assert!(service.is_holiday_on(day));
    }

    #[test]
    fn disabling_the_feature_clears_holidays() {
        let (service, _dir) = service();
        let day = date(2025, 1, 1);
        service.set_holiday(day, "New Year");

        service.set_enabled(false);
        assert!(!service.is_holiday_on(day));
        service.set_enabled(true);

        service.set_skip_on_holidays(false);
        assert!(!service.is_holiday_on(day));
    }

    #[test]
    fn upcoming_sorted_and_limited() {
        let (service, _dir) = service();
        service.set_holiday(date(2025, 5, 19), "Commemoration Day");
        service.set_holiday(date(2025, 1, 1), "New Year");
        service.set_holiday(date(2025, 4, 23), "Sovereignty Day");

        let upcoming = service.upcoming_holidays(2, date(2025, 2, 1));
        assert_eq!(upcoming.len(), 2);
        assert_eq!(upcoming[0].date, "23.04.2025");
        assert_eq!(upcoming[1].date, "19.05.2025");
        assert_eq!(upcoming[0].days_until, 81);
    }

    #[test]
    fn calendar_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(ConfigStore::open(dir.path().join("config.toml")));
        let path = dir.path().join("holidays.json");
        {
            let service = HolidayService::open(path.clone(), config.clone());
            service.set_holiday(date(2025, 1, 1), "New Year");
        }
        let service = HolidayService::open(path, config);
        assert!(service.is_holiday_on(date(2025, 1, 1)));
        assert!(service.remove_holiday(date(2025, 1, 1)));
        assert!(!service.remove_holiday(date(2025, 1, 1)));
    }
}
