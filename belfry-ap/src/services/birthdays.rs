//! Birthday announcement service
//!
//! Keeps a JSON document of people and announcement slots. The scheduler
//! asks, once per tick, which names are due at the current minute; the
//! template is rendered per person and spoken through TTS.

use crate::scheduler::hooks::BirthdayOracle;
use belfry_common::time::TimeOfDay;
use belfry_common::{Error, Result};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Person {
    pub name: String,
    /// "DD.MM" or "DD.MM.YYYY"
    pub date: String,
}

/// The persisted birthday document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BirthdayBook {
    pub enabled: bool,
    pub announcement_times: Vec<TimeOfDay>,
    /// `{name}` is substituted per person.
    pub template: String,
    pub people: Vec<Person>,
}

impl Default for BirthdayBook {
    fn default() -> Self {
        Self {
            enabled: true,
            announcement_times: vec![
                TimeOfDay::new(9, 0).unwrap(),
                TimeOfDay::new(12, 0).unwrap(),
            ],
            template: "Today is {name}'s birthday. We wish them a happy birthday!".to_string(),
            people: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UpcomingBirthday {
    pub name: String,
    pub date: String,
    pub days_until: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BirthdayStatus {
    pub enabled: bool,
    pub announcement_times: Vec<TimeOfDay>,
    pub template: String,
    pub total_people: usize,
    pub people: Vec<Person>,
    pub todays_birthdays: Vec<Person>,
    pub upcoming_birthdays: Vec<UpcomingBirthday>,
}

pub struct BirthdayService {
    path: PathBuf,
    data: Mutex<BirthdayBook>,
}

/// Normalize a birth date to "DD.MM" or "DD.MM.YYYY".
/// Accepts ISO "YYYY-MM-DD" and already-dotted forms.
fn normalize_date(input: &str) -> Result<String> {
    let input = input.trim();
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        return Ok(date.format("%d.%m.%Y").to_string());
    }
    let parts: Vec<&str> = input.split('.').collect();
    let valid = match parts.as_slice() {
        [d, m] => is_day(d) && is_month(m),
        [d, m, y] => is_day(d) && is_month(m) && y.len() == 4 && y.parse::<u16>().is_ok(),
        _ => false,
    };
    if valid {
        Ok(input.to_string())
    } else {
        Err(Error::BadRequest(format!("unrecognized birth date: {}", input)))
    }
}

fn is_day(s: &str) -> bool {
    s.len() == 2 && matches!(s.parse::<u8>(), Ok(1..=31))
}

fn is_month(s: &str) -> bool {
    s.len() == 2 && matches!(s.parse::<u8>(), Ok(1..=12))
}

/// "DD.MM" prefix of a stored date.
fn day_month(date: &str) -> Option<(u8, u8)> {
    let mut parts = date.split('.');
    let day = parts.next()?.parse().ok()?;
    let month = parts.next()?.parse().ok()?;
    Some((day, month))
}

impl BirthdayService {
    pub fn open(path: PathBuf) -> Self {
        let data = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(book) => book,
                Err(e) => {
                    warn!("birthday document {} is malformed: {}", path.display(), e);
                    BirthdayBook::default()
                }
            },
            Err(_) => BirthdayBook::default(),
        };
        Self {
            path,
            data: Mutex::new(data),
        }
    }

    fn save_locked(&self, data: &BirthdayBook) {
        let result = (|| -> Result<()> {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&self.path, serde_json::to_string_pretty(data)?)?;
            Ok(())
        })();
        if let Err(e) = result {
            warn!("failed to persist birthdays to {}: {}", self.path.display(), e);
        }
    }

    /// Add a person, or update their date if the name already exists
    /// (case-insensitive).
    pub fn add_person(&self, name: &str, birth_date: &str) -> Result<()> {
        let date = normalize_date(birth_date)?;
        let mut data = self.data.lock().unwrap();
        if let Some(person) = data
            .people
            .iter_mut()
            .find(|p| p.name.eq_ignore_ascii_case(name))
        {
            person.date = date;
        } else {
            data.people.push(Person {
                name: name.to_string(),
                date,
            });
        }
        self.save_locked(&data);
        Ok(())
    }

    /// Remove by name (case-insensitive). Returns whether anyone was removed.
    pub fn remove_person(&self, name: &str) -> bool {
        let mut data = self.data.lock().unwrap();
        let before = data.people.len();
        data.people.retain(|p| !p.name.eq_ignore_ascii_case(name));
        let removed = data.people.len() < before;
        if removed {
            self.save_locked(&data);
        }
        removed
    }

    /// Import "name,date" lines; blank lines and `#` comments are skipped.
    /// Returns how many rows were imported.
    pub fn import_csv(&self, content: &str) -> usize {
        let mut imported = 0;
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((name, date)) = line.split_once(',') {
                let name = name.trim();
                if name.is_empty() {
                    continue;
                }
                match self.add_person(name, date.trim()) {
                    Ok(()) => imported += 1,
                    Err(e) => warn!("skipping birthday row {:?}: {}", line, e),
                }
            }
        }
        imported
    }

    pub fn todays_birthdays(&self, today: NaiveDate) -> Vec<Person> {
        let key = (today.day() as u8, today.month() as u8);
        self.data
            .lock()
            .unwrap()
            .people
            .iter()
            .filter(|p| day_month(&p.date) == Some(key))
            .cloned()
            .collect()
    }

    /// Birthdays within the next `days` days, nearest first.
    pub fn upcoming_birthdays(&self, days: i64, today: NaiveDate) -> Vec<UpcomingBirthday> {
        let mut upcoming: Vec<UpcomingBirthday> = Vec::new();
        for person in &self.data.lock().unwrap().people {
            let Some((day, month)) = day_month(&person.date) else {
                continue;
            };
            let Some(mut birthday) =
                NaiveDate::from_ymd_opt(today.year(), month as u32, day as u32)
            else {
                continue;
            };
            if birthday < today {
                let Some(next_year) =
                    NaiveDate::from_ymd_opt(today.year() + 1, month as u32, day as u32)
                else {
                    continue;
                };
                birthday = next_year;
            }
            let days_until = (birthday - today).num_days();
            if days_until <= days {
                upcoming.push(UpcomingBirthday {
                    name: person.name.clone(),
                    date: person.date.clone(),
                    days_until,
                });
            }
        }
        upcoming.sort_by_key(|b| b.days_until);
        upcoming
    }

    /// Names due at an explicit clock reading: the minute must be one of the
    /// configured slots, and the person's birthday must be today.
    pub fn due_at(&self, now: NaiveDateTime) -> Vec<String> {
        let slot_matches = {
            let data = self.data.lock().unwrap();
            data.enabled
                && data
                    .announcement_times
                    .contains(&TimeOfDay::from_datetime(&now))
        };
        if !slot_matches {
            return Vec::new();
        }
        self.todays_birthdays(now.date())
            .into_iter()
            .map(|p| p.name)
            .collect()
    }

    pub fn set_enabled(&self, enabled: bool) {
        let mut data = self.data.lock().unwrap();
        data.enabled = enabled;
        self.save_locked(&data);
    }

    pub fn set_announcement_times(&self, times: Vec<TimeOfDay>) {
        let mut data = self.data.lock().unwrap();
        data.announcement_times = times;
        self.save_locked(&data);
    }

    pub fn set_template(&self, template: String) {
        let mut data = self.data.lock().unwrap();
        data.template = template;
        self.save_locked(&data);
    }

    pub fn all_people(&self) -> Vec<Person> {
        self.data.lock().unwrap().people.clone()
    }

    pub fn status(&self) -> BirthdayStatus {
        let today = chrono::Local::now().date_naive();
        let data = self.data.lock().unwrap().clone();
        BirthdayStatus {
            enabled: data.enabled,
            announcement_times: data.announcement_times.clone(),
            template: data.template.clone(),
            total_people: data.people.len(),
            people: data.people,
            todays_birthdays: self.todays_birthdays(today),
            upcoming_birthdays: self.upcoming_birthdays(7, today),
        }
    }
}

impl BirthdayOracle for BirthdayService {
    fn due_now(&self) -> Vec<String> {
        self.due_at(chrono::Local::now().naive_local())
    }

    fn announcement_text(&self, name: &str) -> String {
        self.data
            .lock()
            .unwrap()
            .template
            .replace("{name}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> (BirthdayService, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let service = BirthdayService::open(dir.path().join("birthdays.json"));
        (service, dir)
    }

    fn at(date: (i32, u32, u32), time: (u32, u32)) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(date.0, date.1, date.2)
            .unwrap()
            .and_hms_opt(time.0, time.1, 0)
            .unwrap()
    }

    #[test]
    fn date_normalization() {
        assert_eq!(normalize_date("2000-03-07").unwrap(), "07.03.2000");
        assert_eq!(normalize_date("07.03").unwrap(), "07.03");
        assert_eq!(normalize_date("07.03.2000").unwrap(), "07.03.2000");
        assert!(normalize_date("March 7th").is_err());
        assert!(normalize_date("32.01").is_err());
        assert!(normalize_date("01.13").is_err());
    }

    #[test]
    fn add_updates_existing_name_case_insensitively() {
        let (service, _dir) = service();
        service.add_person("Ali Veli", "07.03.1990").unwrap();
        service.add_person("ALI VELI", "08.04.1990").unwrap();
        let people = service.all_people();
        assert_eq!(people.len(), 1);
        assert_eq!(people[0].date, "08.04.1990");
    }

    #[test]
    fn due_at_requires_slot_and_date_match() {
        let (service, _dir) = service();
        service.add_person("Ali", "07.03.1990").unwrap();
        service.add_person("Ayse", "07.03").unwrap();
        service.add_person("Fatma", "08.03").unwrap();

        // default slots are 09:00 and 12:00
        let due = service.due_at(at((2025, 3, 7), (9, 0)));
        assert_eq!(due, vec!["Ali", "Ayse"]);

        assert!(service.due_at(at((2025, 3, 7), (9, 1))).is_empty());
        assert!(service.due_at(at((2025, 3, 8), (9, 0))).is_empty());

        service.set_enabled(false);
        assert!(service.due_at(at((2025, 3, 7), (9, 0))).is_empty());
    }

    #[test]
    fn csv_import_counts_and_skips_comments() {
        let (service, _dir) = service();
        let imported = service.import_csv(
            "# staff birthdays\nAli,07.03.1990\n\nAyse,2000-05-12\nbroken line\nVeli,not a date\n",
        );
        assert_eq!(imported, 2);
        assert_eq!(service.all_people().len(), 2);
    }

    #[test]
    fn upcoming_wraps_into_next_year() {
        let (service, _dir) = service();
        service.add_person("Ali", "02.01").unwrap();
        let upcoming = service.upcoming_birthdays(30, NaiveDate::from_ymd_opt(2025, 12, 20).unwrap());
        assert_eq!(upcoming.len(), 1);
        assert_eq!(upcoming[0].days_until, 13);
    }

    #[test]
    fn template_renders_name() {
        let (service, _dir) = service();
        service.set_template("Cheers, {name}!".to_string());
        assert_eq!(service.announcement_text("Ali"), "Cheers, Ali!");
    }

    #[test]
    fn document_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("birthdays.json");
        {
            let service = BirthdayService::open(path.clone());
            service.add_person("Ali", "07.03").unwrap();
            service.set_announcement_times(vec![TimeOfDay::new(10, 30).unwrap()]);
        }
        let reloaded = BirthdayService::open(path);
        assert_eq!(reloaded.all_people().len(), 1);
        assert!(reloaded
            .due_at(at((2025, 3, 7), (10, 30)))
            .contains(&"Ali".to_string()));
    }
}
