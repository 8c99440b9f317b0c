//! Schedule automaton
//!
//! A dedicated thread evaluates the weekly schedule against the wall clock
//! about once per second. Each tick detects activity starts and ends, fires
//! interim and birthday announcements, recomputes the next upcoming event,
//! and runs the background-music policy. Triggering is idempotent per
//! calendar date: every event key fires at most once per day no matter how
//! many ticks observe the matching minute.

pub mod hooks;

use belfry_common::events::{BelfryEvent, EventBus};
use belfry_common::schedule::{Activity, ActivityKind, DaySchedule, InterimAnnouncement, WeekSchedule};
use belfry_common::time::{date_key, weekday_index, TimeOfDay};
use belfry_common::{Error, Result};
use chrono::{NaiveDate, NaiveDateTime};
use hooks::{AudioSink, BirthdayOracle, HolidayOracle, ManualPlayerProbe, SpeechSynthesizer};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Whether an upcoming or fired event is an activity start or end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventEdge {
    Start,
    End,
}

/// The chronologically nearest future activity boundary today.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NextEvent {
    pub time: TimeOfDay,
    pub name: String,
    #[serde(rename = "type")]
    pub edge: EventEdge,
}

/// One row of the daily timeline view.
#[derive(Debug, Clone, Serialize)]
pub struct TimelineEntry {
    pub time: TimeOfDay,
    pub name: String,
    #[serde(rename = "type")]
    pub edge: EventEdge,
    pub activity_type: ActivityKind,
}

/// Status snapshot for the API.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub state: &'static str,
    pub in_activity: bool,
    pub current_activity: Option<String>,
    pub last_ended_activity: Option<String>,
    pub next_event: Option<NextEvent>,
    pub background_music_playing: bool,
    pub current_time: String,
    pub day_of_week: u8,
}

/// Timing knobs; tests shrink everything to near zero.
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Pause between ticks.
    pub tick_interval: Duration,
    /// Gap between a bell that played and the announcement that follows it.
    pub bell_grace: Duration,
    /// Wait before start-up reconciliation, so collaborators finish wiring.
    pub settle_delay: Duration,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            bell_grace: Duration::from_secs(2),
            settle_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Default)]
struct RuntimeState {
    in_activity: bool,
    current_activity: Option<Activity>,
    last_ended_activity: Option<Activity>,
    next_event: Option<NextEvent>,
    /// Event keys already fired on `fired_date`.
    fired_events: HashSet<String>,
    fired_date: Option<NaiveDate>,
    /// (name, minute) birthday keys already announced today.
    announced_birthdays: HashSet<String>,
    background_music_playing: bool,
}

enum Trigger {
    Start(Activity),
    End(Activity),
    Interim(InterimAnnouncement),
    Birthday(String),
}

pub struct Scheduler {
    schedule: Mutex<WeekSchedule>,
    schedule_path: std::path::PathBuf,
    state: Mutex<RuntimeState>,
    running: AtomicBool,
    thread: Mutex<Option<JoinHandle<()>>>,
    sink: Arc<dyn AudioSink>,
    holidays: Arc<dyn HolidayOracle>,
    birthdays: Arc<dyn BirthdayOracle>,
    manual: Arc<dyn ManualPlayerProbe>,
    synth: Arc<dyn SpeechSynthesizer>,
    events: EventBus,
    opts: SchedulerOptions,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        schedule_path: std::path::PathBuf,
        sink: Arc<dyn AudioSink>,
        holidays: Arc<dyn HolidayOracle>,
        birthdays: Arc<dyn BirthdayOracle>,
        manual: Arc<dyn ManualPlayerProbe>,
        synth: Arc<dyn SpeechSynthesizer>,
        events: EventBus,
        opts: SchedulerOptions,
    ) -> Arc<Self> {
        let schedule = WeekSchedule::load(&schedule_path);
        Arc::new(Self {
            schedule: Mutex::new(schedule),
            schedule_path,
            state: Mutex::new(RuntimeState::default()),
            running: AtomicBool::new(false),
            thread: Mutex::new(None),
            sink,
            holidays,
            birthdays,
            manual,
            synth,
            events,
            opts,
        })
    }

    /// Start the tick thread. Idempotent.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let scheduler = Arc::clone(self);
        let spawned = std::thread::Builder::new()
            .name("belfry-scheduler".to_string())
            .spawn(move || {
                std::thread::sleep(scheduler.opts.settle_delay);
                scheduler.reconcile_at(chrono::Local::now().naive_local());
                while scheduler.running.load(Ordering::SeqCst) {
                    scheduler.tick_at(chrono::Local::now().naive_local());
                    std::thread::sleep(scheduler.opts.tick_interval);
                }
            });
        match spawned {
            Ok(handle) => {
                *self.thread.lock().unwrap() = Some(handle);
                info!("scheduler started");
                self.events.emit(BelfryEvent::SchedulerStarted {
                    timestamp: chrono::Utc::now(),
                });
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                warn!("failed to spawn scheduler thread: {}", e);
            }
        }
    }

    /// Stop the tick thread and reset the music bookkeeping. Idempotent; the
    /// loop observes the flag within one iteration.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.state.lock().unwrap().background_music_playing = false;
        if let Some(handle) = self.thread.lock().unwrap().take() {
            let _ = handle.join();
        }
        info!("scheduler stopped");
        self.events.emit(BelfryEvent::SchedulerStopped {
            timestamp: chrono::Utc::now(),
        });
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Evaluate one tick at an explicit clock reading. The loop passes the
    /// local wall clock; tests drive this directly.
    pub fn tick_at(&self, now: NaiveDateTime) {
        let current = TimeOfDay::from_datetime(&now);
        let today = now.date();
        let dkey = date_key(&today);

        {
            // day rollover clears both dedup sets
            let mut st = self.state.lock().unwrap();
            if st.fired_date != Some(today) {
                st.fired_date = Some(today);
                st.fired_events.clear();
                st.announced_birthdays.clear();
            }
        }

        let day = self
            .schedule
            .lock()
            .unwrap()
            .day(weekday_index(&today))
            .cloned();
        let enabled = day.as_ref().map(|d| d.enabled).unwrap_or(false);
        if !enabled || self.holidays.is_holiday_today() {
            self.state.lock().unwrap().next_event = None;
            self.set_music(false);
            return;
        }
        let activities = day.map(|d| d.activities).unwrap_or_default();

        // Collect due triggers under the state lock (marking keys fired),
        // then run them with the lock released since cue playback blocks.
        let mut triggers: Vec<Trigger> = Vec::new();
        {
            let mut st = self.state.lock().unwrap();
            for activity in &activities {
                if activity.start_time == current {
                    let key = format!("{}_start_{}", activity.id, dkey);
                    if st.fired_events.insert(key) {
                        triggers.push(Trigger::Start(activity.clone()));
                    }
                }
                if activity.end_time == current {
                    let key = format!("{}_end_{}", activity.id, dkey);
                    if st.fired_events.insert(key) {
                        triggers.push(Trigger::End(activity.clone()));
                    }
                }
                for interim in &activity.interim_announcements {
                    if interim.enabled && interim.time == current {
                        let key = format!("{}_interim_{}", interim.id, dkey);
                        if st.fired_events.insert(key) {
                            triggers.push(Trigger::Interim(interim.clone()));
                        }
                    }
                }
            }
            for name in self.birthdays.due_now() {
                let key = format!(
                    "birthday_{}_{}_{:02}{:02}",
                    name,
                    dkey,
                    current.hour(),
                    current.minute()
                );
                if st.announced_birthdays.insert(key) {
                    triggers.push(Trigger::Birthday(name));
                }
            }
        }

        for trigger in triggers {
            match trigger {
                Trigger::Start(a) => self.trigger_activity_start(&a),
                Trigger::End(a) => self.trigger_activity_end(&a),
                Trigger::Interim(i) => self.trigger_interim(&i),
                Trigger::Birthday(name) => self.trigger_birthday(&name),
            }
        }

        self.state.lock().unwrap().next_event = find_next_event(&activities, current);
        self.manage_background_music(&activities, current);
    }

    /// Rebuild activity/music state from the clock after a (re)start,
    /// without replaying bells or announcements for events already past.
    pub fn reconcile_at(&self, now: NaiveDateTime) {
        let current = TimeOfDay::from_datetime(&now);
        let day = self
            .schedule
            .lock()
            .unwrap()
            .day(weekday_index(&now.date()))
            .cloned();
        let Some(day) = day else { return };
        if !day.enabled || self.holidays.is_holiday_today() || self.manual.is_active() {
            return;
        }

        if let Some(active) = day.activities.iter().find(|a| a.contains(current)) {
            info!("startup inside activity '{}', music stays off", active.name);
            let mut st = self.state.lock().unwrap();
            st.in_activity = true;
            st.current_activity = Some(active.clone());
            return;
        }

        let last_ended = day
            .activities
            .iter()
            .filter(|a| a.end_time <= current)
            .max_by_key(|a| a.end_time)
            .cloned();
        let wants_music = last_ended.as_ref().map(|a| a.play_music).unwrap_or(false);
        {
            let mut st = self.state.lock().unwrap();
            st.in_activity = false;
            st.last_ended_activity = last_ended;
        }
        if wants_music {
            debug!("startup in a break after a music-requesting activity");
            self.set_music(true);
        }
    }

    fn trigger_activity_start(&self, activity: &Activity) {
        info!("activity started: {}", activity.name);
        {
            let mut st = self.state.lock().unwrap();
            st.in_activity = true;
            st.current_activity = Some(activity.clone());
        }
        self.set_music(false);

        let mut bell_played = false;
        if let Some(sound) = &activity.start_sound_id {
            bell_played = self.sink.play_bell(sound);
        }
        if let Some(sound) = &activity.start_announcement_id {
            if bell_played {
                std::thread::sleep(self.opts.bell_grace);
            }
            self.sink.play_announcement(sound);
        }

        self.events.emit(BelfryEvent::ActivityStarted {
            activity_id: activity.id.clone(),
            name: activity.name.clone(),
            timestamp: chrono::Utc::now(),
        });
    }

    fn trigger_activity_end(&self, activity: &Activity) {
        info!("activity ended: {}", activity.name);

        let mut bell_played = false;
        if let Some(sound) = &activity.end_sound_id {
            bell_played = self.sink.play_bell(sound);
        }
        if let Some(sound) = &activity.end_announcement_id {
            if bell_played {
                std::thread::sleep(self.opts.bell_grace);
            }
            self.sink.play_announcement(sound);
        }

        {
            let mut st = self.state.lock().unwrap();
            st.in_activity = false;
            st.current_activity = None;
            st.last_ended_activity = Some(activity.clone());
        }
        if activity.play_music {
            self.start_music_checked();
        } else {
            self.set_music(false);
        }

        self.events.emit(BelfryEvent::ActivityEnded {
            activity_id: activity.id.clone(),
            name: activity.name.clone(),
            timestamp: chrono::Utc::now(),
        });
    }

    fn trigger_interim(&self, interim: &InterimAnnouncement) {
        info!("interim announcement at {}", interim.time);
        self.sink.play_announcement(&interim.sound_id);
    }

    fn trigger_birthday(&self, name: &str) {
        let text = self.birthdays.announcement_text(name);
        let stem = format!("birthday_{}", name.replace(' ', "_"));
        match self.synth.generate(&text, &stem) {
            Ok(path) => {
                info!("birthday announcement for {}", name);
                self.sink.play_announcement(&path.to_string_lossy());
                self.events.emit(BelfryEvent::BirthdayAnnounced {
                    name: name.to_string(),
                    timestamp: chrono::Utc::now(),
                });
            }
            Err(e) => warn!("birthday announcement for {} failed: {}", name, e),
        }
    }

    /// Background-music policy: music on iff we are outside every activity
    /// window and the most-recently-ended activity requested it. Skipped
    /// entirely while the manual player is active.
    fn manage_background_music(&self, activities: &[Activity], current: TimeOfDay) {
        if self.manual.is_active() {
            return;
        }
        if activities.iter().any(|a| a.contains(current)) {
            self.set_music(false);
            return;
        }
        let wants_music = {
            let mut st = self.state.lock().unwrap();
            if st.last_ended_activity.is_none() {
                // cold state (e.g. after restart): recompute lazily
                st.last_ended_activity = activities
                    .iter()
                    .filter(|a| a.end_time <= current)
                    .max_by_key(|a| a.end_time)
                    .cloned();
            }
            st.last_ended_activity
                .as_ref()
                .map(|a| a.play_music)
                .unwrap_or(false)
        };
        self.set_music(wants_music);
    }

    fn start_music_checked(&self) {
        if self.manual.is_active() {
            return;
        }
        self.set_music(true);
    }

    /// Flip the desired music state, calling the sink only on transitions.
    fn set_music(&self, on: bool) {
        let changed = {
            let mut st = self.state.lock().unwrap();
            if st.background_music_playing == on {
                false
            } else {
                st.background_music_playing = on;
                true
            }
        };
        if changed {
            if on {
                self.sink.start_background_music();
            } else {
                self.sink.stop_background_music();
            }
        }
    }

    // --- schedule access -------------------------------------------------

    pub fn get_schedule(&self) -> WeekSchedule {
        self.schedule.lock().unwrap().clone()
    }

    /// Replace the whole week and persist.
    pub fn update_schedule(&self, days: Vec<DaySchedule>) -> Result<()> {
        {
            let mut schedule = self.schedule.lock().unwrap();
            schedule.replace_all(days);
            schedule.save(&self.schedule_path)?;
        }
        self.emit_schedule_updated();
        Ok(())
    }

    /// Replace a single day and persist.
    pub fn update_day(&self, day: DaySchedule) -> Result<()> {
        {
            let mut schedule = self.schedule.lock().unwrap();
            schedule.replace_day(day)?;
            schedule.save(&self.schedule_path)?;
        }
        self.emit_schedule_updated();
        Ok(())
    }

    /// Add an activity, rejecting overlaps; persists on success.
    pub fn add_activity(&self, day_of_week: u8, activity: Activity) -> Result<()> {
        {
            let mut schedule = self.schedule.lock().unwrap();
            schedule.add_activity(day_of_week, activity)?;
            schedule.save(&self.schedule_path)?;
        }
        self.emit_schedule_updated();
        Ok(())
    }

    /// Remove an activity by id and persist.
    pub fn remove_activity(&self, day_of_week: u8, activity_id: &str) -> Result<()> {
        {
            let mut schedule = self.schedule.lock().unwrap();
            if !schedule.remove_activity(day_of_week, activity_id) {
                return Err(Error::NotFound(format!("activity {}", activity_id)));
            }
            schedule.save(&self.schedule_path)?;
        }
        self.emit_schedule_updated();
        Ok(())
    }

    fn emit_schedule_updated(&self) {
        self.events.emit(BelfryEvent::ScheduleUpdated {
            timestamp: chrono::Utc::now(),
        });
    }

    // --- snapshots -------------------------------------------------------

    pub fn status(&self) -> SchedulerStatus {
        let now = chrono::Local::now().naive_local();
        let st = self.state.lock().unwrap();
        SchedulerStatus {
            running: self.is_running(),
            state: if st.in_activity { "in_activity" } else { "idle" },
            in_activity: st.in_activity,
            current_activity: st.current_activity.as_ref().map(|a| a.name.clone()),
            last_ended_activity: st.last_ended_activity.as_ref().map(|a| a.name.clone()),
            next_event: st.next_event.clone(),
            background_music_playing: st.background_music_playing,
            current_time: now.format("%H:%M:%S").to_string(),
            day_of_week: weekday_index(&now.date()),
        }
    }

    /// Today's start/end boundaries, sorted chronologically.
    pub fn daily_timeline(&self) -> Vec<TimelineEntry> {
        let today = chrono::Local::now().date_naive();
        let day = self
            .schedule
            .lock()
            .unwrap()
            .day(weekday_index(&today))
            .cloned();
        let Some(day) = day else { return Vec::new() };

        let mut timeline: Vec<TimelineEntry> = Vec::new();
        for activity in &day.activities {
            timeline.push(TimelineEntry {
                time: activity.start_time,
                name: activity.name.clone(),
                edge: EventEdge::Start,
                activity_type: activity.kind,
            });
            timeline.push(TimelineEntry {
                time: activity.end_time,
                name: activity.name.clone(),
                edge: EventEdge::End,
                activity_type: activity.kind,
            });
        }
        timeline.sort_by_key(|e| e.time);
        timeline
    }
}

fn find_next_event(activities: &[Activity], current: TimeOfDay) -> Option<NextEvent> {
    let mut best: Option<NextEvent> = None;
    for activity in activities {
        for (time, edge) in [
            (activity.start_time, EventEdge::Start),
            (activity.end_time, EventEdge::End),
        ] {
            if time > current && best.as_ref().map(|b| time < b.time).unwrap_or(true) {
                best = Some(NextEvent {
                    time,
                    name: activity.name.clone(),
                    edge,
                });
            }
        }
    }
    best
}
