//! Application container
//!
//! Owns every long-lived component and the order they are built and torn
//! down in: config, audio engine, manual player, calendar services, TTS,
//! scheduler. The HTTP layer and tests receive this container instead of
//! reaching for globals.

use crate::audio::backend::MediaBackend;
use crate::audio::engine::{AudioEngine, EngineOptions};
use crate::audio::NullBackend;
use crate::player::{ManualPlayer, ReconnectOptions};
use crate::scheduler::hooks::{AudioSink, SpeechSynthesizer};
use crate::scheduler::{Scheduler, SchedulerOptions};
use crate::services::{BirthdayService, HolidayService};
use crate::tts::{CommandSynthesizer, DisabledSynthesizer};
use belfry_common::config::ConfigStore;
use belfry_common::events::EventBus;
use belfry_common::paths::DataLayout;
use belfry_common::Result;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{info, warn};

const TTS_FILE_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);
const MUSIC_EXTENSIONS: [&str; 5] = ["mp3", "wav", "ogg", "flac", "m4a"];

/// One media backend per lane (bell, announcement, music) plus one for the
/// manual player.
pub struct AppBackends {
    pub bell: Arc<dyn MediaBackend>,
    pub announcement: Arc<dyn MediaBackend>,
    pub music: Arc<dyn MediaBackend>,
    pub manual: Arc<dyn MediaBackend>,
}

impl AppBackends {
    /// Silent stubs for every lane; the coordination layer still runs.
    pub fn null() -> Self {
        Self {
            bell: Arc::new(NullBackend::new()),
            announcement: Arc::new(NullBackend::new()),
            music: Arc::new(NullBackend::new()),
            manual: Arc::new(NullBackend::new()),
        }
    }
}

pub struct App {
    pub layout: DataLayout,
    pub config: Arc<ConfigStore>,
    pub events: EventBus,
    pub engine: Arc<AudioEngine>,
    pub player: Arc<ManualPlayer>,
    pub birthdays: Arc<BirthdayService>,
    pub holidays: Arc<HolidayService>,
    pub synth: Arc<dyn SpeechSynthesizer>,
    pub scheduler: Arc<Scheduler>,
}

impl App {
    pub fn new(root: PathBuf, backends: AppBackends) -> Result<Arc<Self>> {
        let layout = DataLayout::new(root);
        layout.ensure_directories()?;
        let config = Arc::new(ConfigStore::open(layout.config_file()));
        let events = EventBus::new(100);

        let engine = AudioEngine::new(
            [backends.bell, backends.announcement, backends.music],
            config.clone(),
            layout.clone(),
            events.clone(),
            EngineOptions::default(),
        );
        let player = ManualPlayer::new(
            backends.manual,
            config.clone(),
            layout.clone(),
            ReconnectOptions::default(),
        );

        let birthdays = Arc::new(BirthdayService::open(layout.birthdays_file()));
        let holidays = Arc::new(HolidayService::open(layout.holidays_file(), config.clone()));

        let tts = Arc::new(CommandSynthesizer::new(config.clone(), layout.tts_dir()));
        tts.cleanup_old_files(TTS_FILE_MAX_AGE);
        let synth: Arc<dyn SpeechSynthesizer> = if config.get().tts.command.is_empty() {
            Arc::new(DisabledSynthesizer)
        } else {
            tts
        };

        let sink = Arc::new(EngineSink {
            engine: engine.clone(),
            config: config.clone(),
            layout: layout.clone(),
        });
        let scheduler = Scheduler::new(
            layout.schedule_file(),
            sink,
            holidays.clone(),
            birthdays.clone(),
            player.clone(),
            synth.clone(),
            events.clone(),
            SchedulerOptions::default(),
        );

        // When a music stream dies, fall back to the local library.
        {
            let weak: Weak<AudioEngine> = Arc::downgrade(&engine);
            let layout = layout.clone();
            engine.on_music_error(Box::new(move |source| {
                warn!("music source failed ({}), falling back to local files", source);
                if let Some(engine) = weak.upgrade() {
                    let files = local_music_files(&layout);
                    if files.is_empty() {
                        warn!("no local music files available for fallback");
                    } else if let Err(e) = engine.play_music_playlist(files) {
                        warn!("local music fallback failed: {}", e);
                    }
                }
            }));
        }

        Ok(Arc::new(Self {
            layout,
            config,
            events,
            engine,
            player,
            birthdays,
            holidays,
            synth,
            scheduler,
        }))
    }

    /// Start the automaton and, when configured, ring the startup chime.
    pub fn start(&self) {
        if self.config.get().startup.play_startup_sound {
            let chime = self.layout.system_dir().join("start.mp3");
            if chime.exists() {
                if let Err(e) = self.engine.play_bell(&chime.to_string_lossy(), false) {
                    warn!("startup sound failed: {}", e);
                }
            }
        }
        self.scheduler.start();
        info!("belfry is up, data root {}", self.layout.root.display());
    }

    /// Tear down in reverse dependency order.
    pub fn shutdown(&self) {
        self.scheduler.stop();
        self.engine.stop_all();
        self.player.stop();
        info!("belfry shut down");
    }
}

/// Adapts the channel arbiter to the scheduler's [`AudioSink`] seam, adding
/// the break-music source selection: configured radio stream first, local
/// shuffled playlist otherwise.
pub struct EngineSink {
    engine: Arc<AudioEngine>,
    config: Arc<ConfigStore>,
    layout: DataLayout,
}

impl AudioSink for EngineSink {
    fn play_bell(&self, sound_id: &str) -> bool {
        match self.engine.play_bell(sound_id, true) {
            Ok(()) => true,
            Err(e) => {
                warn!("bell {} did not play: {}", sound_id, e);
                false
            }
        }
    }

    fn play_announcement(&self, sound_id: &str) -> bool {
        match self.engine.play_announcement(sound_id, true) {
            Ok(()) => true,
            Err(e) => {
                warn!("announcement {} did not play: {}", sound_id, e);
                false
            }
        }
    }

    fn start_background_music(&self) {
        let radio = self.config.get().radio;
        if radio.enabled && !radio.url.is_empty() {
            match self.engine.play_music(&radio.url, true) {
                Ok(()) => return,
                Err(e) => warn!("radio stream {} did not start: {}", radio.url, e),
            }
        }
        let files = local_music_files(&self.layout);
        if files.is_empty() {
            warn!("no local music files for break music");
            return;
        }
        if let Err(e) = self.engine.play_music_playlist(files) {
            warn!("break music did not start: {}", e);
        }
    }

    fn stop_background_music(&self) {
        self.engine.stop_music();
    }
}

fn local_music_files(layout: &DataLayout) -> Vec<String> {
    let mut files = Vec::new();
    if let Ok(entries) = std::fs::read_dir(layout.music_dir()) {
        for entry in entries.flatten() {
            let path = entry.path();
            let is_music = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| MUSIC_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if is_music {
                files.push(path.to_string_lossy().to_string());
            }
        }
    }
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> (Arc<App>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let app = App::new(dir.path().join("root"), AppBackends::null()).unwrap();
        (app, dir)
    }

    #[test]
    fn construction_creates_data_tree() {
        let (app, _dir) = app();
        assert!(app.layout.music_dir().is_dir());
        assert!(app.layout.system_dir().is_dir());
        assert!(!app.scheduler.is_running());
    }

    #[test]
    fn start_and_shutdown_round_trip() {
        let (app, _dir) = app();
        app.start();
        assert!(app.scheduler.is_running());
        app.shutdown();
        assert!(!app.scheduler.is_running());
    }

    #[test]
    fn local_music_listing_filters_extensions() {
        let (app, _dir) = app();
        std::fs::write(app.layout.music_dir().join("a.mp3"), b"x").unwrap();
        std::fs::write(app.layout.music_dir().join("b.txt"), b"x").unwrap();
        let files = local_music_files(&app.layout);
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("a.mp3"));
    }
}
