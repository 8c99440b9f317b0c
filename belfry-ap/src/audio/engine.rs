//! Channel arbiter
//!
//! Owns the three lanes and enforces priority: bell > announcement > music.
//! Bells pre-empt everything; announcements wait for bells and pre-empt
//! music; music never pre-empts either. Music is "ducked" (paused and
//! remembered) around higher-priority playback and resumed afterwards.

use crate::audio::backend::MediaBackend;
use crate::audio::channel::{Channel, ChannelStatus};
use belfry_common::config::ConfigStore;
use belfry_common::events::{BelfryEvent, ChannelId, EventBus};
use belfry_common::paths::DataLayout;
use belfry_common::{Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tracing::{info, warn};

/// Hook invoked when a lane fails mid-flight (dead stream, backend error).
pub type ChannelErrorHook = Box<dyn Fn(&str) + Send + Sync>;

/// Tunables for the arbiter's polling waits.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Granularity of "block until lane idle" waits.
    pub poll_interval: Duration,
    /// How long a stream gets to establish before the liveness probe fires.
    pub stream_probe_delay: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            stream_probe_delay: Duration::from_secs(3),
        }
    }
}

/// Snapshot of all lanes.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub channels: BTreeMap<String, ChannelStatus>,
}

pub struct AudioEngine {
    bell: Arc<Channel>,
    announcement: Arc<Channel>,
    music: Arc<Channel>,
    /// Set while music has been auto-paused for a bell or announcement.
    music_ducked: Mutex<bool>,
    /// Only the music lane has a consumer (radio fallback); other lanes log.
    music_error_hook: Mutex<Option<ChannelErrorHook>>,
    config: Arc<ConfigStore>,
    layout: DataLayout,
    events: EventBus,
    opts: EngineOptions,
}

impl AudioEngine {
    pub fn new(
        backends: [Arc<dyn MediaBackend>; 3],
        config: Arc<ConfigStore>,
        layout: DataLayout,
        events: EventBus,
        opts: EngineOptions,
    ) -> Arc<Self> {
        let volumes = config.get().volumes;
        let [bell_backend, announcement_backend, music_backend] = backends;
        Arc::new(Self {
            bell: Channel::new(ChannelId::Bell, bell_backend, volumes.bell),
            announcement: Channel::new(ChannelId::Announcement, announcement_backend, volumes.announcement),
            music: Channel::new(ChannelId::Music, music_backend, volumes.music),
            music_ducked: Mutex::new(false),
            music_error_hook: Mutex::new(None),
            config,
            layout,
            events,
            opts,
        })
    }

    /// Register the music-lane error consumer.
    pub fn on_music_error(&self, hook: ChannelErrorHook) {
        *self.music_error_hook.lock().unwrap() = Some(hook);
    }

    /// Resolve a sound id to a playable path: absolute paths pass through,
    /// otherwise the preferred library is searched first, then all of them.
    fn resolve_source(&self, filename: &str, preferred: &Path) -> Result<PathBuf> {
        if filename.is_empty() {
            return Err(Error::MissingSource("empty source".to_string()));
        }
        let direct = Path::new(filename);
        if direct.is_absolute() {
            return if direct.exists() {
                Ok(direct.to_path_buf())
            } else {
                Err(Error::MissingSource(filename.to_string()))
            };
        }

        let candidate = preferred.join(filename);
        if candidate.exists() {
            return Ok(candidate);
        }
        for dir in [
            self.layout.bells_dir(),
            self.layout.announcements_dir(),
            self.layout.music_dir(),
        ] {
            let candidate = dir.join(filename);
            if candidate.exists() {
                return Ok(candidate);
            }
        }
        Err(Error::MissingSource(filename.to_string()))
    }

    /// Block until the lane reports not-playing. A concurrent `stop_all`
    /// makes the lane idle, so the waiter exits cleanly either way.
    fn wait_until_idle(&self, channel: &Channel) {
        while channel.is_playing() {
            std::thread::sleep(self.opts.poll_interval);
        }
    }

    /// Play a bell, the highest-priority cue.
    ///
    /// Ducks music, unconditionally stops any announcement, then plays. When
    /// `blocking`, returns only after the bell lane goes idle and ducked
    /// music has been resumed.
    pub fn play_bell(&self, source: &str, blocking: bool) -> Result<()> {
        let path = self.resolve_source(source, &self.layout.bells_dir())?;

        if self.music.is_playing() {
            self.music.pause();
            *self.music_ducked.lock().unwrap() = true;
        }
        self.announcement.stop(true);

        self.bell.play(&path.to_string_lossy(), false, false)?;
        self.events.emit(BelfryEvent::BellStarted {
            source: source.to_string(),
            timestamp: chrono::Utc::now(),
        });

        if blocking {
            self.wait_until_idle(&self.bell);
            self.resume_ducked_music();
            self.events.emit(BelfryEvent::BellEnded {
                source: source.to_string(),
                timestamp: chrono::Utc::now(),
            });
        }
        Ok(())
    }

    /// Play an announcement.
    ///
    /// Waits out any in-flight bell first (bell always wins), ducks music
    /// unless it is already ducked for a pending bell, then plays. When
    /// `blocking`, resumes music only if this call ducked it, guarding
    /// against a double resume while a bell's ducking is still pending.
    pub fn play_announcement(&self, source: &str, blocking: bool) -> Result<()> {
        self.wait_until_idle(&self.bell);

        let path = self.resolve_source(source, &self.layout.announcements_dir())?;

        let mut ducked_here = false;
        {
            let mut ducked = self.music_ducked.lock().unwrap();
            if self.music.is_playing() && !*ducked {
                self.music.pause();
                *ducked = true;
                ducked_here = true;
            }
        }

        self.announcement.play(&path.to_string_lossy(), false, false)?;
        self.events.emit(BelfryEvent::AnnouncementStarted {
            source: source.to_string(),
            timestamp: chrono::Utc::now(),
        });

        if blocking {
            self.wait_until_idle(&self.announcement);
            if ducked_here {
                self.resume_ducked_music();
            }
        }
        Ok(())
    }

    fn resume_ducked_music(&self) {
        let mut ducked = self.music_ducked.lock().unwrap();
        if *ducked {
            self.music.resume();
            *ducked = false;
        }
    }

    /// Play background music. Refused outright while a bell or announcement
    /// is playing; music never queues behind higher-priority lanes.
    pub fn play_music(self: &Arc<Self>, source: &str, is_stream: bool) -> Result<()> {
        if self.bell.is_playing() || self.announcement.is_playing() {
            return Err(Error::Playback(
                "music refused: higher-priority channel active".to_string(),
            ));
        }

        if is_stream {
            self.music.play(source, true, false)?;
            self.spawn_stream_probe(source.to_string());
        } else {
            let path = self.resolve_source(source, &self.layout.music_dir())?;
            self.music.play(&path.to_string_lossy(), false, false)?;
        }

        self.events.emit(BelfryEvent::MusicStarted {
            source: source.to_string(),
            timestamp: chrono::Utc::now(),
        });
        Ok(())
    }

    /// Delayed liveness check for network streams: if playback never
    /// establishes, escalate through the music error hook.
    fn spawn_stream_probe(self: &Arc<Self>, source: String) {
        let weak: Weak<AudioEngine> = Arc::downgrade(self);
        let delay = self.opts.stream_probe_delay;
        std::thread::spawn(move || {
            std::thread::sleep(delay);
            if let Some(engine) = weak.upgrade() {
                let still_current = engine.music.current_source().as_deref() == Some(source.as_str());
                if still_current && !engine.music.is_playing() {
                    warn!("music stream never established: {}", source);
                    engine.handle_channel_error(ChannelId::Music, &source);
                }
            }
        });
    }

    /// Single failure-surfacing point for lane errors.
    fn handle_channel_error(&self, channel: ChannelId, source: &str) {
        self.events.emit(BelfryEvent::ChannelError {
            channel,
            source: source.to_string(),
            timestamp: chrono::Utc::now(),
        });
        match channel {
            ChannelId::Music => {
                if let Some(hook) = self.music_error_hook.lock().unwrap().as_ref() {
                    hook(source);
                }
            }
            _ => warn!("[{}] playback error for {}", channel, source),
        }
    }

    /// Start a break-music rotation. Refused while a higher-priority lane is
    /// active, and also while a playlist rotation is already running. Break
    /// playlists are always shuffled.
    pub fn play_music_playlist(&self, files: Vec<String>) -> Result<()> {
        if self.bell.is_playing() || self.announcement.is_playing() {
            return Err(Error::Playback(
                "music refused: higher-priority channel active".to_string(),
            ));
        }
        if self.music.is_playlist_mode() && self.music.is_playing() {
            return Err(Error::Playback("music playlist already running".to_string()));
        }

        self.music.play_playlist(files, true)?;
        self.events.emit(BelfryEvent::MusicStarted {
            source: "playlist".to_string(),
            timestamp: chrono::Utc::now(),
        });
        Ok(())
    }

    pub fn stop_music(&self) {
        self.music.stop(true);
        *self.music_ducked.lock().unwrap() = false;
        self.events.emit(BelfryEvent::MusicStopped {
            timestamp: chrono::Utc::now(),
        });
    }

    pub fn stop_all(&self) {
        info!("stopping all channels");
        self.bell.stop(true);
        self.announcement.stop(true);
        self.music.stop(true);
        *self.music_ducked.lock().unwrap() = false;
    }

    fn channel(&self, id: ChannelId) -> &Arc<Channel> {
        match id {
            ChannelId::Bell => &self.bell,
            ChannelId::Announcement => &self.announcement,
            ChannelId::Music => &self.music,
        }
    }

    /// Set a lane volume and persist it into the configuration document.
    pub fn set_volume(&self, id: ChannelId, volume: u8) {
        let volume = volume.min(100);
        self.channel(id).set_volume(volume);
        self.config.update(|c| match id {
            ChannelId::Bell => c.volumes.bell = volume,
            ChannelId::Announcement => c.volumes.announcement = volume,
            ChannelId::Music => c.volumes.music = volume,
        });
        self.events.emit(BelfryEvent::VolumeChanged {
            channel: id,
            volume,
            timestamp: chrono::Utc::now(),
        });
    }

    pub fn get_volume(&self, id: ChannelId) -> u8 {
        self.channel(id).volume()
    }

    pub fn music_is_playing(&self) -> bool {
        self.music.is_playing()
    }

    pub fn status(&self) -> EngineStatus {
        let mut channels = BTreeMap::new();
        channels.insert("bell".to_string(), self.bell.status());
        channels.insert("announcement".to_string(), self.announcement.status());
        channels.insert("music".to_string(), self.music.status());
        EngineStatus { channels }
    }

    #[cfg(test)]
    pub(crate) fn music_ducked(&self) -> bool {
        *self.music_ducked.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::backend::testing::MockBackend;
    use belfry_common::config::ConfigStore;

    struct Rig {
        engine: Arc<AudioEngine>,
        bell: Arc<MockBackend>,
        announcement: Arc<MockBackend>,
        music: Arc<MockBackend>,
        layout: DataLayout,
        _dir: tempfile::TempDir,
    }

    fn rig() -> Rig {
        let dir = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(dir.path().to_path_buf());
        layout.ensure_directories().unwrap();
        let config = Arc::new(ConfigStore::open(layout.config_file()));

        let bell = MockBackend::new();
        let announcement = MockBackend::new();
        let music = MockBackend::new();
        let engine = AudioEngine::new(
            [bell.clone(), announcement.clone(), music.clone()],
            config,
            layout.clone(),
            EventBus::new(100),
            EngineOptions {
                poll_interval: Duration::from_millis(1),
                stream_probe_delay: Duration::from_millis(20),
            },
        );
        Rig {
            engine,
            bell,
            announcement,
            music,
            layout,
            _dir: dir,
        }
    }

    fn add_sound(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"x").unwrap();
    }

    #[test]
    fn bell_with_missing_source_fails_cleanly() {
        let r = rig();
        let err = r.engine.play_bell("missing.mp3", true).unwrap_err();
        assert!(matches!(err, Error::MissingSource(_)));
        assert!(r.bell.play_log.lock().unwrap().is_empty());
        assert!(!r.engine.music_ducked());
    }

    #[test]
    fn bell_ducks_music_and_resumes_after() {
        let r = rig();
        add_sound(&r.layout.bells_dir(), "bell1.mp3");
        add_sound(&r.layout.music_dir(), "song.mp3");

        r.engine.play_music("song.mp3", false).unwrap();
        assert!(r.engine.music_is_playing());

        r.bell.set_playing_polls(3);
        r.engine.play_bell("bell1.mp3", true).unwrap();

        assert_eq!(r.music.pause_count(), 1);
        assert_eq!(r.music.resume_count(), 1);
        assert!(!r.engine.music_ducked());
        assert!(r.engine.music_is_playing());
    }

    #[test]
    fn bell_stops_in_flight_announcement() {
        let r = rig();
        add_sound(&r.layout.bells_dir(), "bell1.mp3");
        add_sound(&r.layout.announcements_dir(), "ann.mp3");

        r.engine.play_announcement("ann.mp3", false).unwrap();
        assert!(r.announcement.current_source().is_some());

        r.bell.set_playing_polls(1);
        r.engine.play_bell("bell1.mp3", true).unwrap();
        assert!(r.announcement.current_source().is_none());
        assert!(r.announcement.stop_count() >= 1);
    }

    #[test]
    fn announcement_resumes_music_it_ducked() {
        let r = rig();
        add_sound(&r.layout.announcements_dir(), "ann.mp3");
        add_sound(&r.layout.music_dir(), "song.mp3");

        r.engine.play_music("song.mp3", false).unwrap();
        r.announcement.set_playing_polls(2);
        r.engine.play_announcement("ann.mp3", true).unwrap();

        assert_eq!(r.music.pause_count(), 1);
        assert_eq!(r.music.resume_count(), 1);
        assert!(!r.engine.music_ducked());
    }

    #[test]
    fn music_refused_while_bell_playing() {
        let r = rig();
        add_sound(&r.layout.bells_dir(), "bell1.mp3");
        add_sound(&r.layout.music_dir(), "song.mp3");

        r.bell.set_playing_polls(usize::MAX);
        r.engine.play_bell("bell1.mp3", false).unwrap();

        let err = r.engine.play_music("song.mp3", false).unwrap_err();
        assert!(matches!(err, Error::Playback(_)));
        assert!(r.music.play_log.lock().unwrap().is_empty());
    }

    #[test]
    fn playlist_refused_when_rotation_already_running() {
        let r = rig();
        let dir = r.layout.music_dir();
        add_sound(&dir, "a.mp3");
        add_sound(&dir, "b.mp3");
        let files: Vec<String> = ["a.mp3", "b.mp3"]
            .iter()
            .map(|n| dir.join(n).to_string_lossy().to_string())
            .collect();

        r.music.set_playing_polls(usize::MAX);
        r.engine.play_music_playlist(files.clone()).unwrap();
        let err = r.engine.play_music_playlist(files).unwrap_err();
        assert!(matches!(err, Error::Playback(_)));
    }

    #[test]
    fn stream_liveness_failure_fires_music_hook() {
        let r = rig();
        let failures: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = failures.clone();
        r.engine.on_music_error(Box::new(move |source| {
            sink.lock().unwrap().push(source.to_string());
        }));

        // Stream "starts" but dies before the probe runs: one poll is
        // consumed here, leaving the backend not-playing with the source
        // still current.
        r.music.set_playing_polls(1);
        r.engine.play_music("http://radio.example/dead", true).unwrap();
        assert!(r.music.is_playing());
        assert!(!r.music.is_playing());

        std::thread::sleep(Duration::from_millis(80));
        let seen = failures.lock().unwrap();
        assert!(seen.iter().any(|s| s == "http://radio.example/dead"));
    }

    #[test]
    fn stop_music_clears_ducked_flag() {
        let r = rig();
        add_sound(&r.layout.bells_dir(), "bell1.mp3");
        add_sound(&r.layout.music_dir(), "song.mp3");

        r.engine.play_music("song.mp3", false).unwrap();
        // non-blocking bell leaves ducking pending
        r.engine.play_bell("bell1.mp3", false).unwrap();
        assert!(r.engine.music_ducked());

        r.engine.stop_music();
        assert!(!r.engine.music_ducked());
    }

    #[test]
    fn set_volume_persists_to_config() {
        let r = rig();
        r.engine.set_volume(ChannelId::Announcement, 45);
        assert_eq!(r.engine.get_volume(ChannelId::Announcement), 45);
        assert_eq!(r.engine.config.get().volumes.announcement, 45);

        // clamped
        r.engine.set_volume(ChannelId::Bell, 200);
        assert_eq!(r.engine.get_volume(ChannelId::Bell), 100);
    }
}
