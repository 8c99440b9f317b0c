//! Manual player
//!
//! A user-controlled audio lane outside the bell/announcement/music priority
//! hierarchy. Plays local files, internet radio, and playlists. The scheduler
//! only probes it (is anything playing?) so automated background music never
//! clobbers user-initiated playback.

use crate::audio::backend::MediaBackend;
use crate::scheduler::hooks::ManualPlayerProbe;
use belfry_common::config::ConfigStore;
use belfry_common::paths::DataLayout;
use belfry_common::{Error, Result};
use rand::seq::SliceRandom;
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

const MUSIC_EXTENSIONS: [&str; 5] = ["mp3", "wav", "ogg", "flac", "m4a"];

/// What kind of source the player currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    None,
    File,
    Radio,
    Playlist,
}

/// Radio reconnect behavior. The defaults match a human-scale recovery
/// window; tests shrink them.
#[derive(Debug, Clone)]
pub struct ReconnectOptions {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for ReconnectOptions {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            delay: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlayerStatus {
    pub playing: bool,
    pub paused: bool,
    pub external_paused: bool,
    pub volume: u8,
    pub source: Option<String>,
    #[serde(rename = "type")]
    pub kind: SourceKind,
    pub position: f64,
    pub duration_ms: u64,
    pub playlist_index: Option<usize>,
    pub playlist_length: usize,
    pub shuffle: bool,
    pub repeat: bool,
}

/// Entry of the browsable music library.
#[derive(Debug, Clone, Serialize)]
pub struct MusicFile {
    pub name: String,
    pub path: String,
    pub size: u64,
}

struct PlayerInner {
    volume: u8,
    is_paused: bool,
    external_paused: bool,
    current_source: Option<String>,
    kind: SourceKind,
    playlist: Vec<String>,
    playlist_index: usize,
    shuffle: bool,
    repeat: bool,
    radio_url: Option<String>,
}

pub struct ManualPlayer {
    backend: Arc<dyn MediaBackend>,
    inner: Mutex<PlayerInner>,
    config: Arc<ConfigStore>,
    layout: DataLayout,
    reconnect: ReconnectOptions,
    /// Bumped by every stop/play; a stale reconnect loop observes the bump
    /// and gives up.
    generation: AtomicU64,
}

impl ManualPlayer {
    pub fn new(
        backend: Arc<dyn MediaBackend>,
        config: Arc<ConfigStore>,
        layout: DataLayout,
        reconnect: ReconnectOptions,
    ) -> Arc<Self> {
        let volume = config.get().volumes.manual;
        let player = Arc::new(Self {
            backend,
            inner: Mutex::new(PlayerInner {
                volume,
                is_paused: false,
                external_paused: false,
                current_source: None,
                kind: SourceKind::None,
                playlist: Vec::new(),
                playlist_index: 0,
                shuffle: false,
                repeat: false,
                radio_url: None,
            }),
            config,
            layout,
            reconnect,
            generation: AtomicU64::new(0),
        });

        let weak: Weak<ManualPlayer> = Arc::downgrade(&player);
        player.backend.set_on_track_end(Box::new(move || {
            let weak = weak.clone();
            // End-of-track arrives on the backend's notification thread;
            // further playback calls are offloaded.
            std::thread::spawn(move || {
                if let Some(player) = weak.upgrade() {
                    player.handle_track_end();
                }
            });
        }));

        player
    }

    pub fn play_file(&self, filepath: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        self.play_source_locked(&mut inner, filepath, SourceKind::File)
    }

    pub fn play_radio(self: &Arc<Self>, url: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.radio_url = Some(url.to_string());
        self.play_source_locked(&mut inner, url, SourceKind::Radio)
    }

    pub fn play_playlist(&self, files: Vec<String>, shuffle: bool) -> Result<()> {
        if files.is_empty() {
            return Err(Error::Playback("empty playlist".to_string()));
        }
        let mut inner = self.inner.lock().unwrap();
        inner.playlist = files;
        inner.shuffle = shuffle;
        inner.repeat = true;
        inner.playlist_index = 0;
        if shuffle {
            inner.playlist.shuffle(&mut rand::thread_rng());
        }
        let first = inner.playlist[0].clone();
        self.play_source_locked(&mut inner, &first, SourceKind::Playlist)
    }

    fn play_source_locked(
        &self,
        inner: &mut MutexGuard<'_, PlayerInner>,
        source: &str,
        kind: SourceKind,
    ) -> Result<()> {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.backend.stop();

        let is_stream = kind == SourceKind::Radio;
        let resolved = if is_stream {
            source.to_string()
        } else {
            let path = Path::new(source);
            let resolved = if path.is_absolute() {
                path.to_path_buf()
            } else {
                self.layout.music_dir().join(source)
            };
            if !resolved.exists() {
                warn!("[manual] file not found: {}", resolved.display());
                return Err(Error::MissingSource(source.to_string()));
            }
            resolved.to_string_lossy().to_string()
        };

        self.backend.play(&resolved, is_stream)?;
        self.backend.set_volume(inner.volume);
        inner.current_source = Some(resolved);
        inner.kind = kind;
        inner.is_paused = false;
        inner.external_paused = false;
        debug!("[manual] playing {:?} source {}", kind, source);
        Ok(())
    }

    fn handle_track_end(self: &Arc<Self>) {
        let (kind, radio_url) = {
            let inner = self.inner.lock().unwrap();
            (inner.kind, inner.radio_url.clone())
        };
        match kind {
            SourceKind::Playlist => self.advance_playlist(1),
            SourceKind::Radio => {
                if radio_url.is_some() {
                    self.spawn_reconnect();
                }
            }
            _ => {
                let mut inner = self.inner.lock().unwrap();
                inner.current_source = None;
                inner.kind = SourceKind::None;
            }
        }
    }

    /// Move `steps` forward in the playlist (wrapping per the repeat flag).
    fn advance_playlist(&self, steps: usize) {
        let mut inner = self.inner.lock().unwrap();
        if inner.playlist.is_empty() {
            return;
        }
        let next = inner.playlist_index + steps;
        if next >= inner.playlist.len() {
            if inner.repeat {
                inner.playlist_index = 0;
                if inner.shuffle {
                    inner.playlist.shuffle(&mut rand::thread_rng());
                }
            } else {
                inner.kind = SourceKind::None;
                inner.current_source = None;
                return;
            }
        } else {
            inner.playlist_index = next;
        }
        let source = inner.playlist[inner.playlist_index].clone();
        if let Err(err) = self.play_source_locked(&mut inner, &source, SourceKind::Playlist) {
            warn!("[manual] playlist advance failed: {}", err);
        }
    }

    fn spawn_reconnect(self: &Arc<Self>) {
        let weak: Weak<ManualPlayer> = Arc::downgrade(self);
        let generation = self.generation.load(Ordering::SeqCst);
        let opts = self.reconnect.clone();
        std::thread::spawn(move || {
            for attempt in 1..=opts.max_attempts {
                std::thread::sleep(opts.delay);
                let Some(player) = weak.upgrade() else { return };
                if player.generation.load(Ordering::SeqCst) != generation {
                    return; // user started something else or stopped
                }
                let url = player.inner.lock().unwrap().radio_url.clone();
                let Some(url) = url else { return };
                info!(
                    "[manual] radio reconnect attempt {}/{}",
                    attempt, opts.max_attempts
                );
                if player.play_radio(&url).is_ok() {
                    info!("[manual] radio connection restored");
                    return;
                }
            }
            warn!("[manual] radio reconnect gave up");
        });
    }

    pub fn next_track(&self) {
        let kind = self.inner.lock().unwrap().kind;
        if kind == SourceKind::Playlist {
            self.advance_playlist(1);
        }
    }

    pub fn previous_track(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.kind != SourceKind::Playlist || inner.playlist.is_empty() {
            return;
        }
        inner.playlist_index = inner.playlist_index.saturating_sub(1);
        let source = inner.playlist[inner.playlist_index].clone();
        if let Err(err) = self.play_source_locked(&mut inner, &source, SourceKind::Playlist) {
            warn!("[manual] previous track failed: {}", err);
        }
    }

    pub fn stop(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.backend.stop();
        let mut inner = self.inner.lock().unwrap();
        inner.is_paused = false;
        inner.external_paused = false;
        inner.current_source = None;
        inner.kind = SourceKind::None;
    }

    pub fn pause(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.current_source.is_some() && self.backend.is_playing() {
            self.backend.pause();
            inner.is_paused = true;
        }
    }

    pub fn resume(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.is_paused {
            self.backend.resume();
            inner.is_paused = false;
        }
    }

    pub fn toggle_play_pause(&self) {
        let paused = self.inner.lock().unwrap().is_paused;
        if paused {
            self.resume();
        } else if self.is_playing() {
            self.pause();
        }
    }

    /// Pause on behalf of a bell/announcement, remembering who asked.
    pub fn external_pause(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.current_source.is_some() && self.backend.is_playing() {
            self.backend.pause();
            inner.is_paused = true;
            inner.external_paused = true;
        }
    }

    /// Undo an external pause; a user-initiated pause is left alone.
    pub fn external_resume(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.external_paused {
            self.backend.resume();
            inner.is_paused = false;
            inner.external_paused = false;
        }
    }

    pub fn set_volume(&self, volume: u8) {
        let volume = volume.min(100);
        self.inner.lock().unwrap().volume = volume;
        self.backend.set_volume(volume);
        self.config.update(|c| c.volumes.manual = volume);
    }

    pub fn volume(&self) -> u8 {
        self.inner.lock().unwrap().volume
    }

    /// Seek within the current file; radio and finished lanes ignore it.
    pub fn seek(&self, position: f64) {
        let kind = self.inner.lock().unwrap().kind;
        if kind == SourceKind::File || kind == SourceKind::Playlist {
            self.backend.seek(position.clamp(0.0, 1.0));
        }
    }

    pub fn is_playing(&self) -> bool {
        self.inner.lock().unwrap().current_source.is_some() && self.backend.is_playing()
    }

    /// Files in the music library, sorted by name (case-insensitive).
    pub fn list_music_files(&self) -> Vec<MusicFile> {
        let mut files = Vec::new();
        let dir = self.layout.music_dir();
        if let Ok(entries) = std::fs::read_dir(&dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                let is_music = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| MUSIC_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                    .unwrap_or(false);
                if !is_music {
                    continue;
                }
                let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                files.push(MusicFile {
                    name: entry.file_name().to_string_lossy().to_string(),
                    path: path.to_string_lossy().to_string(),
                    size,
                });
            }
        }
        files.sort_by_key(|f| f.name.to_lowercase());
        files
    }

    pub fn status(&self) -> PlayerStatus {
        let inner = self.inner.lock().unwrap();
        PlayerStatus {
            playing: inner.current_source.is_some() && self.backend.is_playing(),
            paused: inner.is_paused,
            external_paused: inner.external_paused,
            volume: inner.volume,
            source: inner.current_source.clone(),
            kind: inner.kind,
            position: self.backend.position(),
            duration_ms: self.backend.duration_ms(),
            playlist_index: (inner.kind == SourceKind::Playlist).then_some(inner.playlist_index),
            playlist_length: inner.playlist.len(),
            shuffle: inner.shuffle,
            repeat: inner.repeat,
        }
    }
}

impl ManualPlayerProbe for ManualPlayer {
    fn is_active(&self) -> bool {
        self.is_playing()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::backend::testing::MockBackend;

    struct Rig {
        player: Arc<ManualPlayer>,
        backend: Arc<MockBackend>,
        layout: DataLayout,
        _dir: tempfile::TempDir,
    }

    fn rig() -> Rig {
        let dir = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(dir.path().to_path_buf());
        layout.ensure_directories().unwrap();
        let config = Arc::new(ConfigStore::open(layout.config_file()));
        let backend = MockBackend::new();
        let player = ManualPlayer::new(
            backend.clone(),
            config,
            layout.clone(),
            ReconnectOptions {
                max_attempts: 2,
                delay: Duration::from_millis(5),
            },
        );
        Rig {
            player,
            backend,
            layout,
            _dir: dir,
        }
    }

    fn add_music(layout: &DataLayout, name: &str) -> String {
        let path = layout.music_dir().join(name);
        std::fs::write(&path, b"x").unwrap();
        path.to_string_lossy().to_string()
    }

    #[test]
    fn relative_file_resolves_against_music_dir() {
        let r = rig();
        add_music(&r.layout, "tune.mp3");
        r.player.play_file("tune.mp3").unwrap();
        let log = r.backend.play_log.lock().unwrap();
        assert!(log[0].0.ends_with("tune.mp3"));
        assert!(!log[0].1);
    }

    #[test]
    fn missing_file_is_an_error() {
        let r = rig();
        let err = r.player.play_file("nope.mp3").unwrap_err();
        assert!(matches!(err, Error::MissingSource(_)));
        assert!(!r.player.is_playing());
    }

    #[test]
    fn external_pause_does_not_clobber_user_pause() {
        let r = rig();
        add_music(&r.layout, "tune.mp3");
        r.player.play_file("tune.mp3").unwrap();

        r.player.pause();
        assert!(r.player.status().paused);
        assert!(!r.player.status().external_paused);

        // external resume must not undo a user-initiated pause
        r.player.external_resume();
        assert!(r.player.status().paused);
    }

    #[test]
    fn external_pause_and_resume_round_trip() {
        let r = rig();
        add_music(&r.layout, "tune.mp3");
        r.player.play_file("tune.mp3").unwrap();

        r.player.external_pause();
        assert!(r.player.status().external_paused);
        r.player.external_resume();
        assert!(!r.player.status().paused);
        assert_eq!(r.backend.resume_count(), 1);
    }

    #[test]
    fn playlist_next_and_previous() {
        let r = rig();
        let files: Vec<String> = ["a.mp3", "b.mp3", "c.mp3"]
            .iter()
            .map(|n| add_music(&r.layout, n))
            .collect();
        r.player.play_playlist(files.clone(), false).unwrap();

        r.player.next_track();
        assert_eq!(r.player.status().playlist_index, Some(1));
        r.player.previous_track();
        assert_eq!(r.player.status().playlist_index, Some(0));
        // previous at the head stays at the head
        r.player.previous_track();
        assert_eq!(r.player.status().playlist_index, Some(0));
    }

    #[test]
    fn playlist_wraps_with_repeat() {
        let r = rig();
        let files: Vec<String> = ["a.mp3", "b.mp3"]
            .iter()
            .map(|n| add_music(&r.layout, n))
            .collect();
        r.player.play_playlist(files, false).unwrap();

        r.player.next_track();
        r.player.next_track();
        assert_eq!(r.player.status().playlist_index, Some(0));
        assert_eq!(r.backend.play_log.lock().unwrap().len(), 3);
    }

    #[test]
    fn stop_cancels_radio_reconnect() {
        let r = rig();
        r.player.play_radio("http://radio.example/live").unwrap();
        let plays_before = r.backend.play_log.lock().unwrap().len();

        // the stream drops, then the user stops the player
        r.backend.finish_track();
        r.player.stop();

        std::thread::sleep(Duration::from_millis(40));
        // no reconnect play happened after the stop
        assert_eq!(r.backend.play_log.lock().unwrap().len(), plays_before);
        assert!(!r.player.is_playing());
    }

    #[test]
    fn radio_reconnects_after_drop() {
        let r = rig();
        r.player.play_radio("http://radio.example/live").unwrap();
        r.backend.finish_track();

        std::thread::sleep(Duration::from_millis(40));
        let log = r.backend.play_log.lock().unwrap();
        assert!(log.len() >= 2);
        assert_eq!(log.last().unwrap().0, "http://radio.example/live");
    }

    #[test]
    fn music_library_listing_filters_and_sorts() {
        let r = rig();
        add_music(&r.layout, "Beta.mp3");
        add_music(&r.layout, "alpha.ogg");
        std::fs::write(r.layout.music_dir().join("notes.txt"), b"x").unwrap();

        let files = r.player.list_music_files();
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["alpha.ogg", "Beta.mp3"]);
    }

    #[test]
    fn volume_persists_to_config() {
        let r = rig();
        r.player.set_volume(33);
        assert_eq!(r.player.volume(), 33);
        assert_eq!(r.player.config.get().volumes.manual, 33);
    }
}
