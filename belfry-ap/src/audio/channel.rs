//! One logical audio output lane
//!
//! A channel plays exactly one source at a time on its backend player, or
//! cycles through a playlist. All interior state sits behind a single mutex;
//! helpers that are called with the lock already held take the guarded state
//! directly, so no operation ever re-locks its own channel.

use crate::audio::backend::MediaBackend;
use belfry_common::events::ChannelId;
use belfry_common::{Error, Result};
use rand::seq::SliceRandom;
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, warn};

/// Snapshot of a channel for status endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelStatus {
    pub playing: bool,
    pub paused: bool,
    pub volume: u8,
    pub source: Option<String>,
    pub position: f64,
    pub duration_ms: u64,
    pub playlist_length: usize,
    pub playlist_index: usize,
    pub is_playlist_mode: bool,
    pub shuffle: bool,
}

#[derive(Default)]
struct ChannelInner {
    volume: u8,
    is_paused: bool,
    current_source: Option<String>,
    playlist: Vec<String>,
    playlist_index: usize,
    shuffle: bool,
    is_playlist_mode: bool,
}

pub struct Channel {
    id: ChannelId,
    backend: Arc<dyn MediaBackend>,
    inner: Mutex<ChannelInner>,
}

impl Channel {
    /// Create the channel and hook up the backend's end-of-track
    /// notification. The notification offloads to a short-lived worker so the
    /// backend's delivery thread is never blocked on the channel lock.
    pub fn new(id: ChannelId, backend: Arc<dyn MediaBackend>, volume: u8) -> Arc<Self> {
        let channel = Arc::new(Self {
            id,
            backend: backend.clone(),
            inner: Mutex::new(ChannelInner {
                volume: volume.min(100),
                ..Default::default()
            }),
        });

        let weak: Weak<Channel> = Arc::downgrade(&channel);
        backend.set_on_track_end(Box::new(move || {
            let weak = weak.clone();
            std::thread::spawn(move || {
                if let Some(channel) = weak.upgrade() {
                    channel.handle_track_end();
                }
            });
        }));

        channel
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Play a single source on this lane.
    ///
    /// Stops whatever is currently playing first; playlist bookkeeping is
    /// preserved only when the new source is the next track of the running
    /// playlist (`is_playlist_track`).
    pub fn play(&self, source: &str, is_stream: bool, is_playlist_track: bool) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        self.play_locked(&mut inner, source, is_stream, is_playlist_track)
    }

    fn play_locked(
        &self,
        inner: &mut ChannelInner,
        source: &str,
        is_stream: bool,
        is_playlist_track: bool,
    ) -> Result<()> {
        self.stop_locked(inner, !is_playlist_track);

        if source.is_empty() {
            return Err(Error::Playback(format!("[{}] empty source", self.id)));
        }
        if !is_stream && !Path::new(source).exists() {
            warn!("[{}] file not found: {}", self.id, source);
            return Err(Error::MissingSource(source.to_string()));
        }

        self.backend.play(source, is_stream).map_err(|e| {
            warn!("[{}] playback failed for {}: {}", self.id, source, e);
            e
        })?;
        self.backend.set_volume(inner.volume);
        inner.current_source = Some(source.to_string());
        inner.is_paused = false;
        debug!("[{}] playing {}", self.id, source);
        Ok(())
    }

    /// Replace the playlist and start it from the top.
    pub fn play_playlist(&self, files: Vec<String>, shuffle: bool) -> Result<()> {
        if files.is_empty() {
            return Err(Error::Playback(format!("[{}] empty playlist", self.id)));
        }
        let mut inner = self.inner.lock().unwrap();
        inner.playlist = files;
        inner.shuffle = shuffle;
        if shuffle {
            inner.playlist.shuffle(&mut rand::thread_rng());
        }
        inner.playlist_index = 0;
        inner.is_playlist_mode = true;

        let first = inner.playlist[0].clone();
        self.play_locked(&mut inner, &first, false, true)
    }

    /// End-of-track handler: advance the playlist, wrapping (and reshuffling
    /// when enabled) past the last entry. Runs on a worker thread and
    /// acquires the channel lock fresh.
    fn handle_track_end(&self) {
        let mut inner = self.inner.lock().unwrap();
        if !inner.is_playlist_mode || inner.playlist.is_empty() {
            inner.current_source = None;
            return;
        }

        inner.playlist_index += 1;
        if inner.playlist_index >= inner.playlist.len() {
            if inner.shuffle {
                inner.playlist.shuffle(&mut rand::thread_rng());
            }
            inner.playlist_index = 0;
        }

        let next = inner.playlist[inner.playlist_index].clone();
        if let Err(e) = self.play_locked(&mut inner, &next, false, true) {
            warn!("[{}] playlist advance failed: {}", self.id, e);
        }
    }

    /// Stop playback, always releasing the backend player. Playlist state is
    /// cleared only when `stop_playlist` is set, so an internal track switch
    /// can stop the old track without erasing playlist bookkeeping.
    pub fn stop(&self, stop_playlist: bool) {
        let mut inner = self.inner.lock().unwrap();
        self.stop_locked(&mut inner, stop_playlist);
    }

    fn stop_locked(&self, inner: &mut ChannelInner, stop_playlist: bool) {
        self.backend.stop();
        inner.is_paused = false;
        inner.current_source = None;
        if stop_playlist {
            inner.playlist.clear();
            inner.playlist_index = 0;
            inner.is_playlist_mode = false;
        }
    }

    /// Pause; a no-op unless actually playing.
    pub fn pause(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.current_source.is_some() && self.backend.is_playing() {
            self.backend.pause();
            inner.is_paused = true;
        }
    }

    /// Resume; a no-op unless actually paused.
    pub fn resume(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.is_paused {
            self.backend.resume();
            inner.is_paused = false;
        }
    }

    /// Clamp and store the volume; forwarded immediately when a player exists.
    pub fn set_volume(&self, volume: u8) {
        let mut inner = self.inner.lock().unwrap();
        inner.volume = volume.min(100);
        self.backend.set_volume(inner.volume);
    }

    pub fn volume(&self) -> u8 {
        self.inner.lock().unwrap().volume
    }

    pub fn is_playing(&self) -> bool {
        self.backend.is_playing()
    }

    pub fn is_paused(&self) -> bool {
        self.inner.lock().unwrap().is_paused
    }

    pub fn is_playlist_mode(&self) -> bool {
        self.inner.lock().unwrap().is_playlist_mode
    }

    pub fn current_source(&self) -> Option<String> {
        self.inner.lock().unwrap().current_source.clone()
    }

    pub fn status(&self) -> ChannelStatus {
        let inner = self.inner.lock().unwrap();
        ChannelStatus {
            playing: self.backend.is_playing(),
            paused: inner.is_paused,
            volume: inner.volume,
            source: inner.current_source.clone(),
            position: self.backend.position(),
            duration_ms: self.backend.duration_ms(),
            playlist_length: inner.playlist.len(),
            playlist_index: inner.playlist_index,
            is_playlist_mode: inner.is_playlist_mode,
            shuffle: inner.shuffle,
        }
    }

    #[cfg(test)]
    pub(crate) fn playlist_snapshot(&self) -> (Vec<String>, usize) {
        let inner = self.inner.lock().unwrap();
        (inner.playlist.clone(), inner.playlist_index)
    }
}
