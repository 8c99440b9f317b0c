//! Media backend capability
//!
//! Decoding and output are delegated to an external player; the engine only
//! needs this narrow control surface per lane. End-of-track notifications
//! arrive asynchronously on a backend-owned thread, so registered callbacks
//! must return quickly and never call back into the backend directly.

use belfry_common::{Error, Result};
use std::sync::Mutex;

/// Callback invoked by the backend when the current source finishes.
pub type TrackEndCallback = Box<dyn Fn() + Send + Sync>;

/// Control surface of one backend player instance (one per lane).
pub trait MediaBackend: Send + Sync {
    /// Start playing `source`. For non-stream sources the caller has already
    /// verified the file exists.
    fn play(&self, source: &str, is_stream: bool) -> Result<()>;

    /// Stop and release the current player, if any.
    fn stop(&self);

    fn pause(&self);

    fn resume(&self);

    /// True while playing or still buffering.
    fn is_playing(&self) -> bool;

    /// Volume on the user-facing 0..=100 scale.
    fn set_volume(&self, volume: u8);

    /// Playback position as a fraction of the track, 0.0..=1.0.
    fn position(&self) -> f64;

    /// Total duration in milliseconds (0 when unknown).
    fn duration_ms(&self) -> u64;

    /// Seek to a fractional position (files only; streams ignore this).
    fn seek(&self, position: f64);

    /// Register the end-of-track notification for this player.
    fn set_on_track_end(&self, callback: TrackEndCallback);
}

/// Silent stub backend.
///
/// Accepts every source and reports an immediately finished track. Used when
/// no real player is wired in, so the coordination layer stays exercisable.
#[derive(Default)]
pub struct NullBackend {
    state: Mutex<NullState>,
}

#[derive(Default)]
struct NullState {
    source: Option<String>,
    volume: u8,
}

impl NullBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MediaBackend for NullBackend {
    fn play(&self, source: &str, _is_stream: bool) -> Result<()> {
        if source.is_empty() {
            return Err(Error::Backend("empty source".to_string()));
        }
        self.state.lock().unwrap().source = Some(source.to_string());
        Ok(())
    }

    fn stop(&self) {
        self.state.lock().unwrap().source = None;
    }

    fn pause(&self) {}

    fn resume(&self) {}

    fn is_playing(&self) -> bool {
        false
    }

    fn set_volume(&self, volume: u8) {
        self.state.lock().unwrap().volume = volume.min(100);
    }

    fn position(&self) -> f64 {
        0.0
    }

    fn duration_ms(&self) -> u64 {
        0
    }

    fn seek(&self, _position: f64) {}

    fn set_on_track_end(&self, _callback: TrackEndCallback) {}
}

#[cfg(test)]
pub mod testing {
    //! Scriptable backend for unit tests.

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct MockState {
        playing: bool,
        paused: bool,
        volume: u8,
        source: Option<String>,
        fail_sources: Vec<String>,
        on_track_end: Option<Arc<TrackEndCallback>>,
    }

    /// Records every call and lets tests script playback lifetimes.
    #[derive(Default)]
    pub struct MockBackend {
        state: Mutex<MockState>,
        /// Sources passed to `play`, in order.
        pub play_log: Mutex<Vec<(String, bool)>>,
        stop_count: AtomicUsize,
        pause_count: AtomicUsize,
        resume_count: AtomicUsize,
        /// When set, `is_playing` reports true for this many further calls
        /// after a play, then flips to false (drives blocking-wait loops).
        playing_polls: AtomicUsize,
    }

    impl MockBackend {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Make the named source fail at `play`.
        pub fn fail_on(&self, source: &str) {
            self.state.lock().unwrap().fail_sources.push(source.to_string());
        }

        /// Have `is_playing` stay true for `polls` queries after each play.
        pub fn set_playing_polls(&self, polls: usize) {
            self.playing_polls.store(polls, Ordering::SeqCst);
        }

        /// Simulate the backend reaching end of track: flips to not-playing
        /// and fires the registered notification (on the caller's thread).
        pub fn finish_track(&self) {
            let callback = {
                let mut state = self.state.lock().unwrap();
                state.playing = false;
                state.on_track_end.clone()
            };
            if let Some(cb) = callback {
                cb();
            }
        }

        pub fn current_source(&self) -> Option<String> {
            self.state.lock().unwrap().source.clone()
        }

        pub fn volume(&self) -> u8 {
            self.state.lock().unwrap().volume
        }

        pub fn stop_count(&self) -> usize {
            self.stop_count.load(Ordering::SeqCst)
        }

        pub fn pause_count(&self) -> usize {
            self.pause_count.load(Ordering::SeqCst)
        }

        pub fn resume_count(&self) -> usize {
            self.resume_count.load(Ordering::SeqCst)
        }

        pub fn is_paused(&self) -> bool {
            self.state.lock().unwrap().paused
        }
    }

    impl MediaBackend for MockBackend {
        fn play(&self, source: &str, is_stream: bool) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            if state.fail_sources.iter().any(|s| s == source) {
                return Err(Error::Backend(format!("scripted failure: {}", source)));
            }
            state.playing = true;
            state.paused = false;
            state.source = Some(source.to_string());
            drop(state);
            self.play_log.lock().unwrap().push((source.to_string(), is_stream));
            Ok(())
        }

        fn stop(&self) {
            let mut state = self.state.lock().unwrap();
            state.playing = false;
            state.paused = false;
            state.source = None;
            drop(state);
            self.stop_count.fetch_add(1, Ordering::SeqCst);
        }

        fn pause(&self) {
            let mut state = self.state.lock().unwrap();
            if state.playing {
                state.playing = false;
                state.paused = true;
            }
            drop(state);
            self.pause_count.fetch_add(1, Ordering::SeqCst);
        }

        fn resume(&self) {
            let mut state = self.state.lock().unwrap();
            if state.paused {
                state.playing = true;
                state.paused = false;
            }
            drop(state);
            self.resume_count.fetch_add(1, Ordering::SeqCst);
        }

        fn is_playing(&self) -> bool {
            let playing = self.state.lock().unwrap().playing;
            if !playing {
                return false;
            }
            // Countdown lets blocking waiters observe the track ending.
            let remaining = self.playing_polls.load(Ordering::SeqCst);
            if remaining > 0 {
                if self.playing_polls.fetch_sub(1, Ordering::SeqCst) == 1 {
                    self.state.lock().unwrap().playing = false;
                }
                true
            } else {
                true
            }
        }

        fn set_volume(&self, volume: u8) {
            self.state.lock().unwrap().volume = volume.min(100);
        }

        fn position(&self) -> f64 {
            0.0
        }

        fn duration_ms(&self) -> u64 {
            0
        }

        fn seek(&self, _position: f64) {}

        fn set_on_track_end(&self, callback: TrackEndCallback) {
            self.state.lock().unwrap().on_track_end = Some(Arc::new(callback));
        }
    }
}
