//! Collaborator seams of the automaton.
//!
//! The scheduler drives everything through these traits, injected at
//! construction. The arbiter implements [`AudioSink`], the birthday/holiday
//! services implement their oracles, and tests supply recording doubles.

use belfry_common::Result;
use std::path::PathBuf;

/// Audio actions the automaton can request. Bell and announcement calls
/// block until the cue has finished playing.
pub trait AudioSink: Send + Sync {
    /// Returns whether a bell actually played (resolves + starts).
    fn play_bell(&self, sound_id: &str) -> bool;

    fn play_announcement(&self, sound_id: &str) -> bool;

    fn start_background_music(&self);

    fn stop_background_music(&self);
}

/// Whether today is a holiday on which automated cues should be skipped.
/// Implementations fold in their own enabled/skip configuration.
pub trait HolidayOracle: Send + Sync {
    fn is_holiday_today(&self) -> bool;
}

/// Birthday announcements due at the current minute.
pub trait BirthdayOracle: Send + Sync {
    /// Names whose announcement slot matches the current minute and whose
    /// birthday is today.
    fn due_now(&self) -> Vec<String>;

    /// Rendered announcement text for one person.
    fn announcement_text(&self, name: &str) -> String;
}

/// Probe for user-initiated playback; the automaton leaves background music
/// untouched while this reports true.
pub trait ManualPlayerProbe: Send + Sync {
    fn is_active(&self) -> bool;
}

/// Text-to-speech synthesis: text in, audio file out.
pub trait SpeechSynthesizer: Send + Sync {
    fn generate(&self, text: &str, file_stem: &str) -> Result<PathBuf>;
}
