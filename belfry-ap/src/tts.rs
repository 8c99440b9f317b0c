//! Text-to-speech synthesis
//!
//! Synthesis itself is an external concern: the default implementation runs
//! a configurable command line with `{text}`, `{voice}`, `{rate}` and
//! `{out}` placeholders and expects the audio file to exist afterwards.
//! Output lands under `sounds/announcements/tts/`; stale files are swept
//! periodically.

use crate::scheduler::hooks::SpeechSynthesizer;
use belfry_common::config::ConfigStore;
use belfry_common::{Error, Result};
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// Voice per (language, gender); first match wins, falling back to the
/// language's male voice and then to Turkish.
const VOICES: [(&str, &str, &str); 10] = [
    ("tr", "male", "tr-TR-AhmetNeural"),
    ("tr", "female", "tr-TR-EmelNeural"),
    ("en", "male", "en-US-GuyNeural"),
    ("en", "female", "en-US-JennyNeural"),
    ("de", "male", "de-DE-ConradNeural"),
    ("de", "female", "de-DE-KatjaNeural"),
    ("ru", "male", "ru-RU-DmitryNeural"),
    ("ru", "female", "ru-RU-SvetlanaNeural"),
    ("bg", "male", "bg-BG-BorislavNeural"),
    ("bg", "female", "bg-BG-KalinaNeural"),
];

pub fn voice_for(language: &str, gender: &str) -> &'static str {
    VOICES
        .iter()
        .find(|(l, g, _)| *l == language && *g == gender)
        .or_else(|| VOICES.iter().find(|(l, g, _)| *l == language && *g == "male"))
        .or_else(|| VOICES.iter().find(|(l, g, _)| *l == "tr" && *g == "female"))
        .map(|(_, _, v)| *v)
        .unwrap_or("tr-TR-EmelNeural")
}

/// Synthesizer that shells out to the configured external command.
pub struct CommandSynthesizer {
    config: Arc<ConfigStore>,
    output_dir: PathBuf,
}

impl CommandSynthesizer {
    pub fn new(config: Arc<ConfigStore>, output_dir: PathBuf) -> Self {
        Self { config, output_dir }
    }

    fn output_path(&self, file_stem: &str) -> PathBuf {
        let stem = if file_stem.is_empty() {
            format!("tts_{}", &uuid::Uuid::new_v4().simple().to_string()[..8])
        } else {
            file_stem.to_string()
        };
        self.output_dir.join(format!("{}.mp3", stem))
    }

    /// Delete synthesized files older than `max_age`.
    pub fn cleanup_old_files(&self, max_age: Duration) {
        let Ok(entries) = std::fs::read_dir(&self.output_dir) else {
            return;
        };
        let now = SystemTime::now();
        let mut removed = 0usize;
        for entry in entries.flatten() {
            let stale = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .map(|age| age > max_age)
                .unwrap_or(false);
            if stale && std::fs::remove_file(entry.path()).is_ok() {
                removed += 1;
            }
        }
        if removed > 0 {
            info!("removed {} stale tts file(s)", removed);
        }
    }
}

impl SpeechSynthesizer for CommandSynthesizer {
    fn generate(&self, text: &str, file_stem: &str) -> Result<PathBuf> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::Tts("empty text".to_string()));
        }
        let tts = self.config.get().tts;
        if tts.command.is_empty() {
            return Err(Error::Tts("no synthesis command configured".to_string()));
        }

        std::fs::create_dir_all(&self.output_dir)?;
        let out = self.output_path(file_stem);
        let voice = voice_for(&tts.language, &tts.gender);

        let mut parts = tts.command.split_whitespace().map(|part| {
            part.replace("{text}", text)
                .replace("{voice}", voice)
                .replace("{rate}", &tts.rate)
                .replace("{out}", &out.to_string_lossy())
        });
        let program = parts
            .next()
            .ok_or_else(|| Error::Tts("empty synthesis command".to_string()))?;
        let args: Vec<String> = parts.collect();

        debug!("running synthesis command {} for {:?}", program, out);
        let status = Command::new(&program)
            .args(&args)
            .status()
            .map_err(|e| Error::Tts(format!("failed to run {}: {}", program, e)))?;
        if !status.success() {
            return Err(Error::Tts(format!("{} exited with {}", program, status)));
        }
        if !out.exists() {
            return Err(Error::Tts(format!(
                "synthesis produced no file at {}",
                out.display()
            )));
        }
        Ok(out)
    }
}

/// Stand-in used when no synthesis command is configured: every request
/// fails cleanly and the caller logs and moves on.
pub struct DisabledSynthesizer;

impl SpeechSynthesizer for DisabledSynthesizer {
    fn generate(&self, _text: &str, _file_stem: &str) -> Result<PathBuf> {
        warn!("speech synthesis requested but not configured");
        Err(Error::Tts("speech synthesis not configured".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthesizer(command: &str) -> (CommandSynthesizer, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(ConfigStore::open(dir.path().join("config.toml")));
        config.update(|c| c.tts.command = command.to_string());
        let synth = CommandSynthesizer::new(config, dir.path().join("tts"));
        (synth, dir)
    }

    #[test]
    fn voice_table_lookup_and_fallbacks() {
        assert_eq!(voice_for("en", "female"), "en-US-JennyNeural");
        assert_eq!(voice_for("de", "other"), "de-DE-ConradNeural");
        assert_eq!(voice_for("xx", "female"), "tr-TR-EmelNeural");
    }

    #[test]
    fn empty_text_and_missing_command_are_errors() {
        let (synth, _dir) = synthesizer("");
        assert!(matches!(
            synth.generate("  ", "x").unwrap_err(),
            Error::Tts(_)
        ));
        assert!(matches!(
            synth.generate("hello", "x").unwrap_err(),
            Error::Tts(_)
        ));
    }

    #[test]
    #[cfg(unix)]
    fn command_substitutes_placeholders_and_returns_path() {
        let (synth, _dir) = synthesizer("touch {out}");
        let path = synth.generate("hello world", "greeting").unwrap();
        assert!(path.exists());
        assert!(path.ends_with("greeting.mp3"));
    }

    #[test]
    #[cfg(unix)]
    fn failing_command_surfaces_error() {
        let (synth, _dir) = synthesizer("false {out}");
        assert!(matches!(
            synth.generate("hello", "x").unwrap_err(),
            Error::Tts(_)
        ));
    }

    #[test]
    fn cleanup_removes_only_stale_files() {
        let (synth, dir) = synthesizer("");
        let tts_dir = dir.path().join("tts");
        std::fs::create_dir_all(&tts_dir).unwrap();
        std::fs::write(tts_dir.join("fresh.mp3"), b"x").unwrap();

        synth.cleanup_old_files(Duration::from_secs(3600));
        assert!(tts_dir.join("fresh.mp3").exists());

        // zero max-age treats everything as stale
        std::thread::sleep(Duration::from_millis(20));
        synth.cleanup_old_files(Duration::ZERO);
        assert!(!tts_dir.join("fresh.mp3").exists());
    }

    #[test]
    fn disabled_synthesizer_always_fails() {
        assert!(DisabledSynthesizer.generate("hello", "x").is_err());
    }
}
