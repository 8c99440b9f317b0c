//! Data-folder resolution
//!
//! All documents and sound libraries live under one root folder, resolved in
//! priority order: command-line argument, environment variable, OS-dependent
//! default.

use std::path::{Path, PathBuf};

/// Environment variable overriding the data root.
pub const ROOT_ENV_VAR: &str = "BELFRY_ROOT_FOLDER";

/// Resolve the data root folder.
///
/// Priority order:
/// 1. Command-line argument
/// 2. `BELFRY_ROOT_FOLDER` environment variable
/// 3. OS-dependent default (`~/.local/share/belfry` and equivalents)
pub fn resolve_root_folder(cli_arg: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var(ROOT_ENV_VAR) {
        return PathBuf::from(path);
    }
    default_root_folder()
}

/// OS-dependent default data root.
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("belfry"))
        .unwrap_or_else(|| PathBuf::from("./belfry_data"))
}

/// Fixed layout under the data root.
#[derive(Debug, Clone)]
pub struct DataLayout {
    pub root: PathBuf,
}

impl DataLayout {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("data").join("config.toml")
    }

    pub fn schedule_file(&self) -> PathBuf {
        self.root.join("data").join("schedule.json")
    }

    pub fn birthdays_file(&self) -> PathBuf {
        self.root.join("data").join("birthdays.json")
    }

    pub fn holidays_file(&self) -> PathBuf {
        self.root.join("data").join("holidays.json")
    }

    pub fn bells_dir(&self) -> PathBuf {
        self.root.join("sounds").join("bells")
    }

    pub fn announcements_dir(&self) -> PathBuf {
        self.root.join("sounds").join("announcements")
    }

    pub fn music_dir(&self) -> PathBuf {
        self.root.join("sounds").join("music")
    }

    pub fn tts_dir(&self) -> PathBuf {
        self.announcements_dir().join("tts")
    }

    /// System sounds (startup chime and the like).
    pub fn system_dir(&self) -> PathBuf {
        self.root.join("sounds").join("system_audio")
    }

    /// Create every directory the daemon writes into.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        for dir in [
            self.root.join("data"),
            self.bells_dir(),
            self.announcements_dir(),
            self.music_dir(),
            self.tts_dir(),
            self.system_dir(),
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_argument_wins() {
        let root = resolve_root_folder(Some(Path::new("/tmp/belfry-test")));
        assert_eq!(root, PathBuf::from("/tmp/belfry-test"));
    }

    #[test]
    fn layout_paths_hang_off_root() {
        let layout = DataLayout::new(PathBuf::from("/srv/belfry"));
        assert_eq!(layout.schedule_file(), PathBuf::from("/srv/belfry/data/schedule.json"));
        assert_eq!(layout.bells_dir(), PathBuf::from("/srv/belfry/sounds/bells"));
        assert_eq!(layout.tts_dir(), PathBuf::from("/srv/belfry/sounds/announcements/tts"));
    }

    #[test]
    fn ensure_directories_creates_tree() {
        let dir = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(dir.path().join("root"));
        layout.ensure_directories().unwrap();
        assert!(layout.music_dir().is_dir());
        assert!(layout.tts_dir().is_dir());
    }
}
