//! Where runtimes live on disk.

use aftp_core::paths::AppPaths;
use aftp_core::settings::Settings;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Runtime directory layout: `<root>/<name>`, unless overridden per runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeLayout {
    root: PathBuf,
    overrides: BTreeMap<String, PathBuf>,
}

impl RuntimeLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            overrides: BTreeMap::new(),
        }
    }

    /// Layout from the app paths, with the settings' overrides applied
    pub fn from_settings(paths: &AppPaths, settings: &Settings) -> Self {
        let root = settings
            .runtimes_root
            .clone()
            .unwrap_or_else(|| paths.runtimes_root.clone());
        let mut layout = Self::new(root);
        for (name, dir) in &settings.runtimes {
            layout = layout.with_override(name.clone(), dir.clone());
        }
        layout
    }

    /// Place one runtime outside the root
    pub fn with_override(mut self, name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        self.overrides.insert(name.into(), dir.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn runtime_dir(&self, name: &str) -> PathBuf {
        self.overrides
            .get(name)
            .cloned()
            .unwrap_or_else(|| self.root.join(name))
    }

    /// The runtime's own interpreter
    pub fn interpreter(&self, name: &str) -> PathBuf {
        interpreter_in(&self.runtime_dir(name))
    }

    /// Whether the runtime's interpreter exists. Spawns nothing.
    pub fn is_materialized(&self, name: &str) -> bool {
        self.interpreter(name).is_file()
    }
}

#[cfg(windows)]
fn interpreter_in(dir: &Path) -> PathBuf {
    dir.join("Scripts").join("python.exe")
}

#[cfg(not(windows))]
fn interpreter_in(dir: &Path) -> PathBuf {
    dir.join("bin").join("python3")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_dir_and_override() {
        let layout = RuntimeLayout::new("/opt/venvs").with_override("stt", "/data/whisper");
        assert_eq!(layout.runtime_dir("core"), PathBuf::from("/opt/venvs/core"));
        assert_eq!(layout.runtime_dir("stt"), PathBuf::from("/data/whisper"));
    }

    #[cfg(unix)]
    #[test]
    fn test_interpreter_location() {
        let layout = RuntimeLayout::new("/opt/venvs");
        assert_eq!(
            layout.interpreter("core"),
            PathBuf::from("/opt/venvs/core/bin/python3")
        );
    }

    #[test]
    fn test_materialized_only_with_interpreter() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = RuntimeLayout::new(tmp.path());
        std::fs::create_dir_all(layout.runtime_dir("core")).unwrap();
        assert!(!layout.is_materialized("core"));

        let interpreter = layout.interpreter("core");
        std::fs::create_dir_all(interpreter.parent().unwrap()).unwrap();
        std::fs::write(&interpreter, "").unwrap();
        assert!(layout.is_materialized("core"));
    }

    #[test]
    fn test_from_settings_prefers_settings_root() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = AppPaths::rooted(tmp.path());
        let settings = Settings {
            runtimes_root: Some(PathBuf::from("/srv/runtimes")),
            ..Settings::default()
        };
        let layout = RuntimeLayout::from_settings(&paths, &settings);
        assert_eq!(layout.root(), Path::new("/srv/runtimes"));

        let layout = RuntimeLayout::from_settings(&paths, &Settings::default());
        assert_eq!(layout.root(), paths.runtimes_root.as_path());
    }
}
