//! Filesystem locations used by the hub.

use std::path::{Path, PathBuf};

/// Application name used for the per-user config directory.
pub const APP_NAME: &str = "AI For The People";

/// Short name used for the per-user data directory.
pub const APP_SHORT_NAME: &str = "AFTP";

/// Resolved locations of every file and directory the hub owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
    pub conversations_dir: PathBuf,
    pub model_registry_path: PathBuf,
    pub runtime_registry_path: PathBuf,
    pub runtimes_root: PathBuf,
    pub scripts_dir: PathBuf,
    pub settings_path: PathBuf,
}

impl AppPaths {
    /// Platform defaults: per-user directories from `dirs`, runtimes and
    /// scripts relative to the working directory.
    pub fn discover() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let config_base = dirs::config_dir().unwrap_or_else(|| home.join(".config"));
        let data_base = dirs::data_dir().unwrap_or_else(|| home.join(".local").join("share"));
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

        let app_data = data_base.join(APP_SHORT_NAME);
        let data_dir = app_data.join("data");

        Self {
            config_dir: config_base.join(APP_NAME),
            conversations_dir: data_dir.join("conversations"),
            model_registry_path: app_data.join("models_registry.json"),
            runtime_registry_path: data_dir.join("runtime_registry.json"),
            runtimes_root: cwd.join("venvs"),
            scripts_dir: cwd.join("scripts"),
            settings_path: cwd.join("data").join("config.json"),
            data_dir,
        }
    }

    /// Every location under a single root directory.
    pub fn rooted(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        let data_dir = root.join("data");
        Self {
            config_dir: root.join("config"),
            conversations_dir: data_dir.join("conversations"),
            model_registry_path: data_dir.join("models_registry.json"),
            runtime_registry_path: data_dir.join("runtime_registry.json"),
            runtimes_root: root.join("venvs"),
            scripts_dir: root.join("scripts"),
            settings_path: data_dir.join("config.json"),
            data_dir,
        }
    }

    /// Override the runtimes root
    pub fn with_runtimes_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.runtimes_root = root.into();
        self
    }

    /// Override the scripts directory
    pub fn with_scripts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scripts_dir = dir.into();
        self
    }

    /// Override the runtime registry file
    pub fn with_runtime_registry_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.runtime_registry_path = path.into();
        self
    }

    /// Override the conversations directory
    pub fn with_conversations_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.conversations_dir = dir.into();
        self
    }

    /// Create the directories the hub writes into.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.conversations_dir)?;
        std::fs::create_dir_all(&self.runtimes_root)?;
        Ok(())
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::discover()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rooted_layout() {
        let paths = AppPaths::rooted("/tmp/hub");
        assert_eq!(paths.runtimes_root, PathBuf::from("/tmp/hub/venvs"));
        assert_eq!(
            paths.runtime_registry_path,
            PathBuf::from("/tmp/hub/data/runtime_registry.json")
        );
        assert_eq!(
            paths.conversations_dir,
            PathBuf::from("/tmp/hub/data/conversations")
        );
    }

    #[test]
    fn test_discover_uses_app_names() {
        let paths = AppPaths::discover();
        assert!(paths.config_dir.ends_with(APP_NAME));
        assert!(paths.data_dir.ends_with(Path::new(APP_SHORT_NAME).join("data")));
        assert!(paths.runtimes_root.ends_with("venvs"));
    }

    #[test]
    fn test_ensure_dirs_creates_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = AppPaths::rooted(tmp.path());
        paths.ensure_dirs().unwrap();
        assert!(paths.conversations_dir.is_dir());
        assert!(paths.runtimes_root.is_dir());
    }
}
