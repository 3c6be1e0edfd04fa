//! tagcall Configuration
//!
//! Handles parsing and management of tagcall.toml configuration files.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::ffi::{BindingMode, LibraryLoader, LoaderOptions, ReleasePolicy};

/// Name of the configuration file searched for by [`TagcallConfig::find_and_load`].
pub const CONFIG_FILE_NAME: &str = "tagcall.toml";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file not found: {0}")]
    NotFound(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Root configuration structure matching tagcall.toml.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TagcallConfig {
    /// Library loading
    #[serde(default)]
    pub loader: LoaderConfig,

    /// Release symbols for owned results
    #[serde(default)]
    pub release: ReleasePolicy,

    /// Libraries to load up front (name -> path or name)
    #[serde(default)]
    pub libraries: HashMap<String, String>,
}

impl TagcallConfig {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        let config: TagcallConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from the current directory or parents.
    pub fn load_from_cwd() -> ConfigResult<Self> {
        let cwd = std::env::current_dir().map_err(ConfigError::Io)?;
        Self::find_and_load(&cwd)
    }

    /// Find and load configuration by searching up from the given directory.
    ///
    /// Falls back to defaults when no file is found.
    pub fn find_and_load(start_dir: &Path) -> ConfigResult<Self> {
        let mut dir = start_dir.to_path_buf();
        loop {
            let config_path = dir.join(CONFIG_FILE_NAME);
            if config_path.exists() {
                tracing::debug!(path = %config_path.display(), "loading config");
                return Self::load(&config_path);
            }
            if !dir.pop() {
                return Ok(Self::default());
            }
        }
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Build a library loader from the loader and release sections.
    pub fn library_loader(&self) -> LibraryLoader {
        let mut loader = LibraryLoader::new()
            .with_options(self.loader.options())
            .with_release_policy(self.release.clone());
        for path in &self.loader.search_paths {
            loader.add_search_path(path);
        }
        loader
    }
}

/// Loader settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Extra directories searched before the OS linker's own path
    #[serde(default)]
    pub search_paths: Vec<PathBuf>,

    /// Symbol binding mode ("lazy" or "now")
    #[serde(default)]
    pub binding: BindingMode,

    /// Open libraries with global symbol visibility
    #[serde(default)]
    pub global: bool,
}

impl LoaderConfig {
    /// Options passed to the platform loader.
    pub fn options(&self) -> LoaderOptions {
        LoaderOptions {
            binding: self.binding,
            global: self.global,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TagcallConfig::default();
        assert!(config.loader.search_paths.is_empty());
        assert_eq!(config.loader.binding, BindingMode::Lazy);
        assert!(!config.loader.global);
        assert_eq!(config.release, ReleasePolicy::default());
        assert!(config.libraries.is_empty());
    }

    #[test]
    fn test_parse_config() {
        let toml_str = r#"
[loader]
search_paths = ["./lib", "/opt/native"]
binding = "now"
global = true

[release]
string = "release_string"
libc_fallback = false

[libraries]
math = "./lib/libmath.so"
"#;
        let config: TagcallConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.loader.search_paths.len(), 2);
        assert_eq!(
            config.loader.options(),
            LoaderOptions {
                binding: BindingMode::Now,
                global: true
            }
        );
        assert_eq!(config.release.string, "release_string");
        assert_eq!(config.release.int, "free_int");
        assert!(!config.release.libc_fallback);
        assert_eq!(config.libraries["math"], "./lib/libmath.so");

        let loader = config.library_loader();
        assert!(loader
            .search_paths()
            .ends_with(&[PathBuf::from("./lib"), PathBuf::from("/opt/native")]));
    }

    #[test]
    fn test_save_and_find() {
        let dir = std::env::temp_dir().join(format!("tagcall_config_{}", std::process::id()));
        let nested = dir.join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        let mut config = TagcallConfig::default();
        config.loader.binding = BindingMode::Now;
        config.release.bool = "drop_bool".to_string();
        config.save(&dir.join(CONFIG_FILE_NAME)).unwrap();

        let found = TagcallConfig::find_and_load(&nested).unwrap();
        assert_eq!(found.loader.binding, BindingMode::Now);
        assert_eq!(found.release.bool, "drop_bool");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_missing_file() {
        let err = TagcallConfig::load(Path::new("/nonexistent/tagcall.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }
}
