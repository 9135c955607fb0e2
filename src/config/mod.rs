//! Configuration loading for rgsearch.

use std::path::{Path, PathBuf};

use directories::{BaseDirs, ProjectDirs};
use serde::Deserialize;

/// Environment variable naming an alternative config file.
pub const CONFIG_ENV: &str = "RGSEARCH_CONFIG";

/// Top-level configuration loaded from config.toml.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ripgrep: RipgrepConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

/// Where to find the ripgrep binary.
#[derive(Debug, Deserialize)]
pub struct RipgrepConfig {
    #[serde(default = "default_ripgrep_path")]
    pub path: String,
}

/// Defaults applied to every search unless overridden on the command line.
#[derive(Debug, Deserialize)]
pub struct SearchConfig {
    /// Globs excluded from every search.
    #[serde(default)]
    pub excludes: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    #[serde(default = "default_true")]
    pub use_ignore_files: bool,
    #[serde(default)]
    pub use_global_ignore_files: bool,
    pub max_results: Option<usize>,
}

fn default_ripgrep_path() -> String {
    "rg".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for RipgrepConfig {
    fn default() -> Self {
        Self {
            path: default_ripgrep_path(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            excludes: Vec::new(),
            follow_symlinks: false,
            use_ignore_files: true,
            use_global_ignore_files: false,
            max_results: None,
        }
    }
}

impl Config {
    /// Load config from `$RGSEARCH_CONFIG` or ~/.config/rgsearch/config.toml,
    /// or return defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> anyhow::Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Config::default()),
        }
    }

    /// Load config from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read config {}: {e}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("Invalid config {}: {e}", path.display()))?;
        Ok(config)
    }

    #[must_use]
    pub fn config_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }
        ProjectDirs::from("", "", "rgsearch").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// The ripgrep binary with `~` expanded.
    #[must_use]
    pub fn ripgrep_path(&self) -> PathBuf {
        expand_tilde(&self.ripgrep.path)
    }
}

/// Expand ~ to the user's home directory.
#[must_use]
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(base_dirs) = BaseDirs::new()
    {
        return base_dirs.home_dir().join(rest);
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_sections_missing() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.ripgrep.path, "rg");
        assert!(config.search.use_ignore_files);
        assert!(!config.search.use_global_ignore_files);
        assert!(config.search.excludes.is_empty());
    }

    #[test]
    fn parses_search_section() {
        let config: Config = toml::from_str(
            r#"
[ripgrep]
path = "/opt/bin/rg"

[search]
excludes = ["target/", "*.lock"]
follow_symlinks = true
use_ignore_files = false
max_results = 500
"#,
        )
        .unwrap();

        assert_eq!(config.ripgrep_path(), PathBuf::from("/opt/bin/rg"));
        assert_eq!(config.search.excludes, vec!["target/", "*.lock"]);
        assert!(config.search.follow_symlinks);
        assert!(!config.search.use_ignore_files);
        assert_eq!(config.search.max_results, Some(500));
    }

    #[test]
    fn load_from_reports_bad_toml() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[search\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid config"));
    }

    #[test]
    fn expand_tilde_leaves_plain_paths() {
        assert_eq!(expand_tilde("/usr/bin/rg"), PathBuf::from("/usr/bin/rg"));
        assert_eq!(expand_tilde("rg"), PathBuf::from("rg"));
    }
}
