//! Configuration file for kubelogs
//!
//! Optional defaults read from `~/.kubelogs/config.toml` (or the file named by
//! `--config` / `KUBELOGS_CONFIG`). Command-line flags always win.
//!
//! ```toml
//! context = "prod"
//! namespace = "web"
//! tail = 100
//! color = true
//! palette = ["cyan", "green", "magenta", "yellow"]
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use kubelogs_logs::{Color, parse_color};

/// Environment variable naming an alternative config file
pub const CONFIG_ENV: &str = "KUBELOGS_CONFIG";

/// kubelogs configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Kubeconfig context to use instead of the current one
    pub context: Option<String>,

    /// Namespace to search when `--namespace` is not given
    pub namespace: Option<String>,

    /// Default tail line count (negative = all lines)
    pub tail: Option<i64>,

    /// Color pod names
    pub color: Option<bool>,

    /// Color names handed out to pods in discovery order
    #[serde(default)]
    pub palette: Vec<String>,
}

impl Config {
    /// Get the default config file path (~/.kubelogs/config.toml)
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".kubelogs").join("config.toml"))
    }

    /// Load the config.
    ///
    /// An explicitly named file must exist; a missing default file yields the
    /// default config.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let explicit = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

        match explicit {
            Some(path) => Self::from_file(&path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        // Validate eagerly so a typo fails before connecting to the cluster
        config.palette_colors()?;
        Ok(config)
    }

    /// The configured palette as terminal colors
    pub fn palette_colors(&self) -> Result<Vec<Color>> {
        self.palette
            .iter()
            .map(|name| {
                parse_color(name).with_context(|| format!("Unknown color in palette: {}", name))
            })
            .collect()
    }
}
