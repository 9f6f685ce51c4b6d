use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_FIRST_TIME_SONGS: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    /// Last.fm session key, written back after `login`.
    #[serde(default)]
    pub session_key: Option<String>,
    /// Raw browser cookie for music.youtube.com.
    #[serde(default)]
    pub cookie: Option<String>,
    /// Pro accounts use the tighter linear submission window.
    #[serde(default)]
    pub pro: bool,
    /// Cap on submissions when no prior play state exists.
    #[serde(default = "default_max_first_time_songs")]
    pub max_first_time_songs: usize,
}

fn default_max_first_time_songs() -> usize {
    DEFAULT_MAX_FIRST_TIME_SONGS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_secret: String::new(),
            session_key: None,
            cookie: None,
            pro: false,
            max_first_time_songs: DEFAULT_MAX_FIRST_TIME_SONGS,
        }
    }
}

pub fn default_config_path() -> PathBuf {
    let fallback = PathBuf::from(".config/ytmscrobble/config.json");
    dirs::home_dir().map_or(fallback, |home| {
        home.join(".config/ytmscrobble/config.json")
    })
}

pub fn default_db_path() -> PathBuf {
    let fallback = PathBuf::from(".local/share/ytmscrobble/history.db");
    dirs::data_dir().map_or(fallback, |data| data.join("ytmscrobble/history.db"))
}

pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed reading config at {}", path.display()))?;
    let config = serde_json::from_str(&raw)
        .with_context(|| format!("Failed parsing config at {}", path.display()))?;
    Ok(config)
}

pub fn save_config(config: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed creating config directory {}", parent.display()))?;
    }
    let serialized =
        serde_json::to_string_pretty(config).context("Failed serializing config to JSON")?;
    fs::write(path, format!("{serialized}\n"))
        .with_context(|| format!("Failed writing config at {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_file_loads_defaults() {
        let config = load_config(Path::new("/nonexistent/ytmscrobble/config.json"))
            .expect("missing file should yield defaults");
        assert!(config.api_key.is_empty());
        assert!(config.session_key.is_none());
        assert!(!config.pro);
        assert_eq!(config.max_first_time_songs, DEFAULT_MAX_FIRST_TIME_SONGS);
    }

    #[test]
    fn partial_config_fills_in_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"api_key": "k", "api_secret": "s"}"#)
                .expect("partial config should deserialize");
        assert_eq!(config.api_key, "k");
        assert_eq!(config.max_first_time_songs, DEFAULT_MAX_FIRST_TIME_SONGS);
        assert!(config.cookie.is_none());
    }
}
