//! Simple configuration persistence for Glissando
//!
//! Stores user preferences like metronome level and the last opened song.

use glissando_audio::{EngineConfig, LimiterSettings, MetronomeConfig, DEFAULT_COMMAND_CAPACITY};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::warn;

/// Application configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub metronome_enabled: bool,
    pub metronome_gain_db: f32,
    pub limiter_threshold_db: f32,
    pub limiter_ratio: f32,
    pub command_queue_capacity: usize,
    /// Song manifest opened last
    pub last_song: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        let limiter = LimiterSettings::default();
        let metronome = MetronomeConfig::default();
        Self {
            metronome_enabled: metronome.enabled,
            metronome_gain_db: metronome.gain_db,
            limiter_threshold_db: limiter.threshold_db,
            limiter_ratio: limiter.ratio,
            command_queue_capacity: DEFAULT_COMMAND_CAPACITY,
            last_song: None,
        }
    }
}

impl Config {
    /// Load config from the default location
    ///
    /// Returns default config if file doesn't exist or can't be read.
    pub fn load() -> Self {
        let path = Self::config_path();
        Self::load_from(&path).unwrap_or_default()
    }

    /// Load config from a specific path
    pub fn load_from(path: &Path) -> io::Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    /// Save config to the default location
    pub fn save(&self) -> io::Result<()> {
        let path = Self::config_path();
        self.save_to(&path)
    }

    /// Save config to a specific path
    pub fn save_to(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.serialize())
    }

    /// Get the default config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("glissando")
            .join("config.txt")
    }

    /// Engine settings derived from these preferences
    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            command_capacity: self.command_queue_capacity.max(1),
            metronome: MetronomeConfig {
                enabled: self.metronome_enabled,
                gain_db: self.metronome_gain_db,
            },
            limiter: LimiterSettings {
                threshold_db: self.limiter_threshold_db,
                ratio: self.limiter_ratio.max(1.0),
                ..LimiterSettings::default()
            },
        }
    }

    /// Parse config from simple key=value format
    fn parse(content: &str) -> Self {
        let mut config = Self::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = value.trim();

                match key {
                    "metronome_enabled" => set_parsed(&mut config.metronome_enabled, key, value),
                    "metronome_gain_db" => set_parsed(&mut config.metronome_gain_db, key, value),
                    "limiter_threshold_db" => {
                        set_parsed(&mut config.limiter_threshold_db, key, value)
                    }
                    "limiter_ratio" => set_parsed(&mut config.limiter_ratio, key, value),
                    "command_queue_capacity" => {
                        set_parsed(&mut config.command_queue_capacity, key, value)
                    }
                    "last_song" => {
                        if !value.is_empty() {
                            config.last_song = Some(PathBuf::from(value));
                        }
                    }
                    _ => {} // Ignore unknown keys
                }
            }
        }

        config
    }

    /// Serialize config to simple key=value format
    fn serialize(&self) -> String {
        let mut lines = vec![
            "# Glissando Configuration".to_string(),
            format!("metronome_enabled={}", self.metronome_enabled),
            format!("metronome_gain_db={}", self.metronome_gain_db),
            format!("limiter_threshold_db={}", self.limiter_threshold_db),
            format!("limiter_ratio={}", self.limiter_ratio),
            format!("command_queue_capacity={}", self.command_queue_capacity),
        ];

        if let Some(ref song) = self.last_song {
            lines.push(format!("last_song={}", song.display()));
        }

        lines.join("\n")
    }
}

/// Keep the current value when `value` does not parse
fn set_parsed<T: FromStr>(field: &mut T, key: &str, value: &str) {
    match value.parse() {
        Ok(parsed) => *field = parsed,
        Err(_) => warn!("Ignoring invalid config value {}={}", key, value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty() {
        let config = Config::parse("");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_parse_values() {
        let content = "metronome_enabled=true\nmetronome_gain_db=-6.5\nlast_song=/songs/set.song";
        let config = Config::parse(content);
        assert!(config.metronome_enabled);
        assert_eq!(config.metronome_gain_db, -6.5);
        assert_eq!(config.last_song, Some(PathBuf::from("/songs/set.song")));
    }

    #[test]
    fn test_parse_with_comments_and_junk() {
        let content = "# Comment\nlimiter_ratio=12\nunknown=1\nlimiter_threshold_db=loud\n# Another";
        let config = Config::parse(content);
        assert_eq!(config.limiter_ratio, 12.0);
        assert_eq!(
            config.limiter_threshold_db,
            LimiterSettings::default().threshold_db
        );
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = Config {
            metronome_enabled: true,
            metronome_gain_db: -3.0,
            command_queue_capacity: 256,
            last_song: Some(PathBuf::from("/test/song.txt")),
            ..Config::default()
        };

        let parsed = Config::parse(&config.serialize());
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.txt");

        let config = Config {
            metronome_gain_db: -9.0,
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_engine_config() {
        let config = Config {
            metronome_enabled: true,
            metronome_gain_db: -12.0,
            limiter_ratio: 0.5,
            command_queue_capacity: 0,
            ..Config::default()
        };
        let engine = config.to_engine_config();
        assert!(engine.metronome.enabled);
        assert_eq!(engine.metronome.gain_db, -12.0);
        assert_eq!(engine.limiter.ratio, 1.0);
        assert_eq!(engine.command_capacity, 1);
    }
}
