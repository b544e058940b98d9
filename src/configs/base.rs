use serde::{Deserialize, Serialize};

use crate::common::types::AnyResult;
use crate::configs::*;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub speech: Option<SpeechConfig>,
    #[serde(default)]
    pub logging: Option<LoggingConfig>,
}

impl Config {
    pub fn load() -> AnyResult<Self> {
        let config_path = if std::path::Path::new("config.toml").exists() {
            "config.toml"
        } else if std::path::Path::new("config.default.toml").exists() {
            "config.default.toml"
        } else {
            return Err("config.toml or config.default.toml not found".into());
        };

        crate::log_println!("Loading configuration from: {}", config_path);

        let config_str = std::fs::read_to_string(config_path)?;
        if config_str.is_empty() {
            return Err(format!("{} is empty", config_path).into());
        }

        let config: Config = toml::from_str(&config_str)?;
        Ok(config)
    }
}
