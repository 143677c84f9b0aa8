//! Configuration file support for obrolan
//!
//! Loads config from ~/.obrolan/config.toml

use serde::Deserialize;
use std::path::PathBuf;

/// Configuration for obrolan
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Gemini API key
    pub gemini_api_key: Option<String>,

    /// House-sales data endpoint
    pub house_sales_url: Option<String>,

    /// HTTP server port
    pub port: Option<u16>,
}

impl Config {
    /// Load config from ~/.obrolan/config.toml
    pub fn load() -> Self {
        let path = config_path();

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Warning: Failed to parse {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("Warning: Failed to read {}: {}", path.display(), e);
                Self::default()
            }
        }
    }
}

/// Get the config file path
pub fn config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_default()
        .join(".obrolan")
        .join("config.toml")
}
