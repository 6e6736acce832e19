use std::path::PathBuf;

use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;

use crate::constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, SESSION_EXPIRY_HOURS};

/// Process-wide settings, built once at startup and handed to whatever needs them.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
    #[serde(default)]
    pub assets: AssetConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JwtConfig {
    pub secret: String,
    #[serde(default = "default_expiry_hours")]
    pub expiry_hours: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaginationConfig {
    #[serde(default = "default_page_size")]
    pub page_size: i64,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: i64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

/// Static files the shopping list document is rendered with.
#[derive(Debug, Deserialize, Clone)]
pub struct AssetConfig {
    #[serde(default = "default_title_font")]
    pub title_font: PathBuf,
    #[serde(default = "default_body_font")]
    pub body_font: PathBuf,
    #[serde(default = "default_background")]
    pub background: PathBuf,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            title_font: default_title_font(),
            body_font: default_body_font(),
            background: default_background(),
        }
    }
}

fn default_max_connections() -> u32 {
    5
}

fn default_expiry_hours() -> i64 {
    SESSION_EXPIRY_HOURS
}

fn default_page_size() -> i64 {
    DEFAULT_PAGE_SIZE
}

fn default_max_page_size() -> i64 {
    MAX_PAGE_SIZE
}

fn default_title_font() -> PathBuf {
    PathBuf::from("assets/fonts/title.ttf")
}

fn default_body_font() -> PathBuf {
    PathBuf::from("assets/fonts/body.ttf")
}

fn default_background() -> PathBuf {
    PathBuf::from("assets/shopping_list.jpg")
}

impl Config {
    /// Reads `foodgram.toml` when present, then `FOODGRAM__SECTION__KEY` overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("foodgram")
    }

    pub fn load_from(file: &str) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::with_name(file).required(false))
            .add_source(Environment::with_prefix("FOODGRAM").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}
