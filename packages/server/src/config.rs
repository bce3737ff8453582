use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub media_root: PathBuf,
    pub worker_count: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://dispatch_hub.db".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            media_root: env::var("MEDIA_ROOT")
                .unwrap_or_else(|_| "media".to_string())
                .into(),
            worker_count: env::var("WORKER_COUNT")
                .unwrap_or_else(|_| "4".to_string())
                .parse()
                .context("WORKER_COUNT must be a valid number")?,
        })
    }
}
