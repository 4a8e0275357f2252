//! Configuration management

use anyhow::{Context, Result};

use crate::identity::{country_by_alpha2, Country, COUNTRIES};

const DEFAULT_PROGRESS_INTERVAL: usize = 10;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Home country for phone normalization (the detailer's country)
    pub home_country: &'static Country,

    /// Emit a progress frame every N rows
    pub progress_interval: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let bind_addr = std::env::var("BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:5810".to_string());

        let database_url = std::env::var("DATABASE_URL")
            .context("DATABASE_URL must be set")?;

        let home_alpha2 = std::env::var("HOME_COUNTRY").unwrap_or_else(|_| "US".to_string());
        let home_country = country_by_alpha2(&home_alpha2).with_context(|| {
            let supported: Vec<&str> = COUNTRIES.iter().map(|c| c.alpha2).collect();
            format!(
                "HOME_COUNTRY '{}' is not supported (supported: {})",
                home_alpha2,
                supported.join(", ")
            )
        })?;

        let progress_interval = parse_progress_interval(std::env::var("PROGRESS_INTERVAL").ok())?;

        Ok(Self {
            bind_addr,
            database_url,
            home_country,
            progress_interval,
        })
    }
}

fn parse_progress_interval(value: Option<String>) -> Result<usize> {
    match value {
        None => Ok(DEFAULT_PROGRESS_INTERVAL),
        Some(raw) => {
            let parsed: usize = raw
                .parse()
                .with_context(|| format!("PROGRESS_INTERVAL '{}' is not a number", raw))?;
            if parsed == 0 {
                anyhow::bail!("PROGRESS_INTERVAL must be at least 1");
            }
            Ok(parsed)
        }
    }
}
