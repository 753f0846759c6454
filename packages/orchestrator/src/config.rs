use anyhow::{Context, Result};
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

use crate::models::{Credential, WorkerRole};

pub const ENV_DATABASE_URL: &str = "SCRAPER_DATABASE_URL";
pub const ENV_LOG_BASE: &str = "SCRAPER_LOG_BASE";
pub const ENV_PORTAL_URL: &str = "SCRAPER_PORTAL_URL";
pub const ENV_LOGIN_URL: &str = "SCRAPER_LOGIN_URL";
pub const ENV_PROXY_POOL: &str = "SCRAPER_PROXY_POOL";

const DEFAULT_PORTAL_URL: &str = "https://www.crunchbase.com";
const DEFAULT_LOGIN_PATH: &str = "/v4/cb/sessions";

/// Run mode requested on the command line or in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
#[clap(rename_all = "snake_case")]
pub enum RunMode {
    All,
    NewOnly,
    UpdateOnly,
}

impl Default for RunMode {
    fn default() -> Self {
        RunMode::All
    }
}

/// The JSON config file written by the management layer.
///
/// Read once at startup; CLI flags and environment override it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub accounts: Vec<Credential>,
    pub database_url: Option<String>,
    pub log_base_path: Option<String>,
    pub portal_base_url: Option<String>,
    pub login_url: Option<String>,
    #[serde(default)]
    pub proxies: Vec<String>,
    pub batch_size_new: Option<usize>,
    pub batch_size_update: Option<usize>,
    pub max_batches_new: Option<usize>,
    pub max_batches_update: Option<usize>,
    pub update_account_count: Option<usize>,
    pub new_account_count: Option<usize>,
    pub mode: Option<RunMode>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }
}

/// Fully resolved orchestrator configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub accounts: Vec<Credential>,
    pub database_url: String,
    pub log_base: PathBuf,
    pub portal_base_url: String,
    pub login_url: String,
    pub proxies: Vec<String>,
    pub batch_size_new: Option<usize>,
    pub batch_size_update: Option<usize>,
    pub max_batches_new: Option<usize>,
    pub max_batches_update: Option<usize>,
    pub update_account_count: Option<usize>,
    pub new_account_count: Option<usize>,
    pub mode: RunMode,
}

impl Config {
    /// Resolve configuration: environment > config file > defaults.
    pub fn resolve(file: ConfigFile) -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let database_url = env::var(ENV_DATABASE_URL)
            .ok()
            .or(file.database_url)
            .context("database URL must be set (SCRAPER_DATABASE_URL or config file)")?;

        let log_base = env::var(ENV_LOG_BASE)
            .ok()
            .or(file.log_base_path)
            .unwrap_or_else(|| "logs".to_string());

        let portal_base_url = env::var(ENV_PORTAL_URL)
            .ok()
            .or(file.portal_base_url)
            .unwrap_or_else(|| DEFAULT_PORTAL_URL.to_string());

        let login_url = env::var(ENV_LOGIN_URL)
            .ok()
            .or(file.login_url)
            .unwrap_or_else(|| format!("{portal_base_url}{DEFAULT_LOGIN_PATH}"));

        let proxies = match env::var(ENV_PROXY_POOL) {
            Ok(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect(),
            Err(_) => file.proxies,
        };

        Ok(Self {
            accounts: file.accounts,
            database_url,
            log_base: PathBuf::from(log_base),
            portal_base_url,
            login_url,
            proxies,
            batch_size_new: file.batch_size_new,
            batch_size_update: file.batch_size_update,
            max_batches_new: file.max_batches_new,
            max_batches_update: file.max_batches_update,
            update_account_count: file.update_account_count,
            new_account_count: file.new_account_count,
            mode: file.mode.unwrap_or_default(),
        })
    }

    /// Environment passed to each spawned worker process.
    pub fn worker_env(&self) -> Vec<(String, String)> {
        let mut env = vec![
            (ENV_DATABASE_URL.to_string(), self.database_url.clone()),
            (
                ENV_LOG_BASE.to_string(),
                self.log_base.to_string_lossy().to_string(),
            ),
            (ENV_PORTAL_URL.to_string(), self.portal_base_url.clone()),
            (ENV_LOGIN_URL.to_string(), self.login_url.clone()),
        ];
        if !self.proxies.is_empty() {
            env.push((ENV_PROXY_POOL.to_string(), self.proxies.join(",")));
        }
        for (var, value) in [
            ("SCRAPER_BATCH_SIZE_NEW", self.batch_size_new),
            ("SCRAPER_BATCH_SIZE_UPDATE", self.batch_size_update),
            ("SCRAPER_MAX_BATCHES_NEW", self.max_batches_new),
            ("SCRAPER_MAX_BATCHES_UPDATE", self.max_batches_update),
        ] {
            if let Some(value) = value {
                env.push((var.to_string(), value.to_string()));
            }
        }
        env
    }
}

/// Batch settings for one worker, resolved in precedence order:
/// environment override > explicit argument > default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSettings {
    pub batch_size: usize,
    pub max_batches: usize,
}

impl BatchSettings {
    pub fn defaults_for(role: WorkerRole) -> Self {
        match role {
            WorkerRole::New => Self {
                batch_size: 10,
                max_batches: 10,
            },
            WorkerRole::Update => Self {
                batch_size: 10,
                max_batches: 50,
            },
        }
    }

    /// Resolve for one role, consulting `SCRAPER_BATCH_SIZE_{ROLE}`
    /// and `SCRAPER_MAX_BATCHES_{ROLE}` first, then the explicit
    /// arguments, then the defaults.
    pub fn resolve(
        role: WorkerRole,
        batch_size: Option<usize>,
        max_batches: Option<usize>,
    ) -> Self {
        let defaults = Self::defaults_for(role);
        let suffix = role.as_str().to_uppercase();
        let env_usize = |name: String| env::var(name).ok().and_then(|v| v.parse().ok());

        Self {
            batch_size: env_usize(format!("SCRAPER_BATCH_SIZE_{suffix}"))
                .or(batch_size)
                .unwrap_or(defaults.batch_size),
            max_batches: env_usize(format!("SCRAPER_MAX_BATCHES_{suffix}"))
                .or(max_batches)
                .unwrap_or(defaults.max_batches),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_settings_argument_beats_default() {
        let settings = BatchSettings::resolve(WorkerRole::New, Some(3), None);
        assert_eq!(settings.batch_size, 3);
        assert_eq!(settings.max_batches, 10);
    }

    #[test]
    fn update_role_defaults() {
        let settings = BatchSettings::defaults_for(WorkerRole::Update);
        assert_eq!(settings.max_batches, 50);
    }

    #[test]
    fn config_file_parses_accounts() {
        let raw = r#"{
            "accounts": [
                {"id": "a@example.com", "secret": "pw", "active": true},
                {"id": "b@example.com", "secret": "pw", "active": false}
            ],
            "database_url": "postgres://localhost/scrape",
            "update_account_count": 1
        }"#;
        let file: ConfigFile = serde_json::from_str(raw).unwrap();
        assert_eq!(file.accounts.len(), 2);
        assert!(!file.accounts[1].active);
        assert_eq!(file.update_account_count, Some(1));
    }
}
