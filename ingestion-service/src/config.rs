use std::{env, fmt, fs, path::PathBuf};

use anyhow::{bail, Context};
use serde::Deserialize;
use sqlx::postgres::PgConnectOptions;

const DEFAULT_CONFIG_PATH: &str = "ingestion-config.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphiteConfig {
    pub base_url: String,
    /// Relative window start, e.g. `-60min` or `-2weeks`.
    pub from: String,
    pub until: Option<String>,
    pub target_prefix: String,
    pub ssid_pattern: String,
    pub timeout_secs: u64,
    pub max_targets_per_query: usize,
}

impl Default for GraphiteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://graphite-kom.srv.lrz.de".to_string(),
            from: "-60min".to_string(),
            until: None,
            target_prefix: "ap".to_string(),
            ssid_pattern: "ssid.*".to_string(),
            timeout_secs: 30,
            max_targets_per_query: 64,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    pub topology_path: PathBuf,
    pub batch_size: usize,
    /// Repeat the crawl every this many seconds; run once when unset.
    pub interval_secs: Option<u64>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            topology_path: PathBuf::from("bibs.json"),
            batch_size: 1000,
            interval_secs: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub apply_schema: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: 2,
            apply_schema: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub graphite: GraphiteConfig,
    pub crawl: CrawlConfig,
    pub database: DatabaseConfig,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    /// Load from the file named by `INGESTION_CONFIG`, else from
    /// `ingestion-config.toml` if present, else built-in defaults.
    pub fn load() -> anyhow::Result<Self> {
        match env::var("INGESTION_CONFIG") {
            Ok(path) => Self::from_file(&path),
            Err(_) if fs::metadata(DEFAULT_CONFIG_PATH).is_ok() => Self::from_file(DEFAULT_CONFIG_PATH),
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path).with_context(|| format!("failed to read config {path}"))?;
        Self::from_toml_str(&contents).with_context(|| format!("invalid config {path}"))
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.graphite.base_url.is_empty() {
            bail!("graphite.base_url must not be empty");
        }
        if self.graphite.from.is_empty() {
            bail!("graphite.from must not be empty");
        }
        if self.graphite.max_targets_per_query == 0 {
            bail!("graphite.max_targets_per_query must be at least 1");
        }
        if self.crawl.batch_size == 0 {
            bail!("crawl.batch_size must be at least 1");
        }
        if self.crawl.interval_secs == Some(0) {
            bail!("crawl.interval_secs must be at least 1");
        }
        Ok(())
    }
}

/// Postgres credentials taken from `DB_NAME`, `DB_USER`, `DB_PASSWORD`,
/// `DB_HOST` and `DB_PORT`.
#[derive(Clone)]
pub struct DbCredentials {
    pub name: String,
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
}

impl fmt::Debug for DbCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbCredentials")
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}

impl DbCredentials {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut missing = Vec::new();
        let mut required = |key: &'static str| {
            lookup(key).filter(|v| !v.is_empty()).unwrap_or_else(|| {
                missing.push(key);
                String::new()
            })
        };

        let name = required("DB_NAME");
        let user = required("DB_USER");
        let password = required("DB_PASSWORD");
        let host = required("DB_HOST");
        if !missing.is_empty() {
            bail!("missing database environment variables: {}", missing.join(", "));
        }

        let port = match lookup("DB_PORT") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("DB_PORT is not a valid port: {raw:?}"))?,
            None => 5432,
        };

        Ok(Self {
            name,
            user,
            password,
            host,
            port,
        })
    }

    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.name)
    }
}
