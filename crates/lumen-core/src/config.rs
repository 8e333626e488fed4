//! Configuration module
//!
//! Settings are read from the environment (after loading an optional `.env`
//! file) with typed defaults, then validated once at startup.

use std::env;

const DEFAULT_APP_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_HOST: &str = "0.0.0.0";
const SCAN_QUEUE_CAPACITY: usize = 100;
const SCAN_WORKERS: usize = 1;
const PA11Y_COMMAND: &str = "pa11y";
const PA11Y_DEFAULT_RUNNER: &str = "htmlcs";
const SCAN_TIMEOUT_SECS: u64 = 300;
const REACHABILITY_TIMEOUT_SECS: u64 = 15;
const TASK_REAP_INTERVAL_SECS: u64 = 60;

/// Runner profiles the scanner understands.
pub const SUPPORTED_RUNNERS: &[&str] = &["htmlcs", "axe"];

/// Server-level settings
#[derive(Clone, Debug)]
pub struct BaseConfig {
    /// `host:port` the HTTP server binds to.
    pub server_addr: String,
    pub environment: String,
}

/// Queue, worker and scanner settings
#[derive(Clone, Debug)]
pub struct ScanConfig {
    pub queue_capacity: usize,
    pub workers: usize,
    /// Full scanner command line; the first token is the program.
    pub command: String,
    pub default_runner: String,
    /// Per-task scan deadline. 0 = no deadline.
    pub scan_timeout_secs: u64,
    pub reachability_check_enabled: bool,
    pub reachability_timeout_secs: u64,
    /// Terminal tasks older than this are evicted. 0 = keep forever.
    pub task_retention_secs: u64,
    pub task_reap_interval_secs: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            queue_capacity: SCAN_QUEUE_CAPACITY,
            workers: SCAN_WORKERS,
            command: PA11Y_COMMAND.to_string(),
            default_runner: PA11Y_DEFAULT_RUNNER.to_string(),
            scan_timeout_secs: SCAN_TIMEOUT_SECS,
            reachability_check_enabled: true,
            reachability_timeout_secs: REACHABILITY_TIMEOUT_SECS,
            task_retention_secs: 0,
            task_reap_interval_secs: TASK_REAP_INTERVAL_SECS,
        }
    }
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub base: BaseConfig,
    pub scan: ScanConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let app_addr = env::var("APP_ADDR").unwrap_or_else(|_| DEFAULT_APP_ADDR.to_string());
        let port = env::var("PORT").ok();
        let server_addr = resolve_server_addr(&app_addr, port.as_deref())?;

        let defaults = ScanConfig::default();
        let scan = ScanConfig {
            queue_capacity: env_parse("SCAN_QUEUE_CAPACITY", defaults.queue_capacity),
            workers: env_parse("SCAN_WORKERS", defaults.workers),
            command: env::var("PA11Y_COMMAND")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.command),
            default_runner: env::var("PA11Y_DEFAULT_RUNNER")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.default_runner),
            scan_timeout_secs: env_parse("SCAN_TIMEOUT_SECS", defaults.scan_timeout_secs),
            reachability_check_enabled: env::var("REACHABILITY_CHECK_ENABLED")
                .map(|v| parse_bool(&v))
                .unwrap_or(defaults.reachability_check_enabled),
            reachability_timeout_secs: env_parse(
                "REACHABILITY_TIMEOUT_SECS",
                defaults.reachability_timeout_secs,
            ),
            task_retention_secs: env_parse("TASK_RETENTION_SECS", defaults.task_retention_secs),
            task_reap_interval_secs: env_parse(
                "TASK_REAP_INTERVAL_SECS",
                defaults.task_reap_interval_secs,
            ),
        };

        let config = Config {
            base: BaseConfig {
                server_addr,
                environment,
            },
            scan,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.scan.queue_capacity == 0 {
            return Err(anyhow::anyhow!("SCAN_QUEUE_CAPACITY must be at least 1"));
        }

        if self.scan.workers == 0 {
            return Err(anyhow::anyhow!("SCAN_WORKERS must be at least 1"));
        }

        if self.scan.reachability_timeout_secs == 0 {
            return Err(anyhow::anyhow!(
                "REACHABILITY_TIMEOUT_SECS must be greater than 0"
            ));
        }

        if self.scan.task_retention_secs > 0 && self.scan.task_reap_interval_secs == 0 {
            return Err(anyhow::anyhow!(
                "TASK_REAP_INTERVAL_SECS must be greater than 0 when TASK_RETENTION_SECS is set"
            ));
        }

        if !SUPPORTED_RUNNERS.contains(&self.scan.default_runner.as_str()) {
            return Err(anyhow::anyhow!(
                "PA11Y_DEFAULT_RUNNER must be one of: {}",
                SUPPORTED_RUNNERS.join(", ")
            ));
        }

        Ok(())
    }
}

/// Combine `APP_ADDR` and an optional `PORT` override into a bindable address.
///
/// `APP_ADDR` may be `host:port` or `:port`; an empty host binds all
/// interfaces. When `PORT` is set it replaces whatever port `APP_ADDR` named.
pub fn resolve_server_addr(app_addr: &str, port: Option<&str>) -> Result<String, anyhow::Error> {
    let app_addr = app_addr.trim();
    let (host, addr_port) = match app_addr.rsplit_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (app_addr, None),
    };
    let host = if host.is_empty() { DEFAULT_HOST } else { host };

    let port = match port.map(str::trim).filter(|p| !p.is_empty()) {
        Some(port) => port,
        None => addr_port
            .filter(|p| !p.is_empty())
            .ok_or_else(|| anyhow::anyhow!("APP_ADDR must include a port or PORT must be set"))?,
    };

    let port: u16 = port
        .parse()
        .map_err(|_| anyhow::anyhow!("PORT must be a valid number, got '{}'", port))?;

    Ok(format!("{}:{}", host, port))
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
