//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "kms-cache";
pub const DEFAULT_STORE_PORT: u16 = 6379;
const DEFAULT_PRIME_PAGE_SIZE: u32 = 2000;
const DEFAULT_FALLBACK_MAX_PAGES: u32 = 25;
const DEFAULT_MAX_FULL_PATHS: usize = 200;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
// Off-peak nightly run; the upstream producers absorb the full route sweep.
pub const DEFAULT_PRIME_SCHEDULE: &str = "0 0 6 * * *";
const DEFAULT_API_BASE_URL: &str = "http://localhost:3000";
const DEFAULT_SPARQL_BASE_URL: &str = "http://localhost:8080";

/// Command-line arguments for the kms-cache binary.
#[derive(Debug, Parser)]
#[command(name = "kms-cache", version, about = "Keyword cache priming service")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "KMS_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the cron scheduler that primes the cache on the configured cadence.
    Serve(Box<ServeArgs>),
    /// Run a single priming pass and print the JSON summary.
    Prime(Box<PrimeArgs>),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: Overrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct PrimeArgs {
    #[command(flatten)]
    pub overrides: Overrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct Overrides {
    /// Toggle the key-value store; when disabled the whole subsystem no-ops.
    #[arg(
        long = "store-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub store_enabled: Option<bool>,

    /// Override the key-value store host.
    #[arg(long = "store-host", value_name = "HOST")]
    pub store_host: Option<String>,

    /// Override the key-value store port.
    #[arg(long = "store-port", value_name = "PORT")]
    pub store_port: Option<u16>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the keyword API base URL the primers warm against.
    #[arg(long = "api-base-url", value_name = "URL")]
    pub api_base_url: Option<String>,

    /// Override the SPARQL server base URL used for version metadata.
    #[arg(long = "sparql-base-url", value_name = "URL")]
    pub sparql_base_url: Option<String>,

    /// Override the maximum number of full-path lookups warmed per run.
    #[arg(long = "prime-max-full-paths", value_name = "COUNT")]
    pub prime_max_full_paths: Option<usize>,

    /// Override the per-request timeout for priming calls.
    #[arg(long = "prime-request-timeout-ms", value_name = "MILLIS")]
    pub prime_request_timeout_ms: Option<u64>,

    /// Override the cron expression for the scheduled priming job.
    #[arg(long = "prime-schedule", value_name = "CRON")]
    pub prime_schedule: Option<String>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub store: StoreSettings,
    pub prime: PrimeSettings,
    pub upstream: UpstreamSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

/// Connection settings for the shared key-value store.
///
/// An absent host or a disabled flag means "store unavailable", never a
/// startup error.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub enabled: bool,
    pub host: Option<String>,
    pub port: u16,
}

impl StoreSettings {
    pub fn is_configured(&self) -> bool {
        self.enabled && self.host.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct PrimeSettings {
    pub page_size: u32,
    pub fallback_max_pages: u32,
    pub max_full_paths: usize,
    pub request_timeout: Duration,
    pub schedule: String,
}

#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    pub api_base_url: String,
    pub sparql_base_url: String,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("KMS").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_overrides(&args.overrides),
        Some(Command::Prime(args)) => raw.apply_overrides(&args.overrides),
        None => raw.apply_overrides(&Overrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    store: RawStoreSettings,
    prime: RawPrimeSettings,
    upstream: RawUpstreamSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(enabled) = overrides.store_enabled {
            self.store.enabled = Some(enabled);
        }
        if let Some(host) = overrides.store_host.as_ref() {
            self.store.host = Some(host.clone());
        }
        if let Some(port) = overrides.store_port {
            self.store.port = Some(port);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.api_base_url.as_ref() {
            self.upstream.api_base_url = Some(url.clone());
        }
        if let Some(url) = overrides.sparql_base_url.as_ref() {
            self.upstream.sparql_base_url = Some(url.clone());
        }
        if let Some(max) = overrides.prime_max_full_paths {
            self.prime.max_full_paths = Some(max);
        }
        if let Some(timeout) = overrides.prime_request_timeout_ms {
            self.prime.request_timeout_ms = Some(timeout);
        }
        if let Some(schedule) = overrides.prime_schedule.as_ref() {
            self.prime.schedule = Some(schedule.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            store,
            prime,
            upstream,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            store: build_store_settings(store)?,
            prime: build_prime_settings(prime)?,
            upstream: build_upstream_settings(upstream),
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_store_settings(store: RawStoreSettings) -> Result<StoreSettings, LoadError> {
    let host = store.host.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let port = store.port.unwrap_or(DEFAULT_STORE_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "store.port",
            "port must be greater than zero",
        ));
    }

    Ok(StoreSettings {
        enabled: store.enabled.unwrap_or(false),
        host,
        port,
    })
}

fn build_prime_settings(prime: RawPrimeSettings) -> Result<PrimeSettings, LoadError> {
    let page_size = prime.page_size.unwrap_or(DEFAULT_PRIME_PAGE_SIZE);
    if page_size == 0 {
        return Err(LoadError::invalid(
            "prime.page_size",
            "must be greater than zero",
        ));
    }

    let fallback_max_pages = prime
        .fallback_max_pages
        .unwrap_or(DEFAULT_FALLBACK_MAX_PAGES);
    if fallback_max_pages == 0 {
        return Err(LoadError::invalid(
            "prime.fallback_max_pages",
            "must be greater than zero",
        ));
    }

    let timeout_ms = prime
        .request_timeout_ms
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS);
    if timeout_ms == 0 {
        return Err(LoadError::invalid(
            "prime.request_timeout_ms",
            "must be greater than zero",
        ));
    }

    let schedule = prime
        .schedule
        .unwrap_or_else(|| DEFAULT_PRIME_SCHEDULE.to_string());

    Ok(PrimeSettings {
        page_size,
        fallback_max_pages,
        max_full_paths: prime.max_full_paths.unwrap_or(DEFAULT_MAX_FULL_PATHS),
        request_timeout: Duration::from_millis(timeout_ms),
        schedule,
    })
}

fn build_upstream_settings(upstream: RawUpstreamSettings) -> UpstreamSettings {
    UpstreamSettings {
        api_base_url: upstream
            .api_base_url
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
        sparql_base_url: upstream
            .sparql_base_url
            .unwrap_or_else(|| DEFAULT_SPARQL_BASE_URL.to_string()),
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStoreSettings {
    enabled: Option<bool>,
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPrimeSettings {
    page_size: Option<u32>,
    fallback_max_pages: Option<u32>,
    max_full_paths: Option<usize>,
    request_timeout_ms: Option<u64>,
    schedule: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawUpstreamSettings {
    api_base_url: Option<String>,
    sparql_base_url: Option<String>,
}
