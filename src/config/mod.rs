//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    collections::BTreeMap,
    num::NonZeroU32,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/stns/client/stns.conf";
const ENV_PREFIX: &str = "STNSD";
const DEFAULT_API_ENDPOINT: &str = "http://localhost:1104/v1";
const DEFAULT_UNIX_SOCKET: &str = "/var/run/stnsd.sock";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_REQUEST_RETRY: u64 = 3;
const DEFAULT_REQUEST_LOCKTIME_SECS: u64 = 60;
const DEFAULT_RETRY_DELAY_MS: u64 = 1000;
const DEFAULT_CACHE_TTL_SECS: u64 = 600;
const DEFAULT_NEGATIVE_CACHE_TTL_SECS: u64 = 60;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 5;
const DEFAULT_HEALTH_CHECK_INTERVAL_SECS: u64 = 30;

/// Command-line arguments for the cache-stnsd binary.
#[derive(Debug, Parser)]
#[command(
    name = "cache-stnsd",
    version,
    about = "Caching proxy daemon for STNS identity lookups"
)]
pub struct CliArgs {
    /// Path to the STNS client configuration file.
    #[arg(
        long = "config",
        short = 'c',
        env = "STNSD_CONFIG",
        value_name = "PATH",
        value_hint = ValueHint::FilePath,
        default_value = DEFAULT_CONFIG_PATH,
        global = true
    )]
    pub config_file: PathBuf,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Write logs to this file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Write the daemon's PID to this file.
    #[arg(long = "pid-file", value_name = "PATH", global = true)]
    pub pid_file: Option<PathBuf>,

    /// Unix domain socket to listen on.
    #[arg(
        long = "unix-socket",
        short = 's',
        env = "STNSD_UNIX_SOCKET",
        value_name = "PATH",
        global = true
    )]
    pub unix_socket: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the caching proxy on the unix domain socket.
    Server(ServerArgs),
    /// Print the version and exit.
    Version,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServerArgs {
    #[command(flatten)]
    pub overrides: ServerOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServerOverrides {
    /// Toggle background prefetching of users and groups.
    #[arg(
        long = "prefetch",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub prefetch: Option<bool>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "graceful-shutdown-seconds", value_name = "SECONDS")]
    pub graceful_shutdown_seconds: Option<u64>,
}

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub source: ConfigSource,
    pub upstream: UpstreamSettings,
    pub cache: CacheSettings,
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub pid_file: Option<PathBuf>,
}

/// Which configuration file was consulted.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    pub path: PathBuf,
    pub found: bool,
}

#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    pub endpoint: Url,
    pub auth_token: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub ssl_verify: bool,
    pub http_proxy: Option<String>,
    pub keepalive: bool,
    pub headers: BTreeMap<String, String>,
    pub tls: TlsSettings,
    pub request_timeout: Duration,
    pub request_retry: NonZeroU32,
    pub retry_delay: Duration,
    pub lock_duration: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct TlsSettings {
    pub ca: Option<PathBuf>,
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub ttl: Duration,
    pub negative_ttl: Duration,
    pub prefetch: bool,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub unix_socket: PathBuf,
    pub graceful_shutdown: Duration,
    pub health_check_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
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
///
/// A missing configuration file is not an error; defaults apply.
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let path = cli.config_file.as_path();
    let found = path.is_file();

    let mut raw: RawSettings = Config::builder()
        .add_source(
            File::from(path)
                .format(FileFormat::Toml)
                .required(false),
        )
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;

    raw.apply_global_overrides(cli);
    match cli.command.as_ref() {
        Some(Command::Server(args)) => raw.apply_server_overrides(&args.overrides),
        Some(Command::Version) | None => {}
    }

    Settings::from_raw(raw, source(path, found))
}

fn source(path: &Path, found: bool) -> ConfigSource {
    ConfigSource {
        path: path.to_path_buf(),
        found,
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    api_endpoint: Option<String>,
    auth_token: Option<String>,
    user: Option<String>,
    password: Option<String>,
    ssl_verify: Option<bool>,
    http_proxy: Option<String>,
    http_keepalive: Option<bool>,
    request_timeout: Option<u64>,
    request_retry: Option<u64>,
    request_locktime: Option<u64>,
    cache: Option<bool>,
    cache_ttl: Option<u64>,
    negative_cache_ttl: Option<u64>,
    http_headers: BTreeMap<String, String>,
    tls: RawTlsSettings,
    cached: RawCachedSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawTlsSettings {
    ca: Option<PathBuf>,
    cert: Option<PathBuf>,
    key: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCachedSettings {
    unix_socket: Option<PathBuf>,
    prefetch: Option<bool>,
    retry_delay_ms: Option<u64>,
    graceful_shutdown_seconds: Option<u64>,
    health_check_interval_seconds: Option<u64>,
    pid_file: Option<PathBuf>,
    log_file: Option<PathBuf>,
    log_level: Option<String>,
    log_json: Option<bool>,
}

impl RawSettings {
    fn apply_global_overrides(&mut self, cli: &CliArgs) {
        if let Some(level) = cli.log_level.as_ref() {
            self.cached.log_level = Some(level.clone());
        }
        if let Some(file) = cli.log_file.as_ref() {
            self.cached.log_file = Some(file.clone());
        }
        if let Some(json) = cli.log_json {
            self.cached.log_json = Some(json);
        }
        if let Some(pid_file) = cli.pid_file.as_ref() {
            self.cached.pid_file = Some(pid_file.clone());
        }
        if let Some(socket) = cli.unix_socket.as_ref() {
            self.cached.unix_socket = Some(socket.clone());
        }
    }

    fn apply_server_overrides(&mut self, overrides: &ServerOverrides) {
        if let Some(prefetch) = overrides.prefetch {
            self.cached.prefetch = Some(prefetch);
        }
        if let Some(seconds) = overrides.graceful_shutdown_seconds {
            self.cached.graceful_shutdown_seconds = Some(seconds);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings, source: ConfigSource) -> Result<Self, LoadError> {
        let upstream = build_upstream_settings(&raw)?;
        let cache = build_cache_settings(&raw)?;
        let server = build_server_settings(&raw.cached)?;
        let logging = build_logging_settings(&raw.cached)?;
        let pid_file = non_empty_path(raw.cached.pid_file);

        Ok(Self {
            source,
            upstream,
            cache,
            server,
            logging,
            pid_file,
        })
    }
}

fn build_upstream_settings(raw: &RawSettings) -> Result<UpstreamSettings, LoadError> {
    let endpoint_value = raw
        .api_endpoint
        .as_deref()
        .map(str::trim)
        .unwrap_or(DEFAULT_API_ENDPOINT);
    let endpoint = Url::parse(endpoint_value)
        .map_err(|err| LoadError::invalid("api_endpoint", format!("`{endpoint_value}`: {err}")))?;
    if !matches!(endpoint.scheme(), "http" | "https") {
        return Err(LoadError::invalid(
            "api_endpoint",
            format!("unsupported scheme `{}`", endpoint.scheme()),
        ));
    }

    let timeout_secs = raw
        .request_timeout
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "request_timeout",
            "must be greater than zero",
        ));
    }

    let request_retry = non_zero_u32(
        raw.request_retry.unwrap_or(DEFAULT_REQUEST_RETRY),
        "request_retry",
    )?;

    let retry_delay_ms = raw
        .cached
        .retry_delay_ms
        .unwrap_or(DEFAULT_RETRY_DELAY_MS);
    let lock_secs = raw
        .request_locktime
        .unwrap_or(DEFAULT_REQUEST_LOCKTIME_SECS);

    Ok(UpstreamSettings {
        endpoint,
        auth_token: non_empty(raw.auth_token.clone()),
        user: non_empty(raw.user.clone()),
        password: non_empty(raw.password.clone()),
        ssl_verify: raw.ssl_verify.unwrap_or(true),
        http_proxy: non_empty(raw.http_proxy.clone()),
        keepalive: raw.http_keepalive.unwrap_or(true),
        headers: raw.http_headers.clone(),
        tls: TlsSettings {
            ca: non_empty_path(raw.tls.ca.clone()),
            cert: non_empty_path(raw.tls.cert.clone()),
            key: non_empty_path(raw.tls.key.clone()),
        },
        request_timeout: Duration::from_secs(timeout_secs),
        request_retry,
        retry_delay: Duration::from_millis(retry_delay_ms),
        lock_duration: Duration::from_secs(lock_secs),
    })
}

fn build_cache_settings(raw: &RawSettings) -> Result<CacheSettings, LoadError> {
    let ttl = raw.cache_ttl.unwrap_or(DEFAULT_CACHE_TTL_SECS);
    if ttl == 0 {
        return Err(LoadError::invalid("cache_ttl", "must be greater than zero"));
    }

    let negative_ttl = raw
        .negative_cache_ttl
        .unwrap_or(DEFAULT_NEGATIVE_CACHE_TTL_SECS);
    if negative_ttl == 0 {
        return Err(LoadError::invalid(
            "negative_cache_ttl",
            "must be greater than zero",
        ));
    }

    Ok(CacheSettings {
        enabled: raw.cache.unwrap_or(true),
        ttl: Duration::from_secs(ttl),
        negative_ttl: Duration::from_secs(negative_ttl),
        prefetch: raw.cached.prefetch.unwrap_or(true),
    })
}

fn build_server_settings(cached: &RawCachedSettings) -> Result<ServerSettings, LoadError> {
    let unix_socket = cached
        .unix_socket
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_UNIX_SOCKET));
    if unix_socket.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "cached.unix_socket",
            "path must not be empty",
        ));
    }

    let graceful_secs = cached
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "cached.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    let health_secs = cached
        .health_check_interval_seconds
        .unwrap_or(DEFAULT_HEALTH_CHECK_INTERVAL_SECS);
    if health_secs == 0 {
        return Err(LoadError::invalid(
            "cached.health_check_interval_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        unix_socket,
        graceful_shutdown: Duration::from_secs(graceful_secs),
        health_check_interval: Duration::from_secs(health_secs),
    })
}

fn build_logging_settings(cached: &RawCachedSettings) -> Result<LoggingSettings, LoadError> {
    let level = match cached.log_level.as_deref() {
        Some(level) => LevelFilter::from_str(level).map_err(|err| {
            LoadError::invalid("cached.log_level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if cached.log_json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings {
        level,
        format,
        file: non_empty_path(cached.log_file.clone()),
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn non_empty_path(value: Option<PathBuf>) -> Option<PathBuf> {
    value.filter(|path| !path.as_os_str().is_empty())
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
