use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use ghostsky_core::domain::links::DEFAULT_WEB_BASE_URL;
use ghostsky_core::types::backoff::BackoffPolicy;
use ghostsky_infra::bluesky::MAX_THREAD_DEPTH;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadStrategy {
    Walk,
    Notifications,
}

#[derive(Clone)]
pub struct AppConfig {
    pub http_addr: SocketAddr,
    pub database_url: Option<String>,
    pub sync_interval: Duration,
    pub request_timeout: Duration,
    pub call_timeout: Duration,
    pub multi_tenant: bool,
    pub thread_strategy: ThreadStrategy,
    pub thread_depth: u16,
    pub notification_window: u16,
    pub backoff: BackoffPolicy,
    pub bluesky_service_url: String,
    pub bluesky_identifier: Option<String>,
    pub bluesky_app_password: Option<String>,
    pub profile_base_url: String,
    pub shim_url: Option<String>,
    pub shim_secret: Option<String>,
    pub admin_token: Option<String>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("http_addr", &self.http_addr)
            .field("database_configured", &self.database_url.is_some())
            .field("sync_interval", &self.sync_interval)
            .field("multi_tenant", &self.multi_tenant)
            .field("thread_strategy", &self.thread_strategy)
            .field("bluesky_service_url", &self.bluesky_service_url)
            .field("bluesky_identifier", &self.bluesky_identifier)
            .field("shim_url", &self.shim_url)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid socket address: {0}")]
    InvalidSocket(String),
    #[error("invalid integer for {0}: {1}")]
    InvalidNumber(&'static str, String),
    #[error("invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let http_addr_raw = read_string("GHOSTSKY_HTTP_ADDR", "127.0.0.1:8080");
        let http_addr = http_addr_raw
            .parse()
            .map_err(|_| ConfigError::InvalidSocket(http_addr_raw.clone()))?;
        let database_url = read_optional_string("GHOSTSKY_DATABASE_URL");
        let sync_interval_secs = read_u64("GHOSTSKY_SYNC_INTERVAL_SECS", 600)?;
        let request_timeout_secs = read_u64("GHOSTSKY_REQUEST_TIMEOUT_SECS", 15)?;
        let call_timeout_secs = read_u64("GHOSTSKY_CALL_TIMEOUT_SECS", 30)?;
        let multi_tenant = read_bool("GHOSTSKY_MULTI_TENANT", false)?;
        let thread_strategy = parse_strategy(&read_string("GHOSTSKY_THREAD_STRATEGY", "walk"))?;
        let thread_depth = validate_thread_depth(read_u16("GHOSTSKY_THREAD_DEPTH", 10)?)?;
        let notification_window = read_u16("GHOSTSKY_NOTIFICATION_WINDOW", 50)?;
        if notification_window == 0 || notification_window > 100 {
            return Err(ConfigError::InvalidValue(
                "GHOSTSKY_NOTIFICATION_WINDOW",
                notification_window.to_string(),
            ));
        }
        let backoff = BackoffPolicy {
            max_attempts: read_u32("GHOSTSKY_BACKOFF_MAX_ATTEMPTS", 3)?.max(1),
            base_delay: Duration::from_millis(read_u64("GHOSTSKY_BACKOFF_BASE_MS", 500)?),
            multiplier: 2.0,
            max_delay: Duration::from_millis(read_u64("GHOSTSKY_BACKOFF_MAX_MS", 10_000)?),
        };
        let bluesky_service_url = read_string("GHOSTSKY_BLUESKY_SERVICE_URL", "https://bsky.social");
        let profile_base_url = read_string("GHOSTSKY_PROFILE_BASE_URL", DEFAULT_WEB_BASE_URL);

        Ok(Self {
            http_addr,
            database_url,
            sync_interval: Duration::from_secs(sync_interval_secs),
            request_timeout: Duration::from_secs(request_timeout_secs),
            call_timeout: Duration::from_secs(call_timeout_secs),
            multi_tenant,
            thread_strategy,
            thread_depth,
            notification_window,
            backoff,
            bluesky_service_url,
            bluesky_identifier: read_optional_string("GHOSTSKY_BLUESKY_IDENTIFIER"),
            bluesky_app_password: read_optional_string("GHOSTSKY_BLUESKY_APP_PASSWORD"),
            profile_base_url,
            shim_url: read_optional_string("GHOSTSKY_SHIM_URL"),
            shim_secret: read_optional_string("GHOSTSKY_SHIM_SECRET"),
            admin_token: read_optional_string("GHOSTSKY_ADMIN_TOKEN"),
        })
    }
}

pub fn load_dotenv() -> Result<(), std::io::Error> {
    let path = Path::new(".env");
    if !path.exists() {
        return Ok(());
    }
    let contents = std::fs::read_to_string(path)?;
    for (key, value) in parse_dotenv(&contents) {
        if std::env::var_os(&key).is_none() {
            // Safety: invoked during startup before any threads are spawned.
            unsafe {
                std::env::set_var(key, value);
            }
        }
    }
    Ok(())
}

fn parse_strategy(raw: &str) -> Result<ThreadStrategy, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "walk" | "thread" => Ok(ThreadStrategy::Walk),
        "notifications" | "notification" => Ok(ThreadStrategy::Notifications),
        _ => Err(ConfigError::InvalidValue(
            "GHOSTSKY_THREAD_STRATEGY",
            raw.to_string(),
        )),
    }
}

fn read_string(key: &'static str, default: &'static str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn read_u64(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    read_number(key, default)
}

fn read_u32(key: &'static str, default: u32) -> Result<u32, ConfigError> {
    read_number(key, default)
}

fn read_u16(key: &'static str, default: u16) -> Result<u16, ConfigError> {
    read_number(key, default)
}

fn read_number<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => parse_number(key, &raw),
        Err(_) => Ok(default),
    }
}

/// Values outside the target type's range are rejected, never truncated.
fn parse_number<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidNumber(key, raw.to_string()))
}

fn validate_thread_depth(depth: u16) -> Result<u16, ConfigError> {
    if depth == 0 || depth > MAX_THREAD_DEPTH {
        return Err(ConfigError::InvalidValue(
            "GHOSTSKY_THREAD_DEPTH",
            format!("{depth} (expected 1..={MAX_THREAD_DEPTH})"),
        ));
    }
    Ok(depth)
}

fn read_bool(key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => parse_bool(&raw).ok_or(ConfigError::InvalidValue(key, raw)),
        Err(_) => Ok(default),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

fn read_optional_string(key: &'static str) -> Option<String> {
    let value = std::env::var(key).unwrap_or_default();
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    contents
        .lines()
        .filter_map(parse_dotenv_line)
        .collect()
}

fn parse_dotenv_line(line: &str) -> Option<(String, String)> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
    let (key, value) = trimmed.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    let value = parse_dotenv_value(value.trim());
    Some((key.to_string(), value))
}

fn parse_dotenv_value(value: &str) -> String {
    if let Some(stripped) = value.strip_prefix('"').and_then(|inner| inner.strip_suffix('"')) {
        return unescape_double_quoted(stripped);
    }
    if let Some(stripped) = value.strip_prefix('\'').and_then(|inner| inner.strip_suffix('\'')) {
        return stripped.to_string();
    }
    // Unquoted values may carry a trailing ` # comment`.
    match value.split_once(" #") {
        Some((head, _)) => head.trim_end().to_string(),
        None => value.to_string(),
    }
}

fn unescape_double_quoted(value: &str) -> String {
    let mut output = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            output.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => output.push('\n'),
            Some('t') => output.push('\t'),
            Some(other) => output.push(other),
            None => output.push('\\'),
        }
    }
    output
}
