use std::time::Duration;

use crate::models::{EngineError, EngineErrorKind, EngineResult};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_COMBINED_REFRESH_INTERVAL: Duration = Duration::from_secs(3);
pub const DEFAULT_SYNC_CHANNEL: &str = "scout-candidate-sync";
pub const DEFAULT_SYNC_CAPACITY: usize = 256;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollerConfig {
    pub interval: Duration,
    pub timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_TASK_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl PollerConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.interval.is_zero() {
            return Err(invalid_config("poll interval must be greater than zero"));
        }
        if self.timeout.is_zero() {
            return Err(invalid_config("task timeout must be greater than zero"));
        }
        if self.request_timeout.is_zero() {
            return Err(invalid_config("request timeout must be greater than zero"));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CombinedSearchConfig {
    pub refresh_interval: Duration,
    pub timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for CombinedSearchConfig {
    fn default() -> Self {
        Self {
            refresh_interval: DEFAULT_COMBINED_REFRESH_INTERVAL,
            timeout: DEFAULT_TASK_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl CombinedSearchConfig {
    pub fn with_refresh_interval(mut self, refresh_interval: Duration) -> Self {
        self.refresh_interval = refresh_interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.refresh_interval.is_zero() {
            return Err(invalid_config("refresh interval must be greater than zero"));
        }
        if self.timeout.is_zero() {
            return Err(invalid_config("combined timeout must be greater than zero"));
        }
        if self.request_timeout.is_zero() {
            return Err(invalid_config("request timeout must be greater than zero"));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SyncConfig {
    pub channel_name: String,
    pub capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            channel_name: DEFAULT_SYNC_CHANNEL.to_string(),
            capacity: DEFAULT_SYNC_CAPACITY,
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct EngineConfig {
    pub poller: PollerConfig,
    pub combined: CombinedSearchConfig,
    pub sync: SyncConfig,
}

impl EngineConfig {
    /// Defaults overridden by `SCOUT_*` environment variables.
    pub fn from_env() -> EngineResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> EngineResult<Self> {
        let mut config = Self::default();

        if let Some(value) = lookup("SCOUT_POLL_INTERVAL_MS") {
            config.poller.interval = parse_millis("SCOUT_POLL_INTERVAL_MS", &value)?;
        }
        if let Some(value) = lookup("SCOUT_TASK_TIMEOUT_MS") {
            let timeout = parse_millis("SCOUT_TASK_TIMEOUT_MS", &value)?;
            config.poller.timeout = timeout;
            config.combined.timeout = timeout;
        }
        if let Some(value) = lookup("SCOUT_REQUEST_TIMEOUT_MS") {
            let request_timeout = parse_millis("SCOUT_REQUEST_TIMEOUT_MS", &value)?;
            config.poller.request_timeout = request_timeout;
            config.combined.request_timeout = request_timeout;
        }
        if let Some(value) = lookup("SCOUT_COMBINED_REFRESH_MS") {
            config.combined.refresh_interval = parse_millis("SCOUT_COMBINED_REFRESH_MS", &value)?;
        }
        if let Some(value) = lookup("SCOUT_SYNC_CHANNEL") {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return Err(invalid_config("SCOUT_SYNC_CHANNEL must not be empty"));
            }
            config.sync.channel_name = trimmed.to_string();
        }
        if let Some(value) = lookup("SCOUT_SYNC_CAPACITY") {
            let capacity = value.trim().parse::<usize>().map_err(|error| {
                invalid_config(format!("SCOUT_SYNC_CAPACITY '{value}' is invalid: {error}"))
            })?;
            if capacity == 0 {
                return Err(invalid_config("SCOUT_SYNC_CAPACITY must be greater than zero"));
            }
            config.sync.capacity = capacity;
        }

        config.poller.validate()?;
        config.combined.validate()?;
        Ok(config)
    }
}

fn parse_millis(key: &str, raw: &str) -> EngineResult<Duration> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|error| invalid_config(format!("{key} '{raw}' is invalid: {error}")))
}

fn invalid_config(message: impl Into<String>) -> EngineError {
    EngineError::new(EngineErrorKind::InvalidInput, message)
}
