//! Map configuration
//!
//! Operating mode and timing knobs shared by every map built from a
//! context. The run mode replaces any ambient "are we in a test" flag:
//! callers pick it once and the derived config carries it everywhere.

use std::time::Duration;

use crate::error::{Error, Result};

/// Default durable-tier item size bound (60 KiB).
pub const DEFAULT_MAX_VALUE_BYTES: usize = 60 * 1024;

/// Default durable table name.
pub const DEFAULT_TABLE_NAME: &str = "tiermap";

/// Nominal latency of one durable round trip; caps the stampede token TTL.
pub const DEFAULT_STAMPEDE_TOKEN_TTL: Duration = Duration::from_secs(2);

/// How long a reader that lost the stampede race sleeps before re-reading.
pub const DEFAULT_STAMPEDE_WAIT: Duration = Duration::from_secs(1);

/// Safety valve for the stampede wait loop. Large enough to never trigger
/// in practice.
pub const DEFAULT_MAX_STAMPEDE_RETRIES: u32 = 100_000;

/// Where the process is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Production,
    Debug,
    Test,
}

impl std::str::FromStr for RunMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Ok(RunMode::Production),
            "debug" | "dev" => Ok(RunMode::Debug),
            "test" => Ok(RunMode::Test),
            other => Err(Error::Config(format!("unknown run mode: {}", other))),
        }
    }
}

/// Which run modes fall back to cache-only maps.
#[derive(Debug, Clone, Copy)]
pub struct ModePolicy {
    pub test_uses_cache_only: bool,
    pub debug_uses_cache_only: bool,
}

impl Default for ModePolicy {
    fn default() -> Self {
        Self {
            test_uses_cache_only: true,
            debug_uses_cache_only: false,
        }
    }
}

/// Configuration for maps built from one context
#[derive(Debug, Clone)]
pub struct MapConfig {
    /// Keep data in the cache tier only; no durable fallback
    pub cache_only: bool,

    /// Cache entry timeout; `None` or zero means no expiry
    pub cache_timeout: Option<Duration>,

    /// Prefix hash keys with the test namespace
    pub test_namespace: bool,

    /// Durable-tier item size bound
    pub max_value_bytes: usize,

    /// Upper bound for the stampede lock TTL
    pub stampede_token_ttl: Duration,

    /// Sleep between re-reads while another reader holds the stampede lock
    pub stampede_wait: Duration,

    /// Safety cap on stampede waits for a single read
    pub max_stampede_retries: u32,

    /// Durable table name
    pub table_name: String,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            cache_only: false,
            cache_timeout: None,
            test_namespace: false,
            max_value_bytes: DEFAULT_MAX_VALUE_BYTES,
            stampede_token_ttl: DEFAULT_STAMPEDE_TOKEN_TTL,
            stampede_wait: DEFAULT_STAMPEDE_WAIT,
            max_stampede_retries: DEFAULT_MAX_STAMPEDE_RETRIES,
            table_name: DEFAULT_TABLE_NAME.to_string(),
        }
    }
}

impl MapConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive `cache_only` and `test_namespace` from the run mode.
    pub fn for_mode(mode: RunMode, policy: ModePolicy) -> Self {
        let cache_only = match mode {
            RunMode::Production => false,
            RunMode::Debug => policy.debug_uses_cache_only,
            RunMode::Test => policy.test_uses_cache_only,
        };
        Self {
            cache_only,
            test_namespace: mode == RunMode::Test,
            ..Self::default()
        }
    }

    pub fn with_cache_only(mut self, cache_only: bool) -> Self {
        self.cache_only = cache_only;
        self
    }

    pub fn with_cache_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.cache_timeout = timeout;
        self
    }

    pub fn with_test_namespace(mut self, enabled: bool) -> Self {
        self.test_namespace = enabled;
        self
    }

    pub fn with_max_value_bytes(mut self, limit: usize) -> Self {
        self.max_value_bytes = limit;
        self
    }

    pub fn with_stampede_token_ttl(mut self, ttl: Duration) -> Self {
        self.stampede_token_ttl = ttl;
        self
    }

    pub fn with_stampede_wait(mut self, wait: Duration) -> Self {
        self.stampede_wait = wait;
        self
    }

    pub fn with_max_stampede_retries(mut self, retries: u32) -> Self {
        self.max_stampede_retries = retries;
        self
    }

    pub fn with_table_name(mut self, name: impl Into<String>) -> Self {
        self.table_name = name.into();
        self
    }

    /// Cache entry TTL as handed to the backend (`None` = no expiry).
    pub fn cache_entry_ttl(&self) -> Option<Duration> {
        self.cache_timeout.filter(|t| !t.is_zero())
    }

    /// TTL of the stampede lock: the constant, capped by the entry timeout.
    pub fn stampede_lock_ttl(&self) -> Duration {
        match self.cache_entry_ttl() {
            Some(timeout) => timeout.min(self.stampede_token_ttl),
            None => self.stampede_token_ttl,
        }
    }

    /// Check the values make sense together.
    pub fn validate(&self) -> Result<()> {
        if self.max_value_bytes == 0 {
            return Err(Error::Config("max_value_bytes must be positive".into()));
        }
        if self.stampede_token_ttl.is_zero() {
            return Err(Error::Config("stampede_token_ttl must be positive".into()));
        }
        if self.table_name.is_empty() {
            return Err(Error::Config("table_name must not be empty".into()));
        }
        Ok(())
    }
}
