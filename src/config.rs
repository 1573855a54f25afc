//! Handler and per-call configuration.
//!
//! | Setting            | Default                   |
//! |--------------------|---------------------------|
//! | base URI           | [`FEED_URI`]              |
//! | timeout            | 30 s (zero = no deadline) |
//! | retry limit        | 0                         |
//! | retry delay        | 100 ms (minimum 50 ms)    |
//! | cache max age      | 60 s                      |
//! | prediction max age | 0 s                       |

use reqwest::header::{HeaderName, HeaderValue};
use std::collections::HashMap;
use std::time::Duration;

use crate::cache::CachePolicy;
use crate::command::FEED_URI;
use crate::error::{FeedError, Result};
use crate::transport::CancelHandle;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_RETRY_LIMIT: u32 = 0;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(100);
pub const MIN_RETRY_DELAY: Duration = Duration::from_millis(50);
pub const DEFAULT_CACHE_MAX_AGE: Duration = Duration::from_secs(60);
pub const DEFAULT_PREDICTION_MAX_AGE: Duration = Duration::ZERO;

/// Transport settings shared by every request a handler makes.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Per-attempt deadline. Zero disables it.
    pub timeout: Duration,
    /// Additional attempts after the first one fails.
    pub retry_limit: u32,
    /// Wait between attempts, at least [`MIN_RETRY_DELAY`].
    pub retry_delay: Duration,
    pub headers: HashMap<String, String>,
    pub cancel: CancelHandle,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            retry_limit: DEFAULT_RETRY_LIMIT,
            retry_delay: DEFAULT_RETRY_DELAY,
            headers: HashMap::new(),
            cancel: CancelHandle::new(),
        }
    }
}

impl FetchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.retry_delay < MIN_RETRY_DELAY {
            return Err(FeedError::Config(format!(
                "Unable to use retry delay of {}ms, minimum is {}ms",
                self.retry_delay.as_millis(),
                MIN_RETRY_DELAY.as_millis()
            )));
        }
        for (name, value) in &self.headers {
            HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| FeedError::Config(format!("Invalid header name '{}': {}", name, e)))?;
            HeaderValue::from_str(value)
                .map_err(|e| FeedError::Config(format!("Invalid value for header '{}': {}", name, e)))?;
        }
        Ok(())
    }

    pub fn deadline(&self) -> Option<Duration> {
        (!self.timeout.is_zero()).then_some(self.timeout)
    }
}

#[derive(Debug, Clone)]
pub struct HandlerConfig {
    pub base_uri: String,
    pub fetch: FetchConfig,
    /// Maximum age of the agency list and of each agency's routes.
    pub cache_max_age: Duration,
    /// Maximum age of a stop's predictions.
    pub prediction_max_age: Duration,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            base_uri: FEED_URI.to_string(),
            fetch: FetchConfig::default(),
            cache_max_age: DEFAULT_CACHE_MAX_AGE,
            prediction_max_age: DEFAULT_PREDICTION_MAX_AGE,
        }
    }
}

impl HandlerConfig {
    pub fn builder() -> HandlerConfigBuilder {
        HandlerConfigBuilder::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct HandlerConfigBuilder {
    config: HandlerConfig,
}

impl HandlerConfigBuilder {
    pub fn base_uri(mut self, uri: impl Into<String>) -> Self {
        self.config.base_uri = uri.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.fetch.timeout = timeout;
        self
    }

    pub fn retry_limit(mut self, limit: u32) -> Self {
        self.config.fetch.retry_limit = limit;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.fetch.retry_delay = delay;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.fetch.headers.insert(name.into(), value.into());
        self
    }

    pub fn headers(mut self, headers: HashMap<String, String>) -> Self {
        self.config.fetch.headers = headers;
        self
    }

    pub fn cancel_handle(mut self, cancel: CancelHandle) -> Self {
        self.config.fetch.cancel = cancel;
        self
    }

    pub fn cache_max_age(mut self, max_age: Duration) -> Self {
        self.config.cache_max_age = max_age;
        self
    }

    pub fn prediction_max_age(mut self, max_age: Duration) -> Self {
        self.config.prediction_max_age = max_age;
        self
    }

    pub fn build(self) -> HandlerConfig {
        self.config
    }
}

/// Cache behaviour for a single call. Overrides the handler defaults for
/// that call only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    pub use_cache: bool,
    pub max_age: Option<Duration>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            max_age: None,
        }
    }
}

impl CacheOptions {
    /// Force a refresh for this call.
    pub fn bypass() -> Self {
        Self {
            use_cache: false,
            max_age: None,
        }
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub(crate) fn policy(&self, default_max_age: Duration) -> CachePolicy {
        CachePolicy {
            use_cache: self.use_cache,
            max_age: self.max_age.unwrap_or(default_max_age),
        }
    }
}
