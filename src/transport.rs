//! Network access to the feed: one logical fetch with a per-attempt deadline
//! and a bounded, cancellable retry loop.

use bytes::Bytes;
use reqwest::blocking;
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

use crate::command::Command;
use crate::config::FetchConfig;
use crate::error::{FeedError, Result, TransportError};

/// Performs a single HTTP GET.
///
/// Implementations return the body of a successful response and treat any
/// non-success status as an error, like a network failure.
pub trait Fetcher: Send + Sync {
    fn get(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        timeout: Option<Duration>,
    ) -> std::result::Result<Bytes, TransportError>;
}

/// [`Fetcher`] backed by a blocking reqwest client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: blocking::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        // Deadlines are applied per request, so the client itself has none.
        let client = blocking::Client::builder()
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| FeedError::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    fn get(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        timeout: Option<Duration>,
    ) -> std::result::Result<Bytes, TransportError> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().map_err(|e| TransportError::Network {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        if !response.status().is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        response.bytes().map_err(|e| TransportError::Network {
            url: url.to_string(),
            message: format!("Failed to read response: {}", e),
        })
    }
}

/// Shared cancellation signal.
///
/// Clones observe the same flag. Cancelling wakes any thread blocked in
/// [`CancelHandle::wait`].
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    inner: Arc<CancelState>,
}

#[derive(Debug, Default)]
struct CancelState {
    cancelled: Mutex<bool>,
    signal: Condvar,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let mut cancelled = self
            .inner
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *cancelled = true;
        self.inner.signal.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self
            .inner
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Block for up to `delay`. Returns true if cancelled before or during
    /// the wait.
    pub fn wait(&self, delay: Duration) -> bool {
        let cancelled = self
            .inner
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let (cancelled, _) = self
            .inner
            .signal
            .wait_timeout_while(cancelled, delay, |cancelled| !*cancelled)
            .unwrap_or_else(PoisonError::into_inner);
        *cancelled
    }
}

/// Issues feed commands against a base URI with the configured retry policy.
pub struct Transport {
    base_uri: String,
    config: FetchConfig,
    fetcher: Box<dyn Fetcher>,
}

impl Transport {
    pub fn new(base_uri: impl Into<String>, config: FetchConfig, fetcher: impl Fetcher + 'static) -> Self {
        Self {
            base_uri: base_uri.into(),
            config,
            fetcher: Box::new(fetcher),
        }
    }

    /// Fetch the raw body for `command`.
    ///
    /// Makes at most `retry_limit + 1` attempts and returns on the first
    /// success. After the last failed attempt that failure is returned.
    /// Configuration is validated before any request is made.
    pub fn fetch(&self, command: &Command) -> Result<Bytes> {
        self.config.validate()?;

        let url = command.url(&self.base_uri);
        let deadline = self.config.deadline();
        let attempts = self.config.retry_limit.saturating_add(1);
        let cancel = &self.config.cancel;

        let mut attempt = 1;
        loop {
            if cancel.is_cancelled() {
                return Err(TransportError::Cancelled { url }.into());
            }

            debug!(command = command.name(), attempt, attempts, "Fetching {}", url);
            match self.fetcher.get(&url, &self.config.headers, deadline) {
                Ok(body) => return Ok(body),
                Err(e) if attempt >= attempts => {
                    warn!(command = command.name(), attempt, "Giving up: {}", e);
                    return Err(e.into());
                }
                Err(e) => {
                    warn!(
                        command = command.name(),
                        attempt,
                        retry_delay_ms = self.config.retry_delay.as_millis() as u64,
                        "Attempt failed, retrying: {}",
                        e
                    );
                    if cancel.wait(self.config.retry_delay) {
                        return Err(TransportError::Cancelled { url }.into());
                    }
                    attempt += 1;
                }
            }
        }
    }
}
