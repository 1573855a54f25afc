//! Freshness-stamped cache slots.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Resolved freshness rule for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub use_cache: bool,
    pub max_age: Duration,
}

/// A collection that is either "never fetched" or holds the value installed
/// by the last successful refresh together with its timestamp.
///
/// A fetched-but-empty collection is present: only the never-fetched state
/// forces a miss by itself.
#[derive(Debug, Clone)]
pub struct Cached<T> {
    value: Option<T>,
    refreshed_at: Option<DateTime<Utc>>,
}

impl<T> Default for Cached<T> {
    fn default() -> Self {
        Self {
            value: None,
            refreshed_at: None,
        }
    }
}

impl<T> Cached<T> {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn get_mut(&mut self) -> Option<&mut T> {
        self.value.as_mut()
    }

    pub fn is_present(&self) -> bool {
        self.value.is_some()
    }

    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at
    }

    pub fn is_fresh(&self, policy: CachePolicy, now: DateTime<Utc>) -> bool {
        if !policy.use_cache || !self.is_present() {
            return false;
        }
        let Some(refreshed_at) = self.refreshed_at else {
            return false;
        };
        // A clock that moved backwards reads as zero elapsed time.
        let elapsed = (now - refreshed_at).to_std().unwrap_or(Duration::ZERO);
        elapsed <= policy.max_age
    }

    /// Install a new value wholesale, discarding the previous one.
    pub fn replace(&mut self, value: T, refreshed_at: DateTime<Utc>) -> &mut T {
        self.refreshed_at = Some(refreshed_at);
        self.value.insert(value)
    }
}

impl<T> Cached<Vec<T>> {
    /// Cached items, empty when never fetched.
    pub fn items(&self) -> &[T] {
        self.value.as_deref().unwrap_or_default()
    }

    pub fn items_mut(&mut self) -> &mut [T] {
        self.value.as_deref_mut().unwrap_or_default()
    }
}
