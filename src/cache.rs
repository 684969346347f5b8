//! Explicit cache values
//!
//! Nothing here is global: callers hold the [`Cached`] value returned by the
//! service and hand it back on the next call.

use crate::models::ProviderId;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Data plus the provider that served it and when it was fetched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cached<T> {
    pub data: T,
    pub provider: ProviderId,
    pub fetched_at: DateTime<Utc>,
}

impl<T> Cached<T> {
    #[must_use]
    pub fn new(data: T, provider: ProviderId, fetched_at: DateTime<Utc>) -> Self {
        Self {
            data,
            provider,
            fetched_at,
        }
    }

    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> TimeDelta {
        now - self.fetched_at
    }

    /// Younger than `ttl` at `now`. A value from the future is never fresh.
    #[must_use]
    pub fn is_fresh(&self, ttl: TimeDelta, now: DateTime<Utc>) -> bool {
        let age = self.age(now);
        age >= TimeDelta::zero() && age < ttl
    }
}
