//! Lease record model.
//!
//! The record is the single entity shared between candidates; everything a
//! candidate knows about the election it learns by reading this record back
//! from the store.

use chrono::{DateTime, Duration as TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque optimistic-concurrency token supplied by the store.
///
/// Equality against the token returned by the last read is the only operation
/// the protocol performs on it; the contents are store-specific (a counter,
/// an etag, a revision string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version(String);

impl Version {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies one lease record in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeaseKey {
    pub name: String,
    pub namespace: String,
}

impl LeaseKey {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

impl fmt::Display for LeaseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// The shared, versioned election record.
///
/// Field names serialize in camelCase to match the store-agnostic wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaseRecord {
    /// Identity currently holding the lease; `None` means unheld.
    pub holder_identity: Option<String>,
    /// How long a renewal remains valid without refresh.
    pub lease_duration_seconds: u64,
    /// Set when the holder identity changes.
    pub acquire_time: DateTime<Utc>,
    /// Updated on every successful renewal by the current holder.
    pub renew_time: DateTime<Utc>,
    /// Incremented only when the holder identity changes.
    pub leader_transitions: u64,
}

impl LeaseRecord {
    /// A fresh record held by `identity`, acquired and renewed at `now`.
    pub fn held_by(
        identity: impl Into<String>,
        lease_duration_seconds: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            holder_identity: Some(identity.into()),
            lease_duration_seconds,
            acquire_time: now,
            renew_time: now,
            leader_transitions: 0,
        }
    }

    pub fn holder(&self) -> Option<&str> {
        self.holder_identity.as_deref()
    }

    pub fn held_by_identity(&self, identity: &str) -> bool {
        self.holder() == Some(identity)
    }

    /// Instant at which the current renewal stops being valid.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.renew_time + TimeDelta::seconds(self.lease_duration_seconds as i64)
    }

    /// True once `renew_time + lease_duration` has passed according to the
    /// local clock.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at()
    }
}
