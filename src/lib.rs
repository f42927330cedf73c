//! Lease-Based Leader Election
//!
//! Elects exactly one active leader among N cooperating processes using a
//! single shared, versioned lease record in an external linearizable store.
//! Candidates never talk to each other; the store's compare-and-swap on an
//! opaque version token is the only split-brain guard.
//!
//! The engine talks to an abstract [`LeaseStore`] and notifies the caller of
//! transitions through [`LeaderCallbacks`] or a [`LeaderEvent`] channel.

pub mod builder;
pub mod callbacks;
pub mod config;
pub mod engine;
pub mod metrics;
pub mod record;
pub mod store;

pub use builder::ElectionBuilder;
pub use callbacks::{EventSender, LeaderCallbacks, LeaderEvent};
pub use config::{ConfigError, ElectionConfig};
pub use engine::{ElectionEngine, ElectionError, ElectionState};
pub use metrics::{ElectionMetrics, MetricsSnapshot};
pub use record::{LeaseKey, LeaseRecord, Version};
pub use store::{LeaseStore, MemoryStore, StoreError};
