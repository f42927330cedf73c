//! Fluent builder for the election engine.

use crate::callbacks::LeaderCallbacks;
use crate::config::{ConfigError, ElectionConfig};
use crate::engine::ElectionEngine;
use crate::store::LeaseStore;
use std::sync::Arc;
use std::time::Duration;

/// Default timings of the reference deployment.
const DEFAULT_LEASE_DURATION: Duration = Duration::from_secs(15);
const DEFAULT_RENEW_DEADLINE: Duration = Duration::from_secs(10);
const DEFAULT_RETRY_PERIOD: Duration = Duration::from_secs(2);

/// Builder for `ElectionEngine`.
///
/// Identity, lease name, store, and callbacks are required; timings default
/// to 15s / 10s / 2s and `release_on_cancel` to true.
pub struct ElectionBuilder<S> {
    identity: Option<String>,
    lease_name: Option<String>,
    lease_namespace: String,
    lease_duration: Duration,
    renew_deadline: Duration,
    retry_period: Duration,
    release_on_cancel: bool,
    store: Option<S>,
    callbacks: Option<Arc<dyn LeaderCallbacks>>,
}

impl<S: LeaseStore> ElectionBuilder<S> {
    pub fn new() -> Self {
        Self {
            identity: None,
            lease_name: None,
            lease_namespace: "default".to_string(),
            lease_duration: DEFAULT_LEASE_DURATION,
            renew_deadline: DEFAULT_RENEW_DEADLINE,
            retry_period: DEFAULT_RETRY_PERIOD,
            release_on_cancel: true,
            store: None,
            callbacks: None,
        }
    }

    /// Sets this candidate's identity (required, unique per candidate).
    pub fn identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Sets the lease name and namespace the candidates contend for.
    pub fn lease(mut self, name: impl Into<String>, namespace: impl Into<String>) -> Self {
        self.lease_name = Some(name.into());
        self.lease_namespace = namespace.into();
        self
    }

    pub fn lease_duration(mut self, duration: Duration) -> Self {
        self.lease_duration = duration;
        self
    }

    pub fn renew_deadline(mut self, deadline: Duration) -> Self {
        self.renew_deadline = deadline;
        self
    }

    pub fn retry_period(mut self, period: Duration) -> Self {
        self.retry_period = period;
        self
    }

    pub fn release_on_cancel(mut self, release: bool) -> Self {
        self.release_on_cancel = release;
        self
    }

    /// Sets the backing store (required).
    pub fn store(mut self, store: S) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the leadership-change callbacks (required).
    pub fn callbacks(mut self, callbacks: impl LeaderCallbacks + 'static) -> Self {
        self.callbacks = Some(Arc::new(callbacks));
        self
    }

    /// Validates the configuration and builds the engine.
    pub fn build(self) -> Result<ElectionEngine<S>, ConfigError> {
        let identity = self.identity.ok_or(ConfigError::MissingField("identity"))?;
        let lease_name = self
            .lease_name
            .ok_or(ConfigError::MissingField("lease name"))?;
        let store = self.store.ok_or(ConfigError::MissingField("store"))?;
        let callbacks = self
            .callbacks
            .ok_or(ConfigError::MissingField("callbacks"))?;

        let config = ElectionConfig {
            identity,
            lease_name,
            lease_namespace: self.lease_namespace,
            lease_duration: self.lease_duration,
            renew_deadline: self.renew_deadline,
            retry_period: self.retry_period,
            release_on_cancel: self.release_on_cancel,
        };

        ElectionEngine::new(config, store, callbacks)
    }
}

impl<S: LeaseStore> Default for ElectionBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}
