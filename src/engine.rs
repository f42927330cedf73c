//! Election engine and tick scheduler.
//!
//! Implements try-acquire-or-renew over a `LeaseStore` plus the timing loop
//! that bounds failover latency and split-brain exposure.
//!
//! Local clocks are the sole timing authority: lease expiry compares the
//! local wall clock against the record's `renew_time`, and the renew deadline
//! uses a local monotonic instant. Drift between the store's clock and the
//! candidate's clock is not compensated for.

use crate::callbacks::{CallbackDispatcher, LeaderCallbacks};
use crate::config::{ConfigError, ElectionConfig};
use crate::metrics::ElectionMetrics;
use crate::record::{LeaseKey, LeaseRecord, Version};
use crate::store::{LeaseStore, StoreError};
use chrono::{DateTime, Utc};
use rand::Rng;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Upper bound of the random jitter applied to the retry period while still
/// contending for the lease, as a fraction of the period.
const ACQUIRE_JITTER: f64 = 0.2;

// ============================================================================
// STATES AND ERRORS
// ============================================================================

/// Leadership state of one candidate engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectionState {
    /// Initial state, before the first store interaction.
    Unknown,
    /// Someone else holds a valid lease, or we have not won it yet.
    Following,
    /// We hold a currently-valid lease.
    Leading,
    /// Terminal, after voluntary or forced relinquishment.
    Released,
}

impl fmt::Display for ElectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElectionState::Unknown => "unknown",
            ElectionState::Following => "following",
            ElectionState::Leading => "leading",
            ElectionState::Released => "released",
        };
        f.write_str(name)
    }
}

/// Fatal engine error.
///
/// Conflicts and transient store errors never surface here; they resolve to
/// "did not win this cycle" and are retried on the next tick.
#[derive(thiserror::Error, Debug)]
pub enum ElectionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("corrupt lease record for {key}: {reason}")]
    CorruptLease { key: String, reason: String },
}

// ============================================================================
// OBSERVED STATE
// ============================================================================

/// Local cache of the last-seen lease record plus local timestamps.
///
/// Owned exclusively by one engine instance and touched only at tick
/// boundaries; it is never shared across candidates. Also the single
/// authoritative owner of "last known holder" for callback dispatch.
#[derive(Debug, Default)]
struct ObservedState {
    record: Option<LeaseRecord>,
    version: Option<Version>,
    /// Local wall-clock time of the last successful read.
    observed_at: Option<DateTime<Utc>>,
    /// Instant of the last successful acquire or renew.
    last_renew: Option<Instant>,
    /// Last holder identity reported through `on_new_leader`.
    reported_leader: Option<String>,
}

impl ObservedState {
    fn observe(&mut self, record: LeaseRecord, version: Version) {
        self.record = Some(record);
        self.version = Some(version);
        self.observed_at = Some(Utc::now());
    }
}

// ============================================================================
// ELECTION ENGINE
// ============================================================================

/// State machine electing one leader through a shared versioned lease.
///
/// Constructed with an immutable `ElectionConfig`, a `LeaseStore`, and the
/// caller's `LeaderCallbacks`; driven by `run` until its lifetime token is
/// cancelled.
pub struct ElectionEngine<S> {
    config: ElectionConfig,
    key: LeaseKey,
    store: S,
    state: ElectionState,
    observed: ObservedState,
    dispatcher: CallbackDispatcher,
    metrics: ElectionMetrics,
}

impl<S: LeaseStore> ElectionEngine<S> {
    /// Validates `config` and builds an engine in `Unknown`.
    pub fn new(
        config: ElectionConfig,
        store: S,
        callbacks: Arc<dyn LeaderCallbacks>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let key = config.lease_key();
        Ok(Self {
            key,
            store,
            state: ElectionState::Unknown,
            observed: ObservedState::default(),
            dispatcher: CallbackDispatcher::new(callbacks),
            metrics: ElectionMetrics::new(),
            config,
        })
    }

    pub fn state(&self) -> ElectionState {
        self.state
    }

    pub fn is_leading(&self) -> bool {
        self.state == ElectionState::Leading
    }

    pub fn identity(&self) -> &str {
        &self.config.identity
    }

    /// Holder identity from the last observed record, if any.
    pub fn current_leader(&self) -> Option<&str> {
        self.observed.record.as_ref().and_then(|r| r.holder())
    }

    /// Local wall-clock time of the last successful record read.
    pub fn last_observed_at(&self) -> Option<DateTime<Utc>> {
        self.observed.observed_at
    }

    /// Shared handle to this engine's counters.
    pub fn metrics(&self) -> ElectionMetrics {
        self.metrics.clone()
    }

    // ========================================================================
    // SCHEDULER
    // ========================================================================

    /// Drives the tick loop until `shutdown` fires, then runs the release
    /// sequence and returns with the engine in `Released`.
    ///
    /// Ticks never overlap: each attempt completes, times out, or is
    /// abandoned by cancellation before the next is issued. The only fatal
    /// outcome is corrupt store state.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<(), ElectionError> {
        tracing::info!(
            identity = %self.config.identity,
            lease = %self.key,
            "starting election loop"
        );

        let fatal = loop {
            tokio::select! {
                _ = shutdown.cancelled() => break None,
                result = self.tick() => {
                    if let Err(err) = result {
                        break Some(err);
                    }
                }
            }

            let pause = self.tick_interval();
            tokio::select! {
                _ = shutdown.cancelled() => break None,
                _ = tokio::time::sleep(pause) => {}
            }
        };

        if let Some(err) = fatal {
            // A fatal exit still ends the leading scope before surfacing;
            // caller leader logic must not outlive the loop. No store write
            // is attempted against unknown state.
            if self.state == ElectionState::Leading {
                self.demote_to(ElectionState::Released).await;
            } else {
                self.state = ElectionState::Released;
            }
            return Err(err);
        }

        self.release().await;
        Ok(())
    }

    /// One scheduler tick: renew-deadline check, then a bounded
    /// acquire-or-renew attempt.
    async fn tick(&mut self) -> Result<(), ElectionError> {
        if self.state == ElectionState::Leading && self.renew_deadline_exceeded() {
            tracing::warn!(
                identity = %self.config.identity,
                lease = %self.key,
                deadline_ms = self.config.renew_deadline.as_millis() as u64,
                "renew deadline exceeded, relinquishing leadership locally"
            );
            self.metrics.record_renew_failure();
            self.demote().await;
        }

        match tokio::time::timeout(self.config.renew_deadline, self.try_acquire_or_renew()).await {
            Ok(result) => {
                result?;
            }
            Err(_) => {
                self.metrics.record_transient_error();
                tracing::warn!(
                    identity = %self.config.identity,
                    lease = %self.key,
                    "store attempt timed out"
                );
            }
        }
        Ok(())
    }

    /// Retry period, jittered while still contending for the lease.
    fn tick_interval(&self) -> Duration {
        if self.state == ElectionState::Leading {
            self.config.retry_period
        } else {
            let factor = 1.0 + rand::rng().random_range(0.0..ACQUIRE_JITTER);
            self.config.retry_period.mul_f64(factor)
        }
    }

    fn renew_deadline_exceeded(&self) -> bool {
        match self.observed.last_renew {
            Some(at) => at.elapsed() >= self.config.renew_deadline,
            None => true,
        }
    }

    /// Final sequence after cancellation of the governing lifetime.
    async fn release(&mut self) {
        if self.state == ElectionState::Leading {
            if self.config.release_on_cancel {
                self.best_effort_release().await;
            }
            self.demote_to(ElectionState::Released).await;
        } else {
            self.state = ElectionState::Released;
        }
        tracing::info!(
            identity = %self.config.identity,
            lease = %self.key,
            "election loop released"
        );
    }

    /// Best-effort holder clear. Conflicts and errors are ignored; lease
    /// expiry remains the correctness backstop if this write fails.
    async fn best_effort_release(&mut self) {
        let (Some(record), Some(version)) =
            (self.observed.record.clone(), self.observed.version.clone())
        else {
            return;
        };
        if !record.held_by_identity(&self.config.identity) {
            return;
        }

        let mut cleared = record;
        cleared.holder_identity = None;
        cleared.renew_time = Utc::now();

        let attempt = tokio::time::timeout(
            self.config.retry_period,
            self.store.update(&self.key, cleared, &version),
        )
        .await;
        match attempt {
            Ok(Ok(_)) => {
                tracing::info!(
                    identity = %self.config.identity,
                    lease = %self.key,
                    "released lease"
                );
            }
            Ok(Err(err)) => {
                tracing::debug!(
                    identity = %self.config.identity,
                    lease = %self.key,
                    error = %err,
                    "best-effort release failed, lease left to expire"
                );
            }
            Err(_) => {
                tracing::debug!(
                    identity = %self.config.identity,
                    lease = %self.key,
                    "best-effort release timed out, lease left to expire"
                );
            }
        }
    }

    // ========================================================================
    // ELECTION PROTOCOL
    // ========================================================================

    /// One protocol cycle: read the record, then create, renew, or take over
    /// depending on what was observed. Returns `true` if this cycle acquired
    /// or renewed the lease.
    pub async fn try_acquire_or_renew(&mut self) -> Result<bool, ElectionError> {
        let now = Utc::now();

        let (record, version) = match self.store.get(&self.key).await {
            Ok(read) => read,
            Err(StoreError::NotFound) => return self.create_lease(now).await,
            Err(StoreError::Corrupt(reason)) => return Err(self.corrupt(reason)),
            Err(err) => {
                self.metrics.record_transient_error();
                tracing::warn!(
                    identity = %self.config.identity,
                    lease = %self.key,
                    error = %err,
                    "failed to read lease record"
                );
                return Ok(false);
            }
        };

        self.observed.observe(record.clone(), version.clone());

        if record.held_by_identity(&self.config.identity) {
            return self.renew_lease(record, version, now).await;
        }

        if let Some(holder) = record.holder() {
            if !record.is_expired(now) {
                // Someone else holds a valid lease.
                let holder = holder.to_string();
                if self.state == ElectionState::Leading {
                    tracing::info!(
                        identity = %self.config.identity,
                        holder = %holder,
                        "lease held by another candidate, stepping down"
                    );
                    self.demote().await;
                } else if self.state == ElectionState::Unknown {
                    self.state = ElectionState::Following;
                }
                self.report_leader(&holder).await;
                return Ok(false);
            }
        }

        // Unheld or expired: contend for it.
        self.take_over_lease(record, version, now).await
    }

    /// Record absent: create it with ourselves as holder.
    async fn create_lease(&mut self, now: DateTime<Utc>) -> Result<bool, ElectionError> {
        self.metrics.record_acquire_attempt();
        let record = LeaseRecord::held_by(
            &self.config.identity,
            self.config.lease_duration_seconds(),
            now,
        );

        match self.store.create(&self.key, record.clone()).await {
            Ok(version) => {
                self.observed.observe(record, version);
                self.metrics.record_acquire_success();
                self.promote().await;
                Ok(true)
            }
            Err(StoreError::AlreadyExists) | Err(StoreError::Conflict) => {
                self.metrics.record_conflict();
                tracing::debug!(
                    identity = %self.config.identity,
                    lease = %self.key,
                    "lost lease creation race"
                );
                if self.state == ElectionState::Unknown {
                    self.state = ElectionState::Following;
                }
                Ok(false)
            }
            Err(StoreError::Corrupt(reason)) => Err(self.corrupt(reason)),
            Err(err) => {
                self.metrics.record_transient_error();
                tracing::warn!(
                    identity = %self.config.identity,
                    lease = %self.key,
                    error = %err,
                    "failed to create lease record"
                );
                Ok(false)
            }
        }
    }

    /// We are the recorded holder: refresh `renew_time`, transitions and
    /// acquire time unchanged.
    async fn renew_lease(
        &mut self,
        record: LeaseRecord,
        version: Version,
        now: DateTime<Utc>,
    ) -> Result<bool, ElectionError> {
        let mut renewed = record;
        renewed.renew_time = now;

        match self.store.update(&self.key, renewed.clone(), &version).await {
            Ok(new_version) => {
                self.observed.observe(renewed, new_version);
                self.metrics.record_renew_success();
                // Also promotes an engine that restarted into its own
                // still-valid lease.
                self.promote().await;
                Ok(true)
            }
            Err(StoreError::Conflict) => {
                self.metrics.record_conflict();
                self.metrics.record_renew_failure();
                tracing::info!(
                    identity = %self.config.identity,
                    lease = %self.key,
                    "renewal conflict, lease lost"
                );
                if self.state == ElectionState::Leading {
                    self.demote().await;
                } else if self.state == ElectionState::Unknown {
                    self.state = ElectionState::Following;
                }
                Ok(false)
            }
            Err(StoreError::Corrupt(reason)) => Err(self.corrupt(reason)),
            Err(err) => {
                self.metrics.record_renew_failure();
                self.metrics.record_transient_error();
                tracing::warn!(
                    identity = %self.config.identity,
                    lease = %self.key,
                    error = %err,
                    "failed to renew lease"
                );
                Ok(false)
            }
        }
    }

    /// Record unheld or expired: contend via compare-and-swap on the read
    /// version. First writer wins; there is no priority among candidates.
    async fn take_over_lease(
        &mut self,
        record: LeaseRecord,
        version: Version,
        now: DateTime<Utc>,
    ) -> Result<bool, ElectionError> {
        self.metrics.record_acquire_attempt();
        let mut claimed = record;
        // The holder is never us here (our own record goes through the renew
        // path), so this is always an identity change.
        claimed.holder_identity = Some(self.config.identity.clone());
        claimed.acquire_time = now;
        claimed.renew_time = now;
        claimed.leader_transitions += 1;

        match self.store.update(&self.key, claimed.clone(), &version).await {
            Ok(new_version) => {
                self.observed.observe(claimed, new_version);
                self.metrics.record_acquire_success();
                self.metrics.record_takeover();
                self.promote().await;
                Ok(true)
            }
            Err(StoreError::Conflict) => {
                self.metrics.record_conflict();
                tracing::debug!(
                    identity = %self.config.identity,
                    lease = %self.key,
                    "another candidate won the lease this cycle"
                );
                if self.state == ElectionState::Unknown {
                    self.state = ElectionState::Following;
                }
                Ok(false)
            }
            Err(StoreError::Corrupt(reason)) => Err(self.corrupt(reason)),
            Err(err) => {
                self.metrics.record_transient_error();
                tracing::warn!(
                    identity = %self.config.identity,
                    lease = %self.key,
                    error = %err,
                    "failed to take over lease"
                );
                Ok(false)
            }
        }
    }

    // ========================================================================
    // STATE TRANSITIONS
    // ========================================================================

    /// Entry into `Leading`. A refresh while already leading only records the
    /// renewal instant; callbacks fire once per transition.
    async fn promote(&mut self) {
        self.observed.last_renew = Some(Instant::now());
        if self.state == ElectionState::Leading {
            return;
        }

        self.state = ElectionState::Leading;
        self.metrics.set_leading(true);
        tracing::info!(
            identity = %self.config.identity,
            lease = %self.key,
            "became leader"
        );
        self.dispatcher.started_leading().await;
        let identity = self.config.identity.clone();
        self.report_leader(&identity).await;
    }

    async fn demote(&mut self) {
        self.demote_to(ElectionState::Following).await;
    }

    /// Leaving `Leading`: the leading scope is cancelled before
    /// `on_stopped_leading` fires.
    async fn demote_to(&mut self, next: ElectionState) {
        self.state = next;
        self.observed.last_renew = None;
        self.metrics.set_leading(false);
        tracing::info!(
            identity = %self.config.identity,
            lease = %self.key,
            state = %next,
            "stopped leading"
        );
        self.dispatcher.stopped_leading().await;
    }

    /// Deduplicated `on_new_leader` dispatch, keyed on the engine's own
    /// last-reported holder.
    async fn report_leader(&mut self, holder: &str) {
        if self.observed.reported_leader.as_deref() == Some(holder) {
            return;
        }
        self.observed.reported_leader = Some(holder.to_string());
        tracing::info!(
            identity = %self.config.identity,
            leader = %holder,
            "observed new leader"
        );
        self.dispatcher.new_leader(holder).await;
    }

    fn corrupt(&self, reason: String) -> ElectionError {
        tracing::error!(
            identity = %self.config.identity,
            lease = %self.key,
            reason = %reason,
            "corrupt lease record, refusing to overwrite unknown state"
        );
        ElectionError::CorruptLease {
            key: self.key.to_string(),
            reason,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
