//! Election configuration and construction-time validation.

use crate::record::LeaseKey;
use std::time::Duration;

/// Fatal configuration error detected at construction.
///
/// The engine never starts with an invalid configuration; nothing is clamped
/// or silently corrected.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("candidate identity must not be empty")]
    EmptyIdentity,
    #[error("lease name must not be empty")]
    EmptyLeaseName,
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
    #[error("retry period ({retry:?}) must be shorter than renew deadline ({renew:?})")]
    RetryNotBelowRenew { retry: Duration, renew: Duration },
    #[error("renew deadline ({renew:?}) must be shorter than lease duration ({lease:?})")]
    RenewNotBelowLease { renew: Duration, lease: Duration },
    #[error("lease duration ({0:?}) must be a whole number of seconds")]
    FractionalLeaseDuration(Duration),
    #[error("{0} is required")]
    MissingField(&'static str),
}

/// Immutable settings for one candidate engine.
#[derive(Debug, Clone)]
pub struct ElectionConfig {
    /// Unique identity among candidates contending for the same lease.
    pub identity: String,
    pub lease_name: String,
    pub lease_namespace: String,
    /// How long a renewal remains valid without refresh. Carried in the
    /// shared record as whole seconds; fractional durations are rejected.
    pub lease_duration: Duration,
    /// Maximum time since the last successful renew before a leading
    /// candidate relinquishes leadership locally.
    pub renew_deadline: Duration,
    /// Tick interval of the scheduler loop.
    pub retry_period: Duration,
    /// Whether to clear the holder with a final best-effort write when the
    /// engine is cancelled while leading.
    pub release_on_cancel: bool,
}

impl ElectionConfig {
    /// Enforces `retry_period < renew_deadline < lease_duration` plus
    /// non-empty identity and lease name.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.identity.is_empty() {
            return Err(ConfigError::EmptyIdentity);
        }
        if self.lease_name.is_empty() {
            return Err(ConfigError::EmptyLeaseName);
        }
        if self.lease_duration.is_zero() {
            return Err(ConfigError::ZeroDuration("lease duration"));
        }
        // The shared record carries whole seconds; a fractional duration
        // would silently change the effective expiry.
        if self.lease_duration.subsec_nanos() != 0 {
            return Err(ConfigError::FractionalLeaseDuration(self.lease_duration));
        }
        if self.renew_deadline.is_zero() {
            return Err(ConfigError::ZeroDuration("renew deadline"));
        }
        if self.retry_period.is_zero() {
            return Err(ConfigError::ZeroDuration("retry period"));
        }
        if self.retry_period >= self.renew_deadline {
            return Err(ConfigError::RetryNotBelowRenew {
                retry: self.retry_period,
                renew: self.renew_deadline,
            });
        }
        if self.renew_deadline >= self.lease_duration {
            return Err(ConfigError::RenewNotBelowLease {
                renew: self.renew_deadline,
                lease: self.lease_duration,
            });
        }
        Ok(())
    }

    pub(crate) fn lease_key(&self) -> LeaseKey {
        LeaseKey::new(&self.lease_name, &self.lease_namespace)
    }

    /// Lease duration as carried in the shared record. Exact: `validate`
    /// rejects durations with a fractional second.
    pub(crate) fn lease_duration_seconds(&self) -> u64 {
        self.lease_duration.as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> ElectionConfig {
        ElectionConfig {
            identity: "node-1".to_string(),
            lease_name: "controller-leader".to_string(),
            lease_namespace: "default".to_string(),
            lease_duration: Duration::from_secs(15),
            renew_deadline: Duration::from_secs(10),
            retry_period: Duration::from_secs(2),
            release_on_cancel: true,
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert_eq!(valid().validate(), Ok(()));
    }

    #[test]
    fn test_empty_identity_rejected() {
        let mut config = valid();
        config.identity.clear();
        assert_eq!(config.validate(), Err(ConfigError::EmptyIdentity));
    }

    #[test]
    fn test_empty_lease_name_rejected() {
        let mut config = valid();
        config.lease_name.clear();
        assert_eq!(config.validate(), Err(ConfigError::EmptyLeaseName));
    }

    #[test]
    fn test_retry_period_must_be_below_renew_deadline() {
        let mut config = valid();
        config.retry_period = config.renew_deadline;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::RetryNotBelowRenew { .. })
        ));
    }

    #[test]
    fn test_renew_deadline_must_be_below_lease_duration() {
        let mut config = valid();
        config.renew_deadline = config.lease_duration;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::RenewNotBelowLease { .. })
        ));
    }

    #[test]
    fn test_zero_durations_rejected() {
        let mut config = valid();
        config.retry_period = Duration::ZERO;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroDuration(_))));
    }

    #[test]
    fn test_fractional_lease_duration_rejected() {
        let mut config = valid();
        config.lease_duration = Duration::from_millis(15_500);
        assert_eq!(
            config.validate(),
            Err(ConfigError::FractionalLeaseDuration(Duration::from_millis(
                15_500
            )))
        );
    }
}
