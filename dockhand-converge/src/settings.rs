//! Polling cadence configuration.

use std::time::Duration;

use crate::error::ConvergeError;

/// Timing for one convergence run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvergeSettings {
    /// Overall deadline for the run, measured from entry.
    pub timeout: Duration,
    /// Lower bound on the pause between two probes.
    pub min_interval: Duration,
    /// Pause before the first probe.
    pub initial_delay: Duration,
}

impl Default for ConvergeSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            min_interval: Duration::from_secs(5),
            initial_delay: Duration::from_secs(2),
        }
    }
}

impl ConvergeSettings {
    /// Settings with a custom deadline, keeping the default cadence.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ConvergeError> {
        if self.min_interval > self.timeout {
            return Err(ConvergeError::InvalidSettings(format!(
                "min_interval {:?} exceeds timeout {:?}",
                self.min_interval, self.timeout
            )));
        }
        if self.initial_delay >= self.timeout {
            return Err(ConvergeError::InvalidSettings(format!(
                "initial_delay {:?} must be shorter than timeout {:?}",
                self.initial_delay, self.timeout
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(ConvergeSettings::default().validate().is_ok());
    }

    #[test]
    fn test_min_interval_above_timeout_rejected() {
        let settings = ConvergeSettings {
            timeout: Duration::from_secs(1),
            min_interval: Duration::from_secs(5),
            initial_delay: Duration::from_millis(1),
        };
        assert!(matches!(
            settings.validate(),
            Err(ConvergeError::InvalidSettings(_))
        ));
    }

    #[test]
    fn test_initial_delay_must_undercut_timeout() {
        let settings = ConvergeSettings {
            timeout: Duration::from_secs(5),
            min_interval: Duration::from_secs(1),
            initial_delay: Duration::from_secs(5),
        };
        assert!(matches!(
            settings.validate(),
            Err(ConvergeError::InvalidSettings(_))
        ));
    }
}
