//! Session error types.

use bb84_proto::Phase;
use thiserror::Error;

/// Reasons the session refuses an operation.
///
/// A refused operation leaves the session untouched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    /// Operation is not valid in the current phase.
    #[error("{action} requires phase {expected}, session is in {actual}")]
    InvalidPhase {
        /// Operation attempted
        action: &'static str,
        /// Phase the operation starts from
        expected: Phase,
        /// Current phase
        actual: Phase,
    },

    /// Bases were published before the receiver reported measurements.
    #[error("receiver has not reported measurements yet")]
    MeasurementsMissing,

    /// Transmission carried no photons.
    #[error("transmission contains no photons")]
    EmptyTransmission,

    /// QBER is at or above the abort threshold.
    #[error("QBER {qber:.4} is at or above threshold {threshold:.4}, key aborted")]
    ThresholdExceeded {
        /// Measured error rate
        qber: f64,
        /// Configured threshold
        threshold: f64,
    },
}

impl SessionError {
    /// True if the run can no longer yield a key and should be restarted.
    pub fn requires_restart(&self) -> bool {
        matches!(self, Self::ThresholdExceeded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_phase_display() {
        let err = SessionError::InvalidPhase {
            action: "finalize_key",
            expected: Phase::ErrorCheck,
            actual: Phase::Setup,
        };
        assert_eq!(err.to_string(), "finalize_key requires phase error_check, session is in setup");
        assert!(!err.requires_restart());
    }

    #[test]
    fn threshold_exceeded_requires_restart() {
        let err = SessionError::ThresholdExceeded { qber: 0.25, threshold: 0.11 };
        assert!(err.requires_restart());
        assert_eq!(err.to_string(), "QBER 0.2500 is at or above threshold 0.1100, key aborted");
    }
}
