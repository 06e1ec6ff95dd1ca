//! Timeout configuration for payment operations.

use std::time::Duration;

use crate::error::{ErrorCode, PaymentError};

/// Timeouts applied to facilitator operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Maximum time to wait for payment verification.
    pub verify: Duration,

    /// Maximum time to wait for payment settlement.
    pub settle: Duration,

    /// Overall timeout for HTTP requests.
    pub request: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            verify: Duration::from_secs(5),
            settle: Duration::from_secs(60),
            request: Duration::from_secs(120),
        }
    }
}

impl TimeoutConfig {
    /// Returns a copy with the verify timeout replaced.
    #[must_use]
    pub const fn with_verify(mut self, d: Duration) -> Self {
        self.verify = d;
        self
    }

    /// Returns a copy with the settle timeout replaced.
    #[must_use]
    pub const fn with_settle(mut self, d: Duration) -> Self {
        self.settle = d;
        self
    }

    /// Returns a copy with the overall request timeout replaced.
    #[must_use]
    pub const fn with_request(mut self, d: Duration) -> Self {
        self.request = d;
        self
    }

    /// Ensures the timeouts are positive and that settlement is allowed at
    /// least as long as verification.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::InvalidRequirements`] on a violated constraint.
    pub fn validate(&self) -> Result<(), PaymentError> {
        if self.verify.is_zero() || self.settle.is_zero() || self.request.is_zero() {
            return Err(PaymentError::new(
                ErrorCode::InvalidRequirements,
                "timeouts must be positive",
            ));
        }
        if self.settle < self.verify {
            return Err(PaymentError::new(
                ErrorCode::InvalidRequirements,
                format!(
                    "settle timeout ({:?}) must be >= verify timeout ({:?})",
                    self.settle, self.verify
                ),
            ));
        }
        Ok(())
    }
}
