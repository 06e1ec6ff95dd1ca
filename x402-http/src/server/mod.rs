//! Payment gating middleware for HTTP servers.
//!
//! [`GateConfig`] describes a protected route: where the facilitator lives,
//! what payments are accepted, and how settlement behaves. Building it yields
//! a [`PaymentGateLayer`] that wraps any `tower` service with the
//! intercept → verify → execute → settle pipeline.

mod gate;
mod layer;

use std::sync::Arc;
use std::time::Duration;

use x402::config::TimeoutConfig;
use x402::error::{ErrorCode, PaymentError};
use x402::facilitator::Facilitator;
use x402::proto::v2::{PaymentRequirements, ResourceInfo};

use crate::facilitator::{
    Authorization, FacilitatorClient, OnAfterSettleHook, OnAfterVerifyHook, OnBeforeHook,
};

pub use gate::{PaymentGate, VerifiedPayment};
pub use layer::{PaymentGateLayer, PaymentGateService};

/// Configuration for the HTTP payment gate.
#[derive(Default)]
pub struct GateConfig {
    /// Primary facilitator endpoint. Required.
    pub facilitator_url: String,

    /// Optional backup facilitator, tried when the primary fails.
    pub fallback_facilitator_url: Option<String>,

    /// Authorization for the primary facilitator.
    pub authorization: Option<Authorization>,

    /// Authorization for the fallback facilitator.
    pub fallback_authorization: Option<Authorization>,

    /// Hooks around the primary facilitator's verify operation.
    pub on_before_verify: Option<OnBeforeHook>,
    /// Called with the verify outcome.
    pub on_after_verify: Option<OnAfterVerifyHook>,
    /// Hooks around the primary facilitator's settle operation.
    pub on_before_settle: Option<OnBeforeHook>,
    /// Called with the settle outcome.
    pub on_after_settle: Option<OnAfterSettleHook>,

    /// Skip settlement; verified requests pass with a synthetic settlement
    /// response.
    pub verify_only: bool,

    /// The protected resource. An empty URL is auto-populated per request.
    pub resource: Option<ResourceInfo>,

    /// Accepted payment options. Must be non-empty.
    pub payment_requirements: Vec<PaymentRequirements>,

    /// Facilitator operation timeouts.
    pub timeouts: TimeoutConfig,

    /// Retry count for availability failures (0 = no retries).
    pub max_retries: u32,

    /// Initial backoff delay between retries.
    pub retry_delay: Duration,
}

impl std::fmt::Debug for GateConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GateConfig")
            .field("facilitator_url", &self.facilitator_url)
            .field("fallback_facilitator_url", &self.fallback_facilitator_url)
            .field("verify_only", &self.verify_only)
            .field("payment_requirements", &self.payment_requirements.len())
            .finish_non_exhaustive()
    }
}

impl GateConfig {
    /// Creates a configuration for the given facilitator and accepted
    /// payments.
    #[must_use]
    pub fn new(facilitator_url: &str, payment_requirements: Vec<PaymentRequirements>) -> Self {
        Self {
            facilitator_url: facilitator_url.to_owned(),
            payment_requirements,
            timeouts: TimeoutConfig::default(),
            ..Self::default()
        }
    }

    /// Builds the middleware layer.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::InvalidRequirements`] when the facilitator URL is
    /// empty, no payment requirements are configured, or the timeouts are
    /// inconsistent.
    pub fn build(self) -> Result<PaymentGateLayer, PaymentError> {
        if self.facilitator_url.is_empty() {
            return Err(PaymentError::new(
                ErrorCode::InvalidRequirements,
                "facilitator URL must be provided",
            ));
        }
        if self.payment_requirements.is_empty() {
            return Err(PaymentError::new(
                ErrorCode::InvalidRequirements,
                "payment requirements must be non-empty",
            ));
        }
        self.timeouts.validate()?;

        let mut primary = FacilitatorClient::new(&self.facilitator_url)
            .with_timeouts(self.timeouts)
            .with_retry(self.max_retries, self.retry_delay)
            .with_verify_hooks(self.on_before_verify, self.on_after_verify)
            .with_settle_hooks(self.on_before_settle, self.on_after_settle);
        if let Some(authorization) = self.authorization {
            primary = primary.with_authorization(authorization);
        }

        let fallback: Option<Arc<dyn Facilitator>> = match self.fallback_facilitator_url {
            Some(url) if !url.is_empty() => {
                let mut client = FacilitatorClient::new(&url)
                    .with_timeouts(self.timeouts)
                    .with_retry(self.max_retries, self.retry_delay);
                if let Some(authorization) = self.fallback_authorization {
                    client = client.with_authorization(authorization);
                }
                Some(Arc::new(client))
            }
            _ => None,
        };

        let gate = PaymentGate::new(Arc::new(primary), self.payment_requirements)
            .with_verify_only(self.verify_only);
        let gate = match self.resource {
            Some(resource) => gate.with_resource(resource),
            None => gate,
        };
        let gate = match fallback {
            Some(fallback) => gate.with_fallback(fallback),
            None => gate,
        };

        Ok(PaymentGateLayer::new(gate))
    }
}
