//! The facilitator abstraction.
//!
//! A facilitator verifies signed payment authorizations and settles them
//! on-chain. The trait is dyn-compatible so gates can hold heterogeneous
//! instances (the HTTP client from `x402-http`, or a mock in tests) as
//! `Arc<dyn Facilitator>`.

use std::sync::Arc;

use x402_proto::responses::{SettleResponse, SupportedResponse, VerifyResponse};
use x402_proto::v2::{PaymentPayload, PaymentRequirements};

use crate::error::PaymentError;
use crate::signer::BoxFuture;

/// Fetches the facilitator's supported kinds and merges their `extra` data
/// into matching requirements (e.g., the SVM `feePayer`). An unreachable
/// facilitator is logged and the original list is returned unchanged.
pub async fn enrich_requirements(
    facilitator: &dyn Facilitator,
    requirements: &[PaymentRequirements],
) -> Vec<PaymentRequirements> {
    match facilitator.supported().await {
        Ok(supported) => {
            let enriched = merge_supported_extra(requirements, &supported);
            tracing::info!(
                count = enriched.len(),
                "payment requirements enriched from facilitator"
            );
            enriched
        }
        Err(err) => {
            tracing::warn!(error = %err, "failed to enrich payment requirements from facilitator");
            requirements.to_vec()
        }
    }
}

/// Merges `SupportedKind.extra` keys into requirements matched by
/// `(network, scheme)`. Caller-provided keys win ties.
#[must_use]
pub fn merge_supported_extra(
    requirements: &[PaymentRequirements],
    supported: &SupportedResponse,
) -> Vec<PaymentRequirements> {
    requirements
        .iter()
        .cloned()
        .map(|mut req| {
            let kind = supported
                .kinds
                .iter()
                .find(|k| k.network == req.network && k.scheme == req.scheme);
            if let Some(kind_extra) = kind.and_then(|k| k.extra.as_ref()) {
                let extra = req.extra.get_or_insert_with(serde_json::Map::new);
                for (key, value) in kind_extra {
                    extra.entry(key.clone()).or_insert_with(|| value.clone());
                }
            }
            req
        })
        .collect()
}

/// Asynchronous interface to an x402 payment facilitator.
pub trait Facilitator: Send + Sync {
    /// Verifies a payment authorization without executing the transaction.
    fn verify<'a>(
        &'a self,
        payload: &'a PaymentPayload,
        requirements: &'a PaymentRequirements,
    ) -> BoxFuture<'a, Result<VerifyResponse, PaymentError>>;

    /// Executes a verified payment on the blockchain.
    fn settle<'a>(
        &'a self,
        payload: &'a PaymentPayload,
        requirements: &'a PaymentRequirements,
    ) -> BoxFuture<'a, Result<SettleResponse, PaymentError>>;

    /// Queries the facilitator for supported payment kinds.
    fn supported(&self) -> BoxFuture<'_, Result<SupportedResponse, PaymentError>>;
}

impl<T: Facilitator> Facilitator for Arc<T> {
    fn verify<'a>(
        &'a self,
        payload: &'a PaymentPayload,
        requirements: &'a PaymentRequirements,
    ) -> BoxFuture<'a, Result<VerifyResponse, PaymentError>> {
        self.as_ref().verify(payload, requirements)
    }

    fn settle<'a>(
        &'a self,
        payload: &'a PaymentPayload,
        requirements: &'a PaymentRequirements,
    ) -> BoxFuture<'a, Result<SettleResponse, PaymentError>> {
        self.as_ref().settle(payload, requirements)
    }

    fn supported(&self) -> BoxFuture<'_, Result<SupportedResponse, PaymentError>> {
        self.as_ref().supported()
    }
}
