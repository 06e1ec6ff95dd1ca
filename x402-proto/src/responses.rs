//! Facilitator request and response types.
//!
//! These types carry the wire traffic between a resource server and a
//! facilitator's `/verify`, `/settle`, and `/supported` endpoints.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::v2::{PaymentPayload, PaymentRequirements};
use crate::Network;

/// Request body for the facilitator `/verify` endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    /// Protocol version (2).
    pub x402_version: u32,

    /// The client's signed payment.
    pub payment_payload: PaymentPayload,

    /// The requirement the payment must satisfy.
    pub payment_requirements: PaymentRequirements,
}

/// Request body for the facilitator `/settle` endpoint.
///
/// Same shape as [`VerifyRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleRequest {
    /// Protocol version (2).
    pub x402_version: u32,

    /// The client's signed payment.
    pub payment_payload: PaymentPayload,

    /// The requirement the payment must satisfy.
    pub payment_requirements: PaymentRequirements,
}

impl From<VerifyRequest> for SettleRequest {
    fn from(value: VerifyRequest) -> Self {
        Self {
            x402_version: value.x402_version,
            payment_payload: value.payment_payload,
            payment_requirements: value.payment_requirements,
        }
    }
}

/// Response from payment verification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    /// Whether the payment is valid.
    pub is_valid: bool,

    /// Machine-readable reason for invalidity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<String>,

    /// Human-readable message for invalidity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_message: Option<String>,

    /// The payer's address, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
}

impl VerifyResponse {
    /// Creates a valid verification response.
    #[must_use]
    pub fn valid(payer: impl Into<String>) -> Self {
        Self {
            is_valid: true,
            invalid_reason: None,
            invalid_message: None,
            payer: Some(payer.into()),
        }
    }

    /// Creates an invalid verification response.
    #[must_use]
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            invalid_reason: Some(reason.into()),
            invalid_message: None,
            payer: None,
        }
    }
}

/// Response from payment settlement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleResponse {
    /// Whether settlement was successful.
    pub success: bool,

    /// Machine-readable reason for failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,

    /// Human-readable message for failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// On-chain transaction hash, or empty when settlement was not attempted.
    #[serde(default)]
    pub transaction: String,

    /// Network where settlement occurred (CAIP-2 format).
    #[serde(default)]
    pub network: Network,

    /// The payer's address, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
}

impl SettleResponse {
    /// Creates a successful settlement response.
    #[must_use]
    pub fn succeeded(transaction: impl Into<String>, network: impl Into<String>) -> Self {
        Self {
            success: true,
            error_reason: None,
            error_message: None,
            transaction: transaction.into(),
            network: network.into(),
            payer: None,
        }
    }

    /// Creates a failed settlement response.
    #[must_use]
    pub fn failed(reason: impl Into<String>, network: impl Into<String>) -> Self {
        Self {
            success: false,
            error_reason: Some(reason.into()),
            error_message: None,
            transaction: String::new(),
            network: network.into(),
            payer: None,
        }
    }

    /// Sets the payer address.
    #[must_use]
    pub fn with_payer(mut self, payer: impl Into<String>) -> Self {
        self.payer = Some(payer.into());
        self
    }
}

/// A payment kind supported by a facilitator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedKind {
    /// Protocol version for this kind.
    pub x402_version: u32,

    /// Payment scheme identifier (e.g., `"exact"`).
    pub scheme: String,

    /// Blockchain network in CAIP-2 format.
    pub network: Network,

    /// Scheme-specific additional data (e.g., `feePayer` for SVM networks).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Map<String, Value>>,
}

/// Response from the facilitator `/supported` endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedResponse {
    /// Payment kinds supported by the facilitator.
    #[serde(default)]
    pub kinds: Vec<SupportedKind>,

    /// Extension identifiers supported.
    #[serde(default)]
    pub extensions: Vec<String>,

    /// Map of CAIP-2 network pattern to signer addresses.
    #[serde(default)]
    pub signers: HashMap<String, Vec<String>>,
}
