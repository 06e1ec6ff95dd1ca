//! Protocol types for x402 version 2.
//!
//! V2 identifies blockchains by CAIP-2 network strings (e.g., `eip155:8453`),
//! describes the protected resource with a [`ResourceInfo`] object, and embeds
//! the accepted requirement inside the client's [`PaymentPayload`] so that a
//! signed payment binds to exactly one server-offered option.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Network;

/// Describes the protected resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceInfo {
    /// URL of the protected resource.
    pub url: String,

    /// Optional human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Content type of the protected resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl ResourceInfo {
    /// Creates a resource description for the given URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            description: None,
            mime_type: None,
        }
    }
}

/// A single acceptable payment option, one element of the `accepts` array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    /// Payment scheme identifier (e.g., `"exact"`).
    pub scheme: String,

    /// Blockchain network in CAIP-2 format (e.g., `"eip155:8453"`).
    pub network: Network,

    /// Payment amount in atomic units (e.g., wei, lamports), as a decimal string.
    pub amount: String,

    /// Token contract address (EVM) or mint address (Solana).
    pub asset: String,

    /// Recipient address for the payment.
    pub pay_to: String,

    /// Validity period for the payment authorization, in seconds.
    pub max_timeout_seconds: u64,

    /// Scheme-specific additional data (EVM: EIP-712 domain `name`/`version`;
    /// SVM: `feePayer`). Unknown keys round-trip verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Map<String, Value>>,
}

impl PaymentRequirements {
    /// Returns a string value from `extra`, if present.
    #[must_use]
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.as_ref()?.get(key)?.as_str()
    }
}

/// A protocol extension with its data and schema.
///
/// Extensions are passthrough only: neither `info` nor `schema` is validated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Extension {
    /// Extension data.
    #[serde(default)]
    pub info: serde_json::Map<String, Value>,

    /// JSON schema for `info`.
    #[serde(default)]
    pub schema: serde_json::Map<String, Value>,
}

/// The 402 response body sent by resource servers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequired {
    /// Protocol version (2).
    pub x402_version: u32,

    /// Human-readable error message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// The protected resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceInfo>,

    /// Payment options the server will accept. Non-empty.
    pub accepts: Vec<PaymentRequirements>,

    /// Protocol extensions, passthrough.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<HashMap<String, Extension>>,
}

/// Client-signed payment sent to pay for a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    /// Protocol version (2).
    pub x402_version: u32,

    /// The resource being accessed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceInfo>,

    /// The server-offered requirement this payment satisfies. Must match one
    /// of the 402 response's `accepts` entries on scheme and network.
    pub accepted: PaymentRequirements,

    /// Blockchain-specific signed payment data.
    pub payload: ExactPayload,

    /// Protocol extensions, passthrough.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<HashMap<String, Extension>>,
}

/// Blockchain-specific payment payload.
///
/// The wire format is an open object; which variant applies follows from the
/// `accepted.network` namespace. Deserialization is structural: the EVM shape
/// carries `signature` + `authorization`, the SVM shape carries `transaction`,
/// and anything else is preserved verbatim in [`ExactPayload::Other`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExactPayload {
    /// EIP-3009 authorization for `eip155:*` networks.
    Evm(EvmPayload),
    /// Partially signed transaction for `solana:*` networks.
    Svm(SvmPayload),
    /// Unrecognized payload shape, round-tripped untouched.
    Other(Value),
}

impl ExactPayload {
    /// Returns the EVM payload if this is the EVM variant.
    #[must_use]
    pub const fn as_evm(&self) -> Option<&EvmPayload> {
        match self {
            Self::Evm(p) => Some(p),
            _ => None,
        }
    }

    /// Returns the SVM payload if this is the SVM variant.
    #[must_use]
    pub const fn as_svm(&self) -> Option<&SvmPayload> {
        match self {
            Self::Svm(p) => Some(p),
            _ => None,
        }
    }
}

/// EIP-3009 authorization data for EVM payments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvmPayload {
    /// Hex-encoded 65-byte ECDSA signature, `0x`-prefixed, `v` ∈ {27, 28}.
    pub signature: String,

    /// The `transferWithAuthorization` parameters that were signed.
    pub authorization: EvmAuthorization,
}

/// EIP-3009 `transferWithAuthorization` parameters.
///
/// Numeric fields are decimal strings to avoid precision loss in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvmAuthorization {
    /// The payer's address.
    pub from: String,

    /// The recipient's address.
    pub to: String,

    /// Payment amount in atomic units (wei).
    pub value: String,

    /// Unix timestamp after which the authorization is valid.
    pub valid_after: String,

    /// Unix timestamp before which the authorization is valid.
    pub valid_before: String,

    /// Unique 32-byte hex nonce preventing replay.
    pub nonce: String,
}

/// A partially signed Solana transaction.
///
/// The client signs with the payer key; the facilitator adds the fee-payer
/// signature during settlement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SvmPayload {
    /// Base64-encoded partially signed transaction.
    pub transaction: String,
}
