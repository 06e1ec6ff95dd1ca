//! The signer capability and token configuration.
//!
//! A [`Signer`] produces signed [`PaymentPayload`]s for one blockchain
//! network. Implementations live in the chain-specific crates (`x402-evm`,
//! `x402-svm`). Signer instances are shared across requests and must be safe
//! for concurrent [`Signer::sign`] calls.

use std::future::Future;
use std::pin::Pin;

use x402_proto::v2::{PaymentPayload, PaymentRequirements};

use crate::error::PaymentError;

/// A boxed, sendable future, for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A token supported by a signer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenConfig {
    /// Token contract address (EVM) or mint address (Solana).
    pub address: String,

    /// Token symbol (e.g., `"USDC"`).
    pub symbol: String,

    /// Number of decimal places for the token.
    pub decimals: u8,

    /// Priority within the signer. Lower numbers are preferred.
    pub priority: i32,

    /// Human-readable token name.
    pub name: String,
}

/// Creates signed payment payloads for a specific network.
pub trait Signer: Send + Sync {
    /// Returns the CAIP-2 network identifier (e.g., `"eip155:8453"`).
    fn network(&self) -> &str;

    /// Returns the payment scheme identifier (e.g., `"exact"`).
    fn scheme(&self) -> &str;

    /// Checks whether this signer can satisfy the given requirements: scheme
    /// and network must match and the asset must be among the signer's tokens.
    fn can_sign(&self, requirements: &PaymentRequirements) -> bool;

    /// Creates a signed [`PaymentPayload`] for the given requirements.
    ///
    /// Fails if signing fails or the payment exceeds configured limits.
    fn sign<'a>(
        &'a self,
        requirements: &'a PaymentRequirements,
    ) -> BoxFuture<'a, Result<PaymentPayload, PaymentError>>;

    /// Returns the signer's priority level. Lower numbers are preferred.
    fn priority(&self) -> i32;

    /// Returns the tokens supported by this signer.
    fn tokens(&self) -> &[TokenConfig];

    /// Returns the per-call spending limit in atomic units, if any.
    fn max_amount(&self) -> Option<u128>;
}
