//! Wire format types for the x402 payment protocol, version 2.
//!
//! This crate defines the serialization-level data structures exchanged
//! between clients, resource servers, and facilitators, plus the
//! base64-of-JSON envelope codec used for HTTP headers. It has minimal
//! dependencies (`serde`, `serde_json`, `base64`) and is the shared
//! "lingua franca" across the rest of the x402 stack.
//!
//! # Modules
//!
//! - [`v2`] — protocol types (`PaymentRequirements`, `PaymentPayload`, etc.)
//! - [`responses`] — facilitator responses (`VerifyResponse`, `SettleResponse`, etc.)
//! - [`encoding`] — the base64 envelope used for `X-PAYMENT` and
//!   `X-PAYMENT-RESPONSE` headers
//! - [`amount`] — decimal ↔ atomic-unit amount conversion

pub mod amount;
pub mod encoding;
pub mod responses;
pub mod v2;

pub use encoding::{
    decode_payment, decode_payment_required, decode_settlement, encode_payment,
    encode_payment_required, encode_settlement, EnvelopeError,
};
pub use responses::{
    SettleRequest, SettleResponse, SupportedKind, SupportedResponse, VerifyRequest, VerifyResponse,
};
pub use v2::{
    EvmAuthorization, EvmPayload, ExactPayload, Extension, PaymentPayload, PaymentRequired,
    PaymentRequirements, ResourceInfo, SvmPayload,
};

/// Current protocol version.
pub const X402_VERSION: u32 = 2;

/// CAIP-2 format network identifier (e.g., `"eip155:8453"`).
pub type Network = String;
