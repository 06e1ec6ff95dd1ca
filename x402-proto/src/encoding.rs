//! The base64-of-JSON envelope used for x402 HTTP headers.
//!
//! Payments travel in `X-PAYMENT` (client → server, a [`PaymentPayload`]) and
//! settlement results in `X-PAYMENT-RESPONSE` (server → client, a
//! [`SettleResponse`]). Both are standard base64 of the canonical JSON
//! encoding. Decoders reject anything that fails either layer.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::responses::SettleResponse;
use crate::v2::{PaymentPayload, PaymentRequired};

/// Errors produced when decoding an envelope.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    /// The value is not valid base64.
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The decoded bytes are not valid JSON for the expected type.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

fn encode<T: serde::Serialize>(value: &T) -> Result<String, EnvelopeError> {
    let json = serde_json::to_vec(value)?;
    Ok(BASE64.encode(json))
}

fn decode<T: serde::de::DeserializeOwned>(encoded: &str) -> Result<T, EnvelopeError> {
    let bytes = BASE64.decode(encoded.trim())?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Encodes a [`PaymentPayload`] for the `X-PAYMENT` header.
///
/// # Errors
///
/// Returns [`EnvelopeError::Json`] if serialization fails.
pub fn encode_payment(payment: &PaymentPayload) -> Result<String, EnvelopeError> {
    encode(payment)
}

/// Decodes an `X-PAYMENT` header value into a [`PaymentPayload`].
///
/// # Errors
///
/// Returns [`EnvelopeError`] on base64 or JSON failure.
pub fn decode_payment(encoded: &str) -> Result<PaymentPayload, EnvelopeError> {
    decode(encoded)
}

/// Encodes a [`SettleResponse`] for the `X-PAYMENT-RESPONSE` header.
///
/// # Errors
///
/// Returns [`EnvelopeError::Json`] if serialization fails.
pub fn encode_settlement(settlement: &SettleResponse) -> Result<String, EnvelopeError> {
    encode(settlement)
}

/// Decodes an `X-PAYMENT-RESPONSE` header value into a [`SettleResponse`].
///
/// # Errors
///
/// Returns [`EnvelopeError`] on base64 or JSON failure.
pub fn decode_settlement(encoded: &str) -> Result<SettleResponse, EnvelopeError> {
    decode(encoded)
}

/// Encodes a [`PaymentRequired`] as a base64 envelope.
///
/// # Errors
///
/// Returns [`EnvelopeError::Json`] if serialization fails.
pub fn encode_payment_required(required: &PaymentRequired) -> Result<String, EnvelopeError> {
    encode(required)
}

/// Decodes a base64 envelope into a [`PaymentRequired`].
///
/// # Errors
///
/// Returns [`EnvelopeError`] on base64 or JSON failure.
pub fn decode_payment_required(encoded: &str) -> Result<PaymentRequired, EnvelopeError> {
    decode(encoded)
}
