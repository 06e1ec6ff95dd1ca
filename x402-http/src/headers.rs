//! Header names and envelope parsing for the x402 HTTP wire surface.

use http::HeaderValue;
use x402::error::{ErrorCode, PaymentError};
use x402::proto::encoding::{decode_payment, decode_settlement, encode_payment, encode_settlement};
use x402::proto::responses::SettleResponse;
use x402::proto::v2::{PaymentPayload, PaymentRequired, PaymentRequirements, ResourceInfo};
use x402::proto::X402_VERSION;

/// Header carrying the client's payment (base64 of JSON [`PaymentPayload`]).
pub const X_PAYMENT: &str = "X-PAYMENT";

/// Header carrying the settlement result (base64 of JSON [`SettleResponse`]).
pub const X_PAYMENT_RESPONSE: &str = "X-PAYMENT-RESPONSE";

/// Decodes and validates an `X-PAYMENT` header value.
///
/// # Errors
///
/// Returns [`ErrorCode::MalformedHeader`] when the envelope fails to decode
/// and [`ErrorCode::UnsupportedVersion`] when the payload's `x402Version` is
/// not the supported version.
pub fn parse_payment_header(value: &str) -> Result<PaymentPayload, PaymentError> {
    let payment = decode_payment(value).map_err(|e| {
        PaymentError::new(ErrorCode::MalformedHeader, "failed to decode payment header")
            .with_source(e)
    })?;

    if payment.x402_version != X402_VERSION {
        return Err(PaymentError::new(
            ErrorCode::UnsupportedVersion,
            format!(
                "unsupported x402 version: {} (expected {X402_VERSION})",
                payment.x402_version
            ),
        ));
    }

    Ok(payment)
}

/// Encodes a payment for the `X-PAYMENT` header.
///
/// # Errors
///
/// Returns [`ErrorCode::MalformedHeader`] if serialization fails.
pub fn build_payment_header(payment: &PaymentPayload) -> Result<String, PaymentError> {
    encode_payment(payment).map_err(|e| {
        PaymentError::new(ErrorCode::MalformedHeader, "failed to encode payment header")
            .with_source(e)
    })
}

/// Encodes a settlement for the `X-PAYMENT-RESPONSE` header.
///
/// # Errors
///
/// Returns [`ErrorCode::MalformedHeader`] if serialization fails or the
/// encoded value is not a valid header value.
pub fn settlement_header(settlement: &SettleResponse) -> Result<HeaderValue, PaymentError> {
    let encoded = encode_settlement(settlement).map_err(|e| {
        PaymentError::new(ErrorCode::MalformedHeader, "failed to encode settlement").with_source(e)
    })?;
    HeaderValue::from_str(&encoded).map_err(|e| {
        PaymentError::new(ErrorCode::MalformedHeader, "settlement header value invalid")
            .with_source(e)
    })
}

/// Decodes an `X-PAYMENT-RESPONSE` header value, returning `None` on any
/// failure.
#[must_use]
pub fn parse_settlement_header(value: &str) -> Option<SettleResponse> {
    if value.is_empty() {
        return None;
    }
    decode_settlement(value).ok()
}

/// Builds the 402 response body for the given resource and options.
#[must_use]
pub fn payment_required_body(
    resource: &ResourceInfo,
    accepts: &[PaymentRequirements],
    error: &str,
) -> PaymentRequired {
    PaymentRequired {
        x402_version: X402_VERSION,
        error: Some(error.to_owned()),
        resource: Some(resource.clone()),
        accepts: accepts.to_vec(),
        extensions: None,
    }
}
