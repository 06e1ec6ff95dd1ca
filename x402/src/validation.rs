//! Structural validation of x402 protocol data.
//!
//! Pure checks on requirements, payloads, and 402 response bodies: amount
//! format, CAIP-2 networks, per-network address formats, scheme, and the
//! EIP-3009 domain parameters. Nothing here touches the network.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;
use x402_proto::v2::{PaymentPayload, PaymentRequired, PaymentRequirements, ResourceInfo};
use x402_proto::X402_VERSION;

use crate::chain::{self, NetworkType};
use crate::error::{ErrorCode, PaymentError};

static EVM_ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0x[a-fA-F0-9]{40}$").expect("valid regex"));

static SOLANA_ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[1-9A-HJ-NP-Za-km-z]{32,44}$").expect("valid regex"));

/// Validates that an amount string is a non-negative decimal integer.
///
/// Zero is permitted: zero-value payments carry a verified signature without
/// value transfer.
///
/// # Errors
///
/// Returns [`ErrorCode::InvalidAmount`] on empty, malformed, or negative input.
pub fn validate_amount(amount: &str) -> Result<(), PaymentError> {
    if amount.is_empty() {
        return Err(PaymentError::new(
            ErrorCode::InvalidAmount,
            "amount cannot be empty",
        ));
    }
    if amount.starts_with('-') {
        return Err(PaymentError::new(
            ErrorCode::InvalidAmount,
            format!("amount cannot be negative: {amount}"),
        ));
    }
    if amount.parse::<u128>().is_err() {
        return Err(PaymentError::new(
            ErrorCode::InvalidAmount,
            format!("invalid amount format: {amount}"),
        ));
    }
    Ok(())
}

/// Validates a CAIP-2 network identifier.
///
/// # Errors
///
/// Returns [`ErrorCode::InvalidNetwork`] on malformed or unsupported networks.
pub fn validate_network(network: &str) -> Result<(), PaymentError> {
    chain::validate_network(network).map(|_| ())
}

/// Validates an address according to the network's address format.
///
/// EVM addresses are `0x` plus 40 hex characters; Solana addresses are
/// base58 strings of 32–44 characters.
///
/// # Errors
///
/// Returns [`ErrorCode::InvalidRequirements`] on a format mismatch, or
/// [`ErrorCode::InvalidNetwork`] if the network itself is invalid.
pub fn validate_address(address: &str, network: &str) -> Result<(), PaymentError> {
    if address.is_empty() {
        return Err(PaymentError::new(
            ErrorCode::InvalidRequirements,
            "address cannot be empty",
        ));
    }

    match chain::validate_network(network)? {
        NetworkType::Evm { .. } => {
            if !EVM_ADDRESS.is_match(address) {
                return Err(PaymentError::new(
                    ErrorCode::InvalidRequirements,
                    format!("invalid EVM address format: {address}"),
                ));
            }
        }
        NetworkType::Svm { .. } => {
            if !SOLANA_ADDRESS.is_match(address) {
                return Err(PaymentError::new(
                    ErrorCode::InvalidRequirements,
                    format!("invalid Solana address format: {address}"),
                ));
            }
        }
    }
    Ok(())
}

/// Validates a [`ResourceInfo`]: the URL must be non-empty and parseable.
///
/// # Errors
///
/// Returns [`ErrorCode::InvalidRequirements`] on an empty or unparseable URL.
pub fn validate_resource_info(resource: &ResourceInfo) -> Result<(), PaymentError> {
    if resource.url.is_empty() {
        return Err(PaymentError::new(
            ErrorCode::InvalidRequirements,
            "resource URL cannot be empty",
        ));
    }
    Url::parse(&resource.url).map_err(|e| {
        PaymentError::new(
            ErrorCode::InvalidRequirements,
            format!("invalid resource URL: {}", resource.url),
        )
        .with_source(e)
    })?;
    Ok(())
}

/// Validates one payment requirement: amount, network, addresses, scheme, and
/// EIP-3009 domain parameters when present on an EVM network.
///
/// # Errors
///
/// Returns the first failing check's [`PaymentError`].
pub fn validate_payment_requirements(req: &PaymentRequirements) -> Result<(), PaymentError> {
    validate_amount(&req.amount)?;
    let network_type = chain::validate_network(&req.network)?;
    validate_address(&req.pay_to, &req.network)?;

    if req.asset.is_empty() {
        return Err(PaymentError::new(
            ErrorCode::InvalidRequirements,
            "asset address cannot be empty",
        ));
    }
    validate_address(&req.asset, &req.network)?;

    match req.scheme.as_str() {
        "exact" => {}
        "" => {
            return Err(PaymentError::new(
                ErrorCode::InvalidRequirements,
                "scheme cannot be empty",
            ));
        }
        other => {
            return Err(PaymentError::new(
                ErrorCode::UnsupportedScheme,
                format!("unsupported scheme: {other}"),
            ));
        }
    }

    // When the EIP-712 domain parameters are present they must be usable.
    if let (NetworkType::Evm { .. }, Some(extra)) = (&network_type, &req.extra) {
        for key in ["name", "version"] {
            if let Some(value) = extra.get(key).and_then(|v| v.as_str()) {
                if value.is_empty() {
                    return Err(PaymentError::new(
                        ErrorCode::InvalidRequirements,
                        format!("EIP-3009 {key} cannot be empty"),
                    ));
                }
            }
        }
    }

    Ok(())
}

/// Validates a client payment payload: version, accepted requirement fields,
/// and the resource if present.
///
/// # Errors
///
/// Returns [`ErrorCode::UnsupportedVersion`] on a version mismatch, or the
/// failing structural check's error.
pub fn validate_payment_payload(payload: &PaymentPayload) -> Result<(), PaymentError> {
    if payload.x402_version != X402_VERSION {
        return Err(PaymentError::new(
            ErrorCode::UnsupportedVersion,
            format!(
                "unsupported x402 version: {} (expected {X402_VERSION})",
                payload.x402_version
            ),
        ));
    }

    if payload.accepted.scheme.is_empty() {
        return Err(PaymentError::new(
            ErrorCode::InvalidRequirements,
            "accepted scheme cannot be empty",
        ));
    }
    if payload.accepted.network.is_empty() {
        return Err(PaymentError::new(
            ErrorCode::InvalidRequirements,
            "accepted network cannot be empty",
        ));
    }
    chain::validate_network(&payload.accepted.network)?;

    if let Some(resource) = &payload.resource {
        validate_resource_info(resource)?;
    }

    Ok(())
}

/// Validates a complete 402 response body: version, resource, and a non-empty
/// `accepts` list whose elements are each independently valid.
///
/// # Errors
///
/// Returns the first failing check's [`PaymentError`].
pub fn validate_payment_required(pr: &PaymentRequired) -> Result<(), PaymentError> {
    if pr.x402_version != X402_VERSION {
        return Err(PaymentError::new(
            ErrorCode::UnsupportedVersion,
            format!(
                "unsupported x402 version: {} (expected {X402_VERSION})",
                pr.x402_version
            ),
        ));
    }

    if let Some(resource) = &pr.resource {
        validate_resource_info(resource)?;
    }

    if pr.accepts.is_empty() {
        return Err(PaymentError::new(
            ErrorCode::InvalidRequirements,
            "accepts cannot be empty",
        ));
    }

    for (i, req) in pr.accepts.iter().enumerate() {
        validate_payment_requirements(req)
            .map_err(|e| PaymentError::new(e.code(), format!("accepts[{i}]: {e}")))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_evm_requirements() -> PaymentRequirements {
        PaymentRequirements {
            scheme: "exact".into(),
            network: "eip155:84532".into(),
            amount: "10000".into(),
            asset: "0x036CbD53842c5426634e7929541eC2318f3dCF7e".into(),
            pay_to: "0x209693Bc6afc0C5328bA36FaF03C514EF312287C".into(),
            max_timeout_seconds: 300,
            extra: None,
        }
    }

    #[test]
    fn test_validate_amount() {
        assert!(validate_amount("0").is_ok());
        assert!(validate_amount("10000").is_ok());
        assert!(validate_amount("").is_err());
        assert!(validate_amount("-5").is_err());
        assert!(validate_amount("1.5").is_err());
        assert!(validate_amount("abc").is_err());
    }

    #[test]
    fn test_validate_address_per_network() {
        assert!(validate_address(
            "0x036CbD53842c5426634e7929541eC2318f3dCF7e",
            "eip155:84532"
        )
        .is_ok());
        assert!(validate_address("0x036C", "eip155:84532").is_err());
        assert!(validate_address(
            "4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU",
            "solana:EtWTRABZaYq6iMfeYKouRu166VU2xqa1"
        )
        .is_ok());
        // 0/O/I/l are not in the base58 alphabet.
        assert!(validate_address(
            "0OIl000000000000000000000000000000000",
            "solana:EtWTRABZaYq6iMfeYKouRu166VU2xqa1"
        )
        .is_err());
    }

    #[test]
    fn test_validate_requirements_happy() {
        assert!(validate_payment_requirements(&valid_evm_requirements()).is_ok());
    }

    #[test]
    fn test_validate_requirements_scheme() {
        let mut req = valid_evm_requirements();
        req.scheme = String::new();
        assert_eq!(
            validate_payment_requirements(&req).unwrap_err().code(),
            ErrorCode::InvalidRequirements
        );

        req.scheme = "upto".into();
        assert_eq!(
            validate_payment_requirements(&req).unwrap_err().code(),
            ErrorCode::UnsupportedScheme
        );
    }

    #[test]
    fn test_validate_requirements_empty_eip3009_params() {
        let mut req = valid_evm_requirements();
        let mut extra = serde_json::Map::new();
        extra.insert("name".into(), "".into());
        req.extra = Some(extra);
        let err = validate_payment_requirements(&req).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidRequirements);
    }

    #[test]
    fn test_validate_payload_version() {
        let payload = PaymentPayload {
            x402_version: 1,
            resource: None,
            accepted: valid_evm_requirements(),
            payload: x402_proto::v2::ExactPayload::Other(serde_json::json!({})),
            extensions: None,
        };
        assert_eq!(
            validate_payment_payload(&payload).unwrap_err().code(),
            ErrorCode::UnsupportedVersion
        );
    }

    #[test]
    fn test_validate_payment_required() {
        let pr = PaymentRequired {
            x402_version: X402_VERSION,
            error: None,
            resource: Some(ResourceInfo::new("https://api.example.com/data")),
            accepts: vec![valid_evm_requirements()],
            extensions: None,
        };
        assert!(validate_payment_required(&pr).is_ok());

        let empty = PaymentRequired {
            accepts: vec![],
            ..pr.clone()
        };
        assert_eq!(
            validate_payment_required(&empty).unwrap_err().code(),
            ErrorCode::InvalidRequirements
        );

        let bad_element = PaymentRequired {
            accepts: vec![PaymentRequirements {
                amount: "nope".into(),
                ..valid_evm_requirements()
            }],
            ..pr
        };
        assert!(validate_payment_required(&bad_element).is_err());
    }
}
