//! Deterministic payment selection and signing.
//!
//! Given the configured signers and the server's accepted payment options,
//! [`select_and_sign`] chooses exactly one (signer, requirement) pair and asks
//! the signer to produce a payload. The ordering is total: signer priority,
//! then token priority, then configuration order, then requirement order —
//! so the same inputs always select the same pair.

use std::sync::Arc;

use x402_proto::v2::{PaymentPayload, PaymentRequirements};

use crate::error::{ErrorCode, PaymentError};
use crate::signer::Signer;

/// Selects the best (signer, requirement) pair and creates a signed payment.
///
/// # Errors
///
/// - [`ErrorCode::NoValidSigner`] when no signers are configured or none can
///   satisfy any requirement (the error details list the `network:asset`
///   options that were offered).
/// - [`ErrorCode::InvalidRequirements`] when no requirements are provided or
///   none carries a parseable non-negative integer amount.
/// - [`ErrorCode::SigningFailed`] when the chosen signer fails to sign.
pub async fn select_and_sign(
    signers: &[Arc<dyn Signer>],
    requirements: &[PaymentRequirements],
) -> Result<PaymentPayload, PaymentError> {
    if signers.is_empty() {
        return Err(PaymentError::new(
            ErrorCode::NoValidSigner,
            "no signers configured",
        ));
    }
    if requirements.is_empty() {
        return Err(PaymentError::new(
            ErrorCode::InvalidRequirements,
            "no payment requirements provided",
        ));
    }

    struct Candidate<'a> {
        requirement: &'a PaymentRequirements,
        signer: &'a Arc<dyn Signer>,
        signer_priority: i32,
        token_priority: i32,
        signer_index: usize,
        requirement_index: usize,
    }

    let mut candidates: Vec<Candidate<'_>> = Vec::new();
    let mut has_valid_requirement = false;

    for (requirement_index, requirement) in requirements.iter().enumerate() {
        let Ok(required_amount) = requirement.amount.parse::<u128>() else {
            continue;
        };
        has_valid_requirement = true;

        for (signer_index, signer) in signers.iter().enumerate() {
            if !signer.can_sign(requirement) {
                continue;
            }
            if let Some(max) = signer.max_amount() {
                if required_amount > max {
                    continue;
                }
            }

            // The token priority breaks ties between otherwise equal signers.
            let token_priority = signer
                .tokens()
                .iter()
                .find(|t| t.address.eq_ignore_ascii_case(&requirement.asset))
                .map_or(0, |t| t.priority);

            candidates.push(Candidate {
                requirement,
                signer,
                signer_priority: signer.priority(),
                token_priority,
                signer_index,
                requirement_index,
            });
        }
    }

    if !has_valid_requirement {
        return Err(PaymentError::new(
            ErrorCode::InvalidRequirements,
            "invalid amount in requirements",
        ));
    }

    if candidates.is_empty() {
        let options: Vec<String> = requirements
            .iter()
            .map(|r| format!("{}:{}", r.network, r.asset))
            .collect();
        return Err(PaymentError::new(
            ErrorCode::NoValidSigner,
            "no signer can satisfy any payment requirement",
        )
        .with_detail("options", options.join(", ")));
    }

    candidates.sort_by_key(|c| {
        (
            c.signer_priority,
            c.token_priority,
            c.signer_index,
            c.requirement_index,
        )
    });
    let selected = &candidates[0];

    selected
        .signer
        .sign(selected.requirement)
        .await
        .map_err(|e| {
            PaymentError::new(ErrorCode::SigningFailed, "failed to sign payment").with_source(e)
        })
}

/// Finds the requirement that matches the given payment on scheme and network.
///
/// The first match wins; amount, asset, and recipient are deliberately not
/// compared — the facilitator checks those. Used by both the server (to
/// correlate an incoming payment with the issuing offer) and the client.
///
/// # Errors
///
/// Returns [`ErrorCode::UnsupportedScheme`] when no requirement matches,
/// with the payment's network and scheme in the error details.
pub fn find_matching_requirement<'a>(
    payment: &PaymentPayload,
    requirements: &'a [PaymentRequirements],
) -> Result<&'a PaymentRequirements, PaymentError> {
    requirements
        .iter()
        .find(|r| r.network == payment.accepted.network && r.scheme == payment.accepted.scheme)
        .ok_or_else(|| {
            PaymentError::new(
                ErrorCode::UnsupportedScheme,
                "no matching requirement for network and scheme",
            )
            .with_detail("network", payment.accepted.network.clone())
            .with_detail("scheme", payment.accepted.scheme.clone())
        })
}
