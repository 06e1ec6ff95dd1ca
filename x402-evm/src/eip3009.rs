//! ERC-3009 `transferWithAuthorization` construction and EIP-712 signing.

use alloy_primitives::{hex, Address, B256, U256};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::{eip712_domain, sol, SolStruct};
use rand::Rng;
use x402::error::{ErrorCode, PaymentError};

sol!(
    /// EIP-712 struct for ERC-3009 `transferWithAuthorization`.
    ///
    /// The facilitator reconstructs this struct from the wire authorization to
    /// verify the signature, so field values must match the authorization
    /// exactly.
    struct TransferWithAuthorization {
        address from;
        address to;
        uint256 value;
        uint256 validAfter;
        uint256 validBefore;
        bytes32 nonce;
    }
);

/// The parameters of one transfer authorization, pre-serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Eip3009Authorization {
    /// The payer's address.
    pub from: Address,
    /// The recipient's address.
    pub to: Address,
    /// Payment amount in atomic units.
    pub value: U256,
    /// Unix seconds after which the authorization is valid.
    pub valid_after: u64,
    /// Unix seconds before which the authorization expires.
    pub valid_before: u64,
    /// Unique 32-byte nonce.
    pub nonce: B256,
}

impl Eip3009Authorization {
    /// Builds an authorization window anchored at `now`: valid from ten
    /// seconds in the past (tolerating facilitator clock skew) until
    /// `timeout_seconds` in the future, with a fresh random nonce.
    #[must_use]
    pub fn new(from: Address, to: Address, value: U256, now: u64, timeout_seconds: u64) -> Self {
        let nonce: [u8; 32] = rand::rng().random();
        Self {
            from,
            to,
            value,
            valid_after: now.saturating_sub(10),
            valid_before: now + timeout_seconds,
            nonce: B256::from(nonce),
        }
    }
}

/// Hashes and signs an authorization under the EIP-712 domain
/// `{name, version, chain_id, verifying_contract = token}`.
///
/// Returns the 65-byte signature as a `0x`-prefixed hex string with the
/// recovery byte normalized to 27/28.
///
/// # Errors
///
/// Returns [`ErrorCode::SigningFailed`] if the key refuses to sign.
pub(crate) fn sign_authorization(
    signer: &PrivateKeySigner,
    token: Address,
    chain_id: u64,
    auth: &Eip3009Authorization,
    name: &str,
    version: &str,
) -> Result<String, PaymentError> {
    let domain = eip712_domain! {
        name: name.to_owned(),
        version: version.to_owned(),
        chain_id: chain_id,
        verifying_contract: token,
    };

    let message = TransferWithAuthorization {
        from: auth.from,
        to: auth.to,
        value: auth.value,
        validAfter: U256::from(auth.valid_after),
        validBefore: U256::from(auth.valid_before),
        nonce: auth.nonce,
    };

    let digest = message.eip712_signing_hash(&domain);
    let signature = signer.sign_hash_sync(&digest).map_err(|e| {
        PaymentError::new(ErrorCode::SigningFailed, "EIP-712 signing failed").with_source(e)
    })?;

    let mut bytes = [0u8; 65];
    bytes[..32].copy_from_slice(&signature.r().to_be_bytes::<32>());
    bytes[32..64].copy_from_slice(&signature.s().to_be_bytes::<32>());
    bytes[64] = 27 + u8::from(signature.v());

    Ok(format!("0x{}", hex::encode(bytes)))
}
