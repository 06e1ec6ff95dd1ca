//! The EVM signer.

use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use alloy_primitives::{hex, Address, U256};
use alloy_signer_local::PrivateKeySigner;
use x402::chain::evm_chain_id;
use x402::error::{ErrorCode, PaymentError};
use x402::proto::v2::{EvmAuthorization, EvmPayload, ExactPayload, PaymentPayload, PaymentRequirements};
use x402::proto::X402_VERSION;
use x402::signer::{BoxFuture, Signer, TokenConfig};

use crate::eip3009::{sign_authorization, Eip3009Authorization};

/// Signs "exact" scheme payments on a single EVM chain.
///
/// Safe for concurrent [`Signer::sign`] calls: nonce generation is
/// cryptographically random per call and nothing else is mutable.
pub struct EvmSigner {
    signer: PrivateKeySigner,
    address: Address,
    network: String,
    chain_id: u64,
    tokens: Vec<TokenConfig>,
    priority: i32,
    max_amount: Option<u128>,
}

impl std::fmt::Debug for EvmSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvmSigner")
            .field("address", &self.address)
            .field("network", &self.network)
            .field("tokens", &self.tokens.len())
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

impl EvmSigner {
    /// Creates a signer from a hex-encoded private key (with or without the
    /// `0x` prefix).
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::InvalidKey`] on bad key material and
    /// [`ErrorCode::InvalidNetwork`] if `network` is not an `eip155:*`
    /// identifier.
    pub fn new(
        network: &str,
        private_key_hex: &str,
        tokens: Vec<TokenConfig>,
    ) -> Result<Self, PaymentError> {
        let key = private_key_hex.trim_start_matches("0x");
        let signer = PrivateKeySigner::from_str(key)
            .map_err(|e| PaymentError::new(ErrorCode::InvalidKey, "invalid private key").with_source(e))?;
        Self::from_signer(network, signer, tokens)
    }

    /// Creates a signer from an existing [`PrivateKeySigner`].
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::InvalidNetwork`] if `network` is not an
    /// `eip155:*` identifier.
    pub fn from_signer(
        network: &str,
        signer: PrivateKeySigner,
        tokens: Vec<TokenConfig>,
    ) -> Result<Self, PaymentError> {
        let chain_id = evm_chain_id(network)?;
        let address = signer.address();
        Ok(Self {
            signer,
            address,
            network: network.to_owned(),
            chain_id,
            tokens,
            priority: 0,
            max_amount: None,
        })
    }

    /// Sets the signer priority. Lower numbers are preferred.
    #[must_use]
    pub const fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the per-call spending limit in atomic units.
    #[must_use]
    pub const fn with_max_amount(mut self, max: u128) -> Self {
        self.max_amount = Some(max);
        self
    }

    /// Returns the signer's address.
    #[must_use]
    pub const fn address(&self) -> Address {
        self.address
    }

    fn token_address(&self, asset: &str) -> Result<Address, PaymentError> {
        let token = self
            .tokens
            .iter()
            .find(|t| t.address.eq_ignore_ascii_case(asset))
            .ok_or_else(|| {
                PaymentError::new(ErrorCode::InvalidToken, format!("token not configured: {asset}"))
            })?;
        Address::from_str(&token.address).map_err(|e| {
            PaymentError::new(
                ErrorCode::InvalidToken,
                format!("invalid token address: {}", token.address),
            )
            .with_source(e)
        })
    }

    fn sign_inner(&self, req: &PaymentRequirements) -> Result<PaymentPayload, PaymentError> {
        if !self.can_sign(req) {
            return Err(PaymentError::new(
                ErrorCode::NoValidSigner,
                "signer cannot satisfy requirements",
            ));
        }

        let amount: u128 = req.amount.parse().map_err(|_| {
            PaymentError::new(ErrorCode::InvalidAmount, format!("invalid amount: {}", req.amount))
        })?;
        if let Some(max) = self.max_amount {
            if amount > max {
                return Err(PaymentError::new(
                    ErrorCode::AmountExceeded,
                    "payment amount exceeds per-call limit",
                ));
            }
        }

        let token_address = self.token_address(&req.asset)?;
        let (name, version) = extract_domain_params(req)?;

        let pay_to = Address::from_str(&req.pay_to).map_err(|e| {
            PaymentError::new(
                ErrorCode::InvalidRequirements,
                format!("invalid payTo address: {}", req.pay_to),
            )
            .with_source(e)
        })?;

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| {
                PaymentError::new(ErrorCode::SigningFailed, "system clock before Unix epoch")
                    .with_source(e)
            })?
            .as_secs();

        let auth = Eip3009Authorization::new(
            self.address,
            pay_to,
            U256::from(amount),
            now,
            req.max_timeout_seconds,
        );

        let signature =
            sign_authorization(&self.signer, token_address, self.chain_id, &auth, name, version)?;

        Ok(PaymentPayload {
            x402_version: X402_VERSION,
            resource: None,
            accepted: req.clone(),
            payload: ExactPayload::Evm(EvmPayload {
                signature,
                authorization: EvmAuthorization {
                    from: auth.from.to_string(),
                    to: auth.to.to_string(),
                    value: auth.value.to_string(),
                    valid_after: auth.valid_after.to_string(),
                    valid_before: auth.valid_before.to_string(),
                    nonce: format!("0x{}", hex::encode(auth.nonce)),
                },
            }),
            extensions: None,
        })
    }
}

/// Pulls the EIP-712 domain `name` and `version` out of `extra`.
fn extract_domain_params(req: &PaymentRequirements) -> Result<(&str, &str), PaymentError> {
    let extra = req.extra.as_ref().ok_or_else(|| {
        PaymentError::new(
            ErrorCode::InvalidRequirements,
            "missing EIP-3009 parameters: extra field is absent",
        )
    })?;

    let name = extra
        .get("name")
        .ok_or_else(|| {
            PaymentError::new(ErrorCode::InvalidRequirements, "missing EIP-3009 parameter: name")
        })?
        .as_str()
        .ok_or_else(|| {
            PaymentError::new(
                ErrorCode::InvalidRequirements,
                "invalid EIP-3009 parameter: name is not a string",
            )
        })?;

    let version = extra
        .get("version")
        .ok_or_else(|| {
            PaymentError::new(ErrorCode::InvalidRequirements, "missing EIP-3009 parameter: version")
        })?
        .as_str()
        .ok_or_else(|| {
            PaymentError::new(
                ErrorCode::InvalidRequirements,
                "invalid EIP-3009 parameter: version is not a string",
            )
        })?;

    Ok((name, version))
}

impl Signer for EvmSigner {
    fn network(&self) -> &str {
        &self.network
    }

    fn scheme(&self) -> &str {
        "exact"
    }

    fn can_sign(&self, requirements: &PaymentRequirements) -> bool {
        requirements.scheme == "exact"
            && requirements.network == self.network
            && self
                .tokens
                .iter()
                .any(|t| t.address.eq_ignore_ascii_case(&requirements.asset))
    }

    fn sign<'a>(
        &'a self,
        requirements: &'a PaymentRequirements,
    ) -> BoxFuture<'a, Result<PaymentPayload, PaymentError>> {
        Box::pin(async move { self.sign_inner(requirements) })
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn tokens(&self) -> &[TokenConfig] {
        &self.tokens
    }

    fn max_amount(&self) -> Option<u128> {
        self.max_amount
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use x402::networks::{usdc_token_config, BASE_SEPOLIA};

    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const TEST_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    fn test_signer() -> EvmSigner {
        EvmSigner::new(
            "eip155:84532",
            TEST_KEY,
            vec![usdc_token_config(&BASE_SEPOLIA, 1)],
        )
        .unwrap()
    }

    fn requirements() -> PaymentRequirements {
        let mut extra = serde_json::Map::new();
        extra.insert("name".into(), "USDC".into());
        extra.insert("version".into(), "2".into());
        PaymentRequirements {
            scheme: "exact".into(),
            network: "eip155:84532".into(),
            amount: "10000".into(),
            asset: BASE_SEPOLIA.usdc_address.to_owned(),
            pay_to: "0x209693Bc6afc0C5328bA36FaF03C514EF312287C".into(),
            max_timeout_seconds: 300,
            extra: Some(extra),
        }
    }

    #[test]
    fn test_address_derived_from_key() {
        assert_eq!(test_signer().address().to_string(), TEST_ADDRESS);
    }

    #[test]
    fn test_rejects_bad_key_and_network() {
        let tokens = vec![usdc_token_config(&BASE_SEPOLIA, 1)];
        let err = EvmSigner::new("eip155:84532", "zz", tokens.clone()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidKey);

        let err = EvmSigner::new("solana:EtWTRABZaYq6iMfeYKouRu166VU2xqa1", TEST_KEY, tokens)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidNetwork);
    }

    #[test]
    fn test_can_sign_case_insensitive_asset() {
        let signer = test_signer();
        let mut req = requirements();
        assert!(signer.can_sign(&req));

        req.asset = req.asset.to_lowercase();
        assert!(signer.can_sign(&req));

        req.network = "eip155:8453".into();
        assert!(!signer.can_sign(&req));
    }

    #[tokio::test]
    async fn test_sign_produces_bound_payload() {
        let signer = test_signer();
        let req = requirements();
        let payload = signer.sign(&req).await.unwrap();

        assert_eq!(payload.x402_version, X402_VERSION);
        assert_eq!(payload.accepted, req);

        let evm = payload.payload.as_evm().unwrap();
        assert_eq!(evm.authorization.from, TEST_ADDRESS);
        assert_eq!(evm.authorization.to, req.pay_to);
        assert_eq!(evm.authorization.value, "10000");
        assert_eq!(evm.authorization.nonce.len(), 2 + 64);
        assert_eq!(evm.signature.len(), 2 + 130);

        let after: u64 = evm.authorization.valid_after.parse().unwrap();
        let before: u64 = evm.authorization.valid_before.parse().unwrap();
        assert_eq!(before - after, 300 + 10);
    }

    #[tokio::test]
    async fn test_sign_missing_domain_params() {
        let signer = test_signer();
        let mut req = requirements();
        req.extra.as_mut().unwrap().remove("name");
        let err = signer.sign(&req).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidRequirements);
        assert!(err.to_string().contains("name"));

        req.extra = None;
        let err = signer.sign(&req).await.unwrap_err();
        assert!(err.to_string().contains("extra"));
    }

    #[tokio::test]
    async fn test_sign_amount_errors() {
        let signer = test_signer().with_max_amount(5_000);
        let mut req = requirements();
        let err = signer.sign(&req).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::AmountExceeded);

        req.amount = "not-a-number".into();
        let err = signer.sign(&req).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidAmount);
    }

    #[tokio::test]
    async fn test_nonces_are_unique_per_call() {
        let signer = test_signer();
        let req = requirements();
        let a = signer.sign(&req).await.unwrap();
        let b = signer.sign(&req).await.unwrap();
        let nonce_a = &a.payload.as_evm().unwrap().authorization.nonce;
        let nonce_b = &b.payload.as_evm().unwrap().authorization.nonce;
        assert_ne!(nonce_a, nonce_b);
    }
}
