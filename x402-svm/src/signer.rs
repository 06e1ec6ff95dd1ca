//! The Solana signer.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_keypair::Keypair;
use solana_message::Message;
use solana_pubkey::Pubkey;
use solana_signer::Signer as SolanaSigner;
use solana_transaction::Transaction;
use x402::chain::{validate_network, NetworkType};
use x402::config::TimeoutConfig;
use x402::error::{ErrorCode, PaymentError};
use x402::proto::v2::{ExactPayload, PaymentPayload, PaymentRequirements, SvmPayload};
use x402::proto::X402_VERSION;
use x402::signer::{BoxFuture, Signer, TokenConfig};

use crate::instructions::{
    create_idempotent_ata_instruction, derive_associated_token_address, DEFAULT_COMPUTE_UNITS,
    DEFAULT_COMPUTE_UNIT_PRICE,
};
use crate::rpc::{rpc_url, BlockhashSource};

/// Signs "exact" scheme payments on a Solana cluster.
///
/// Safe for concurrent [`Signer::sign`] calls: every call fetches its own
/// blockhash and the key material is immutable.
pub struct SvmSigner {
    keypair: Keypair,
    pubkey: Pubkey,
    network: String,
    tokens: Vec<TokenConfig>,
    priority: i32,
    max_amount: Option<u128>,
    rpc: Option<Arc<dyn BlockhashSource>>,
    verify_timeout: Duration,
}

impl std::fmt::Debug for SvmSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SvmSigner")
            .field("pubkey", &self.pubkey)
            .field("network", &self.network)
            .field("tokens", &self.tokens.len())
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

impl SvmSigner {
    /// Creates a signer from a base58-encoded 64-byte keypair.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::InvalidKey`] on bad key material,
    /// [`ErrorCode::InvalidNetwork`] for non-Solana networks, and
    /// [`ErrorCode::InvalidToken`] for an empty token list.
    pub fn new(
        network: &str,
        private_key_base58: &str,
        tokens: Vec<TokenConfig>,
    ) -> Result<Self, PaymentError> {
        let bytes = bs58::decode(private_key_base58.trim())
            .into_vec()
            .map_err(|e| {
                PaymentError::new(ErrorCode::InvalidKey, "invalid base58 private key").with_source(e)
            })?;
        Self::from_bytes(network, &bytes, tokens)
    }

    /// Creates a signer from a raw 64-byte keypair (the Solana keygen file
    /// format, decoded).
    ///
    /// # Errors
    ///
    /// See [`SvmSigner::new`].
    pub fn from_bytes(
        network: &str,
        key_bytes: &[u8],
        tokens: Vec<TokenConfig>,
    ) -> Result<Self, PaymentError> {
        if key_bytes.len() != 64 {
            return Err(PaymentError::new(
                ErrorCode::InvalidKey,
                format!("invalid key length: expected 64 bytes, got {}", key_bytes.len()),
            ));
        }
        let keypair = Keypair::try_from(key_bytes).map_err(|e| {
            PaymentError::new(ErrorCode::InvalidKey, "invalid ed25519 keypair").with_source(e)
        })?;
        Self::from_keypair(network, keypair, tokens)
    }

    /// Creates a signer from an existing keypair.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::InvalidNetwork`] for non-Solana networks and
    /// [`ErrorCode::InvalidToken`] for an empty token list.
    pub fn from_keypair(
        network: &str,
        keypair: Keypair,
        tokens: Vec<TokenConfig>,
    ) -> Result<Self, PaymentError> {
        match validate_network(network)? {
            NetworkType::Svm { .. } => {}
            NetworkType::Evm { .. } => {
                return Err(PaymentError::new(
                    ErrorCode::InvalidNetwork,
                    format!("expected a Solana network, got {network}"),
                ));
            }
        }
        if tokens.is_empty() {
            return Err(PaymentError::new(
                ErrorCode::InvalidToken,
                "no tokens configured",
            ));
        }

        let pubkey = keypair.pubkey();
        Ok(Self {
            keypair,
            pubkey,
            network: network.to_owned(),
            tokens,
            priority: 0,
            max_amount: None,
            rpc: None,
            verify_timeout: TimeoutConfig::default().verify,
        })
    }

    /// Sets the signer priority. Lower numbers are preferred.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the per-call spending limit in atomic units.
    #[must_use]
    pub fn with_max_amount(mut self, max: u128) -> Self {
        self.max_amount = Some(max);
        self
    }

    /// Replaces the blockhash source (e.g., a custom RPC endpoint or a test
    /// double). Without this, a client for the network's canonical endpoint
    /// is created per sign call.
    #[must_use]
    pub fn with_rpc(mut self, rpc: Arc<dyn BlockhashSource>) -> Self {
        self.rpc = Some(rpc);
        self
    }

    /// Sets the timeout applied to the blockhash fetch.
    #[must_use]
    pub fn with_verify_timeout(mut self, timeout: Duration) -> Self {
        self.verify_timeout = timeout;
        self
    }

    /// Returns the signer's public key.
    #[must_use]
    pub const fn pubkey(&self) -> Pubkey {
        self.pubkey
    }

    fn token_decimals(&self, asset: &str) -> Result<u8, PaymentError> {
        self.tokens
            .iter()
            .find(|t| t.address == asset)
            .map(|t| t.decimals)
            .ok_or_else(|| {
                PaymentError::new(ErrorCode::InvalidToken, format!("token not configured: {asset}"))
            })
    }

    async fn sign_inner(&self, req: &PaymentRequirements) -> Result<PaymentPayload, PaymentError> {
        if !self.can_sign(req) {
            return Err(PaymentError::new(
                ErrorCode::NoValidSigner,
                "signer cannot satisfy requirements",
            ));
        }

        let amount: u128 = req.amount.parse().map_err(|_| {
            PaymentError::new(ErrorCode::InvalidAmount, format!("invalid amount: {}", req.amount))
        })?;
        if amount == 0 {
            return Err(PaymentError::new(
                ErrorCode::InvalidAmount,
                "amount must be positive for SPL transfers",
            ));
        }
        if let Some(max) = self.max_amount {
            if amount > max {
                return Err(PaymentError::new(
                    ErrorCode::AmountExceeded,
                    "payment amount exceeds per-call limit",
                ));
            }
        }
        let amount: u64 = u64::try_from(amount).map_err(|_| {
            PaymentError::new(ErrorCode::AmountExceeded, "amount exceeds u64 range")
        })?;

        let mint = Pubkey::from_str(&req.asset).map_err(|e| {
            PaymentError::new(
                ErrorCode::InvalidRequirements,
                format!("invalid mint address: {}", req.asset),
            )
            .with_source(e)
        })?;
        let recipient = Pubkey::from_str(&req.pay_to).map_err(|e| {
            PaymentError::new(
                ErrorCode::InvalidRequirements,
                format!("invalid recipient address: {}", req.pay_to),
            )
            .with_source(e)
        })?;
        let fee_payer = extract_fee_payer(req)?;
        let decimals = self.token_decimals(&req.asset)?;

        let rpc: Arc<dyn BlockhashSource> = match &self.rpc {
            Some(rpc) => Arc::clone(rpc),
            None => Arc::new(RpcClient::new(rpc_url(&self.network)?.to_owned())),
        };
        let blockhash = tokio::time::timeout(self.verify_timeout, rpc.latest_blockhash())
            .await
            .map_err(|_| {
                PaymentError::new(ErrorCode::SigningFailed, "timed out fetching recent blockhash")
            })??;

        let source_ata = derive_associated_token_address(&self.pubkey, &mint);
        let destination_ata = derive_associated_token_address(&recipient, &mint);

        let transfer = spl_token::instruction::transfer_checked(
            &spl_token::id(),
            &source_ata,
            &mint,
            &destination_ata,
            &self.pubkey,
            &[],
            amount,
            decimals,
        )
        .map_err(|e| {
            PaymentError::new(ErrorCode::SigningFailed, "failed to build transfer instruction")
                .with_source(e)
        })?;

        let instructions = [
            solana_compute_budget_interface::ComputeBudgetInstruction::set_compute_unit_limit(
                DEFAULT_COMPUTE_UNITS,
            ),
            solana_compute_budget_interface::ComputeBudgetInstruction::set_compute_unit_price(
                DEFAULT_COMPUTE_UNIT_PRICE,
            ),
            create_idempotent_ata_instruction(&fee_payer, &recipient, &mint),
            transfer,
        ];

        let message = Message::new_with_blockhash(&instructions, Some(&fee_payer), &blockhash);
        let mut tx = Transaction::new_unsigned(message);
        tx.try_partial_sign(&[&self.keypair], blockhash)
            .map_err(|e| {
                PaymentError::new(ErrorCode::SigningFailed, "failed to sign transaction")
                    .with_source(e)
            })?;

        let bytes = bincode::serialize(&tx).map_err(|e| {
            PaymentError::new(ErrorCode::SigningFailed, "failed to serialize transaction")
                .with_source(e)
        })?;

        Ok(PaymentPayload {
            x402_version: X402_VERSION,
            resource: None,
            accepted: req.clone(),
            payload: ExactPayload::Svm(SvmPayload {
                transaction: BASE64.encode(bytes),
            }),
            extensions: None,
        })
    }
}

/// Pulls the required `feePayer` out of `extra`.
fn extract_fee_payer(req: &PaymentRequirements) -> Result<Pubkey, PaymentError> {
    let extra = req.extra.as_ref().ok_or_else(|| {
        PaymentError::new(
            ErrorCode::InvalidRequirements,
            "missing extra field in requirements",
        )
    })?;
    let fee_payer = extra.get("feePayer").and_then(|v| v.as_str()).ok_or_else(|| {
        PaymentError::new(
            ErrorCode::InvalidRequirements,
            "missing required parameter: feePayer",
        )
    })?;
    Pubkey::from_str(fee_payer).map_err(|e| {
        PaymentError::new(
            ErrorCode::InvalidRequirements,
            format!("invalid feePayer address: {fee_payer}"),
        )
        .with_source(e)
    })
}

impl Signer for SvmSigner {
    fn network(&self) -> &str {
        &self.network
    }

    fn scheme(&self) -> &str {
        "exact"
    }

    fn can_sign(&self, requirements: &PaymentRequirements) -> bool {
        // Asset matching is case-sensitive: base58 is.
        requirements.scheme == "exact"
            && requirements.network == self.network
            && self.tokens.iter().any(|t| t.address == requirements.asset)
    }

    fn sign<'a>(
        &'a self,
        requirements: &'a PaymentRequirements,
    ) -> BoxFuture<'a, Result<PaymentPayload, PaymentError>> {
        Box::pin(self.sign_inner(requirements))
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
    use crate::instructions::ATA_PROGRAM_ID;
    use solana_hash::Hash;
    use solana_signature::Signature;
    use x402::networks::{usdc_token_config, NETWORK_SOLANA_DEVNET, SOLANA_DEVNET};

    struct FixedBlockhash(Hash);

    impl BlockhashSource for FixedBlockhash {
        fn latest_blockhash(&self) -> BoxFuture<'_, Result<Hash, PaymentError>> {
            let hash = self.0;
            Box::pin(async move { Ok(hash) })
        }
    }

    fn test_signer() -> SvmSigner {
        SvmSigner::from_keypair(
            NETWORK_SOLANA_DEVNET,
            Keypair::new(),
            vec![usdc_token_config(&SOLANA_DEVNET, 1)],
        )
        .unwrap()
        .with_rpc(Arc::new(FixedBlockhash(Hash::new_from_array([9u8; 32]))))
    }

    fn requirements(fee_payer: &Pubkey, recipient: &Pubkey) -> PaymentRequirements {
        let mut extra = serde_json::Map::new();
        extra.insert("feePayer".into(), fee_payer.to_string().into());
        PaymentRequirements {
            scheme: "exact".into(),
            network: NETWORK_SOLANA_DEVNET.into(),
            amount: "10000".into(),
            asset: SOLANA_DEVNET.usdc_address.to_owned(),
            pay_to: recipient.to_string(),
            max_timeout_seconds: 60,
            extra: Some(extra),
        }
    }

    fn decode_transaction(payload: &PaymentPayload) -> Transaction {
        let b64 = &payload.payload.as_svm().unwrap().transaction;
        let bytes = BASE64.decode(b64).unwrap();
        bincode::deserialize(&bytes).unwrap()
    }

    #[test]
    fn test_constructor_validation() {
        let tokens = vec![usdc_token_config(&SOLANA_DEVNET, 1)];
        let err =
            SvmSigner::from_keypair("eip155:1", Keypair::new(), tokens.clone()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidNetwork);

        let err =
            SvmSigner::from_keypair(NETWORK_SOLANA_DEVNET, Keypair::new(), vec![]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidToken);

        let err = SvmSigner::from_bytes(NETWORK_SOLANA_DEVNET, &[1u8; 12], tokens).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidKey);
    }

    #[test]
    fn test_can_sign_is_case_sensitive() {
        let signer = test_signer();
        let fee_payer = Pubkey::new_unique();
        let recipient = Pubkey::new_unique();
        let mut req = requirements(&fee_payer, &recipient);
        assert!(signer.can_sign(&req));

        req.asset = req.asset.to_lowercase();
        assert!(!signer.can_sign(&req));
    }

    #[tokio::test]
    async fn test_transaction_shape() {
        let signer = test_signer();
        let fee_payer = Pubkey::new_unique();
        let recipient = Pubkey::new_unique();
        let req = requirements(&fee_payer, &recipient);

        let payload = signer.sign(&req).await.unwrap();
        assert_eq!(payload.accepted, req);
        let tx = decode_transaction(&payload);

        // Fee payer from extra, payer signature filled, fee-payer slot empty.
        assert_eq!(tx.message.account_keys[0], fee_payer);
        assert_eq!(tx.message.header.num_required_signatures, 2);
        assert_eq!(tx.signatures.len(), 2);
        assert_eq!(tx.signatures[0], Signature::default());
        assert_ne!(tx.signatures[1], Signature::default());

        // Exactly four instructions in the documented order.
        assert_eq!(tx.message.instructions.len(), 4);
        let program = |i: usize| {
            tx.message.account_keys[tx.message.instructions[i].program_id_index as usize]
        };

        let cu_limit = &tx.message.instructions[0];
        assert_eq!(cu_limit.data[0], 2);
        assert_eq!(
            u32::from_le_bytes(cu_limit.data[1..5].try_into().unwrap()),
            DEFAULT_COMPUTE_UNITS
        );

        let cu_price = &tx.message.instructions[1];
        assert_eq!(cu_price.data[0], 3);
        assert_eq!(
            u64::from_le_bytes(cu_price.data[1..9].try_into().unwrap()),
            DEFAULT_COMPUTE_UNIT_PRICE
        );

        assert_eq!(program(2), ATA_PROGRAM_ID);
        assert_eq!(tx.message.instructions[2].data, vec![1]);

        assert_eq!(program(3), spl_token::id());
        let transfer = &tx.message.instructions[3];
        assert_eq!(transfer.data[0], 12); // TransferChecked
        assert_eq!(
            u64::from_le_bytes(transfer.data[1..9].try_into().unwrap()),
            10_000
        );
        assert_eq!(*transfer.data.last().unwrap(), 6); // configured decimals
    }

    #[tokio::test]
    async fn test_amount_bounds() {
        let signer = test_signer();
        let fee_payer = Pubkey::new_unique();
        let recipient = Pubkey::new_unique();
        let mut req = requirements(&fee_payer, &recipient);

        req.amount = "0".into();
        assert_eq!(
            signer.sign(&req).await.unwrap_err().code(),
            ErrorCode::InvalidAmount
        );

        // One past u64::MAX.
        req.amount = "18446744073709551616".into();
        assert_eq!(
            signer.sign(&req).await.unwrap_err().code(),
            ErrorCode::AmountExceeded
        );
    }

    #[tokio::test]
    async fn test_missing_fee_payer() {
        let signer = test_signer();
        let fee_payer = Pubkey::new_unique();
        let recipient = Pubkey::new_unique();
        let mut req = requirements(&fee_payer, &recipient);
        req.extra.as_mut().unwrap().remove("feePayer");

        let err = signer.sign(&req).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidRequirements);
        assert!(err.to_string().contains("feePayer"));
    }
}
