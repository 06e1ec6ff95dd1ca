//! Recent-blockhash sources.
//!
//! The signer needs one RPC call per payment: a recent blockhash at
//! `finalized` commitment. The source is injectable so tests and embedders
//! can avoid the network entirely.

use solana_client::nonblocking::rpc_client::RpcClient;
use solana_commitment_config::CommitmentConfig;
use solana_hash::Hash;
use x402::error::{ErrorCode, PaymentError};
use x402::networks::{NETWORK_SOLANA_DEVNET, NETWORK_SOLANA_MAINNET};
use x402::signer::BoxFuture;

/// Supplies a recent blockhash for transaction construction.
pub trait BlockhashSource: Send + Sync {
    /// Returns a recent blockhash at `finalized` commitment.
    fn latest_blockhash(&self) -> BoxFuture<'_, Result<Hash, PaymentError>>;
}

impl BlockhashSource for RpcClient {
    fn latest_blockhash(&self) -> BoxFuture<'_, Result<Hash, PaymentError>> {
        Box::pin(async move {
            let (hash, _) = self
                .get_latest_blockhash_with_commitment(CommitmentConfig::finalized())
                .await
                .map_err(|e| {
                    PaymentError::new(ErrorCode::SigningFailed, "failed to get blockhash")
                        .with_source(e)
                })?;
            Ok(hash)
        })
    }
}

/// Returns the canonical RPC URL for a known Solana network.
///
/// # Errors
///
/// Returns [`ErrorCode::InvalidNetwork`] for networks without a canonical
/// endpoint; supply a custom [`BlockhashSource`] for those.
pub fn rpc_url(network: &str) -> Result<&'static str, PaymentError> {
    match network {
        NETWORK_SOLANA_MAINNET => Ok("https://api.mainnet-beta.solana.com"),
        NETWORK_SOLANA_DEVNET => Ok("https://api.devnet.solana.com"),
        other => Err(PaymentError::new(
            ErrorCode::InvalidNetwork,
            format!("no canonical RPC endpoint for network: {other}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_url_known_networks() {
        assert!(rpc_url(NETWORK_SOLANA_MAINNET).unwrap().contains("mainnet"));
        assert!(rpc_url(NETWORK_SOLANA_DEVNET).unwrap().contains("devnet"));
        assert!(rpc_url("solana:11111111111111111111111111111111").is_err());
    }
}
