//! Static registry of known blockchain networks.
//!
//! Maps CAIP-2 identifiers to their default USDC deployment and, for EVM
//! chains, the EIP-712 domain parameters used in EIP-3009 signing. A registry
//! miss is not fatal at this level — callers may gate unknown networks with a
//! locally constructed config — but helpers here require an explicit entry.

use crate::error::{ErrorCode, PaymentError};
use crate::signer::TokenConfig;

// CAIP-2 identifiers for the known networks.

/// Base mainnet.
pub const NETWORK_BASE: &str = "eip155:8453";
/// Polygon PoS mainnet.
pub const NETWORK_POLYGON: &str = "eip155:137";
/// Avalanche C-Chain mainnet.
pub const NETWORK_AVALANCHE: &str = "eip155:43114";
/// Ethereum mainnet.
pub const NETWORK_ETHEREUM: &str = "eip155:1";
/// Base Sepolia testnet.
pub const NETWORK_BASE_SEPOLIA: &str = "eip155:84532";
/// Polygon Amoy testnet.
pub const NETWORK_POLYGON_AMOY: &str = "eip155:80002";
/// Avalanche Fuji testnet.
pub const NETWORK_AVALANCHE_FUJI: &str = "eip155:43113";
/// Ethereum Sepolia testnet.
pub const NETWORK_SEPOLIA: &str = "eip155:11155111";
/// Solana mainnet (genesis hash reference per CAIP-2).
pub const NETWORK_SOLANA_MAINNET: &str = "solana:5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp";
/// Solana devnet.
pub const NETWORK_SOLANA_DEVNET: &str = "solana:EtWTRABZaYq6iMfeYKouRu166VU2xqa1";

/// Configuration for a known blockchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainConfig {
    /// CAIP-2 network identifier.
    pub network: &'static str,
    /// Official Circle USDC contract or mint address.
    pub usdc_address: &'static str,
    /// USDC decimal places (always 6).
    pub decimals: u8,
    /// EIP-3009 domain parameter `name` (empty for non-EVM chains).
    pub eip3009_name: &'static str,
    /// EIP-3009 domain parameter `version` (empty for non-EVM chains).
    pub eip3009_version: &'static str,
}

/// Base mainnet configuration.
pub const BASE_MAINNET: ChainConfig = ChainConfig {
    network: NETWORK_BASE,
    usdc_address: "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913",
    decimals: 6,
    eip3009_name: "USD Coin",
    eip3009_version: "2",
};

/// Polygon PoS mainnet configuration.
pub const POLYGON_MAINNET: ChainConfig = ChainConfig {
    network: NETWORK_POLYGON,
    usdc_address: "0x3c499c542cEF5E3811e1192ce70d8cC03d5c3359",
    decimals: 6,
    eip3009_name: "USD Coin",
    eip3009_version: "2",
};

/// Avalanche C-Chain mainnet configuration.
pub const AVALANCHE_MAINNET: ChainConfig = ChainConfig {
    network: NETWORK_AVALANCHE,
    usdc_address: "0xB97EF9Ef8734C71904D8002F8b6Bc66Dd9c48a6E",
    decimals: 6,
    eip3009_name: "USD Coin",
    eip3009_version: "2",
};

/// Ethereum mainnet configuration.
pub const ETHEREUM_MAINNET: ChainConfig = ChainConfig {
    network: NETWORK_ETHEREUM,
    usdc_address: "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48",
    decimals: 6,
    eip3009_name: "USD Coin",
    eip3009_version: "2",
};

/// Base Sepolia testnet configuration.
pub const BASE_SEPOLIA: ChainConfig = ChainConfig {
    network: NETWORK_BASE_SEPOLIA,
    usdc_address: "0x036CbD53842c5426634e7929541eC2318f3dCF7e",
    decimals: 6,
    eip3009_name: "USDC",
    eip3009_version: "2",
};

/// Polygon Amoy testnet configuration.
pub const POLYGON_AMOY: ChainConfig = ChainConfig {
    network: NETWORK_POLYGON_AMOY,
    usdc_address: "0x41E94Eb019C0762f9Bfcf9Fb1E58725BfB0e7582",
    decimals: 6,
    eip3009_name: "USDC",
    eip3009_version: "2",
};

/// Avalanche Fuji testnet configuration.
pub const AVALANCHE_FUJI: ChainConfig = ChainConfig {
    network: NETWORK_AVALANCHE_FUJI,
    usdc_address: "0x5425890298aed601595a70AB815c96711a31Bc65",
    decimals: 6,
    eip3009_name: "USD Coin",
    eip3009_version: "2",
};

/// Ethereum Sepolia testnet configuration.
pub const SEPOLIA: ChainConfig = ChainConfig {
    network: NETWORK_SEPOLIA,
    usdc_address: "0x1c7D4B196Cb0C7B01d743Fbc6116a902379C7238",
    decimals: 6,
    eip3009_name: "USDC",
    eip3009_version: "2",
};

/// Solana mainnet configuration.
pub const SOLANA_MAINNET: ChainConfig = ChainConfig {
    network: NETWORK_SOLANA_MAINNET,
    usdc_address: "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
    decimals: 6,
    eip3009_name: "",
    eip3009_version: "",
};

/// Solana devnet configuration.
pub const SOLANA_DEVNET: ChainConfig = ChainConfig {
    network: NETWORK_SOLANA_DEVNET,
    usdc_address: "4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU",
    decimals: 6,
    eip3009_name: "",
    eip3009_version: "",
};

const ALL_CHAINS: [ChainConfig; 10] = [
    BASE_MAINNET,
    POLYGON_MAINNET,
    AVALANCHE_MAINNET,
    ETHEREUM_MAINNET,
    BASE_SEPOLIA,
    POLYGON_AMOY,
    AVALANCHE_FUJI,
    SEPOLIA,
    SOLANA_MAINNET,
    SOLANA_DEVNET,
];

/// Looks up the chain configuration for a CAIP-2 network identifier.
///
/// # Errors
///
/// Returns [`ErrorCode::InvalidNetwork`] if the network is not in the registry.
pub fn chain_config(network: &str) -> Result<ChainConfig, PaymentError> {
    ALL_CHAINS
        .iter()
        .find(|c| c.network == network)
        .copied()
        .ok_or_else(|| {
            PaymentError::new(ErrorCode::InvalidNetwork, format!("unknown network: {network}"))
        })
}

/// Creates a [`TokenConfig`] for USDC on the given chain with the specified
/// priority. For other tokens, construct [`TokenConfig`] directly.
#[must_use]
pub fn usdc_token_config(chain: &ChainConfig, priority: i32) -> TokenConfig {
    TokenConfig {
        address: chain.usdc_address.to_owned(),
        symbol: "USDC".to_owned(),
        decimals: chain.decimals,
        priority,
        name: "USD Coin".to_owned(),
    }
}
