//! EVM payment signer for the x402 protocol.
//!
//! Implements the "exact" scheme for `eip155:*` networks by signing ERC-3009
//! `transferWithAuthorization` messages with EIP-712 typed data. The produced
//! authorization is gasless for the payer: the facilitator submits it
//! on-chain during settlement.

mod eip3009;
mod signer;

pub use eip3009::{Eip3009Authorization, TransferWithAuthorization};
pub use signer::EvmSigner;
