//! Solana payment signer for the x402 protocol.
//!
//! Implements the "exact" scheme for `solana:*` networks by building a
//! partially signed SPL token transfer: the payer signs the transaction, the
//! fee-payer signature slot stays empty, and the facilitator co-signs as fee
//! payer during settlement.

mod instructions;
mod rpc;
mod signer;

pub use instructions::{
    create_idempotent_ata_instruction, derive_associated_token_address, ATA_PROGRAM_ID,
    DEFAULT_COMPUTE_UNITS, DEFAULT_COMPUTE_UNIT_PRICE,
};
pub use rpc::{rpc_url, BlockhashSource};
pub use signer::SvmSigner;
