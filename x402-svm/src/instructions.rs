//! Instruction builders for the partially signed transfer transaction.

use solana_instruction::{AccountMeta, Instruction};
use solana_pubkey::Pubkey;

/// The SPL Associated Token Account program.
pub const ATA_PROGRAM_ID: Pubkey =
    Pubkey::from_str_const("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");

/// The system program.
const SYSTEM_PROGRAM_ID: Pubkey = Pubkey::from_str_const("11111111111111111111111111111111");

/// Compute unit limit set on every payment transaction.
pub const DEFAULT_COMPUTE_UNITS: u32 = 200_000;

/// Compute unit price in microlamports set on every payment transaction.
pub const DEFAULT_COMPUTE_UNIT_PRICE: u64 = 10_000;

/// Derives the associated token account for `(owner, mint)`.
#[must_use]
pub fn derive_associated_token_address(owner: &Pubkey, mint: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[owner.as_ref(), spl_token::id().as_ref(), mint.as_ref()],
        &ATA_PROGRAM_ID,
    )
    .0
}

/// Builds a `CreateIdempotent` associated-token-account instruction.
///
/// Unlike plain `Create` (discriminator 0), `CreateIdempotent` (discriminator
/// 1) succeeds when the account already exists, so the transfer transaction
/// never fails on a pre-existing recipient ATA. The payer sponsors the
/// rent-exempt balance when creation is needed.
#[must_use]
pub fn create_idempotent_ata_instruction(
    payer: &Pubkey,
    owner: &Pubkey,
    mint: &Pubkey,
) -> Instruction {
    let ata = derive_associated_token_address(owner, mint);
    Instruction {
        program_id: ATA_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new(*payer, true),
            AccountMeta::new(ata, false),
            AccountMeta::new_readonly(*owner, false),
            AccountMeta::new_readonly(*mint, false),
            AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
            AccountMeta::new_readonly(spl_token::id(), false),
        ],
        data: vec![1],
    }
}
