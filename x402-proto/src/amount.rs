//! Conversion between human decimal amounts and atomic token units.
//!
//! Amounts on the wire are decimal integer strings in the token's smallest
//! unit. These helpers convert to and from the human representation
//! (e.g., `"1.5"` USDC with 6 decimals is `1_500_000` atomic units).

/// Errors produced when parsing a decimal amount.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    /// The amount string is empty or not a decimal number.
    #[error("invalid amount format: {0}")]
    Malformed(String),

    /// The amount is negative.
    #[error("amount cannot be negative: {0}")]
    Negative(String),

    /// The amount has more fractional digits than the token's decimals.
    #[error("amount {0} has more than {1} fractional digits")]
    TooPrecise(String, u8),

    /// The atomic value does not fit in 128 bits.
    #[error("amount {0} overflows")]
    Overflow(String),
}

/// Converts a decimal amount string to atomic units.
///
/// `"1.5"` with 6 decimals becomes `1_500_000`. Zero is permitted.
///
/// # Errors
///
/// Returns [`AmountError`] on malformed, negative, overly precise, or
/// overflowing input.
pub fn atomic_amount(amount: &str, decimals: u8) -> Result<u128, AmountError> {
    let trimmed = amount.trim();
    if trimmed.is_empty() {
        return Err(AmountError::Malformed(amount.to_owned()));
    }
    if trimmed.starts_with('-') {
        return Err(AmountError::Negative(amount.to_owned()));
    }

    let (whole, frac) = match trimmed.split_once('.') {
        Some((w, f)) => (w, f),
        None => (trimmed, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(AmountError::Malformed(amount.to_owned()));
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(AmountError::Malformed(amount.to_owned()));
    }
    if frac.len() > decimals as usize {
        // Trailing zeros beyond the token precision are harmless.
        let (keep, rest) = frac.split_at(decimals as usize);
        if rest.chars().any(|c| c != '0') {
            return Err(AmountError::TooPrecise(amount.to_owned(), decimals));
        }
        return atomic_parts(amount, whole, keep, decimals);
    }

    atomic_parts(amount, whole, frac, decimals)
}

fn atomic_parts(original: &str, whole: &str, frac: &str, decimals: u8) -> Result<u128, AmountError> {
    let scale = 10u128
        .checked_pow(u32::from(decimals))
        .ok_or_else(|| AmountError::Overflow(original.to_owned()))?;
    let whole: u128 = if whole.is_empty() {
        0
    } else {
        whole
            .parse()
            .map_err(|_| AmountError::Overflow(original.to_owned()))?
    };
    let frac_scale = 10u128.pow(u32::from(decimals) - frac.len() as u32);
    let frac: u128 = if frac.is_empty() {
        0
    } else {
        frac.parse()
            .map_err(|_| AmountError::Overflow(original.to_owned()))?
    };

    whole
        .checked_mul(scale)
        .and_then(|w| w.checked_add(frac * frac_scale))
        .ok_or_else(|| AmountError::Overflow(original.to_owned()))
}

/// Converts atomic units back to a decimal string with the token's full
/// precision. `1_500_000` with 6 decimals becomes `"1.500000"`.
#[must_use]
pub fn display_amount(value: u128, decimals: u8) -> String {
    if decimals == 0 {
        return value.to_string();
    }
    let scale = 10u128.pow(u32::from(decimals));
    let whole = value / scale;
    let frac = value % scale;
    format!("{whole}.{frac:0width$}", width = decimals as usize)
}
