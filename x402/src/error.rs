//! Structured errors for x402 payment operations.
//!
//! Every error carries an [`ErrorCode`] for programmatic handling, a
//! human-readable message, and an optional free-form details map (e.g., the
//! list of network/asset tuples when no signer matches). Errors wrap their
//! cause and expose it through [`std::error::Error::source`].

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

/// Payment error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorCode {
    /// Invalid or unsupported network identifier.
    InvalidNetwork,
    /// Invalid private key material.
    InvalidKey,
    /// Invalid token configuration.
    InvalidToken,
    /// Invalid amount string.
    InvalidAmount,
    /// The payment requirements from the server are invalid.
    InvalidRequirements,
    /// The payment header is missing or malformed.
    MalformedHeader,
    /// Unsupported x402 protocol version.
    UnsupportedVersion,
    /// Unsupported payment scheme.
    UnsupportedScheme,
    /// No signer can satisfy the payment requirements.
    NoValidSigner,
    /// The payment amount exceeds the per-call limit.
    AmountExceeded,
    /// The payment signing operation failed.
    SigningFailed,
    /// The facilitator service is unavailable.
    FacilitatorUnavailable,
    /// Payment verification failed.
    VerificationFailed,
    /// Payment settlement failed.
    SettlementFailed,
}

impl ErrorCode {
    /// Returns the stable wire name of the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidNetwork => "INVALID_NETWORK",
            Self::InvalidKey => "INVALID_KEY",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::InvalidAmount => "INVALID_AMOUNT",
            Self::InvalidRequirements => "INVALID_REQUIREMENTS",
            Self::MalformedHeader => "MALFORMED_HEADER",
            Self::UnsupportedVersion => "UNSUPPORTED_VERSION",
            Self::UnsupportedScheme => "UNSUPPORTED_SCHEME",
            Self::NoValidSigner => "NO_VALID_SIGNER",
            Self::AmountExceeded => "AMOUNT_EXCEEDED",
            Self::SigningFailed => "SIGNING_FAILED",
            Self::FacilitatorUnavailable => "FACILITATOR_UNAVAILABLE",
            Self::VerificationFailed => "VERIFICATION_FAILED",
            Self::SettlementFailed => "SETTLEMENT_FAILED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error for x402 payment operations.
#[derive(Debug)]
pub struct PaymentError {
    code: ErrorCode,
    message: String,
    details: HashMap<String, Value>,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl PaymentError {
    /// Creates a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: HashMap::new(),
            source: None,
        }
    }

    /// Wraps an underlying cause.
    #[must_use]
    pub fn with_source(
        mut self,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Adds a key to the details map.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Returns the error code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        self.code
    }

    /// Returns the human-readable message without the source chain.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the details map.
    #[must_use]
    pub const fn details(&self) -> &HashMap<String, Value> {
        &self.details
    }
}

impl fmt::Display for PaymentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{}: {}", self.message, source),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for PaymentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}
