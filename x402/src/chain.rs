//! CAIP-2 blockchain network identification.
//!
//! Networks are identified by strings of the form `namespace:reference`.
//! The `eip155` namespace covers EVM chains (the reference is the decimal
//! chain id); the `solana` namespace covers Solana clusters (the reference is
//! the base58 genesis hash). All other namespaces are rejected by
//! [`validate_network`].

use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ErrorCode, PaymentError};

/// A CAIP-2 compliant blockchain identifier.
///
/// # Serialization
///
/// Serializes to/from a colon-separated string: `"eip155:8453"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChainId {
    namespace: String,
    reference: String,
}

impl ChainId {
    /// Creates a chain ID from namespace and reference components.
    pub fn new<N: Into<String>, R: Into<String>>(namespace: N, reference: R) -> Self {
        Self {
            namespace: namespace.into(),
            reference: reference.into(),
        }
    }

    /// Returns the namespace component.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the reference component.
    #[must_use]
    pub fn reference(&self) -> &str {
        &self.reference
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.reference)
    }
}

impl FromStr for ChainId {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, reference) = s.split_once(':').ok_or_else(|| {
            PaymentError::new(
                ErrorCode::InvalidNetwork,
                format!("invalid CAIP-2 format: {s}"),
            )
        })?;
        if namespace.is_empty() || reference.is_empty() {
            return Err(PaymentError::new(
                ErrorCode::InvalidNetwork,
                format!("invalid CAIP-2 format: {s}"),
            ));
        }
        Ok(Self {
            namespace: namespace.into(),
            reference: reference.into(),
        })
    }
}

impl Serialize for ChainId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ChainId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(de::Error::custom)
    }
}

/// The blockchain virtual-machine family of a validated network, with its
/// decoded reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkType {
    /// Ethereum Virtual Machine chain with its numeric chain id.
    Evm {
        /// EIP-155 chain id.
        chain_id: u64,
    },
    /// Solana Virtual Machine cluster with its genesis hash.
    Svm {
        /// Base58 genesis hash (CAIP-2 reference, 32–44 characters).
        genesis_hash: String,
    },
}

/// Validates a CAIP-2 network identifier and classifies it.
///
/// # Errors
///
/// Returns [`ErrorCode::InvalidNetwork`] for empty strings, malformed CAIP-2
/// syntax, non-numeric `eip155` references, out-of-range `solana` genesis
/// hashes, and unknown namespaces.
pub fn validate_network(network: &str) -> Result<NetworkType, PaymentError> {
    if network.is_empty() {
        return Err(PaymentError::new(
            ErrorCode::InvalidNetwork,
            "network cannot be empty",
        ));
    }

    let chain_id: ChainId = network.parse()?;

    match chain_id.namespace() {
        "eip155" => {
            let id: u64 = chain_id.reference().parse().map_err(|_| {
                PaymentError::new(
                    ErrorCode::InvalidNetwork,
                    format!("invalid EIP-155 chain id: {}", chain_id.reference()),
                )
            })?;
            Ok(NetworkType::Evm { chain_id: id })
        }
        "solana" => {
            let hash = chain_id.reference();
            if hash.len() < 32 || hash.len() > 44 {
                return Err(PaymentError::new(
                    ErrorCode::InvalidNetwork,
                    format!("invalid Solana genesis hash length: {hash}"),
                ));
            }
            Ok(NetworkType::Svm {
                genesis_hash: hash.to_owned(),
            })
        }
        other => Err(PaymentError::new(
            ErrorCode::InvalidNetwork,
            format!("unsupported namespace: {other}"),
        )),
    }
}

/// Extracts the chain id from a CAIP-2 EVM network identifier.
///
/// # Errors
///
/// Returns [`ErrorCode::InvalidNetwork`] if the network is not an EVM network.
pub fn evm_chain_id(network: &str) -> Result<u64, PaymentError> {
    match validate_network(network)? {
        NetworkType::Evm { chain_id } => Ok(chain_id),
        NetworkType::Svm { .. } => Err(PaymentError::new(
            ErrorCode::InvalidNetwork,
            format!("not an EVM network: {network}"),
        )),
    }
}

/// Extracts the genesis hash from a CAIP-2 Solana network identifier.
///
/// # Errors
///
/// Returns [`ErrorCode::InvalidNetwork`] if the network is not a Solana network.
pub fn solana_genesis_hash(network: &str) -> Result<String, PaymentError> {
    match validate_network(network)? {
        NetworkType::Svm { genesis_hash } => Ok(genesis_hash),
        NetworkType::Evm { .. } => Err(PaymentError::new(
            ErrorCode::InvalidNetwork,
            format!("not a Solana network: {network}"),
        )),
    }
}
