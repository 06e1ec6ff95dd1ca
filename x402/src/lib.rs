//! Core traits and abstractions for the x402 payment protocol.
//!
//! This crate re-exports all wire format types from [`x402_proto`] and adds:
//!
//! - [`chain`] — CAIP-2 network identification
//! - [`networks`] — the static registry of known chains
//! - [`validation`] — structural validation of requirements, payloads, and
//!   402 responses
//! - [`signer`] — the [`Signer`](signer::Signer) capability and token
//!   configuration
//! - [`selector`] — deterministic payment selection and signing
//! - [`facilitator`] — the [`Facilitator`](facilitator::Facilitator)
//!   abstraction over verify/settle/supported
//! - [`events`] — payment lifecycle events shared by HTTP and MCP transports
//! - [`error`] — the structured [`PaymentError`](error::PaymentError)
//! - [`config`] — timeout configuration

pub mod chain;
pub mod config;
pub mod error;
pub mod events;
pub mod facilitator;
pub mod networks;
pub mod selector;
pub mod signer;
pub mod validation;

/// Re-export all wire format types from `x402-proto`.
pub use x402_proto as proto;
pub use x402_proto::*;

pub use error::{ErrorCode, PaymentError};
pub use selector::{find_matching_requirement, select_and_sign};
pub use signer::{BoxFuture, Signer, TokenConfig};
