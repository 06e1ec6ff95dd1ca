//! HTTP transport for the x402 payment protocol.
//!
//! Three pieces live here:
//!
//! - [`facilitator::FacilitatorClient`] — speaks the facilitator's
//!   `/verify`, `/settle`, and `/supported` endpoints with retry, auth, and
//!   lifecycle hooks
//! - [`server`] — a `tower` layer that gates routes behind payment, with the
//!   settlement-commit interceptor deciding whether a handler's response is
//!   released
//! - [`client`] — a `reqwest` middleware that pays 402 responses
//!   automatically and retries once

pub mod client;
pub mod facilitator;
pub mod headers;
pub mod retry;
pub mod server;

pub use client::X402Client;
pub use facilitator::{Authorization, FacilitatorClient};
pub use server::{GateConfig, PaymentGateLayer, VerifiedPayment};
