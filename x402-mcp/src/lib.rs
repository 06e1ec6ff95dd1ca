//! MCP (Model Context Protocol) integration for the x402 payment protocol.
//!
//! MCP tools are invoked via JSON-RPC over HTTP; payment data rides inside
//! the protocol rather than in headers:
//!
//! - requests carry the payment inline under `params._meta["x402/payment"]`
//! - payment-required errors are JSON-RPC error objects with code 402 over
//!   HTTP 200
//! - settlement results are injected under
//!   `result._meta["x402/payment-response"]`
//!
//! The [`server`] module gates `tools/call` requests in front of any MCP
//! JSON-RPC HTTP handler; the [`client`] module wraps a JSON-RPC transport
//! with automatic payment.

pub mod client;
pub mod extract;
pub mod server;
pub mod types;

pub use client::{JsonRpcTransport, PaymentTransport};
pub use server::{McpGate, McpGateLayer, ToolGateConfig};
pub use types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};

/// `_meta` key carrying the client's payment payload.
pub const PAYMENT_META_KEY: &str = "x402/payment";

/// `_meta` key carrying the settlement response.
pub const PAYMENT_RESPONSE_META_KEY: &str = "x402/payment-response";

/// JSON-RPC error code for payment-required errors.
pub const PAYMENT_REQUIRED_CODE: i64 = 402;

/// JSON-RPC parse error code.
pub const PARSE_ERROR_CODE: i64 = -32700;

/// JSON-RPC invalid params error code.
pub const INVALID_PARAMS_CODE: i64 = -32602;

/// JSON-RPC internal error code.
pub const INTERNAL_ERROR_CODE: i64 = -32603;
