//! Payment lifecycle events.
//!
//! Both the HTTP and MCP transports emit the same event record at the same
//! three points: when a payment is attempted, when settlement is observed,
//! and when the flow fails. Callbacks run synchronously on the request path;
//! implementations doing expensive work should hand off to their own queue.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// The kind of payment event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentEventKind {
    /// A payment is being attempted.
    Attempt,
    /// A payment succeeded.
    Success,
    /// A payment failed.
    Failure,
}

/// The transport a payment event originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMethod {
    /// Plain HTTP request/response flow.
    Http,
    /// JSON-RPC over HTTP (MCP) flow.
    Mcp,
}

/// A payment lifecycle event.
#[derive(Debug, Clone)]
pub struct PaymentEvent {
    /// Event kind.
    pub kind: PaymentEventKind,

    /// When the event occurred.
    pub timestamp: SystemTime,

    /// Transport that produced the event.
    pub method: PaymentMethod,

    /// MCP tool being accessed (MCP only).
    pub tool: Option<String>,

    /// HTTP URL being accessed (HTTP only).
    pub url: Option<String>,

    /// Payment amount in atomic units.
    pub amount: String,

    /// Token/asset address.
    pub asset: String,

    /// CAIP-2 network identifier.
    pub network: String,

    /// Payment scheme.
    pub scheme: String,

    /// Payment recipient address.
    pub recipient: String,

    /// Payer address (available on success).
    pub payer: String,

    /// On-chain transaction hash (available on success).
    pub transaction: String,

    /// Error description (available on failure).
    pub error: Option<String>,

    /// Time taken by the payment operation so far.
    pub duration: Option<Duration>,
}

impl PaymentEvent {
    /// Creates an event of the given kind with empty payment fields.
    #[must_use]
    pub fn new(kind: PaymentEventKind, method: PaymentMethod) -> Self {
        Self {
            kind,
            timestamp: SystemTime::now(),
            method,
            tool: None,
            url: None,
            amount: String::new(),
            asset: String::new(),
            network: String::new(),
            scheme: String::new(),
            recipient: String::new(),
            payer: String::new(),
            transaction: String::new(),
            error: None,
            duration: None,
        }
    }
}

/// Handles payment events.
///
/// Invoked synchronously during payment processing; keep it fast.
pub type PaymentCallback = Arc<dyn Fn(&PaymentEvent) + Send + Sync>;
