//! Client-side auto-pay wrapper for MCP JSON-RPC transports.
//!
//! [`PaymentTransport`] wraps any [`JsonRpcTransport`]. When a `tools/call`
//! answer is a JSON-RPC error with code 402, it selects and signs a payment,
//! injects it under `params._meta["x402/payment"]`, and retries the request
//! exactly once. A second 402 is surfaced to the caller as a failure event.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use x402::error::{ErrorCode, PaymentError};
use x402::events::{PaymentCallback, PaymentEvent, PaymentEventKind, PaymentMethod};
use x402::proto::v2::{PaymentPayload, PaymentRequired};
use x402::proto::X402_VERSION;
use x402::selector::select_and_sign;
use x402::signer::{BoxFuture, Signer};

use crate::extract::{attach_payment_to_params, settlement_from_result};
use crate::types::{JsonRpcRequest, JsonRpcResponse};
use crate::PAYMENT_REQUIRED_CODE;

/// A JSON-RPC request/response transport (an MCP session, an HTTP POST loop,
/// or a test double).
pub trait JsonRpcTransport: Send + Sync {
    /// Sends one request and awaits its response.
    fn send<'a>(
        &'a self,
        request: JsonRpcRequest,
    ) -> BoxFuture<'a, Result<JsonRpcResponse, PaymentError>>;
}

impl<T: JsonRpcTransport> JsonRpcTransport for Arc<T> {
    fn send<'a>(
        &'a self,
        request: JsonRpcRequest,
    ) -> BoxFuture<'a, Result<JsonRpcResponse, PaymentError>> {
        self.as_ref().send(request)
    }
}

/// Wraps a transport with automatic x402 payment handling.
pub struct PaymentTransport<T> {
    inner: T,
    signers: Vec<Arc<dyn Signer>>,
    on_payment_attempt: Option<PaymentCallback>,
    on_payment_success: Option<PaymentCallback>,
    on_payment_failure: Option<PaymentCallback>,
}

impl<T> std::fmt::Debug for PaymentTransport<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentTransport")
            .field("signers", &self.signers.len())
            .finish_non_exhaustive()
    }
}

impl<T: JsonRpcTransport> PaymentTransport<T> {
    /// Wraps the given transport with no signers.
    #[must_use]
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            signers: Vec::new(),
            on_payment_attempt: None,
            on_payment_success: None,
            on_payment_failure: None,
        }
    }

    /// Registers a signer.
    #[must_use]
    pub fn with_signer(mut self, signer: impl Signer + 'static) -> Self {
        self.signers.push(Arc::new(signer));
        self
    }

    /// Registers an already shared signer.
    #[must_use]
    pub fn with_shared_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signers.push(signer);
        self
    }

    /// Sets the callback for payment attempts.
    #[must_use]
    pub fn on_payment_attempt(
        mut self,
        callback: impl Fn(&PaymentEvent) + Send + Sync + 'static,
    ) -> Self {
        self.on_payment_attempt = Some(Arc::new(callback));
        self
    }

    /// Sets the callback for successful payments.
    #[must_use]
    pub fn on_payment_success(
        mut self,
        callback: impl Fn(&PaymentEvent) + Send + Sync + 'static,
    ) -> Self {
        self.on_payment_success = Some(Arc::new(callback));
        self
    }

    /// Sets the callback for failed payments.
    #[must_use]
    pub fn on_payment_failure(
        mut self,
        callback: impl Fn(&PaymentEvent) + Send + Sync + 'static,
    ) -> Self {
        self.on_payment_failure = Some(Arc::new(callback));
        self
    }

    /// Sends a request, transparently paying a 402 answer.
    ///
    /// # Errors
    ///
    /// Transport errors pass through; malformed 402 data and signing failures
    /// surface as [`PaymentError`]s after a failure event.
    pub async fn send(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse, PaymentError> {
        let response = self.inner.send(request.clone()).await?;

        let is_payment_required = response
            .error
            .as_ref()
            .is_some_and(|e| e.code == PAYMENT_REQUIRED_CODE);
        if !is_payment_required {
            return Ok(response);
        }

        let tool = tool_name(&request);
        let started = Instant::now();
        tracing::info!(tool = tool.as_deref().unwrap_or(""), "tool requires payment");

        let required = match payment_required_from_error(&response) {
            Ok(required) => required,
            Err(err) => {
                self.fail(tool.as_deref(), None, started, &err);
                return Err(err);
            }
        };

        let payment = match select_and_sign(&self.signers, &required.accepts).await {
            Ok(payment) => payment,
            Err(err) => {
                self.fail(tool.as_deref(), None, started, &err);
                return Err(err);
            }
        };

        self.emit(&self.payment_event(
            PaymentEventKind::Attempt,
            tool.as_deref(),
            Some(&payment),
        ));

        let mut retry = request;
        let mut params = retry.params.take().unwrap_or(Value::Null);
        attach_payment_to_params(&mut params, &payment).map_err(|e| {
            let err = PaymentError::new(ErrorCode::SigningFailed, "failed to inject payment")
                .with_source(e);
            self.fail(tool.as_deref(), Some(&payment), started, &err);
            err
        })?;
        retry.params = Some(params);

        let response = self.inner.send(retry).await?;

        let settlement = response
            .result
            .as_ref()
            .and_then(settlement_from_result);
        match settlement {
            Some(settlement) if settlement.success => {
                let mut event =
                    self.payment_event(PaymentEventKind::Success, tool.as_deref(), Some(&payment));
                event.transaction = settlement.transaction.clone();
                event.payer = settlement.payer.clone().unwrap_or_default();
                event.duration = Some(started.elapsed());
                self.emit(&event);
            }
            _ => {
                self.fail(
                    tool.as_deref(),
                    Some(&payment),
                    started,
                    &PaymentError::new(ErrorCode::SettlementFailed, "payment not settled"),
                );
            }
        }

        Ok(response)
    }

    fn emit(&self, event: &PaymentEvent) {
        let callback = match event.kind {
            PaymentEventKind::Attempt => &self.on_payment_attempt,
            PaymentEventKind::Success => &self.on_payment_success,
            PaymentEventKind::Failure => &self.on_payment_failure,
        };
        if let Some(callback) = callback {
            callback(event);
        }
    }

    fn payment_event(
        &self,
        kind: PaymentEventKind,
        tool: Option<&str>,
        payment: Option<&PaymentPayload>,
    ) -> PaymentEvent {
        let mut event = PaymentEvent::new(kind, PaymentMethod::Mcp);
        event.tool = tool.map(str::to_owned);
        if let Some(payment) = payment {
            event.network = payment.accepted.network.clone();
            event.scheme = payment.accepted.scheme.clone();
            event.amount = payment.accepted.amount.clone();
            event.asset = payment.accepted.asset.clone();
            event.recipient = payment.accepted.pay_to.clone();
        }
        event
    }

    fn fail(
        &self,
        tool: Option<&str>,
        payment: Option<&PaymentPayload>,
        started: Instant,
        error: &PaymentError,
    ) {
        let mut event = self.payment_event(PaymentEventKind::Failure, tool, payment);
        event.error = Some(error.to_string());
        event.duration = Some(started.elapsed());
        self.emit(&event);
    }
}

impl<T: JsonRpcTransport> JsonRpcTransport for PaymentTransport<T> {
    fn send<'a>(
        &'a self,
        request: JsonRpcRequest,
    ) -> BoxFuture<'a, Result<JsonRpcResponse, PaymentError>> {
        Box::pin(Self::send(self, request))
    }
}

fn tool_name(request: &JsonRpcRequest) -> Option<String> {
    if request.method != "tools/call" {
        return None;
    }
    request
        .params
        .as_ref()?
        .get("name")?
        .as_str()
        .map(str::to_owned)
}

/// Parses the [`PaymentRequired`] carried by a 402 JSON-RPC error.
fn payment_required_from_error(
    response: &JsonRpcResponse,
) -> Result<PaymentRequired, PaymentError> {
    let data = response
        .error
        .as_ref()
        .and_then(|e| e.data.clone())
        .ok_or_else(|| {
            PaymentError::new(
                ErrorCode::InvalidRequirements,
                "402 error carries no payment requirements",
            )
        })?;

    let required: PaymentRequired = serde_json::from_value(data).map_err(|e| {
        PaymentError::new(
            ErrorCode::InvalidRequirements,
            "failed to parse payment requirements",
        )
        .with_source(e)
    })?;

    if required.x402_version != X402_VERSION {
        return Err(PaymentError::new(
            ErrorCode::UnsupportedVersion,
            format!("unsupported x402 version: {}", required.x402_version),
        ));
    }
    if required.accepts.is_empty() {
        return Err(PaymentError::new(
            ErrorCode::InvalidRequirements,
            "no payment requirements in response",
        ));
    }

    Ok(required)
}
