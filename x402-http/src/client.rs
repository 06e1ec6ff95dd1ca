//! Client-side auto-pay middleware for `reqwest`.
//!
//! [`X402Client`] watches responses for `402 Payment Required`, selects and
//! signs a payment with the configured signers, and retries the request once
//! with the `X-PAYMENT` header attached. A second 402 is surfaced to the
//! caller; no further automatic retries happen.

use std::sync::Arc;
use std::time::Instant;

use http::Extensions;
use reqwest::header::HeaderValue;
use reqwest::{Request, Response, StatusCode};
use reqwest_middleware as rqm;
use x402::error::{ErrorCode, PaymentError};
use x402::events::{PaymentCallback, PaymentEvent, PaymentEventKind, PaymentMethod};
use x402::proto::responses::SettleResponse;
use x402::proto::v2::{PaymentPayload, PaymentRequired};
use x402::proto::X402_VERSION;
use x402::selector::select_and_sign;
use x402::signer::Signer;

use crate::headers::{build_payment_header, parse_settlement_header, X_PAYMENT, X_PAYMENT_RESPONSE};

/// `reqwest` middleware that pays for 402 responses automatically.
#[derive(Default)]
pub struct X402Client {
    signers: Vec<Arc<dyn Signer>>,
    on_payment_attempt: Option<PaymentCallback>,
    on_payment_success: Option<PaymentCallback>,
    on_payment_failure: Option<PaymentCallback>,
}

impl std::fmt::Debug for X402Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("X402Client")
            .field("signers", &self.signers.len())
            .finish_non_exhaustive()
    }
}

impl X402Client {
    /// Creates a client with no signers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
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
    pub fn on_payment_attempt(mut self, callback: impl Fn(&PaymentEvent) + Send + Sync + 'static) -> Self {
        self.on_payment_attempt = Some(Arc::new(callback));
        self
    }

    /// Sets the callback for successful payments.
    #[must_use]
    pub fn on_payment_success(mut self, callback: impl Fn(&PaymentEvent) + Send + Sync + 'static) -> Self {
        self.on_payment_success = Some(Arc::new(callback));
        self
    }

    /// Sets the callback for failed payments.
    #[must_use]
    pub fn on_payment_failure(mut self, callback: impl Fn(&PaymentEvent) + Send + Sync + 'static) -> Self {
        self.on_payment_failure = Some(Arc::new(callback));
        self
    }

    /// Builds a ready-to-use HTTP client with this middleware installed.
    #[must_use]
    pub fn into_client(self) -> rqm::ClientWithMiddleware {
        self.into_client_with(reqwest::Client::new())
    }

    /// Builds a ready-to-use HTTP client around a pre-configured
    /// `reqwest::Client`.
    #[must_use]
    pub fn into_client_with(self, client: reqwest::Client) -> rqm::ClientWithMiddleware {
        rqm::ClientBuilder::new(client).with(self).build()
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
        url: &str,
        payment: Option<&PaymentPayload>,
    ) -> PaymentEvent {
        let mut event = PaymentEvent::new(kind, PaymentMethod::Http);
        event.url = Some(url.to_owned());
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
        url: &str,
        payment: Option<&PaymentPayload>,
        started: Instant,
        error: &PaymentError,
    ) {
        let mut event = self.payment_event(PaymentEventKind::Failure, url, payment);
        event.error = Some(error.to_string());
        event.duration = Some(started.elapsed());
        self.emit(&event);
    }
}

fn middleware_error(error: PaymentError) -> rqm::Error {
    rqm::Error::Middleware(error.into())
}

/// Reads the settlement carried by a response's `X-PAYMENT-RESPONSE` header.
#[must_use]
pub fn settlement_from_response(response: &Response) -> Option<SettleResponse> {
    response
        .headers()
        .get(X_PAYMENT_RESPONSE)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_settlement_header)
}

#[async_trait::async_trait]
impl rqm::Middleware for X402Client {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: rqm::Next<'_>,
    ) -> rqm::Result<Response> {
        let retry_req = req.try_clone();
        let response = next.clone().run(req, extensions).await?;

        if response.status() != StatusCode::PAYMENT_REQUIRED {
            return Ok(response);
        }

        let url = response.url().to_string();
        let started = Instant::now();
        tracing::info!(%url, "received 402 Payment Required, processing payment");

        let required: PaymentRequired = response.json().await.map_err(|e| {
            middleware_error(
                PaymentError::new(
                    ErrorCode::InvalidRequirements,
                    "failed to parse payment requirements",
                )
                .with_source(e),
            )
        })?;

        if required.x402_version != X402_VERSION {
            return Err(middleware_error(PaymentError::new(
                ErrorCode::UnsupportedVersion,
                format!("unsupported x402 version: {}", required.x402_version),
            )));
        }
        if required.accepts.is_empty() {
            return Err(middleware_error(PaymentError::new(
                ErrorCode::InvalidRequirements,
                "no payment requirements in response",
            )));
        }

        let payment = match select_and_sign(&self.signers, &required.accepts).await {
            Ok(payment) => payment,
            Err(err) => {
                self.fail(&url, None, started, &err);
                return Err(middleware_error(err));
            }
        };

        self.emit(&self.payment_event(PaymentEventKind::Attempt, &url, Some(&payment)));

        let header = match build_payment_header(&payment) {
            Ok(header) => header,
            Err(err) => {
                self.fail(&url, Some(&payment), started, &err);
                return Err(middleware_error(err));
            }
        };

        let mut retry = retry_req.ok_or_else(|| {
            middleware_error(PaymentError::new(
                ErrorCode::SigningFailed,
                "request body is not cloneable for payment retry",
            ))
        })?;
        let header_value = HeaderValue::from_str(&header).map_err(|e| {
            middleware_error(
                PaymentError::new(ErrorCode::MalformedHeader, "payment header value invalid")
                    .with_source(e),
            )
        })?;
        retry.headers_mut().insert(X_PAYMENT, header_value);

        let response = match next.run(retry, extensions).await {
            Ok(response) => response,
            Err(err) => {
                self.fail(
                    &url,
                    Some(&payment),
                    started,
                    &PaymentError::new(ErrorCode::FacilitatorUnavailable, "payment retry failed"),
                );
                return Err(err);
            }
        };

        match settlement_from_response(&response) {
            Some(settlement) if settlement.success => {
                let mut event = self.payment_event(PaymentEventKind::Success, &url, Some(&payment));
                event.transaction = settlement.transaction.clone();
                event.payer = settlement.payer.clone().unwrap_or_default();
                event.duration = Some(started.elapsed());
                self.emit(&event);
            }
            _ => {
                self.fail(
                    &url,
                    Some(&payment),
                    started,
                    &PaymentError::new(
                        ErrorCode::SettlementFailed,
                        format!("payment not settled (status {})", response.status()),
                    ),
                );
            }
        }

        Ok(response)
    }
}
