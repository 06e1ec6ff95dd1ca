//! The payment gate pipeline and the settlement-commit interceptor.

use axum_core::body::Body;
use axum_core::extract::Request;
use axum_core::response::{IntoResponse, Response};
use http::header::CONTENT_TYPE;
use http::{HeaderValue, StatusCode};
use std::convert::Infallible;
use std::sync::Arc;
use tower::Service;
use x402::error::PaymentError;
use x402::facilitator::Facilitator;
use x402::proto::responses::{SettleResponse, VerifyResponse};
use x402::proto::v2::{PaymentPayload, PaymentRequirements, ResourceInfo};
use x402::proto::X402_VERSION;
use x402::selector::find_matching_requirement;

use crate::headers::{
    parse_payment_header, payment_required_body, settlement_header, X_PAYMENT, X_PAYMENT_RESPONSE,
};

/// The verify result for the current request, injected into request
/// extensions so handlers can read the payer.
#[derive(Debug, Clone)]
pub struct VerifiedPayment(pub VerifyResponse);

/// A payment-gated route: facilitator, accepted payments, and settlement
/// behavior.
pub struct PaymentGate {
    facilitator: Arc<dyn Facilitator>,
    fallback: Option<Arc<dyn Facilitator>>,
    requirements: Vec<PaymentRequirements>,
    resource: Option<ResourceInfo>,
    verify_only: bool,
}

impl std::fmt::Debug for PaymentGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentGate")
            .field("requirements", &self.requirements.len())
            .field("has_fallback", &self.fallback.is_some())
            .field("verify_only", &self.verify_only)
            .finish_non_exhaustive()
    }
}

/// Outcome of the settlement commit point — the moment the handler's response
/// status is known and before any body bytes are released.
enum Commit {
    /// Handler failed (status ≥ 400); forward its response untouched, no
    /// settlement.
    PassThrough,
    /// Settlement succeeded (or verify-only); release the handler's response
    /// with the settlement header attached.
    Emit(Option<HeaderValue>),
    /// Settlement failed; the handler's response is discarded entirely and
    /// replaced.
    Hijack(Response),
}

impl PaymentGate {
    /// Creates a gate for the given facilitator and accepted payments.
    #[must_use]
    pub fn new(facilitator: Arc<dyn Facilitator>, requirements: Vec<PaymentRequirements>) -> Self {
        Self {
            facilitator,
            fallback: None,
            requirements,
            resource: None,
            verify_only: false,
        }
    }

    /// Sets a backup facilitator, tried when the primary errors.
    #[must_use]
    pub fn with_fallback(mut self, fallback: Arc<dyn Facilitator>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Sets the protected resource. An empty URL is still auto-populated per
    /// request.
    #[must_use]
    pub fn with_resource(mut self, resource: ResourceInfo) -> Self {
        self.resource = Some(resource);
        self
    }

    /// Suppresses settlement; verified requests pass with a synthetic
    /// settlement response.
    #[must_use]
    pub const fn with_verify_only(mut self, verify_only: bool) -> Self {
        self.verify_only = verify_only;
        self
    }

    /// Returns the primary facilitator.
    #[must_use]
    pub fn facilitator(&self) -> &Arc<dyn Facilitator> {
        &self.facilitator
    }

    /// Returns the configured (pre-enrichment) requirements.
    #[must_use]
    pub fn requirements(&self) -> &[PaymentRequirements] {
        &self.requirements
    }

    /// Handles one request through the full gating pipeline.
    pub async fn handle<S>(
        &self,
        enriched: &[PaymentRequirements],
        mut inner: S,
        mut req: Request,
    ) -> Response
    where
        S: Service<Request, Response = Response, Error = Infallible> + Send,
        S::Future: Send,
    {
        let resource = self.resolve_resource(&req);

        let Some(header) = req.headers().get(X_PAYMENT) else {
            tracing::info!(path = %req.uri().path(), "no payment header provided");
            return self.payment_required(&resource, enriched, "Payment required");
        };

        let Ok(header) = header.to_str() else {
            return bad_request("Invalid payment header");
        };
        let payment = match parse_payment_header(header) {
            Ok(payment) => payment,
            Err(err) => {
                tracing::warn!(error = %err, "invalid payment header");
                return bad_request(&err.to_string());
            }
        };

        let requirement = match find_matching_requirement(&payment, enriched) {
            Ok(requirement) => requirement,
            Err(err) => {
                tracing::warn!(error = %err, "no matching requirement");
                return self.payment_required(&resource, enriched, "No matching payment requirement");
            }
        };

        tracing::info!(
            scheme = %payment.accepted.scheme,
            network = %payment.accepted.network,
            "verifying payment"
        );
        let verify = match self.verify_with_fallback(&payment, requirement).await {
            Ok(verify) => verify,
            Err(err) => {
                tracing::error!(error = %err, "facilitator verification failed");
                return service_unavailable("Payment verification failed");
            }
        };

        if !verify.is_valid {
            let reason = verify.invalid_reason.as_deref().unwrap_or("invalid payment");
            tracing::warn!(reason, "payment verification failed");
            return self.payment_required(&resource, enriched, reason);
        }

        tracing::info!(payer = verify.payer.as_deref().unwrap_or(""), "payment verified");
        req.extensions_mut().insert(VerifiedPayment(verify.clone()));

        let response = match inner.call(req).await {
            Ok(response) => response,
            Err(never) => match never {},
        };

        match self
            .commit(response.status(), &payment, requirement, &verify, &resource, enriched)
            .await
        {
            Commit::PassThrough => response,
            Commit::Emit(header) => {
                let mut response = response;
                if let Some(header) = header {
                    response.headers_mut().insert(X_PAYMENT_RESPONSE, header);
                }
                response
            }
            Commit::Hijack(replacement) => replacement,
        }
    }

    /// The settlement-commit decision. Settle is invoked at most once per
    /// request, and only when the handler committed a success status.
    async fn commit(
        &self,
        status: StatusCode,
        payment: &PaymentPayload,
        requirement: &PaymentRequirements,
        verify: &VerifyResponse,
        resource: &ResourceInfo,
        enriched: &[PaymentRequirements],
    ) -> Commit {
        if status.as_u16() >= 400 {
            tracing::warn!(status = %status, "handler returned non-success, skipping settlement");
            return Commit::PassThrough;
        }

        let settlement = if self.verify_only {
            SettleResponse {
                success: true,
                error_reason: None,
                error_message: None,
                transaction: String::new(),
                network: payment.accepted.network.clone(),
                payer: verify.payer.clone(),
            }
        } else {
            tracing::info!(payer = verify.payer.as_deref().unwrap_or(""), "settling payment");
            match self.settle_with_fallback(payment, requirement).await {
                Ok(settlement) if settlement.success => settlement,
                Ok(settlement) => {
                    let reason = settlement
                        .error_reason
                        .as_deref()
                        .unwrap_or("settlement failed");
                    tracing::warn!(reason, "settlement unsuccessful");
                    return Commit::Hijack(self.payment_required(resource, enriched, reason));
                }
                Err(err) => {
                    tracing::error!(error = %err, "settlement failed");
                    return Commit::Hijack(service_unavailable("Payment settlement failed"));
                }
            }
        };

        if !settlement.transaction.is_empty() {
            tracing::info!(transaction = %settlement.transaction, "payment settled");
        }

        match settlement_header(&settlement) {
            Ok(header) => Commit::Emit(Some(header)),
            Err(err) => {
                tracing::warn!(error = %err, "failed to encode payment response header");
                Commit::Emit(None)
            }
        }
    }

    async fn verify_with_fallback(
        &self,
        payment: &PaymentPayload,
        requirement: &PaymentRequirements,
    ) -> Result<VerifyResponse, PaymentError> {
        match self.facilitator.verify(payment, requirement).await {
            Ok(response) => Ok(response),
            Err(err) => match &self.fallback {
                Some(fallback) => {
                    tracing::warn!(error = %err, "primary facilitator failed, trying fallback");
                    fallback.verify(payment, requirement).await
                }
                None => Err(err),
            },
        }
    }

    async fn settle_with_fallback(
        &self,
        payment: &PaymentPayload,
        requirement: &PaymentRequirements,
    ) -> Result<SettleResponse, PaymentError> {
        match self.facilitator.settle(payment, requirement).await {
            Ok(response) => Ok(response),
            Err(err) => match &self.fallback {
                Some(fallback) => {
                    tracing::warn!(error = %err, "primary facilitator settlement failed, trying fallback");
                    fallback.settle(payment, requirement).await
                }
                None => Err(err),
            },
        }
    }

    fn resolve_resource(&self, req: &Request) -> ResourceInfo {
        let mut resource = self.resource.clone().unwrap_or_default();
        if resource.url.is_empty() {
            resource.url = resource_url(req);
        }
        if resource.description.is_none() {
            resource.description = Some(format!("Payment required for {}", req.uri().path()));
        }
        resource
    }

    fn payment_required(
        &self,
        resource: &ResourceInfo,
        accepts: &[PaymentRequirements],
        error: &str,
    ) -> Response {
        let body = payment_required_body(resource, accepts, error);
        json_response(StatusCode::PAYMENT_REQUIRED, &body)
    }
}

/// Derives the resource URL from the request's scheme, host, and URI.
fn resource_url(req: &Request) -> String {
    let scheme = req.uri().scheme_str().unwrap_or("http");
    let host = req
        .uri()
        .authority()
        .map(|a| a.as_str().to_owned())
        .or_else(|| {
            req.headers()
                .get(http::header::HOST)
                .and_then(|h| h.to_str().ok())
                .map(str::to_owned)
        })
        .unwrap_or_else(|| "localhost".to_owned());
    let path_and_query = req
        .uri()
        .path_and_query()
        .map_or("/", |pq| pq.as_str());
    format!("{scheme}://{host}{path_and_query}")
}

fn json_response(status: StatusCode, body: &impl serde::Serialize) -> Response {
    let bytes = serde_json::to_vec(body).unwrap_or_default();
    (
        status,
        [(CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        Body::from(bytes),
    )
        .into_response()
}

fn bad_request(error: &str) -> Response {
    json_response(
        StatusCode::BAD_REQUEST,
        &serde_json::json!({ "x402Version": X402_VERSION, "error": error }),
    )
}

fn service_unavailable(error: &str) -> Response {
    json_response(
        StatusCode::SERVICE_UNAVAILABLE,
        &serde_json::json!({ "x402Version": X402_VERSION, "error": error }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::build_payment_header;
    use http_body_util::BodyExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::service_fn;
    use x402::proto::encoding::decode_settlement;
    use x402::proto::responses::SupportedResponse;
    use x402::proto::v2::{ExactPayload, PaymentRequired, SvmPayload};
    use x402::signer::BoxFuture;

    /// Scriptable facilitator that counts calls.
    struct MockFacilitator {
        verify_result: Result<VerifyResponse, ()>,
        settle_result: Result<SettleResponse, ()>,
        verify_calls: AtomicUsize,
        settle_calls: AtomicUsize,
    }

    impl MockFacilitator {
        fn ok() -> Self {
            Self {
                verify_result: Ok(VerifyResponse::valid("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266")),
                settle_result: Ok(SettleResponse::succeeded("0x1234abcd", "eip155:84532")),
                verify_calls: AtomicUsize::new(0),
                settle_calls: AtomicUsize::new(0),
            }
        }

        fn settle_rejects(reason: &str) -> Self {
            Self {
                settle_result: Ok(SettleResponse::failed(reason, "eip155:84532")),
                ..Self::ok()
            }
        }

        fn settle_unreachable() -> Self {
            Self {
                settle_result: Err(()),
                ..Self::ok()
            }
        }

        fn verify_unreachable() -> Self {
            Self {
                verify_result: Err(()),
                ..Self::ok()
            }
        }

        fn verify_invalid(reason: &str) -> Self {
            Self {
                verify_result: Ok(VerifyResponse::invalid(reason)),
                ..Self::ok()
            }
        }
    }

    impl Facilitator for MockFacilitator {
        fn verify<'a>(
            &'a self,
            _payload: &'a PaymentPayload,
            _requirements: &'a PaymentRequirements,
        ) -> BoxFuture<'a, Result<VerifyResponse, PaymentError>> {
            self.verify_calls.fetch_add(1, Ordering::SeqCst);
            let result = self.verify_result.clone().map_err(|()| {
                PaymentError::new(
                    x402::ErrorCode::FacilitatorUnavailable,
                    "connection refused",
                )
            });
            Box::pin(async move { result })
        }

        fn settle<'a>(
            &'a self,
            _payload: &'a PaymentPayload,
            _requirements: &'a PaymentRequirements,
        ) -> BoxFuture<'a, Result<SettleResponse, PaymentError>> {
            self.settle_calls.fetch_add(1, Ordering::SeqCst);
            let result = self.settle_result.clone().map_err(|()| {
                PaymentError::new(
                    x402::ErrorCode::FacilitatorUnavailable,
                    "connection refused",
                )
            });
            Box::pin(async move { result })
        }

        fn supported(&self) -> BoxFuture<'_, Result<SupportedResponse, PaymentError>> {
            Box::pin(async { Ok(SupportedResponse::default()) })
        }
    }

    fn requirement() -> PaymentRequirements {
        PaymentRequirements {
            scheme: "exact".into(),
            network: "eip155:84532".into(),
            amount: "10000".into(),
            asset: "0x036CbD53842c5426634e7929541eC2318f3dCF7e".into(),
            pay_to: "0x209693Bc6afc0C5328bA36FaF03C514EF312287C".into(),
            max_timeout_seconds: 60,
            extra: None,
        }
    }

    fn payment() -> PaymentPayload {
        PaymentPayload {
            x402_version: X402_VERSION,
            resource: None,
            accepted: requirement(),
            payload: ExactPayload::Svm(SvmPayload {
                transaction: "AQ==".into(),
            }),
            extensions: None,
        }
    }

    fn paid_request() -> Request {
        Request::builder()
            .uri("http://api.example.com/data?q=1")
            .header(X_PAYMENT, build_payment_header(&payment()).unwrap())
            .body(Body::empty())
            .unwrap()
    }

    /// Inner handler returning the given status, counting executions.
    fn handler(
        status: StatusCode,
        calls: Arc<AtomicUsize>,
    ) -> impl Service<Request, Response = Response, Error = Infallible, Future: Send> + Send {
        service_fn(move |_req: Request| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok((status, "{\"x\":1}").into_response())
            }
        })
    }

    async fn body_string(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_no_header_gates_without_running_handler() {
        let facilitator = Arc::new(MockFacilitator::ok());
        let gate = PaymentGate::new(Arc::clone(&facilitator) as _, vec![requirement()]);
        let calls = Arc::new(AtomicUsize::new(0));

        let req = Request::builder()
            .uri("http://api.example.com/data?q=1")
            .body(Body::empty())
            .unwrap();
        let response = gate
            .handle(&[requirement()], handler(StatusCode::OK, Arc::clone(&calls)), req)
            .await;

        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(facilitator.verify_calls.load(Ordering::SeqCst), 0);

        let body: PaymentRequired = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body.x402_version, X402_VERSION);
        assert_eq!(body.resource.unwrap().url, "http://api.example.com/data?q=1");
        assert_eq!(body.accepts.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_header_is_bad_request() {
        let gate = PaymentGate::new(Arc::new(MockFacilitator::ok()), vec![requirement()]);
        let calls = Arc::new(AtomicUsize::new(0));

        let req = Request::builder()
            .uri("http://api.example.com/data")
            .header(X_PAYMENT, "!!not-base64!!")
            .body(Body::empty())
            .unwrap();
        let response = gate
            .handle(&[requirement()], handler(StatusCode::OK, Arc::clone(&calls)), req)
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["x402Version"], 2);
    }

    #[tokio::test]
    async fn test_no_matching_requirement_is_402() {
        let gate = PaymentGate::new(Arc::new(MockFacilitator::ok()), vec![requirement()]);
        let calls = Arc::new(AtomicUsize::new(0));

        let other = PaymentRequirements {
            network: "eip155:1".into(),
            ..requirement()
        };
        let response = gate
            .handle(&[other], handler(StatusCode::OK, Arc::clone(&calls)), paid_request())
            .await;

        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_happy_path_settles_and_sets_header() {
        let facilitator = Arc::new(MockFacilitator::ok());
        let gate = PaymentGate::new(Arc::clone(&facilitator) as _, vec![requirement()]);
        let calls = Arc::new(AtomicUsize::new(0));

        let response = gate
            .handle(
                &[requirement()],
                handler(StatusCode::OK, Arc::clone(&calls)),
                paid_request(),
            )
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(facilitator.settle_calls.load(Ordering::SeqCst), 1);

        let header = response.headers().get(X_PAYMENT_RESPONSE).unwrap();
        let settlement = decode_settlement(header.to_str().unwrap()).unwrap();
        assert!(settlement.success);
        assert_eq!(settlement.transaction, "0x1234abcd");
        assert_eq!(body_string(response).await, "{\"x\":1}");
    }

    #[tokio::test]
    async fn test_handler_error_skips_settlement() {
        let facilitator = Arc::new(MockFacilitator::ok());
        let gate = PaymentGate::new(Arc::clone(&facilitator) as _, vec![requirement()]);
        let calls = Arc::new(AtomicUsize::new(0));

        let response = gate
            .handle(
                &[requirement()],
                handler(StatusCode::NOT_FOUND, Arc::clone(&calls)),
                paid_request(),
            )
            .await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(facilitator.settle_calls.load(Ordering::SeqCst), 0);
        assert!(response.headers().get(X_PAYMENT_RESPONSE).is_none());
    }

    #[tokio::test]
    async fn test_settle_rejection_hijacks_success_response() {
        let facilitator = Arc::new(MockFacilitator::settle_rejects("insufficient_funds"));
        let gate = PaymentGate::new(Arc::clone(&facilitator) as _, vec![requirement()]);
        let calls = Arc::new(AtomicUsize::new(0));

        let response = gate
            .handle(
                &[requirement()],
                handler(StatusCode::OK, Arc::clone(&calls)),
                paid_request(),
            )
            .await;

        // The handler ran, but its response never reaches the client.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        assert!(response.headers().get(X_PAYMENT_RESPONSE).is_none());
        let body = body_string(response).await;
        assert!(!body.contains("{\"x\":1}"));
        assert!(body.contains("insufficient_funds"));
    }

    #[tokio::test]
    async fn test_settle_transport_failure_is_503() {
        let facilitator = Arc::new(MockFacilitator::settle_unreachable());
        let gate = PaymentGate::new(Arc::clone(&facilitator) as _, vec![requirement()]);
        let calls = Arc::new(AtomicUsize::new(0));

        let response = gate
            .handle(
                &[requirement()],
                handler(StatusCode::OK, Arc::clone(&calls)),
                paid_request(),
            )
            .await;

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(!body_string(response).await.contains("{\"x\":1}"));
    }

    #[tokio::test]
    async fn test_verify_only_never_settles() {
        let facilitator = Arc::new(MockFacilitator::ok());
        let gate = PaymentGate::new(Arc::clone(&facilitator) as _, vec![requirement()])
            .with_verify_only(true);
        let calls = Arc::new(AtomicUsize::new(0));

        let response = gate
            .handle(
                &[requirement()],
                handler(StatusCode::OK, Arc::clone(&calls)),
                paid_request(),
            )
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(facilitator.settle_calls.load(Ordering::SeqCst), 0);

        let header = response.headers().get(X_PAYMENT_RESPONSE).unwrap();
        let settlement = decode_settlement(header.to_str().unwrap()).unwrap();
        assert!(settlement.success);
        assert_eq!(settlement.transaction, "");
        assert_eq!(body_string(response).await, "{\"x\":1}");
    }

    #[tokio::test]
    async fn test_invalid_verification_is_402_with_reason() {
        let facilitator = Arc::new(MockFacilitator::verify_invalid("expired_authorization"));
        let gate = PaymentGate::new(Arc::clone(&facilitator) as _, vec![requirement()]);
        let calls = Arc::new(AtomicUsize::new(0));

        let response = gate
            .handle(
                &[requirement()],
                handler(StatusCode::OK, Arc::clone(&calls)),
                paid_request(),
            )
            .await;

        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(body_string(response).await.contains("expired_authorization"));
    }

    #[tokio::test]
    async fn test_verify_transport_failure_without_fallback_is_503() {
        let facilitator = Arc::new(MockFacilitator::verify_unreachable());
        let gate = PaymentGate::new(Arc::clone(&facilitator) as _, vec![requirement()]);
        let calls = Arc::new(AtomicUsize::new(0));

        let response = gate
            .handle(
                &[requirement()],
                handler(StatusCode::OK, Arc::clone(&calls)),
                paid_request(),
            )
            .await;

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fallback_facilitator_takes_over() {
        let primary = Arc::new(MockFacilitator::verify_unreachable());
        let fallback = Arc::new(MockFacilitator::ok());
        let gate = PaymentGate::new(Arc::clone(&primary) as _, vec![requirement()])
            .with_fallback(Arc::clone(&fallback) as _);
        let calls = Arc::new(AtomicUsize::new(0));

        let response = gate
            .handle(
                &[requirement()],
                handler(StatusCode::OK, Arc::clone(&calls)),
                paid_request(),
            )
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(primary.verify_calls.load(Ordering::SeqCst), 1);
        assert_eq!(fallback.verify_calls.load(Ordering::SeqCst), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_handler_sees_verified_payment_extension() {
        let facilitator = Arc::new(MockFacilitator::ok());
        let gate = PaymentGate::new(Arc::clone(&facilitator) as _, vec![requirement()]);

        let inner = service_fn(|req: Request| async move {
            let payer = req
                .extensions()
                .get::<VerifiedPayment>()
                .and_then(|v| v.0.payer.clone())
                .unwrap_or_default();
            Ok::<_, Infallible>((StatusCode::OK, payer).into_response())
        });

        let response = gate.handle(&[requirement()], inner, paid_request()).await;
        assert_eq!(
            body_string(response).await,
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
        );
    }
}
