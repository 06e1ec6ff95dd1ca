//! `tower` layer wiring for the payment gate.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum_core::extract::Request;
use axum_core::response::Response;
use tokio::sync::OnceCell;
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service};
use x402::proto::v2::PaymentRequirements;

use super::gate::PaymentGate;
use crate::facilitator::enrich_requirements;

/// Layer that wraps a route service with payment enforcement.
///
/// Requirement enrichment (merging the facilitator's `/supported` extras,
/// e.g. the SVM `feePayer`) runs once, lazily, on the first gated request and
/// is cached for the layer's lifetime.
#[derive(Clone)]
pub struct PaymentGateLayer {
    gate: Arc<PaymentGate>,
    enriched: Arc<OnceCell<Arc<Vec<PaymentRequirements>>>>,
}

impl std::fmt::Debug for PaymentGateLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentGateLayer")
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

impl PaymentGateLayer {
    /// Creates a layer around the given gate.
    #[must_use]
    pub fn new(gate: PaymentGate) -> Self {
        Self {
            gate: Arc::new(gate),
            enriched: Arc::new(OnceCell::new()),
        }
    }
}

impl<S> Layer<S> for PaymentGateLayer
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
{
    type Service = PaymentGateService;

    fn layer(&self, inner: S) -> Self::Service {
        PaymentGateService {
            gate: Arc::clone(&self.gate),
            enriched: Arc::clone(&self.enriched),
            inner: BoxCloneSyncService::new(inner),
        }
    }
}

/// Service produced by [`PaymentGateLayer`].
#[derive(Clone)]
pub struct PaymentGateService {
    gate: Arc<PaymentGate>,
    enriched: Arc<OnceCell<Arc<Vec<PaymentRequirements>>>>,
    inner: BoxCloneSyncService<Request, Response, Infallible>,
}

impl std::fmt::Debug for PaymentGateService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentGateService")
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

impl Service<Request> for PaymentGateService {
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let gate = Arc::clone(&self.gate);
        let enriched = Arc::clone(&self.enriched);
        let inner = self.inner.clone();

        Box::pin(async move {
            let enriched = enriched
                .get_or_init(|| async {
                    Arc::new(
                        enrich_requirements(gate.facilitator().as_ref(), gate.requirements()).await,
                    )
                })
                .await
                .clone();

            Ok(gate.handle(&enriched, inner, req).await)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use tower::{service_fn, ServiceExt};
    use x402::proto::v2::PaymentRequirements;

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

    #[tokio::test]
    async fn test_layer_gates_via_oneshot() {
        // A facilitator client pointed at a closed port: enrichment fails
        // softly and the gate still returns 402 for unpaid requests.
        let layer = crate::server::GateConfig::new("http://127.0.0.1:1", vec![requirement()])
            .build()
            .unwrap();

        let service = layer.layer(service_fn(|_req: Request| async {
            Ok::<_, Infallible>(axum_core::response::IntoResponse::into_response("ok"))
        }));

        let response = service
            .oneshot(
                Request::builder()
                    .uri("http://api.example.com/paid")
                    .body(axum_core::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    }
}
