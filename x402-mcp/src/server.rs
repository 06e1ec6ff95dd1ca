//! Payment gating for MCP JSON-RPC servers.
//!
//! [`McpGate`] fronts an MCP HTTP handler and intercepts `tools/call`
//! requests for configured tools. The pipeline mirrors the HTTP middleware —
//! extract → match → verify → execute → settle — but payment travels inside
//! the JSON-RPC envelope and failures are JSON-RPC error objects over
//! HTTP 200. A tool handler that returns a JSON-RPC `error` is forwarded
//! untouched and never settled.

use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum_core::body::Body;
use axum_core::extract::Request;
use axum_core::response::{IntoResponse, Response};
use bytes::Bytes;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderValue, Method, StatusCode};
use http_body_util::BodyExt;
use tokio::sync::OnceCell;
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service};
use x402::error::PaymentError;
use x402::facilitator::{enrich_requirements, Facilitator};
use x402::proto::responses::{SettleResponse, VerifyResponse};
use x402::proto::v2::{PaymentPayload, PaymentRequirements, ResourceInfo};
use x402::proto::X402_VERSION;
use x402::selector::find_matching_requirement;

use crate::extract::{
    attach_settlement_to_result, payment_from_meta, tool_resource_url,
};
use crate::types::{CallToolParams, JsonRpcRequest, JsonRpcResponse};
use crate::{INTERNAL_ERROR_CODE, INVALID_PARAMS_CODE, PARSE_ERROR_CODE, PAYMENT_REQUIRED_CODE,
    PAYMENT_RESPONSE_META_KEY,
};

/// Payment configuration for one MCP tool.
#[derive(Debug, Clone, Default)]
pub struct ToolGateConfig {
    /// Resource metadata; when the URL is empty, `mcp://tools/{name}` is
    /// used.
    pub resource: Option<ResourceInfo>,

    /// Accepted payment options for the tool. Non-empty.
    pub requirements: Vec<PaymentRequirements>,
}

/// Payment gate for MCP tool calls.
pub struct McpGate {
    facilitator: Arc<dyn Facilitator>,
    fallback: Option<Arc<dyn Facilitator>>,
    tools: HashMap<String, ToolGateConfig>,
    verify_only: bool,
}

impl std::fmt::Debug for McpGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpGate")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .field("has_fallback", &self.fallback.is_some())
            .field("verify_only", &self.verify_only)
            .finish_non_exhaustive()
    }
}

impl McpGate {
    /// Creates a gate over the given facilitator and tool configurations.
    /// Tools absent from the map are free and pass through untouched.
    #[must_use]
    pub fn new(facilitator: Arc<dyn Facilitator>, tools: HashMap<String, ToolGateConfig>) -> Self {
        Self {
            facilitator,
            fallback: None,
            tools,
            verify_only: false,
        }
    }

    /// Sets a backup facilitator, tried when the primary errors.
    #[must_use]
    pub fn with_fallback(mut self, fallback: Arc<dyn Facilitator>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Suppresses settlement; verified calls succeed with a synthetic
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

    /// Returns the configured tools.
    #[must_use]
    pub const fn tools(&self) -> &HashMap<String, ToolGateConfig> {
        &self.tools
    }

    /// Handles one request through the gating pipeline.
    pub async fn handle<S>(
        &self,
        enriched: &HashMap<String, Vec<PaymentRequirements>>,
        mut inner: S,
        req: Request,
    ) -> Response
    where
        S: Service<Request, Response = Response, Error = Infallible> + Send,
        S::Future: Send,
    {
        if req.method() != Method::POST {
            return call_inner(&mut inner, req).await;
        }

        let (parts, body) = req.into_parts();
        let bytes = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(_) => return error_response(None, PARSE_ERROR_CODE, "Parse error", None),
        };

        let Ok(rpc) = serde_json::from_slice::<JsonRpcRequest>(&bytes) else {
            return error_response(None, PARSE_ERROR_CODE, "Parse error", None);
        };

        if rpc.method != "tools/call" {
            let req = Request::from_parts(parts, Body::from(bytes));
            return call_inner(&mut inner, req).await;
        }

        let params: CallToolParams = match rpc
            .params
            .clone()
            .map_or_else(|| Ok(CallToolParams::default()), serde_json::from_value)
        {
            Ok(params) => params,
            Err(_) => return error_response(rpc.id, INVALID_PARAMS_CODE, "Invalid params", None),
        };

        let Some(tool) = self.tools.get(&params.name) else {
            let req = Request::from_parts(parts, Body::from(bytes));
            return call_inner(&mut inner, req).await;
        };

        let requirements = enriched
            .get(&params.name)
            .map_or_else(|| tool.requirements.clone(), Clone::clone);
        let resource = resolve_tool_resource(&params.name, tool);

        let Some(payment) = params.meta.as_ref().and_then(payment_from_meta) else {
            tracing::info!(tool = %params.name, "no payment provided for paid tool");
            return payment_required_error(rpc.id, &resource, &requirements);
        };

        let requirement = match find_matching_requirement(&payment, &requirements) {
            Ok(requirement) => requirement,
            Err(err) => {
                return error_response(
                    rpc.id,
                    PAYMENT_REQUIRED_CODE,
                    format!("Payment invalid: {err}"),
                    None,
                );
            }
        };

        let verify = match self.verify_with_fallback(&payment, requirement).await {
            Ok(verify) => verify,
            Err(err) => {
                tracing::error!(error = %err, "facilitator verification failed");
                return error_response(
                    rpc.id,
                    INTERNAL_ERROR_CODE,
                    format!("Verification failed: {err}"),
                    None,
                );
            }
        };
        if !verify.is_valid {
            let reason = verify.invalid_reason.as_deref().unwrap_or("unknown");
            tracing::warn!(reason, "payment rejected");
            return error_response(
                rpc.id,
                PAYMENT_REQUIRED_CODE,
                format!("Payment invalid: {reason}"),
                None,
            );
        }

        let req = Request::from_parts(parts, Body::from(bytes));
        let response = call_inner(&mut inner, req).await;
        self.settle_and_inject(rpc.id, &payment, requirement, &verify, response)
            .await
    }

    /// Runs the settle-and-inject half of the pipeline on the handler's
    /// response. A handler error skips settlement entirely.
    async fn settle_and_inject(
        &self,
        id: Option<serde_json::Value>,
        payment: &PaymentPayload,
        requirement: &PaymentRequirements,
        verify: &VerifyResponse,
        response: Response,
    ) -> Response {
        let (mut parts, body) = response.into_parts();
        let bytes = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(_) => {
                return error_response(
                    id,
                    INTERNAL_ERROR_CODE,
                    "Failed to read handler response",
                    None,
                );
            }
        };

        let Ok(mut rpc_response) = serde_json::from_slice::<JsonRpcResponse>(&bytes) else {
            tracing::error!("failed to parse MCP response, skipping settlement");
            return rebuild_response(parts, bytes);
        };

        if rpc_response.error.is_some() {
            tracing::info!("execution failed, payment will not be settled");
            return rebuild_response(parts, bytes);
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
            match self.settle_with_fallback(payment, requirement).await {
                Ok(settlement) if settlement.success => {
                    tracing::info!(transaction = %settlement.transaction, "payment settled");
                    settlement
                }
                Ok(settlement) => {
                    let reason = settlement
                        .error_reason
                        .clone()
                        .unwrap_or_else(|| "unknown reason".to_owned());
                    return settlement_failed_error(id, &reason, payment, verify);
                }
                Err(err) => {
                    return settlement_failed_error(id, &err.to_string(), payment, verify);
                }
            }
        };

        if let Some(result) = &mut rpc_response.result {
            attach_settlement_to_result(result, &settlement);
        }

        match serde_json::to_vec(&rpc_response) {
            Ok(bytes) => {
                parts.headers.remove(CONTENT_LENGTH);
                rebuild_response(parts, Bytes::from(bytes))
            }
            Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, Body::empty()).into_response(),
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
}

async fn call_inner<S>(inner: &mut S, req: Request) -> Response
where
    S: Service<Request, Response = Response, Error = Infallible> + Send,
    S::Future: Send,
{
    match inner.call(req).await {
        Ok(response) => response,
        Err(never) => match never {},
    }
}

fn resolve_tool_resource(tool_name: &str, tool: &ToolGateConfig) -> ResourceInfo {
    let mut resource = tool.resource.clone().unwrap_or_default();
    if resource.url.is_empty() {
        resource.url = tool_resource_url(tool_name, None);
    }
    resource
}

fn payment_required_error(
    id: Option<serde_json::Value>,
    resource: &ResourceInfo,
    accepts: &[PaymentRequirements],
) -> Response {
    let data = serde_json::json!({
        "x402Version": X402_VERSION,
        "error": "Payment required to access this resource",
        "resource": resource,
        "accepts": accepts,
    });
    error_response(id, PAYMENT_REQUIRED_CODE, "Payment required", Some(data))
}

fn settlement_failed_error(
    id: Option<serde_json::Value>,
    reason: &str,
    payment: &PaymentPayload,
    verify: &VerifyResponse,
) -> Response {
    let failure = SettleResponse {
        success: false,
        error_reason: Some(reason.to_owned()),
        error_message: None,
        transaction: String::new(),
        network: payment.accepted.network.clone(),
        payer: verify.payer.clone(),
    };
    tracing::error!(reason, "settlement failed");
    error_response(
        id,
        INTERNAL_ERROR_CODE,
        format!("Settlement failed: {reason}"),
        Some(serde_json::json!({ PAYMENT_RESPONSE_META_KEY: failure })),
    )
}

/// JSON-RPC errors travel over HTTP 200.
fn error_response(
    id: Option<serde_json::Value>,
    code: i64,
    message: impl Into<String>,
    data: Option<serde_json::Value>,
) -> Response {
    let body = JsonRpcResponse::error(id, code, message, data);
    let bytes = serde_json::to_vec(&body).unwrap_or_default();
    (
        StatusCode::OK,
        [(CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        Body::from(bytes),
    )
        .into_response()
}

fn rebuild_response(parts: http::response::Parts, bytes: Bytes) -> Response {
    Response::from_parts(parts, Body::from(bytes))
}

/// Layer wrapping an MCP JSON-RPC handler with payment enforcement.
///
/// Each tool's requirements are enriched from the facilitator's `/supported`
/// data once, lazily, on the first request.
#[derive(Clone)]
pub struct McpGateLayer {
    gate: Arc<McpGate>,
    enriched: Arc<OnceCell<Arc<HashMap<String, Vec<PaymentRequirements>>>>>,
}

impl std::fmt::Debug for McpGateLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpGateLayer")
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

impl McpGateLayer {
    /// Creates a layer around the given gate.
    #[must_use]
    pub fn new(gate: McpGate) -> Self {
        Self {
            gate: Arc::new(gate),
            enriched: Arc::new(OnceCell::new()),
        }
    }
}

impl<S> Layer<S> for McpGateLayer
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
{
    type Service = McpGateService;

    fn layer(&self, inner: S) -> Self::Service {
        McpGateService {
            gate: Arc::clone(&self.gate),
            enriched: Arc::clone(&self.enriched),
            inner: BoxCloneSyncService::new(inner),
        }
    }
}

/// Service produced by [`McpGateLayer`].
#[derive(Clone)]
pub struct McpGateService {
    gate: Arc<McpGate>,
    enriched: Arc<OnceCell<Arc<HashMap<String, Vec<PaymentRequirements>>>>>,
    inner: BoxCloneSyncService<Request, Response, Infallible>,
}

impl std::fmt::Debug for McpGateService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpGateService")
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

impl Service<Request> for McpGateService {
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
                    let mut map = HashMap::new();
                    for (name, tool) in gate.tools() {
                        let reqs = enrich_requirements(
                            gate.facilitator().as_ref(),
                            &tool.requirements,
                        )
                        .await;
                        map.insert(name.clone(), reqs);
                    }
                    Arc::new(map)
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
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::service_fn;
    use x402::proto::responses::SupportedResponse;
    use x402::proto::v2::{ExactPayload, SvmPayload};
    use x402::signer::BoxFuture;

    struct MockFacilitator {
        verify_result: Result<VerifyResponse, ()>,
        settle_result: Result<SettleResponse, ()>,
        settle_calls: AtomicUsize,
    }

    impl MockFacilitator {
        fn ok() -> Self {
            Self {
                verify_result: Ok(VerifyResponse::valid(
                    "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266",
                )),
                settle_result: Ok(SettleResponse::succeeded("0x1234abcd", "eip155:84532")),
                settle_calls: AtomicUsize::new(0),
            }
        }

        fn settle_rejects(reason: &str) -> Self {
            Self {
                settle_result: Ok(SettleResponse::failed(reason, "eip155:84532")),
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
            let result = self.verify_result.clone().map_err(|()| {
                PaymentError::new(x402::ErrorCode::FacilitatorUnavailable, "unreachable")
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
                PaymentError::new(x402::ErrorCode::FacilitatorUnavailable, "unreachable")
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

    fn gate(facilitator: Arc<MockFacilitator>) -> McpGate {
        let tools = HashMap::from([(
            "paid_tool".to_string(),
            ToolGateConfig {
                resource: None,
                requirements: vec![requirement()],
            },
        )]);
        McpGate::new(facilitator, tools)
    }

    fn enriched() -> HashMap<String, Vec<PaymentRequirements>> {
        HashMap::from([("paid_tool".to_string(), vec![requirement()])])
    }

    fn rpc_request(tool: &str, with_payment: bool) -> Request {
        let mut params = serde_json::json!({ "name": tool, "arguments": {} });
        if with_payment {
            crate::extract::attach_payment_to_params(&mut params, &payment()).unwrap();
        }
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": "tools/call",
            "id": 1,
            "params": params,
        });
        Request::builder()
            .method(Method::POST)
            .uri("http://mcp.example.com/rpc")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap()
    }

    fn tool_handler(
        calls: Arc<AtomicUsize>,
        result: serde_json::Value,
    ) -> impl Service<Request, Response = Response, Error = Infallible, Future: Send> + Send {
        service_fn(move |_req: Request| {
            let calls = Arc::clone(&calls);
            let result = result.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                let body = serde_json::json!({ "jsonrpc": "2.0", "id": 1, "result": result });
                Ok((StatusCode::OK, serde_json::to_vec(&body).unwrap()).into_response())
            }
        })
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_missing_payment_gets_402_error_over_200() {
        let facilitator = Arc::new(MockFacilitator::ok());
        let gate = gate(Arc::clone(&facilitator));
        let calls = Arc::new(AtomicUsize::new(0));

        let response = gate
            .handle(
                &enriched(),
                tool_handler(Arc::clone(&calls), serde_json::json!({"content": []})),
                rpc_request("paid_tool", false),
            )
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], 402);
        assert_eq!(body["error"]["data"]["x402Version"], 2);
        assert_eq!(
            body["error"]["data"]["resource"]["url"],
            "mcp://tools/paid_tool"
        );
        assert_eq!(
            body["error"]["data"]["accepts"][0]["network"],
            "eip155:84532"
        );
    }

    #[tokio::test]
    async fn test_paid_call_injects_settlement_meta() {
        let facilitator = Arc::new(MockFacilitator::ok());
        let gate = gate(Arc::clone(&facilitator));
        let calls = Arc::new(AtomicUsize::new(0));

        let response = gate
            .handle(
                &enriched(),
                tool_handler(
                    Arc::clone(&calls),
                    serde_json::json!({"content": [{"type": "text", "text": "hi"}]}),
                ),
                rpc_request("paid_tool", true),
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(facilitator.settle_calls.load(Ordering::SeqCst), 1);

        let body = json_body(response).await;
        assert_eq!(
            body["result"]["_meta"][PAYMENT_RESPONSE_META_KEY]["transaction"],
            "0x1234abcd"
        );
        assert_eq!(body["result"]["content"][0]["text"], "hi");
    }

    #[tokio::test]
    async fn test_tool_error_skips_settlement() {
        let facilitator = Arc::new(MockFacilitator::ok());
        let gate = gate(Arc::clone(&facilitator));

        let inner = service_fn(move |_req: Request| async move {
            let body = serde_json::json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": {"code": -32000, "message": "tool exploded"},
            });
            Ok::<_, Infallible>(
                (StatusCode::OK, serde_json::to_vec(&body).unwrap()).into_response(),
            )
        });

        let response = gate
            .handle(&enriched(), inner, rpc_request("paid_tool", true))
            .await;

        assert_eq!(facilitator.settle_calls.load(Ordering::SeqCst), 0);
        let body = json_body(response).await;
        assert_eq!(body["error"]["message"], "tool exploded");
    }

    #[tokio::test]
    async fn test_free_tool_and_other_methods_pass_through() {
        let facilitator = Arc::new(MockFacilitator::ok());
        let gate = gate(Arc::clone(&facilitator));
        let calls = Arc::new(AtomicUsize::new(0));

        let response = gate
            .handle(
                &enriched(),
                tool_handler(Arc::clone(&calls), serde_json::json!({"content": []})),
                rpc_request("free_tool", false),
            )
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let body = json_body(response).await;
        assert!(body.get("error").is_none());

        let list = Request::builder()
            .method(Method::POST)
            .uri("http://mcp.example.com/rpc")
            .body(Body::from(
                serde_json::to_vec(&serde_json::json!({
                    "jsonrpc": "2.0", "method": "tools/list", "id": 2
                }))
                .unwrap(),
            ))
            .unwrap();
        gate.handle(
            &enriched(),
            tool_handler(Arc::clone(&calls), serde_json::json!({"content": []})),
            list,
        )
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_verify_only_synthesizes_settlement() {
        let facilitator = Arc::new(MockFacilitator::ok());
        let gate = gate(Arc::clone(&facilitator)).with_verify_only(true);
        let calls = Arc::new(AtomicUsize::new(0));

        let response = gate
            .handle(
                &enriched(),
                tool_handler(Arc::clone(&calls), serde_json::json!({"content": []})),
                rpc_request("paid_tool", true),
            )
            .await;

        assert_eq!(facilitator.settle_calls.load(Ordering::SeqCst), 0);
        let body = json_body(response).await;
        let settlement = &body["result"]["_meta"][PAYMENT_RESPONSE_META_KEY];
        assert_eq!(settlement["success"], true);
        assert_eq!(settlement["transaction"], "");
    }

    #[tokio::test]
    async fn test_settlement_failure_becomes_rpc_error() {
        let facilitator = Arc::new(MockFacilitator::settle_rejects("insufficient_funds"));
        let gate = gate(Arc::clone(&facilitator));
        let calls = Arc::new(AtomicUsize::new(0));

        let response = gate
            .handle(
                &enriched(),
                tool_handler(
                    Arc::clone(&calls),
                    serde_json::json!({"content": [{"type": "text", "text": "secret"}]}),
                ),
                rpc_request("paid_tool", true),
            )
            .await;

        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], INTERNAL_ERROR_CODE);
        assert_eq!(
            body["error"]["data"][PAYMENT_RESPONSE_META_KEY]["success"],
            false
        );
        // The tool's output is not leaked on a failed settlement.
        assert!(body.get("result").is_none());
    }

    #[tokio::test]
    async fn test_wrong_version_payment_treated_as_missing() {
        let facilitator = Arc::new(MockFacilitator::ok());
        let gate = gate(Arc::clone(&facilitator));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut params = serde_json::json!({ "name": "paid_tool", "arguments": {} });
        let mut old = payment();
        old.x402_version = 1;
        crate::extract::attach_payment_to_params(&mut params, &old).unwrap();
        let body = serde_json::json!({
            "jsonrpc": "2.0", "method": "tools/call", "id": 1, "params": params,
        });
        let request = Request::builder()
            .method(Method::POST)
            .uri("http://mcp.example.com/rpc")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();

        let response = gate
            .handle(
                &enriched(),
                tool_handler(Arc::clone(&calls), serde_json::json!({"content": []})),
                request,
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], 402);
    }
}
