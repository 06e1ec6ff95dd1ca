//! HTTP client for x402 facilitator services.
//!
//! Speaks the three facilitator endpoints — `POST /verify`, `POST /settle`,
//! `GET /supported` — with per-operation timeouts, retry-with-backoff on
//! availability failures, static or dynamic authorization, and lifecycle
//! hooks around verify and settle.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::Serialize;
use x402::config::TimeoutConfig;
use x402::error::{ErrorCode, PaymentError};
use x402::facilitator::Facilitator;
use x402::proto::responses::{
    SettleRequest, SettleResponse, SupportedResponse, VerifyRequest, VerifyResponse,
};
use x402::proto::v2::{PaymentPayload, PaymentRequirements};
use x402::proto::X402_VERSION;
use x402::signer::BoxFuture;

use crate::retry::{with_retry, RetryPolicy};

/// How the `Authorization` header is produced for facilitator requests.
///
/// The provider variant is called once per attempt, including retries, and
/// must be safe for concurrent use.
#[derive(Clone)]
pub enum Authorization {
    /// A fixed header value (e.g., `"Bearer …"` or `"Basic …"`).
    Static(String),
    /// A callback producing the header value for each outgoing request.
    Provider(Arc<dyn Fn(&reqwest::Request) -> String + Send + Sync>),
}

impl std::fmt::Debug for Authorization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static(_) => f.write_str("Authorization::Static(..)"),
            Self::Provider(_) => f.write_str("Authorization::Provider(..)"),
        }
    }
}

impl Authorization {
    fn value(&self, request: &reqwest::Request) -> String {
        match self {
            Self::Static(value) => value.clone(),
            Self::Provider(provider) => provider(request),
        }
    }
}

/// Callback invoked before a verify or settle operation; an `Err` aborts the
/// operation and the caller sees that error verbatim.
pub type OnBeforeHook =
    Arc<dyn Fn(&PaymentPayload, &PaymentRequirements) -> Result<(), PaymentError> + Send + Sync>;

/// Callback invoked after a verify operation with its final outcome.
pub type OnAfterVerifyHook = Arc<
    dyn Fn(&PaymentPayload, &PaymentRequirements, Result<&VerifyResponse, &PaymentError>)
        + Send
        + Sync,
>;

/// Callback invoked after a settle operation with its final outcome.
pub type OnAfterSettleHook = Arc<
    dyn Fn(&PaymentPayload, &PaymentRequirements, Result<&SettleResponse, &PaymentError>)
        + Send
        + Sync,
>;

/// Client for a remote x402 facilitator.
pub struct FacilitatorClient {
    base_url: String,
    http: reqwest::Client,
    timeouts: TimeoutConfig,
    retry: RetryPolicy,
    authorization: Option<Authorization>,
    on_before_verify: Option<OnBeforeHook>,
    on_after_verify: Option<OnAfterVerifyHook>,
    on_before_settle: Option<OnBeforeHook>,
    on_after_settle: Option<OnAfterSettleHook>,
}

impl std::fmt::Debug for FacilitatorClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FacilitatorClient")
            .field("base_url", &self.base_url)
            .field("timeouts", &self.timeouts)
            .field("retry", &self.retry)
            .field("has_authorization", &self.authorization.is_some())
            .finish_non_exhaustive()
    }
}

impl FacilitatorClient {
    /// Creates a client for the facilitator at `base_url` (trailing slashes
    /// are stripped) with default timeouts and no retries.
    ///
    /// # Panics
    ///
    /// Panics if the underlying HTTP client cannot be constructed.
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        let timeouts = TimeoutConfig::default();
        let http = reqwest::Client::builder()
            .timeout(timeouts.request)
            .build()
            .expect("failed to build reqwest::Client");
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            http,
            timeouts,
            retry: RetryPolicy::default(),
            authorization: None,
            on_before_verify: None,
            on_after_verify: None,
            on_before_settle: None,
            on_after_settle: None,
        }
    }

    /// Replaces the timeout configuration. The overall request timeout
    /// becomes the HTTP client's default; verify and settle apply their own
    /// per-request timeouts.
    ///
    /// # Panics
    ///
    /// Panics if the underlying HTTP client cannot be constructed.
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.http = reqwest::Client::builder()
            .timeout(timeouts.request)
            .build()
            .expect("failed to build reqwest::Client");
        self.timeouts = timeouts;
        self
    }

    /// Sets the retry policy for availability failures.
    #[must_use]
    pub fn with_retry(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.retry = RetryPolicy::new(max_retries, retry_delay);
        self
    }

    /// Sets the authorization source.
    #[must_use]
    pub fn with_authorization(mut self, authorization: Authorization) -> Self {
        self.authorization = Some(authorization);
        self
    }

    /// Installs verify lifecycle hooks.
    #[must_use]
    pub fn with_verify_hooks(
        mut self,
        before: Option<OnBeforeHook>,
        after: Option<OnAfterVerifyHook>,
    ) -> Self {
        self.on_before_verify = before;
        self.on_after_verify = after;
        self
    }

    /// Installs settle lifecycle hooks.
    #[must_use]
    pub fn with_settle_hooks(
        mut self,
        before: Option<OnBeforeHook>,
        after: Option<OnAfterSettleHook>,
    ) -> Self {
        self.on_before_settle = before;
        self.on_after_settle = after;
        self
    }

    /// Returns the facilitator base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
        timeout: Duration,
        failure: ErrorCode,
    ) -> Result<T, PaymentError> {
        let mut request = self
            .http
            .post(format!("{}{path}", self.base_url))
            .timeout(timeout)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .json(body)
            .build()
            .map_err(|e| {
                PaymentError::new(
                    ErrorCode::FacilitatorUnavailable,
                    format!("failed to build {path} request"),
                )
                .with_source(e)
            })?;
        self.apply_authorization(&mut request);

        let response = self.http.execute(request).await.map_err(|e| {
            PaymentError::new(
                ErrorCode::FacilitatorUnavailable,
                format!("facilitator {path} request failed"),
            )
            .with_source(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            return Err(parse_error_response(status.as_u16(), &body, failure));
        }

        response.json().await.map_err(|e| {
            PaymentError::new(failure, format!("failed to decode {path} response")).with_source(e)
        })
    }

    fn apply_authorization(&self, request: &mut reqwest::Request) {
        let Some(authorization) = &self.authorization else {
            return;
        };
        let value = authorization.value(request);
        if value.is_empty() {
            return;
        }
        match HeaderValue::from_str(&value) {
            Ok(header) => {
                request.headers_mut().insert(AUTHORIZATION, header);
            }
            Err(_) => tracing::warn!("authorization value is not a valid header, skipping"),
        }
    }

    async fn verify_inner(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<VerifyResponse, PaymentError> {
        if let Some(hook) = &self.on_before_verify {
            hook(payload, requirements)?;
        }

        let body = VerifyRequest {
            x402_version: X402_VERSION,
            payment_payload: payload.clone(),
            payment_requirements: requirements.clone(),
        };

        let result = with_retry(&self.retry, || {
            self.post_json::<VerifyResponse, _>(
                "/verify",
                &body,
                self.timeouts.verify,
                ErrorCode::VerificationFailed,
            )
        })
        .await
        .map(|mut resp| {
            if resp.payer.as_deref().is_none_or(str::is_empty) {
                resp.payer = infer_payer(payload);
            }
            resp
        });

        if let Some(hook) = &self.on_after_verify {
            hook(payload, requirements, result.as_ref());
        }

        result
    }

    async fn settle_inner(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<SettleResponse, PaymentError> {
        if let Some(hook) = &self.on_before_settle {
            hook(payload, requirements)?;
        }

        let body = SettleRequest {
            x402_version: X402_VERSION,
            payment_payload: payload.clone(),
            payment_requirements: requirements.clone(),
        };

        let result = with_retry(&self.retry, || {
            self.post_json::<SettleResponse, _>(
                "/settle",
                &body,
                self.timeouts.settle,
                ErrorCode::SettlementFailed,
            )
        })
        .await;

        if let Some(hook) = &self.on_after_settle {
            hook(payload, requirements, result.as_ref());
        }

        result
    }

    async fn supported_inner(&self) -> Result<SupportedResponse, PaymentError> {
        let mut request = self
            .http
            .get(format!("{}/supported", self.base_url))
            .timeout(self.timeouts.verify)
            .build()
            .map_err(|e| {
                PaymentError::new(
                    ErrorCode::FacilitatorUnavailable,
                    "failed to build /supported request",
                )
                .with_source(e)
            })?;
        self.apply_authorization(&mut request);

        let response = self.http.execute(request).await.map_err(|e| {
            PaymentError::new(
                ErrorCode::FacilitatorUnavailable,
                "facilitator /supported request failed",
            )
            .with_source(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PaymentError::new(
                ErrorCode::FacilitatorUnavailable,
                format!("supported endpoint failed: status {status}"),
            ));
        }

        response.json().await.map_err(|e| {
            PaymentError::new(
                ErrorCode::FacilitatorUnavailable,
                "failed to decode /supported response",
            )
            .with_source(e)
        })
    }
}

impl Facilitator for FacilitatorClient {
    fn verify<'a>(
        &'a self,
        payload: &'a PaymentPayload,
        requirements: &'a PaymentRequirements,
    ) -> BoxFuture<'a, Result<VerifyResponse, PaymentError>> {
        Box::pin(self.verify_inner(payload, requirements))
    }

    fn settle<'a>(
        &'a self,
        payload: &'a PaymentPayload,
        requirements: &'a PaymentRequirements,
    ) -> BoxFuture<'a, Result<SettleResponse, PaymentError>> {
        Box::pin(self.settle_inner(payload, requirements))
    }

    fn supported(&self) -> BoxFuture<'_, Result<SupportedResponse, PaymentError>> {
        Box::pin(self.supported_inner())
    }
}

/// Extracts error details from a non-200 facilitator response body.
///
/// Prefers the structured `invalidReason`/`errorReason` fields; otherwise
/// includes the raw body truncated to 500 bytes.
fn parse_error_response(status: u16, body: &[u8], failure: ErrorCode) -> PaymentError {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        for key in ["invalidReason", "errorReason"] {
            if let Some(reason) = value.get(key).and_then(|v| v.as_str()) {
                if !reason.is_empty() {
                    return PaymentError::new(
                        failure,
                        format!("status {status}, reason: {reason}"),
                    );
                }
            }
        }
    }

    if body.is_empty() {
        return PaymentError::new(failure, format!("status {status}"));
    }
    let truncated = &body[..body.len().min(500)];
    PaymentError::new(
        failure,
        format!("status {status}, body: {}", String::from_utf8_lossy(truncated)),
    )
}

/// Extracts the payer address from an EVM payment payload.
///
/// SVM payloads carry the payer inside the serialized transaction; the
/// facilitator reports it in its responses instead.
fn infer_payer(payload: &PaymentPayload) -> Option<String> {
    payload
        .payload
        .as_evm()
        .map(|evm| evm.authorization.from.clone())
}

pub use x402::facilitator::{enrich_requirements, merge_supported_extra};
