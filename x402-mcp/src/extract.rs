//! Helpers for x402 payment data in MCP `_meta` fields.

use serde_json::Value;
use x402::proto::responses::SettleResponse;
use x402::proto::v2::PaymentPayload;
use x402::proto::X402_VERSION;

use crate::{PAYMENT_META_KEY, PAYMENT_RESPONSE_META_KEY};

/// Extracts and validates a payment payload from a request's `_meta` map.
///
/// Returns `None` when no payment is present, the data is malformed, or the
/// protocol version is unsupported — the caller treats all three as "no
/// payment" and answers with a 402 error.
#[must_use]
pub fn payment_from_meta(meta: &serde_json::Map<String, Value>) -> Option<PaymentPayload> {
    let value = meta.get(PAYMENT_META_KEY)?;
    let payment: PaymentPayload = serde_json::from_value(value.clone()).ok()?;
    if payment.x402_version != X402_VERSION {
        return None;
    }
    Some(payment)
}

/// Attaches a payment payload to a params object's `_meta` map, creating the
/// map when absent.
///
/// # Errors
///
/// Returns the serialization error if the payload cannot be converted.
pub fn attach_payment_to_params(
    params: &mut Value,
    payment: &PaymentPayload,
) -> Result<(), serde_json::Error> {
    let payment_value = serde_json::to_value(payment)?;
    if !params.is_object() {
        *params = Value::Object(serde_json::Map::new());
    }
    let meta = params
        .as_object_mut()
        .expect("params is an object")
        .entry("_meta")
        .or_insert_with(|| Value::Object(serde_json::Map::new()));
    if !meta.is_object() {
        *meta = Value::Object(serde_json::Map::new());
    }
    meta.as_object_mut()
        .expect("meta is an object")
        .insert(PAYMENT_META_KEY.to_owned(), payment_value);
    Ok(())
}

/// Extracts a settlement response from a result's `_meta` map.
#[must_use]
pub fn settlement_from_result(result: &Value) -> Option<SettleResponse> {
    let value = result.get("_meta")?.get(PAYMENT_RESPONSE_META_KEY)?;
    serde_json::from_value(value.clone()).ok()
}

/// Injects a settlement response into a result's `_meta` map.
pub fn attach_settlement_to_result(result: &mut Value, settlement: &SettleResponse) {
    let Ok(value) = serde_json::to_value(settlement) else {
        return;
    };
    if !result.is_object() {
        return;
    }
    let meta = result
        .as_object_mut()
        .expect("result is an object")
        .entry("_meta")
        .or_insert_with(|| Value::Object(serde_json::Map::new()));
    if let Some(meta) = meta.as_object_mut() {
        meta.insert(PAYMENT_RESPONSE_META_KEY.to_owned(), value);
    }
}

/// Returns the resource URL for a tool: the custom URL when given, otherwise
/// `mcp://tools/{name}`.
#[must_use]
pub fn tool_resource_url(tool_name: &str, custom_url: Option<&str>) -> String {
    custom_url.map_or_else(|| format!("mcp://tools/{tool_name}"), str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use x402::proto::v2::{ExactPayload, PaymentRequirements, SvmPayload};

    fn payment(version: u32) -> PaymentPayload {
        PaymentPayload {
            x402_version: version,
            resource: None,
            accepted: PaymentRequirements {
                scheme: "exact".into(),
                network: "eip155:84532".into(),
                amount: "1".into(),
                asset: "0x036CbD53842c5426634e7929541eC2318f3dCF7e".into(),
                pay_to: "0x209693Bc6afc0C5328bA36FaF03C514EF312287C".into(),
                max_timeout_seconds: 60,
                extra: None,
            },
            payload: ExactPayload::Svm(SvmPayload {
                transaction: "AQ==".into(),
            }),
            extensions: None,
        }
    }

    #[test]
    fn test_payment_meta_roundtrip() {
        let mut params = serde_json::json!({"name": "paid_tool"});
        attach_payment_to_params(&mut params, &payment(X402_VERSION)).unwrap();

        let meta = params["_meta"].as_object().unwrap();
        let extracted = payment_from_meta(meta).unwrap();
        assert_eq!(extracted, payment(X402_VERSION));
    }

    #[test]
    fn test_payment_from_meta_rejects_wrong_version() {
        let mut params = serde_json::json!({"name": "paid_tool"});
        attach_payment_to_params(&mut params, &payment(1)).unwrap();
        assert!(payment_from_meta(params["_meta"].as_object().unwrap()).is_none());

        assert!(payment_from_meta(&serde_json::Map::new()).is_none());
    }

    #[test]
    fn test_settlement_roundtrip() {
        let settlement = SettleResponse::succeeded("0x1234", "eip155:84532");
        let mut result = serde_json::json!({"content": []});
        attach_settlement_to_result(&mut result, &settlement);
        assert_eq!(settlement_from_result(&result).unwrap(), settlement);
    }

    #[test]
    fn test_tool_resource_url() {
        assert_eq!(tool_resource_url("paid_tool", None), "mcp://tools/paid_tool");
        assert_eq!(
            tool_resource_url("paid_tool", Some("https://api.example.com/tool")),
            "https://api.example.com/tool"
        );
    }
}
