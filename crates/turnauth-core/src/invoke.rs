//! Invoke acknowledgements and the sign-in protocol payloads they carry.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// HTTP-style status codes used in invoke acknowledgements.
pub mod status_codes {
    pub const OK: u16 = 200;
    pub const BAD_REQUEST: u16 = 400;
    /// Tells the client the exchange could not complete yet; it may retry or
    /// fall back to the sign-in card.
    pub const PRECONDITION_FAILED: u16 = 412;
}

/// Synchronous reply to an invoke activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvokeResponse {
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl InvokeResponse {
    pub fn new(status: u16) -> Self {
        Self { status, body: None }
    }

    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Payload of a `signin/tokenExchange` invoke.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenExchangeInvokeRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub connection_name: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

/// Body of a token exchange acknowledgement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenExchangeInvokeResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub connection_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_detail: Option<String>,
}

/// Payload of a `signin/verifyState` invoke.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerifyStateInvokeRequest {
    #[serde(default)]
    pub state: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_token_exchange_request_from_value() {
        let request: TokenExchangeInvokeRequest = serde_json::from_value(json!({
            "id": "x-1",
            "connectionName": "graph",
            "token": "sso-token"
        }))
        .unwrap();
        assert_eq!(request.connection_name.as_deref(), Some("graph"));
        assert_eq!(request.token.as_deref(), Some("sso-token"));
    }

    #[test]
    fn test_invoke_response_success() {
        assert!(InvokeResponse::new(status_codes::OK).is_success());
        assert!(!InvokeResponse::new(status_codes::PRECONDITION_FAILED).is_success());
    }

    #[test]
    fn test_exchange_response_serializes_camel_case() {
        let body = serde_json::to_value(TokenExchangeInvokeResponse {
            id: Some("x-1".to_string()),
            connection_name: "graph".to_string(),
            failure_detail: Some("nope".to_string()),
        })
        .unwrap();
        assert_eq!(body["connectionName"], "graph");
        assert_eq!(body["failureDetail"], "nope");
    }
}
