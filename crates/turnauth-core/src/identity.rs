//! Identity of the caller that delivered the activity.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Claim names read by the engine.
pub mod claims {
    pub const AUDIENCE: &str = "aud";
    pub const APP_ID: &str = "appid";
    pub const AUTHORIZED_PARTY: &str = "azp";
}

/// Claims extracted from the inbound request's bearer token.
///
/// `token` is the raw bearer token when the host keeps it; delegated-identity
/// handlers exchange it on behalf of the user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimsIdentity {
    pub is_authenticated: bool,

    #[serde(default)]
    pub claims: HashMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl ClaimsIdentity {
    pub fn new(is_authenticated: bool) -> Self {
        Self {
            is_authenticated,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_claim(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.claims.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn claim(&self, name: &str) -> Option<&str> {
        self.claims.get(name).map(String::as_str)
    }

    pub fn audience(&self) -> Option<&str> {
        self.claim(claims::AUDIENCE)
    }

    /// Calling application id (`appid`, falling back to `azp`).
    pub fn app_id(&self) -> Option<&str> {
        self.claim(claims::APP_ID)
            .or_else(|| self.claim(claims::AUTHORIZED_PARTY))
    }
}
