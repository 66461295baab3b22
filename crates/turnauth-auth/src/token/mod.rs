//! Token-service and token-provider contracts.
//!
//! Handlers never talk HTTP themselves. The user token service
//! ([`UserTokenClient`]) drives interactive OAuth, while access token
//! providers resolved through the [`ConnectionManager`] perform
//! on-behalf-of and agentic exchanges. The [`obo`] submodule holds the
//! on-behalf-of layer shared by the interactive and connector handlers.

mod client;
mod connection;
pub mod obo;

use serde::{Deserialize, Serialize};
use turnauth_core::SignInResource;

pub use client::UserTokenClient;
pub use connection::{AccessTokenProvider, ConnectionManager};

/// A user token issued by the token service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserToken {
    pub connection_name: String,
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<String>,
}

impl UserToken {
    pub fn new(connection_name: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            connection_name: connection_name.into(),
            token: token.into(),
            expiration: None,
        }
    }
}

/// Either a token, when the user is already signed in, or what is needed to
/// prompt for sign-in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenOrSignInResource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_response: Option<UserToken>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sign_in_resource: Option<SignInResource>,
}

impl TokenOrSignInResource {
    pub fn with_token(token: UserToken) -> Self {
        Self {
            token_response: Some(token),
            sign_in_resource: None,
        }
    }

    pub fn with_sign_in_resource(resource: SignInResource) -> Self {
        Self {
            token_response: None,
            sign_in_resource: Some(resource),
        }
    }

    /// The token, ignoring empty strings.
    pub fn token(&self) -> Option<&str> {
        self.token_response
            .as_ref()
            .map(|t| t.token.as_str())
            .filter(|t| !t.is_empty())
    }
}

/// Payload forwarded to the token service during SSO token exchange.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenExchangeRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}
