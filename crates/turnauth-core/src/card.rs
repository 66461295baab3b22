//! Sign-in prompt content handed to the channel for rendering.

use serde::{Deserialize, Serialize};

/// Resource that lets a client perform a platform-native token exchange.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenExchangeResource {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub provider_id: Option<String>,
}

/// Resource the token service hands back when the user must sign in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInResource {
    pub sign_in_link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_exchange_resource: Option<TokenExchangeResource>,
}

/// Content of a sign-in prompt; rendering is up to the sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInCard {
    pub title: String,
    pub text: String,
    pub connection_name: String,
    pub resource: SignInResource,
}
