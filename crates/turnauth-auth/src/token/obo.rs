//! On-behalf-of token exchange.
//!
//! Once a handler holds a base user token it may exchange it for a token
//! carrying downstream scopes. Only tokens issued for an exposed API (an
//! audience starting with `api://`) can be exchanged; anything else is a
//! configuration mistake and is reported before any network call.
//!
//! Audience inspection decodes the JWT payload without verifying the
//! signature. The token was already issued to this process by the token
//! service; the claim is only used to route the exchange.

use serde::Deserialize;
use serde_json::Value;

use super::ConnectionManager;
use crate::AuthResult;
use crate::error::AuthError;

/// Audience prefix of tokens that can be exchanged on-behalf-of.
pub const EXCHANGEABLE_AUDIENCE_PREFIX: &str = "api://";

/// Reads the `aud` claim of a JWT without verifying it.
///
/// An array audience yields its first entry.
///
/// # Errors
///
/// Returns a configuration error if the token is not a well-formed JWT.
pub fn token_audience(token: &str) -> AuthResult<Option<String>> {
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(AuthError::configuration(
            "token is not a JWT and cannot be exchanged on-behalf-of",
        ));
    }

    let payload = URL_SAFE_NO_PAD
        .decode(parts[1].trim_end_matches('='))
        .map_err(|_| AuthError::configuration("invalid JWT payload encoding"))?;

    #[derive(Deserialize)]
    struct AudienceClaim {
        #[serde(default)]
        aud: Option<Value>,
    }

    let claims: AudienceClaim = serde_json::from_slice(&payload)
        .map_err(|_| AuthError::configuration("invalid JWT payload JSON"))?;

    Ok(match claims.aud {
        Some(Value::String(aud)) => Some(aud),
        Some(Value::Array(values)) => values
            .into_iter()
            .find_map(|v| v.as_str().map(str::to_string)),
        _ => None,
    })
}

/// Returns `true` if the token's audience allows an on-behalf-of exchange.
pub fn is_exchangeable(token: &str) -> bool {
    matches!(
        token_audience(token),
        Ok(Some(aud)) if aud.starts_with(EXCHANGEABLE_AUDIENCE_PREFIX)
    )
}

/// Exchanges `token` for one carrying `scopes`.
///
/// With no scopes the base token is returned unchanged. A refused exchange
/// is logged and reported as `Ok(None)`.
///
/// # Errors
///
/// Returns a configuration error when the token's audience is not
/// exchangeable or when the OBO connection cannot be resolved.
pub async fn exchange_on_behalf_of(
    connections: &dyn ConnectionManager,
    connection_name: Option<&str>,
    scopes: &[String],
    token: &str,
    handler_id: &str,
) -> AuthResult<Option<String>> {
    if scopes.is_empty() {
        return Ok(Some(token.to_string()));
    }

    let audience = token_audience(token)?;
    match audience.as_deref() {
        Some(aud) if aud.starts_with(EXCHANGEABLE_AUDIENCE_PREFIX) => {}
        _ => {
            return Err(AuthError::configuration(format!(
                "handler '{handler_id}' cannot exchange a token whose audience does not start \
                 with '{EXCHANGEABLE_AUDIENCE_PREFIX}'"
            )));
        }
    }

    let provider = match connection_name {
        Some(name) => connections.get_connection(name)?,
        None => connections.get_default_connection()?,
    };

    match provider.acquire_token_on_behalf_of(scopes, token).await {
        Ok(exchanged) if !exchanged.is_empty() => {
            tracing::debug!(handler_id = %handler_id, "On-behalf-of exchange succeeded");
            Ok(Some(exchanged))
        }
        Ok(_) => {
            tracing::warn!(handler_id = %handler_id, "On-behalf-of exchange returned no token");
            Ok(None)
        }
        Err(e) => {
            tracing::warn!(
                handler_id = %handler_id,
                error = %e,
                "On-behalf-of exchange failed"
            );
            Ok(None)
        }
    }
}
