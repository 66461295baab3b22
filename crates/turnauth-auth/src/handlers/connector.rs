//! Delegated identity: the inbound request already carries the user's token.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use turnauth_core::TurnContext;

use super::{
    AuthorizationHandler, AuthorizationHandlerStatus, HandlerCallbacks, HandlerKind,
    TokenOptions, TokenResponse,
};
use crate::AuthResult;
use crate::config::ConnectorSettings;
use crate::error::AuthError;
use crate::storage::ActiveAuthorizationHandler;
use crate::token::{ConnectionManager, obo};

/// Handler that uses the bearer token of the inbound connector request.
pub struct ConnectorUserAuthorization {
    id: String,
    settings: ConnectorSettings,
    connections: Arc<dyn ConnectionManager>,
    callbacks: HandlerCallbacks,
}

impl fmt::Debug for ConnectorUserAuthorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectorUserAuthorization")
            .field("id", &self.id)
            .field("obo_scopes", &self.settings.obo_scopes)
            .finish_non_exhaustive()
    }
}

impl ConnectorUserAuthorization {
    /// Creates the handler.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the configured OBO connection does
    /// not exist.
    pub fn new(
        id: impl Into<String>,
        settings: ConnectorSettings,
        connections: Arc<dyn ConnectionManager>,
    ) -> AuthResult<Self> {
        if let Some(name) = &settings.obo_connection_name {
            connections.get_connection(name)?;
        }

        Ok(Self {
            id: id.into(),
            settings,
            connections,
            callbacks: HandlerCallbacks::new(),
        })
    }
}

#[async_trait]
impl AuthorizationHandler for ConnectorUserAuthorization {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Connector
    }

    async fn signin(
        &self,
        turn: &mut TurnContext,
        _active: Option<&ActiveAuthorizationHandler>,
    ) -> AuthResult<AuthorizationHandlerStatus> {
        let response = self.token(turn, &TokenOptions::default()).await?;
        if response.has_token() {
            self.callbacks.fire_success(turn, &self.id);
            Ok(AuthorizationHandlerStatus::Approved)
        } else {
            self.callbacks
                .fire_failure(turn, &self.id, Some("No token could be obtained for the user."));
            Ok(AuthorizationHandlerStatus::Rejected)
        }
    }

    async fn signout(&self, turn: &mut TurnContext) -> AuthResult<()> {
        turn.token_cache_mut().evict_handler(&self.id);
        Ok(())
    }

    async fn token(
        &self,
        turn: &mut TurnContext,
        options: &TokenOptions,
    ) -> AuthResult<TokenResponse> {
        let scopes = options.scopes_or(&self.settings.obo_scopes).to_vec();

        if let Some(token) = turn.token_cache().get(&self.id, &scopes) {
            return Ok(TokenResponse::new(token));
        }

        let base = turn
            .identity()
            .and_then(|identity| identity.token.clone())
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                AuthError::configuration(format!(
                    "handler '{}' requires the inbound identity to carry a token",
                    self.id
                ))
            })?;

        let token = obo::exchange_on_behalf_of(
            self.connections.as_ref(),
            self.settings.obo_connection_name.as_deref(),
            &scopes,
            &base,
            &self.id,
        )
        .await?;

        if let Some(token) = &token {
            turn.token_cache_mut().insert(&self.id, &scopes, token.clone());
        }
        Ok(TokenResponse::from(token))
    }

    fn callbacks(&self) -> &HandlerCallbacks {
        &self.callbacks
    }
}
