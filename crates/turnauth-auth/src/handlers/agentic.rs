//! Headless agentic user tokens.
//!
//! Agentic requests carry the agent instance and agentic user ids on the
//! recipient account. No user interaction is possible, so `signin` declines
//! and tokens are issued on demand by `token`.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use turnauth_core::TurnContext;

use super::{
    AuthorizationHandler, AuthorizationHandlerStatus, HandlerCallbacks, HandlerKind,
    TokenOptions, TokenResponse,
};
use crate::AuthResult;
use crate::config::AgenticSettings;
use crate::error::AuthError;
use crate::storage::ActiveAuthorizationHandler;
use crate::token::{AccessTokenProvider, ConnectionManager};

/// Agentic user token handler.
pub struct AgenticAuthorization {
    id: String,
    settings: AgenticSettings,
    connections: Arc<dyn ConnectionManager>,
    callbacks: HandlerCallbacks,
}

impl fmt::Debug for AgenticAuthorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgenticAuthorization")
            .field("id", &self.id)
            .field("scopes", &self.settings.scopes)
            .finish_non_exhaustive()
    }
}

impl AgenticAuthorization {
    /// Creates the handler.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no scopes are configured.
    pub fn new(
        id: impl Into<String>,
        settings: AgenticSettings,
        connections: Arc<dyn ConnectionManager>,
    ) -> AuthResult<Self> {
        let id = id.into();
        if settings.scopes.iter().all(|s| s.trim().is_empty()) {
            return Err(AuthError::configuration(format!(
                "scopes are required for agentic handler '{id}'"
            )));
        }

        Ok(Self {
            id,
            settings,
            connections,
            callbacks: HandlerCallbacks::new(),
        })
    }

    fn provider(&self, turn: &TurnContext) -> AuthResult<Arc<dyn AccessTokenProvider>> {
        if let Some(name) = &self.settings.alt_blueprint_connection_name {
            return self.connections.get_connection(name);
        }

        let audience = turn
            .identity()
            .and_then(|identity| identity.audience())
            .ok_or_else(|| AuthError::invalid_request("caller identity has no audience"))?;
        let service_url = turn
            .activity()
            .service_url
            .as_deref()
            .ok_or_else(|| AuthError::invalid_request("activity has no serviceUrl"))?;

        self.connections.get_token_provider(audience, service_url)
    }

    async fn issue(&self, turn: &TurnContext, scopes: &[String]) -> AuthResult<String> {
        let activity = turn.activity();
        if !activity.is_agentic_request() {
            return Err(AuthError::invalid_request("not an agentic request"));
        }

        let tenant_id = activity
            .tenant_id()
            .ok_or_else(|| AuthError::invalid_request("agentic request has no tenant id"))?;
        let instance_id = activity
            .agentic_instance_id()
            .ok_or_else(|| AuthError::invalid_request("agentic request has no instance id"))?;
        let user_id = activity
            .agentic_user_id()
            .ok_or_else(|| AuthError::invalid_request("agentic request has no user id"))?;

        let provider = self.provider(turn)?;
        let token = provider
            .get_agentic_user_token(tenant_id, instance_id, user_id, scopes)
            .await?;

        if token.is_empty() {
            return Err(AuthError::token_service("agentic token provider returned no token"));
        }
        Ok(token)
    }
}

#[async_trait]
impl AuthorizationHandler for AgenticAuthorization {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Agentic
    }

    async fn signin(
        &self,
        _turn: &mut TurnContext,
        _active: Option<&ActiveAuthorizationHandler>,
    ) -> AuthResult<AuthorizationHandlerStatus> {
        Ok(AuthorizationHandlerStatus::Ignored)
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
        let scopes = options.scopes_or(&self.settings.scopes).to_vec();

        if let Some(token) = turn.token_cache().get(&self.id, &scopes) {
            return Ok(TokenResponse::new(token));
        }

        match self.issue(turn, &scopes).await {
            Ok(token) => {
                turn.token_cache_mut().insert(&self.id, &scopes, token.clone());
                self.callbacks.fire_success(turn, &self.id);
                tracing::debug!(handler_id = %self.id, "Agentic token issued");
                Ok(TokenResponse::new(token))
            }
            Err(e) => {
                tracing::warn!(handler_id = %self.id, error = %e, "Failed to get agentic token");
                let message = e.to_string();
                self.callbacks.fire_failure(turn, &self.id, Some(&message));
                Ok(TokenResponse::empty())
            }
        }
    }

    fn callbacks(&self) -> &HandlerCallbacks {
        &self.callbacks
    }
}
