//! Interactive OAuth through the bot token service.
//!
//! The first turn either finds a cached user token or sends a sign-in card
//! and opens a session. Later turns complete the flow through one of:
//!
//! - a six digit magic code typed by the user (or posted in a
//!   `signin/verifyState` invoke)
//! - a platform SSO token posted in a `signin/tokenExchange` invoke
//! - an explicit cancellation (`signin/failure`, or `signin/verifyState`
//!   carrying [`CANCELLED_BY_USER`])

use std::fmt;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use turnauth_core::{
    InvokeResponse, SignInCard, TokenExchangeInvokeRequest, TokenExchangeInvokeResponse,
    TurnContext, VerifyStateInvokeRequest, invoke_names, status_codes,
};

use super::{
    AuthorizationHandler, AuthorizationHandlerStatus, HandlerCallbacks, HandlerKind,
    TokenOptions, TokenResponse,
};
use crate::AuthResult;
use crate::config::{AzureBotSettings, render_template};
use crate::error::AuthError;
use crate::storage::{ActiveAuthorizationHandler, HandlerStorage, SigninCategory};
use crate::token::{
    ConnectionManager, TokenExchangeRequest, TokenOrSignInResource, UserTokenClient, obo,
};

/// `signin/verifyState` state sent when the user dismisses the sign-in prompt.
pub const CANCELLED_BY_USER: &str = "CancelledByUser";

static MAGIC_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{6}$").expect("Invalid magic code regex"));

const EXCHANGE_NOT_READY: &str =
    "The agent is unable to exchange token. Proceed with regular login.";

/// Interactive sign-in handler backed by the bot token service.
pub struct AzureBotAuthorization {
    id: String,
    settings: AzureBotSettings,
    storage: HandlerStorage,
    user_token_client: Arc<dyn UserTokenClient>,
    connections: Arc<dyn ConnectionManager>,
    callbacks: HandlerCallbacks,
}

impl fmt::Debug for AzureBotAuthorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureBotAuthorization")
            .field("id", &self.id)
            .field("connection_name", &self.settings.connection_name)
            .field("max_attempts", &self.settings.max_attempts)
            .finish_non_exhaustive()
    }
}

impl AzureBotAuthorization {
    /// Creates the handler.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the connection name is empty,
    /// `max_attempts` is zero, or the configured OBO connection does not
    /// exist.
    pub fn new(
        id: impl Into<String>,
        settings: AzureBotSettings,
        storage: HandlerStorage,
        user_token_client: Arc<dyn UserTokenClient>,
        connections: Arc<dyn ConnectionManager>,
    ) -> AuthResult<Self> {
        let id = id.into();

        if settings.connection_name.trim().is_empty() {
            return Err(AuthError::configuration(format!(
                "connectionName is required for handler '{id}'"
            )));
        }
        if settings.max_attempts == 0 {
            return Err(AuthError::configuration(format!(
                "maxAttempts for handler '{id}' must be > 0"
            )));
        }
        if let Some(name) = &settings.obo_connection_name {
            connections.get_connection(name)?;
        }

        Ok(Self {
            id,
            settings,
            storage,
            user_token_client,
            connections,
            callbacks: HandlerCallbacks::new(),
        })
    }

    pub fn settings(&self) -> &AzureBotSettings {
        &self.settings
    }

    /// Sends `response` when the turn is an invoke; other turns have no
    /// synchronous reply channel.
    async fn acknowledge(&self, turn: &TurnContext, response: InvokeResponse) -> AuthResult<()> {
        if turn.activity().is_invoke() {
            turn.send_invoke_response(&response).await?;
        }
        Ok(())
    }

    fn exchange_body(&self, id: Option<String>, failure_detail: Option<&str>) -> Value {
        let body = TokenExchangeInvokeResponse {
            id,
            connection_name: self.settings.connection_name.clone(),
            failure_detail: failure_detail.map(str::to_string),
        };
        serde_json::to_value(body).unwrap_or(Value::Null)
    }

    fn approve(&self, turn: &mut TurnContext, token: &str) -> AuthorizationHandlerStatus {
        turn.token_cache_mut().insert(&self.id, &[], token);
        self.callbacks.fire_success(turn, &self.id);
        AuthorizationHandlerStatus::Approved
    }

    fn reject(&self, turn: &TurnContext, reason: &str) -> AuthorizationHandlerStatus {
        self.callbacks.fire_failure(turn, &self.id, Some(reason));
        AuthorizationHandlerStatus::Rejected
    }

    /// Asks the token service for a token, redeeming `code` when present.
    async fn fetch_token(
        &self,
        turn: &TurnContext,
        code: Option<&str>,
    ) -> AuthResult<TokenOrSignInResource> {
        let activity = turn.activity();
        let reference = activity.conversation_reference();
        self.user_token_client
            .get_token_or_sign_in_resource(
                &activity.from.id,
                &self.settings.connection_name,
                &activity.channel_id,
                &reference,
                activity.relates_to.as_ref(),
                code,
            )
            .await
    }

    /// First turn: use a cached token or prompt for sign-in.
    async fn begin(&self, turn: &mut TurnContext) -> AuthResult<AuthorizationHandlerStatus> {
        let result = self.fetch_token(turn, None).await?;

        if let Some(token) = result.token() {
            tracing::debug!(handler_id = %self.id, "User already signed in");
            let token = token.to_string();
            return Ok(self.approve(turn, &token));
        }

        let Some(mut resource) = result.sign_in_resource else {
            return Err(AuthError::token_service(format!(
                "token service returned neither a token nor a sign-in resource for handler '{}'",
                self.id
            )));
        };

        let category = if self.settings.enable_sso && resource.token_exchange_resource.is_some() {
            SigninCategory::TokenExchange
        } else {
            SigninCategory::MagicCode
        };
        // magic code cards never advertise SSO
        if category == SigninCategory::MagicCode {
            resource.token_exchange_resource = None;
        }

        let card = SignInCard {
            title: self.settings.title.clone(),
            text: self.settings.text.clone(),
            connection_name: self.settings.connection_name.clone(),
            resource,
        };
        turn.send_sign_in_card(&card).await?;

        let session = ActiveAuthorizationHandler::new(self.id.clone(), turn.activity().clone())
            .with_attempts(self.settings.max_attempts)
            .with_category(category);
        self.storage.write(turn.activity(), &session).await?;

        tracing::debug!(
            handler_id = %self.id,
            channel_id = %turn.activity().channel_id,
            ?category,
            "Sign-in card sent"
        );
        Ok(AuthorizationHandlerStatus::Pending)
    }

    async fn reject_exchange(
        &self,
        turn: &TurnContext,
        request_id: Option<String>,
        reason: &str,
    ) -> AuthResult<AuthorizationHandlerStatus> {
        tracing::warn!(handler_id = %self.id, reason, "Token exchange request rejected");
        let body = self.exchange_body(request_id, Some(reason));
        self.acknowledge(turn, InvokeResponse::new(status_codes::BAD_REQUEST).with_body(body))
            .await?;
        Ok(self.reject(turn, reason))
    }

    /// `signin/tokenExchange` invoke.
    async fn exchange(
        &self,
        turn: &mut TurnContext,
        session: &ActiveAuthorizationHandler,
    ) -> AuthResult<AuthorizationHandlerStatus> {
        let request = turn
            .activity()
            .value
            .clone()
            .and_then(|v| serde_json::from_value::<TokenExchangeInvokeRequest>(v).ok());

        let Some(request) = request else {
            return self
                .reject_exchange(turn, None, "The token exchange payload is missing or malformed.")
                .await;
        };

        if request.connection_name.as_deref() != Some(self.settings.connection_name.as_str()) {
            return self
                .reject_exchange(
                    turn,
                    request.id,
                    "The token exchange is addressed to a different connection.",
                )
                .await;
        }

        if session.category != Some(SigninCategory::TokenExchange) {
            return self
                .reject_exchange(
                    turn,
                    request.id,
                    "Token exchange was not offered for this sign-in.",
                )
                .await;
        }

        let Some(sso_token) = request.token.clone().filter(|t| !t.is_empty()) else {
            return self
                .reject_exchange(turn, request.id, "The token exchange payload has no token.")
                .await;
        };

        let activity = turn.activity();
        let exchanged = match self
            .user_token_client
            .exchange_token(
                &activity.from.id,
                &self.settings.connection_name,
                &activity.channel_id,
                &TokenExchangeRequest {
                    token: Some(sso_token),
                    uri: None,
                },
            )
            .await
        {
            Ok(token) => token.map(|t| t.token).filter(|t| !t.is_empty()),
            Err(e) => {
                tracing::warn!(handler_id = %self.id, error = %e, "Token exchange failed");
                None
            }
        };

        match exchanged {
            Some(token) => {
                let body = self.exchange_body(request.id, None);
                self.acknowledge(turn, InvokeResponse::new(status_codes::OK).with_body(body))
                    .await?;
                tracing::debug!(handler_id = %self.id, "Token exchange succeeded");
                Ok(self.approve(turn, &token))
            }
            None => {
                let body = self.exchange_body(request.id, Some(EXCHANGE_NOT_READY));
                self.acknowledge(
                    turn,
                    InvokeResponse::new(status_codes::PRECONDITION_FAILED).with_body(body),
                )
                .await?;
                tracing::debug!(handler_id = %self.id, "Token exchange not ready, awaiting retry");
                Ok(AuthorizationHandlerStatus::Pending)
            }
        }
    }

    async fn cancel(&self, turn: &TurnContext) -> AuthResult<AuthorizationHandlerStatus> {
        tracing::debug!(handler_id = %self.id, "Sign-in cancelled by user");
        self.acknowledge(turn, InvokeResponse::new(status_codes::OK))
            .await?;
        Ok(self.reject(turn, "Sign-in was cancelled by the user."))
    }

    /// Magic code confirmation, typed or posted.
    async fn redeem_code(
        &self,
        turn: &mut TurnContext,
        session: &ActiveAuthorizationHandler,
        code: &str,
    ) -> AuthResult<AuthorizationHandlerStatus> {
        let messages = &self.settings.messages;
        let max_attempts = self.settings.max_attempts.to_string();
        let attempts_left = session.attempts_left.unwrap_or(self.settings.max_attempts);

        if attempts_left == 0 {
            let text = render_template(
                &messages.max_attempts_exceeded,
                &[("maxAttempts", max_attempts.as_str())],
            );
            turn.send_text(&text).await?;
            return Ok(self.reject(turn, "Maximum sign-in attempts exceeded."));
        }

        if !MAGIC_CODE.is_match(code) {
            let remaining = attempts_left - 1;
            let remaining_text = remaining.to_string();
            let text = render_template(
                &messages.invalid_code_format,
                &[
                    ("attemptsLeft", remaining_text.as_str()),
                    ("maxAttempts", max_attempts.as_str()),
                ],
            );
            turn.send_text(&text).await?;

            let updated = session.clone().with_attempts(remaining);
            self.storage.write(turn.activity(), &updated).await?;

            tracing::debug!(handler_id = %self.id, attempts_left = remaining, "Malformed magic code");
            return Ok(AuthorizationHandlerStatus::Pending);
        }

        let result = self.fetch_token(turn, Some(code)).await?;
        match result.token() {
            Some(token) => {
                let token = token.to_string();
                tracing::debug!(handler_id = %self.id, "Magic code redeemed");
                Ok(self.approve(turn, &token))
            }
            None => {
                let text = render_template(&messages.invalid_code, &[("code", code)]);
                turn.send_text(&text).await?;
                Ok(self.reject(turn, "The magic code was not accepted."))
            }
        }
    }

    async fn continue_flow(
        &self,
        turn: &mut TurnContext,
        session: &ActiveAuthorizationHandler,
    ) -> AuthResult<AuthorizationHandlerStatus> {
        if session.is_expired(self.settings.sign_in_timeout) {
            tracing::debug!(handler_id = %self.id, "Sign-in session expired");
            return Ok(AuthorizationHandlerStatus::Revalidate);
        }

        let activity = turn.activity();

        if activity.is_invoke_named(invoke_names::TOKEN_EXCHANGE) {
            return self.exchange(turn, session).await;
        }

        if activity.is_invoke_named(invoke_names::SIGNIN_FAILURE) {
            return self.cancel(turn).await;
        }

        if activity.is_invoke_named(invoke_names::VERIFY_STATE) {
            let state = activity
                .value
                .clone()
                .and_then(|v| serde_json::from_value::<VerifyStateInvokeRequest>(v).ok())
                .and_then(|request| request.state)
                .unwrap_or_default();

            if state == CANCELLED_BY_USER {
                return self.cancel(turn).await;
            }

            let status = self.redeem_code(turn, session, state.trim()).await?;
            self.acknowledge(turn, InvokeResponse::new(status_codes::OK))
                .await?;
            return Ok(status);
        }

        if activity.is_message() {
            let code = activity.trimmed_text().unwrap_or_default().to_string();
            return self.redeem_code(turn, session, &code).await;
        }

        tracing::trace!(handler_id = %self.id, "Activity does not advance the sign-in flow");
        Ok(AuthorizationHandlerStatus::Pending)
    }
}

#[async_trait]
impl AuthorizationHandler for AzureBotAuthorization {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::AzureBot
    }

    async fn signin(
        &self,
        turn: &mut TurnContext,
        active: Option<&ActiveAuthorizationHandler>,
    ) -> AuthResult<AuthorizationHandlerStatus> {
        match active {
            None => self.begin(turn).await,
            Some(session) => self.continue_flow(turn, session).await,
        }
    }

    async fn signout(&self, turn: &mut TurnContext) -> AuthResult<()> {
        let activity = turn.activity();
        self.user_token_client
            .sign_out(
                &activity.from.id,
                &self.settings.connection_name,
                &activity.channel_id,
            )
            .await?;
        turn.token_cache_mut().evict_handler(&self.id);
        tracing::debug!(handler_id = %self.id, "User signed out");
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

        let base = match self.fetch_token(turn, None).await {
            Ok(result) => result.token().map(str::to_string),
            Err(e) => {
                tracing::warn!(handler_id = %self.id, error = %e, "Failed to get user token");
                None
            }
        };
        let Some(base) = base else {
            return Ok(TokenResponse::empty());
        };

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
