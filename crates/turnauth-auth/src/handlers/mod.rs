//! Authorization handler contract and its variants.
//!
//! A handler obtains a credential for one configured connection. The
//! [`AuthorizationManager`](crate::AuthorizationManager) calls
//! [`AuthorizationHandler::signin`] on every relevant handler in order and
//! maps the returned [`AuthorizationHandlerStatus`] to a control decision.
//!
//! Variants:
//!
//! - [`AzureBotAuthorization`] - interactive OAuth through the bot token service
//! - [`AgenticAuthorization`] - headless agentic user tokens
//! - [`ConnectorUserAuthorization`] - token carried by the inbound request

mod agentic;
mod azure_bot;
mod connector;

use std::fmt;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use turnauth_core::TurnContext;

use crate::AuthResult;
use crate::storage::ActiveAuthorizationHandler;

pub use agentic::AgenticAuthorization;
pub use azure_bot::{AzureBotAuthorization, CANCELLED_BY_USER};
pub use connector::ConnectorUserAuthorization;

/// Outcome of one sign-in attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorizationHandlerStatus {
    /// A credential was obtained.
    Approved,
    /// More turns are needed; the session must persist.
    Pending,
    /// Terminal failure; the session is discarded.
    Rejected,
    /// The handler declines to act.
    Ignored,
    /// The session is stale; evaluation restarts from scratch.
    Revalidate,
}

impl AuthorizationHandlerStatus {
    /// Returns `true` for statuses that end the session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Ignored)
    }
}

impl fmt::Display for AuthorizationHandlerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Approved => write!(f, "approved"),
            Self::Pending => write!(f, "pending"),
            Self::Rejected => write!(f, "rejected"),
            Self::Ignored => write!(f, "ignored"),
            Self::Revalidate => write!(f, "revalidate"),
        }
    }
}

/// Result of a token request. A missing token is not an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl TokenResponse {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    pub fn has_token(&self) -> bool {
        self.token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

impl From<Option<String>> for TokenResponse {
    fn from(token: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.is_empty()),
        }
    }
}

/// Options of a token request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenOptions {
    /// Scopes to request. `None` uses the handler's configured scopes.
    pub scopes: Option<Vec<String>>,
}

impl TokenOptions {
    pub fn with_scopes(scopes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            scopes: Some(scopes.into_iter().map(Into::into).collect()),
        }
    }

    /// Requested scopes, falling back to `configured`.
    pub fn scopes_or<'a>(&'a self, configured: &'a [String]) -> &'a [String] {
        match &self.scopes {
            Some(scopes) => scopes,
            None => configured,
        }
    }
}

/// Handler variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    AzureBot,
    Agentic,
    Connector,
}

/// Callback fired when a handler obtains a token: `(turn, handler_id)`.
pub type SuccessFn = Box<dyn Fn(&TurnContext, &str) + Send + Sync>;

/// Callback fired when sign-in fails: `(turn, handler_id, error_message)`.
pub type FailureFn = Box<dyn Fn(&TurnContext, &str, Option<&str>) + Send + Sync>;

/// Success and failure callback slots of one handler.
///
/// Slots can be replaced at any time without blocking readers.
#[derive(Default)]
pub struct HandlerCallbacks {
    success: ArcSwapOption<SuccessFn>,
    failure: ArcSwapOption<FailureFn>,
}

impl HandlerCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_success(&self, callback: SuccessFn) {
        self.success.store(Some(std::sync::Arc::new(callback)));
    }

    pub fn set_failure(&self, callback: FailureFn) {
        self.failure.store(Some(std::sync::Arc::new(callback)));
    }

    pub fn fire_success(&self, turn: &TurnContext, handler_id: &str) {
        if let Some(callback) = self.success.load_full() {
            (*callback)(turn, handler_id);
        }
    }

    pub fn fire_failure(&self, turn: &TurnContext, handler_id: &str, message: Option<&str>) {
        if let Some(callback) = self.failure.load_full() {
            (*callback)(turn, handler_id, message);
        }
    }
}

impl fmt::Debug for HandlerCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerCallbacks")
            .field("success", &self.success.load().is_some())
            .field("failure", &self.failure.load().is_some())
            .finish()
    }
}

/// A strategy that obtains a credential for one connection.
///
/// # Contract
///
/// - `signin` never errors for well-formed protocol input; malformed or
///   misdirected payloads are reported as `Rejected`.
/// - Handlers that need more turns persist their own session and return
///   `Pending`. The manager deletes the session on terminal statuses.
/// - `token` resolves a token for the current turn and may cache it in the
///   turn's [`TokenCache`](turnauth_core::TokenCache).
#[async_trait]
pub trait AuthorizationHandler: Send + Sync {
    /// Registry id of this handler.
    fn id(&self) -> &str;

    fn kind(&self) -> HandlerKind;

    /// Runs one sign-in step.
    ///
    /// `active` is the persisted session when this handler owns it.
    ///
    /// # Errors
    ///
    /// Returns configuration or infrastructure errors only.
    async fn signin(
        &self,
        turn: &mut TurnContext,
        active: Option<&ActiveAuthorizationHandler>,
    ) -> AuthResult<AuthorizationHandlerStatus>;

    /// Signs the user out and evicts cached tokens.
    ///
    /// # Errors
    ///
    /// Returns an error if the token service cannot be reached.
    async fn signout(&self, turn: &mut TurnContext) -> AuthResult<()>;

    /// Resolves a token for the current turn.
    ///
    /// # Errors
    ///
    /// Returns configuration errors. Transient failures yield an empty
    /// [`TokenResponse`].
    async fn token(&self, turn: &mut TurnContext, options: &TokenOptions)
    -> AuthResult<TokenResponse>;

    fn callbacks(&self) -> &HandlerCallbacks;

    /// Registers the success callback.
    fn on_success(&self, callback: SuccessFn) {
        self.callbacks().set_success(callback);
    }

    /// Registers the failure callback.
    fn on_failure(&self, callback: FailureFn) {
        self.callbacks().set_failure(callback);
    }
}
