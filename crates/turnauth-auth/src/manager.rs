//! Per-turn authorization orchestration.
//!
//! [`AuthorizationManager::process`] is called on every inbound turn. It
//! loads the user's in-flight sign-in session, decides which handlers apply,
//! runs them in order and maps each status to a control decision:
//!
//! | status       | session  | next step                         |
//! |--------------|----------|-----------------------------------|
//! | `Approved`   | deleted  | restore the snapshot, continue    |
//! | `Pending`    | kept     | stop, not authorized              |
//! | `Rejected`   | deleted  | stop, not authorized              |
//! | `Ignored`    | deleted  | continue                          |
//! | `Revalidate` | deleted  | restart evaluation from scratch   |

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use turnauth_core::{Activity, TurnContext};
use turnauth_storage::Storage;

use crate::AuthResult;
use crate::config::{AuthorizationOptions, HandlerSettings};
use crate::error::AuthError;
use crate::handlers::{
    AgenticAuthorization, AuthorizationHandler, AuthorizationHandlerStatus, AzureBotAuthorization,
    ConnectorUserAuthorization, TokenOptions, TokenResponse,
};
use crate::storage::{ActiveAuthorizationHandler, HandlerStorage};
use crate::token::{ConnectionManager, UserTokenClient};

/// Maximum number of evaluation passes when handlers keep asking for
/// revalidation.
pub const MAX_REVALIDATIONS: usize = 3;

/// Outcome of [`AuthorizationManager::process`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessResult {
    /// `true` when the turn may proceed to normal handling.
    pub authorized: bool,
}

impl ProcessResult {
    pub const fn authorized() -> Self {
        Self { authorized: true }
    }

    pub const fn unauthorized() -> Self {
        Self { authorized: false }
    }
}

/// Collaborators needed to build handlers from configuration.
#[derive(Clone)]
pub struct AuthorizationDependencies {
    pub storage: Arc<dyn Storage>,
    pub user_token_client: Arc<dyn UserTokenClient>,
    pub connections: Arc<dyn ConnectionManager>,
}

enum Evaluation {
    Done(ProcessResult),
    Revalidate { handler_id: String },
}

/// Registry of configured handlers and the per-turn state machine.
pub struct AuthorizationManager {
    storage: HandlerStorage,
    handlers: BTreeMap<String, Arc<dyn AuthorizationHandler>>,
}

impl fmt::Debug for AuthorizationManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationManager")
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl AuthorizationManager {
    /// Builds the registry from normalized configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the options are invalid or a handler
    /// cannot be constructed.
    pub fn new(
        options: &AuthorizationOptions,
        dependencies: AuthorizationDependencies,
    ) -> AuthResult<Self> {
        options.validate()?;

        let storage = HandlerStorage::new(dependencies.storage.clone());
        let mut handlers: BTreeMap<String, Arc<dyn AuthorizationHandler>> = BTreeMap::new();

        for (id, settings) in &options.handlers {
            let handler: Arc<dyn AuthorizationHandler> = match settings {
                HandlerSettings::AzureBot(settings) => Arc::new(AzureBotAuthorization::new(
                    id.clone(),
                    settings.clone(),
                    storage.clone(),
                    dependencies.user_token_client.clone(),
                    dependencies.connections.clone(),
                )?),
                HandlerSettings::Agentic(settings) => Arc::new(AgenticAuthorization::new(
                    id.clone(),
                    settings.clone(),
                    dependencies.connections.clone(),
                )?),
                HandlerSettings::Connector(settings) => Arc::new(ConnectorUserAuthorization::new(
                    id.clone(),
                    settings.clone(),
                    dependencies.connections.clone(),
                )?),
            };
            tracing::debug!(
                handler_id = %id,
                handler_type = settings.type_name(),
                "Registered authorization handler"
            );
            handlers.insert(id.clone(), handler);
        }

        Ok(Self { storage, handlers })
    }

    /// Builds the registry from ready-made handlers.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::DuplicateHandler` if two handlers share an id.
    pub fn from_handlers(
        storage: Arc<dyn Storage>,
        handlers: Vec<Arc<dyn AuthorizationHandler>>,
    ) -> AuthResult<Self> {
        let mut registry = BTreeMap::new();
        for handler in handlers {
            let id = handler.id().to_string();
            if registry.insert(id.clone(), handler).is_some() {
                return Err(AuthError::duplicate_handler(id));
            }
        }

        Ok(Self {
            storage: HandlerStorage::new(storage),
            handlers: registry,
        })
    }

    /// Returns the handler registered under `id`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::HandlerNotFound` for an unknown id.
    pub fn handler(&self, id: &str) -> AuthResult<Arc<dyn AuthorizationHandler>> {
        self.handlers
            .get(id)
            .cloned()
            .ok_or_else(|| AuthError::handler_not_found(id))
    }

    /// Registered handler ids, sorted.
    pub fn handler_ids(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Decides whether the turn is authorized.
    ///
    /// `resolve_handler_ids` returns the ids of the handlers relevant to an
    /// activity. When a sign-in session is in flight it is asked about the
    /// activity that started the session, and the session's handler runs
    /// first.
    ///
    /// # Errors
    ///
    /// Returns configuration errors (e.g. an activity without channel or
    /// user id), infrastructure errors, `HandlerNotFound` when an id is not
    /// registered, and `RevalidationLimitExceeded` when handlers keep asking
    /// for revalidation.
    pub async fn process<F>(
        &self,
        turn: &mut TurnContext,
        resolve_handler_ids: F,
    ) -> AuthResult<ProcessResult>
    where
        F: Fn(&Activity) -> Vec<String> + Sync,
    {
        let mut passes = 0;
        loop {
            passes += 1;
            match self.evaluate(turn, &resolve_handler_ids).await? {
                Evaluation::Done(result) => return Ok(result),
                Evaluation::Revalidate { handler_id } => {
                    if passes >= MAX_REVALIDATIONS {
                        tracing::warn!(
                            handler_id = %handler_id,
                            passes,
                            "Authorization did not settle"
                        );
                        return Err(AuthError::revalidation_limit(passes, handler_id));
                    }
                    tracing::debug!(handler_id = %handler_id, passes, "Revalidating authorization");
                }
            }
        }
    }

    /// Orders handler ids so the session owner runs first.
    fn order_handler_ids(mut ids: Vec<String>, owner: Option<&str>) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        ids.retain(|id| seen.insert(id.clone()));

        if let Some(owner) = owner {
            if ids.iter().any(|id| id == owner) {
                ids.sort_by_key(|id| id != owner);
            } else {
                ids.insert(0, owner.to_string());
            }
        }
        ids
    }

    async fn evaluate<F>(
        &self,
        turn: &mut TurnContext,
        resolve_handler_ids: &F,
    ) -> AuthResult<Evaluation>
    where
        F: Fn(&Activity) -> Vec<String> + Sync,
    {
        let session = self.storage.read(turn.activity()).await?;

        let stale = session
            .as_ref()
            .filter(|active| active.conversation_id() != turn.activity().conversation.id);
        if let Some(active) = stale {
            tracing::debug!(
                handler_id = %active.id,
                channel_id = %turn.activity().channel_id,
                "Discarding sign-in session started in another conversation"
            );
            self.storage.delete(turn.activity()).await?;
            return Ok(Evaluation::Done(ProcessResult::authorized()));
        }

        let ids = match &session {
            Some(active) => {
                Self::order_handler_ids(resolve_handler_ids(&active.activity), Some(&active.id))
            }
            None => Self::order_handler_ids(resolve_handler_ids(turn.activity()), None),
        };

        if ids.is_empty() {
            return Ok(Evaluation::Done(ProcessResult::authorized()));
        }

        for id in ids {
            let Some(handler) = self.handlers.get(&id).cloned() else {
                if session.as_ref().is_some_and(|active| active.id == id) {
                    self.storage.delete(turn.activity()).await?;
                }
                tracing::warn!(handler_id = %id, "Authorization handler is not registered");
                return Err(AuthError::handler_not_found(id));
            };

            let active = session.as_ref().filter(|active| active.id == id);
            let status = self.run_signin(turn, handler.as_ref(), active).await?;

            tracing::debug!(
                handler_id = %id,
                channel_id = %turn.activity().channel_id,
                %status,
                "Authorization handler finished"
            );

            if status.is_terminal() {
                self.storage.delete(turn.activity()).await?;
            }

            match status {
                AuthorizationHandlerStatus::Approved => {
                    if let Some(active) = active {
                        turn.replace_activity(active.activity.clone());
                    }
                }
                AuthorizationHandlerStatus::Pending | AuthorizationHandlerStatus::Rejected => {
                    return Ok(Evaluation::Done(ProcessResult::unauthorized()));
                }
                AuthorizationHandlerStatus::Ignored => {}
                AuthorizationHandlerStatus::Revalidate => {
                    self.storage.delete(turn.activity()).await?;
                    return Ok(Evaluation::Revalidate { handler_id: id });
                }
            }
        }

        Ok(Evaluation::Done(ProcessResult::authorized()))
    }

    /// Runs `signin`, dropping the session if the handler fails.
    async fn run_signin(
        &self,
        turn: &mut TurnContext,
        handler: &dyn AuthorizationHandler,
        active: Option<&ActiveAuthorizationHandler>,
    ) -> AuthResult<AuthorizationHandlerStatus> {
        match handler.signin(turn, active).await {
            Ok(status) => Ok(status),
            Err(e) => {
                tracing::warn!(
                    handler_id = %handler.id(),
                    error = %e,
                    category = %e.category(),
                    "Authorization handler failed"
                );
                if let Err(delete_err) = self.storage.delete(turn.activity()).await {
                    tracing::warn!(
                        handler_id = %handler.id(),
                        error = %delete_err,
                        "Failed to delete sign-in session"
                    );
                }
                Err(e)
            }
        }
    }

    /// Resolves a token through the handler registered under `handler_id`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::HandlerNotFound` for an unknown id, or the
    /// handler's configuration errors.
    pub async fn token(
        &self,
        turn: &mut TurnContext,
        handler_id: &str,
        options: &TokenOptions,
    ) -> AuthResult<TokenResponse> {
        let handler = self.handler(handler_id)?;
        handler.token(turn, options).await
    }

    /// Resolves a token for explicit on-behalf-of `scopes`.
    ///
    /// # Errors
    ///
    /// Same as [`token`](Self::token).
    pub async fn exchange_token(
        &self,
        turn: &mut TurnContext,
        handler_id: &str,
        scopes: &[String],
    ) -> AuthResult<TokenResponse> {
        let options = TokenOptions {
            scopes: Some(scopes.to_vec()),
        };
        self.token(turn, handler_id, &options).await
    }

    /// Signs the user out of one handler, or of every handler when
    /// `handler_id` is `None`, and drops any in-flight sign-in session.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::HandlerNotFound` for an unknown id, or the first
    /// sign-out failure.
    pub async fn signout(
        &self,
        turn: &mut TurnContext,
        handler_id: Option<&str>,
    ) -> AuthResult<()> {
        let targets = match handler_id {
            Some(id) => vec![self.handler(id)?],
            None => self.handlers.values().cloned().collect(),
        };

        for handler in targets {
            handler.signout(turn).await?;
        }

        self.storage.delete(turn.activity()).await?;
        tracing::debug!(channel_id = %turn.activity().channel_id, "Signed out");
        Ok(())
    }

    /// Registers `callback` as the success callback of every handler.
    pub fn on_sign_in_success<F>(&self, callback: F)
    where
        F: Fn(&TurnContext, &str) + Send + Sync + 'static,
    {
        let callback = Arc::new(callback);
        for handler in self.handlers.values() {
            let callback = callback.clone();
            handler.on_success(Box::new(move |turn: &TurnContext, id: &str| {
                callback(turn, id);
            }));
        }
    }

    /// Registers `callback` as the failure callback of every handler.
    pub fn on_sign_in_failure<F>(&self, callback: F)
    where
        F: Fn(&TurnContext, &str, Option<&str>) + Send + Sync + 'static,
    {
        let callback = Arc::new(callback);
        for handler in self.handlers.values() {
            let callback = callback.clone();
            handler.on_failure(Box::new(
                move |turn: &TurnContext, id: &str, message: Option<&str>| {
                    callback(turn, id, message);
                },
            ));
        }
    }
}
