//! Session record and its storage adapter.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use turnauth_core::Activity;
use turnauth_storage::{Storage, StoreItems};

use crate::AuthResult;
use crate::error::AuthError;

/// Which interactive sign-in path a session is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SigninCategory {
    /// The user pastes (or the client posts) a six digit code.
    MagicCode,
    /// The client exchanges a platform SSO token on the user's behalf.
    TokenExchange,
}

/// An in-progress sign-in session.
///
/// The `activity` is the snapshot of the turn that started sign-in; it is
/// restored onto the turn when the handler approves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveAuthorizationHandler {
    /// Id of the handler that owns the flow.
    pub id: String,

    /// Activity that started the flow.
    pub activity: Activity,

    /// Remaining malformed-code attempts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts_left: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<SigninCategory>,

    /// When the flow started.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl ActiveAuthorizationHandler {
    /// Creates a session owned by `id`, started now.
    pub fn new(id: impl Into<String>, activity: Activity) -> Self {
        Self {
            id: id.into(),
            activity,
            attempts_left: None,
            category: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[must_use]
    pub fn with_attempts(mut self, attempts_left: u32) -> Self {
        self.attempts_left = Some(attempts_left);
        self
    }

    #[must_use]
    pub fn with_category(mut self, category: SigninCategory) -> Self {
        self.category = Some(category);
        self
    }

    /// Returns `true` once the session is older than `timeout`.
    pub fn is_expired(&self, timeout: Duration) -> bool {
        let age = OffsetDateTime::now_utc() - self.created_at;
        age > timeout
    }

    /// Conversation the flow started in.
    pub fn conversation_id(&self) -> &str {
        &self.activity.conversation.id
    }
}

/// Reads and writes sign-in sessions keyed by channel and user.
#[derive(Clone)]
pub struct HandlerStorage {
    storage: Arc<dyn Storage>,
}

impl std::fmt::Debug for HandlerStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerStorage").finish_non_exhaustive()
    }
}

impl HandlerStorage {
    /// Key prefix of session records.
    pub const KEY_PREFIX: &'static str = "auth";

    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Storage key for the session of the activity's sender.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the activity lacks a channel id
    /// or a sender id.
    pub fn key(activity: &Activity) -> AuthResult<String> {
        let channel_id = activity.channel_id.trim();
        let user_id = activity.from.id.trim();

        if channel_id.is_empty() {
            return Err(AuthError::configuration(
                "activity channelId is required to key the sign-in session",
            ));
        }
        if user_id.is_empty() {
            return Err(AuthError::configuration(
                "activity from.id is required to key the sign-in session",
            ));
        }

        Ok(format!("{}/{channel_id}/{user_id}", Self::KEY_PREFIX))
    }

    /// Reads the session of the activity's sender.
    ///
    /// A record that no longer decodes is dropped and reported as absent, so
    /// the next turn starts a fresh sign-in.
    pub async fn read(&self, activity: &Activity) -> AuthResult<Option<ActiveAuthorizationHandler>> {
        let key = Self::key(activity)?;
        let mut items = self.storage.read(std::slice::from_ref(&key)).await?;

        let Some(value) = items.remove(&key) else {
            return Ok(None);
        };

        match serde_json::from_value(value) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                tracing::warn!(
                    key = %key,
                    error = %e,
                    "Discarding undecodable sign-in session"
                );
                self.storage.delete(&[key]).await?;
                Ok(None)
            }
        }
    }

    /// Writes the session, replacing any previous one for the same sender.
    pub async fn write(
        &self,
        activity: &Activity,
        session: &ActiveAuthorizationHandler,
    ) -> AuthResult<()> {
        let key = Self::key(activity)?;
        let value = serde_json::to_value(session)
            .map_err(|e| AuthError::storage(format!("failed to encode sign-in session: {e}")))?;

        let mut changes = StoreItems::new();
        changes.insert(key, value);
        self.storage.write(changes).await?;
        Ok(())
    }

    /// Deletes the session of the activity's sender. Deleting a missing
    /// session is a no-op.
    pub async fn delete(&self, activity: &Activity) -> AuthResult<()> {
        let key = Self::key(activity)?;
        self.storage.delete(&[key]).await?;
        Ok(())
    }
}
