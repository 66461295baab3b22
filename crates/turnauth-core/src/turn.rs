//! The per-turn context handed to authorization handlers.
//!
//! A [`TurnContext`] owns the inbound activity, the caller identity, the
//! turn-scoped [`TokenCache`] and the [`TurnSender`] used to talk back to the
//! channel. It lives exactly as long as one turn.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::activity::Activity;
use crate::card::SignInCard;
use crate::error::Result;
use crate::identity::ClaimsIdentity;
use crate::invoke::InvokeResponse;

/// Outbound side of a turn.
///
/// Message composition and card rendering happen behind this trait.
#[async_trait]
pub trait TurnSender: Send + Sync {
    /// Sends a plain text reply.
    async fn send_text(&self, text: &str) -> Result<()>;

    /// Sends a sign-in prompt.
    async fn send_sign_in_card(&self, card: &SignInCard) -> Result<()>;

    /// Sends the synchronous acknowledgement of an invoke activity.
    async fn send_invoke_response(&self, response: &InvokeResponse) -> Result<()>;
}

/// Tokens resolved during the current turn, keyed by handler and scope-set.
///
/// Scope-sets are order-insensitive: `["a", "b"]` and `["b", "a", "a"]` share
/// one entry.
#[derive(Debug, Clone, Default)]
pub struct TokenCache {
    entries: HashMap<String, HashMap<String, String>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn scope_key(scopes: &[String]) -> String {
        scopes
            .iter()
            .map(String::as_str)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn get(&self, handler_id: &str, scopes: &[String]) -> Option<&str> {
        self.entries
            .get(handler_id)?
            .get(&Self::scope_key(scopes))
            .map(String::as_str)
    }

    pub fn insert(&mut self, handler_id: &str, scopes: &[String], token: impl Into<String>) {
        self.entries
            .entry(handler_id.to_string())
            .or_default()
            .insert(Self::scope_key(scopes), token.into());
    }

    /// Drops every token cached for `handler_id`.
    pub fn evict_handler(&mut self, handler_id: &str) {
        self.entries.remove(handler_id);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(HashMap::is_empty)
    }
}

/// Context of one inbound turn.
pub struct TurnContext {
    activity: Activity,
    identity: Option<ClaimsIdentity>,
    token_cache: TokenCache,
    sender: Arc<dyn TurnSender>,
}

impl TurnContext {
    pub fn new(activity: Activity, sender: Arc<dyn TurnSender>) -> Self {
        Self {
            activity,
            identity: None,
            token_cache: TokenCache::new(),
            sender,
        }
    }

    #[must_use]
    pub fn with_identity(mut self, identity: ClaimsIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn activity(&self) -> &Activity {
        &self.activity
    }

    pub fn activity_mut(&mut self) -> &mut Activity {
        &mut self.activity
    }

    /// Replaces the activity, returning the previous one.
    pub fn replace_activity(&mut self, activity: Activity) -> Activity {
        std::mem::replace(&mut self.activity, activity)
    }

    pub fn identity(&self) -> Option<&ClaimsIdentity> {
        self.identity.as_ref()
    }

    pub fn token_cache(&self) -> &TokenCache {
        &self.token_cache
    }

    pub fn token_cache_mut(&mut self) -> &mut TokenCache {
        &mut self.token_cache
    }

    pub async fn send_text(&self, text: &str) -> Result<()> {
        self.sender.send_text(text).await
    }

    pub async fn send_sign_in_card(&self, card: &SignInCard) -> Result<()> {
        self.sender.send_sign_in_card(card).await
    }

    pub async fn send_invoke_response(&self, response: &InvokeResponse) -> Result<()> {
        self.sender.send_invoke_response(response).await
    }
}

impl fmt::Debug for TurnContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TurnContext")
            .field("activity", &self.activity)
            .field("identity", &self.identity)
            .field("token_cache", &self.token_cache)
            .finish_non_exhaustive()
    }
}
