//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::Value;
use turnauth_auth::handlers::HandlerCallbacks;
use turnauth_auth::prelude::*;
use turnauth_auth::storage::ActiveAuthorizationHandler;
use turnauth_auth::token::{TokenExchangeRequest, TokenOrSignInResource, UserToken};
use turnauth_auth::{HandlerKind, TokenResponse};
use turnauth_core::{
    Activity, ConversationReference, InvokeResponse, MSTEAMS_CHANNEL, SignInCard, SignInResource,
    TokenExchangeResource, TurnContext, TurnSender,
};
use turnauth_storage::MemoryStorage;

pub const USER: &str = "user-1";
pub const CONVERSATION: &str = "conv-1";
pub const CONNECTION: &str = "graph-connection";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("turnauth_auth=debug")
        .with_test_writer()
        .try_init();
}

/// Builds an unsigned JWT whose payload carries `aud`.
pub fn fake_jwt(aud: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"aud":"{aud}","sub":"{USER}"}}"#));
    let signature = URL_SAFE_NO_PAD.encode("fake-sig");
    format!("{header}.{payload}.{signature}")
}

pub fn scopes(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

// ---------------------------------------------------------------------------
// Turn sender
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingSender {
    pub texts: Mutex<Vec<String>>,
    pub cards: Mutex<Vec<SignInCard>>,
    pub invoke_responses: Mutex<Vec<InvokeResponse>>,
}

impl RecordingSender {
    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }

    pub fn cards(&self) -> Vec<SignInCard> {
        self.cards.lock().unwrap().clone()
    }

    pub fn invoke_statuses(&self) -> Vec<u16> {
        self.invoke_responses
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.status)
            .collect()
    }

    pub fn last_invoke_response(&self) -> Option<InvokeResponse> {
        self.invoke_responses.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl TurnSender for RecordingSender {
    async fn send_text(&self, text: &str) -> turnauth_core::Result<()> {
        self.texts.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn send_sign_in_card(&self, card: &SignInCard) -> turnauth_core::Result<()> {
        self.cards.lock().unwrap().push(card.clone());
        Ok(())
    }

    async fn send_invoke_response(&self, response: &InvokeResponse) -> turnauth_core::Result<()> {
        self.invoke_responses.lock().unwrap().push(response.clone());
        Ok(())
    }
}

pub fn message(conversation: &str, text: &str) -> Activity {
    Activity::message(MSTEAMS_CHANNEL, USER, conversation, text)
}

pub fn invoke(name: &str, value: Value) -> Activity {
    Activity::invoke(MSTEAMS_CHANNEL, USER, CONVERSATION, name, value)
}

pub fn turn(activity: Activity, sender: &Arc<RecordingSender>) -> TurnContext {
    TurnContext::new(activity, sender.clone())
}

// ---------------------------------------------------------------------------
// User token service
// ---------------------------------------------------------------------------

/// In-memory user token service.
///
/// `get_token_or_sign_in_resource` returns the signed-in token when set,
/// redeems `valid_code` for `code_token`, and otherwise hands out a sign-in
/// resource.
#[derive(Default)]
pub struct MockUserTokenClient {
    pub signed_in_token: Mutex<Option<String>>,
    pub valid_code: Mutex<Option<(String, String)>>,
    pub offer_token_exchange: bool,
    pub exchange_result: Mutex<Option<String>>,
    pub fail_exchange: bool,
    pub codes_seen: Mutex<Vec<Option<String>>>,
    pub exchange_calls: Mutex<Vec<TokenExchangeRequest>>,
    pub sign_outs: Mutex<usize>,
}

impl MockUserTokenClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token_exchange() -> Self {
        Self {
            offer_token_exchange: true,
            ..Self::default()
        }
    }

    pub fn accept_code(&self, code: &str, token: &str) {
        *self.valid_code.lock().unwrap() = Some((code.to_string(), token.to_string()));
    }

    pub fn sign_in(&self, token: &str) {
        *self.signed_in_token.lock().unwrap() = Some(token.to_string());
    }

    pub fn set_exchange_result(&self, token: Option<&str>) {
        *self.exchange_result.lock().unwrap() = token.map(str::to_string);
    }

    /// Number of calls that carried a magic code.
    pub fn code_redemptions(&self) -> usize {
        self.codes_seen
            .lock()
            .unwrap()
            .iter()
            .filter(|code| code.is_some())
            .count()
    }
}

#[async_trait]
impl UserTokenClient for MockUserTokenClient {
    async fn get_token_or_sign_in_resource(
        &self,
        _user_id: &str,
        connection_name: &str,
        _channel_id: &str,
        _conversation: &ConversationReference,
        _relates_to: Option<&ConversationReference>,
        code: Option<&str>,
    ) -> AuthResult<TokenOrSignInResource> {
        self.codes_seen
            .lock()
            .unwrap()
            .push(code.map(str::to_string));

        if let Some(code) = code {
            let valid = self.valid_code.lock().unwrap().clone();
            return Ok(match valid {
                Some((expected, token)) if expected == code => {
                    TokenOrSignInResource::with_token(UserToken::new(connection_name, token))
                }
                _ => TokenOrSignInResource::default(),
            });
        }

        if let Some(token) = self.signed_in_token.lock().unwrap().clone() {
            return Ok(TokenOrSignInResource::with_token(UserToken::new(
                connection_name,
                token,
            )));
        }

        let token_exchange_resource = self.offer_token_exchange.then(|| TokenExchangeResource {
            id: Some("exchange-1".to_string()),
            uri: Some("api://bot/sso".to_string()),
            provider_id: None,
        });
        Ok(TokenOrSignInResource::with_sign_in_resource(SignInResource {
            sign_in_link: "https://token.example/sign-in".to_string(),
            token_exchange_resource,
        }))
    }

    async fn exchange_token(
        &self,
        _user_id: &str,
        connection_name: &str,
        _channel_id: &str,
        request: &TokenExchangeRequest,
    ) -> AuthResult<Option<UserToken>> {
        self.exchange_calls.lock().unwrap().push(request.clone());
        if self.fail_exchange {
            return Err(AuthError::token_service("exchange endpoint unavailable"));
        }
        Ok(self
            .exchange_result
            .lock()
            .unwrap()
            .clone()
            .map(|token| UserToken::new(connection_name, token)))
    }

    async fn sign_out(
        &self,
        _user_id: &str,
        _connection_name: &str,
        _channel_id: &str,
    ) -> AuthResult<()> {
        *self.sign_outs.lock().unwrap() += 1;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Connections
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockProvider {
    pub obo_calls: Mutex<Vec<Vec<String>>>,
    pub agentic_calls: Mutex<Vec<(String, String, String, Vec<String>)>>,
    pub fail_agentic: bool,
}

impl MockProvider {
    pub fn agentic_call_count(&self) -> usize {
        self.agentic_calls.lock().unwrap().len()
    }

    pub fn obo_call_count(&self) -> usize {
        self.obo_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl AccessTokenProvider for MockProvider {
    async fn acquire_token_on_behalf_of(
        &self,
        scopes: &[String],
        _token: &str,
    ) -> AuthResult<String> {
        self.obo_calls.lock().unwrap().push(scopes.to_vec());
        Ok(format!("obo:{}", scopes.join(" ")))
    }

    async fn get_agentic_user_token(
        &self,
        tenant_id: &str,
        agentic_instance_id: &str,
        agentic_user_id: &str,
        scopes: &[String],
    ) -> AuthResult<String> {
        self.agentic_calls.lock().unwrap().push((
            tenant_id.to_string(),
            agentic_instance_id.to_string(),
            agentic_user_id.to_string(),
            scopes.to_vec(),
        ));
        if self.fail_agentic {
            return Err(AuthError::token_service("agentic identity disabled"));
        }
        Ok(format!("agentic:{}", scopes.join(" ")))
    }
}

/// Every lookup resolves to the same provider; named lookups must be known.
pub struct MockConnections {
    pub provider: Arc<MockProvider>,
    pub names: HashSet<String>,
    pub lookups: Mutex<Vec<String>>,
}

impl MockConnections {
    pub fn new(provider: Arc<MockProvider>) -> Self {
        Self {
            provider,
            names: HashSet::from(["obo".to_string(), "blueprint".to_string()]),
            lookups: Mutex::new(Vec::new()),
        }
    }
}

impl ConnectionManager for MockConnections {
    fn get_connection(&self, name: &str) -> AuthResult<Arc<dyn AccessTokenProvider>> {
        self.lookups.lock().unwrap().push(format!("name:{name}"));
        if self.names.contains(name) {
            Ok(self.provider.clone())
        } else {
            Err(AuthError::configuration(format!("connection '{name}' is not configured")))
        }
    }

    fn get_default_connection(&self) -> AuthResult<Arc<dyn AccessTokenProvider>> {
        self.lookups.lock().unwrap().push("default".to_string());
        Ok(self.provider.clone())
    }

    fn get_token_provider(
        &self,
        audience: &str,
        service_url: &str,
    ) -> AuthResult<Arc<dyn AccessTokenProvider>> {
        self.lookups
            .lock()
            .unwrap()
            .push(format!("audience:{audience}@{service_url}"));
        Ok(self.provider.clone())
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

pub struct Harness {
    pub storage: Arc<MemoryStorage>,
    pub client: Arc<MockUserTokenClient>,
    pub provider: Arc<MockProvider>,
    pub connections: Arc<MockConnections>,
}

impl Harness {
    pub fn new(client: MockUserTokenClient) -> Self {
        Self::with_provider(client, MockProvider::default())
    }

    pub fn with_provider(client: MockUserTokenClient, provider: MockProvider) -> Self {
        init_tracing();
        let provider = Arc::new(provider);
        Self {
            storage: Arc::new(MemoryStorage::new()),
            client: Arc::new(client),
            connections: Arc::new(MockConnections::new(provider.clone())),
            provider,
        }
    }

    pub fn dependencies(&self) -> AuthorizationDependencies {
        AuthorizationDependencies {
            storage: self.storage.clone(),
            user_token_client: self.client.clone(),
            connections: self.connections.clone(),
        }
    }

    pub fn manager(&self, options: &AuthorizationOptions) -> AuthorizationManager {
        AuthorizationManager::new(options, self.dependencies()).unwrap()
    }
}

// ---------------------------------------------------------------------------
// Scripted handler
// ---------------------------------------------------------------------------

/// Handler that replays a script of statuses and records what it saw.
pub struct ScriptedHandler {
    id: String,
    script: Mutex<VecDeque<AuthResult<AuthorizationHandlerStatus>>>,
    fallback: AuthorizationHandlerStatus,
    pub seen_texts: Mutex<Vec<Option<String>>>,
    pub seen_sessions: Mutex<Vec<Option<String>>>,
    /// When set, a `Pending` step persists a session through this storage.
    storage: Option<turnauth_auth::HandlerStorage>,
    callbacks: HandlerCallbacks,
}

impl ScriptedHandler {
    pub fn new(id: &str, fallback: AuthorizationHandlerStatus) -> Self {
        Self {
            id: id.to_string(),
            script: Mutex::new(VecDeque::new()),
            fallback,
            seen_texts: Mutex::new(Vec::new()),
            seen_sessions: Mutex::new(Vec::new()),
            storage: None,
            callbacks: HandlerCallbacks::new(),
        }
    }

    pub fn persisting(mut self, storage: Arc<MemoryStorage>) -> Self {
        self.storage = Some(turnauth_auth::HandlerStorage::new(storage));
        self
    }

    pub fn then(self, status: AuthorizationHandlerStatus) -> Self {
        self.script.lock().unwrap().push_back(Ok(status));
        self
    }

    pub fn then_fail(self, error: AuthError) -> Self {
        self.script.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn calls(&self) -> usize {
        self.seen_texts.lock().unwrap().len()
    }
}

#[async_trait]
impl AuthorizationHandler for ScriptedHandler {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Connector
    }

    async fn signin(
        &self,
        turn: &mut TurnContext,
        active: Option<&ActiveAuthorizationHandler>,
    ) -> AuthResult<AuthorizationHandlerStatus> {
        self.seen_texts
            .lock()
            .unwrap()
            .push(turn.activity().text.clone());
        self.seen_sessions
            .lock()
            .unwrap()
            .push(active.map(|a| a.id.clone()));

        let next = self.script.lock().unwrap().pop_front();
        let status = next.unwrap_or(Ok(self.fallback))?;

        if let (AuthorizationHandlerStatus::Pending, None, Some(storage)) =
            (status, active, &self.storage)
        {
            let session = ActiveAuthorizationHandler::new(self.id.clone(), turn.activity().clone());
            storage.write(turn.activity(), &session).await?;
        }
        Ok(status)
    }

    async fn signout(&self, turn: &mut TurnContext) -> AuthResult<()> {
        turn.token_cache_mut().evict_handler(&self.id);
        Ok(())
    }

    async fn token(
        &self,
        _turn: &mut TurnContext,
        _options: &TokenOptions,
    ) -> AuthResult<TokenResponse> {
        Ok(TokenResponse::empty())
    }

    fn callbacks(&self) -> &HandlerCallbacks {
        &self.callbacks
    }
}
