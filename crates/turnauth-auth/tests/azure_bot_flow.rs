//! Interactive sign-in driven through the manager.

mod common;

use std::sync::{Arc, Mutex};

use common::*;
use serde_json::json;
use turnauth_auth::config::AzureBotSettings;
use turnauth_auth::prelude::*;
use turnauth_auth::{HandlerStorage, SigninCategory};
use turnauth_core::{Activity, MSTEAMS_CHANNEL, invoke_names, status_codes};

fn settings() -> AzureBotSettings {
    AzureBotSettings {
        connection_name: CONNECTION.to_string(),
        ..Default::default()
    }
}

fn options(settings: AzureBotSettings) -> AuthorizationOptions {
    AuthorizationOptions::default().with_handler("graph", HandlerSettings::AzureBot(settings))
}

fn graph(_: &Activity) -> Vec<String> {
    vec!["graph".to_string()]
}

async fn session(harness: &Harness) -> Option<turnauth_auth::ActiveAuthorizationHandler> {
    HandlerStorage::new(harness.storage.clone())
        .read(&message(CONVERSATION, ""))
        .await
        .unwrap()
}

async fn step(
    manager: &AuthorizationManager,
    sender: &Arc<RecordingSender>,
    activity: Activity,
) -> (bool, turnauth_core::TurnContext) {
    let mut t = turn(activity, sender);
    let result = manager.process(&mut t, graph).await.unwrap();
    (result.authorized, t)
}

#[tokio::test]
async fn malformed_codes_exhaust_attempts() {
    let harness = Harness::new(MockUserTokenClient::new());
    harness.client.accept_code("999999", "user-token");
    let manager = harness.manager(&options(settings()));
    let sender = Arc::new(RecordingSender::default());

    let (authorized, _) = step(&manager, &sender, message(CONVERSATION, "show my files")).await;
    assert!(!authorized);
    assert_eq!(sender.cards().len(), 1);
    let opened = session(&harness).await.unwrap();
    assert_eq!(opened.attempts_left, Some(2));
    assert_eq!(opened.category, Some(SigninCategory::MagicCode));

    let (authorized, _) = step(&manager, &sender, message(CONVERSATION, "abc")).await;
    assert!(!authorized);
    assert_eq!(session(&harness).await.unwrap().attempts_left, Some(1));
    assert!(sender.texts().last().unwrap().contains("1 attempt(s) left"));

    let (authorized, _) = step(&manager, &sender, message(CONVERSATION, "12")).await;
    assert!(!authorized);
    assert_eq!(session(&harness).await.unwrap().attempts_left, Some(0));

    // a well-formed, even valid, code is refused once attempts are exhausted
    let (authorized, _) = step(&manager, &sender, message(CONVERSATION, "999999")).await;
    assert!(!authorized);
    assert!(session(&harness).await.is_none());
    assert!(
        sender
            .texts()
            .last()
            .unwrap()
            .contains("maximum number of sign-in attempts (2)")
    );
    assert_eq!(harness.client.code_redemptions(), 0);
}

#[tokio::test]
async fn non_ascii_digits_are_a_malformed_code() {
    let harness = Harness::new(MockUserTokenClient::new());
    let manager = harness.manager(&options(settings()));
    let sender = Arc::new(RecordingSender::default());

    step(&manager, &sender, message(CONVERSATION, "show my files")).await;

    for (code, attempts_left) in [("١٢٣٤٥٦", 1), ("１２３４５６", 0)] {
        let (authorized, _) = step(&manager, &sender, message(CONVERSATION, code)).await;
        assert!(!authorized);
        assert_eq!(
            session(&harness).await.unwrap().attempts_left,
            Some(attempts_left)
        );
        assert!(
            sender
                .texts()
                .last()
                .unwrap()
                .contains(&format!("{attempts_left} attempt(s) left"))
        );
    }
    assert_eq!(harness.client.code_redemptions(), 0);
}

#[tokio::test]
async fn sso_disabled_card_does_not_offer_exchange() {
    let harness = Harness::new(MockUserTokenClient::with_token_exchange());
    let manager = harness.manager(&options(AzureBotSettings {
        enable_sso: false,
        ..settings()
    }));
    let sender = Arc::new(RecordingSender::default());

    step(&manager, &sender, message(CONVERSATION, "show my files")).await;

    let cards = sender.cards();
    assert_eq!(cards.len(), 1);
    assert!(cards[0].resource.token_exchange_resource.is_none());
    assert_eq!(
        session(&harness).await.unwrap().category,
        Some(SigninCategory::MagicCode)
    );
}

#[tokio::test]
async fn valid_code_approves_and_restores_original_activity() {
    let harness = Harness::new(MockUserTokenClient::new());
    harness.client.accept_code("123456", "user-token");
    let manager = harness.manager(&options(settings()));
    let sender = Arc::new(RecordingSender::default());

    let successes = Arc::new(Mutex::new(Vec::new()));
    let sink = successes.clone();
    manager.on_sign_in_success(move |_, id| sink.lock().unwrap().push(id.to_string()));

    step(&manager, &sender, message(CONVERSATION, "show my files")).await;
    let (authorized, t) = step(&manager, &sender, message(CONVERSATION, " 123456 ")).await;

    assert!(authorized);
    assert_eq!(t.activity().text.as_deref(), Some("show my files"));
    assert_eq!(t.token_cache().get("graph", &[]), Some("user-token"));
    assert_eq!(successes.lock().unwrap().as_slice(), ["graph".to_string()]);
    assert!(session(&harness).await.is_none());
}

#[tokio::test]
async fn valid_but_refused_code_is_rejected() {
    let harness = Harness::new(MockUserTokenClient::new());
    harness.client.accept_code("123456", "user-token");
    let manager = harness.manager(&options(settings()));
    let sender = Arc::new(RecordingSender::default());

    let failures = Arc::new(Mutex::new(Vec::new()));
    let sink = failures.clone();
    manager.on_sign_in_failure(move |_, id, message| {
        sink.lock()
            .unwrap()
            .push((id.to_string(), message.map(str::to_string)));
    });

    step(&manager, &sender, message(CONVERSATION, "show my files")).await;
    let (authorized, _) = step(&manager, &sender, message(CONVERSATION, "654321")).await;

    assert!(!authorized);
    assert_eq!(harness.client.code_redemptions(), 1);
    assert!(sender.texts().last().unwrap().contains("**654321**"));
    assert!(session(&harness).await.is_none());

    let failures = failures.lock().unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "graph");
}

#[tokio::test]
async fn signed_in_user_is_authorized_immediately() {
    let harness = Harness::new(MockUserTokenClient::new());
    harness.client.sign_in("cached-token");
    let manager = harness.manager(&options(settings()));
    let sender = Arc::new(RecordingSender::default());

    let (authorized, t) = step(&manager, &sender, message(CONVERSATION, "hello")).await;

    assert!(authorized);
    assert!(sender.cards().is_empty());
    assert_eq!(t.token_cache().get("graph", &[]), Some("cached-token"));
    assert!(harness.storage.is_empty());
}

#[tokio::test]
async fn custom_messages_are_rendered() {
    let harness = Harness::new(MockUserTokenClient::new());
    let mut custom = settings();
    custom.max_attempts = 3;
    custom.messages.invalid_code_format = "{attemptsLeft}/{maxAttempts} left".to_string();
    let manager = harness.manager(&options(custom));
    let sender = Arc::new(RecordingSender::default());

    step(&manager, &sender, message(CONVERSATION, "hello")).await;
    step(&manager, &sender, message(CONVERSATION, "nope")).await;

    assert_eq!(sender.texts(), ["2/3 left".to_string()]);
}

#[tokio::test]
async fn token_exchange_retries_until_provider_is_ready() {
    let harness = Harness::new(MockUserTokenClient::with_token_exchange());
    let manager = harness.manager(&options(settings()));
    let sender = Arc::new(RecordingSender::default());

    step(&manager, &sender, message(CONVERSATION, "show my files")).await;
    assert_eq!(
        session(&harness).await.unwrap().category,
        Some(SigninCategory::TokenExchange)
    );

    let payload = json!({"id": "exchange-1", "connectionName": CONNECTION, "token": "sso-token"});

    let (authorized, _) = step(
        &manager,
        &sender,
        invoke(invoke_names::TOKEN_EXCHANGE, payload.clone()),
    )
    .await;
    assert!(!authorized);
    assert_eq!(sender.invoke_statuses(), [status_codes::PRECONDITION_FAILED]);
    assert!(session(&harness).await.is_some());

    harness.client.set_exchange_result(Some("exchanged-token"));
    let (authorized, t) = step(
        &manager,
        &sender,
        invoke(invoke_names::TOKEN_EXCHANGE, payload),
    )
    .await;

    assert!(authorized);
    assert_eq!(
        sender.invoke_statuses(),
        [status_codes::PRECONDITION_FAILED, status_codes::OK]
    );
    let ack = sender.last_invoke_response().unwrap();
    assert_eq!(ack.body.unwrap()["id"], "exchange-1");
    assert_eq!(t.activity().text.as_deref(), Some("show my files"));
    assert_eq!(t.token_cache().get("graph", &[]), Some("exchanged-token"));

    let calls = harness.client.exchange_calls.lock().unwrap();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].token.as_deref(), Some("sso-token"));
}

#[tokio::test]
async fn failing_exchange_is_treated_as_not_ready() {
    let client = MockUserTokenClient {
        offer_token_exchange: true,
        fail_exchange: true,
        ..Default::default()
    };
    let harness = Harness::new(client);
    let manager = harness.manager(&options(settings()));
    let sender = Arc::new(RecordingSender::default());

    step(&manager, &sender, message(CONVERSATION, "hello")).await;
    let payload = json!({"id": "x", "connectionName": CONNECTION, "token": "sso-token"});
    let (authorized, _) =
        step(&manager, &sender, invoke(invoke_names::TOKEN_EXCHANGE, payload)).await;

    assert!(!authorized);
    assert_eq!(sender.invoke_statuses(), [status_codes::PRECONDITION_FAILED]);
    assert!(session(&harness).await.is_some());
}

#[tokio::test]
async fn exchange_for_other_connection_is_rejected() {
    let harness = Harness::new(MockUserTokenClient::with_token_exchange());
    let manager = harness.manager(&options(settings()));
    let sender = Arc::new(RecordingSender::default());

    step(&manager, &sender, message(CONVERSATION, "hello")).await;
    let payload = json!({"id": "x", "connectionName": "other-connection", "token": "sso-token"});
    let (authorized, _) =
        step(&manager, &sender, invoke(invoke_names::TOKEN_EXCHANGE, payload)).await;

    assert!(!authorized);
    let ack = sender.last_invoke_response().unwrap();
    assert_eq!(ack.status, status_codes::BAD_REQUEST);
    let body = ack.body.unwrap();
    assert_eq!(body["connectionName"], CONNECTION);
    assert!(body["failureDetail"].is_string());
    assert!(session(&harness).await.is_none());
    assert!(harness.client.exchange_calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn exchange_without_offer_or_payload_is_rejected() {
    // magic code session: exchange was never offered
    let harness = Harness::new(MockUserTokenClient::new());
    let manager = harness.manager(&options(settings()));
    let sender = Arc::new(RecordingSender::default());

    step(&manager, &sender, message(CONVERSATION, "hello")).await;
    let payload = json!({"id": "x", "connectionName": CONNECTION, "token": "sso-token"});
    let (authorized, _) =
        step(&manager, &sender, invoke(invoke_names::TOKEN_EXCHANGE, payload)).await;
    assert!(!authorized);
    assert_eq!(sender.invoke_statuses(), [status_codes::BAD_REQUEST]);

    // malformed payload
    step(&manager, &sender, message(CONVERSATION, "hello")).await;
    let (authorized, _) = step(
        &manager,
        &sender,
        invoke(invoke_names::TOKEN_EXCHANGE, json!("not an object")),
    )
    .await;
    assert!(!authorized);
    assert_eq!(
        sender.invoke_statuses(),
        [status_codes::BAD_REQUEST, status_codes::BAD_REQUEST]
    );
    assert!(session(&harness).await.is_none());
}

#[tokio::test]
async fn user_cancellation_is_rejected() {
    for activity in [
        invoke(invoke_names::VERIFY_STATE, json!({"state": "CancelledByUser"})),
        invoke(invoke_names::SIGNIN_FAILURE, json!({"code": "resourcematchfailed"})),
    ] {
        let harness = Harness::new(MockUserTokenClient::new());
        let manager = harness.manager(&options(settings()));
        let sender = Arc::new(RecordingSender::default());

        step(&manager, &sender, message(CONVERSATION, "hello")).await;
        let (authorized, _) = step(&manager, &sender, activity).await;

        assert!(!authorized);
        assert_eq!(sender.invoke_statuses(), [status_codes::OK]);
        assert!(session(&harness).await.is_none());
    }
}

#[tokio::test]
async fn verify_state_redeems_code() {
    let harness = Harness::new(MockUserTokenClient::new());
    harness.client.accept_code("123456", "user-token");
    let manager = harness.manager(&options(settings()));
    let sender = Arc::new(RecordingSender::default());

    step(&manager, &sender, message(CONVERSATION, "show my files")).await;
    let (authorized, t) = step(
        &manager,
        &sender,
        invoke(invoke_names::VERIFY_STATE, json!({"state": "123456"})),
    )
    .await;

    assert!(authorized);
    assert_eq!(sender.invoke_statuses(), [status_codes::OK]);
    assert_eq!(t.activity().text.as_deref(), Some("show my files"));
}

#[tokio::test]
async fn unrelated_activity_keeps_flow_pending() {
    let harness = Harness::new(MockUserTokenClient::new());
    let manager = harness.manager(&options(settings()));
    let sender = Arc::new(RecordingSender::default());

    step(&manager, &sender, message(CONVERSATION, "hello")).await;
    let before = session(&harness).await.unwrap();

    let mut event = message(CONVERSATION, "");
    event.activity_type = "event".to_string();
    event.text = None;
    let (authorized, _) = step(&manager, &sender, event).await;

    assert!(!authorized);
    assert_eq!(session(&harness).await.unwrap(), before);
    assert!(sender.texts().is_empty());
}

#[tokio::test]
async fn expired_session_restarts_sign_in() {
    let harness = Harness::new(MockUserTokenClient::new());
    harness.client.accept_code("123456", "user-token");
    let manager = harness.manager(&options(settings()));
    let sender = Arc::new(RecordingSender::default());

    step(&manager, &sender, message(CONVERSATION, "hello")).await;

    let storage = HandlerStorage::new(harness.storage.clone());
    let mut stale = session(&harness).await.unwrap();
    stale.created_at -= time::Duration::hours(1);
    storage.write(&message(CONVERSATION, ""), &stale).await.unwrap();

    let (authorized, _) = step(&manager, &sender, message(CONVERSATION, "123456")).await;

    assert!(!authorized);
    assert_eq!(harness.client.code_redemptions(), 0);
    assert_eq!(sender.cards().len(), 2);
    let fresh = session(&harness).await.unwrap();
    assert_eq!(fresh.attempts_left, Some(2));
    assert_eq!(fresh.activity.text.as_deref(), Some("123456"));
}

#[tokio::test]
async fn token_applies_on_behalf_of_exchange_once_per_turn() {
    let harness = Harness::new(MockUserTokenClient::new());
    harness.client.sign_in(&fake_jwt("api://my-agent"));
    let mut configured = settings();
    configured.obo_connection_name = Some("obo".to_string());
    configured.obo_scopes = scopes(&["https://graph.microsoft.com/.default"]);
    let manager = harness.manager(&options(configured));
    let sender = Arc::new(RecordingSender::default());

    let mut t = turn(message(CONVERSATION, "hello"), &sender);
    let first = manager.token(&mut t, "graph", &TokenOptions::default()).await.unwrap();
    let second = manager.token(&mut t, "graph", &TokenOptions::default()).await.unwrap();

    assert_eq!(first.token.as_deref(), Some("obo:https://graph.microsoft.com/.default"));
    assert_eq!(first, second);
    assert_eq!(harness.provider.obo_call_count(), 1);

    let other = manager
        .exchange_token(&mut t, "graph", &scopes(&["api://other/.default"]))
        .await
        .unwrap();
    assert_eq!(other.token.as_deref(), Some("obo:api://other/.default"));
    assert_eq!(harness.provider.obo_call_count(), 2);
}

#[tokio::test]
async fn token_with_non_exchangeable_audience_is_a_configuration_error() {
    let harness = Harness::new(MockUserTokenClient::new());
    harness.client.sign_in(&fake_jwt("https://graph.microsoft.com"));
    let mut configured = settings();
    configured.obo_scopes = scopes(&["https://graph.microsoft.com/.default"]);
    let manager = harness.manager(&options(configured));
    let sender = Arc::new(RecordingSender::default());

    let mut t = turn(message(CONVERSATION, "hello"), &sender);
    let err = manager
        .token(&mut t, "graph", &TokenOptions::default())
        .await
        .unwrap_err();

    assert!(err.is_configuration_error());
    assert_eq!(harness.provider.obo_call_count(), 0);
}

#[tokio::test]
async fn token_without_sign_in_is_empty() {
    let harness = Harness::new(MockUserTokenClient::new());
    let manager = harness.manager(&options(settings()));
    let sender = Arc::new(RecordingSender::default());

    let mut t = turn(message(CONVERSATION, "hello"), &sender);
    let response = manager.token(&mut t, "graph", &TokenOptions::default()).await.unwrap();

    assert!(!response.has_token());
    assert!(sender.cards().is_empty());
}

#[tokio::test]
async fn signout_calls_token_service_and_evicts_cache() {
    let harness = Harness::new(MockUserTokenClient::new());
    harness.client.sign_in("cached-token");
    let manager = harness.manager(&options(settings()));
    let sender = Arc::new(RecordingSender::default());

    let (_, mut t) = step(&manager, &sender, message(CONVERSATION, "hello")).await;
    assert!(t.token_cache().get("graph", &[]).is_some());

    manager.signout(&mut t, Some("graph")).await.unwrap();

    assert_eq!(*harness.client.sign_outs.lock().unwrap(), 1);
    assert!(t.token_cache().is_empty());
}

#[tokio::test]
async fn unknown_obo_connection_fails_construction() {
    let harness = Harness::new(MockUserTokenClient::new());
    let mut configured = settings();
    configured.obo_connection_name = Some("missing".to_string());

    let err = AuthorizationManager::new(&options(configured), harness.dependencies()).unwrap_err();
    assert!(err.is_configuration_error());
}

#[test]
fn teams_channel_fixture() {
    assert_eq!(message(CONVERSATION, "x").channel_id, MSTEAMS_CHANNEL);
}
