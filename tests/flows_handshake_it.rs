#![cfg(feature = "reqwest")]

// crates.io
use httpmock::prelude::*;
// self
use oauth2_courier::{
	_preludet::*,
	auth::{ProviderId, ScopeSet, StateToken},
	error::GrantError,
	provider::{ProviderDescriptor, ProviderQuirks},
	store::CredentialStore,
};

const CLIENT_ID: &str = "client-link";
const CLIENT_SECRET: &str = "secret-link";
const EMAIL: &str = "sleeper@example.com";
const TOKEN_BODY: &str = "{\"access_token\":\"access-linked\",\"refresh_token\":\"refresh-linked\",\"token_type\":\"bearer\",\"expires_in\":28800,\"scope\":\"sleep\"}";

fn build_descriptor(server: &MockServer) -> ProviderDescriptor {
	let provider_id =
		ProviderId::new("mock-sleep").expect("Provider identifier should be valid for handshake test.");

	ProviderDescriptor::builder(provider_id)
		.authorization_endpoint(
			Url::parse(&server.url("/oauth2/authorize"))
				.expect("Mock authorization endpoint should parse successfully."),
		)
		.token_endpoint(
			Url::parse(&server.url("/oauth2/token"))
				.expect("Mock token endpoint should parse successfully."),
		)
		.quirks(ProviderQuirks::default())
		.build()
		.expect("Provider descriptor should build successfully.")
}

fn scope() -> ScopeSet {
	ScopeSet::new(["sleep"]).expect("Scope set should be valid for handshake test.")
}

async fn mock_token_success(server: &MockServer) -> httpmock::Mock<'_> {
	server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/oauth2/token")
				.header("content-type", "application/x-www-form-urlencoded");
			then.status(200).header("content-type", "application/json").body(TOKEN_BODY);
		})
		.await
}

#[tokio::test]
async fn begin_login_stores_a_pending_record_and_builds_the_authorize_url() {
	let server = MockServer::start_async().await;
	let (broker, store) =
		build_reqwest_test_broker(build_descriptor(&server), CLIENT_ID, CLIENT_SECRET, scope());
	let redirect = broker.begin_login(EMAIL).await.expect("Login should start.");
	let record = store
		.get_by_state(&redirect.state)
		.await
		.expect("State lookup should succeed.")
		.expect("Pending record should be stored.");

	assert_eq!(record.identity.as_ref(), EMAIL);
	assert!(record.token.is_none());
	assert!(!record.has_token());

	let pairs: HashMap<_, _> = redirect.authorize_url.query_pairs().into_owned().collect();

	assert_eq!(pairs.get("response_type"), Some(&"code".into()));
	assert_eq!(pairs.get("client_id"), Some(&CLIENT_ID.into()));
	assert_eq!(pairs.get("redirect_uri"), Some(&TEST_REDIRECT_URI.into()));
	assert_eq!(pairs.get("scope"), Some(&"sleep".into()));
	assert_eq!(pairs.get("state"), Some(&redirect.state.to_string()));
	assert_eq!(pairs.get("code_challenge_method"), Some(&"S256".into()));
	assert!(pairs.contains_key("code_challenge"));
	assert!(!pairs.contains_key("access_type"));
}

#[tokio::test]
async fn offline_access_quirk_adds_the_access_type_parameter() {
	let server = MockServer::start_async().await;
	let descriptor = ProviderDescriptor {
		quirks: ProviderQuirks { request_offline_access: true, ..ProviderQuirks::default() },
		..build_descriptor(&server)
	};
	let (broker, _store) =
		build_reqwest_test_broker(descriptor, CLIENT_ID, CLIENT_SECRET, scope());
	let redirect = broker.begin_login(EMAIL).await.expect("Login should start.");
	let pairs: HashMap<_, _> = redirect.authorize_url.query_pairs().into_owned().collect();

	assert_eq!(pairs.get("access_type"), Some(&"offline".into()));
}

#[tokio::test]
async fn complete_login_links_the_account_and_consumes_the_state() {
	let server = MockServer::start_async().await;
	let (broker, store) =
		build_reqwest_test_broker(build_descriptor(&server), CLIENT_ID, CLIENT_SECRET, scope());
	let redirect = broker.begin_login(EMAIL).await.expect("Login should start.");
	let mock = mock_token_success(&server).await;
	let linked = broker
		.complete_login(&redirect.state, "valid-code")
		.await
		.expect("Callback should complete the login.");

	mock.assert_async().await;

	let credential = linked
		.token
		.as_ref()
		.expect("Linked record should carry a token.")
		.decode()
		.expect("Linked token should decode.");

	assert_eq!(credential.access_token.expose(), "access-linked");
	assert_eq!(credential.refresh_token.as_ref().map(|secret| secret.expose()), Some("refresh-linked"));
	assert!(credential.expires_at.is_some_and(|expires_at| expires_at > OffsetDateTime::now_utc()));
	assert_eq!(
		store.get_by_state(&redirect.state).await.expect("State lookup should succeed."),
		Some(linked.clone())
	);
	assert!(linked.state.as_ref().is_some_and(|state| state.is_consumed()));

	let snapshot = store.get_all().await.expect("Snapshot should succeed.");
	let err = broker
		.complete_login(&redirect.state, "valid-code")
		.await
		.expect_err("A consumed state must not validate twice.");

	assert!(matches!(err, Error::InvalidState { .. }));
	assert_eq!(err.http_status(), 401);
	assert_eq!(store.get_all().await.expect("Snapshot should succeed."), snapshot);

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn unknown_state_is_rejected_without_writes() {
	let server = MockServer::start_async().await;
	let (broker, store) =
		build_reqwest_test_broker(build_descriptor(&server), CLIENT_ID, CLIENT_SECRET, scope());

	broker.begin_login(EMAIL).await.expect("Login should start.");

	let snapshot = store.get_all().await.expect("Snapshot should succeed.");

	for state in [StateToken::generate().to_string(), String::new(), "bad state!".into()] {
		let err = broker
			.complete_login(&state, "any-code")
			.await
			.expect_err("Unknown states must be rejected.");

		assert!(matches!(err, Error::InvalidState { .. }));
	}

	assert_eq!(store.get_all().await.expect("Snapshot should succeed."), snapshot);
}

#[tokio::test]
async fn expired_state_is_rejected_before_the_exchange() {
	let server = MockServer::start_async().await;
	let (broker, store) =
		build_reqwest_test_broker(build_descriptor(&server), CLIENT_ID, CLIENT_SECRET, scope());
	let broker = broker.with_state_ttl(Duration::ZERO);
	let redirect = broker.begin_login(EMAIL).await.expect("Login should start.");
	let mock = mock_token_success(&server).await;
	let snapshot = store.get_all().await.expect("Snapshot should succeed.");
	let err = broker
		.complete_login(&redirect.state, "late-code")
		.await
		.expect_err("Expired states must be rejected.");

	assert!(matches!(err, Error::InvalidState { .. }));
	assert_eq!(store.get_all().await.expect("Snapshot should succeed."), snapshot);

	mock.assert_calls_async(0).await;
}

#[tokio::test]
async fn exchange_failure_leaves_the_store_untouched() {
	let server = MockServer::start_async().await;
	let (broker, store) =
		build_reqwest_test_broker(build_descriptor(&server), CLIENT_ID, CLIENT_SECRET, scope());
	let redirect = broker.begin_login(EMAIL).await.expect("Login should start.");
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth2/token");
			then.status(400)
				.header("content-type", "application/json")
				.body("{\"error\":\"invalid_grant\",\"error_description\":\"code expired\"}");
		})
		.await;
	let snapshot = store.get_all().await.expect("Snapshot should succeed.");
	let err = broker
		.complete_login(&redirect.state, "stale-code")
		.await
		.expect_err("Rejected codes must fail the callback.");

	mock.assert_async().await;

	assert!(matches!(err, Error::ExchangeFailed(GrantError::InvalidGrant { .. })));
	assert_eq!(err.http_status(), 500);
	assert_eq!(store.get_all().await.expect("Snapshot should succeed."), snapshot);
}

#[tokio::test]
async fn a_new_login_supersedes_the_previous_state() {
	let server = MockServer::start_async().await;
	let (broker, store) =
		build_reqwest_test_broker(build_descriptor(&server), CLIENT_ID, CLIENT_SECRET, scope());
	let first = broker.begin_login(EMAIL).await.expect("First login should start.");
	let second = broker.begin_login(EMAIL).await.expect("Second login should start.");

	assert!(store.get_by_state(&first.state).await.expect("Lookup should succeed.").is_none());
	assert_eq!(store.len(), 1);

	let err = broker
		.complete_login(&first.state, "code")
		.await
		.expect_err("The superseded state must not validate.");

	assert!(matches!(err, Error::InvalidState { .. }));

	let mock = mock_token_success(&server).await;

	broker.complete_login(&second.state, "code").await.expect("The live state should validate.");

	mock.assert_async().await;
}

#[tokio::test]
async fn relinking_keeps_the_existing_token_until_the_callback() {
	let server = MockServer::start_async().await;
	let (broker, store) =
		build_reqwest_test_broker(build_descriptor(&server), CLIENT_ID, CLIENT_SECRET, scope());
	let redirect = broker.begin_login(EMAIL).await.expect("Login should start.");
	let mock = mock_token_success(&server).await;
	let linked =
		broker.complete_login(&redirect.state, "code").await.expect("Login should complete.");

	mock.assert_async().await;

	let again = broker.begin_login(EMAIL).await.expect("Relink should start.");
	let pending = store
		.get_by_state(&again.state)
		.await
		.expect("Lookup should succeed.")
		.expect("Relink record should be stored.");

	assert_eq!(pending.token, linked.token);
}

#[tokio::test]
async fn caller_supplied_states_cannot_be_reused_across_users() {
	let server = MockServer::start_async().await;
	let (broker, _store) =
		build_reqwest_test_broker(build_descriptor(&server), CLIENT_ID, CLIENT_SECRET, scope());
	let state = broker.issue_state();

	broker
		.begin_login_with_state(EMAIL, state.clone())
		.await
		.expect("Login with an issued state should start.");

	let err = broker
		.begin_login_with_state("intruder@example.com", state)
		.await
		.expect_err("Another user must not adopt a live state.");

	assert!(matches!(err, Error::InvalidState { .. }));
}

#[tokio::test]
async fn consumed_states_cannot_be_registered_again() {
	let server = MockServer::start_async().await;
	let (broker, store) =
		build_reqwest_test_broker(build_descriptor(&server), CLIENT_ID, CLIENT_SECRET, scope());
	let state = broker.issue_state();

	broker
		.begin_login_with_state(EMAIL, state.clone())
		.await
		.expect("Login with an issued state should start.");

	let mock = mock_token_success(&server).await;

	broker.complete_login(&state, "code").await.expect("Login should complete.");
	broker.begin_login(EMAIL).await.expect("Relink should start.");

	let snapshot = store.get_all().await.expect("Snapshot should succeed.");

	for email in ["mallory@example.com", EMAIL] {
		let err = broker
			.begin_login_with_state(email, state.clone())
			.await
			.expect_err("A consumed state must not be registered again.");

		assert!(matches!(err, Error::InvalidState { .. }));
	}

	let err = broker
		.complete_login(&state, "code")
		.await
		.expect_err("A consumed state must not validate a second exchange.");

	assert!(matches!(err, Error::InvalidState { .. }));
	assert_eq!(store.get_all().await.expect("Snapshot should succeed."), snapshot);

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn superseded_states_cannot_be_adopted_by_another_user() {
	let server = MockServer::start_async().await;
	let (broker, _store) =
		build_reqwest_test_broker(build_descriptor(&server), CLIENT_ID, CLIENT_SECRET, scope());
	let first = broker.begin_login(EMAIL).await.expect("First login should start.");

	broker.begin_login(EMAIL).await.expect("Second login should start.");

	let err = broker
		.begin_login_with_state("mallory@example.com", first.state.clone())
		.await
		.expect_err("A superseded state must not be adopted.");

	assert!(matches!(err, Error::InvalidState { .. }));

	let mock = mock_token_success(&server).await;
	let err = broker
		.complete_login(&first.state, "code")
		.await
		.expect_err("A superseded state must not validate.");

	assert!(matches!(err, Error::InvalidState { .. }));

	mock.assert_calls_async(0).await;
}
