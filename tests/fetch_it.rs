#![cfg(feature = "reqwest")]

// crates.io
use httpmock::prelude::*;
use serde::Deserialize;
// self
use oauth2_courier::{
	_preludet::*,
	auth::{Credential, UserIdentity},
	fetch::JsonResourceFetcher,
	flows::{TokenFuture, TokenSource},
	sweep::DataFetcher,
};

struct StaticSource(Credential);
impl TokenSource for StaticSource {
	fn token(&self) -> TokenFuture<'_> {
		Box::pin(async move { Ok(self.0.clone()) })
	}

	fn current(&self) -> Credential {
		self.0.clone()
	}
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SleepSummary {
	summary: SleepTotals,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SleepTotals {
	total_minutes_asleep: u32,
}

fn source() -> StaticSource {
	StaticSource(
		Credential::builder()
			.access_token("access-sleep")
			.build()
			.expect("Credential fixture should build successfully."),
	)
}

fn identity() -> UserIdentity {
	UserIdentity::new("sleeper@example.com").expect("Identity should be valid for fetch test.")
}

fn template(server: &MockServer) -> String {
	server.url("/1/user/-/sleep/date/{date}.json")
}

fn today() -> String {
	let date = OffsetDateTime::now_utc().date();

	format!("{:04}-{:02}-{:02}", date.year(), u8::from(date.month()), date.day())
}

#[tokio::test]
async fn fetch_sends_the_bearer_token_and_decodes_the_dataset() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path(format!("/1/user/-/sleep/date/{}.json", today()))
				.header("authorization", "Bearer access-sleep");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"sleep\":[],\"summary\":{\"totalMinutesAsleep\":431,\"totalSleepRecords\":1}}");
		})
		.await;
	let fetcher = JsonResourceFetcher::<SleepSummary>::new(test_reqwest_http_client().0, template(&server))
		.expect("Fetcher should build for the mock template.");
	let dataset = fetcher.fetch(&identity(), &source()).await.expect("Fetch should succeed.");

	mock.assert_async().await;

	assert_eq!(dataset.summary.total_minutes_asleep, 431);
}

#[tokio::test]
async fn non_success_statuses_become_fetch_failures() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(GET);
			then.status(429).body("{\"errors\":[{\"errorType\":\"request\"}]}");
		})
		.await;
	let fetcher = JsonResourceFetcher::<serde_json::Value>::new(
		test_reqwest_http_client().0,
		template(&server),
	)
	.expect("Fetcher should build for the mock template.");
	let err = fetcher.fetch(&identity(), &source()).await.expect_err("HTTP 429 must fail.");

	mock.assert_async().await;

	assert!(matches!(err, Error::FetchFailed { .. }));
	assert!(err.to_string().contains("429"));
}

#[tokio::test]
async fn mismatched_bodies_report_a_fetch_failure() {
	let server = MockServer::start_async().await;
	let _mock = server
		.mock_async(|when, then| {
			when.method(GET);
			then.status(200).header("content-type", "application/json").body("{\"summary\":{}}");
		})
		.await;
	let fetcher = JsonResourceFetcher::<SleepSummary>::new(test_reqwest_http_client().0, template(&server))
		.expect("Fetcher should build for the mock template.");
	let err = fetcher.fetch(&identity(), &source()).await.expect_err("Missing fields must fail.");

	assert!(matches!(err, Error::FetchFailed { source: Some(_), .. }));
}
