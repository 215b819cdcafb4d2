// std
use std::{
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration as StdDuration,
};
// crates.io
use parking_lot::Mutex;
use time::{Duration, OffsetDateTime};
// self
use oauth2_courier::{
	auth::{Credential, SerializedCredential, UserIdentity, UserRecord},
	error::{Error, Result},
	flows::{RefreshGuard, TokenFuture, TokenSource, TokenSourceFactory},
	store::{CredentialStore, MemoryStore, StoreError, StoreFuture},
	sweep::{
		BatchNotifier, DataFetcher, Notifier, Schedule, SweepConfig, SweepFuture, SweepOutcome,
		SweepReport, SweepState,
	},
};

/// Hands out the stored credential; rotates it on `token()` when asked to.
struct FakeSource {
	current: Mutex<Credential>,
	rotate: bool,
}
impl TokenSource for FakeSource {
	fn token(&self) -> TokenFuture<'_> {
		Box::pin(async move {
			let mut current = self.current.lock();

			if self.rotate {
				*current = credential(&format!("{}-rotated", current.access_token.expose()));
			}

			Ok(current.clone())
		})
	}

	fn current(&self) -> Credential {
		self.current.lock().clone()
	}
}

#[derive(Default)]
struct FakeSources {
	rotate: bool,
}
impl TokenSourceFactory for FakeSources {
	type Source = FakeSource;

	fn token_source(&self, credential: Credential) -> Result<Self::Source> {
		Ok(FakeSource { current: Mutex::new(credential), rotate: self.rotate })
	}
}

/// Returns the access token as the dataset; fails or stalls for selected users.
#[derive(Default)]
struct FakeFetcher {
	fail_for: Option<String>,
	delay: Option<StdDuration>,
	calls: AtomicUsize,
}
impl DataFetcher for FakeFetcher {
	type Dataset = String;

	fn fetch<'a>(
		&'a self,
		identity: &'a UserIdentity,
		source: &'a dyn TokenSource,
	) -> SweepFuture<'a, Self::Dataset> {
		Box::pin(async move {
			self.calls.fetch_add(1, Ordering::SeqCst);

			if let Some(delay) = self.delay {
				tokio::time::sleep(delay).await;
			}
			if self.fail_for.as_deref() == Some(identity.as_ref()) {
				return Err(Error::FetchFailed { message: "HTTP 503".into(), source: None });
			}

			Ok(source.token().await?.access_token.expose().to_owned())
		})
	}
}

#[derive(Default)]
struct RecordingNotifier {
	fail_for: Option<String>,
	delivered: Mutex<Vec<(String, String)>>,
}
impl Notifier<String> for RecordingNotifier {
	fn notify<'a>(&'a self, identity: &'a UserIdentity, dataset: String) -> SweepFuture<'a, ()> {
		Box::pin(async move {
			if self.fail_for.as_deref() == Some(identity.as_ref()) {
				return Err(Error::NotifyFailed { message: "mailbox full".into(), source: None });
			}

			self.delivered.lock().push((identity.to_string(), dataset));

			Ok(())
		})
	}
}

struct UnavailableStore;
impl CredentialStore for UnavailableStore {
	fn upsert(&self, _record: UserRecord) -> StoreFuture<'_, ()> {
		Box::pin(async { Err(StoreError::Backend { message: "offline".into() }) })
	}

	fn get_by_state<'a>(
		&'a self,
		_state: &'a oauth2_courier::auth::StateToken,
	) -> StoreFuture<'a, Option<UserRecord>> {
		Box::pin(async { Err(StoreError::Backend { message: "offline".into() }) })
	}

	fn get_by_identity<'a>(
		&'a self,
		_identity: &'a UserIdentity,
	) -> StoreFuture<'a, Option<UserRecord>> {
		Box::pin(async { Err(StoreError::Backend { message: "offline".into() }) })
	}

	fn get_all(&self) -> StoreFuture<'_, Vec<UserRecord>> {
		Box::pin(async { Err(StoreError::Backend { message: "offline".into() }) })
	}
}

/// Fires `remaining` times, 10ms apart, then stops.
struct CountdownSchedule {
	remaining: AtomicUsize,
}
impl Schedule for CountdownSchedule {
	fn next_after(&self, now: OffsetDateTime) -> Option<OffsetDateTime> {
		self.remaining
			.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
			.ok()
			.map(|_| now + Duration::milliseconds(10))
	}
}

type TestNotifier = BatchNotifier<FakeSources, FakeFetcher, RecordingNotifier>;

fn credential(access: &str) -> Credential {
	Credential::builder()
		.access_token(access)
		.refresh_token(format!("refresh-{access}"))
		.expires_in(Duration::hours(8))
		.build()
		.expect("Credential fixture should build.")
}

fn email(n: usize) -> String {
	format!("user{n}@example.com")
}

async fn seeded_store(users: usize, malformed: &[usize], unlinked: &[usize]) -> Arc<MemoryStore> {
	let store = Arc::new(MemoryStore::default());

	for n in 1..=users {
		let identity = UserIdentity::new(email(n)).expect("Identity fixture should be valid.");
		let mut record = UserRecord::new(identity);

		if malformed.contains(&n) {
			record = record.with_token(SerializedCredential::from_raw("{\"access_token\":"));
		} else if !unlinked.contains(&n) {
			record = record.with_token(
				credential(&format!("access-{n}")).serialize().expect("Credential should serialize."),
			);
		}

		store.upsert(record).await.expect("Seeding should succeed.");
	}

	store
}

fn driver(
	store: Arc<MemoryStore>,
	sources: FakeSources,
	fetcher: FakeFetcher,
	notifier: RecordingNotifier,
) -> TestNotifier {
	let store: Arc<dyn CredentialStore> = store;

	BatchNotifier::new(store.clone(), sources, RefreshGuard::new(store), fetcher, notifier)
}

fn report(outcome: SweepOutcome) -> SweepReport {
	match outcome {
		SweepOutcome::Completed(report) => report,
		other => panic!("Sweep should complete, got {other:?}."),
	}
}

#[tokio::test]
async fn malformed_user_is_skipped_and_everyone_else_is_served() {
	let store = seeded_store(5, &[3], &[]).await;
	let sweep = driver(store, FakeSources::default(), FakeFetcher::default(), Default::default());
	let report = report(sweep.run_once().await);

	assert_eq!(
		report,
		SweepReport { total: 5, delivered: 4, skipped_malformed: 1, ..Default::default() }
	);

	let delivered = sweep_delivered(&sweep);

	assert_eq!(delivered.len(), 4);
	assert!(delivered.iter().all(|(identity, _)| identity != &email(3)));
}

#[tokio::test]
async fn failures_are_contained_per_user() {
	let store = seeded_store(4, &[], &[2]).await;
	let fetcher = FakeFetcher { fail_for: Some(email(1)), ..Default::default() };
	let notifier = RecordingNotifier { fail_for: Some(email(3)), ..Default::default() };
	let sweep = driver(store, FakeSources::default(), fetcher, notifier);
	let report = report(sweep.run_once().await);

	assert_eq!(
		report,
		SweepReport {
			total: 4,
			delivered: 1,
			skipped_no_token: 1,
			fetch_failed: 1,
			notify_failed: 1,
			..Default::default()
		}
	);
	assert_eq!(sweep_delivered(&sweep), vec![(email(4), "access-4".to_owned())]);
}

#[tokio::test]
async fn empty_store_completes_immediately() {
	let sweep = driver(
		Arc::new(MemoryStore::default()),
		FakeSources::default(),
		FakeFetcher::default(),
		Default::default(),
	);

	assert_eq!(report(sweep.run_once().await), SweepReport::default());
}

#[tokio::test]
async fn rotations_during_a_sweep_are_persisted() {
	let store = seeded_store(2, &[], &[]).await;
	let sweep = driver(
		store.clone(),
		FakeSources { rotate: true },
		FakeFetcher::default(),
		Default::default(),
	);

	assert_eq!(report(sweep.run_once().await).delivered, 2);
	assert_eq!(sweep.guard().metrics().rotations(), 2);

	for n in 1..=2 {
		let identity = UserIdentity::new(email(n)).expect("Identity fixture should be valid.");
		let stored = store
			.get_by_identity(&identity)
			.await
			.expect("Lookup should succeed.")
			.and_then(|record| record.token)
			.expect("Token should remain stored.")
			.decode()
			.expect("Stored token should decode.");

		assert_eq!(stored.access_token.expose(), format!("access-{n}-rotated"));
	}
}

#[tokio::test]
async fn overlapping_triggers_are_skipped() {
	let store = seeded_store(1, &[], &[]).await;
	let fetcher = FakeFetcher { delay: Some(StdDuration::from_millis(200)), ..Default::default() };
	let sweep = driver(store, FakeSources::default(), fetcher, Default::default());
	let (first, second) = tokio::join!(sweep.run_once(), async {
		tokio::time::sleep(StdDuration::from_millis(50)).await;

		sweep.run_once().await
	});

	assert_eq!(report(first).delivered, 1);
	assert_eq!(second, SweepOutcome::AlreadyRunning);
	assert_eq!(sweep.state(), SweepState::Idle);
	assert_eq!(report(sweep.run_once().await).delivered, 1);
}

#[tokio::test]
async fn slow_fetches_time_out() {
	let store = seeded_store(2, &[], &[]).await;
	let fetcher = FakeFetcher { delay: Some(StdDuration::from_millis(200)), ..Default::default() };
	let sweep = driver(store, FakeSources::default(), fetcher, Default::default())
		.with_config(SweepConfig { call_timeout: StdDuration::from_millis(20) });
	let report = report(sweep.run_once().await);

	assert_eq!(report.fetch_failed, 2);
	assert_eq!(report.delivered, 0);
}

#[tokio::test]
async fn unreadable_store_ends_the_run() {
	let store: Arc<dyn CredentialStore> = Arc::new(UnavailableStore);
	let sweep: TestNotifier = BatchNotifier::new(
		store.clone(),
		FakeSources::default(),
		RefreshGuard::new(store),
		FakeFetcher::default(),
		RecordingNotifier::default(),
	);

	assert_eq!(sweep.run_once().await, SweepOutcome::StoreUnavailable);
	assert_eq!(sweep.state(), SweepState::Idle);
}

#[tokio::test]
async fn scheduled_runs_follow_the_schedule_until_it_ends() {
	let store = seeded_store(2, &[], &[]).await;
	let sweep = driver(store, FakeSources::default(), FakeFetcher::default(), Default::default());
	let schedule = CountdownSchedule { remaining: AtomicUsize::new(3) };

	sweep.run_scheduled(&schedule, std::future::pending()).await;

	assert_eq!(sweep_delivered(&sweep).len(), 6);
}

#[tokio::test]
async fn shutdown_stops_the_scheduler() {
	let store = seeded_store(1, &[], &[]).await;
	let sweep = driver(store, FakeSources::default(), FakeFetcher::default(), Default::default());
	let schedule = oauth2_courier::sweep::IntervalSchedule::Every(Duration::hours(1));

	sweep.run_scheduled(&schedule, async {}).await;

	assert!(sweep_delivered(&sweep).is_empty());
}

fn sweep_delivered(sweep: &TestNotifier) -> Vec<(String, String)> {
	sweep.notifier().delivered.lock().clone()
}
