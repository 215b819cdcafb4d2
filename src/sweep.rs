//! Scheduled sweep that fetches each linked user's data and hands it to a notifier.
//!
//! A sweep never fails as a whole. Users are processed one after another; any per-user failure is
//! logged, counted in the [`SweepReport`], and skipped. Nothing is retried within a run.

pub mod schedule;

pub use schedule::*;

// std
use std::pin;
// self
use crate::{
	_prelude::*,
	auth::{UserIdentity, UserRecord},
	flows::{RefreshGuard, TokenSource, TokenSourceFactory},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	store::CredentialStore,
};

/// Boxed future returned by sweep collaborators.
pub type SweepFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Fetches a user's data with a token from their [`TokenSource`].
pub trait DataFetcher
where
	Self: Send + Sync,
{
	/// Data handed to the [`Notifier`].
	type Dataset: Send;

	/// Fetches the dataset for `identity`; failures should be [`Error::FetchFailed`].
	fn fetch<'a>(
		&'a self,
		identity: &'a UserIdentity,
		source: &'a dyn TokenSource,
	) -> SweepFuture<'a, Self::Dataset>;
}

/// Delivers a fetched dataset to its user.
pub trait Notifier<D>
where
	Self: Send + Sync,
{
	/// Delivers `dataset` to `identity`; failures should be [`Error::NotifyFailed`].
	fn notify<'a>(&'a self, identity: &'a UserIdentity, dataset: D) -> SweepFuture<'a, ()>;
}

/// Tunables for [`BatchNotifier`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SweepConfig {
	/// Upper bound for each fetch and each notify call.
	pub call_timeout: std::time::Duration,
}
impl Default for SweepConfig {
	fn default() -> Self {
		Self { call_timeout: std::time::Duration::from_secs(30) }
	}
}

/// Whether a sweep is in progress.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SweepState {
	/// Waiting for the next trigger.
	#[default]
	Idle,
	/// A sweep is processing users.
	Running,
}

/// Per-run counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
	/// Records returned by the store.
	pub total: usize,
	/// Users whose data was fetched and delivered.
	pub delivered: usize,
	/// Users who never completed a login.
	pub skipped_no_token: usize,
	/// Users whose stored credential could not be decoded.
	pub skipped_malformed: usize,
	/// Users whose fetch (or the refresh around it) failed.
	pub fetch_failed: usize,
	/// Users whose delivery failed.
	pub notify_failed: usize,
}

/// Result of a sweep trigger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SweepOutcome {
	/// The sweep ran to the last record.
	Completed(SweepReport),
	/// Another sweep was still running; nothing was done.
	AlreadyRunning,
	/// The store could not be read; nothing was done.
	StoreUnavailable,
}

/// Drives sweeps over every stored user.
pub struct BatchNotifier<S, F, N>
where
	S: ?Sized + TokenSourceFactory,
	F: DataFetcher,
	N: Notifier<F::Dataset>,
{
	store: Arc<dyn CredentialStore>,
	sources: Arc<S>,
	guard: RefreshGuard,
	fetcher: F,
	notifier: N,
	config: SweepConfig,
	state: Mutex<SweepState>,
}
impl<S, F, N> BatchNotifier<S, F, N>
where
	S: ?Sized + TokenSourceFactory,
	F: DataFetcher,
	N: Notifier<F::Dataset>,
{
	/// Creates a sweep driver.
	///
	/// `guard` should write to `store`; build it with [`crate::flows::Broker::refresh_guard`] so
	/// sweeps and handshakes for the same user serialize.
	pub fn new(
		store: Arc<dyn CredentialStore>,
		sources: impl Into<Arc<S>>,
		guard: RefreshGuard,
		fetcher: F,
		notifier: N,
	) -> Self {
		Self {
			store,
			sources: sources.into(),
			guard,
			fetcher,
			notifier,
			config: SweepConfig::default(),
			state: Mutex::new(SweepState::Idle),
		}
	}

	/// Overrides the sweep tunables.
	pub fn with_config(mut self, config: SweepConfig) -> Self {
		self.config = config;

		self
	}

	/// Current state of the driver.
	pub fn state(&self) -> SweepState {
		*self.state.lock()
	}

	/// Data fetcher invoked for each linked user.
	pub fn fetcher(&self) -> &F {
		&self.fetcher
	}

	/// Notifier invoked with each fetched dataset.
	pub fn notifier(&self) -> &N {
		&self.notifier
	}

	/// Refresh guard used around every fetch.
	pub fn guard(&self) -> &RefreshGuard {
		&self.guard
	}

	/// Runs one sweep, unless one is already running.
	pub async fn run_once(&self) -> SweepOutcome {
		const KIND: FlowKind = FlowKind::Sweep;

		let Some(_running) = RunningGuard::acquire(&self.state) else {
			tracing::info!("Sweep still running; skipping this trigger.");

			return SweepOutcome::AlreadyRunning;
		};
		let span = FlowSpan::new(KIND, "run_once");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let outcome = span
			.instrument(async move {
				let records = match self.store.get_all().await {
					Ok(records) => records,
					Err(e) => {
						tracing::error!(error = %e, "Sweep aborted; the store could not be read.");

						return SweepOutcome::StoreUnavailable;
					},
				};
				let mut report = SweepReport { total: records.len(), ..Default::default() };

				for record in records {
					self.process(record, &mut report).await;
				}

				tracing::info!(
					total = report.total,
					delivered = report.delivered,
					skipped_no_token = report.skipped_no_token,
					skipped_malformed = report.skipped_malformed,
					fetch_failed = report.fetch_failed,
					notify_failed = report.notify_failed,
					"Sweep finished."
				);

				SweepOutcome::Completed(report)
			})
			.await;
		let flow_outcome = match outcome {
			SweepOutcome::Completed(_) => FlowOutcome::Success,
			_ => FlowOutcome::Failure,
		};

		obs::record_flow_outcome(KIND, flow_outcome);

		outcome
	}

	/// Runs a sweep at every fire time of `schedule` until `shutdown` resolves.
	///
	/// Shutdown is observed between sweeps; a sweep in progress always runs to completion so
	/// no rotated credential is dropped mid-write.
	pub async fn run_scheduled<Sch, Sd>(&self, schedule: &Sch, shutdown: Sd)
	where
		Sch: ?Sized + Schedule,
		Sd: Future<Output = ()>,
	{
		let mut shutdown = pin::pin!(shutdown);

		loop {
			let now = OffsetDateTime::now_utc();
			let Some(next) = schedule.next_after(now) else {
				tracing::info!("Schedule has no further fire times.");

				return;
			};
			let wait = std::time::Duration::try_from(next - now).unwrap_or_default();

			tracing::debug!(next = %next, "Next sweep scheduled.");

			tokio::select! {
				_ = &mut shutdown => {
					tracing::info!("Sweep scheduler stopped.");

					return;
				},
				_ = tokio::time::sleep(wait) => {},
			}

			let outcome = self.run_once().await;

			tracing::debug!(?outcome, "Scheduled sweep returned.");
		}
	}

	async fn process(&self, record: UserRecord, report: &mut SweepReport) {
		let identity = &record.identity;
		let Some(token) = record.token.as_ref().filter(|token| !token.expose().is_empty()) else {
			report.skipped_no_token += 1;

			tracing::warn!(identity = %identity, "Skipping user without a linked credential.");

			return;
		};
		let credential = match token.decode() {
			Ok(credential) => credential,
			Err(source) => {
				let err = Error::DeserializeFailed { identity: identity.clone(), source };

				report.skipped_malformed += 1;

				tracing::warn!(identity = %identity, error = %err, "Skipping user.");

				return;
			},
		};
		let source = match self.sources.token_source(credential) {
			Ok(source) => source,
			Err(e) => {
				report.fetch_failed += 1;

				tracing::error!(identity = %identity, error = %e, "Token source unavailable.");

				return;
			},
		};
		let timeout = self.config.call_timeout;
		let fetched = self
			.guard
			.with_guarded_credential(identity, &source, |source| async move {
				tokio::time::timeout(timeout, self.fetcher.fetch(identity, source))
					.await
					.unwrap_or_else(|_| Err(Error::FetchFailed { message: timed_out(timeout), source: None }))
			})
			.await;
		let dataset = match fetched {
			Ok(dataset) => dataset,
			Err(e) => {
				report.fetch_failed += 1;

				tracing::warn!(identity = %identity, error = %e, "Fetching user data failed.");

				return;
			},
		};

		match tokio::time::timeout(timeout, self.notifier.notify(identity, dataset))
			.await
			.unwrap_or_else(|_| Err(Error::NotifyFailed { message: timed_out(timeout), source: None }))
		{
			Ok(()) => {
				report.delivered += 1;

				tracing::info!(identity = %identity, "Notification delivered.");
			},
			Err(e) => {
				report.notify_failed += 1;

				tracing::warn!(identity = %identity, error = %e, "Delivering notification failed.");
			},
		}
	}
}
impl<S, F, N> Debug for BatchNotifier<S, F, N>
where
	S: ?Sized + TokenSourceFactory,
	F: DataFetcher,
	N: Notifier<F::Dataset>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("BatchNotifier")
			.field("config", &self.config)
			.field("state", &self.state())
			.field("guard", &self.guard)
			.finish()
	}
}

/// Marks the driver as running; resets it to idle when dropped, even on cancellation.
struct RunningGuard<'a>(&'a Mutex<SweepState>);
impl<'a> RunningGuard<'a> {
	fn acquire(state: &'a Mutex<SweepState>) -> Option<Self> {
		let mut current = state.lock();

		if *current == SweepState::Running {
			return None;
		}

		*current = SweepState::Running;

		Some(Self(state))
	}
}
impl Drop for RunningGuard<'_> {
	fn drop(&mut self) {
		*self.0.lock() = SweepState::Idle;
	}
}

fn timed_out(timeout: std::time::Duration) -> String {
	format!("timed out after {}s", timeout.as_secs_f32())
}
