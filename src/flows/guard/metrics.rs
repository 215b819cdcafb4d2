// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for [`super::RefreshGuard`] calls.
#[derive(Debug, Default)]
pub struct GuardMetrics {
	calls: AtomicU64,
	rotations: AtomicU64,
	persist_failures: AtomicU64,
}
impl GuardMetrics {
	/// Guarded calls started.
	pub fn calls(&self) -> u64 {
		self.calls.load(Ordering::Relaxed)
	}

	/// Calls after which the credential had rotated.
	pub fn rotations(&self) -> u64 {
		self.rotations.load(Ordering::Relaxed)
	}

	/// Rotations that could not be written back.
	pub fn persist_failures(&self) -> u64 {
		self.persist_failures.load(Ordering::Relaxed)
	}

	pub(crate) fn record_call(&self) {
		self.calls.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_rotation(&self) {
		self.rotations.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_persist_failure(&self) {
		self.persist_failures.fetch_add(1, Ordering::Relaxed);
	}
}
