//! Storage contract and built-in store implementations for user credential records.
//!
//! Records are keyed by [`UserIdentity`]; the login [`StateToken`] is a side index that always
//! points at exactly one identity. A state that has been replaced is retired and can never be
//! indexed again. Both built-in stores share [`RecordIndex`], so their upsert and lookup semantics
//! are identical and only durability differs.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// std
use std::collections::btree_map::Entry;
// self
use crate::{
	_prelude::*,
	auth::{StateToken, UserIdentity, UserRecord},
};

/// Boxed future returned by every [`CredentialStore`] operation.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Storage backend contract implemented by credential stores.
///
/// Implementations must be safe to share between the HTTP handshake path and the scheduled
/// sweep: writes are serialized, reads never observe a half-written record, and a completed
/// write is visible to every later read.
pub trait CredentialStore
where
	Self: Send + Sync,
{
	/// Inserts the record or replaces the stored record with the same identity.
	///
	/// Fails with [`StoreError::StateConflict`] if the record's state is indexed under another
	/// identity, and with [`StoreError::StateRetired`] if the state was consumed or superseded
	/// earlier.
	fn upsert(&self, record: UserRecord) -> StoreFuture<'_, ()>;

	/// Looks up the record whose current login state is `state`.
	fn get_by_state<'a>(&'a self, state: &'a StateToken) -> StoreFuture<'a, Option<UserRecord>>;

	/// Looks up the record for `identity`.
	fn get_by_identity<'a>(
		&'a self,
		identity: &'a UserIdentity,
	) -> StoreFuture<'a, Option<UserRecord>>;

	/// Returns a snapshot of every record, ordered by identity.
	fn get_all(&self) -> StoreFuture<'_, Vec<UserRecord>>;
}

/// Error type produced by [`CredentialStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
	/// The record's state already belongs to a different identity.
	#[error("Login state is already bound to another identity.")]
	StateConflict,
	/// The record's state was replaced earlier and cannot be reused.
	#[error("Login state was already used or superseded.")]
	StateRetired,
}

/// In-memory index shared by the built-in stores.
#[derive(Clone, Debug, Default)]
pub struct RecordIndex {
	records: BTreeMap<UserIdentity, UserRecord>,
	states: HashMap<StateToken, UserIdentity>,
	retired: HashSet<StateToken>,
}
impl RecordIndex {
	/// Rebuilds an index from previously persisted records.
	pub fn from_records(records: impl IntoIterator<Item = UserRecord>) -> Result<Self, StoreError> {
		let records = records.into_iter().collect::<Vec<_>>();
		let mut index = Self {
			retired: records.iter().flat_map(|record| record.retired_states.iter().cloned()).collect(),
			..Default::default()
		};

		for record in records {
			index.upsert(record)?;
		}

		Ok(index)
	}

	/// Applies an upsert, returning `true` if the observable content changed.
	pub fn upsert(&mut self, record: UserRecord) -> Result<bool, StoreError> {
		if let Some(state) = record.state_value() {
			if self.retired.contains(state) {
				return Err(StoreError::StateRetired);
			}
			if self.states.get(state).is_some_and(|owner| owner != &record.identity) {
				return Err(StoreError::StateConflict);
			}
		}

		self.retired.extend(record.retired_states.iter().cloned());

		match self.records.entry(record.identity.clone()) {
			Entry::Occupied(mut slot) => {
				if slot.get() == &record {
					return Ok(false);
				}
				if let Some(previous) = slot.get().state_value()
					&& Some(previous) != record.state_value()
				{
					self.states.remove(previous);
					self.retired.insert(previous.clone());
				}
				if let Some(state) = record.state_value() {
					self.states.insert(state.clone(), record.identity.clone());
				}

				slot.insert(record);
			},
			Entry::Vacant(slot) => {
				if let Some(state) = record.state_value() {
					self.states.insert(state.clone(), record.identity.clone());
				}

				slot.insert(record);
			},
		}

		Ok(true)
	}

	/// Returns `true` if `state` was consumed or superseded earlier.
	pub fn is_retired(&self, state: &str) -> bool {
		self.retired.contains(state)
	}

	/// Record currently indexed under `state`.
	pub fn by_state(&self, state: &str) -> Option<&UserRecord> {
		self.states.get(state).and_then(|identity| self.records.get(identity))
	}

	/// Record stored for `identity`.
	pub fn by_identity(&self, identity: &str) -> Option<&UserRecord> {
		self.records.get(identity)
	}

	/// Cloned snapshot of every record, ordered by identity.
	pub fn snapshot(&self) -> Vec<UserRecord> {
		self.records.values().cloned().collect()
	}

	/// Number of stored records.
	pub fn len(&self) -> usize {
		self.records.len()
	}

	/// Returns `true` when no records are stored.
	pub fn is_empty(&self) -> bool {
		self.records.is_empty()
	}
}
