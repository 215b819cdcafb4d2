//! Thread-safe in-memory [`CredentialStore`] for local development and tests.

// self
use crate::{
	_prelude::*,
	auth::{StateToken, UserIdentity, UserRecord},
	store::{CredentialStore, RecordIndex, StoreError, StoreFuture},
};

type SharedIndex = Arc<RwLock<RecordIndex>>;

/// Storage backend that keeps records in-process.
///
/// Clones share the same index.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(SharedIndex);
impl MemoryStore {
	/// Seeds a store from existing records.
	pub fn with_records(records: impl IntoIterator<Item = UserRecord>) -> Result<Self, StoreError> {
		Ok(Self(Arc::new(RwLock::new(RecordIndex::from_records(records)?))))
	}

	/// Number of stored records.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when the store is empty.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}

	fn upsert_now(index: SharedIndex, record: UserRecord) -> Result<(), StoreError> {
		index.write().upsert(record).map(|_| ())
	}
}
impl CredentialStore for MemoryStore {
	fn upsert(&self, record: UserRecord) -> StoreFuture<'_, ()> {
		let index = self.0.clone();

		Box::pin(async move { Self::upsert_now(index, record) })
	}

	fn get_by_state<'a>(&'a self, state: &'a StateToken) -> StoreFuture<'a, Option<UserRecord>> {
		Box::pin(async move { Ok(self.0.read().by_state(state).cloned()) })
	}

	fn get_by_identity<'a>(
		&'a self,
		identity: &'a UserIdentity,
	) -> StoreFuture<'a, Option<UserRecord>> {
		Box::pin(async move { Ok(self.0.read().by_identity(identity).cloned()) })
	}

	fn get_all(&self) -> StoreFuture<'_, Vec<UserRecord>> {
		Box::pin(async move { Ok(self.0.read().snapshot()) })
	}
}
