//! File-backed [`CredentialStore`] for single-process deployments.
//!
//! The whole index is rewritten on every change: the snapshot goes to a sibling `.tmp` file,
//! is synced, then renamed over the target so readers of the file never see a partial write.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	auth::{StateToken, UserIdentity, UserRecord},
	store::{CredentialStore, RecordIndex, StoreError, StoreFuture},
};

/// Persists user records to a JSON file after each mutation.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<RecordIndex>>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let index = Self::load_snapshot(&path)?;

		tracing::debug!(path = %path.display(), records = index.len(), "Opened file store.");

		Ok(Self { path, inner: Arc::new(RwLock::new(index)) })
	}

	/// Location of the snapshot file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn load_snapshot(path: &Path) -> Result<RecordIndex, StoreError> {
		if !path.exists() {
			return Ok(RecordIndex::default());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		if bytes.iter().all(u8::is_ascii_whitespace) {
			return Ok(RecordIndex::default());
		}

		let records: Vec<UserRecord> =
			serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
				message: format!("Failed to parse {}: {e}", path.display()),
			})?;

		RecordIndex::from_records(records)
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist(&self, index: &RecordIndex) -> Result<(), StoreError> {
		let serialized =
			serde_json::to_vec_pretty(&index.snapshot()).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize store snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}
}
impl CredentialStore for FileStore {
	fn upsert(&self, record: UserRecord) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			let mut guard = self.inner.write();
			// Stage on a copy so a failed disk write leaves memory and file in agreement.
			let mut staged = guard.clone();

			if !staged.upsert(record)? {
				return Ok(());
			}

			self.persist(&staged)?;

			*guard = staged;

			Ok(())
		})
	}

	fn get_by_state<'a>(&'a self, state: &'a StateToken) -> StoreFuture<'a, Option<UserRecord>> {
		Box::pin(async move { Ok(self.inner.read().by_state(state).cloned()) })
	}

	fn get_by_identity<'a>(
		&'a self,
		identity: &'a UserIdentity,
	) -> StoreFuture<'a, Option<UserRecord>> {
		Box::pin(async move { Ok(self.inner.read().by_identity(identity).cloned()) })
	}

	fn get_all(&self) -> StoreFuture<'_, Vec<UserRecord>> {
		Box::pin(async move { Ok(self.inner.read().snapshot()) })
	}
}
