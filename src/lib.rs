//! Link third-party OAuth 2.0 accounts to stored credentials, keep single-use refresh tokens from
//! burning, and sweep every linked user on a schedule.
//!
//! The crate is organized leaf-first:
//!
//! - [`store`] persists [`auth::UserRecord`]s keyed by identity with a state side index.
//! - [`flows`] hosts the [`flows::Broker`] (authorization handshake) and the
//!   [`flows::RefreshGuard`] that persists rotated credentials before returning.
//! - [`sweep`] drives scheduled passes over every stored user; [`fetch`] supplies a reqwest-backed
//!   data fetcher for them.
//! - [`config`] turns a deployment's JSON document into a broker, a schedule, and a fetcher.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod config;
pub mod error;
#[cfg(feature = "reqwest")] pub mod fetch;
pub mod flows;
pub mod http;
pub mod oauth;
pub mod obs;
pub mod provider;
pub mod store;
pub mod sweep;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::ScopeSet,
		flows::Broker,
		http::ReqwestHttpClient,
		oauth::ReqwestTransportErrorMapper,
		provider::{DefaultProviderStrategy, ProviderDescriptor, ProviderStrategy},
		store::{CredentialStore, MemoryStore},
	};

	/// Broker type alias used by reqwest-backed integration tests.
	pub type ReqwestTestBroker = Broker<ReqwestHttpClient, ReqwestTransportErrorMapper>;

	/// Redirect URI registered by every test broker.
	pub const TEST_REDIRECT_URI: &str = "https://app.example.com/callback";

	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	/// Constructs a [`Broker`] backed by an in-memory store, default provider strategy, and the
	/// reqwest transport used across integration tests.
	pub fn build_reqwest_test_broker(
		descriptor: ProviderDescriptor,
		client_id: &str,
		client_secret: &str,
		scope: ScopeSet,
	) -> (ReqwestTestBroker, Arc<MemoryStore>) {
		let store_backend = Arc::new(MemoryStore::default());
		let store: Arc<dyn CredentialStore> = store_backend.clone();
		let strategy: Arc<dyn ProviderStrategy> = Arc::new(DefaultProviderStrategy);
		let redirect_uri =
			Url::parse(TEST_REDIRECT_URI).expect("Test redirect URI should parse successfully.");
		let http_client = test_reqwest_http_client();
		let mapper = Arc::new(ReqwestTransportErrorMapper);
		let broker = Broker::with_http_client(
			store,
			descriptor,
			strategy,
			client_id,
			redirect_uri,
			http_client,
			mapper,
		)
		.with_client_secret(client_secret)
		.with_scope(scope);

		(broker, store_backend)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap, HashSet},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(all(test, feature = "reqwest"))] use {color_eyre as _, httpmock as _};
