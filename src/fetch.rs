//! Reqwest-backed [`DataFetcher`] for JSON resource APIs such as a daily sleep log.

// std
use std::marker::PhantomData;
// crates.io
use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use time::macros::format_description;
// self
use crate::{
	_prelude::*,
	auth::UserIdentity,
	error::ConfigError,
	flows::TokenSource,
	sweep::{DataFetcher, SweepFuture},
};

/// Placeholder replaced by the current UTC date (`YYYY-MM-DD`).
pub const DATE_PLACEHOLDER: &str = "{date}";

/// GETs a per-day JSON resource with the user's bearer token and decodes it into `T`.
pub struct JsonResourceFetcher<T = serde_json::Value> {
	http: ReqwestClient,
	url_template: String,
	_dataset: PhantomData<fn() -> T>,
}
impl<T> JsonResourceFetcher<T> {
	/// Creates a fetcher for `url_template`.
	///
	/// The template may contain [`DATE_PLACEHOLDER`]; it must yield a valid URL once expanded.
	pub fn new(http: ReqwestClient, url_template: impl Into<String>) -> Result<Self, ConfigError> {
		let fetcher = Self { http, url_template: url_template.into(), _dataset: PhantomData };

		fetcher.resource_url(OffsetDateTime::UNIX_EPOCH)?;

		Ok(fetcher)
	}

	/// Expands the template for the UTC date of `instant`.
	pub fn resource_url(&self, instant: OffsetDateTime) -> Result<Url, ConfigError> {
		let date = instant
			.to_offset(time::UtcOffset::UTC)
			.format(format_description!("[year]-[month]-[day]"))
			.unwrap_or_default();

		Url::parse(&self.url_template.replace(DATE_PLACEHOLDER, &date))
			.map_err(|source| ConfigError::InvalidResourceUrl { source })
	}
}
impl<T> Debug for JsonResourceFetcher<T> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("JsonResourceFetcher").field("url_template", &self.url_template).finish()
	}
}
impl<T> DataFetcher for JsonResourceFetcher<T>
where
	T: 'static + Send + DeserializeOwned,
{
	type Dataset = T;

	fn fetch<'a>(
		&'a self,
		identity: &'a UserIdentity,
		source: &'a dyn TokenSource,
	) -> SweepFuture<'a, Self::Dataset> {
		Box::pin(async move {
			let url = self.resource_url(OffsetDateTime::now_utc())?;
			let credential = source.token().await?;
			let response = self
				.http
				.get(url)
				.bearer_auth(credential.access_token.expose())
				.header(ACCEPT, "application/json")
				.send()
				.await
				.map_err(|e| Error::fetch_failed("resource request failed", e))?;
			let status = response.status();

			if !status.is_success() {
				tracing::debug!(
					identity = %identity,
					status = status.as_u16(),
					"Resource server rejected the request."
				);

				return Err(Error::FetchFailed {
					message: format!("resource server answered HTTP {}", status.as_u16()),
					source: None,
				});
			}

			let body = response
				.bytes()
				.await
				.map_err(|e| Error::fetch_failed("resource body could not be read", e))?;
			let mut deserializer = serde_json::Deserializer::from_slice(&body);

			serde_path_to_error::deserialize(&mut deserializer)
				.map_err(|e| Error::fetch_failed("resource body did not match the dataset", e))
		})
	}
}
