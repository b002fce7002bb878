pub mod embedding;
pub mod store;

mod error;

pub use error::{Error, Result};

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use serde_json::{Map, Value};

pub fn auth_headers(api_key: &str, default_headers: &Map<String, Value>) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	headers.insert(AUTHORIZATION, format!("Bearer {api_key}").parse()?);

	for (key, value) in default_headers {
		let Some(raw) = value.as_str() else {
			return Err(Error::InvalidConfig {
				message: "Default header values must be strings.".to_string(),
			});
		};

		headers.insert(HeaderName::from_bytes(key.as_bytes())?, raw.parse()?);
	}

	Ok(headers)
}

/// Headers for a PostgREST-style record store: the key travels both as `apikey` and as a bearer
/// token.
pub fn store_headers(api_key: &str) -> Result<HeaderMap> {
	let mut headers = auth_headers(api_key, &Map::new())?;

	headers.insert(HeaderName::from_static("apikey"), HeaderValue::from_str(api_key)?);

	Ok(headers)
}
