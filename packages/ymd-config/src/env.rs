use std::env;

use crate::{Error, Result};

const STORE_URL: [&str; 2] = ["YMD_STORE_URL", "SUPABASE_URL"];
const STORE_KEY: [&str; 3] = ["YMD_STORE_KEY", "SUPABASE_SERVICE_ROLE_KEY", "SUPABASE_KEY"];
const EMBEDDING_API_BASE: [&str; 2] = ["YMD_EMBEDDING_API_BASE", "OPENAI_BASE_URL"];
const EMBEDDING_API_KEY: [&str; 2] = ["YMD_EMBEDDING_API_KEY", "OPENAI_API_KEY"];

/// Endpoints and keys for the external collaborators. Read once at startup.
#[derive(Clone)]
pub struct Credentials {
	pub store_url: String,
	pub store_key: String,
	pub embedding_api_base: String,
	pub embedding_api_key: String,
}
impl Credentials {
	pub fn from_env() -> Result<Self> {
		Self::from_lookup(|name| env::var(name).ok())
	}

	/// Resolves every variable through `lookup`, trying fallback names in order. All missing
	/// variables are reported together.
	pub fn from_lookup<F>(lookup: F) -> Result<Self>
	where
		F: Fn(&str) -> Option<String>,
	{
		let mut missing = Vec::new();
		let mut resolve = |names: &[&str]| {
			let value = names.iter().find_map(|name| {
				lookup(name).map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
			});

			if value.is_none() {
				missing.push(names.join(" or "));
			}

			value.unwrap_or_default()
		};
		let store_url = resolve(&STORE_URL);
		let store_key = resolve(&STORE_KEY);
		let embedding_api_base = resolve(&EMBEDDING_API_BASE);
		let embedding_api_key = resolve(&EMBEDDING_API_KEY);

		if !missing.is_empty() {
			return Err(Error::MissingEnv { names: missing.join(", ") });
		}

		Ok(Self {
			store_url: store_url.trim_end_matches('/').to_string(),
			store_key,
			embedding_api_base: embedding_api_base.trim_end_matches('/').to_string(),
			embedding_api_key,
		})
	}
}
impl std::fmt::Debug for Credentials {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Credentials")
			.field("store_url", &self.store_url)
			.field("store_key", &"<redacted>")
			.field("embedding_api_base", &self.embedding_api_base)
			.field("embedding_api_key", &"<redacted>")
			.finish()
	}
}
