use std::time::Duration;

use reqwest::{Client, header::HeaderMap};
use serde_json::Value;

use crate::{Error, Result};
use ymd_config::{Credentials, EmbeddingProviderConfig};

/// OpenAI-compatible embedding endpoint.
#[derive(Clone, Debug)]
pub struct EmbeddingClient {
	client: Client,
	url: String,
	headers: HeaderMap,
	model: String,
	dimensions: u32,
}
impl EmbeddingClient {
	pub fn new(cfg: &EmbeddingProviderConfig, creds: &Credentials) -> Result<Self> {
		let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;

		Ok(Self {
			client,
			url: format!("{}{}", creds.embedding_api_base, cfg.path),
			headers: crate::auth_headers(&creds.embedding_api_key, &cfg.default_headers)?,
			model: cfg.model.clone(),
			dimensions: cfg.dimensions,
		})
	}

	pub fn dimensions(&self) -> u32 {
		self.dimensions
	}

	pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
		let body = serde_json::json!({
			"model": self.model,
			"input": texts,
			"dimensions": self.dimensions,
		});
		let res =
			self.client.post(&self.url).headers(self.headers.clone()).json(&body).send().await?;
		let json: Value = res.error_for_status()?.json().await?;
		let vectors = parse_embedding_response(json)?;

		if vectors.len() != texts.len() {
			return Err(Error::InvalidResponse {
				message: format!(
					"Embedding response returned {} vectors for {} inputs.",
					vectors.len(),
					texts.len()
				),
			});
		}

		Ok(vectors)
	}
}

fn parse_embedding_response(json: Value) -> Result<Vec<Vec<f32>>> {
	let data = json.get("data").and_then(|v| v.as_array()).ok_or_else(|| {
		Error::InvalidResponse { message: "Embedding response is missing data array.".to_string() }
	})?;
	let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());

	for (fallback_index, item) in data.iter().enumerate() {
		let index = item
			.get("index")
			.and_then(|v| v.as_u64())
			.map(|v| v as usize)
			.unwrap_or(fallback_index);
		let embedding = item.get("embedding").and_then(|v| v.as_array()).ok_or_else(|| {
			Error::InvalidResponse {
				message: "Embedding item missing embedding array.".to_string(),
			}
		})?;
		let mut vec = Vec::with_capacity(embedding.len());

		for value in embedding {
			let number = value.as_f64().ok_or_else(|| Error::InvalidResponse {
				message: "Embedding value must be numeric.".to_string(),
			})?;

			vec.push(number as f32);
		}

		indexed.push((index, vec));
	}

	indexed.sort_by_key(|(index, _)| *index);

	Ok(indexed.into_iter().map(|(_, vec)| vec).collect())
}
